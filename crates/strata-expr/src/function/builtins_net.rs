use super::{per_row, CallContext, FunctionSpec};
use crate::access::{bools_from, is_error};
use std::net::IpAddr;
use strata_vector::types::is_integer;
use strata_vector::{nulls_of, BitVec, Net, Type, Value, Vector};

inventory::submit! {
    FunctionSpec { name: "cidr_match", min_args: 2, max_args: 2, rip_unions: true, implementation: cidr_match_fn }
}

inventory::submit! {
    FunctionSpec { name: "network_of", min_args: 1, max_args: 2, rip_unions: true, implementation: network_of_fn }
}

/// True where any IP inside the second argument, at any depth, falls in the network.
fn cidr_match_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let (nets, val) = (&args[0], &args[1]);
    if is_error(nets) {
        return nets.clone();
    }
    if !matches!(nets.ty().under(), Type::Net) {
        return Vector::wrapped_error(cx.types, "cidr_match: not a net", nets);
    }
    let n = nets.len();
    let net_nulls = nulls_of(nets);
    let ty = val.ty();
    if !matches!(ty.under(), Type::Ip) && ty.is_primitive() {
        return Vector::constant(Value::bool(false), n, net_nulls.compact());
    }
    bools_from(n, net_nulls.clone(), |i| {
        let Some(net) = nets.value_at(i as u32).as_net() else {
            return false;
        };
        val.value_at(i as u32)
            .walk(&mut |x| x.as_ip().is_some_and(|ip| net.contains(ip)))
    })
}

/// Derives a network from an address and an optional mask (an IP mask or a bit count).
/// Without a mask, IPv4 class defaults apply.
fn network_of_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let ips = &args[0];
    if is_error(ips) {
        return ips.clone();
    }
    if !matches!(ips.ty().under(), Type::Ip) {
        return Vector::wrapped_error(cx.types, "network_of: not an IP", ips);
    }
    let mask = args.get(1);
    if let Some(mask) = mask {
        if is_error(mask) {
            return mask.clone();
        }
        let ty = mask.ty();
        if !matches!(ty.under(), Type::Ip) && !is_integer(ty.under().id()) {
            return Vector::wrapped_error(cx.types, "network_of: bad arg for CIDR mask", mask);
        }
    }
    let nulls = match mask {
        Some(m) => BitVec::or(&nulls_of(ips), &nulls_of(m)),
        None => nulls_of(ips),
    };
    per_row(ips.len(), |i| {
        let (Some(ip), false) = (ips.value_at(i).as_ip(), nulls.value(i)) else {
            return Value::null(Type::Net);
        };
        let net = match mask.map(|m| m.value_at(i)) {
            None => class_network(ip),
            Some(m) => match m.as_ip() {
                Some(mask_ip) => mask_network(ip, mask_ip),
                None => {
                    let bits = m.as_int().or(m.as_uint().and_then(|u| i64::try_from(u).ok()));
                    bits_network(ip, bits.unwrap_or(-1))
                }
            },
        };
        match net {
            Ok(net) => Value::net(net),
            Err(msg) => Value::error(cx.types, &format!("network_of: {msg}")),
        }
    })
}

fn class_network(ip: IpAddr) -> Result<Net, &'static str> {
    let IpAddr::V4(v4) = ip else {
        return Err("not an IPv4 address");
    };
    let prefix = match v4.octets()[0] {
        b if b < 0x80 => 8,
        b if b < 0xc0 => 16,
        _ => 24,
    };
    Net::new(ip, prefix).ok_or("CIDR bit count out of range")
}

fn mask_network(ip: IpAddr, mask: IpAddr) -> Result<Net, &'static str> {
    let (bits, width) = match (ip, mask) {
        (IpAddr::V4(_), IpAddr::V4(m)) => (u128::from(u32::from(m)) << 96, 32),
        (IpAddr::V6(_), IpAddr::V6(m)) => (u128::from(m), 128),
        _ => return Err("address and mask have different lengths"),
    };
    let ones = bits.leading_ones();
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return Err("mask is non-contiguous");
    }
    let prefix = ones.min(width) as u8;
    Net::new(ip, prefix).ok_or("mask is non-contiguous")
}

fn bits_network(ip: IpAddr, bits: i64) -> Result<Net, &'static str> {
    let width = if ip.is_ipv4() { 32 } else { 128 };
    if !(0..=width).contains(&bits) {
        return Err("CIDR bit count out of range");
    }
    Net::new(ip, bits as u8).ok_or("CIDR bit count out of range")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::TypeContext;

    #[test]
    fn masks() {
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        let mask: IpAddr = "255.255.0.0".parse().unwrap();
        assert_eq!(mask_network(ip, mask).unwrap().to_string(), "10.1.0.0/16");
        let holey: IpAddr = "255.0.255.0".parse().unwrap();
        assert_eq!(mask_network(ip, holey), Err("mask is non-contiguous"));
        let v6: IpAddr = "ffff::".parse().unwrap();
        assert_eq!(mask_network(ip, v6), Err("address and mask have different lengths"));
        assert_eq!(class_network("192.168.1.9".parse().unwrap()).unwrap().to_string(), "192.168.1.0/24");
        assert_eq!(bits_network(ip, 33), Err("CIDR bit count out of range"));
    }

    #[test]
    fn network_of_defaults_and_bit_counts() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "10.1.2.3 172.16.5.4");
        assert_eq!(run(&ctx, "network_of", &input, &[]), ["10.0.0.0/8", "172.16.0.0/16"]);
        assert_eq!(run(&ctx, "network_of", &input, &[Value::int64(24)]), ["10.1.2.0/24", "172.16.5.0/24"]);
        let out = run(&ctx, "network_of", &col(&ctx, "::1"), &[]);
        assert!(out[0].contains("not an IPv4 address"));
        let out = run(&ctx, "network_of", &col(&ctx, "\"x\""), &[]);
        assert!(out[0].contains("network_of: not an IP"));
    }

    #[test]
    fn cidr_match_searches_nested_values() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "10.0.0.0/8 10.0.0.0/8 10.0.0.0/8");
        let values = [Value::int64(0)];
        let out = run(&ctx, "cidr_match", &input, &values);
        assert_eq!(out, ["false", "false", "false"]);
        let this = col(&ctx, "{n:10.0.0.0/8,v:{a:[10.1.1.1]}} {n:10.0.0.0/8,v:{a:[11.1.1.1]}}");
        let args = vec![crate::dotted_path(&ctx, &["n"]), crate::dotted_path(&ctx, &["v"])];
        let call = super::super::call(ctx.clone(), "cidr_match", args).unwrap();
        let out = super::super::test_support::show(&crate::Evaluator::eval(&call, &this));
        assert_eq!(out, ["true", "false"]);
        let out = run(&ctx, "cidr_match", &col(&ctx, "1"), &values);
        assert!(out[0].contains("cidr_match: not a net"));
    }
}
