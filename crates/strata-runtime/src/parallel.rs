use std::cmp::Ordering;

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Buffers smaller than this are sorted on the calling thread.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
const PARALLEL_SORT_MIN: usize = 4096;

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static RAYON_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_rayon_threads() -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn rayon_pool() -> Option<&'static ThreadPool> {
    RAYON_POOL
        .get_or_init(|| {
            let requested = desired_rayon_threads().max(1);
            let try_build = |n| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("strata-sort-{i}"))
                    .build()
            };
            match try_build(requested) {
                Ok(pool) => Some(pool),
                Err(_) if requested > 1 => try_build(1).ok(),
                Err(_) => None,
            }
        })
        .as_ref()
}

/// Stable sort of `items` by `cmp`.
pub(crate) fn sort_by<T, F>(items: &mut [T], cmp: F)
where
    T: Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    if items.len() >= PARALLEL_SORT_MIN {
        if let Some(pool) = rayon_pool() {
            pool.install(|| items.par_sort_by(&cmp));
            return;
        }
    }
    items.sort_by(cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_sorts_stay_stable() {
        let mut items: Vec<(u32, usize)> = (0..10_000usize)
            .map(|i| ((i % 7) as u32, i))
            .collect();
        sort_by(&mut items, |a, b| a.0.cmp(&b.0));
        assert!(items
            .windows(2)
            .all(|w| w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1)));
    }
}
