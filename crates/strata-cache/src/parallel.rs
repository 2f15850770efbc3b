#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Thread pool for loading record fields side by side.
///
/// Built per crate rather than taken from rayon's global pool so that a failure to spawn
/// threads degrades to sequential loading instead of a panic.
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
fn build_rayon_pool() -> Option<ThreadPool> {
    let requested = desired_rayon_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("strata-cache-{i}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(_) if requested > 1 => try_build(1).ok(),
        Err(_) => None,
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn rayon_pool() -> Option<&'static ThreadPool> {
    RAYON_POOL.get_or_init(build_rayon_pool).as_ref()
}

/// Maps `f` over `items`, in parallel when a pool is available, keeping item order.
pub(crate) fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    if items.len() > 1 {
        if let Some(pool) = rayon_pool() {
            return pool.install(|| items.par_iter().map(&f).collect());
        }
    }
    items.iter().map(f).collect()
}
