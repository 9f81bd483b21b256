//! Common utilities used across the crate.
//!
//! This module provides parallelism configuration, thread pool setup and
//! directed float narrowing used by the extractor.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Compiled programs hold this flag and consult it on every prediction call.
/// When `Parallel`, row blocks are distributed over the current `rayon` pool.
/// When `Sequential`, blocks are processed in order on the calling thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Run `f` over every item, bridging a sequential iterator into rayon when parallel.
    ///
    /// Suited to iterators that don't implement `IntoParallelIterator`
    /// (like zipped `axis_chunks_iter_mut`).
    #[inline]
    pub fn maybe_par_bridge_for_each<T, I, F>(self, iter: I, f: F)
    where
        T: Send,
        I: Iterator<Item = T> + Send,
        F: Fn(T) + Sync + Send,
    {
        if self.is_parallel() {
            iter.par_bridge().for_each(f);
        } else {
            iter.for_each(f);
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the thread pool implied by `n_threads`.
///
/// Thread count semantics:
/// - `0` = auto (the current rayon pool, sequential if it has one thread)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = a dedicated pool of exactly `n` threads
///
/// # Panics
///
/// Panics if the dedicated pool cannot be created.
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .expect("Failed to create thread pool");
            pool.install(|| f(Parallelism::Parallel))
        }
    }
}

// =============================================================================
// Directed Narrowing
// =============================================================================

/// Largest `f32` that is `<= value`.
///
/// For every `f32` x: `x <= value` (compared in f64) iff `x <= narrow_down(value)`.
pub fn narrow_down(value: f64) -> f32 {
    let nearest = value as f32;
    if (nearest as f64) > value {
        next_down(nearest)
    } else {
        nearest
    }
}

/// Smallest `f32` that is `>= value`.
///
/// For every `f32` x: `x < value` (compared in f64) iff `x < narrow_up(value)`.
pub fn narrow_up(value: f64) -> f32 {
    let nearest = value as f32;
    if (nearest as f64) < value {
        next_up(nearest)
    } else {
        nearest
    }
}

fn next_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn next_down(x: f32) -> f32 {
    -next_up(-x)
}
