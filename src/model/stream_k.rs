//! Stream-K processor-grid predictor.
//!
//! Stream-K partitions the MAC-iteration space evenly across a fixed
//! processor grid instead of assigning whole output tiles, trading tail
//! waves for fixup work between peers that share a tile. This module
//! predicts the best grid size with a linear runtime model plus a
//! cache-imbalance penalty, swept over a candidate range of grid sizes.

use crate::model::cost::ceil_div;

// Model coefficients, fitted on measured Stream-K kernels.
//
// `A`: fixed per-workgroup overhead: launch latency, compulsory cache
// misses, the final output-tile write.
// `B`: conditional cost of spilling partial sums when output tiles do not
// quantize evenly across the grid.
// `C`: instruction and stall cost of each MAC-iteration.
// `D`: cost of reading and accumulating one peer's partial sums.
const A: f64 = 7.337;
const B: f64 = 3.01;
const C: f64 = 2.2935;
const D: f64 = 10.22;

/// Number of output tiles for a blocked GEMM.
pub fn number_of_output_tiles(blk_m: u64, blk_n: u64, m: u64, n: u64, batch: u64) -> u64 {
    ceil_div(m, blk_m) * ceil_div(n, blk_n) * batch
}

/// MAC-iterations needed per output tile.
pub fn num_iters_per_tile(blk_k: u64, k: u64) -> u64 {
    ceil_div(k, blk_k)
}

/// MAC-iterations assigned to each CTA for a grid of `g` processors.
pub fn num_iters_per_cta(iters_total: u64, g: u64) -> u64 {
    ceil_div(iters_total, g)
}

/// Number of CTAs collaborating on one output tile.
pub fn num_fixup_peers(iters_per_tile: u64, iters_per_cta: u64) -> u64 {
    ceil_div(iters_per_tile, iters_per_cta)
}

/// Peer count including the extra fixup pass that appears whenever the
/// iteration space does not divide evenly across the grid.
pub fn num_fixup_peers_v2(g: u64, iters_total: u64, iters_per_tile: u64, iters_per_cta: u64) -> u64 {
    let has_fixup = if iters_total % g == 0 && iters_per_cta % iters_per_tile == 0 { 0 } else { 1 };
    ceil_div(iters_per_tile, iters_per_cta) + has_fixup
}

/// Baseline linear runtime model.
///
/// Returns `(runtime, iters_per_cta, fixup_peers)`.
#[allow(clippy::too_many_arguments)]
pub fn predicted_runtime(
    blk_m: u64,
    blk_n: u64,
    blk_k: u64,
    m: u64,
    n: u64,
    k: u64,
    batch: u64,
    g: u64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
) -> (f64, u64, u64) {
    let output_tiles = number_of_output_tiles(blk_m, blk_n, m, n, batch);
    let iters_per_tile = num_iters_per_tile(blk_k, k);
    let iters_total = output_tiles * iters_per_tile;
    let iters_per_cta = num_iters_per_cta(iters_total, g);
    let fixup_peers = num_fixup_peers(iters_per_tile, iters_per_cta);

    let runtime = a
        + b * f64::from(fixup_peers > 1)
        + c * iters_per_cta as f64
        + d * fixup_peers.saturating_sub(1) as f64;

    (runtime, iters_per_cta, fixup_peers)
}

/// Runtime model with the cache-imbalance penalty.
///
/// The penalty grows as the remainder-tile ratio approaches the ideal even
/// split `1/peers` (the reciprocal deviation saturates to infinity when
/// they coincide exactly), pushing the search toward grids whose remainder
/// work is clearly lopsided one way or the other.
///
/// Returns `(runtime, iters_per_cta, fixup_peers, cache_penalty)`.
#[allow(clippy::too_many_arguments)]
pub fn predicted_runtime_v2(
    blk_m: u64,
    blk_n: u64,
    blk_k: u64,
    m: u64,
    n: u64,
    k: u64,
    batch: u64,
    g: u64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
) -> (f64, u64, u64, f64) {
    let output_tiles = number_of_output_tiles(blk_m, blk_n, m, n, batch);
    let iters_per_tile = num_iters_per_tile(blk_k, k);
    let iters_total = output_tiles * iters_per_tile;
    let iters_per_cta = num_iters_per_cta(iters_total, g);
    let fixup_peers = num_fixup_peers_v2(g, iters_total, iters_per_tile, iters_per_cta);

    let remainder_tiles = output_tiles % g;
    let k_split_ratio = remainder_tiles as f64 / g as f64;

    let mut cache_penalty = 0.0;
    if fixup_peers >= 1 {
        let ideal_split_ratio = 1.0 / fixup_peers as f64;
        let imbalance = 1.0 / (k_split_ratio - ideal_split_ratio).abs();
        cache_penalty = d * imbalance * fixup_peers as f64;
    }

    let runtime = a
        + b * f64::from(fixup_peers > 1)
        + c * iters_per_cta as f64
        + d * fixup_peers.saturating_sub(1) as f64
        + cache_penalty;

    (runtime, iters_per_cta, fixup_peers, cache_penalty)
}

/// Sweep grid sizes in `[grid_start, grid_end]` and return the one with the
/// lowest v2 predicted runtime. The first minimum wins ties; an empty range
/// returns 0.
#[allow(clippy::too_many_arguments)]
pub fn best_predicted_grid_size(
    blk_m: u64,
    blk_n: u64,
    blk_k: u64,
    m: u64,
    n: u64,
    k: u64,
    batch: u64,
    grid_start: u64,
    grid_end: u64,
) -> u64 {
    let mut min_grid = 0;
    let mut min_runtime = f64::MAX;
    let mut min_grid_baseline = 0;
    let mut min_runtime_baseline = f64::MAX;

    for g in grid_start..=grid_end {
        let (runtime, iters_per_cta, fixup_peers) =
            predicted_runtime(blk_m, blk_n, blk_k, m, n, k, batch, g, A, B, C, D);
        let (runtime_v2, _, fixup_peers_v2, cache_penalty) =
            predicted_runtime_v2(blk_m, blk_n, blk_k, m, n, k, batch, g, A, B, C, D);

        log::trace!(
            "grid {g}: baseline {runtime:.2} (iters/cta {iters_per_cta}, peers {fixup_peers}), \
             v2 {runtime_v2:.2} (peers {fixup_peers_v2}, cache penalty {cache_penalty:.2})"
        );

        if min_runtime_baseline > runtime {
            min_grid_baseline = g;
            min_runtime_baseline = runtime;
        }
        if min_runtime > runtime_v2 {
            min_grid = g;
            min_runtime = runtime_v2;
        }
    }

    log::debug!(
        "stream-k grid search: baseline argmin {min_grid_baseline} ({min_runtime_baseline:.2}), \
         selected {min_grid} ({min_runtime:.2})"
    );

    min_grid
}
