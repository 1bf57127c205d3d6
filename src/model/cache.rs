//! Cache-hit-rate estimators for the two cached memory tiers.
//!
//! Both estimators model the set of output tiles resident on one XCD as a
//! WGM-shaped block of the output grid: every CU in the block re-reads the
//! same A rows and B columns, so the first touch of each operand panel is a
//! miss and every repeat within the block is a hit. The L2 estimator
//! additionally shrinks the block until the uncached footprint fits in the
//! cache; the MALL covers all XCDs and gets no capacity bound.
//!
//! Read accounting is 64-bit signed integer throughout; only the final
//! miss/hit ratio is floating point.

use crate::hardware::Hardware;
use crate::model::cost::{active_cu, ceil_div};

/// Estimated L2 hit rate for one macro-tile iteration.
///
/// A value above 1.0 indicates a numeric anomaly; it is reported on stderr
/// and returned as computed, never clamped.
#[allow(clippy::too_many_arguments)]
pub fn estimate_l2_hit(
    hardware: &Hardware,
    m: u64,
    n: u64,
    k: u64,
    batch: u64,
    mt_m: u64,
    mt_n: u64,
    mt_k: u64,
    wgm: u64,
    elem_bits: u64,
) -> f64 {
    let grid_m = ceil_div(m, mt_m) as i64;
    let grid_n = ceil_div(n, mt_n) as i64;

    let wgm = wgm.max(1) as i64;

    let num_cus = active_cu(hardware, m, n, batch, mt_m, mt_n);
    // Work is distributed per XCD; each L2 serves one XCD's share of CUs.
    let cu_per_xcd = (ceil_div(num_cus, hardware.num_xcd) as i64).max(1);

    let mut l2_m = wgm.min(grid_m);
    let mut l2_n = cu_per_xcd / wgm.min(grid_m);

    // A block wider than the grid wraps around into additional M rows.
    if l2_n > grid_n {
        let num_wraps = (l2_n / grid_n) - 1;
        l2_m += num_wraps * wgm;
        l2_n = grid_n;
    }

    l2_m = l2_m.min(grid_m).max(1);
    l2_n = l2_n.min(grid_n).max(1);

    let mt_a = (mt_m * mt_k) as i64;
    let mt_b = (mt_n * mt_k) as i64;

    let mut l2_a_uncached_reads = l2_m * mt_a;
    let mut l2_b_uncached_reads = l2_n * mt_b;

    // Shrink the block until its first-touch footprint fits in L2.
    let capacity_elems = (hardware.l2_capacity / ceil_div(elem_bits, 8)) as i64;
    while l2_a_uncached_reads + l2_b_uncached_reads > capacity_elems {
        l2_m -= 1;
        if l2_m < 1 {
            l2_m = 1;
            break;
        }
        l2_a_uncached_reads = l2_m * mt_a;
        l2_b_uncached_reads = l2_n * mt_b;
    }

    // Every tile in the block reads its full A row panel and B column panel.
    let l2_a_reads = l2_m * l2_n * mt_a;
    let l2_b_reads = l2_n * l2_m * mt_b;

    let total_reads = (l2_a_reads + l2_b_reads).max(1);
    let total_uncached_reads = l2_a_uncached_reads + l2_b_uncached_reads;
    let cached_reads = total_reads - total_uncached_reads;

    let l2_hit = cached_reads as f64 / total_reads as f64;

    if l2_hit > 1.0 {
        eprintln!(
            "[tilecost] warning: L2 hit rate {l2_hit} exceeds 1 \
             (problem {m}x{n}x{k}, tile {mt_m}x{mt_n}x{mt_k}, \
             block {l2_m}x{l2_n}, cu_per_xcd {cu_per_xcd})"
        );
    }

    l2_hit
}

/// Estimated last-level (MALL) hit rate for one macro-tile iteration.
///
/// Same block-of-tiles reuse model as the L2 estimator, with the block
/// spanning all active CUs rather than one XCD's share, and no capacity
/// bound.
#[allow(clippy::too_many_arguments)]
pub fn estimate_mall_hit(
    hardware: &Hardware,
    m: u64,
    n: u64,
    k: u64,
    batch: u64,
    mt_m: u64,
    mt_n: u64,
    mt_k: u64,
    wgm: u64,
) -> f64 {
    let grid_m = ceil_div(m, mt_m) as i64;
    let grid_n = ceil_div(n, mt_n) as i64;

    let wgm = wgm.max(1) as i64;

    let mut num_cus = active_cu(hardware, m, n, batch, mt_m, mt_n) as i64;
    if grid_m * grid_n * (batch as i64) < num_cus {
        num_cus = grid_m * grid_n * batch as i64 / hardware.num_xcd as i64;
    }

    let mut mall_m = wgm.min(grid_m);
    let mut mall_n = num_cus / wgm;

    if mall_n > grid_n {
        let num_wraps = (mall_n / grid_n) - 1;
        mall_m += num_wraps * wgm;
        mall_n = grid_n;
    }

    mall_m = mall_m.min(grid_m).max(1);
    mall_n = mall_n.min(grid_n).max(1);

    let mt_a = (mt_m * mt_k) as i64;
    let mt_b = (mt_n * mt_k) as i64;

    let mall_a_uncached_reads = mall_m * mt_a;
    let mall_b_uncached_reads = mall_n * mt_b;
    let total_uncached_reads = mall_a_uncached_reads + mall_b_uncached_reads;

    let mall_a_reads = mall_m * mall_n * mt_a;
    let mall_b_reads = mall_n * mall_m * mt_b;

    let total_reads = (mall_a_reads + mall_b_reads).max(1);
    let cached_reads = total_reads - total_uncached_reads;

    let mall_hit = cached_reads as f64 / total_reads as f64;

    if mall_hit > 1.0 {
        eprintln!(
            "[tilecost] warning: MALL hit rate {mall_hit} exceeds 1 \
             (problem {m}x{n}x{k}, tile {mt_m}x{mt_n}x{mt_k}, \
             block {mall_m}x{mall_n})"
        );
    }

    mall_hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Architecture, Hardware};

    fn gfx942_hardware() -> Hardware {
        Hardware::new(
            Architecture::Gfx942,
            304,
            65536,
            8,
            17.0,
            7.3125,
            4.0,
            4 * 1024 * 1024,
            1.8,
            4,
            0.015,
        )
    }

    #[test]
    fn test_l2_hit_in_unit_range() {
        let hw = gfx942_hardware();
        for &wgm in &[1u64, 2, 4, 8, 16, 32] {
            let hit = estimate_l2_hit(&hw, 4096, 4096, 4096, 1, 128, 128, 32, wgm, 16);
            assert!((0.0..=1.0).contains(&hit), "wgm={wgm} hit={hit}");
        }
    }

    #[test]
    fn test_l2_hit_single_tile_grid() {
        let hw = gfx942_hardware();
        // One output tile: the reuse block is 1x1, so nothing is cached.
        let hit = estimate_l2_hit(&hw, 128, 128, 128, 1, 128, 128, 32, 1, 16);
        assert_eq!(hit, 0.0);
    }

    #[test]
    fn test_l2_hit_improves_with_wgm() {
        let hw = gfx942_hardware();
        // WGM=1 keeps the block a single row; a square-ish block reuses more.
        let flat = estimate_l2_hit(&hw, 8192, 8192, 4096, 1, 128, 128, 32, 1, 16);
        let square = estimate_l2_hit(&hw, 8192, 8192, 4096, 1, 128, 128, 32, 8, 16);
        assert!(square > flat, "square={square} flat={flat}");
    }

    #[test]
    fn test_l2_capacity_shrinks_block() {
        let hw = gfx942_hardware();
        // Huge K-slab tiles overflow L2; the block must shrink, not panic,
        // and the rate must stay in range.
        let hit = estimate_l2_hit(&hw, 16384, 16384, 16384, 1, 256, 256, 512, 32, 32);
        assert!((0.0..=1.0).contains(&hit), "hit={hit}");
    }

    #[test]
    fn test_mall_hit_in_unit_range() {
        let hw = gfx942_hardware();
        for &wgm in &[1u64, 4, 8, 32] {
            let hit = estimate_mall_hit(&hw, 4096, 4096, 4096, 1, 128, 128, 32, wgm);
            assert!((0.0..=1.0).contains(&hit), "wgm={wgm} hit={hit}");
        }
    }

    #[test]
    fn test_mall_wgm_zero_treated_as_one() {
        let hw = gfx942_hardware();
        let zero = estimate_mall_hit(&hw, 4096, 4096, 4096, 1, 128, 128, 32, 0);
        let one = estimate_mall_hit(&hw, 4096, 4096, 4096, 1, 128, 128, 32, 1);
        assert_eq!(zero, one);
    }

    #[test]
    fn test_block_wraps_on_narrow_grid() {
        let hw = gfx942_hardware();
        // grid_n = 1 forces the block to wrap into extra M rows.
        let hit = estimate_l2_hit(&hw, 65536, 128, 4096, 1, 128, 128, 32, 4, 16);
        assert!((0.0..=1.0).contains(&hit), "hit={hit}");
        let mall = estimate_mall_hit(&hw, 65536, 128, 4096, 1, 128, 128, 32, 4);
        assert!((0.0..=1.0).contains(&mall), "mall={mall}");
    }
}
