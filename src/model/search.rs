//! Candidate search: rank macro-tile configurations by predicted latency,
//! break ties, and choose K-split grid size and workgroup mapping.

use crate::hardware::Hardware;
use crate::model::cost::{ceil_div, fits_in_lds};
use crate::model::cache::estimate_l2_hit;
use crate::model::latency::total_latency;
use crate::types::{ModelError, Problem, RankedTile, TileCandidate};

/// Latencies closer than this (in cycles) are considered tied; the
/// arithmetic-intensity tie-breaker decides between them.
const TIE_EPSILON_CYCLES: f64 = 10.0;

/// FLOPs per element moved for a macro-tile shape.
fn tile_arithmetic_intensity(tile: &TileCandidate) -> f64 {
    let flops = 2.0 * (tile.mt_m * tile.mt_n * tile.mt_k) as f64;
    let memory_traffic =
        (tile.mt_m * tile.mt_k + tile.mt_n * tile.mt_k + tile.mt_m * tile.mt_n) as f64;
    if memory_traffic == 0.0 {
        return 0.0;
    }
    flops / memory_traffic
}

/// Reorder tiles by descending arithmetic intensity. Applied to a group of
/// latency-tied candidates: when the model cannot distinguish them, prefer
/// the one that does more math per byte moved.
pub fn sort_tiles_by_arithmetic_intensity(tiles: &mut [RankedTile]) {
    tiles.sort_by(|a, b| {
        tile_arithmetic_intensity(&b.tile)
            .partial_cmp(&tile_arithmetic_intensity(&a.tile))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Alternative tie-breaker: prefer the tile that is largest along the
/// problem's dominant dimension (the larger of M and N), then the other,
/// then K. Used when dimension asymmetry is known to dominate.
pub fn pick_best_tile_with_dimension_priority<'a>(
    tiles: &'a [RankedTile],
    m: u64,
    n: u64,
) -> Option<&'a RankedTile> {
    let key = |t: &TileCandidate| -> (u64, u64, u64) {
        if m >= n {
            (t.mt_m, t.mt_n, t.mt_k)
        } else {
            (t.mt_n, t.mt_m, t.mt_k)
        }
    };
    tiles.iter().max_by_key(|r| key(&r.tile))
}

/// Rank every LDS-viable candidate by predicted latency (ascending), with
/// the arithmetic-intensity tie-breaker applied to the leading tie group.
///
/// Returns the full ranking; callers typically keep the head. Errors with
/// `NoViableTile` when the scratchpad check rejects every candidate.
pub fn select_best_macro_tile_size(
    problem: &Problem,
    hardware: &Hardware,
    candidates: &[TileCandidate],
    h_l2: f64,
    wgm: u64,
) -> Result<Vec<RankedTile>, ModelError> {
    let mut valid_results: Vec<RankedTile> = Vec::with_capacity(candidates.len());

    for tile in candidates {
        if !fits_in_lds(hardware, tile.mt_m, tile.mt_n, tile.mt_k, problem.elem_bits_a) {
            log::debug!("skipping {tile}: exceeds LDS capacity");
            continue;
        }
        let latency = total_latency(hardware, problem, tile, 1, h_l2, wgm);
        log::debug!("evaluated {tile}: {latency:.1} cycles");
        valid_results.push(RankedTile { latency, tile: *tile });
    }

    if valid_results.is_empty() {
        return Err(ModelError::NoViableTile);
    }

    valid_results.sort_by(|a, b| {
        a.latency.partial_cmp(&b.latency).unwrap_or(std::cmp::Ordering::Equal)
    });

    // Candidates within the epsilon of the best latency are a tie group.
    let best_latency = valid_results[0].latency;
    let num_tied = valid_results
        .iter()
        .take_while(|r| (r.latency - best_latency).abs() < TIE_EPSILON_CYCLES)
        .count();

    sort_tiles_by_arithmetic_intensity(&mut valid_results[..num_tied]);

    Ok(valid_results)
}

/// Rank candidates with a caller-supplied tie-breaker score (higher wins)
/// applied to the group tied for best latency.
pub fn rank_macro_tile_sizes<F>(
    problem: &Problem,
    hardware: &Hardware,
    candidates: &[TileCandidate],
    h_l2: f64,
    wgm: u64,
    tie_breaker: F,
) -> Result<Vec<RankedTile>, ModelError>
where
    F: Fn(&TileCandidate, &Hardware) -> f64,
{
    let mut results = select_best_macro_tile_size(problem, hardware, candidates, h_l2, wgm)?;

    let best_latency = results[0].latency;
    let num_tied = results
        .iter()
        .take_while(|r| (r.latency - best_latency).abs() < TIE_EPSILON_CYCLES)
        .count();

    results[..num_tied].sort_by(|a, b| {
        tie_breaker(&b.tile, hardware)
            .partial_cmp(&tie_breaker(&a.tile, hardware))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(results)
}

/// Enumerate macro-tile candidates on a step grid (MI-aligned shapes only),
/// append `extra_tiles`, and rank the lot.
#[allow(clippy::too_many_arguments)]
pub fn sweep_macro_tile_sizes(
    problem: &Problem,
    hardware: &Hardware,
    mi: (u64, u64, u64),
    occupancy: u64,
    max_mt: (u64, u64, u64),
    step_mt: (u64, u64, u64),
    h_l2: f64,
    wgm: u64,
    extra_tiles: &[TileCandidate],
) -> Result<Vec<RankedTile>, ModelError> {
    let (mi_m, mi_n, mi_k) = mi;
    let (max_m, max_n, max_k) = max_mt;
    let (step_m, step_n, step_k) = step_mt;

    if step_m == 0 || step_n == 0 || step_k == 0 {
        return select_best_macro_tile_size(problem, hardware, extra_tiles, h_l2, wgm);
    }

    let mut candidates = Vec::new();
    let mut mt_m = step_m;
    while mt_m <= max_m {
        let mut mt_n = step_n;
        while mt_n <= max_n {
            let mut mt_k = step_k;
            while mt_k <= max_k {
                if mt_m % mi_m == 0 && mt_n % mi_n == 0 && mt_k % mi_k == 0 {
                    candidates.push(TileCandidate::new(mt_m, mt_n, mt_k, mi_m, mi_n, mi_k, occupancy));
                }
                mt_k += step_k;
            }
            mt_n += step_n;
        }
        mt_m += step_m;
    }
    candidates.extend_from_slice(extra_tiles);

    log::debug!("sweeping {} macro-tile candidates", candidates.len());
    select_best_macro_tile_size(problem, hardware, &candidates, h_l2, wgm)
}

/// Choose the K-split factor minimizing predicted latency and return the
/// resulting grid size (`best_split * output_tiles`).
///
/// The split is bounded by `biggest_allowable_split` and by how many splits
/// the device can host (`n_cu / output_tiles`; zero when the output grid
/// already oversubscribes the device, in which case the search keeps
/// split=1).
pub fn select_best_grid_size(
    problem: &Problem,
    hardware: &Hardware,
    tile: &TileCandidate,
    h_l2: f64,
    wgm: u64,
    biggest_allowable_split: u64,
) -> u64 {
    let grid = ceil_div(problem.m, tile.mt_m) * ceil_div(problem.n, tile.mt_n) * problem.batch;
    if grid == 0 {
        return 0;
    }

    let max_hw_split = hardware.n_cu / grid;
    let max_split = biggest_allowable_split.min(max_hw_split);

    let mut best_split = 1;
    let mut best_latency = f64::INFINITY;

    for split in 1..=max_split {
        let latency = total_latency(hardware, problem, tile, split, h_l2, wgm);
        log::debug!("split {split}: {latency:.1} cycles");
        if latency < best_latency {
            best_latency = latency;
            best_split = split;
        }
    }

    best_split * grid
}

/// Choose the WGM maximizing the estimated L2 hit rate over `wgm_list`.
/// Returns `(best_hit, best_wgm)`; the first maximum wins ties.
pub fn select_best_wgm(
    problem: &Problem,
    hardware: &Hardware,
    tile: &TileCandidate,
    wgm_list: &[u64],
) -> Result<(f64, u64), ModelError> {
    let mut best: Option<(f64, u64)> = None;

    for &wgm in wgm_list {
        if !fits_in_lds(hardware, tile.mt_m, tile.mt_n, tile.mt_k, problem.elem_bits_a) {
            log::debug!("skipping WGM={wgm}: tile exceeds LDS capacity");
            continue;
        }

        let hit = estimate_l2_hit(
            hardware,
            problem.m,
            problem.n,
            problem.k,
            problem.batch,
            tile.mt_m,
            tile.mt_n,
            tile.mt_k,
            wgm,
            problem.elem_bits_a,
        );
        log::debug!("WGM={wgm}: L2 hit {hit:.4}");

        match best {
            Some((best_hit, _)) if hit <= best_hit => {}
            _ => best = Some((hit, wgm)),
        }
    }

    best.ok_or(ModelError::NoViableWgm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Architecture;

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

    fn fp16_problem() -> Problem {
        let mut p = Problem::new(4096, 4096, 4096, 1, false, true, 16);
        p.elem_bits_out = 32;
        p
    }

    #[test]
    fn test_search_ranks_ascending() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let candidates = [
            TileCandidate::new(128, 128, 32, 32, 32, 8, 2),
            TileCandidate::new(256, 128, 32, 32, 32, 8, 1),
            TileCandidate::new(64, 64, 32, 32, 32, 8, 4),
            TileCandidate::new(256, 256, 32, 32, 32, 8, 1),
        ];
        let ranked = select_best_macro_tile_size(&p, &hw, &candidates, 0.8, 8).unwrap();
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            // Outside the tie group the ordering is by latency; inside it
            // latencies differ by less than the epsilon either way.
            assert!(pair[1].latency - pair[0].latency > -super::TIE_EPSILON_CYCLES);
        }
    }

    #[test]
    fn test_search_filters_oversized_tiles() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let candidates = [
            TileCandidate::new(128, 128, 32, 32, 32, 8, 2),
            // 256x256x128 @ 2B = 128 KiB of LDS: rejected.
            TileCandidate::new(256, 256, 128, 32, 32, 8, 1),
        ];
        let ranked = select_best_macro_tile_size(&p, &hw, &candidates, 0.8, 8).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].tile.mt_m, 128);
    }

    #[test]
    fn test_search_no_viable_tile() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let candidates = [TileCandidate::new(512, 512, 64, 32, 32, 8, 1)];
        match select_best_macro_tile_size(&p, &hw, &candidates, 0.8, 8) {
            Err(ModelError::NoViableTile) => {}
            other => panic!("expected NoViableTile, got {other:?}"),
        }
    }

    #[test]
    fn test_tie_break_prefers_higher_intensity() {
        let t1 = TileCandidate::new(128, 128, 32, 32, 32, 8, 2);
        let t2 = TileCandidate::new(256, 128, 32, 32, 32, 8, 1);
        assert!(tile_arithmetic_intensity(&t2) > tile_arithmetic_intensity(&t1));

        let mut tied = vec![
            RankedTile { latency: 100.0, tile: t1 },
            RankedTile { latency: 100.0, tile: t2 },
        ];
        sort_tiles_by_arithmetic_intensity(&mut tied);
        assert_eq!(tied[0].tile, t2);
    }

    #[test]
    fn test_dimension_priority_tie_breaker() {
        let tiles = vec![
            RankedTile { latency: 100.0, tile: TileCandidate::new(128, 256, 32, 32, 32, 8, 1) },
            RankedTile { latency: 100.0, tile: TileCandidate::new(256, 128, 32, 32, 32, 8, 1) },
        ];
        // M dominates: prefer the larger MT_M.
        let best = pick_best_tile_with_dimension_priority(&tiles, 8192, 4096).unwrap();
        assert_eq!(best.tile.mt_m, 256);
        // N dominates: prefer the larger MT_N.
        let best = pick_best_tile_with_dimension_priority(&tiles, 4096, 8192).unwrap();
        assert_eq!(best.tile.mt_n, 256);
        assert!(pick_best_tile_with_dimension_priority(&[], 1, 1).is_none());
    }

    #[test]
    fn test_rank_with_custom_tie_breaker() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let candidates = [
            TileCandidate::new(128, 128, 32, 32, 32, 8, 2),
            TileCandidate::new(128, 128, 64, 32, 32, 8, 2),
        ];
        // Score by MT_K: deeper tiles win ties.
        let ranked =
            rank_macro_tile_sizes(&p, &hw, &candidates, 0.8, 8, |t, _| t.mt_k as f64).unwrap();
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_sweep_produces_aligned_candidates() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let ranked = sweep_macro_tile_sizes(
            &p,
            &hw,
            (32, 32, 8),
            2,
            (256, 256, 64),
            (64, 64, 32),
            0.8,
            8,
            &[],
        )
        .unwrap();
        assert!(!ranked.is_empty());
        for r in &ranked {
            assert_eq!(r.tile.mt_m % 32, 0);
            assert_eq!(r.tile.mt_n % 32, 0);
            assert_eq!(r.tile.mt_k % 8, 0);
        }
    }

    #[test]
    fn test_grid_size_search_bounds() {
        let hw = gfx942_hardware();
        // 640x512 output with 128x128 tiles: 5*4 = 20 tiles, so the device
        // could host up to 15 splits, capped at 8 by the caller.
        let mut p = fp16_problem();
        p.m = 640;
        p.n = 512;
        let tile = TileCandidate::new(128, 128, 32, 32, 32, 8, 2);
        let grid = select_best_grid_size(&p, &hw, &tile, 0.8, 8, 8);
        assert_eq!(grid % 20, 0);
        assert!(grid >= 20 && grid <= 20 * 8);
    }

    #[test]
    fn test_grid_size_oversubscribed_keeps_split_one() {
        let hw = gfx942_hardware();
        // 1024 output tiles on 304 CUs: no split fits, the loop runs zero
        // iterations and split stays 1.
        let p = fp16_problem();
        let tile = TileCandidate::new(128, 128, 32, 32, 32, 8, 2);
        let grid = select_best_grid_size(&p, &hw, &tile, 0.8, 8, 8);
        assert_eq!(grid, 32 * 32);
    }

    #[test]
    fn test_wgm_selection() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let tile = TileCandidate::new(128, 128, 32, 32, 32, 8, 2);
        let (hit, wgm) = select_best_wgm(&p, &hw, &tile, &[1, 2, 4, 8, 16]).unwrap();
        assert!((0.0..=1.0).contains(&hit));
        assert!([1, 2, 4, 8, 16].contains(&wgm));

        // The winner's hit rate matches a direct estimate.
        let direct = estimate_l2_hit(&hw, p.m, p.n, p.k, p.batch, tile.mt_m, tile.mt_n, tile.mt_k, wgm, p.elem_bits_a);
        assert_eq!(hit, direct);
    }

    #[test]
    fn test_wgm_empty_list_errors() {
        let hw = gfx942_hardware();
        let p = fp16_problem();
        let tile = TileCandidate::new(128, 128, 32, 32, 32, 8, 2);
        match select_best_wgm(&p, &hw, &tile, &[]) {
            Err(ModelError::NoViableWgm) => {}
            other => panic!("expected NoViableWgm, got {other:?}"),
        }
    }
}
