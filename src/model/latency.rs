//! Latency composer: assembles per-tile compute and memory latencies,
//! prologue/epilogue and K-split reduction costs into the whole-problem
//! cycle estimate.
//!
//! The estimate is an ordinal ranking device. Absolute cycle counts can be
//! wildly off; what the model preserves is the relative order of candidate
//! tile configurations on the same problem.

use crate::hardware::Hardware;
use crate::model::cache::{estimate_l2_hit, estimate_mall_hit};
use crate::model::cost::{a_loads, active_cu, b_loads, bw_limit_from_occupancy, ceil_div};
use crate::types::{Problem, TileCandidate};

/// Matrix instructions needed for one `MT_M x MT_N x MT_K` macro-tile.
pub fn matrix_instruction_count(tile: &TileCandidate) -> u64 {
    ceil_div(tile.mt_m, tile.mi_m) * ceil_div(tile.mt_n, tile.mi_n) * ceil_div(tile.mt_k, tile.mi_k)
}

/// Compute latency of one macro-tile, in cycles.
///
/// The base cost is one MI issue latency per matrix instruction. On top of
/// that, layout penalties punish tiles whose contiguous-dimension footprint
/// breaks the 128-byte load granularity: loads from LDS quantize to
/// 128-byte lines, so a misaligned contiguous dimension wastes a fixed
/// fraction of every load.
pub fn mt_compute_latency(hardware: &Hardware, problem: &Problem, tile: &TileCandidate) -> u64 {
    let n_mi = matrix_instruction_count(tile);
    let l_mi = hardware.mi_latency(
        tile.mi_m,
        tile.mi_n,
        tile.mi_k,
        problem.elem_bits_a.max(problem.elem_bits_b),
    );
    let mut l_mt = l_mi * n_mi;

    let bytes_a = ceil_div(problem.elem_bits_a, 8);
    let bytes_b = ceil_div(problem.elem_bits_b, 8);

    // TN: K is the contiguous dimension of both operands; penalize tiles
    // whose K footprint cannot be coalesced.
    if problem.trans_a && !problem.trans_b {
        if tile.mt_k * bytes_a % 128 != 0 {
            l_mt = (l_mt as f64 * 1.5) as u64;
        }
        if tile.mt_k * bytes_b % 128 != 0 {
            l_mt = (l_mt as f64 * 1.5) as u64;
        }
    }

    // NT: A contiguous in M, B contiguous in N.
    if !problem.trans_a && problem.trans_b {
        if tile.mt_m * bytes_a % 128 != 0 {
            l_mt *= 2;
        }
        if tile.mt_n * bytes_b % 128 != 0 {
            l_mt *= 2;
        }
    }

    // TT: A contiguous in K, B contiguous in N.
    if problem.trans_a && problem.trans_b {
        if tile.mt_k * bytes_a < 128 {
            l_mt *= 2;
        }
        if tile.mt_n * bytes_b < 128 {
            l_mt *= 2;
        }
    }

    // NN: A contiguous in M, B contiguous in K.
    if !problem.trans_a && !problem.trans_b {
        if tile.mt_m * bytes_a < 128 {
            l_mt *= 2;
        }
        if tile.mt_k * bytes_b < 128 {
            l_mt *= 2;
        }
    }

    l_mt
}

/// Memory latency of one macro-tile iteration, in cycles.
///
/// Loads drain through three tiers. Each tier's latency is the bytes
/// reaching it divided by its achievable bandwidth, and the slowest tier
/// bounds the iteration. `h_mem1` is the caller's L2 hit estimate; the
/// MALL hit rate is estimated here with an unswizzled (WGM=1) schedule.
pub fn memory_latency(
    hardware: &Hardware,
    problem: &Problem,
    tile: &TileCandidate,
    split: u64,
    h_mem1: f64,
) -> f64 {
    let h_mem2 = estimate_mall_hit(
        hardware, problem.m, problem.n, problem.k, problem.batch, tile.mt_m, tile.mt_n, tile.mt_k,
        1,
    );

    let bytes_a = ceil_div(problem.elem_bits_a, 8);
    let bytes_b = ceil_div(problem.elem_bits_b, 8);

    let ld_a = a_loads(tile.mt_m, tile.mt_k);
    let ld_b = b_loads(tile.mt_n, tile.mt_k);
    let mut ld_cu_bytes = ld_a * bytes_a + ld_b * bytes_b;

    // Block-scaled sub-byte datatypes also load one scale byte per block.
    if problem.elem_bits_a < 8 && problem.mx_block_size != 0 {
        ld_cu_bytes += ceil_div(tile.mt_m * tile.mt_k, problem.mx_block_size);
    }
    if problem.elem_bits_b < 8 && problem.mx_block_size != 0 {
        ld_cu_bytes += ceil_div(tile.mt_m * tile.mt_k, problem.mx_block_size);
    }

    let active = (active_cu(hardware, problem.m, problem.n, problem.batch, tile.mt_m, tile.mt_n)
        * split)
        .min(hardware.n_cu);

    let total_ld = ld_cu_bytes as f64 * active as f64;

    // Tier 1: per-CU cache bandwidth scales with the active fraction.
    let mem1_share = active as f64 / hardware.n_cu as f64;
    let limited_mem1_bw = hardware.mem1_perf_ratio * mem1_share;
    let l_mem1 = if limited_mem1_bw > 0.0 { total_ld / limited_mem1_bw } else { 0.0 };

    // Low occupancy cannot keep enough loads in flight for the outer tiers.
    let bw_limited = bw_limit_from_occupancy(active);

    let mut ld_mem2 = (1.0 - h_mem1) * total_ld;
    let mut ld_mem = (1.0 - h_mem2) * ld_mem2;

    // With a partial wave the whole problem's operand panels must still be
    // fetched at least once.
    if active < hardware.n_cu {
        let min_load =
            (problem.m * tile.mt_k * bytes_a + problem.n * tile.mt_k * bytes_b) as f64;
        ld_mem = ld_mem.max(min_load) * problem.batch as f64;
        ld_mem2 = ld_mem2.max(min_load) * problem.batch as f64;
    }

    // Tier 2.
    let limited_mem2_bw = hardware.mem2_perf_ratio * bw_limited;
    let l_mem2 = if limited_mem2_bw > 0.0 { ld_mem2 / limited_mem2_bw } else { 0.0 };

    // Tier 3, plus the fixed access latency.
    let limited_mem3_bw = hardware.mem3_perf_ratio * bw_limited;
    let mut l_mem3 = if limited_mem3_bw > 0.0 { ld_mem / limited_mem3_bw } else { 0.0 };
    l_mem3 += 200.0;

    let mut l_mem = l_mem1.max(l_mem2).max(l_mem3);

    // Layout penalties, as in the compute path but with the TN case left out.
    if !problem.trans_a && problem.trans_b {
        if tile.mt_m * bytes_a % 128 != 0 {
            l_mem *= 2.0;
        }
        if tile.mt_n * bytes_b % 128 != 0 {
            l_mem *= 2.0;
        }
    }
    if problem.trans_a && problem.trans_b {
        if tile.mt_k * bytes_a < 128 {
            l_mem *= 2.0;
        }
        if tile.mt_n * bytes_b < 128 {
            l_mem *= 2.0;
        }
    }
    if !problem.trans_a && !problem.trans_b {
        if tile.mt_m * bytes_a < 128 {
            l_mem *= 2.0;
        }
        if tile.mt_k * bytes_b < 128 {
            l_mem *= 2.0;
        }
    }

    if Hardware::debug_enabled() {
        hardware.log_debug("problem", problem);
        hardware.log_debug("macro_tile", tile);
        hardware.log_debug("H_mem1", h_mem1);
        hardware.log_debug("H_mem2", h_mem2);
        hardware.log_debug("active_cu", active);
        hardware.log_debug("total_ld_bytes", total_ld);
        hardware.log_debug("L_mem1", l_mem1);
        hardware.log_debug("Ld_mem2_bytes", ld_mem2);
        hardware.log_debug("L_mem2", l_mem2);
        hardware.log_debug("Ld_mem_bytes", ld_mem);
        hardware.log_debug("L_mem3", l_mem3);
        hardware.log_debug("L_mem", l_mem);
        hardware.log_debug("percent_bw_per_wg", hardware.percent_bw_per_wg);
    }

    l_mem
}

/// Latency of one K-complete output tile, in cycles: the steady-state
/// iteration bound times the iteration count, plus prologue, epilogue and
/// per-iteration branch overhead.
pub fn tile_latency(
    hardware: &Hardware,
    problem: &Problem,
    tile: &TileCandidate,
    split: u64,
    h_mem1: f64,
) -> f64 {
    let l_compute = mt_compute_latency(hardware, problem, tile) as f64;
    let l_mem = memory_latency(hardware, problem, tile, split, h_mem1);

    let l_wg_setup = 1.0;
    let l_prologue = 1.5 * l_mem;

    // Epilogue: every active CU writes its output tile through the per-CU
    // cache tier.
    let active = active_cu(hardware, problem.m, problem.n, problem.batch, tile.mt_m, tile.mt_n);
    let epilogue_share = active as f64 / hardware.n_cu as f64;
    let mut limited_mem1 = hardware.mem1_perf_ratio * epilogue_share;
    if limited_mem1 < 1.0 {
        limited_mem1 = 10.0;
    }

    let bytes_out = ceil_div(problem.elem_bits_out, 8);
    let mut l_epilogue = (active * tile.mt_m * tile.mt_n * bytes_out) as f64 / limited_mem1;

    // K-split reductions are globally coherent: split-1 partial tiles are
    // written to and read back from device memory.
    if split > 1 && hardware.mem3_perf_ratio > 0.0 {
        let n_partials = split - 1;
        let partial_readwrite_bytes =
            (2 * active * bytes_out * tile.mt_m * tile.mt_n * n_partials) as f64;
        l_epilogue += partial_readwrite_bytes / hardware.mem3_perf_ratio;
    }

    let l_tile_single = l_compute.max(l_mem);

    // K-iterations excluding the epilogue iteration, shared across the
    // split, at least 1.
    let num_iter = (ceil_div(problem.k, tile.mt_k).saturating_sub(1) / split).max(1);

    let mut l_tile_total = l_tile_single * num_iter as f64
        + l_prologue
        + l_epilogue
        + l_wg_setup
        + (28 * num_iter) as f64; // iteration branch latency

    // Empirical penalty: MT_K=512 kernels underperform their model.
    if tile.mt_k == 512 {
        l_tile_total *= 1.5;
    }

    if Hardware::debug_enabled() {
        hardware.log_debug("L_compute", l_compute);
        hardware.log_debug("L_prologue", l_prologue);
        hardware.log_debug("L_epilogue", l_epilogue);
        hardware.log_debug("num_iter", num_iter);
        hardware.log_debug("L_tile_total", l_tile_total);
    }

    l_tile_total
}

/// Number of waves needed to cover the output grid: one wave is one
/// K-complete tile per CU. The last wave may be partially occupied.
pub fn number_of_waves(hardware: &Hardware, problem: &Problem, tile: &TileCandidate) -> u64 {
    let total_tiles =
        ceil_div(problem.m, tile.mt_m) * ceil_div(problem.n, tile.mt_n) * problem.batch;
    ceil_div(total_tiles, hardware.n_cu)
}

/// Latency of one K-complete wave. Identical to the tile latency: the wave
/// is bounded by its slowest (i.e. any) tile.
pub fn wave_latency(
    hardware: &Hardware,
    problem: &Problem,
    tile: &TileCandidate,
    split: u64,
    h_mem1: f64,
) -> f64 {
    tile_latency(hardware, problem, tile, split, h_mem1)
}

/// Whole-problem latency estimate, in cycles.
///
/// `h_l2` is a seed hit rate only: the model recomputes the L2 hit for the
/// actual WGM-shaped schedule before composing the wave latency.
pub fn total_latency(
    hardware: &Hardware,
    problem: &Problem,
    tile: &TileCandidate,
    split: u64,
    h_l2: f64,
    wgm: u64,
) -> f64 {
    let _ = h_l2;
    let h_mem1 = estimate_l2_hit(
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

    let n_waves = number_of_waves(hardware, problem, tile);
    let l_wave = wave_latency(hardware, problem, tile, split, h_mem1);
    let total = l_wave * n_waves as f64;

    if Hardware::debug_enabled() {
        hardware.log_debug("N_waves", n_waves);
        hardware.log_debug("total_latency", total);
        hardware.print_debug_info();
    }

    total
}

/// Convert a latency estimate into TFLOPS at the given compute clock.
///
/// Useful for eyeballing results; the model only guarantees ordering, not
/// absolute throughput.
pub fn tflops_from_latency(latency_cycles: f64, m: u64, n: u64, k: u64, clock_ghz: f64) -> f64 {
    let total_flops = 2.0 * m as f64 * n as f64 * k as f64;
    let cycles_per_second = clock_ghz * 1e9;
    let total_time_seconds = latency_cycles / cycles_per_second;
    total_flops / total_time_seconds / 1e12
}

/// Predicted GFLOPS for a candidate on this hardware (split=1).
pub fn perf_gflops(hardware: &Hardware, problem: &Problem, tile: &TileCandidate, wgm: u64) -> f64 {
    let latency = total_latency(hardware, problem, tile, 1, 0.0, wgm);
    let total_flops = 2.0 * problem.m as f64 * problem.n as f64 * problem.k as f64;
    let cycles_per_second = hardware.compute_clock_ghz * 1e9;
    total_flops / (latency / cycles_per_second) / 1e9
}
