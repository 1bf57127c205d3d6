//! Primitive cost kernels: the small arithmetic building blocks every
//! latency estimate is assembled from.

use crate::hardware::Hardware;

/// Performs `(n + d - 1) / d` without the overflow in `n + d - 1`.
/// Division by zero yields 0.
pub fn ceil_div(n: u64, d: u64) -> u64 {
    if d == 0 {
        0
    } else {
        n / d + u64::from(n % d != 0)
    }
}

/// FLOPs per byte moved for an `m x n x k` GEMM.
pub fn arithmetic_intensity(m: f64, n: f64, k: f64, bytes_per_element: f64) -> f64 {
    let numerator = 2.0 * m * n * k;
    let denominator = (m * n + n * k + m * k) * bytes_per_element;
    numerator / denominator
}

/// Elements loaded from A to produce one macro-tile.
pub fn a_loads(mt_m: u64, mt_k: u64) -> u64 {
    mt_m * mt_k
}

/// Elements loaded from B to produce one macro-tile.
pub fn b_loads(mt_n: u64, mt_k: u64) -> u64 {
    mt_n * mt_k
}

/// Total elements a CU loads per macro-tile iteration.
/// Reads happen every macro-tile; writes only per K-complete tile.
pub fn cu_loads(mt_m: u64, mt_n: u64, mt_k: u64) -> u64 {
    a_loads(mt_m, mt_k) + b_loads(mt_n, mt_k)
}

/// Number of CUs doing work: the full device, unless the output grid is a
/// single partial wave.
pub fn active_cu(hardware: &Hardware, m: u64, n: u64, batch: u64, mt_m: u64, mt_n: u64) -> u64 {
    let total_output_tiles = ceil_div(m, mt_m) * ceil_div(n, mt_n) * batch;
    total_output_tiles.min(hardware.n_cu)
}

/// Achievable fraction of memory bandwidth given CU occupancy: below 100
/// active CUs the device cannot issue enough outstanding loads.
pub fn bw_limit_from_occupancy(active_cu: u64) -> f64 {
    if active_cu < 100 {
        (active_cu as f64 * 0.008).min(1.0)
    } else {
        1.0
    }
}

/// Whether the A and B tiles of a candidate fit in LDS.
pub fn fits_in_lds(hardware: &Hardware, mt_m: u64, mt_n: u64, mt_k: u64, elem_bits: u64) -> bool {
    let lds_usage = cu_loads(mt_m, mt_n, mt_k) * (elem_bits / 8);
    lds_usage <= hardware.lds_capacity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{Architecture, Hardware};

    fn test_hardware(n_cu: u64) -> Hardware {
        Hardware::new(
            Architecture::Gfx942,
            n_cu,
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
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 4), 0);
        assert_eq!(ceil_div(1, 4), 1);
        assert_eq!(ceil_div(4, 4), 1);
        assert_eq!(ceil_div(5, 4), 2);
        assert_eq!(ceil_div(7, 0), 0);
        // Robust near the top of the u64 range.
        assert_eq!(ceil_div(u64::MAX, 2), u64::MAX / 2 + 1);
    }

    #[test]
    fn test_arithmetic_intensity() {
        // Square fp16 GEMM: 2mnk / (3m^2 * 2) = m / 3.
        let ai = arithmetic_intensity(384.0, 384.0, 384.0, 2.0);
        assert!((ai - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_loads() {
        assert_eq!(a_loads(128, 32), 4096);
        assert_eq!(b_loads(128, 32), 4096);
        assert_eq!(cu_loads(128, 128, 32), 8192);
    }

    #[test]
    fn test_active_cu_partial_wave() {
        let hw = test_hardware(304);
        // 4 x 4 x 1 = 16 output tiles: partial wave.
        assert_eq!(active_cu(&hw, 512, 512, 1, 128, 128), 16);
        // 32 x 32 x 1 = 1024 tiles: full device.
        assert_eq!(active_cu(&hw, 4096, 4096, 1, 128, 128), 304);
        // Batch multiplies the tile count.
        assert_eq!(active_cu(&hw, 512, 512, 8, 128, 128), 128);
    }

    #[test]
    fn test_bw_limit_from_occupancy() {
        assert!((bw_limit_from_occupancy(50) - 0.4).abs() < 1e-12);
        assert_eq!(bw_limit_from_occupancy(100), 1.0);
        assert_eq!(bw_limit_from_occupancy(304), 1.0);
        assert_eq!(bw_limit_from_occupancy(0), 0.0);
    }

    #[test]
    fn test_lds_capacity_check() {
        let hw = test_hardware(304);
        // 128x128x32 @ 16 bits: (4096 + 4096) * 2 = 16 KiB, fits in 64 KiB.
        assert!(fits_in_lds(&hw, 128, 128, 32, 16));
        // 256x256x128 @ 16 bits: (32768 + 32768) * 2 = 128 KiB, does not.
        assert!(!fits_in_lds(&hw, 256, 256, 128, 16));
    }
}
