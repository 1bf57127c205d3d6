//! Property-based tests for the cost model.
//!
//! Uses proptest to verify invariants that must hold for all inputs:
//! - ceil_div bracketing
//! - active-CU bounds
//! - hit-rate range
//! - latency monotonicity in K
//! - wave-product decomposition at split=1
//! - Stream-K peer accounting in the even-split case
//! - device-catalog membership

use proptest::prelude::*;

use tilecost::model::cache::{estimate_l2_hit, estimate_mall_hit};
use tilecost::model::cost::{active_cu, ceil_div};
use tilecost::model::latency::{number_of_waves, total_latency, wave_latency};
use tilecost::model::stream_k;
use tilecost::{Architecture, GpuDevice, Hardware, Problem, Processor, TileCandidate};

fn mi300x_like() -> Hardware {
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

/// Plausible macro-tile shapes: MI-aligned powers of two.
fn arb_tile() -> impl Strategy<Value = TileCandidate> {
    (0u32..4, 0u32..4, 0u32..3, 1u64..=4).prop_map(|(em, en, ek, occ)| {
        TileCandidate::new(32 << em, 32 << en, 8 << ek, 32, 32, 8, occ)
    })
}

fn arb_dims() -> impl Strategy<Value = (u64, u64, u64, u64)> {
    (1u64..=8192, 1u64..=8192, 1u64..=8192, 1u64..=4)
}

proptest! {
    /// `ceil_div(n, d) * d` brackets `n` for d > 0, and d = 0 yields 0.
    #[test]
    fn prop_ceil_div_brackets(n in 0u64..=1 << 62, d in 1u64..=1 << 32) {
        let q = ceil_div(n, d);
        prop_assert!(q * d >= n);
        prop_assert!(q == 0 || (q - 1) * d < n);
        prop_assert_eq!(ceil_div(n, 0), 0);
    }

    /// The active-CU count never exceeds the device and is at least 1 for a
    /// non-empty problem.
    #[test]
    fn prop_active_cu_bounds((m, n, _k, batch) in arb_dims(), tile in arb_tile()) {
        let hw = mi300x_like();
        let cu = active_cu(&hw, m, n, batch, tile.mt_m, tile.mt_n);
        prop_assert!(cu >= 1);
        prop_assert!(cu <= hw.n_cu);
    }

    /// Hit-rate estimators stay within [0, 1] across shapes and mappings.
    #[test]
    fn prop_hit_rates_in_unit_interval(
        (m, n, k, batch) in arb_dims(),
        tile in arb_tile(),
        wgm in 0u64..=64,
        elem_bits in prop::sample::select(vec![4u64, 6, 8, 16, 32, 64]),
    ) {
        let hw = mi300x_like();
        let l2 = estimate_l2_hit(&hw, m, n, k, batch, tile.mt_m, tile.mt_n, tile.mt_k, wgm, elem_bits);
        prop_assert!((0.0..=1.0).contains(&l2), "l2={}", l2);
        let mall = estimate_mall_hit(&hw, m, n, k, batch, tile.mt_m, tile.mt_n, tile.mt_k, wgm);
        prop_assert!((0.0..=1.0).contains(&mall), "mall={}", mall);
    }

    /// With everything else fixed, more K never predicts fewer cycles.
    #[test]
    fn prop_latency_monotone_in_k(
        (m, n, _k, batch) in arb_dims(),
        tile in arb_tile(),
        k_tiles in 1u64..=64,
        trans in (any::<bool>(), any::<bool>()),
    ) {
        let hw = mi300x_like();
        let mut p = Problem::new(m, n, tile.mt_k * k_tiles, batch, trans.0, trans.1, 16);
        let smaller = total_latency(&hw, &p, &tile, 1, 0.0, 8);
        p.k += tile.mt_k;
        let larger = total_latency(&hw, &p, &tile, 1, 0.0, 8);
        prop_assert!(larger >= smaller, "k+: {} < {}", larger, smaller);
    }

    /// At split=1 the total is exactly the wave latency times the wave count.
    #[test]
    fn prop_split_one_is_wave_product((m, n, k, batch) in arb_dims(), tile in arb_tile()) {
        let hw = mi300x_like();
        let p = Problem::new(m, n, k, batch, false, true, 16);
        let wgm = 8;

        let h_l2 = estimate_l2_hit(&hw, p.m, p.n, p.k, p.batch, tile.mt_m, tile.mt_n, tile.mt_k, wgm, p.elem_bits_a);
        let expected = wave_latency(&hw, &p, &tile, 1, h_l2) * number_of_waves(&hw, &p, &tile) as f64;
        let total = total_latency(&hw, &p, &tile, 1, 0.0, wgm);
        prop_assert!((total - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    /// When the iteration space divides evenly into whole tiles per CTA,
    /// exactly one peer covers each output tile.
    #[test]
    fn prop_stream_k_even_split_single_peer(
        tiles_per_cta in 1u64..=32,
        iters_per_tile in 1u64..=128,
        g in 1u64..=304,
    ) {
        let iters_total = g * tiles_per_cta * iters_per_tile;
        let iters_per_cta = stream_k::num_iters_per_cta(iters_total, g);
        prop_assert_eq!(
            stream_k::num_fixup_peers_v2(g, iters_total, iters_per_tile, iters_per_cta),
            1
        );
    }

    /// `is_standard_cu` is exactly complement-of-membership in the
    /// non-standard table.
    #[test]
    fn prop_standard_cu_membership(cus in 1u64..=512) {
        let dev = GpuDevice::new(Processor::Gfx942, cus, "test");
        let expected = ![20, 38, 64, 80, 228].contains(&cus);
        prop_assert_eq!(dev.is_standard_cu(), expected);

        let dev = GpuDevice::new(Processor::Gfx90a, cus, "test");
        prop_assert_eq!(dev.is_standard_cu(), cus != 104);
    }
}
