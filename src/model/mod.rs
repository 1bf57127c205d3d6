//! The analytical cost model.
//!
//! ```text
//! cost      -- primitive arithmetic building blocks
//! cache     -- L2 / MALL hit-rate estimators (block-of-tiles reuse model)
//! latency   -- per-tile and whole-problem latency composition
//! search    -- candidate ranking, tie-breakers, K-split and WGM selection
//! stream_k  -- Stream-K processor-grid predictor
//! ```
//!
//! Everything here is pure computation: no I/O, no threads, deterministic
//! for a given `Hardware` and `Problem`. Latency values are ordinal; they
//! rank candidate configurations, they do not predict wall-clock time.

pub mod cache;
pub mod cost;
pub mod latency;
pub mod search;
pub mod stream_k;

pub use cache::{estimate_l2_hit, estimate_mall_hit};
pub use cost::{active_cu, arithmetic_intensity, bw_limit_from_occupancy, ceil_div, fits_in_lds};
pub use latency::{memory_latency, mt_compute_latency, tile_latency, total_latency};
pub use search::{
    select_best_grid_size, select_best_macro_tile_size, select_best_wgm, sweep_macro_tile_sizes,
};
pub use stream_k::best_predicted_grid_size;
