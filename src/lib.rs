//! tilecost: analytical GEMM cost model and macro-tile search for GPU
//! matrix kernels.
//!
//! Given a problem shape and a hardware description, the model estimates
//! the execution latency of a hypothetical GEMM kernel for any combination
//! of macro-tile shape, matrix-instruction shape, K-split factor and
//! workgroup mapping, and selects the best combination. Estimates are
//! ordinal: they rank candidates reliably, they are not a timing oracle.
//!
//! Set `ANALYTICAL_GEMM_DEBUG=1` to dump model internals to stderr.

pub mod device;
pub mod hardware;
pub mod model;
pub mod types;

pub use device::{GpuDevice, Processor};
pub use hardware::{
    Architecture, ArchitectureConstants, DeviceProperties, Hardware, MatrixInstruction,
};
pub use model::search::{
    select_best_grid_size, select_best_macro_tile_size, select_best_wgm, sweep_macro_tile_sizes,
};
pub use model::latency::total_latency;
pub use model::stream_k::best_predicted_grid_size;
pub use types::{ModelError, Problem, RankedTile, TileCandidate};
