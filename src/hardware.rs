//! GPU hardware description for the analytical cost model.
//!
//! Combines static per-architecture constants (memory-tier bandwidth ratios,
//! matrix-instruction issue latencies, XCD partitioning) with device-reported
//! quantities (CU count, LDS and L2 capacity, clocks) into a single immutable
//! `Hardware` value consumed by every latency estimate.
//!
//! The bandwidth ratios and issue latencies were obtained through
//! microbenchmarking; they are ordinal calibration data, not datasheet
//! numbers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

use crate::types::ModelError;

// ── Matrix-instruction key ─────────────────────────────────────────────

/// Shape of a single hardware matrix-multiply-accumulate instruction,
/// together with the element width it operates on (in bits).
///
/// Used as the lookup key for per-architecture issue latencies. Ordering is
/// lexicographic on `(mi_m, mi_n, mi_k, elem_bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixInstruction {
    pub mi_m: u64,
    pub mi_n: u64,
    pub mi_k: u64,
    pub elem_bits: u64,
}

impl MatrixInstruction {
    pub const fn new(mi_m: u64, mi_n: u64, mi_k: u64, elem_bits: u64) -> Self {
        MatrixInstruction { mi_m, mi_n, mi_k, elem_bits }
    }
}

impl fmt::Display for MatrixInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}@{}b", self.mi_m, self.mi_n, self.mi_k, self.elem_bits)
    }
}

// ── Architecture constants ─────────────────────────────────────────────

/// GPU architectures the model is calibrated for.
///
/// `Count` is the sentinel for an unrecognized architecture string; building
/// a `Hardware` from it fails with `ModelError::UnsupportedArchitecture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Gfx942,
    Gfx950,
    Count,
}

impl Architecture {
    /// Parse a `gcnArchName`-style string, e.g. `"gfx942:sramecc+:xnack-"`.
    /// Everything after the first ':' is ignored.
    pub fn from_gcn_arch_name(name: &str) -> Architecture {
        let base = match name.find(':') {
            Some(pos) => &name[..pos],
            None => name,
        };
        match base {
            "gfx942" => Architecture::Gfx942,
            "gfx950" => Architecture::Gfx950,
            _ => Architecture::Count,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::Gfx942 => "gfx942",
            Architecture::Gfx950 => "gfx950",
            Architecture::Count => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Microbenchmark-derived constants for one architecture.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureConstants {
    /// Number of accelerator complex dies the device is partitioned into.
    pub num_xcds: u64,
    /// Per-CU cache bandwidth ratio (dimensionless).
    pub mem1_perf_ratio: f64,
    /// Last-level cache bandwidth ratio.
    pub mem2_perf_ratio: f64,
    /// Device memory bandwidth ratio.
    pub mem3_perf_ratio: f64,
    /// Matrix instructions a CU issues in parallel.
    pub parallel_mi_cu: u64,
    /// Per-workgroup share of bandwidth.
    pub percent_bw_per_wg: f64,
    /// Scaling factor applied to the reported memory clock.
    pub mem_clock_ratio: f64,
}

const GFX942_CONSTANTS: ArchitectureConstants = ArchitectureConstants {
    num_xcds: 8,
    mem1_perf_ratio: 17.0,
    mem2_perf_ratio: 1.21875121875121875122 * 6.0,
    mem3_perf_ratio: 4.0,
    parallel_mi_cu: 4,
    percent_bw_per_wg: 1.5e-2,
    mem_clock_ratio: 1.5,
};

const GFX950_CONSTANTS: ArchitectureConstants = ArchitectureConstants {
    num_xcds: 8,
    mem1_perf_ratio: 17.0,
    mem2_perf_ratio: 1.21875121875121875122 * 7.0,
    mem3_perf_ratio: 6.0,
    parallel_mi_cu: 4,
    percent_bw_per_wg: 0.008,
    mem_clock_ratio: 1.5,
};

/// Constants for `arch`, or `None` for the `Count` sentinel.
pub fn architecture_constants(arch: Architecture) -> Option<&'static ArchitectureConstants> {
    match arch {
        Architecture::Gfx942 => Some(&GFX942_CONSTANTS),
        Architecture::Gfx950 => Some(&GFX950_CONSTANTS),
        Architecture::Count => None,
    }
}

// ── Instruction-latency tables ─────────────────────────────────────────
//
// Issue cycles per MFMA shape, before dividing by the per-CU parallelism.
// The tables must stay exactly as calibrated: the search only needs the
// relative order of candidates, and these values set it.

const GFX942_MI_LATENCIES: &[(MatrixInstruction, u64)] = &[
    (MatrixInstruction::new(16, 16, 1, 32), 32), // v_mfma_f32_16x16x1_4b_f32
    (MatrixInstruction::new(16, 16, 4, 32), 32), // v_mfma_f32_16x16x4_f32
    (MatrixInstruction::new(16, 16, 4, 64), 32), // v_mfma_f64_16x16x4_f64
    (MatrixInstruction::new(4, 4, 4, 16), 8),    // v_mfma_f32_4x4x4_16b_f16
    (MatrixInstruction::new(32, 32, 2, 32), 64), // v_mfma_f32_32x32x2_f32
    (MatrixInstruction::new(16, 16, 4, 16), 32), // v_mfma_f32_16x16x4_4b_f16
    (MatrixInstruction::new(32, 32, 4, 8), 64),  // v_mfma_i32_32x32x4_2b_i8
    (MatrixInstruction::new(32, 32, 16, 8), 32), // v_mfma_i32_32x32x16_i8
    (MatrixInstruction::new(4, 4, 4, 64), 16),   // v_mfma_f64_4x4x4_4b_f64
    (MatrixInstruction::new(32, 32, 1, 32), 64), // v_mfma_f32_32x32x1_2b_f32
    (MatrixInstruction::new(32, 32, 8, 16), 32), // v_mfma_f32_32x32x8_f16
    (MatrixInstruction::new(16, 16, 16, 16), 16), // v_mfma_f32_16x16x16_f16/bf16
    (MatrixInstruction::new(32, 32, 4, 16), 64), // v_mfma_f32_32x32x4_2b_f16
    (MatrixInstruction::new(4, 4, 1, 32), 8),    // v_mfma_f32_4x4x1_16b_f32
    (MatrixInstruction::new(16, 16, 32, 8), 16), // v_mfma_i32_16x16x32_i8
    (MatrixInstruction::new(4, 4, 4, 8), 8),     // v_mfma_i32_4x4x4_16b_i8
    (MatrixInstruction::new(32, 32, 4, 32), 32), // v_mfma_f32_32x32x4_xf32
    (MatrixInstruction::new(16, 16, 4, 8), 32),  // v_mfma_i32_16x16x4_4b_i8
    (MatrixInstruction::new(16, 16, 8, 32), 16), // v_mfma_f32_16x16x8_xf32
    (MatrixInstruction::new(16, 16, 32, 32), 16),
];

const GFX950_MI_LATENCIES: &[(MatrixInstruction, u64)] = &[
    (MatrixInstruction::new(16, 16, 32, 8), 16), // v_mfma_i32_16x16x32_i8
    (MatrixInstruction::new(16, 16, 1, 32), 32), // v_mfma_f32_16x16x1_4b_f32
    (MatrixInstruction::new(16, 16, 4, 32), 32), // v_mfma_f32_16x16x4_f32
    (MatrixInstruction::new(16, 16, 4, 64), 32), // v_mfma_f64_16x16x4_f64
    (MatrixInstruction::new(4, 4, 4, 16), 8),    // v_mfma_f32_4x4x4_16b_f16
    (MatrixInstruction::new(32, 32, 2, 32), 64), // v_mfma_f32_32x32x2_f32
    (MatrixInstruction::new(16, 16, 4, 16), 32), // v_mfma_f32_16x16x4_4b_f16
    (MatrixInstruction::new(32, 32, 4, 8), 64),  // v_mfma_i32_32x32x4_2b_i8
    (MatrixInstruction::new(32, 32, 16, 8), 32), // v_mfma_i32_32x32x16_i8
    (MatrixInstruction::new(4, 4, 4, 64), 16),   // v_mfma_f64_4x4x4_4b_f64
    (MatrixInstruction::new(32, 32, 1, 32), 64), // v_mfma_f32_32x32x1_2b_f32
    (MatrixInstruction::new(32, 32, 8, 16), 32), // v_mfma_f32_32x32x8_f16
    (MatrixInstruction::new(16, 16, 16, 16), 16), // v_mfma_f32_16x16x16_f16/bf16
    (MatrixInstruction::new(32, 32, 4, 16), 64), // v_mfma_f32_32x32x4_2b_f16
    (MatrixInstruction::new(4, 4, 1, 32), 8),    // v_mfma_f32_4x4x1_16b_f32
    (MatrixInstruction::new(4, 4, 4, 8), 8),     // v_mfma_i32_4x4x4_16b_i8
    (MatrixInstruction::new(32, 32, 4, 32), 32), // v_mfma_f32_32x32x4_xf32
    (MatrixInstruction::new(16, 16, 4, 8), 32),  // v_mfma_i32_16x16x4_4b_i8
    (MatrixInstruction::new(16, 16, 8, 32), 16), // v_mfma_f32_16x16x8_xf32
    (MatrixInstruction::new(32, 32, 64, 8), 64),
    (MatrixInstruction::new(16, 16, 32, 16), 16), // v_mfma_f32_16x16x32_f16/bf16
    (MatrixInstruction::new(16, 16, 128, 8), 32), // v_mfma_f32_16x16x128_f8
    (MatrixInstruction::new(16, 16, 128, 6), 16), // v_mfma_f32_16x16x128_f6
    (MatrixInstruction::new(16, 16, 128, 4), 16), // v_mfma_f32_16x16x128_f4
];

/// Issue-latency table for `arch`, built once per process.
pub fn instruction_latencies(arch: Architecture) -> &'static HashMap<MatrixInstruction, u64> {
    static GFX942: OnceLock<HashMap<MatrixInstruction, u64>> = OnceLock::new();
    static GFX950: OnceLock<HashMap<MatrixInstruction, u64>> = OnceLock::new();
    static EMPTY: OnceLock<HashMap<MatrixInstruction, u64>> = OnceLock::new();

    match arch {
        Architecture::Gfx942 => {
            GFX942.get_or_init(|| GFX942_MI_LATENCIES.iter().copied().collect())
        }
        Architecture::Gfx950 => {
            GFX950.get_or_init(|| GFX950_MI_LATENCIES.iter().copied().collect())
        }
        Architecture::Count => EMPTY.get_or_init(HashMap::new),
    }
}

// ── Device-properties bundle ───────────────────────────────────────────

/// Device quantities as reported by the runtime, in the runtime's units.
///
/// How this bundle is obtained (driver query, config file, test fixture)
/// is the caller's concern.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// Architecture string, e.g. `"gfx942:sramecc+:xnack-"`.
    pub gcn_arch_name: String,
    /// Compute-unit count.
    pub multi_processor_count: u64,
    /// LDS bytes available per workgroup.
    pub shared_mem_per_block: u64,
    /// Compute clock in kHz.
    pub clock_rate_khz: f64,
    /// Memory clock in kHz.
    pub memory_clock_rate_khz: f64,
    /// L2 cache size in bytes.
    pub l2_cache_size: u64,
}

// ── Hardware descriptor ────────────────────────────────────────────────

/// Immutable hardware description consumed by the latency model.
///
/// Constructed once per session, then read-only. The `debug_info` map is
/// purely diagnostic: the model writes intermediate quantities into it when
/// `ANALYTICAL_GEMM_DEBUG=1` is set, and never reads it back.
#[derive(Debug)]
pub struct Hardware {
    pub arch: Architecture,
    /// Number of compute units.
    pub n_cu: u64,
    /// LDS capacity in bytes.
    pub lds_capacity: u64,
    pub mem1_perf_ratio: f64,
    pub mem2_perf_ratio: f64,
    pub mem3_perf_ratio: f64,
    /// L2 capacity in bytes.
    pub l2_capacity: u64,
    /// Compute units per L2 domain.
    pub cu_per_l2: u64,
    pub compute_clock_ghz: f64,
    /// Matrix instructions issued in parallel per CU.
    pub parallel_mi_cu: u64,
    pub percent_bw_per_wg: f64,
    pub num_xcd: u64,

    debug_info: Mutex<HashMap<String, String>>,
}

impl Hardware {
    /// Build a `Hardware` from already-derived performance ratios.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arch: Architecture,
        n_cu: u64,
        lds_capacity: u64,
        num_xcd: u64,
        mem1_perf_ratio: f64,
        mem2_perf_ratio: f64,
        mem3_perf_ratio: f64,
        l2_capacity: u64,
        compute_clock_ghz: f64,
        parallel_mi_cu: u64,
        percent_bw_per_wg: f64,
    ) -> Hardware {
        let hw = Hardware {
            arch,
            n_cu,
            lds_capacity,
            mem1_perf_ratio,
            mem2_perf_ratio,
            mem3_perf_ratio,
            l2_capacity,
            cu_per_l2: n_cu / num_xcd,
            compute_clock_ghz,
            parallel_mi_cu,
            percent_bw_per_wg,
            num_xcd,
            debug_info: Mutex::new(HashMap::new()),
        };
        if Hardware::debug_enabled() {
            eprintln!("{hw}");
        }
        hw
    }

    /// Build a `Hardware` from a device-properties bundle, deriving the
    /// three memory-tier ratios from the architecture constants and the
    /// reported clocks.
    pub fn from_device_properties(properties: &DeviceProperties) -> Result<Hardware, ModelError> {
        let arch_name = match properties.gcn_arch_name.find(':') {
            Some(pos) => &properties.gcn_arch_name[..pos],
            None => properties.gcn_arch_name.as_str(),
        };
        let arch = Architecture::from_gcn_arch_name(arch_name);
        let constants = architecture_constants(arch)
            .ok_or_else(|| ModelError::UnsupportedArchitecture(arch_name.to_string()))?;

        Ok(Hardware::new(
            arch,
            properties.multi_processor_count,
            properties.shared_mem_per_block,
            constants.num_xcds,
            1e9 * constants.mem1_perf_ratio / properties.clock_rate_khz,
            1e9 * constants.mem2_perf_ratio
                / (properties.memory_clock_rate_khz * constants.mem_clock_ratio),
            1e9 * constants.mem3_perf_ratio / properties.memory_clock_rate_khz,
            properties.l2_cache_size,
            properties.clock_rate_khz / 1e6,
            constants.parallel_mi_cu,
            constants.percent_bw_per_wg,
        ))
    }

    /// Whether the model is calibrated for the device described by
    /// `properties`.
    pub fn is_supported(properties: &DeviceProperties) -> bool {
        let arch = Architecture::from_gcn_arch_name(&properties.gcn_arch_name);
        architecture_constants(arch).is_some()
    }

    /// Effective issue latency of one matrix instruction, in cycles.
    ///
    /// Unknown shapes never abort a search: a pessimistic fallback of
    /// 32 cycles is substituted and a warning is printed.
    pub fn mi_latency(&self, mi_m: u64, mi_n: u64, mi_k: u64, elem_bits: u64) -> u64 {
        let key = MatrixInstruction::new(mi_m, mi_n, mi_k, elem_bits);
        match instruction_latencies(self.arch).get(&key) {
            Some(&cycles) => cycles / self.parallel_mi_cu,
            None => {
                eprintln!(
                    "[tilecost] warning: no issue latency for MI {key}; \
                     substituting 32 cycles (really slow)"
                );
                32 / self.parallel_mi_cu
            }
        }
    }

    /// Whether `ANALYTICAL_GEMM_DEBUG=1` is set. Read once and cached.
    pub fn debug_enabled() -> bool {
        static DEBUG: OnceLock<bool> = OnceLock::new();
        *DEBUG.get_or_init(|| std::env::var("ANALYTICAL_GEMM_DEBUG").as_deref() == Ok("1"))
    }

    /// Record a diagnostic key/value pair. Never consulted by the model.
    pub fn log_debug(&self, key: &str, value: impl fmt::Display) {
        self.debug_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    pub fn clear_debug(&self) {
        self.debug_info.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Dump the recorded diagnostics to stderr.
    pub fn print_debug_info(&self) {
        let info = self.debug_info.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<&String> = info.keys().collect();
        keys.sort();
        eprintln!("=== Hardware Debug Info ===");
        for key in keys {
            eprintln!("{key}: {}", info[key]);
        }
        eprintln!("===========================");
    }
}

impl Clone for Hardware {
    fn clone(&self) -> Hardware {
        // The diagnostic map is per-instance and starts empty in the clone.
        Hardware {
            arch: self.arch,
            n_cu: self.n_cu,
            lds_capacity: self.lds_capacity,
            mem1_perf_ratio: self.mem1_perf_ratio,
            mem2_perf_ratio: self.mem2_perf_ratio,
            mem3_perf_ratio: self.mem3_perf_ratio,
            l2_capacity: self.l2_capacity,
            cu_per_l2: self.cu_per_l2,
            compute_clock_ghz: self.compute_clock_ghz,
            parallel_mi_cu: self.parallel_mi_cu,
            percent_bw_per_wg: self.percent_bw_per_wg,
            num_xcd: self.num_xcd,
            debug_info: Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} CUs, {} XCDs ({} CU/L2) | LDS {}K, L2 {}K | \
             clock {:.2} GHz | mem ratios {:.3}/{:.3}/{:.3} | \
             {} MI/CU, {:.3}% bw/WG",
            self.arch,
            self.n_cu,
            self.num_xcd,
            self.cu_per_l2,
            self.lds_capacity / 1024,
            self.l2_capacity / 1024,
            self.compute_clock_ghz,
            self.mem1_perf_ratio,
            self.mem2_perf_ratio,
            self.mem3_perf_ratio,
            self.parallel_mi_cu,
            self.percent_bw_per_wg * 100.0,
        )
    }
}
