//! GPU device catalog: processor families, non-standard CU-count detection,
//! and the kernel-compatibility relation between processor generations.

use std::fmt;

/// GPU processor generations, ordered by ISA generation.
///
/// The derived `Ord` is load-bearing: a device never runs kernels targeting
/// a newer processor than itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Processor {
    Gfx803,
    Gfx900,
    Gfx906,
    Gfx908,
    Gfx90a,
    Gfx942,
    Gfx950,
    Gfx1010,
    Gfx1030,
    Gfx1100,
    Gfx1101,
    Gfx1102,
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Processor::Gfx803 => "gfx803",
            Processor::Gfx900 => "gfx900",
            Processor::Gfx906 => "gfx906",
            Processor::Gfx908 => "gfx908",
            Processor::Gfx90a => "gfx90a",
            Processor::Gfx942 => "gfx942",
            Processor::Gfx950 => "gfx950",
            Processor::Gfx1010 => "gfx1010",
            Processor::Gfx1030 => "gfx1030",
            Processor::Gfx1100 => "gfx1100",
            Processor::Gfx1101 => "gfx1101",
            Processor::Gfx1102 => "gfx1102",
        };
        write!(f, "{name}")
    }
}

/// CU counts of known partially-disabled (non-standard) parts per processor.
fn non_standard_cu_counts(processor: Processor) -> &'static [u64] {
    match processor {
        Processor::Gfx90a => &[104],
        Processor::Gfx942 => &[20, 38, 64, 80, 228],
        _ => &[],
    }
}

/// A concrete GPU device: processor family, CU count, and marketing name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GpuDevice {
    pub processor: Processor,
    pub compute_unit_count: u64,
    pub device_name: String,
}

impl GpuDevice {
    pub fn new(processor: Processor, compute_unit_count: u64, device_name: impl Into<String>) -> Self {
        GpuDevice {
            processor,
            compute_unit_count,
            device_name: device_name.into(),
        }
    }

    /// Whether this device has the full CU complement for its processor.
    pub fn is_standard_cu(&self) -> bool {
        !non_standard_cu_counts(self.processor).contains(&self.compute_unit_count)
    }

    /// Whether this device can run kernels compiled for `other`.
    ///
    /// A device runs kernels targeting its own processor, and kernels
    /// targeting the gfx900 baseline. gfx803 predates the baseline and is
    /// never subsumed.
    pub fn runs_kernel_targeting(&self, other: Processor) -> bool {
        if other > self.processor {
            return false;
        }
        if other == self.processor {
            return true;
        }
        if other == Processor::Gfx803 {
            return false;
        }
        other == Processor::Gfx900
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}-CU {})", self.device_name, self.compute_unit_count, self.processor)
    }
}
