//! Core value types shared across the cost model: problem description,
//! tile candidates, ranked results, and the library error type.

use std::fmt;

/// A GEMM problem instance.
///
/// Element widths are in *bits* so that sub-byte datatypes (FP6/FP4) can be
/// described. `mx_block_size = 0` disables block-scaled datatype accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Problem {
    pub m: u64,
    pub n: u64,
    pub k: u64,
    pub batch: u64,
    pub trans_a: bool,
    pub trans_b: bool,
    /// Element width of A in bits.
    pub elem_bits_a: u64,
    /// Element width of B in bits.
    pub elem_bits_b: u64,
    /// Element width of the output in bits.
    pub elem_bits_out: u64,
    /// Elements covered by one scale value for block-scaled datatypes;
    /// 0 when the datatype carries no scales.
    pub mx_block_size: u64,
}

impl Problem {
    /// A plain (unscaled) GEMM with uniform element width.
    pub fn new(m: u64, n: u64, k: u64, batch: u64, trans_a: bool, trans_b: bool, elem_bits: u64) -> Self {
        Problem {
            m,
            n,
            k,
            batch,
            trans_a,
            trans_b,
            elem_bits_a: elem_bits,
            elem_bits_b: elem_bits,
            elem_bits_out: elem_bits,
            mx_block_size: 0,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}_b{}_{}{}",
            self.m,
            self.n,
            self.k,
            self.batch,
            if self.trans_a { 'T' } else { 'N' },
            if self.trans_b { 'T' } else { 'N' },
        )
    }
}

/// A candidate kernel configuration: macro-tile shape plus the matrix
/// instruction it is built from.
///
/// `mt_*` must be multiples of the corresponding `mi_*`; the caller
/// enumerating candidates is responsible for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCandidate {
    pub mt_m: u64,
    pub mt_n: u64,
    pub mt_k: u64,
    pub mi_m: u64,
    pub mi_n: u64,
    pub mi_k: u64,
    /// Workgroups resident per CU.
    pub occupancy: u64,
}

impl TileCandidate {
    pub fn new(mt_m: u64, mt_n: u64, mt_k: u64, mi_m: u64, mi_n: u64, mi_k: u64, occupancy: u64) -> Self {
        TileCandidate { mt_m, mt_n, mt_k, mi_m, mi_n, mi_k, occupancy }
    }
}

impl fmt::Display for TileCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MT={}x{}x{} MI={}x{}x{} occ={}",
            self.mt_m, self.mt_n, self.mt_k, self.mi_m, self.mi_n, self.mi_k, self.occupancy,
        )
    }
}

/// A tile candidate together with its predicted latency in compute cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedTile {
    pub latency: f64,
    pub tile: TileCandidate,
}

impl fmt::Display for RankedTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} cycles | {}", self.latency, self.tile)
    }
}

/// Errors from cost-model operations.
#[derive(Debug)]
pub enum ModelError {
    /// The architecture string did not resolve to a known GPU architecture.
    UnsupportedArchitecture(String),
    /// Every tile candidate was rejected by the scratchpad capacity check.
    NoViableTile,
    /// Every WGM candidate was rejected by the scratchpad capacity check.
    NoViableWgm,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedArchitecture(name) => {
                write!(f, "unsupported architecture: {name}")
            }
            Self::NoViableTile => write!(f, "no macro-tile candidate fits in LDS"),
            Self::NoViableWgm => write!(f, "no WGM candidate fits in LDS"),
        }
    }
}

impl std::error::Error for ModelError {}
