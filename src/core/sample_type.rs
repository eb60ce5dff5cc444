//! Sample Type Registry
//!
//! Kode tipe disimpan di header segment, jadi harus stabil antar versi:
//! - Kode baru hanya di-append, tidak pernah di-reassign atau dihapus
//! - Proses lama dan baru tetap bisa membaca segment yang sama
//!
//! Table di bawah divalidasi saat compile time (kode == index, nama unik).

use std::fmt;
use std::str::FromStr;

use crate::error::BufferError;

/// Tipe sample yang didukung di dalam segment
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    Float32 = 0,
    Int16 = 1,
    Float64 = 2,
    Int32 = 3,
    UInt16 = 4,
}

/// Satu baris registry: kode wire, nama simbolik, lebar byte
#[derive(Debug, Clone, Copy)]
pub struct TypeEntry {
    pub code: u32,
    pub name: &'static str,
    pub byte_width: usize,
    pub sample_type: SampleType,
}

const fn entry(sample_type: SampleType, name: &'static str, byte_width: usize) -> TypeEntry {
    TypeEntry {
        code: sample_type as u32,
        name,
        byte_width,
        sample_type,
    }
}

/// Registry, di-index langsung dengan kode tipe.
pub const REGISTRY: [TypeEntry; 5] = [
    entry(SampleType::Float32, "float32", 4),
    entry(SampleType::Int16, "int16", 2),
    entry(SampleType::Float64, "float64", 8),
    entry(SampleType::Int32, "int32", 4),
    entry(SampleType::UInt16, "uint16", 2),
];

const fn names_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i].to_ascii_lowercase() != b[i].to_ascii_lowercase() {
            return false;
        }
        i += 1;
    }
    true
}

const fn registry_is_consistent(table: &[TypeEntry]) -> bool {
    let mut i = 0;
    while i < table.len() {
        if table[i].code as usize != i || table[i].byte_width == 0 {
            return false;
        }
        let mut j = i + 1;
        while j < table.len() {
            if names_equal(table[i].name, table[j].name) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    registry_is_consistent(&REGISTRY),
    "sample type registry: codes must equal their index and names must be unique"
);

impl SampleType {
    pub const ALL: [SampleType; 5] = [
        Self::Float32,
        Self::Int16,
        Self::Float64,
        Self::Int32,
        Self::UInt16,
    ];

    /// Lookup dari kode header (O(1), kode == index)
    #[inline(always)]
    pub fn from_code(code: u32) -> Option<Self> {
        REGISTRY.get(code as usize).map(|e| e.sample_type)
    }

    /// Lookup dari nama simbolik, case-insensitive. Alias pendek ("f32") diterima.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" => Some(Self::Float32),
            "int16" | "i16" => Some(Self::Int16),
            "float64" | "f64" => Some(Self::Float64),
            "int32" | "i32" => Some(Self::Int32),
            "uint16" | "u16" => Some(Self::UInt16),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn entry(self) -> &'static TypeEntry {
        &REGISTRY[self as usize]
    }

    #[inline(always)]
    pub fn code(self) -> u32 {
        self as u32
    }

    #[inline(always)]
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    #[inline(always)]
    pub fn byte_width(self) -> usize {
        self.entry().byte_width
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| BufferError::Config(format!("unknown sample type `{s}`")))
    }
}

/// Tipe Rust yang bisa disimpan langsung di body segment.
///
/// # Safety
/// Implementor harus plain-old-data: semua bit pattern valid, tanpa padding,
/// dan `size_of::<Self>() == Self::TYPE.byte_width()`.
pub unsafe trait Sample: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const TYPE: SampleType;

    /// Konversi dari f64 (saturating untuk tipe integer)
    fn from_f64(v: f64) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! impl_sample {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            // SAFETY: primitive numeric, semua bit pattern valid
            unsafe impl Sample for $ty {
                const TYPE: SampleType = SampleType::$variant;

                #[inline(always)]
                fn from_f64(v: f64) -> Self {
                    v as $ty
                }

                #[inline(always)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_sample! {
    f32 => Float32,
    i16 => Int16,
    f64 => Float64,
    i32 => Int32,
    u16 => UInt16,
}
