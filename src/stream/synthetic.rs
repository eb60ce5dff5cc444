//! Synthetic multichannel sine source
//!
//! Deterministik: nilai hanya tergantung (channel, posisi), jadi consumer
//! di proses lain bisa menghitung ulang nilai yang diharapkan.

use std::f64::consts::TAU;

use crate::core::{Sample, SampleBlock};
use crate::error::Result;

use super::contract::SampleSource;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub channels: usize,
    pub sample_rate: f64,
    /// Channel `ch` berosilasi di `base_hz * (ch + 1)`
    pub base_hz: f64,
    pub amplitude: f64,
    /// Panjang source dalam kolom (None = tak terbatas)
    pub length: Option<u64>,
}

impl SyntheticSource {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            sample_rate: 48_000.0,
            base_hz: 440.0,
            amplitude: 1.0,
            length: None,
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Nilai sample di (channel, position)
    #[inline]
    pub fn value(&self, channel: usize, position: u64) -> f64 {
        let freq = self.base_hz * (channel + 1) as f64;
        self.amplitude * (TAU * freq * position as f64 / self.sample_rate).sin()
    }
}

impl<T: Sample> SampleSource<T> for SyntheticSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn fill(&mut self, position: u64, block: &mut SampleBlock<T>) -> Result<usize> {
        // Posisi source berhenti di u64::MAX, tidak wrap
        let available = match self.length {
            Some(length) => length.saturating_sub(position),
            None => u64::MAX - position,
        };
        let width = (block.width() as u64).min(available) as usize;

        for ch in 0..block.channels() {
            let row = block.row_mut(ch);
            for (i, slot) in row[..width].iter_mut().enumerate() {
                *slot = T::from_f64(self.value(ch, position + i as u64));
            }
        }
        Ok(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_matches_value() {
        let mut source = SyntheticSource::new(2);
        let mut block = SampleBlock::<f64>::zeros(2, 4);

        assert_eq!(source.fill(10, &mut block).unwrap(), 4);
        for ch in 0..2 {
            for i in 0..4 {
                assert_eq!(block.get(ch, i), Some(source.value(ch, 10 + i as u64)));
            }
        }
        // Channel 1 punya frekuensi dua kali lipat
        assert_ne!(block.row(0), block.row(1));
    }

    #[test]
    fn test_bounded_source_exhausts() {
        let mut source = SyntheticSource::new(1).with_length(6);
        let mut block = SampleBlock::<f32>::zeros(1, 4);

        assert_eq!(source.fill(0, &mut block).unwrap(), 4);
        assert_eq!(source.fill(4, &mut block).unwrap(), 2);
        assert_eq!(source.fill(6, &mut block).unwrap(), 0);
        assert_eq!(source.fill(100, &mut block).unwrap(), 0);
    }

    #[test]
    fn test_unbounded_source_ends_at_max_position() {
        let mut source = SyntheticSource::new(2);
        let mut block = SampleBlock::<f64>::zeros(2, 8);

        assert_eq!(source.fill(u64::MAX - 2, &mut block).unwrap(), 2);
        assert_eq!(block.get(1, 1), Some(source.value(1, u64::MAX - 1)));
        assert_eq!(source.fill(u64::MAX, &mut block).unwrap(), 0);
    }

    #[test]
    fn test_integer_samples_saturate() {
        let mut source = SyntheticSource::new(1).with_amplitude(1e9);
        let mut block = SampleBlock::<i16>::zeros(1, 64);
        source.fill(0, &mut block).unwrap();
        assert!(block.row(0).iter().any(|&v| v == i16::MAX));
    }
}
