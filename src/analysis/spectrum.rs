use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Number of equal-width bands the one-sided spectrum is divided into.
pub const BAND_COUNT: usize = 4;

/// Spectral shape of one window. Frequencies are in cycles per sample (0 to 0.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyDomainFeatures {
    pub centroid: f32,
    pub rms_frequency: f32,
    pub std_frequency: f32,
    pub band_energy: [f32; BAND_COUNT],
}

impl FrequencyDomainFeatures {
    pub const COUNT: usize = 3 + BAND_COUNT;

    pub fn to_array(&self) -> [f32; Self::COUNT] {
        let mut out = [0.0; Self::COUNT];
        out[0] = self.centroid;
        out[1] = self.rms_frequency;
        out[2] = self.std_frequency;
        out[3..].copy_from_slice(&self.band_energy);
        out
    }
}

pub(crate) fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}

/// Forward FFT planned once for a fixed window length.
pub struct SpectrumAnalyzer {
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").field("len", &self.len).finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        let mut planner = FftPlanner::<f32>::new();
        Self {
            len,
            fft: planner.plan_fft_forward(len),
            window: hann_window(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// One-sided power spectrum of the mean-removed, Hann-windowed samples.
    pub fn power(&self, samples: &[f32]) -> Vec<f32> {
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f32>() / samples.len() as f32
        };
        let mut buffer: Vec<Complex<f32>> = (0..self.len)
            .map(|i| {
                let v = samples.get(i).copied().unwrap_or(mean);
                let v = if v.is_finite() { v - mean } else { 0.0 };
                Complex::new(v * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut buffer);
        buffer[..self.len / 2 + 1]
            .iter()
            .map(|c| c.norm_sqr())
            .collect()
    }

    pub fn features(&self, samples: &[f32]) -> FrequencyDomainFeatures {
        spectral_features(&self.power(samples), self.len)
    }
}

fn spectral_features(power: &[f32], fft_len: usize) -> FrequencyDomainFeatures {
    let total: f64 = power.iter().map(|&p| p as f64).sum();
    if total <= f64::EPSILON || fft_len == 0 {
        return FrequencyDomainFeatures {
            centroid: 0.0,
            rms_frequency: 0.0,
            std_frequency: 0.0,
            band_energy: [0.0; BAND_COUNT],
        };
    }
    let freq = |bin: usize| bin as f64 / fft_len as f64;
    let mut centroid = 0.0_f64;
    let mut second = 0.0_f64;
    for (bin, &p) in power.iter().enumerate() {
        let weight = p as f64 / total;
        centroid += freq(bin) * weight;
        second += freq(bin) * freq(bin) * weight;
    }
    let variance = (second - centroid * centroid).max(0.0);

    let mut band_energy = [0.0_f32; BAND_COUNT];
    let band_width = power.len().div_ceil(BAND_COUNT).max(1);
    for (bin, &p) in power.iter().enumerate() {
        let band = (bin / band_width).min(BAND_COUNT - 1);
        band_energy[band] += (p as f64 / total) as f32;
    }

    FrequencyDomainFeatures {
        centroid: centroid as f32,
        rms_frequency: second.sqrt() as f32,
        std_frequency: variance.sqrt() as f32,
        band_energy,
    }
}
