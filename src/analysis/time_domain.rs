use serde::{Deserialize, Serialize};

/// Statistical condition indicators of one vibration window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeDomainFeatures {
    pub mean: f32,
    pub std: f32,
    pub rms: f32,
    pub peak: f32,
    pub peak_to_peak: f32,
    pub abs_mean: f32,
    pub skewness: f32,
    pub kurtosis: f32,
    pub crest_factor: f32,
    pub shape_factor: f32,
    pub impulse_factor: f32,
    pub clearance_factor: f32,
    pub zero_crossing_rate: f32,
}

impl TimeDomainFeatures {
    pub const COUNT: usize = 13;

    pub fn to_array(&self) -> [f32; Self::COUNT] {
        [
            self.mean,
            self.std,
            self.rms,
            self.peak,
            self.peak_to_peak,
            self.abs_mean,
            self.skewness,
            self.kurtosis,
            self.crest_factor,
            self.shape_factor,
            self.impulse_factor,
            self.clearance_factor,
            self.zero_crossing_rate,
        ]
    }
}

pub fn extract_time_domain_features(samples: &[f32]) -> TimeDomainFeatures {
    let moments = Moments::of(samples);
    let peak = peak(samples);
    let rms = moments.rms as f32;
    let abs_mean = moments.abs_mean as f32;
    let sqrt_abs_mean = sqrt_abs_mean(samples);

    TimeDomainFeatures {
        mean: moments.mean as f32,
        std: moments.std as f32,
        rms,
        peak,
        peak_to_peak: peak_to_peak(samples),
        abs_mean,
        skewness: moments.skewness as f32,
        kurtosis: moments.kurtosis as f32,
        crest_factor: ratio(peak, rms),
        shape_factor: ratio(rms, abs_mean),
        impulse_factor: ratio(peak, abs_mean),
        clearance_factor: ratio(peak, sqrt_abs_mean * sqrt_abs_mean),
        zero_crossing_rate: zero_crossing_rate(samples),
    }
}

struct Moments {
    mean: f64,
    std: f64,
    rms: f64,
    abs_mean: f64,
    skewness: f64,
    kurtosis: f64,
}

impl Moments {
    fn of(samples: &[f32]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std: 0.0,
                rms: 0.0,
                abs_mean: 0.0,
                skewness: 0.0,
                kurtosis: 0.0,
            };
        }
        let n_f = n as f64;
        let mut sum = 0.0_f64;
        let mut sum_sq = 0.0_f64;
        let mut sum_abs = 0.0_f64;
        for &sample in samples {
            let v = sanitize_sample(sample) as f64;
            sum += v;
            sum_sq += v * v;
            sum_abs += v.abs();
        }
        let mean = sum / n_f;
        let mut m2 = 0.0_f64;
        let mut m3 = 0.0_f64;
        let mut m4 = 0.0_f64;
        for &sample in samples {
            let d = sanitize_sample(sample) as f64 - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        m2 /= n_f;
        m3 /= n_f;
        m4 /= n_f;
        let std = m2.max(0.0).sqrt();
        let (skewness, kurtosis) = if m2 > f64::EPSILON {
            (m3 / m2.powf(1.5), m4 / (m2 * m2))
        } else {
            (0.0, 0.0)
        };
        Self {
            mean,
            std,
            rms: (sum_sq / n_f).max(0.0).sqrt(),
            abs_mean: sum_abs / n_f,
            skewness,
            kurtosis,
        }
    }
}

fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .copied()
        .map(|v| sanitize_sample(v).abs())
        .fold(0.0_f32, f32::max)
}

fn peak_to_peak(samples: &[f32]) -> f32 {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &sample in samples {
        let v = sanitize_sample(sample);
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if hi >= lo { hi - lo } else { 0.0 }
}

fn sqrt_abs_mean(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&v| (sanitize_sample(v).abs() as f64).sqrt())
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Fraction of adjacent sample pairs that change sign.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0u64;
    let mut prev = sanitize_sample(samples[0]);
    for &sample in &samples[1..] {
        let current = sanitize_sample(sample);
        let crossed = (prev >= 0.0 && current < 0.0) || (prev < 0.0 && current >= 0.0);
        if crossed && (prev != 0.0 || current != 0.0) {
            crossings += 1;
        }
        prev = current;
    }
    crossings as f32 / (samples.len() - 1) as f32
}

fn ratio(num: f32, den: f32) -> f32 {
    if den > f32::EPSILON { num / den } else { 0.0 }
}

fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() { sample } else { 0.0 }
}
