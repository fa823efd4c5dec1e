use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{LabeledWindows, SampleWindow};
use crate::error::{PipelineError, Result};
use crate::signal::{RawSignal, SignalLoader, recordings_in};

/// Shift between consecutive windows of one augmentation burst.
pub const AUGMENT_STEP: usize = 28;

/// Shortest signal that provides `count` windows at distinct offsets.
pub fn required_signal_len(window_length: usize, count: usize) -> usize {
    window_length + count.saturating_sub(1)
}

/// Start offsets for `count` windows of `window_length` over a signal of `signal_len`.
///
/// Without an RNG the offsets are evenly spaced from 0 to the last valid
/// offset: disjoint when the signal is long enough, overlapping by the
/// smallest possible amount otherwise. With an RNG, random anchors each emit
/// a burst of offsets `AUGMENT_STEP` apart; offsets past the last valid one or
/// already taken are skipped, so every start is distinct.
pub fn window_starts(
    signal_len: usize,
    window_length: usize,
    count: usize,
    rng: Option<&mut StdRng>,
) -> Option<Vec<usize>> {
    if window_length == 0 || signal_len < required_signal_len(window_length, count) {
        return None;
    }
    if count == 0 {
        return Some(Vec::new());
    }
    let max_start = signal_len - window_length;
    let starts = match rng {
        None => evenly_spaced(max_start, count),
        Some(rng) => augmented(max_start, window_length, count, rng),
    };
    Some(starts)
}

fn evenly_spaced(max_start: usize, count: usize) -> Vec<usize> {
    if count == 1 {
        return vec![0];
    }
    let span = max_start as u128;
    let gaps = (count - 1) as u128;
    (0..count)
        .map(|i| ((i as u128 * span) / gaps) as usize)
        .collect()
}

fn augmented(max_start: usize, window_length: usize, count: usize, rng: &mut StdRng) -> Vec<usize> {
    let burst = (window_length / AUGMENT_STEP).max(1);
    let mut used = HashSet::with_capacity(count);
    let mut starts = Vec::with_capacity(count);
    while starts.len() < count {
        let anchor = next_unused(rng.random_range(0..=max_start), max_start, &used);
        for k in 0..burst {
            if starts.len() == count {
                break;
            }
            let start = anchor + k * AUGMENT_STEP;
            if start > max_start {
                break;
            }
            if used.insert(start) {
                starts.push(start);
            }
        }
    }
    starts
}

/// First offset at or after `from` (wrapping) not yet in `used`.
///
/// Callers keep `used.len() <= max_start`, so a free offset always exists.
fn next_unused(from: usize, max_start: usize, used: &HashSet<usize>) -> usize {
    let span = max_start + 1;
    (0..span)
        .map(|step| (from + step) % span)
        .find(|offset| !used.contains(offset))
        .unwrap_or(from)
}

fn slice_windows(signal: &RawSignal, window_length: usize, starts: &[usize]) -> Vec<SampleWindow> {
    let label: Arc<str> = Arc::from(signal.label());
    let values = signal.values();
    starts
        .iter()
        .map(|&start| {
            SampleWindow::new(
                label.clone(),
                start,
                values[start..start + window_length].to_vec(),
            )
        })
        .collect()
}

fn insufficient(signal: &RawSignal, window_length: usize, count: usize) -> PipelineError {
    PipelineError::InsufficientData {
        source_id: signal.source_id().to_string(),
        available: signal.len(),
        required: required_signal_len(window_length, count),
        windows: count,
        window_length,
    }
}

/// Exactly `count` deterministic windows from one signal (diagnosis path).
pub fn build_from_signal(
    signal: &RawSignal,
    window_length: usize,
    count: usize,
) -> Result<Vec<SampleWindow>> {
    let starts = window_starts(signal.len(), window_length, count, None)
        .ok_or_else(|| insufficient(signal, window_length, count))?;
    Ok(slice_windows(signal, window_length, &starts))
}

/// Slice every recording in `folder` into exactly `samples_per_class` windows.
///
/// One recording per class; the label is the file stem. Augmentation draws
/// from a per-class RNG derived from `seed`, so builds are reproducible.
pub fn build(
    loader: &SignalLoader,
    folder: &Path,
    window_length: usize,
    samples_per_class: usize,
    augment: bool,
    seed: u64,
) -> Result<LabeledWindows> {
    if window_length == 0 || samples_per_class == 0 {
        return Err(PipelineError::Config(
            "window length and samples per class must be positive".into(),
        ));
    }
    let recordings = recordings_in(folder)?;
    if recordings.is_empty() {
        return Err(PipelineError::Config(format!(
            "no recordings found in {}",
            folder.display()
        )));
    }

    let mut out = LabeledWindows::new();
    for (class_idx, path) in recordings.iter().enumerate() {
        let signal = loader.load(path)?;
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(class_idx as u64));
        let starts = window_starts(
            signal.len(),
            window_length,
            samples_per_class,
            augment.then_some(&mut rng),
        )
        .ok_or_else(|| insufficient(&signal, window_length, samples_per_class))?;
        debug!(
            "{}: {} windows over {} samples",
            signal.label(),
            starts.len(),
            signal.len()
        );
        let windows = slice_windows(&signal, window_length, &starts);
        if out.insert(signal.label().to_string(), windows).is_some() {
            return Err(PipelineError::Config(format!(
                "duplicate class label '{}' in {}",
                signal.label(),
                folder.display()
            )));
        }
    }
    info!(
        "Built {} classes x {} windows of length {} (augment={})",
        out.len(),
        samples_per_class,
        window_length,
        augment
    );
    Ok(out)
}
