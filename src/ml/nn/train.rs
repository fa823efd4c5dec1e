use std::time::Instant;

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::SignalNet;
use crate::dataset::Partition;
use crate::error::{PipelineError, Result};
use crate::family::NetworkOptions;
use crate::ml::forest::argmax;
use crate::ml::history::{EpochStats, TrainingHistory};

/// Rows `indices` of `x` as a `[batch, len]` tensor.
pub(super) fn batch_tensor<B: Backend>(
    x: &Array2<f32>,
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 2> {
    let width = x.ncols();
    let mut flat = Vec::with_capacity(indices.len() * width);
    for &idx in indices {
        flat.extend(x.row(idx).iter().copied());
    }
    Tensor::from_data(TensorData::new(flat, [indices.len(), width]), device)
}

fn label_tensor<B: Backend>(
    y: &[usize],
    indices: &[usize],
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let labels: Vec<i64> = indices.iter().map(|&idx| y[idx] as i64).collect();
    Tensor::from_data(TensorData::new(labels, [indices.len()]), device)
}

pub(super) fn tensor_rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, cols] = tensor.dims();
    let flat = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| PipelineError::Training(format!("read tensor: {err:?}")))?;
    Ok(flat.chunks(cols.max(1)).map(<[f32]>::to_vec).collect())
}

fn count_correct(logits: &[Vec<f32>], y: &[usize], indices: &[usize]) -> usize {
    logits
        .iter()
        .zip(indices)
        .filter(|(row, idx)| argmax(row) == y[**idx])
        .count()
}

/// Mean loss and accuracy of `model` over a whole partition, without gradients.
fn score_partition<B, M>(
    model: &M,
    partition: &Partition,
    batch_size: usize,
    device: &B::Device,
) -> Result<(f64, f64)>
where
    B: Backend,
    M: SignalNet<B>,
{
    if partition.is_empty() {
        return Ok((0.0, 0.0));
    }
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices: Vec<usize> = (0..partition.len()).collect();
    let mut loss_sum = 0.0_f64;
    let mut correct = 0usize;
    for batch in indices.chunks(batch_size) {
        let logits = model.forward(batch_tensor::<B>(&partition.x, batch, device));
        let targets = label_tensor::<B>(&partition.y, batch, device);
        let loss: f64 = loss_fn.forward(logits.clone(), targets).into_scalar().elem();
        loss_sum += loss * batch.len() as f64;
        correct += count_correct(&tensor_rows(logits)?, &partition.y, batch);
    }
    let n = partition.len() as f64;
    Ok((loss_sum / n, correct as f64 / n))
}

/// Mini-batch Adam on cross-entropy; returns the inference copy of the model.
///
/// `on_epoch` sees every completed epoch, in order.
pub fn fit<B, M>(
    mut model: M,
    train: &Partition,
    valid: &Partition,
    options: &NetworkOptions,
    seed: u64,
    device: &B::Device,
    mut on_epoch: impl FnMut(&EpochStats),
) -> Result<(M::InnerModule, TrainingHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SignalNet<B>,
    M::InnerModule: SignalNet<B::InnerBackend>,
{
    if train.is_empty() {
        return Err(PipelineError::Training("empty train partition".into()));
    }
    let batch_size = options.batch_size.max(1);
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optim = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..train.len()).collect();
    let mut history = TrainingHistory::default();

    for epoch in 1..=options.epochs {
        let started = Instant::now();
        indices.shuffle(&mut rng);
        let mut loss_sum = 0.0_f64;
        let mut correct = 0usize;
        for batch in indices.chunks(batch_size) {
            let logits = model.forward(batch_tensor::<B>(&train.x, batch, device));
            let targets = label_tensor::<B>(&train.y, batch, device);
            let loss = loss_fn.forward(logits.clone(), targets);
            let batch_loss: f64 = loss.clone().into_scalar().elem();
            if !batch_loss.is_finite() {
                return Err(PipelineError::Training(format!(
                    "loss diverged in epoch {epoch}"
                )));
            }
            loss_sum += batch_loss * batch.len() as f64;
            correct += count_correct(&tensor_rows(logits.detach())?, &train.y, batch);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(options.learning_rate, model, grads);
        }

        let (valid_loss, valid_accuracy) =
            score_partition::<B::InnerBackend, _>(&model.valid(), valid, batch_size, device)?;
        let stats = EpochStats {
            epoch,
            train_loss: loss_sum / train.len() as f64,
            valid_loss,
            train_accuracy: correct as f64 / train.len() as f64,
            valid_accuracy,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            "epoch {}/{}: loss {:.4} acc {:.3} val_loss {:.4} val_acc {:.3}",
            epoch,
            options.epochs,
            stats.train_loss,
            stats.train_accuracy,
            stats.valid_loss,
            stats.valid_accuracy
        );
        on_epoch(&stats);
        history.push(stats);
    }
    Ok((model.valid(), history))
}

/// Class probabilities for every row of `x`.
pub fn predict_proba<B, M>(
    model: &M,
    x: &Array2<f32>,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>>
where
    B: Backend,
    M: SignalNet<B>,
{
    let indices: Vec<usize> = (0..x.nrows()).collect();
    let mut out = Vec::with_capacity(x.nrows());
    for batch in indices.chunks(batch_size.max(1)) {
        let logits = model.forward(batch_tensor::<B>(x, batch, device));
        out.extend(tensor_rows(burn::tensor::activation::softmax(logits, 1))?);
    }
    Ok(out)
}
