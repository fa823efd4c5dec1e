//! Neural classifiers over raw (normalized) vibration windows.
//!
//! Networks train on the autodiff ndarray backend and are stored as the
//! inference copy on the plain ndarray backend.

mod cnn;
mod recurrent;
mod train;

use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::dataset::Partition;
use crate::error::{PipelineError, Result};
use crate::family::{ModelFamily, NetworkOptions};
use crate::ml::history::{EpochStats, TrainingHistory};

pub use cnn::Cnn1d;
pub use recurrent::{FRAME_LEN, GruNet, LstmNet};
pub use train::{fit, predict_proba};

pub type TrainBackend = Autodiff<NdArray>;
pub type InferBackend = NdArray;

const INFERENCE_BATCH: usize = 256;

/// Windows in, class logits out.
pub trait SignalNet<B: Backend> {
    /// `[batch, window_length]` to `[batch, n_classes]`.
    fn forward(&self, windows: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Architecture description stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub family: ModelFamily,
    pub window_length: usize,
    pub n_classes: usize,
}

impl NetworkSpec {
    pub fn validate(&self) -> Result<()> {
        if !self.family.is_neural() {
            return Err(PipelineError::Config(format!(
                "{} is not a neural family",
                self.family
            )));
        }
        if self.n_classes < 2 {
            return Err(PipelineError::Config("need at least 2 classes".into()));
        }
        let recurrent = matches!(self.family, ModelFamily::Lstm | ModelFamily::Gru);
        if recurrent && (self.window_length < FRAME_LEN || self.window_length % FRAME_LEN != 0) {
            return Err(PipelineError::Config(format!(
                "{} needs a window length that is a multiple of {FRAME_LEN}, got {}",
                self.family, self.window_length
            )));
        }
        Ok(())
    }
}

/// A fitted network on the inference backend.
#[derive(Debug)]
pub enum TrainedNetwork {
    Cnn(Cnn1d<InferBackend>),
    Lstm(LstmNet<InferBackend>),
    Gru(GruNet<InferBackend>),
}

fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
}

fn record_bytes<M: Module<InferBackend>>(model: M) -> Result<Vec<u8>> {
    Recorder::<InferBackend>::record(&recorder(), model.into_record(), ())
        .map_err(|err| PipelineError::Training(format!("serialize weights: {err:?}")))
}

fn load_weights<M: Module<InferBackend>>(
    model: M,
    bytes: Vec<u8>,
    device: &<InferBackend as Backend>::Device,
) -> std::result::Result<M, RecorderError> {
    let record = Recorder::<InferBackend>::load(&recorder(), bytes, device)?;
    Ok(model.load_record(record))
}

impl TrainedNetwork {
    /// Fit a fresh network of `spec.family` on `train`, scoring `valid` after every epoch.
    pub fn train(
        spec: &NetworkSpec,
        train: &Partition,
        valid: &Partition,
        options: &NetworkOptions,
        seed: u64,
        on_epoch: impl FnMut(&EpochStats),
    ) -> Result<(Self, TrainingHistory)> {
        spec.validate()?;
        let device = Default::default();
        let k = spec.n_classes;
        let trained = match spec.family {
            ModelFamily::Cnn1d => {
                let model = Cnn1d::<TrainBackend>::new(k, &device);
                let (model, history) =
                    fit::<TrainBackend, _>(model, train, valid, options, seed, &device, on_epoch)?;
                (Self::Cnn(model), history)
            }
            ModelFamily::Lstm => {
                let model = LstmNet::<TrainBackend>::new(k, &device);
                let (model, history) =
                    fit::<TrainBackend, _>(model, train, valid, options, seed, &device, on_epoch)?;
                (Self::Lstm(model), history)
            }
            ModelFamily::Gru => {
                let model = GruNet::<TrainBackend>::new(k, &device);
                let (model, history) =
                    fit::<TrainBackend, _>(model, train, valid, options, seed, &device, on_epoch)?;
                (Self::Gru(model), history)
            }
            ModelFamily::RandomForest => {
                return Err(PipelineError::Config("forest is not a network".into()));
            }
        };
        Ok(trained)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Cnn(model) => record_bytes(model.clone()),
            Self::Lstm(model) => record_bytes(model.clone()),
            Self::Gru(model) => record_bytes(model.clone()),
        }
    }

    /// Rebuild the architecture of `spec` and load `bytes` into it.
    pub fn from_bytes(spec: &NetworkSpec, bytes: Vec<u8>) -> std::result::Result<Self, String> {
        spec.validate().map_err(|err| err.to_string())?;
        let device = Default::default();
        let k = spec.n_classes;
        let network = match spec.family {
            ModelFamily::Cnn1d => load_weights(Cnn1d::new(k, &device), bytes, &device).map(Self::Cnn),
            ModelFamily::Lstm => load_weights(LstmNet::new(k, &device), bytes, &device).map(Self::Lstm),
            ModelFamily::Gru => load_weights(GruNet::new(k, &device), bytes, &device).map(Self::Gru),
            ModelFamily::RandomForest => return Err("forest is not a network".into()),
        };
        network.map_err(|err| format!("weights do not match {}: {err:?}", spec.family))
    }

    /// Softmax class probabilities for every row of `x`.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Vec<Vec<f32>>> {
        let device = Default::default();
        match self {
            Self::Cnn(model) => predict_proba::<InferBackend, _>(model, x, INFERENCE_BATCH, &device),
            Self::Lstm(model) => predict_proba::<InferBackend, _>(model, x, INFERENCE_BATCH, &device),
            Self::Gru(model) => predict_proba::<InferBackend, _>(model, x, INFERENCE_BATCH, &device),
        }
    }
}
