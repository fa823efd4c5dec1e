use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig, MaxPool1d, MaxPool1dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig1d};
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;

use super::SignalNet;

/// Wide first-layer kernel 1-D CNN for raw vibration windows.
///
/// A strided 64-tap convolution acts as a learned filter bank; two narrow
/// convolutions follow, then global average pooling and a two-layer head.
#[derive(Module, Debug)]
pub struct Cnn1d<B: Backend> {
    conv1: Conv1d<B>,
    pool1: MaxPool1d,
    conv2: Conv1d<B>,
    pool2: MaxPool1d,
    conv3: Conv1d<B>,
    global_pool: AdaptiveAvgPool1d,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
}

const HIDDEN_UNITS: usize = 100;

impl<B: Backend> Cnn1d<B> {
    pub fn new(n_classes: usize, device: &B::Device) -> Self {
        Self {
            conv1: Conv1dConfig::new(1, 16, 64)
                .with_stride(16)
                .with_padding(PaddingConfig1d::Explicit(24))
                .init(device),
            pool1: MaxPool1dConfig::new(2).with_stride(2).init(),
            conv2: Conv1dConfig::new(16, 32, 3)
                .with_padding(PaddingConfig1d::Explicit(1))
                .init(device),
            pool2: MaxPool1dConfig::new(2).with_stride(2).init(),
            conv3: Conv1dConfig::new(32, 64, 3)
                .with_padding(PaddingConfig1d::Explicit(1))
                .init(device),
            global_pool: AdaptiveAvgPool1dConfig::new(1).init(),
            fc1: LinearConfig::new(64, HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(0.5).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, n_classes).init(device),
        }
    }
}

impl<B: Backend> SignalNet<B> for Cnn1d<B> {
    fn forward(&self, windows: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, len] = windows.dims();
        let x = windows.reshape([batch, 1, len]);
        let x = self.pool1.forward(relu(self.conv1.forward(x)));
        let x = self.pool2.forward(relu(self.conv2.forward(x)));
        let x = relu(self.conv3.forward(x));
        let x = self.global_pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 2);
        let x = self.dropout.forward(relu(self.fc1.forward(x)));
        self.fc2.forward(x)
    }
}
