use burn::module::Module;
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm, LstmConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::SignalNet;

/// Samples per time step: a 2048-sample window becomes 32 steps of 64.
pub const FRAME_LEN: usize = 64;
const HIDDEN_SIZE: usize = 64;

/// `[batch, len]` windows as `[batch, len / FRAME_LEN, FRAME_LEN]` sequences.
fn frames<B: Backend>(windows: Tensor<B, 2>) -> Tensor<B, 3> {
    let [batch, len] = windows.dims();
    windows.reshape([batch, len / FRAME_LEN, FRAME_LEN])
}

/// Hidden state of the final time step, `[batch, hidden]`.
fn last_step<B: Backend>(sequence: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, steps, hidden] = sequence.dims();
    sequence
        .narrow(1, steps - 1, 1)
        .reshape([batch, hidden])
}

#[derive(Module, Debug)]
pub struct LstmNet<B: Backend> {
    lstm: Lstm<B>,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> LstmNet<B> {
    pub fn new(n_classes: usize, device: &B::Device) -> Self {
        Self {
            lstm: LstmConfig::new(FRAME_LEN, HIDDEN_SIZE, true).init(device),
            dropout: DropoutConfig::new(0.2).init(),
            head: LinearConfig::new(HIDDEN_SIZE, n_classes).init(device),
        }
    }
}

impl<B: Backend> SignalNet<B> for LstmNet<B> {
    fn forward(&self, windows: Tensor<B, 2>) -> Tensor<B, 2> {
        let (sequence, _state) = self.lstm.forward(frames(windows), None);
        self.head.forward(self.dropout.forward(last_step(sequence)))
    }
}

#[derive(Module, Debug)]
pub struct GruNet<B: Backend> {
    gru: Gru<B>,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> GruNet<B> {
    pub fn new(n_classes: usize, device: &B::Device) -> Self {
        Self {
            gru: GruConfig::new(FRAME_LEN, HIDDEN_SIZE, true).init(device),
            dropout: DropoutConfig::new(0.2).init(),
            head: LinearConfig::new(HIDDEN_SIZE, n_classes).init(device),
        }
    }
}

impl<B: Backend> SignalNet<B> for GruNet<B> {
    fn forward(&self, windows: Tensor<B, 2>) -> Tensor<B, 2> {
        let sequence = self.gru.forward(frames(windows), None);
        self.head.forward(self.dropout.forward(last_step(sequence)))
    }
}
