//! Back-propagation network over a sliding window of failure intervals.
//!
//! Each training sample maps the previous `window` min-max scaled TBF values
//! to the next one through a single sigmoid hidden layer and a linear
//! output. Training is full-batch gradient descent with momentum on the
//! mean squared error. Weights start from a seeded generator, so a given
//! training prefix always produces the same network.
//!
//! Inside the training prefix the network predicts one step ahead from the
//! observed window. Past it, forecasts are fed back in as inputs.

use std::collections::BTreeMap;
use std::iter;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::FitError;

/// Floor for forecast intervals; time between failures cannot be negative.
const MIN_TBF: f64 = 1e-6;

/// Upper bounds on request-supplied network sizes.
const MAX_WINDOW: usize = 64;
const MAX_HIDDEN: usize = 256;
const MAX_EPOCHS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpConfig {
    /// Lagged intervals fed to the network.
    pub window: usize,
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub seed: u64,
}

impl Default for BpConfig {
    fn default() -> Self {
        Self {
            window: 3,
            hidden: 16,
            epochs: 2000,
            learning_rate: 0.05,
            momentum: 0.9,
            seed: 42,
        }
    }
}

impl BpConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        let sizes = [
            ("window", self.window, MAX_WINDOW),
            ("hidden", self.hidden, MAX_HIDDEN),
            ("epochs", self.epochs, MAX_EPOCHS),
        ];
        for (name, value, max) in sizes {
            if value == 0 || value > max {
                return Err(FitError::InvalidDomain(format!(
                    "{} must lie in 1..={}, got {}",
                    name, max, value
                )));
            }
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(FitError::InvalidDomain(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(FitError::InvalidDomain(format!(
                "momentum must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

/// Weights of the window -> hidden -> 1 network. Gradients and momentum
/// buffers share the layout.
#[derive(Debug, Clone, PartialEq)]
struct Network {
    window: usize,
    /// Row-major `hidden x window`.
    input_weights: Vec<f64>,
    hidden_bias: Vec<f64>,
    output_weights: Vec<f64>,
    output_bias: f64,
}

impl Network {
    fn zeros(window: usize, hidden: usize) -> Self {
        Self {
            window,
            input_weights: vec![0.0; hidden * window],
            hidden_bias: vec![0.0; hidden],
            output_weights: vec![0.0; hidden],
            output_bias: 0.0,
        }
    }

    /// Xavier-uniform weights, zero biases.
    fn init(window: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let mut net = Self::zeros(window, hidden);
        let input_limit = (6.0 / (window + hidden) as f64).sqrt();
        let output_limit = (6.0 / (hidden + 1) as f64).sqrt();
        for w in &mut net.input_weights {
            *w = rng.gen_range(-input_limit..input_limit);
        }
        for w in &mut net.output_weights {
            *w = rng.gen_range(-output_limit..output_limit);
        }
        net
    }

    fn hidden(&self, input: &[f64]) -> Vec<f64> {
        self.input_weights
            .chunks(self.window)
            .zip(&self.hidden_bias)
            .map(|(row, bias)| {
                let z: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + bias;
                1.0 / (1.0 + (-z).exp())
            })
            .collect()
    }

    fn output_from(&self, hidden: &[f64]) -> f64 {
        self.output_weights
            .iter()
            .zip(hidden)
            .map(|(w, h)| w * h)
            .sum::<f64>()
            + self.output_bias
    }

    fn output(&self, input: &[f64]) -> f64 {
        self.output_from(&self.hidden(input))
    }

    /// Mean squared error over the training pairs, and its gradient.
    fn gradient(&self, inputs: &[&[f64]], targets: &[f64]) -> (Self, f64) {
        let mut grad = Self::zeros(self.window, self.hidden_bias.len());
        let m = targets.len() as f64;
        let mut loss = 0.0;
        for (input, target) in inputs.iter().zip(targets) {
            let hidden = self.hidden(input);
            let err = self.output_from(&hidden) - target;
            loss += err * err / m;

            let d_out = 2.0 * err / m;
            grad.output_bias += d_out;
            for (j, h) in hidden.iter().enumerate() {
                grad.output_weights[j] += d_out * h;
                let d_z = d_out * self.output_weights[j] * h * (1.0 - h);
                grad.hidden_bias[j] += d_z;
                let row = &mut grad.input_weights[j * self.window..(j + 1) * self.window];
                for (g, x) in row.iter_mut().zip(input.iter()) {
                    *g += d_z * x;
                }
            }
        }
        (grad, loss)
    }

    fn params_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.input_weights
            .iter_mut()
            .chain(self.hidden_bias.iter_mut())
            .chain(self.output_weights.iter_mut())
            .chain(iter::once(&mut self.output_bias))
    }

    fn params(&self) -> impl Iterator<Item = &f64> {
        self.input_weights
            .iter()
            .chain(self.hidden_bias.iter())
            .chain(self.output_weights.iter())
            .chain(iter::once(&self.output_bias))
    }

    fn step(&mut self, velocity: &mut Self, grad: &Self, config: &BpConfig) {
        for ((param, v), g) in self.params_mut().zip(velocity.params_mut()).zip(grad.params()) {
            *v = config.momentum * *v - config.learning_rate * g;
            *param += *v;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BpNetwork {
    config: BpConfig,
    network: Network,
    tbf_min: f64,
    tbf_span: f64,
    /// Scaled intervals the first forecast is made from.
    last_window: Vec<f64>,
    /// One-step-ahead fitted TBF for training indices `window..`.
    fitted_tbf: Vec<f64>,
    pub final_loss: f64,
}

impl BpNetwork {
    pub fn fit(train: &[f64], config: &BpConfig) -> Result<Self, FitError> {
        config.validate()?;
        let window = config.window;
        if train.len() <= window {
            return Err(FitError::InsufficientData {
                needed: window + 1,
                have: train.len(),
            });
        }

        let tbf_min = train.iter().copied().fold(f64::INFINITY, f64::min);
        let tbf_max = train.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // A constant prefix scales to all zeros.
        let tbf_span = if tbf_max > tbf_min { tbf_max - tbf_min } else { 1.0 };
        let scaled: Vec<f64> = train.iter().map(|x| (x - tbf_min) / tbf_span).collect();

        let inputs: Vec<&[f64]> = scaled.windows(window).take(scaled.len() - window).collect();
        let targets = &scaled[window..];

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut network = Network::init(window, config.hidden, &mut rng);
        let mut velocity = Network::zeros(window, config.hidden);
        for epoch in 0..config.epochs {
            let (grad, loss) = network.gradient(&inputs, targets);
            if !loss.is_finite() {
                return Err(FitError::NonConvergence(format!(
                    "training loss diverged at epoch {}",
                    epoch
                )));
            }
            network.step(&mut velocity, &grad, config);
        }
        let (_, final_loss) = network.gradient(&inputs, targets);
        if !final_loss.is_finite() {
            return Err(FitError::NonConvergence("training loss diverged".into()));
        }

        let fitted_tbf = inputs
            .iter()
            .map(|input| (network.output(input) * tbf_span + tbf_min).max(MIN_TBF))
            .collect();

        Ok(Self {
            config: *config,
            network,
            tbf_min,
            tbf_span,
            last_window: scaled[scaled.len() - window..].to_vec(),
            fitted_tbf,
            final_loss,
        })
    }

    pub fn predict(&self, train_times: &[f64], len: usize) -> Vec<Option<f64>> {
        let window = self.config.window;
        let train_len = train_times.len().min(len);

        let mut predicted: Vec<Option<f64>> = (0..train_len)
            .map(|i| {
                let prev = i.checked_sub(1).map(|p| train_times[p])?;
                let tbf = i.checked_sub(window).and_then(|s| self.fitted_tbf.get(s))?;
                Some(prev + tbf)
            })
            .collect();

        let mut inputs = self.last_window.clone();
        let mut last = train_times.last().copied().unwrap_or(0.0);
        for _ in train_len..len {
            let scaled = self.network.output(&inputs);
            last += (scaled * self.tbf_span + self.tbf_min).max(MIN_TBF);
            predicted.push(Some(last));
            inputs.remove(0);
            inputs.push(scaled);
        }
        predicted
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("window".to_string(), self.config.window as f64),
            ("hidden".to_string(), self.config.hidden as f64),
            ("epochs".to_string(), self.config.epochs as f64),
            ("learning_rate".to_string(), self.config.learning_rate),
            ("momentum".to_string(), self.config.momentum),
            ("final_loss".to_string(), self.final_loss),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::cumulative;

    fn ramp() -> Vec<f64> {
        (1..=18).map(|i| 3.0 + 2.0 * i as f64).collect()
    }

    #[test]
    fn test_learns_linear_ramp() {
        let train = ramp();
        let model = BpNetwork::fit(&train, &BpConfig::default()).unwrap();
        assert!(model.final_loss < 0.01, "loss {}", model.final_loss);

        let times = cumulative(&train);
        let predicted = model.predict(&times, train.len() + 4);
        assert_eq!(predicted.len(), 22);
        assert!(predicted[..3].iter().all(Option::is_none));
        assert!(predicted[3..].iter().all(Option::is_some));

        // Next interval after 39 should be close to 41.
        let first_step = predicted[18].unwrap() - times[17];
        assert!((first_step - 41.0).abs() < 4.0, "step {}", first_step);
    }

    #[test]
    fn test_forecast_is_increasing() {
        let train = [0.1, 0.3, 0.2, 0.5, 0.4, 0.7, 0.9];
        let model = BpNetwork::fit(&train, &BpConfig::default()).unwrap();
        let predicted = model.predict(&cumulative(&train), 12);
        let forecast: Vec<f64> = predicted[7..].iter().map(|p| p.unwrap()).collect();
        assert!(forecast.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_same_seed_same_network() {
        let a = BpNetwork::fit(&ramp(), &BpConfig::default()).unwrap();
        let b = BpNetwork::fit(&ramp(), &BpConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_needs_more_than_one_window() {
        assert_eq!(
            BpNetwork::fit(&[1.0, 2.0, 3.0], &BpConfig::default()),
            Err(FitError::InsufficientData { needed: 4, have: 3 })
        );
    }

    #[test]
    fn test_invalid_config() {
        let config = BpConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            BpNetwork::fit(&ramp(), &config),
            Err(FitError::InvalidDomain(_))
        ));
        let config = BpConfig {
            momentum: 1.0,
            ..Default::default()
        };
        assert!(BpNetwork::fit(&ramp(), &config).is_err());
        let config = BpConfig {
            hidden: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(
            BpNetwork::fit(&ramp(), &config),
            Err(FitError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_constant_prefix() {
        let train = [7.0; 8];
        let model = BpNetwork::fit(&train, &BpConfig::default()).unwrap();
        let predicted = model.predict(&cumulative(&train), 10);
        let step = predicted[9].unwrap() - predicted[8].unwrap();
        assert!((step - 7.0).abs() < 0.5);
    }
}
