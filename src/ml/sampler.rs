// ============================================================
// Layer 5 — Relaxed Bernoulli (straight-through) sampler
// ============================================================
// Binary Concrete relaxation of a Bernoulli(p) draw:
//
//   logits = log p − log(1 − p)
//   noise  = log u − log(1 − u),   u ~ U(0, 1)
//   soft   = σ((logits + noise) / τ)
//   hard   = [soft ≥ 0.5]
//
// The returned tensor is `hard − detach(soft) + soft`: its value
// is the hard 0/1 sample, its gradient is the soft sample's.
// P(hard = 1) = p for every temperature τ.

use burn::{
    prelude::*,
    tensor::{activation::sigmoid, Distribution},
};

/// Probabilities and uniforms are kept this far away from 0 and 1.
const PROB_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct RelaxedBernoulli {
    temperature: f64,
}

impl RelaxedBernoulli {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }

    /// Reparameterised sample with the same shape as `probs`.
    pub fn rsample<B: Backend, const D: usize>(&self, probs: Tensor<B, D>) -> Tensor<B, D> {
        let soft = self.soft_sample(probs);
        let hard = soft.clone().greater_equal_elem(0.5).float();
        hard - soft.clone().detach() + soft
    }

    /// The relaxed sample alone, values in (0, 1).
    pub fn soft_sample<B: Backend, const D: usize>(&self, probs: Tensor<B, D>) -> Tensor<B, D> {
        let device = probs.device();
        let probs  = probs.clamp(PROB_EPS, 1.0 - PROB_EPS);
        let logits = probs.clone().log() - probs.neg().add_scalar(1.0).log();

        let uniform = Tensor::<B, D>::random(
            logits.shape(),
            Distribution::Uniform(PROB_EPS, 1.0 - PROB_EPS),
            &device,
        );
        let noise = uniform.clone().log() - uniform.neg().add_scalar(1.0).log();

        sigmoid((logits + noise).div_scalar(self.temperature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn sample(p: f32, n: usize) -> Vec<f32> {
        let probs = Tensor::<TestBackend, 1>::full([n], p, &Default::default());
        RelaxedBernoulli::new(1.0).rsample(probs).into_data().to_vec().unwrap()
    }

    #[test]
    fn test_values_are_binary() {
        for v in sample(0.5, 500) {
            assert!(v.abs() < 1e-5 || (v - 1.0).abs() < 1e-5, "{v}");
        }
    }

    #[test]
    fn test_extreme_probabilities() {
        assert!(sample(1.0, 200).iter().all(|&v| v > 0.5));
        assert!(sample(0.0, 200).iter().all(|&v| v < 0.5));
    }

    #[test]
    fn test_keep_rate_matches_probability() {
        TestBackend::seed(3);
        let draws = sample(0.3, 20_000);
        let rate = draws.iter().filter(|&&v| v > 0.5).count() as f32 / draws.len() as f32;
        assert!((rate - 0.3).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn test_gradient_flows_through_soft_sample() {
        type Ad = Autodiff<NdArray>;
        let probs = Tensor::<Ad, 1>::full([16], 0.4, &Default::default()).require_grad();
        let out = RelaxedBernoulli::new(0.5).rsample(probs.clone());
        let grads = out.sum().backward();
        let g: Vec<f32> = probs.grad(&grads).unwrap().into_data().to_vec().unwrap();
        assert!(g.iter().all(|v| v.is_finite()));
        assert!(g.iter().any(|&v| v != 0.0));
    }
}
