use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{sigmoid, tanh},
};

#[derive(Config, Debug)]
pub struct FeatureMaskConfig {
    pub dim: usize,
}

impl FeatureMaskConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureMask<B> {
        FeatureMask {
            gate_in:  LinearConfig::new(self.dim, self.dim).init(device),
            gate_out: LinearConfig::new(self.dim, self.dim).init(device),
        }
    }
}

/// Gate network `Linear → tanh → Linear → sigmoid` over fused
/// behaviour/sensitive features.
#[derive(Module, Debug)]
pub struct FeatureMask<B: Backend> {
    pub gate_in:  Linear<B>,
    pub gate_out: Linear<B>,
}

impl<B: Backend> FeatureMask<B> {
    /// Gate values in (0, 1).
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.gate_out.forward(tanh(self.gate_in.forward(x))))
    }

    /// Per-feature rescaling `1 + exp(-gate(x))`, in (1 + 1/e, 2).
    pub fn scale(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(x).neg().exp().add_scalar(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_scale_range() {
        let device = Default::default();
        let mask: FeatureMask<TestBackend> = FeatureMaskConfig::new(6).init(&device);
        let x = Tensor::<TestBackend, 2>::random(
            [5, 6],
            burn::tensor::Distribution::Normal(0.0, 3.0),
            &device,
        );

        let scale: Vec<f32> = mask.scale(x).into_data().to_vec().unwrap();
        let low = 1.0 + (-1.0f32).exp();
        assert_eq!(scale.len(), 30);
        assert!(scale.iter().all(|&s| s >= low - 1e-6 && s <= 2.0 + 1e-6));
    }
}
