// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// Training code is generic over `B: AutodiffBackend`. The
// backend itself is picked at runtime from the `--device` flag:
//
//   cpu   → Autodiff<NdArray>
//   wgpu  → Autodiff<Wgpu>   (cargo feature "wgpu")
//
// A pipeline that needs a backend implements BackendTask and is
// handed to `dispatch`, which monomorphises it for the chosen one.

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

pub type CpuBackend = Autodiff<NdArray>;

#[cfg(feature = "wgpu")]
pub type WgpuBackend = Autodiff<burn::backend::Wgpu>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    #[default]
    Cpu,
    Wgpu,
}

pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Self::Output>;
}

pub fn dispatch<T: BackendTask>(accelerator: Accelerator, task: T) -> Result<T::Output> {
    match accelerator {
        Accelerator::Cpu => {
            tracing::info!("Using NdArray CPU backend");
            task.run::<CpuBackend>(NdArrayDevice::Cpu)
        }
        #[cfg(feature = "wgpu")]
        Accelerator::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            task.run::<WgpuBackend>(device)
        }
        #[cfg(not(feature = "wgpu"))]
        Accelerator::Wgpu => {
            anyhow::bail!("This build has no WGPU support; rebuild with `--features wgpu` or use `--device cpu`")
        }
    }
}
