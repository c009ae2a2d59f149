//! Backend selection
//!
//! The default backend is `ndarray` (CPU). Enabling the `wgpu` feature
//! switches training and inference to the GPU.

use burn::backend::Autodiff;

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("At least one backend (ndarray or wgpu) must be enabled!");

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device for the selected backend
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu")]
    {
        "WGPU (GPU)"
    }
    #[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
    {
        "NdArray (CPU)"
    }
}
