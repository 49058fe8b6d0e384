// sepconv: parallel separable Gaussian blur and bloom for RGBA8 frames
//
// CPU reference passes plus interchangeable execution backends (scoped
// threads over row ranges, rayon work stealing, a barrier-synchronized
// per-channel pipeline, and a wgpu compute kernel), all computing the same
// edge-clamped Gaussian.

pub mod image;
pub mod kernel;
pub mod convolution;
pub mod partition;
pub mod normalize;
pub mod luminance;
pub mod composite;
pub mod backend;
pub mod gpu;
pub mod bloom;
pub mod config;
pub mod error;

pub use backend::{BackendKind, BlurBackend, ChannelPipeline, DataParallel, RowPartitioned, Serial};
pub use bloom::{BloomOutput, BloomPipeline};
pub use config::{load_config, EngineConfig};
pub use convolution::Axis;
pub use error::{BlurError, Result};
pub use image::RgbaImage;
pub use kernel::KernelWeights;
