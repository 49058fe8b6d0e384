// error.rs — Error type shared by every stage of the engine.
//
// Runtime failures (bad input buffers, device setup, kernel source I/O) come
// back as `BlurError`. Caller contract violations inside the crate (e.g. a
// row slice of the wrong length handed to a pass) stay as panics.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BlurError>;

/// Which part of the device-offload sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStage {
    /// No usable adapter was enumerated.
    Adapter,
    /// `request_device` failed.
    Device,
    /// The WGSL kernel did not compile.
    ShaderCompile,
    /// Compute pipeline / bind group layout creation failed.
    Pipeline,
    /// Buffer allocation or upload failed.
    Buffer,
    /// A kernel dispatch was rejected by validation.
    Dispatch,
    /// Mapping the readback buffer failed.
    Readback,
}

impl fmt::Display for DeviceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStage::Adapter => "adapter",
            DeviceStage::Device => "device",
            DeviceStage::ShaderCompile => "shader compile",
            DeviceStage::Pipeline => "pipeline",
            DeviceStage::Buffer => "buffer",
            DeviceStage::Dispatch => "dispatch",
            DeviceStage::Readback => "readback",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the blur / bloom engine.
#[derive(Debug, thiserror::Error)]
pub enum BlurError {
    /// The decoder handed us an image with no pixels.
    #[error("input image is empty ({width}×{height})")]
    EmptyImage { width: usize, height: usize },

    /// Buffer length does not match `width * height * 4`.
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Two images that must share a shape do not.
    #[error("image dimensions differ: {a:?} vs {b:?}")]
    DimensionMismatch { a: (usize, usize), b: (usize, usize) },

    #[error("sigma must be positive and finite (got {0})")]
    InvalidSigma(f32),

    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("bloom threshold must lie in [0, 1] (got {0})")]
    InvalidThreshold(f32),

    /// Kernel source could not be read. Raised before any device resource
    /// is acquired.
    #[error("failed to load kernel source from {}", path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A device call failed; `stage` names the step of the sequence.
    #[error("device failure at {stage} stage: {message}")]
    Device { stage: DeviceStage, message: String },

    #[error("workgroup size {total} exceeds device limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("a blur worker thread panicked")]
    WorkerPanicked,

    #[error("configuration error: {0}")]
    Config(String),
}

impl BlurError {
    pub(crate) fn device(stage: DeviceStage, message: impl fmt::Display) -> Self {
        BlurError::Device {
            stage,
            message: message.to_string(),
        }
    }
}
