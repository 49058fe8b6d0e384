// gpu/mod.rs — wgpu offload of the separable blur.
//
// The CPU passes in `convolution` remain the reference: the device kernel
// mirrors `convolution::sample` (same taps, same clamp, same per-sample
// weight sum) and is checked against it to within one unit per sample.
//
// The host only uploads the frame once and reads it back once per blur; the
// intermediate horizontal result never leaves the device.

pub mod blur;
pub mod device;

pub use blur::{GpuBlur, GpuBlurPipeline, KernelSource};
pub use device::{AdapterInfo, GpuDevice, WorkgroupSize};
