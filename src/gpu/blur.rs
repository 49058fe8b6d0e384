// gpu/blur.rs — Separable blur as a wgpu compute kernel.
//
// One compute pipeline (`blur_axis`) serves both axes; the axis, image size
// and radius travel in a small uniform. A run over N axes ping-pongs
// between two device buffers:
//
//   input ──H──▶ ping ──V──▶ pong ──copy──▶ readback
//
// Each pass is submitted on its own and followed by `poll(Maintain::Wait)`,
// so pass n+1 is never recorded until every invocation of pass n finished
// on the device. The vertical pass reads rows written by other workgroups,
// so this full completion is required between passes.
//
// Buffer layout: one RGBA8 pixel per u32 (little-endian), which is exactly
// the byte layout of `RgbaImage`, so uploads and readbacks are plain casts.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;

use wgpu::util::DeviceExt;

use crate::backend::BlurBackend;
use crate::convolution::Axis;
use crate::error::{BlurError, DeviceStage, Result};
use crate::gpu::device::{GpuDevice, WorkgroupSize};
use crate::image::RgbaImage;
use crate::kernel::KernelWeights;

const ENTRY_POINT: &str = "blur_axis";

// ---------------------------------------------------------------------------
// Kernel source
// ---------------------------------------------------------------------------

/// Where the WGSL text of the blur kernel comes from.
///
/// The text may contain `{{WG_X}}` / `{{WG_Y}}` placeholders, which are
/// replaced with the device's workgroup size before compilation.
#[derive(Debug, Clone, Default)]
pub enum KernelSource {
    /// The kernel compiled into the crate.
    #[default]
    Embedded,
    /// Read from disk when the pipeline is built.
    File(PathBuf),
    /// Caller-supplied WGSL text.
    Inline(String),
}

impl KernelSource {
    /// # Errors
    /// `KernelSource` if a `File` source cannot be read.
    pub fn load(&self) -> Result<Cow<'_, str>> {
        match self {
            KernelSource::Embedded => Ok(Cow::Borrowed(include_str!("../shaders/blur_axis.wgsl"))),
            KernelSource::Inline(text) => Ok(Cow::Borrowed(text)),
            KernelSource::File(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| BlurError::KernelSource {
                    path: path.clone(),
                    source,
                }),
        }
    }

    fn label(&self) -> String {
        match self {
            KernelSource::Embedded => "blur_axis.wgsl".to_string(),
            KernelSource::File(path) => path.display().to_string(),
            KernelSource::Inline(_) => "inline blur kernel".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct Params exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    width: u32,
    height: u32,
    radius: u32,
    axis: u32,
}

// ---------------------------------------------------------------------------
// GpuBlurPipeline
// ---------------------------------------------------------------------------

/// Compiled `blur_axis` pipeline plus its bind group layout.
///
/// Build once per device; [`run`](Self::run) allocates per-call buffers,
/// which are released when it returns (on success or error).
pub struct GpuBlurPipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

impl GpuBlurPipeline {
    /// Load, specialise and compile the kernel for `gpu`'s workgroup size.
    ///
    /// The kernel text is loaded before any device object is created, so a
    /// missing file fails without touching the device.
    pub fn new(gpu: &GpuDevice, source: &KernelSource) -> Result<Self> {
        let template = source.load()?;
        Self::from_wgsl(gpu, &template, &source.label())
    }

    /// Specialise and compile already loaded WGSL text.
    pub fn from_wgsl(gpu: &GpuDevice, template: &str, label: &str) -> Result<Self> {
        let shader_src = template
            .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
            .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string());

        let shader = gpu.scoped(DeviceStage::ShaderCompile, || {
            gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(shader_src.into()),
            })
        })?;

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let (pipeline, bgl) = gpu.scoped(DeviceStage::Pipeline, || {
            let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("GpuBlur BGL"),
                entries: &[
                    // 0 — source pixels
                    storage(0, true),
                    // 1 — destination pixels
                    storage(1, false),
                    // 2 — kernel weights
                    storage(2, true),
                    // 3 — params uniform
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
            let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("GpuBlur pipeline layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(ENTRY_POINT),
                layout: Some(&layout),
                module: &shader,
                entry_point: ENTRY_POINT,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (pipeline, bgl)
        })?;

        log::info!("compiled {label} for workgroup {}", gpu.workgroup_size);
        Ok(GpuBlurPipeline { pipeline, bgl })
    }

    /// Run one pass per entry of `axes`, in order, and read the result back.
    ///
    /// # Errors
    /// `EmptyImage` for an image without pixels, before any device work.
    pub fn run(
        &self,
        gpu: &GpuDevice,
        src: &RgbaImage,
        axes: &[Axis],
        weights: &KernelWeights,
    ) -> Result<RgbaImage> {
        src.ensure_not_empty()?;
        if axes.is_empty() {
            return Ok(src.clone());
        }
        let start = Instant::now();
        let (width, height) = image_extent(src)?;
        let bytes = src.as_slice().len() as u64;
        let max_binding = u64::from(gpu.device.limits().max_storage_buffer_binding_size);
        if bytes > max_binding {
            return Err(BlurError::device(
                DeviceStage::Buffer,
                format!("{bytes}-byte image exceeds the {max_binding}-byte storage binding limit"),
            ));
        }

        let (input, ping_pong, weight_buf, readback) = gpu.scoped(DeviceStage::Buffer, || {
            let input = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuBlur input"),
                contents: src.as_slice(),
                usage: wgpu::BufferUsages::STORAGE,
            });
            let work = |label| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size: bytes,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                })
            };
            let ping_pong = [work("GpuBlur ping"), work("GpuBlur pong")];
            let weight_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuBlur weights"),
                contents: bytemuck::cast_slice(weights.as_slice()),
                usage: wgpu::BufferUsages::STORAGE,
            });
            let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("GpuBlur readback"),
                size: bytes,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            (input, ping_pong, weight_buf, readback)
        })?;

        let (wg_x, wg_y) = gpu.dispatch_size(width, height);
        for (i, &axis) in axes.iter().enumerate() {
            let from = if i == 0 { &input } else { &ping_pong[(i - 1) % 2] };
            let to = &ping_pong[i % 2];
            let is_last = i + 1 == axes.len();

            gpu.scoped(DeviceStage::Dispatch, || {
                let params = BlurParams {
                    width,
                    height,
                    radius: weights.radius() as u32,
                    axis: axis.as_u32(),
                };
                let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("GpuBlur params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("GpuBlur BG"),
                    layout: &self.bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: from.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: to.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 2, resource: weight_buf.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 3, resource: params_buf.as_entire_binding() },
                    ],
                });

                let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("GpuBlur dispatch"),
                });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(ENTRY_POINT),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(wg_x, wg_y, 1);
                }
                if is_last {
                    encoder.copy_buffer_to_buffer(to, 0, &readback, 0, bytes);
                }
                gpu.queue.submit(std::iter::once(encoder.finish()));
            })?;
            gpu.wait_idle();
            log::debug!("gpu: {axis:?} pass done at {:.2?}", start.elapsed());
        }

        let data = read_back(gpu, &readback)?;
        log::debug!(
            "gpu: {} pass(es) over {width}×{height} in {:.2?}",
            axes.len(),
            start.elapsed()
        );
        RgbaImage::from_vec(src.width(), src.height(), data)
    }
}

impl fmt::Debug for GpuBlurPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBlurPipeline").finish_non_exhaustive()
    }
}

fn image_extent(src: &RgbaImage) -> Result<(u32, u32)> {
    let too_large = |_| {
        BlurError::device(
            DeviceStage::Buffer,
            format!("{}×{} exceeds u32 dimensions", src.width(), src.height()),
        )
    };
    Ok((
        u32::try_from(src.width()).map_err(too_large)?,
        u32::try_from(src.height()).map_err(too_large)?,
    ))
}

fn read_back(gpu: &GpuDevice, readback: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = readback.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    gpu.wait_idle();
    rx.recv()
        .map_err(|e| BlurError::device(DeviceStage::Readback, e))?
        .map_err(|e| BlurError::device(DeviceStage::Readback, e))?;

    let data = slice.get_mapped_range().to_vec();
    readback.unmap();
    Ok(data)
}

// ---------------------------------------------------------------------------
// GpuBlur — BlurBackend on a device
// ---------------------------------------------------------------------------

/// A device together with a compiled blur pipeline.
///
/// # Field drop order
/// `pipeline` is declared first so it is released before the device it was
/// created on.
pub struct GpuBlur {
    pipeline: GpuBlurPipeline,
    gpu: GpuDevice,
}

impl GpuBlur {
    /// Acquire a device and compile the embedded kernel.
    pub fn new() -> Result<Self> {
        Self::with_device(GpuDevice::new()?, &KernelSource::Embedded)
    }

    /// Load `source`, then acquire a device with the given workgroup size
    /// and compile the kernel on it.
    ///
    /// A missing kernel file is reported before the device is requested.
    pub fn with_source(source: &KernelSource, workgroup: WorkgroupSize) -> Result<Self> {
        let template = source.load()?;
        let mut gpu = GpuDevice::new()?;
        gpu.set_workgroup_size(workgroup)?;
        let pipeline = GpuBlurPipeline::from_wgsl(&gpu, &template, &source.label())?;
        Ok(GpuBlur { pipeline, gpu })
    }

    /// Compile `source` on an already configured device.
    pub fn with_device(gpu: GpuDevice, source: &KernelSource) -> Result<Self> {
        let pipeline = GpuBlurPipeline::new(&gpu, source)?;
        Ok(GpuBlur { pipeline, gpu })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }
}

impl BlurBackend for GpuBlur {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn blur_pass(&self, src: &RgbaImage, axis: Axis, weights: &KernelWeights) -> Result<RgbaImage> {
        self.pipeline.run(&self.gpu, src, &[axis], weights)
    }

    /// Both passes in one upload/readback round trip.
    fn blur(&self, src: &RgbaImage, weights: &KernelWeights) -> Result<RgbaImage> {
        self.pipeline
            .run(&self.gpu, src, &[Axis::Horizontal, Axis::Vertical], weights)
    }
}
