// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select a real GPU over a software renderer.
//   - Request a device with storage-buffer limits large enough for
//     full-resolution RGBA frames.
//   - Hold the `WorkgroupSize` used to specialise and dispatch the blur
//     kernel, validated against the device's invocation limits.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` may pick llvmpipe/softpipe when they are
// the first device reported. We enumerate explicitly and prefer anything
// that is not `DeviceType::Cpu`, falling back to a software adapter only
// when nothing else exists.
//
// ERROR REPORTING:
// wgpu reports most failures asynchronously through error scopes instead
// of return values. Callers wrap each creation step in `push_error_scope` /
// `pop_error_scope` (see `GpuDevice::scoped`) so a failure surfaces as a
// `BlurError::Device` naming the stage instead of wgpu's default panic.
//
// LIFETIME:
// Every wgpu handle here is reference-counted and released on drop, so an
// early `?` return anywhere in setup releases whatever was created so far.

use std::fmt;

use crate::error::{BlurError, DeviceStage, Result};

/// A workgroup configuration for 2-D compute dispatches.
///
/// The blur kernel bakes these values into `@workgroup_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Number of workgroups needed to cover a `width × height` grid.
    ///
    /// Ceiling division: the last workgroup in each dimension may overhang
    /// the image, so the shader must guard
    /// `if gid.x >= width || gid.y >= height { return; }`.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(self.x), height.div_ceil(self.y))
    }

    /// Check both dimensions and the product against device limits.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<()> {
        let total = self.x.saturating_mul(self.y);
        if self.x == 0
            || self.y == 0
            || self.x > limits.max_compute_workgroup_size_x
            || self.y > limits.max_compute_workgroup_size_y
            || total > limits.max_compute_invocations_per_workgroup
        {
            return Err(BlurError::WorkgroupTooLarge {
                total,
                max: limits.max_compute_invocations_per_workgroup,
            });
        }
        Ok(())
    }
}

impl Default for WorkgroupSize {
    /// 16×16 = 256 invocations; within wgpu's default limits.
    fn default() -> Self {
        WorkgroupSize { x: 16, y: 16 }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device and queue, plus the active workgroup size.
///
/// # Field drop order
/// Rust drops fields top to bottom. `_instance` is last so the instance
/// outlives the device and queue created from it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a device on the best available adapter with the default
    /// 16×16 workgroup.
    ///
    /// # Errors
    /// `Device { stage: Adapter }` if no adapter is found,
    /// `Device { stage: Device }` if the device request fails.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        for a in &adapters {
            let info = a.get_info();
            log::info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Prefer real hardware; take a software adapter only as a last resort.
        let pick = adapters
            .iter()
            .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu)
            .or_else(|| (!adapters.is_empty()).then_some(0))
            .ok_or_else(|| BlurError::device(DeviceStage::Adapter, "no adapter found"))?;
        let adapter = adapters.swap_remove(pick);

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("falling back to software adapter {adapter_info}");
        }

        let supported = adapter.limits();
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sepconv"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| BlurError::device(DeviceStage::Device, e))?;

        // Anything that escapes an error scope is logged instead of
        // aborting the process.
        device.on_uncaptured_error(Box::new(|e| {
            log::error!("uncaptured wgpu error: {e}");
        }));

        log::info!("using {adapter_info}");
        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            workgroup_size: WorkgroupSize::default(),
            _instance: instance,
        })
    }

    /// Override the workgroup size after validating it against the device.
    pub fn set_workgroup_size(&mut self, size: WorkgroupSize) -> Result<()> {
        size.validate(&self.device.limits())?;
        self.workgroup_size = size;
        Ok(())
    }

    /// Workgroup counts covering an image with the active workgroup size.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.workgroup_size.dispatch_size(width, height)
    }

    /// Run `f` inside a validation + out-of-memory error scope and map any
    /// captured error to `BlurError::Device { stage }`.
    pub fn scoped<T>(&self, stage: DeviceStage, f: impl FnOnce() -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => Err(BlurError::device(stage, err)),
            None => Ok(value),
        }
    }

    /// Block until every submitted command has finished on the device.
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {} }}",
            self.adapter_info, self.workgroup_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that need an adapter are `#[ignore]`d so `cargo test` passes on
    // machines without one. Run them with `cargo test -- --include-ignored`.

    #[test]
    fn test_default_workgroup() {
        let ws = WorkgroupSize::default();
        assert_eq!(ws, WorkgroupSize { x: 16, y: 16 });
        assert_eq!(ws.total(), 256);
    }

    #[test]
    fn test_dispatch_size_exact() {
        let ws = WorkgroupSize { x: 16, y: 16 };
        assert_eq!(ws.dispatch_size(640, 480), (40, 30));
    }

    #[test]
    fn test_dispatch_size_ceiling() {
        let ws = WorkgroupSize { x: 16, y: 8 };
        assert_eq!(ws.dispatch_size(100, 100), (7, 13));
        assert_eq!(ws.dispatch_size(1, 1), (1, 1));
    }

    #[test]
    fn test_validate_against_default_limits() {
        let limits = wgpu::Limits::default();
        assert!(WorkgroupSize { x: 16, y: 16 }.validate(&limits).is_ok());
        assert!(WorkgroupSize { x: 8, y: 8 }.validate(&limits).is_ok());
        let err = WorkgroupSize { x: 32, y: 16 }.validate(&limits).unwrap_err();
        assert!(matches!(err, BlurError::WorkgroupTooLarge { total: 512, max: 256 }));
        assert!(WorkgroupSize { x: 0, y: 4 }.validate(&limits).is_err());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_device_init() {
        let mut gpu = GpuDevice::new().expect("should initialise a device");
        println!("{gpu}");
        gpu.set_workgroup_size(WorkgroupSize { x: 8, y: 8 }).unwrap();
        assert_eq!(gpu.workgroup_size.total(), 64);
    }
}
