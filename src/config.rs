// config.rs — JSON engine configuration.
//
// Every field has a default, so `{}` is a valid config:
//
//   {
//     "kernel_radius": 8,
//     "sigma": 3.0,
//     "workers": 2,
//     "bloom_threshold": 0.9,
//     "normalize": false,
//     "backend": "data_parallel",
//     "workgroup": { "x": 16, "y": 16 },
//     "kernel_source": "shaders/blur_axis.wgsl"
//   }
//
// `backend` is one of serial | row_partitioned | data_parallel |
// channel_pipeline | gpu. `workers` sizes row_partitioned and, when set,
// pins the data_parallel pool. `workgroup` and `kernel_source` only apply
// to the gpu backend.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::backend::{BackendKind, BlurBackend, ChannelPipeline, DataParallel, RowPartitioned, Serial};
use crate::bloom::BloomPipeline;
use crate::error::{BlurError, Result};
use crate::gpu::{GpuBlur, KernelSource, WorkgroupSize};
use crate::kernel::{KernelWeights, DEFAULT_RADIUS, DEFAULT_SIGMA};
use crate::luminance::DEFAULT_BRIGHT_RATIO;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub kernel_radius: usize,
    pub sigma: f32,
    /// Thread count for the CPU backends that take one.
    pub workers: Option<usize>,
    /// Fraction of the maximum luminance a pixel must exceed to bloom.
    pub bloom_threshold: f32,
    /// Stretch channels to the full range before blooming.
    pub normalize: bool,
    pub backend: BackendKind,
    pub workgroup: WorkgroupSize,
    /// WGSL file replacing the embedded kernel.
    pub kernel_source: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kernel_radius: DEFAULT_RADIUS,
            sigma: DEFAULT_SIGMA,
            workers: None,
            bloom_threshold: DEFAULT_BRIGHT_RATIO,
            normalize: false,
            backend: BackendKind::default(),
            workgroup: WorkgroupSize::default(),
            kernel_source: None,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: EngineConfig =
            serde_json::from_str(text).map_err(|e| BlurError::Config(format!("failed to parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(BlurError::InvalidSigma(self.sigma));
        }
        if let Some(0) = self.workers {
            return Err(BlurError::InvalidWorkerCount(0));
        }
        if !(0.0..=1.0).contains(&self.bloom_threshold) {
            return Err(BlurError::InvalidThreshold(self.bloom_threshold));
        }
        if self.workgroup.x == 0 || self.workgroup.y == 0 {
            return Err(BlurError::Config(format!(
                "workgroup dimensions must be non-zero (got {}×{})",
                self.workgroup.x, self.workgroup.y
            )));
        }
        Ok(())
    }

    /// Kernel table for the configured radius and sigma.
    pub fn kernel(&self) -> Result<KernelWeights> {
        KernelWeights::new(self.kernel_radius, self.sigma)
    }

    /// Kernel source for the gpu backend.
    pub fn kernel_source(&self) -> KernelSource {
        match &self.kernel_source {
            Some(path) => KernelSource::File(path.clone()),
            None => KernelSource::Embedded,
        }
    }

    /// Instantiate the configured backend.
    ///
    /// For `gpu` this acquires a device and compiles the kernel.
    pub fn build_backend(&self) -> Result<Box<dyn BlurBackend>> {
        let backend: Box<dyn BlurBackend> = match self.backend {
            BackendKind::Serial => Box::new(Serial),
            BackendKind::RowPartitioned => match self.workers {
                Some(n) => Box::new(RowPartitioned::new(n)?),
                None => Box::new(RowPartitioned::default()),
            },
            BackendKind::DataParallel => match self.workers {
                Some(n) => Box::new(DataParallel::with_threads(n)?),
                None => Box::new(DataParallel::new()),
            },
            BackendKind::ChannelPipeline => Box::new(ChannelPipeline),
            BackendKind::Gpu => Box::new(GpuBlur::with_source(&self.kernel_source(), self.workgroup)?),
        };
        log::info!("backend: {}", backend.name());
        Ok(backend)
    }

    /// Bloom pipeline over the configured backend and kernel.
    pub fn bloom_pipeline(&self) -> Result<BloomPipeline> {
        let pipeline = BloomPipeline::new(self.build_backend()?, self.kernel()?, self.bloom_threshold)?;
        Ok(pipeline.with_normalization(self.normalize))
    }
}

/// Read and validate a JSON config file.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let data = fs::read_to_string(path)
        .map_err(|e| BlurError::Config(format!("failed to read config {}: {e}", path.display())))?;
    EngineConfig::from_json(&data)
        .map_err(|e| match e {
            BlurError::Config(msg) => BlurError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let cfg = EngineConfig::from_json("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.kernel_radius, 8);
        assert_eq!(cfg.sigma, 3.0);
        assert_eq!(cfg.backend, BackendKind::DataParallel);
        assert_eq!(cfg.workgroup, WorkgroupSize { x: 16, y: 16 });
    }

    #[test]
    fn test_full_config() {
        let cfg = EngineConfig::from_json(
            r#"{
                "kernel_radius": 4,
                "sigma": 1.5,
                "workers": 3,
                "bloom_threshold": 0.75,
                "normalize": true,
                "backend": "row_partitioned",
                "workgroup": { "x": 8, "y": 8 },
                "kernel_source": "custom.wgsl"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.kernel().unwrap().len(), 9);
        assert_eq!(cfg.workers, Some(3));
        assert_eq!(cfg.backend, BackendKind::RowPartitioned);
        assert!(matches!(cfg.kernel_source(), KernelSource::File(p) if p.as_path() == Path::new("custom.wgsl")));

        let backend = cfg.build_backend().unwrap();
        assert_eq!(backend.name(), "row_partitioned");
        let bloom = cfg.bloom_pipeline().unwrap();
        assert_eq!(bloom.threshold(), 0.75);
    }

    #[test]
    fn test_every_cpu_backend_builds() {
        for kind in BackendKind::CPU {
            let cfg = EngineConfig { backend: kind, ..EngineConfig::default() };
            assert!(cfg.build_backend().is_ok(), "{kind:?}");
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"sigma": 0.0}"#),
            Err(BlurError::InvalidSigma(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"workers": 0}"#),
            Err(BlurError::InvalidWorkerCount(0))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"bloom_threshold": 2.0}"#),
            Err(BlurError::InvalidThreshold(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"backend": "opencl"}"#),
            Err(BlurError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"radius": 3}"#),
            Err(BlurError::Config(_))
        ));
    }

    #[test]
    fn test_missing_gpu_kernel_file_fails_before_device() {
        let cfg = EngineConfig {
            backend: BackendKind::Gpu,
            kernel_source: Some(PathBuf::from("/nonexistent/kernel.wgsl")),
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.build_backend(), Err(BlurError::KernelSource { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/sepconv.json")).unwrap_err();
        assert!(matches!(err, BlurError::Config(msg) if msg.contains("sepconv.json")));
    }
}
