// tests/test_backends.rs — Every execution backend against the serial
// reference, plus partition coverage and run-to-run determinism.
//
// GPU cases need an adapter and are ignored by default:
//   cargo test --test test_backends -- --include-ignored

use sepconv::backend::{
    BackendKind, BlurBackend, ChannelPipeline, DataParallel, RowPartitioned, Serial,
};
use sepconv::config::EngineConfig;
use sepconv::convolution::Axis;
use sepconv::gpu::GpuBlur;
use sepconv::image::RgbaImage;
use sepconv::kernel::KernelWeights;
use sepconv::partition::PartitionPlan;
use sepconv::BlurError;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Textured test frame: gradients, a checkerboard and a few hard edges.
fn make_scene(w: usize, h: usize) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let checker = if (x / 4 + y / 4) % 2 == 0 { 220 } else { 30 };
        let square = if (w / 3..w / 2).contains(&x) && (h / 4..h / 2).contains(&y) { 255 } else { 0 };
        [
            ((x * 251 / w.max(1)) % 256) as u8,
            checker,
            square,
            ((x * 7 + y * 13) % 256) as u8,
        ]
    })
}

fn cpu_backends() -> Vec<Box<dyn BlurBackend>> {
    vec![
        Box::new(Serial),
        Box::new(RowPartitioned::default()),
        Box::new(RowPartitioned::new(5).unwrap()),
        Box::new(DataParallel::new()),
        Box::new(DataParallel::with_threads(3).unwrap()),
        Box::new(ChannelPipeline),
    ]
}

// ===== Equivalence =====

#[test]
fn cpu_backends_are_bit_identical() {
    init_logging();
    let k = KernelWeights::default();
    for (w, h) in [(64, 48), (17, 5), (5, 17), (1, 33), (33, 1)] {
        let img = make_scene(w, h);
        let reference = Serial.blur(&img, &k).unwrap();
        for backend in cpu_backends() {
            let out = backend.blur(&img, &k).unwrap();
            assert_eq!(out, reference, "{} differs on {w}×{h}", backend.name());
        }
    }
}

#[test]
fn single_passes_agree() {
    let img = make_scene(29, 21);
    let k = KernelWeights::new(6, 2.5).unwrap();
    for axis in [Axis::Horizontal, Axis::Vertical] {
        let reference = Serial.blur_pass(&img, axis, &k).unwrap();
        for backend in cpu_backends() {
            assert_eq!(
                backend.blur_pass(&img, axis, &k).unwrap(),
                reference,
                "{} {axis:?}",
                backend.name()
            );
        }
    }
}

#[test]
fn configured_backends_agree() {
    let img = make_scene(40, 30);
    let k = KernelWeights::default();
    let reference = Serial.blur(&img, &k).unwrap();
    for kind in BackendKind::CPU {
        let cfg = EngineConfig { backend: kind, workers: Some(4), ..EngineConfig::default() };
        let backend = cfg.build_backend().unwrap();
        assert_eq!(backend.blur(&img, &k).unwrap(), reference, "{kind:?}");
    }
}

#[test]
fn more_workers_than_rows() {
    let img = make_scene(10, 3);
    let k = KernelWeights::default();
    let out = RowPartitioned::new(8).unwrap().blur(&img, &k).unwrap();
    assert_eq!(out, Serial.blur(&img, &k).unwrap());
}

#[test]
fn single_pixel_and_uniform_on_every_backend() {
    let k = KernelWeights::default();
    let one = RgbaImage::filled(1, 1, [1, 2, 3, 4]);
    let flat = RgbaImage::filled(23, 19, [200, 100, 50, 255]);
    for backend in cpu_backends() {
        assert_eq!(backend.blur(&one, &k).unwrap(), one, "{}", backend.name());
        assert_eq!(backend.blur(&flat, &k).unwrap(), flat, "{}", backend.name());
    }
}

#[test]
fn empty_image_rejected_by_every_backend() {
    let k = KernelWeights::default();
    for img in [RgbaImage::new(0, 5), RgbaImage::new(5, 0), RgbaImage::new(0, 0)] {
        let (w, h) = img.dimensions();
        for backend in cpu_backends() {
            let err = backend.blur(&img, &k).unwrap_err();
            assert!(
                matches!(err, BlurError::EmptyImage { width, height } if (width, height) == (w, h)),
                "{} accepted {w}×{h}: {err:?}",
                backend.name()
            );
            for axis in [Axis::Horizontal, Axis::Vertical] {
                assert!(matches!(
                    backend.blur_pass(&img, axis, &k),
                    Err(BlurError::EmptyImage { .. })
                ));
            }
        }
        assert!(matches!(
            ChannelPipeline.normalize_and_blur(&img, &k),
            Err(BlurError::EmptyImage { .. })
        ));
    }
}

// ===== Partition coverage =====

#[test]
fn partition_covers_every_row_once() {
    for height in 0..40 {
        for workers in 1..12 {
            let plan = PartitionPlan::new(height, workers).unwrap();
            assert_eq!(plan.workers(), workers);
            let mut seen = vec![0u32; height];
            let mut next = 0;
            for r in plan.ranges() {
                assert_eq!(r.start, next, "gap or overlap at H={height} N={workers}");
                next = r.end;
                for y in r.clone() {
                    seen[y] += 1;
                }
            }
            assert_eq!(next, height);
            assert!(seen.iter().all(|&n| n == 1));
        }
    }
}

#[test]
fn partition_last_worker_takes_remainder() {
    let plan = PartitionPlan::new(10, 3).unwrap();
    assert_eq!(plan.ranges(), &[0..3, 3..6, 6..10]);
}

// ===== Determinism =====

#[test]
fn repeated_runs_are_identical() {
    let img = make_scene(48, 32);
    let k = KernelWeights::default();
    for backend in cpu_backends() {
        let first = backend.blur(&img, &k).unwrap();
        for run in 1..100 {
            assert_eq!(
                backend.blur(&img, &k).unwrap(),
                first,
                "{} run {run} differs",
                backend.name()
            );
        }
    }
}

#[test]
fn normalize_and_blur_is_deterministic() {
    let img = make_scene(32, 24);
    let k = KernelWeights::default();
    let first = ChannelPipeline.normalize_and_blur(&img, &k).unwrap();
    for _ in 1..100 {
        let out = ChannelPipeline.normalize_and_blur(&img, &k).unwrap();
        assert_eq!(out.output, first.output);
        assert_eq!(out.channel_max, first.channel_max);
    }
}

// ===== GPU =====

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_within_one_unit_of_serial() {
    init_logging();
    let gpu = GpuBlur::new().expect("GPU backend");
    let k = KernelWeights::default();
    for (w, h) in [(64, 48), (17, 5), (1, 1), (100, 3)] {
        let img = make_scene(w, h);
        let reference = Serial.blur(&img, &k).unwrap();
        let out = gpu.blur(&img, &k).unwrap();
        assert!(out.max_abs_diff(&reference) <= 1, "{w}×{h}");
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn gpu_is_deterministic() {
    let gpu = GpuBlur::new().expect("GPU backend");
    let img = make_scene(48, 32);
    let k = KernelWeights::default();
    let first = gpu.blur(&img, &k).unwrap();
    for _ in 1..100 {
        assert_eq!(gpu.blur(&img, &k).unwrap(), first);
    }
}
