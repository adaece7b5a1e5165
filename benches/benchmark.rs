use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use page_capture::{
    encode_raster, Config, EncodeOptions, OutputFormat, RasterFormat, ReadinessTracker,
};
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "integration_benchmarks")]
use page_capture::{page_events, CaptureConfig, CaptureSession, ChromePageHost, PageRequest};
#[cfg(feature = "integration_benchmarks")]
use tokio::runtime::Runtime;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

// === UNIT BENCHMARKS ===

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let config = Config::default();
            black_box(config);
        });
    });

    group.finish();
}

fn benchmark_format_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_inference");
    configure_fast_group(&mut group);

    let test_paths = vec![
        Path::new("shot.png"),
        Path::new("/tmp/out/PAGE.XPM"),
        Path::new("report.pdf"),
        Path::new("no-extension"),
    ];

    group.bench_function("from_path", |b| {
        b.iter(|| {
            for path in &test_paths {
                black_box(OutputFormat::from_path(path));
            }
        });
    });

    group.bench_function("from_identifier", |b| {
        b.iter(|| {
            for identifier in ["itext", "rtree", "xbm", "webp"] {
                let _ = black_box(OutputFormat::from_identifier(identifier));
            }
        });
    });

    group.finish();
}

fn benchmark_tracker_transitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("readiness_tracker");
    configure_fast_group(&mut group);

    group.bench_function("ready_path", |b| {
        b.iter(|| {
            let mut tracker = ReadinessTracker::new(Duration::from_millis(100), None);
            black_box(tracker.on_initial_layout());
            black_box(tracker.on_document_complete(true));
            black_box(tracker.fire());
        });
    });

    group.bench_function("alert_path", |b| {
        b.iter(|| {
            let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
            black_box(tracker.on_alert("progress"));
            black_box(tracker.on_initial_layout());
            black_box(tracker.on_document_complete(false));
            black_box(tracker.on_alert("done"));
            black_box(tracker.fire());
        });
    });

    group.finish();
}

fn benchmark_raster_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("raster_encoding");
    configure_fast_group(&mut group);

    let image = RgbaImage::from_fn(800, 600, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    let options = EncodeOptions::default();

    for format in [
        RasterFormat::Png,
        RasterFormat::Jpeg,
        RasterFormat::Ppm,
        RasterFormat::Xpm,
    ] {
        group.bench_function(format!("{format:?}").to_lowercase(), |b| {
            b.iter(|| {
                let encoded = encode_raster(&image, format, &options);
                let _ = black_box(encoded);
            });
        });
    }

    group.finish();
}

fn benchmark_format_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    let test_durations = vec![Duration::from_millis(100), Duration::from_secs(5)];
    let test_byte_sizes = vec![1024, 1048576];

    group.bench_function("format_duration", |b| {
        b.iter(|| {
            for duration in &test_durations {
                let formatted = page_capture::format_duration(*duration);
                black_box(formatted);
            }
        });
    });

    group.bench_function("format_bytes", |b| {
        b.iter(|| {
            for size in &test_byte_sizes {
                let formatted = page_capture::format_bytes(*size);
                black_box(formatted);
            }
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chrome) ===

#[cfg(feature = "integration_benchmarks")]
fn benchmark_real_world_capture(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("real_world_capture");
    configure_fast_group(&mut group);

    for name in ["example.png", "example.txt", "example.pdf"] {
        let output = dir.path().join(name);
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let url = url::Url::parse("https://example.com").unwrap();
                    let settings = Config {
                        max_wait: Duration::from_secs(5),
                        ..Default::default()
                    };
                    let config =
                        CaptureConfig::new(PageRequest::get(url), output.clone(), None, settings)
                            .unwrap();

                    let (sink, events) = page_events();
                    let host = ChromePageHost::launch(&config, sink).await.unwrap();
                    let outcome = CaptureSession::new(config, host, events).run().await;
                    black_box(outcome.is_ok());
                })
            });
        });
    }

    group.finish();
}

// === BENCHMARK GROUPS ===

criterion_group!(
    unit_benches,
    benchmark_config_creation,
    benchmark_format_inference,
    benchmark_tracker_transitions,
    benchmark_raster_encoding,
    benchmark_format_utilities,
);

#[cfg(feature = "integration_benchmarks")]
criterion_group!(integration_benches, benchmark_real_world_capture);

#[cfg(feature = "integration_benchmarks")]
criterion_main!(unit_benches, integration_benches);

#[cfg(not(feature = "integration_benchmarks"))]
criterion_main!(unit_benches);
