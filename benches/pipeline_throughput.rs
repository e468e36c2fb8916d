//! Pipeline Throughput Benchmarks
//!
//! Measures end-to-end tile throughput across tile counts and staging depths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hologram_tile_pipeline::config::DeviceConfig;
use hologram_tile_pipeline::verify::{generate_source, source_rng};
use hologram_tile_pipeline::{Device, PipelineConfig, RunParameters, TensorBufferConfig, TilePipeline};

fn benchmark_tile_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_tile_counts");
    let config = PipelineConfig::default();
    let tile_bytes = config.tile.size_bytes();
    let pipeline = TilePipeline::new(config).unwrap();

    for tiles in [16usize, 64, 256] {
        group.throughput(Throughput::Bytes((tiles * tile_bytes) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(tiles), &tiles, |b, &tiles| {
            let device = Device::open(&DeviceConfig::default()).unwrap();
            let buffer = TensorBufferConfig::for_tiles(tiles, tile_bytes);
            let src = device.create_buffer(buffer).unwrap();
            let dst = device.create_buffer(buffer).unwrap();
            src.write_from_host(&generate_source(&mut source_rng(Some(0)), src.element_count()))
                .unwrap();
            let params = RunParameters::new(tiles, src.address(), dst.address(), 1.0);

            b.iter(|| {
                let summary = pipeline.run(&device, params).unwrap();
                black_box(&summary);
            });
        });
    }

    group.finish();
}

fn benchmark_staging_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_staging_depth");
    let tiles = 64;

    for depth in [1usize, 2, 4, 8] {
        let config = PipelineConfig::default().with_staging_depth(depth);
        let tile_bytes = config.tile.size_bytes();
        let pipeline = TilePipeline::new(config).unwrap();
        group.throughput(Throughput::Bytes((tiles * tile_bytes) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let device = Device::open(&DeviceConfig::default()).unwrap();
            let buffer = TensorBufferConfig::for_tiles(tiles, tile_bytes);
            let src = device.create_buffer(buffer).unwrap();
            let dst = device.create_buffer(buffer).unwrap();
            let params = RunParameters::new(tiles, src.address(), dst.address(), 1.0);

            b.iter(|| {
                let summary = pipeline.run(&device, params).unwrap();
                black_box(&summary);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_tile_counts, benchmark_staging_depth);
criterion_main!(benches);
