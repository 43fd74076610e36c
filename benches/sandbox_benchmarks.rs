//! Benchmarks for the sketch sandbox.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use wasm_sketch_sandbox_rs::generators::{NoiseField, Prng};
use wasm_sketch_sandbox_rs::prelude::*;

const GRADIENT: &str = r#"(module
    (import "sketch" "noise" (func $noise (param f64 f64 f64) (result f64)))
    (import "sketch" "width" (global $w i32))
    (import "sketch" "height" (global $h i32))
    (import "draw" "set_pixel" (func $set_pixel (param i32 i32 f64 f64 f64 f64)))
    (func (export "setup")
        (local $x i32) (local $y i32) (local $n f64)
        (loop $rows
            (local.set $x (i32.const 0))
            (loop $cols
                (local.set $n (f64.mul (call $noise
                    (f64.mul (f64.convert_i32_s (local.get $x)) (f64.const 0.02))
                    (f64.mul (f64.convert_i32_s (local.get $y)) (f64.const 0.02))
                    (f64.const 0)) (f64.const 255)))
                (call $set_pixel (local.get $x) (local.get $y)
                    (local.get $n) (local.get $n) (local.get $n) (f64.const 255))
                (local.set $x (i32.add (local.get $x) (i32.const 1)))
                (br_if $cols (i32.lt_s (local.get $x) (global.get $w))))
            (local.set $y (i32.add (local.get $y) (i32.const 1)))
            (br_if $rows (i32.lt_s (local.get $y) (global.get $h))))))"#;

const SHAPES: &str = r#"(module
    (import "sketch" "random" (func $random (result f64)))
    (import "sketch" "t" (func $t (result f64)))
    (import "draw" "background" (func $bg (param f64 f64 f64 f64)))
    (import "draw" "circle" (func $circle (param f64 f64 f64)))
    (func (export "setup"))
    (func (export "draw")
        (local $i i32)
        (call $bg (f64.const 0) (f64.const 0) (f64.const 0) (f64.const 255))
        (loop $shapes
            (call $circle
                (f64.mul (call $random) (f64.const 128))
                (f64.mul (call $random) (f64.const 128))
                (f64.mul (call $t) (f64.const 20)))
            (local.set $i (i32.add (local.get $i) (i32.const 1)))
            (br_if $shapes (i32.lt_s (local.get $i) (i32.const 32))))))"#;

/// Benchmark the seeded generators on their own.
fn bench_generators(c: &mut Criterion) {
    let mut group = c.benchmark_group("generators");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("prng_1000", |b| {
        let mut prng = Prng::new(42);
        b.iter(|| {
            let mut sum = 0.0;
            for _ in 0..1000 {
                sum += prng.next_f64();
            }
            black_box(sum)
        });
    });

    let field = NoiseField::new(42);
    group.bench_function("noise_1000", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1000 {
                sum += field.sample(i as f64 * 0.01, 0.5, 0.25);
            }
            black_box(sum)
        });
    });

    group.bench_function("fbm_1000", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1000 {
                sum += field.layered(i as f64 * 0.01, 0.5, 0.0, 4, 0.5);
            }
            black_box(sum)
        });
    });

    group.finish();
}

/// Benchmark compilation with and without the module cache.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.sample_size(20);

    let sandbox = SketchSandbox::new(SandboxConfig::default()).unwrap();
    group.bench_function("cold", |b| {
        b.iter(|| {
            sandbox.cache().clear();
            black_box(sandbox.prepare(GRADIENT, RenderMode::Static).unwrap())
        });
    });

    let _ = sandbox.prepare(GRADIENT, RenderMode::Static).unwrap();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(sandbox.prepare(GRADIENT, RenderMode::Static).unwrap()));
    });

    group.finish();
}

/// Benchmark static renders at increasing sizes.
fn bench_static_render(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let sandbox = SketchSandbox::new(SandboxConfig::default()).unwrap();

    let mut group = c.benchmark_group("static_render");
    group.sample_size(20);

    for size in [64u32, 128, 256] {
        group.throughput(Throughput::Elements(u64::from(size) * u64::from(size)));
        group.bench_with_input(BenchmarkId::new("noise_gradient", size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let request = ExecutionRequest::new_static(GRADIENT, size, size).with_seed(1);
                    let result = execute(&sandbox, &request, ExecuteOptions::default())
                        .await
                        .unwrap();
                    black_box(result)
                })
            });
        });
    }

    group.finish();
}

/// Benchmark loop renders by frame count.
fn bench_loop_render(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = SandboxConfig::builder().fps(30).build();
    let sandbox = SketchSandbox::new(config).unwrap();

    let mut group = c.benchmark_group("loop_render");
    group.sample_size(10);

    for frames in [30u32, 60] {
        group.bench_with_input(BenchmarkId::new("circles", frames), &frames, |b, &frames| {
            b.iter(|| {
                rt.block_on(async {
                    let request = ExecutionRequest::new_loop(SHAPES, 128, 128, frames);
                    let result = execute(&sandbox, &request, ExecuteOptions::default())
                        .await
                        .unwrap();
                    black_box(result)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_generators,
    bench_compile,
    bench_static_render,
    bench_loop_render
);
criterion_main!(benches);
