//! Growable buffer churn on the host backend.
//!
//! Measures steady-state add/remove of whole primitive-sized runs, which is
//! the workload the free list is tuned for, and amortized growth from an
//! undersized initial allocation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scenic_core::CommandBuffering;
use scenic_gpu::{BufferUsage, DrawCommand, GrowableBuffer, HostBackend, IndirectCommandBuffer};

fn bench_add_remove_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("growable_churn");

    for run_len in [1u32, 16, 256] {
        group.bench_with_input(BenchmarkId::new("run_len", run_len), &run_len, |b, &len| {
            let mut backend = HostBackend::new();
            let mut buffer = GrowableBuffer::<[f32; 4], _>::new("churn", BufferUsage::STORAGE, 1024);
            let items = vec![[1.0; 4]; len as usize];
            let mut live = Vec::with_capacity(64);
            for _ in 0..64 {
                live.push(buffer.add_range(&mut backend, &items).unwrap_or_default());
            }

            let mut cursor = 0;
            b.iter(|| {
                let index = live[cursor % live.len()];
                let _ = buffer.remove_range(index, len);
                live[cursor % live.len()] =
                    black_box(buffer.add_range(&mut backend, &items).unwrap_or_default());
                cursor += 1;
            });
        });
    }

    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("growable_growth");

    for count in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("append", count), &count, |b, &count| {
            b.iter(|| {
                let mut backend = HostBackend::new();
                let mut buffer = GrowableBuffer::<u32, _>::new("grow", BufferUsage::INDEX, 4);
                for i in 0..count {
                    let _ = buffer.add(&mut backend, &i);
                }
                black_box(buffer.capacity())
            });
        });
    }

    group.finish();
}

fn bench_visibility_toggle(c: &mut Criterion) {
    c.bench_function("command_instance_count_toggle", |b| {
        let mut backend = HostBackend::new();
        let mut commands = IndirectCommandBuffer::new("draws", 1024, CommandBuffering::Single);
        let draw = DrawCommand {
            index_count: 36,
            instance_count: 1,
            ..DrawCommand::default()
        };
        let first = commands
            .add_range(&mut backend, &vec![draw; 1024])
            .unwrap_or_default();

        let mut visible = false;
        b.iter(|| {
            for id in first..first + 1024 {
                let _ = commands.update_instance_count(&mut backend, id, u32::from(visible));
            }
            visible = !visible;
        });
    });
}

criterion_group!(
    benches,
    bench_add_remove_churn,
    bench_growth,
    bench_visibility_toggle
);
criterion_main!(benches);
