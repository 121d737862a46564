//! Benchmarks for channel and message operations
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowline::pipeline::nodes::PassThrough;
use flowline::pipeline::{bounded, unbounded, AnyNode, Message, PipelineBuilder};

fn bench_channel_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_push_pop");

    for batch in [100usize, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::new("unbounded", batch), batch, |b, &batch| {
            b.iter(|| {
                let (out, input) = unbounded();
                for i in 0..batch {
                    out.push(i as u64).unwrap();
                }
                drop(out);
                black_box(input.count())
            });
        });
    }

    group.finish();
}

fn bench_bounded_across_threads(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_across_threads");
    let batch = 10_000usize;
    group.throughput(Throughput::Elements(batch as u64));

    for capacity in [1usize, 64, 1024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), capacity, |b, &capacity| {
            b.iter(|| {
                let (out, input) = bounded(capacity);
                let producer = std::thread::spawn(move || {
                    for i in 0..batch {
                        out.push(i as u64).unwrap();
                    }
                });
                let received = input.count();
                producer.join().unwrap();
                black_box(received)
            });
        });
    }

    group.finish();
}

fn bench_message_clone(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_clone");

    for size in [16usize, 4096, 65_536].iter() {
        let message = Message::new(vec![0f32; *size]).with(String::from("header"));
        group.throughput(Throughput::Bytes((*size * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| black_box(message.clone()));
        });
    }

    group.finish();
}

fn bench_tuple_extraction(c: &mut Criterion) {
    c.bench_function("tuple_extraction", |b| {
        b.iter(|| {
            let message = Message::new(String::from("label")).with(3u32).with(1.5f64);
            black_box(message.unpack_all::<(f64, u32, String)>())
        });
    });
}

fn bench_pipeline_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_chain");
    let batch = 1000u64;
    group.throughput(Throughput::Elements(batch));

    for depth in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| {
                let mut builder = PipelineBuilder::new();
                builder
                    .add_chain((0..depth).map(|i| AnyNode::stage(PassThrough::new(format!("p{}", i)))))
                    .unwrap();
                let mut pipeline = builder.start().unwrap();
                let output = pipeline.take_output(&format!("p{}.out", depth - 1)).unwrap();
                for i in 0..batch {
                    pipeline.push(i).unwrap();
                }
                let report = pipeline.join();
                black_box((report.is_success(), output.count()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_channel_push_pop,
    bench_bounded_across_threads,
    bench_message_clone,
    bench_tuple_extraction,
    bench_pipeline_chain,
);

criterion_main!(benches);
