//! Counting shim overhead benchmark
//!
//! Compares dispatching an uninstrumented member with dispatching the same
//! member through a counting shim, for both a captured own implementation
//! and an inherited one forwarded up the ancestry.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench shim_overhead
//! ```

use callcount::counter::CounterState;
use callcount::engine::CallCounter;
use callcount::namespace::{MemberKind, Method, Namespace, OwnerId, Value};
use callcount::specifier::TargetSpec;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn counter_namespace() -> (Namespace, OwnerId) {
    let ns = Namespace::new();
    let class = ns.define_class("Counter", None).unwrap();
    ns.define_method(
        class,
        MemberKind::InstanceScoped,
        "increment",
        Method::new(|frame| Ok(Value::Int(frame.arg(0).as_int().unwrap_or(0) + 1))),
    )
    .unwrap();
    (ns, class)
}

/// Baseline: plain dispatch with nothing installed
fn bench_unwrapped_call(c: &mut Criterion) {
    let (ns, class) = counter_namespace();
    let obj = ns.instantiate(class).unwrap();
    let args = [Value::Int(1)];

    c.bench_function("unwrapped_call", |b| {
        b.iter(|| black_box(ns.call(&obj, "increment", black_box(&args), None)));
    });
}

/// Dispatch through a shim wrapping an own implementation
fn bench_wrapped_call(c: &mut Criterion) {
    let (ns, class) = counter_namespace();
    let counter = CallCounter::new(TargetSpec::parse("Counter#increment").unwrap());
    counter.attach(&ns);
    let obj = ns.instantiate(class).unwrap();
    let args = [Value::Int(1)];

    c.bench_function("wrapped_call", |b| {
        b.iter(|| black_box(ns.call(&obj, "increment", black_box(&args), None)));
    });
}

/// Dispatch through a shim that forwards to an inherited implementation
/// `depth` classes up
fn bench_wrapped_inherited_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrapped_inherited_call");

    for depth in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let (ns, base) = counter_namespace();
            let mut parent = base;
            for level in 0..depth {
                parent = ns
                    .define_class(&format!("Level{}", level), Some(parent))
                    .unwrap();
            }
            let spec = format!("Level{}#increment", depth - 1);
            let counter = CallCounter::new(TargetSpec::parse(&spec).unwrap());
            counter.attach(&ns);
            let obj = ns.instantiate(parent).unwrap();
            let args = [Value::Int(1)];

            b.iter(|| black_box(ns.call(&obj, "increment", black_box(&args), None)));
        });
    }

    group.finish();
}

/// The counting step alone: guard acquire, atomic add, guard release
fn bench_counter_increment(c: &mut Criterion) {
    let counter = CounterState::new();

    c.bench_function("counter_increment", |b| {
        b.iter(|| black_box(counter.increment()));
    });
}

criterion_group!(
    benches,
    bench_unwrapped_call,
    bench_wrapped_call,
    bench_wrapped_inherited_call,
    bench_counter_increment
);
criterion_main!(benches);
