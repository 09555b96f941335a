use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dynbridge_runtime::interop::frame::ArgFrame;
use dynbridge_runtime::{Bridge, CallDescriptor, Convention, ReturnType, Signature, Value};

extern "C" fn add3(a: i32, b: i64, c: f64) -> f64 {
    a as f64 + b as f64 + c
}

extern "C" fn noop() {}

fn bench_frame_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_build");
    for sig in ["i", "ildp", "iiiiiiiidddddddd"] {
        let signature: Signature = sig.parse().unwrap();
        let args: Vec<Value> = signature
            .iter()
            .map(|kind| if kind.is_float() { Value::Flonum(1.0) } else { Value::int(1) })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(sig), &args, |b, args| {
            b.iter(|| ArgFrame::build(black_box(&signature), black_box(args)).unwrap());
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut bridge = Bridge::new();

    let void = CallDescriptor::new(ReturnType::Void, Convention::Default);
    let empty: Signature = "".parse().unwrap();
    c.bench_function("call_void_noargs", |b| {
        b.iter(|| unsafe { bridge.call(void, noop as usize, "noop", &empty, &[]).unwrap() });
    });

    let double = CallDescriptor::new(ReturnType::Double, Convention::Default);
    let signature: Signature = "ild".parse().unwrap();
    let args = [Value::int(1), Value::int(2), Value::Flonum(0.5)];
    c.bench_function("call_mixed", |b| {
        b.iter(|| unsafe {
            bridge
                .call(double, add3 as usize, "add3", &signature, black_box(&args))
                .unwrap()
        });
    });

    let argv = [
        Value::int(double.encode()),
        Value::from(add3 as usize),
        Value::symbol("add3"),
        Value::string("ild"),
        Value::int(1),
        Value::int(2),
        Value::Flonum(0.5),
    ];
    c.bench_function("call_native_subr", |b| {
        b.iter(|| bridge.apply("call-native", black_box(&argv)).unwrap());
    });
}

criterion_group!(benches, bench_frame_build, bench_dispatch);
criterion_main!(benches);
