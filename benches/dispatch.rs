//! Dispatch benchmarks
//!
//! Measures the cost of crossing the native boundary: bound function calls,
//! property access on class instances, and typed calls into script functions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lunabind::{Class, ClassBuilder, Context, Variadic};

#[derive(Clone)]
struct Point {
    x: f64,
    y: f64,
}

impl Class for Point {}

fn setup() -> Context {
    let ctx = Context::new(true);
    ctx.add_function("add3", |a: i64, b: i64, c: i64| a + b + c);
    ctx.add_function("count", |rest: Variadic| rest.len());
    ctx.register_class(
        ClassBuilder::<Point>::new("point")
            .constructor(|x: f64, y: f64| Point { x, y })
            .property("x", |p: &mut Point, x: f64| p.x = x, |p: &Point| p.x)
            .property("y", |p: &mut Point, y: f64| p.y = y, |p: &Point| p.y)
            .method("norm", |p: &Point| (p.x * p.x + p.y * p.y).sqrt()),
    );
    ctx.execute(
        r#"
function script_add(a, b) return a + b end

function call_native(n)
    local total = 0
    for i = 1, n do total = total + add3(i, 1, 1) end
    return total
end

function touch_property(n)
    local p = point(1, 2)
    for i = 1, n do p.x = p.x + 1 end
    return p.x
end

function call_method(n)
    local p = point(3, 4)
    local total = 0
    for i = 1, n do total = total + p:norm() end
    return total
end
"#,
    )
    .ok();
    ctx
}

fn bench_native_calls(c: &mut Criterion) {
    let ctx = setup();
    let mut group = c.benchmark_group("native_calls");

    for n in [100i64, 1000] {
        group.bench_with_input(BenchmarkId::new("add3", n), &n, |b, &n| {
            b.iter(|| ctx.call_safe::<i64>("call_native", black_box(n)))
        });
    }

    group.bench_function("variadic_8", |b| {
        b.iter(|| ctx.eval::<i64>("return count(1, 2, 3, 4, 5, 6, 7, 8)"))
    });

    group.finish();
}

fn bench_class_access(c: &mut Criterion) {
    let ctx = setup();
    let mut group = c.benchmark_group("class_access");

    group.bench_function("property_1000", |b| {
        b.iter(|| ctx.call_safe::<f64>("touch_property", black_box(1000)))
    });
    group.bench_function("method_1000", |b| {
        b.iter(|| ctx.call_safe::<f64>("call_method", black_box(1000)))
    });

    group.finish();
}

fn bench_script_calls(c: &mut Criterion) {
    let ctx = setup();
    let mut group = c.benchmark_group("script_calls");

    group.bench_function("call_safe", |b| {
        b.iter(|| ctx.call_safe::<i64>("script_add", (black_box(1), black_box(2))))
    });

    if let Ok(handle) = ctx.function("script_add") {
        group.bench_function("handle_call", |b| {
            b.iter(|| handle.call::<i64>((black_box(1), black_box(2))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_native_calls,
    bench_class_access,
    bench_script_calls
);
criterion_main!(benches);
