//! Performance benchmarks for building and running scripts.
//!
//! - Build: parse and compile the bundled test scripts
//! - Execution: recursive and iterative script calls
//! - Host calls: scripts calling registered generic functions
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect phase timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

#![allow(clippy::collapsible_if)]

use angelscript_runtime::prelude::*;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
use std::collections::HashMap;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[cfg(feature = "profile-with-puffin")]
fn collect_scopes_recursive(
    stream: &puffin::Stream,
    scope: &puffin::Scope,
    scope_collection: &puffin::ScopeCollection,
    scope_timings: &mut HashMap<String, i64>,
) {
    use puffin::Reader;

    if let Some(details) = scope_collection.fetch_by_id(&scope.id) {
        *scope_timings.entry(details.name().to_string()).or_insert(0) += scope.record.duration_ns;
    }

    if scope.child_begin_position < scope.child_end_position {
        if let Ok(reader) = Reader::with_offset(stream, scope.child_begin_position) {
            if let Ok(children) = reader.read_top_scopes() {
                for child in children {
                    collect_scopes_recursive(stream, &child, scope_collection, scope_timings);
                }
            }
        }
    }
}

/// Print accumulated timings per profiling scope.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    use puffin::Reader;

    let Some(frame_view) = FRAME_VIEW.get() else {
        println!("Profiler not initialized");
        return;
    };

    let view = frame_view.lock();
    let scope_collection = view.scope_collection();
    let mut scope_timings: HashMap<String, i64> = HashMap::new();
    let mut frame_count = 0i64;

    for frame in view.recent_frames() {
        frame_count += 1;
        let Ok(unpacked) = frame.unpacked() else {
            continue;
        };
        for (_thread_info, stream_info) in unpacked.thread_streams.iter() {
            let reader = Reader::from_start(&stream_info.stream);
            if let Ok(scopes) = reader.read_top_scopes() {
                for scope in scopes {
                    collect_scopes_recursive(&stream_info.stream, &scope, scope_collection, &mut scope_timings);
                }
            }
        }
    }

    println!("\n=== Profiling Summary ({} frames) ===", frame_count);
    let mut entries: Vec<_> = scope_timings.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1));
    for (name, ns) in &entries {
        let avg_ns = if frame_count > 0 { **ns / frame_count } else { **ns };
        println!("  {:30} {:>10.2?} avg", name, std::time::Duration::from_nanos(avg_ns as u64));
    }
    println!("=====================================\n");
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

const FIBONACCI: &str = include_str!("../test_scripts/fibonacci.as");
const GAME_LOGIC: &str = include_str!("../test_scripts/game_logic.as");

fn build(engine: &Engine, name: &str, code: &str) -> Module {
    let module = engine.get_module(name, GetModuleFlags::AlwaysCreate).unwrap();
    module.add_script_section(name, code, 0).unwrap();
    module.build().unwrap();
    module
}

/// Parse and compile each bundled script from scratch.
fn build_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let engine = Engine::create();

    let mut group = c.benchmark_group("runtime/build");
    for (name, code) in [("fibonacci", FIBONACCI), ("game_logic", GAME_LOGIC)] {
        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), code, |b, code| {
            b.iter(|| {
                let module = build(&engine, "bench", black_box(code));
                end_profiling_frame();
                black_box(module.get_function_count())
            });
        });
    }
    group.finish();
    print_profiling_stats();
}

/// Run script functions on a reused context.
fn execution_benchmarks(c: &mut Criterion) {
    let engine = Engine::create();
    let module = build(&engine, "fib", FIBONACCI);
    let fib = module.get_function_by_name("fib").unwrap();
    let fib_loop = module.get_function_by_name("fib_loop").unwrap();
    let game = build(&engine, "game", GAME_LOGIC);
    let simulate = game.get_function_by_name("simulate").unwrap();
    let ctx = engine.create_context().unwrap();

    let mut group = c.benchmark_group("runtime/execute");
    for n in [10u32, 20] {
        group.bench_with_input(BenchmarkId::new("fib_recursive", n), &n, |b, &n| {
            b.iter(|| {
                ctx.prepare(&fib).unwrap();
                ctx.set_arg_dword(0, black_box(n)).unwrap();
                ctx.execute().unwrap();
                black_box(ctx.get_return_dword())
            });
        });
    }
    group.bench_function("fib_loop_60", |b| {
        b.iter(|| {
            ctx.prepare(&fib_loop).unwrap();
            ctx.set_arg_dword(0, black_box(60)).unwrap();
            ctx.execute().unwrap();
            black_box(ctx.get_return_qword())
        });
    });
    group.bench_function("game_simulate_100", |b| {
        b.iter(|| {
            ctx.prepare(&simulate).unwrap();
            ctx.set_arg_dword(0, black_box(100)).unwrap();
            ctx.execute().unwrap();
            end_profiling_frame();
            black_box(ctx.get_return_dword())
        });
    });
    group.finish();
}

/// Script loops calling a registered generic function.
fn host_call_benchmarks(c: &mut Criterion) {
    let engine = Engine::create();
    engine
        .register_global_function("int mix(int, int)", |g: &mut ScriptGeneric| {
            let value = g.get_arg_dword(0).wrapping_mul(31) ^ g.get_arg_dword(1);
            let _ = g.set_return_dword(value);
        })
        .unwrap();
    let module = build(
        &engine,
        "host",
        "int run(int n) { int acc = 0; for (int i = 0; i < n; i++) acc = mix(acc, i); return acc; }",
    );
    let run = module.get_function_by_name("run").unwrap();
    let ctx = engine.create_context().unwrap();

    let mut group = c.benchmark_group("runtime/host_calls");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("generic_1000", |b| {
        b.iter(|| {
            ctx.prepare(&run).unwrap();
            ctx.set_arg_dword(0, 1000).unwrap();
            ctx.execute().unwrap();
            black_box(ctx.get_return_dword())
        });
    });
    group.finish();
}

criterion_group!(benches, build_benchmarks, execution_benchmarks, host_call_benchmarks);
criterion_main!(benches);
