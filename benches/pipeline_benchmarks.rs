//! Performance benchmarks for the bytecode diff pipeline.
//!
//! Each stage is measured on its own over the fixtures in `test_scripts/`:
//! compiling, normalizing, rendering and diffing, plus the end to end
//! comparison of two sources.
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect per-stage timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
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

/// Sum the top-level scope durations of every recorded frame by name.
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
            let Ok(scopes) = reader.read_top_scopes() else {
                continue;
            };
            for scope in scopes {
                if let Some(details) = scope_collection.fetch_by_id(&scope.id) {
                    *scope_timings.entry(details.name().to_string()).or_insert(0) +=
                        scope.record.duration_ns;
                }
            }
        }
    }

    println!("\n=== Profiling Summary ({} frames) ===", frame_count);
    let mut entries: Vec<_> = scope_timings.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, ns) in entries {
        println!(
            "  {:30} {:>10.2?} avg",
            name,
            std::time::Duration::from_nanos((ns / frame_count.max(1)) as u64)
        );
    }
    println!("=====================================\n");
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

const FIXTURES: [(&str, &str); 7] = [
    ("basic", include_str!("../test_scripts/basic.py")),
    ("classes", include_str!("../test_scripts/classes.py")),
    ("control_flow", include_str!("../test_scripts/control_flow.py")),
    ("comprehensions", include_str!("../test_scripts/comprehensions.py")),
    ("closures", include_str!("../test_scripts/closures.py")),
    ("walrus", include_str!("../test_scripts/walrus.py")),
    ("async_io", include_str!("../test_scripts/async_io.py")),
];

/// Benchmark each pipeline stage on every fixture.
fn stage_benchmarks(c: &mut Criterion) {
    setup_profiler();

    let mut group = c.benchmark_group("pipeline/stages");
    for (name, source) in FIXTURES {
        group.throughput(Throughput::Bytes(source.len() as u64));

        group.bench_function(format!("compile/{name}"), |b| {
            b.iter(|| {
                let code = pydiff::compile(black_box(source), "<bench>").unwrap();
                end_profiling_frame();
                black_box(code)
            });
        });

        let code = pydiff::compile(source, "<bench>").unwrap();
        group.bench_function(format!("normalize/{name}"), |b| {
            b.iter(|| black_box(pydiff::normalize(black_box(&code))));
        });

        let tree = pydiff::normalize(&code);
        group.bench_function(format!("render/{name}"), |b| {
            b.iter(|| black_box(pydiff::render(black_box(&tree))));
        });
    }
    group.finish();

    print_profiling_stats();
}

/// Benchmark the line diff on equal and changed renderings.
fn diff_benchmarks(c: &mut Criterion) {
    let render = |source: &str| pydiff::render(&pydiff::disassemble(source).unwrap());
    let basic = render(include_str!("../test_scripts/basic.py"));
    let changed = render(include_str!("../test_scripts/basic_changed.py"));
    let classes = render(include_str!("../test_scripts/classes.py"));

    let mut group = c.benchmark_group("pipeline/diff");
    group.bench_function("identical", |b| {
        b.iter(|| black_box(pydiff::unified_diff(black_box(&basic), &basic, "a", "b", 3)));
    });
    group.bench_function("one_change", |b| {
        b.iter(|| black_box(pydiff::unified_diff(black_box(&basic), &changed, "a", "b", 3)));
    });
    group.bench_function("unrelated", |b| {
        b.iter(|| black_box(pydiff::unified_diff(black_box(&basic), &classes, "a", "b", 3)));
    });
    group.finish();
}

/// Benchmark the whole comparison from source text.
fn end_to_end_benchmarks(c: &mut Criterion) {
    let a = include_str!("../test_scripts/basic.py");
    let b = include_str!("../test_scripts/basic_reformatted.py");

    let mut group = c.benchmark_group("pipeline/end_to_end");
    group.throughput(Throughput::Bytes((a.len() + b.len()) as u64));
    group.bench_function("reformatted_module", |bench| {
        bench.iter(|| {
            let diff = pydiff::diff_bytecode(black_box(a), black_box(b)).unwrap();
            end_profiling_frame();
            black_box(diff)
        });
    });
    group.finish();
}

criterion_group!(benches, stage_benchmarks, diff_benchmarks, end_to_end_benchmarks);

criterion_main!(benches);
