//! Benchmarks for signal propagation, keyed reconciliation and server
//! rendering.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use tessel_core::host::{Host, MemoryDocument};
use tessel_core::jsx::{component, el, json_text};
use tessel_core::qrl::{ComponentFn, ComputedFn, Qrl, SymbolRegistry};
use tessel_core::reactive::{Computed, Signal};
use tessel_core::vnode::Namespace;
use tessel_core::{render_to_string, Container, ContainerConfig};

fn list() -> Qrl<ComponentFn> {
    Qrl::component("bench", "List", |ctx| {
        let items = ctx.require("items")?.as_signal()?.get();
        let rows = items.as_array().cloned().unwrap_or_default().into_iter().map(|item| {
            let label = json_text(&item);
            el("li").key(label.clone()).child(label)
        });
        Ok(el("ul").children(rows).into())
    })
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [1usize, 10, 100] {
        let source = Signal::new(json!(0));
        let mut tail = Computed::from_qrl(Qrl::<ComputedFn>::computed("bench", "id", |captures| {
            captures[0].read()
        }).with_captures(vec![source.clone().into()]));
        for _ in 1..depth {
            tail = Computed::from_qrl(
                Qrl::<ComputedFn>::computed("bench", "id", |captures| captures[0].read())
                    .with_captures(vec![tail.clone().into()]),
            );
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                source.set(json!(n));
                black_box(tail.get().ok())
            })
        });
    }
    group.finish();
}

fn bench_keyed_reverse(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("keyed_reverse");
    for size in [10usize, 100, 1000] {
        let doc = Arc::new(MemoryDocument::new());
        let root = doc.create_element("div", Namespace::Html);
        let container = Container::new(
            doc,
            root,
            Arc::new(SymbolRegistry::new()),
            ContainerConfig::default(),
        )
        .unwrap();
        let forward: Vec<_> = (0..size).map(|i| json!(i)).collect();
        let backward: Vec<_> = forward.iter().rev().cloned().collect();
        let items = Signal::new(json!(forward));
        runtime
            .block_on(container.render(component(list()).prop("items", items.clone())))
            .unwrap();

        let mut flip = false;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                flip = !flip;
                items.set(json!(if flip { &backward } else { &forward }));
                runtime.block_on(container.flush()).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_render_to_string(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let items: Vec<_> = (0..200).map(|i| json!(format!("row {i}"))).collect();
    c.bench_function("render_to_string_200_rows", |b| {
        b.iter(|| {
            let page = component(list()).prop("items", Signal::new(json!(items)));
            let out = runtime
                .block_on(render_to_string(
                    page,
                    Arc::new(SymbolRegistry::new()),
                    ContainerConfig::default(),
                ))
                .unwrap();
            black_box(out.html.len())
        })
    });
}

criterion_group!(benches, bench_computed_chain, bench_keyed_reverse, bench_render_to_string);
criterion_main!(benches);
