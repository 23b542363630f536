//! Integration Tests for Rendering
//!
//! These tests drive a container over an in-memory document and check that
//! signals, tasks and the reconciler work together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value as Json};

use tessel_core::events::{Event, Scope};
use tessel_core::host::{Host, HostNode, MemoryDocument};
use tessel_core::jsx::{component, el, error_boundary, json_text, slot, JsxNode};
use tessel_core::qrl::{ComponentFn, FallbackFn, HandlerFn, Qrl, ResourceFn, SymbolRegistry, TaskFn};
use tessel_core::reactive::{Computed, Signal, Store, TaskOutput};
use tessel_core::vnode::Namespace;
use tessel_core::{render_to_string, Container, ContainerConfig, CoreError};

struct Page {
    doc: Arc<MemoryDocument>,
    root: HostNode,
    container: Container,
}

impl Page {
    fn new() -> Self {
        let doc = Arc::new(MemoryDocument::new());
        let root = doc.create_element("div", Namespace::Html);
        let container = Container::new(
            doc.clone(),
            root,
            Arc::new(SymbolRegistry::new()),
            ContainerConfig::default(),
        )
        .unwrap();
        Self { doc, root, container }
    }

    fn html(&self) -> String {
        self.doc.inner_html(self.root)
    }

    fn render_counts(&self) -> Vec<usize> {
        self.container.with_tree(|tree| {
            tree.components()
                .into_iter()
                .filter_map(|node| tree.component(node).map(|host| host.state.render_count()))
                .collect()
        })
    }
}

/// Writing the value a signal already holds schedules nothing.
#[tokio::test]
async fn equal_write_is_a_no_op() {
    let page = Page::new();
    let count = Signal::new(json!(1));
    page.container.render(el("p").child(count.clone())).await.unwrap();

    assert!(!count.set(json!(1)));
    assert!(page.container.pending_chores().is_empty());
}

/// A component reading two changed signals is queued once.
#[tokio::test]
async fn two_writes_queue_one_render() {
    let page = Page::new();
    let a = Signal::new(json!("a"));
    let b = Signal::new(json!("b"));
    let pair = Qrl::<ComponentFn>::component("app", "Pair", |ctx| {
        let a = ctx.require("a")?.as_signal()?.get();
        let b = ctx.require("b")?.as_signal()?.get();
        Ok(el("p").child(format!("{}{}", json_text(&a), json_text(&b))).into())
    });
    page.container
        .render(component(pair).prop("a", a.clone()).prop("b", b.clone()))
        .await
        .unwrap();

    a.set(json!("x"));
    b.set(json!("y"));
    assert_eq!(page.container.pending_chores().len(), 1);

    page.container.flush().await.unwrap();
    assert_eq!(page.html(), "<p>xy</p>");
    assert_eq!(page.render_counts(), vec![2]);
}

/// Clicking the counter updates its text node in place.
#[tokio::test]
async fn counter_click_patches_text_only() {
    let page = Page::new();
    page.container.render(component(counter())).await.unwrap();
    assert_eq!(page.html(), "<button>123</button>");

    let created = page.doc.creation_count();
    let button = page.doc.find_by_tag(page.root, "button").unwrap();
    let handled = page
        .container
        .dispatch(button, "click", Event::new("click"))
        .await
        .unwrap();

    assert_eq!(handled, 1);
    assert_eq!(page.doc.text_content(button), "124");
    assert_eq!(page.doc.creation_count(), created);
    assert_eq!(page.render_counts(), vec![1]);
}

fn counter() -> Qrl<ComponentFn> {
    Qrl::component("app", "Counter", |ctx| {
        let count = ctx.use_signal(json!(123))?;
        Ok(el("button")
            .on("click", increment().with_captures(vec![count.clone().into()]))
            .child(count)
            .into())
    })
}

fn increment() -> Qrl<HandlerFn> {
    Qrl::handler("app", "increment", |_, captures| {
        let count = captures
            .first()
            .ok_or_else(|| CoreError::msg("missing capture"))?
            .as_signal()?;
        count.update(|value| json!(value.as_i64().unwrap_or(0) + 1));
        Ok(())
    })
}

/// Mounting, unmounting and remounting a child runs its task's setup and
/// cleanup in order.
#[tokio::test]
async fn conditional_child_sets_up_and_cleans_up() {
    let page = Page::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let runs = Arc::new(AtomicUsize::new(0));

    let effect = {
        let log = log.clone();
        Qrl::<TaskFn>::task("app", "effect", move |ctx| {
            let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
            log.lock().push(format!("setup {n}"));
            let log = log.clone();
            ctx.cleanup(move || log.lock().push(format!("cleanup {n}")));
            TaskOutput::done()
        })
    };
    let child = Qrl::<ComponentFn>::component("app", "Child", move |ctx| {
        ctx.use_task(effect.clone())?;
        Ok(el("i").child("child").into())
    });
    let app = Qrl::<ComponentFn>::component("app", "App", move |ctx| {
        let show = ctx.require("show")?.as_signal()?.get();
        Ok(if show == json!(true) {
            component(child.clone()).into()
        } else {
            JsxNode::Empty
        })
    });

    let show = Signal::new(json!(false));
    page.container
        .render(component(app).prop("show", show.clone()))
        .await
        .unwrap();
    assert!(log.lock().is_empty());

    for visible in [true, false, true] {
        show.set(json!(visible));
        page.container.flush().await.unwrap();
    }
    assert_eq!(*log.lock(), vec!["setup 1", "cleanup 1", "setup 2"]);
    assert_eq!(page.html(), "<i>child</i>");
}

/// A task's cleanups run before it re-runs.
#[tokio::test]
async fn task_cleanup_precedes_rerun() {
    let page = Page::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let watched = Signal::new(json!(0));

    let watch = {
        let (log, watched) = (log.clone(), watched.clone());
        Qrl::<TaskFn>::task("app", "watch", move |ctx| {
            let value = ctx.track(|| watched.get());
            log.lock().push(format!("run {value}"));
            let log = log.clone();
            ctx.cleanup(move || log.lock().push(format!("cleanup {value}")));
            TaskOutput::done()
        })
    };
    let host = Qrl::<ComponentFn>::component("app", "Watcher", move |ctx| {
        ctx.use_task(watch.clone())?;
        Ok(JsxNode::Empty)
    });
    page.container.render(component(host)).await.unwrap();

    watched.set(json!(1));
    page.container.flush().await.unwrap();
    assert_eq!(*log.lock(), vec!["run 0", "cleanup 0", "run 1"]);
    assert_eq!(page.render_counts(), vec![1]);
}

/// Cleanups run before every re-run, across consecutive drains.
#[tokio::test]
async fn task_reruns_across_consecutive_drains() {
    let page = Page::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let watched = Signal::new(json!(0));

    let watch = {
        let (log, watched) = (log.clone(), watched.clone());
        Qrl::<TaskFn>::task("app", "watch", move |ctx| {
            let value = ctx.track(|| watched.get());
            log.lock().push(format!("run {value}"));
            let log = log.clone();
            ctx.cleanup(move || log.lock().push(format!("cleanup {value}")));
            TaskOutput::done()
        })
    };
    let label = Signal::new(json!("a"));
    let host = Qrl::<ComponentFn>::component("app", "Watcher", move |ctx| {
        ctx.use_task(watch.clone())?;
        let label = ctx.require("label")?.as_signal()?.get();
        Ok(el("p").child(json_text(&label)).into())
    });
    page.container
        .render(component(host).prop("label", label.clone()))
        .await
        .unwrap();

    for (value, text) in [(1, "b"), (2, "c")] {
        watched.set(json!(value));
        label.set(json!(text));
        page.container.flush().await.unwrap();
    }
    assert_eq!(
        *log.lock(),
        vec!["run 0", "cleanup 0", "run 1", "cleanup 1", "run 2"]
    );
    assert_eq!(page.html(), "<p>c</p>");
    assert_eq!(page.render_counts(), vec![3]);
}

/// A render whose output cannot be bound changes nothing, and the next
/// successful render replaces the old output.
#[tokio::test]
async fn failed_render_leaves_the_tree_intact() {
    let page = Page::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let effect = {
        let log = log.clone();
        Qrl::<TaskFn>::task("app", "effect", move |ctx| {
            log.lock().push("setup".to_string());
            let log = log.clone();
            ctx.cleanup(move || log.lock().push("cleanup".to_string()));
            TaskOutput::done()
        })
    };
    let item = Qrl::<ComponentFn>::component("app", "Item", move |ctx| {
        ctx.use_task(effect.clone())?;
        Ok(el("li").child("a").into())
    });
    let app = Qrl::<ComponentFn>::component("app", "App", move |ctx| {
        let step = ctx.require("step")?.as_signal()?.get();
        Ok(match step.as_i64() {
            Some(0) => el("ul").child(component(item.clone())).into(),
            Some(1) => {
                let broken = Computed::<Json>::new(|| Err(CoreError::msg("unbound")));
                el("section").child(broken).into()
            }
            _ => el("section").child("ok").into(),
        })
    });

    let step = Signal::new(json!(0));
    page.container
        .render(component(app).prop("step", step.clone()))
        .await
        .unwrap();
    assert_eq!(page.html(), "<ul><li>a</li></ul>");

    step.set(json!(1));
    assert!(page.container.flush().await.is_err());
    assert_eq!(page.html(), "<ul><li>a</li></ul>");
    assert_eq!(*log.lock(), vec!["setup"]);

    step.set(json!(2));
    page.container.flush().await.unwrap();
    assert_eq!(page.html(), "<section>ok</section>");
    assert_eq!(*log.lock(), vec!["setup", "cleanup"]);
}

/// A bound computed that failed once updates again after its input is fixed.
#[tokio::test]
async fn computed_recovers_after_an_error() {
    let page = Page::new();
    let input = Signal::new(json!(0));
    let shown = {
        let input = input.clone();
        Computed::new(move || {
            let value = input.get();
            match value.as_i64() {
                Some(1) => Err(CoreError::msg("one is not allowed")),
                _ => Ok(value),
            }
        })
    };
    page.container.render(el("p").child(shown)).await.unwrap();
    assert_eq!(page.html(), "<p>0</p>");

    input.set(json!(1));
    assert!(page.container.flush().await.is_err());
    assert_eq!(page.html(), "<p>0</p>");

    input.set(json!(2));
    assert_eq!(page.container.pending_chores().len(), 1);
    page.container.flush().await.unwrap();
    assert_eq!(page.html(), "<p>2</p>");
}

/// Keyed children are moved, not recreated.
#[tokio::test]
async fn keyed_reorder_moves_nodes() {
    let page = Page::new();
    let items = Signal::new(json!(["a", "b", "c"]));
    let list = Qrl::<ComponentFn>::component("app", "List", |ctx| {
        let items = ctx.require("items")?.as_signal()?.get();
        let rows = items.as_array().cloned().unwrap_or_default().into_iter().map(|item| {
            let label = json_text(&item);
            el("li").key(label.clone()).child(label)
        });
        Ok(el("ul").children(rows).into())
    });
    page.container
        .render(component(list).prop("items", items.clone()))
        .await
        .unwrap();
    let first = page.doc.find_all(page.root, "li");

    let created = page.doc.creation_count();
    items.set(json!(["c", "a", "b"]));
    page.container.flush().await.unwrap();

    assert_eq!(page.html(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
    assert_eq!(page.doc.creation_count(), created);
    assert_eq!(page.doc.find_all(page.root, "li"), vec![first[2], first[0], first[1]]);
}

/// An unkeyed child whose tag changes is replaced.
#[tokio::test]
async fn tag_change_replaces_the_element() {
    let page = Page::new();
    let tag = Signal::new(json!("span"));
    let view = Qrl::<ComponentFn>::component("app", "View", |ctx| {
        let tag = ctx.require("tag")?.as_signal()?.get();
        Ok(el(json_text(&tag)).child("x").into())
    });
    page.container
        .render(component(view).prop("tag", tag.clone()))
        .await
        .unwrap();
    let span = page.doc.find_by_tag(page.root, "span").unwrap();

    tag.set(json!("div"));
    page.container.flush().await.unwrap();
    assert_eq!(page.html(), "<div>x</div>");
    assert_eq!(page.doc.parent(span), None);
}

/// Only readers of the written store property re-render.
#[tokio::test]
async fn store_tracks_nested_properties() {
    let page = Page::new();
    let store = Store::new(json!({ "user": { "name": "ada", "age": 36 }, "theme": "dark" })).unwrap();
    let profile = Qrl::<ComponentFn>::component("app", "Profile", |ctx| {
        let store = ctx.require("store")?.as_store()?;
        let name = store
            .child("user")
            .and_then(|user| user.get_json("name"))
            .unwrap_or(Json::Null);
        Ok(el("p").child(json_text(&name)).into())
    });
    page.container
        .render(component(profile).prop("store", store.clone()))
        .await
        .unwrap();

    store.set("theme", json!("light")).unwrap();
    let user = store.child("user").unwrap();
    user.set("age", json!(37)).unwrap();
    assert!(page.container.pending_chores().is_empty());

    user.set("name", json!("grace")).unwrap();
    page.container.flush().await.unwrap();
    assert_eq!(page.html(), "<p>grace</p>");
    assert_eq!(page.render_counts(), vec![2]);
}

/// A failing child is replaced by the nearest boundary's fallback.
#[tokio::test]
async fn boundary_shows_fallback() {
    let page = Page::new();
    let broken = Qrl::<ComponentFn>::component("app", "Broken", |_| Err(CoreError::msg("nope")));
    let fallback = Qrl::<FallbackFn>::fallback("app", "Oops", |err| Ok(el("p").child(err.to_string()).into()));

    page.container
        .render(error_boundary(fallback).child(component(broken)))
        .await
        .unwrap();
    assert_eq!(page.html(), "<p>render of `Broken` failed: nope</p>");
}

/// Outside every boundary, a render error aborts a server render.
#[tokio::test]
async fn server_render_fails_without_boundary() {
    let broken = Qrl::<ComponentFn>::component("app", "Broken", |_| Err(CoreError::msg("nope")));
    let err = render_to_string(
        component(broken),
        Arc::new(SymbolRegistry::new()),
        ContainerConfig::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        CoreError::Render {
            component: "Broken".into(),
            message: "nope".into()
        }
    );
}

/// Handler errors are returned from dispatch, not routed to boundaries.
#[tokio::test]
async fn handler_errors_surface_from_dispatch() {
    let page = Page::new();
    let fail = Qrl::<HandlerFn>::handler("app", "fail", |_, _| Err(CoreError::msg("bad click")));
    page.container.render(el("button").on("click", fail)).await.unwrap();

    let button = page.doc.find_by_tag(page.root, "button").unwrap();
    let err = page
        .container
        .dispatch(button, "click", Event::new("click"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoreError::Handler {
            handler: "fail".into(),
            event: "click".into(),
            message: "bad click".into()
        }
    );
}

/// A resource publishes its value and the reader re-renders.
#[tokio::test]
async fn resource_value_reaches_the_reader() {
    let page = Page::new();
    let fetch = Qrl::<ResourceFn>::resource("app", "fetch", |_| async { Ok(json!(42)) }.boxed());
    let view = Qrl::<ComponentFn>::component("app", "Answer", move |ctx| {
        let answer = ctx.use_resource(fetch.clone())?;
        let state = answer.state();
        let text = match state["status"].as_str() {
            Some("resolved") => json_text(&state["value"]),
            _ => "loading".to_string(),
        };
        Ok(el("p").child(text).into())
    });

    page.container.render(component(view)).await.unwrap();
    assert_eq!(page.html(), "<p>42</p>");
}

/// Document listeners are reached through scoped dispatch.
#[tokio::test]
async fn document_listener_receives_scoped_event() {
    let page = Page::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let ping = {
        let hits = hits.clone();
        Qrl::<HandlerFn>::handler("app", "ping", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    page.container.render(el("div").on_document("ping", ping)).await.unwrap();

    let div = page.doc.find_by_tag(page.root, "div").unwrap();
    assert_eq!(
        page.container.dispatch(div, "ping", Event::new("ping")).await.unwrap(),
        0
    );
    let handled = page
        .container
        .dispatch_scoped(Scope::Document, "ping", Event::new("ping"))
        .await
        .unwrap();
    assert_eq!(handled, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Children of a component are shown where it places its slot.
#[tokio::test]
async fn projected_children_fill_the_slot() {
    let page = Page::new();
    let card = Qrl::<ComponentFn>::component("app", "Card", |_| Ok(el("section").child(slot()).into()));
    page.container
        .render(component(card).child(el("b").child("x")))
        .await
        .unwrap();
    assert_eq!(page.html(), "<section><b>x</b></section>");
}

/// SVG children inherit the namespace until a foreignObject.
#[tokio::test]
async fn svg_namespace_is_inherited() {
    let page = Page::new();
    page.container
        .render(
            el("svg")
                .child(el("circle"))
                .child(el("foreignObject").child(el("p"))),
        )
        .await
        .unwrap();
    let circle = page.doc.find_by_tag(page.root, "circle").unwrap();
    let p = page.doc.find_by_tag(page.root, "p").unwrap();
    assert_eq!(page.doc.namespace(circle), Some(Namespace::Svg));
    assert_eq!(page.doc.namespace(p), Some(Namespace::Html));
}

/// MathML children inherit the namespace until an annotation-xml.
#[tokio::test]
async fn mathml_namespace_is_inherited() {
    let page = Page::new();
    page.container
        .render(
            el("math")
                .child(el("mi").child("x"))
                .child(el("annotation-xml").child(el("span"))),
        )
        .await
        .unwrap();
    let math = page.doc.find_by_tag(page.root, "math").unwrap();
    let mi = page.doc.find_by_tag(page.root, "mi").unwrap();
    let span = page.doc.find_by_tag(page.root, "span").unwrap();
    assert_eq!(page.doc.namespace(math), Some(Namespace::MathMl));
    assert_eq!(page.doc.namespace(mi), Some(Namespace::MathMl));
    assert_eq!(page.doc.namespace(span), Some(Namespace::Html));
}

/// A textarea bound to a non-string value is rejected.
#[tokio::test]
async fn textarea_rejects_non_string_value() {
    let page = Page::new();
    let err = page
        .container
        .mount(el("textarea").attr("value", Signal::new(json!(5))))
        .unwrap_err();
    assert_eq!(err, CoreError::TextareaValue { found: "number" });
}

/// Inner HTML is parsed into the host as-is.
#[tokio::test]
async fn inner_html_is_opaque() {
    let page = Page::new();
    page.container
        .render(el("div").inner_html("<i>raw</i>"))
        .await
        .unwrap();
    assert_eq!(page.html(), "<div><i>raw</i></div>");
}
