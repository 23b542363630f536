//! Server-side rendering.
//!
//! [`render_to_string`] renders JSX into a [`MemoryDocument`] with a
//! server-mode container, settles every chore, and returns an [`SsrOutput`]:
//! the HTML plus the records [`Container::resume`] needs to continue on the
//! client without re-running any component.
//!
//! Server-mode containers skip visible tasks (unless
//! `run_visible_tasks_on_server` is set). Task cleanups run once the output
//! has been captured.

mod html;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ContainerConfig;
use crate::container::{Container, RenderMode};
use crate::error::Result;
use crate::host::{Host, MemoryDocument};
use crate::jsx::JsxNode;
use crate::qrl::SymbolLoader;
use crate::vnode::Namespace;

use self::html::HtmlWriter;
use self::state::StateWriter;

pub use state::{
    AttrRecord, EdgeRecord, HookRecord, JsxRecord, ListenerRecord, QrlRecord, StateBlob, StateRecord,
    SubscriberRecord, TaskRecord, ValueRef, VNodeRecord, VNodeRecordKind,
};

/// Everything a server render produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SsrOutput {
    /// Markup of the container's children.
    pub html: String,
    pub vnodes: Vec<VNodeRecord>,
    pub state: StateBlob,
}

impl SsrOutput {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Compact binary form. Records are tagged maps, so field names are kept.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Render `jsx` on the server.
///
/// Fails without producing HTML when a chore fails outside every error
/// boundary.
pub async fn render_to_string(
    jsx: impl Into<JsxNode>,
    loader: Arc<dyn SymbolLoader>,
    config: ContainerConfig,
) -> Result<SsrOutput> {
    let document = Arc::new(MemoryDocument::new());
    let root = document.create_element("div", Namespace::Html);
    let container = Container::with_mode(document, root, loader, config, RenderMode::Server)?;
    let stats = container.render(jsx).await?;
    let output = container.snapshot()?;
    for task in container.tasks() {
        task.run_cleanups();
    }
    tracing::debug!(
        runs = stats.runs,
        bytes = output.html.len(),
        vnodes = output.vnodes.len(),
        records = output.state.records.len(),
        "server render finished"
    );
    Ok(output)
}

impl Container {
    /// HTML, vnode records and state of the current tree.
    pub fn snapshot(&self) -> Result<SsrOutput> {
        let inner = self.inner();
        let tree = inner.tree.lock();
        let tasks: HashMap<_, _> = inner
            .tasks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let (vnodes, state) = StateWriter::new(&tree, &tasks).write()?;
        let html = HtmlWriter::new(&tree, &*inner.host, inner.config.emit_virtual_comments).write();
        Ok(SsrOutput { html, vnodes, state })
    }

    pub fn vnode_records(&self) -> Result<Vec<VNodeRecord>> {
        self.snapshot().map(|output| output.vnodes)
    }

    /// The state arena reachable from the tree.
    pub fn reachable_state(&self) -> Result<StateBlob> {
        self.snapshot().map(|output| output.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsx::{el, text};
    use crate::qrl::SymbolRegistry;
    use crate::reactive::Signal;
    use serde_json::json;

    fn loader() -> Arc<dyn SymbolLoader> {
        Arc::new(SymbolRegistry::new())
    }

    fn plain() -> ContainerConfig {
        ContainerConfig {
            emit_virtual_comments: false,
            ..ContainerConfig::default()
        }
    }

    #[tokio::test]
    async fn adjacent_text_is_separated() {
        let out = render_to_string(el("p").child("a").child(Signal::new(json!(1))), loader(), plain())
            .await
            .unwrap();
        assert_eq!(out.html, "<p>a<!---->1</p>");
        assert_eq!(out.state.records, vec![StateRecord::Signal { value: json!(1) }]);
    }

    #[tokio::test]
    async fn virtual_markers_wrap_fragments() {
        let out = render_to_string(
            crate::jsx::fragment(vec![text("x")]),
            loader(),
            ContainerConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.html, "<!--v-->x<!--/v-->");
    }

    #[tokio::test]
    async fn form_state_becomes_markup() {
        let out = render_to_string(
            el("form")
                .child(el("input").attr("value", "v").attr("checked", true))
                .child(el("textarea").attr("value", "a<b")),
            loader(),
            plain(),
        )
        .await
        .unwrap();
        assert_eq!(
            out.html,
            r#"<form><input checked value="v"><textarea>a&lt;b</textarea></form>"#
        );
    }

    #[tokio::test]
    async fn output_survives_both_encodings() {
        let shared = Signal::new(json!("s"));
        let out = render_to_string(
            el("div").attr("title", shared.clone()).child(shared),
            loader(),
            plain(),
        )
        .await
        .unwrap();
        assert_eq!(out.state.records.len(), 1);
        assert_eq!(out.state.edges.len(), 1);
        assert_eq!(out.state.edges[0].subscribers.len(), 2);

        let json = out.to_json().unwrap();
        assert_eq!(SsrOutput::from_json(&json).unwrap(), out);
        let bytes = out.to_msgpack().unwrap();
        assert_eq!(SsrOutput::from_msgpack(&bytes).unwrap(), out);
    }
}
