//! Tessel Core
//!
//! This crate provides the runtime core of the Tessel resumable UI
//! framework. It implements:
//!
//! - Reactive primitives (signals, stores, computed signals, tasks)
//! - A prioritized chore scheduler that drains reactive work
//! - A virtual node tree and a keyed JSX reconciler
//! - Server rendering to HTML plus serialized state, and resuming that
//!   output on the client without re-running components
//!
//! Component, task and handler bodies are addressed by [`qrl::Qrl`], a
//! lazily resolved `chunk#symbol` reference, so a server render can name
//! every piece of code the client may need later.
//!
//! # Architecture
//!
//! - `reactive`: signals, stores, computed signals, tasks and tracking
//! - `scheduler`: chores, their ordering and the drain loop
//! - `vnode`: the rendered tree and its bindings
//! - `jsx`: the description components return
//! - `diff`: reconciliation of JSX against the tree, producing a journal
//! - `host`: the document the journal is applied to
//! - `container`: ties the above together for one mounted root
//! - `ssr` / `resume`: the server-to-client bridge
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use tessel_core::jsx::el;
//! use tessel_core::qrl::SymbolRegistry;
//! use tessel_core::reactive::Signal;
//! use tessel_core::{render_to_string, ContainerConfig};
//!
//! let count = Signal::new(json!(123));
//! let out = render_to_string(
//!     el("button").child(count.clone()),
//!     Arc::new(SymbolRegistry::new()),
//!     ContainerConfig::default(),
//! )
//! .await?;
//! assert_eq!(out.html, "<button>123</button>");
//! ```

pub mod component;
pub mod config;
pub mod container;
pub mod diff;
pub mod error;
pub mod events;
pub mod host;
pub mod jsx;
pub mod qrl;
pub mod reactive;
pub mod resume;
pub mod scheduler;
pub mod ssr;
pub mod vnode;

pub use config::ContainerConfig;
pub use container::{Container, RenderMode};
pub use error::{CoreError, Result};
pub use ssr::{render_to_string, SsrOutput};
