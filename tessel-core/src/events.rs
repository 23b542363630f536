//! Events delivered to listeners.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// On the element itself; receives bubbling events.
    #[default]
    Element,
    Document,
    Window,
}

impl Scope {
    /// Attribute prefix used when a listener is rendered into markup.
    pub fn prefix(self) -> &'static str {
        match self {
            Scope::Element => "on:",
            Scope::Document => "on-document:",
            Scope::Window => "on-window:",
        }
    }
}

/// A dispatched event.
#[derive(Debug)]
pub struct Event {
    name: String,
    detail: Json,
    stopped: AtomicBool,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_detail(name, Json::Null)
    }

    pub fn with_detail(name: impl Into<String>, detail: Json) -> Self {
        Self {
            name: name.into(),
            detail,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload supplied by the dispatcher.
    pub fn detail(&self) -> &Json {
        &self.detail
    }

    /// Stop bubbling past the current element.
    pub fn stop_propagation(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            detail: self.detail.clone(),
            stopped: AtomicBool::new(self.is_propagation_stopped()),
        }
    }
}
