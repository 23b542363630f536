//! Container configuration.
//!
//! Every container (mounted or resumed root, or one server render) owns a
//! [`ContainerConfig`]. All fields have defaults, so a partial JSON document
//! is enough to override a single knob.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::Priority;

/// Numeric drain order of each priority tier. Lower values drain first.
///
/// The relative order of the tiers is what the scheduler relies on; the
/// numbers themselves are configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTable {
    pub sync: u8,
    pub render: u8,
    pub visible: u8,
    pub idle: u8,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            sync: 0,
            render: 10,
            visible: 20,
            idle: 30,
        }
    }
}

impl PriorityTable {
    /// Numeric value for a tier.
    pub fn value(&self, priority: Priority) -> u8 {
        match priority {
            Priority::Sync => self.sync,
            Priority::Render => self.render,
            Priority::Visible => self.visible,
            Priority::Idle => self.idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Drain order of the chore tiers.
    pub priorities: PriorityTable,

    /// Upper bound on chore executions within a single drain. Exceeding it
    /// means a chore keeps invalidating itself.
    pub max_runs_per_drain: usize,

    /// Emit `<!--v-->` comment markers around virtual nodes in SSR output.
    pub emit_virtual_comments: bool,

    /// Run visible tasks during server rendering instead of deferring them to
    /// the client.
    pub run_visible_tasks_on_server: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            priorities: PriorityTable::default(),
            max_runs_per_drain: 10_000,
            emit_virtual_comments: true,
            run_visible_tasks_on_server: false,
        }
    }
}

impl ContainerConfig {
    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}
