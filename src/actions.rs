//! Named action sinks invoked on BAN/UNBAN transitions.
//!
//! Actions are registered by name at startup and resolved once, per
//! trigger, at config load; each trigger then carries its own small list
//! of resolved action handles. Callback state is captured by the closure
//! itself rather than passed as an opaque user-data pointer.

use std::sync::Arc;

use crate::packet::PacketInfo;
use crate::trigger::{BanRecord, Direction};

/// The two action kinds the core ever fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Ban,
    Unban,
}

/// A registered action sink. `direction` is the trigger's configured
/// direction, `packet` the snapshot taken at ban time, and `record`
/// read-only access to the ban record's timestamps.
pub trait Action: Send + Sync {
    fn call(&self, kind: ActionKind, direction: Direction, packet: &PacketInfo, record: &BanRecord);
}

impl<F> Action for F
where
    F: Fn(ActionKind, Direction, &PacketInfo, &BanRecord) + Send + Sync,
{
    fn call(&self, kind: ActionKind, direction: Direction, packet: &PacketInfo, record: &BanRecord) {
        (self)(kind, direction, packet, record)
    }
}

struct Entry {
    name: String,
    action: Arc<dyn Action>,
}

/// Case-insensitive name -> callback registry, populated at startup and
/// read-only thereafter.
#[derive(Default)]
pub struct ActionRegistry {
    entries: Vec<Entry>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new entry. Registering the same name twice keeps both;
    /// `find` always returns the first match.
    ///
    /// Bound directly on `Fn(...)` rather than on `Action` itself so a bare
    /// closure literal's argument types can be inferred from this call site
    /// (inference does not see through the blanket `impl<F: Fn(...)> Action
    /// for F` below when the bound is the trait name alone).
    pub fn register<F>(&mut self, name: &str, action: F)
    where
        F: Fn(ActionKind, Direction, &PacketInfo, &BanRecord) + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            name: name.to_string(),
            action: Arc::new(action),
        });
    }

    /// Returns the first entry whose name matches case-insensitively.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| Arc::clone(&e.action))
    }
}
