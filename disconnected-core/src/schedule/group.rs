use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default group for network-layer work.
pub const NETWORK: &str = "network";
/// Default group for system housekeeping (hardware, file systems).
pub const SYSTEM: &str = "system";
/// Default group for process and program ticks.
pub const PROGRAM: &str = "program";
/// Default group that runs last, e.g. reaping stopped processes.
pub const CLEANUP: &str = "cleanup";

/// A named priority bucket. Higher priorities run earlier within a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerGroup {
    pub name: String,
    pub priority: i32,
}

impl SchedulerGroup {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self { name: name.into(), priority }
    }
}

/// Registry of scheduler groups.
///
/// The running order (descending priority, registration order on ties) is
/// computed on first use and cached until the next registration.
#[derive(Debug, Default)]
pub struct SchedulerGroups {
    groups: Vec<SchedulerGroup>,
    order: OnceLock<Vec<String>>,
}

impl SchedulerGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four groups the engine ships with.
    pub fn with_defaults() -> Self {
        let mut groups = Self::new();
        for (name, priority) in [(NETWORK, 700), (SYSTEM, 600), (PROGRAM, 500), (CLEANUP, 100)] {
            groups.register(name, priority);
        }
        groups
    }

    /// Registers a group.
    ///
    /// Returns `false` and leaves the registry untouched if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, priority: i32) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.groups.push(SchedulerGroup { name, priority });
        self.order = OnceLock::new();
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    pub fn priority(&self, name: &str) -> Option<i32> {
        self.groups.iter().find(|g| g.name == name).map(|g| g.priority)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchedulerGroup> {
        self.groups.iter()
    }

    /// Group names in the order they run within one tick.
    pub fn running_order(&self) -> &[String] {
        self.order.get_or_init(|| {
            let mut sorted: Vec<&SchedulerGroup> = self.groups.iter().collect();
            // Stable sort keeps registration order for equal priorities.
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
            sorted.into_iter().map(|g| g.name.clone()).collect()
        })
    }
}
