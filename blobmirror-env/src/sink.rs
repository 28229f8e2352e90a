//! Environment sinks: where merged variables are written.

use std::collections::HashMap;

/// Destination for merged environment variables.
///
/// The live process environment is one implementation; tests and
/// embedding hosts use [`MemoryEnv`]. Implementations are not required
/// to be thread-safe for writes; overlay application happens from a
/// single thread.
pub trait EnvSink {
    /// Current value of a variable, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Sets a variable, replacing any existing value.
    fn set(&mut self, key: &str, value: &str);

    /// A point-in-time copy of every variable in the sink.
    fn snapshot(&self) -> HashMap<String, String>;
}

/// Sink backed by the live process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvSink for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&mut self, key: &str, value: &str) {
        // SAFETY: mutating the process environment is only sound while no
        // other thread reads or writes it. Overlay application runs during
        // single-threaded startup or inside the watcher's poll, never
        // concurrently with other environment access.
        unsafe { std::env::set_var(key, value) };
    }

    fn snapshot(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

/// In-memory sink for tests and embedded hosts that manage their own
/// environment table.
#[derive(Clone, Debug, Default)]
pub struct MemoryEnv {
    vars: HashMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EnvSink for MemoryEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.vars.clone()
    }
}
