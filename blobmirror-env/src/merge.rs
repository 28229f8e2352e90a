//! Three-tier precedence merge: OS over remote over local.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::EnvSink;

/// Which tier supplied a variable's final value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvSource {
    Os,
    Remote,
    Local,
}

/// Result of applying the overlay: final values, per-key provenance, and
/// the keys each tier wrote during its pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    pub variables: HashMap<String, String>,
    pub sources: HashMap<String, EnvSource>,
    pub local_keys: HashSet<String>,
    pub remote_keys: HashSet<String>,
    /// Keys that collided with the OS environment and were preserved.
    pub os_keys: HashSet<String>,
}

/// Applies local then remote variables through the sink.
///
/// `os_keys` is the set of variable names present in the OS environment
/// before any overlay ran. Those keys are never written, regardless of
/// which pass defines them, and their live values are reported with
/// source `os` after both passes. The remote pass runs second
/// unconditionally, so a remote value overwrites a local one. Applying
/// the same inputs twice yields the same sink state and outcome.
pub fn apply_with_precedence(
    os_keys: &HashSet<String>,
    local: &HashMap<String, String>,
    remote: &HashMap<String, String>,
    sink: &mut dyn EnvSink,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut preserved: HashSet<String> = HashSet::new();

    for (key, value) in local {
        if os_keys.contains(key) {
            preserved.insert(key.clone());
            continue;
        }
        sink.set(key, value);
        outcome.variables.insert(key.clone(), value.clone());
        outcome.sources.insert(key.clone(), EnvSource::Local);
        outcome.local_keys.insert(key.clone());
    }

    for (key, value) in remote {
        if os_keys.contains(key) {
            preserved.insert(key.clone());
            continue;
        }
        sink.set(key, value);
        outcome.variables.insert(key.clone(), value.clone());
        outcome.sources.insert(key.clone(), EnvSource::Remote);
        outcome.remote_keys.insert(key.clone());
    }

    // Preserved keys are captured after both passes so a collision first
    // seen in the remote pass is still reported.
    for key in preserved {
        let Some(live) = sink.get(&key) else {
            debug!(key = %key, "OS variable no longer present, skipping capture");
            continue;
        };
        outcome.variables.insert(key.clone(), live);
        outcome.sources.insert(key.clone(), EnvSource::Os);
        outcome.os_keys.insert(key);
    }

    debug!(
        local = outcome.local_keys.len(),
        remote = outcome.remote_keys.len(),
        preserved = outcome.os_keys.len(),
        "applied environment overlay"
    );
    outcome
}
