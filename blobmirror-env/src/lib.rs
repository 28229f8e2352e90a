//! Environment overlay for mirrored workspaces.
//!
//! A remote container may carry a distinguished `.env` object whose
//! variables are applied to the host environment with fixed precedence:
//! OS-provided values win over remote values, which win over local
//! fallbacks. The sink trait keeps the merge logic testable without
//! touching the live process environment.

pub mod merge;
pub mod parse;
pub mod sink;

pub use merge::{EnvSource, MergeOutcome, apply_with_precedence};
pub use parse::parse_env_content;
pub use sink::{EnvSink, MemoryEnv, ProcessEnv};
