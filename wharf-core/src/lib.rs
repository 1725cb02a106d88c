//! wharf core library
//!
//! Shared types, persistence, and runtime adapters for the wharf
//! deployment daemon.

pub mod compose;
pub mod config;
pub mod error;
pub mod labels;
pub mod observability;
pub mod project;
pub mod runtime;
pub mod source;
pub mod store;

// Re-export commonly used items
pub use config::Config;
pub use error::{Result, WharfError};
pub use observability::init as init_observability;
pub use project::{DeployKind, Project, ProjectStatus};
pub use runtime::{ComposeCliAdapter, DockerAdapter, RuntimeAdapter};
pub use source::SourceSync;
pub use store::ProjectStore;
