pub mod bootstrap;
pub mod command;
pub mod config;
pub mod error;
pub mod handoff;
pub mod migrations;
pub mod observability;
pub mod readiness;
pub mod restore;
pub mod state;

pub use bootstrap::{BootstrapReport, Bootstrapper, Collaborators, Stage};
pub use config::{BootstrapConfig, ConfigOverrides, RestorePolicy};
pub use error::{BootstrapError, Result};
