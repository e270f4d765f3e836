//! Command implementations for the winsetup CLI
//!
//! - **install**: application installation through the engine
//! - **check**: installed-state report
//! - **list**: catalog listing
//! - **system**: service disabling, bloatware removal, registry tweaks
//! - **profile**: profile creation and replay
//! - **utils**: shared session state and output helpers (internal)

pub mod check;
pub mod install;
pub mod list;
pub mod profile;
pub mod system;
pub(crate) mod utils;

// Re-export commonly used commands for convenience
pub use check::check;
pub use install::{InstallOptions, install};
pub use list::list;
pub use system::{debloat, services, tweaks};
pub use utils::Session;
