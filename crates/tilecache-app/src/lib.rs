//! Tilecache application layer.
//!
//! [`LifecycleController`] turns Run / Stop / Quit into ordered sequences of
//! collaborator calls. Every step is attempted and its outcome recorded in a
//! [`Report`]; a failing step never aborts the ones after it.

pub mod console;
pub mod controller;
pub mod paths;

pub use console::ConsoleCommand;
pub use controller::{
    Collaborators, LifecycleController, Operation, Report, Step, StepOutcome,
    CONNECTIVITY_TIMEOUT,
};
pub use paths::AppPaths;
