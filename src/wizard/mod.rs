//! The interactive seven step flow

pub mod context;
pub mod dialog;
pub mod engine;
pub mod outcome;
pub mod platform;
pub mod renderer;
pub mod steps;

pub use context::WizardContext;
pub use dialog::DialogRenderer;
pub use engine::{StepController, WizardExit};
pub use platform::HostPlatform;
