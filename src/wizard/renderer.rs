use anyhow::Result;

use super::outcome::{Step, StepOutcome};

/// A rendered step's outcome together with what the user entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub outcome: StepOutcome,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn new(outcome: StepOutcome, value: T) -> Self {
        Self { outcome, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub tag: String,
    pub label: String,
}

impl MenuItem {
    pub fn new(tag: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckItem {
    pub tag: String,
    pub label: String,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub label: String,
    pub value: String,
}

/// Draws one step and blocks until the user answers. Implementations map
/// their own result codes through [`StepOutcome::from_code`].
pub trait StepRenderer {
    /// Pick one entry; the value is the chosen tag
    fn menu(&mut self, step: Step, text: &str, items: &[MenuItem]) -> Result<Reply<Option<String>>>;

    /// Toggle entries; the value lists the tags that are switched on
    fn checklist(&mut self, step: Step, text: &str, items: &[CheckItem]) -> Result<Reply<Vec<String>>>;

    /// Edit text fields; the value has one entry per field
    fn form(&mut self, step: Step, text: &str, fields: &[FormField]) -> Result<Reply<Vec<String>>>;

    /// Yes / no question, "yes" advances
    fn confirm(&mut self, step: Step, text: &str) -> Result<StepOutcome>;

    fn message(&mut self, step: Step, text: &str) -> Result<StepOutcome>;

    /// Non-blocking status line while external tools run
    fn progress(&mut self, step: Step, text: &str) -> Result<()>;
}
