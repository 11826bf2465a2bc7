use super::outcome::Step;
use crate::config::Config;
use crate::plan::PartitionPlan;

/// Mutable wizard state, owned by the step controller
#[derive(Debug, Clone)]
pub struct WizardState {
    pub current_step: Step,
    pub selected_device: Option<String>,
    pub plan: Option<PartitionPlan>,
    /// Advice shown above the next rendered step, cleared once shown
    pub user_message: String,
    /// The existing layout is reused, only the bootloader gets installed
    pub keep_existing: bool,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: Step::SelectDevice,
            selected_device: None,
            plan: None,
            user_message: String::new(),
            keep_existing: false,
        }
    }
}

impl WizardState {
    /// Step text with any pending advice in front of it
    pub fn take_text(&mut self, text: &str) -> String {
        let message = std::mem::take(&mut self.user_message);
        if message.is_empty() {
            text.to_string()
        } else {
            format!("{}\n\n{}", message, text)
        }
    }
}

pub struct WizardContext<R, P> {
    pub state: WizardState,
    pub config: Config,
    pub renderer: R,
    pub platform: P,
}

impl<R, P> WizardContext<R, P> {
    pub fn new(config: Config, renderer: R, platform: P) -> Self {
        Self {
            state: WizardState::default(),
            config,
            renderer,
            platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_text_clears_message() {
        let mut state = WizardState::default();
        assert_eq!(state.take_text("Pick a device"), "Pick a device");

        state.user_message = "STORAGE was too small".into();
        assert_eq!(
            state.take_text("Edit sizes"),
            "STORAGE was too small\n\nEdit sizes"
        );
        assert!(state.user_message.is_empty());
    }
}
