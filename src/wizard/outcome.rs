use std::fmt;
use std::process::ExitStatus;

/// What a rendered step asks the controller to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advance,
    Quit,
    Repeat,
    Back,
    /// Any code the wizard does not know; always fatal
    Abort(i32),
}

impl StepOutcome {
    /// Map a renderer exit code. 0 is OK, 1 and 255 are cancel and escape,
    /// 2 re-renders and 3 is the extra "Back" button.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StepOutcome::Advance,
            1 | 255 => StepOutcome::Quit,
            2 => StepOutcome::Repeat,
            3 => StepOutcome::Back,
            other => StepOutcome::Abort(other),
        }
    }

    /// Killed by a signal counts as an abort
    pub fn from_status(status: ExitStatus) -> Self {
        status
            .code()
            .map(Self::from_code)
            .unwrap_or(StepOutcome::Abort(-1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    SelectDevice,
    FormatOrKeep,
    SelectSlots,
    Sizing,
    Confirm,
    Install,
    Done,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::SelectDevice,
        Step::FormatOrKeep,
        Step::SelectSlots,
        Step::Sizing,
        Step::Confirm,
        Step::Install,
        Step::Done,
    ];

    /// 1-based position in the wizard
    pub fn number(self) -> u8 {
        match self {
            Step::SelectDevice => 1,
            Step::FormatOrKeep => 2,
            Step::SelectSlots => 3,
            Step::Sizing => 4,
            Step::Confirm => 5,
            Step::Install => 6,
            Step::Done => 7,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::SelectDevice => "Select device",
            Step::FormatOrKeep => "Existing layout",
            Step::SelectSlots => "Choose partitions",
            Step::Sizing => "Partition sizes",
            Step::Confirm => "Confirm",
            Step::Install => "Installing",
            Step::Done => "Done",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Step::SelectDevice => "select_device",
            Step::FormatOrKeep => "format_or_keep",
            Step::SelectSlots => "select_slots",
            Step::Sizing => "sizing",
            Step::Confirm => "confirm",
            Step::Install => "install",
            Step::Done => "done",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.code())
    }
}
