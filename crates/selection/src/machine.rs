use std::collections::BTreeSet;

use protocol::FilterSelection;

/// Which half of the page is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Filter controls visible, trigger generates.
    #[default]
    Selecting,
    /// Artifact displayed, filter controls hidden, trigger resets.
    ShowingResult,
}

/// Discrete user/network inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `None` (or a blank string) clears the resolution.
    SetResolution(Option<String>),
    ToggleYear(String),
    ToggleState(String),
    /// The single generate/reset control was activated.
    TriggerPressed,
    GenerationSucceeded { html_file_path: String },
    GenerationFailed { message: String },
}

/// Side effects the UI layer must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Issue exactly one generation request for this selection.
    Generate(FilterSelection),
    /// Ask the server to purge the artifact store. Fire-and-forget.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLabel {
    Generate,
    Generating,
    Reset,
}

impl TriggerLabel {
    pub fn text(self) -> &'static str {
        match self {
            Self::Generate => "Generate Map",
            Self::Generating => "Generating...",
            Self::Reset => "Reset",
        }
    }
}

/// Derived presentation of the trigger control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerView {
    pub label: TriggerLabel,
    pub enabled: bool,
}

/// Client-side selection state.
///
/// Value type with pure transitions: [`SelectionState::step`] consumes the
/// state and an [`Event`], returning the next state and at most one
/// [`Command`]. Everything the UI shows is derived from the state on demand,
/// so the generate guard is re-evaluated after every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    resolution: Option<String>,
    years: BTreeSet<String>,
    states: BTreeSet<String>,
    mode: Mode,
    in_flight: bool,
    artifact: Option<String>,
    error: Option<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, event: Event) -> (Self, Option<Command>) {
        match event {
            Event::SetResolution(value) => {
                if self.accepts_filter_edits() {
                    self.resolution = value.filter(|v| !v.trim().is_empty());
                }
                (self, None)
            }
            Event::ToggleYear(year) => {
                if self.accepts_filter_edits() {
                    toggle(&mut self.years, year);
                }
                (self, None)
            }
            Event::ToggleState(state) => {
                if self.accepts_filter_edits() {
                    toggle(&mut self.states, state);
                }
                (self, None)
            }
            Event::TriggerPressed => match self.mode {
                Mode::Selecting => {
                    if !self.can_generate() {
                        return (self, None);
                    }
                    self.in_flight = true;
                    self.error = None;
                    let selection = self.selection();
                    (self, Some(Command::Generate(selection)))
                }
                Mode::ShowingResult => (Self::new(), Some(Command::Reset)),
            },
            Event::GenerationSucceeded { html_file_path } => {
                if self.in_flight {
                    self.in_flight = false;
                    self.mode = Mode::ShowingResult;
                    self.artifact = Some(html_file_path);
                }
                (self, None)
            }
            Event::GenerationFailed { message } => {
                if self.in_flight {
                    self.in_flight = false;
                    self.error = Some(message);
                }
                (self, None)
            }
        }
    }

    /// The generate guard: a complete selection, in selecting mode, with no
    /// request already pending.
    pub fn can_generate(&self) -> bool {
        self.mode == Mode::Selecting && !self.in_flight && self.selection().is_valid()
    }

    pub fn trigger(&self) -> TriggerView {
        match self.mode {
            Mode::ShowingResult => TriggerView {
                label: TriggerLabel::Reset,
                enabled: true,
            },
            Mode::Selecting if self.in_flight => TriggerView {
                label: TriggerLabel::Generating,
                enabled: false,
            },
            Mode::Selecting => TriggerView {
                label: TriggerLabel::Generate,
                enabled: self.can_generate(),
            },
        }
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection {
            resolution: self.resolution.clone().unwrap_or_default(),
            years: self.years.iter().cloned().collect(),
            states: self.states.iter().cloned().collect(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn filters_visible(&self) -> bool {
        self.mode == Mode::Selecting
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Reference of the artifact currently on display.
    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    /// Message from the last failed generation, if it has not been superseded.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn has_year(&self, year: &str) -> bool {
        self.years.contains(year)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    fn accepts_filter_edits(&self) -> bool {
        self.mode == Mode::Selecting && !self.in_flight
    }
}

fn toggle(set: &mut BTreeSet<String>, value: String) {
    if !set.remove(&value) {
        set.insert(value);
    }
}
