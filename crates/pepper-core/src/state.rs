use crate::timer::format_timer;

/// How long an alert stays on the surface unless superseded.
pub const ALERT_DURATION_MS: u64 = 20_000;

pub const DEFAULT_LINE1: &str = "Current Cue";
pub const DEFAULT_LINE2: &str = "Next Cue";

/// An alert currently installed on the display.
///
/// The text and the raise timestamp travel together so one can never be
/// present without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub text: String,
    pub raised_at_ms: u64,
}

/// Canonical description of what the glasses should be showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub line1: String,
    pub line2: String,
    pub timer_visible: bool,
    pub timer_elapsed_seconds: u64,
    pub pacing_target_seconds: Option<u64>,
    pub alert: Option<Alert>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            line1: DEFAULT_LINE1.to_string(),
            line2: DEFAULT_LINE2.to_string(),
            timer_visible: false,
            timer_elapsed_seconds: 0,
            pacing_target_seconds: None,
            alert: None,
        }
    }
}

impl DisplayState {
    pub fn timer_text(&self) -> String {
        format_timer(self.timer_elapsed_seconds, self.pacing_target_seconds)
    }

    /// Timer text when the timer region is part of the surface.
    pub fn visible_timer_text(&self) -> Option<String> {
        self.timer_visible.then(|| self.timer_text())
    }

    pub fn alert_text(&self) -> Option<&str> {
        self.alert.as_ref().map(|alert| alert.text.as_str())
    }
}
