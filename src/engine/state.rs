use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The mutable session record, as handed to and from the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    /// Index into the sorted step view. Not a position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    /// Positions of completed steps.
    #[serde(default)]
    pub completed_steps: HashSet<i64>,
    /// Milliseconds since the epoch of the last mutation.
    #[serde(default)]
    pub timestamp: i64,
}

impl PlaybackState {
    /// Fresh state for a newly started recording.
    pub fn started(recording_id: impl Into<String>) -> Self {
        let mut state = Self {
            is_playing: true,
            recording_id: Some(recording_id.into()),
            ..Default::default()
        };
        state.touch();
        state
    }

    /// Record a completion. Returns false if the position was already there.
    pub fn mark_completed(&mut self, position: i64) -> bool {
        let added = self.completed_steps.insert(position);
        self.touch();
        added
    }

    pub fn is_completed(&self, position: i64) -> bool {
        self.completed_steps.contains(&position)
    }

    pub fn touch(&mut self) {
        self.timestamp = chrono::Utc::now().timestamp_millis();
    }
}

/// Why playback stopped. The `Display` text is what the user is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The current page belongs to a later step whose predecessors are not done.
    PrerequisiteViolation {
        /// First incomplete prerequisite.
        position: i64,
        url: String,
    },
    /// The current page is not part of the guide.
    OffPath { location: String },
    /// The bound target disappeared or stopped matching while idle.
    Invalidated,
    FetchFailed(String),
    /// The user stopped the guide.
    Aborted,
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrerequisiteViolation { url, .. } => {
                write!(f, "Complete the earlier steps first. Continue at {}", url)
            }
            Self::OffPath { location } => {
                write!(f, "You left the guide: {} is not part of it", location)
            }
            Self::Invalidated => f.write_str("The page changed and this step can no longer be shown"),
            Self::FetchFailed(e) => write!(f, "Could not load the guide: {}", e),
            Self::Aborted => f.write_str("Guide stopped"),
            Self::Failed(e) => write!(f, "Guide stopped after an error: {}", e),
        }
    }
}

/// Scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Looking for the active step's target.
    Resolving,
    /// Target bound, listener armed, validation loop running.
    AwaitingInteraction,
    /// Target not found; waiting for the user to pick a recovery.
    AwaitingRecovery,
    /// Step done, moving on or waiting for the page to change.
    Advancing,
    Completed,
    Stopped(StopReason),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Resolving => f.write_str("resolving"),
            Self::AwaitingInteraction => f.write_str("awaiting interaction"),
            Self::AwaitingRecovery => f.write_str("awaiting recovery"),
            Self::Advancing => f.write_str("advancing"),
            Self::Completed => f.write_str("completed"),
            Self::Stopped(reason) => write!(f, "stopped ({})", reason),
        }
    }
}

/// Result of an engine entry point. Playback never reports failure as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A step is displayed and waiting for the user.
    Active {
        index: usize,
        position: i64,
        /// Shown for context on a backward visit; already completed.
        revisit: bool,
    },
    /// Nothing to do on this page; the next step lives at `url`.
    AwaitingNavigation { url: String },
    /// The target was not found. Retry, skip or abort.
    Recoverable { index: usize, position: i64 },
    Completed,
    Stopped(StopReason),
    /// A newer operation started while this one was in flight.
    Superseded,
    /// The call did not apply to the current state.
    Ignored,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active {
                position, revisit, ..
            } => {
                write!(f, "step {} active", position)?;
                if *revisit {
                    f.write_str(" (revisit)")?;
                }
                Ok(())
            }
            Self::AwaitingNavigation { url } => write!(f, "waiting for navigation to {}", url),
            Self::Recoverable { position, .. } => {
                write!(f, "step {}: target not found", position)
            }
            Self::Completed => f.write_str("guide completed"),
            Self::Stopped(reason) => write!(f, "stopped: {}", reason),
            Self::Superseded => f.write_str("superseded"),
            Self::Ignored => f.write_str("ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_completed_is_idempotent() {
        let mut state = PlaybackState::started("demo");
        assert!(state.mark_completed(3));
        assert!(!state.mark_completed(3));
        assert_eq!(state.completed_steps.len(), 1);
        assert!(state.is_completed(3));
        assert!(state.timestamp > 0);
    }

    #[test]
    fn test_state_wire_format() {
        let mut state = PlaybackState::started("demo");
        state.current_step = Some(1);
        state.mark_completed(0);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["isPlaying"], true);
        assert_eq!(json["recordingId"], "demo");
        assert_eq!(json["currentStep"], 1);
        assert_eq!(json["completedSteps"][0], 0);

        let back: PlaybackState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_stop_reasons_are_distinct() {
        let reasons = [
            StopReason::PrerequisiteViolation {
                position: 1,
                url: "/b".into(),
            },
            StopReason::OffPath {
                location: "/x".into(),
            },
            StopReason::Invalidated,
            StopReason::FetchFailed("timeout".into()),
            StopReason::Aborted,
            StopReason::Failed("boom".into()),
        ];
        let texts: HashSet<String> = reasons.iter().map(|r| r.to_string()).collect();
        assert_eq!(texts.len(), reasons.len());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Stopped(StopReason::Aborted).is_terminal());
        assert!(!Phase::Advancing.is_terminal());
        assert!(!Phase::AwaitingRecovery.is_terminal());
        assert_eq!(Phase::default(), Phase::Idle);
    }
}
