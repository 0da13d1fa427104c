use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Power/provisioning state of an instance as reported by its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Provisioning,
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
}

impl LifecycleState {
    pub fn all() -> &'static [LifecycleState] {
        &[
            LifecycleState::Provisioning,
            LifecycleState::Starting,
            LifecycleState::Running,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
            LifecycleState::Terminating,
            LifecycleState::Terminated,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Provisioning => "PROVISIONING",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Terminating | LifecycleState::Terminated
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = crate::error::SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        LifecycleState::all()
            .iter()
            .copied()
            .find(|state| state.as_str() == upper)
            .ok_or_else(|| crate::error::SchedError::InvalidLifecycleState(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TagParseOutcome
// ---------------------------------------------------------------------------

/// How a live schedule was derived from the schedule tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagParseOutcome {
    TagUndefined,
    TagDefinedWithNoValue,
    TagDefinedWithValidValue,
    TagDefinedWithInvalidValue,
    TagDefinedWithNoAutomation,
}

impl TagParseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TagParseOutcome::TagUndefined => "TAG_UNDEFINED",
            TagParseOutcome::TagDefinedWithNoValue => "TAG_DEFINED_WITH_NO_VALUE",
            TagParseOutcome::TagDefinedWithValidValue => "TAG_DEFINED_WITH_VALID_VALUE",
            TagParseOutcome::TagDefinedWithInvalidValue => "TAG_DEFINED_WITH_INVALID_VALUE",
            TagParseOutcome::TagDefinedWithNoAutomation => "TAG_DEFINED_WITH_NO_AUTOMATION",
        }
    }

    /// True when the live schedule came from operator defaults rather than the tag.
    pub fn uses_defaults(self) -> bool {
        matches!(
            self,
            TagParseOutcome::TagUndefined
                | TagParseOutcome::TagDefinedWithNoValue
                | TagParseOutcome::TagDefinedWithInvalidValue
        )
    }
}

impl fmt::Display for TagParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionDecision {
    Start,
    Stop,
    None,
}

impl ActionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionDecision::Start => "START",
            ActionDecision::Stop => "STOP",
            ActionDecision::None => "NONE",
        }
    }

    pub fn is_actionable(self) -> bool {
        !matches!(self, ActionDecision::None)
    }

    /// The lifecycle state the instance settles in once the action completes.
    pub fn target_state(self) -> Option<LifecycleState> {
        match self {
            ActionDecision::Start => Some(LifecycleState::Running),
            ActionDecision::Stop => Some(LifecycleState::Stopped),
            ActionDecision::None => None,
        }
    }
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn lifecycle_state_parses_case_insensitively() {
        assert_eq!(
            LifecycleState::from_str("stopped").unwrap(),
            LifecycleState::Stopped
        );
        assert_eq!(
            LifecycleState::from_str(" RUNNING ").unwrap(),
            LifecycleState::Running
        );
        assert!(LifecycleState::from_str("paused").is_err());
    }

    #[test]
    fn lifecycle_state_serializes_as_label() {
        let json = serde_json::to_string(&LifecycleState::Terminating).unwrap();
        assert_eq!(json, "\"TERMINATING\"");
    }

    #[test]
    fn outcome_labels_match_serde() {
        let json = serde_json::to_string(&TagParseOutcome::TagDefinedWithNoAutomation).unwrap();
        assert_eq!(
            json,
            format!("\"{}\"", TagParseOutcome::TagDefinedWithNoAutomation)
        );
    }

    #[test]
    fn action_target_state() {
        assert_eq!(
            ActionDecision::Start.target_state(),
            Some(LifecycleState::Running)
        );
        assert_eq!(
            ActionDecision::Stop.target_state(),
            Some(LifecycleState::Stopped)
        );
        assert_eq!(ActionDecision::None.target_state(), None);
        assert!(!ActionDecision::None.is_actionable());
    }
}
