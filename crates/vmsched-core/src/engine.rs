//! Start/stop decision for one instance.
//!
//! The engine compares the persisted schedule (what was last written) with the
//! live schedule (what the tag says now) inside one evaluation window. It is a
//! pure function of its inputs, so instances can be reconciled in parallel.
//!
//! Evaluation short-circuits in this order:
//!
//! 1. weekday gate, using "today" in the live schedule's timezone
//! 2. start and stop time eligibility against the window
//! 3. lifecycle state gates, start before stop

use crate::schedule::ScheduleModel;
use crate::types::{ActionDecision, LifecycleState};
use crate::window::EvaluationWindow;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ---------------------------------------------------------------------------
// DecisionReason
// ---------------------------------------------------------------------------

/// Why the engine reached its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    TodayNotScheduled,
    NoEdgeInWindow,
    StartDue,
    StopDue,
    BlockedByState,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::TodayNotScheduled => "today_not_scheduled",
            DecisionReason::NoEdgeInWindow => "no_edge_in_window",
            DecisionReason::StartDue => "start_due",
            DecisionReason::StopDue => "stop_due",
            DecisionReason::BlockedByState => "blocked_by_state",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reconciliation (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub resource_name: String,
    pub action: ActionDecision,
    pub reason: DecisionReason,
}

// ---------------------------------------------------------------------------
// ReconciliationEngine
// ---------------------------------------------------------------------------

pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn reconcile(
        persisted: &ScheduleModel,
        live: &ScheduleModel,
        window: &EvaluationWindow,
    ) -> Reconciliation {
        let (action, reason) = Self::decide(persisted, live, window);
        debug!(
            resource = %live.resource_name(),
            action = %action,
            reason = %reason,
            "reconciled"
        );
        Reconciliation {
            resource_name: live.resource_name().to_string(),
            action,
            reason,
        }
    }

    fn decide(
        persisted: &ScheduleModel,
        live: &ScheduleModel,
        window: &EvaluationWindow,
    ) -> (ActionDecision, DecisionReason) {
        if !Self::today_is_scheduled(persisted, live, window.now) {
            return (ActionDecision::None, DecisionReason::TodayNotScheduled);
        }

        let start_due = Self::edge_in_window("start", persisted.start_time(), live.start_time(), window);
        let stop_due = Self::edge_in_window("stop", persisted.stop_time(), live.stop_time(), window);
        if !start_due && !stop_due {
            return (ActionDecision::None, DecisionReason::NoEdgeInWindow);
        }

        let persisted_state = persisted.lifecycle_state();
        let live_state = live.lifecycle_state();

        if start_due && Self::start_allowed(persisted_state, live_state) {
            return (ActionDecision::Start, DecisionReason::StartDue);
        }
        if stop_due && Self::stop_allowed(persisted_state, live_state) {
            return (ActionDecision::Stop, DecisionReason::StopDue);
        }
        (ActionDecision::None, DecisionReason::BlockedByState)
    }

    /// Weekday of `now` in the live timezone, checked against both weekday sets.
    ///
    /// A day removed from the live set is not scheduled even though the
    /// persisted set still has it. Without a live timezone or weekday set
    /// there is no day to check.
    pub fn today_is_scheduled(
        persisted: &ScheduleModel,
        live: &ScheduleModel,
        now: DateTime<Utc>,
    ) -> bool {
        let (Some(tz), Some(live_days)) = (live.timezone(), live.weekdays()) else {
            return false;
        };
        let today = now.with_timezone(&tz).weekday().number_from_monday() as u8;
        let in_persisted = persisted.weekdays().is_some_and(|days| days.contains(today));
        let in_live = live_days.contains(today);

        match (in_persisted, in_live) {
            (true, true) => true,
            // added
            (false, true) => true,
            // removed
            (true, false) => false,
            (false, false) => false,
        }
    }

    /// The live value always decides the window check; a value only the
    /// persisted side still has was removed and never fires.
    fn edge_in_window(
        edge: &str,
        persisted: Option<DateTime<Utc>>,
        live: Option<DateTime<Utc>>,
        window: &EvaluationWindow,
    ) -> bool {
        match (persisted, live) {
            (Some(before), Some(after)) => {
                if before != after {
                    debug!(edge, %before, %after, "time changed");
                }
                window.contains(after)
            }
            (None, Some(after)) => {
                debug!(edge, %after, "time added");
                window.contains(after)
            }
            (Some(before), None) => {
                debug!(edge, %before, "time removed");
                false
            }
            (None, None) => false,
        }
    }

    fn start_allowed(persisted: LifecycleState, live: LifecycleState) -> bool {
        if live.is_terminal() || live == LifecycleState::Running {
            return false;
        }
        persisted == LifecycleState::Stopped && live == LifecycleState::Stopped
    }

    fn stop_allowed(persisted: LifecycleState, live: LifecycleState) -> bool {
        if live.is_terminal() || live == LifecycleState::Stopped {
            return false;
        }
        persisted == LifecycleState::Running && live == LifecycleState::Running
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::persisted::{PersistedRecord, PersistedScheduleBuilder};
    use crate::schedule::{ScheduleFields, WeekdaySet};
    use crate::tag_parser::TagScheduleParser;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2024, 5, 15, h, m, 0).unwrap()
    }

    fn model(
        state: LifecycleState,
        days: &[u8],
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) -> ScheduleModel {
        ScheduleModel::new(
            "web-1",
            state,
            ScheduleFields {
                timezone: Some(chrono_tz::UTC),
                weekdays: Some(WeekdaySet::from_days(days.iter().copied())),
                start,
                stop,
            },
        )
    }

    fn window(past: DateTime<Utc>, now: DateTime<Utc>) -> EvaluationWindow {
        EvaluationWindow::new(past, now)
    }

    fn stored(state: &str, start: &str, stop: &str) -> ScheduleModel {
        PersistedScheduleBuilder::build(&PersistedRecord {
            instance_id: "i-1".to_string(),
            instance_name: "web-1".to_string(),
            lifecycle_state: state.to_string(),
            working_timezone: "UTC".to_string(),
            working_days: "12345".to_string(),
            utc_start_time: start.to_string(),
            utc_stop_time: stop.to_string(),
        })
        .unwrap()
    }

    fn live_from_tag(tag: &str, state: LifecycleState, now: DateTime<Utc>) -> ScheduleModel {
        let cfg = SchedulerConfig::default();
        TagScheduleParser::new(&cfg, now)
            .parse("web-1", state, Some(tag))
            .unwrap()
            .schedule
    }

    // -- weekday gate ------------------------------------------------------

    #[test]
    fn added_weekday_is_scheduled() {
        let persisted = model(LifecycleState::Stopped, &[1, 2, 3], None, None);
        let live = model(LifecycleState::Stopped, &[1, 2, 3, 4], None, None);
        // Thursday
        let thursday = Utc.with_ymd_and_hms(2024, 5, 16, 9, 0, 0).unwrap();
        assert!(ReconciliationEngine::today_is_scheduled(&persisted, &live, thursday));
    }

    #[test]
    fn removed_weekday_is_not_scheduled() {
        let persisted = model(LifecycleState::Stopped, &[1, 2, 3, 4], None, None);
        let live = model(LifecycleState::Stopped, &[1, 2, 3], None, None);
        let thursday = Utc.with_ymd_and_hms(2024, 5, 16, 9, 0, 0).unwrap();
        assert!(!ReconciliationEngine::today_is_scheduled(&persisted, &live, thursday));
    }

    #[test]
    fn today_uses_live_timezone() {
        // 20:00 UTC Wednesday is already Thursday in Tokyo
        let persisted = model(LifecycleState::Stopped, &[4], None, None);
        let live = ScheduleModel::new(
            "web-1",
            LifecycleState::Stopped,
            ScheduleFields {
                timezone: Some(chrono_tz::Asia::Tokyo),
                weekdays: Some(WeekdaySet::from_days([4])),
                start: None,
                stop: None,
            },
        );
        assert!(ReconciliationEngine::today_is_scheduled(&persisted, &live, at(20, 0)));
        assert!(!ReconciliationEngine::today_is_scheduled(&persisted, &live, at(10, 0)));
    }

    #[test]
    fn disabled_live_schedule_never_acts() {
        let persisted = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
        let live = ScheduleModel::new("web-1", LifecycleState::Stopped, ScheduleFields::disabled());
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(r.action, ActionDecision::None);
        assert_eq!(r.reason, DecisionReason::TodayNotScheduled);
    }

    // -- time eligibility --------------------------------------------------

    #[test]
    fn removed_start_never_fires() {
        let persisted = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
        let live = model(LifecycleState::Stopped, &[3], None, None);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(r.action, ActionDecision::None);
        assert_eq!(r.reason, DecisionReason::NoEdgeInWindow);
    }

    #[test]
    fn changed_start_uses_live_value() {
        let persisted = model(LifecycleState::Stopped, &[3], Some(at(7, 0)), None);
        let live = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(r.action, ActionDecision::Start);

        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(6, 55), at(7, 5)));
        assert_eq!(r.action, ActionDecision::None);
    }

    #[test]
    fn newly_added_stop_fires() {
        let persisted = model(LifecycleState::Running, &[3], None, None);
        let live = model(LifecycleState::Running, &[3], None, Some(at(18, 0)));
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(17, 55), at(18, 5)));
        assert_eq!(r.action, ActionDecision::Stop);
        assert_eq!(r.reason, DecisionReason::StopDue);
    }

    #[test]
    fn edge_at_window_boundary_fires() {
        let persisted = model(LifecycleState::Stopped, &[3], None, None);
        let live = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 50), at(8, 0)));
        assert_eq!(r.action, ActionDecision::Start);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(8, 0), at(8, 10)));
        assert_eq!(r.action, ActionDecision::Start);
    }

    // -- state gates and tie-break -----------------------------------------

    #[test]
    fn start_wins_when_both_edges_are_due() {
        let persisted = model(LifecycleState::Stopped, &[3], None, None);
        let live = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), Some(at(8, 3)));
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(r.action, ActionDecision::Start);
        assert_eq!(r.reason, DecisionReason::StartDue);
    }

    #[test]
    fn stop_considered_when_start_is_blocked() {
        let persisted = model(LifecycleState::Running, &[3], None, None);
        let live = model(LifecycleState::Running, &[3], Some(at(8, 0)), Some(at(8, 3)));
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(r.action, ActionDecision::Stop);
    }

    #[test]
    fn terminal_states_block_everything() {
        for state in [LifecycleState::Terminating, LifecycleState::Terminated] {
            let persisted = model(LifecycleState::Stopped, &[3], None, None);
            let live = model(state, &[3], Some(at(8, 0)), Some(at(8, 3)));
            let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
            assert_eq!(r.action, ActionDecision::None);
            assert_eq!(r.reason, DecisionReason::BlockedByState);
        }
    }

    #[test]
    fn start_needs_both_states_stopped() {
        for persisted_state in [LifecycleState::Running, LifecycleState::Stopping] {
            let persisted = model(persisted_state, &[3], None, None);
            let live = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
            let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
            assert_eq!(r.action, ActionDecision::None, "{persisted_state}");
        }
    }

    #[test]
    fn stop_needs_both_states_running() {
        let persisted = model(LifecycleState::Stopped, &[3], None, None);
        let live = model(LifecycleState::Running, &[3], None, Some(at(18, 0)));
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(17, 55), at(18, 5)));
        assert_eq!(r.action, ActionDecision::None);
        assert_eq!(r.reason, DecisionReason::BlockedByState);
    }

    #[test]
    fn wraparound_window_catches_midnight_stop() {
        let persisted = model(LifecycleState::Running, &[3], None, None);
        let stop = at(23, 55);
        let live = model(LifecycleState::Running, &[3], None, Some(stop));
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(23, 50), at(0, 10)));
        assert_eq!(r.action, ActionDecision::Stop);
    }

    // -- end to end --------------------------------------------------------

    #[test]
    fn new_start_in_window_starts_stopped_instance() {
        let now = at(8, 5);
        let persisted = stored("STOPPED", "", "");
        let live = live_from_tag("08To18|12345|UTC", LifecycleState::Stopped, now);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), now));
        assert_eq!(r.action, ActionDecision::Start);
        assert_eq!(r.resource_name, "web-1");
    }

    #[test]
    fn new_start_skips_running_instance() {
        let now = at(8, 5);
        let persisted = stored("STOPPED", "", "");
        let live = live_from_tag("08To18|12345|UTC", LifecycleState::Running, now);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), now));
        assert_eq!(r.action, ActionDecision::None);
    }

    #[test]
    fn unchanged_stop_in_window_stops_running_instance() {
        let now = at(18, 5);
        let persisted = stored("RUNNING", "2024-05-15T08:00:00Z", "2024-05-15T18:00:00Z");
        let live = live_from_tag("08To18|12345|UTC", LifecycleState::Running, now);
        let r = ReconciliationEngine::reconcile(&persisted, &live, &window(at(17, 55), now));
        assert_eq!(r.action, ActionDecision::Stop);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let persisted = model(LifecycleState::Stopped, &[3], None, None);
        let live = model(LifecycleState::Stopped, &[3], Some(at(8, 0)), None);
        let (p, l) = (persisted.clone(), live.clone());
        ReconciliationEngine::reconcile(&persisted, &live, &window(at(7, 55), at(8, 5)));
        assert_eq!(persisted, p);
        assert_eq!(live, l);
    }
}
