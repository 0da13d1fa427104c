//! One control-loop pass over every persisted schedule record.
//!
//! Instances are evaluated in parallel, then every START/STOP decision is
//! applied in parallel, then the live schedules are written back. A failure
//! for one instance is recorded in its report and never stops the others.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::codec::NormalizationCodec;
use crate::config::SchedulerConfig;
use crate::directory::ResourceDirectory;
use crate::engine::{DecisionReason, ReconciliationEngine};
use crate::error::{Result, SchedError};
use crate::patterns::TIMESTAMP_FORMAT;
use crate::persisted::{PersistedRecord, PersistedScheduleBuilder};
use crate::schedule::ScheduleModel;
use crate::store::ScheduleStore;
use crate::tag_parser::TagScheduleParser;
use crate::types::{ActionDecision, TagParseOutcome};
use crate::window::EvaluationWindow;

pub const DISABLED_MESSAGE: &str =
    "resource command scheduler is disabled, please enable it from configuration";
pub const EXECUTED_MESSAGE: &str = "resource command scheduler executed";

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count plus the entries counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tally<T> {
    pub count: usize,
    pub instances: Vec<T>,
}

impl<T> Default for Tally<T> {
    fn default() -> Self {
        Self {
            count: 0,
            instances: Vec::new(),
        }
    }
}

impl<T> Tally<T> {
    fn push(&mut self, entry: T) {
        self.count += 1;
        self.instances.push(entry);
    }
}

/// Outcome for one instance in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub instance_id: String,
    pub name: String,
    pub outcome: Option<TagParseOutcome>,
    pub live_schedule: Option<String>,
    pub persisted_schedule: Option<String>,
    pub action: ActionDecision,
    pub reason: Option<DecisionReason>,
    /// True once both schedules were built and compared.
    pub reconciled: bool,
    pub error: Option<String>,
}

impl ResourceReport {
    fn new(record: &PersistedRecord) -> Self {
        Self {
            instance_id: record.instance_id.clone(),
            name: record.instance_name.clone(),
            outcome: None,
            live_schedule: None,
            persisted_schedule: None,
            action: ActionDecision::None,
            reason: None,
            reconciled: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub instance_id: String,
    pub name: String,
    pub at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub message: String,
    pub status: RunStatus,
    pub started_at: String,
    pub execution_time_ms: u64,
    pub dry_run: bool,
    pub window: Option<EvaluationWindow>,
    pub instance_processed: Tally<ResourceReport>,
    pub instance_started: Tally<ActionEntry>,
    pub instance_stopped: Tally<ActionEntry>,
}

impl RunSummary {
    fn new(now: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            message: EXECUTED_MESSAGE.to_string(),
            status: RunStatus::Success,
            started_at: now.format(TIMESTAMP_FORMAT).to_string(),
            execution_time_ms: 0,
            dry_run,
            window: None,
            instance_processed: Tally::default(),
            instance_started: Tally::default(),
            instance_stopped: Tally::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Per-instance working state carried between the pass stages.
struct Evaluation {
    report: ResourceReport,
    live: Option<ScheduleModel>,
    applied: bool,
    collaborator_failed: bool,
}

pub struct Processor<'a> {
    config: &'a SchedulerConfig,
    directory: &'a dyn ResourceDirectory,
    store: &'a dyn ScheduleStore,
    dry_run: bool,
}

impl<'a> Processor<'a> {
    pub fn new(
        config: &'a SchedulerConfig,
        directory: &'a dyn ResourceDirectory,
        store: &'a dyn ScheduleStore,
    ) -> Self {
        Self {
            config,
            directory,
            store,
            dry_run: false,
        }
    }

    /// Decide without applying actions or writing back schedules.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run_pass(&self, now: DateTime<Utc>) -> RunSummary {
        let clock = Instant::now();
        let mut summary = RunSummary::new(now, self.dry_run);

        if !self.config.scheduler.activate_auto_start_stop {
            info!("{DISABLED_MESSAGE}");
            summary.message = DISABLED_MESSAGE.to_string();
            return summary;
        }

        let window = EvaluationWindow::ending_at(now, self.config.scheduler.minutes_delta);
        summary.window = Some(window);
        info!(past = %window.past, now = %window.now, dry_run = self.dry_run, "reconciliation pass started");

        let records = match self.store.load_all() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to load schedule records");
                summary.status = RunStatus::Failure;
                summary.execution_time_ms = elapsed_ms(clock);
                return summary;
            }
        };
        if records.is_empty() {
            info!("no instances to process at this moment");
        }

        let mut evaluations: Vec<Evaluation> = records
            .par_iter()
            .map(|record| self.evaluate(record, &window))
            .collect();

        if !self.dry_run {
            evaluations
                .par_iter_mut()
                .filter(|e| e.report.action.is_actionable())
                .for_each(|e| self.apply(e));

            for e in evaluations.iter_mut() {
                self.write_back(e);
            }
        }

        let acted_at = now.format(TIMESTAMP_FORMAT).to_string();
        for e in evaluations {
            if e.collaborator_failed {
                summary.status = RunStatus::Failure;
            }
            if e.applied || (self.dry_run && e.report.action.is_actionable()) {
                let entry = ActionEntry {
                    instance_id: e.report.instance_id.clone(),
                    name: e.report.name.clone(),
                    at: acted_at.clone(),
                };
                match e.report.action {
                    ActionDecision::Start => summary.instance_started.push(entry),
                    ActionDecision::Stop => summary.instance_stopped.push(entry),
                    ActionDecision::None => {}
                }
            }
            summary.instance_processed.push(e.report);
        }

        summary.execution_time_ms = elapsed_ms(clock);
        info!(
            status = %summary.status,
            processed = summary.instance_processed.count,
            started = summary.instance_started.count,
            stopped = summary.instance_stopped.count,
            "reconciliation pass finished"
        );
        summary
    }

    fn evaluate(&self, record: &PersistedRecord, window: &EvaluationWindow) -> Evaluation {
        let mut report = ResourceReport::new(record);
        match self.reconcile_one(record, window, &mut report) {
            Ok(live) => Evaluation {
                report,
                live: Some(live),
                applied: false,
                collaborator_failed: false,
            },
            Err(e) => {
                let collaborator_failed = is_collaborator_failure(&e);
                if collaborator_failed {
                    warn!(resource = %record.instance_id, error = %e, "instance skipped");
                } else {
                    info!(resource = %record.instance_id, error = %e, "instance skipped");
                }
                if let SchedError::UnresolvableDefault { outcome, .. } = &e {
                    report.outcome = Some(*outcome);
                }
                report.error = Some(e.to_string());
                Evaluation {
                    report,
                    live: None,
                    applied: false,
                    collaborator_failed,
                }
            }
        }
    }

    fn reconcile_one(
        &self,
        record: &PersistedRecord,
        window: &EvaluationWindow,
        report: &mut ResourceReport,
    ) -> Result<ScheduleModel> {
        let snapshot = self.directory.describe(&record.instance_id)?;
        report.name = snapshot.name.clone();

        let tag = snapshot.tag_value(&self.config.scheduler.schedule_tag_key);
        let parsed = TagScheduleParser::new(self.config, window.now).parse(
            &snapshot.name,
            snapshot.lifecycle_state,
            tag,
        )?;
        report.outcome = Some(parsed.outcome);
        report.live_schedule = Some(parsed.schedule.to_string());

        let persisted = PersistedScheduleBuilder::build(record)?;
        report.persisted_schedule = Some(persisted.to_string());

        let decision = ReconciliationEngine::reconcile(&persisted, &parsed.schedule, window);
        report.action = decision.action;
        report.reason = Some(decision.reason);
        report.reconciled = true;
        Ok(parsed.schedule)
    }

    fn apply(&self, e: &mut Evaluation) {
        let id = &e.report.instance_id;
        match self.directory.apply(id, e.report.action) {
            Ok(()) => e.applied = true,
            Err(err) => {
                error!(resource = %id, action = %e.report.action, error = %err, "action failed");
                e.report.error = Some(err.to_string());
                e.collaborator_failed = true;
            }
        }
    }

    /// Store the live schedule, in the state the instance settles in.
    fn write_back(&self, e: &mut Evaluation) {
        let Some(live) = &e.live else {
            return;
        };
        let state = if e.applied {
            e.report.action.target_state().unwrap_or(live.lifecycle_state())
        } else {
            live.lifecycle_state()
        };
        let updated = ScheduleModel::new(live.resource_name(), state, live.fields());
        let record = NormalizationCodec::encode(&e.report.instance_id, &updated);
        if let Err(err) = self.store.upsert(&record) {
            error!(resource = %e.report.instance_id, error = %err, "schedule write-back failed");
            e.report.error = Some(err.to_string());
            e.collaborator_failed = true;
        }
    }
}

fn is_collaborator_failure(e: &SchedError) -> bool {
    matches!(
        e,
        SchedError::Directory(_)
            | SchedError::ResourceNotFound(_)
            | SchedError::Store(_)
            | SchedError::Io(_)
    )
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleDefaults;
    use crate::directory::{InventoryDirectory, ResourceSnapshot};
    use crate::paths;
    use crate::store::RedbScheduleStore;
    use crate::types::LifecycleState;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const INVENTORY: &str = r#"
resources:
  - id: i-web
    name: web-1
    lifecycle_state: STOPPED
    freeform_tags:
      Schedule: "08To18|12345|UTC"
  - id: i-db
    name: db-1
    lifecycle_state: RUNNING
    freeform_tags:
      Schedule: "NA"
  - id: i-api
    name: api-1
    lifecycle_state: RUNNING
  - id: i-bad
    name: bad-1
    lifecycle_state: RUNNING
    freeform_tags:
      Schedule: "08To18|12345|UTC"
"#;

    /// Wednesday, window 07:55..08:05.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 8, 5, 30).unwrap()
    }

    fn record(id: &str, name: &str, state: &str, start: &str, stop: &str) -> PersistedRecord {
        PersistedRecord {
            instance_id: id.to_string(),
            instance_name: name.to_string(),
            lifecycle_state: state.to_string(),
            working_timezone: "UTC".to_string(),
            working_days: "12345".to_string(),
            utc_start_time: start.to_string(),
            utc_stop_time: stop.to_string(),
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: std::path::PathBuf,
        directory: InventoryDirectory,
        store: RedbScheduleStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(paths::sched_dir(&root)).unwrap();
        std::fs::write(paths::inventory_path(&root), INVENTORY).unwrap();
        let directory = InventoryDirectory::open(&root).unwrap();
        let store = RedbScheduleStore::open_in(&root, "instance_schedules").unwrap();
        store.upsert(&record("i-web", "web-1", "STOPPED", "", "")).unwrap();
        store
            .upsert(&record("i-db", "db-1", "RUNNING", "", "2024-05-15T08:00:00Z"))
            .unwrap();
        store
            .upsert(&record("i-bad", "bad-1", "RUNNING", "yesterday", ""))
            .unwrap();
        Fixture {
            _dir: dir,
            root,
            directory,
            store,
        }
    }

    fn report<'s>(summary: &'s RunSummary, id: &str) -> &'s ResourceReport {
        summary
            .instance_processed
            .instances
            .iter()
            .find(|r| r.instance_id == id)
            .unwrap()
    }

    #[test]
    fn pass_starts_due_instance_and_writes_back() {
        let fx = fixture();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.message, EXECUTED_MESSAGE);
        assert_eq!(summary.started_at, "2024-05-15T08:05:30Z");
        assert_eq!(summary.instance_processed.count, 3);
        assert_eq!(summary.instance_started.count, 1);
        assert_eq!(summary.instance_started.instances[0].name, "web-1");
        assert_eq!(summary.instance_stopped.count, 0);

        let web = report(&summary, "i-web");
        assert_eq!(web.action, ActionDecision::Start);
        assert_eq!(web.reason, Some(DecisionReason::StartDue));
        assert_eq!(web.outcome, Some(TagParseOutcome::TagDefinedWithValidValue));

        let reopened = InventoryDirectory::open(&fx.root).unwrap();
        assert_eq!(
            reopened.describe("i-web").unwrap().lifecycle_state,
            LifecycleState::Running
        );

        let stored = fx.store.get("i-web").unwrap().unwrap();
        assert_eq!(stored.lifecycle_state, "RUNNING");
        assert_eq!(stored.utc_start_time, "2024-05-15T08:00:00Z");
        assert_eq!(stored.utc_stop_time, "2024-05-15T18:00:00Z");
        assert_eq!(stored.working_days, "12345");
        assert_eq!(stored.working_timezone, "UTC");
    }

    #[test]
    fn opted_out_instance_is_left_alone_and_recorded_disabled() {
        let fx = fixture();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        let db = report(&summary, "i-db");
        assert_eq!(db.action, ActionDecision::None);
        assert_eq!(db.outcome, Some(TagParseOutcome::TagDefinedWithNoAutomation));
        assert_eq!(db.reason, Some(DecisionReason::TodayNotScheduled));

        let stored = fx.store.get("i-db").unwrap().unwrap();
        assert_eq!(stored.lifecycle_state, "RUNNING");
        assert_eq!(stored.utc_stop_time, "");
        assert_eq!(stored.working_timezone, "");
    }

    #[test]
    fn malformed_record_is_reported_without_failing_pass() {
        let fx = fixture();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        assert_eq!(summary.status, RunStatus::Success);
        let bad = report(&summary, "i-bad");
        assert!(!bad.reconciled);
        assert_eq!(bad.action, ActionDecision::None);
        assert!(bad.error.as_deref().unwrap().contains("utc_start_time"));
        // not rewritten
        assert_eq!(fx.store.get("i-bad").unwrap().unwrap().utc_start_time, "yesterday");
    }

    #[test]
    fn unresolvable_defaults_are_reported_per_instance() {
        let fx = fixture();
        fx.store
            .upsert(&record("i-api", "api-1", "RUNNING", "", ""))
            .unwrap();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        assert_eq!(summary.status, RunStatus::Success);
        let api = report(&summary, "i-api");
        assert_eq!(api.outcome, Some(TagParseOutcome::TagUndefined));
        assert!(api.error.is_some());
        assert!(!api.reconciled);
    }

    #[test]
    fn defaults_schedule_untagged_instance() {
        let fx = fixture();
        fx.store
            .upsert(&record("i-api", "api-1", "RUNNING", "", "2024-05-15T08:00:00Z"))
            .unwrap();
        let mut cfg = SchedulerConfig::default();
        cfg.defaults = ScheduleDefaults {
            timezone: Some("UTC".to_string()),
            weekdays: Some("1234567".to_string()),
            start: Some("NA".to_string()),
            stop: Some("08".to_string()),
        };
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        let api = report(&summary, "i-api");
        assert_eq!(api.outcome, Some(TagParseOutcome::TagUndefined));
        assert_eq!(api.action, ActionDecision::Stop);
        assert_eq!(summary.instance_stopped.count, 1);
        assert_eq!(fx.store.get("i-api").unwrap().unwrap().lifecycle_state, "STOPPED");
    }

    #[test]
    fn unknown_instance_fails_the_pass() {
        let fx = fixture();
        fx.store
            .upsert(&record("i-ghost", "ghost", "RUNNING", "", ""))
            .unwrap();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        assert_eq!(summary.status, RunStatus::Failure);
        // the rest of the pass still ran
        assert_eq!(summary.instance_started.count, 1);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let fx = fixture();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &fx.directory, &fx.store)
            .dry_run(true)
            .run_pass(now());

        assert!(summary.dry_run);
        assert_eq!(summary.instance_started.count, 1);
        let reopened = InventoryDirectory::open(&fx.root).unwrap();
        assert_eq!(
            reopened.describe("i-web").unwrap().lifecycle_state,
            LifecycleState::Stopped
        );
        assert_eq!(fx.store.get("i-web").unwrap().unwrap().utc_start_time, "");
    }

    #[test]
    fn disabled_scheduler_does_nothing() {
        let fx = fixture();
        let mut cfg = SchedulerConfig::default();
        cfg.scheduler.activate_auto_start_stop = false;
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());

        assert_eq!(summary.message, DISABLED_MESSAGE);
        assert_eq!(summary.instance_processed.count, 0);
        assert!(summary.window.is_none());
    }

    #[test]
    fn second_pass_is_idle() {
        let fx = fixture();
        let cfg = SchedulerConfig::default();
        Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());
        let summary = Processor::new(&cfg, &fx.directory, &fx.store).run_pass(now());
        assert_eq!(summary.instance_started.count, 0);
        assert_eq!(report(&summary, "i-web").reason, Some(DecisionReason::BlockedByState));
    }

    struct RefusingDirectory;

    impl ResourceDirectory for RefusingDirectory {
        fn describe(&self, id: &str) -> Result<ResourceSnapshot> {
            Ok(ResourceSnapshot {
                id: id.to_string(),
                name: id.to_string(),
                lifecycle_state: LifecycleState::Stopped,
                freeform_tags: [("Schedule".to_string(), "08To18|12345|UTC".to_string())]
                    .into_iter()
                    .collect(),
                defined_tags: Default::default(),
            })
        }

        fn apply(&self, _id: &str, _action: ActionDecision) -> Result<()> {
            Err(SchedError::Directory("start rejected".to_string()))
        }
    }

    #[test]
    fn failed_action_fails_pass_and_keeps_observed_state() {
        let dir = TempDir::new().unwrap();
        let store = RedbScheduleStore::open(&dir.path().join("s.redb"), "t").unwrap();
        store.upsert(&record("i-web", "web-1", "STOPPED", "", "")).unwrap();
        let cfg = SchedulerConfig::default();
        let summary = Processor::new(&cfg, &RefusingDirectory, &store).run_pass(now());

        assert_eq!(summary.status, RunStatus::Failure);
        assert_eq!(summary.instance_started.count, 0);
        assert_eq!(report(&summary, "i-web").error.as_deref(), Some("resource directory error: start rejected"));
        assert_eq!(store.get("i-web").unwrap().unwrap().lifecycle_state, "STOPPED");
    }
}
