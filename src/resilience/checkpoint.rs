//! Progress milestones and checkpoint snapshots per job.
//!
//! The weighted-milestone percentage formula and the count/age-bounded
//! snapshot ring follow `crawl_engine::progress::ProgressReporter`'s
//! lifecycle-callback shape, generalized from single-crawl progress to
//! milestone tracking; the snapshot ring uses the same retention shape
//! as [`crate::snapshot::SnapshotStore`], applied here to small
//! in-memory job-state snapshots instead of files.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::events::{EngineEvent, EventBus};
use crate::resilience::errors::{ResilienceError, ResilienceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMilestone {
    pub id: String,
    pub name: String,
    pub target_value: f64,
    pub current_value: f64,
    pub weight: f64,
    pub completed: bool,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: HashMap<String, String>,
}

impl ProgressMilestone {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, target_value: f64, weight: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            target_value,
            current_value: 0.0,
            weight,
            completed: false,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    fn percent(&self) -> f64 {
        if self.target_value <= 0.0 {
            return if self.completed { 100.0 } else { 0.0 };
        }
        (self.current_value / self.target_value * 100.0).clamp(0.0, 100.0)
    }
}

/// A point-in-time snapshot of a job's progress, kept in a bounded ring
/// per job for inspection or resume purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub overall_percent: f64,
    pub milestones: Vec<ProgressMilestone>,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

struct JobTracker {
    state: JobState,
    milestones: Vec<ProgressMilestone>,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    paused_total: Duration,
    paused_since: Option<Instant>,
    snapshots: Vec<(Instant, CheckpointSnapshot)>,
}

impl JobTracker {
    fn new() -> Self {
        Self {
            state: JobState::NotStarted,
            milestones: Vec::new(),
            started_at: None,
            ended_at: None,
            paused_total: Duration::ZERO,
            paused_since: None,
            snapshots: Vec::new(),
        }
    }

    fn overall_percent(&self) -> f64 {
        let total_weight: f64 = self.milestones.iter().map(|m| m.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self.milestones.iter().map(|m| m.percent() * m.weight).sum();
        (weighted / total_weight).clamp(0.0, 100.0)
    }

    fn elapsed(&self) -> Duration {
        let Some(started) = self.started_at else { return Duration::ZERO };
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(started).saturating_sub(self.paused_total)
    }
}

/// Tracks weighted progress milestones and retains a bounded, age-limited
/// history of checkpoint snapshots per job.
pub struct CheckpointTracker {
    jobs: DashMap<String, RwLock<JobTracker>>,
    snapshot_retention: usize,
    snapshot_max_age: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl CheckpointTracker {
    #[must_use]
    pub fn new(snapshot_retention: usize, snapshot_max_age: Duration, event_bus: Option<Arc<EventBus>>) -> Self {
        Self {
            jobs: DashMap::new(),
            snapshot_retention,
            snapshot_max_age,
            event_bus,
        }
    }

    pub fn start_job(&self, job_id: &str, milestones: Vec<ProgressMilestone>) {
        let mut tracker = JobTracker::new();
        tracker.state = JobState::InProgress;
        tracker.started_at = Some(Instant::now());
        tracker.milestones = milestones;
        self.jobs.insert(job_id.to_string(), RwLock::new(tracker));
    }

    pub fn pause_job(&self, job_id: &str) -> ResilienceResult<()> {
        let entry = self.job(job_id)?;
        let mut tracker = entry.write();
        if tracker.state == JobState::InProgress {
            tracker.state = JobState::Paused;
            tracker.paused_since = Some(Instant::now());
        }
        Ok(())
    }

    pub fn resume_job(&self, job_id: &str) -> ResilienceResult<()> {
        let entry = self.job(job_id)?;
        let mut tracker = entry.write();
        if tracker.state == JobState::Paused {
            if let Some(since) = tracker.paused_since.take() {
                tracker.paused_total += since.elapsed();
            }
            tracker.state = JobState::InProgress;
        }
        Ok(())
    }

    /// Updates a milestone's current value, marking it completed once it
    /// reaches its target, and publishes a checkpoint event with the job's
    /// new overall percentage.
    pub async fn update_milestone(&self, job_id: &str, milestone_id: &str, current_value: f64) -> ResilienceResult<f64> {
        let entry = self.job(job_id)?;
        let (overall, milestone_name) = {
            let mut tracker = entry.write();
            let milestone = tracker
                .milestones
                .iter_mut()
                .find(|m| m.id == milestone_id)
                .ok_or_else(|| ResilienceError::Checkpoint(format!("unknown milestone {milestone_id}")))?;
            milestone.current_value = current_value;
            if !milestone.completed && milestone.percent() >= 100.0 {
                milestone.completed = true;
                milestone.completed_at = Some(chrono::Utc::now());
            }
            let name = milestone.name.clone();
            (tracker.overall_percent(), name)
        };

        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(EngineEvent::checkpoint(job_id, milestone_name, overall as f32)).await;
        }

        self.take_snapshot(job_id)?;
        Ok(overall)
    }

    fn take_snapshot(&self, job_id: &str) -> ResilienceResult<()> {
        let entry = self.job(job_id)?;
        let mut tracker = entry.write();
        let snapshot = CheckpointSnapshot {
            job_id: job_id.to_string(),
            state: tracker.state,
            overall_percent: tracker.overall_percent(),
            milestones: tracker.milestones.clone(),
            taken_at: chrono::Utc::now(),
        };
        tracker.snapshots.push((Instant::now(), snapshot));

        let max_age = self.snapshot_max_age;
        tracker.snapshots.retain(|(taken, _)| taken.elapsed() <= max_age);

        let retention = self.snapshot_retention;
        let len = tracker.snapshots.len();
        if len > retention {
            tracker.snapshots.drain(0..len - retention);
        }
        Ok(())
    }

    pub fn finish_job(&self, job_id: &str, state: JobState) -> ResilienceResult<()> {
        if !state.is_terminal() {
            return Err(ResilienceError::Checkpoint(format!("{} is not a terminal state", state.as_str())));
        }
        let entry = self.job(job_id)?;
        let mut tracker = entry.write();
        tracker.state = state;
        tracker.ended_at = Some(Instant::now());
        Ok(())
    }

    #[must_use]
    pub fn overall_percent(&self, job_id: &str) -> Option<f64> {
        self.jobs.get(job_id).map(|e| e.read().overall_percent())
    }

    #[must_use]
    pub fn elapsed(&self, job_id: &str) -> Option<Duration> {
        self.jobs.get(job_id).map(|e| e.read().elapsed())
    }

    #[must_use]
    pub fn state(&self, job_id: &str) -> Option<JobState> {
        self.jobs.get(job_id).map(|e| e.read().state)
    }

    #[must_use]
    pub fn latest_snapshot(&self, job_id: &str) -> Option<CheckpointSnapshot> {
        self.jobs.get(job_id).and_then(|e| e.read().snapshots.last().map(|(_, s)| s.clone()))
    }

    #[must_use]
    pub fn snapshot_count(&self, job_id: &str) -> usize {
        self.jobs.get(job_id).map(|e| e.read().snapshots.len()).unwrap_or(0)
    }

    fn job(&self, job_id: &str) -> ResilienceResult<dashmap::mapref::one::Ref<'_, String, RwLock<JobTracker>>> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| ResilienceError::Checkpoint(format!("no tracked job {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestones() -> Vec<ProgressMilestone> {
        vec![
            ProgressMilestone::new("fetch", "fetch pages", 100.0, 1.0),
            ProgressMilestone::new("parse", "parse pages", 100.0, 2.0),
        ]
    }

    #[tokio::test]
    async fn overall_percent_is_weighted_average() {
        let tracker = CheckpointTracker::new(5, Duration::from_secs(3600), None);
        tracker.start_job("job1", milestones());
        tracker.update_milestone("job1", "fetch", 100.0).await.unwrap();
        tracker.update_milestone("job1", "parse", 50.0).await.unwrap();
        let overall = tracker.overall_percent("job1").unwrap();
        // (100*1 + 50*2) / 3 = 66.67
        assert!((overall - 66.666_666_6).abs() < 0.01);
    }

    #[tokio::test]
    async fn milestone_reaching_target_is_marked_completed() {
        let tracker = CheckpointTracker::new(5, Duration::from_secs(3600), None);
        tracker.start_job("job1", milestones());
        tracker.update_milestone("job1", "fetch", 100.0).await.unwrap();
        let snapshot = tracker.latest_snapshot("job1").unwrap();
        assert!(snapshot.milestones.iter().find(|m| m.id == "fetch").unwrap().completed);
    }

    #[tokio::test]
    async fn snapshot_ring_bounded_by_retention() {
        let tracker = CheckpointTracker::new(2, Duration::from_secs(3600), None);
        tracker.start_job("job1", milestones());
        for v in [10.0, 20.0, 30.0, 40.0] {
            tracker.update_milestone("job1", "fetch", v).await.unwrap();
        }
        assert_eq!(tracker.snapshot_count("job1"), 2);
    }

    #[tokio::test]
    async fn pausing_excludes_paused_time_from_elapsed() {
        let tracker = CheckpointTracker::new(5, Duration::from_secs(3600), None);
        tracker.start_job("job1", milestones());
        tracker.pause_job("job1").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        tracker.resume_job("job1").unwrap();
        assert!(tracker.elapsed("job1").unwrap() < Duration::from_millis(5));
    }

    #[test]
    fn finishing_with_non_terminal_state_is_rejected() {
        let tracker = CheckpointTracker::new(5, Duration::from_secs(3600), None);
        tracker.start_job("job1", milestones());
        assert!(tracker.finish_job("job1", JobState::InProgress).is_err());
        assert!(tracker.finish_job("job1", JobState::Completed).is_ok());
    }
}
