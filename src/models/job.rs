use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::webhook::EmployeeData;

/// Status of an onboarding video job in the async queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Failed -> Queued` is only reachable through an explicit retry.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Queued)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A mutation applied to a job record by the store.
///
/// Timestamps are not part of the update; the store assigns them while it
/// holds the record, so `started_at <= completed_at` always holds.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// `queued -> processing`. This is the worker's claim on the job.
    Start,
    /// `processing -> completed`.
    Complete { result_location: String },
    /// `processing -> failed`.
    Fail {
        error_message: String,
        retry_count: i32,
    },
    /// `failed -> queued`, the explicit retry action.
    Requeue,
}

impl JobUpdate {
    pub fn target_status(&self) -> JobStatus {
        match self {
            JobUpdate::Start => JobStatus::Processing,
            JobUpdate::Complete { .. } => JobStatus::Completed,
            JobUpdate::Fail { .. } => JobStatus::Failed,
            JobUpdate::Requeue => JobStatus::Queued,
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("illegal job transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// An onboarding video job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub employee_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_location: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub updated_at: DateTime<Utc>,

    /// Onboarding data kept only while the job may still run.
    #[serde(skip)]
    pub payload: Option<EmployeeData>,
}

impl JobRecord {
    pub fn new(job_id: Uuid, payload: EmployeeData, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            employee_id: payload.employee_id.clone(),
            created_at: now,
            started_at: None,
            completed_at: None,
            result_location: None,
            error_message: None,
            retry_count: 0,
            updated_at: now,
            payload: Some(payload),
        }
    }

    /// Apply `update` at time `now`, enforcing the lifecycle.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), IllegalTransition> {
        let to = update.target_status();
        if !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }

        match update {
            JobUpdate::Start => {
                self.started_at = Some(now);
            }
            JobUpdate::Complete { result_location } => {
                self.completed_at = Some(self.finish_time(now));
                self.result_location = Some(result_location);
                self.payload = None;
            }
            JobUpdate::Fail {
                error_message,
                retry_count,
            } => {
                self.completed_at = Some(self.finish_time(now));
                self.error_message = Some(error_message);
                self.retry_count = retry_count;
            }
            JobUpdate::Requeue => {
                self.started_at = None;
                self.completed_at = None;
                self.error_message = None;
            }
        }

        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    // Clock skew between processes must not produce completed_at < started_at.
    fn finish_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.started_at {
            Some(started) if started > now => started,
            _ => now,
        }
    }
}
