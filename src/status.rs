//! Shared job status, safe to poll from another thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Ready,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: Uuid,
    pub state: JobState,
    pub message: String,
    /// Overall progress, 0-100
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Cloneable handle; all clones see the same status.
#[derive(Debug, Clone)]
pub struct JobStatus {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl JobStatus {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusSnapshot {
                id: Uuid::new_v4(),
                state: JobState::Ready,
                message: message.into(),
                progress: 0.0,
                error: None,
                updated_at: Utc::now(),
            })),
        }
    }

    // A poisoned lock still holds a usable snapshot.
    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    pub fn set_progress(&self, progress: f64) {
        let mut status = self.lock();
        if !progress.is_nan() {
            status.progress = progress.clamp(0.0, 100.0);
        }
        status.updated_at = Utc::now();
    }

    pub fn set_message<S: Into<String>>(&self, message: S) {
        let mut status = self.lock();
        status.message = message.into();
        status.updated_at = Utc::now();
    }

    /// Run `job`, tracking its progress and outcome.
    pub fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut dyn FnMut(f64)) -> Result<T>,
    {
        {
            let mut status = self.lock();
            status.state = JobState::Running;
            status.updated_at = Utc::now();
        }
        debug!("Job {} started", self.lock().id);

        let result = job(&mut |p: f64| self.set_progress(p));

        let mut status = self.lock();
        match &result {
            Ok(_) => {
                status.state = JobState::Completed;
                status.progress = 100.0;
            }
            Err(e) => {
                error!("Job {} failed: {}", status.id, e);
                status.state = JobState::Failed;
                status.error = Some(e.to_string());
            }
        }
        status.updated_at = Utc::now();
        result
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvError;

    #[test]
    fn test_successful_job() {
        let status = JobStatus::new("converting");
        assert_eq!(status.snapshot().state, JobState::Ready);

        let observer = status.clone();
        let value = status
            .run(|progress| {
                progress(40.0);
                assert_eq!(observer.snapshot().progress, 40.0);
                assert_eq!(observer.snapshot().state, JobState::Running);
                Ok(7)
            })
            .unwrap();

        assert_eq!(value, 7);
        let snapshot = status.snapshot();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.progress, 100.0);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_failed_job_records_error() {
        let status = JobStatus::new("merging");
        let result: Result<()> = status.run(|progress| {
            progress(150.0);
            Err(ConvError::NoInputFiles)
        });

        assert!(result.is_err());
        let snapshot = status.snapshot();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.progress, 100.0);
        assert_eq!(snapshot.error.as_deref(), Some("No input files provided"));
    }

    #[test]
    fn test_json_shape() {
        let status = JobStatus::new("hashing");
        let json: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["message"], "hashing");
        assert!(json.get("error").is_none());
        assert!(Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
    }
}
