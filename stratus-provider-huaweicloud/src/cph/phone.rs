//! Batch actions on cloud phones
//!
//! A batch call answers with one job per phone. Phones the service refused
//! are reported back without failing the call; accepted jobs are waited on
//! concurrently.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use stratus_core::extract;
use stratus_core::{
    BoxError, CancellationToken, Observation, PollConfig, PollError, ProviderError, ProviderResult,
    ResourceId,
};

use crate::client::{RequestOpts, ServiceClient};
use crate::waiter;

const JOB_URL: &str = "v1/{project_id}/cloud-phone/jobs/{job_id}";

pub const JOB_STATUS_SUCCESS: i64 = 2;
pub const JOB_STATUS_FAILED: i64 = -1;

/// Batch action on phones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneAction {
    Restart,
    Stop,
    Reset,
}

impl PhoneAction {
    fn url(self) -> &'static str {
        match self {
            PhoneAction::Restart => "v1/{project_id}/cloud-phone/phones/batch-restart",
            PhoneAction::Stop => "v1/{project_id}/cloud-phone/phones/batch-stop",
            PhoneAction::Reset => "v1/{project_id}/cloud-phone/phones/batch-reset",
        }
    }

    fn body(self, phone_ids: &[String]) -> serde_json::Value {
        match self {
            PhoneAction::Stop => serde_json::json!({ "phone_ids": phone_ids }),
            PhoneAction::Restart | PhoneAction::Reset => {
                let phones: Vec<_> = phone_ids
                    .iter()
                    .map(|id| serde_json::json!({ "phone_id": id }))
                    .collect();
                serde_json::json!({ "phones": phones })
            }
        }
    }
}

impl std::fmt::Display for PhoneAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhoneAction::Restart => write!(f, "restart"),
            PhoneAction::Stop => write!(f, "stop"),
            PhoneAction::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhoneWaits {
    pub job: PollConfig,
}

impl Default for PhoneWaits {
    fn default() -> Self {
        Self {
            job: PollConfig::new(Duration::from_secs(20 * 60))
                .with_interval(Duration::from_secs(10))
                .with_initial_delay(Duration::from_secs(10)),
        }
    }
}

/// One entry of a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneJob {
    pub phone_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl PhoneJob {
    fn describe_error(&self) -> String {
        format!(
            "{}: {}",
            self.error_code.as_deref().unwrap_or("unknown error"),
            self.error_msg.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    jobs: Vec<PhoneJob>,
}

#[derive(Debug, Clone, Deserialize)]
struct JobStatus {
    status: i64,
    #[serde(default)]
    phone_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

/// Accepted job that did not finish successfully
#[derive(Debug, Clone, PartialEq)]
pub struct FailedJob {
    pub phone_id: String,
    pub job_id: String,
    pub error: String,
}

/// What happened to each phone of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Phones whose job finished successfully
    pub completed: Vec<String>,
    /// Entries the service refused up front
    pub rejected: Vec<PhoneJob>,
    /// Accepted jobs that failed or timed out
    pub failed: Vec<FailedJob>,
}

fn phone_id(id: &str) -> ResourceId {
    ResourceId::new("cph_phone", id)
}

#[derive(Debug, Clone)]
pub struct CphPhoneController {
    client: ServiceClient,
    waits: PhoneWaits,
    cancel: Option<CancellationToken>,
}

impl CphPhoneController {
    pub fn new(client: ServiceClient, waits: PhoneWaits) -> Self {
        Self {
            client,
            waits,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn restart(&self, phone_ids: &[String]) -> ProviderResult<BatchReport> {
        self.run(PhoneAction::Restart, phone_ids).await
    }

    pub async fn stop(&self, phone_ids: &[String]) -> ProviderResult<BatchReport> {
        self.run(PhoneAction::Stop, phone_ids).await
    }

    pub async fn reset(&self, phone_ids: &[String]) -> ProviderResult<BatchReport> {
        self.run(PhoneAction::Reset, phone_ids).await
    }

    /// Submit `action` for `phone_ids` and wait for every accepted job.
    ///
    /// Rejected entries and failed jobs are recorded in the report. Only a
    /// failed submission or a cancelled wait is returned as an error.
    pub async fn run(&self, action: PhoneAction, phone_ids: &[String]) -> ProviderResult<BatchReport> {
        let jobs = self.submit(action, phone_ids).await.map_err(|e| {
            ProviderError::new(format!(
                "error submitting {} for phones ({})",
                action,
                phone_ids.join(",")
            ))
            .with_boxed_cause(e)
        })?;

        let mut report = BatchReport::default();
        let mut accepted = Vec::new();
        for job in jobs {
            match job.job_id.clone() {
                Some(job_id) if job.error_code.is_none() => accepted.push((job.phone_id, job_id)),
                _ => {
                    log::warn!(
                        "Phone {} rejected {}: {}",
                        job.phone_id,
                        action,
                        job.describe_error()
                    );
                    report.rejected.push(job);
                }
            }
        }

        let results = join_all(
            accepted
                .iter()
                .map(|(phone, job_id)| self.wait_job(action, phone, job_id)),
        )
        .await;

        let mut cancelled = None;
        for ((phone_id, job_id), result) in accepted.into_iter().zip(results) {
            match result {
                Ok(()) => report.completed.push(phone_id),
                Err(e) if e.cause_as::<PollError>().is_some_and(|p| p.is_cancelled()) => {
                    cancelled.get_or_insert(e);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed.push(FailedJob {
                        phone_id,
                        job_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        match cancelled {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn submit(&self, action: PhoneAction, phone_ids: &[String]) -> Result<Vec<PhoneJob>, BoxError> {
        let path = self.client.url_path(action.url(), &[]);
        let body = self
            .client
            .post(&path, RequestOpts::new().with_body(action.body(phone_ids)))
            .await?;
        let response: BatchResponse = extract::decode(body)?;
        Ok(response.jobs)
    }

    /// Wait for one phone job to finish
    pub async fn wait_job(&self, action: PhoneAction, phone: &str, job_id: &str) -> ProviderResult<()> {
        let poller = waiter(
            format!("{} job ({}) of phone {}", action, job_id, phone),
            self.waits.job,
            &self.cancel,
        );
        poller
            .wait(|| async move {
                let path = self.client.url_path(JOB_URL, &[("job_id", job_id)]);
                let body = self.client.get(&path, RequestOpts::new()).await?;
                let job: JobStatus = extract::decode(body)?;
                let state = job.status.to_string();
                Ok::<_, BoxError>(match job.status {
                    JOB_STATUS_SUCCESS => Observation::completed((), state),
                    JOB_STATUS_FAILED => Observation::failed(
                        (),
                        state,
                        format!(
                            "phone {} error code {}",
                            job.phone_id.as_deref().unwrap_or(phone),
                            job.error_code.as_deref().unwrap_or("unknown")
                        ),
                    ),
                    _ => Observation::pending((), state),
                })
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!("error waiting for {} of phone to complete", action))
                    .for_resource(phone_id(phone))
                    .with_cause(e)
            })
    }
}
