//! Cloud Application Engine (CAE) components
//!
//! Every call is scoped by an environment (sent as the `X-Environment-Id`
//! header) and an application (part of the URL). Deployments run as jobs.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratus_core::extract::{self, ExtractError};
use stratus_core::{
    Attempt, BoxError, CancellationToken, Observation, PollConfig, ProviderError, ProviderResult,
    ResourceId, StatusLabels, retry_with_wait,
};

use crate::client::{ClientError, RequestOpts, ServiceClient};
use crate::waiter;

const COMPONENTS_URL: &str = "v1/{project_id}/cae/applications/{application_id}/components";
const CREATE_AND_DEPLOY_URL: &str =
    "v1/{project_id}/cae/applications/{application_id}/component-with-configurations";
const COMPONENT_URL: &str =
    "v1/{project_id}/cae/applications/{application_id}/components/{component_id}";
const ACTION_URL: &str =
    "v1/{project_id}/cae/applications/{application_id}/components/{component_id}/action";
const JOB_URL: &str = "v1/{project_id}/cae/jobs/{job_id}";

pub const HEADER_ENVIRONMENT_ID: &str = "X-Environment-Id";

/// Error codes CAE answers with (on 400 or 500) for a missing component
pub const COMPONENT_NOT_FOUND_CODES: &[&str] = &["CAE.01500208", "CAE.01500404", "CAE.01500000"];

pub const JOB_SUCCESS: &str = "success";
const JOB_FAILURE: &[&str] = &["failed", "timeout"];

/// Component states in which CAE rejects a new action
const BUSY_STATES: &[&str] = &[
    "deploying",
    "upgrading",
    "rollbacking",
    "configuring",
    "scaling",
    "starting",
    "stopping",
    "restarting",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaeWaits {
    pub job: PollConfig,
    pub delete: PollConfig,
}

impl Default for CaeWaits {
    fn default() -> Self {
        Self {
            job: PollConfig::new(Duration::from_secs(10 * 60))
                .with_interval(Duration::from_secs(30))
                .with_initial_delay(Duration::from_secs(20)),
            delete: PollConfig::new(Duration::from_secs(10 * 60))
                .with_interval(Duration::from_secs(20))
                .with_initial_delay(Duration::from_secs(10)),
        }
    }
}

impl CaeWaits {
    /// Override the timeout of every wait
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job = self.job.with_timeout(timeout);
        self.delete = self.delete.with_timeout(timeout);
        self
    }
}

/// Environment and application a component lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentScope {
    pub environment_id: String,
    pub application_id: String,
}

impl ComponentScope {
    pub fn new(environment_id: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            application_id: application_id.into(),
        }
    }

    fn opts(&self) -> RequestOpts {
        RequestOpts::new().with_header(HEADER_ENVIRONMENT_ID, self.environment_id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSource {
    pub auth_name: String,
    pub branch: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimit {
    pub cpu_limit: String,
    pub memory_limit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub artifact_namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub archive: Archive,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub replica: u32,
    pub runtime: String,
    pub source: Source,
    pub resource_limit: ResourceLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
}

/// Configuration item applied on create-and-deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(rename = "type")]
    pub config_type: String,
    pub data: Value,
}

fn api_version() -> String {
    "v1".to_string()
}

fn component_kind() -> String {
    "Component".to_string()
}

/// Body of create and update calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRequest {
    #[serde(default = "api_version")]
    pub api_version: String,
    #[serde(default = "component_kind")]
    pub kind: String,
    pub metadata: ComponentMetadata,
    pub spec: ComponentSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<Configuration>,
}

impl ComponentRequest {
    pub fn new(metadata: ComponentMetadata, spec: ComponentSpec) -> Self {
        Self {
            api_version: api_version(),
            kind: component_kind(),
            metadata,
            spec,
            configurations: Vec::new(),
        }
    }
}

/// Deploy-type action on an existing component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    Deploy,
    Upgrade,
}

impl ComponentAction {
    fn name(self) -> &'static str {
        match self {
            ComponentAction::Deploy => "deploy",
            ComponentAction::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Component as returned by the read call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub metadata: ComponentInfo,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub status: Value,
}

fn component_id(id: &str) -> ResourceId {
    ResourceId::new("cae_component", id)
}

fn job_labels(target: &[&str]) -> StatusLabels {
    StatusLabels::new(target.iter().copied()).with_failure(JOB_FAILURE.iter().copied())
}

#[derive(Debug, Clone)]
pub struct CaeComponentController {
    client: ServiceClient,
    waits: CaeWaits,
    cancel: Option<CancellationToken>,
}

impl CaeComponentController {
    pub fn new(client: ServiceClient, waits: CaeWaits) -> Self {
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

    fn path(&self, template: &str, scope: &ComponentScope, id: &str) -> String {
        self.client.url_path(
            template,
            &[
                ("application_id", scope.application_id.as_str()),
                ("component_id", id),
            ],
        )
    }

    /// Create a component without deploying it; returns its ID
    pub async fn create(&self, scope: &ComponentScope, request: &ComponentRequest) -> ProviderResult<String> {
        let path = self.path(COMPONENTS_URL, scope, "");
        self.submit(&path, scope, request)
            .await
            .map(|(id, _)| id)
            .map_err(|e| {
                ProviderError::new(format!(
                    "error creating CAE component under specified application ({})",
                    scope.application_id
                ))
                .for_resource(component_id(&request.metadata.name))
                .with_boxed_cause(e)
            })
    }

    /// Create a component with its configurations and wait for the deployment job
    pub async fn create_and_deploy(
        &self,
        scope: &ComponentScope,
        request: &ComponentRequest,
    ) -> ProviderResult<String> {
        let path = self.path(CREATE_AND_DEPLOY_URL, scope, "");
        let (id, body) = self.submit(&path, scope, request).await.map_err(|e| {
            ProviderError::new(format!(
                "error creating and deploying CAE component under specified application ({})",
                scope.application_id
            ))
            .for_resource(component_id(&request.metadata.name))
            .with_boxed_cause(e)
        })?;

        let job_id = extract::require_str(&body, "status.job_id").map_err(|e| {
            ProviderError::new("error creating and deploying CAE component")
                .for_resource(component_id(&id))
                .with_cause(e)
        })?;
        self.wait_job(scope, job_id, &[JOB_SUCCESS])
            .await
            .map_err(|e| e.for_resource(component_id(&id)))?;
        Ok(id)
    }

    async fn submit(
        &self,
        path: &str,
        scope: &ComponentScope,
        request: &ComponentRequest,
    ) -> Result<(String, Value), BoxError> {
        let body = self
            .client
            .post(path, scope.opts().with_json(request)?)
            .await?;
        let id = extract::search_string(&body, "metadata.id")
            .filter(|id| !id.is_empty())
            .ok_or("unable to find the CAE component ID from the API response")?;
        log::info!("CAE component {} created", id);
        Ok((id, body))
    }

    /// Fetch a component; `None` if it does not exist
    pub async fn get(&self, scope: &ComponentScope, id: &str) -> ProviderResult<Option<Component>> {
        let wrap = |e: BoxError| {
            ProviderError::new("error retrieving CAE component")
                .for_resource(component_id(id))
                .with_boxed_cause(e)
        };
        match self.fetch(scope, id).await {
            Ok(body) => extract::decode(body).map(Some).map_err(|e| wrap(e.into())),
            Err(e) if e.is_not_found_with(COMPONENT_NOT_FOUND_CODES) => Ok(None),
            Err(e) => Err(wrap(e.into())),
        }
    }

    pub async fn update(
        &self,
        scope: &ComponentScope,
        id: &str,
        request: &ComponentRequest,
    ) -> ProviderResult<()> {
        let path = self.path(COMPONENT_URL, scope, id);
        let result: Result<Value, ClientError> = async {
            let opts = scope.opts().with_json(request)?;
            self.client.put(&path, opts).await
        }
        .await;
        result.map(|_| ()).map_err(|e| {
            ProviderError::new("error updating CAE component")
                .for_resource(component_id(id))
                .with_cause(e)
        })
    }

    /// Run a deploy or upgrade action and wait for its job.
    ///
    /// While another action is still running on the component CAE answers
    /// 409; the call is retried once the component settles.
    pub async fn deploy(
        &self,
        scope: &ComponentScope,
        id: &str,
        action: ComponentAction,
        spec: Option<Value>,
    ) -> ProviderResult<String> {
        let path = self.path(ACTION_URL, scope, id);
        let mut body = serde_json::json!({
            "api_version": "v1",
            "kind": "Action",
            "metadata": { "name": action.name() },
        });
        if let Some(spec) = spec {
            body["spec"] = spec;
        }

        let poller = waiter(
            format!("CAE component ({}) {}", id, action.name()),
            self.waits.job,
            &self.cancel,
        );
        let response = retry_with_wait(
            &poller,
            || {
                let opts = scope.opts().with_body(body.clone());
                let path = path.as_str();
                async move {
                    match self.client.post(path, opts).await {
                        Ok(response) => Ok(Attempt::Done(response)),
                        Err(e) if e.status() == Some(409) => Ok(Attempt::Busy(e.to_string())),
                        Err(e) => Err(e),
                    }
                }
            },
            || async move {
                let body = self.fetch(scope, id).await?;
                let state = extract::search_string_or(&body, "status.status", "unknown");
                Ok::<_, ClientError>(if BUSY_STATES.contains(&state.as_str()) {
                    Observation::pending((), state)
                } else {
                    Observation::completed((), state)
                })
            },
        )
        .await
        .map_err(|e| {
            ProviderError::new(format!("error running {} on CAE component", action.name()))
                .for_resource(component_id(id))
                .with_cause(e)
        })?;

        let job_id = extract::require_str(&response, "job_id").map_err(|e| {
            ProviderError::new(format!("error running {} on CAE component", action.name()))
                .for_resource(component_id(id))
                .with_cause(e)
        })?;
        self.wait_job(scope, job_id, &[JOB_SUCCESS])
            .await
            .map_err(|e| e.for_resource(component_id(id)))?;
        Ok(job_id.to_string())
    }

    /// Delete a component and wait until it is gone. A component that is
    /// already gone counts as deleted.
    pub async fn delete(&self, scope: &ComponentScope, id: &str) -> ProviderResult<()> {
        let path = self.path(COMPONENT_URL, scope, id);
        match self.client.delete(&path, scope.opts()).await {
            Ok(_) => {}
            Err(e) if already_deleted(&e) => {
                log::info!("CAE component {} is already deleted", id);
                return Ok(());
            }
            Err(e) => {
                return Err(ProviderError::new("error deleting CAE component")
                    .for_resource(component_id(id))
                    .with_cause(e));
            }
        }

        let poller = waiter(format!("CAE component ({})", id), self.waits.delete, &self.cancel);
        poller
            .wait(|| async move {
                match self.fetch(scope, id).await {
                    Ok(_) => Ok(Observation::pending((), "PENDING")),
                    Err(e) if e.is_not_found_with(COMPONENT_NOT_FOUND_CODES) => {
                        Ok(Observation::completed((), "DELETED"))
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|e| {
                ProviderError::new("error waiting for deleting component to complete")
                    .for_resource(component_id(id))
                    .with_cause(e)
            })
    }

    /// Wait for a job to reach one of `target` (`spec.status`)
    pub async fn wait_job(&self, scope: &ComponentScope, job_id: &str, target: &[&str]) -> ProviderResult<Value> {
        let labels = job_labels(target);
        let poller = waiter(format!("CAE job ({})", job_id), self.waits.job, &self.cancel);
        poller
            .wait_for_state(&labels, || async move {
                let path = self.client.url_path(JOB_URL, &[("job_id", job_id)]);
                let body = self.client.get(&path, scope.opts()).await?;
                let status = extract::search_string(&body, "spec.status")
                    .ok_or_else(|| ExtractError::Missing("spec.status".to_string()))?;
                Ok::<_, BoxError>((body, status))
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "error waiting for the deploy component job ({}) to complete",
                    job_id
                ))
                .with_cause(e)
            })
    }

    async fn fetch(&self, scope: &ComponentScope, id: &str) -> Result<Value, ClientError> {
        let path = self.path(COMPONENT_URL, scope, id);
        self.client.get(&path, scope.opts()).await
    }
}

/// A DELETE on a missing component answers 404, or 400 with a not-found code
fn already_deleted(e: &ClientError) -> bool {
    e.is_not_found()
        || (e.status() == Some(400)
            && e.error_code()
                .is_some_and(|code| COMPONENT_NOT_FOUND_CODES.contains(&code)))
}
