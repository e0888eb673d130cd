//! CPH server lifecycle
//!
//! Servers are prepaid: creation places an order, and deletion goes through
//! an unsubscribe request on the billing service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratus_core::extract::{self, ExtractError};
use stratus_core::{
    BoxError, CancellationToken, Observation, PollConfig, ProviderError, ProviderResult,
    ResourceId, StatusLabels,
};

use crate::bss::OrderController;
use crate::client::{ClientError, RequestOpts, ServiceClient};
use crate::waiter;

const CREATE_SERVER_URL: &str = "v2/{project_id}/cloud-phone/servers";
const SERVER_URL: &str = "v1/{project_id}/cloud-phone/servers/{server_id}";

/// Server status once its resources are released
pub const STATUS_DELETED: &str = "6";

/// Statuses a new server may settle in
const CREATE_TARGET: &[&str] = &["5", "8", "10"];
/// Creation failed
const CREATE_FAILURE: &[&str] = &["2"];

/// Poll settings for server waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CphServerWaits {
    pub create: PollConfig,
    pub delete: PollConfig,
}

impl Default for CphServerWaits {
    fn default() -> Self {
        Self {
            create: PollConfig::new(Duration::from_secs(90 * 60))
                .with_interval(Duration::from_secs(10))
                .with_initial_delay(Duration::from_secs(120)),
            delete: PollConfig::new(Duration::from_secs(30 * 60))
                .with_interval(Duration::from_secs(10))
                .with_initial_delay(Duration::from_secs(10)),
        }
    }
}

impl CphServerWaits {
    /// Override the timeout of every wait
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.create = self.create.with_timeout(timeout);
        self.delete = self.delete.with_timeout(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nic {
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIp {
    /// EIP type, e.g. "5_bgp"
    #[serde(rename = "type")]
    pub eip_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandWidth {
    pub band_width_share_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_width_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_width_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_width_charge_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPort {
    pub name: String,
    pub listen_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_accessible: Option<String>,
}

/// Billing parameters of a prepaid server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendParam {
    pub charging_mode: i32,
    pub is_auto_pay: i32,
    /// 2 for months, 3 for years
    pub period_type: i32,
    pub period_num: u32,
    pub is_auto_renew: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
}

impl Default for ExtendParam {
    fn default() -> Self {
        Self {
            charging_mode: 0,
            is_auto_pay: 1,
            period_type: 2,
            period_num: 1,
            is_auto_renew: 0,
            enterprise_project_id: None,
        }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateServerRequest {
    pub server_name: String,
    pub server_model_name: String,
    pub phone_model_name: String,
    pub image_id: String,
    #[serde(default = "one")]
    pub count: u32,
    pub tenant_vpc_id: String,
    pub nics: Vec<Nic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_width: Option<BandWidth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ApplicationPort>,
    #[serde(default)]
    pub extend_param: ExtendParam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAddress {
    #[serde(default)]
    pub server_ip: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub server_id: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub server_model_name: Option<String>,
    #[serde(default)]
    pub phone_model_name: Option<String>,
    #[serde(default)]
    pub keypair_name: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub enterprise_project_id: Option<String>,
    pub status: i64,
    #[serde(default)]
    pub addresses: Vec<ServerAddress>,
    #[serde(default)]
    pub security_groups: Vec<Value>,
    #[serde(default)]
    pub metadata: ServerMetadata,
}

/// Handles returned by the create call
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedServer {
    pub server_id: String,
    pub order_id: String,
}

fn server_id(id: &str) -> ResourceId {
    ResourceId::new("cph_server", id)
}

fn create_labels() -> StatusLabels {
    StatusLabels::new(CREATE_TARGET.iter().copied()).with_failure(CREATE_FAILURE.iter().copied())
}

/// CPH server operations
#[derive(Debug, Clone)]
pub struct CphServerController {
    client: ServiceClient,
    orders: OrderController,
    waits: CphServerWaits,
    cancel: Option<CancellationToken>,
}

impl CphServerController {
    pub fn new(client: ServiceClient, orders: OrderController, waits: CphServerWaits) -> Self {
        Self {
            client,
            orders,
            waits,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.orders = self.orders.with_cancellation(token.clone());
        self.cancel = Some(token);
        self
    }

    /// Create a server and wait until both the server and its order are done
    pub async fn create(&self, request: &CreateServerRequest) -> ProviderResult<Server> {
        let requested = ResourceId::new("cph_server", request.server_name.as_str());
        let created = self.submit_create(request).await.map_err(|e| {
            ProviderError::new("error creating CPH server")
                .for_resource(requested)
                .with_boxed_cause(e)
        })?;
        let id = created.server_id.as_str();
        log::info!("CPH server {} submitted, order {}", id, created.order_id);

        self.wait_created(id).await?;
        self.orders.wait_complete(&created.order_id).await.map_err(|e| {
            ProviderError::new(format!(
                "error waiting for the create of CPH server ({}) to complete",
                id
            ))
            .for_resource(server_id(id))
            .with_cause(e)
        })?;

        self.read(id).await?.ok_or_else(|| {
            ProviderError::new("CPH server disappeared after creation").for_resource(server_id(id))
        })
    }

    async fn submit_create(&self, request: &CreateServerRequest) -> Result<CreatedServer, BoxError> {
        let path = self.client.url_path(CREATE_SERVER_URL, &[]);
        let opts = RequestOpts::new().with_ok_codes(&[200]).with_json(request)?;
        let body = self.client.post(&path, opts).await?;
        Ok(CreatedServer {
            server_id: extract::require_str(&body, "server_ids[0]")?.to_string(),
            order_id: extract::require_str(&body, "order_id")?.to_string(),
        })
    }

    /// Wait for a freshly created server to leave its transitional statuses
    pub async fn wait_created(&self, id: &str) -> ProviderResult<Value> {
        let labels = create_labels();
        let poller = waiter(format!("CPH server ({})", id), self.waits.create, &self.cancel);
        poller
            .wait_for_state(&labels, || async move {
                let body = self.fetch(id).await?;
                let status = status_of(&body)?;
                Ok::<_, BoxError>((body, status))
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "error waiting for the create of CPH server ({}) to complete",
                    id
                ))
                .for_resource(server_id(id))
                .with_cause(e)
            })
    }

    /// Fetch a server; `None` once it is gone or released
    pub async fn read(&self, id: &str) -> ProviderResult<Option<Server>> {
        let wrap = |e: BoxError| {
            ProviderError::new("error retrieving CPH server")
                .for_resource(server_id(id))
                .with_boxed_cause(e)
        };
        let body = match self.fetch(id).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(wrap(e.into())),
        };
        if status_of(&body).map_err(|e| wrap(e.into()))? == STATUS_DELETED {
            log::debug!("CPH server {} is released", id);
            return Ok(None);
        }
        extract::decode(body).map(Some).map_err(|e| wrap(e.into()))
    }

    pub async fn rename(&self, id: &str, name: &str) -> ProviderResult<()> {
        let path = self.client.url_path(SERVER_URL, &[("server_id", id)]);
        let opts = RequestOpts::new()
            .with_ok_codes(&[200])
            .with_body(serde_json::json!({ "server_name": name }));
        self.client.put(&path, opts).await.map(|_| ()).map_err(|e| {
            ProviderError::new("error updating the name of CPH server")
                .for_resource(server_id(id))
                .with_cause(e)
        })
    }

    /// Unsubscribe the server and wait until it is released
    pub async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.orders
            .unsubscribe(&[id.to_string()])
            .await
            .map_err(|e| {
                ProviderError::new("error unsubscribing CPH server")
                    .for_resource(server_id(id))
                    .with_cause(e)
            })?;
        self.wait_deleted(id).await
    }

    pub async fn wait_deleted(&self, id: &str) -> ProviderResult<()> {
        let poller = waiter(format!("CPH server ({})", id), self.waits.delete, &self.cancel);
        poller
            .wait(|| async move {
                let body = match self.fetch(id).await {
                    Ok(body) => body,
                    Err(e) if e.is_not_found() => {
                        return Ok(Observation::completed((), "404"));
                    }
                    Err(e) => return Err(BoxError::from(e)),
                };
                let status = status_of(&body)?;
                Ok(if status == STATUS_DELETED {
                    Observation::completed((), status)
                } else {
                    Observation::pending((), status)
                })
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "error waiting for the delete of CPH server ({}) to complete",
                    id
                ))
                .for_resource(server_id(id))
                .with_cause(e)
            })
    }

    async fn fetch(&self, id: &str) -> Result<Value, ClientError> {
        let path = self.client.url_path(SERVER_URL, &[("server_id", id)]);
        self.client
            .get(&path, RequestOpts::new().with_ok_codes(&[200]))
            .await
    }
}

fn status_of(body: &Value) -> Result<String, ExtractError> {
    extract::search_string(body, "status").ok_or_else(|| ExtractError::Missing("status".to_string()))
}
