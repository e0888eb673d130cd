//! Billing orders
//!
//! Subscription resources are created and released through orders. The
//! controllers that create them wait for the order to finish as well.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratus_core::extract;
use stratus_core::{
    BoxError, CancellationToken, Observation, PollConfig, ProviderError, ProviderResult, ResourceId,
};

use crate::client::{RequestOpts, ServiceClient};
use crate::waiter;

const ORDER_DETAIL_URL: &str = "v2/orders/customer-orders/details/{order_id}";
const UNSUBSCRIBE_URL: &str = "v2/orders/subscriptions/resources/unsubscribe";

pub const ORDER_STATUS_CANCELLED: i64 = 4;
pub const ORDER_STATUS_COMPLETED: i64 = 5;

/// Unsubscribe both the resource and the resources bound to it
const UNSUBSCRIBE_TYPE_WITH_BOUND: i32 = 1;

/// Poll settings for order waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderWaits {
    pub complete: PollConfig,
}

impl Default for OrderWaits {
    fn default() -> Self {
        Self {
            complete: PollConfig::new(Duration::from_secs(30 * 60))
                .with_interval(Duration::from_secs(5))
                .with_initial_delay(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OrderInfo {
    pub order_id: String,
    pub status: i64,
    #[serde(default)]
    pub order_type: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrderDetail {
    order_info: OrderInfo,
}

#[derive(Debug, Serialize)]
struct UnsubscribeRequest<'a> {
    resource_ids: &'a [String],
    unsubscribe_type: i32,
}

#[derive(Debug, Deserialize)]
struct UnsubscribeResponse {
    #[serde(default)]
    order_ids: Vec<String>,
}

fn order_id(id: &str) -> ResourceId {
    ResourceId::new("bss_order", id)
}

/// Billing order operations
#[derive(Debug, Clone)]
pub struct OrderController {
    client: ServiceClient,
    waits: OrderWaits,
    cancel: Option<CancellationToken>,
}

impl OrderController {
    pub fn new(client: ServiceClient, waits: OrderWaits) -> Self {
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

    pub async fn get(&self, id: &str) -> ProviderResult<OrderInfo> {
        fetch_order(&self.client, id).await.map_err(|e| {
            ProviderError::new("error retrieving order")
                .for_resource(order_id(id))
                .with_boxed_cause(e)
        })
    }

    /// Wait until the order is processed; a cancelled order is a failure
    pub async fn wait_complete(&self, id: &str) -> ProviderResult<OrderInfo> {
        let poller = waiter(format!("order ({})", id), self.waits.complete, &self.cancel);
        poller
            .wait(|| async move {
                let info = fetch_order(&self.client, id).await?;
                let state = info.status.to_string();
                Ok::<_, BoxError>(match info.status {
                    ORDER_STATUS_COMPLETED => Observation::completed(info, state),
                    ORDER_STATUS_CANCELLED => Observation::failed(
                        info,
                        state,
                        format!("order {} was cancelled", id),
                    ),
                    _ => Observation::pending(info, state),
                })
            })
            .await
            .map_err(|e| {
                ProviderError::new(format!("error waiting for order ({}) to complete", id))
                    .for_resource(order_id(id))
                    .with_cause(e)
            })
    }

    /// Release subscription resources; returns the IDs of the orders created
    pub async fn unsubscribe(&self, resource_ids: &[String]) -> ProviderResult<Vec<String>> {
        let wrap = |e: BoxError| {
            ProviderError::new(format!(
                "error unsubscribing resources ({})",
                resource_ids.join(",")
            ))
            .with_boxed_cause(e)
        };

        let opts = RequestOpts::new()
            .with_json(&UnsubscribeRequest {
                resource_ids,
                unsubscribe_type: UNSUBSCRIBE_TYPE_WITH_BOUND,
            })
            .map_err(|e| wrap(e.into()))?;
        let body = self
            .client
            .post(UNSUBSCRIBE_URL, opts)
            .await
            .map_err(|e| wrap(e.into()))?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let response: UnsubscribeResponse = extract::decode(body).map_err(|e| wrap(e.into()))?;
        Ok(response.order_ids)
    }
}

async fn fetch_order(
    client: &ServiceClient,
    id: &str,
) -> Result<OrderInfo, BoxError> {
    let path = client.url_path(ORDER_DETAIL_URL, &[("order_id", id)]);
    let body = client.get(&path, RequestOpts::new()).await?;
    let detail: OrderDetail = extract::decode(body)?;
    Ok(detail.order_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_config;
    use serde_json::json;
    use stratus_core::PollError;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_waits() -> OrderWaits {
        OrderWaits {
            complete: PollConfig::new(Duration::from_secs(5)).with_interval(Duration::from_millis(10)),
        }
    }

    fn controller(server: &MockServer) -> OrderController {
        let client =
            ServiceClient::new(reqwest::Client::new(), &test_config(server), "bss").unwrap();
        OrderController::new(client, fast_waits())
    }

    fn order(status: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "order_info": {"order_id": "CS001", "status": status, "order_type": 1}
        }))
    }

    #[tokio::test]
    async fn test_wait_complete_polls_until_processed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/customer-orders/details/CS001"))
            .respond_with(order(3))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/customer-orders/details/CS001"))
            .respond_with(order(ORDER_STATUS_COMPLETED))
            .mount(&server)
            .await;

        let info = controller(&server).wait_complete("CS001").await.unwrap();

        assert_eq!(info.status, ORDER_STATUS_COMPLETED);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_order_fails_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(order(ORDER_STATUS_CANCELLED))
            .mount(&server)
            .await;

        let err = controller(&server).wait_complete("CS001").await.unwrap_err();

        let text = err.to_string();
        assert!(text.contains("error waiting for order (CS001) to complete"));
        assert!(text.contains("order CS001 was cancelled"));
        assert!(err.cause_as::<PollError>().is_some_and(|e| e.is_failed()));
    }

    #[tokio::test]
    async fn test_get_returns_order_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/customer-orders/details/CS001"))
            .respond_with(order(3))
            .expect(1)
            .mount(&server)
            .await;

        let info = controller(&server).get("CS001").await.unwrap();

        assert_eq!(info.order_id, "CS001");
        assert_eq!(info.status, 3);
        assert_eq!(info.order_type, Some(1));
    }

    #[tokio::test]
    async fn test_get_missing_order_names_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": "CBC.0101", "error_msg": "order not found"
            })))
            .mount(&server)
            .await;

        let err = controller(&server).get("CS404").await.unwrap_err();

        let text = err.to_string();
        assert!(text.starts_with("[bss_order.CS404] error retrieving order"));
        assert!(text.contains("CBC.0101"));
    }

    #[tokio::test]
    async fn test_unsubscribe_returns_order_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders/subscriptions/resources/unsubscribe"))
            .and(body_json(json!({"resource_ids": ["s1"], "unsubscribe_type": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"order_ids": ["CS002"]})))
            .mount(&server)
            .await;

        let orders = controller(&server)
            .unsubscribe(&["s1".to_string()])
            .await
            .unwrap();

        assert_eq!(orders, vec!["CS002".to_string()]);
    }
}
