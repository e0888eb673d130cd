//! Stratus Provider for Huawei Cloud
//!
//! Controllers for Cloud Phone servers and phones, CAE components, and the
//! billing orders behind prepaid resources. Each controller submits a
//! request and then waits for the operation it started through
//! `stratus_core::StatusPoller`.

pub mod bss;
pub mod cae;
pub mod client;
pub mod config;
pub mod cph;
pub mod signer;

use stratus_core::{CancellationToken, PollConfig, ProviderError, ProviderResult, StatusPoller};

use crate::bss::{OrderController, OrderWaits};
use crate::cae::{CaeComponentController, CaeWaits};
use crate::client::ServiceClient;
use crate::config::ProviderConfig;
use crate::cph::{CphPhoneController, CphServerController, CphServerWaits, PhoneWaits};

/// Poll settings for every controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Waits {
    pub cph_server: CphServerWaits,
    pub cph_phone: PhoneWaits,
    pub cae: CaeWaits,
    pub order: OrderWaits,
}

impl Waits {
    /// Override the timeout of every wait
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.cph_server = self.cph_server.with_timeout(timeout);
        self.cph_phone.job = self.cph_phone.job.with_timeout(timeout);
        self.cae = self.cae.with_timeout(timeout);
        self.order.complete = self.order.complete.with_timeout(timeout);
        self
    }
}

/// Entry point handing out controllers that share one HTTP client
#[derive(Debug, Clone)]
pub struct HuaweiCloudProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    waits: Waits,
    cancel: Option<CancellationToken>,
}

impl HuaweiCloudProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::new("invalid provider configuration").with_cause(e))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure.unwrap_or(false))
            .build()
            .map_err(|e| {
                ProviderError::new("failed to build HTTP client")
                    .with_cause(client::ClientError::Build(e))
            })?;

        Ok(Self {
            http,
            config,
            waits: Waits::default(),
            cancel: None,
        })
    }

    pub fn with_waits(mut self, waits: Waits) -> Self {
        self.waits = waits;
        self
    }

    /// Every controller handed out afterwards stops waiting once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn service_client(&self, service: &str) -> ProviderResult<ServiceClient> {
        ServiceClient::new(self.http.clone(), &self.config, service).map_err(|e| {
            ProviderError::new(format!("error creating {} client", service.to_uppercase()))
                .with_cause(e)
        })
    }

    pub fn orders(&self) -> ProviderResult<OrderController> {
        let controller = OrderController::new(self.service_client("bss")?, self.waits.order);
        Ok(match &self.cancel {
            Some(token) => controller.with_cancellation(token.clone()),
            None => controller,
        })
    }

    pub fn cph_servers(&self) -> ProviderResult<CphServerController> {
        let controller =
            CphServerController::new(self.service_client("cph")?, self.orders()?, self.waits.cph_server);
        Ok(match &self.cancel {
            Some(token) => controller.with_cancellation(token.clone()),
            None => controller,
        })
    }

    pub fn cph_phones(&self) -> ProviderResult<CphPhoneController> {
        let controller = CphPhoneController::new(self.service_client("cph")?, self.waits.cph_phone);
        Ok(match &self.cancel {
            Some(token) => controller.with_cancellation(token.clone()),
            None => controller,
        })
    }

    pub fn cae_components(&self) -> ProviderResult<CaeComponentController> {
        let controller = CaeComponentController::new(self.service_client("cae")?, self.waits.cae);
        Ok(match &self.cancel {
            Some(token) => controller.with_cancellation(token.clone()),
            None => controller,
        })
    }
}

/// Build a poller for `target`, bound to `cancel` when one is set
pub(crate) fn waiter(
    target: impl Into<String>,
    config: PollConfig,
    cancel: &Option<CancellationToken>,
) -> StatusPoller {
    let poller = StatusPoller::new(target, config);
    match cancel {
        Some(token) => poller.with_cancellation(token.clone()),
        None => poller,
    }
}
