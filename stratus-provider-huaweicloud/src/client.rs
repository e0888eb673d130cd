//! HTTP request executor
//!
//! One `ServiceClient` per service endpoint. Requests are built from URL
//! templates, signed, sent, and their bodies decoded into generic JSON.

use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{ConfigError, ProviderConfig};
use crate::signer::{SignError, Signer};

fn format_api_error(code: &Option<String>, msg: &Option<String>) -> String {
    match (code, msg) {
        (Some(code), Some(msg)) => format!(": {} {}", code, msg),
        (Some(code), None) => format!(": {}", code),
        (None, Some(msg)) => format!(": {}", msg),
        (None, None) => String::new(),
    }
}

/// Errors raised while talking to an API endpoint
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned status {status}{}", format_api_error(.error_code, .error_msg))]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        error_code: Option<String>,
        error_msg: Option<String>,
        body: String,
    },

    #[error("failed to decode response of {method} {url}: {source}")]
    Decode {
        method: String,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error(transparent)]
    Signing(#[from] SignError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// HTTP status of an unexpected response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Service error code of an unexpected response (e.g. "CAE.01500208")
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::UnexpectedStatus { error_code, .. } => error_code.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// True for 404, and for 400/500 responses carrying one of `codes`.
    ///
    /// Some services report a missing resource through a generic status and
    /// a service-specific error code.
    pub fn is_not_found_with(&self, codes: &[&str]) -> bool {
        if self.is_not_found() {
            return true;
        }
        matches!(self.status(), Some(400) | Some(500))
            && self.error_code().is_some_and(|code| codes.contains(&code))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Options for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    /// Accepted status codes; empty accepts any 2xx
    pub ok_codes: Vec<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json<T: Serialize>(self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(ClientError::Encode)?;
        Ok(self.with_body(value))
    }
}

/// Client bound to one service endpoint and project
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    service: String,
    endpoint: Url,
    project_id: String,
    signer: Signer,
}

impl ServiceClient {
    pub fn new(
        http: reqwest::Client,
        config: &ProviderConfig,
        service: &str,
    ) -> ClientResult<Self> {
        let endpoint = config.endpoint_for(service)?;
        let endpoint = Url::parse(&endpoint).map_err(|_| ConfigError::InvalidEndpoint {
            service: service.to_string(),
            endpoint: endpoint.clone(),
        })?;

        Ok(Self {
            http,
            service: service.to_string(),
            endpoint,
            project_id: config.project_id()?.to_string(),
            signer: Signer::new(config.credentials()?),
        })
    }

    /// Expand `{project_id}` and the given `{name}` placeholders in a URL template
    pub fn url_path(&self, template: &str, params: &[(&str, &str)]) -> String {
        params.iter().fold(
            template.replace("{project_id}", &self.project_id),
            |path, (name, value)| path.replace(&format!("{{{}}}", name), value),
        )
    }

    /// Send one request and decode the response body.
    ///
    /// Empty bodies decode to `Value::Null`.
    pub async fn request(&self, method: Method, path: &str, opts: RequestOpts) -> ClientResult<Value> {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}{}: {}", self.endpoint, path, e)))?;

        let body = match &opts.body {
            Some(body) => serde_json::to_vec(body).map_err(ClientError::Encode)?,
            None => Vec::new(),
        };

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("X-Project-Id".to_string(), self.project_id.clone()),
        ];
        headers.extend(opts.headers.iter().cloned());
        let auth = self
            .signer
            .sign(method.as_str(), &url, &headers, &body, Utc::now())?;

        let mut request = self.http.request(method.clone(), url.clone());
        for (name, value) in headers.iter().chain(auth.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        if opts.body.is_some() {
            request = request.body(body);
        }

        log::debug!("{} {} {}", self.service, method, url);
        let transport = |source| ClientError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport)?;

        let accepted = if opts.ok_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            opts.ok_codes.contains(&status)
        };
        if !accepted {
            let (error_code, error_msg) = parse_error_body(&text);
            log::debug!("{} {} returned {}: {}", method, url, status, text);
            return Err(ClientError::UnexpectedStatus {
                method: method.to_string(),
                url: url.to_string(),
                status,
                error_code,
                error_msg,
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| ClientError::Decode {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })
    }

    pub async fn get(&self, path: &str, opts: RequestOpts) -> ClientResult<Value> {
        self.request(Method::GET, path, opts).await
    }

    pub async fn post(&self, path: &str, opts: RequestOpts) -> ClientResult<Value> {
        self.request(Method::POST, path, opts).await
    }

    pub async fn put(&self, path: &str, opts: RequestOpts) -> ClientResult<Value> {
        self.request(Method::PUT, path, opts).await
    }

    pub async fn delete(&self, path: &str, opts: RequestOpts) -> ClientResult<Value> {
        self.request(Method::DELETE, path, opts).await
    }
}

/// Pull the service error code and message out of an error body.
///
/// Services use either flat `error_code`/`error_msg` fields or a nested
/// `error` object with `code`/`message`.
fn parse_error_body(text: &str) -> (Option<String>, Option<String>) {
    let Ok(body) = serde_json::from_str::<Value>(text) else {
        return (None, None);
    };
    let field = |paths: &[&str]| {
        paths
            .iter()
            .find_map(|p| stratus_core::extract::search_string(&body, p))
    };
    (
        field(&["error_code", "error.code", "errorCode"]),
        field(&["error_msg", "error.message", "errorMessage"]),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_config(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig {
            region: Some("cn-north-4".to_string()),
            project_id: Some("p1".to_string()),
            access_key: Some("AK".to_string()),
            secret_key: Some("SK".to_string()),
            ..Default::default()
        };
        for service in ["cph", "cae", "bss"] {
            config.endpoints.insert(service.to_string(), server.uri());
        }
        config
    }

    async fn client(server: &MockServer) -> ServiceClient {
        ServiceClient::new(reqwest::Client::new(), &test_config(server), "cph").unwrap()
    }

    #[tokio::test]
    async fn test_get_decodes_json_and_signs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/p1/cloud-phone/servers/s1"))
            .and(header("X-Project-Id", "p1"))
            .and(header_exists("X-Sdk-Date"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 5})))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let path = client.url_path(
            "v1/{project_id}/cloud-phone/servers/{server_id}",
            &[("server_id", "s1")],
        );
        let body = client.get(&path, RequestOpts::new()).await.unwrap();

        assert_eq!(body, json!({"status": 5}));
    }

    #[tokio::test]
    async fn test_post_sends_body_and_extra_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/p1/cae/applications/a1/components"))
            .and(header("X-Environment-Id", "env-1"))
            .and(body_json(json!({"kind": "Component"})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let body = client
            .post(
                "v1/p1/cae/applications/a1/components",
                RequestOpts::new()
                    .with_header("X-Environment-Id", "env-1")
                    .with_body(json!({"kind": "Component"})),
            )
            .await
            .unwrap();

        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_unexpected_status_carries_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "CAE.01500208",
                "error_msg": "component not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .get("v1/p1/cae/jobs/j1", RequestOpts::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(err.error_code(), Some("CAE.01500208"));
        assert!(!err.is_not_found());
        assert!(err.is_not_found_with(&["CAE.01500208"]));
        assert!(!err.is_not_found_with(&["CAE.01500404"]));
        assert!(err.to_string().contains("component not found"));
    }

    #[tokio::test]
    async fn test_ok_codes_restrict_accepted_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .put("v1/p1/x", RequestOpts::new().with_ok_codes(&[200]))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(201));
    }

    #[test]
    fn test_parse_error_body_shapes() {
        assert_eq!(
            parse_error_body(r#"{"error": {"code": "APIGW.0101", "message": "not found"}}"#),
            (Some("APIGW.0101".to_string()), Some("not found".to_string()))
        );
        assert_eq!(parse_error_body("<html>"), (None, None));
    }
}
