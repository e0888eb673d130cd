//! AK/SK request signing (SDK-HMAC-SHA256)

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use url::Url;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_DATE: &str = "X-Sdk-Date";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_SECURITY_TOKEN: &str = "X-Security-Token";

const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Characters left unescaped in canonical URIs and query strings
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha256 = Hmac<Sha256>;

/// Access key credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    /// Present for temporary credentials
    pub security_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to sign request: {0}")]
pub struct SignError(String);

/// Signs requests with an access key pair
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Compute the headers to add to a request.
    ///
    /// `headers` are the headers the request will carry besides the ones
    /// returned here; all of them are signed, together with `Host` and
    /// `X-Sdk-Date`.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SignError> {
        let date = now.format(DATE_FORMAT).to_string();

        let mut added = vec![(HEADER_DATE.to_string(), date.clone())];
        if let Some(token) = &self.credentials.security_token {
            added.push((HEADER_SECURITY_TOKEN.to_string(), token.clone()));
        }

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .chain(added.iter())
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        if !signed.iter().any(|(k, _)| k == "host") {
            signed.push(("host".to_string(), host_header(url)));
        }
        signed.sort();

        let canonical = canonical_request(method, url, &signed, body);
        let string_to_sign = format!("{}\n{}\n{}", ALGORITHM, date, hex_sha256(canonical.as_bytes()));

        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())
            .map_err(|e| SignError(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let signed_headers = signed_header_names(&signed);
        added.push((
            HEADER_AUTHORIZATION.to_string(),
            format!(
                "{} Access={}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.credentials.access_key, signed_headers, signature
            ),
        ));
        Ok(added)
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Path with every segment escaped, always ending with '/'
fn canonical_uri(url: &Url) -> String {
    let mut uri = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = percent_encoding::percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, UNRESERVED).to_string()
        })
        .collect::<Vec<_>>()
        .join("/");
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, UNRESERVED).to_string(),
                utf8_percent_encode(&v, UNRESERVED).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// `headers` must be lower-cased and sorted
fn canonical_request(method: &str, url: &Url, headers: &[(String, String)], body: &[u8]) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed_header_names(headers),
        hex_sha256(body)
    )
}
