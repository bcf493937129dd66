//! AWS Signature Version 4 request signing.
//!
//! A [`Signer`] turns a request payload into the headers that authorize it,
//! either for an HTTP POST ([`Signer::sign_http`]) or for the realtime socket
//! ([`Signer::sign_ws`]). Two implementations exist: [`SignerV1`] binds its
//! credentials at construction, [`SignerV2`] asks a [`ProvideCredentials`]
//! source on every call and additionally signs `content-length`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "appsync";
const HANDSHAKE_PAYLOAD: &[u8] = b"{}";

/// AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create credentials without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and, if set,
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| Error::Signing(format!("{name} is not set")))
        };
        Ok(Self {
            access_key_id: var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: var("AWS_SECRET_ACCESS_KEY")?,
            session_token: std::env::var("AWS_SESSION_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A source of credentials, consulted on every signature by [`SignerV2`].
pub trait ProvideCredentials: Send + Sync {
    fn provide_credentials(&self) -> Result<Credentials>;
}

impl ProvideCredentials for Credentials {
    fn provide_credentials(&self) -> Result<Credentials> {
        Ok(self.clone())
    }
}

/// Produces authorization headers for a request payload.
pub trait Signer: Send + Sync {
    /// Sign a POST of `payload` to the endpoint.
    fn sign_http(&self, payload: &[u8]) -> Result<HeaderMap>;

    /// Sign a realtime payload, returning a flat header map for embedding in
    /// the socket handshake or a `start` frame. The handshake payload `{}` is
    /// signed against the endpoint's `/connect` path.
    fn sign_ws(&self, payload: &[u8]) -> Result<HashMap<String, String>>;
}

/// Where requests are signed for.
#[derive(Clone, Debug)]
struct Target {
    region: String,
    url: Url,
    connect_url: Url,
}

impl Target {
    fn new(region: impl Into<String>, url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let connect_url = Url::parse(&format!("{}/connect", url.as_str().trim_end_matches('/')))?;
        Ok(Self {
            region: region.into(),
            url,
            connect_url,
        })
    }

    fn ws_url(&self, payload: &[u8]) -> &Url {
        if payload == HANDSHAKE_PAYLOAD {
            &self.connect_url
        } else {
            &self.url
        }
    }

    fn sign_http_at(
        &self,
        credentials: &Credentials,
        payload: &[u8],
        time: DateTime<Utc>,
    ) -> Result<HeaderMap> {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host_header(&self.url));
        let signed = sign_request(
            credentials,
            &self.region,
            SERVICE,
            "POST",
            &self.url,
            headers,
            &hex_sha256(payload),
            time,
        )?;

        let mut map = HeaderMap::new();
        for (name, value) in signed {
            // reqwest derives host from the URL
            if name == "host" {
                continue;
            }
            map.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }
        Ok(map)
    }

    fn sign_ws_at(
        &self,
        credentials: &Credentials,
        payload: &[u8],
        content_length: bool,
        time: DateTime<Utc>,
    ) -> Result<HashMap<String, String>> {
        let url = self.ws_url(payload);
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/json, text/javascript".to_string());
        headers.insert("content-encoding".to_string(), "amz-1.0".to_string());
        headers.insert("content-type".to_string(), "application/json; charset=UTF-8".to_string());
        headers.insert("host".to_string(), host_header(url));
        if content_length {
            headers.insert("content-length".to_string(), payload.len().to_string());
        }

        let signed = sign_request(
            credentials,
            &self.region,
            SERVICE,
            "POST",
            url,
            headers,
            &hex_sha256(payload),
            time,
        )?;

        Ok(signed
            .into_iter()
            .map(|(name, value)| {
                let name = match name.as_str() {
                    "authorization" => "Authorization".to_string(),
                    "x-amz-security-token" => "X-Amz-Security-Token".to_string(),
                    _ => name,
                };
                (name, value)
            })
            .collect())
    }
}

/// Signs with credentials bound at construction.
#[derive(Clone, Debug)]
pub struct SignerV1 {
    credentials: Credentials,
    target: Target,
}

impl SignerV1 {
    /// Create a signer for the GraphQL endpoint `url` in `region`.
    pub fn new(credentials: Credentials, region: impl Into<String>, url: &str) -> Result<Self> {
        Ok(Self {
            credentials,
            target: Target::new(region, url)?,
        })
    }
}

impl Signer for SignerV1 {
    fn sign_http(&self, payload: &[u8]) -> Result<HeaderMap> {
        self.target.sign_http_at(&self.credentials, payload, Utc::now())
    }

    fn sign_ws(&self, payload: &[u8]) -> Result<HashMap<String, String>> {
        self.target
            .sign_ws_at(&self.credentials, payload, false, Utc::now())
    }
}

/// Signs with credentials fetched per call, and signs `content-length`.
#[derive(Clone)]
pub struct SignerV2 {
    provider: Arc<dyn ProvideCredentials>,
    target: Target,
}

impl SignerV2 {
    /// Create a signer for the GraphQL endpoint `url` in `region`.
    pub fn new(
        provider: Arc<dyn ProvideCredentials>,
        region: impl Into<String>,
        url: &str,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            target: Target::new(region, url)?,
        })
    }
}

impl Signer for SignerV2 {
    fn sign_http(&self, payload: &[u8]) -> Result<HeaderMap> {
        let credentials = self.provider.provide_credentials()?;
        self.target.sign_http_at(&credentials, payload, Utc::now())
    }

    fn sign_ws(&self, payload: &[u8]) -> Result<HashMap<String, String>> {
        let credentials = self.provider.provide_credentials()?;
        self.target
            .sign_ws_at(&credentials, payload, true, Utc::now())
    }
}

impl std::fmt::Debug for SignerV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerV2")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Compute a SigV4 signature.
///
/// `headers` are the headers to sign, keyed by lowercase name; `host` must be
/// among them. The result depends only on the arguments. Returns the headers
/// with `x-amz-date`, `x-amz-security-token` (when the credentials carry one)
/// and `authorization` added.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    credentials: &Credentials,
    region: &str,
    service: &str,
    method: &str,
    url: &Url,
    mut headers: BTreeMap<String, String>,
    payload_hash: &str,
    time: DateTime<Utc>,
) -> Result<BTreeMap<String, String>> {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();

    headers.insert("x-amz-date".to_string(), amz_date.clone());
    if let Some(token) = &credentials.session_token {
        headers.insert("x-amz-security-token".to_string(), token.clone());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        canonical_uri(url),
        canonical_query(url),
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    headers.insert(
        "authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
    );
    Ok(headers)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The `host[:port]` of a URL, as sent in the `host` header.
pub(crate) fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_get_vanilla() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "example.amazonaws.com".to_string());

        let signed = sign_request(
            &example_credentials(),
            "us-east-1",
            "service",
            "GET",
            &url,
            headers,
            &hex_sha256(b""),
            example_time(),
        )
        .unwrap();

        assert_eq!(signed["x-amz-date"], "20150830T123600Z");
        assert_eq!(
            signed["authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_canonical_query_is_sorted_and_encoded() {
        let url = Url::parse("https://example.com/?b=2&a=x%20y&a=1").unwrap();
        assert_eq!(canonical_query(&url), "a=1&a=x%20y&b=2");
    }

    #[test]
    fn test_handshake_targets_connect_path() {
        let target = Target::new("us-east-1", "https://example.com/graphql").unwrap();
        assert_eq!(target.ws_url(b"{}").path(), "/graphql/connect");
        assert_eq!(target.ws_url(br#"{"query":"q"}"#).path(), "/graphql");

        let creds = example_credentials();
        let handshake = target
            .sign_ws_at(&creds, b"{}", false, example_time())
            .unwrap();

        let mut expected_headers = BTreeMap::new();
        expected_headers.insert("accept".to_string(), "application/json, text/javascript".to_string());
        expected_headers.insert("content-encoding".to_string(), "amz-1.0".to_string());
        expected_headers.insert("content-type".to_string(), "application/json; charset=UTF-8".to_string());
        expected_headers.insert("host".to_string(), "example.com".to_string());
        let expected = sign_request(
            &creds,
            "us-east-1",
            SERVICE,
            "POST",
            &Url::parse("https://example.com/graphql/connect").unwrap(),
            expected_headers,
            &hex_sha256(b"{}"),
            example_time(),
        )
        .unwrap();
        assert_eq!(handshake["Authorization"], expected["authorization"]);
    }

    #[test]
    fn test_connect_url_with_trailing_slash() {
        let target = Target::new("us-east-1", "https://example.com/").unwrap();
        assert_eq!(target.connect_url.as_str(), "https://example.com/connect");
    }

    #[test]
    fn test_ws_headers_v1() {
        let target = Target::new("ap-northeast-1", "https://example.com:8443/graphql").unwrap();
        let creds = example_credentials().session_token("token");
        let headers = target
            .sign_ws_at(&creds, b"{}", false, example_time())
            .unwrap();

        assert_eq!(headers["accept"], "application/json, text/javascript");
        assert_eq!(headers["content-encoding"], "amz-1.0");
        assert_eq!(headers["content-type"], "application/json; charset=UTF-8");
        assert_eq!(headers["host"], "example.com:8443");
        assert_eq!(headers["x-amz-date"], "20150830T123600Z");
        assert_eq!(headers["X-Amz-Security-Token"], "token");
        assert!(!headers.contains_key("content-length"));
        assert!(
            headers["Authorization"].contains(
                "SignedHeaders=accept;content-encoding;content-type;host;x-amz-date;x-amz-security-token"
            )
        );
    }

    #[test]
    fn test_ws_headers_v2_sign_content_length() {
        let target = Target::new("us-east-1", "https://example.com/graphql").unwrap();
        let headers = target
            .sign_ws_at(&example_credentials(), b"{}", true, example_time())
            .unwrap();

        assert_eq!(headers["content-length"], "2");
        assert!(!headers.contains_key("X-Amz-Security-Token"));
        assert!(headers["Authorization"].contains(
            "SignedHeaders=accept;content-encoding;content-length;content-type;host;x-amz-date,"
        ));
    }

    #[test]
    fn test_sign_http() {
        let signer =
            SignerV1::new(example_credentials(), "us-east-1", "https://example.com/graphql")
                .unwrap();
        let headers = signer.sign_http(br#"{"query":"q"}"#).unwrap();

        assert!(headers.contains_key("x-amz-date"));
        assert!(!headers.contains_key("host"));
        let authorization = headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/appsync/aws4_request"));
    }

    #[test]
    fn test_signer_v2_uses_provider() {
        struct Failing;
        impl ProvideCredentials for Failing {
            fn provide_credentials(&self) -> Result<Credentials> {
                Err(Error::Signing("no credentials".into()))
            }
        }

        let signer = SignerV2::new(Arc::new(Failing), "us-east-1", "https://example.com/graphql")
            .unwrap();
        assert!(matches!(signer.sign_ws(b"{}"), Err(Error::Signing(_))));
        assert!(matches!(signer.sign_http(b"{}"), Err(Error::Signing(_))));

        let signer = SignerV2::new(
            Arc::new(example_credentials()),
            "us-east-1",
            "https://example.com/graphql",
        )
        .unwrap();
        assert_eq!(signer.sign_ws(b"{}").unwrap()["content-length"], "2");
    }

    #[test]
    fn test_invalid_url() {
        let result = SignerV1::new(example_credentials(), "us-east-1", "not a url");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = example_credentials().session_token("token");
        let debug = format!("{creds:?}");
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("wJalrXUtnFEMI"));
        assert!(debug.contains("<redacted>"));
    }
}
