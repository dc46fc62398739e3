//! Outbound HTTP for every data-fetching feature.
//!
//! Each request carries the operator's identity headers and a JSON body.
//! The HTTP status is never inspected and nothing is retried; callers check
//! the `code` inside the response envelope.

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::domain::Identity;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const USER_INFO_HEADER: &str = "x-user-info";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(GatewayError::UnsupportedMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("invalid endpoint '{0}': expected an absolute http(s) url or a path starting with '/'")]
    InvalidEndpoint(String),
    #[error("unsupported http method '{0}'")]
    UnsupportedMethod(String),
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode response from {method} {url} (http {status}): {source}")]
    Decode {
        method: Method,
        url: String,
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the gateway reads the current operator identity from.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn current_identity(&self) -> Option<Identity>;
}

/// Identity source for unauthenticated calls such as login.
pub struct Anonymous;

#[async_trait]
impl IdentitySource for Anonymous {
    async fn current_identity(&self) -> Option<Identity> {
        None
    }
}

/// A single outbound call: verb, endpoint, optional JSON body, extra headers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Patch, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, GatewayError> {
        self.body = Some(serde_json::to_value(body).map_err(GatewayError::Encode)?);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub struct RequestGateway {
    http: Client,
    base_url: Url,
    identity: Arc<dyn IdentitySource>,
}

impl RequestGateway {
    pub fn new(base_url: &str, identity: Arc<dyn IdentitySource>) -> Result<Self, GatewayError> {
        Self::with_client(Client::new(), base_url, identity)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        identity: Arc<dyn IdentitySource>,
    ) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url.trim()).map_err(|err| GatewayError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(Self {
            http,
            base_url,
            identity,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URLs are used as-is; paths are appended to the base url,
    /// keeping any path prefix the base url carries.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, GatewayError> {
        let endpoint = endpoint.trim();
        let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url.as_str().trim_end_matches('/'))
        } else {
            return Err(GatewayError::InvalidEndpoint(endpoint.to_string()));
        };
        Url::parse(&raw).map_err(|_| GatewayError::InvalidEndpoint(endpoint.to_string()))
    }

    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, GatewayError> {
        let ApiRequest {
            method,
            endpoint,
            body,
            headers: extra_headers,
        } = request;

        let url = self.resolve(&endpoint)?;

        let mut headers = match self.identity.current_identity().await {
            Some(identity) => identity_headers(&identity)?,
            None => HeaderMap::new(),
        };
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &extra_headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        let mut builder = self
            .http
            .request(method.to_reqwest(), url.clone())
            .headers(headers);
        match (method, body) {
            (Method::Get, Some(_)) => {
                debug!(%url, "dropping request body for GET");
            }
            (_, Some(body)) => {
                let encoded = serde_json::to_vec(&body).map_err(GatewayError::Encode)?;
                builder = builder.body(encoded);
            }
            (_, None) => {}
        }

        debug!(%method, %url, "issuing request");
        let response = match builder.send().await {
            Ok(response) => response,
            Err(source) => {
                error!(%method, %url, error = %source, "request failed");
                return Err(GatewayError::Transport {
                    method,
                    url: url.to_string(),
                    source,
                });
            }
        };

        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(source) => {
                error!(%method, %url, status, error = %source, "reading response body failed");
                return Err(GatewayError::Transport {
                    method,
                    url: url.to_string(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| {
            error!(%method, %url, status, error = %source, "response is not the expected json");
            GatewayError::Decode {
                method,
                url: url.to_string(),
                status,
                source,
            }
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GatewayError> {
        self.send(ApiRequest::get(endpoint)).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::post(endpoint).json(body)?).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::put(endpoint).json(body)?).await
    }

    pub async fn patch<T, B>(&self, endpoint: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::patch(endpoint).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GatewayError> {
        self.send(ApiRequest::delete(endpoint)).await
    }
}

/// Headers describing `identity`: the whole record as JSON plus one header
/// per field that is present.
pub fn identity_headers(identity: &Identity) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();

    let info = serde_json::to_string(identity).map_err(GatewayError::Encode)?;
    let (name, value) = parse_header(USER_INFO_HEADER, &info)?;
    headers.insert(name, value);

    if let Some(id) = &identity.id {
        let (name, value) = parse_header(USER_ID_HEADER, &id.0)?;
        headers.insert(name, value);
    }
    if let Some(email) = &identity.email {
        let (name, value) = parse_header(USER_EMAIL_HEADER, email)?;
        headers.insert(name, value);
    }
    if let Some(role) = &identity.role {
        let (name, value) = parse_header(USER_ROLE_HEADER, role)?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), GatewayError> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|err| GatewayError::InvalidHeader {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    let header_value =
        HeaderValue::from_bytes(value.as_bytes()).map_err(|err| GatewayError::InvalidHeader {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    Ok((header_name, header_value))
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
