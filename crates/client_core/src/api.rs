//! Typed calls against the labeling backend.
//!
//! Every method unwraps the response envelope: a non-200 `code` becomes an
//! [`ApiError`] with `ErrorCode::Application`, transport and decode failures
//! map to `ErrorCode::Transport` / `ErrorCode::Decode`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Identity, QueryId, QueryTypeId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ApiResponse, CreateUserRequest, GenerateQueriesRequest, GenerateQueriesResponse,
        LoginRequest, ManualStatus, Query, QueryFilter, QueryPage, QueryStatusPatch, QueryType,
        QueryTypeDraft, Scene, UpdateUserRequest, User,
    },
};
use tracing::{info, warn};
use url::form_urlencoded;

use crate::gateway::{ApiRequest, GatewayError, RequestGateway};

impl From<GatewayError> for ApiError {
    fn from(value: GatewayError) -> Self {
        let code = match &value {
            GatewayError::Decode { .. } => ErrorCode::Decode,
            GatewayError::Encode(_)
            | GatewayError::InvalidBaseUrl { .. }
            | GatewayError::InvalidEndpoint(_)
            | GatewayError::UnsupportedMethod(_)
            | GatewayError::InvalidHeader { .. } => ErrorCode::Validation,
            GatewayError::Transport { .. } => ErrorCode::Transport,
        };
        ApiError::new(code, value.to_string())
    }
}

pub struct AdminApi {
    gateway: Arc<RequestGateway>,
}

impl AdminApi {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        if request.email.is_empty() || request.password.is_empty() {
            return Err(ApiError::validation("email and password are required"));
        }
        let identity: Identity = self
            .call(ApiRequest::post("/api/auth/login").json(&request)?)
            .await?;
        info!(email = %request.email, role = ?identity.role, "login accepted");
        Ok(identity)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.call(ApiRequest::get("/api/users")).await
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, ApiError> {
        request.validate()?;
        self.call(ApiRequest::post("/api/users").json(request)?).await
    }

    pub async fn update_user(
        &self,
        user_id: &UserId,
        request: &UpdateUserRequest,
    ) -> Result<User, ApiError> {
        let endpoint = format!("/api/users/{}", segment(&user_id.0));
        self.call(ApiRequest::put(endpoint).json(request)?).await
    }

    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), ApiError> {
        let endpoint = format!("/api/users/{}", segment(&user_id.0));
        self.call_empty(ApiRequest::delete(endpoint)).await
    }

    pub async fn list_query_types(&self) -> Result<Vec<QueryType>, ApiError> {
        self.call(ApiRequest::get("/api/query-types")).await
    }

    pub async fn create_query_type(&self, draft: &QueryTypeDraft) -> Result<QueryType, ApiError> {
        draft.validate()?;
        self.call(ApiRequest::post("/api/query-types").json(draft)?)
            .await
    }

    pub async fn update_query_type(
        &self,
        id: &QueryTypeId,
        draft: &QueryTypeDraft,
    ) -> Result<QueryType, ApiError> {
        draft.validate()?;
        let endpoint = format!("/api/query-types/{}", segment(&id.0));
        self.call(ApiRequest::put(endpoint).json(draft)?).await
    }

    pub async fn delete_query_type(&self, id: &QueryTypeId) -> Result<(), ApiError> {
        let endpoint = format!("/api/query-types/{}", segment(&id.0));
        self.call_empty(ApiRequest::delete(endpoint)).await
    }

    pub async fn list_queries(&self, filter: &QueryFilter) -> Result<QueryPage, ApiError> {
        let pairs = filter.to_pairs();
        let endpoint = if pairs.is_empty() {
            "/api/queries".to_string()
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            format!("/api/queries?{query}")
        };
        self.call(ApiRequest::get(endpoint)).await
    }

    /// Records a manual accept/reject decision on an auto-filtered query.
    pub async fn set_query_status(
        &self,
        id: &QueryId,
        manual_status: ManualStatus,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/api/queries/{}/status", segment(&id.0));
        self.call_empty(ApiRequest::patch(endpoint).json(&QueryStatusPatch { manual_status })?)
            .await
    }

    pub async fn list_scenes(&self) -> Result<Vec<Scene>, ApiError> {
        self.call(ApiRequest::get("/api/scenes")).await
    }

    pub async fn generate_queries(
        &self,
        request: &GenerateQueriesRequest,
    ) -> Result<GenerateQueriesResponse, ApiError> {
        request.validate()?;
        let response: GenerateQueriesResponse = self
            .call(ApiRequest::post("/api/queries/generate").json(request)?)
            .await?;
        info!(
            query_type = %request.query_type_code,
            requested = request.count,
            accepted = response.accepted,
            "query generation triggered"
        );
        Ok(response)
    }

    /// Collects every page of queries matching `filter`.
    pub async fn list_all_queries(&self, filter: &QueryFilter) -> Result<Vec<Query>, ApiError> {
        let page_size = filter.page_size.unwrap_or(100).max(1);
        let mut page = filter.page.unwrap_or(1).max(1);
        // Rows on the pages before the first one requested.
        let skipped = u64::from(page - 1) * u64::from(page_size);
        let mut rows = Vec::new();
        loop {
            let current = QueryFilter {
                page: Some(page),
                page_size: Some(page_size),
                ..filter.clone()
            };
            let result = self.list_queries(&current).await?;
            let fetched = result.items.len();
            rows.extend(result.items);
            if fetched < page_size as usize || skipped + rows.len() as u64 >= result.total {
                break;
            }
            page += 1;
        }
        Ok(rows)
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let endpoint = request.endpoint().to_string();
        let envelope: ApiResponse<T> = self.gateway.send(request).await?;
        envelope.into_data().inspect_err(|err| {
            warn!(%endpoint, error = %err, "backend rejected request");
        })
    }

    async fn call_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        let endpoint = request.endpoint().to_string();
        let envelope: ApiResponse<Value> = self.gateway.send(request).await?;
        envelope.into_result().map(|_| ()).inspect_err(|err| {
            warn!(%endpoint, error = %err, "backend rejected request");
        })
    }
}

/// Percent-encodes one path segment. The form serializer writes a space as
/// `+`, which a path would keep as a literal plus.
fn segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
