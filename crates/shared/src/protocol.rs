use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Identity, QueryId, QueryTypeId, UserId},
    error::{ApiError, ErrorCode, SUCCESS_CODE},
};

/// Envelope every backend endpoint answers with, regardless of HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Checks the application-level code; success may carry no payload.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ApiError::application(self.code, self.message))
        }
    }

    /// Like [`Self::into_result`] but a successful envelope must carry data.
    pub fn into_data(self) -> Result<T, ApiError> {
        self.into_result()?
            .ok_or_else(|| ApiError::new(ErrorCode::Decode, "response envelope has no data"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub type LoginResponse = Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require("email", &self.email)?;
        require("password", &self.password)?;
        require("role", &self.role)?;
        if !self.email.contains('@') {
            return Err(ApiError::validation("email must contain '@'"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryType {
    pub id: QueryTypeId,
    pub code: String,
    pub name: String,
    pub level2_scene: String,
    pub level3_scene: String,
    pub number: u32,
    pub generation_prompt: String,
    pub analysis_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_prompt: Option<String>,
}

/// Body for creating or replacing a query type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTypeDraft {
    pub code: String,
    pub name: String,
    pub level2_scene: String,
    pub level3_scene: String,
    pub number: u32,
    pub generation_prompt: String,
    pub analysis_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_prompt: Option<String>,
}

impl QueryTypeDraft {
    pub fn validate(&self) -> Result<(), ApiError> {
        require("code", &self.code)?;
        require("name", &self.name)?;
        require("level2Scene", &self.level2_scene)?;
        require("level3Scene", &self.level3_scene)?;
        require("generationPrompt", &self.generation_prompt)?;
        require("analysisPrompt", &self.analysis_prompt)?;
        if self.number == 0 {
            return Err(ApiError::validation("number must be at least 1"));
        }
        Ok(())
    }
}

/// A level-2 scene and the level-3 scenes nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub level2: String,
    #[serde(default)]
    pub level3: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStatus {
    #[default]
    Pending,
    Passed,
    Filtered,
}

impl FilterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Filtered => "filtered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "passed" => Some(Self::Passed),
            "filtered" => Some(Self::Filtered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl ManualStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: QueryId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub query_type_code: String,
    #[serde(default)]
    pub filter_status: FilterStatus,
    #[serde(default)]
    pub manual_status: ManualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub query_type_code: Option<String>,
    pub filter_status: Option<FilterStatus>,
    pub manual_status: Option<ManualStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl QueryFilter {
    /// Query-string pairs in the backend's parameter names.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(code) = &self.query_type_code {
            pairs.push(("queryTypeCode", code.clone()));
        }
        if let Some(status) = self.filter_status {
            pairs.push(("filterStatus", status.as_str().to_string()));
        }
        if let Some(status) = self.manual_status {
            pairs.push(("manualStatus", status.as_str().to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize", page_size.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    pub items: Vec<Query>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatusPatch {
    pub manual_status: ManualStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQueriesRequest {
    pub query_type_code: String,
    pub count: u32,
}

impl GenerateQueriesRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        require("queryTypeCode", &self.query_type_code)?;
        if self.count == 0 {
            return Err(ApiError::validation("count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQueriesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub accepted: u32,
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_code_becomes_application_error() {
        let envelope: ApiResponse<Vec<User>> =
            serde_json::from_str(r#"{"code":403,"message":"forbidden"}"#).expect("json");
        let err = envelope.into_result().expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Application(403));
        assert_eq!(err.message, "forbidden");
    }

    #[test]
    fn success_without_data_is_allowed_for_into_result() {
        let envelope: ApiResponse<User> = serde_json::from_str(r#"{"code":200}"#).expect("json");
        assert!(envelope.into_result().expect("ok").is_none());
    }

    #[test]
    fn success_without_data_fails_into_data() {
        let envelope: ApiResponse<User> = serde_json::from_str(r#"{"code":200}"#).expect("json");
        let err = envelope.into_data().expect_err("missing data");
        assert_eq!(err.code, ErrorCode::Decode);
    }

    #[test]
    fn query_defaults_statuses_when_absent() {
        let query: Query = serde_json::from_str(
            r#"{"id":"q1","text":"how to grow","queryTypeCode":"trend-growth-1"}"#,
        )
        .expect("json");
        assert_eq!(query.filter_status, FilterStatus::Pending);
        assert_eq!(query.manual_status, ManualStatus::Pending);
        assert!(query.analysis.is_none());
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(ManualStatus::parse(" Accepted"), Some(ManualStatus::Accepted));
        assert_eq!(FilterStatus::parse("FILTERED"), Some(FilterStatus::Filtered));
        assert_eq!(ManualStatus::parse("done"), None);
    }

    #[test]
    fn create_user_requires_fields() {
        let request = CreateUserRequest {
            email: "a@b.com".into(),
            password: " ".into(),
            role: "admin".into(),
        };
        let err = request.validate().expect_err("password missing");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("password"));
    }

    #[test]
    fn query_filter_emits_only_set_pairs() {
        let filter = QueryFilter {
            query_type_code: Some("trend-growth-1".into()),
            manual_status: Some(ManualStatus::Accepted),
            ..QueryFilter::default()
        };
        assert_eq!(
            filter.to_pairs(),
            vec![
                ("queryTypeCode", "trend-growth-1".to_string()),
                ("manualStatus", "accepted".to_string()),
            ]
        );
    }

    #[test]
    fn draft_rejects_zero_number() {
        let draft = QueryTypeDraft {
            code: "trend-growth-0".into(),
            name: "Growth".into(),
            level2_scene: "trend".into(),
            level3_scene: "growth".into(),
            number: 0,
            generation_prompt: "gen".into(),
            analysis_prompt: "analyze".into(),
            scoring_prompt: None,
        };
        assert!(draft.validate().is_err());
    }
}
