use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::prompt::Length;

#[derive(serde::Deserialize, serde::Serialize, ToSchema, Debug)]
pub struct BuzzifyReq {
    #[serde(default)]
    pub text: String,

    /// Used only once the free requests for the day are spent.
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,

    /// Missing or null means medium.
    #[serde(default)]
    pub length: Option<Length>,
}

#[derive(serde::Serialize, serde::Deserialize, ToSchema, Debug, PartialEq)]
pub struct BuzzifyResp {
    pub result: String,
    pub used_free_request: bool,
    pub free_requests_remaining: u32,
}

#[derive(serde::Serialize, serde::Deserialize, ToSchema, Debug)]
pub struct ProfileView {
    pub id: String,
    pub email: Option<String>,
    pub has_api_key: bool,
    pub free_requests_used: u32,
    pub free_requests_remaining: u32,
    pub free_requests_limit: u32,
    pub resets_at: DateTime<Utc>,
}

#[derive(serde::Deserialize, serde::Serialize, ToSchema, Debug)]
pub struct SaveApiKeyReq {
    /// Empty or null clears the saved key.
    pub api_key: Option<String>,
}
