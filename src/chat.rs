//! Wire types of the OpenAI-compatible chat completions API.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct Req<'a> {
    pub model: &'a str,
    pub messages: Vec<Msg<'a>>,
}

#[derive(Serialize, Debug)]
pub struct Msg<'a> {
    pub role: Role,
    pub content: &'a str,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Deserialize, Debug)]
pub struct Resp {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
pub struct Choice {
    pub message: RespMsg,
}

#[derive(Deserialize, Debug)]
pub struct RespMsg {
    pub content: Option<String>,
}

impl Resp {
    /// Trimmed content of the first choice, if it has any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()?
            .message
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
    }
}

#[derive(Deserialize, Debug)]
pub struct ErrorResp {
    pub error: ErrorDetail,
}

#[derive(Deserialize, Debug)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    pub code: Option<String>,
}
