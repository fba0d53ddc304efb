//! 账号凭据解析
//!
//! 每行账号数据是一段 URL query（`user=...&chat_instance=...&auth_date=...&hash=...`），
//! 其中 `user` 字段是再次 URL 编码的 JSON。解析结果为不可变的 AccountIdentity，
//! 原始字符串保留用于 `User-Data` 请求头。

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// 每次请求都要附带的签名字段（请求头名即字段名）
pub const SIGNATURE_FIELDS: [&str; 4] = ["auth_date", "chat_instance", "signature", "hash"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No user data found in credential string")]
    MissingUserField,

    #[error("Malformed user JSON: {0}")]
    MalformedJson(String),
}

/// 解析时缺省值来源（对应 config [user] 段）
#[derive(Debug, Clone)]
pub struct UserDefaults {
    pub language: String,
    pub start_code: String,
}

impl Default for UserDefaults {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            start_code: "marine_6944804952".to_string(),
        }
    }
}

impl From<&crate::config::UserSection> for UserDefaults {
    fn from(section: &crate::config::UserSection) -> Self {
        Self {
            language: section.default_language.clone(),
            start_code: section.default_start_code.clone(),
        }
    }
}

/// 单个账号身份，解析后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub external_id: String,
    pub display_name: String,
    pub language_code: String,
    pub chat_instance_token: String,
    pub start_code: String,
    /// auth_date / chat_instance / signature / hash；缺失的字段为空字符串
    pub auth_signature_fields: BTreeMap<String, String>,
    raw: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: UserId,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
}

impl AccountIdentity {
    /// 使用内置缺省值解析
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Self::parse_with(raw, &UserDefaults::default())
    }

    pub fn parse_with(raw: &str, defaults: &UserDefaults) -> Result<Self, ParseError> {
        let raw = raw.trim();
        let params: BTreeMap<String, String> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();

        let user_field = params
            .get("user")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ParseError::MissingUserField)?;

        let user: UserPayload = serde_json::from_str(&decode_user_json(user_field))
            .map_err(|e| ParseError::MalformedJson(e.to_string()))?;

        let external_id = match user.id {
            UserId::Number(n) => n.to_string(),
            UserId::Text(s) => s,
        };
        let display_name = user
            .first_name
            .filter(|s| !s.is_empty())
            .or(user.username)
            .unwrap_or_default();

        let auth_signature_fields = SIGNATURE_FIELDS
            .iter()
            .map(|k| (k.to_string(), params.get(*k).cloned().unwrap_or_default()))
            .collect();

        Ok(Self {
            external_id,
            display_name,
            language_code: user
                .language_code
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| defaults.language.clone()),
            chat_instance_token: params.get("chat_instance").cloned().unwrap_or_default(),
            start_code: params
                .get("start_param")
                .filter(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| defaults.start_code.clone()),
            auth_signature_fields,
            raw: raw.to_string(),
        })
    }

    /// 原始凭据字符串（作为 User-Data 请求头原样发送）
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn signature_field(&self, name: &str) -> &str {
        self.auth_signature_fields
            .get(name)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// query 解码后若仍是百分号编码的 JSON（如 `%7B...`），再解码一次
fn decode_user_json(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    match urlencoding::decode(trimmed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => trimmed.to_string(),
    }
}
