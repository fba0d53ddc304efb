//! 远端接口的响应结构
//!
//! 所有响应都是 `{ message, data, detail }` 信封；成功与否看 HTTP 状态码加 message 字符串，
//! 两者都要检查。形状不符时返回 ServiceError::UnexpectedShape。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::{ChatSession, Persona, ServiceError};

pub const DATA_CREATED: &str = "Data created correctly";
pub const DATA_GOT: &str = "Data got correctly";

/// 服务端 id 有时是数字有时是字符串，统一转为字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl RemoteId {
    pub fn into_string(self) -> String {
        match self {
            RemoteId::Number(n) => n.to_string(),
            RemoteId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl<T> Envelope<T> {
    /// 要求 message 与 marker 完全一致且 data 存在
    pub fn expect_message(self, marker: &str) -> Result<T, ServiceError> {
        match self.message.as_deref() {
            Some(m) if m == marker => self
                .data
                .ok_or_else(|| ServiceError::UnexpectedShape("missing data".to_string())),
            other => Err(ServiceError::Rejected(
                other.unwrap_or("<no message>").to_string(),
            )),
        }
    }

    /// 只检查 message，不关心 data
    pub fn check_message(&self, marker: &str) -> Result<(), ServiceError> {
        match self.message.as_deref() {
            Some(m) if m == marker => Ok(()),
            other => Err(ServiceError::Rejected(
                other.unwrap_or("<no message>").to_string(),
            )),
        }
    }

    /// 只要求 data 存在（列表类接口不带固定 message）
    pub fn into_data(self) -> Result<T, ServiceError> {
        self.data
            .ok_or_else(|| ServiceError::UnexpectedShape("missing data".to_string()))
    }
}

/// detail 可能是字符串，也可能是校验错误数组；统一转成可读文本
pub fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub tg_id: &'a str,
    pub tg_username: &'a str,
    pub name: &'a str,
    pub language: &'a str,
    pub gender: &'a str,
    pub gender_preferences: &'a str,
    pub start_code: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateChatRequest<'a> {
    pub waifu_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a str,
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PersonaDto {
    pub id: RemoteId,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl From<PersonaDto> for Persona {
    fn from(dto: PersonaDto) -> Self {
        Persona {
            id: dto.id.into_string(),
            slug: dto.slug,
            title: dto.title,
            description: dto.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PersonaPage {
    #[serde(default)]
    pub items: Vec<PersonaDto>,
}

#[derive(Debug, Deserialize)]
pub struct PersonaRef {
    pub id: RemoteId,
}

#[derive(Debug, Deserialize)]
pub struct ChatDto {
    pub id: RemoteId,
    #[serde(default)]
    pub waifu: Option<PersonaRef>,
    #[serde(default)]
    pub waifu_id: Option<RemoteId>,
}

impl ChatDto {
    /// 缺少角色引用的会话无法匹配，返回 None
    pub fn into_session(self, account_id: &str) -> Option<ChatSession> {
        let persona_id = self.waifu.map(|w| w.id).or(self.waifu_id)?;
        Some(ChatSession {
            id: self.id.into_string(),
            account_id: account_id.to_string(),
            persona_id: persona_id.into_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedRef {
    pub id: RemoteId,
}

#[derive(Debug, Deserialize)]
pub struct MessageStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MessageStatus {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_message_requires_exact_marker() {
        let env: Envelope<CreatedRef> =
            serde_json::from_str(r#"{"message":"Data created with warning","data":{"id":1}}"#)
                .unwrap();
        let err = env.expect_message(DATA_CREATED).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(m) if m == "Data created with warning"));

        let env: Envelope<CreatedRef> =
            serde_json::from_str(r#"{"message":"Data created correctly","data":{"id":"c-9"}}"#)
                .unwrap();
        assert_eq!(env.expect_message(DATA_CREATED).unwrap().id.into_string(), "c-9");
    }

    #[test]
    fn test_expect_message_missing_data() {
        let env: Envelope<CreatedRef> =
            serde_json::from_str(r#"{"message":"Data created correctly"}"#).unwrap();
        assert!(matches!(
            env.expect_message(DATA_CREATED),
            Err(ServiceError::UnexpectedShape(_))
        ));
    }

    #[test]
    fn test_chat_dto_reads_nested_or_flat_persona() {
        let nested: ChatDto = serde_json::from_str(r#"{"id":10,"waifu":{"id":3}}"#).unwrap();
        let session = nested.into_session("42").unwrap();
        assert_eq!(session.id, "10");
        assert_eq!(session.persona_id, "3");
        assert_eq!(session.account_id, "42");

        let flat: ChatDto = serde_json::from_str(r#"{"id":"x","waifu_id":"p"}"#).unwrap();
        assert_eq!(flat.into_session("42").unwrap().persona_id, "p");

        let orphan: ChatDto = serde_json::from_str(r#"{"id":1}"#).unwrap();
        assert!(orphan.into_session("42").is_none());
    }

    #[test]
    fn test_detail_text() {
        assert_eq!(detail_text(&Value::String("no gems".into())), "no gems");
        let arr: Value = serde_json::from_str(r#"[{"msg":"bad"}]"#).unwrap();
        assert!(detail_text(&arr).contains("bad"));
    }
}
