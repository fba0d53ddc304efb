//! 远端聊天服务：认证、角色列表/详情、会话列表/创建、发送消息并轮询回复
//!
//! ChatService 是编排器唯一依赖的网络接口；HttpChatService 为真实实现，每个账号一个实例。
//! 除 send_message 外，所有操作在失败时记录日志并返回 false / 空列表 / None，不向上抛错。

pub mod client;
pub mod error;
pub mod headers;
pub mod mock;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use crate::account::AccountIdentity;

pub use client::{HttpChatService, HttpServiceFactory, LoginProfile, PollSettings};
pub use error::{SendError, ServiceError};
pub use mock::{MockChatService, MockServiceFactory};

/// 可选的 AI 角色；一次运行内所有账号共用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
}

impl Persona {
    /// 交给回复生成器的角色上下文
    pub fn context(&self) -> String {
        format!("{}: {}", self.title, self.description)
    }
}

/// 一个账号与某个角色之间的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub account_id: String,
    pub persona_id: String,
}

/// 单个账号视角下的远端服务
#[async_trait]
pub trait ChatService: Send + Sync {
    /// 服务确认 "Data created correctly" 时返回 true
    async fn authenticate(&self, identity: &AccountIdentity) -> bool;

    async fn list_personas(&self, page: u32, page_size: u32) -> Vec<Persona>;

    async fn fetch_persona_detail(&self, slug: &str) -> Option<Persona>;

    async fn list_active_sessions(&self) -> Vec<ChatSession>;

    async fn create_session(&self, persona_id: &str) -> Option<ChatSession>;

    /// 发送消息并轮询直到回复完成；任何 Err 对调用方都意味着对话结束
    async fn send_message(&self, session_id: &str, text: &str) -> Result<String, SendError>;
}

#[async_trait]
impl<T: ChatService + ?Sized> ChatService for Arc<T> {
    async fn authenticate(&self, identity: &AccountIdentity) -> bool {
        (**self).authenticate(identity).await
    }

    async fn list_personas(&self, page: u32, page_size: u32) -> Vec<Persona> {
        (**self).list_personas(page, page_size).await
    }

    async fn fetch_persona_detail(&self, slug: &str) -> Option<Persona> {
        (**self).fetch_persona_detail(slug).await
    }

    async fn list_active_sessions(&self) -> Vec<ChatSession> {
        (**self).list_active_sessions().await
    }

    async fn create_session(&self, persona_id: &str) -> Option<ChatSession> {
        (**self).create_session(persona_id).await
    }

    async fn send_message(&self, session_id: &str, text: &str) -> Result<String, SendError> {
        (**self).send_message(session_id, text).await
    }
}

/// 为每个账号构建 ChatService（身份头在此时固定）
pub trait ServiceFactory: Send + Sync {
    fn connect(&self, identity: &AccountIdentity) -> Result<Box<dyn ChatService>, ServiceError>;
}
