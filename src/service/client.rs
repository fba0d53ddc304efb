//! 基于 reqwest 的 ChatService 实现
//!
//! 每个账号构建一个 Client，默认头里带上固定浏览器头与该账号的身份头；
//! 所有响应都解码为 Envelope，再按接口检查 message 标记。
//! send_message 发送后按固定间隔轮询 `/messages/text/{id}`，最多 max_attempts 次。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::account::AccountIdentity;
use crate::config::{ServiceSection, UserSection};
use crate::core::{RecoveryAction, RecoveryEngine};
use crate::service::headers::{account_headers, USER_AGENT};
use crate::service::types::{
    detail_text, AuthRequest, ChatDto, CreateChatRequest, CreatedRef, Envelope, MessageStatus,
    PersonaDto, PersonaPage, SendMessageRequest, DATA_CREATED, DATA_GOT,
};
use crate::service::{ChatService, ChatSession, Persona, SendError, ServiceError, ServiceFactory};

const AUTH_PATH: &str = "/auth/user";
const PERSONA_PATH: &str = "/waifu";
const PERSONA_DETAIL_PATH: &str = "/waifu/slug";
const CHAT_PATH: &str = "/chat";
const MESSAGE_PATH: &str = "/messages/text";

/// 登录时提交的默认资料
#[derive(Debug, Clone)]
pub struct LoginProfile {
    pub gender: String,
    pub gender_preferences: String,
}

impl From<&UserSection> for LoginProfile {
    fn from(section: &UserSection) -> Self {
        Self {
            gender: section.gender.clone(),
            gender_preferences: section.gender_preferences.clone(),
        }
    }
}

/// 回复轮询参数
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 100,
        }
    }
}

/// 单个账号的 HTTP 客户端
pub struct HttpChatService {
    client: Client,
    api_url: String,
    account_id: String,
    account_name: String,
    profile: LoginProfile,
    poll: PollSettings,
    recovery: RecoveryEngine,
}

impl HttpChatService {
    pub fn new(
        api_url: &str,
        timeout: Duration,
        identity: &AccountIdentity,
        profile: LoginProfile,
        poll: PollSettings,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(account_headers(identity)?)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            account_id: identity.external_id.clone(),
            account_name: identity.display_name.clone(),
            profile,
            poll,
            recovery: RecoveryEngine::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ServiceError> {
        let resp = self.client.get(self.url(path)).send().await?;
        decode_envelope(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ServiceError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        decode_envelope(resp).await
    }

    async fn try_authenticate(&self, identity: &AccountIdentity) -> Result<(), ServiceError> {
        let payload = AuthRequest {
            tg_id: &identity.external_id,
            tg_username: &identity.display_name,
            name: &identity.display_name,
            language: &identity.language_code,
            gender: &self.profile.gender,
            gender_preferences: &self.profile.gender_preferences,
            start_code: &identity.start_code,
        };
        let env: Envelope<Value> = self.post_json(AUTH_PATH, &payload).await?;
        env.check_message(DATA_CREATED)
    }

    async fn try_list_personas(&self, page: u32, page_size: u32) -> Result<Vec<Persona>, ServiceError> {
        let path = format!("{}?page={}&size={}", PERSONA_PATH, page, page_size);
        let page: PersonaPage = self.get_json(&path).await?.into_data()?;
        Ok(page.items.into_iter().map(Persona::from).collect())
    }

    async fn try_fetch_persona(&self, slug: &str) -> Result<Persona, ServiceError> {
        let path = format!("{}/{}", PERSONA_DETAIL_PATH, urlencoding::encode(slug));
        let dto: PersonaDto = self.get_json(&path).await?.expect_message(DATA_GOT)?;
        Ok(dto.into())
    }

    async fn try_list_sessions(&self) -> Result<Vec<ChatSession>, ServiceError> {
        let chats: Vec<ChatDto> = self.get_json(CHAT_PATH).await?.into_data()?;
        Ok(chats
            .into_iter()
            .filter_map(|c| c.into_session(&self.account_id))
            .collect())
    }

    async fn try_create_session(&self, persona_id: &str) -> Result<ChatSession, ServiceError> {
        let body = CreateChatRequest { waifu_id: persona_id };
        let created: CreatedRef = self
            .post_json(CHAT_PATH, &body)
            .await?
            .expect_message(DATA_CREATED)?;
        Ok(ChatSession {
            id: created.id.into_string(),
            account_id: self.account_id.clone(),
            persona_id: persona_id.to_string(),
        })
    }

    async fn fetch_message(&self, message_id: &str) -> Result<MessageStatus, ServiceError> {
        let path = format!("{}/{}", MESSAGE_PATH, message_id);
        self.get_json(&path).await?.into_data()
    }

    /// 轮询直到回复完成；暂时性错误计入尝试次数并继续，终止性错误立即返回
    async fn wait_for_reply(&self, message_id: &str) -> Result<String, SendError> {
        let max_attempts = self.poll.max_attempts;
        for attempt in 1..=max_attempts {
            match self.fetch_message(message_id).await {
                Ok(status) if status.is_completed() => {
                    tracing::debug!(account = %self.account_name, attempt, "reply completed");
                    return match status.message {
                        Some(text) if !text.trim().is_empty() => Ok(text),
                        _ => Err(SendError::EmptyReply),
                    };
                }
                Ok(status) => {
                    tracing::trace!(
                        account = %self.account_name,
                        attempt,
                        status = status.status.as_deref().unwrap_or("unknown"),
                        "reply pending"
                    );
                }
                Err(e) if e.is_quota_exhausted() => return Err(quota_error(e)),
                Err(e) => match self.recovery.handle(&e) {
                    RecoveryAction::RetryPoll => {
                        tracing::warn!(account = %self.account_name, attempt, "Transient poll error: {}", e);
                    }
                    RecoveryAction::Abort => {
                        return Err(SendError::PollAborted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                },
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }
        Err(SendError::PollExhausted {
            attempts: max_attempts,
        })
    }
}

fn quota_error(e: ServiceError) -> SendError {
    match e {
        ServiceError::Status {
            detail: Some(detail),
            ..
        } => SendError::QuotaExhausted(detail),
        other => SendError::QuotaExhausted(other.to_string()),
    }
}

async fn decode_envelope<T: DeserializeOwned>(resp: Response) -> Result<Envelope<T>, ServiceError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Envelope<Value>>(&body)
            .ok()
            .and_then(|env| env.detail)
            .map(|d| detail_text(&d));
        return Err(ServiceError::Status {
            status: status.as_u16(),
            detail,
        });
    }
    serde_json::from_str(&body).map_err(|e| ServiceError::UnexpectedShape(e.to_string()))
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn authenticate(&self, identity: &AccountIdentity) -> bool {
        match self.try_authenticate(identity).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(account = %self.account_name, "Login error: {}", e);
                false
            }
        }
    }

    async fn list_personas(&self, page: u32, page_size: u32) -> Vec<Persona> {
        tracing::info!("Fetching AI characters...");
        self.try_list_personas(page, page_size)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Get AI list error: {}", e);
                Vec::new()
            })
    }

    async fn fetch_persona_detail(&self, slug: &str) -> Option<Persona> {
        match self.try_fetch_persona(slug).await {
            Ok(persona) => Some(persona),
            Err(e) => {
                tracing::error!(account = %self.account_name, slug, "Select AI error: {}", e);
                None
            }
        }
    }

    async fn list_active_sessions(&self) -> Vec<ChatSession> {
        self.try_list_sessions().await.unwrap_or_else(|e| {
            tracing::error!(account = %self.account_name, "Get active chats error: {}", e);
            Vec::new()
        })
    }

    async fn create_session(&self, persona_id: &str) -> Option<ChatSession> {
        match self.try_create_session(persona_id).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(account = %self.account_name, "Create chat error: {}", e);
                None
            }
        }
    }

    async fn send_message(&self, session_id: &str, text: &str) -> Result<String, SendError> {
        let body = SendMessageRequest {
            chat_id: session_id,
            message: text,
        };
        let sent: CreatedRef = match self.post_json(MESSAGE_PATH, &body).await {
            Ok(env) => env.expect_message(DATA_CREATED)?,
            Err(e) if e.is_quota_exhausted() => return Err(quota_error(e)),
            Err(e) => return Err(e.into()),
        };
        self.wait_for_reply(&sent.id.into_string()).await
    }
}

/// 根据配置为每个账号创建 HttpChatService
#[derive(Debug, Clone)]
pub struct HttpServiceFactory {
    api_url: String,
    timeout: Duration,
    profile: LoginProfile,
    poll: PollSettings,
}

impl HttpServiceFactory {
    pub fn new(service: &ServiceSection, user: &UserSection) -> Self {
        Self {
            api_url: service.api_url.clone(),
            timeout: Duration::from_secs(service.request_timeout_secs),
            profile: LoginProfile::from(user),
            poll: PollSettings {
                interval: service.poll_interval(),
                max_attempts: service.poll_max_attempts,
            },
        }
    }
}

impl ServiceFactory for HttpServiceFactory {
    fn connect(&self, identity: &AccountIdentity) -> Result<Box<dyn ChatService>, ServiceError> {
        let service = HttpChatService::new(
            &self.api_url,
            self.timeout,
            identity,
            self.profile.clone(),
            self.poll,
        )?;
        Ok(Box::new(service))
    }
}
