//! Mock 远端服务（用于测试，无需网络）
//!
//! MockChatService 按脚本返回结果并记录调用顺序；MockServiceFactory 按账号 id 分发 Mock 实例。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::account::AccountIdentity;
use crate::service::{ChatService, ChatSession, Persona, SendError, ServiceError, ServiceFactory};

pub struct MockChatService {
    auth_ok: bool,
    personas: Vec<Persona>,
    sessions: Vec<ChatSession>,
    create_ok: bool,
    replies: Mutex<VecDeque<Result<String, SendError>>>,
    calls: Mutex<Vec<&'static str>>,
    sent: Mutex<Vec<String>>,
}

impl Default for MockChatService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChatService {
    /// 默认：登录成功、无角色、无已有会话、创建会话成功、没有回复
    pub fn new() -> Self {
        Self {
            auth_ok: true,
            personas: Vec::new(),
            sessions: Vec::new(),
            create_ok: true,
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_auth(mut self, ok: bool) -> Self {
        self.auth_ok = ok;
        self
    }

    pub fn with_personas(mut self, personas: Vec<Persona>) -> Self {
        self.personas = personas;
        self
    }

    pub fn with_sessions(mut self, sessions: Vec<ChatSession>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_create(mut self, ok: bool) -> Self {
        self.create_ok = ok;
        self
    }

    /// Some(text) 为角色回复；None 模拟余额不足。脚本用完后返回 PollExhausted
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.replies.lock() {
            queue.extend(replies.into_iter().map(|r| match r {
                Some(text) => Ok(text.into()),
                None => Err(SendError::QuotaExhausted("You don't have enough gems".into())),
            }));
        }
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, call: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ChatService for MockChatService {
    async fn authenticate(&self, _identity: &AccountIdentity) -> bool {
        self.record("authenticate");
        self.auth_ok
    }

    async fn list_personas(&self, _page: u32, _page_size: u32) -> Vec<Persona> {
        self.record("list_personas");
        self.personas.clone()
    }

    async fn fetch_persona_detail(&self, slug: &str) -> Option<Persona> {
        self.record("fetch_persona_detail");
        self.personas.iter().find(|p| p.slug == slug).cloned()
    }

    async fn list_active_sessions(&self) -> Vec<ChatSession> {
        self.record("list_active_sessions");
        self.sessions.clone()
    }

    async fn create_session(&self, persona_id: &str) -> Option<ChatSession> {
        self.record("create_session");
        self.create_ok.then(|| ChatSession {
            id: format!("new-{}", persona_id),
            account_id: "mock".to_string(),
            persona_id: persona_id.to_string(),
        })
    }

    async fn send_message(&self, _session_id: &str, text: &str) -> Result<String, SendError> {
        self.record("send_message");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(Err(SendError::PollExhausted { attempts: 100 }))
    }
}

/// 按账号 external_id 分发 Mock 实例；未登记的账号使用 fallback
#[derive(Default)]
pub struct MockServiceFactory {
    services: HashMap<String, Arc<MockChatService>>,
    fallback: Option<Arc<MockChatService>>,
    refuse: HashSet<String>,
}

impl MockServiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, external_id: &str, service: Arc<MockChatService>) -> Self {
        self.services.insert(external_id.to_string(), service);
        self
    }

    pub fn with_fallback(mut self, service: Arc<MockChatService>) -> Self {
        self.fallback = Some(service);
        self
    }

    /// 对该账号 connect 直接失败
    pub fn refusing(mut self, external_id: &str) -> Self {
        self.refuse.insert(external_id.to_string());
        self
    }
}

impl ServiceFactory for MockServiceFactory {
    fn connect(&self, identity: &AccountIdentity) -> Result<Box<dyn ChatService>, ServiceError> {
        if self.refuse.contains(&identity.external_id) {
            return Err(ServiceError::InvalidHeader("User-Data".to_string()));
        }
        self.services
            .get(&identity.external_id)
            .or(self.fallback.as_ref())
            .map(|svc| Box::new(Arc::clone(svc)) as Box<dyn ChatService>)
            .ok_or_else(|| ServiceError::Rejected(format!("no mock for {}", identity.external_id)))
    }
}
