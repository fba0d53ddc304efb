//! 账号编排器：单个账号的状态机
//!
//! Authenticating -> SelectingPersona -> ResolvingSession -> Exchanging -> Terminated。
//! 所有账号级错误在这里被吸收为 AccountReport，不会传到调度器。

use std::time::Duration;

use crate::account::{AccountIdentity, UserDefaults};
use crate::config::ChatSection;
use crate::core::{AccountPhase, AccountReport, ChatError, RunContext, StopReason, Termination};
use crate::memory::{Speaker, Transcript};
use crate::reply::ReplyGenerator;
use crate::service::{ChatService, ChatSession, Persona, SendError, ServiceFactory};

/// 自动对话参数
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub opening_message: String,
    /// None 表示不限轮数
    pub max_turns: Option<usize>,
    /// 每轮之间的等待；None 表示不等待
    pub message_delay: Option<Duration>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        ExchangeSettings::from(&ChatSection::default())
    }
}

impl From<&ChatSection> for ExchangeSettings {
    fn from(chat: &ChatSection) -> Self {
        Self {
            opening_message: chat.opening_message.clone(),
            max_turns: chat.turn_limit(),
            message_delay: chat.message_delay(),
        }
    }
}

/// 带数据的内部状态
enum State {
    Authenticating,
    SelectingPersona,
    ResolvingSession(Persona),
    Exchanging {
        persona: Persona,
        session: ChatSession,
        reused: bool,
    },
}

impl State {
    fn phase(&self) -> AccountPhase {
        match self {
            State::Authenticating => AccountPhase::Authenticating,
            State::SelectingPersona => AccountPhase::SelectingPersona,
            State::ResolvingSession(_) => AccountPhase::ResolvingSession,
            State::Exchanging { .. } => AccountPhase::Exchanging,
        }
    }
}

struct ExchangeOutcome {
    reason: StopReason,
    exchanges: usize,
    transcript: Transcript,
}

pub struct AccountChatOrchestrator<'a> {
    service: &'a dyn ChatService,
    generator: &'a ReplyGenerator,
    context: &'a RunContext,
    settings: &'a ExchangeSettings,
}

impl<'a> AccountChatOrchestrator<'a> {
    pub fn new(
        service: &'a dyn ChatService,
        generator: &'a ReplyGenerator,
        context: &'a RunContext,
        settings: &'a ExchangeSettings,
    ) -> Self {
        Self {
            service,
            generator,
            context,
            settings,
        }
    }

    /// 驱动账号直到终止状态
    pub async fn run(&self, identity: &AccountIdentity) -> AccountReport {
        let name = identity.display_name.as_str();
        let mut state = State::Authenticating;

        loop {
            let phase = state.phase();
            tracing::debug!(account = name, %phase, "enter phase");

            state = match state {
                State::Authenticating => {
                    if !self.service.authenticate(identity).await {
                        return AccountReport::failed(name, phase, ChatError::Auth);
                    }
                    State::SelectingPersona
                }
                State::SelectingPersona => {
                    tracing::info!(account = name, "Selecting pre-chosen AI...");
                    let slug = self.context.persona_slug();
                    match self.service.fetch_persona_detail(slug).await {
                        Some(persona) => State::ResolvingSession(persona),
                        None => {
                            return AccountReport::failed(
                                name,
                                phase,
                                ChatError::Selection(slug.to_string()),
                            )
                        }
                    }
                }
                State::ResolvingSession(persona) => match self.resolve_session(name, &persona).await {
                    Some((session, reused)) => State::Exchanging {
                        persona,
                        session,
                        reused,
                    },
                    None => return AccountReport::failed(name, phase, ChatError::Session),
                },
                State::Exchanging {
                    persona,
                    session,
                    reused,
                } => {
                    let outcome = self.exchange(name, &persona, &session).await;
                    tracing::info!(
                        account = name,
                        exchanges = outcome.exchanges,
                        "Chat ended: {}",
                        outcome.reason
                    );
                    return AccountReport {
                        account: name.to_string(),
                        messages_sent: outcome.transcript.human_messages(),
                        exchanges: outcome.exchanges,
                        reused_session: reused,
                        termination: Termination::Completed(outcome.reason),
                        transcript: outcome.transcript.into_turns(),
                    };
                }
            };
        }
    }

    /// 优先复用与所选角色匹配的已有会话，否则新建
    async fn resolve_session(&self, name: &str, persona: &Persona) -> Option<(ChatSession, bool)> {
        let existing = self
            .service
            .list_active_sessions()
            .await
            .into_iter()
            .find(|s| s.persona_id == persona.id);

        if let Some(session) = existing {
            tracing::info!(account = name, session = %session.id, "Using existing chat session.");
            return Some((session, true));
        }

        tracing::info!(account = name, "Creating new chat session...");
        let session = self.service.create_session(&persona.id).await?;
        tracing::info!(account = name, session = %session.id, "Chat session created successfully!");
        Some((session, false))
    }

    /// 自动对话：发送 -> 等待角色回复 -> 生成下一句，直到发送失败、生成失败或达到轮数上限
    async fn exchange(&self, name: &str, persona: &Persona, session: &ChatSession) -> ExchangeOutcome {
        let persona_context = persona.context();
        let mut transcript = Transcript::new();
        let mut exchanges = 0usize;
        let mut current = self.settings.opening_message.clone();

        let reason = loop {
            tracing::info!("[{}]: {}", name, current);
            transcript.push(Speaker::Human, current.as_str());

            let reply = match self.service.send_message(&session.id, &current).await {
                Ok(reply) => reply,
                Err(e) => {
                    if matches!(e, SendError::QuotaExhausted(_)) {
                        tracing::warn!(account = name, "=== Chat ended: Out of gems ===");
                    } else {
                        tracing::warn!(account = name, "Send failed: {}", e);
                    }
                    break StopReason::SendStopped(e);
                }
            };
            exchanges += 1;
            tracing::info!("[{}]: {}", persona.title, reply);
            transcript.push(Speaker::Persona, reply.as_str());

            if let Some(limit) = self.settings.max_turns {
                if exchanges >= limit {
                    break StopReason::TurnLimit(limit);
                }
            }

            match self.generator.generate_reply(&reply, &persona_context).await {
                Some(next) => current = next,
                None => break StopReason::GeneratorStopped,
            }

            if let Some(delay) = self.settings.message_delay {
                tokio::time::sleep(delay).await;
            }
        };

        ExchangeOutcome {
            reason,
            exchanges,
            transcript,
        }
    }
}

/// 处理一行原始账号数据：解析、建立客户端、跑状态机。任何失败都变成 Failed 报告
pub async fn handle_account(
    raw: &str,
    defaults: &UserDefaults,
    factory: &dyn ServiceFactory,
    generator: &ReplyGenerator,
    context: &RunContext,
    settings: &ExchangeSettings,
) -> AccountReport {
    let identity = match AccountIdentity::parse_with(raw, defaults) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!("Account processing error: {}", e);
            return AccountReport::failed("<unparsed>", AccountPhase::Authenticating, e.into());
        }
    };

    tracing::info!("Processing Account: {}", identity.display_name);

    let service = match factory.connect(&identity) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(account = %identity.display_name, "Account processing error: {}", e);
            return AccountReport::failed(
                identity.display_name.as_str(),
                AccountPhase::Authenticating,
                e.into(),
            );
        }
    };

    let report = AccountChatOrchestrator::new(service.as_ref(), generator, context, settings)
        .run(&identity)
        .await;

    match &report.termination {
        Termination::Completed(_) => {
            tracing::info!("Finished Processing Account: {}", identity.display_name)
        }
        Termination::Failed(phase, e) => {
            tracing::error!(account = %identity.display_name, %phase, "Account processing error: {}", e)
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::service::{MockChatService, MockServiceFactory};

    fn persona() -> Persona {
        Persona {
            id: "5".into(),
            slug: "behind-the-glas".into(),
            title: "Mira".into(),
            description: "a shy librarian".into(),
        }
    }

    fn identity() -> AccountIdentity {
        AccountIdentity::parse("user=%7B%22id%22%3A42%2C%22first_name%22%3A%22Ana%22%7D").unwrap()
    }

    fn settings(max_turns: Option<usize>) -> ExchangeSettings {
        ExchangeSettings {
            opening_message: "Hi!".into(),
            max_turns,
            message_delay: None,
        }
    }

    async fn run(
        service: &MockChatService,
        llm: Arc<MockLlmClient>,
        settings: &ExchangeSettings,
    ) -> AccountReport {
        let generator = ReplyGenerator::new(llm);
        let context = RunContext::new(persona());
        AccountChatOrchestrator::new(service, &generator, &context, settings)
            .run(&identity())
            .await
    }

    #[tokio::test]
    async fn test_auth_failure_skips_persona_selection() {
        let service = MockChatService::new()
            .with_auth(false)
            .with_personas(vec![persona()]);
        let llm = Arc::new(MockLlmClient::new());

        let report = run(&service, llm.clone(), &settings(None)).await;
        assert!(matches!(
            report.termination,
            Termination::Failed(AccountPhase::Authenticating, ChatError::Auth)
        ));
        assert_eq!(service.calls(), vec!["authenticate"]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_persona_fetch_failure() {
        let service = MockChatService::new();
        let report = run(&service, Arc::new(MockLlmClient::new()), &settings(None)).await;
        assert!(matches!(
            report.termination,
            Termination::Failed(AccountPhase::SelectingPersona, ChatError::Selection(ref s)) if s == "behind-the-glas"
        ));
        assert_eq!(service.count("list_active_sessions"), 0);
    }

    #[tokio::test]
    async fn test_reuses_matching_session() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_sessions(vec![
                ChatSession {
                    id: "other".into(),
                    account_id: "42".into(),
                    persona_id: "9".into(),
                },
                ChatSession {
                    id: "900".into(),
                    account_id: "42".into(),
                    persona_id: "5".into(),
                },
            ])
            .with_replies([None::<&str>]);

        let report = run(&service, Arc::new(MockLlmClient::new()), &settings(None)).await;
        assert!(report.reused_session);
        assert_eq!(service.count("create_session"), 0);
        assert!(report.termination.is_completed());
    }

    #[tokio::test]
    async fn test_creates_session_when_none_matches() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([None::<&str>]);

        let report = run(&service, Arc::new(MockLlmClient::new()), &settings(None)).await;
        assert!(!report.reused_session);
        assert_eq!(service.count("create_session"), 1);
    }

    #[tokio::test]
    async fn test_session_create_failure() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_create(false);

        let report = run(&service, Arc::new(MockLlmClient::new()), &settings(None)).await;
        assert!(matches!(
            report.termination,
            Termination::Failed(AccountPhase::ResolvingSession, ChatError::Session)
        ));
        assert_eq!(service.count("send_message"), 0);
    }

    #[tokio::test]
    async fn test_generator_stop_on_third_turn() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([Some("r1"), Some("r2"), Some("r3"), Some("r4")]);
        let llm = Arc::new(MockLlmClient::scripted([Some("m2"), Some("m3"), None]));

        let report = run(&service, llm.clone(), &settings(None)).await;
        assert!(matches!(
            report.termination,
            Termination::Completed(StopReason::GeneratorStopped)
        ));
        assert_eq!(report.exchanges, 3);
        assert_eq!(service.sent_messages(), vec!["Hi!", "m2", "m3"]);
        assert_eq!(llm.calls(), 3);
        assert_eq!(report.transcript.len(), 6);
    }

    #[tokio::test]
    async fn test_out_of_gems_is_graceful() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([Some("r1"), None]);
        let llm = Arc::new(MockLlmClient::scripted([Some("m2"), Some("m3")]));

        let report = run(&service, llm.clone(), &settings(None)).await;
        assert!(matches!(
            report.termination,
            Termination::Completed(StopReason::SendStopped(SendError::QuotaExhausted(_)))
        ));
        assert_eq!(report.exchanges, 1);
        assert_eq!(report.messages_sent, 2);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_turn_limit_stops_before_generating() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([Some("r1"), Some("r2"), Some("r3")]);
        let llm = Arc::new(MockLlmClient::scripted([Some("m2"), Some("m3"), Some("m4")]));

        let report = run(&service, llm.clone(), &settings(Some(2))).await;
        assert!(matches!(
            report.termination,
            Termination::Completed(StopReason::TurnLimit(2))
        ));
        assert_eq!(service.count("send_message"), 2);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_generator_receives_persona_context() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([Some("It is raining.")]);
        let llm = Arc::new(MockLlmClient::scripted([None::<&str>]));

        run(&service, llm.clone(), &settings(None)).await;
        let prompts = llm.prompts();
        assert!(prompts[0].contains("Mira: a shy librarian"));
        assert!(prompts[0].contains("It is raining."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_delay_is_applied_between_turns() {
        let service = MockChatService::new()
            .with_personas(vec![persona()])
            .with_replies([Some("r1"), Some("r2")]);
        let llm = Arc::new(MockLlmClient::scripted([Some("m2"), None]));
        let settings = ExchangeSettings {
            message_delay: Some(Duration::from_secs(2)),
            ..settings(None)
        };

        let start = tokio::time::Instant::now();
        run(&service, llm, &settings).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_handle_account_absorbs_parse_and_connect_errors() {
        let generator = ReplyGenerator::new(Arc::new(MockLlmClient::new()));
        let context = RunContext::new(persona());
        let factory = MockServiceFactory::new().refusing("42");

        let report = handle_account(
            "chat_instance=1",
            &UserDefaults::default(),
            &factory,
            &generator,
            &context,
            &settings(None),
        )
        .await;
        assert!(matches!(report.termination, Termination::Failed(_, ChatError::Parse(_))));

        let report = handle_account(
            "user=%7B%22id%22%3A42%2C%22first_name%22%3A%22Ana%22%7D",
            &UserDefaults::default(),
            &factory,
            &generator,
            &context,
            &settings(None),
        )
        .await;
        assert!(matches!(report.termination, Termination::Failed(_, ChatError::Connect(_))));
        assert_eq!(report.account, "Ana");
    }
}
