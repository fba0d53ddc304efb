//! 状态定义：账号处理阶段、终止原因、运行上下文与处理报告
//!
//! RunContext 在调度器里创建一次（首次成功选择角色后），之后只以不可变引用传给每个账号的编排器。

use std::fmt;

use crate::core::ChatError;
use crate::memory::ConversationTurn;
use crate::service::{Persona, SendError};

/// 一次运行内所有账号共享的只读上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    persona: Persona,
}

impl RunContext {
    pub fn new(persona: Persona) -> Self {
        Self { persona }
    }

    pub fn persona_slug(&self) -> &str {
        &self.persona.slug
    }
}

/// 账号处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountPhase {
    Authenticating,
    SelectingPersona,
    ResolvingSession,
    Exchanging,
}

impl fmt::Display for AccountPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountPhase::Authenticating => "authenticating",
            AccountPhase::SelectingPersona => "selecting-persona",
            AccountPhase::ResolvingSession => "resolving-session",
            AccountPhase::Exchanging => "exchanging",
        };
        f.write_str(name)
    }
}

/// 对话正常结束的原因
#[derive(Debug)]
pub enum StopReason {
    /// 发送失败（余额不足、轮询超时、传输错误等）
    SendStopped(SendError),
    /// 回复生成器没有给出下一句
    GeneratorStopped,
    /// 达到配置的最大轮数
    TurnLimit(usize),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::SendStopped(SendError::QuotaExhausted(_)) => f.write_str("out of gems"),
            StopReason::SendStopped(e) => write!(f, "send stopped: {}", e),
            StopReason::GeneratorStopped => f.write_str("generator returned no reply"),
            StopReason::TurnLimit(n) => write!(f, "turn limit {} reached", n),
        }
    }
}

/// 终止状态
#[derive(Debug)]
pub enum Termination {
    Completed(StopReason),
    /// 失败发生的阶段与原因
    Failed(AccountPhase, ChatError),
}

impl Termination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed(_))
    }
}

/// 单个账号处理完成后的报告
#[derive(Debug)]
pub struct AccountReport {
    pub account: String,
    pub termination: Termination,
    /// 已完成的「发送 + 收到回复」次数
    pub exchanges: usize,
    /// 我方实际发送的消息数（含最后一次未收到回复的发送）
    pub messages_sent: usize,
    pub reused_session: bool,
    pub transcript: Vec<ConversationTurn>,
}

impl AccountReport {
    pub fn failed(account: impl Into<String>, phase: AccountPhase, err: ChatError) -> Self {
        Self {
            account: account.into(),
            termination: Termination::Failed(phase, err),
            exchanges: 0,
            messages_sent: 0,
            reused_session: false,
            transcript: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_display() {
        let reason = StopReason::SendStopped(SendError::QuotaExhausted("x".into()));
        assert_eq!(reason.to_string(), "out of gems");
        assert_eq!(StopReason::TurnLimit(5).to_string(), "turn limit 5 reached");
    }

    #[test]
    fn test_failed_report() {
        let report = AccountReport::failed("Ana", AccountPhase::Authenticating, ChatError::Auth);
        assert!(!report.termination.is_completed());
        assert!(matches!(
            report.termination,
            Termination::Failed(AccountPhase::Authenticating, ChatError::Auth)
        ));
    }
}
