//! 账号级与循环级错误，以及恢复动作
//!
//! ChatError 在编排器边界被吸收为 Termination::Failed；CycleError 由调度器捕获后进入重试等待。

use thiserror::Error;

use crate::account::ParseError;
use crate::service::ServiceError;

/// 单个账号处理失败的原因（只记录日志，不会中断调度器）
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid account data: {0}")]
    Parse(#[from] ParseError),

    #[error("Could not build client: {0}")]
    Connect(#[from] ServiceError),

    #[error("Login failed")]
    Auth,

    #[error("Failed to select AI '{0}'")]
    Selection(String),

    #[error("Failed to create new chat")]
    Session,
}

/// 整个循环级别的错误：触发缩短的重试等待
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("No accounts found in {0}")]
    NoAccounts(String),

    #[error("Error reading accounts: {0}")]
    AccountSource(#[from] std::io::Error),

    #[error("Failed to select initial AI: {0}")]
    PersonaSelection(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 暂时性错误：计入一次尝试，等待后继续轮询
    RetryPoll,
    /// 终止本次轮询
    Abort,
}
