//! 错误恢复引擎
//!
//! 轮询回复状态时遇到错误，根据 ServiceError 类型决定继续轮询还是立即放弃：
//! 网络抖动、超时、5xx、429 视为暂时性错误；4xx、余额不足、业务拒绝、响应形状不符视为终止性错误。

use crate::core::RecoveryAction;
use crate::service::ServiceError;

/// 将轮询错误映射为可执行动作（继续轮询 / 终止）
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ServiceError) -> RecoveryAction {
        match err {
            ServiceError::Transport(e) if e.is_decode() || e.is_builder() => RecoveryAction::Abort,
            ServiceError::Transport(_) => RecoveryAction::RetryPoll,
            ServiceError::Status { .. } if err.is_quota_exhausted() => RecoveryAction::Abort,
            ServiceError::Status { status, .. } if *status >= 500 || *status == 429 => {
                RecoveryAction::RetryPoll
            }
            ServiceError::Status { .. } => RecoveryAction::Abort,
            ServiceError::Rejected(_)
            | ServiceError::UnexpectedShape(_)
            | ServiceError::InvalidHeader(_) => RecoveryAction::Abort,
        }
    }
}
