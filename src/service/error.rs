//! 远端服务错误
//!
//! ServiceError 描述单次 HTTP 交互的失败（传输 / 状态码 / 业务拒绝 / 形状不符）；
//! SendError 是 send_message 的结果分类，编排器把任何 SendError 都视为对话自然结束。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {}", .detail.as_deref().unwrap_or("<no detail>"))]
    Status { status: u16, detail: Option<String> },

    #[error("Rejected by service: {0}")]
    Rejected(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("Invalid header value for {0}")]
    InvalidHeader(String),
}

impl ServiceError {
    /// 服务端明确表示余额（gems）不足
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            ServiceError::Status {
                detail: Some(detail),
                ..
            } => detail.to_lowercase().contains("enough gems"),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Out of gems: {0}")]
    QuotaExhausted(String),

    #[error("Send failed: {0}")]
    Service(#[from] ServiceError),

    #[error("No completed reply after {attempts} poll attempts")]
    PollExhausted { attempts: u32 },

    #[error("Polling aborted after {attempts} attempts: {source}")]
    PollAborted {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("Reply completed without text")]
    EmptyReply,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        let err = ServiceError::Status {
            status: 400,
            detail: Some("You don't have enough gems".to_string()),
        };
        assert!(err.is_quota_exhausted());

        let err = ServiceError::Status {
            status: 400,
            detail: Some("Chat not found".to_string()),
        };
        assert!(!err.is_quota_exhausted());
        assert!(!ServiceError::Rejected("x".into()).is_quota_exhausted());
    }

    #[test]
    fn test_status_display() {
        let err = ServiceError::Status {
            status: 503,
            detail: None,
        };
        assert_eq!(err.to_string(), "HTTP 503: <no detail>");
    }
}
