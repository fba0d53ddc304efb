//! 核心编排层：错误与恢复、账号状态机、循环调度

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod state;

pub use error::{ChatError, CycleError, RecoveryAction};
pub use orchestrator::{handle_account, AccountChatOrchestrator, ExchangeSettings};
pub use recovery::RecoveryEngine;
pub use scheduler::{CycleReport, CycleScheduler, ScheduleSettings};
pub use state::{AccountPhase, AccountReport, RunContext, StopReason, Termination};
