//! 记忆层：LLM 消息格式与单次对话记录（不落盘）

pub mod conversation;

pub use conversation::{ConversationTurn, Message, Speaker, Transcript};
