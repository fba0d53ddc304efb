//! Autochat - 多账号自动聊天机器人
//!
//! 模块划分：
//! - **account**: 账号来源文件与凭据解析
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 账号状态机、循环调度、错误与恢复
//! - **llm**: LLM 客户端抽象与实现（Groq / OpenAI 兼容 / Mock）
//! - **memory**: 对话消息与会话记录
//! - **reply**: 基于 LLM 的回复生成
//! - **service**: 远端聊天服务客户端
//! - **ui**: 终端角色选择与倒计时

pub mod account;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod reply;
pub mod service;
pub mod ui;
