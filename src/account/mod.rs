//! 账号层：凭据解析与账号文件读取

pub mod credential;
pub mod source;

pub use credential::{AccountIdentity, ParseError, UserDefaults, SIGNATURE_FIELDS};
pub use source::AccountSource;
