//! 请求头：固定的浏览器头 + 每个账号的身份头
//!
//! 身份头（User-Data / auth_date / chat_instance / signature / hash）在构建客户端时生成一次，
//! 之后该账号的所有请求都带上。

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE,
    ORIGIN, PRAGMA, REFERER,
};

use crate::account::{AccountIdentity, SIGNATURE_FIELDS};
use crate::service::ServiceError;

pub const SITE_ORIGIN: &str = "https://app.vchars.ai";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0";

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "sec-ch-ua",
        "\"Microsoft Edge\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("chat_type", "channel"),
];

/// 与账号无关的固定头
pub fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("*/*"));
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    h.insert(ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
    h.insert(REFERER, HeaderValue::from_static("https://app.vchars.ai/chats"));
    for (name, value) in BROWSER_HEADERS {
        h.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    h
}

/// 固定头 + 账号身份头
pub fn account_headers(identity: &AccountIdentity) -> Result<HeaderMap, ServiceError> {
    let mut h = browser_headers();
    h.insert(
        HeaderName::from_static("user-data"),
        header_value("User-Data", identity.raw())?,
    );
    for field in SIGNATURE_FIELDS {
        h.insert(
            HeaderName::from_static(field),
            header_value(field, identity.signature_field(field))?,
        );
    }
    Ok(h)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ServiceError> {
    HeaderValue::from_str(value).map_err(|_| ServiceError::InvalidHeader(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_headers_carry_identity() {
        let raw = "user=%7B%22id%22%3A1%7D&auth_date=100&chat_instance=-5&signature=s&hash=h";
        let identity = AccountIdentity::parse(raw).unwrap();
        let headers = account_headers(&identity).unwrap();

        assert_eq!(headers.get("user-data").unwrap(), raw);
        assert_eq!(headers.get("auth_date").unwrap(), "100");
        assert_eq!(headers.get("chat_instance").unwrap(), "-5");
        assert_eq!(headers.get("signature").unwrap(), "s");
        assert_eq!(headers.get("hash").unwrap(), "h");
        assert_eq!(headers.get(ORIGIN).unwrap(), SITE_ORIGIN);
    }

    #[test]
    fn test_missing_signature_fields_sent_empty() {
        let identity = AccountIdentity::parse("user=%7B%22id%22%3A1%7D").unwrap();
        let headers = account_headers(&identity).unwrap();
        assert_eq!(headers.get("hash").unwrap(), "");
    }
}
