//! Session cookie parsing and formatting.

use http::header::{COOKIE, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use std::time::Duration;

pub const SESSION_COOKIE_NAME: &str = "FRAMEWORK_SESSIONID";

/// Finds the session token in the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Formats the `Set-Cookie` value for a new session.
pub fn set_cookie(id: &str, max_age: Duration) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={id}; Path=/; Max-Age={}; HttpOnly", max_age.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("lang=en; FRAMEWORK_SESSIONID=abc123; x=y"));

        assert_eq!(session_id(&headers), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_session_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("FRAMEWORK_SESSIONID="));
        assert_eq!(session_id(&headers), None);
    }

    #[test]
    fn formats_set_cookie() {
        let value = set_cookie("abc", Duration::from_secs(1800)).unwrap();
        assert_eq!(value, "FRAMEWORK_SESSIONID=abc; Path=/; Max-Age=1800; HttpOnly");
    }
}
