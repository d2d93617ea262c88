use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use hyper::header::{self, HeaderMap, HeaderValue};
use tracing::debug;

use panel_shared::types::server_config::CookieConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Case-insensitive; anything unrecognised is `Strict`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "lax" => SameSite::Lax,
            "none" => SameSite::None,
            _ => SameSite::Strict,
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

/// Builds and reads the session cookie.
#[derive(Debug, Clone)]
pub struct CookieService {
    name: String,
    secure: bool,
    http_only: bool,
    same_site: SameSite,
    max_age: Duration,
}

impl CookieService {
    pub fn new(config: &CookieConfig, max_age: Duration) -> Self {
        Self {
            name: config.name.clone(),
            secure: config.secure,
            http_only: config.http_only,
            same_site: SameSite::parse(&config.same_site),
            max_age,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    pub fn set_cookie(&self, token: &str) -> Result<HeaderValue> {
        self.build(token, self.max_age)
    }

    /// Empty value, expires immediately.
    pub fn clear_cookie(&self) -> Result<HeaderValue> {
        self.build("", Duration::ZERO)
    }

    /// Value of the session cookie, `None` when absent or empty.
    pub fn read_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .find_map(|cookie| {
                let (name, value) = cookie.trim().split_once('=')?;
                (name.trim() == self.name).then(|| value.trim().to_string())
            })
            .filter(|value| !value.is_empty())
    }

    fn build(&self, value: &str, max_age: Duration) -> Result<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Max-Age={}; Path=/",
            self.name,
            value,
            max_age.as_secs()
        );

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        if self.secure {
            cookie.push_str("; Secure");
        }

        cookie.push_str(&format!("; SameSite={}", self.same_site));

        debug!("Setting cookie: {}", self.name);
        HeaderValue::from_str(&cookie).map_err(|e| anyhow!("Invalid cookie value: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(same_site: &str, secure: bool) -> CookieService {
        let config = CookieConfig {
            name: "auth_token".to_string(),
            secure,
            http_only: true,
            same_site: same_site.to_string(),
        };
        CookieService::new(&config, Duration::from_secs(86_400))
    }

    #[test]
    fn same_site_parsing() {
        assert_eq!(SameSite::parse("LAX"), SameSite::Lax);
        assert_eq!(SameSite::parse("none"), SameSite::None);
        assert_eq!(SameSite::parse("strict"), SameSite::Strict);
        assert_eq!(SameSite::parse("bogus"), SameSite::Strict);
    }

    #[test]
    fn set_cookie_carries_all_attributes() {
        let value = service("lax", true).set_cookie("abc.def.ghi").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "auth_token=abc.def.ghi; Max-Age=86400; Path=/; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let value = service("strict", false).clear_cookie().unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "auth_token=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn read_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth_token=tok.en.value; other=1"),
        );
        assert_eq!(
            service("strict", true).read_cookie(&headers).as_deref(),
            Some("tok.en.value")
        );
    }

    #[test]
    fn empty_cookie_reads_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("auth_token="));
        assert_eq!(service("strict", true).read_cookie(&headers), None);
        assert_eq!(service("strict", true).read_cookie(&HeaderMap::new()), None);
    }
}
