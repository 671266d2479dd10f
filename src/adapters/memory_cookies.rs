use crate::core::consent_store::COOKIE_DATE_FORMAT;
use crate::domain::ports::CookieJar;
use chrono::{DateTime, NaiveDateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub same_site: Option<String>,
    pub secure: bool,
    pub expires: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = StoredCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path: None,
            domain: None,
            same_site: None,
            secure: false,
            expires: None,
        };

        for attribute in parts {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                continue;
            }
            let (key, value) = match attribute.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (attribute, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(value.to_string()),
                "domain" => cookie.domain = Some(value.to_string()),
                "samesite" => cookie.same_site = Some(value.to_string()),
                "secure" => cookie.secure = true,
                "expires" => {
                    cookie.expires = NaiveDateTime::parse_from_str(value, COOKIE_DATE_FORMAT)
                        .ok()
                        .map(|naive| naive.and_utc())
                }
                _ => {}
            }
        }

        Some(cookie)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|expires| expires <= now).unwrap_or(false)
    }
}

/// In-memory `document.cookie`: expired writes delete, everything else upserts by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    cookies: Vec<StoredCookie>,
    writes: Vec<String>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the jar from a `name=value; other=value` header.
    pub fn with_header(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(StoredCookie::parse)
            .collect();
        Self {
            cookies,
            writes: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StoredCookie> {
        self.cookies.iter().find(|cookie| cookie.name == name)
    }

    /// Every raw string written so far.
    pub fn writes(&self) -> &[String] {
        &self.writes
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn write(&mut self, cookie: &str) {
        self.writes.push(cookie.to_string());

        let Some(parsed) = StoredCookie::parse(cookie) else {
            tracing::debug!("Ignoring malformed cookie string: {}", cookie);
            return;
        };

        self.cookies.retain(|existing| existing.name != parsed.name);
        if !parsed.is_expired(Utc::now()) {
            self.cookies.push(parsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_header() {
        let mut jar = MemoryCookieJar::new();
        jar.write("im_demo=1; Expires=Fri, 01 Jan 2100 00:00:00 GMT; Path=/; SameSite=Lax");
        jar.write("other=abc; Path=/");

        assert_eq!(jar.cookie_header(), "im_demo=1; other=abc");
        let stored = jar.get("im_demo").unwrap();
        assert_eq!(stored.path.as_deref(), Some("/"));
        assert_eq!(stored.same_site.as_deref(), Some("Lax"));
        assert!(stored.expires.is_some());
    }

    #[test]
    fn test_past_expiry_deletes() {
        let mut jar = MemoryCookieJar::with_header("im_demo=1");
        jar.write("im_demo=; Path=/; Expires=Thu, 01 Jan 1970 00:00:01 GMT");

        assert!(jar.get("im_demo").is_none());
        assert_eq!(jar.cookie_header(), "");
        assert_eq!(jar.writes().len(), 1);
    }

    #[test]
    fn test_secure_flag_is_recorded() {
        let mut jar = MemoryCookieJar::new();
        jar.write("im_demo=1; Path=/; Domain=example.org; Secure");

        let stored = jar.get("im_demo").unwrap();
        assert!(stored.secure);
        assert_eq!(stored.domain.as_deref(), Some("example.org"));
    }
}
