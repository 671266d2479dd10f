use crate::domain::model::{CookieConfig, ServiceDefinition, DEFAULT_COOKIE_PATH, DEFAULT_EXPIRATION_DAYS};
use crate::domain::ports::{CookieJar, Location};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

/// `Expires` format used by `Date.prototype.toUTCString`.
pub const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
pub const ERASED_EXPIRY: &str = "Thu, 01 Jan 1970 00:00:01 GMT";
const MILLIS_PER_DAY: i64 = 86_400_000;

/// True iff the service's cookie is present with any value.
pub fn get_consent<C: CookieJar>(jar: &C, service: &ServiceDefinition) -> bool {
    read_cookie(jar, &service.cookie_name()).is_some()
}

pub fn set_consent<C: CookieJar>(jar: &mut C, location: &Location, service: &ServiceDefinition) {
    let cookie = consent_cookie(&service.cookie_name(), &service.cookie, location, Utc::now());
    tracing::debug!("Writing consent cookie for '{}': {}", service.name, cookie);
    jar.write(&cookie);
}

pub fn clear_consent<C: CookieJar>(jar: &mut C, location: &Location, service: &ServiceDefinition) {
    let cookie = erase_cookie(&service.cookie_name(), &service.cookie, location);
    tracing::debug!("Erasing consent cookie for '{}'", service.name);
    jar.write(&cookie);
}

/// Value of the named cookie. An empty value counts as absent.
pub fn read_cookie<C: CookieJar>(jar: &C, name: &str) -> Option<String> {
    let pattern = format!(r"(?:^|;)\s*{}\s*=\s*([^;]+)", regex::escape(name));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Cannot build cookie matcher for '{}': {}", name, e);
            return None;
        }
    };

    let header = jar.cookie_header();
    re.captures(&header)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// The string written to grant consent. The domain is resolved against the
/// current location on every call.
pub fn consent_cookie(
    name: &str,
    config: &CookieConfig,
    location: &Location,
    now: DateTime<Utc>,
) -> String {
    let path = config.path.as_deref().unwrap_or(DEFAULT_COOKIE_PATH);
    let same_site = config.same_site.unwrap_or_default();
    let days = config.expiration_days.unwrap_or(DEFAULT_EXPIRATION_DAYS);

    let mut cookie = format!("{}=1", name);
    if days != 0 {
        let expires = now + TimeDelta::milliseconds(i64::from(days) * MILLIS_PER_DAY);
        cookie.push_str(&format!("; Expires={}", expires.format(COOKIE_DATE_FORMAT)));
    }
    cookie.push_str(&format!("; Path={}; SameSite={}", path, same_site));

    if let Some(domain) = domain_attribute(config, location) {
        cookie.push_str(&format!("; Domain={}", domain));
    }
    if location.is_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn erase_cookie(name: &str, config: &CookieConfig, location: &Location) -> String {
    let path = config.path.as_deref().unwrap_or(DEFAULT_COOKIE_PATH);
    let mut cookie = format!("{}=; Path={}", name, path);
    if let Some(domain) = domain_attribute(config, location) {
        cookie.push_str(&format!("; Domain={}", domain));
    }
    cookie.push_str(&format!("; Expires={}", ERASED_EXPIRY));
    cookie
}

/// Bare hostnames such as `localhost` reject an explicit Domain attribute.
fn domain_attribute(config: &CookieConfig, location: &Location) -> Option<String> {
    let domain = config
        .domain
        .clone()
        .unwrap_or_else(|| location.hostname.clone());
    domain.contains('.').then_some(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryCookieJar;
    use crate::domain::model::SameSite;
    use chrono::TimeZone;

    fn location(hostname: &str, protocol: &str) -> Location {
        Location {
            hostname: hostname.to_string(),
            protocol: protocol.to_string(),
        }
    }

    #[test]
    fn test_consent_cookie_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cookie = consent_cookie(
            "im_demo",
            &CookieConfig::default(),
            &location("localhost", "http:"),
            now,
        );

        assert_eq!(
            cookie,
            "im_demo=1; Expires=Mon, 01 Jul 2024 00:00:00 GMT; Path=/; SameSite=Lax"
        );
    }

    #[test]
    fn test_consent_cookie_with_domain_and_secure() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = CookieConfig {
            path: Some("/blog".to_string()),
            same_site: Some(SameSite::Strict),
            expiration_days: Some(1),
            ..CookieConfig::default()
        };
        let cookie = consent_cookie("cc_video", &config, &location("www.example.org", "https:"), now);

        assert_eq!(
            cookie,
            "cc_video=1; Expires=Tue, 02 Jan 2024 00:00:00 GMT; Path=/blog; SameSite=Strict; Domain=www.example.org; Secure"
        );
    }

    #[test]
    fn test_zero_expiration_writes_session_cookie() {
        let config = CookieConfig {
            expiration_days: Some(0),
            ..CookieConfig::default()
        };
        let cookie = consent_cookie("im_demo", &config, &location("localhost", "http:"), Utc::now());
        assert!(!cookie.contains("Expires"));
    }

    #[test]
    fn test_erase_cookie_expires_in_the_past() {
        let cookie = erase_cookie("im_demo", &CookieConfig::default(), &location("example.org", "https:"));
        assert_eq!(
            cookie,
            "im_demo=; Path=/; Domain=example.org; Expires=Thu, 01 Jan 1970 00:00:01 GMT"
        );
    }

    #[test]
    fn test_grant_and_clear_round_trip() {
        let service = ServiceDefinition::new("demo");
        let here = location("localhost", "http:");
        let mut jar = MemoryCookieJar::new();

        assert!(!get_consent(&jar, &service));
        set_consent(&mut jar, &here, &service);
        assert!(get_consent(&jar, &service));
        clear_consent(&mut jar, &here, &service);
        assert!(!get_consent(&jar, &service));
    }

    #[test]
    fn test_empty_cookie_value_is_not_consent() {
        let jar = MemoryCookieJar::with_header("theme=dark; im_demo=; lang=en");
        assert_eq!(read_cookie(&jar, "im_demo"), None);
        assert_eq!(read_cookie(&jar, "lang").as_deref(), Some("en"));
    }

    #[test]
    fn test_read_cookie_matches_whole_name() {
        let jar = MemoryCookieJar::with_header("xim_demo=1; im_demo2=1");
        assert_eq!(read_cookie(&jar, "im_demo"), None);
        assert_eq!(read_cookie(&jar, "im_demo2").as_deref(), Some("1"));
    }
}
