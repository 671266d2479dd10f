use crate::adapters::{ManualEventLoop, MemoryCookieJar, MemoryDom};
use crate::config::ManagerConfig;
use crate::core::registry::CONTAINER_ATTRIBUTE;
use crate::domain::model::{
    CookieConfig, LanguageStrings, SameSite, ServiceDefinition, ThumbnailSource,
};
use crate::utils::error::{ConsentError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_range, validate_unique_names, validate_url_template,
    Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub curr_lang: String,
    #[serde(default)]
    pub auto_lang: bool,
    /// Array of tables so declaration order survives parsing.
    #[serde(default)]
    pub services: Vec<TomlService>,
    pub page: Option<PageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlService {
    pub name: String,
    pub embed_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub iframe: Option<TomlIframe>,
    pub cookie: Option<TomlCookie>,
    #[serde(default)]
    pub languages: Vec<TomlLanguage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlIframe {
    pub params: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlCookie {
    pub name: Option<String>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub same_site: Option<SameSite>,
    pub expiration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlLanguage {
    pub code: String,
    pub notice: String,
    pub load_btn: Option<String>,
    pub load_all_btn: Option<String>,
}

/// A headless page for the CLI: location, navigator language, the incoming
/// cookie header and the placeholders in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub language: Option<String>,
    #[serde(default)]
    pub cookies: String,
    #[serde(default = "default_intersection")]
    pub intersection: bool,
    #[serde(default)]
    pub placeholders: Vec<TomlPlaceholder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlPlaceholder {
    pub service: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub params: Option<String>,
    #[serde(default)]
    pub thumbnail_preload: bool,
    /// Adds a nested `[data-placeholder]` child for the embed.
    #[serde(default)]
    pub container: bool,
    /// Written as `data-iframe-<name>` attributes.
    #[serde(default)]
    pub iframe: BTreeMap<String, String>,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_protocol() -> String {
    "https:".to_string()
}

fn default_intersection() -> bool {
    true
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed)?)
    }

    /// Replaces `${VAR}` with the environment value; unknown names stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConsentError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("curr_lang", &self.curr_lang)?;
        validate_unique_names("services", self.services.iter().map(|s| s.name.as_str()))?;

        for service in &self.services {
            let prefix = format!("services.{}", service.name);
            validate_non_empty_string("services.name", &service.name)?;

            match &service.embed_url {
                Some(url) => validate_url_template(&format!("{}.embed_url", prefix), url)?,
                None => {
                    return Err(ConsentError::MissingConfigError {
                        field: format!("{}.embed_url", prefix),
                    })
                }
            }
            if let Some(url) = &service.thumbnail_url {
                validate_url_template(&format!("{}.thumbnail_url", prefix), url)?;
            }

            if service.languages.is_empty() {
                return Err(ConsentError::config(format!(
                    "service '{}' must declare at least one language",
                    service.name
                )));
            }
            validate_unique_names(
                &format!("{}.languages", prefix),
                service.languages.iter().map(|l| l.code.as_str()),
            )?;
            for language in &service.languages {
                validate_non_empty_string(&format!("{}.languages.code", prefix), &language.code)?;
            }

            if let Some(days) = service.cookie.as_ref().and_then(|c| c.expiration_days) {
                validate_range(&format!("{}.cookie.expiration_days", prefix), days, 0, 36_500)?;
            }
        }

        if let Some(page) = &self.page {
            if !matches!(page.protocol.as_str(), "http:" | "https:") {
                return Err(ConsentError::invalid_value(
                    "page.protocol",
                    &page.protocol,
                    "Expected 'http:' or 'https:'",
                ));
            }
            for placeholder in &page.placeholders {
                if !self.services.iter().any(|s| s.name == placeholder.service) {
                    tracing::warn!(
                        "Placeholder references undeclared service '{}'",
                        placeholder.service
                    );
                }
            }
        }

        Ok(())
    }

    /// Runtime configuration. Hooks cannot be expressed in TOML, so every
    /// service uses the built-in iframe.
    pub fn to_manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(&self.curr_lang).with_auto_lang(self.auto_lang);

        for entry in &self.services {
            let mut service = ServiceDefinition::new(&entry.name);
            service.embed_url = entry.embed_url.clone();
            service.thumbnail = entry.thumbnail_url.clone().map(ThumbnailSource::Template);

            if let Some(iframe) = &entry.iframe {
                service.iframe.params = iframe.params.clone();
                service.iframe.attributes = iframe.attributes.clone();
            }
            if let Some(cookie) = &entry.cookie {
                service.cookie = CookieConfig {
                    name: cookie.name.clone(),
                    path: cookie.path.clone(),
                    domain: cookie.domain.clone(),
                    same_site: cookie.same_site,
                    expiration_days: cookie.expiration_days,
                };
            }
            for language in &entry.languages {
                let strings = LanguageStrings {
                    notice: language.notice.clone(),
                    load_btn: language.load_btn.clone(),
                    load_all_btn: language.load_all_btn.clone(),
                };
                service = service.with_language(&language.code, strings);
            }

            config = config.with_service(service);
        }

        config
    }

    /// Builds the in-memory document, cookie jar and event loop described by
    /// `[page]`. Without one, an empty localhost page is used.
    pub fn page_runtime(&self) -> (MemoryDom, MemoryCookieJar, ManualEventLoop) {
        let Some(page) = &self.page else {
            return (MemoryDom::default(), MemoryCookieJar::new(), ManualEventLoop::new());
        };

        let mut dom = MemoryDom::new(&page.hostname, &page.protocol);
        if let Some(language) = &page.language {
            dom = dom.with_language(language);
        }
        for placeholder in &page.placeholders {
            add_placeholder(&mut dom, placeholder);
        }

        let events = if page.intersection {
            ManualEventLoop::new()
        } else {
            ManualEventLoop::without_intersection()
        };
        (dom, MemoryCookieJar::with_header(&page.cookies), events)
    }
}

fn add_placeholder(dom: &mut MemoryDom, placeholder: &TomlPlaceholder) {
    use crate::domain::ports::Dom;

    let mut attributes: Vec<(String, String)> = Vec::new();
    let optional = [
        ("data-id", &placeholder.id),
        ("data-title", &placeholder.title),
        ("data-thumbnail", &placeholder.thumbnail),
        ("data-params", &placeholder.params),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            attributes.push((name.to_string(), value.clone()));
        }
    }
    if placeholder.thumbnail_preload {
        attributes.push(("data-thumbnailpreload".to_string(), String::new()));
    }
    for (name, value) in &placeholder.iframe {
        attributes.push((format!("data-iframe-{}", name), value.clone()));
    }

    let borrowed: Vec<(&str, &str)> = attributes
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let element = dom.add_placeholder(&placeholder.service, &borrowed);

    if placeholder.container {
        let container = dom.create_element("div");
        dom.set_attribute(container, CONTAINER_ATTRIBUTE, "");
        dom.append_child(element, container);
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CookieJar, Dom};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
curr_lang = "en"
auto_lang = true

[[services]]
name = "video"
embed_url = "https://video.test/embed/{data-id}"
thumbnail_url = "https://img.video.test/{data-id}.jpg"

[services.iframe]
params = "autoplay=1"
attributes = { allow = "fullscreen" }

[services.cookie]
same_site = "Strict"
expiration_days = 30

[[services.languages]]
code = "en"
notice = "Hosted by <b>video.test</b>"
load_btn = "Load once"
load_all_btn = "Always load"

[[services.languages]]
code = "it"
notice = "Ospitato da video.test"

[[services]]
name = "maps"
embed_url = "https://maps.test/?q={data-id}"

[[services.languages]]
code = "en"
notice = "Map provided by maps.test"
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.curr_lang, "en");
        assert!(config.auto_lang);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].name, "video");
        assert_eq!(config.services[0].languages[1].code, "it");
        assert!(config.page.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_manager_config_keeps_order_and_settings() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap().to_manager_config();

        let names: Vec<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["video", "maps"]);

        let video = config.service("video").unwrap();
        assert_eq!(video.iframe.params.as_deref(), Some("autoplay=1"));
        assert_eq!(video.iframe.attributes.get("allow").map(String::as_str), Some("fullscreen"));
        assert_eq!(video.cookie.same_site, Some(SameSite::Strict));
        assert_eq!(video.cookie.expiration_days, Some(30));
        assert!(matches!(video.thumbnail, Some(ThumbnailSource::Template(_))));
        assert_eq!(
            video.strings(Some("en")).unwrap().load_all_btn.as_deref(),
            Some("Always load")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("EMBED_CONSENT_TEST_HOST", "video.test");

        let content = r#"
curr_lang = "en"

[[services]]
name = "video"
embed_url = "https://${EMBED_CONSENT_TEST_HOST}/embed/{data-id}"

[[services.languages]]
code = "en"
notice = "${EMBED_CONSENT_UNSET_VARIABLE}"
"#;

        let config = TomlConfig::from_toml_str(content).unwrap();
        assert_eq!(
            config.services[0].embed_url.as_deref(),
            Some("https://video.test/embed/{data-id}")
        );
        assert_eq!(
            config.services[0].languages[0].notice,
            "${EMBED_CONSENT_UNSET_VARIABLE}"
        );

        std::env::remove_var("EMBED_CONSENT_TEST_HOST");
    }

    #[test]
    fn test_config_validation() {
        let relative = r#"
curr_lang = "en"

[[services]]
name = "video"
embed_url = "/embed/{data-id}"

[[services.languages]]
code = "en"
notice = "n"
"#;
        let config = TomlConfig::from_toml_str(relative).unwrap();
        assert!(config.validate().is_err());

        let no_languages = r#"
curr_lang = "en"

[[services]]
name = "video"
embed_url = "https://video.test/{data-id}"
"#;
        let config = TomlConfig::from_toml_str(no_languages).unwrap();
        assert!(config.validate().is_err());

        let bad_same_site = r#"
curr_lang = "en"

[[services]]
name = "video"
embed_url = "https://video.test/{data-id}"

[services.cookie]
same_site = "sometimes"
"#;
        assert!(matches!(
            TomlConfig::from_toml_str(bad_same_site),
            Err(ConsentError::TomlError(_))
        ));
    }

    #[test]
    fn test_page_runtime_builds_document() {
        let content = format!(
            r#"{}
[page]
hostname = "www.site.test"
language = "it-IT"
cookies = "im_video=1; theme=dark"

[[page.placeholders]]
service = "video"
id = "abc"
title = "Intro"
container = true
iframe = {{ allowfullscreen = "true" }}

[[page.placeholders]]
service = "maps"
id = "Rome"
"#,
            BASIC
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_ok());

        let (dom, cookies, _events) = config.page_runtime();
        let videos = dom.query_placeholders("video");
        assert_eq!(videos.len(), 1);
        assert_eq!(dom.attribute(videos[0], "data-id").as_deref(), Some("abc"));
        assert_eq!(
            dom.attribute(videos[0], "data-iframe-allowfullscreen").as_deref(),
            Some("true")
        );
        assert!(dom.query_child(videos[0], CONTAINER_ATTRIBUTE).is_some());
        assert_eq!(dom.location().protocol, "https:");
        assert_eq!(dom.browser_language().as_deref(), Some("it-IT"));
        assert!(cookies.cookie_header().contains("im_video=1"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.services[1].name, "maps");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            TomlConfig::from_file("/nonexistent/embed-consent.toml"),
            Err(ConsentError::IoError(_))
        ));
    }
}
