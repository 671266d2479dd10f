use crate::domain::deferred::Deferred;
use crate::domain::ports::{Dom, ElementId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub const DEFAULT_COOKIE_PREFIX: &str = "im_";
pub const DEFAULT_COOKIE_PATH: &str = "/";
pub const DEFAULT_EXPIRATION_DAYS: u32 = 182;

/// Shared, caller-supplied hook. Cloning shares the same closure.
pub struct Callback<F: ?Sized>(pub(crate) Rc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Builds the live embed inside the placeholder and hands it back later.
pub type AcceptHook = Callback<dyn Fn(&mut dyn Dom, ElementId) -> Deferred<ElementId>>;
/// Receives the live embed (or the placeholder when none exists) and removes it.
pub type RejectHook = Callback<dyn Fn(&mut dyn Dom, ElementId)>;
/// Called with the resource id and the iframe once a built-in iframe loads.
pub type IframeLoadHook = Callback<dyn Fn(&str, ElementId)>;
/// Resolves the thumbnail URL for a resource id.
pub type ThumbnailResolver = Callback<dyn Fn(&str) -> Deferred<String>>;
pub type ChangeCallback = Callback<dyn Fn(&ChangeEvent)>;

impl AcceptHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut dyn Dom, ElementId) -> Deferred<ElementId> + 'static,
    {
        Self(Rc::new(hook))
    }
}

impl RejectHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut dyn Dom, ElementId) + 'static,
    {
        Self(Rc::new(hook))
    }
}

impl IframeLoadHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&str, ElementId) + 'static,
    {
        Self(Rc::new(hook))
    }
}

impl ThumbnailResolver {
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&str) -> Deferred<String> + 'static,
    {
        Self(Rc::new(resolver))
    }
}

impl ChangeCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        Self(Rc::new(callback))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageStrings {
    /// Trusted markup, inserted as-is.
    pub notice: String,
    pub load_btn: Option<String>,
    pub load_all_btn: Option<String>,
}

impl LanguageStrings {
    pub fn new(notice: impl Into<String>) -> Self {
        Self {
            notice: notice.into(),
            load_btn: None,
            load_all_btn: None,
        }
    }

    pub fn with_load_btn(mut self, text: impl Into<String>) -> Self {
        self.load_btn = Some(text.into());
        self
    }

    pub fn with_load_all_btn(mut self, text: impl Into<String>) -> Self {
        self.load_all_btn = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: Option<String>,
    pub path: Option<String>,
    /// Falls back to the page hostname at write time.
    pub domain: Option<String>,
    pub same_site: Option<SameSite>,
    /// `Some(0)` writes a session cookie.
    pub expiration_days: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct IframeConfig {
    pub params: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub onload: Option<IframeLoadHook>,
}

#[derive(Debug, Clone)]
pub enum ThumbnailSource {
    /// URL with an optional `{data-id}` token.
    Template(String),
    Resolver(ThumbnailResolver),
}

/// How the live embed gets built once consent is given.
#[derive(Debug, Clone, Default)]
pub enum EmbedProvider {
    #[default]
    BuiltinIframe,
    Custom(AcceptHook),
}

#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: String,
    pub embed_url: Option<String>,
    pub iframe: IframeConfig,
    pub embed: EmbedProvider,
    pub on_reject: Option<RejectHook>,
    pub thumbnail: Option<ThumbnailSource>,
    pub cookie: CookieConfig,
    /// Declaration order matters: the first entry is the fallback.
    pub languages: Vec<(String, LanguageStrings)>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            embed_url: None,
            iframe: IframeConfig::default(),
            embed: EmbedProvider::BuiltinIframe,
            on_reject: None,
            thumbnail: None,
            cookie: CookieConfig::default(),
            languages: Vec::new(),
        }
    }

    pub fn with_embed_url(mut self, url: impl Into<String>) -> Self {
        self.embed_url = Some(url.into());
        self
    }

    pub fn with_language(mut self, code: impl Into<String>, strings: LanguageStrings) -> Self {
        self.languages.push((code.into(), strings));
        self
    }

    pub fn with_iframe_params(mut self, params: impl Into<String>) -> Self {
        self.iframe.params = Some(params.into());
        self
    }

    pub fn with_iframe_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.iframe.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_iframe_onload(mut self, hook: IframeLoadHook) -> Self {
        self.iframe.onload = Some(hook);
        self
    }

    pub fn with_on_accept(mut self, hook: AcceptHook) -> Self {
        self.embed = EmbedProvider::Custom(hook);
        self
    }

    pub fn with_on_reject(mut self, hook: RejectHook) -> Self {
        self.on_reject = Some(hook);
        self
    }

    pub fn with_thumbnail(mut self, source: ThumbnailSource) -> Self {
        self.thumbnail = Some(source);
        self
    }

    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn cookie_name(&self) -> String {
        self.cookie
            .name
            .clone()
            .unwrap_or_else(|| format!("{}{}", DEFAULT_COOKIE_PREFIX, self.name))
    }

    pub fn has_language(&self, code: &str) -> bool {
        self.languages.iter().any(|(c, _)| c == code)
    }

    /// Strings for `code`, or the first declared language.
    pub fn strings(&self, code: Option<&str>) -> Option<&LanguageStrings> {
        code.and_then(|code| {
            self.languages
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, s)| s)
        })
        .or_else(|| self.languages.first().map(|(_, s)| s))
    }
}

/// One matched `data-service` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRecord {
    pub index: usize,
    pub element: ElementId,
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnail_preload: bool,
    pub params: Option<String>,
    /// `data-iframe-*` pairs with the prefix stripped.
    pub iframe_attributes: Vec<(String, String)>,
    /// Nested `[data-placeholder]` element; embeds land here when present.
    pub container: Option<ElementId>,
    /// Top-level nodes of the notice fragment, for teardown on re-run.
    pub fragment: Vec<ElementId>,
    pub background: Option<ElementId>,
    pub embed: Option<ElementId>,
    pub has_embed: bool,
    pub has_notice: bool,
    pub notice_visible: bool,
}

impl PlaceholderRecord {
    pub fn new(index: usize, element: ElementId) -> Self {
        Self {
            index,
            element,
            id: None,
            title: None,
            thumbnail: None,
            thumbnail_preload: false,
            params: None,
            iframe_attributes: Vec::new(),
            container: None,
            fragment: Vec::new(),
            background: None,
            embed: None,
            has_embed: false,
            has_notice: false,
            notice_visible: true,
        }
    }

    pub fn embed_container(&self) -> ElementId {
        self.container.unwrap_or(self.element)
    }
}

/// Accepted/rejected flag per service, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConsentState {
    services: Vec<(String, bool)>,
}

impl ConsentState {
    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn seed(&mut self, service: &str, accepted: bool) {
        match self.services.iter_mut().find(|(name, _)| name == service) {
            Some(entry) => entry.1 = accepted,
            None => self.services.push((service.to_string(), accepted)),
        }
    }

    pub fn is_accepted(&self, service: &str) -> bool {
        self.services
            .iter()
            .any(|(name, accepted)| name == service && *accepted)
    }

    /// Returns true when the stored value actually flipped.
    pub fn set(&mut self, service: &str, accepted: bool) -> bool {
        match self.services.iter_mut().find(|(name, _)| name == service) {
            Some(entry) if entry.1 == accepted => false,
            Some(entry) => {
                entry.1 = accepted;
                true
            }
            None => {
                self.services.push((service.to_string(), accepted));
                accepted
            }
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            services: self.services.iter().cloned().collect(),
            accepted_services: self
                .services
                .iter()
                .filter(|(_, accepted)| *accepted)
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub services: BTreeMap<String, bool>,
    pub accepted_services: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Click,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    pub service: String,
    pub action: ConsentAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_source: EventSource,
    pub changed_services: Vec<String>,
}

/// Target of `accept_service` / `reject_service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSelector {
    All,
    Named(String),
}

impl ServiceSelector {
    pub fn label(&self) -> &str {
        match self {
            ServiceSelector::All => "all",
            ServiceSelector::Named(name) => name,
        }
    }
}

impl From<&str> for ServiceSelector {
    fn from(value: &str) -> Self {
        if value == "all" {
            ServiceSelector::All
        } else {
            ServiceSelector::Named(value.to_string())
        }
    }
}

impl From<String> for ServiceSelector {
    fn from(value: String) -> Self {
        ServiceSelector::from(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_name_defaults_to_prefixed_service() {
        let service = ServiceDefinition::new("youtube");
        assert_eq!(service.cookie_name(), "im_youtube");

        let named = ServiceDefinition::new("youtube").with_cookie(CookieConfig {
            name: Some("cc_youtube".to_string()),
            ..CookieConfig::default()
        });
        assert_eq!(named.cookie_name(), "cc_youtube");
    }

    #[test]
    fn test_strings_fall_back_to_first_language() {
        let service = ServiceDefinition::new("maps")
            .with_language("fr", LanguageStrings::new("Bonjour"))
            .with_language("en", LanguageStrings::new("Hello"));

        assert_eq!(service.strings(Some("en")).unwrap().notice, "Hello");
        assert_eq!(service.strings(Some("de")).unwrap().notice, "Bonjour");
        assert_eq!(service.strings(None).unwrap().notice, "Bonjour");
    }

    #[test]
    fn test_consent_state_reports_flips_only() {
        let mut state = ConsentState::default();
        state.seed("a", false);
        state.seed("b", true);

        assert!(state.set("a", true));
        assert!(!state.set("a", true));
        assert!(state.set("b", false));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.accepted_services, vec!["a".to_string()]);
        assert_eq!(snapshot.services.get("b"), Some(&false));
    }

    #[test]
    fn test_selector_from_str() {
        assert_eq!(ServiceSelector::from("all"), ServiceSelector::All);
        assert_eq!(
            ServiceSelector::from("vimeo"),
            ServiceSelector::Named("vimeo".to_string())
        );
    }

    #[test]
    fn test_change_event_serializes_in_wire_shape() {
        let event = ChangeEvent {
            event_source: EventSource {
                kind: TriggerKind::Click,
                service: "demo".to_string(),
                action: ConsentAction::Accept,
            },
            changed_services: vec!["demo".to_string()],
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "eventSource": {"type": "click", "service": "demo", "action": "accept"},
                "changedServices": ["demo"]
            })
        );
    }
}
