#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::domain::model::{ChangeCallback, EmbedProvider, ServiceDefinition, ServiceSelector};
use crate::utils::error::{ConsentError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_unique_names, Validate};

/// Everything `IframeManager::run` needs.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub curr_lang: String,
    pub auto_lang: bool,
    pub on_change: Option<ChangeCallback>,
    /// Declaration order matters: the first service's language table drives
    /// language resolution.
    pub services: Vec<ServiceDefinition>,
}

impl ManagerConfig {
    pub fn new(curr_lang: impl Into<String>) -> Self {
        Self {
            curr_lang: curr_lang.into(),
            ..Self::default()
        }
    }

    pub fn with_auto_lang(mut self, auto_lang: bool) -> Self {
        self.auto_lang = auto_lang;
        self
    }

    pub fn with_on_change(mut self, callback: ChangeCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.services.push(service);
        self
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Services addressed by `selector`; unknown names select nothing.
    pub fn select<'a>(&'a self, selector: &'a ServiceSelector) -> impl Iterator<Item = &'a ServiceDefinition> + 'a {
        self.services.iter().filter(move |service| match selector {
            ServiceSelector::All => true,
            ServiceSelector::Named(name) => &service.name == name,
        })
    }
}

impl Validate for ManagerConfig {
    fn validate(&self) -> Result<()> {
        validate_unique_names("services", self.services.iter().map(|s| s.name.as_str()))?;

        for service in &self.services {
            validate_non_empty_string("services.name", &service.name)?;
            if service.name == "all" {
                return Err(ConsentError::invalid_value(
                    "services.name",
                    &service.name,
                    "'all' is reserved for bulk accept/reject",
                ));
            }

            if service.languages.is_empty() {
                return Err(ConsentError::config(format!(
                    "service '{}' must declare at least one language",
                    service.name
                )));
            }

            if matches!(service.embed, EmbedProvider::BuiltinIframe) && service.embed_url.is_none() {
                return Err(ConsentError::MissingConfigError {
                    field: format!("services.{}.embed_url", service.name),
                });
            }

            if let Some(name) = &service.cookie.name {
                validate_non_empty_string("cookie.name", name)?;
            }
            if let Some(days) = service.cookie.expiration_days {
                validate_range("cookie.expiration_days", days, 0, 36_500)?;
            }
        }

        Ok(())
    }
}
