use crate::adapters::{ManualEventLoop, MemoryCookieJar, MemoryDom};
use crate::core::IframeManager;
use crate::domain::model::StateSnapshot;
use crate::domain::ports::Dom;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, Validate};
use clap::Parser;
use serde::Serialize;

/// Runs a configured page headlessly and prints the outcome as JSON.
#[derive(Parser, Debug, Clone)]
#[command(name = "embed-consent")]
#[command(about = "Consent-gated embed loader, driven headlessly from a TOML page description")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "embed-consent.toml")]
    pub config: String,

    /// Services to accept after run ("all" for every service)
    #[arg(long, value_delimiter = ',')]
    pub accept: Vec<String>,

    /// Services to reject after accepting ("all" for every service)
    #[arg(long, value_delimiter = ',')]
    pub reject: Vec<String>,

    /// Scroll every placeholder into view and run the resulting activations
    #[arg(long)]
    pub reveal: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub json_logs: bool,
}

impl Validate for CliArgs {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("config", &self.config)?;
        for name in self.accept.iter().chain(&self.reject) {
            validate_non_empty_string("service", name)?;
        }
        Ok(())
    }
}

pub type HeadlessManager = IframeManager<MemoryDom, MemoryCookieJar, ManualEventLoop>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub language: Option<String>,
    pub state: StateSnapshot,
    pub cookies: Vec<String>,
    pub placeholders: Vec<PlaceholderReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderReport {
    pub service: String,
    pub index: usize,
    pub id: Option<String>,
    pub notice_visible: bool,
    pub embedded: bool,
    pub embed_src: Option<String>,
}

impl RunReport {
    pub fn collect(manager: &HeadlessManager) -> Self {
        let dom = manager.dom();
        let placeholders = manager
            .get_config()
            .map(|config| {
                config
                    .services
                    .iter()
                    .flat_map(|service| manager.registry().records(&service.name))
                    .map(|record| PlaceholderReport {
                        service: dom
                            .attribute(record.element, "data-service")
                            .unwrap_or_default(),
                        index: record.index,
                        id: record.id.clone(),
                        notice_visible: record.notice_visible,
                        embedded: record.has_embed,
                        embed_src: record.embed.and_then(|embed| dom.attribute(embed, "src")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            language: manager.current_language().map(str::to_string),
            state: manager.get_state(),
            cookies: manager.cookies().writes().to_vec(),
            placeholders,
        }
    }
}
