pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;

pub use adapters::{ManualEventLoop, MemoryCookieJar, MemoryDom};
pub use config::{toml_config::TomlConfig, ManagerConfig};
pub use core::IframeManager;
pub use domain::deferred::{Deferred, Resolver};
pub use domain::model::{
    AcceptHook, ChangeCallback, ChangeEvent, CookieConfig, IframeLoadHook, LanguageStrings,
    RejectHook, ServiceDefinition, ServiceSelector, StateSnapshot, ThumbnailResolver,
    ThumbnailSource,
};
pub use utils::error::{ConsentError, Result};
