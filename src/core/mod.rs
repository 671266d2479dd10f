pub mod consent_store;
pub mod embed;
pub mod manager;
pub mod notice;
pub mod registry;
pub mod scheduler;
pub mod thumbnail;

pub use manager::IframeManager;
pub use registry::Registry;
