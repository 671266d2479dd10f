pub mod error;
pub mod logger;
pub mod poll;
pub mod validation;
