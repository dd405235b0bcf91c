// Library exports for the CLI and integration tests

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod upload_pipeline;
pub mod validation;
