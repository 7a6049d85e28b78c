//! Configuration loading from files and environment variables.

use config::{Config, Environment, File, FileFormat};

use crate::error::{ServiceError, ServiceResult};

use super::ServiceConfig;

/// Load configuration from `config.*` (optional) and `PDF_REGION__*` env vars.
pub fn load_config() -> ServiceResult<ServiceConfig> {
    build(
        Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("PDF_REGION")
                    .separator("__")
                    .try_parsing(true),
            ),
    )
}

/// Load configuration from an in-memory TOML document.
pub fn load_config_from(toml: &str) -> ServiceResult<ServiceConfig> {
    build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
}

fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> ServiceResult<ServiceConfig> {
    let config: ServiceConfig = builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    config
        .validate()
        .map_err(|message| ServiceError::Config { message })?;

    Ok(config)
}
