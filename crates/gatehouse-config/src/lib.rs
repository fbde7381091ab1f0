//! Configuration system for the gatehouse authenticating proxy.
//!
//! Provides TOML-based configuration with:
//! - A file schema whose every section is optional ([`GatehouseConfig`])
//! - Discovery of `./gatehouse.toml` or an explicit path
//! - Validation into immutable runtime settings ([`ValidatedConfig`])
//!
//! Every configuration problem is reported here, at startup, never while
//! serving requests.

pub mod discovery;
pub mod error;
pub mod types;
pub mod validate;

pub use discovery::{LoadedConfig, load_config, load_config_file};
pub use error::{ConfigError, Result};
pub use types::*;
pub use validate::{CALLBACK_PATH, ValidatedConfig, ValidatedProvider};
