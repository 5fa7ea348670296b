//! Configuration for the object framework
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (objects.toml)
//! - Environment variables (OBJECTS__*)
//!
//! ## Example config file (objects.toml):
//! ```toml
//! [[registry.pins]]
//! object = "AuditTemplate"
//! version = "1.0"
//!
//! [gateway]
//! boundary = "remote"
//! notify = true
//!
//! [storage]
//! default_page_size = 50
//! max_page_size = 1000
//!
//! [logging]
//! filter = "versioned_objects=debug"
//! format = "compact"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::context::{Boundary, RequestContext};
use crate::error::Result;
use crate::version::ObjectVersion;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectsConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Version pinning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Object versions this process understands. Unpinned types use the
    /// latest registered version.
    #[serde(default)]
    pub pins: Vec<VersionPin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPin {
    pub object: String,
    pub version: String,
}

/// Gateway behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Boundary stamped on contexts built from this configuration
    #[serde(default)]
    pub boundary: Boundary,

    /// Publish lifecycle events through the log notifier
    #[serde(default = "default_true")]
    pub notify: bool,
}

/// Listing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Limit applied when a listing does not set one
    #[serde(default)]
    pub default_page_size: Option<usize>,

    /// Upper bound on any listing limit
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_true() -> bool {
    true
}

fn default_max_page_size() -> usize {
    1000
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            boundary: Boundary::InProcess,
            notify: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_page_size: None,
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::Pretty,
        }
    }
}

impl ObjectsConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["objects.toml", ".objects.toml", "config/objects.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "versioned-objects", "objects") {
            let xdg_config = dirs.config_dir().join("objects.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // OBJECTS__STORAGE__MAX_PAGE_SIZE=10
        builder = builder.add_source(
            Environment::with_prefix("OBJECTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Parsed version pins
    pub fn version_pins(&self) -> Result<BTreeMap<String, ObjectVersion>> {
        self.registry
            .pins
            .iter()
            .map(|pin| Ok((pin.object.clone(), ObjectVersion::parse(&pin.version)?)))
            .collect()
    }

    /// A fresh request context carrying the configured pins and boundary
    pub fn context(&self) -> Result<RequestContext> {
        let mut ctx = RequestContext::new().with_boundary(self.gateway.boundary);
        ctx.version_pins = self.version_pins()?;
        Ok(ctx)
    }
}
