/// Desired-state configuration: the environment and its sites
/// Sites are loaded from `<config dir>/<environment>.toml`
use crate::provisioner::ProvisionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment name used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Variable that overrides the default environment name
pub const ENVIRONMENT_ENV_VAR: &str = "DEVSTACK_DEFAULT_ENVIRONMENT";

/// Document root the site image serves without extra configuration
pub const DEFAULT_WEBROOT: &str = "web";

/// Sites file for an environment
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DevstackConfig {
    #[serde(default)]
    pub sites: Vec<SiteSpec>,
}

impl DevstackConfig {
    /// Load configuration from file; a missing file means no sites
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        if !path.exists() {
            tracing::warn!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: DevstackConfig = toml::from_str(&content).map_err(|e| {
            ProvisionError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        config.validate()?;

        tracing::info!(
            "Loaded {} site(s) from {}",
            config.sites.len(),
            path.display()
        );
        Ok(config)
    }

    /// Path of the sites file for `environment` under `config_dir`
    pub fn path_for(config_dir: &Path, environment: &str) -> PathBuf {
        config_dir.join(format!("{}.toml", environment))
    }

    /// Hostnames are the identity of a site and must be unique
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let mut seen = std::collections::HashSet::new();
        for site in &self.sites {
            if site.hostname.trim().is_empty() {
                return Err(ProvisionError::Config("site with empty hostname".to_string()));
            }
            if !seen.insert(site.hostname.as_str()) {
                return Err(ProvisionError::Config(format!(
                    "duplicate site hostname: {}",
                    site.hostname
                )));
            }
        }
        Ok(())
    }
}

/// One site's declared configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteSpec {
    /// Identity of the site within the environment
    pub hostname: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Runtime version tag (e.g. "8.2")
    pub version: String,

    /// Local working path; absolute, `~/`-prefixed, or relative to home
    pub path: String,

    /// Document-root subdirectory inside the site mount
    #[serde(default = "default_webroot")]
    pub dir: String,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_webroot() -> String {
    DEFAULT_WEBROOT.to_string()
}

impl SiteSpec {
    pub fn new(hostname: &str, version: &str, path: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            aliases: Vec::new(),
            version: version.to_string(),
            path: path.to_string(),
            dir: default_webroot(),
            env: BTreeMap::new(),
        }
    }

    /// Absolute local path of the site, resolved against `home`
    pub fn abs_path(&self, home: &Path) -> Result<PathBuf, ProvisionError> {
        let raw = self.path.trim();
        if raw.is_empty() {
            return Err(ProvisionError::Config(format!(
                "site {} has an empty path",
                self.hostname
            )));
        }

        let path = if raw == "~" {
            home.to_path_buf()
        } else if let Some(rest) = raw.strip_prefix("~/") {
            home.join(rest)
        } else {
            let p = PathBuf::from(raw);
            if p.is_absolute() {
                p
            } else {
                home.join(p)
            }
        };

        Ok(normalize(&path))
    }

    /// Whether the site needs a custom virtual host
    pub fn has_custom_webroot(&self) -> bool {
        self.dir != DEFAULT_WEBROOT
    }
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Environment name from an explicit value, the override variable, or the default
pub fn environment_name(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(ENVIRONMENT_ENV_VAR).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}
