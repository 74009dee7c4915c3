//! Identity labels.
//!
//! Labels attached at creation time are the only identity the engine trusts.
//! Names are a secondary guard because runtime name queries are fuzzy.

use std::collections::HashMap;

pub const PREFIX: &str = "dev.devstack";

/// Marks every resource created by this engine
pub const MANAGED: &str = "dev.devstack.managed";
/// Environment the resource belongs to
pub const ENVIRONMENT: &str = "dev.devstack.environment";
/// Role of the resource (see [`ResourceRole`])
pub const ROLE: &str = "dev.devstack.role";
/// Site hostname (site containers)
pub const HOST: &str = "dev.devstack.host";
/// Environment name on the proxy container
pub const PROXY: &str = "dev.devstack.proxy";
/// Engine version that created the proxy
pub const PROXY_VERSION: &str = "dev.devstack.proxy-version";
/// Network name on networks
pub const NETWORK: &str = "dev.devstack.network";
/// Volume name on environment volumes
pub const VOLUME: &str = "dev.devstack.volume";
/// Tool name on task containers and cache volumes
pub const TOOL: &str = "dev.devstack.tool";
/// Absolute working path on task containers and cache volumes
pub const PATH: &str = "dev.devstack.path";
/// Comma-separated env keys managed by the engine on a site container
pub const ENV_KEYS: &str = "dev.devstack.env-keys";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRole {
    Proxy,
    Site,
    Volume,
    Network,
    Task,
}

impl ResourceRole {
    pub fn as_label(&self) -> &'static str {
        match self {
            ResourceRole::Proxy => "proxy",
            ResourceRole::Site => "site",
            ResourceRole::Volume => "volume",
            ResourceRole::Network => "network",
            ResourceRole::Task => "task",
        }
    }
}

/// Builder for the fixed label set of a managed resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityLabels {
    labels: HashMap<String, String>,
}

impl IdentityLabels {
    pub fn new(role: ResourceRole) -> Self {
        let mut labels = HashMap::new();
        labels.insert(MANAGED.to_string(), "true".to_string());
        labels.insert(ROLE.to_string(), role.as_label().to_string());
        Self { labels }
    }

    pub fn network(environment: &str) -> Self {
        Self::new(ResourceRole::Network)
            .environment(environment)
            .with(NETWORK, environment)
    }

    pub fn volume(environment: &str) -> Self {
        Self::new(ResourceRole::Volume)
            .environment(environment)
            .with(VOLUME, environment)
    }

    pub fn proxy(environment: &str, version: &str) -> Self {
        Self::new(ResourceRole::Proxy)
            .environment(environment)
            .with(PROXY, environment)
            .with(PROXY_VERSION, version)
    }

    pub fn site(environment: &str, hostname: &str) -> Self {
        Self::new(ResourceRole::Site)
            .environment(environment)
            .with(HOST, hostname)
    }

    pub fn task(tool: &str, path: &str) -> Self {
        Self::new(ResourceRole::Task).with(TOOL, tool).with(PATH, path)
    }

    pub fn environment(self, environment: &str) -> Self {
        self.with(ENVIRONMENT, environment)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.labels
    }
}

/// Structured identity of a named resource: kind, exact name, creation labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
    pub labels: IdentityLabels,
}

impl ResourceKey {
    pub fn network(environment: &str) -> Self {
        Self {
            kind: ResourceKind::Network,
            name: environment.to_string(),
            labels: IdentityLabels::network(environment),
        }
    }

    pub fn volume(environment: &str) -> Self {
        Self {
            kind: ResourceKind::Volume,
            name: environment.to_string(),
            labels: IdentityLabels::volume(environment),
        }
    }
}

/// Attribute-free resources reconciled by create-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Volume,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Volume => write!(f, "volume"),
        }
    }
}
