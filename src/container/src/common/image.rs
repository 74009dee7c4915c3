/// Image references used by the engine
use serde::{Deserialize, Serialize};

/// Repository for the environment-wide reverse proxy
pub const PROXY_REPOSITORY: &str = "docker.io/devstack/proxy";

/// Repository for site web containers; tagged `<version>-dev`
pub const SITE_REPOSITORY: &str = "docker.io/devstack/nginx";

/// Image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Full image reference (e.g., "docker.io/library/composer:2")
    pub reference: String,

    /// Registry host, when the first path segment looks like one
    pub registry: Option<String>,

    /// Repository path without registry or tag
    pub name: String,

    /// Tag (defaults to "latest")
    pub tag: String,
}

impl ImageReference {
    /// Parse image reference string
    pub fn parse(reference: &str) -> Result<Self, String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err("empty image reference".to_string());
        }

        // A ':' after the last '/' is a tag; before it, a registry port.
        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match reference[last_slash..].rsplit_once(':') {
            Some((_, tag)) if tag.is_empty() => {
                return Err(format!("empty tag in image reference: {}", reference))
            }
            Some((_, tag)) => (&reference[..reference.len() - tag.len() - 1], tag),
            None => (reference, "latest"),
        };

        let (registry, name) = match repository.split_once('/') {
            Some((reg, img)) if reg.contains('.') || reg.contains(':') || reg == "localhost" => {
                (Some(reg.to_string()), img.to_string())
            }
            _ => (None, repository.to_string()),
        };

        Ok(Self {
            reference: reference.to_string(),
            registry,
            name,
            tag: tag.to_string(),
        })
    }

    /// Reference of the proxy image for an engine version
    pub fn proxy(version: &str) -> Self {
        Self::tagged(PROXY_REPOSITORY, version)
    }

    /// Reference of the site image for a runtime version tag (e.g., "8.2")
    pub fn site(version: &str) -> Self {
        Self::tagged(SITE_REPOSITORY, &format!("{}-dev", version))
    }

    /// Reference of a tool image on Docker Hub's library namespace
    pub fn tool(tool: &str, version: &str) -> Self {
        Self::tagged(&format!("docker.io/library/{}", tool), version)
    }

    fn tagged(repository: &str, tag: &str) -> Self {
        let (registry, name) = match repository.split_once('/') {
            Some((reg, img)) if reg.contains('.') => (Some(reg.to_string()), img.to_string()),
            _ => (None, repository.to_string()),
        };
        Self {
            reference: format!("{}:{}", repository, tag),
            registry,
            name,
            tag: tag.to_string(),
        }
    }

    /// Repository part including the registry, as expected by a pull
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}
