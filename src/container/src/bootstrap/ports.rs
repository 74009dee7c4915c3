/// Port-role resolution for the reverse proxy
use crate::provisioner::ProvisionError;

/// The four ports the proxy publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Http,
    Https,
    Api,
    Debugger,
}

impl PortRole {
    pub const ALL: [PortRole; 4] = [
        PortRole::Http,
        PortRole::Https,
        PortRole::Api,
        PortRole::Debugger,
    ];

    /// Documented default
    pub fn default_port(&self) -> u16 {
        match self {
            PortRole::Http => 80,
            PortRole::Https => 443,
            PortRole::Api => 5000,
            PortRole::Debugger => 9003,
        }
    }

    /// Environment variable that overrides this role
    pub fn env_var(&self) -> &'static str {
        match self {
            PortRole::Http => "DEVSTACK_HTTP_PORT",
            PortRole::Https => "DEVSTACK_HTTPS_PORT",
            PortRole::Api => "DEVSTACK_API_PORT",
            PortRole::Debugger => "DEVSTACK_DEBUGGER_PORT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortRole::Http => "http",
            PortRole::Https => "https",
            PortRole::Api => "api",
            PortRole::Debugger => "debugger",
        }
    }
}

/// Resolved ports for every role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBindings {
    pub http: u16,
    pub https: u16,
    pub api: u16,
    pub debugger: u16,
}

impl Default for PortBindings {
    fn default() -> Self {
        Self {
            http: PortRole::Http.default_port(),
            https: PortRole::Https.default_port(),
            api: PortRole::Api.default_port(),
            debugger: PortRole::Debugger.default_port(),
        }
    }
}

impl PortBindings {
    pub fn get(&self, role: PortRole) -> u16 {
        match role {
            PortRole::Http => self.http,
            PortRole::Https => self.https,
            PortRole::Api => self.api,
            PortRole::Debugger => self.debugger,
        }
    }

    /// All four ports in role order
    pub fn to_vec(&self) -> Vec<u16> {
        PortRole::ALL.iter().map(|r| self.get(*r)).collect()
    }

    /// Resolve from the process environment
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve each role: a set override wins over the default; a
    /// non-numeric override fails for that role.
    pub fn resolve<F>(lookup: F) -> Result<Self, ProvisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = |role: PortRole| -> Result<u16, ProvisionError> {
            match lookup(role.env_var()) {
                None => Ok(role.default_port()),
                Some(value) if value.trim().is_empty() => Ok(role.default_port()),
                Some(value) => value.trim().parse::<u16>().map_err(|_| ProvisionError::Port {
                    role: role.as_str().to_string(),
                    value,
                }),
            }
        };

        Ok(Self {
            http: port(PortRole::Http)?,
            https: port(PortRole::Https)?,
            api: port(PortRole::Api)?,
            debugger: port(PortRole::Debugger)?,
        })
    }
}
