//! Server environment and security-header configuration.

use serde::Deserialize;

/// Deployment environment. Controls which hardening headers are
/// emitted; everything else in the core is environment-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

/// `Strict-Transport-Security` settings. Only rendered in production.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HstsConfig {
    pub max_age: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            max_age: 31_536_000,
            include_subdomains: true,
            preload: false,
        }
    }
}

impl HstsConfig {
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerConfig {
    pub environment: Environment,
    pub hsts: Option<HstsConfig>,
}

impl ServerConfig {
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            hsts: Some(HstsConfig::default()),
        }
    }

    /// The HSTS header to emit for this environment, if any.
    pub fn hsts_header(&self) -> Option<String> {
        if self.environment != Environment::Production {
            return None;
        }
        self.hsts.as_ref().map(HstsConfig::header_value)
    }
}
