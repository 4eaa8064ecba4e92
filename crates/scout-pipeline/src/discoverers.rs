//! Per-discoverer configuration blocks of a pipeline declaration.
//!
//! Interval-like fields are plain seconds. Optional fields are omitted when
//! serializing so `get` and `userconfig` render only what the operator set.

use scout_core::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the local listening-socket discoverer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetListenersConfig {
    /// Rescan interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Per-scan timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Configuration for the Docker container discoverer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Daemon address, e.g. `unix:///var/run/docker.sock`
    #[serde(default)]
    pub address: String,
    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl DockerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(ConfigError::missing_field("discoverer.docker.address").into());
        }
        Ok(())
    }
}

/// Configuration for one Kubernetes watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sConfig {
    /// Watched object role: `pod` or `service`
    #[serde(default)]
    pub role: String,
    /// Namespaces to watch; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Label/field selectors
    #[serde(default, skip_serializing_if = "K8sSelector::is_empty")]
    pub selector: K8sSelector,
    /// Pod-role options
    #[serde(default, skip_serializing_if = "K8sPodOptions::is_default")]
    pub pod: K8sPodOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sSelector {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
}

impl K8sSelector {
    fn is_empty(&self) -> bool {
        self.label.is_empty() && self.field.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct K8sPodOptions {
    /// Restrict discovery to pods on the local node
    #[serde(default)]
    pub local_mode: bool,
}

impl K8sPodOptions {
    fn is_default(&self) -> bool {
        !self.local_mode
    }
}

impl K8sConfig {
    pub fn validate(&self) -> Result<()> {
        match self.role.as_str() {
            "pod" | "service" => Ok(()),
            "" => Err(ConfigError::missing_field("discoverer.k8s.role").into()),
            other => Err(ConfigError::invalid_value(
                "discoverer.k8s.role",
                format!("unknown role '{other}'"),
            )
            .into()),
        }
    }
}

/// Configuration for the SNMP network discoverer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpConfig {
    /// Network rescan interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescan_interval: Option<u64>,
    /// Per-device timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// How long a responding device stays cached, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_cache_ttl: Option<u64>,
    /// Named credential sets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<SnmpCredentialConfig>,
    /// Subnets to scan, each referencing a credential by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<SnmpNetworkConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpCredentialConfig {
    pub name: String,
    /// SNMP version: `1`, `2c` or `3`
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_passphrase: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnmpNetworkConfig {
    /// Subnet in CIDR notation
    pub subnet: String,
    /// Name of the credential to use
    pub credential: String,
}

impl SnmpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            return Err(ConfigError::missing_field("discoverer.snmp.networks").into());
        }
        for cred in &self.credentials {
            if cred.name.is_empty() {
                return Err(ConfigError::missing_field("discoverer.snmp.credentials.name").into());
            }
            match cred.version.as_str() {
                "1" | "2c" | "3" => {}
                other => {
                    return Err(ConfigError::invalid_value(
                        "discoverer.snmp.credentials.version",
                        format!("unknown version '{other}'"),
                    )
                    .into())
                }
            }
        }
        for net in &self.networks {
            if net.subnet.is_empty() {
                return Err(ConfigError::missing_field("discoverer.snmp.networks.subnet").into());
            }
            if !self.credentials.iter().any(|c| c.name == net.credential) {
                return Err(ConfigError::invalid_value(
                    "discoverer.snmp.networks.credential",
                    format!("references undefined credential '{}'", net.credential),
                )
                .into());
            }
        }
        Ok(())
    }
}
