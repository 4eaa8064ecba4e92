//! Core data structures shared across the Scout workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A target-discovery strategy supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscovererKind {
    /// Local listening sockets
    NetListeners,
    /// Docker containers
    Docker,
    /// Kubernetes objects
    K8s,
    /// SNMP devices
    Snmp,
}

impl DiscovererKind {
    /// All supported discoverer kinds, in advertisement order.
    pub const ALL: [DiscovererKind; 4] = [
        DiscovererKind::NetListeners,
        DiscovererKind::Docker,
        DiscovererKind::K8s,
        DiscovererKind::Snmp,
    ];

    /// The wire name of this discoverer kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscovererKind::NetListeners => "net_listeners",
            DiscovererKind::Docker => "docker",
            DiscovererKind::K8s => "k8s",
            DiscovererKind::Snmp => "snmp",
        }
    }
}

impl fmt::Display for DiscovererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscovererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "net_listeners" => Ok(DiscovererKind::NetListeners),
            "docker" => Ok(DiscovererKind::Docker),
            "k8s" => Ok(DiscovererKind::K8s),
            "snmp" => Ok(DiscovererKind::Snmp),
            _ => Err(format!("Unknown discoverer type: {s}")),
        }
    }
}

/// Where a configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A `*.conf` file on disk
    File,
    /// The remote-configuration command channel
    Dyncfg,
}

impl SourceKind {
    /// Conflict-resolution priority. Higher wins; dyncfg outranks files.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::File => 4,
            SourceKind::Dyncfg => 8,
        }
    }

    /// The wire name of this source kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Dyncfg => "dyncfg",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an exposed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    /// Advertised, waiting for an activation decision
    Accepted,
    /// Its pipeline is running
    Running,
    /// Explicitly disabled by the operator
    Disabled,
    /// The last enable or restart attempt failed
    Failed,
}

impl ConfigStatus {
    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Accepted => "accepted",
            ConfigStatus::Running => "running",
            ConfigStatus::Disabled => "disabled",
            ConfigStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single discovered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Transport protocol (`tcp` or `udp`)
    pub protocol: String,
    /// Listen address
    pub address: String,
    /// Listen port
    pub port: u16,
    /// Owning process name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comm: Option<String>,
}

/// A batch of targets attributed to one discovery source.
///
/// An empty `targets` list is a retraction: the source no longer provides
/// any targets and the downstream consumer should drop what it previously
/// received under this source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Origin identifier used for targeted removal downstream
    pub source: String,
    /// Discovered targets; empty means removal
    pub targets: Vec<Target>,
}

impl TargetGroup {
    /// Creates a group carrying discovered targets.
    pub fn new(source: impl Into<String>, targets: Vec<Target>) -> Self {
        Self {
            source: source.into(),
            targets,
        }
    }

    /// Creates an empty group signalling removal of a source.
    pub fn removal(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            targets: Vec::new(),
        }
    }

    /// Whether this group signals removal.
    pub fn is_removal(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discoverer_kind_round_trip() {
        for kind in DiscovererKind::ALL {
            assert_eq!(kind.as_str().parse::<DiscovererKind>().unwrap(), kind);
        }
        assert!("systemd".parse::<DiscovererKind>().is_err());
    }

    #[test]
    fn test_source_kind_priority() {
        assert!(SourceKind::Dyncfg.priority() > SourceKind::File.priority());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(ConfigStatus::Accepted.to_string(), "accepted");
        assert_eq!(ConfigStatus::Running.to_string(), "running");
        assert_eq!(ConfigStatus::Disabled.to_string(), "disabled");
        assert_eq!(ConfigStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_target_group_removal() {
        let group = TargetGroup::removal("file:/etc/scout/sd.d/web.conf");
        assert!(group.is_removal());

        let group = TargetGroup::new(
            "sd:local:web",
            vec![Target {
                protocol: "tcp".to_string(),
                address: "127.0.0.1".to_string(),
                port: 8080,
                comm: None,
            }],
        );
        assert!(!group.is_removal());
    }
}
