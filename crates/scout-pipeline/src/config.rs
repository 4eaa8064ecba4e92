//! The pipeline declaration model.
//!
//! One logical schema, two encodings: `*.conf` files on disk are YAML,
//! remote-command payloads are JSON. Both deserialize into
//! [`PipelineConfig`].

use crate::discoverers::{DockerConfig, K8sConfig, NetListenersConfig, SnmpConfig};
use scout_core::error::{ConfigError, Result};
use scout_core::types::DiscovererKind;
use serde::{Deserialize, Serialize};

/// A complete pipeline declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, unique per discoverer kind
    #[serde(default)]
    pub name: String,

    /// A disabled declaration is ignored by file ingestion
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    /// Exactly one discoverer must be configured
    #[serde(default)]
    pub discoverer: DiscovererConfig,

    /// Rules mapping discovered targets to service groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceRuleConfig>,
}

/// Discoverer selection; exactly one field may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscovererConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_listeners: Option<NetListenersConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s: Option<Vec<K8sConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp: Option<SnmpConfig>,
}

/// A service rule: targets matching `match` are grouped under `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRuleConfig {
    /// Rule identifier, part of the emitted group source
    #[serde(default)]
    pub id: String,
    /// Match expression: `true` matches everything, anything else is a
    /// regular expression applied to `<protocol> <address>:<port>`
    #[serde(default, rename = "match")]
    pub match_expr: String,
}

impl PipelineConfig {
    /// Parses a declaration from YAML file content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse_failed(e.to_string()).into())
    }

    /// Parses a declaration from a JSON command payload.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| ConfigError::parse_failed(e.to_string()).into())
    }

    /// The discoverer kind this declaration selects, if exactly one is set.
    pub fn discoverer_kind(&self) -> Option<DiscovererKind> {
        let mut kind = None;
        let d = &self.discoverer;
        for (set, k) in [
            (d.net_listeners.is_some(), DiscovererKind::NetListeners),
            (d.docker.is_some(), DiscovererKind::Docker),
            (d.k8s.is_some(), DiscovererKind::K8s),
            (d.snmp.is_some(), DiscovererKind::Snmp),
        ] {
            if set {
                if kind.is_some() {
                    return None;
                }
                kind = Some(k);
            }
        }
        kind
    }

    /// Validates the declaration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::missing_field("name").into());
        }

        let d = &self.discoverer;
        let set = [
            d.net_listeners.is_some(),
            d.docker.is_some(),
            d.k8s.is_some(),
            d.snmp.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        match set {
            0 => {
                return Err(ConfigError::InvalidDiscoverer {
                    reason: "no discoverer configured".to_string(),
                }
                .into())
            }
            1 => {}
            _ => {
                return Err(ConfigError::InvalidDiscoverer {
                    reason: "multiple discoverers configured".to_string(),
                }
                .into())
            }
        }

        if let Some(docker) = &d.docker {
            docker.validate()?;
        }
        if let Some(k8s) = &d.k8s {
            if k8s.is_empty() {
                return Err(ConfigError::missing_field("discoverer.k8s").into());
            }
            for cfg in k8s {
                cfg.validate()?;
            }
        }
        if let Some(snmp) = &d.snmp {
            snmp.validate()?;
        }

        if self.services.is_empty() {
            return Err(ConfigError::validation_failed(
                "at least one service rule is required",
            )
            .into());
        }
        for rule in &self.services {
            if rule.id.is_empty() {
                return Err(ConfigError::missing_field("services.id").into());
            }
            if rule.match_expr.is_empty() {
                return Err(ConfigError::missing_field("services.match").into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discoverers::{SnmpCredentialConfig, SnmpNetworkConfig};

    fn minimal_config(name: &str) -> PipelineConfig {
        PipelineConfig {
            name: name.to_string(),
            discoverer: DiscovererConfig {
                net_listeners: Some(NetListenersConfig::default()),
                ..Default::default()
            },
            services: vec![ServiceRuleConfig {
                id: "all".to_string(),
                match_expr: "true".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        let cfg = minimal_config("local");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.discoverer_kind(), Some(DiscovererKind::NetListeners));
    }

    #[test]
    fn test_yaml_and_json_parse_same_schema() {
        let yaml = r#"
name: local
discoverer:
  net_listeners:
    interval: 30
services:
  - id: web
    match: "tcp .*:80"
"#;
        let from_yaml = PipelineConfig::from_yaml(yaml).unwrap();

        let json = serde_json::to_vec(&from_yaml).unwrap();
        let from_json = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(from_yaml, from_json);
        assert_eq!(
            from_yaml.discoverer.net_listeners.as_ref().unwrap().interval,
            Some(30)
        );
    }

    #[test]
    fn test_no_discoverer_rejected() {
        let cfg = PipelineConfig {
            name: "empty".to_string(),
            services: vec![ServiceRuleConfig {
                id: "all".to_string(),
                match_expr: "true".to_string(),
            }],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.discoverer_kind(), None);
    }

    #[test]
    fn test_multiple_discoverers_rejected() {
        let mut cfg = minimal_config("both");
        cfg.discoverer.snmp = Some(SnmpConfig {
            credentials: vec![SnmpCredentialConfig {
                name: "c".to_string(),
                version: "2c".to_string(),
                ..Default::default()
            }],
            networks: vec![SnmpNetworkConfig {
                subnet: "10.0.0.0/24".to_string(),
                credential: "c".to_string(),
            }],
            ..Default::default()
        });
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.discoverer_kind(), None);
    }

    #[test]
    fn test_missing_name_rejected() {
        let mut cfg = minimal_config("x");
        cfg.name = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_service_rules_required() {
        let mut cfg = minimal_config("x");
        cfg.services.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_disabled_flag_not_serialized_when_false() {
        let cfg = minimal_config("x");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("disabled"));
    }
}
