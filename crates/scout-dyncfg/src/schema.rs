//! JSON schemas answered to `schema` commands.

use scout_core::types::DiscovererKind;
use serde_json::{json, Value};

/// The schema for a discoverer type's declarations, or the generic pipeline
/// schema when the type is unknown.
pub fn schema_for(kind: Option<DiscovererKind>) -> Value {
    let discoverer_properties = match kind {
        Some(DiscovererKind::NetListeners) => json!({
            "net_listeners": {
                "type": "object",
                "properties": {
                    "interval": { "type": "integer", "minimum": 1 },
                    "timeout": { "type": "integer", "minimum": 1 }
                }
            }
        }),
        Some(DiscovererKind::Docker) => json!({
            "docker": {
                "type": "object",
                "required": ["address"],
                "properties": {
                    "address": { "type": "string" },
                    "timeout": { "type": "integer", "minimum": 1 }
                }
            }
        }),
        Some(DiscovererKind::K8s) => json!({
            "k8s": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["role"],
                    "properties": {
                        "role": { "type": "string", "enum": ["pod", "service"] },
                        "namespaces": { "type": "array", "items": { "type": "string" } },
                        "selector": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string" },
                                "field": { "type": "string" }
                            }
                        },
                        "pod": {
                            "type": "object",
                            "properties": {
                                "local_mode": { "type": "boolean" }
                            }
                        }
                    }
                }
            }
        }),
        Some(DiscovererKind::Snmp) => json!({
            "snmp": {
                "type": "object",
                "required": ["networks"],
                "properties": {
                    "rescan_interval": { "type": "integer", "minimum": 1 },
                    "timeout": { "type": "integer", "minimum": 1 },
                    "device_cache_ttl": { "type": "integer", "minimum": 1 },
                    "credentials": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name", "version"],
                            "properties": {
                                "name": { "type": "string" },
                                "version": { "type": "string", "enum": ["1", "2c", "3"] },
                                "community": { "type": "string" },
                                "user_name": { "type": "string" },
                                "security_level": { "type": "string" },
                                "auth_protocol": { "type": "string" },
                                "auth_passphrase": { "type": "string" },
                                "privacy_protocol": { "type": "string" },
                                "privacy_passphrase": { "type": "string" }
                            }
                        }
                    },
                    "networks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["subnet", "credential"],
                            "properties": {
                                "subnet": { "type": "string" },
                                "credential": { "type": "string" }
                            }
                        }
                    }
                }
            }
        }),
        None => json!({}),
    };

    json!({
        "jsonSchema": {
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "title": "Service discovery pipeline",
            "required": ["name", "discoverer"],
            "properties": {
                "name": { "type": "string" },
                "disabled": { "type": "boolean" },
                "discoverer": {
                    "type": "object",
                    "minProperties": 1,
                    "maxProperties": 1,
                    "properties": discoverer_properties
                },
                "services": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["id", "match"],
                        "properties": {
                            "id": { "type": "string" },
                            "match": { "type": "string" }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_schema() {
        for kind in DiscovererKind::ALL {
            let schema = schema_for(Some(kind));
            assert!(schema.get("jsonSchema").is_some());
            let props = &schema["jsonSchema"]["properties"]["discoverer"]["properties"];
            assert!(props.get(kind.as_str()).is_some(), "missing {kind}");
        }
    }

    #[test]
    fn test_generic_fallback_schema() {
        let schema = schema_for(None);
        assert!(schema.get("jsonSchema").is_some());
    }
}
