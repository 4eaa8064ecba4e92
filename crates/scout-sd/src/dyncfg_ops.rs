//! Remote-configuration command execution.
//!
//! State-changing commands (`add`, `enable`, `disable`, `update`, `remove`)
//! arrive here through the orchestrator's single consumer; read-only
//! commands (`schema`, `get`, `test`, `userconfig`) are answered directly
//! on the caller.

use crate::job::JobConfig;
use crate::sd::{RunState, ServiceDiscovery};
use scout_core::types::{ConfigStatus, DiscovererKind, SourceKind};
use scout_dyncfg::cache::{CacheKeyed, ExposedEntry};
use scout_dyncfg::function::{ConfigId, Function};
use scout_dyncfg::response::{codes, error_body, success_body};
use scout_dyncfg::schema::schema_for;
use scout_dyncfg::wire::ConfigScope;
use scout_pipeline::discoverers::{
    DockerConfig, K8sConfig, SnmpConfig, SnmpCredentialConfig, SnmpNetworkConfig,
};
use scout_pipeline::{DiscovererConfig, PipelineConfig, ServiceRuleConfig};
use tracing::{info, warn};

impl ServiceDiscovery {
    /// Executes one state-changing command.
    pub(crate) async fn execute(&self, function: Function, state: &mut RunState) {
        let uid = function.uid.clone();
        let Some(config_id) = ConfigId::parse(function.config_id(), self.agent()) else {
            self.reply_error(
                &uid,
                codes::NOT_FOUND,
                format!("Unknown config id: {}", function.config_id()),
            );
            return;
        };

        match (config_id, function.command()) {
            (ConfigId::Template { kind }, "add") => self.cmd_add(&kind, &function).await,
            // Reserved at this layer; templates are always active.
            (ConfigId::Template { .. }, "enable" | "disable") => {
                self.reply_success(&uid, codes::OK);
            }
            (ConfigId::Job { kind, name }, "enable") => {
                self.cmd_enable(&kind, &name, &function, state).await;
            }
            (ConfigId::Job { kind, name }, "disable") => {
                self.cmd_disable(&kind, &name, &function, state).await;
            }
            (ConfigId::Job { kind, name }, "update") => {
                self.cmd_update(&kind, &name, &function).await;
            }
            (ConfigId::Job { kind, name }, "remove") => {
                self.cmd_remove(&kind, &name, &function).await;
            }
            (_, cmd) => {
                self.reply_error(
                    &uid,
                    codes::NOT_IMPLEMENTED,
                    format!("Command '{cmd}' is not supported."),
                );
            }
        }
    }

    /// Answers a read-only command without entering the command queue.
    pub(crate) fn answer_readonly(&self, function: Function) {
        let uid = function.uid.clone();
        let Some(config_id) = ConfigId::parse(function.config_id(), self.agent()) else {
            self.reply_error(
                &uid,
                codes::NOT_FOUND,
                format!("Unknown config id: {}", function.config_id()),
            );
            return;
        };

        match function.command() {
            "schema" => {
                // Unknown discoverer types fall back to the generic schema.
                let kind = config_id.kind().parse::<DiscovererKind>().ok();
                self.api.function_result(
                    &uid,
                    codes::OK,
                    "application/json",
                    &schema_for(kind).to_string(),
                );
            }
            "get" => match &config_id {
                ConfigId::Template { .. } => {
                    self.reply_error(
                        &uid,
                        codes::NOT_IMPLEMENTED,
                        "Command 'get' is not supported.",
                    );
                }
                ConfigId::Job { kind, name } => {
                    let key = format!("{kind}:{name}");
                    match self.exposed.lookup(&key) {
                        None => self.reply_not_found(&uid, &key),
                        Some(entry) => match serde_json::to_string(&entry.cfg.declaration) {
                            Ok(body) => {
                                self.api
                                    .function_result(&uid, codes::OK, "application/json", &body);
                            }
                            Err(e) => self.reply_error(&uid, codes::BAD_REQUEST, e.to_string()),
                        },
                    }
                }
            },
            "test" => self.cmd_test(&config_id, &function),
            "userconfig" => self.cmd_userconfig(&config_id, &function),
            cmd => {
                self.reply_error(
                    &uid,
                    codes::NOT_IMPLEMENTED,
                    format!("Command '{cmd}' is not supported."),
                );
            }
        }
    }

    async fn cmd_add(&self, kind_raw: &str, function: &Function) {
        let uid = &function.uid;
        let Ok(kind) = kind_raw.parse::<DiscovererKind>() else {
            self.reply_error(
                uid,
                codes::NOT_FOUND,
                format!("Unknown discoverer type: {kind_raw}"),
            );
            return;
        };
        let Some(name) = function.job_name().map(str::to_string) else {
            self.reply_error(uid, codes::BAD_REQUEST, "missing job name");
            return;
        };
        let Some(declaration) = self.parse_payload(uid, function, kind, &name) else {
            return;
        };

        let source = if function.source.is_empty() {
            "dyncfg".to_string()
        } else {
            function.source.clone()
        };
        let incoming = JobConfig::new(kind, SourceKind::Dyncfg, source, declaration);
        let key = incoming.composite_key();

        if let Some(existing) = self.exposed.lookup(&key) {
            if existing.cfg.source_kind() == SourceKind::Dyncfg {
                self.reply_error(
                    uid,
                    codes::BAD_REQUEST,
                    format!("Config '{key}' already exists."),
                );
                return;
            }
            // A dyncfg add outranks a file-sourced config.
            if existing.status == ConfigStatus::Running {
                self.mgr.stop(&existing.cfg.pipeline_key()).await;
            }
            info!(config = %key, "dyncfg add replaces file-sourced config");
        }

        self.seen.add(incoming.clone());
        self.reply_success(uid, codes::ACCEPTED);
        self.expose(&incoming);
    }

    async fn cmd_enable(&self, kind: &str, name: &str, function: &Function, state: &mut RunState) {
        let uid = &function.uid;
        let key = format!("{kind}:{name}");
        let Some(entry) = self.exposed.lookup(&key) else {
            self.reply_not_found(uid, &key);
            return;
        };
        self.clear_awaiting(&key, state);

        let id = self.job_id_for_key(&key);
        if entry.status == ConfigStatus::Running {
            // Already enabled; nothing to restart.
            self.reply_success(uid, codes::OK);
            self.api.config_status(&id, ConfigStatus::Running);
            return;
        }

        match self.activate(&key).await {
            Ok(()) => {
                self.reply_success(uid, codes::OK);
                self.api.config_status(&id, ConfigStatus::Running);
            }
            Err(e) => {
                warn!(config = %key, error = %e, "enable failed");
                self.reply_error(uid, codes::ENABLE_FAILED, e.to_string());
                self.api.config_status(&id, ConfigStatus::Failed);
            }
        }
    }

    async fn cmd_disable(&self, kind: &str, name: &str, function: &Function, state: &mut RunState) {
        let uid = &function.uid;
        let key = format!("{kind}:{name}");
        let Some(entry) = self.exposed.lookup(&key) else {
            self.reply_not_found(uid, &key);
            return;
        };
        self.clear_awaiting(&key, state);

        self.mgr.stop(&entry.cfg.pipeline_key()).await;
        self.exposed.set_status(&key, ConfigStatus::Disabled);
        self.reply_success(uid, codes::OK);
        self.api
            .config_status(&self.job_id_for_key(&key), ConfigStatus::Disabled);
    }

    async fn cmd_update(&self, kind: &str, name: &str, function: &Function) {
        let uid = &function.uid;
        let key = format!("{kind}:{name}");
        let Some(entry) = self.exposed.lookup(&key) else {
            self.reply_not_found(uid, &key);
            return;
        };
        let id = self.job_id_for_key(&key);

        let Some(declaration) = self.parse_payload(uid, function, entry.cfg.kind(), name) else {
            self.api.config_status(&id, entry.status);
            return;
        };

        if entry.status == ConfigStatus::Accepted {
            self.reply_error(
                uid,
                codes::NOT_ALLOWED,
                "updating is not allowed in 'accepted' state.",
            );
            self.api.config_status(&id, ConfigStatus::Accepted);
            return;
        }

        let source = if function.source.is_empty() {
            "dyncfg".to_string()
        } else {
            function.source.clone()
        };
        let incoming = JobConfig::new(entry.cfg.kind(), SourceKind::Dyncfg, source, declaration);

        // An update converts a file-sourced config to dyncfg; the file's
        // record stays in `seen`, so removing the file later does not
        // disturb the override.
        let converted = entry.cfg.source_kind() != SourceKind::Dyncfg
            || entry.cfg.source() != incoming.source();

        if entry.status == ConfigStatus::Running
            && !converted
            && entry.cfg.declaration == incoming.declaration
        {
            // Nothing changed; skip the restart.
            self.reply_success(uid, codes::OK);
            self.api.config_status(&id, ConfigStatus::Running);
            return;
        }

        self.seen.add(incoming.clone());

        let status = match entry.status {
            ConfigStatus::Running | ConfigStatus::Failed => {
                match self
                    .mgr
                    .restart(
                        &entry.cfg.pipeline_key(),
                        &incoming.pipeline_key(),
                        incoming.declaration.clone(),
                    )
                    .await
                {
                    Ok(()) => ConfigStatus::Running,
                    Err(e) => {
                        // The declaration is applied, but the replacement
                        // pipeline could not be built; whatever ran before
                        // keeps running.
                        warn!(config = %key, error = %e, "restart after update failed");
                        ConfigStatus::Failed
                    }
                }
            }
            ConfigStatus::Disabled => ConfigStatus::Disabled,
            ConfigStatus::Accepted => return,
        };

        self.exposed.add(ExposedEntry {
            cfg: incoming.clone(),
            status,
        });
        self.reply_success(uid, codes::OK);
        if converted {
            self.api.config_create(
                &id,
                status,
                ConfigScope::Job,
                self.path(),
                SourceKind::Dyncfg.as_str(),
                incoming.source(),
                self.job_commands(SourceKind::Dyncfg),
            );
        } else {
            self.api.config_status(&id, status);
        }
    }

    async fn cmd_remove(&self, kind: &str, name: &str, function: &Function) {
        let uid = &function.uid;
        let key = format!("{kind}:{name}");
        let Some(entry) = self.exposed.lookup(&key) else {
            self.reply_not_found(uid, &key);
            return;
        };
        if entry.cfg.source_kind() != SourceKind::Dyncfg {
            self.reply_error(
                uid,
                codes::NOT_ALLOWED,
                format!(
                    "Cannot remove non-dyncfg configs. Source type: {}",
                    entry.cfg.source_kind()
                ),
            );
            return;
        }

        self.mgr.stop(&entry.cfg.pipeline_key()).await;
        self.seen.remove(&entry.cfg);
        self.exposed.remove(&key);
        self.reply_success(uid, codes::OK);
        self.api.config_delete(&self.job_id_for_key(&key));
        info!(config = %key, "config removed");
    }

    fn cmd_test(&self, config_id: &ConfigId, function: &Function) {
        let uid = &function.uid;
        let Ok(kind) = config_id.kind().parse::<DiscovererKind>() else {
            self.reply_error(
                uid,
                codes::NOT_FOUND,
                format!("Unknown discoverer type: {}", config_id.kind()),
            );
            return;
        };
        let name = match config_id {
            ConfigId::Job { name, .. } => name.as_str(),
            ConfigId::Template { .. } => "",
        };
        // Validation only; nothing is mutated.
        if self.parse_payload(uid, function, kind, name).is_some() {
            self.reply_success(uid, codes::OK);
        }
    }

    fn cmd_userconfig(&self, config_id: &ConfigId, function: &Function) {
        let uid = &function.uid;
        let declaration = if let Some(payload) = function.payload.as_deref() {
            match PipelineConfig::from_json(payload) {
                Ok(d) => d,
                Err(e) => {
                    self.reply_error(uid, codes::BAD_REQUEST, e.to_string());
                    return;
                }
            }
        } else {
            match config_id {
                ConfigId::Job { kind, name } => {
                    let key = format!("{kind}:{name}");
                    let Some(entry) = self.exposed.lookup(&key) else {
                        self.reply_not_found(uid, &key);
                        return;
                    };
                    entry.cfg.declaration.clone()
                }
                ConfigId::Template { kind } => {
                    let Ok(kind) = kind.parse::<DiscovererKind>() else {
                        self.reply_error(
                            uid,
                            codes::NOT_FOUND,
                            format!("Unknown discoverer type: {kind}"),
                        );
                        return;
                    };
                    sample_declaration(kind)
                }
            }
        };

        match serde_yaml::to_string(&declaration) {
            Ok(yaml) => {
                self.api
                    .function_result(uid, codes::OK, "application/yaml", &yaml);
            }
            Err(e) => self.reply_error(uid, codes::BAD_REQUEST, e.to_string()),
        }
    }

    /// Parses and validates a command payload, answering the appropriate
    /// error on failure. An empty `name` (template-scoped `test`) keeps the
    /// payload's own name.
    fn parse_payload(
        &self,
        uid: &str,
        function: &Function,
        kind: DiscovererKind,
        name: &str,
    ) -> Option<PipelineConfig> {
        let Some(payload) = function.payload.as_deref() else {
            self.reply_error(uid, codes::BAD_REQUEST, "missing configuration payload");
            return None;
        };
        let mut declaration = match PipelineConfig::from_json(payload) {
            Ok(d) => d,
            Err(e) => {
                self.reply_error(uid, codes::BAD_REQUEST, e.to_string());
                return None;
            }
        };
        if !name.is_empty() {
            declaration.name = name.to_string();
        }
        if declaration.discoverer_kind() != Some(kind) {
            self.reply_error(
                uid,
                codes::BAD_REQUEST,
                format!("Config discoverer does not match template type '{kind}'."),
            );
            return None;
        }
        if let Err(e) = declaration.validate() {
            self.reply_error(uid, codes::BAD_REQUEST, e.to_string());
            return None;
        }
        Some(declaration)
    }

    fn clear_awaiting(&self, key: &str, state: &mut RunState) {
        if let RunState::AwaitingActivation { key: awaited } = state {
            if awaited == key {
                *state = RunState::Normal;
            }
        }
    }

    fn reply_success(&self, uid: &str, code: u16) {
        self.api
            .function_result(uid, code, "application/json", &success_body(code));
    }

    pub(crate) fn reply_error(&self, uid: &str, code: u16, message: impl Into<String>) {
        self.api
            .function_result(uid, code, "application/json", &error_body(code, message));
    }

    fn reply_not_found(&self, uid: &str, key: &str) {
        self.reply_error(
            uid,
            codes::NOT_FOUND,
            format!("Config '{key}' not found."),
        );
    }
}

/// A human-editable starting point for each discoverer type.
fn sample_declaration(kind: DiscovererKind) -> PipelineConfig {
    let discoverer = match kind {
        DiscovererKind::NetListeners => DiscovererConfig {
            net_listeners: Some(Default::default()),
            ..Default::default()
        },
        DiscovererKind::Docker => DiscovererConfig {
            docker: Some(DockerConfig {
                address: "unix:///var/run/docker.sock".to_string(),
                timeout: None,
            }),
            ..Default::default()
        },
        DiscovererKind::K8s => DiscovererConfig {
            k8s: Some(vec![K8sConfig {
                role: "pod".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        },
        DiscovererKind::Snmp => DiscovererConfig {
            snmp: Some(SnmpConfig {
                credentials: vec![SnmpCredentialConfig {
                    name: "public-v2".to_string(),
                    version: "2c".to_string(),
                    community: Some("public".to_string()),
                    ..Default::default()
                }],
                networks: vec![SnmpNetworkConfig {
                    subnet: "192.168.1.0/24".to_string(),
                    credential: "public-v2".to_string(),
                }],
                ..Default::default()
            }),
            ..Default::default()
        },
    };

    PipelineConfig {
        name: "example".to_string(),
        discoverer,
        services: vec![ServiceRuleConfig {
            id: "all".to_string(),
            match_expr: "true".to_string(),
        }],
        ..Default::default()
    }
}
