//! The local listening-socket discovery pipeline.
//!
//! Periodically reads the kernel socket tables (`/proc/net/tcp`, `tcp6`,
//! `udp`, `udp6`), applies the declaration's service rules, and emits one
//! target group per rule. A rule that stops matching emits an empty group so
//! the downstream consumer retracts its targets.

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use regex::Regex;
use scout_core::error::{ConfigError, PipelineError, Result};
use scout_core::types::{Target, TargetGroup};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// TCP socket state LISTEN in the kernel tables.
const TCP_LISTEN: &str = "0A";
/// UDP sockets sit in state CLOSE while bound.
const UDP_BOUND: &str = "07";

struct CompiledRule {
    id: String,
    matcher: Option<Regex>, // None matches everything
}

pub struct NetListenersPipeline {
    name: String,
    interval: Duration,
    rules: Vec<CompiledRule>,
    proc_root: PathBuf,
}

impl NetListenersPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let nl = config.discoverer.net_listeners.as_ref().ok_or_else(|| {
            PipelineError::construction_failed(&config.name, "net_listeners block missing")
        })?;

        let mut rules = Vec::with_capacity(config.services.len());
        for rule in &config.services {
            let matcher = if rule.match_expr == "true" {
                None
            } else {
                Some(Regex::new(&rule.match_expr).map_err(|e| {
                    ConfigError::invalid_value("services.match", e.to_string())
                })?)
            };
            rules.push(CompiledRule {
                id: rule.id.clone(),
                matcher,
            });
        }

        Ok(Self {
            name: config.name.clone(),
            interval: nl
                .interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_INTERVAL),
            rules,
            proc_root: PathBuf::from("/proc/net"),
        })
    }

    #[cfg(test)]
    fn with_proc_root(mut self, root: PathBuf) -> Self {
        self.proc_root = root;
        self
    }

    fn scan(&self) -> Vec<Target> {
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();

        for (file, protocol, state) in [
            ("tcp", "tcp", TCP_LISTEN),
            ("tcp6", "tcp", TCP_LISTEN),
            ("udp", "udp", UDP_BOUND),
            ("udp6", "udp", UDP_BOUND),
        ] {
            let path = self.proc_root.join(file);
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    debug!(table = %path.display(), error = %e, "socket table unavailable");
                    continue;
                }
            };
            for line in content.lines().skip(1) {
                if let Some((address, port)) = parse_socket_line(line, state) {
                    if port == 0 {
                        continue;
                    }
                    if seen.insert((protocol, address, port)) {
                        targets.push(Target {
                            protocol: protocol.to_string(),
                            address: address.to_string(),
                            port,
                            comm: None,
                        });
                    }
                }
            }
        }

        targets
    }

    fn groups_for(&self, targets: &[Target]) -> Vec<TargetGroup> {
        self.rules
            .iter()
            .map(|rule| {
                let matched: Vec<Target> = targets
                    .iter()
                    .filter(|t| match &rule.matcher {
                        None => true,
                        Some(re) => re.is_match(&format!("{} {}:{}", t.protocol, t.address, t.port)),
                    })
                    .cloned()
                    .collect();
                TargetGroup::new(format!("sd:{}/{}", self.name, rule.id), matched)
            })
            .collect()
    }
}

#[async_trait]
impl Pipeline for NetListenersPipeline {
    async fn run(self: Box<Self>, cancel: CancellationToken, out: mpsc::Sender<Vec<TargetGroup>>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(pipeline = %self.name, "net_listeners pipeline cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }

            let targets = self.scan();
            debug!(pipeline = %self.name, targets = targets.len(), "scanned listening sockets");
            let groups = self.groups_for(&targets);

            tokio::select! {
                _ = cancel.cancelled() => return,
                sent = out.send(groups) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Parses one `/proc/net/{tcp,udp}` line, returning the local address and
/// port when the socket is in the wanted state.
fn parse_socket_line(line: &str, wanted_state: &str) -> Option<(IpAddr, u16)> {
    let mut fields = line.split_whitespace();
    let _slot = fields.next()?;
    let local = fields.next()?;
    let _remote = fields.next()?;
    let state = fields.next()?;
    if !state.eq_ignore_ascii_case(wanted_state) {
        return None;
    }

    let (addr_hex, port_hex) = local.rsplit_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let address = parse_hex_address(addr_hex)?;
    Some((address, port))
}

/// Decodes the kernel's little-endian hex address encoding.
fn parse_hex_address(hex: &str) -> Option<IpAddr> {
    match hex.len() {
        8 => {
            let raw = u32::from_str_radix(hex, 16).ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(raw.swap_bytes())))
        }
        32 => {
            let mut octets = [0u8; 16];
            // Four little-endian 32-bit words.
            for (word_idx, chunk) in (0..4).zip(hex.as_bytes().chunks(8)) {
                let word = u32::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
                octets[word_idx * 4..word_idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscovererConfig, ServiceRuleConfig};
    use crate::discoverers::NetListenersConfig;

    const TCP_SAMPLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1 0000000000000000 100 0 0 10 0
   1: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12346 1 0000000000000000 100 0 0 10 0
   2: 0100007F:A21C 0100007F:1F90 01 00000000:00000000 00:00000000 00000000  1000        0 12347 1 0000000000000000 100 0 0 10 0
";

    fn pipeline(rules: Vec<(&str, &str)>) -> NetListenersPipeline {
        let config = PipelineConfig {
            name: "local".to_string(),
            discoverer: DiscovererConfig {
                net_listeners: Some(NetListenersConfig::default()),
                ..Default::default()
            },
            services: rules
                .into_iter()
                .map(|(id, m)| ServiceRuleConfig {
                    id: id.to_string(),
                    match_expr: m.to_string(),
                })
                .collect(),
            ..Default::default()
        };
        NetListenersPipeline::new(&config).unwrap()
    }

    #[test]
    fn test_parse_tcp_listen_lines() {
        let lines: Vec<_> = TCP_SAMPLE.lines().skip(1).collect();
        assert_eq!(
            parse_socket_line(lines[0], TCP_LISTEN),
            Some((IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080))
        );
        assert_eq!(
            parse_socket_line(lines[1], TCP_LISTEN),
            Some((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80))
        );
        // Established connection, not a listener.
        assert_eq!(parse_socket_line(lines[2], TCP_LISTEN), None);
    }

    #[test]
    fn test_parse_ipv6_address() {
        // ::1 in kernel encoding
        let addr = parse_hex_address("00000000000000000000000001000000").unwrap();
        assert_eq!(addr, IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn test_scan_and_rules_from_fixture() {
        let dir = std::env::temp_dir().join(format!("scout-nl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tcp"), TCP_SAMPLE).unwrap();

        let p = pipeline(vec![("all", "true"), ("web", r"tcp .*:80$")]).with_proc_root(dir.clone());
        let targets = p.scan();
        assert_eq!(targets.len(), 2);

        let groups = p.groups_for(&targets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source, "sd:local/all");
        assert_eq!(groups[0].targets.len(), 2);
        assert_eq!(groups[1].source, "sd:local/web");
        assert_eq!(groups[1].targets.len(), 1);
        assert_eq!(groups[1].targets[0].port, 80);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_rule_regex_rejected() {
        let config = PipelineConfig {
            name: "local".to_string(),
            discoverer: DiscovererConfig {
                net_listeners: Some(NetListenersConfig::default()),
                ..Default::default()
            },
            services: vec![ServiceRuleConfig {
                id: "bad".to_string(),
                match_expr: "(unclosed".to_string(),
            }],
            ..Default::default()
        };
        assert!(NetListenersPipeline::new(&config).is_err());
    }
}
