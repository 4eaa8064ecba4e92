//! Inbound command decoding.
//!
//! Commands arrive as line-oriented frames:
//!
//! ```text
//! FUNCTION <uid> <timeout> "config <id> <cmd> [name]" "<source>"
//! FUNCTION_PAYLOAD <uid> <timeout> "config <id> <cmd> [name]" "<source>" <content-type>
//! <payload lines…>
//! FUNCTION_PAYLOAD_END
//! ```

use scout_core::error::{ProtocolError, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// A decoded remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub uid: String,
    /// `args[0]` is the config id, `args[1]` the command, `args[2]` the
    /// job name for `add`.
    pub args: Vec<String>,
    pub payload: Option<Vec<u8>>,
    pub source: String,
    pub content_type: String,
}

impl Function {
    pub fn config_id(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    pub fn command(&self) -> &str {
        self.args.get(1).map(String::as_str).unwrap_or("")
    }

    pub fn job_name(&self) -> Option<&str> {
        self.args.get(2).map(String::as_str)
    }
}

/// A parsed config id within this agent's `sd` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigId {
    /// `<agent>:sd:<type>`
    Template { kind: String },
    /// `<agent>:sd:<type>:<name>`
    Job { kind: String, name: String },
}

impl ConfigId {
    /// Parses an id, returning `None` for ids outside `<agent>:sd:`.
    pub fn parse(id: &str, agent: &str) -> Option<ConfigId> {
        let rest = id
            .strip_prefix(agent)?
            .strip_prefix(':')?
            .strip_prefix("sd:")?;
        if rest.is_empty() {
            return None;
        }
        match rest.split_once(':') {
            None => Some(ConfigId::Template {
                kind: rest.to_string(),
            }),
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => Some(ConfigId::Job {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
            Some(_) => None,
        }
    }

    /// The discoverer-type segment.
    pub fn kind(&self) -> &str {
        match self {
            ConfigId::Template { kind } => kind,
            ConfigId::Job { kind, .. } => kind,
        }
    }
}

/// Reads command frames from a line stream.
pub struct FunctionReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: tokio::io::AsyncRead + Unpin> FunctionReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// The next command, or `None` at end of stream. Unrecognized lines are
    /// skipped; a malformed `FUNCTION` line is an error.
    pub async fn next(&mut self) -> Result<Option<Function>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("FUNCTION_PAYLOAD ") {
                let mut function = parse_function_line(rest, true)?;
                let mut payload = Vec::new();
                loop {
                    match self.lines.next_line().await? {
                        None => {
                            return Err(ProtocolError::malformed(
                                "payload frame not terminated",
                            )
                            .into())
                        }
                        Some(l) if l.trim() == "FUNCTION_PAYLOAD_END" => break,
                        Some(l) => {
                            if !payload.is_empty() {
                                payload.push(b'\n');
                            }
                            payload.extend_from_slice(l.as_bytes());
                        }
                    }
                }
                function.payload = Some(payload);
                return Ok(Some(function));
            }

            if let Some(rest) = line.strip_prefix("FUNCTION ") {
                return Ok(Some(parse_function_line(rest, false)?));
            }
            // Not a command frame; ignore.
        }
    }
}

/// Parses everything after the `FUNCTION`/`FUNCTION_PAYLOAD` keyword.
fn parse_function_line(rest: &str, with_content_type: bool) -> Result<Function> {
    let tokens = split_quoted(rest);
    if tokens.len() < 3 {
        return Err(ProtocolError::malformed(format!("truncated command: {rest}")).into());
    }

    let uid = tokens[0].clone();
    // tokens[1] is the timeout; the handler has no use for it.
    let call = &tokens[2];
    let mut call_parts = call.split_whitespace();
    if call_parts.next() != Some("config") {
        return Err(ProtocolError::malformed(format!("not a config call: {call}")).into());
    }
    let args: Vec<String> = call_parts.map(str::to_string).collect();
    if args.len() < 2 {
        return Err(ProtocolError::malformed(format!("missing command: {call}")).into());
    }

    let source = tokens.get(3).cloned().unwrap_or_default();
    let content_type = if with_content_type {
        tokens
            .get(4)
            .cloned()
            .unwrap_or_else(|| "application/json".to_string())
    } else {
        String::new()
    };

    Ok(Function {
        uid,
        args,
        payload: None,
        source,
        content_type,
    })
}

/// Splits a line into whitespace-separated tokens, honoring double quotes.
fn split_quoted(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                if in_quotes {
                    tokens.push(std::mem::take(&mut current));
                    in_quotes = false;
                } else {
                    in_quotes = true;
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_and_job_ids() {
        assert_eq!(
            ConfigId::parse("scout:sd:net_listeners", "scout"),
            Some(ConfigId::Template {
                kind: "net_listeners".to_string()
            })
        );
        assert_eq!(
            ConfigId::parse("scout:sd:docker:web", "scout"),
            Some(ConfigId::Job {
                kind: "docker".to_string(),
                name: "web".to_string()
            })
        );
        assert_eq!(ConfigId::parse("scout:collector:x", "scout"), None);
        assert_eq!(ConfigId::parse("other:sd:docker:web", "scout"), None);
        assert_eq!(ConfigId::parse("scout:sd:", "scout"), None);
    }

    #[tokio::test]
    async fn test_read_plain_function() {
        let input = "FUNCTION 1-enable 120 \"config scout:sd:net_listeners:web enable\" \"type=dyncfg,user=test\"\n";
        let mut reader = FunctionReader::new(input.as_bytes());

        let function = reader.next().await.unwrap().unwrap();
        assert_eq!(function.uid, "1-enable");
        assert_eq!(function.config_id(), "scout:sd:net_listeners:web");
        assert_eq!(function.command(), "enable");
        assert_eq!(function.source, "type=dyncfg,user=test");
        assert!(function.payload.is_none());

        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_payload_function() {
        let input = "FUNCTION_PAYLOAD 2-add 120 \"config scout:sd:net_listeners add web\" \"type=dyncfg,user=test\" application/json\n{\"name\":\"web\"}\nFUNCTION_PAYLOAD_END\n";
        let mut reader = FunctionReader::new(input.as_bytes());

        let function = reader.next().await.unwrap().unwrap();
        assert_eq!(function.uid, "2-add");
        assert_eq!(function.command(), "add");
        assert_eq!(function.job_name(), Some("web"));
        assert_eq!(function.content_type, "application/json");
        assert_eq!(function.payload.as_deref(), Some(br#"{"name":"web"}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_unterminated_payload_is_error() {
        let input = "FUNCTION_PAYLOAD 3-add 120 \"config scout:sd:net_listeners add web\"\n{\"name\":\"web\"}\n";
        let mut reader = FunctionReader::new(input.as_bytes());
        assert!(reader.next().await.is_err());
    }

    #[tokio::test]
    async fn test_non_command_lines_skipped() {
        let input = "HEARTBEAT\n\nFUNCTION 4-get 120 \"config scout:sd:snmp:edge get\"\n";
        let mut reader = FunctionReader::new(input.as_bytes());
        let function = reader.next().await.unwrap().unwrap();
        assert_eq!(function.command(), "get");
        assert_eq!(function.source, "");
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_quoted(r#"a "b c" d"#),
            vec!["a".to_string(), "b c".to_string(), "d".to_string()]
        );
    }
}
