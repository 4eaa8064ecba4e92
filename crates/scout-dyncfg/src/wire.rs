//! Outbound protocol frames.
//!
//! One frame per message, line-oriented. The sink is injected (the real
//! writer to the parent process lives outside this crate) and is held
//! behind a lock so concurrently answering read-only commands never
//! interleaves frames.

use parking_lot::Mutex;
use scout_core::types::ConfigStatus;
use std::io::Write;
use std::sync::Arc;
use tracing::error;

/// Whether an advertisement is for a discoverer template or a concrete job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Template,
    Job,
}

impl ConfigScope {
    fn as_str(&self) -> &'static str {
        match self {
            ConfigScope::Template => "template",
            ConfigScope::Job => "job",
        }
    }
}

/// Encodes and writes outbound frames.
#[derive(Clone)]
pub struct WireWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl WireWriter {
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// `CONFIG <id> create <status> <scope> <path> <sourceType> '<source>'
    /// '<commands>' 0x0000 0x0000`
    ///
    /// Re-advertising an id is an upsert on the parent's side; no `delete`
    /// frame is needed when a config is replaced in place.
    #[allow(clippy::too_many_arguments)]
    pub fn config_create(
        &self,
        id: &str,
        status: ConfigStatus,
        scope: ConfigScope,
        path: &str,
        source_type: &str,
        source: &str,
        commands: &str,
    ) {
        self.write_frame(&format!(
            "CONFIG {id} create {status} {scope} {path} {source_type} '{source}' '{commands}' 0x0000 0x0000",
            scope = scope.as_str(),
        ));
    }

    /// `CONFIG <id> status <status>`
    pub fn config_status(&self, id: &str, status: ConfigStatus) {
        self.write_frame(&format!("CONFIG {id} status {status}"));
    }

    /// `CONFIG <id> delete`
    pub fn config_delete(&self, id: &str) {
        self.write_frame(&format!("CONFIG {id} delete"));
    }

    /// `FUNCTION_RESULT_BEGIN <uid> <code> <content-type>` + body +
    /// `FUNCTION_RESULT_END`
    pub fn function_result(&self, uid: &str, code: u16, content_type: &str, body: &str) {
        self.write_frame(&format!(
            "FUNCTION_RESULT_BEGIN {uid} {code} {content_type}\n{}\nFUNCTION_RESULT_END",
            body.trim_end_matches('\n'),
        ));
    }

    fn write_frame(&self, frame: &str) {
        let mut sink = self.sink.lock();
        // Frames are separated by a blank line. A failed write is logged,
        // never propagated: the parent going away must not kill us.
        if let Err(e) = writeln!(sink, "{frame}\n").and_then(|_| sink.flush()) {
            error!(error = %e, "failed to write protocol frame");
        }
    }
}
