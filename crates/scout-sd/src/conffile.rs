//! Conf-file events and the directory provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One configuration file's content. Empty content is a tombstone: the
/// source no longer provides configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfFile {
    /// Source identifier (the file path)
    pub source: String,
    /// Raw file content
    pub content: String,
}

impl ConfFile {
    pub fn is_tombstone(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Scans directories for `*.conf` files and emits a [`ConfFile`] event for
/// every new or modified file, and a tombstone for every deleted one.
pub struct ConfDirProvider {
    dirs: Vec<PathBuf>,
    rescan_interval: Duration,
}

impl ConfDirProvider {
    pub fn new(dirs: Vec<PathBuf>, rescan_interval: Duration) -> Self {
        Self {
            dirs,
            rescan_interval,
        }
    }

    /// Spawns the provider worker. It sweeps once immediately, then rescans
    /// at the configured cadence until cancelled.
    pub fn spawn(self, cancel: CancellationToken, tx: mpsc::Sender<ConfFile>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut mtimes: HashMap<PathBuf, SystemTime> = HashMap::new();
            let mut interval = tokio::time::interval(self.rescan_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {}
                }

                let current = self.scan();

                // Deleted files first, so a rename never leaves two configs
                // claiming the same name.
                let deleted: Vec<PathBuf> = mtimes
                    .keys()
                    .filter(|p| !current.contains_key(*p))
                    .cloned()
                    .collect();
                for path in deleted {
                    mtimes.remove(&path);
                    debug!(file = %path.display(), "conf file removed");
                    let event = ConfFile {
                        source: path.display().to_string(),
                        content: String::new(),
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = tx.send(event) => if sent.is_err() { return },
                    }
                }

                for (path, mtime) in current {
                    if mtimes.get(&path) == Some(&mtime) {
                        continue;
                    }
                    let content = match std::fs::read_to_string(&path) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!(file = %path.display(), error = %e, "failed to read conf file");
                            continue;
                        }
                    };
                    mtimes.insert(path.clone(), mtime);
                    debug!(file = %path.display(), "conf file changed");
                    let event = ConfFile {
                        source: path.display().to_string(),
                        content,
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = tx.send(event) => if sent.is_err() { return },
                    }
                }
            }
        })
    }

    fn scan(&self) -> HashMap<PathBuf, SystemTime> {
        let mut found = HashMap::new();
        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "conf directory unavailable");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_conf_file(&path) {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    if let Ok(mtime) = meta.modified() {
                        found.insert(path, mtime);
                    }
                }
            }
        }
        found
    }
}

fn is_conf_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "conf")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn recv(rx: &mut mpsc::Receiver<ConfFile>) -> ConfFile {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for conf event")
            .expect("provider channel closed")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provider_emits_add_change_and_tombstone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.conf");
        std::fs::write(&path, "name: web\n").unwrap();

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let provider =
            ConfDirProvider::new(vec![dir.path().to_path_buf()], Duration::from_millis(25));
        let handle = provider.spawn(cancel.clone(), tx);

        let event = recv(&mut rx).await;
        assert_eq!(event.source, path.display().to_string());
        assert_eq!(event.content, "name: web\n");
        assert!(!event.is_tombstone());

        // Rewrite with different content and a bumped mtime.
        std::fs::write(&path, "name: api\n").unwrap();
        let far = SystemTime::now() + Duration::from_secs(10);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(far).ok();
        drop(file);

        let event = recv(&mut rx).await;
        assert_eq!(event.content, "name: api\n");

        std::fs::remove_file(&path).unwrap();
        let event = recv(&mut rx).await;
        assert!(event.is_tombstone());
        assert_eq!(event.source, path.display().to_string());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_conf_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("web.conf"), "name: web\n").unwrap();

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        ConfDirProvider::new(vec![dir.path().to_path_buf()], Duration::from_millis(25))
            .spawn(cancel.clone(), tx);

        let event = recv(&mut rx).await;
        assert!(event.source.ends_with("web.conf"));

        assert!(
            tokio::time::timeout(Duration::from_millis(150), rx.recv())
                .await
                .is_err()
        );
        cancel.cancel();
    }
}
