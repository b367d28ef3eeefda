//! Hot reload of the configuration file.
//!
//! A reload is triggered by a write to the file (watched through its parent
//! directory) or by SIGHUP on unix. Each trigger re-reads and re-validates the
//! file; only a valid configuration reaches the reload callback.

use crate::config::{load_config, Config};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Receives every configuration that passed validation.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// Saves usually arrive as a burst of events; wait this long and drain.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// What caused a reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadTrigger {
    FileChanged,
    Hangup,
}

pub struct ConfigWatcher {
    config_path: PathBuf,
    on_reload: ReloadCallback,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, on_reload: ReloadCallback) -> Self {
        Self {
            config_path,
            on_reload,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Watch for reload triggers until `shutdown` fires.
    ///
    /// If the file watcher cannot be set up, SIGHUP still works.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let (tx, mut events) = mpsc::unbounded_channel();
        let _watcher = match watch_directory_of(&self.config_path, tx) {
            Ok(w) => Some(w),
            Err(e) => {
                error!(path = %self.config_path.display(), error = %e, "file watching disabled");
                None
            }
        };
        let mut hangup = Hangup::install();

        info!(path = %self.config_path.display(), "watching configuration for changes");

        loop {
            let trigger = tokio::select! {
                Some(event) = events.recv() => {
                    if !self.is_config_write(&event) {
                        continue;
                    }
                    tokio::time::sleep(SETTLE_DELAY).await;
                    while events.try_recv().is_ok() {}
                    ReloadTrigger::FileChanged
                }
                _ = hangup.recv() => ReloadTrigger::Hangup,
                _ = shutdown.recv() => break,
            };
            self.reload(trigger);
        }

        debug!("configuration watcher stopped");
    }

    /// A create or modify event naming the configuration file.
    fn is_config_write(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.config_path.file_name())
    }

    fn reload(&self, trigger: ReloadTrigger) {
        match load_config(&self.config_path) {
            Ok(config) => {
                info!(
                    ?trigger,
                    backends = config.backends.len(),
                    strategy = %config.load_balancer.strategy,
                    "configuration file accepted"
                );
                (self.on_reload)(config);
            }
            Err(e) => {
                error!(?trigger, error = %e, "rejected configuration reload, keeping current settings");
            }
        }
    }
}

/// Editors often replace the file on save, so the parent directory is watched.
fn watch_directory_of(
    path: &Path,
    tx: mpsc::UnboundedSender<Event>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// SIGHUP listener; never fires where signals are unavailable.
struct Hangup {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Hangup {
    fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let signal = signal(SignalKind::hangup())
                .map_err(|e| warn!(error = %e, "SIGHUP reload unavailable"))
                .ok();
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal.as_mut() {
                if signal.recv().await.is_some() {
                    return;
                }
                self.signal = None;
            }
        }
        std::future::pending::<()>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const CONFIG_PATH: &str = "/etc/lingualink/lingualink.yaml";

    fn watcher() -> ConfigWatcher {
        ConfigWatcher::new(PathBuf::from(CONFIG_PATH), Box::new(|_| {}))
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_content_change_triggers_reload() {
        let kind = EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Content,
        ));
        assert!(watcher().is_config_write(&event(kind, CONFIG_PATH)));
    }

    #[test]
    fn test_other_files_and_removals_ignored() {
        let w = watcher();
        let create = EventKind::Create(notify::event::CreateKind::File);
        assert!(!w.is_config_write(&event(create, "/etc/lingualink/other.yaml")));

        let remove = EventKind::Remove(notify::event::RemoveKind::File);
        assert!(!w.is_config_write(&event(remove, CONFIG_PATH)));
    }

    #[test]
    fn test_only_valid_files_reach_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        file.write_all(b"backends: []\n").unwrap();
        watcher.reload(ReloadTrigger::FileChanged);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        std::fs::write(
            file.path(),
            "backends:\n  - url: \"http://127.0.0.1:9000\"\n    label: local\n",
        )
        .unwrap();
        watcher.reload(ReloadTrigger::Hangup);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ConfigWatcher::new(dir.path().join("lingualink.yaml"), Box::new(|_| {}));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(watcher.run(rx));
        tokio::task::yield_now().await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
