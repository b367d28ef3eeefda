//! Fire-and-forget translation history.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One completed translation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub source_text: String,
    pub translated_text: String,
    pub source_lang: Option<String>,
    pub target_lang: String,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
}

impl HistoryEntry {
    pub fn new(
        source_text: impl Into<String>,
        translated_text: impl Into<String>,
        source_lang: Option<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            source_lang,
            target_lang: target_lang.into(),
            created_at,
        }
    }
}

/// Where history entries are persisted.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()>;
}

/// Writes entries to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHistorySink;

#[async_trait]
impl HistorySink for LogHistorySink {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        info!(
            source_lang = entry.source_lang.as_deref().unwrap_or("auto"),
            target_lang = %entry.target_lang,
            chars = entry.source_text.chars().count(),
            "translation recorded"
        );
        Ok(())
    }
}

/// Persist `entry` in the background. Failures are logged, never returned.
pub fn record_detached(sink: Arc<dyn HistorySink>, entry: HistoryEntry) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.record(entry).await {
            warn!(error = %e, "failed to record translation history");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<HistoryEntry>>);

    #[async_trait]
    impl HistorySink for MemorySink {
        async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()> {
            self.0.lock().push(entry);
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl HistorySink for BrokenSink {
        async fn record(&self, _: HistoryEntry) -> anyhow::Result<()> {
            anyhow::bail!("database unavailable")
        }
    }

    #[tokio::test]
    async fn test_detached_record_reaches_sink() {
        let sink = Arc::new(MemorySink::default());
        let entry = HistoryEntry::new("hello", "hola", None, "es");

        record_detached(sink.clone(), entry.clone()).await.unwrap();
        assert_eq!(sink.0.lock().as_slice(), &[entry]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let handle = record_detached(Arc::new(BrokenSink), HistoryEntry::new("a", "b", None, "fr"));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_log_sink_accepts_entries() {
        let sink = LogHistorySink;
        assert!(sink.record(HistoryEntry::new("a", "b", Some("en".into()), "de")).await.is_ok());
    }
}
