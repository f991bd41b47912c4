use crate::translate::WireStyle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

const MAX_JOURNAL_ENTRIES: usize = 10_000;

/// Terminal outcome of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub style: String,
    pub model: String,
    pub status: u16,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestRecord {
    pub fn new(request_id: impl Into<String>, style: WireStyle, model: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: request_id.into(),
            style: style.as_str().to_string(),
            model: model.into(),
            status: 200,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Ring buffer of request records, appended to a JSONL file when one is set.
///
/// The buffer bounds what `compact` rewrites and is what a reopened journal
/// replays. `record` does blocking file I/O; callers on the async runtime go
/// through `tokio::task::spawn_blocking`.
pub struct Journal {
    entries: VecDeque<RequestRecord>,
    file_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl Journal {
    /// In-memory journal with no backing file.
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::with_capacity(64),
            file_path: None,
            writer: None,
        }
    }

    /// Open (or create) a JSONL journal, replaying the most recent records.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(64);

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(record) = serde_json::from_str::<RequestRecord>(&line) {
                    if entries.len() >= MAX_JOURNAL_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(record);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        Ok(Self {
            entries,
            file_path: Some(file_path),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn record(&mut self, record: RequestRecord) {
        if let Some(ref mut writer) = self.writer {
            let written = serde_json::to_string(&record)
                .map_err(std::io::Error::from)
                .and_then(|json| {
                    writeln!(writer, "{}", json)?;
                    writer.flush()
                });
            if let Err(e) = written {
                warn!(error = %e, "Failed to append to request journal");
            }
        }
        if self.entries.len() >= MAX_JOURNAL_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the backing file so it holds only the buffered records.
    pub fn compact(&mut self) -> std::io::Result<()> {
        let Some(ref file_path) = self.file_path else {
            return Ok(());
        };

        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.entries {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }
        writer.flush()?;

        let file = OpenOptions::new().append(true).open(file_path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedJournal(Arc<Mutex<Journal>>);

impl SharedJournal {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::from(Journal::open(file_path)?))
    }

    pub fn in_memory() -> Self {
        Self::from(Journal::in_memory())
    }

    pub fn record(&self, record: RequestRecord) {
        if let Ok(mut journal) = self.0.lock() {
            journal.record(record);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.0.lock().map(|j| j.recent(limit)).unwrap_or_default()
    }

    pub fn compact(&self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut journal) => journal.compact(),
            Err(_) => Ok(()),
        }
    }
}

impl From<Journal> for SharedJournal {
    fn from(journal: Journal) -> Self {
        Self(Arc::new(Mutex::new(journal)))
    }
}
