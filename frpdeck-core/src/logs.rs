//! Bounded log sink for agent output
//!
//! Raw chunks are split into lines, cleaned of terminal escape sequences and
//! stored as immutable [`LogEntry`] values with a monotonically increasing
//! sequence id. When the buffer exceeds its capacity the oldest entries are
//! dropped. Sequence ids are never reused, not even across [`LogSink::clear`].

use crate::clock::Clock;
use crate::notify::{DeckUpdate, Notifier};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;

// CSI, OSC (BEL or ST terminated), then any other two-byte escape.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-_]").unwrap()
});

fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(text, "")
}

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Synthetic entries written by the core itself
    System,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStream::Stdout => write!(f, "STDOUT"),
            LogStream::Stderr => write!(f, "STDERR"),
            LogStream::System => write!(f, "SYSTEM"),
        }
    }
}

/// A single stored line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    /// One line, without its terminator
    pub text: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.stream,
            self.text
        )
    }
}

#[derive(Debug)]
struct LogBuffer {
    next_seq: u64,
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    fn push(&mut self, timestamp: DateTime<Utc>, stream: LogStream, text: String) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.entries.push_back(LogEntry {
            seq,
            timestamp,
            stream,
            text,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        seq
    }
}

/// Cloneable handle to the shared log buffer
#[derive(Debug, Clone)]
pub struct LogSink {
    buffer: Arc<RwLock<LogBuffer>>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
}

impl LogSink {
    /// Create a sink holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize, clock: Arc<dyn Clock>, notifier: Notifier) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(LogBuffer {
                next_seq: 1,
                capacity: capacity.max(1),
                entries: VecDeque::new(),
            })),
            clock,
            notifier,
        }
    }

    /// Split `chunk` into lines and append one entry per non-empty line.
    ///
    /// `\n` and `\r\n` terminators are both accepted. Escape sequences are
    /// removed from stdout and stderr text. Returns the sequence ids assigned,
    /// in order.
    pub async fn ingest(&self, chunk: &str, stream: LogStream) -> Vec<u64> {
        let lines: Vec<String> = chunk
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .map(|line| match stream {
                LogStream::Stdout | LogStream::Stderr => strip_ansi(line).into_owned(),
                LogStream::System => line.to_string(),
            })
            .filter(|line| !line.is_empty())
            .collect();

        if lines.is_empty() {
            return Vec::new();
        }

        let now = self.clock.now();
        let seqs: Vec<u64> = {
            let mut buffer = self.buffer.write().await;
            lines
                .into_iter()
                .map(|line| buffer.push(now, stream, line))
                .collect()
        };

        if let (Some(&first_seq), Some(&last_seq)) = (seqs.first(), seqs.last()) {
            self.notifier.send(DeckUpdate::LogAppended {
                first_seq,
                last_seq,
            });
        }
        seqs
    }

    /// All retained entries, oldest first
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.buffer.read().await.entries.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.buffer.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buffer.read().await.entries.is_empty()
    }

    pub async fn capacity(&self) -> usize {
        self.buffer.read().await.capacity
    }

    /// Entries with `seq > cursor`, at most `limit` of them.
    ///
    /// A cursor of 0 returns the most recent `limit` entries. The returned
    /// cursor is the last sequence id handed out, or `cursor` when nothing
    /// new was found.
    pub async fn tail_after(&self, cursor: u64, limit: usize) -> (Vec<LogEntry>, u64) {
        let buffer = self.buffer.read().await;
        let out: Vec<LogEntry> = if cursor == 0 {
            let start = buffer.entries.len().saturating_sub(limit);
            buffer.entries.iter().skip(start).cloned().collect()
        } else {
            buffer
                .entries
                .iter()
                .filter(|e| e.seq > cursor)
                .take(limit)
                .cloned()
                .collect()
        };
        let next = out.last().map_or(cursor, |e| e.seq);
        (out, next)
    }

    /// Drop every entry; the sequence counter keeps counting
    pub async fn clear(&self) {
        self.buffer.write().await.entries.clear();
        self.notifier.send(DeckUpdate::LogCleared);
    }

    /// Newline-joined `[HH:MM:SS] STREAM text` lines for export
    pub async fn render_text(&self) -> String {
        let buffer = self.buffer.read().await;
        buffer
            .entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
