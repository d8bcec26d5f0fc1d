//! Per-source daily admission control backed by counter files.
//!
//! Each source owns `<state_dir>/<source>.rate`, one `DD/MM/YYYY <count>`
//! entry per line, oldest first. Only the final line is authoritative for
//! today. A check serialises on a per-source mutex and rewrites the file
//! through a temp file + rename, so increment-or-deny is atomic even when
//! connections are handled concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::StorageError;

/// Date format used in counter files.
pub const COUNTER_DATE_FORMAT: &str = "%d/%m/%Y";

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

/// One line of a counter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub date: NaiveDate,
    pub count: u32,
}

impl CounterEntry {
    fn first(date: NaiveDate) -> Self {
        Self { date, count: 1 }
    }

    /// Parse a `DD/MM/YYYY <count>` line. Anything else is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let date = NaiveDate::parse_from_str(parts.next()?, COUNTER_DATE_FORMAT).ok()?;
        let count = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { date, count })
    }

    pub fn to_line(&self) -> String {
        format!("{} {}", self.date.format(COUNTER_DATE_FORMAT), self.count)
    }
}

/// Durable per-source daily connection counter.
pub struct RateLimitStore {
    state_dir: PathBuf,
    limit: u32,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RateLimitStore {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            state_dir: config.state_dir.clone(),
            limit: config.connection_limit,
            locks: DashMap::new(),
        }
    }

    /// Path of the counter file for `source`.
    pub fn counter_path(&self, source: &str) -> PathBuf {
        self.state_dir.join(format!("{source}.rate"))
    }

    /// Check and record a connection from `source` against today's local date.
    pub async fn check(&self, source: &str) -> Result<Admission, StorageError> {
        self.check_on(source, Local::now().date_naive()).await
    }

    /// Check and record a connection from `source` as if it arrived on `today`.
    ///
    /// The call that finds the counter already at the limit is denied and
    /// leaves the file untouched.
    pub async fn check_on(&self, source: &str, today: NaiveDate) -> Result<Admission, StorageError> {
        let lock = self.locks.entry(source.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.check_locked(source, today).await
        };
        drop(lock);
        // Only the map's own handle left means no other check is waiting.
        self.locks.remove_if(source, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn check_locked(&self, source: &str, today: NaiveDate) -> Result<Admission, StorageError> {
        let path = self.counter_path(source);
        let contents = read_counter_file(&path).await?;
        let mut lines: Vec<&[u8]> = counter_lines(&contents).collect();

        let next = match lines.last().map(|line| parse_line(line)) {
            Some(Some(entry)) if entry.date == today => {
                if entry.count >= self.limit {
                    tracing::debug!(source, count = entry.count, "Daily limit reached");
                    return Ok(Admission::Denied);
                }
                lines.pop();
                CounterEntry {
                    date: today,
                    count: entry.count + 1,
                }
            }
            Some(None) => {
                tracing::warn!(
                    source,
                    path = %path.display(),
                    "Discarding unparsable counter entry"
                );
                lines.pop();
                // at most one entry per date
                if lines
                    .last()
                    .and_then(|line| parse_line(line))
                    .is_some_and(|entry| entry.date == today)
                {
                    lines.pop();
                }
                CounterEntry::first(today)
            }
            _ => CounterEntry::first(today),
        };

        let mut body = Vec::with_capacity(contents.len() + 16);
        for line in &lines {
            body.extend_from_slice(line);
            body.push(b'\n');
        }
        body.extend_from_slice(next.to_line().as_bytes());
        body.push(b'\n');

        self.write_counter_file(&path, &body).await?;
        Ok(Admission::Admitted)
    }

    /// The authoritative entry for `source`, if its file has one.
    pub async fn last_entry(&self, source: &str) -> Result<Option<CounterEntry>, StorageError> {
        let contents = read_counter_file(&self.counter_path(source)).await?;
        Ok(counter_lines(&contents).last().and_then(parse_line))
    }

    async fn write_counter_file(&self, path: &Path, body: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| StorageError::new(&self.state_dir, e))?;

        let tmp = path.with_extension("rate.tmp");
        fs::write(&tmp, body)
            .await
            .map_err(|e| StorageError::new(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::new(path, e))
    }
}

/// Non-blank lines of a counter file. Lines stay raw bytes so a torn or
/// garbled tail cannot make the whole file unreadable.
fn counter_lines(contents: &[u8]) -> impl Iterator<Item = &[u8]> {
    contents
        .split(|&b| b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
}

/// A line that is not UTF-8 is as unparsable as any other garbage.
fn parse_line(line: &[u8]) -> Option<CounterEntry> {
    std::str::from_utf8(line).ok().and_then(CounterEntry::parse)
}

async fn read_counter_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    match fs::read(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StorageError::new(path, e)),
    }
}
