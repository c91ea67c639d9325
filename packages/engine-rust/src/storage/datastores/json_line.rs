//! Append-only JSON-lines [`TableDataStore`] implementation.
//!
//! One file per table: every committed put or delete appends one JSON
//! record; [`load_all`](crate::storage::TableDataStore::load_all) replays
//! the log, last record per key wins. The format is line-oriented so a
//! truncated trailing line (crash mid-append) is skipped on replay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::Item;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::storage::data_store::TableDataStore;

/// One replay log record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogRecord {
    Put {
        table: String,
        key: String,
        seq: u64,
        item: Item,
    },
    Delete {
        table: String,
        key: String,
        seq: u64,
    },
}

/// Write-through JSON-lines persistence for a single table file.
pub struct JsonLineDataStore {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
}

impl JsonLineDataStore {
    /// Opens (creating if needed) the log file at `path` for appending.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created or opened.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    async fn append(&self, record: &LogRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        Ok(())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl TableDataStore for JsonLineDataStore {
    async fn add(&self, table: &str, key: &[u8], item: &Item, seq: u64) -> anyhow::Result<()> {
        self.append(&LogRecord::Put {
            table: table.to_string(),
            key: hex_encode(key),
            seq,
            item: item.clone(),
        })
        .await
    }

    async fn remove(&self, table: &str, key: &[u8], seq: u64) -> anyhow::Result<()> {
        self.append(&LogRecord::Delete {
            table: table.to_string(),
            key: hex_encode(key),
            seq,
        })
        .await
    }

    async fn load_all(&self, table: &str) -> anyhow::Result<Vec<(Item, u64)>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut surviving: HashMap<String, Option<(Item, u64)>> = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<LogRecord>(line) else {
                // Truncated or corrupt trailing line from a crash mid-append.
                tracing::warn!(path = %self.path.display(), "skipping unparseable log line");
                continue;
            };
            match record {
                LogRecord::Put {
                    table: t,
                    key,
                    seq,
                    item,
                } if t == table => {
                    surviving.insert(key, Some((item, seq)));
                }
                LogRecord::Delete { table: t, key, .. } if t == table => {
                    surviving.insert(key, None);
                }
                _ => {}
            }
        }

        Ok(surviving.into_values().flatten().collect())
    }

    async fn hard_flush(&self) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.sync_data().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::Value;

    use super::*;

    fn movie(year: i64, title: &str) -> Item {
        let mut item = Item::new();
        item.insert("year".to_string(), Value::Int(year));
        item.insert("title".to_string(), Value::String(title.to_string()));
        item
    }

    #[tokio::test]
    async fn replay_applies_last_write_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.jsonl");
        let store = JsonLineDataStore::open(&path).await.unwrap();

        let alpha_v1 = movie(2004, "Alpha");
        let mut alpha_v2 = alpha_v1.clone();
        alpha_v2.insert("rating".to_string(), Value::Float(8.0));

        store.add("movies", b"k-alpha", &alpha_v1, 1).await.unwrap();
        store.add("movies", b"k-beta", &movie(2004, "Beta"), 2).await.unwrap();
        store.add("movies", b"k-alpha", &alpha_v2, 3).await.unwrap();
        store.remove("movies", b"k-beta", 4).await.unwrap();
        store.hard_flush().await.unwrap();

        let mut loaded = store.load_all("movies").await.unwrap();
        assert_eq!(loaded.len(), 1);
        let (item, seq) = loaded.pop().unwrap();
        assert_eq!(item, alpha_v2);
        assert_eq!(seq, 3);
    }

    #[tokio::test]
    async fn load_all_filters_by_table_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLineDataStore::open(dir.path().join("mixed.jsonl"))
            .await
            .unwrap();

        store.add("movies", b"k1", &movie(2004, "Alpha"), 1).await.unwrap();
        store.add("books", b"k2", &movie(2005, "Gamma"), 2).await.unwrap();

        let movies = store.load_all("movies").await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].1, 1);
    }

    #[tokio::test]
    async fn replay_skips_corrupt_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.jsonl");
        {
            let store = JsonLineDataStore::open(&path).await.unwrap();
            store.add("movies", b"k1", &movie(2004, "Alpha"), 1).await.unwrap();
            store.hard_flush().await.unwrap();
        }
        // Simulate a crash mid-append.
        {
            use std::io::Write as _;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"op\":\"put\",\"tab").unwrap();
        }

        let store = JsonLineDataStore::open(&path).await.unwrap();
        let loaded = store.load_all("movies").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn empty_log_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLineDataStore::open(dir.path().join("empty.jsonl"))
            .await
            .unwrap();
        assert!(store.load_all("movies").await.unwrap().is_empty());
        assert!(!store.is_null());
    }
}
