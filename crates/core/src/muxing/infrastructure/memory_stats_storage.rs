use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::muxing::domain::stats_storage::{StatsChannel, StatsStorage};

#[derive(Debug, Default)]
struct Logs {
    files: HashMap<String, Vec<u8>>,
    closed: Vec<String>,
}

type SharedLogs = Arc<Mutex<Logs>>;

/// In-memory stats logs keyed by path. Clones share the same logs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStatsStorage {
    logs: SharedLogs,
    read_only: bool,
    unreadable: bool,
}

impl MemoryStatsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage whose `open_write` always fails.
    pub fn read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    /// A storage whose logs open for reading but fail on `read_complete`.
    pub fn unreadable(&self) -> Self {
        Self {
            unreadable: true,
            ..self.clone()
        }
    }

    pub fn insert(&self, path: &str, content: &[u8]) {
        lock(&self.logs)
            .files
            .insert(path.to_string(), content.to_vec());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.logs).files.get(path).cloned()
    }

    /// Paths of every channel closed so far, in order.
    pub fn closed(&self) -> Vec<String> {
        lock(&self.logs).closed.clone()
    }
}

fn lock(logs: &SharedLogs) -> std::sync::MutexGuard<'_, Logs> {
    logs.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatsStorage for MemoryStatsStorage {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn StatsChannel>> {
        let content = lock(&self.logs)
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        Ok(Box::new(MemoryStatsChannel {
            logs: Arc::clone(&self.logs),
            path: path.to_string(),
            pending: Some(content),
            writable: false,
            unreadable: self.unreadable,
        }))
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn StatsChannel>> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                path.to_string(),
            ));
        }
        lock(&self.logs).files.insert(path.to_string(), Vec::new());
        Ok(Box::new(MemoryStatsChannel {
            logs: Arc::clone(&self.logs),
            path: path.to_string(),
            pending: None,
            writable: true,
            unreadable: false,
        }))
    }
}

struct MemoryStatsChannel {
    logs: SharedLogs,
    path: String,
    pending: Option<Vec<u8>>,
    writable: bool,
    unreadable: bool,
}

impl StatsChannel for MemoryStatsChannel {
    fn read_complete(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        if self.unreadable {
            return Err(io::Error::new(io::ErrorKind::Other, "stats log unreadable"));
        }
        let content = self.pending.take().unwrap_or_default();
        if content.len() > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("stats log exceeds {limit} bytes"),
            ));
        }
        Ok(content)
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stats log was opened for reading",
            ));
        }
        lock(&self.logs)
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        lock(&self.logs).closed.push(self.path.clone());
        Ok(())
    }
}
