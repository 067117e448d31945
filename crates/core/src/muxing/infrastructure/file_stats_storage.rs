use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use crate::muxing::domain::stats_storage::{StatsChannel, StatsStorage};

/// Keeps two-pass statistics logs as plain files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStatsStorage;

impl FileStatsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl StatsStorage for FileStatsStorage {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn StatsChannel>> {
        let file = File::open(path)?;
        Ok(Box::new(FileStatsChannel::Reader(file)))
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn StatsChannel>> {
        let file = File::create(path)?;
        Ok(Box::new(FileStatsChannel::Writer(BufWriter::new(file))))
    }
}

enum FileStatsChannel {
    Reader(File),
    Writer(BufWriter<File>),
}

impl StatsChannel for FileStatsChannel {
    fn read_complete(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let FileStatsChannel::Reader(file) = self else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stats log was opened for writing",
            ));
        };
        let mut content = Vec::new();
        file.take(limit as u64 + 1).read_to_end(&mut content)?;
        if content.len() > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("stats log exceeds {limit} bytes"),
            ));
        }
        Ok(content)
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            FileStatsChannel::Writer(writer) => writer.write_all(bytes),
            FileStatsChannel::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stats log was opened for reading",
            )),
        }
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        match *self {
            FileStatsChannel::Writer(mut writer) => writer.flush(),
            FileStatsChannel::Reader(_) => Ok(()),
        }
    }
}
