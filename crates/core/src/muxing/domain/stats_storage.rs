use std::io;

/// Opens the byte channels two-pass statistics logs are kept in.
pub trait StatsStorage: Send + Sync {
    fn open_read(&self, path: &str) -> io::Result<Box<dyn StatsChannel>>;

    /// Creates or truncates `path` for writing.
    fn open_write(&self, path: &str) -> io::Result<Box<dyn StatsChannel>>;
}

/// An open statistics log.
pub trait StatsChannel: Send {
    /// Reads everything that is left. Fails if more than `limit` bytes
    /// remain.
    fn read_complete(&mut self, limit: usize) -> io::Result<Vec<u8>>;

    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn close(self: Box<Self>) -> io::Result<()>;
}
