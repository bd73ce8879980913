use std::path::PathBuf;

/// Errors surfaced by the store.
///
/// Nothing here is retried internally; every failure is handed back to the
/// caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The 32-bit sequence space is exhausted. Fatal for this database
    /// instance; no further snapshots can be created.
    #[error("sequence number space exhausted")]
    SnapshotLimitReached,

    /// The caller-supplied scratch buffer is smaller than the fixed
    /// 4-byte snapshot frame.
    #[error("buffer too small for snapshot frame")]
    NotEnoughSpace,

    /// An unknown file-format tag was given to the configuration.
    #[error("unknown file format")]
    InvalidFileType,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `files.json` was not found under the data directory.
    #[error("shard manifest missing: {}", .0.display())]
    ManifestMissing(PathBuf),

    /// `files.json` exists but could not be parsed.
    #[error("shard manifest malformed: {0}")]
    ManifestMalformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
