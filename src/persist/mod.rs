//! Durability as an explicit export/import.
//!
//! A snapshot is written as one shard file per CPU core under
//! `<dir>/data/shard-<i>`, produced in parallel by the visitor, plus a
//! `files.json` manifest naming the shards in order. Loading reads the
//! manifest first, streams each shard into a builder segment with
//! `concurrency` workers, and assembles the segments into the index.
//!
//! Two codecs are selectable per database: a framed raw layout (length
//! prefix + payload) and a log-structured layout that adds a crc32
//! checksum per record. Both round-trip payload bytes exactly.

mod log;
mod raw;

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{Db, Snapshot};
use crate::error::{Error, Result};
use crate::index::{IndexBuilder, ItemCallback};
use crate::item::Item;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileType {
    /// Length-prefixed payload frames.
    #[default]
    Raw,
    /// Append-log records with a crc32 checksum, verified on read.
    Log,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Raw => "raw",
            FileType::Log => "log",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for FileType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(FileType::Raw),
            1 => Ok(FileType::Log),
            _ => Err(Error::InvalidFileType),
        }
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(FileType::Raw),
            "log" => Ok(FileType::Log),
            _ => Err(Error::InvalidFileType),
        }
    }
}

pub trait FileWriter: Send {
    fn write_item(&mut self, item: &Item) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

pub trait FileReader: Send {
    /// Next payload in the file; `Ok(None)` at a clean end of file.
    fn read_item(&mut self) -> Result<Option<Bytes>>;
}

pub(crate) fn new_file_writer(file_type: FileType, path: &Path) -> Result<Box<dyn FileWriter>> {
    Ok(match file_type {
        FileType::Raw => Box::new(raw::RawFileWriter::create(path)?),
        FileType::Log => Box::new(log::LogFileWriter::create(path)?),
    })
}

pub(crate) fn new_file_reader(file_type: FileType, path: &Path) -> Result<Box<dyn FileReader>> {
    Ok(match file_type {
        FileType::Raw => Box::new(raw::RawFileReader::open(path)?),
        FileType::Log => Box::new(log::LogFileReader::open(path)?),
    })
}

/// Little-endian u32 frame prefix. A clean end of file yields `None`; a
/// partial prefix is an error.
pub(crate) fn read_len_prefix<R: Read>(r: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated frame prefix",
            )));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

const DATA_DIR: &str = "data";
const MANIFEST_FILE: &str = "files.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct Manifest {
    files: Vec<String>,
}

impl Db {
    /// Writes everything `snap` can see to `<dir>/data/`, one shard file
    /// per CPU core, then the manifest. `item_cb`, when given, observes
    /// every stored item.
    pub fn store_to_disk(
        &self,
        dir: impl AsRef<Path>,
        snap: &Arc<Snapshot>,
        concurrency: usize,
        item_cb: Option<ItemCallback>,
    ) -> Result<()> {
        let data_dir = dir.as_ref().join(DATA_DIR);
        fs::create_dir_all(&data_dir)?;

        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let file_type = self.inner.config.file_type;

        let mut files = Vec::with_capacity(shards);
        let mut writers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let name = format!("shard-{shard}");
            writers.push(Mutex::new(new_file_writer(
                file_type,
                &data_dir.join(&name),
            )?));
            files.push(name);
        }

        debug!(shards, %file_type, "storing snapshot to disk");
        let visited = self.visit(snap, shards, concurrency, |item, shard| {
            writers[shard].lock().write_item(item)?;
            if let Some(cb) = &item_cb {
                cb(item);
            }
            Ok(())
        });

        let mut close_err = None;
        for writer in &writers {
            if let Err(err) = writer.lock().close() {
                close_err.get_or_insert(err);
            }
        }
        visited?;
        if let Some(err) = close_err {
            return Err(err);
        }

        let manifest = Manifest { files };
        fs::write(
            data_dir.join(MANIFEST_FILE),
            serde_json::to_vec(&manifest)?,
        )?;
        Ok(())
    }

    /// Rebuilds the index from `<dir>/data/` and returns a snapshot of
    /// the loaded content. The manifest is read first; the shard files
    /// are streamed by `concurrency` workers into builder segments.
    /// Intended for a freshly created database.
    pub fn load_from_disk(
        &self,
        dir: impl AsRef<Path>,
        concurrency: usize,
        item_cb: Option<ItemCallback>,
    ) -> Result<Arc<Snapshot>> {
        let data_dir = dir.as_ref().join(DATA_DIR);
        let manifest_path = data_dir.join(MANIFEST_FILE);
        let manifest_bytes = match fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ManifestMissing(manifest_path));
            }
            Err(err) => return Err(err.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;

        let file_type = self.inner.config.file_type;
        let builder = IndexBuilder::new();
        let born_seqno = self.inner.current_seqno();

        let mut readers = Vec::with_capacity(manifest.files.len());
        let mut segments = Vec::with_capacity(manifest.files.len());
        for file in &manifest.files {
            readers.push(Mutex::new(new_file_reader(
                file_type,
                &data_dir.join(file),
            )?));
            let mut segment = builder.new_segment();
            if let Some(cb) = &item_cb {
                segment.set_item_callback(Arc::clone(cb));
            }
            segments.push(Mutex::new(segment));
        }

        let errors: Vec<Mutex<Option<Error>>> =
            (0..readers.len()).map(|_| Mutex::new(None)).collect();
        let next_shard = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..concurrency.max(1) {
                scope.spawn(|| loop {
                    let shard = next_shard.fetch_add(1, AtomicOrdering::SeqCst);
                    if shard >= readers.len() {
                        return;
                    }
                    let mut reader = readers[shard].lock();
                    let mut segment = segments[shard].lock();
                    loop {
                        match reader.read_item() {
                            Ok(Some(data)) => {
                                segment.add(Arc::new(Item::new(data, born_seqno)));
                            }
                            Ok(None) => break,
                            Err(err) => {
                                *errors[shard].lock() = Some(err);
                                return;
                            }
                        }
                    }
                });
            }
        });

        for slot in errors {
            if let Some(err) = slot.into_inner() {
                return Err(err);
            }
        }

        let segments: Vec<_> = segments.into_iter().map(Mutex::into_inner).collect();
        let added = builder.assemble(&self.inner.index, segments);
        self.inner
            .count
            .store(self.inner.index.len() as i64, AtomicOrdering::SeqCst);
        debug!(
            files = manifest.files.len(),
            entries = added,
            "loaded database from disk"
        );

        self.new_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_tags_and_names() {
        assert_eq!(FileType::try_from(0).unwrap(), FileType::Raw);
        assert_eq!(FileType::try_from(1).unwrap(), FileType::Log);
        assert!(matches!(
            FileType::try_from(7),
            Err(Error::InvalidFileType)
        ));

        assert_eq!("raw".parse::<FileType>().unwrap(), FileType::Raw);
        assert_eq!("log".parse::<FileType>().unwrap(), FileType::Log);
        assert!(matches!(
            "forest".parse::<FileType>(),
            Err(Error::InvalidFileType)
        ));
    }
}
