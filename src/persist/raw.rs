//! Framed raw codec: `[len u32-le][payload]` per item.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::persist::{read_len_prefix, FileReader, FileWriter};

pub(crate) struct RawFileWriter {
    out: BufWriter<File>,
}

impl RawFileWriter {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

impl FileWriter for RawFileWriter {
    fn write_item(&mut self, item: &Item) -> Result<()> {
        let len = frame_len(item.bytes())?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(item.bytes())?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub(crate) struct RawFileReader {
    input: BufReader<File>,
}

impl RawFileReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            input: BufReader::new(file),
        })
    }
}

impl FileReader for RawFileReader {
    fn read_item(&mut self) -> Result<Option<Bytes>> {
        let Some(len) = read_len_prefix(&mut self.input)? else {
            return Ok(None);
        };
        let mut payload = vec![0u8; len as usize];
        self.input.read_exact(&mut payload)?;
        Ok(Some(Bytes::from(payload)))
    }
}

pub(super) fn frame_len(payload: &[u8]) -> Result<u32> {
    payload.len().try_into().map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "item too large for frame",
        ))
    })
}
