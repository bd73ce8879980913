use std::fmt;

use crate::item::{default_key_comparator, KeyComparator};
use crate::persist::FileType;

/// Database configuration.
///
/// All fields have working defaults: byte-lexicographic ordering, the
/// framed raw file format, and payload bytes included in memory
/// accounting.
#[derive(Clone)]
pub struct Config {
    pub(crate) key_comparator: KeyComparator,
    pub(crate) file_type: FileType,
    pub(crate) ignore_item_size: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_comparator: default_key_comparator(),
            file_type: FileType::default(),
            ignore_item_size: false,
        }
    }
}

impl Config {
    pub fn set_key_comparator(&mut self, cmp: KeyComparator) {
        self.key_comparator = cmp;
    }

    pub fn set_file_type(&mut self, file_type: FileType) {
        self.file_type = file_type;
    }

    /// Excludes item payload bytes from memory accounting; only fixed
    /// per-entry overhead is charged.
    pub fn set_ignore_item_size(&mut self, ignore: bool) {
        self.ignore_item_size = ignore;
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("file_type", &self.file_type)
            .field("ignore_item_size", &self.ignore_item_size)
            .finish_non_exhaustive()
    }
}
