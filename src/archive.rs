//! Packaging converted textures into a single zip/pk3 archive.
//!
//! When the destination matches one of the archive masks, every output goes
//! into one archive instead of the file tree. The strategy is picked once,
//! before scheduling:
//!
//! | Strategy | When | Behaviour |
//! |---|---|---|
//! | `Memory` | threshold > 0 and input total ≤ threshold MiB | archive built in a buffer, written in one go |
//! | `Disk` | otherwise | entries streamed into the archive file as they are added |
//!
//! Entries are only added after the workers have joined; the sink is never
//! shared across threads.

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::{SimpleFileOptions, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStrategy {
    Memory,
    Disk,
}

impl ArchiveStrategy {
    /// `threshold_mib` of 0 disables in-memory archives.
    pub fn choose(threshold_mib: u64, total_input_bytes: u64) -> Self {
        let total_mib = total_input_bytes.div_ceil(1024 * 1024);
        if threshold_mib > 0 && total_mib <= threshold_mib {
            ArchiveStrategy::Memory
        } else {
            ArchiveStrategy::Disk
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveStrategy::Memory => "memory",
            ArchiveStrategy::Disk => "disk",
        }
    }
}

/// Does `destination` name an archive?
pub fn is_archive_destination(destination: &Path, masks: &[glob::Pattern]) -> bool {
    let Some(name) = destination.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    masks.iter().any(|m| m.matches_with(name, options))
}

/// `<prefix><codec>/<relative path>` with `/` separators. The prefix gets a
/// trailing `/` if it lacks one.
pub fn entry_name(prefix: &str, codec: &str, relative: &Path) -> String {
    let mut name = String::new();
    let prefix = prefix.trim_matches(['/', '\\']);
    if !prefix.is_empty() {
        name.push_str(&prefix.replace('\\', "/"));
        name.push('/');
    }
    name.push_str(codec);
    for part in relative.components() {
        name.push('/');
        name.push_str(&part.as_os_str().to_string_lossy());
    }
    name
}

enum Writer {
    Memory(ZipWriter<Cursor<Vec<u8>>>),
    Disk(ZipWriter<File>),
}

pub struct ArchiveSink {
    path: PathBuf,
    strategy: ArchiveStrategy,
    writer: Writer,
    entries: usize,
}

impl ArchiveSink {
    /// Open the sink. A `Disk` sink creates (truncates) the file right away.
    pub fn create(path: &Path, strategy: ArchiveStrategy) -> Result<Self, ArchiveError> {
        let writer = match strategy {
            ArchiveStrategy::Memory => Writer::Memory(ZipWriter::new(Cursor::new(Vec::new()))),
            ArchiveStrategy::Disk => {
                create_parent(path)?;
                Writer::Disk(ZipWriter::new(File::create(path)?))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            strategy,
            writer,
            entries: 0,
        })
    }

    pub fn strategy(&self) -> ArchiveStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn add(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        match &mut self.writer {
            Writer::Memory(zip) => add_entry(zip, name, bytes)?,
            Writer::Disk(zip) => add_entry(zip, name, bytes)?,
        }
        self.entries += 1;
        Ok(())
    }

    /// Finalise the archive and return its size in bytes.
    pub fn finish(self) -> Result<u64, ArchiveError> {
        match self.writer {
            Writer::Memory(zip) => {
                let buffer = zip.finish()?.into_inner();
                create_parent(&self.path)?;
                std::fs::write(&self.path, &buffer)?;
                Ok(buffer.len() as u64)
            }
            Writer::Disk(zip) => {
                let file = zip.finish()?;
                Ok(file.metadata()?.len())
            }
        }
    }
}

fn add_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
) -> Result<(), ArchiveError> {
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(bytes)?;
    Ok(())
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
