//! Streaming ZIP serializer with zip64 support
//!
//! The writer never seeks: every local header defers its CRC and sizes to a
//! trailing data descriptor, so entries of unknown size can be streamed
//! straight to the sink.
//!
//! Global zip64 decisions are made incrementally, so callers should write
//! the largest (or least predictable) entry first.

use super::records::{
    exceeds_u16, exceeds_u32, BinaryWrite, CentralDirectoryHeader, DataDescriptor, DosDateTime,
    EndOfCentralDirectory, LocalFileHeader, Zip64EndOfCentralDirectory,
    Zip64EndOfCentralDirectoryLocator, Zip64LocalExtra,
};
use super::ArchiveError;
use std::io::Write;

/// The entry currently being streamed
#[derive(Debug)]
struct EntryBuilder {
    name: String,
    declared_size: Option<u64>,
    size: u64,
    hasher: crc32fast::Hasher,
    header_offset: u64,
    zip64_local: bool,
}

/// A closed entry, kept until the central directory is written
#[derive(Debug, Clone)]
struct FinishedEntry {
    name: String,
    crc32: u32,
    size: u64,
    header_offset: u64,
    zip64: bool,
}

#[derive(Debug)]
enum WriteState {
    NoEntry,
    EntryOpen(EntryBuilder),
    Done,
    /// A size mismatch or sink error left partial bytes in the stream
    Failed,
}

/// Writes a stored (uncompressed) ZIP archive to any byte sink
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    sink: W,
    bytes_written: u64,
    entries: Vec<FinishedEntry>,
    force_zip64: bool,
    modified: DosDateTime,
    state: WriteState,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer stamping entries with the current local time
    pub fn new(sink: W) -> Self {
        Self::with_modified(sink, chrono::Local::now().naive_local())
    }

    /// Create a writer with a fixed modification timestamp
    pub fn with_modified(sink: W, modified: chrono::NaiveDateTime) -> Self {
        ArchiveWriter {
            sink,
            bytes_written: 0,
            entries: Vec::new(),
            force_zip64: false,
            modified: DosDateTime::from_datetime(&modified),
            state: WriteState::NoEntry,
        }
    }

    /// Emit zip64 structures for every entry and for the archive trailer
    pub fn force_zip64(&mut self) {
        self.force_zip64 = true;
    }

    pub fn is_zip64_forced(&self) -> bool {
        self.force_zip64
    }

    /// Total bytes handed to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn has_open_entry(&self) -> bool {
        matches!(self.state, WriteState::EntryOpen(_))
    }

    /// Start a new entry; `size` is `None` when the length is not known yet
    pub fn begin_entry(&mut self, name: &str, size: Option<u64>) -> Result<(), ArchiveError> {
        match &self.state {
            WriteState::NoEntry => {}
            WriteState::EntryOpen(open) => {
                return Err(ArchiveError::EntryAlreadyOpen {
                    open: open.name.clone(),
                    requested: name.to_string(),
                })
            }
            WriteState::Done => return Err(ArchiveError::AlreadyFinished),
            WriteState::Failed => return Err(ArchiveError::Failed),
        }

        let zip64_local = self.force_zip64 || size.is_some_and(exceeds_u32);
        let header = LocalFileHeader {
            name,
            modified: self.modified,
            zip64: zip64_local.then(|| {
                let known = size.unwrap_or(0);
                Zip64LocalExtra {
                    original_size: known,
                    compressed_size: known,
                }
            }),
        };

        let header_offset = self.bytes_written;
        if let Err(err) = self.write_record(&header, "write local file header") {
            self.state = WriteState::Failed;
            return Err(err);
        }

        tracing::trace!(name, ?size, zip64 = zip64_local, "began archive entry");
        self.state = WriteState::EntryOpen(EntryBuilder {
            name: name.to_string(),
            declared_size: size,
            size: 0,
            hasher: crc32fast::Hasher::new(),
            header_offset,
            zip64_local,
        });
        Ok(())
    }

    /// Append raw bytes to the open entry
    pub fn append_data(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        let entry = match &mut self.state {
            WriteState::EntryOpen(entry) => entry,
            WriteState::NoEntry => return Err(ArchiveError::NoEntryOpen),
            WriteState::Done => return Err(ArchiveError::AlreadyFinished),
            WriteState::Failed => return Err(ArchiveError::Failed),
        };

        entry.hasher.update(data);
        entry.size += data.len() as u64;

        if let Err(source) = self.sink.write_all(data) {
            self.state = WriteState::Failed;
            return Err(ArchiveError::Io {
                operation: "write entry data",
                source,
            });
        }
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Seal the open entry with a data descriptor
    pub fn close_entry(&mut self) -> Result<(), ArchiveError> {
        let entry = match std::mem::replace(&mut self.state, WriteState::NoEntry) {
            WriteState::EntryOpen(entry) => entry,
            other => {
                let err = match other {
                    WriteState::Done => ArchiveError::AlreadyFinished,
                    WriteState::Failed => ArchiveError::Failed,
                    _ => ArchiveError::NoEntryOpen,
                };
                self.state = other;
                return Err(err);
            }
        };

        if let Some(declared) = entry.declared_size {
            if declared != entry.size {
                self.state = WriteState::Failed;
                return Err(ArchiveError::SizeMismatch {
                    name: entry.name,
                    declared,
                    actual: entry.size,
                });
            }
        }

        let crc32 = entry.hasher.finalize();
        let zip64_descriptor = self.force_zip64 || exceeds_u32(entry.size);
        let descriptor = DataDescriptor {
            crc32,
            size: entry.size,
            zip64: zip64_descriptor,
        };
        if let Err(err) = self.write_record(&descriptor, "write data descriptor") {
            self.state = WriteState::Failed;
            return Err(err);
        }

        if zip64_descriptor && !entry.zip64_local {
            tracing::debug!(
                name = %entry.name,
                size = entry.size,
                "entry grew past 32-bit limit, promoted to zip64"
            );
        }

        self.entries.push(FinishedEntry {
            name: entry.name,
            crc32,
            size: entry.size,
            header_offset: entry.header_offset,
            zip64: entry.zip64_local || zip64_descriptor,
        });
        Ok(())
    }

    /// Write the central directory and end records; returns total bytes written
    pub fn finish(&mut self) -> Result<u64, ArchiveError> {
        match &self.state {
            WriteState::NoEntry => {}
            WriteState::EntryOpen(open) => {
                return Err(ArchiveError::EntryStillOpen {
                    name: open.name.clone(),
                })
            }
            WriteState::Done => return Err(ArchiveError::AlreadyFinished),
            WriteState::Failed => return Err(ArchiveError::Failed),
        }

        match self.write_trailer() {
            Ok(entry_count) => {
                self.state = WriteState::Done;
                tracing::debug!(
                    entries = entry_count,
                    bytes = self.bytes_written,
                    "archive finished"
                );
                Ok(self.bytes_written)
            }
            Err(err) => {
                self.state = WriteState::Failed;
                Err(err)
            }
        }
    }

    /// Central directory, zip64 records and EOCD; returns the entry count
    fn write_trailer(&mut self) -> Result<u64, ArchiveError> {
        let directory_offset = self.bytes_written;
        let entries = std::mem::take(&mut self.entries);
        let mut any_entry_zip64 = false;

        for entry in &entries {
            let zip64 = self.force_zip64
                || entry.zip64
                || exceeds_u32(entry.size)
                || exceeds_u32(entry.header_offset);
            any_entry_zip64 |= zip64;

            let header = CentralDirectoryHeader {
                name: &entry.name,
                modified: self.modified,
                crc32: entry.crc32,
                size: entry.size,
                local_header_offset: entry.header_offset,
                zip64,
            };
            self.write_record(&header, "write central directory header")?;
        }

        let directory_size = self.bytes_written - directory_offset;
        let entry_count = entries.len() as u64;
        let zip64 = self.force_zip64
            || any_entry_zip64
            || exceeds_u32(directory_offset)
            || exceeds_u32(directory_size)
            || exceeds_u16(entry_count);

        if zip64 {
            let end_of_directory_offset = self.bytes_written;
            let record = Zip64EndOfCentralDirectory {
                entries: entry_count,
                directory_size,
                directory_offset,
            };
            self.write_record(&record, "write zip64 end of central directory")?;
            let locator = Zip64EndOfCentralDirectoryLocator {
                end_of_directory_offset,
            };
            self.write_record(&locator, "write zip64 end of central directory locator")?;
        }

        let end = EndOfCentralDirectory {
            entries: entry_count,
            directory_size,
            directory_offset,
            zip64,
        };
        self.write_record(&end, "write end of central directory")?;

        self.sink.flush().map_err(|source| ArchiveError::Io {
            operation: "flush archive",
            source,
        })?;
        tracing::trace!(zip64, "wrote archive trailer");
        Ok(entry_count)
    }

    /// Borrow the underlying sink
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Recover the underlying sink
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn write_record<R: BinaryWrite>(
        &mut self,
        record: &R,
        operation: &'static str,
    ) -> Result<(), ArchiveError> {
        record
            .write_to(&mut self.sink)
            .map_err(|source| ArchiveError::Io { operation, source })?;
        self.bytes_written += record.serialized_size() as u64;
        Ok(())
    }
}
