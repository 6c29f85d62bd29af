//! Binary records of the ZIP container format
//!
//! Each record knows how to write itself to any `Write` sink and how many
//! bytes it occupies. All multi-byte integers are little-endian.

use std::io::{self, Write};

/// Sentinel stored in 32-bit size/offset fields when the real value lives in
/// a zip64 extra field. Values at or above this threshold require zip64.
pub const ZIP64_MAGIC: u32 = 0xFFFF_FFFF;

/// Sentinel stored in 16-bit entry-count fields in zip64 mode.
pub const ZIP64_MAGIC_COUNT: u16 = 0xFFFF;

/// "Version needed to extract" for zip64 (4.5).
pub const ZIP_VERSION: u16 = 45;

/// General purpose flag bit 3: sizes and CRC follow in a data descriptor.
pub const DATA_DESCRIPTOR_FLAG: u16 = 0x08;

/// Compression method 0, stored.
pub const METHOD_STORED: u16 = 0;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
const ZIP64_END_OF_CD_SIGNATURE: u32 = 0x0606_4b50;
const ZIP64_END_OF_CD_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const END_OF_CD_SIGNATURE: u32 = 0x0605_4b50;

const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Trait for records that can be written in their on-disk form
pub trait BinaryWrite {
    /// Write this record to a binary writer
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Get the size in bytes when serialized
    fn serialized_size(&self) -> usize;
}

/// Returns true when a size or offset cannot be stored in a 32-bit field
pub fn exceeds_u32(value: u64) -> bool {
    value >= u64::from(ZIP64_MAGIC)
}

/// Returns true when an entry count cannot be stored in a 16-bit field
pub fn exceeds_u16(count: u64) -> bool {
    count >= u64::from(ZIP64_MAGIC_COUNT)
}

pub fn write_u16_le<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn u16_len(len: usize) -> io::Result<u16> {
    u16::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "field longer than 65535 bytes",
        )
    })
}

/// MS-DOS packed modification time and date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Pack a calendar timestamp. Years before 1980 clamp to 1980-01-01.
    pub fn from_datetime(dt: &chrono::NaiveDateTime) -> Self {
        use chrono::{Datelike, Timelike};

        if dt.year() < 1980 {
            return DosDateTime {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        let year = (dt.year() - 1980).min(127) as u16;
        let date = (year << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time =
            ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
        DosDateTime { time, date }
    }
}

/// Zip64 extended information stored in a local file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64LocalExtra {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl BinaryWrite for Zip64LocalExtra {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u16_le(writer, ZIP64_EXTRA_ID)?;
        write_u16_le(writer, 16)?;
        write_u64_le(writer, self.original_size)?;
        write_u64_le(writer, self.compressed_size)
    }

    fn serialized_size(&self) -> usize {
        20
    }
}

/// Local file header, followed by the file name and an optional zip64 extra
#[derive(Debug, Clone)]
pub struct LocalFileHeader<'a> {
    pub name: &'a str,
    pub modified: DosDateTime,
    pub zip64: Option<Zip64LocalExtra>,
}

impl BinaryWrite for LocalFileHeader<'_> {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let (size_field, extra_len) = match &self.zip64 {
            Some(extra) => (ZIP64_MAGIC, extra.serialized_size()),
            None => (0, 0),
        };

        write_u32_le(writer, LOCAL_FILE_HEADER_SIGNATURE)?;
        write_u16_le(writer, ZIP_VERSION)?;
        write_u16_le(writer, DATA_DESCRIPTOR_FLAG)?;
        write_u16_le(writer, METHOD_STORED)?;
        write_u16_le(writer, self.modified.time)?;
        write_u16_le(writer, self.modified.date)?;
        // CRC is deferred to the data descriptor
        write_u32_le(writer, 0)?;
        write_u32_le(writer, size_field)?;
        write_u32_le(writer, size_field)?;
        write_u16_le(writer, u16_len(self.name.len())?)?;
        write_u16_le(writer, u16_len(extra_len)?)?;
        writer.write_all(self.name.as_bytes())?;
        if let Some(extra) = &self.zip64 {
            extra.write_to(writer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        30 + self.name.len() + self.zip64.map_or(0, |e| e.serialized_size())
    }
}

/// Data descriptor trailing an entry's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub size: u64,
    pub zip64: bool,
}

impl BinaryWrite for DataDescriptor {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32_le(writer, DATA_DESCRIPTOR_SIGNATURE)?;
        write_u32_le(writer, self.crc32)?;
        if self.zip64 {
            write_u64_le(writer, self.size)?;
            write_u64_le(writer, self.size)
        } else {
            // Callers only pick the 32-bit form for sizes below the threshold
            let size = u32::try_from(self.size).unwrap_or(ZIP64_MAGIC);
            write_u32_le(writer, size)?;
            write_u32_le(writer, size)
        }
    }

    fn serialized_size(&self) -> usize {
        if self.zip64 {
            24
        } else {
            16
        }
    }
}

/// Zip64 extended information stored in a central directory header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64CentralExtra {
    pub original_size: u64,
    pub compressed_size: u64,
    pub local_header_offset: u64,
}

impl BinaryWrite for Zip64CentralExtra {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u16_le(writer, ZIP64_EXTRA_ID)?;
        write_u16_le(writer, 24)?;
        write_u64_le(writer, self.original_size)?;
        write_u64_le(writer, self.compressed_size)?;
        write_u64_le(writer, self.local_header_offset)
    }

    fn serialized_size(&self) -> usize {
        28
    }
}

/// Central directory file header
#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader<'a> {
    pub name: &'a str,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub size: u64,
    pub local_header_offset: u64,
    pub zip64: bool,
}

impl CentralDirectoryHeader<'_> {
    fn extra(&self) -> Option<Zip64CentralExtra> {
        self.zip64.then_some(Zip64CentralExtra {
            original_size: self.size,
            compressed_size: self.size,
            local_header_offset: self.local_header_offset,
        })
    }
}

impl BinaryWrite for CentralDirectoryHeader<'_> {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let extra = self.extra();
        let (size_field, offset_field) = if extra.is_some() {
            (ZIP64_MAGIC, ZIP64_MAGIC)
        } else {
            (
                u32::try_from(self.size).unwrap_or(ZIP64_MAGIC),
                u32::try_from(self.local_header_offset).unwrap_or(ZIP64_MAGIC),
            )
        };
        let extra_len = extra.map_or(0, |e| e.serialized_size());

        write_u32_le(writer, CENTRAL_DIRECTORY_SIGNATURE)?;
        write_u16_le(writer, ZIP_VERSION)?; // version made by
        write_u16_le(writer, ZIP_VERSION)?; // version needed
        write_u16_le(writer, DATA_DESCRIPTOR_FLAG)?;
        write_u16_le(writer, METHOD_STORED)?;
        write_u16_le(writer, self.modified.time)?;
        write_u16_le(writer, self.modified.date)?;
        write_u32_le(writer, self.crc32)?;
        write_u32_le(writer, size_field)?;
        write_u32_le(writer, size_field)?;
        write_u16_le(writer, u16_len(self.name.len())?)?;
        write_u16_le(writer, u16_len(extra_len)?)?;
        write_u16_le(writer, 0)?; // comment length
        write_u16_le(writer, 0)?; // disk number start
        write_u16_le(writer, 0)?; // internal attributes
        write_u32_le(writer, 0)?; // external attributes
        write_u32_le(writer, offset_field)?;
        writer.write_all(self.name.as_bytes())?;
        if let Some(extra) = extra {
            extra.write_to(writer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        46 + self.name.len() + self.extra().map_or(0, |e| e.serialized_size())
    }
}

/// Zip64 end of central directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub entries: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
}

impl BinaryWrite for Zip64EndOfCentralDirectory {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32_le(writer, ZIP64_END_OF_CD_SIGNATURE)?;
        // Size of the remaining record, excluding signature and this field
        write_u64_le(writer, 44)?;
        write_u16_le(writer, ZIP_VERSION)?;
        write_u16_le(writer, ZIP_VERSION)?;
        write_u32_le(writer, 0)?; // this disk
        write_u32_le(writer, 0)?; // disk with central directory
        write_u64_le(writer, self.entries)?;
        write_u64_le(writer, self.entries)?;
        write_u64_le(writer, self.directory_size)?;
        write_u64_le(writer, self.directory_offset)
    }

    fn serialized_size(&self) -> usize {
        56
    }
}

/// Locator pointing at the zip64 end of central directory record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub end_of_directory_offset: u64,
}

impl BinaryWrite for Zip64EndOfCentralDirectoryLocator {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32_le(writer, ZIP64_END_OF_CD_LOCATOR_SIGNATURE)?;
        write_u32_le(writer, 0)?;
        write_u64_le(writer, self.end_of_directory_offset)?;
        write_u32_le(writer, 1) // total number of disks
    }

    fn serialized_size(&self) -> usize {
        20
    }
}

/// Standard end of central directory record
///
/// In zip64 mode every field is saturated and readers consult the zip64
/// record through the locator instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub entries: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
    pub zip64: bool,
}

impl BinaryWrite for EndOfCentralDirectory {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let (entries, size, offset) = if self.zip64 {
            (ZIP64_MAGIC_COUNT, ZIP64_MAGIC, ZIP64_MAGIC)
        } else {
            (
                u16::try_from(self.entries).unwrap_or(ZIP64_MAGIC_COUNT),
                u32::try_from(self.directory_size).unwrap_or(ZIP64_MAGIC),
                u32::try_from(self.directory_offset).unwrap_or(ZIP64_MAGIC),
            )
        };

        write_u32_le(writer, END_OF_CD_SIGNATURE)?;
        write_u16_le(writer, 0)?;
        write_u16_le(writer, 0)?;
        write_u16_le(writer, entries)?;
        write_u16_le(writer, entries)?;
        write_u32_le(writer, size)?;
        write_u32_le(writer, offset)?;
        write_u16_le(writer, 0) // comment length
    }

    fn serialized_size(&self) -> usize {
        22
    }
}
