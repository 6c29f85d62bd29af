use super::{ArchiveError, ArchiveWriter};
use std::io::Write;

/// Entry holding the encrypted payload stream
pub const PAYLOAD_ENTRY_NAME: &str = "payload";

/// Entry holding the JSON manifest
pub const MANIFEST_ENTRY_NAME: &str = "manifest";

/// Two-entry TDF container: the payload stream followed by the manifest
///
/// The payload is always streamed with an unknown size in zip64 mode,
/// which also keeps it the first (and largest) entry in the archive.
#[derive(Debug)]
pub struct TdfArchiveWriter<W: Write> {
    archive: ArchiveWriter<W>,
}

impl<W: Write> TdfArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        TdfArchiveWriter {
            archive: ArchiveWriter::new(sink),
        }
    }

    /// Wrap an already configured serializer
    pub fn from_archive(archive: ArchiveWriter<W>) -> Self {
        TdfArchiveWriter { archive }
    }

    pub fn begin_payload_stream(&mut self) -> Result<(), ArchiveError> {
        self.archive.force_zip64();
        self.archive.begin_entry(PAYLOAD_ENTRY_NAME, None)
    }

    pub fn append_payload(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        self.archive.append_data(data)
    }

    pub fn close_payload_stream(&mut self) -> Result<(), ArchiveError> {
        self.archive.close_entry()
    }

    /// Write the manifest entry; the payload stream must be closed first
    pub fn append_manifest(&mut self, manifest_json: &str) -> Result<(), ArchiveError> {
        let bytes = manifest_json.as_bytes();
        self.archive
            .begin_entry(MANIFEST_ENTRY_NAME, Some(bytes.len() as u64))?;
        self.archive.append_data(bytes)?;
        self.archive.close_entry()
    }

    /// Finish the archive, returning the total number of bytes written
    pub fn finish(&mut self) -> Result<u64, ArchiveError> {
        self.archive.finish()
    }

    pub fn bytes_written(&self) -> u64 {
        self.archive.bytes_written()
    }

    pub fn into_inner(self) -> W {
        self.archive.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_payload_then_manifest() -> Result<(), ArchiveError> {
        let mut writer = TdfArchiveWriter::new(Vec::new());
        writer.begin_payload_stream()?;
        writer.append_payload(b"ciphertext-1")?;
        writer.append_payload(b"ciphertext-2")?;
        writer.close_payload_stream()?;
        writer.append_manifest(r#"{"payload":{}}"#)?;
        let total = writer.finish()?;

        let bytes = writer.into_inner();
        assert_eq!(total, bytes.len() as u64);

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), PAYLOAD_ENTRY_NAME);
        assert_eq!(archive.by_index(1).unwrap().name(), MANIFEST_ENTRY_NAME);

        let mut payload = Vec::new();
        archive
            .by_name(PAYLOAD_ENTRY_NAME)
            .unwrap()
            .read_to_end(&mut payload)
            .unwrap();
        assert_eq!(payload, b"ciphertext-1ciphertext-2");
        Ok(())
    }

    #[test]
    fn test_manifest_before_payload_closed_fails() {
        let mut writer = TdfArchiveWriter::new(Vec::new());
        writer.begin_payload_stream().unwrap();
        writer.append_payload(b"data").unwrap();
        let err = writer.append_manifest("{}").unwrap_err();
        assert!(matches!(err, ArchiveError::EntryAlreadyOpen { .. }));
        assert!(err.is_state_error());
    }
}
