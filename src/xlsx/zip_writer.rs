//! Streaming ZIP writer that compresses entries on-the-fly
//!
//! Entries are deflated straight into the output and closed with a data
//! descriptor, so the writer never seeks and never needs temp files.

use crate::error::{ExportError, Result};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

const LOCAL_HEADER_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_DESCRIPTOR_SIG: [u8; 4] = [0x50, 0x4b, 0x07, 0x08];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const END_OF_CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// Sizes are stored in descriptor bit 3 mode, deflate method.
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const METHOD_DEFLATE: u16 = 8;
const VERSION: u16 = 20;

/// Entry already written, kept for the central directory
struct ZipEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Writer that counts bytes as they pass to the output
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn put(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.write_all(data)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct CurrentEntry<W: Write> {
    name: String,
    local_header_offset: u64,
    data_offset: u64,
    crc: Crc32,
    uncompressed_size: u64,
    encoder: DeflateEncoder<CountingWriter<W>>,
}

/// Streaming ZIP writer
///
/// At most one entry is open at a time. Starting a new entry closes the
/// previous one.
pub struct StreamingZipWriter<W: Write> {
    output: Option<CountingWriter<W>>,
    current: Option<CurrentEntry<W>>,
    entries: Vec<ZipEntry>,
    compression_level: u32,
}

impl<W: Write> StreamingZipWriter<W> {
    /// Wrap `output`; `compression_level` is clamped to 0..=9
    pub fn new(output: W, compression_level: u32) -> Self {
        StreamingZipWriter {
            output: Some(CountingWriter {
                inner: output,
                written: 0,
            }),
            current: None,
            entries: Vec::new(),
            compression_level: compression_level.min(9),
        }
    }

    /// Start a new entry (file) in the archive
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.finish_current_entry()?;

        let mut out = self.take_output()?;
        let local_header_offset = out.written;
        let name_len = entry_name_len(name)?;

        out.put(&LOCAL_HEADER_SIG)?;
        out.put(&VERSION.to_le_bytes())?;
        out.put(&FLAG_DATA_DESCRIPTOR.to_le_bytes())?;
        out.put(&METHOD_DEFLATE.to_le_bytes())?;
        out.put(&[0, 0, 0, 0])?; // mod time/date
        out.put(&0u32.to_le_bytes())?; // crc32, in descriptor
        out.put(&0u32.to_le_bytes())?; // compressed size, in descriptor
        out.put(&0u32.to_le_bytes())?; // uncompressed size, in descriptor
        out.put(&name_len.to_le_bytes())?;
        out.put(&0u16.to_le_bytes())?; // extra len
        out.put(name.as_bytes())?;

        let data_offset = out.written;
        self.current = Some(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            data_offset,
            crc: Crc32::new(),
            uncompressed_size: 0,
            encoder: DeflateEncoder::new(out, Compression::new(self.compression_level)),
        });
        Ok(())
    }

    /// Write uncompressed data to the open entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| ExportError::Write("No entry started".to_string()))?;
        entry.crc.update(data);
        entry.uncompressed_size += data.len() as u64;
        entry.encoder.write_all(data)?;
        Ok(())
    }

    fn finish_current_entry(&mut self) -> Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let mut out = entry.encoder.finish()?;
        let crc32 = entry.crc.finalize();
        let compressed_size = out.written - entry.data_offset;

        out.put(&DATA_DESCRIPTOR_SIG)?;
        out.put(&crc32.to_le_bytes())?;
        out.put(&to_u32(compressed_size)?.to_le_bytes())?;
        out.put(&to_u32(entry.uncompressed_size)?.to_le_bytes())?;

        self.entries.push(ZipEntry {
            name: entry.name,
            local_header_offset: entry.local_header_offset,
            crc32,
            compressed_size,
            uncompressed_size: entry.uncompressed_size,
        });
        self.output = Some(out);
        Ok(())
    }

    /// Close the last entry, write the central directory and return the
    /// underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;
        let mut out = self.take_output()?;

        let central_dir_offset = out.written;
        for entry in &self.entries {
            out.put(&CENTRAL_DIR_SIG)?;
            out.put(&VERSION.to_le_bytes())?; // version made by
            out.put(&VERSION.to_le_bytes())?; // version needed
            out.put(&FLAG_DATA_DESCRIPTOR.to_le_bytes())?;
            out.put(&METHOD_DEFLATE.to_le_bytes())?;
            out.put(&[0, 0, 0, 0])?; // mod time/date
            out.put(&entry.crc32.to_le_bytes())?;
            out.put(&to_u32(entry.compressed_size)?.to_le_bytes())?;
            out.put(&to_u32(entry.uncompressed_size)?.to_le_bytes())?;
            out.put(&entry_name_len(&entry.name)?.to_le_bytes())?;
            out.put(&0u16.to_le_bytes())?; // extra len
            out.put(&0u16.to_le_bytes())?; // file comment len
            out.put(&0u16.to_le_bytes())?; // disk number start
            out.put(&0u16.to_le_bytes())?; // internal attrs
            out.put(&0u32.to_le_bytes())?; // external attrs
            out.put(&to_u32(entry.local_header_offset)?.to_le_bytes())?;
            out.put(entry.name.as_bytes())?;
        }
        let central_dir_size = out.written - central_dir_offset;

        let count = u16::try_from(self.entries.len())
            .map_err(|_| ExportError::Write("too many ZIP entries".to_string()))?;
        out.put(&END_OF_CENTRAL_DIR_SIG)?;
        out.put(&0u16.to_le_bytes())?; // disk number
        out.put(&0u16.to_le_bytes())?; // disk with central dir
        out.put(&count.to_le_bytes())?;
        out.put(&count.to_le_bytes())?;
        out.put(&to_u32(central_dir_size)?.to_le_bytes())?;
        out.put(&to_u32(central_dir_offset)?.to_le_bytes())?;
        out.put(&0u16.to_le_bytes())?; // comment len

        out.flush()?;
        Ok(out.inner)
    }

    fn take_output(&mut self) -> Result<CountingWriter<W>> {
        self.output
            .take()
            .ok_or_else(|| ExportError::Write("ZIP output is unavailable".to_string()))
    }
}

// No ZIP64 support: archives are limited to 4 GiB.
fn to_u32(n: u64) -> Result<u32> {
    u32::try_from(n).map_err(|_| ExportError::Write("ZIP archive exceeds 4 GiB".to_string()))
}

fn entry_name_len(name: &str) -> Result<u16> {
    u16::try_from(name.len())
        .map_err(|_| ExportError::Write(format!("ZIP entry name too long: {}", name.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_single_entry_layout() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        zip.start_entry("a.txt").unwrap();
        zip.write_data(b"hello ").unwrap();
        zip.write_data(b"world").unwrap();
        let buf = zip.finish().unwrap();

        assert_eq!(&buf[..4], &LOCAL_HEADER_SIG);
        assert_eq!(u16_at(&buf, 26), 5);
        assert_eq!(&buf[30..35], b"a.txt");

        // End of central directory is the last 22 bytes
        let eocd = buf.len() - 22;
        assert_eq!(&buf[eocd..eocd + 4], &END_OF_CENTRAL_DIR_SIG);
        assert_eq!(u16_at(&buf, eocd + 10), 1);

        let cd_offset = u32_at(&buf, eocd + 16) as usize;
        assert_eq!(&buf[cd_offset..cd_offset + 4], &CENTRAL_DIR_SIG);
        let crc = u32_at(&buf, cd_offset + 16);
        let compressed = u32_at(&buf, cd_offset + 20) as usize;
        assert_eq!(u32_at(&buf, cd_offset + 24), 11);
        assert_eq!(crc, crc32fast::hash(b"hello world"));

        let mut text = String::new();
        DeflateDecoder::new(&buf[35..35 + compressed])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello world");

        // Data descriptor directly follows the compressed data
        assert_eq!(&buf[35 + compressed..39 + compressed], &DATA_DESCRIPTOR_SIG);
    }

    #[test]
    fn test_multiple_entries() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 1);
        for name in ["one.xml", "two.xml", "three.xml"] {
            zip.start_entry(name).unwrap();
            zip.write_data(name.as_bytes()).unwrap();
        }
        let buf = zip.finish().unwrap();

        let eocd = buf.len() - 22;
        assert_eq!(u16_at(&buf, eocd + 8), 3);
        assert_eq!(u16_at(&buf, eocd + 10), 3);
    }

    #[test]
    fn test_write_without_entry() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        assert!(matches!(
            zip.write_data(b"x"),
            Err(ExportError::Write(_))
        ));
    }
}
