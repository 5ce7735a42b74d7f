use std::io::{Read, Write};

use crate::{Error, Result};

/// Size of the file header: an 8 byte zero sentinel followed by 4 version
/// bytes. Data records start at this offset.
pub const HEADER_LEN: u64 = 12;

const SENTINEL: [u8; 8] = [0; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    /// Format version written into new store files.
    pub const CURRENT: Version = Version {
        major: 2,
        minor: 0,
        patch: 0,
    };
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The 12-byte prefix of every store file.
///
/// The sentinel is unambiguous: a record can never begin with eight zero
/// bytes, since that would require a zero-length key, value and mime.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: Version,
}

impl Header {
    pub fn new(version: Version) -> Self {
        Header { version }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SENTINEL)?;
        w.write_all(&[self.version.major, self.version.minor, self.version.patch, 0])?;
        Ok(())
    }

    /// Parse a header from the start of a file.
    ///
    /// A missing sentinel means the file predates format v2, which this
    /// version does not convert.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut sentinel = [0u8; 8];
        read_or_corrupt(r, &mut sentinel, "file too short to hold a header")?;
        if sentinel != SENTINEL {
            return Err(Error::Corrupt(
                "no header sentinel, file predates format v2".to_string(),
            ));
        }
        let mut version = [0u8; 4];
        read_or_corrupt(r, &mut version, "file too short to hold a header")?;
        Ok(Header {
            version: Version {
                major: version[0],
                minor: version[1],
                patch: version[2],
            },
        })
    }
}

/// A single record as laid out on disk: three little-endian `u32` length
/// fields followed by the key, value and mime bytes, with no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Vec<u8>,
    pub mime: String,
}

impl Record {
    /// Build a record, checking that every field length fits the 32-bit
    /// length prefix.
    pub fn new(key: &str, value: &[u8], mime: &str) -> Result<Self> {
        for len in [key.len(), value.len(), mime.len()] {
            if u32::try_from(len).is_err() {
                return Err(Error::TooLarge(len));
            }
        }
        Ok(Record {
            key: key.to_string(),
            value: value.to_vec(),
            mime: mime.to_string(),
        })
    }

    /// Encoded size in bytes as it appears on disk.
    pub fn encoded_len(&self) -> u64 {
        12 + (self.key.len() + self.value.len() + self.mime.len()) as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&(self.key.len() as u32).to_le_bytes())?;
        w.write_all(&(self.value.len() as u32).to_le_bytes())?;
        w.write_all(&(self.mime.len() as u32).to_le_bytes())?;
        w.write_all(self.key.as_bytes())?;
        w.write_all(&self.value)?;
        w.write_all(self.mime.as_bytes())?;
        Ok(())
    }

    /// Decode one record from the current position.
    ///
    /// Returns `Ok(None)` on a clean end of file, i.e. when no bytes remain
    /// where the next `key_length` field would start. EOF anywhere later in
    /// the record is a [`Error::ShortRead`].
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Record>> {
        let mut len = [0u8; 4];
        match fill(r, &mut len)? {
            Fill::Empty => return Ok(None),
            Fill::Partial => return Err(Error::ShortRead),
            Fill::Full => {}
        }
        let key_len = u32::from_le_bytes(len) as usize;
        let value_len = read_u32(r)? as usize;
        let mime_len = read_u32(r)? as usize;

        let key = read_bytes(r, key_len)?;
        let value = read_bytes(r, value_len)?;
        let mime = read_bytes(r, mime_len)?;

        let key = String::from_utf8(key)
            .map_err(|_| Error::Corrupt("record key is not valid UTF-8".to_string()))?;
        let mime = String::from_utf8(mime)
            .map_err(|_| Error::Corrupt("record mime is not valid UTF-8".to_string()))?;
        Ok(Some(Record { key, value, mime }))
    }
}

enum Fill {
    Empty,
    Partial,
    Full,
}

/// Read into `buf`, distinguishing EOF before the first byte from EOF midway.
fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<Fill> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(Fill::Empty),
            Ok(0) => return Ok(Fill::Partial),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Fill::Full)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    match fill(r, &mut buf)? {
        Fill::Full => Ok(u32::from_le_bytes(buf)),
        _ => Err(Error::ShortRead),
    }
}

fn read_bytes<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    match fill(r, &mut buf)? {
        Fill::Full => Ok(buf),
        _ => Err(Error::ShortRead),
    }
}

fn read_or_corrupt<R: Read>(r: &mut R, buf: &mut [u8], short_msg: &str) -> Result<()> {
    match fill(r, buf)? {
        Fill::Full => Ok(()),
        _ => Err(Error::Corrupt(short_msg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let header = Header::new(Version {
            major: 120,
            minor: 24,
            patch: 53,
        });
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        assert_eq!(buf.len() as u64, HEADER_LEN);
        assert_eq!(&buf[..8], &[0; 8]);
        assert_eq!(&buf[8..], &[120, 24, 53, 0]);

        let parsed = Header::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.version, header.version);
    }

    #[test]
    fn header_sentinel_required() {
        let mut buf = Vec::new();
        Record::new("k", b"v", "text/plain")
            .unwrap()
            .write_to(&mut buf)
            .unwrap();

        assert!(matches!(
            Header::read_from(&mut Cursor::new(&buf)),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn record_layout_little_endian() {
        let record = Record::new("key", b"hello", "text/plain").unwrap();
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();

        assert_eq!(&buf[..4], &3u32.to_le_bytes());
        assert_eq!(&buf[4..8], &5u32.to_le_bytes());
        assert_eq!(&buf[8..12], &10u32.to_le_bytes());
        assert_eq!(&buf[12..15], b"key");
        assert_eq!(&buf[15..20], b"hello");
        assert_eq!(&buf[20..], b"text/plain");
        assert_eq!(buf.len() as u64, record.encoded_len());
    }

    #[test]
    fn record_round_trip() {
        let record = Record::new("my-key", &[0, 5, 3, 134, 5, 0, 1, 0, 0], "application/octet-stream")
            .unwrap();
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();

        let decoded = Record::read_from(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn clean_eof_is_not_an_error() {
        let decoded = Record::read_from(&mut Cursor::new(&[])).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn truncation_is_a_short_read() {
        let record = Record::new("key", b"hello", "text/plain").unwrap();
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();

        // Cut the record anywhere and the decoder must report a short read.
        for end in 1..buf.len() {
            assert!(matches!(
                Record::read_from(&mut Cursor::new(&buf[..end])),
                Err(Error::ShortRead)
            ));
        }
    }

    #[test]
    fn invalid_utf8_key_is_corrupt() {
        let record = Record::new("key", b"v", "text/plain").unwrap();
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        buf[12] = 0xff;

        assert!(matches!(
            Record::read_from(&mut Cursor::new(&buf)),
            Err(Error::Corrupt(_))
        ));
    }
}
