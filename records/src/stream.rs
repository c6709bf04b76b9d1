//! Framing of the `application/octet-stream` record stream.
//!
//! Each record is an 8-byte big-endian header followed by a body:
//!
//! | bytes | field       |
//! |-------|-------------|
//! | 0..2  | version (2) |
//! | 2..4  | type size   |
//! | 4..8  | data size   |
//!
//! The body is a NUL-terminated record type name (`type size` bytes,
//! terminator included) followed by `data size` bytes of record data.

use crate::RecordError;
use byteorder::{BigEndian as BE, ByteOrder, ReadBytesExt};
use std::io::Read;

pub const RECORD_VERSION: i16 = 2;
pub const HEADER_SIZE: usize = 8;

const READ_CHUNK: usize = 64 * 1024;

/// Upper bound on body space reserved ahead of the bytes arriving.
const MAX_RESERVE: usize = 1024 * 1024;

/// An undecoded record: its type name and raw data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub rectype: String,
    pub data: Vec<u8>,
}

impl RawRecord {
    fn from_body(mut body: Vec<u8>) -> Result<Self, RecordError> {
        let name_len = body.iter().position(|b| *b == 0).unwrap_or(body.len());
        if !body[..name_len].is_ascii() {
            return Err(RecordError::Utf8);
        }
        let rectype = String::from_utf8_lossy(&body[..name_len]).into_owned();
        let data = body.split_off((name_len + 1).min(body.len()));
        Ok(Self { rectype, data })
    }

    /// Serializes this record with its stream header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let type_size = self.rectype.len() + 1;
        let mut hdr = [0_u8; HEADER_SIZE];
        BE::write_i16(&mut hdr[0..2], RECORD_VERSION);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        {
            BE::write_i16(&mut hdr[2..4], type_size as i16);
            BE::write_i32(&mut hdr[4..8], self.data.len() as i32);
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + type_size + self.data.len());
        buf.extend_from_slice(&hdr);
        buf.extend_from_slice(self.rectype.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// Incremental record stream parser.
///
/// Bytes may be fed in chunks of any size; chunk boundaries need not
/// align with record boundaries.
#[derive(Debug, Default)]
pub struct RecordStream {
    header: [u8; HEADER_SIZE],
    header_len: usize,
    body: Vec<u8>,
    body_size: usize,
}

impl RecordStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `chunk`, returning every record it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
        let mut records = Vec::new();
        let mut i = 0;
        while i < chunk.len() {
            if self.header_len < HEADER_SIZE {
                let take = (chunk.len() - i).min(HEADER_SIZE - self.header_len);
                self.header[self.header_len..self.header_len + take]
                    .copy_from_slice(&chunk[i..i + take]);
                self.header_len += take;
                i += take;
                if self.header_len == HEADER_SIZE {
                    self.start_body()?;
                }
            } else {
                let take = (chunk.len() - i).min(self.body_size - self.body.len());
                self.body.extend_from_slice(&chunk[i..i + take]);
                i += take;
                if self.body.len() == self.body_size {
                    let body = std::mem::take(&mut self.body);
                    records.push(RawRecord::from_body(body)?);
                    self.header_len = 0;
                    self.body_size = 0;
                }
            }
        }
        Ok(records)
    }

    /// Returns `true` when no partial record is buffered.
    pub fn is_idle(&self) -> bool {
        self.header_len == 0
    }

    /// Reads `rdr` to exhaustion, returning every complete record.
    pub fn read_all<R: Read>(mut rdr: R) -> Result<Vec<RawRecord>, RecordError> {
        let mut stream = Self::new();
        let mut records = Vec::new();
        let mut buf = vec![0_u8; READ_CHUNK];
        loop {
            let n = rdr.read(&mut buf)?;
            if n == 0 {
                break;
            }
            records.extend(stream.feed(&buf[..n])?);
        }
        Ok(records)
    }

    fn start_body(&mut self) -> Result<(), RecordError> {
        let hdr = &mut &self.header[..];
        let version = hdr.read_i16::<BE>()?;
        if version != RECORD_VERSION {
            return Err(RecordError::InvalidVersion(version));
        }
        let type_size = i64::from(hdr.read_i16::<BE>()?);
        let data_size = i64::from(hdr.read_i32::<BE>()?);
        let size = type_size + data_size;
        match usize::try_from(size) {
            Err(_) => Err(RecordError::InvalidSize(size)),
            Ok(0) => {
                // Nothing follows a zero-sized record's header.
                self.header_len = 0;
                Ok(())
            }
            Ok(size) => {
                self.body_size = size;
                self.body.reserve(size.min(MAX_RESERVE));
                Ok(())
            }
        }
    }
}
