//! On-disk layout of `.xcpe` packages.
//!
//! Header (little-endian, `HEADER_SIZE` bytes):
//!
//! - `0`  signature `XCWP` (4)
//! - `4`  format version, i32 (4)
//! - `8`  SHA-256 over every byte from `HASH_START` to the end (32)
//! - `40` total file length, i64 (8)
//! - `48` metadata length, i32 (4)
//! - `52` metadata JSON, followed by two reserved i64 block offsets
//!   (written as zero, never read) and zero padding.
//!
//! The data section starts at `HEADER_SIZE` and holds tag-prefixed blocks in
//! a fixed order: parameters, shader code, image resources, end marker.
use std::fmt;

pub const SIGNATURE: &[u8; 4] = b"XCWP";
pub const CURRENT_VERSION: i32 = 1;
pub const HEADER_SIZE: usize = 1024;
pub const HASH_OFFSET: usize = 8;
pub const HASH_LEN: usize = 32;
pub const FILE_LENGTH_OFFSET: usize = 40;
pub const HASH_START: usize = 48;
pub const METADATA_OFFSET: usize = HASH_START + 4;
/// Two reserved i64 block offsets written after the metadata.
pub const RESERVED_OFFSETS_LEN: usize = 16;
pub const PACKAGE_EXTENSION: &str = "xcpe";
/// Line that separates pass sources inside the shader code block.
pub const PASS_SEPARATOR: &str = "//=====PASS_SEPARATOR=====";

/// Largest metadata JSON that still fits in the fixed header.
pub const MAX_METADATA_LEN: usize = HEADER_SIZE - METADATA_OFFSET - RESERVED_OFFSETS_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockTag {
    Parameters = 0,
    ShaderCode = 1,
    ImageResources = 2,
    EndOfFile = 255,
}

impl BlockTag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parameters => "parameters",
            Self::ShaderCode => "shader code",
            Self::ImageResources => "image resources",
            Self::EndOfFile => "end-of-file",
        };
        f.write_str(name)
    }
}

/// Why a bounded read failed; converted into `PackageError` by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFault {
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },
    InvalidLength {
        what: &'static str,
        length: i64,
        offset: u64,
    },
}

/// Cursor over an in-memory package that refuses to read, or allocate for,
/// anything past the end of the buffer.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn at(bytes: &'a [u8], position: usize) -> Self {
        Self { bytes, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ReadFault> {
        if len > self.remaining() {
            return Err(ReadFault::Truncated {
                offset: self.position as u64,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadFault> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadFault> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64, ReadFault> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads an i32 length and checks it against the bytes that follow it.
    pub fn read_len(&mut self, what: &'static str) -> Result<usize, ReadFault> {
        let offset = self.position as u64;
        let length = self.read_i32()?;
        checked_len(what, i64::from(length), offset, self.remaining())
    }

    /// Reads an i32 length followed by that many bytes.
    pub fn read_prefixed(&mut self, what: &'static str) -> Result<&'a [u8], ReadFault> {
        let len = self.read_len(what)?;
        self.take(len)
    }
}

/// Validates a length field read at `offset` against `available` bytes.
pub fn checked_len(
    what: &'static str,
    length: i64,
    offset: u64,
    available: usize,
) -> Result<usize, ReadFault> {
    usize::try_from(length)
        .ok()
        .filter(|len| *len <= available)
        .ok_or(ReadFault::InvalidLength {
            what,
            length,
            offset,
        })
}

/// Appends an i32 length prefix. Blocks are bounded by i32 in the format.
pub fn push_len(buf: &mut Vec<u8>, len: usize) -> Option<()> {
    let len = i32::try_from(len).ok()?;
    buf.extend_from_slice(&len.to_le_bytes());
    Some(())
}

/// Builds the fixed header with zeroed hash and length fields.
pub fn build_header(metadata_json: &[u8]) -> Option<Vec<u8>> {
    if metadata_json.len() > MAX_METADATA_LEN {
        return None;
    }
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(SIGNATURE);
    header.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    header.extend_from_slice(&[0u8; HASH_LEN]);
    header.extend_from_slice(&0i64.to_le_bytes());
    push_len(&mut header, metadata_json.len())?;
    header.extend_from_slice(metadata_json);
    header.extend_from_slice(&[0u8; RESERVED_OFFSETS_LEN]);
    header.resize(HEADER_SIZE, 0);
    Some(header)
}

/// Joins pass sources into one shader code block, in pass order.
pub fn join_passes<S: AsRef<str>>(passes: &[S]) -> String {
    let separator = format!("{PASS_SEPARATOR}\n");
    passes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Splits a shader code block back into pass sources. The separator only
/// counts when a `\n` or `\r\n` follows it. Empty code yields no passes.
pub fn split_passes(code: &str) -> Vec<String> {
    if code.is_empty() {
        return Vec::new();
    }
    let mut passes = Vec::new();
    let mut pass_start = 0;
    let mut search_from = 0;
    while let Some(found) = code[search_from..].find(PASS_SEPARATOR) {
        let index = search_from + found;
        let after = &code[index + PASS_SEPARATOR.len()..];
        let line_break = if after.starts_with("\r\n") {
            2
        } else if after.starts_with('\n') {
            1
        } else {
            search_from = index + PASS_SEPARATOR.len();
            continue;
        };
        passes.push(code[pass_start..index].to_string());
        pass_start = index + PASS_SEPARATOR.len() + line_break;
        search_from = pass_start;
    }
    passes.push(code[pass_start..].to_string());
    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_offsets() {
        let header = build_header(br#"{"ID":"x"}"#).unwrap();
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[..4], SIGNATURE);
        assert_eq!(&header[4..8], &1i32.to_le_bytes());
        assert!(header[HASH_OFFSET..HASH_START].iter().all(|b| *b == 0));
        assert_eq!(&header[HASH_START..METADATA_OFFSET], &10i32.to_le_bytes());
        assert_eq!(&header[METADATA_OFFSET..METADATA_OFFSET + 10], br#"{"ID":"x"}"#);
        assert!(header[METADATA_OFFSET + 10..].iter().all(|b| *b == 0));
    }

    #[test]
    fn header_rejects_oversized_metadata() {
        assert_eq!(MAX_METADATA_LEN, 1024 - 52 - 16);
        assert!(build_header(&vec![b'a'; MAX_METADATA_LEN]).is_some());
        assert!(build_header(&vec![b'a'; MAX_METADATA_LEN + 1]).is_none());
    }

    #[test]
    fn passes_split_on_separator_lines() {
        let code = join_passes(&["pass one\n", "pass two"]);
        assert_eq!(code, "pass one\n//=====PASS_SEPARATOR=====\npass two");
        assert_eq!(split_passes(&code), vec!["pass one\n", "pass two"]);

        let crlf = "a\r\n//=====PASS_SEPARATOR=====\r\nb";
        assert_eq!(split_passes(crlf), vec!["a\r\n", "b"]);

        let inline = "x // =====PASS_SEPARATOR===== y //=====PASS_SEPARATOR===== z";
        assert_eq!(split_passes(inline), vec![inline]);
        assert!(split_passes("").is_empty());
    }

    #[test]
    fn reader_bounds_lengths_against_remaining_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&100i32.to_le_bytes());

        let mut reader = ByteReader::at(&bytes, 0);
        assert_eq!(reader.read_prefixed("name").unwrap(), b"abc");
        assert!(matches!(
            reader.read_len("negative"),
            Err(ReadFault::InvalidLength { length: -1, .. })
        ));
        assert!(matches!(
            reader.read_len("oversized"),
            Err(ReadFault::InvalidLength { length: 100, offset: 11, .. })
        ));
        assert!(matches!(
            reader.read_u8(),
            Err(ReadFault::Truncated { needed: 1, available: 0, .. })
        ));
    }
}
