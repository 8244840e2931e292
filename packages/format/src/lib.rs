#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Binary layout of an address container.
//!
//! ```text
//! magic            "street-index.addresses\0"
//! checksum         64 bytes, digest of the source map
//! principal table  repeated: code (3 bytes, space padded)
//!                            length (u32 little-endian)
//!                            MessagePack-encoded principal tree
//! table end        three spaces
//! street segment   MessagePack-encoded street tables, addressed by
//!                  offsets relative to the start of the segment
//! ```
//!
//! All integers are little-endian. Blobs are MessagePack with named
//! fields (`rmp-serde`).

use std::io::SeekFrom;

use serde::Serialize;
use serde::de::DeserializeOwned;
use street_index_models::{CHECKSUM_LEN, Checksum, PrincipalTree, StreetTable, StreetTableRef};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// File signature.
pub const MAGIC: &[u8] = b"street-index.addresses\0";

/// Width of a principal code in the table.
pub const CODE_LEN: usize = 3;

/// Marker that closes the principal table.
pub const TABLE_END: [u8; CODE_LEN] = *b"   ";

/// Errors that can occur while reading or writing a container.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The file does not start with [`MAGIC`].
    #[error("Not an address container (bad magic)")]
    BadMagic,

    /// The container was built from a different map.
    #[error("Container was built from a different map (checksum mismatch)")]
    ChecksumMismatch,

    /// The file ends before a complete structure could be read.
    #[error("Container is truncated")]
    Truncated,

    /// A subdivision code does not fit the three-byte table slot.
    #[error("Invalid principal subdivision code: {0:?}")]
    InvalidPrincipalCode(String),

    /// A principal subdivision was written after [`ContainerWriter::close_table`].
    #[error("Principal table is already closed")]
    TableClosed,

    /// A blob exceeds the `u32` length field.
    #[error("Blob of {0} bytes is too large")]
    TooLarge(usize),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e)
        }
    }
}

/// Table code of a full ISO 3166-2 code: `CA-ON` becomes `ON `.
///
/// # Errors
///
/// Returns [`FormatError::InvalidPrincipalCode`] if the part after the
/// country prefix is empty, longer than [`CODE_LEN`] bytes, or not ASCII
/// alphanumeric.
pub fn table_code(iso_code: &str) -> Result<[u8; CODE_LEN], FormatError> {
    let invalid = || FormatError::InvalidPrincipalCode(iso_code.to_string());

    let (_, short) = iso_code.split_once('-').ok_or_else(invalid)?;
    if short.is_empty() || short.len() > CODE_LEN || !short.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid());
    }

    let mut code = TABLE_END;
    code[..short.len()].copy_from_slice(short.as_bytes());
    Ok(code)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, FormatError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FormatError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Serializes a principal tree.
///
/// # Errors
///
/// Returns [`FormatError::Encode`] if serialization fails.
pub fn encode_tree(tree: &PrincipalTree) -> Result<Vec<u8>, FormatError> {
    encode(tree)
}

/// Deserializes a principal tree.
///
/// # Errors
///
/// Returns [`FormatError::Decode`] if the bytes are not a valid tree.
pub fn decode_tree(bytes: &[u8]) -> Result<PrincipalTree, FormatError> {
    decode(bytes)
}

/// Serializes a street table.
///
/// # Errors
///
/// Returns [`FormatError::Encode`] if serialization fails.
pub fn encode_street_table(table: &StreetTable) -> Result<Vec<u8>, FormatError> {
    encode(table)
}

/// Deserializes a street table.
///
/// # Errors
///
/// Returns [`FormatError::Decode`] if the bytes are not a valid table.
pub fn decode_street_table(bytes: &[u8]) -> Result<StreetTable, FormatError> {
    decode(bytes)
}

fn blob_len(bytes: &[u8]) -> Result<u32, FormatError> {
    u32::try_from(bytes.len()).map_err(|_| FormatError::TooLarge(bytes.len()))
}

/// Appends street tables to a street segment and hands out their
/// segment-relative references.
pub struct StreetSegmentWriter<W> {
    inner: W,
    offset: u64,
}

impl<W: AsyncWrite + Unpin> StreetSegmentWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner, offset: 0 }
    }

    /// Writes one table and returns where it landed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub async fn append(&mut self, table: &StreetTable) -> Result<StreetTableRef, FormatError> {
        let bytes = encode_street_table(table)?;
        let length = blob_len(&bytes)?;
        self.inner.write_all(&bytes).await?;

        let table_ref = StreetTableRef {
            offset: self.offset,
            length,
        };
        self.offset += u64::from(length);
        Ok(table_ref)
    }

    /// Total bytes written so far.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub async fn finish(mut self) -> Result<W, FormatError> {
        self.inner.flush().await?;
        Ok(self.inner)
    }
}

/// Writes the fixed part of a container: magic, checksum and the
/// principal table. The street segment is copied in afterwards through
/// [`ContainerWriter::segment_writer`].
pub struct ContainerWriter<W> {
    inner: W,
    written: u64,
    table_closed: bool,
}

impl<W: AsyncWrite + Unpin> ContainerWriter<W> {
    /// Writes the magic and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn new(mut inner: W, checksum: &Checksum) -> Result<Self, FormatError> {
        inner.write_all(MAGIC).await?;
        inner.write_all(checksum).await?;
        Ok(Self {
            inner,
            written: (MAGIC.len() + CHECKSUM_LEN) as u64,
            table_closed: false,
        })
    }

    /// Appends one principal subdivision to the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is invalid, the table was already
    /// closed, or encoding or writing fails.
    pub async fn write_principal(&mut self, tree: &PrincipalTree) -> Result<(), FormatError> {
        if self.table_closed {
            return Err(FormatError::TableClosed);
        }

        let code = table_code(&tree.code)?;
        let bytes = encode_tree(tree)?;
        let length = blob_len(&bytes)?;

        self.inner.write_all(&code).await?;
        self.inner.write_all(&length.to_le_bytes()).await?;
        self.inner.write_all(&bytes).await?;
        self.written += (CODE_LEN + 4) as u64 + u64::from(length);

        log::debug!("Wrote principal subdivision {} ({length} bytes)", tree.code);
        Ok(())
    }

    /// Closes the principal table and returns the file offset at which the
    /// street segment starts.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn close_table(&mut self) -> Result<u64, FormatError> {
        if !self.table_closed {
            self.inner.write_all(&TABLE_END).await?;
            self.written += CODE_LEN as u64;
            self.table_closed = true;
        }
        Ok(self.written)
    }

    /// Direct access for copying the street segment.
    pub const fn segment_writer(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the table or flushing fails.
    pub async fn finish(mut self) -> Result<W, FormatError> {
        self.close_table().await?;
        self.inner.flush().await?;
        Ok(self.inner)
    }
}

/// A principal table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalEntry {
    /// Table code with padding removed, e.g. `ON`.
    pub code: String,
    /// Absolute file offset of the tree blob.
    pub offset: u64,
    pub length: u32,
}

/// Everything before the street segment.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub checksum: Checksum,
    pub principals: Vec<PrincipalEntry>,
    /// Absolute file offset of the street segment.
    pub street_segment_start: u64,
}

impl ContainerHeader {
    #[must_use]
    pub fn principal(&self, code: &str) -> Option<&PrincipalEntry> {
        let code = code.trim();
        self.principals
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    /// Absolute file offset of a street table.
    #[must_use]
    pub const fn street_table_offset(&self, table: &StreetTableRef) -> u64 {
        self.street_segment_start + table.offset
    }
}

/// Reads and validates the header of a container.
///
/// When `expected` is given the stored checksum must match it.
///
/// # Errors
///
/// Returns [`FormatError::BadMagic`], [`FormatError::ChecksumMismatch`] or
/// [`FormatError::Truncated`] when the file is not a valid container for
/// the expected map.
pub async fn read_header<R: AsyncRead + AsyncSeek + Unpin>(
    reader: &mut R,
    expected: Option<&Checksum>,
) -> Result<ContainerHeader, FormatError> {
    let file_len = reader.seek(SeekFrom::End(0)).await?;
    reader.seek(SeekFrom::Start(0)).await?;

    let mut magic = vec![0_u8; MAGIC.len()];
    reader.read_exact(&mut magic).await?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let mut checksum = [0_u8; CHECKSUM_LEN];
    reader.read_exact(&mut checksum).await?;
    if expected.is_some_and(|e| *e != checksum) {
        return Err(FormatError::ChecksumMismatch);
    }

    let mut position = (MAGIC.len() + CHECKSUM_LEN) as u64;
    let mut principals = Vec::new();
    loop {
        let mut code = [0_u8; CODE_LEN];
        reader.read_exact(&mut code).await?;
        position += CODE_LEN as u64;
        if code == TABLE_END {
            break;
        }

        let code = std::str::from_utf8(&code)
            .map_err(|_| FormatError::InvalidPrincipalCode(format!("{code:?}")))?
            .trim_end()
            .to_string();

        let mut length = [0_u8; 4];
        reader.read_exact(&mut length).await?;
        position += 4;
        let length = u32::from_le_bytes(length);

        let offset = position;
        position += u64::from(length);
        if position > file_len {
            return Err(FormatError::Truncated);
        }
        reader.seek(SeekFrom::Start(position)).await?;

        principals.push(PrincipalEntry {
            code,
            offset,
            length,
        });
    }

    Ok(ContainerHeader {
        checksum,
        principals,
        street_segment_start: position,
    })
}

/// Reads `length` bytes at `offset`.
///
/// # Errors
///
/// Returns [`FormatError::Truncated`] if the range runs past the end.
pub async fn read_blob<R: AsyncRead + AsyncSeek + Unpin>(
    reader: &mut R,
    offset: u64,
    length: u32,
) -> Result<Vec<u8>, FormatError> {
    reader.seek(SeekFrom::Start(offset)).await?;
    let mut bytes = vec![0_u8; length as usize];
    reader.read_exact(&mut bytes).await?;
    Ok(bytes)
}
