//! Versioned binary encoding for blob columns.
//!
//! Every blob starts with a four byte header:
//!
//! ```text
//! [0..2]  magic  b"GM"
//! [2]     format version
//! [3]     kind   (0 = null, 1 = f64 vector, 2 = JSON document)
//! ```
//!
//! A vector body is a little-endian `u32` element count followed by that many
//! little-endian `f64` values. A document body is a little-endian `u32` byte
//! length followed by UTF-8 JSON. Null has no body.

use gptmem_common::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const MAGIC: [u8; 2] = *b"GM";
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 4;
const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Kind {
    Null = 0,
    Vector = 1,
    Document = 2,
}

impl Kind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Null),
            1 => Ok(Self::Vector),
            2 => Ok(Self::Document),
            other => Err(Error::Deserialization(format!(
                "unknown blob kind: {other}"
            ))),
        }
    }
}

/// Encodes an embedding vector.
pub fn encode_vector(values: &[f64]) -> Result<Vec<u8>> {
    let count = u32::try_from(values.len()).map_err(|_| {
        Error::Serialization(format!("vector too long to encode: {}", values.len()))
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + LEN_PREFIX + values.len() * 8);
    write_header(&mut out, Kind::Vector);
    out.extend(count.to_le_bytes());
    for v in values {
        out.extend(v.to_le_bytes());
    }
    Ok(out)
}

/// Decodes a blob written by [`encode_vector`].
pub fn decode_vector(blob: &[u8]) -> Result<Vec<f64>> {
    let (kind, body) = split_header(blob)?;
    if kind != Kind::Vector {
        return Err(Error::Deserialization(format!(
            "expected a vector blob, found {kind:?}"
        )));
    }
    read_vector_body(body)
}

/// Encodes any serializable value. Values that serialize to JSON `null` are
/// written as a bare null header.
pub fn encode_document<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::Serialization(format!("failed to serialize value: {e}")))?;

    let mut out = Vec::new();
    if json.is_null() {
        write_header(&mut out, Kind::Null);
        return Ok(out);
    }

    let bytes = serde_json::to_vec(&json)
        .map_err(|e| Error::Serialization(format!("failed to serialize value: {e}")))?;
    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::Serialization(format!("document too large to encode: {} bytes", bytes.len()))
    })?;

    out.reserve(HEADER_LEN + LEN_PREFIX + bytes.len());
    write_header(&mut out, Kind::Document);
    out.extend(len.to_le_bytes());
    out.extend(bytes);
    Ok(out)
}

/// Decodes any blob kind into `T`. Vector blobs decode as a JSON array of
/// numbers.
pub fn decode_document<T: DeserializeOwned>(blob: &[u8]) -> Result<T> {
    let (kind, body) = split_header(blob)?;
    let json = match kind {
        Kind::Null => {
            if !body.is_empty() {
                return Err(Error::Deserialization(format!(
                    "null blob carries {} trailing bytes",
                    body.len()
                )));
            }
            serde_json::Value::Null
        }
        Kind::Vector => serde_json::Value::from(read_vector_body(body)?),
        Kind::Document => {
            let bytes = read_length_prefixed(body)?;
            serde_json::from_slice(bytes)
                .map_err(|e| Error::Deserialization(format!("invalid document json: {e}")))?
        }
    };

    serde_json::from_value(json)
        .map_err(|e| Error::Deserialization(format!("document has unexpected shape: {e}")))
}

fn write_header(out: &mut Vec<u8>, kind: Kind) {
    out.extend(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(kind as u8);
}

fn split_header(blob: &[u8]) -> Result<(Kind, &[u8])> {
    if blob.len() < HEADER_LEN {
        return Err(Error::Deserialization(format!(
            "blob too short for header: {} bytes",
            blob.len()
        )));
    }
    if blob[..2] != MAGIC {
        return Err(Error::Deserialization("blob has invalid magic".into()));
    }
    let version = blob[2];
    if version == 0 || version > FORMAT_VERSION {
        return Err(Error::Deserialization(format!(
            "unsupported blob format version: {version}"
        )));
    }
    Ok((Kind::from_byte(blob[3])?, &blob[HEADER_LEN..]))
}

fn read_length_prefixed(body: &[u8]) -> Result<&[u8]> {
    let (len, rest) = read_len(body)?;
    if rest.len() != len {
        return Err(Error::Deserialization(format!(
            "document length mismatch: header says {len}, found {}",
            rest.len()
        )));
    }
    Ok(rest)
}

fn read_vector_body(body: &[u8]) -> Result<Vec<f64>> {
    let (count, rest) = read_len(body)?;
    if rest.len() != count * 8 {
        return Err(Error::Deserialization(format!(
            "vector length mismatch: header says {count} values, found {} bytes",
            rest.len()
        )));
    }

    let mut out = Vec::with_capacity(count);
    for chunk in rest.chunks_exact(8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        out.push(f64::from_le_bytes(raw));
    }
    Ok(out)
}

fn read_len(body: &[u8]) -> Result<(usize, &[u8])> {
    if body.len() < LEN_PREFIX {
        return Err(Error::Deserialization("blob truncated before length".into()));
    }
    let mut raw = [0u8; LEN_PREFIX];
    raw.copy_from_slice(&body[..LEN_PREFIX]);
    Ok((u32::from_le_bytes(raw) as usize, &body[LEN_PREFIX..]))
}
