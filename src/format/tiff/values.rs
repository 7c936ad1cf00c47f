//! TIFF tag value reading.
//!
//! Values are either stored inline in the IFD entry or at an offset in the
//! file. Arrays such as TileOffsets are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values respecting the file's byte order and offset width.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from the file.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        let size = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
            tag: "value",
            message: format!("value of {size} bytes is too large"),
        })?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(&entry.value_offset_bytes[..size]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size)?)
        }
    }

    /// Read a single unsigned integer (Short, Long or Long8).
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        let values = self.read_u64_array(entry)?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(TiffError::InvalidTagValue {
                tag: "scalar",
                message: format!("expected count 1, got {}", entry.count),
            }),
        }
    }

    /// Read a single signed integer; unsigned types are accepted as well.
    pub fn read_i64(&self, entry: &IfdEntry) -> Result<i64, TiffError> {
        if let Some(value) = entry.inline_i64(self.header.byte_order) {
            return Ok(value);
        }
        Err(TiffError::InvalidTagValue {
            tag: "signed scalar",
            message: format!(
                "expected one inline integer, got {} value(s) of type {}",
                entry.count, entry.field_type_raw
            ),
        })
    }

    /// Read an array of unsigned integers (TileOffsets, TileByteCounts, ...).
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        decode_u64_values(&bytes, field_type, self.header.byte_order).ok_or_else(|| {
            TiffError::InvalidTagValue {
                tag: "array",
                message: format!("expected Short, Long, or Long8, got {:?}", field_type),
            }
        })
    }

    /// Read a single Rational (or Short/Long) value as a float.
    pub fn read_f64(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        match field_type {
            FieldType::Rational | FieldType::SRational => {
                let bytes = self.read_bytes(entry)?;
                let order = self.header.byte_order;
                let (num, den) = if field_type == FieldType::Rational {
                    (
                        order.read_u32(&bytes[0..4]) as f64,
                        order.read_u32(&bytes[4..8]) as f64,
                    )
                } else {
                    (
                        order.read_u32(&bytes[0..4]) as i32 as f64,
                        order.read_u32(&bytes[4..8]) as i32 as f64,
                    )
                };
                if den == 0.0 {
                    return Err(TiffError::InvalidTagValue {
                        tag: "rational",
                        message: "zero denominator".to_string(),
                    });
                }
                Ok(num / den)
            }
            _ => self.read_u64(entry).map(|v| v as f64),
        }
    }

    /// Read an ASCII value, stopping at the first NUL.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!("expected Ascii type, got {}", entry.field_type_raw),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Decode a packed array of unsigned integers.
///
/// Returns `None` for field types that are not unsigned integers.
pub fn decode_u64_values(bytes: &[u8], field_type: FieldType, byte_order: ByteOrder) -> Option<Vec<u64>> {
    let values = match field_type {
        FieldType::Byte => bytes.iter().map(|&b| b as u64).collect(),
        FieldType::Short => bytes
            .chunks_exact(2)
            .map(|c| byte_order.read_u16(c) as u64)
            .collect(),
        FieldType::Long => bytes
            .chunks_exact(4)
            .map(|c| byte_order.read_u32(c) as u64)
            .collect(),
        FieldType::Long8 | FieldType::Ifd8 => bytes
            .chunks_exact(8)
            .map(|c| byte_order.read_u64(c))
            .collect(),
        _ => return None,
    };
    Some(values)
}

// =============================================================================
// Tests
// =============================================================================
