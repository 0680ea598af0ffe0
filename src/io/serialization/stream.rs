//! Byte-stream encoding.
//!
//! Scalars are written in little-endian order. Arrays and strings carry a
//! `u64` length prefix. Optional fields are encoded as
//! `name: string, elem_size: u64, nelem: u64, payload: elem_size * nelem bytes`.

use super::{DeserializerMixin, SerializerMixin};
use crate::core::column_store::{ColumnElement, ColumnStore};
use crate::core::error::{FormatError, Result, TreeliteError};
use crate::core::utils::binary_writer::BinaryWriter;
use std::io::{self, Read};

/// Writes model fields to a [`BinaryWriter`].
pub(crate) struct StreamSerializer<W> {
    writer: W,
}

impl<W: BinaryWriter> StreamSerializer<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }

    pub(crate) fn into_inner(self) -> W {
        self.writer
    }
}

impl<'a, W: BinaryWriter> SerializerMixin<'a> for StreamSerializer<W> {
    fn serialize_scalar<T: ColumnElement>(&mut self, value: &'a T) -> Result<()> {
        self.writer.write_scalar(*value)?;
        Ok(())
    }

    fn serialize_array<T: ColumnElement>(&mut self, values: &'a [T]) -> Result<()> {
        self.writer.write_array(values)?;
        Ok(())
    }

    fn serialize_string(&mut self, value: &'a str) -> Result<()> {
        self.writer.write_string(value)?;
        Ok(())
    }
}

/// Reads model fields from any [`Read`] source.
pub(crate) struct StreamDeserializer<R> {
    reader: R,
}

impl<R: Read> StreamDeserializer<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self { reader }
    }

    fn read_exact_bytes(&mut self, nbytes: u64, what: &str) -> Result<Vec<u8>> {
        // Grow the buffer as bytes arrive so a corrupt length cannot force a
        // huge allocation up front.
        let mut buf = Vec::new();
        (&mut self.reader).take(nbytes).read_to_end(&mut buf)?;
        if buf.len() as u64 != nbytes {
            return Err(eof(what));
        }
        Ok(buf)
    }

    fn read_len(&mut self, what: &str) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.reader.read_exact(&mut raw).map_err(|e| map_eof(e, what))?;
        Ok(u64::from_le_bytes(raw))
    }
}

impl<R: Read> DeserializerMixin for StreamDeserializer<R> {
    fn deserialize_scalar<T: ColumnElement>(&mut self, what: &'static str) -> Result<T> {
        let mut buf = [0u8; 16];
        let raw = &mut buf[..T::SIZE];
        self.reader.read_exact(raw).map_err(|e| map_eof(e, what))?;
        Ok(T::decode_le(raw)?)
    }

    fn deserialize_array<T: ColumnElement>(&mut self, what: &'static str) -> Result<ColumnStore<T>> {
        let count = self.read_len(what)?;
        let nbytes = count
            .checked_mul(T::SIZE as u64)
            .ok_or_else(|| TreeliteError::format(format!("array {} has invalid length {}", what, count)))?;
        let bytes = self.read_exact_bytes(nbytes, what)?;
        Ok(ColumnStore::decode(&bytes, false)?)
    }

    fn deserialize_string(&mut self, what: &'static str) -> Result<String> {
        let len = self.read_len(what)?;
        let bytes = self.read_exact_bytes(len, what)?;
        String::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8.into())
    }

    fn skip_optional_field(&mut self) -> Result<()> {
        let name = self.deserialize_string("optional field name")?;
        let elem_size = self.read_len("optional field element size")?;
        let nelem = self.read_len("optional field element count")?;
        let nbytes = elem_size.checked_mul(nelem).ok_or_else(|| {
            TreeliteError::format(format!("optional field {} has an invalid size", name))
        })?;
        let skipped = io::copy(&mut (&mut self.reader).take(nbytes), &mut io::sink())?;
        if skipped != nbytes {
            return Err(eof("optional field payload"));
        }
        log::debug!("Skipped unknown optional field {} ({} bytes)", name, nbytes);
        Ok(())
    }
}

fn eof(what: &str) -> TreeliteError {
    FormatError::UnexpectedEof {
        what: what.to_string(),
    }
    .into()
}

fn map_eof(err: io::Error, what: &str) -> TreeliteError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        eof(what)
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::binary_writer::VecBinaryWriter;

    #[test]
    fn test_scalar_array_string_layout() {
        let mut ser = StreamSerializer::new(VecBinaryWriter::new());
        let value = 7i32;
        let values = [1.5f64, -2.0];
        ser.serialize_scalar(&value).unwrap();
        ser.serialize_array(&values[..]).unwrap();
        ser.serialize_string("softmax").unwrap();
        let bytes = ser.into_inner().into_buffer();
        assert_eq!(bytes.len(), 4 + 8 + 16 + 8 + 7);

        let mut de = StreamDeserializer::new(&bytes[..]);
        assert_eq!(de.deserialize_scalar::<i32>("value").unwrap(), 7);
        assert_eq!(de.deserialize_array::<f64>("values").unwrap().as_slice(), &values);
        assert_eq!(de.deserialize_string("name").unwrap(), "softmax");
    }

    #[test]
    fn test_truncated_array() {
        let mut bytes = 4u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let mut de = StreamDeserializer::new(&bytes[..]);
        let err = de.deserialize_array::<u32>("class_id").unwrap_err();
        assert_eq!(err.category(), "format");
        assert!(err.to_string().contains("class_id"));
    }

    #[test]
    fn test_skip_optional_field() {
        let mut writer = VecBinaryWriter::new();
        writer.write_string("extra").unwrap();
        writer.write_scalar(8u64).unwrap();
        writer.write_scalar(2u64).unwrap();
        writer.write(&[0u8; 16]).unwrap();
        writer.write_scalar(42u32).unwrap();
        let bytes = writer.into_buffer();

        let mut de = StreamDeserializer::new(&bytes[..]);
        de.skip_optional_field().unwrap();
        assert_eq!(de.deserialize_scalar::<u32>("after").unwrap(), 42);
    }

    #[test]
    fn test_invalid_utf8_string() {
        let mut bytes = 2u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let mut de = StreamDeserializer::new(&bytes[..]);
        assert!(de.deserialize_string("postprocessor").is_err());
    }
}
