use crate::core::column_store::ColumnElement;
use std::io;

/// An interface for serializing binary data to a byte sink
pub trait BinaryWriter {
    /// Append data to this binary target
    ///
    /// # Arguments
    /// * `data` - Buffer to write from
    ///
    /// # Returns
    /// Number of bytes written, or an error if the write fails
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Append one scalar in little-endian encoding
    fn write_scalar<T: ColumnElement>(&mut self, value: T) -> io::Result<usize>
    where
        Self: Sized,
    {
        let mut buf = Vec::with_capacity(T::SIZE);
        value.encode_le(&mut buf);
        self.write(&buf)
    }

    /// Append an array as a `u64` element count followed by the elements
    fn write_array<T: ColumnElement>(&mut self, values: &[T]) -> io::Result<usize>
    where
        Self: Sized,
    {
        let mut buf = Vec::with_capacity(8 + values.len() * T::SIZE);
        (values.len() as u64).encode_le(&mut buf);
        for &v in values {
            v.encode_le(&mut buf);
        }
        self.write(&buf)
    }

    /// Append a string as a `u64` byte length followed by its UTF-8 bytes
    fn write_string(&mut self, value: &str) -> io::Result<usize>
    where
        Self: Sized,
    {
        let len_written = self.write_scalar(value.len() as u64)?;
        let body_written = self.write(value.as_bytes())?;
        Ok(len_written + body_written)
    }
}

/// A simple implementation of BinaryWriter that writes to a Vec<u8>
#[derive(Debug, Clone, Default)]
pub struct VecBinaryWriter {
    buffer: Vec<u8>,
}

impl VecBinaryWriter {
    /// Create a new VecBinaryWriter with an empty buffer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Take ownership of the internal buffer
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

impl BinaryWriter for VecBinaryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }
}

/// Adapter writing to any `std::io::Write` sink (files, sockets, cursors)
#[derive(Debug)]
pub struct IoBinaryWriter<W: io::Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: io::Write> IoBinaryWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    /// Total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and return the wrapped writer
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: io::Write> BinaryWriter for IoBinaryWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }
}
