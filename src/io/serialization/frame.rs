//! Buffer-frame encoding.
//!
//! A model is exported as a flat list of [`BufferFrame`]s, one per scalar,
//! array or string field, in the same order as the byte stream. Exported
//! frames borrow the model's columns directly, and an imported
//! [`BorrowedModel`] views the frame memory in turn. Only scalars and
//! strings are copied on import. An optional field occupies two frames: its
//! name, then its payload.

use super::{DeserializerMixin, SerializerMixin};
use crate::core::column_store::{slice_as_bytes, ColumnElement, ColumnStore};
use crate::core::error::{FormatError, Result};
use crate::tree::model::Model;
use std::marker::PhantomData;
use std::ops::Deref;

/// Format code of string frames.
pub const STRING_FORMAT: &str = "=c";

/// Typed view over a contiguous byte region.
///
/// `format` is a struct-module style code (`"=f"`, `"=L"`, `"=c"`, ...),
/// `itemsize` the size of one element and `nitem` the element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFrame<'a> {
    /// Raw native-endian element bytes
    pub data: &'a [u8],
    /// Element format code
    pub format: &'a str,
    /// Bytes per element
    pub itemsize: usize,
    /// Number of elements
    pub nitem: usize,
}

impl<'a> BufferFrame<'a> {
    /// Frame over a slice of column elements.
    pub fn from_slice<T: ColumnElement>(values: &'a [T]) -> Self {
        Self {
            data: slice_as_bytes(values),
            format: T::FORMAT,
            itemsize: T::SIZE,
            nitem: values.len(),
        }
    }

    /// Frame over a UTF-8 string.
    pub fn from_text(value: &'a str) -> Self {
        Self {
            data: value.as_bytes(),
            format: STRING_FORMAT,
            itemsize: 1,
            nitem: value.len(),
        }
    }
}

/// Model whose array columns view the buffer frames it was rebuilt from.
///
/// Dereferences to [`Model`]. The frames' memory stays borrowed for `'a`;
/// [`BorrowedModel::into_owned`] copies the columns and releases it.
#[derive(Debug)]
pub struct BorrowedModel<'a> {
    model: Model,
    _frames: PhantomData<&'a [u8]>,
}

impl<'a> BorrowedModel<'a> {
    /// # Safety
    ///
    /// Every foreign column of `model` must view memory borrowed for `'a`.
    pub(crate) unsafe fn new(model: Model) -> Self {
        Self {
            model,
            _frames: PhantomData,
        }
    }

    /// Detach from the frames by copying every column into owned storage.
    pub fn into_owned(self) -> Model {
        self.model.clone()
    }
}

impl Deref for BorrowedModel<'_> {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}

/// Collects frames borrowing from the model.
#[derive(Debug, Default)]
pub(crate) struct FrameSerializer<'a> {
    frames: Vec<BufferFrame<'a>>,
}

impl<'a> FrameSerializer<'a> {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub(crate) fn into_frames(self) -> Vec<BufferFrame<'a>> {
        self.frames
    }
}

impl<'a> SerializerMixin<'a> for FrameSerializer<'a> {
    fn serialize_scalar<T: ColumnElement>(&mut self, value: &'a T) -> Result<()> {
        self.frames
            .push(BufferFrame::from_slice(std::slice::from_ref(value)));
        Ok(())
    }

    fn serialize_array<T: ColumnElement>(&mut self, values: &'a [T]) -> Result<()> {
        self.frames.push(BufferFrame::from_slice(values));
        Ok(())
    }

    fn serialize_string(&mut self, value: &'a str) -> Result<()> {
        self.frames.push(BufferFrame::from_text(value));
        Ok(())
    }
}

/// Reads model fields from a frame list, in order.
pub(crate) struct FrameDeserializer<'f, 'a> {
    frames: &'f [BufferFrame<'a>],
    cursor: usize,
}

impl<'f, 'a> FrameDeserializer<'f, 'a> {
    pub(crate) fn new(frames: &'f [BufferFrame<'a>]) -> Self {
        Self { frames, cursor: 0 }
    }

    fn next_frame(&mut self, what: &str) -> Result<(usize, BufferFrame<'a>)> {
        let index = self.cursor;
        let frame = self
            .frames
            .get(index)
            .copied()
            .ok_or_else(|| FormatError::UnexpectedEof {
                what: format!("frame for {}", what),
            })?;
        self.cursor += 1;
        let expected_len = frame.itemsize.checked_mul(frame.nitem);
        if expected_len != Some(frame.data.len()) {
            return Err(FormatError::UnexpectedEof {
                what: format!("data of frame {} ({})", index, what),
            }
            .into());
        }
        Ok((index, frame))
    }

    fn next_typed_frame(
        &mut self,
        what: &str,
        format: &'static str,
        itemsize: usize,
    ) -> Result<BufferFrame<'a>> {
        let (index, frame) = self.next_frame(what)?;
        if frame.format != format || frame.itemsize != itemsize {
            return Err(FormatError::FrameTypeMismatch {
                index,
                expected: format,
                expected_size: itemsize,
                actual: frame.format.to_string(),
                actual_size: frame.itemsize,
            }
            .into());
        }
        Ok(frame)
    }
}

impl DeserializerMixin for FrameDeserializer<'_, '_> {
    fn deserialize_scalar<T: ColumnElement>(&mut self, what: &'static str) -> Result<T> {
        let index = self.cursor;
        let frame = self.next_typed_frame(what, T::FORMAT, T::SIZE)?;
        if frame.nitem != 1 {
            return Err(FormatError::ScalarFrameLength {
                index,
                nitem: frame.nitem,
            }
            .into());
        }
        Ok(T::decode_ne(frame.data)?)
    }

    fn deserialize_array<T: ColumnElement>(&mut self, what: &'static str) -> Result<ColumnStore<T>> {
        let frame = self.next_typed_frame(what, T::FORMAT, T::SIZE)?;
        // SAFETY: `frame.data` is borrowed for `'a`, and models decoded from
        // frames are only handed out inside a `BorrowedModel<'a>`.
        Ok(unsafe { ColumnStore::borrow_native(frame.data) }?)
    }

    fn deserialize_string(&mut self, what: &'static str) -> Result<String> {
        let frame = self.next_typed_frame(what, STRING_FORMAT, 1)?;
        let value = std::str::from_utf8(frame.data).map_err(|_| FormatError::InvalidUtf8)?;
        Ok(value.to_string())
    }

    fn skip_optional_field(&mut self) -> Result<()> {
        let name = self.deserialize_string("optional field name")?;
        let (_, payload) = self.next_frame("optional field payload")?;
        log::debug!(
            "Skipped unknown optional field {} ({} items of format {})",
            name,
            payload.nitem,
            payload.format
        );
        Ok(())
    }
}
