//! Contiguous column storage for tree and model attributes.
//!
//! A [`ColumnStore`] holds one attribute for every node of a tree (or every
//! tree of a model) in a single contiguous buffer. Element types implement
//! [`ColumnElement`], which fixes their on-disk encoding and lets a column
//! be exposed as raw bytes for zero-copy buffer frames.

use crate::core::error::FormatError;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::ptr::NonNull;

/// Element type that can live in a [`ColumnStore`] and be serialized.
///
/// # Safety
///
/// Implementors must be plain data: no padding bytes, no pointers, and every
/// byte of a value initialized. [`ColumnStore::as_bytes`] reinterprets a
/// column as `&[u8]` relying on this.
pub unsafe trait ColumnElement:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Struct-module style format string used in buffer frames (e.g. `"=f"`).
    const FORMAT: &'static str;

    /// Size of one element in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Append the little-endian encoding of `self` to `out`.
    fn encode_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `Self::SIZE` little-endian bytes.
    fn decode_le(bytes: &[u8]) -> Result<Self, FormatError>;

    /// Decode one element from exactly `Self::SIZE` native-endian bytes.
    fn decode_ne(bytes: &[u8]) -> Result<Self, FormatError>;

    /// Check that packed native-endian `bytes` hold only valid values.
    /// Every bit pattern of a plain number is valid.
    fn check_ne(_bytes: &[u8]) -> Result<(), FormatError> {
        Ok(())
    }
}

macro_rules! impl_column_element_numeric {
    ($($ty:ty => $fmt:expr),* $(,)?) => {
        $(
            unsafe impl ColumnElement for $ty {
                const FORMAT: &'static str = $fmt;

                fn encode_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode_le(bytes: &[u8]) -> Result<Self, FormatError> {
                    let raw = bytes.try_into().map_err(|_| FormatError::UnexpectedEof {
                        what: stringify!($ty).to_string(),
                    })?;
                    Ok(<$ty>::from_le_bytes(raw))
                }

                fn decode_ne(bytes: &[u8]) -> Result<Self, FormatError> {
                    let raw = bytes.try_into().map_err(|_| FormatError::UnexpectedEof {
                        what: stringify!($ty).to_string(),
                    })?;
                    Ok(<$ty>::from_ne_bytes(raw))
                }
            }
        )*
    };
}

impl_column_element_numeric! {
    u8 => "=B",
    i8 => "=b",
    i32 => "=l",
    u32 => "=L",
    u64 => "=Q",
    f32 => "=f",
    f64 => "=d",
}

unsafe impl ColumnElement for bool {
    const FORMAT: &'static str = "=?";

    fn encode_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn decode_le(bytes: &[u8]) -> Result<Self, FormatError> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            [v] => Err(FormatError::InvalidDiscriminant {
                what: "bool",
                value: i64::from(*v),
            }),
            _ => Err(FormatError::UnexpectedEof {
                what: "bool".to_string(),
            }),
        }
    }

    fn decode_ne(bytes: &[u8]) -> Result<Self, FormatError> {
        Self::decode_le(bytes)
    }

    fn check_ne(bytes: &[u8]) -> Result<(), FormatError> {
        bytes
            .iter()
            .try_for_each(|b| Self::decode_le(std::slice::from_ref(b)).map(drop))
    }
}

/// Reinterpret a slice of plain column elements as native-endian bytes.
pub fn slice_as_bytes<T: ColumnElement>(values: &[T]) -> &[u8] {
    let len = std::mem::size_of_val(values);
    // SAFETY: `ColumnElement` guarantees plain data with no padding.
    unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, len) }
}

/// Read-only view of elements that live in memory owned by someone else.
struct ForeignView<T> {
    ptr: NonNull<T>,
    len: usize,
}

/// Growable contiguous array holding one attribute column.
///
/// A column either owns its elements or views a foreign buffer (see
/// [`ColumnStore::borrow_native`]). A foreign column is copied into owned
/// storage on its first mutation; cloning always produces an owned column.
pub struct ColumnStore<T> {
    data: Vec<T>,
    foreign: Option<ForeignView<T>>,
}

// SAFETY: a foreign view is only ever read, exactly like a shared `&[T]`.
unsafe impl<T: Send + Sync> Send for ColumnStore<T> {}
unsafe impl<T: Sync> Sync for ColumnStore<T> {}

impl<T> ColumnStore<T> {
    /// View as a slice.
    pub fn as_slice(&self) -> &[T] {
        match &self.foreign {
            // SAFETY: `borrow_native` callers keep the viewed buffer alive and
            // unmodified while this column is in use.
            Some(view) => unsafe { std::slice::from_raw_parts(view.ptr.as_ptr(), view.len) },
            None => self.data.as_slice(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> ColumnStore<T> {
    /// Owned backing vector, copying a foreign view first.
    fn to_mut(&mut self) -> &mut Vec<T> {
        if let Some(view) = self.foreign.take() {
            // SAFETY: see `as_slice`.
            let viewed = unsafe { std::slice::from_raw_parts(view.ptr.as_ptr(), view.len) };
            self.data = viewed.to_vec();
        }
        &mut self.data
    }
}

impl<T: ColumnElement> ColumnStore<T> {
    /// Create an empty column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one element.
    pub fn push(&mut self, value: T) {
        self.to_mut().push(value);
    }

    /// Append every element of `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.to_mut().extend_from_slice(values);
    }

    /// Shorten the column to `len` elements; no-op if already shorter.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.to_mut().truncate(len);
        }
    }

    /// Decode a column from a packed byte buffer into owned storage.
    ///
    /// `native` selects native-endian decoding (buffer frames) instead of
    /// little-endian (streams).
    pub fn decode(bytes: &[u8], native: bool) -> Result<Self, FormatError> {
        check_whole_elements::<T>(bytes)?;
        let data = bytes
            .chunks_exact(T::SIZE)
            .map(|chunk| if native { T::decode_ne(chunk) } else { T::decode_le(chunk) })
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Self::from(data))
    }

    /// View native-endian `bytes` as a column without copying them.
    ///
    /// Every element is checked first, so invalid `bool` or enum bytes are
    /// rejected. A buffer that is not aligned for `T` is decoded into owned
    /// storage instead.
    ///
    /// # Safety
    ///
    /// `bytes` must stay alive and unmodified for as long as the returned
    /// column (or anything it is moved into) is read. Mutating or cloning
    /// the column detaches it from `bytes`.
    pub(crate) unsafe fn borrow_native(bytes: &[u8]) -> Result<Self, FormatError> {
        check_whole_elements::<T>(bytes)?;
        T::check_ne(bytes)?;
        let aligned = (bytes.as_ptr() as *const T).align_offset(std::mem::align_of::<T>()) == 0;
        if bytes.is_empty() || !aligned {
            if !aligned {
                log::debug!(
                    "Frame of {} is not aligned; copying {} bytes",
                    T::FORMAT,
                    bytes.len()
                );
            }
            return Self::decode(bytes, true);
        }
        Ok(Self {
            data: Vec::new(),
            foreign: Some(ForeignView {
                ptr: NonNull::from(bytes).cast::<T>(),
                len: bytes.len() / T::SIZE,
            }),
        })
    }

    /// Iterate over elements by value.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.as_slice().iter().copied()
    }
}

fn check_whole_elements<T: ColumnElement>(bytes: &[u8]) -> Result<(), FormatError> {
    if bytes.len() % T::SIZE != 0 {
        return Err(FormatError::UnexpectedEof {
            what: format!("column of {}", T::FORMAT),
        });
    }
    Ok(())
}

impl<T> Default for ColumnStore<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            foreign: None,
        }
    }
}

impl<T: Clone> Clone for ColumnStore<T> {
    fn clone(&self) -> Self {
        Self::from(self.as_slice().to_vec())
    }
}

impl<T: PartialEq> PartialEq for ColumnStore<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T> From<Vec<T>> for ColumnStore<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            data,
            foreign: None,
        }
    }
}

impl<T> Index<usize> for ColumnStore<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<T: Clone> IndexMut<usize> for ColumnStore<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.to_mut()[index]
    }
}

impl<T: fmt::Debug> fmt::Debug for ColumnStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_index() {
        let mut col = ColumnStore::<i32>::new();
        assert!(col.is_empty());
        col.push(3);
        col.push(-1);
        assert_eq!(col.len(), 2);
        assert_eq!(col[1], -1);
        col[1] = 7;
        assert_eq!(col.as_slice(), &[3, 7]);
        col.truncate(5);
        assert_eq!(col.len(), 2);
        col.truncate(1);
        assert_eq!(col.as_slice(), &[3]);
    }

    #[test]
    fn test_decode_le() {
        let mut bytes = Vec::new();
        for v in [1u64, 2, u64::MAX] {
            v.encode_le(&mut bytes);
        }
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        let col = ColumnStore::<u64>::decode(&bytes, false).unwrap();
        assert_eq!(col.as_slice(), &[1, 2, u64::MAX]);
    }

    #[test]
    fn test_borrow_native_views_the_buffer() {
        let values = vec![0.5f32, -2.0, 4.0];
        let bytes = slice_as_bytes(&values);
        let col = unsafe { ColumnStore::<f32>::borrow_native(bytes) }.unwrap();
        assert_eq!(col.as_slice(), &values[..]);
        assert_eq!(col.as_slice().as_ptr(), values.as_ptr());

        let copy = col.clone();
        assert_eq!(copy, col);
        assert_ne!(copy.as_slice().as_ptr(), values.as_ptr());
    }

    #[test]
    fn test_foreign_column_copies_on_write() {
        let values = vec![1i32, 2, 3];
        let mut col = unsafe { ColumnStore::<i32>::borrow_native(slice_as_bytes(&values)) }.unwrap();
        col[0] = 10;
        col.push(4);
        assert_eq!(col.as_slice(), &[10, 2, 3, 4]);
        assert_eq!(values, vec![1, 2, 3]);
        assert_ne!(col.as_slice().as_ptr(), values.as_ptr());
    }

    #[test]
    fn test_borrow_native_misaligned_falls_back_to_copy() {
        let values = [7u32, 9];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(slice_as_bytes(&values));
        let col = unsafe { ColumnStore::<u32>::borrow_native(&bytes[1..]) }.unwrap();
        assert_eq!(col.as_slice(), &values);
    }

    #[test]
    fn test_borrow_native_checks_values() {
        let raw = [0u8, 1, 2];
        assert!(unsafe { ColumnStore::<bool>::borrow_native(&raw) }.is_err());
        let col = unsafe { ColumnStore::<bool>::borrow_native(&raw[..2]) }.unwrap();
        assert_eq!(col.as_slice(), &[false, true]);
        assert!(unsafe { ColumnStore::<i32>::borrow_native(&[0u8; 6]) }.is_err());
    }

    #[test]
    fn test_decode_rejects_partial_element() {
        assert!(ColumnStore::<i32>::decode(&[0u8; 6], false).is_err());
    }

    #[test]
    fn test_bool_rejects_invalid_byte() {
        assert!(ColumnStore::<bool>::decode(&[0, 1, 2], false).is_err());
        let col = ColumnStore::<bool>::decode(&[0, 1], false).unwrap();
        assert_eq!(col.as_slice(), &[false, true]);
    }
}
