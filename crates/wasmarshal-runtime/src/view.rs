//! Typed overlays of the module's linear memory
//!
//! A view borrows the memory's current backing bytes and must be re-derived
//! for every access sequence: growth can move the backing store, so views
//! are never held across an operation that may grow memory. The borrow on
//! the store makes a cached stale view unrepresentable.

use crate::error::{BridgeError, BridgeResult};
use crate::value::ElemType;

fn span(size: usize, offset: u32, len: usize) -> BridgeResult<std::ops::Range<usize>> {
    let start = offset as usize;
    let end = start
        .checked_add(len)
        .ok_or(BridgeError::OutOfBounds { offset, len, size })?;
    if end > size {
        return Err(BridgeError::OutOfBounds { offset, len, size });
    }
    Ok(start..end)
}

/// Read-only overlay of linear memory.
pub struct HeapView<'a> {
    data: &'a [u8],
}

impl<'a> HeapView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Current byte length of the underlying memory.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a single cell at `offset`.
    pub fn read(&self, offset: u32, elem: ElemType) -> BridgeResult<f64> {
        let range = span(self.data.len(), offset, elem.width())?;
        Ok(elem.load(&self.data[range]))
    }

    /// Snapshot-copy `count` cells starting at `offset`. The result is
    /// independent of any later mutation or growth of the memory.
    pub fn slice_copy(&self, offset: u32, elem: ElemType, count: usize) -> BridgeResult<Vec<f64>> {
        let width = elem.width();
        let len = count.checked_mul(width).ok_or(BridgeError::OutOfBounds {
            offset,
            len: usize::MAX,
            size: self.data.len(),
        })?;
        let range = span(self.data.len(), offset, len)?;
        let mut out = Vec::with_capacity(count);
        for cell in self.data[range].chunks_exact(width) {
            out.push(elem.load(cell));
        }
        Ok(out)
    }

    /// Raw byte snapshot, mostly useful to hand buffers onward unchanged.
    pub fn bytes(&self, offset: u32, len: usize) -> BridgeResult<Vec<u8>> {
        let range = span(self.data.len(), offset, len)?;
        Ok(self.data[range].to_vec())
    }

    /// Decode the NUL-terminated UTF-8 text starting at `offset`. A missing
    /// terminator before the end of memory is out of bounds. Invalid UTF-8
    /// decodes lossily.
    pub fn read_cstr(&self, offset: u32) -> BridgeResult<String> {
        let start = span(self.data.len(), offset, 0)?.start;
        let nul = self.data[start..]
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(BridgeError::OutOfBounds {
                offset,
                len: self.data.len() - start,
                size: self.data.len(),
            })?;
        Ok(String::from_utf8_lossy(&self.data[start..start + nul]).into_owned())
    }
}

/// Mutable overlay of linear memory.
pub struct HeapViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeapViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_view(&self) -> HeapView<'_> {
        HeapView::new(self.data)
    }

    /// Write a single cell at `offset`. Out-of-range numerics wrap with
    /// two's-complement truncation at the cell width.
    pub fn write(&mut self, offset: u32, elem: ElemType, value: f64) -> BridgeResult<()> {
        let range = span(self.data.len(), offset, elem.width())?;
        elem.store(&mut self.data[range], value);
        Ok(())
    }

    /// Write a run of cells starting at `offset`. Cells are written one at a
    /// time, so a bounds failure cannot corrupt elements before it: the whole
    /// range is checked first.
    pub fn write_slice(&mut self, offset: u32, elem: ElemType, values: &[f64]) -> BridgeResult<()> {
        let width = elem.width();
        let len = values.len().checked_mul(width).ok_or(BridgeError::OutOfBounds {
            offset,
            len: usize::MAX,
            size: self.data.len(),
        })?;
        let range = span(self.data.len(), offset, len)?;
        for (cell, value) in self.data[range].chunks_exact_mut(width).zip(values) {
            elem.store(cell, *value);
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> BridgeResult<()> {
        let range = span(self.data.len(), offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Write `text` as NUL-terminated UTF-8, using at most `max_len` bytes
    /// including the terminator. Truncation never splits a multi-byte code
    /// point: the cut falls back to the previous character boundary. Returns
    /// the number of bytes written; a `max_len` of zero writes nothing.
    pub fn write_cstr(&mut self, offset: u32, text: &str, max_len: usize) -> BridgeResult<usize> {
        if max_len == 0 {
            return Ok(0);
        }
        let bytes = text.as_bytes();
        let mut end = bytes.len().min(max_len - 1);
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let range = span(self.data.len(), offset, end + 1)?;
        self.data[range.start..range.start + end].copy_from_slice(&bytes[..end]);
        self.data[range.start + end] = 0;
        Ok(end + 1)
    }
}
