//! Strided vector and matrix views over device buffers.
//!
//! Views are non-owning logical windows: constructing one never allocates
//! device memory and never touches the queue. Shape and stride parameters
//! are validated eagerly, so an invalid window fails fast with a
//! configuration error at construction rather than inside a kernel.
//!
//! Multiple views may alias the same buffer; no aliasing analysis is
//! performed here. In-place trees (AXPY, SCAL, rotation, GER) read and
//! write the same view per element by design.

use crate::buffer::DeviceBuffer;
use crate::{BlasError, Result};
use std::sync::Arc;

/// Traversal order of a [`MatrixView`].
///
/// The flag changes how logical `(row, col)` coordinates map into the
/// backing buffer, independent of physical storage — flipping it is how one
/// transpose flag re-walks a matrix without copying data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixAccess {
    /// Element `(i, j)` lives at `offset + i*ld + j`; rows are contiguous.
    RowMajor,
    /// Element `(i, j)` lives at `offset + j*ld + i`; columns are contiguous.
    ColMajor,
}

/// A strided window of `len` logical elements over a device buffer.
///
/// Logical element `i` maps to `buffer[offset + i*inc]`. The increment may
/// be negative (BLAS-style reverse traversal) but never zero.
#[derive(Debug, Clone)]
pub struct VectorView<E> {
    buf: Arc<DeviceBuffer<E>>,
    offset: usize,
    inc: isize,
    len: usize,
}

impl<E: Copy> VectorView<E> {
    /// Create a vector view.
    ///
    /// # Errors
    /// [`BlasError::ZeroIncrement`] when `inc == 0`;
    /// [`BlasError::OutOfBounds`] when the addressed range leaves the buffer.
    pub fn new(buf: &Arc<DeviceBuffer<E>>, offset: usize, inc: isize, len: usize) -> Result<Self> {
        if inc == 0 {
            return Err(BlasError::ZeroIncrement);
        }
        if len > 0 {
            let first = offset as isize;
            let last = first + (len as isize - 1) * inc;
            let lo = first.min(last);
            let hi = first.max(last);
            if lo < 0 || hi as usize >= buf.len() {
                return Err(BlasError::OutOfBounds {
                    needed: (hi + 1).max(0) as usize,
                    len: buf.len(),
                });
            }
        }
        Ok(Self {
            buf: Arc::clone(buf),
            offset,
            inc,
            len,
        })
    }

    /// Logical length of the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view addresses no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stride between successive logical elements.
    pub fn inc(&self) -> isize {
        self.inc
    }

    /// The backing device buffer.
    pub fn buffer(&self) -> &Arc<DeviceBuffer<E>> {
        &self.buf
    }

    fn linear_index(&self, i: usize) -> usize {
        (self.offset as isize + i as isize * self.inc) as usize
    }

    /// # Safety
    /// Only from the device queue worker; `i < self.len()`.
    pub(crate) unsafe fn read(&self, i: usize) -> E {
        *self.buf.ptr().add(self.linear_index(i))
    }

    /// # Safety
    /// Only from the device queue worker; `i < self.len()`; no other launch
    /// may write the same element concurrently.
    pub(crate) unsafe fn write(&self, i: usize, value: E) {
        *self.buf.ptr().add(self.linear_index(i)) = value;
    }
}

/// A `rows x cols` logical matrix window over a device buffer.
#[derive(Debug, Clone)]
pub struct MatrixView<E> {
    buf: Arc<DeviceBuffer<E>>,
    rows: usize,
    cols: usize,
    ld: usize,
    access: MatrixAccess,
    offset: usize,
}

impl<E: Copy> MatrixView<E> {
    /// Create a matrix view.
    ///
    /// The leading dimension must cover a full traversal line (`>= cols`
    /// under [`MatrixAccess::RowMajor`], `>= rows` under
    /// [`MatrixAccess::ColMajor`]) so logical lines never alias each other.
    pub fn new(
        buf: &Arc<DeviceBuffer<E>>,
        rows: usize,
        cols: usize,
        ld: usize,
        access: MatrixAccess,
        offset: usize,
    ) -> Result<Self> {
        let required = match access {
            MatrixAccess::RowMajor => cols,
            MatrixAccess::ColMajor => rows,
        }
        .max(1);
        if ld < required {
            return Err(BlasError::LeadingDimension {
                ld,
                required,
                rows,
                cols,
            });
        }
        if rows > 0 && cols > 0 {
            let span = match access {
                MatrixAccess::RowMajor => (rows - 1) * ld + (cols - 1),
                MatrixAccess::ColMajor => (cols - 1) * ld + (rows - 1),
            };
            let needed = offset + span + 1;
            if needed > buf.len() {
                return Err(BlasError::OutOfBounds {
                    needed,
                    len: buf.len(),
                });
            }
        }
        Ok(Self {
            buf: Arc::clone(buf),
            rows,
            cols,
            ld,
            access,
            offset,
        })
    }

    /// Logical row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stride between successive traversal lines in the backing buffer.
    pub fn leading_dimension(&self) -> usize {
        self.ld
    }

    /// Traversal order flag.
    pub fn access(&self) -> MatrixAccess {
        self.access
    }

    /// The backing device buffer.
    pub fn buffer(&self) -> &Arc<DeviceBuffer<E>> {
        &self.buf
    }

    fn linear_index(&self, r: usize, c: usize) -> usize {
        match self.access {
            MatrixAccess::RowMajor => self.offset + r * self.ld + c,
            MatrixAccess::ColMajor => self.offset + c * self.ld + r,
        }
    }

    /// # Safety
    /// Only from the device queue worker; `r < rows`, `c < cols`.
    pub(crate) unsafe fn read(&self, r: usize, c: usize) -> E {
        *self.buf.ptr().add(self.linear_index(r, c))
    }

    /// # Safety
    /// Only from the device queue worker; `r < rows`, `c < cols`; no other
    /// launch may write the same element concurrently.
    pub(crate) unsafe fn write(&self, r: usize, c: usize, value: E) {
        *self.buf.ptr().add(self.linear_index(r, c)) = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_increment() {
        let buf = DeviceBuffer::from_elem(0.0_f64, 8);
        assert!(matches!(
            VectorView::new(&buf, 0, 0, 4),
            Err(BlasError::ZeroIncrement)
        ));
    }

    #[test]
    fn rejects_out_of_range_window() {
        let buf = DeviceBuffer::from_elem(0.0_f64, 8);
        assert!(VectorView::new(&buf, 0, 2, 4).is_ok());
        assert!(matches!(
            VectorView::new(&buf, 0, 2, 5),
            Err(BlasError::OutOfBounds { .. })
        ));
        // negative increment walking backwards from the end is fine
        assert!(VectorView::new(&buf, 7, -1, 8).is_ok());
        assert!(VectorView::new(&buf, 6, -1, 8).is_err());
    }

    #[test]
    fn rejects_short_leading_dimension() {
        let buf = DeviceBuffer::from_elem(0.0_f64, 12);
        assert!(MatrixView::new(&buf, 3, 4, 4, MatrixAccess::RowMajor, 0).is_ok());
        assert!(matches!(
            MatrixView::new(&buf, 3, 4, 3, MatrixAccess::RowMajor, 0),
            Err(BlasError::LeadingDimension { .. })
        ));
        // transposed walk of the same storage: ld must cover the rows
        assert!(MatrixView::new(&buf, 4, 3, 4, MatrixAccess::ColMajor, 0).is_ok());
    }

    #[test]
    fn empty_views_validate() {
        let buf = DeviceBuffer::from_elem(0.0_f64, 0);
        assert!(VectorView::new(&buf, 0, 1, 0).is_ok());
        assert!(MatrixView::new(&buf, 0, 0, 1, MatrixAccess::RowMajor, 0).is_ok());
    }
}
