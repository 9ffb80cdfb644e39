//! Device-resident buffers.
//!
//! A [`DeviceBuffer`] models a linear array living in a device's memory
//! space. It is owned by the caller, shared by reference (`Arc`) among all
//! views that alias it, and must outlive every operation that touches it.
//!
//! Interior mutability goes through `UnsafeCell`: kernels obtain raw
//! pointers into the storage from the device worker thread. Soundness rests
//! on the in-order queue — two launches touching the same buffer never run
//! concurrently, and writes within one launch target disjoint elements.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

/// A linear, device-resident array of `E` elements.
///
/// Construct one with [`DeviceBuffer::from_slice`] or
/// [`DeviceBuffer::from_elem`]; read it back through
/// [`Executor::copy_to_host`](crate::Executor::copy_to_host).
pub struct DeviceBuffer<E> {
    cell: UnsafeCell<Box<[E]>>,
    len: usize,
}

// Raw storage is only ever mutated from the device queue worker, one launch
// at a time; concurrent host access is restricted to `copy_to_host`, which
// itself runs on the worker.
unsafe impl<E: Send> Send for DeviceBuffer<E> {}
unsafe impl<E: Send> Sync for DeviceBuffer<E> {}

impl<E: Copy> DeviceBuffer<E> {
    /// Allocate a device buffer holding a copy of `host`.
    pub fn from_slice(host: &[E]) -> Arc<Self> {
        Arc::new(Self {
            cell: UnsafeCell::new(host.to_vec().into_boxed_slice()),
            len: host.len(),
        })
    }

    /// Allocate a device buffer of `len` elements, all equal to `value`.
    pub fn from_elem(value: E, len: usize) -> Arc<Self> {
        Arc::new(Self {
            cell: UnsafeCell::new(vec![value; len].into_boxed_slice()),
            len,
        })
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the first element.
    ///
    /// # Safety
    /// Dereferencing is only sound from the device queue worker, under the
    /// in-order execution guarantee.
    pub(crate) fn ptr(&self) -> *mut E {
        unsafe { (*self.cell.get()).as_mut_ptr() }
    }

    /// Snapshot the whole buffer.
    ///
    /// # Safety
    /// Must be called from the device queue worker so that no launch is
    /// mutating the storage concurrently.
    pub(crate) unsafe fn read_all(&self) -> Vec<E> {
        (*self.cell.get()).to_vec()
    }
}

impl<E> fmt::Debug for DeviceBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer").field("len", &self.len).finish()
    }
}
