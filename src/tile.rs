//! Scratch-tile staging for the tiled data mover.
//!
//! These helpers shuttle fixed-size chunks between a backing buffer and a
//! transient scratch tile. They run as ordinary queue tasks, so a stage,
//! the tiled assign that consumes it, and the drain that follows are
//! ordered like any other launches. Scratch tiles are allocated per tiled
//! call and never alias the source or destination buffer.

use crate::buffer::DeviceBuffer;
use crate::queue::Event;
use crate::{BlasError, Executor, Result};
use std::sync::Arc;

/// Copy `size` contiguous elements from `source[base..]` into the front of
/// the scratch tile.
pub(crate) fn stage_into_scratch<E: Copy + Send + Sync + 'static>(
    ex: &Executor,
    tile: &Arc<DeviceBuffer<E>>,
    source: &Arc<DeviceBuffer<E>>,
    size: usize,
    base: usize,
) -> Result<Event> {
    check_span(size, base, source.len(), tile.len())?;
    let tile = Arc::clone(tile);
    let source = Arc::clone(source);
    ex.submit_task(move || {
        unsafe {
            std::ptr::copy_nonoverlapping(source.ptr().add(base), tile.ptr(), size);
        }
        Ok(())
    })
}

/// Copy `size` contiguous elements from the front of the scratch tile into
/// `dest[base..]`.
pub(crate) fn drain_from_scratch<E: Copy + Send + Sync + 'static>(
    ex: &Executor,
    tile: &Arc<DeviceBuffer<E>>,
    dest: &Arc<DeviceBuffer<E>>,
    size: usize,
    base: usize,
) -> Result<Event> {
    check_span(size, base, dest.len(), tile.len())?;
    let tile = Arc::clone(tile);
    let dest = Arc::clone(dest);
    ex.submit_task(move || {
        unsafe {
            std::ptr::copy_nonoverlapping(tile.ptr(), dest.ptr().add(base), size);
        }
        Ok(())
    })
}

fn check_span(size: usize, base: usize, outer_len: usize, tile_len: usize) -> Result<()> {
    if base + size > outer_len {
        return Err(BlasError::OutOfBounds {
            needed: base + size,
            len: outer_len,
        });
    }
    if size > tile_len {
        return Err(BlasError::OutOfBounds {
            needed: size,
            len: tile_len,
        });
    }
    Ok(())
}
