//! Expression-tree BLAS kernels evaluated on an in-order device work queue.
//!
//! This crate accelerates dense Level-1 and Level-2 BLAS primitives over
//! device-resident buffers. Routines never compute eagerly: they compose a
//! lazy operation tree over strided views and hand it to an [`Executor`],
//! which enqueues one or more kernel launches on its device queue and
//! returns an [`Event`] the caller may wait on.
//!
//! # Core Types
//!
//! - [`DeviceBuffer`]: externally shared, device-resident linear array
//! - [`VectorView`] / [`MatrixView`]: zero-copy strided windows over a buffer
//! - [`Expr`] and the constructors in [`expr`]: lazily composed operation trees
//! - [`Executor`]: device-queue owner; evaluates trees into kernel launches
//!
//! # Primary API
//!
//! ## Level 1
//!
//! - [`axpy`], [`scal`], [`copy`], [`swap`], [`rot`]: point-wise assignment trees
//! - [`dot`], [`asum`], [`nrm2`]: two-phase parallel reductions
//! - [`iamax`], [`iamin`]: index-of-extremum reductions with first-occurrence ties
//! - [`copy_tiled`]: copy staged through fast on-chip scratch tiles
//! - [`rotg`]: host-side plane-rotation construction (no device work)
//!
//! Each reducing routine also has a `_host` form that synchronously
//! transfers the 1-element result back to the host.
//!
//! ## Level 2
//!
//! - [`gemv`]: matrix-vector product, scheduled by a statically chosen
//!   [`GemvVariant`] work-partitioning strategy
//! - [`ger`]: rank-1 update as a single elementwise tree
//!
//! # Example
//!
//! ```rust
//! use queued_blas::{axpy, dot_host, DeviceBuffer, Executor};
//!
//! let ex = Executor::new();
//! let x = DeviceBuffer::from_slice(&[1.0_f64, 2.0, 3.0]);
//! let y = DeviceBuffer::from_slice(&[10.0_f64, 20.0, 30.0]);
//!
//! // y := 2*x + y, then read back the dot product
//! axpy(&ex, 3, 2.0, &x, 1, &y, 1).unwrap().wait().unwrap();
//! let d = dot_host(&ex, 3, &x, 1, &y, 1).unwrap();
//! assert_eq!(d, 1.0 * 12.0 + 2.0 * 24.0 + 3.0 * 36.0);
//! ```
//!
//! # Concurrency model
//!
//! One `Executor` owns one in-order device queue. `execute`/`reduce` only
//! enqueue work; the returned [`Event`] is the sole blocking point.
//! Submission order subsumes the per-view dependency ordering: operations
//! whose views alias run in the order they were submitted, and work-group
//! parallelism happens inside each launch.

mod blas1;
mod blas2;
mod buffer;
pub mod expr;
mod executor;
mod queue;
mod reduce;
mod tile;
mod view;

// ============================================================================
// Buffers and views
// ============================================================================
pub use buffer::DeviceBuffer;
pub use view::{MatrixAccess, MatrixView, VectorView};

// ============================================================================
// Expression trees
// ============================================================================
pub use expr::{Expr, Statement};

// ============================================================================
// Execution
// ============================================================================
pub use executor::Executor;
pub use queue::Event;

// ============================================================================
// Reductions
// ============================================================================
pub use reduce::{
    abs_sum_reduction, max_index_reduction, min_index_reduction, sum_reduction, IndexReduction,
    IndexValuePair, SumReduction,
};

// ============================================================================
// BLAS routines
// ============================================================================
pub use blas1::{
    asum, asum_host, axpy, copy, copy_tiled, dot, dot_host, iamax, iamax_host, iamin, iamin_host,
    nrm2, nrm2_host, rot, rotg, scal, swap,
};
pub use blas2::{gemv, ger, GemvVariant, Transpose};

// ============================================================================
// Constants
// ============================================================================

/// Default work-group size used when the `QUEUED_BLAS_WG_SIZE` environment
/// variable is unset.
pub const DEFAULT_WORK_GROUP_SIZE: usize = 256;

/// On-chip (fast local) memory budget in bytes.
///
/// Scratch tiles staged by [`copy_tiled`] must fit below this threshold;
/// larger tiles degrade to the plain copy path.
pub const ONCHIP_MEMORY_SIZE: usize = 32 * 1024;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while composing or executing operation trees.
///
/// Configuration errors (shapes, strides, geometry) are raised synchronously
/// before any queue submission. Device failures surface from
/// [`Event::wait`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlasError {
    /// A vector view was constructed with increment 0.
    #[error("zero increment for vector view")]
    ZeroIncrement,

    /// A view addresses elements outside its backing buffer.
    #[error("view exceeds buffer: needs {needed} elements, buffer holds {len}")]
    OutOfBounds { needed: usize, len: usize },

    /// Leading dimension too small for the requested matrix window.
    #[error("leading dimension {ld} below {required} for {rows}x{cols} view")]
    LeadingDimension {
        ld: usize,
        required: usize,
        rows: usize,
        cols: usize,
    },

    /// Two sides of an operation tree disagree on logical length.
    #[error("shape mismatch: {0} vs {1}")]
    ShapeMismatch(usize, usize),

    /// Work-group size or work-group count of 0.
    #[error("work-group geometry must be positive")]
    ZeroWorkGroup,

    /// Tile size of 0 passed to a tiled operation.
    #[error("tile size must be positive")]
    ZeroTile,

    /// Fatal device/runtime failure (queue down, kernel panic).
    #[error("device failure: {0}")]
    Device(String),
}

/// Result type for queued BLAS operations.
pub type Result<T> = std::result::Result<T, BlasError>;

/// Marker bound for element types the kernels accept.
///
/// Real floating-point only; conjugate-transpose therefore coincides with
/// transpose in [`gemv`].
pub trait Scalar: num_traits::Float + Send + Sync + 'static {}

impl<T> Scalar for T where T: num_traits::Float + Send + Sync + 'static {}
