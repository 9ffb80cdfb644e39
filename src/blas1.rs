//! Level-1 routines over device buffers.
//!
//! Each routine composes an operation tree from the elementary building
//! blocks in [`crate::expr`] and submits it through the executor — the
//! arithmetic differs per routine, the evaluator does not. Reducing
//! routines (`dot`, `asum`, `nrm2`, `iamax`, `iamin`) come in two result
//! conventions: a device-buffer-writing form whose result stays on-device
//! for chaining, and a `_host` form that synchronously transfers the
//! 1-element result back.

use crate::buffer::DeviceBuffer;
use crate::expr::{self, Expr};
use crate::queue::Event;
use crate::reduce::{
    abs_sum_reduction, max_index_reduction, min_index_reduction, sum_reduction, IndexValuePair,
};
use crate::tile::{drain_from_scratch, stage_into_scratch};
use crate::view::VectorView;
use crate::{BlasError, Executor, Result, Scalar, ONCHIP_MEMORY_SIZE};
use std::sync::Arc;

/// BLAS-convention vector view: a negative increment walks the buffer
/// backwards starting from element `(n-1)*|inc|`.
pub(crate) fn make_vector_view<E: Copy>(
    buf: &Arc<DeviceBuffer<E>>,
    inc: isize,
    n: usize,
) -> Result<VectorView<E>> {
    let offset = if inc < 0 {
        n.saturating_sub(1) * inc.unsigned_abs()
    } else {
        0
    };
    VectorView::new(buf, offset, inc, n)
}

/// AXPY: `y := alpha*x + y`, in-place on `y`.
pub fn axpy<T: Scalar>(
    ex: &Executor,
    n: usize,
    alpha: T,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let vy = make_vector_view(y, incy, n)?;
    let scal_op = expr::scal_mul(alpha, Expr::Vector(vx));
    let add_op = expr::add(Expr::Vector(vy.clone()), scal_op);
    ex.execute(expr::assign(vy, add_op))
}

/// COPY: `y := x`.
///
/// With aliased equal-offset views this is a no-op; aliased views at
/// different offsets are undefined.
pub fn copy<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let vy = make_vector_view(y, incy, n)?;
    ex.execute(expr::assign(vy, Expr::Vector(vx)))
}

/// COPY staged through on-chip scratch tiles, `tile_size` elements per
/// chunk.
///
/// Falls back to the plain [`copy`] (with a diagnostic, never an error)
/// when the tile does not evenly divide `n`, when the tile footprint
/// reaches [`ONCHIP_MEMORY_SIZE`], or when either increment walks
/// backwards. A non-unit destination increment forces the destination
/// chunk through its own scratch tile first, since strided gaps cannot be
/// addressed contiguously in the tile.
pub fn copy_tiled<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
    tile_size: usize,
) -> Result<Event> {
    if tile_size == 0 {
        return Err(BlasError::ZeroTile);
    }
    if n == 0 {
        return copy(ex, n, x, incx, y, incy);
    }
    if n % tile_size != 0 || tile_size * std::mem::size_of::<T>() >= ONCHIP_MEMORY_SIZE {
        log::warn!(
            "reverting to plain copy: tile size {tile_size} cannot run the tiled variant for n={n}"
        );
        return copy(ex, n, x, incx, y, incy);
    }
    if incx < 1 || incy < 1 {
        log::warn!("reverting to plain copy: tiled staging requires forward increments");
        return copy(ex, n, x, incx, y, incy);
    }
    let sx = incx as usize;
    let sy = incy as usize;
    // Staging copies whole inc-strided spans; the final span must exist.
    if n * sx > x.len() || n * sy > y.len() {
        log::warn!("reverting to plain copy: strided tail does not cover a full tile span");
        return copy(ex, n, x, incx, y, incy);
    }

    let x_tile = DeviceBuffer::from_elem(T::zero(), tile_size * sx);
    let y_tile = DeviceBuffer::from_elem(T::zero(), tile_size * sy);
    let x_tile_view = VectorView::new(&x_tile, 0, incx, tile_size)?;
    let y_tile_view = VectorView::new(&y_tile, 0, incy, tile_size)?;

    let mut last = None;
    for i in (0..n).step_by(tile_size) {
        stage_into_scratch(ex, &x_tile, x, tile_size * sx, i * sx)?;
        if incy != 1 {
            // Read-modify: preserve the strided gaps of the destination
            // chunk before assigning over it.
            stage_into_scratch(ex, &y_tile, y, tile_size * sy, i * sy)?;
        }
        ex.execute(expr::assign(
            y_tile_view.clone(),
            Expr::Vector(x_tile_view.clone()),
        ))?;
        last = Some(drain_from_scratch(ex, &y_tile, y, tile_size * sy, i * sy)?);
    }
    // n > 0 and tile_size divides n, so at least one chunk ran.
    last.ok_or_else(|| BlasError::Device("tiled copy scheduled no chunks".into()))
}

fn reduction_geometry(ex: &Executor) -> (usize, usize) {
    let local = ex.work_group_size();
    (local, 2 * local)
}

/// DOT: inner product of two vectors, written to the 1-element `result`
/// buffer.
pub fn dot<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
    result: &Arc<DeviceBuffer<T>>,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let vy = make_vector_view(y, incy, n)?;
    let rs = VectorView::new(result, 0, 1, 1)?;
    let prod_op = expr::prod(Expr::Vector(vx), Expr::Vector(vy));
    let (local, n_groups) = reduction_geometry(ex);
    ex.reduce(sum_reduction(rs, prod_op, local, n_groups))
}

/// DOT, host-scalar form (synchronous).
pub fn dot_host<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
) -> Result<T> {
    let result = DeviceBuffer::from_elem(T::zero(), 1);
    dot(ex, n, x, incx, y, incy, &result)?.wait()?;
    Ok(ex.copy_to_host(&result)?[0])
}

/// ASUM: sum of absolute values, written to the 1-element `result` buffer.
pub fn asum<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    result: &Arc<DeviceBuffer<T>>,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let rs = VectorView::new(result, 0, 1, 1)?;
    let (local, n_groups) = reduction_geometry(ex);
    ex.reduce(abs_sum_reduction(rs, Expr::Vector(vx), local, n_groups))
}

/// ASUM, host-scalar form (synchronous).
pub fn asum_host<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
) -> Result<T> {
    let result = DeviceBuffer::from_elem(T::zero(), 1);
    asum(ex, n, x, incx, &result)?.wait()?;
    Ok(ex.copy_to_host(&result)?[0])
}

/// IAMAX: index of the first element with maximum value, written as an
/// [`IndexValuePair`] to the 1-element `result` buffer.
pub fn iamax<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    result: &Arc<DeviceBuffer<IndexValuePair<T>>>,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let rs = VectorView::new(result, 0, 1, 1)?;
    let (local, n_groups) = reduction_geometry(ex);
    ex.reduce_index(max_index_reduction(rs, vx, local, n_groups))
}

/// IAMAX, host-index form (synchronous).
pub fn iamax_host<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
) -> Result<usize> {
    let result = DeviceBuffer::from_elem(
        IndexValuePair {
            index: 0,
            value: T::zero(),
        },
        1,
    );
    iamax(ex, n, x, incx, &result)?.wait()?;
    Ok(ex.copy_to_host(&result)?[0].index)
}

/// IAMIN: index of the first element with minimum value.
pub fn iamin<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    result: &Arc<DeviceBuffer<IndexValuePair<T>>>,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let rs = VectorView::new(result, 0, 1, 1)?;
    let (local, n_groups) = reduction_geometry(ex);
    ex.reduce_index(min_index_reduction(rs, vx, local, n_groups))
}

/// IAMIN, host-index form (synchronous).
pub fn iamin_host<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
) -> Result<usize> {
    let result = DeviceBuffer::from_elem(
        IndexValuePair {
            index: 0,
            value: T::zero(),
        },
        1,
    );
    iamin(ex, n, x, incx, &result)?.wait()?;
    Ok(ex.copy_to_host(&result)?[0].index)
}

/// SWAP: interchange two vectors through one dual assignment.
pub fn swap<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let vy = make_vector_view(y, incy, n)?;
    let swap_op = expr::dual_assign(
        vy.clone(),
        vx.clone(),
        Expr::Vector(vx),
        Expr::Vector(vy),
    );
    ex.execute(swap_op)
}

/// SCAL: `x := alpha*x`, in-place.
pub fn scal<T: Scalar>(
    ex: &Executor,
    n: usize,
    alpha: T,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let scal_op = expr::scal_mul(alpha, Expr::Vector(vx.clone()));
    ex.execute(expr::assign(vx, scal_op))
}

/// NRM2: Euclidean norm, written to the 1-element `result` buffer.
///
/// A sum reduction over elementwise squares, then a single square-root
/// assignment executed over the 1-element result.
pub fn nrm2<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    result: &Arc<DeviceBuffer<T>>,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let rs = VectorView::new(result, 0, 1, 1)?;
    let square_op = expr::square(Expr::Vector(vx));
    let (local, n_groups) = reduction_geometry(ex);
    ex.reduce(sum_reduction(rs.clone(), square_op, local, n_groups))?;
    let sqrt_op = expr::sqrt(Expr::Vector(rs.clone()));
    ex.execute(expr::assign(rs, sqrt_op))
}

/// NRM2, host-scalar form (synchronous).
pub fn nrm2_host<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
) -> Result<T> {
    let result = DeviceBuffer::from_elem(T::zero(), 1);
    nrm2(ex, n, x, incx, &result)?.wait()?;
    Ok(ex.copy_to_host(&result)?[0])
}

/// ROT: apply a plane rotation with parameters `c`, `s` to two vectors.
///
/// One dual assignment: `x := c*x + s*y`, `y := -s*x + c*y`, both sides
/// evaluated from the pre-rotation values.
pub fn rot<T: Scalar>(
    ex: &Executor,
    n: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
    c: T,
    s: T,
) -> Result<Event> {
    let vx = make_vector_view(x, incx, n)?;
    let vy = make_vector_view(y, incy, n)?;
    let scal1 = expr::scal_mul(c, Expr::Vector(vx.clone()));
    let scal2 = expr::scal_mul(s, Expr::Vector(vy.clone()));
    let scal3 = expr::scal_mul(-s, Expr::Vector(vx.clone()));
    let scal4 = expr::scal_mul(c, Expr::Vector(vy.clone()));
    let add12 = expr::add(scal1, scal2);
    let add34 = expr::add(scal3, scal4);
    ex.execute(expr::dual_assign(vx, vy, add12, add34))
}

/// ROTG: construct the plane rotation annihilating `b`.
///
/// Pure host scalar math; no device work. On return `a` holds the rotated
/// norm, `b` the reconstruction parameter, `c`/`s` the rotation. A zero
/// scale produces the identity rotation.
pub fn rotg<T: Scalar>(a: &mut T, b: &mut T, c: &mut T, s: &mut T) {
    let abs_a = a.abs();
    let abs_b = b.abs();
    let roe = if abs_a > abs_b { *a } else { *b };
    let scale = abs_a + abs_b;
    let norm;
    let aux;
    if scale == T::zero() {
        *c = T::one();
        *s = T::zero();
        norm = T::zero();
        aux = T::zero();
    } else {
        let scaled_a = *a / scale;
        let scaled_b = *b / scale;
        let mut signed = scale * (scaled_a * scaled_a + scaled_b * scaled_b).sqrt();
        if roe < T::zero() {
            signed = -signed;
        }
        *c = *a / signed;
        *s = *b / signed;
        aux = if abs_a > abs_b {
            *s
        } else if *c != T::zero() {
            T::one() / *c
        } else {
            T::one()
        };
        norm = signed;
    }
    *a = norm;
    *b = aux;
}
