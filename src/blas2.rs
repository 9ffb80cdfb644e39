//! Level-2 routines: the GEMV scheduler and GER.
//!
//! GEMV partitions `op(A)`'s rows across work-groups under one of several
//! statically chosen strategies. Row-access strategies assume the rows of
//! `op(A)` are contiguous in memory (no-transpose over row-major storage);
//! column-access strategies assume they are strided (transpose). All
//! strategies produce the same mathematical result and differ only in
//! throughput characteristics.
//!
//! Every strategy fills a partial-results matrix `P` (one column per
//! partial per row); the scheduler then always finishes with the uniform
//! combine `y := beta*y + alpha*SumCols(P)` as one executed Assign tree,
//! regardless of which partitioning produced the partials.

use crate::blas1::make_vector_view;
use crate::buffer::DeviceBuffer;
use crate::expr::{self, Expr};
use crate::queue::Event;
use crate::view::{MatrixAccess, MatrixView, VectorView};
use crate::{Executor, Result, Scalar};
use std::sync::Arc;

/// Column-block count for the split-row strategies.
const NWG_COL: usize = 4;
/// Rows per work-group in [`GemvVariant::RowBlockGroups`].
const N_ROWS: usize = 4;
/// Work-items per row in [`GemvVariant::ColSplitItems`].
const N_ITEMS: usize = 16;

/// Transpose mode of a matrix operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    None,
    Transpose,
    /// Equal to [`Transpose::Transpose`] for the real element types this
    /// crate supports.
    ConjTranspose,
}

impl Transpose {
    /// Parse a BLAS transpose flag: case-insensitive first-letter match
    /// against `{n, t, c}`.
    ///
    /// A non-matching flag is a validation warning, not an error —
    /// execution proceeds without transposition.
    pub fn from_flag(flag: &str) -> Self {
        match flag.chars().next().map(|ch| ch.to_ascii_lowercase()) {
            Some('n') => Transpose::None,
            Some('t') => Transpose::Transpose,
            Some('c') => Transpose::ConjTranspose,
            _ => {
                log::warn!("unrecognized transpose flag {flag:?}; proceeding without transpose");
                Transpose::None
            }
        }
    }

    fn is_transposed(self) -> bool {
        !matches!(self, Transpose::None)
    }
}

/// Work-partitioning strategy for [`gemv`].
///
/// A fixed configuration choice, never adapted at runtime. Requesting a
/// variant from the wrong family for the resolved access pattern remaps to
/// that family's default ([`RowPerGroup`](GemvVariant::RowPerGroup) /
/// [`ColItemPerRow`](GemvVariant::ColItemPerRow)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GemvVariant {
    /// One row per work-group, intra-group tree reduction.
    #[default]
    RowPerGroup,
    /// One row per work-group, per-item partials, no intra-group
    /// reduction; the combining pass sums them.
    RowPerGroupNoReduce,
    /// One row spread across several column-blocks of work-groups.
    RowSplitGroups,
    /// Several rows per work-group, split over column-blocks.
    RowBlockGroups,
    /// One work-item per output row, no local staging.
    ColItemPerRow,
    /// Input-vector chunk staged once per work-group and reused across
    /// that group's rows.
    ColCachedChunk,
    /// Several work-items per row writing a per-item partial matrix.
    ColSplitItems,
}

impl GemvVariant {
    fn is_row_family(self) -> bool {
        matches!(
            self,
            GemvVariant::RowPerGroup
                | GemvVariant::RowPerGroupNoReduce
                | GemvVariant::RowSplitGroups
                | GemvVariant::RowBlockGroups
        )
    }
}

fn resolve_variant(variant: GemvVariant, access: MatrixAccess) -> GemvVariant {
    match access {
        MatrixAccess::RowMajor if !variant.is_row_family() => {
            log::debug!("{variant:?} is a column-access strategy; using RowPerGroup");
            GemvVariant::RowPerGroup
        }
        MatrixAccess::ColMajor if variant.is_row_family() => {
            log::debug!("{variant:?} is a row-access strategy; using ColItemPerRow");
            GemvVariant::ColItemPerRow
        }
        _ => variant,
    }
}

/// GEMV: `y := beta*y + alpha*op(A)*x`.
///
/// `A` is `m x n` in row-major storage with leading dimension `lda >= n`.
/// Without transposition `x` has `n` and `y` has `m` logical elements;
/// transposed, `x` has `m` and `y` has `n`.
#[allow(clippy::too_many_arguments)]
pub fn gemv<T: Scalar>(
    ex: &Executor,
    trans: &str,
    m: usize,
    n: usize,
    alpha: T,
    a: &Arc<DeviceBuffer<T>>,
    lda: usize,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    beta: T,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
    variant: GemvVariant,
) -> Result<Event> {
    let trans = Transpose::from_flag(trans);
    // op(A) is l x k; the access flag re-walks the same storage.
    let (l, k, access) = if trans.is_transposed() {
        (n, m, MatrixAccess::ColMajor)
    } else {
        (m, n, MatrixAccess::RowMajor)
    };
    let op_a = MatrixView::new(a, l, k, lda, access, 0)?;
    let vx = make_vector_view(x, incx, k)?;
    let vy = make_vector_view(y, incy, l)?;

    let partials = match resolve_variant(variant, access) {
        GemvVariant::RowPerGroup => row_per_group(ex, &op_a, &vx)?,
        GemvVariant::RowPerGroupNoReduce => row_per_group_no_reduce(ex, &op_a, &vx)?,
        GemvVariant::RowSplitGroups => row_split_groups(ex, &op_a, &vx)?,
        GemvVariant::RowBlockGroups => row_block_groups(ex, &op_a, &vx)?,
        GemvVariant::ColItemPerRow => col_item_per_row(ex, &op_a, &vx)?,
        GemvVariant::ColCachedChunk => col_cached_chunk(ex, &op_a, &vx)?,
        GemvVariant::ColSplitItems => col_split_items(ex, &op_a, &vx)?,
    };

    let scal1 = expr::scal_mul(beta, Expr::Vector(vy.clone()));
    let scal2 = expr::scal_mul(alpha, Expr::SumCols(partials));
    let add_op = expr::add(scal1, scal2);
    ex.execute(expr::assign(vy, add_op))
}

/// GER: `A := A + alpha*x*y^T`, one elementwise tree, no reduction.
#[allow(clippy::too_many_arguments)]
pub fn ger<T: Scalar>(
    ex: &Executor,
    m: usize,
    n: usize,
    alpha: T,
    x: &Arc<DeviceBuffer<T>>,
    incx: isize,
    y: &Arc<DeviceBuffer<T>>,
    incy: isize,
    a: &Arc<DeviceBuffer<T>>,
    lda: usize,
) -> Result<Event> {
    let ma = MatrixView::new(a, m, n, lda, MatrixAccess::RowMajor, 0)?;
    let vx = make_vector_view(x, incx, m)?;
    let vy = make_vector_view(y, incy, n)?;
    let modif_op = Expr::Rank1 { x: vx, y: vy };
    let scal_op = expr::scal_mul(alpha, modif_op);
    let add_op = expr::add(Expr::Matrix(ma.clone()), scal_op);
    ex.execute(expr::assign_matrix(ma, add_op))
}

/// Fresh zero-filled partial-results matrix, row-major `rows x cols`.
fn partials_matrix<T: Scalar>(rows: usize, cols: usize) -> Result<MatrixView<T>> {
    let buf = DeviceBuffer::from_elem(T::zero(), rows * cols);
    MatrixView::new(&buf, rows, cols, cols.max(1), MatrixAccess::RowMajor, 0)
}

fn row_per_group<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let items = ex.work_group_size().min(k.max(1));
    let partials = partials_matrix::<T>(l, 1)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l, move |row| {
        // items stride the columns, then fold their partials as a tree
        let mut local = vec![T::zero(); items];
        for (t, slot) in local.iter_mut().enumerate() {
            let mut acc = T::zero();
            let mut c = t;
            while c < k {
                acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
                c += items;
            }
            *slot = acc;
        }
        let mut active = items;
        while active > 1 {
            let half = active / 2;
            for t in 0..half {
                local[t] = local[t] + local[active - half + t];
            }
            active -= half;
        }
        unsafe { out.write(row, 0, local[0]) };
    })?;
    Ok(partials)
}

fn row_per_group_no_reduce<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let items = ex.work_group_size().min(k.max(1));
    let partials = partials_matrix::<T>(l, items)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l, move |row| {
        for t in 0..items {
            let mut acc = T::zero();
            let mut c = t;
            while c < k {
                acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
                c += items;
            }
            unsafe { out.write(row, t, acc) };
        }
    })?;
    Ok(partials)
}

fn row_split_groups<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let blocks = NWG_COL.min(k.max(1));
    let chunk = k.div_ceil(blocks).max(1);
    let partials = partials_matrix::<T>(l, blocks)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l * blocks, move |g| {
        let row = g / blocks;
        let block = g % blocks;
        let start = block * chunk;
        let end = (start + chunk).min(k);
        let mut acc = T::zero();
        for c in start..end {
            acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
        }
        unsafe { out.write(row, block, acc) };
    })?;
    Ok(partials)
}

fn row_block_groups<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let blocks = NWG_COL.min(k.max(1));
    let chunk = k.div_ceil(blocks).max(1);
    let row_blocks = l.div_ceil(N_ROWS);
    let partials = partials_matrix::<T>(l, blocks)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(row_blocks * blocks, move |g| {
        let row_block = g / blocks;
        let block = g % blocks;
        let start = block * chunk;
        let end = (start + chunk).min(k);
        for row in row_block * N_ROWS..((row_block + 1) * N_ROWS).min(l) {
            let mut acc = T::zero();
            for c in start..end {
                acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
            }
            unsafe { out.write(row, block, acc) };
        }
    })?;
    Ok(partials)
}

fn col_item_per_row<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let local_size = ex.work_group_size();
    let partials = partials_matrix::<T>(l, 1)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l.div_ceil(local_size), move |g| {
        for t in 0..local_size {
            let row = g * local_size + t;
            if row >= l {
                break;
            }
            let mut acc = T::zero();
            for c in 0..k {
                acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
            }
            unsafe { out.write(row, 0, acc) };
        }
    })?;
    Ok(partials)
}

fn col_cached_chunk<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let local_size = ex.work_group_size();
    let partials = partials_matrix::<T>(l, 1)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l.div_ceil(local_size), move |g| {
        let row_start = g * local_size;
        let row_end = (row_start + local_size).min(l);
        let mut acc = vec![T::zero(); row_end - row_start];
        let mut cache = vec![T::zero(); local_size];
        let mut col = 0;
        while col < k {
            let span = local_size.min(k - col);
            // stage the x chunk once, reuse it across the group's rows
            for (t, slot) in cache[..span].iter_mut().enumerate() {
                *slot = unsafe { vx.read(col + t) };
            }
            for (slot, row) in acc.iter_mut().zip(row_start..row_end) {
                let mut row_acc = *slot;
                for (t, cached) in cache[..span].iter().enumerate() {
                    row_acc = row_acc + unsafe { op_a.read(row, col + t) } * *cached;
                }
                *slot = row_acc;
            }
            col += span;
        }
        for (slot, row) in acc.iter().zip(row_start..row_end) {
            unsafe { out.write(row, 0, *slot) };
        }
    })?;
    Ok(partials)
}

fn col_split_items<T: Scalar>(
    ex: &Executor,
    op_a: &MatrixView<T>,
    vx: &VectorView<T>,
) -> Result<MatrixView<T>> {
    let (l, k) = (op_a.rows(), op_a.cols());
    let local_size = ex.work_group_size();
    let items = N_ITEMS.min(k.max(1));
    let chunk = k.div_ceil(items).max(1);
    let partials = partials_matrix::<T>(l, items)?;

    let op_a = op_a.clone();
    let vx = vx.clone();
    let out = partials.clone();
    ex.launch(l.div_ceil(local_size), move |g| {
        for t_row in 0..local_size {
            let row = g * local_size + t_row;
            if row >= l {
                break;
            }
            for item in 0..items {
                let start = item * chunk;
                let end = (start + chunk).min(k);
                let mut acc = T::zero();
                for c in start..end {
                    acc = acc + unsafe { op_a.read(row, c) * vx.read(c) };
                }
                unsafe { out.write(row, item, acc) };
            }
        }
    })?;
    Ok(partials)
}
