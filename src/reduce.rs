//! Two-phase parallel tree reductions.
//!
//! A reduction collapses an N-element source into a 1-element output view
//! in two ordered phases:
//!
//! 1. **Partial phase**: the N logical elements are partitioned into
//!    contiguous chunks, one per work-group (`elements_per_group =
//!    ceil(N / work_group_count)`, last chunk possibly partial). Each group
//!    reduces its chunk with the combine rule into a per-group scratch
//!    slot.
//! 2. **Combine phase**: while more than one partial remains, runs of
//!    `work_group_size` partials are reduced with the same rule — the
//!    combine is itself recursively a reduction over a smaller N.
//!
//! Sum rules combine by addition, so callers comparing against a reference
//! must tolerate reduction-order floating-point differences. Index rules
//! carry each value's originating logical index through both phases and
//! break value ties toward the smaller index (first occurrence), which
//! holds transitively because the tie-break compares original indices, not
//! work-group-local ones.

use crate::expr::Expr;
use crate::queue::Event;
use crate::view::VectorView;
use crate::{BlasError, Executor, Result, Scalar};
use rayon::prelude::*;

/// Combine rule for value reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumRule {
    /// Plain sum.
    Sum,
    /// Sum of absolute values.
    AbsSum,
}

impl SumRule {
    /// Pre-map an element before accumulation; applied in the partial
    /// phase only.
    fn map<T: Scalar>(self, x: T) -> T {
        match self {
            SumRule::Sum => x,
            SumRule::AbsSum => x.abs(),
        }
    }
}

/// Combine rule for index-tracking reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumRule {
    /// Keep the larger value; ties keep the smaller index.
    MaxIndex,
    /// Keep the smaller value; ties keep the smaller index.
    MinIndex,
}

/// A reduced value paired with its originating logical index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexValuePair<T> {
    pub index: usize,
    pub value: T,
}

impl ExtremumRule {
    fn pick<T: Scalar>(self, a: IndexValuePair<T>, b: IndexValuePair<T>) -> IndexValuePair<T> {
        let b_wins = match self {
            ExtremumRule::MaxIndex => b.value > a.value,
            ExtremumRule::MinIndex => b.value < a.value,
        };
        if b_wins || (b.value == a.value && b.index < a.index) {
            b
        } else {
            a
        }
    }
}

/// Descriptor for a sum/abs-sum reduction of an expression tree into a
/// 1-element view.
#[derive(Debug, Clone)]
pub struct SumReduction<T> {
    pub(crate) dst: VectorView<T>,
    pub(crate) src: Expr<T>,
    pub(crate) rule: SumRule,
    pub(crate) work_group_size: usize,
    pub(crate) work_group_count: usize,
}

/// Descriptor for an index-of-extremum reduction of a vector view into a
/// 1-element [`IndexValuePair`] view.
#[derive(Debug, Clone)]
pub struct IndexReduction<T> {
    pub(crate) dst: VectorView<IndexValuePair<T>>,
    pub(crate) src: VectorView<T>,
    pub(crate) rule: ExtremumRule,
    pub(crate) work_group_size: usize,
    pub(crate) work_group_count: usize,
}

/// Sum-reduce `src` into the 1-element `dst`.
pub fn sum_reduction<T>(
    dst: VectorView<T>,
    src: Expr<T>,
    work_group_size: usize,
    work_group_count: usize,
) -> SumReduction<T> {
    SumReduction {
        dst,
        src,
        rule: SumRule::Sum,
        work_group_size,
        work_group_count,
    }
}

/// Sum the absolute values of `src` into the 1-element `dst`.
pub fn abs_sum_reduction<T>(
    dst: VectorView<T>,
    src: Expr<T>,
    work_group_size: usize,
    work_group_count: usize,
) -> SumReduction<T> {
    SumReduction {
        dst,
        src,
        rule: SumRule::AbsSum,
        work_group_size,
        work_group_count,
    }
}

/// Locate the first maximum of `src`, writing `(index, value)` into `dst`.
pub fn max_index_reduction<T>(
    dst: VectorView<IndexValuePair<T>>,
    src: VectorView<T>,
    work_group_size: usize,
    work_group_count: usize,
) -> IndexReduction<T> {
    IndexReduction {
        dst,
        src,
        rule: ExtremumRule::MaxIndex,
        work_group_size,
        work_group_count,
    }
}

/// Locate the first minimum of `src`, writing `(index, value)` into `dst`.
pub fn min_index_reduction<T>(
    dst: VectorView<IndexValuePair<T>>,
    src: VectorView<T>,
    work_group_size: usize,
    work_group_count: usize,
) -> IndexReduction<T> {
    IndexReduction {
        dst,
        src,
        rule: ExtremumRule::MinIndex,
        work_group_size,
        work_group_count,
    }
}

fn check_geometry(work_group_size: usize, work_group_count: usize, dst_len: usize) -> Result<()> {
    if work_group_size == 0 || work_group_count == 0 {
        return Err(BlasError::ZeroWorkGroup);
    }
    if dst_len != 1 {
        return Err(BlasError::ShapeMismatch(dst_len, 1));
    }
    Ok(())
}

impl Executor {
    /// Enqueue a two-phase sum reduction.
    ///
    /// Geometry and shape problems are configuration errors raised before
    /// submission; the launch itself is asynchronous.
    pub fn reduce<T: Scalar>(&self, reduction: SumReduction<T>) -> Result<Event> {
        check_geometry(
            reduction.work_group_size,
            reduction.work_group_count,
            reduction.dst.len(),
        )?;
        let n = reduction.src.len()?;
        let SumReduction {
            dst,
            src,
            rule,
            work_group_size,
            work_group_count,
        } = reduction;

        self.submit_task(move || {
            if n == 0 {
                unsafe { dst.write(0, T::zero()) };
                return Ok(());
            }
            let per_group = n.div_ceil(work_group_count);
            let groups = n.div_ceil(per_group);

            let mut partials = vec![T::zero(); groups];
            partials.par_iter_mut().enumerate().for_each(|(g, slot)| {
                let start = g * per_group;
                let end = (start + per_group).min(n);
                let mut acc = T::zero();
                for i in start..end {
                    acc = acc + rule.map(unsafe { src.eval(i) });
                }
                *slot = acc;
            });

            while partials.len() > 1 {
                let m = partials.len();
                let mut next = vec![T::zero(); m.div_ceil(work_group_size)];
                next.par_iter_mut().enumerate().for_each(|(g, slot)| {
                    let start = g * work_group_size;
                    let end = (start + work_group_size).min(m);
                    let mut acc = T::zero();
                    for partial in &partials[start..end] {
                        acc = acc + *partial;
                    }
                    *slot = acc;
                });
                partials = next;
            }

            unsafe { dst.write(0, partials[0]) };
            Ok(())
        })
    }

    /// Enqueue a two-phase index-of-extremum reduction.
    pub fn reduce_index<T: Scalar>(&self, reduction: IndexReduction<T>) -> Result<Event> {
        check_geometry(
            reduction.work_group_size,
            reduction.work_group_count,
            reduction.dst.len(),
        )?;
        let n = reduction.src.len();
        let IndexReduction {
            dst,
            src,
            rule,
            work_group_size,
            work_group_count,
        } = reduction;

        self.submit_task(move || {
            if n == 0 {
                unsafe {
                    dst.write(
                        0,
                        IndexValuePair {
                            index: 0,
                            value: T::zero(),
                        },
                    )
                };
                return Ok(());
            }
            let per_group = n.div_ceil(work_group_count);
            let groups = n.div_ceil(per_group);

            let seed = IndexValuePair {
                index: 0,
                value: T::zero(),
            };
            let mut partials = vec![seed; groups];
            partials.par_iter_mut().enumerate().for_each(|(g, slot)| {
                let start = g * per_group;
                let end = (start + per_group).min(n);
                let mut best = IndexValuePair {
                    index: start,
                    value: unsafe { src.read(start) },
                };
                for i in start + 1..end {
                    let candidate = IndexValuePair {
                        index: i,
                        value: unsafe { src.read(i) },
                    };
                    best = rule.pick(best, candidate);
                }
                *slot = best;
            });

            while partials.len() > 1 {
                let m = partials.len();
                let mut next = vec![seed; m.div_ceil(work_group_size)];
                next.par_iter_mut().enumerate().for_each(|(g, slot)| {
                    let start = g * work_group_size;
                    let end = (start + work_group_size).min(m);
                    let mut best = partials[start];
                    for partial in &partials[start + 1..end] {
                        best = rule.pick(best, *partial);
                    }
                    *slot = best;
                });
                partials = next;
            }

            unsafe { dst.write(0, partials[0]) };
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DeviceBuffer;
    use crate::expr;

    fn executor() -> Executor {
        Executor::with_work_group_size(4).unwrap()
    }

    #[test]
    fn zero_geometry_is_a_config_error() {
        let ex = executor();
        let buf = DeviceBuffer::from_elem(1.0_f64, 16);
        let out = DeviceBuffer::from_elem(0.0_f64, 1);
        let src = VectorView::new(&buf, 0, 1, 16).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        let bad = sum_reduction(dst.clone(), Expr::Vector(src.clone()), 0, 4);
        assert!(matches!(ex.reduce(bad), Err(BlasError::ZeroWorkGroup)));
        let bad = sum_reduction(dst, Expr::Vector(src), 4, 0);
        assert!(matches!(ex.reduce(bad), Err(BlasError::ZeroWorkGroup)));
    }

    #[test]
    fn recursive_combine_matches_direct_sum() {
        // Small work-group size forces several combine levels.
        let ex = executor();
        let data: Vec<f64> = (1..=1000).map(|i| i as f64).collect();
        let buf = DeviceBuffer::from_slice(&data);
        let out = DeviceBuffer::from_elem(0.0_f64, 1);
        let src = VectorView::new(&buf, 0, 1, data.len()).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        ex.reduce(sum_reduction(dst, Expr::Vector(src), 4, 128))
            .unwrap()
            .wait()
            .unwrap();
        let total = ex.copy_to_host(&out).unwrap()[0];
        assert_eq!(total, 500500.0);
    }

    #[test]
    fn abs_sum_maps_in_partial_phase_only() {
        let ex = executor();
        let buf = DeviceBuffer::from_slice(&[-1.0_f64, 2.0, -3.0, 4.0, -5.0]);
        let out = DeviceBuffer::from_elem(0.0_f64, 1);
        let src = VectorView::new(&buf, 0, 1, 5).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        ex.reduce(abs_sum_reduction(dst, Expr::Vector(src), 2, 3))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(ex.copy_to_host(&out).unwrap()[0], 15.0);
    }

    #[test]
    fn tie_break_prefers_smaller_index_across_group_boundaries() {
        let ex = executor();
        // Tied maxima at indices 2 and 9, landing in different work-groups.
        let buf = DeviceBuffer::from_slice(&[
            1.0_f64, 0.0, 7.0, 3.0, 2.0, 1.0, 0.5, 4.0, 6.0, 7.0, 2.0, 1.0,
        ]);
        let out = DeviceBuffer::from_elem(IndexValuePair { index: 0, value: 0.0_f64 }, 1);
        let src = VectorView::new(&buf, 0, 1, 12).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        ex.reduce_index(max_index_reduction(dst, src, 2, 4))
            .unwrap()
            .wait()
            .unwrap();
        let best = ex.copy_to_host(&out).unwrap()[0];
        assert_eq!(best.index, 2);
        assert_eq!(best.value, 7.0);
    }

    #[test]
    fn min_index_reduction_over_expression_free_source() {
        let ex = executor();
        let buf = DeviceBuffer::from_slice(&[4.0_f64, -2.0, 9.0, -2.0, 5.0]);
        let out = DeviceBuffer::from_elem(IndexValuePair { index: 0, value: 0.0_f64 }, 1);
        let src = VectorView::new(&buf, 0, 1, 5).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        ex.reduce_index(min_index_reduction(dst, src, 2, 2))
            .unwrap()
            .wait()
            .unwrap();
        let best = ex.copy_to_host(&out).unwrap()[0];
        assert_eq!((best.index, best.value), (1, -2.0));
    }

    #[test]
    fn reduction_over_composed_tree() {
        // sum((2x)^2) through scalar and unary nodes
        let ex = executor();
        let buf = DeviceBuffer::from_slice(&[1.0_f64, 2.0, 3.0]);
        let out = DeviceBuffer::from_elem(0.0_f64, 1);
        let src = VectorView::new(&buf, 0, 1, 3).unwrap();
        let dst = VectorView::new(&out, 0, 1, 1).unwrap();

        let tree = expr::square(expr::scal_mul(2.0, Expr::Vector(src)));
        ex.reduce(sum_reduction(dst, tree, 8, 2))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(ex.copy_to_host(&out).unwrap()[0], 4.0 + 16.0 + 36.0);
    }
}
