//! Lazily composed operation trees.
//!
//! Every Level-1 routine (and the combine step of every Level-2 strategy)
//! is expressed by composing a small, closed set of node kinds over views:
//! leaves, unary maps, binary zips, scalar broadcasts, plus the two
//! matrix-shaped nodes [`Expr::SumCols`] and [`Expr::Rank1`]. Composition
//! is pure data construction — nothing reaches the device until the tree is
//! handed to [`Executor::execute`](crate::Executor::execute) as a
//! [`Statement`].
//!
//! Evaluation is a single recursive descent per logical index: every output
//! element depends only on same-index input elements, which is what lets
//! the executor fan a tree out across work-groups with no synchronization.

use crate::view::{MatrixView, VectorView};
use crate::{BlasError, Result, Scalar};

/// Elementwise unary building blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFn {
    /// `|x|`
    Abs,
    /// `x * x`
    Square,
    /// `sqrt(x)`
    Sqrt,
}

impl UnaryFn {
    fn apply<T: Scalar>(self, x: T) -> T {
        match self {
            UnaryFn::Abs => x.abs(),
            UnaryFn::Square => x * x,
            UnaryFn::Sqrt => x.sqrt(),
        }
    }
}

/// Elementwise binary building blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFn {
    /// `a + b`
    Add,
    /// `a * b`
    Prod,
}

impl BinaryFn {
    fn apply<T: Scalar>(self, a: T, b: T) -> T {
        match self {
            BinaryFn::Add => a + b,
            BinaryFn::Prod => a * b,
        }
    }
}

/// An immutable node in a lazily composed expression tree.
///
/// Nodes own their children; composing two trees produces a new tree and
/// never a cycle. Matrix-shaped nodes evaluate against a flattened
/// row-major index space (`i = row * cols + col`).
#[derive(Debug, Clone)]
pub enum Expr<T> {
    /// Strided vector leaf.
    Vector(VectorView<T>),
    /// Strided matrix leaf, flattened row-major.
    Matrix(MatrixView<T>),
    /// Unary map over a child tree.
    Unary { f: UnaryFn, child: Box<Expr<T>> },
    /// Binary zip of two equal-length trees.
    Binary {
        f: BinaryFn,
        lhs: Box<Expr<T>>,
        rhs: Box<Expr<T>>,
    },
    /// Scalar broadcast against a child tree.
    Scalar {
        f: BinaryFn,
        alpha: T,
        child: Box<Expr<T>>,
    },
    /// Per-row sum over the columns of a partial-results matrix.
    SumCols(MatrixView<T>),
    /// Outer product `x[row] * y[col]`, flattened row-major.
    Rank1 { x: VectorView<T>, y: VectorView<T> },
}

impl<T: Scalar> Expr<T> {
    /// Logical length, verifying internal shape consistency.
    ///
    /// # Errors
    /// [`BlasError::ShapeMismatch`] when the two sides of a binary node
    /// disagree.
    pub fn len(&self) -> Result<usize> {
        match self {
            Expr::Vector(v) => Ok(v.len()),
            Expr::Matrix(m) => Ok(m.rows() * m.cols()),
            Expr::Unary { child, .. } | Expr::Scalar { child, .. } => child.len(),
            Expr::Binary { lhs, rhs, .. } => {
                let l = lhs.len()?;
                let r = rhs.len()?;
                if l != r {
                    return Err(BlasError::ShapeMismatch(l, r));
                }
                Ok(l)
            }
            Expr::SumCols(m) => Ok(m.rows()),
            Expr::Rank1 { x, y } => Ok(x.len() * y.len()),
        }
    }

    /// Evaluate the tree at logical index `i`.
    ///
    /// # Safety
    /// Only from the device queue worker, with `i` below the validated
    /// length of the tree.
    pub(crate) unsafe fn eval(&self, i: usize) -> T {
        match self {
            Expr::Vector(v) => unsafe { v.read(i) },
            Expr::Matrix(m) => {
                let (r, c) = (i / m.cols(), i % m.cols());
                unsafe { m.read(r, c) }
            }
            Expr::Unary { f, child } => f.apply(unsafe { child.eval(i) }),
            Expr::Binary { f, lhs, rhs } => {
                f.apply(unsafe { lhs.eval(i) }, unsafe { rhs.eval(i) })
            }
            Expr::Scalar { f, alpha, child } => f.apply(*alpha, unsafe { child.eval(i) }),
            Expr::SumCols(m) => {
                let mut acc = T::zero();
                for j in 0..m.cols() {
                    acc = acc + unsafe { m.read(i, j) };
                }
                acc
            }
            Expr::Rank1 { x, y } => {
                let (r, c) = (i / y.len(), i % y.len());
                unsafe { x.read(r) * y.read(c) }
            }
        }
    }
}

/// Multiply a child tree by a scalar: `alpha * child`.
pub fn scal_mul<T: Scalar>(alpha: T, child: Expr<T>) -> Expr<T> {
    Expr::Scalar {
        f: BinaryFn::Prod,
        alpha,
        child: Box::new(child),
    }
}

/// Elementwise sum of two trees.
pub fn add<T: Scalar>(lhs: Expr<T>, rhs: Expr<T>) -> Expr<T> {
    Expr::Binary {
        f: BinaryFn::Add,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Elementwise product of two trees.
pub fn prod<T: Scalar>(lhs: Expr<T>, rhs: Expr<T>) -> Expr<T> {
    Expr::Binary {
        f: BinaryFn::Prod,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Elementwise square.
pub fn square<T: Scalar>(child: Expr<T>) -> Expr<T> {
    Expr::Unary {
        f: UnaryFn::Square,
        child: Box::new(child),
    }
}

/// Elementwise square root.
pub fn sqrt<T: Scalar>(child: Expr<T>) -> Expr<T> {
    Expr::Unary {
        f: UnaryFn::Sqrt,
        child: Box::new(child),
    }
}

/// Elementwise absolute value.
pub fn abs<T: Scalar>(child: Expr<T>) -> Expr<T> {
    Expr::Unary {
        f: UnaryFn::Abs,
        child: Box::new(child),
    }
}

/// Assignment destination: a vector or a flattened row-major matrix window.
#[derive(Debug, Clone)]
pub enum Target<T> {
    Vector(VectorView<T>),
    Matrix(MatrixView<T>),
}

impl<T: Scalar> Target<T> {
    fn len(&self) -> usize {
        match self {
            Target::Vector(v) => v.len(),
            Target::Matrix(m) => m.rows() * m.cols(),
        }
    }

    /// # Safety
    /// Same contract as the view writers.
    pub(crate) unsafe fn write(&self, i: usize, value: T) {
        match self {
            Target::Vector(v) => unsafe { v.write(i, value) },
            Target::Matrix(m) => {
                let (r, c) = (i / m.cols(), i % m.cols());
                unsafe { m.write(r, c, value) }
            }
        }
    }
}

/// A tree rooted at an assignment, ready for the executor.
///
/// `DualAssign` writes two outputs from two sources per index (both sources
/// are evaluated before either destination is written), which is what lets
/// vector swap and plane rotation run without materializing intermediates.
#[derive(Debug, Clone)]
pub enum Statement<T> {
    Assign {
        dst: Target<T>,
        src: Expr<T>,
    },
    DualAssign {
        dst1: VectorView<T>,
        dst2: VectorView<T>,
        src1: Expr<T>,
        src2: Expr<T>,
    },
}

impl<T: Scalar> Statement<T> {
    /// Validate shapes and return the point-wise index-space length.
    pub fn validate(&self) -> Result<usize> {
        match self {
            Statement::Assign { dst, src } => {
                let n = dst.len();
                let m = src.len()?;
                if m != n {
                    return Err(BlasError::ShapeMismatch(n, m));
                }
                Ok(n)
            }
            Statement::DualAssign {
                dst1,
                dst2,
                src1,
                src2,
            } => {
                let n = dst1.len();
                for other in [dst2.len(), src1.len()?, src2.len()?] {
                    if other != n {
                        return Err(BlasError::ShapeMismatch(n, other));
                    }
                }
                Ok(n)
            }
        }
    }

    /// # Safety
    /// Same contract as [`Expr::eval`].
    pub(crate) unsafe fn eval_at(&self, i: usize) {
        match self {
            Statement::Assign { dst, src } => {
                let v = unsafe { src.eval(i) };
                unsafe { dst.write(i, v) };
            }
            Statement::DualAssign {
                dst1,
                dst2,
                src1,
                src2,
            } => {
                let v1 = unsafe { src1.eval(i) };
                let v2 = unsafe { src2.eval(i) };
                unsafe { dst1.write(i, v1) };
                unsafe { dst2.write(i, v2) };
            }
        }
    }
}

/// Assign a tree into a vector view.
pub fn assign<T: Scalar>(dst: VectorView<T>, src: Expr<T>) -> Statement<T> {
    Statement::Assign {
        dst: Target::Vector(dst),
        src,
    }
}

/// Assign a tree into a matrix view (flattened row-major).
pub fn assign_matrix<T: Scalar>(dst: MatrixView<T>, src: Expr<T>) -> Statement<T> {
    Statement::Assign {
        dst: Target::Matrix(dst),
        src,
    }
}

/// Simultaneously assign two trees into two vector views.
pub fn dual_assign<T: Scalar>(
    dst1: VectorView<T>,
    dst2: VectorView<T>,
    src1: Expr<T>,
    src2: Expr<T>,
) -> Statement<T> {
    Statement::DualAssign {
        dst1,
        dst2,
        src1,
        src2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DeviceBuffer;

    #[test]
    fn binary_shape_mismatch_is_a_config_error() {
        let a = DeviceBuffer::from_elem(0.0_f64, 4);
        let b = DeviceBuffer::from_elem(0.0_f64, 6);
        let va = VectorView::new(&a, 0, 1, 4).unwrap();
        let vb = VectorView::new(&b, 0, 1, 6).unwrap();
        let tree = add(Expr::Vector(va), Expr::Vector(vb));
        assert!(matches!(tree.len(), Err(BlasError::ShapeMismatch(4, 6))));
    }

    #[test]
    fn composition_never_touches_the_device() {
        // Building a deep tree over views is pure data construction.
        let a = DeviceBuffer::from_elem(1.0_f64, 8);
        let v = VectorView::new(&a, 0, 1, 8).unwrap();
        let mut tree = Expr::Vector(v.clone());
        for _ in 0..50 {
            tree = add(scal_mul(2.0, tree), Expr::Vector(v.clone()));
        }
        assert_eq!(tree.len().unwrap(), 8);
    }

    #[test]
    fn statement_validation_covers_all_operands() {
        let a = DeviceBuffer::from_elem(0.0_f64, 5);
        let b = DeviceBuffer::from_elem(0.0_f64, 5);
        let va = VectorView::new(&a, 0, 1, 5).unwrap();
        let vb = VectorView::new(&b, 0, 1, 5).unwrap();
        let short = VectorView::new(&b, 0, 1, 3).unwrap();

        let ok = dual_assign(
            va.clone(),
            vb.clone(),
            Expr::Vector(vb.clone()),
            Expr::Vector(va.clone()),
        );
        assert_eq!(ok.validate().unwrap(), 5);

        let bad = dual_assign(va, short, Expr::Vector(vb.clone()), Expr::Vector(vb));
        assert!(bad.validate().is_err());
    }
}
