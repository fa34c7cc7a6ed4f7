//! Multi-axis reduction driver.
//!
//! A request names a source layout, a destination layout of the same rank and
//! a set of axes. The driver copies the source into a private working buffer,
//! collapses the selected axes one at a time in ascending order, and finally
//! scatters the collapsed values into the destination by enumerating the
//! destination shape twice: once with the source strides (where each reduced
//! value sits in the working buffer) and once with the destination strides
//! (where it must be written).

use num_traits::Float;

use crate::enumerate::{base_offsets, mapping_offsets};
use crate::layout::{LayoutValidator, PackedLayout};
use crate::op::{reduce_lines, ReduceOp};
use crate::view::{row_major_strides, StridedArray, StridedView, StridedViewMut};
use crate::{Result, StridedError};

/// Shape and stride descriptors of one side of a request.
#[derive(Debug, Clone, Copy)]
struct Side<'a> {
    dims: &'a [usize],
    strides: &'a [isize],
    len: usize,
}

/// Reduction driver parameterized by the layout validator it consults.
///
/// ```rust
/// use strided_reduce::{ReduceOp, Reducer, StridedArray};
///
/// let a = StridedArray::<f64>::from_fn_row_major(&[2, 3], |idx| (idx[0] * 3 + idx[1] + 1) as f64);
/// let mut out = StridedArray::<f64>::row_major(&[2, 1]);
/// Reducer::new()
///     .reduce_into(ReduceOp::Min, &a.view(), &mut out.view_mut(), &[1])
///     .unwrap();
/// assert_eq!(out.data(), &[1.0, 4.0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Reducer<V = PackedLayout> {
    validator: V,
}

impl Reducer<PackedLayout> {
    /// Driver using [`PackedLayout`].
    pub fn new() -> Self {
        Self {
            validator: PackedLayout,
        }
    }
}

impl<V: LayoutValidator> Reducer<V> {
    /// Driver using a caller-supplied layout validator.
    pub fn with_validator(validator: V) -> Self {
        Self { validator }
    }

    /// Check a request without touching any data.
    ///
    /// Returns the selected axes sorted ascending. The destination is taken as
    /// an immutable view so the check can run before a mutable borrow exists;
    /// use [`StridedViewMut::as_view`] to obtain one.
    pub fn validate<T>(
        &self,
        src: &StridedView<'_, T>,
        dst: &StridedView<'_, T>,
        axes: &[usize],
    ) -> Result<Vec<usize>> {
        let src = Side {
            dims: src.dims(),
            strides: src.strides(),
            len: src.len(),
        };
        let dst = Side {
            dims: dst.dims(),
            strides: dst.strides(),
            len: dst.len(),
        };
        check_rank(&src, &dst)?;
        self.check(&src, &dst, &wide_axes(axes))
    }

    /// Reduce `src` along `axes` and write the result into `dst`.
    ///
    /// `dst` must have the same rank as `src`, length 0 or 1 along every
    /// selected axis, and exactly `src.len() / prod(src.dims()[axes])`
    /// elements. The source is never modified; `dst` is left untouched when
    /// any check fails.
    pub fn reduce_into<T: Float>(
        &self,
        op: ReduceOp,
        src: &StridedView<'_, T>,
        dst: &mut StridedViewMut<'_, T>,
        axes: &[usize],
    ) -> Result<()> {
        let (dst_dims, dst_strides, dst_data) = dst.parts_mut();
        let src_side = Side {
            dims: src.dims(),
            strides: src.strides(),
            len: src.len(),
        };
        let dst_side = Side {
            dims: dst_dims,
            strides: dst_strides,
            len: dst_data.len(),
        };
        check_rank(&src_side, &dst_side)?;
        self.run(
            op,
            src.data(),
            &src_side,
            dst_data,
            &dst_side,
            &wide_axes(axes),
        )
    }

    /// Flat-buffer entry point; see [`RawReduceArgs`].
    pub fn reduce_raw<T: Float>(&self, args: RawReduceArgs<'_, T>) -> Result<()> {
        let op = ReduceOp::try_from(args.op)?;

        let (
            Some(src_values),
            Some(src_dims),
            Some(src_strides),
            Some(dst_values),
            Some(dst_dims),
            Some(dst_strides),
            Some(axes),
        ) = (
            args.src_values,
            args.src_dims,
            args.src_strides,
            args.dst_values,
            args.dst_dims,
            args.dst_strides,
            args.axes,
        )
        else {
            return Err(StridedError::InvalidArguments(
                "missing buffer or descriptor",
            ));
        };

        let src = Side {
            dims: src_dims,
            strides: src_strides,
            len: src_values.len(),
        };
        let dst = Side {
            dims: dst_dims,
            strides: dst_strides,
            len: dst_values.len(),
        };
        check_rank(&src, &dst)?;
        self.run(op, src_values, &src, dst_values, &dst, &wide_axes(axes))
    }

    /// Layout, axis and shape checks shared by every entry point.
    fn check(&self, src: &Side<'_>, dst: &Side<'_>, axes: &[i128]) -> Result<Vec<usize>> {
        self.validator.check(src.dims, src.strides, src.len)?;
        self.validator.check(dst.dims, dst.strides, dst.len)?;

        let mut sorted = axes.to_vec();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(StridedError::DuplicateAxis { axis: pair[0] });
        }

        let rank = src.dims.len();
        let mut selected = Vec::with_capacity(sorted.len());
        let mut reduced = 1usize;
        for &axis in &sorted {
            let k = usize::try_from(axis)
                .ok()
                .filter(|&k| k < rank)
                .ok_or(StridedError::AxisOutOfRange { axis, rank })?;
            if dst.dims[k] > 1 {
                return Err(StridedError::NonSingletonReducedAxis {
                    axis: k,
                    len: dst.dims[k],
                });
            }
            reduced = reduced.saturating_mul(src.dims[k]);
            selected.push(k);
        }

        if dst.len.checked_mul(reduced) != Some(src.len) {
            return Err(StridedError::ShapeMismatch {
                src_len: src.len,
                dst_len: dst.len,
                reduced,
            });
        }
        Ok(selected)
    }

    fn run<T: Float>(
        &self,
        op: ReduceOp,
        src_values: &[T],
        src: &Side<'_>,
        dst_values: &mut [T],
        dst: &Side<'_>,
        axes: &[i128],
    ) -> Result<()> {
        let selected = self.check(src, dst, axes)?;

        if src.len == 0 {
            tracing::debug!(%op, rank = src.dims.len(), "empty source, nothing to reduce");
            return Ok(());
        }
        tracing::debug!(
            %op,
            rank = src.dims.len(),
            axes = ?selected,
            src_len = src.len,
            dst_len = dst.len,
            "reducing strided view"
        );

        let mut working = Vec::new();
        working.try_reserve_exact(src.len)?;
        working.extend_from_slice(src_values);
        let mut working_dims = Vec::new();
        working_dims.try_reserve_exact(src.dims.len())?;
        working_dims.extend_from_slice(src.dims);

        for &axis in &selected {
            let size = src.dims[axis];
            let stride = src.strides[axis];
            let bases = base_offsets(&working_dims, src.strides, axis)?;
            tracing::trace!(axis, lines = bases.len(), size, stride, "collapsing axis");
            reduce_lines(op, &mut working, &bases, size, stride)?;
            working_dims[axis] = 1;
        }

        let from = mapping_offsets(dst.dims, src.strides)?;
        let to = mapping_offsets(dst.dims, dst.strides)?;
        if from.iter().any(|&i| i >= working.len()) || to.iter().any(|&i| i >= dst_values.len())
        {
            return Err(StridedError::OffsetOverflow);
        }
        for (&i, &j) in from.iter().zip(to.iter()) {
            dst_values[j] = working[i];
        }
        Ok(())
    }
}

/// Reduce `src` along `axes` into `dst` using the default [`PackedLayout`] validator.
///
/// See [`Reducer::reduce_into`].
pub fn reduce_into<T: Float>(
    op: ReduceOp,
    src: &StridedView<'_, T>,
    dst: &mut StridedViewMut<'_, T>,
    axes: &[usize],
) -> Result<()> {
    Reducer::new().reduce_into(op, src, dst, axes)
}

/// Flat-buffer reduction using the default [`PackedLayout`] validator.
///
/// See [`RawReduceArgs`].
pub fn reduce_raw<T: Float>(args: RawReduceArgs<'_, T>) -> Result<()> {
    Reducer::new().reduce_raw(args)
}

/// Arguments of a flat-buffer reduction, as handed over by a binding layer.
///
/// Every buffer and descriptor is optional so that a missing one is reported
/// as [`StridedError::InvalidArguments`] rather than being unrepresentable.
/// Checks run in this order: operator tag, presence, rank agreement, layouts,
/// duplicate axes, axis range, singleton destination axes, element counts.
///
/// ```rust
/// use strided_reduce::{reduce_raw, RawReduceArgs, ReduceOp};
///
/// let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
/// let mut dst = [0.0; 3];
/// reduce_raw(
///     RawReduceArgs::new(ReduceOp::Product.tag())
///         .source(&src, &[2, 3], &[3, 1])
///         .destination(&mut dst, &[1, 3], &[3, 1])
///         .axes(&[0]),
/// )
/// .unwrap();
/// assert_eq!(dst, [4.0, 10.0, 18.0]);
/// ```
#[derive(Debug)]
pub struct RawReduceArgs<'a, T> {
    pub op: i32,
    pub src_values: Option<&'a [T]>,
    pub src_dims: Option<&'a [usize]>,
    pub src_strides: Option<&'a [isize]>,
    pub dst_values: Option<&'a mut [T]>,
    pub dst_dims: Option<&'a [usize]>,
    pub dst_strides: Option<&'a [isize]>,
    pub axes: Option<&'a [isize]>,
}

impl<'a, T> RawReduceArgs<'a, T> {
    /// Arguments with only the operator tag set.
    pub fn new(op: i32) -> Self {
        Self {
            op,
            src_values: None,
            src_dims: None,
            src_strides: None,
            dst_values: None,
            dst_dims: None,
            dst_strides: None,
            axes: None,
        }
    }

    pub fn source(mut self, values: &'a [T], dims: &'a [usize], strides: &'a [isize]) -> Self {
        self.src_values = Some(values);
        self.src_dims = Some(dims);
        self.src_strides = Some(strides);
        self
    }

    pub fn destination(
        mut self,
        values: &'a mut [T],
        dims: &'a [usize],
        strides: &'a [isize],
    ) -> Self {
        self.dst_values = Some(values);
        self.dst_dims = Some(dims);
        self.dst_strides = Some(strides);
        self
    }

    pub fn axes(mut self, axes: &'a [isize]) -> Self {
        self.axes = Some(axes);
        self
    }
}

impl<T: Float + Default> StridedArray<T> {
    /// Reduce along `axes` into a new row-major array.
    ///
    /// The result keeps the source rank; every selected axis has length 1.
    pub fn reduce(&self, op: ReduceOp, axes: &[usize]) -> Result<StridedArray<T>> {
        let mut dims = self.dims().to_vec();
        for &axis in axes {
            if let Some(d) = dims.get_mut(axis) {
                *d = 1;
            }
        }
        let total: usize = dims.iter().product();
        let strides = row_major_strides(&dims);
        let mut out = StridedArray::from_parts(vec![T::default(); total], &dims, &strides)?;
        reduce_into(op, &self.view(), &mut out.view_mut(), axes)?;
        Ok(out)
    }
}

fn check_rank(src: &Side<'_>, dst: &Side<'_>) -> Result<()> {
    let rank = src.dims.len();
    if src.strides.len() != rank || dst.dims.len() != rank || dst.strides.len() != rank {
        return Err(StridedError::InvalidArguments("dimension count mismatch"));
    }
    Ok(())
}

/// Widen selected axes so `usize` and `isize` selections are sorted and
/// compared without clamping.
fn wide_axes<A: Copy + Into<WideAxis>>(axes: &[A]) -> Vec<i128> {
    axes.iter().map(|&a| a.into().0).collect()
}

/// An axis index from either entry point, widened losslessly.
struct WideAxis(i128);

impl From<usize> for WideAxis {
    fn from(axis: usize) -> Self {
        WideAxis(axis as i128)
    }
}

impl From<isize> for WideAxis {
    fn from(axis: isize) -> Self {
        WideAxis(axis as i128)
    }
}
