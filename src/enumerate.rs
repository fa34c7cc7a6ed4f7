//! Coordinate enumeration over strided layouts.
//!
//! Every linear offset the reduction kernel touches is produced here: either
//! as a full enumeration of a shape ([`mapping_offsets`]), an enumeration with
//! one axis held at zero ([`base_offsets`]), or as the positions along one
//! [`Line`].
//!
//! Enumeration order is row-major: the last axis varies fastest. Two calls with
//! the same `dims` therefore produce index-aligned sequences regardless of the
//! strides passed, which is what makes a scatter between two layouts of the
//! same logical shape a simple zip.

use crate::{Result, StridedError};

/// Offset of every coordinate in the Cartesian product of `dims`.
///
/// The result has `dims.iter().product()` entries. A zero-length axis yields an
/// empty sequence, and `dims == []` yields the single offset `0`.
///
/// The sequence is built by doubling blocks from the innermost axis outward:
/// after processing axis `k`, the buffer holds the offsets of the sub-array
/// spanned by axes `k..`, and each further repetition along axis `k - 1` is
/// the previous block shifted by that axis' stride.
pub fn mapping_offsets(dims: &[usize], strides: &[isize]) -> Result<Vec<usize>> {
    if dims.len() != strides.len() {
        return Err(StridedError::InvalidArguments(
            "dims and strides length mismatch",
        ));
    }
    let total = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(StridedError::OffsetOverflow)?;
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut offsets = Vec::new();
    offsets.try_reserve_exact(total)?;
    offsets.push(0usize);

    for (&size, &stride) in dims.iter().zip(strides.iter()).rev() {
        let block = offsets.len();
        for rep in 1..size {
            let start = (rep - 1) * block;
            for i in start..start + block {
                let next = offsets[i]
                    .checked_add_signed(stride)
                    .ok_or(StridedError::OffsetOverflow)?;
                offsets.push(next);
            }
        }
    }

    debug_assert_eq!(offsets.len(), total);
    Ok(offsets)
}

/// Offsets of the first element of every line along `axis`.
///
/// Equivalent to [`mapping_offsets`] over `dims`/`strides` with the entry at
/// `axis` removed; the remaining axes keep their relative order.
pub fn base_offsets(dims: &[usize], strides: &[isize], axis: usize) -> Result<Vec<usize>> {
    let rank = dims.len();
    if axis >= rank {
        return Err(StridedError::AxisOutOfRange {
            axis: axis as i128,
            rank,
        });
    }
    if strides.len() != rank {
        return Err(StridedError::InvalidArguments(
            "dims and strides length mismatch",
        ));
    }

    let mut other_dims = Vec::new();
    let mut other_strides = Vec::new();
    other_dims.try_reserve_exact(rank - 1)?;
    other_strides.try_reserve_exact(rank - 1)?;
    for k in (0..rank).filter(|&k| k != axis) {
        other_dims.push(dims[k]);
        other_strides.push(strides[k]);
    }

    mapping_offsets(&other_dims, &other_strides)
}

/// One-dimensional run of `len` elements starting at `base`, spaced by `stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    base: usize,
    len: usize,
    stride: isize,
}

impl Line {
    /// Describe a line inside a buffer of `buffer_len` elements.
    ///
    /// Fails with [`StridedError::OffsetOverflow`] unless both endpoints lie
    /// within the buffer, which makes every position in between valid too.
    pub fn new(base: usize, len: usize, stride: isize, buffer_len: usize) -> Result<Self> {
        if len > 0 {
            let last = isize::try_from(len - 1)
                .ok()
                .and_then(|n| n.checked_mul(stride))
                .and_then(|span| base.checked_add_signed(span))
                .ok_or(StridedError::OffsetOverflow)?;
            if base >= buffer_len || last >= buffer_len {
                return Err(StridedError::OffsetOverflow);
            }
        }
        Ok(Self { base, len, stride })
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn stride(&self) -> isize {
        self.stride
    }

    /// Positions along the line, starting with [`Line::base`].
    pub fn offsets(&self) -> impl Iterator<Item = usize> {
        let Line { base, len, stride } = *self;
        (0..len).map(move |j| (base as isize + j as isize * stride) as usize)
    }
}
