//! Layout coherence checks for `(dims, strides, len)` triples.
//!
//! The reduction driver asks a [`LayoutValidator`] whether each view's layout
//! is acceptable before touching any data. [`PackedLayout`] is the default:
//! it accepts any non-negative stride assignment whose farthest reachable
//! element is exactly the last element of the buffer.

use crate::{Result, StridedError};

/// Decides whether a shape/stride pair is coherent with a buffer length.
pub trait LayoutValidator {
    /// Return `Ok(())` when `dims`/`strides` describe a usable layout over a
    /// buffer of `len` elements, or [`StridedError::InvalidLayout`] otherwise.
    fn check(&self, dims: &[usize], strides: &[isize], len: usize) -> Result<()>;
}

impl<V: LayoutValidator + ?Sized> LayoutValidator for &V {
    fn check(&self, dims: &[usize], strides: &[isize], len: usize) -> Result<()> {
        (**self).check(dims, strides, len)
    }
}

/// Non-negative strides that span the buffer exactly.
///
/// Requires `sum((dims[k] - 1) * strides[k]) == len - 1`. Row-major and
/// column-major packings pass, as do any permutation of them and layouts
/// whose singleton axes carry arbitrary strides. Zero-length arrays pass when
/// the sum comes out to `-1`, which is what packed strides produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedLayout;

impl LayoutValidator for PackedLayout {
    fn check(&self, dims: &[usize], strides: &[isize], len: usize) -> Result<()> {
        let invalid = || StridedError::InvalidLayout {
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            len,
        };
        if dims.len() != strides.len() {
            return Err(invalid());
        }

        let mut acc = 0isize;
        for (&dim, &stride) in dims.iter().zip(strides.iter()) {
            if stride < 0 {
                return Err(invalid());
            }
            let span = isize::try_from(dim)
                .ok()
                .and_then(|d| (d - 1).checked_mul(stride))
                .ok_or_else(invalid)?;
            acc = acc.checked_add(span).ok_or_else(invalid)?;
        }

        let last = isize::try_from(len).map_err(|_| invalid())? - 1;
        if acc != last {
            return Err(invalid());
        }
        Ok(())
    }
}
