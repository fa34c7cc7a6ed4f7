//! Reduction operators and the per-axis line reducer.

use std::fmt;
use std::str::FromStr;

use num_traits::{Float, NumCast};

use crate::enumerate::Line;
use crate::{Result, StridedError};

/// The closed set of reductions the kernel can apply along an axis.
///
/// Integral tags are `Sum = 0`, `Product = 1`, `Max = 2`, `Min = 3`,
/// `Variance = 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ReduceOp {
    Sum,
    Product,
    Max,
    Min,
    /// Population variance (divisor is the line length).
    Variance,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 5] = [
        ReduceOp::Sum,
        ReduceOp::Product,
        ReduceOp::Max,
        ReduceOp::Min,
        ReduceOp::Variance,
    ];

    /// Integral tag for this operator.
    pub fn tag(self) -> i32 {
        match self {
            ReduceOp::Sum => 0,
            ReduceOp::Product => 1,
            ReduceOp::Max => 2,
            ReduceOp::Min => 3,
            ReduceOp::Variance => 4,
        }
    }

    /// Canonical short name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Product => "prod",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::Variance => "var",
        }
    }
}

impl TryFrom<i32> for ReduceOp {
    type Error = StridedError;

    fn try_from(tag: i32) -> Result<Self> {
        ReduceOp::ALL
            .into_iter()
            .find(|op| op.tag() == tag)
            .ok_or_else(|| StridedError::UnknownOperator(tag.to_string()))
    }
}

impl FromStr for ReduceOp {
    type Err = StridedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(ReduceOp::Sum),
            "prod" | "product" => Ok(ReduceOp::Product),
            "max" => Ok(ReduceOp::Max),
            "min" => Ok(ReduceOp::Min),
            "var" | "variance" => Ok(ReduceOp::Variance),
            _ => Err(StridedError::UnknownOperator(s.to_string())),
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduce every line along one axis in place.
///
/// Each entry of `bases` starts a line of `size` elements spaced by `stride`
/// inside `buffer`; the reduced value is written to the line's first element.
/// Lines are processed in the order given and each line is accumulated front
/// to back, so results are reproducible bit for bit.
///
/// Only the first element of each line is meaningful afterwards. In particular
/// [`ReduceOp::Variance`] overwrites every element of the line with its squared
/// deviation from the line mean.
pub fn reduce_lines<T: Float>(
    op: ReduceOp,
    buffer: &mut [T],
    bases: &[usize],
    size: usize,
    stride: isize,
) -> Result<()> {
    for &base in bases {
        let line = Line::new(base, size, stride, buffer.len())?;
        if line.is_empty() {
            continue;
        }
        match op {
            ReduceOp::Sum => fold_line(buffer, &line, |acc, v| acc + v),
            ReduceOp::Product => fold_line(buffer, &line, |acc, v| acc * v),
            ReduceOp::Max => fold_line(buffer, &line, nan_max),
            ReduceOp::Min => fold_line(buffer, &line, nan_min),
            ReduceOp::Variance => variance_line(buffer, &line)?,
        }
    }
    Ok(())
}

/// Fold the tail of `line` into its first element.
#[inline]
fn fold_line<T: Copy>(buffer: &mut [T], line: &Line, f: impl Fn(T, T) -> T) {
    let base = line.base();
    let mut acc = buffer[base];
    for offset in line.offsets().skip(1) {
        acc = f(acc, buffer[offset]);
    }
    buffer[base] = acc;
}

#[inline]
fn nan_max<T: Float>(acc: T, v: T) -> T {
    if acc.is_nan() || v.is_nan() {
        T::nan()
    } else {
        acc.max(v)
    }
}

#[inline]
fn nan_min<T: Float>(acc: T, v: T) -> T {
    if acc.is_nan() || v.is_nan() {
        T::nan()
    } else {
        acc.min(v)
    }
}

/// Two-pass population variance; leaves squared deviations along the line.
fn variance_line<T: Float>(buffer: &mut [T], line: &Line) -> Result<()> {
    let n = <T as NumCast>::from(line.len()).ok_or(StridedError::ScalarConversion)?;

    let mut mean = T::zero();
    for offset in line.offsets() {
        mean = mean + buffer[offset];
    }
    mean = mean / n;

    for offset in line.offsets() {
        let diff = buffer[offset] - mean;
        buffer[offset] = diff * diff;
    }

    fold_line(buffer, line, |acc, v| acc + v);
    let base = line.base();
    buffer[base] = buffer[base] / n;
    Ok(())
}
