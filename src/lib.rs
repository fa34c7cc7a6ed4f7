//! Axis reductions over arbitrarily strided multidimensional array views.
//!
//! This crate reduces selected axes of an N-dimensional array whose layout is
//! described by a caller-supplied stride vector, and scatters the reduced values
//! into a destination with its own, independent shape and strides.
//!
//! # Core Types
//!
//! - [`StridedView`] / [`StridedViewMut`]: Bounds-checked strided views over existing data
//! - [`StridedArray`]: Owned strided multidimensional array
//! - [`ReduceOp`]: The closed set of reduction operators (sum, product, max, min, variance)
//! - [`LayoutValidator`] / [`PackedLayout`]: Coherence check for `(dims, strides, len)` triples
//!
//! # Primary API
//!
//! - [`reduce_into`]: Reduce a source view into a destination view
//! - [`Reducer`]: The same driver with a configurable layout validator
//! - [`reduce_raw`] / [`RawReduceArgs`]: Flat-buffer entry point for binding layers
//! - [`StridedArray::reduce`]: Allocate a row-major destination and reduce into it
//!
//! # Building Blocks
//!
//! - [`mapping_offsets`]: Enumerate the linear offset of every coordinate (last axis fastest)
//! - [`base_offsets`]: The same enumeration with one axis removed
//! - [`reduce_lines`]: Apply one operator along every line of one axis, in place
//!
//! # Example
//!
//! ```rust
//! use strided_reduce::{reduce_into, ReduceOp, StridedView, StridedViewMut};
//!
//! // [[1, 2, 3], [4, 5, 6]] in row-major order
//! let src_data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let src = StridedView::new(&src_data, &[2, 3], &[3, 1]).unwrap();
//!
//! // Column sums land in a [1, 3] destination.
//! let mut dst_data = vec![0.0; 3];
//! let mut dst = StridedViewMut::new(&mut dst_data, &[1, 3], &[3, 1]).unwrap();
//!
//! reduce_into(ReduceOp::Sum, &src, &mut dst, &[0]).unwrap();
//! assert_eq!(dst_data, vec![5.0, 7.0, 9.0]);
//! ```
//!
//! # Transposed Destination Example
//!
//! ```rust
//! use strided_reduce::{reduce_into, ReduceOp, StridedView, StridedViewMut};
//!
//! let src_data: Vec<f64> = (0..24).map(|x| x as f64).collect();
//! let src = StridedView::new(&src_data, &[2, 3, 4], &[12, 4, 1]).unwrap();
//!
//! // Reduce the middle axis into a [2, 1, 4] destination stored column-major.
//! let mut dst_data = vec![0.0; 8];
//! let mut dst = StridedViewMut::new(&mut dst_data, &[2, 1, 4], &[1, 2, 2]).unwrap();
//! reduce_into(ReduceOp::Max, &src, &mut dst, &[1]).unwrap();
//!
//! assert_eq!(dst.get(&[0, 0, 0]), 8.0);
//! assert_eq!(dst.get(&[1, 0, 3]), 23.0);
//! ```

mod enumerate;
mod layout;
mod op;
mod reduce;
pub mod view;

// ============================================================================
// Coordinate enumeration
// ============================================================================
pub use enumerate::{base_offsets, mapping_offsets, Line};

// ============================================================================
// Layout validation
// ============================================================================
pub use layout::{LayoutValidator, PackedLayout};

// ============================================================================
// Reduction operators
// ============================================================================
pub use op::{reduce_lines, ReduceOp};

// ============================================================================
// Reduction driver
// ============================================================================
pub use reduce::{reduce_into, reduce_raw, RawReduceArgs, Reducer};

// ============================================================================
// View types and utilities
// ============================================================================
pub use view::{col_major_strides, row_major_strides, StridedArray, StridedView, StridedViewMut};

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur during strided reductions.
#[derive(Debug, thiserror::Error)]
pub enum StridedError {
    /// The operator tag does not name one of the supported reductions.
    #[error("unknown reduction operator: {0}")]
    UnknownOperator(String),

    /// A required buffer or descriptor is missing, or ranks disagree.
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),

    /// A `(dims, strides, len)` triple is not internally consistent.
    #[error("invalid layout: dims={dims:?} strides={strides:?} len={len}")]
    InvalidLayout {
        dims: Vec<usize>,
        strides: Vec<isize>,
        len: usize,
    },

    /// The same axis was selected more than once.
    #[error("duplicate selected axis {axis}")]
    DuplicateAxis { axis: i128 },

    /// A selected axis does not exist for the given rank.
    #[error("selected axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: i128, rank: usize },

    /// The destination keeps a reduced axis with more than one element.
    #[error("destination axis {axis} has length {len}, expected 0 or 1")]
    NonSingletonReducedAxis { axis: usize, len: usize },

    /// Destination length times the reduced extent does not equal the source length.
    #[error("shape mismatch: {dst_len} destination elements x {reduced} reduced != {src_len} source elements")]
    ShapeMismatch {
        src_len: usize,
        dst_len: usize,
        reduced: usize,
    },

    /// Scratch memory for the working buffer could not be obtained.
    #[error("failed to allocate scratch memory")]
    AllocationFailure(#[from] std::collections::TryReserveError),

    /// Integer overflow (or a negative result) while computing an offset.
    #[error("offset overflow while computing index")]
    OffsetOverflow,

    /// Failed to convert a line length into the element type.
    #[error("failed to convert scalar for averaging")]
    ScalarConversion,
}

/// Result type for strided reductions.
pub type Result<T> = std::result::Result<T, StridedError>;
