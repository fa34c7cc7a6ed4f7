use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strided_reduce::{
    reduce_into, reduce_raw, row_major_strides, RawReduceArgs, ReduceOp, Reducer, StridedArray,
    StridedError, StridedView, StridedViewMut,
};

fn make_2x3() -> StridedArray<f64> {
    StridedArray::from_fn_row_major(&[2, 3], |idx| (idx[0] * 3 + idx[1] + 1) as f64)
}

/// Packed strides for `dims` where axis `perm[0]` is outermost in memory.
fn permuted_strides(dims: &[usize], perm: &[usize]) -> Vec<isize> {
    let storage_dims: Vec<usize> = perm.iter().map(|&p| dims[p]).collect();
    let storage = row_major_strides(&storage_dims);
    let mut strides = vec![0isize; dims.len()];
    for (i, &p) in perm.iter().enumerate() {
        strides[p] = storage[i];
    }
    strides
}

/// Random array of the given shape stored in a random axis order.
fn random_array(rng: &mut StdRng, dims: &[usize]) -> StridedArray<f64> {
    let mut perm: Vec<usize> = (0..dims.len()).collect();
    perm.shuffle(rng);
    let strides = permuted_strides(dims, &perm);
    let total: usize = dims.iter().product();
    let data: Vec<f64> = (0..total).map(|_| rng.gen_range(0.5..2.0)).collect();
    StridedArray::from_parts(data, dims, &strides).unwrap()
}

/// All coordinates of `dims` in row-major order.
fn coords(dims: &[usize]) -> Vec<Vec<usize>> {
    let total: usize = dims.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut idx = vec![0usize; dims.len()];
    for _ in 0..total {
        out.push(idx.clone());
        for d in (0..dims.len()).rev() {
            idx[d] += 1;
            if idx[d] < dims[d] {
                break;
            }
            idx[d] = 0;
        }
    }
    out
}

/// Direct reduction over all source coordinates that project onto `dst_idx`.
fn naive_reduce(op: ReduceOp, src: &StridedArray<f64>, axes: &[usize], dst_idx: &[usize]) -> f64 {
    let values: Vec<f64> = coords(src.dims())
        .into_iter()
        .filter(|c| {
            c.iter()
                .enumerate()
                .all(|(k, &x)| axes.contains(&k) || x == dst_idx[k])
        })
        .map(|c| src.get(&c))
        .collect();
    match op {
        ReduceOp::Sum => values.iter().sum(),
        ReduceOp::Product => values.iter().product(),
        ReduceOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ReduceOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        ReduceOp::Variance => {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
        }
    }
}

fn reduced_dims(dims: &[usize], axes: &[usize]) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .map(|(k, &d)| if axes.contains(&k) { 1 } else { d })
        .collect()
}

#[test]
fn test_axis_zero_sum_product_max_min() {
    let a = make_2x3();
    let expected = [
        (ReduceOp::Sum, [5.0, 7.0, 9.0]),
        (ReduceOp::Product, [4.0, 10.0, 18.0]),
        (ReduceOp::Max, [4.0, 5.0, 6.0]),
        (ReduceOp::Min, [1.0, 2.0, 3.0]),
    ];
    for (op, values) in expected {
        let mut out = StridedArray::<f64>::row_major(&[1, 3]);
        reduce_into(op, &a.view(), &mut out.view_mut(), &[0]).unwrap();
        for j in 0..3 {
            assert_relative_eq!(out.get(&[0, j]), values[j], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_population_variance_per_row() {
    let a = make_2x3();
    let mut out = StridedArray::<f64>::row_major(&[2, 1]);
    reduce_into(ReduceOp::Variance, &a.view(), &mut out.view_mut(), &[1]).unwrap();
    assert_relative_eq!(out.get(&[0, 0]), 0.6666666666666666, epsilon = 1e-12);
    assert_relative_eq!(out.get(&[1, 0]), 0.6666666666666666, epsilon = 1e-12);
}

#[test]
fn test_variance_over_two_axes_composes_per_axis() {
    // Columns (1,4), (2,5), (3,6) each have variance 2.25; the variance of
    // three equal values is 0.
    let a = make_2x3();
    let out = a.reduce(ReduceOp::Variance, &[0, 1]).unwrap();
    assert_relative_eq!(out.get(&[0, 0]), 0.0, epsilon = 1e-12);

    let cols = a.reduce(ReduceOp::Variance, &[0]).unwrap();
    for j in 0..3 {
        assert_relative_eq!(cols.get(&[0, j]), 2.25, epsilon = 1e-12);
    }
}

#[test]
fn test_sum_all_ones_both_axes() {
    let a = StridedArray::<f64>::from_fn_row_major(&[2, 3], |_| 1.0);
    let mut out = StridedArray::<f64>::row_major(&[1, 1]);
    reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &[1, 0]).unwrap();
    assert_eq!(out.data(), &[6.0]);
}

#[test]
fn test_zero_length_source_leaves_destination_unchanged() {
    let src: Vec<f64> = Vec::new();
    let src = StridedView::new(&src, &[4, 0, 2], &[0, 2, 1]).unwrap();
    let mut dst: Vec<f64> = vec![1.5, -2.5];
    let before: Vec<u64> = dst.iter().map(|x| x.to_bits()).collect();
    for op in ReduceOp::ALL {
        let mut dst_view = StridedViewMut::new(&mut dst, &[1, 1, 2], &[2, 2, 1]).unwrap();
        reduce_into(op, &src, &mut dst_view, &[0, 1]).unwrap();
    }
    let after: Vec<u64> = dst.iter().map(|x| x.to_bits()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_rejections_happen_before_any_write() {
    let a = make_2x3();
    let sentinel = [-7.0, -8.0, -9.0];

    let cases: [(&[usize], &[usize]); 4] = [
        (&[0, 0], &[1, 3]), // duplicate axis
        (&[3], &[1, 3]),    // out of range
        (&[1], &[1, 3]),    // destination keeps the reduced axis
        (&[], &[1, 3]),     // element counts disagree
    ];
    for (axes, dst_dims) in cases {
        let mut dst = sentinel.to_vec();
        let mut dst_view = StridedViewMut::new(&mut dst, dst_dims, &[3, 1]).unwrap();
        assert!(reduce_into(ReduceOp::Sum, &a.view(), &mut dst_view, axes).is_err());
        assert_eq!(dst, sentinel);
    }
}

#[test]
fn test_empty_destination_axis_is_accepted() {
    let src: Vec<f64> = Vec::new();
    let src = StridedView::new(&src, &[0, 3], &[3, 1]).unwrap();
    let mut dst: Vec<f64> = Vec::new();
    let mut dst_view = StridedViewMut::new(&mut dst, &[0, 3], &[3, 1]).unwrap();
    for op in ReduceOp::ALL {
        reduce_into(op, &src, &mut dst_view, &[0]).unwrap();
    }
    assert!(dst.is_empty());
}

#[test]
fn test_huge_axes_are_out_of_range_not_duplicates() {
    let a = make_2x3();
    let mut out = StridedArray::<f64>::row_major(&[1, 1]);
    let sentinel = out.data().to_vec();

    let err = reduce_into(
        ReduceOp::Sum,
        &a.view(),
        &mut out.view_mut(),
        &[usize::MAX, usize::MAX - 1],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        StridedError::AxisOutOfRange { axis, rank: 2 } if axis == (usize::MAX - 1) as i128
    ));
    assert_eq!(out.data(), sentinel.as_slice());

    let mut dst = [0.0f64];
    let err = reduce_raw(
        RawReduceArgs::new(ReduceOp::Sum.tag())
            .source(a.data(), &[2, 3], &[3, 1])
            .destination(&mut dst, &[1, 1], &[1, 1])
            .axes(&[isize::MAX, isize::MIN]),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        StridedError::AxisOutOfRange { axis, rank: 2 } if axis == isize::MIN as i128
    ));
}

#[test]
fn test_error_classification() {
    let a = make_2x3();
    let mut out = StridedArray::<f64>::row_major(&[1, 3]);

    let err = reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &[1, 1]).unwrap_err();
    assert!(matches!(err, StridedError::DuplicateAxis { axis: 1 }));

    let err = reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &[5]).unwrap_err();
    assert!(matches!(err, StridedError::AxisOutOfRange { axis: 5, rank: 2 }));

    let err = reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &[1]).unwrap_err();
    assert!(matches!(
        err,
        StridedError::NonSingletonReducedAxis { axis: 1, len: 3 }
    ));

    let err = reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &[]).unwrap_err();
    assert!(matches!(err, StridedError::ShapeMismatch { .. }));
}

#[test]
fn test_shape_count_invariant_random() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let rank = rng.gen_range(1..=4);
        let dims: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=4)).collect();
        let a = random_array(&mut rng, &dims);
        let axes: Vec<usize> = (0..rank).filter(|_| rng.gen_bool(0.5)).collect();

        // A destination with one element too many or too few must be rejected.
        let good = reduced_dims(&dims, &axes);
        let mut bad = good.clone();
        let grow = (0..rank).find(|k| !axes.contains(k));
        match grow {
            Some(k) => bad[k] += 1,
            None => continue,
        }
        let mut out = StridedArray::<f64>::row_major(&bad);
        let err = reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &axes).unwrap_err();
        assert!(matches!(err, StridedError::ShapeMismatch { .. }));

        let mut out = StridedArray::<f64>::row_major(&good);
        reduce_into(ReduceOp::Sum, &a.view(), &mut out.view_mut(), &axes).unwrap();
    }
}

#[test]
fn test_matches_naive_reduction_on_permuted_layouts() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..40 {
        let rank = rng.gen_range(1..=4);
        let dims: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=4)).collect();
        let a = random_array(&mut rng, &dims);
        let mut axes: Vec<usize> = (0..rank).filter(|_| rng.gen_bool(0.5)).collect();
        axes.shuffle(&mut rng);
        let out_dims = reduced_dims(&dims, &axes);

        for op in [ReduceOp::Sum, ReduceOp::Product, ReduceOp::Max, ReduceOp::Min] {
            let mut out = StridedArray::<f64>::row_major(&out_dims);
            reduce_into(op, &a.view(), &mut out.view_mut(), &axes).unwrap();
            for c in coords(&out_dims) {
                let expected = naive_reduce(op, &a, &axes, &c);
                assert_relative_eq!(out.get(&c), expected, epsilon = 1e-10, max_relative = 1e-10);
            }
        }

        // Variance over a single axis equals the textbook population variance.
        if let Some(&axis) = axes.first() {
            let single = reduced_dims(&dims, &[axis]);
            let mut out = StridedArray::<f64>::row_major(&single);
            reduce_into(ReduceOp::Variance, &a.view(), &mut out.view_mut(), &[axis]).unwrap();
            for c in coords(&single) {
                let expected = naive_reduce(ReduceOp::Variance, &a, &[axis], &c);
                assert_relative_eq!(out.get(&c), expected, epsilon = 1e-10, max_relative = 1e-10);
            }
        }
    }
}

#[test]
fn test_restrided_destination_matches_contiguous_then_copy() {
    let mut rng = StdRng::seed_from_u64(1234);
    for _ in 0..30 {
        let rank = rng.gen_range(2..=4);
        let dims: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=5)).collect();
        let a = random_array(&mut rng, &dims);
        let axes: Vec<usize> = (0..rank).filter(|_| rng.gen_bool(0.4)).collect();
        let out_dims = reduced_dims(&dims, &axes);

        let mut contiguous = StridedArray::<f64>::row_major(&out_dims);
        reduce_into(ReduceOp::Sum, &a.view(), &mut contiguous.view_mut(), &axes).unwrap();

        let mut perm: Vec<usize> = (0..rank).collect();
        perm.shuffle(&mut rng);
        let strides = permuted_strides(&out_dims, &perm);
        let total: usize = out_dims.iter().product();
        let mut restrided = StridedArray::from_parts(vec![0.0; total], &out_dims, &strides).unwrap();
        reduce_into(ReduceOp::Sum, &a.view(), &mut restrided.view_mut(), &axes).unwrap();

        for c in coords(&out_dims) {
            assert_eq!(restrided.get(&c), contiguous.get(&c));
        }
    }
}

#[test]
fn test_transposed_destination_view() {
    // Reduce the middle axis of a [2, 3, 4] array into a destination that is a
    // permuted view over a [4, 1, 2] row-major buffer.
    let a = StridedArray::<f64>::from_fn_row_major(&[2, 3, 4], |idx| {
        (idx[0] * 100 + idx[1] * 10 + idx[2]) as f64
    });
    let mut buffer = vec![0.0; 8];
    {
        let storage = StridedViewMut::new(&mut buffer, &[4, 1, 2], &[2, 2, 1]).unwrap();
        let mut dst = storage.permute(&[2, 1, 0]).unwrap();
        assert_eq!(dst.dims(), &[2, 1, 4]);
        reduce_into(ReduceOp::Sum, &a.view(), &mut dst, &[1]).unwrap();
    }
    for i in 0..2 {
        for k in 0..4 {
            let expected: f64 = (0..3).map(|j| (i * 100 + j * 10 + k) as f64).sum();
            assert_relative_eq!(buffer[k * 2 + i], expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_validation_is_repeatable() {
    let a = make_2x3();
    let reducer = Reducer::new();
    let out = StridedArray::<f64>::row_major(&[2, 3]);
    let first = reducer.validate(&a.view(), &out.view(), &[0, 0]).unwrap_err();
    let second = reducer.validate(&a.view(), &out.view(), &[0, 0]).unwrap_err();
    assert!(matches!(first, StridedError::DuplicateAxis { axis: 0 }));
    assert!(matches!(second, StridedError::DuplicateAxis { axis: 0 }));
}

#[test]
fn test_raw_entry_point_with_symbolic_operator() {
    let op: ReduceOp = "var".parse().unwrap();
    let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    // Column-major [2, 1] destination; identical to row-major for this shape.
    let mut dst = [0.0f32; 2];
    reduce_raw(
        RawReduceArgs::new(op.tag())
            .source(&src, &[2, 3], &[3, 1])
            .destination(&mut dst, &[2, 1], &[1, 2])
            .axes(&[1]),
    )
    .unwrap();
    assert_relative_eq!(dst[0], 2.0 / 3.0, epsilon = 1e-6);
    assert_relative_eq!(dst[1], 2.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_raw_check_order() {
    let src = [1.0f64, 2.0, 3.0, 4.0];
    let mut dst = [0.0f64; 2];

    // Unknown operator wins over everything else.
    let err = reduce_raw(RawReduceArgs::new(17).source(&src, &[2, 2], &[2, 1])).unwrap_err();
    assert!(matches!(err, StridedError::UnknownOperator(_)));

    // Layout problems are reported before axis problems.
    let err = reduce_raw(
        RawReduceArgs::new(0)
            .source(&src, &[2, 2], &[3, 1])
            .destination(&mut dst, &[1, 2], &[2, 1])
            .axes(&[0, 0]),
    )
    .unwrap_err();
    assert!(matches!(err, StridedError::InvalidLayout { .. }));
    assert_eq!(dst, [0.0, 0.0]);
}
