//! # Spatial Shape Utilities
//!
//! Resolution arithmetic for the conv / pool stacks of the model zoo.

use bimm_contracts::unpack_shape_contract;

/// Get the output resolution for a given input resolution.
///
/// The input must be a multiple of the stride.
///
/// # Arguments
///
/// - `input_resolution`: ``[height_in=height_out*stride, width_in=width_out*stride]``.
///
/// # Returns
///
/// ``[height_out, width_out]``
///
/// # Panics
///
/// If the input resolution is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    unpack_shape_contract!(
        [
            "height_in" = "height_out" * "stride",
            "width_in" = "width_out" * "stride"
        ],
        &input_resolution,
        &["height_out", "width_out"],
        &[("stride", stride)]
    )
}

/// Predict the output size of a 1D sliding window (conv or pool).
///
/// ```text
/// out_size = floor((in_size + 2*padding - kernel_size) / stride) + 1
/// ```
///
/// # Returns
///
/// `None` if the window does not fit in the (padded) input.
pub fn maybe_window_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);

    let effective_size = input_size + 2 * padding;
    if effective_size < kernel_size {
        return None;
    }
    Some((effective_size - kernel_size) / stride + 1)
}

/// Predict the output resolution of a square 2D window (conv or pool).
///
/// # Panics
///
/// If the window does not fit in the (padded) input.
pub fn expect_window_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> [usize; 2] {
    input_resolution.map(|size| {
        match maybe_window_output_size(size, kernel_size, stride, padding) {
            Some(x) => x,
            None => panic!(
                "No legal output size for window with:\n input_resolution:{input_resolution:?}\n kernel_size:{kernel_size}\n stride:{stride}\n padding:{padding}",
            ),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_div() {
        assert_eq!(stride_div_output_resolution([56, 56], 1), [56, 56]);
        assert_eq!(stride_div_output_resolution([56, 28], 2), [28, 14]);
    }

    #[test]
    #[should_panic(expected = "7 !~ height_in=(height_out*stride)")]
    fn test_stride_div_panic() {
        stride_div_output_resolution([7, 8], 2);
    }

    #[test]
    fn test_window_output_size() {
        fn reference(
            input_size: usize,
            kernel_size: usize,
            stride: usize,
            padding: usize,
        ) -> Option<usize> {
            let x = ((input_size as f64 + 2.0 * padding as f64 - kernel_size as f64)
                / stride as f64)
                .floor()
                + 1.0;
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_size in 1..12 {
            for kernel_size in 1..8 {
                for stride in 1..3 {
                    for padding in 0..3 {
                        assert_eq!(
                            maybe_window_output_size(input_size, kernel_size, stride, padding),
                            reference(input_size, kernel_size, stride, padding),
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_imagenet_stem_resolution() {
        // 3x3/2 conv, then 3x3/2 max pool.
        let x = expect_window_output_resolution([224, 224], 3, 2, 1);
        assert_eq!(x, [112, 112]);
        assert_eq!(expect_window_output_resolution(x, 3, 2, 1), [56, 56]);
    }

    #[test]
    #[should_panic(expected = "No legal output size")]
    fn test_window_too_small() {
        expect_window_output_resolution([2, 2], 7, 7, 0);
    }
}
