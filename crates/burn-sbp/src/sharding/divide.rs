use alloc::vec::Vec;
use core::ops::Range;

use itertools::Itertools;

use super::{DistributedType, Placement, Sbp};
use crate::ir::{Dimension, Shape, TensorType};

/// Whether `size` splits evenly into `divisor` non-empty parts.
pub fn is_divisible(size: usize, divisor: usize) -> bool {
    divisor > 0 && size >= divisor && size % divisor == 0
}

/// Checks that `nd_sbp` is physically realizable for `tensor_type` on `placement`.
///
/// Returns the per-device (local shard) tensor type on success. Dynamic shapes are never
/// distributable. Every split divides its axis by the shard factor of its mesh dimension, and
/// splitting the same axis on several mesh dimensions divides it repeatedly; the first split
/// that does not divide evenly rejects the whole policy.
pub fn is_distributable(
    tensor_type: &TensorType,
    nd_sbp: &[Sbp],
    placement: &Placement,
) -> Option<TensorType> {
    let mut dims = tensor_type.shape.fixed_dims()?;
    if nd_sbp.len() != placement.rank() {
        return None;
    }

    for (sbp, &factor) in nd_sbp.iter().zip(placement.hierarchy()) {
        if let Sbp::Split { axis } = *sbp {
            let size = dims.get_mut(axis)?;
            if !is_divisible(*size, factor) {
                return None;
            }
            *size /= factor;
        }
    }

    Some(TensorType::new(tensor_type.dtype, Shape::fixed(dims)))
}

/// The per-device tensor type of a distribution already known to be realizable.
///
/// Unlike [`is_distributable`], nothing is validated: splits of dynamic or out-of-range axes
/// are ignored.
pub fn divided_tensor_type(distributed: &DistributedType) -> TensorType {
    let mut dims: Vec<Dimension> = distributed.tensor_type().shape.dims().to_vec();
    for (sbp, &factor) in distributed
        .nd_sbp()
        .iter()
        .zip(distributed.placement().hierarchy())
    {
        if let Sbp::Split { axis } = *sbp {
            if let Some(Dimension::Fixed(size)) = dims.get_mut(axis) {
                *size /= factor;
            }
        }
    }

    TensorType::new(distributed.tensor_type().dtype, Shape::new(dims))
}

/// Index of the outermost axis of the contiguous run of a slice.
///
/// Every axis after the returned index is fully covered by `slices`, so the elements of the
/// slice from that axis inwards are laid out contiguously in a row-major buffer of shape
/// `dims`.
pub fn contiguous_start(dims: &[usize], slices: &[Range<usize>]) -> usize {
    debug_assert_eq!(dims.len(), slices.len());

    (0..slices.len())
        .rev()
        .find(|&axis| slices[axis].start != 0 || slices[axis].end != dims[axis])
        .unwrap_or(0)
}

/// Whether `slices` select a single contiguous region of a row-major buffer of shape `dims`.
pub fn is_contiguous_slice(dims: &[usize], slices: &[Range<usize>]) -> bool {
    let start = contiguous_start(dims, slices);
    slices[..start].iter().all(|range| range.len() == 1)
}

/// Scores how well the local shards of `distributed` map onto DMA bursts.
///
/// Every shard is a slice of the logical tensor; each one is scored by the length of its
/// longest contiguous run of bytes, split into whole bursts plus a remainder. A run of
/// `whole` bursts and `rem` extra bytes needs `whole + (rem > 0)` transfers and fills
/// `whole + rem / burst_length` of them, the ratio being the score. The result is the average
/// over all shards, in `(0, 1]`: `1.0` means every run is burst aligned.
///
/// This is a ranking heuristic only; it is never used to decide correctness.
pub fn divided_tensor_efficiency(distributed: &DistributedType, burst_length: usize) -> f64 {
    let burst_length = burst_length.max(1);
    let (Some(shape), Some(tile)) = (
        distributed.tensor_type().shape.fixed_dims(),
        divided_tensor_type(distributed).shape.fixed_dims(),
    ) else {
        return 1.0;
    };
    let element_size = distributed.tensor_type().dtype.size_in_bytes();

    let ranges: Vec<Vec<Range<usize>>> = shape
        .iter()
        .zip(&tile)
        .map(|(&extent, &tile)| {
            (0..extent)
                .step_by(tile.max(1))
                .map(|start| start..usize::min(start + tile, extent))
                .collect()
        })
        .collect();

    let mut count = 0usize;
    let mut total = 0.0f64;
    for slices in ranges.into_iter().multi_cartesian_product() {
        let start = contiguous_start(&shape, &slices);
        let run: usize = slices[start..].iter().map(Range::len).product();
        let bytes = run * element_size;
        let (whole, rem) = (bytes / burst_length, bytes % burst_length);
        let transfers = whole + usize::from(rem != 0);

        total += (whole as f64 + rem as f64 / burst_length as f64) / transfers.max(1) as f64;
        count += 1;
    }

    if count == 0 {
        return 1.0;
    }
    total / count as f64
}
