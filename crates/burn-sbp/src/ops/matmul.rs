use alloc::format;
use alloc::vec::Vec;

use derive_new::new;

use super::{InferType, broadcast_shapes, invalid, same_placement};
use crate::ShardingError;
use crate::ir::{Dimension, IrType, Shape, TensorType};
use crate::sharding::{DistributedType, Sbp, is_distributable};

/// Batched matrix multiplication.
///
/// The two innermost axes of each operand are the matrix axes, the others are batch axes and
/// broadcast against each other.
#[derive(new, Clone, Debug, Default, PartialEq, Eq)]
pub struct MatMul {
    /// The left operand is stored as `[.., K, M]`.
    pub transpose_a: bool,
    /// The right operand is stored as `[.., N, K]`.
    pub transpose_b: bool,
    /// Sum the partial products across devices right away.
    pub fused_reduce: bool,
}

/// Axis roles of one operand.
struct Axes {
    rank: usize,
    /// Row axis of the left operand, column axis of the right one.
    outer: usize,
    contraction: usize,
}

impl Axes {
    fn new(rank: usize, contraction_last: bool) -> Self {
        let (outer, contraction) = if contraction_last {
            (rank - 2, rank - 1)
        } else {
            (rank - 1, rank - 2)
        };
        Self {
            rank,
            outer,
            contraction,
        }
    }

    fn is_batch(&self, axis: usize) -> bool {
        axis < self.rank - 2
    }
}

impl MatMul {
    fn lhs_axes(&self, rank: usize) -> Axes {
        Axes::new(rank, !self.transpose_a)
    }

    fn rhs_axes(&self, rank: usize) -> Axes {
        Axes::new(rank, self.transpose_b)
    }

    fn output_tensor(&self, lhs: &TensorType, rhs: &TensorType) -> Result<TensorType, IrType> {
        if lhs.dtype != rhs.dtype {
            return Err(invalid(
                self.name(),
                format!("element types differ ({} vs {})", lhs.dtype, rhs.dtype),
            ));
        }
        let (lhs_rank, rhs_rank) = (lhs.shape.rank(), rhs.shape.rank());
        if lhs_rank < 2 || rhs_rank < 2 {
            return Err(invalid(
                self.name(),
                format!("operands must have rank >= 2, got {lhs_rank} and {rhs_rank}"),
            ));
        }

        let (l, r) = (self.lhs_axes(lhs_rank), self.rhs_axes(rhs_rank));
        let (lhs_k, rhs_k) = (lhs.shape[l.contraction], rhs.shape[r.contraction]);
        if let (Dimension::Fixed(a), Dimension::Fixed(b)) = (lhs_k, rhs_k) {
            if a != b {
                return Err(invalid(
                    self.name(),
                    format!("contraction extents differ ({a} vs {b})"),
                ));
            }
        }

        let lhs_batch = Shape::new(&lhs.shape.dims()[..lhs_rank - 2]);
        let rhs_batch = Shape::new(&rhs.shape.dims()[..rhs_rank - 2]);
        let batch = broadcast_shapes(&lhs_batch, &rhs_batch)
            .map_err(|reason| invalid(self.name(), reason))?;

        let mut dims = batch.dims().to_vec();
        dims.push(lhs.shape[l.outer]);
        dims.push(rhs.shape[r.outer]);
        Ok(TensorType::new(lhs.dtype, Shape::new(dims)))
    }
}

impl InferType for MatMul {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn arity(&self) -> usize {
        2
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        match self.output_tensor(inputs[0], inputs[1]) {
            Ok(ty) => IrType::Tensor(ty),
            Err(invalid) => invalid,
        }
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        let (lhs, rhs) = (inputs[0], inputs[1]);
        if !same_placement(inputs) {
            return Ok(invalid(self.name(), "operands have different placement"));
        }

        let output = match self.output_tensor(lhs.tensor_type(), rhs.tensor_type()) {
            Ok(ty) => ty,
            Err(invalid) => return Ok(invalid),
        };
        let out_rank = output.shape.rank();
        let l = self.lhs_axes(lhs.tensor_type().shape.rank());
        let r = self.rhs_axes(rhs.tensor_type().shape.rank());
        let lhs_batch_axis = |axis: usize| axis + out_rank - l.rank;
        let rhs_batch_axis = |axis: usize| axis + out_rank - r.rank;

        let mut nd_sbp = Vec::with_capacity(lhs.nd_sbp().len());
        for (i, (&ls, &rs)) in lhs.nd_sbp().iter().zip(rhs.nd_sbp()).enumerate() {
            let sbp = match (ls, rs) {
                (Sbp::Split { axis: a }, Sbp::Split { axis: b })
                    if a == l.contraction && b == r.contraction =>
                {
                    Sbp::PartialSum
                }
                (Sbp::Split { axis: a }, Sbp::Split { axis: b })
                    if l.is_batch(a) && r.is_batch(b) && lhs_batch_axis(a) == rhs_batch_axis(b) =>
                {
                    Sbp::split(lhs_batch_axis(a))
                }
                (Sbp::Split { axis }, Sbp::Broadcast) if axis == l.outer => Sbp::split(out_rank - 2),
                (Sbp::Split { axis }, Sbp::Broadcast) if l.is_batch(axis) => {
                    Sbp::split(lhs_batch_axis(axis))
                }
                (Sbp::Broadcast, Sbp::Split { axis }) if axis == r.outer => Sbp::split(out_rank - 1),
                (Sbp::Broadcast, Sbp::Split { axis }) if r.is_batch(axis) => {
                    Sbp::split(rhs_batch_axis(axis))
                }
                (Sbp::Broadcast, Sbp::Broadcast) => Sbp::Broadcast,
                (Sbp::PartialSum, Sbp::Broadcast) | (Sbp::Broadcast, Sbp::PartialSum) => {
                    Sbp::PartialSum
                }
                _ => {
                    return Ok(invalid(
                        self.name(),
                        format!("unsupported policies {ls} and {rs} on mesh dimension {i}"),
                    ));
                }
            };
            nd_sbp.push(sbp);
        }

        if self.fused_reduce {
            for sbp in nd_sbp.iter_mut().filter(|sbp| sbp.is_partial_sum()) {
                *sbp = Sbp::Broadcast;
            }
        }

        if is_distributable(&output, &nd_sbp, lhs.placement()).is_none() {
            return Ok(invalid(
                self.name(),
                format!("output {output} cannot be distributed as {nd_sbp:?}"),
            ));
        }

        Ok(IrType::Distributed(DistributedType::from_parts(
            output,
            nd_sbp,
            lhs.placement().clone(),
        )))
    }
}
