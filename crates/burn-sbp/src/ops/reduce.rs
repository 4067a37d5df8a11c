use alloc::format;
use alloc::vec::Vec;

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{InferType, invalid, normalize_axis};
use crate::ShardingError;
use crate::ir::{Dimension, IrType, Shape, TensorType};
use crate::sharding::{DistributedType, Sbp};

/// Reduction kinds.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ReduceOp {
    /// Sum of the elements.
    Sum,
    /// Arithmetic mean of the elements.
    Mean,
    /// Largest element.
    Max,
    /// Smallest element.
    Min,
    /// Product of the elements.
    Prod,
}

/// Reduction over a fixed set of axes.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct Reduce {
    /// The reduction kind.
    pub op: ReduceOp,
    /// Reduced axes, negative values count from the last axis.
    pub axes: Vec<i64>,
    /// Keep reduced axes with extent `1` instead of removing them.
    pub keep_dims: bool,
}

impl Reduce {
    /// Sorted, deduplicated reduced axes, or an invalid type when an axis is out of range.
    fn reduced_axes(&self, rank: usize) -> Result<Vec<usize>, IrType> {
        let mut axes = Vec::with_capacity(self.axes.len());
        for &axis in &self.axes {
            match normalize_axis(axis, rank) {
                Some(axis) => axes.push(axis),
                None => {
                    return Err(invalid(
                        self.name(),
                        format!("axis {axis} is out of range for rank {rank}"),
                    ));
                }
            }
        }
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }

    fn output_shape(&self, shape: &Shape, axes: &[usize]) -> Shape {
        let dims = shape.dims().iter().enumerate().filter_map(|(axis, dim)| {
            match (axes.contains(&axis), self.keep_dims) {
                (false, _) => Some(*dim),
                (true, true) => Some(Dimension::Fixed(1)),
                (true, false) => None,
            }
        });
        Shape::new(dims.collect::<Vec<_>>())
    }
}

impl InferType for Reduce {
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn arity(&self) -> usize {
        1
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        let input = inputs[0];
        match self.reduced_axes(input.shape.rank()) {
            Ok(axes) => IrType::Tensor(TensorType::new(
                input.dtype,
                self.output_shape(&input.shape, &axes),
            )),
            Err(invalid) => invalid,
        }
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        if self.op == ReduceOp::Prod {
            return Err(ShardingError::UnsupportedReduceOp(self.op));
        }

        let input = inputs[0];
        let axes = match self.reduced_axes(input.tensor_type().shape.rank()) {
            Ok(axes) => axes,
            Err(invalid) => return Ok(invalid),
        };

        let mut nd_sbp = Vec::with_capacity(input.nd_sbp().len());
        for (i, sbp) in input.nd_sbp().iter().enumerate() {
            let sbp = match *sbp {
                Sbp::Split { axis } if axes.contains(&axis) => {
                    return Ok(invalid(
                        self.name(),
                        format!(
                            "reduce not support split on axes for now (mesh dimension {i} splits axis {axis})"
                        ),
                    ));
                }
                Sbp::Split { axis } if self.keep_dims => Sbp::split(axis),
                Sbp::Split { axis } => {
                    let removed = axes.iter().filter(|&&reduced| reduced < axis).count();
                    Sbp::split(axis - removed)
                }
                Sbp::PartialSum if matches!(self.op, ReduceOp::Max | ReduceOp::Min) => {
                    return Ok(invalid(
                        self.name(),
                        format!("partial sums on mesh dimension {i} do not commute with {}", self.op),
                    ));
                }
                other => other,
            };
            nd_sbp.push(sbp);
        }

        let output = TensorType::new(
            input.tensor_type().dtype,
            self.output_shape(&input.tensor_type().shape, &axes),
        );
        Ok(IrType::Distributed(DistributedType::from_parts(
            output,
            nd_sbp,
            input.placement().clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DType;
    use crate::sharding::{DeviceKind, Placement};
    use alloc::vec;
    use rstest::rstest;

    fn placement() -> Placement {
        Placement::new(DeviceKind::Cpu, vec![2, 2], ["x", "y"]).unwrap()
    }

    fn distributed(dims: &[usize], nd_sbp: Vec<Sbp>) -> IrType {
        DistributedType::new(TensorType::fixed(DType::F32, dims), nd_sbp, placement())
            .unwrap()
            .into()
    }

    #[test]
    fn test_reduce_rejects_split_on_reduced_axis() {
        let op = Reduce::new(ReduceOp::Sum, vec![1], false);
        let input = distributed(&[4, 8], vec![Sbp::split(1), Sbp::Broadcast]);

        let IrType::Invalid(invalid) = op.infer_type(&[input]).unwrap() else {
            panic!("expected an invalid type");
        };
        assert!(invalid.reason().contains("reduce not support split on axes for now"));
    }

    #[rstest]
    #[case(false, vec![Sbp::split(0), Sbp::split(1)], &[4, 16])]
    #[case(true, vec![Sbp::split(0), Sbp::split(2)], &[4, 1, 16])]
    fn test_reduce_renumbers_split_axes(
        #[case] keep_dims: bool,
        #[case] expected: Vec<Sbp>,
        #[case] dims: &[usize],
    ) {
        let op = Reduce::new(ReduceOp::Mean, vec![-2], keep_dims);
        let input = distributed(&[4, 8, 16], vec![Sbp::split(0), Sbp::split(2)]);

        assert_eq!(op.infer_type(&[input]), Ok(distributed(dims, expected)));
    }

    #[test]
    fn test_reduce_forwards_broadcast_and_partial_sum() {
        let op = Reduce::new(ReduceOp::Sum, vec![0], false);
        let input = distributed(&[4, 8], vec![Sbp::Broadcast, Sbp::PartialSum]);

        assert_eq!(
            op.infer_type(&[input]),
            Ok(distributed(&[8], vec![Sbp::Broadcast, Sbp::PartialSum]))
        );
    }

    #[test]
    fn test_reduce_max_rejects_partial_sum() {
        let op = Reduce::new(ReduceOp::Max, vec![0], false);
        let input = distributed(&[4, 8], vec![Sbp::Broadcast, Sbp::PartialSum]);

        assert!(op.infer_type(&[input]).unwrap().is_invalid());
    }

    #[test]
    fn test_reduce_prod_is_unsupported() {
        let op = Reduce::new(ReduceOp::Prod, vec![0], false);
        let input = distributed(&[4, 8], vec![Sbp::Broadcast, Sbp::Broadcast]);

        assert_eq!(
            op.infer_type(&[input]),
            Err(ShardingError::UnsupportedReduceOp(ReduceOp::Prod))
        );
    }

    #[test]
    fn test_reduce_tensor_inference() {
        let op = Reduce::new(ReduceOp::Prod, vec![1, -1], true);
        let input = IrType::Tensor(TensorType::fixed(DType::F32, [2, 3, 4]));

        assert_eq!(
            op.infer_type(&[input]),
            Ok(IrType::Tensor(TensorType::fixed(DType::F32, [2, 1, 1])))
        );

        let op = Reduce::new(ReduceOp::Sum, vec![3], false);
        let input = IrType::Tensor(TensorType::fixed(DType::F32, [2, 3, 4]));
        assert!(op.infer_type(&[input]).unwrap().is_invalid());
    }
}
