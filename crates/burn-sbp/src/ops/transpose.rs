use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use derive_new::new;

use super::{InferType, invalid};
use crate::ShardingError;
use crate::ir::{IrType, Shape, TensorType};
use crate::sharding::{DistributedType, Sbp};

/// Axis permutation: output axis `i` is input axis `perm[i]`.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct Transpose {
    /// The permutation.
    pub perm: Vec<usize>,
}

impl Transpose {
    fn output_tensor(&self, input: &TensorType) -> Result<TensorType, IrType> {
        let rank = input.shape.rank();
        let mut seen = vec![false; rank];
        let is_permutation = self.perm.len() == rank
            && self
                .perm
                .iter()
                .all(|&axis| axis < rank && !core::mem::replace(&mut seen[axis], true));
        if !is_permutation {
            return Err(invalid(
                self.name(),
                format!("{:?} is not a permutation of the axes of {}", self.perm, input.shape),
            ));
        }

        let dims: Vec<_> = self.perm.iter().map(|&axis| input.shape[axis]).collect();
        Ok(TensorType::new(input.dtype, Shape::new(dims)))
    }

    /// Output position of input axis `axis`.
    fn output_axis(&self, axis: usize) -> Option<usize> {
        self.perm.iter().position(|&a| a == axis)
    }
}

impl InferType for Transpose {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn arity(&self) -> usize {
        1
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        match self.output_tensor(inputs[0]) {
            Ok(ty) => IrType::Tensor(ty),
            Err(invalid) => invalid,
        }
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        let input = inputs[0];
        let output = match self.output_tensor(input.tensor_type()) {
            Ok(ty) => ty,
            Err(invalid) => return Ok(invalid),
        };

        let mut nd_sbp = Vec::with_capacity(input.nd_sbp().len());
        for sbp in input.nd_sbp() {
            let sbp = match *sbp {
                Sbp::Split { axis } => match self.output_axis(axis) {
                    Some(axis) => Sbp::split(axis),
                    None => {
                        return Ok(invalid(
                            self.name(),
                            format!("split axis {axis} is not permuted"),
                        ));
                    }
                },
                other => other,
            };
            nd_sbp.push(sbp);
        }

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

    fn distributed(dims: &[usize], nd_sbp: Vec<Sbp>) -> IrType {
        let placement = Placement::new(DeviceKind::Cpu, vec![2, 2], ["x", "y"]).unwrap();
        DistributedType::new(TensorType::fixed(DType::F32, dims), nd_sbp, placement)
            .unwrap()
            .into()
    }

    #[test]
    fn test_transpose_renumbers_split_axes() {
        let op = Transpose::new(vec![2, 0, 1]);
        let input = distributed(&[2, 4, 8], vec![Sbp::split(2), Sbp::PartialSum]);

        assert_eq!(
            op.infer_type(&[input]),
            Ok(distributed(&[8, 2, 4], vec![Sbp::split(0), Sbp::PartialSum]))
        );
    }

    #[test]
    fn test_transpose_keeps_broadcast() {
        let op = Transpose::new(vec![1, 0]);
        let input = distributed(&[4, 8], vec![Sbp::Broadcast, Sbp::split(0)]);

        assert_eq!(
            op.infer_type(&[input]),
            Ok(distributed(&[8, 4], vec![Sbp::Broadcast, Sbp::split(1)]))
        );
    }

    #[test]
    fn test_transpose_rejects_invalid_permutation() {
        let input = IrType::Tensor(TensorType::fixed(DType::F32, [4, 8]));

        for perm in [vec![0, 0], vec![0], vec![0, 2]] {
            let result = Transpose::new(perm).infer_type(&[input.clone()]).unwrap();
            assert!(result.is_invalid());
        }
    }
}
