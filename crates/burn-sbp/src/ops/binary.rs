use alloc::format;
use alloc::vec::Vec;

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{InferType, broadcast_shapes, check_sbp, invalid, same_placement};
use crate::ShardingError;
use crate::ir::{IrType, TensorType};
use crate::sharding::{DistributedType, Sbp};

/// Elementwise binary operators.
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
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Sub,
    /// `lhs * rhs`
    Mul,
    /// `lhs / rhs`
    Div,
    /// Elementwise maximum.
    Max,
    /// Elementwise minimum.
    Min,
    /// `lhs ^ rhs`
    Pow,
}

impl BinaryOp {
    /// Whether summing partial operands before or after the op gives the same result.
    pub fn is_linear(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub)
    }
}

/// Elementwise binary operator application with numpy broadcasting.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct Binary {
    /// The operator.
    pub op: BinaryOp,
}

impl Binary {
    fn output_tensor(&self, lhs: &TensorType, rhs: &TensorType) -> Result<TensorType, IrType> {
        if lhs.dtype != rhs.dtype {
            return Err(invalid(
                self.name(),
                format!("element types differ ({} vs {})", lhs.dtype, rhs.dtype),
            ));
        }

        broadcast_shapes(&lhs.shape, &rhs.shape)
            .map(|shape| TensorType::new(lhs.dtype, shape))
            .map_err(|reason| invalid(self.name(), reason))
    }
}

/// Renumbers a split of an operand of rank `rank` to the broadcast output of rank `out_rank`.
fn align(sbp: Sbp, rank: usize, out_rank: usize) -> Sbp {
    match sbp {
        Sbp::Split { axis } => Sbp::split(axis + out_rank - rank),
        other => other,
    }
}

impl InferType for Binary {
    fn name(&self) -> &'static str {
        self.op.into()
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
        let (lhs_rank, rhs_rank) = (lhs.tensor_type().shape.rank(), rhs.tensor_type().shape.rank());

        let mut nd_sbp = Vec::with_capacity(lhs.nd_sbp().len());
        for (i, (&l, &r)) in lhs.nd_sbp().iter().zip(rhs.nd_sbp()).enumerate() {
            let Some(sbp) = check_sbp(align(l, lhs_rank, out_rank), align(r, rhs_rank, out_rank))
            else {
                return Ok(invalid(
                    self.name(),
                    format!("operands disagree on mesh dimension {i} ({l} vs {r})"),
                ));
            };
            if sbp.is_partial_sum() && !self.op.is_linear() {
                return Ok(invalid(
                    self.name(),
                    format!("partial sums on mesh dimension {i} do not commute with the op"),
                ));
            }
            nd_sbp.push(sbp);
        }

        Ok(IrType::Distributed(DistributedType::from_parts(
            output,
            nd_sbp,
            lhs.placement().clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DType;
    use crate::sharding::{DeviceKind, Placement};
    use alloc::vec;

    fn placement() -> Placement {
        Placement::new(DeviceKind::Cpu, vec![2, 4], ["x", "y"]).unwrap()
    }

    fn distributed(dims: &[usize], nd_sbp: Vec<Sbp>) -> IrType {
        DistributedType::new(TensorType::fixed(DType::F32, dims), nd_sbp, placement())
            .unwrap()
            .into()
    }

    #[test]
    fn test_binary_forwards_agreeing_policies() {
        let op = Binary::new(BinaryOp::Add);
        let lhs = distributed(&[8, 16], vec![Sbp::split(0), Sbp::split(1)]);
        let rhs = distributed(&[8, 16], vec![Sbp::split(0), Sbp::split(1)]);

        assert_eq!(op.infer_type(&[lhs.clone(), rhs]), Ok(lhs));
    }

    #[test]
    fn test_binary_aligns_lower_rank_operand() {
        let op = Binary::new(BinaryOp::Mul);
        let lhs = distributed(&[2, 8, 16], vec![Sbp::Broadcast, Sbp::split(2)]);
        let rhs = distributed(&[8, 16], vec![Sbp::Broadcast, Sbp::split(1)]);

        assert_eq!(op.infer_type(&[lhs.clone(), rhs]), Ok(lhs));
    }

    #[test]
    fn test_binary_rejects_disagreement() {
        let op = Binary::new(BinaryOp::Add);
        let lhs = distributed(&[8, 16], vec![Sbp::split(0), Sbp::Broadcast]);
        let rhs = distributed(&[8, 16], vec![Sbp::Broadcast, Sbp::Broadcast]);

        let result = op.infer_type(&[lhs, rhs]).unwrap();
        assert!(result.is_invalid());
    }

    #[test]
    fn test_binary_rejects_different_placement() {
        let op = Binary::new(BinaryOp::Add);
        let other = Placement::new(DeviceKind::Gpu, vec![2, 4], ["x", "y"]).unwrap();
        let lhs = distributed(&[8], vec![Sbp::Broadcast, Sbp::Broadcast]);
        let rhs: IrType = DistributedType::new(
            TensorType::fixed(DType::F32, [8]),
            vec![Sbp::Broadcast, Sbp::Broadcast],
            other,
        )
        .unwrap()
        .into();

        let IrType::Invalid(invalid) = op.infer_type(&[lhs, rhs]).unwrap() else {
            panic!("expected an invalid type");
        };
        assert!(invalid.reason().contains("different placement"));
    }

    #[test]
    fn test_binary_partial_sums_only_for_linear_ops() {
        let lhs = distributed(&[8], vec![Sbp::PartialSum, Sbp::Broadcast]);
        let rhs = distributed(&[8], vec![Sbp::PartialSum, Sbp::Broadcast]);

        let add = Binary::new(BinaryOp::Add).infer_type(&[lhs.clone(), rhs.clone()]);
        assert_eq!(add, Ok(lhs.clone()));
        let mul = Binary::new(BinaryOp::Mul).infer_type(&[lhs, rhs]).unwrap();
        assert!(mul.is_invalid());
    }

    #[test]
    fn test_binary_tensor_inference_broadcasts() {
        let op = Binary::new(BinaryOp::Sub);
        let lhs = IrType::Tensor(TensorType::fixed(DType::F32, [4, 1]));
        let rhs = IrType::Tensor(TensorType::fixed(DType::F32, [3]));

        assert_eq!(
            op.infer_type(&[lhs, rhs]),
            Ok(IrType::Tensor(TensorType::fixed(DType::F32, [4, 3])))
        );
    }
}
