use alloc::format;

use crate::ir::{IrType, TensorType};
use crate::sharding::{DistributedType, is_distributable};

use super::invalid;

const BOXING: &str = "boxing";

/// Type of a boxing node converting `input` to `target`.
///
/// A local tensor may be boxed to any distribution of itself; a distributed tensor may only
/// change its policies, never its logical type or placement. The target must be realizable
/// on its placement.
pub fn infer_boxing_type(input: &IrType, target: &DistributedType) -> IrType {
    let source: &TensorType = match input {
        IrType::Invalid(_) => return input.clone(),
        IrType::Any => return IrType::Any,
        IrType::Tuple(_) => return invalid(BOXING, "tuple inputs must be boxed field by field"),
        IrType::Tensor(tensor_type) => tensor_type,
        IrType::Distributed(distributed) => {
            if distributed.placement() != target.placement() {
                return invalid(
                    BOXING,
                    format!(
                        "cannot move {} from {} to {}",
                        distributed.tensor_type(),
                        distributed.placement(),
                        target.placement()
                    ),
                );
            }
            distributed.tensor_type()
        }
    };

    if source != target.tensor_type() {
        return invalid(
            BOXING,
            format!("cannot box {source} to {}", target.tensor_type()),
        );
    }
    if is_distributable(target.tensor_type(), target.nd_sbp(), target.placement()).is_none() {
        return invalid(BOXING, format!("{target} is not distributable"));
    }

    IrType::Distributed(target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DType;
    use crate::sharding::{DeviceKind, Placement, Sbp};
    use alloc::vec;
    use pretty_assertions::assert_eq;

    fn placement() -> Placement {
        Placement::new(DeviceKind::Cpu, vec![2, 4], ["x", "y"]).unwrap()
    }

    fn distributed(dims: &[usize], nd_sbp: [Sbp; 2]) -> DistributedType {
        DistributedType::new(TensorType::fixed(DType::F32, dims), nd_sbp, placement()).unwrap()
    }

    #[test]
    fn test_boxing_changes_policies() {
        let source = distributed(&[8, 16], [Sbp::PartialSum, Sbp::split(1)]);
        let target = distributed(&[8, 16], [Sbp::split(0), Sbp::Broadcast]);

        assert_eq!(
            infer_boxing_type(&source.into(), &target),
            IrType::Distributed(target)
        );
    }

    #[test]
    fn test_boxing_distributes_local_tensor() {
        let source = IrType::Tensor(TensorType::fixed(DType::F32, [8, 16]));
        let target = distributed(&[8, 16], [Sbp::Broadcast, Sbp::split(1)]);

        assert_eq!(infer_boxing_type(&source, &target), IrType::Distributed(target));
    }

    #[test]
    fn test_boxing_rejects_indivisible_target() {
        let source = IrType::Tensor(TensorType::fixed(DType::F32, [6, 16]));
        let target = distributed(&[6, 16], [Sbp::Broadcast, Sbp::split(0)]);

        assert!(infer_boxing_type(&source, &target).is_invalid());
    }

    #[test]
    fn test_boxing_rejects_type_and_placement_changes() {
        let target = distributed(&[8, 16], [Sbp::Broadcast, Sbp::Broadcast]);

        let reshaped = distributed(&[16, 8], [Sbp::Broadcast, Sbp::Broadcast]);
        assert!(infer_boxing_type(&reshaped.into(), &target).is_invalid());

        let other = Placement::new(DeviceKind::Gpu, vec![2, 4], ["x", "y"]).unwrap();
        let moved = DistributedType::new(
            TensorType::fixed(DType::F32, [8, 16]),
            [Sbp::Broadcast, Sbp::Broadcast],
            other,
        )
        .unwrap();
        let IrType::Invalid(invalid) = infer_boxing_type(&moved.into(), &target) else {
            panic!("expected an invalid type");
        };
        assert!(invalid.reason().starts_with("boxing: cannot move"));
    }

    #[test]
    fn test_boxing_propagates_invalid_and_any() {
        let target = distributed(&[8, 16], [Sbp::Broadcast, Sbp::Broadcast]);

        assert_eq!(infer_boxing_type(&IrType::Any, &target), IrType::Any);
        assert_eq!(
            infer_boxing_type(&IrType::invalid("upstream"), &target),
            IrType::invalid("upstream")
        );
        assert!(infer_boxing_type(&IrType::Tuple(vec![]), &target).is_invalid());
    }
}
