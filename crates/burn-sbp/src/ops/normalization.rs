use alloc::format;
use alloc::vec::Vec;

use derive_new::new;

use super::{InferType, invalid, normalize_axis, same_placement};
use crate::ShardingError;
use crate::ir::{Dimension, IrType, TensorType};
use crate::sharding::{DistributedType, Sbp};

/// Checks that scale and bias match `expected` and returns the input type unchanged.
fn check_parameters(
    op: &str,
    input: &TensorType,
    expected: &[Dimension],
    params: &[&TensorType],
) -> IrType {
    for (name, param) in ["scale", "bias"].iter().zip(params) {
        if param.dtype != input.dtype {
            return invalid(
                op,
                format!(
                    "{name} element type {} differs from input {}",
                    param.dtype, input.dtype
                ),
            );
        }
        if param.shape.dims() != expected {
            return invalid(
                op,
                format!(
                    "{name} shape {} does not match the normalized axes of {}",
                    param.shape, input.shape
                ),
            );
        }
    }
    IrType::Tensor(input.clone())
}

/// Layer normalization over every axis from `axis` inwards.
///
/// Scale and bias have the shape of the normalized axes.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct LayerNorm {
    /// First normalized axis, negative values count from the last axis.
    pub axis: i64,
}

impl InferType for LayerNorm {
    fn name(&self) -> &'static str {
        "layer_norm"
    }

    fn arity(&self) -> usize {
        3
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        let input = inputs[0];
        let Some(axis) = normalize_axis(self.axis, input.shape.rank()) else {
            return invalid(
                self.name(),
                format!("axis {} is out of range for {}", self.axis, input.shape),
            );
        };
        check_parameters(self.name(), input, &input.shape.dims()[axis..], &inputs[1..])
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        if !same_placement(inputs) {
            return Ok(invalid(self.name(), "inputs have different placement"));
        }
        let tensors: Vec<&TensorType> = inputs.iter().map(|ty| ty.tensor_type()).collect();
        let checked = self.infer_tensor(&tensors);
        if checked.is_invalid() {
            return Ok(checked);
        }

        let (input, scale, bias) = (inputs[0], inputs[1], inputs[2]);
        let rank = input.tensor_type().shape.rank();
        let raxis = normalize_axis(self.axis, rank).unwrap_or(rank);
        let mut nd_sbp = Vec::with_capacity(input.nd_sbp().len());
        for (i, ((&is, &ss), &bs)) in input
            .nd_sbp()
            .iter()
            .zip(scale.nd_sbp())
            .zip(bias.nd_sbp())
            .enumerate()
        {
            let sbp = match (is, ss, bs) {
                (Sbp::Split { axis: ix }, Sbp::Split { axis: sx }, Sbp::Split { axis: bx })
                    if ix >= raxis && sx == ix - raxis && bx == sx =>
                {
                    // FIXME: would be S(ix), disabled until cross-device statistics are validated.
                    return Ok(invalid(
                        self.name(),
                        format!("not support split on axes for now (mesh dimension {i})"),
                    ));
                }
                (Sbp::Broadcast, Sbp::Broadcast, Sbp::Broadcast) => Sbp::Broadcast,
                _ => {
                    return Ok(invalid(
                        self.name(),
                        format!("unsupported policies {is}, {ss}, {bs} on mesh dimension {i}"),
                    ));
                }
            };
            nd_sbp.push(sbp);
        }

        Ok(IrType::Distributed(DistributedType::from_parts(
            input.tensor_type().clone(),
            nd_sbp,
            input.placement().clone(),
        )))
    }
}

/// Instance normalization of an `[N, C, ...]` input over its spatial axes.
///
/// Scale and bias have shape `[C]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceNorm;

impl InferType for InstanceNorm {
    fn name(&self) -> &'static str {
        "instance_norm"
    }

    fn arity(&self) -> usize {
        3
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        let input = inputs[0];
        if input.shape.rank() < 2 {
            return invalid(self.name(), format!("input {} has no channel axis", input.shape));
        }
        check_parameters(self.name(), input, &input.shape.dims()[1..2], &inputs[1..])
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        if !same_placement(inputs) {
            return Ok(invalid(self.name(), "inputs have different placement"));
        }
        let tensors: Vec<&TensorType> = inputs.iter().map(|ty| ty.tensor_type()).collect();
        let checked = self.infer_tensor(&tensors);
        if checked.is_invalid() {
            return Ok(checked);
        }

        let (input, scale, bias) = (inputs[0], inputs[1], inputs[2]);
        let mut nd_sbp = Vec::with_capacity(input.nd_sbp().len());
        for (i, ((&is, &ss), &bs)) in input
            .nd_sbp()
            .iter()
            .zip(scale.nd_sbp())
            .zip(bias.nd_sbp())
            .enumerate()
        {
            let sbp = match (is, ss, bs) {
                // Statistics are per channel, so channel shards are independent.
                (Sbp::Split { axis: 1 }, Sbp::Split { axis: 0 }, Sbp::Split { axis: 0 }) => {
                    Sbp::split(1)
                }
                (Sbp::Split { axis }, _, _) if axis >= 2 => {
                    return Ok(invalid(
                        self.name(),
                        format!("not support split on axes for now (mesh dimension {i})"),
                    ));
                }
                (Sbp::Broadcast, Sbp::Broadcast, Sbp::Broadcast) => Sbp::Broadcast,
                _ => {
                    return Ok(invalid(
                        self.name(),
                        format!("unsupported policies {is}, {ss}, {bs} on mesh dimension {i}"),
                    ));
                }
            };
            nd_sbp.push(sbp);
        }

        Ok(IrType::Distributed(DistributedType::from_parts(
            input.tensor_type().clone(),
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

    fn placement() -> Placement {
        Placement::new(DeviceKind::Cpu, vec![2], ["x"]).unwrap()
    }

    fn distributed(dims: &[usize], sbp: Sbp) -> IrType {
        DistributedType::new(TensorType::fixed(DType::F32, dims), vec![sbp], placement())
            .unwrap()
            .into()
    }

    #[test]
    fn test_layer_norm_broadcast_forwards_input() {
        let op = LayerNorm::new(-1);
        let input = distributed(&[4, 8], Sbp::Broadcast);
        let scale = distributed(&[8], Sbp::Broadcast);
        let bias = distributed(&[8], Sbp::Broadcast);

        assert_eq!(op.infer_type(&[input.clone(), scale, bias]), Ok(input));
    }

    #[test]
    fn test_layer_norm_rejects_split_on_normalized_axis() {
        let op = LayerNorm::new(1);
        let input = distributed(&[4, 8], Sbp::split(1));
        let scale = distributed(&[8], Sbp::split(0));
        let bias = distributed(&[8], Sbp::split(0));

        let IrType::Invalid(invalid) = op.infer_type(&[input, scale, bias]).unwrap() else {
            panic!("expected an invalid type");
        };
        assert!(invalid.reason().contains("not support split on axes for now"));
    }

    #[test]
    fn test_layer_norm_rejects_split_input_with_broadcast_parameters() {
        let op = LayerNorm::new(1);
        let input = distributed(&[4, 8], Sbp::split(0));
        let scale = distributed(&[8], Sbp::Broadcast);
        let bias = distributed(&[8], Sbp::Broadcast);

        assert!(op.infer_type(&[input, scale, bias]).unwrap().is_invalid());
    }

    #[test]
    fn test_layer_norm_rejects_mismatched_parameters() {
        let op = LayerNorm::new(1);
        let input = distributed(&[4, 8], Sbp::Broadcast);
        let scale = distributed(&[4], Sbp::Broadcast);
        let bias = distributed(&[8], Sbp::Broadcast);

        assert!(op.infer_type(&[input, scale, bias]).unwrap().is_invalid());
    }

    #[test]
    fn test_instance_norm_channel_split() {
        let op = InstanceNorm;
        let input = distributed(&[2, 4, 8, 8], Sbp::split(1));
        let scale = distributed(&[4], Sbp::split(0));
        let bias = distributed(&[4], Sbp::split(0));

        assert_eq!(op.infer_type(&[input.clone(), scale, bias]), Ok(input));
    }

    #[test]
    fn test_instance_norm_rejects_misaligned_parameters() {
        let op = InstanceNorm;
        let input = distributed(&[2, 4, 8, 8], Sbp::split(1));
        let scale = distributed(&[4], Sbp::Broadcast);
        let bias = distributed(&[4], Sbp::split(0));

        assert!(op.infer_type(&[input, scale, bias]).unwrap().is_invalid());
    }

    #[test]
    fn test_instance_norm_rejects_split_on_spatial_axes() {
        let op = InstanceNorm;
        let input = distributed(&[2, 4, 8, 8], Sbp::split(2));
        let scale = distributed(&[4], Sbp::Broadcast);
        let bias = distributed(&[4], Sbp::Broadcast);

        assert!(op.infer_type(&[input, scale, bias]).unwrap().is_invalid());
    }

    #[test]
    fn test_instance_norm_rejects_partial_sum() {
        let op = InstanceNorm;
        let input = distributed(&[2, 4, 8, 8], Sbp::PartialSum);
        let scale = distributed(&[4], Sbp::Broadcast);
        let bias = distributed(&[4], Sbp::Broadcast);

        assert!(op.infer_type(&[input, scale, bias]).unwrap().is_invalid());
    }
}
