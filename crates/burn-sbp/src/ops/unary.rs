use alloc::format;

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{InferType, invalid};
use crate::ShardingError;
use crate::ir::{IrType, TensorType};
use crate::sharding::DistributedType;

/// Elementwise unary operators.
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
pub enum UnaryOp {
    /// Returns the input.
    Identity,
    /// `-x`
    Neg,
    /// `|x|`
    Abs,
    /// `e^x`
    Exp,
    /// Natural logarithm.
    Log,
    /// Square root.
    Sqrt,
    /// `max(x, 0)`
    Relu,
    /// Logistic function.
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
}

impl UnaryOp {
    /// Whether the op can be applied to each partial operand before summing.
    pub fn is_linear(&self) -> bool {
        matches!(self, UnaryOp::Identity | UnaryOp::Neg)
    }
}

/// Elementwise unary operator application.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct Unary {
    /// The operator.
    pub op: UnaryOp,
}

impl InferType for Unary {
    fn name(&self) -> &'static str {
        self.op.into()
    }

    fn arity(&self) -> usize {
        1
    }

    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType {
        IrType::Tensor(inputs[0].clone())
    }

    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError> {
        let input = inputs[0];
        if !self.op.is_linear() {
            if let Some(i) = input.nd_sbp().iter().position(|sbp| sbp.is_partial_sum()) {
                return Ok(invalid(
                    self.name(),
                    format!("partial sums on mesh dimension {i} do not commute with the op"),
                ));
            }
        }
        Ok(IrType::Distributed(input.clone()))
    }
}
