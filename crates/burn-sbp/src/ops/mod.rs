//! Per-operator propagation rules.
//!
//! Every operator implements [`InferType`]: given the types of its inputs it computes the
//! output type. When the inputs are distributed, the rule decides the output distribution or
//! rejects the combination with an [`IrType::Invalid`] diagnostic. Only structural problems and
//! intentionally unimplemented combinations are reported as [`ShardingError`].

mod binary;
mod boxing;
mod matmul;
mod normalization;
mod reduce;
mod transpose;
mod unary;

pub use binary::*;
pub use boxing::*;
pub use matmul::*;
pub use normalization::*;
pub use reduce::*;
pub use transpose::*;
pub use unary::*;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ShardingError;
use crate::ir::{Dimension, IrType, Shape, TensorType};
use crate::sharding::{DistributedType, Sbp};

/// Type inference of an operator application.
pub trait InferType {
    /// Operator name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Number of inputs the operator takes.
    fn arity(&self) -> usize;

    /// Output type when every input lives on a single device.
    fn infer_tensor(&self, inputs: &[&TensorType]) -> IrType;

    /// Output type when every input is distributed.
    fn infer_distributed(&self, inputs: &[&DistributedType]) -> Result<IrType, ShardingError>;

    /// Dispatches on the variants of `inputs`.
    ///
    /// An invalid input is propagated, an unknown input yields [`IrType::Any`], and mixing
    /// local with distributed inputs is invalid.
    fn infer_type(&self, inputs: &[IrType]) -> Result<IrType, ShardingError> {
        if inputs.len() != self.arity() {
            return Err(ShardingError::ArityMismatch {
                op: self.name(),
                expected: self.arity(),
                actual: inputs.len(),
            });
        }

        if let Some(invalid) = inputs.iter().find(|ty| ty.is_invalid()) {
            return Ok(invalid.clone());
        }
        if inputs.iter().any(|ty| matches!(ty, IrType::Any)) {
            return Ok(IrType::Any);
        }
        if inputs.iter().any(|ty| matches!(ty, IrType::Tuple(_))) {
            return Ok(invalid(self.name(), "tuple inputs are not supported"));
        }

        if let Some(tensors) = inputs.iter().map(IrType::as_tensor).collect::<Option<Vec<_>>>() {
            return Ok(self.infer_tensor(&tensors));
        }
        if let Some(distributed) = inputs
            .iter()
            .map(IrType::as_distributed)
            .collect::<Option<Vec<_>>>()
        {
            return self.infer_distributed(&distributed);
        }

        Ok(invalid(self.name(), "inputs mix local and distributed tensors"))
    }
}

/// Builds an invalid-type diagnostic for `op`.
pub(crate) fn invalid<S: AsRef<str>>(op: &str, reason: S) -> IrType {
    log::debug!("{op}: {}", reason.as_ref());
    IrType::invalid(format!("{op}: {}", reason.as_ref()))
}

/// The policy two operands agreeing on a mesh dimension produce.
///
/// Elementwise rules only accept operands whose policies are identical on every mesh
/// dimension; any disagreement needs an explicit boxing first.
pub fn check_sbp(lhs: Sbp, rhs: Sbp) -> Option<Sbp> {
    (lhs == rhs).then_some(lhs)
}

/// Whether every distributed input shares the placement of the first one.
pub(crate) fn same_placement(inputs: &[&DistributedType]) -> bool {
    inputs
        .windows(2)
        .all(|pair| pair[0].placement() == pair[1].placement())
}

/// Numpy-style broadcast of two logical shapes.
pub fn broadcast_shapes(lhs: &Shape, rhs: &Shape) -> Result<Shape, String> {
    let rank = lhs.rank().max(rhs.rank());
    let dim_at = |shape: &Shape, i: usize| {
        let offset = rank - shape.rank();
        if i < offset {
            Dimension::Fixed(1)
        } else {
            shape[i - offset]
        }
    };

    let mut dims = Vec::with_capacity(rank);
    for i in 0..rank {
        let dim = match (dim_at(lhs, i), dim_at(rhs, i)) {
            (Dimension::Fixed(a), Dimension::Fixed(b)) if a == b => Dimension::Fixed(a),
            (Dimension::Fixed(1), other) | (other, Dimension::Fixed(1)) => other,
            (Dimension::Unknown, Dimension::Unknown) => Dimension::Unknown,
            (Dimension::Unknown, fixed) | (fixed, Dimension::Unknown) => fixed,
            (a, b) => {
                return Err(format!(
                    "shapes {lhs} and {rhs} cannot be broadcast ({a} vs {b})"
                ));
            }
        };
        dims.push(dim);
    }

    Ok(Shape::new(dims))
}

/// Resolves a possibly negative axis against `rank`.
pub(crate) fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&axis).then_some(axis as usize)
}
