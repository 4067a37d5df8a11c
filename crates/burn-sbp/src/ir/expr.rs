use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::IrType;
use crate::ops::infer_boxing_type;
use crate::sharding::DistributedType;

/// Converts the distribution of `input` to `target`.
///
/// Produced by the candidate search; a later lowering stage turns it into collective
/// communication (all-gather for split to broadcast, all-reduce for partial-sum to broadcast,
/// reduce-scatter for partial-sum to split).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Boxing {
    input: Arc<Expr>,
    target: DistributedType,
}

impl Boxing {
    /// Creates a boxing of `input` into `target`.
    pub fn new(input: Arc<Expr>, target: DistributedType) -> Self {
        Self { input, target }
    }

    /// The expression being resharded.
    pub fn input(&self) -> &Arc<Expr> {
        &self.input
    }

    /// The distribution the input is converted to.
    pub fn target(&self) -> &DistributedType {
        &self.target
    }
}

/// A node of the expression tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// A typed leaf value.
    Var {
        /// Name of the value.
        name: String,
        /// Type of the value.
        ty: IrType,
    },
    /// A tuple of expressions.
    Tuple(Vec<Expr>),
    /// Projection of one field of a tuple-valued expression.
    GetItem {
        /// The tuple-valued expression.
        input: Arc<Expr>,
        /// Index of the projected field.
        index: usize,
    },
    /// A resharding step.
    Boxing(Boxing),
}

impl Expr {
    /// Creates a typed leaf.
    pub fn var<S: Into<String>, T: Into<IrType>>(name: S, ty: T) -> Self {
        Expr::Var {
            name: name.into(),
            ty: ty.into(),
        }
    }

    /// Creates a tuple.
    pub fn tuple<F: Into<Vec<Expr>>>(fields: F) -> Self {
        Expr::Tuple(fields.into())
    }

    /// Projects field `index` of `input`.
    pub fn get_item(input: Arc<Expr>, index: usize) -> Self {
        Expr::GetItem { input, index }
    }

    /// Creates a boxing of `input` into `target`.
    pub fn boxing(input: Arc<Expr>, target: DistributedType) -> Self {
        Expr::Boxing(Boxing::new(input, target))
    }

    /// The type of this expression.
    pub fn checked_type(&self) -> IrType {
        match self {
            Expr::Var { ty, .. } => ty.clone(),
            Expr::Tuple(fields) => IrType::Tuple(fields.iter().map(Expr::checked_type).collect()),
            Expr::GetItem { input, index } => match input.checked_type() {
                IrType::Tuple(mut fields) if *index < fields.len() => fields.swap_remove(*index),
                IrType::Tuple(fields) => IrType::invalid(format!(
                    "tuple index {index} out of range for {} field(s)",
                    fields.len()
                )),
                IrType::Any => IrType::Any,
                other => IrType::invalid(format!("cannot project a field out of `{other}`")),
            },
            Expr::Boxing(boxing) => {
                infer_boxing_type(&boxing.input.checked_type(), &boxing.target)
            }
        }
    }

    /// The boxing node, if this is one.
    pub fn as_boxing(&self) -> Option<&Boxing> {
        match self {
            Expr::Boxing(boxing) => Some(boxing),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, TensorType};
    use crate::sharding::{DeviceKind, Placement, Sbp};
    use alloc::vec;

    #[test]
    fn test_get_item_projects_tuple_field() {
        let a = TensorType::fixed(DType::F32, [2]);
        let b = TensorType::fixed(DType::I32, [3]);
        let tuple = Arc::new(Expr::tuple(vec![Expr::var("a", a), Expr::var("b", b.clone())]));

        assert_eq!(Expr::get_item(tuple.clone(), 1).checked_type(), IrType::Tensor(b));
        assert!(Expr::get_item(tuple, 2).checked_type().is_invalid());
    }

    #[test]
    fn test_boxing_checks_its_input() {
        let placement = Placement::new(DeviceKind::Cpu, vec![2], ["x"]).unwrap();
        let tensor_type = TensorType::fixed(DType::F32, [4, 6]);
        let leaf = Arc::new(Expr::var("x", tensor_type.clone()));
        let split = DistributedType::new(tensor_type, [Sbp::split(0)], placement.clone()).unwrap();

        let boxing = Expr::boxing(leaf.clone(), split.clone());
        assert_eq!(boxing.checked_type(), IrType::Distributed(split));

        let other = DistributedType::new(
            TensorType::fixed(DType::F32, [6, 4]),
            [Sbp::Broadcast],
            placement,
        )
        .unwrap();
        assert!(Expr::boxing(leaf, other).checked_type().is_invalid());
    }
}
