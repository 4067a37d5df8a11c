use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::iter;

use itertools::{Itertools, MultiProduct};

use super::{DistributedType, Placement, Sbp, is_distributable, is_divisible};
use crate::ShardingError;
use crate::ir::{Expr, IrType, Shape, TensorType};

/// Every combination of one policy per mesh dimension, last mesh dimension varying fastest.
type SbpProduct = MultiProduct<vec::IntoIter<Sbp>>;

/// Splits of every static axis of `shape` that divide evenly by `factor`.
fn split_candidates(shape: &Shape, factor: usize) -> impl Iterator<Item = Sbp> + '_ {
    shape
        .dims()
        .iter()
        .enumerate()
        .filter_map(move |(axis, dim)| match dim.fixed_value() {
            Some(size) if is_divisible(size, factor) => Some(Sbp::split(axis)),
            _ => None,
        })
}

/// Lazy enumeration of the feasible policies of a tensor, see [`leaf_candidate_nd_sbps`].
#[derive(Clone)]
pub struct LeafCandidates {
    product: SbpProduct,
    tensor_type: TensorType,
    placement: Placement,
}

impl Iterator for LeafCandidates {
    type Item = Vec<Sbp>;

    fn next(&mut self) -> Option<Self::Item> {
        for nd_sbp in self.product.by_ref() {
            if is_distributable(&self.tensor_type, &nd_sbp, &self.placement).is_some() {
                return Some(nd_sbp);
            }
            log::trace!(
                "Rejected candidate {:?} for {} on {}",
                nd_sbp,
                self.tensor_type,
                self.placement
            );
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.product.size_hint().1)
    }
}

/// Enumerates every policy under which `tensor_type` can be distributed over `placement`.
///
/// Each mesh dimension may split any static axis its shard factor divides, or broadcast. The
/// Cartesian product of those sets is filtered through [`is_distributable`], so axes split on
/// several mesh dimensions must divide by every factor in turn. The sequence is lazy; clone it
/// to enumerate again.
pub fn leaf_candidate_nd_sbps(tensor_type: &TensorType, placement: &Placement) -> LeafCandidates {
    let choices: Vec<Vec<Sbp>> = placement
        .hierarchy()
        .iter()
        .map(|&factor| {
            let mut set: Vec<Sbp> = split_candidates(&tensor_type.shape, factor).collect();
            set.push(Sbp::Broadcast);
            set
        })
        .collect();

    LeafCandidates {
        product: choices.into_iter().multi_cartesian_product(),
        tensor_type: tensor_type.clone(),
        placement: placement.clone(),
    }
}

/// Wraps every candidate of [`leaf_candidate_nd_sbps`] in a boxing of `expr`.
///
/// `expr` must be a plain tensor.
pub fn leaf_candidate_boxings(
    expr: &Arc<Expr>,
    placement: &Placement,
) -> Result<impl Iterator<Item = Expr> + Clone + Send + use<>, ShardingError> {
    let tensor_type = match expr.checked_type() {
        IrType::Tensor(ty) => ty,
        other => return Err(ShardingError::ExpectedTensorType(other.to_string())),
    };
    let candidates = leaf_candidate_nd_sbps(&tensor_type, placement);
    let input = expr.clone();
    let placement = placement.clone();

    Ok(candidates.map(move |nd_sbp| {
        Expr::boxing(
            input.clone(),
            DistributedType::from_parts(tensor_type.clone(), nd_sbp, placement.clone()),
        )
    }))
}

/// Candidates of one leaf or tuple field.
#[derive(Clone)]
enum FieldCandidates {
    /// Nothing to resolve, the field is kept as it is.
    Unchanged(iter::Once<Expr>),
    /// Boxings of `input` to each distributable policy of `product`.
    Resolved {
        product: SbpProduct,
        input: Arc<Expr>,
        ty: DistributedType,
    },
}

impl FieldCandidates {
    fn new(input: Arc<Expr>, ty: &IrType) -> Self {
        let ty = match ty {
            IrType::Distributed(ty) if ty.has_partial_sum() => ty,
            _ => return FieldCandidates::Unchanged(iter::once(input.as_ref().clone())),
        };

        let choices: Vec<Vec<Sbp>> = ty
            .nd_sbp()
            .iter()
            .zip(ty.placement().hierarchy())
            .map(|(sbp, &factor)| match sbp {
                Sbp::PartialSum => {
                    let mut set = vec![Sbp::Broadcast];
                    set.extend(split_candidates(&ty.tensor_type().shape, factor));
                    set
                }
                other => vec![*other],
            })
            .collect();

        FieldCandidates::Resolved {
            product: choices.into_iter().multi_cartesian_product(),
            input,
            ty: ty.clone(),
        }
    }
}

impl Iterator for FieldCandidates {
    type Item = Expr;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            FieldCandidates::Unchanged(field) => field.next(),
            FieldCandidates::Resolved { product, input, ty } => {
                let nd_sbp = product.find(|nd_sbp| {
                    is_distributable(ty.tensor_type(), nd_sbp, ty.placement()).is_some()
                })?;
                Some(Expr::boxing(
                    input.clone(),
                    DistributedType::from_parts(
                        ty.tensor_type().clone(),
                        nd_sbp,
                        ty.placement().clone(),
                    ),
                ))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            FieldCandidates::Unchanged(field) => field.size_hint(),
            FieldCandidates::Resolved { product, .. } => (0, product.size_hint().1),
        }
    }
}

/// Candidates resolving the partial sums of an expression, see [`partial_candidate_boxings`].
#[derive(Clone)]
pub struct PartialCandidates {
    fields: MultiProduct<FieldCandidates>,
    tuple: bool,
}

impl Iterator for PartialCandidates {
    type Item = Expr;

    fn next(&mut self) -> Option<Self::Item> {
        let mut fields = self.fields.next()?;
        if self.tuple {
            Some(Expr::Tuple(fields))
        } else {
            fields.pop()
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.fields.size_hint()
    }
}

/// Enumerates the ways to resolve the partial sums held by `expr`.
///
/// Every mesh dimension holding a partial sum may either materialize it (broadcast) or fold
/// the reduction into a split of an axis its shard factor divides; other dimensions are kept.
/// A leaf without partial sums yields itself unchanged. The sequence is lazy; clone it to
/// enumerate again.
///
/// For a tuple the candidates of every field are combined, so fields without partial sums,
/// distributed or not, pass through as they are. Tuples nested in tuples are rejected with
/// [`ShardingError::NestedTupleUnsupported`].
pub fn partial_candidate_boxings(expr: &Arc<Expr>) -> Result<PartialCandidates, ShardingError> {
    match expr.checked_type() {
        ty @ IrType::Distributed(_) => {
            let field = FieldCandidates::new(expr.clone(), &ty);
            Ok(PartialCandidates {
                fields: iter::once(field).multi_cartesian_product(),
                tuple: false,
            })
        }
        IrType::Tuple(field_types) => {
            let mut choices = Vec::with_capacity(field_types.len());
            for (index, field_type) in field_types.iter().enumerate() {
                if let IrType::Tuple(_) = field_type {
                    return Err(ShardingError::NestedTupleUnsupported);
                }
                let field = match expr.as_ref() {
                    Expr::Tuple(fields) => Arc::new(fields[index].clone()),
                    _ => Arc::new(Expr::get_item(expr.clone(), index)),
                };
                choices.push(FieldCandidates::new(field, field_type));
            }

            Ok(PartialCandidates {
                fields: choices.into_iter().multi_cartesian_product(),
                tuple: true,
            })
        }
        other => Err(ShardingError::ExpectedDistributedType(other.to_string())),
    }
}

/// Materializes every partial sum held by `expr`.
///
/// Returns a boxing to the same policy with each partial sum replaced by a broadcast, or
/// `None` when `expr` holds no partial sum. Applying it to its own result therefore always
/// returns `None`. Tuples are rejected with [`ShardingError::TupleUnsupported`].
pub fn broadcast_boxings(expr: &Arc<Expr>) -> Result<Option<Expr>, ShardingError> {
    let ty = match expr.checked_type() {
        IrType::Distributed(ty) => ty,
        IrType::Tuple(_) => return Err(ShardingError::TupleUnsupported),
        other => return Err(ShardingError::ExpectedDistributedType(other.to_string())),
    };

    let nd_sbp: Vec<Sbp> = ty
        .nd_sbp()
        .iter()
        .map(|sbp| match sbp {
            Sbp::PartialSum => Sbp::Broadcast,
            other => *other,
        })
        .collect();

    if nd_sbp == ty.nd_sbp() {
        return Ok(None);
    }

    Ok(Some(Expr::boxing(
        expr.clone(),
        DistributedType::from_parts(ty.tensor_type().clone(), nd_sbp, ty.placement().clone()),
    )))
}
