use alloc::string::String;

use thiserror::Error;

use crate::ops::ReduceOp;

/// Errors raised by the sharding subsystem.
///
/// Semantic sharding mismatches are never reported through this type: they are returned as
/// [`IrType::Invalid`](crate::ir::IrType::Invalid) so that a search can discard the candidate.
/// This type only covers structural violations and combinations that are intentionally not
/// implemented.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ShardingError {
    /// The number of SBP entries does not match the rank of the placement.
    #[error("expected {expected} SBP entries for the placement rank, but got {actual}")]
    RankMismatch {
        /// Rank of the placement.
        expected: usize,
        /// Number of SBP entries provided.
        actual: usize,
    },

    /// An invalid placement dimension was specified.
    #[error("invalid placement dimension: {0}")]
    InvalidDimension(String),

    /// The placement configuration is invalid.
    #[error("invalid placement: {0}")]
    InvalidPlacement(String),

    /// Boxing candidates were requested for a tuple nested inside another tuple.
    #[error("boxing candidates for nested tuples are not supported")]
    NestedTupleUnsupported,

    /// A tuple-valued expression was given to an operation that only handles leaves.
    #[error("tuple-valued expressions are not supported here")]
    TupleUnsupported,

    /// The reduction kind has no distributed propagation rule.
    #[error("reduce op `{0}` is not supported on distributed tensors")]
    UnsupportedReduceOp(ReduceOp),

    /// A plain tensor type was expected.
    #[error("expected a tensor type, got `{0}`")]
    ExpectedTensorType(String),

    /// A distributed tensor type was expected.
    #[error("expected a distributed type, got `{0}`")]
    ExpectedDistributedType(String),

    /// An operator received the wrong number of inputs.
    #[error("`{op}` expects {expected} input(s), but got {actual}")]
    ArityMismatch {
        /// Operator name.
        op: &'static str,
        /// Expected number of inputs.
        expected: usize,
        /// Number of inputs provided.
        actual: usize,
    },
}
