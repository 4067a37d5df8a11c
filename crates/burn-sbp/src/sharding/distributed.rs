use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use super::{Placement, Sbp};
use crate::ShardingError;
use crate::ir::TensorType;

/// Describes how a tensor is distributed across the devices of a placement.
///
/// A `DistributedType` pairs the logical (unsharded) tensor type with exactly one [`Sbp`] per
/// mesh dimension of its [`Placement`]. Values are immutable; deriving a different
/// distribution always builds a new value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributedType {
    /// Logical type of the tensor across all devices.
    tensor_type: TensorType,
    /// Distribution policy of every mesh dimension.
    nd_sbp: Vec<Sbp>,
    /// Devices the tensor is distributed over.
    placement: Placement,
}

impl DistributedType {
    /// Creates a distributed type.
    ///
    /// Fails with [`ShardingError::RankMismatch`] when `nd_sbp` does not hold exactly one entry
    /// per mesh dimension of `placement`.
    pub fn new<S: Into<Vec<Sbp>>>(
        tensor_type: TensorType,
        nd_sbp: S,
        placement: Placement,
    ) -> Result<Self, ShardingError> {
        let nd_sbp = nd_sbp.into();
        if nd_sbp.len() != placement.rank() {
            return Err(ShardingError::RankMismatch {
                expected: placement.rank(),
                actual: nd_sbp.len(),
            });
        }

        Ok(Self {
            tensor_type,
            nd_sbp,
            placement,
        })
    }

    /// Builds a value whose policy count is already known to match the placement rank.
    pub(crate) fn from_parts(tensor_type: TensorType, nd_sbp: Vec<Sbp>, placement: Placement) -> Self {
        debug_assert_eq!(nd_sbp.len(), placement.rank());
        Self {
            tensor_type,
            nd_sbp,
            placement,
        }
    }

    /// Logical type of the tensor.
    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    /// Distribution policy of every mesh dimension.
    pub fn nd_sbp(&self) -> &[Sbp] {
        &self.nd_sbp
    }

    /// Devices the tensor is distributed over.
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Same tensor and placement, different policies.
    pub fn with_nd_sbp<S: Into<Vec<Sbp>>>(&self, nd_sbp: S) -> Result<Self, ShardingError> {
        Self::new(self.tensor_type.clone(), nd_sbp, self.placement.clone())
    }

    /// Whether any mesh dimension still holds partial sums.
    pub fn has_partial_sum(&self) -> bool {
        self.nd_sbp.iter().any(Sbp::is_partial_sum)
    }
}

impl fmt::Display for DistributedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.tensor_type)?;
        for (i, sbp) in self.nd_sbp.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{sbp}")?;
        }
        write!(f, "}}{}", self.placement)
    }
}
