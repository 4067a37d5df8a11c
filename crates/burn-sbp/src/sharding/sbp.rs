use core::fmt;

use serde::{Deserialize, Serialize};

/// Specifies how a tensor is distributed along a single mesh dimension.
///
/// There are no implicit conversions between variants: turning a partial sum into a broadcast
/// (or a split) is an explicit resharding step, see
/// [`broadcast_boxings`](crate::sharding::broadcast_boxings).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sbp {
    /// The tensor's logical axis is partitioned across this mesh dimension.
    Split {
        /// Logical tensor axis being partitioned.
        axis: usize,
    },
    /// The full tensor is replicated across this mesh dimension.
    Broadcast,
    /// Each device holds an unreduced partial contribution; the value is only valid after a
    /// sum across this mesh dimension.
    PartialSum,
}

impl Sbp {
    /// Partition logical `axis` across the mesh dimension.
    pub const fn split(axis: usize) -> Self {
        Sbp::Split { axis }
    }

    /// Replicate across the mesh dimension.
    pub const fn broadcast() -> Self {
        Sbp::Broadcast
    }

    /// Hold partial sums across the mesh dimension.
    pub const fn partial_sum() -> Self {
        Sbp::PartialSum
    }

    /// The split axis, if this is a split.
    pub fn split_axis(&self) -> Option<usize> {
        match self {
            Sbp::Split { axis } => Some(*axis),
            _ => None,
        }
    }

    /// Whether this is a partial sum.
    pub fn is_partial_sum(&self) -> bool {
        matches!(self, Sbp::PartialSum)
    }
}

impl fmt::Display for Sbp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sbp::Split { axis } => write!(f, "S({axis})"),
            Sbp::Broadcast => f.write_str("B"),
            Sbp::PartialSum => f.write_str("P"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_split_equality_depends_on_axis() {
        assert_eq!(Sbp::split(1), Sbp::Split { axis: 1 });
        assert_ne!(Sbp::split(0), Sbp::split(1));
        assert_ne!(Sbp::split(0), Sbp::broadcast());
        assert_ne!(Sbp::broadcast(), Sbp::partial_sum());
    }

    #[test]
    fn test_display_uses_short_notation() {
        assert_eq!(Sbp::split(2).to_string(), "S(2)");
        assert_eq!(Sbp::broadcast().to_string(), "B");
        assert_eq!(Sbp::partial_sum().to_string(), "P");
    }
}
