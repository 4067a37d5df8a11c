use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::ShardingError;

/// Kind of device a placement targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum DeviceKind {
    /// Host processor cores.
    Cpu,
    /// Graphics processor.
    Gpu,
    /// Neural processing unit.
    Npu,
}

/// Represents a logical mesh dimension, identified by a unique name.
///
/// Each dimension of a [`Placement`] is labelled so that parallelism strategies (data,
/// tensor, pipeline) can refer to it unambiguously.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDim {
    /// A name that uniquely identifies the mesh dimension.
    name: String,
}

impl MeshDim {
    /// Constructs a new [`MeshDim`] with the given name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        MeshDim { name: name.into() }
    }

    /// The name of this dimension.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The device grid a program targets.
///
/// A `Placement` is an N-dimensional logical arrangement of devices of a single [`DeviceKind`].
/// Its `hierarchy` gives the number of devices (the shard factor) along every mesh dimension
/// and its `names` label those dimensions, in the same order.
///
/// For example, a placement with hierarchy `[2, 4]` and names `["dp", "tp"]` describes eight
/// devices arranged for 2-way data parallelism and 4-way tensor parallelism.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    kind: DeviceKind,
    hierarchy: Vec<usize>,
    names: Vec<MeshDim>,
}

impl Placement {
    /// Creates a placement from parallel lists of shard factors and dimension names.
    ///
    /// Fails when the lists differ in length, when a shard factor is zero or when a name is
    /// used twice.
    pub fn new<H, N>(kind: DeviceKind, hierarchy: H, names: N) -> Result<Self, ShardingError>
    where
        H: Into<Vec<usize>>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        let hierarchy = hierarchy.into();
        let names: Vec<MeshDim> = names.into_iter().map(MeshDim::new).collect();

        if hierarchy.len() != names.len() {
            return Err(ShardingError::InvalidPlacement(format!(
                "Hierarchy {:?} has {} dimensions but {} names were given",
                hierarchy,
                hierarchy.len(),
                names.len()
            )));
        }

        let mut builder = PlacementBuilder::new(kind, hierarchy);
        for (idx, name) in names.into_iter().enumerate() {
            builder = builder.with_dim(idx, name);
        }
        builder.build()
    }

    /// Device kind of this placement.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Shard factor of every mesh dimension.
    pub fn hierarchy(&self) -> &[usize] {
        &self.hierarchy
    }

    /// Labels of the mesh dimensions.
    pub fn names(&self) -> &[MeshDim] {
        &self.names
    }

    /// Number of mesh dimensions.
    pub fn rank(&self) -> usize {
        self.hierarchy.len()
    }

    /// Total number of devices.
    pub fn device_count(&self) -> usize {
        self.hierarchy.iter().product()
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}[", self.kind)?;
        for (i, (name, factor)) in self.names.iter().zip(&self.hierarchy).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name.name, factor)?;
        }
        f.write_str("]")
    }
}

/// A builder for constructing a [`Placement`].
///
/// The hierarchy is given upfront and every mesh dimension is then labelled with
/// [`with_dim`](PlacementBuilder::with_dim). Once all dimensions are labelled, the builder can
/// be used to construct the [`Placement`] instance.
#[derive(Clone, Debug)]
pub struct PlacementBuilder {
    /// Device kind of the placement.
    kind: DeviceKind,
    /// Shard factor of every mesh dimension.
    hierarchy: Vec<usize>,
    /// Maps dimension names to their indices in the hierarchy.
    dims: HashMap<MeshDim, usize>,
}

impl PlacementBuilder {
    /// Creates a new [`PlacementBuilder`] for `kind` with the given hierarchy.
    pub fn new<S: Into<Vec<usize>>>(kind: DeviceKind, hierarchy: S) -> Self {
        Self {
            kind,
            hierarchy: hierarchy.into(),
            dims: HashMap::new(),
        }
    }

    /// Labels the mesh dimension at `idx` in the hierarchy.
    ///
    /// # Example
    ///
    /// ```rust
    /// use burn_sbp::sharding::{DeviceKind, MeshDim, PlacementBuilder};
    ///
    /// let placement = PlacementBuilder::new(DeviceKind::Cpu, [2, 4])
    ///     .with_dim(0, MeshDim::new("dp"))
    ///     .with_dim(1, MeshDim::new("tp"))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(placement.rank(), 2);
    /// ```
    pub fn with_dim(mut self, idx: usize, dim: MeshDim) -> Self {
        self.dims.insert(dim, idx);
        self
    }

    /// Builds a [`Placement`] from the current configuration.
    ///
    /// Every dimension must be labelled exactly once, with a unique name, and every shard
    /// factor must be positive.
    pub fn build(self) -> Result<Placement, ShardingError> {
        let rank = self.hierarchy.len();
        let mut seen_indices = HashSet::new();

        for &idx in self.dims.values() {
            if idx >= rank {
                return Err(ShardingError::InvalidDimension(format!(
                    "Index {} exceeds placement hierarchy {:?}",
                    idx, self.hierarchy
                )));
            }
            if !seen_indices.insert(idx) {
                return Err(ShardingError::InvalidDimension(format!(
                    "Dimension {} already mapped",
                    idx
                )));
            }
        }

        if seen_indices.len() != rank {
            return Err(ShardingError::InvalidPlacement(format!(
                "Not all mesh dimensions are named. Got {}, expected {}",
                seen_indices.len(),
                rank
            )));
        }

        if let Some(idx) = self.hierarchy.iter().position(|&factor| factor == 0) {
            return Err(ShardingError::InvalidPlacement(format!(
                "Shard factor of dimension {} must be positive in {:?}",
                idx, self.hierarchy
            )));
        }

        let mut names: Vec<(usize, MeshDim)> =
            self.dims.into_iter().map(|(dim, idx)| (idx, dim)).collect();
        names.sort_unstable_by_key(|(idx, _)| *idx);

        Ok(Placement {
            kind: self.kind,
            hierarchy: self.hierarchy,
            names: names.into_iter().map(|(_, dim)| dim).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_placement_2x4() {
        let placement = PlacementBuilder::new(DeviceKind::Cpu, [2, 4])
            .with_dim(1, MeshDim::new("y"))
            .with_dim(0, MeshDim::new("x"))
            .build()
            .unwrap();

        assert_eq!(placement.rank(), 2);
        assert_eq!(placement.device_count(), 8);
        assert_eq!(placement.names()[0].name(), "x");
        assert_eq!(placement.names()[1].name(), "y");
        assert_eq!(placement.to_string(), "@CPU[x=2, y=4]");
    }

    #[test]
    fn test_placement_from_parallel_lists() {
        let placement = Placement::new(DeviceKind::Npu, vec![4], ["t"]).unwrap();

        assert_eq!(placement.hierarchy(), &[4]);
        assert_eq!(placement.kind(), DeviceKind::Npu);
    }

    #[test]
    fn test_placements_compare_structurally() {
        let a = Placement::new(DeviceKind::Cpu, vec![2, 2], ["x", "y"]).unwrap();
        let b = Placement::new(DeviceKind::Cpu, vec![2, 2], ["x", "y"]).unwrap();
        let c = Placement::new(DeviceKind::Gpu, vec![2, 2], ["x", "y"]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic = "InvalidPlacement(\"Hierarchy [2, 2] has 2 dimensions but 1 names were given\")"]
    fn test_placement_names_should_match_hierarchy() {
        let _placement = Placement::new(DeviceKind::Cpu, vec![2, 2], ["x"]).unwrap();
    }

    #[test]
    #[should_panic = "InvalidDimension(\"Index 2 exceeds placement hierarchy [2, 2]\")"]
    fn test_placement_dim_should_be_in_bound() {
        let _placement = PlacementBuilder::new(DeviceKind::Cpu, [2, 2])
            .with_dim(0, MeshDim::new("x"))
            .with_dim(2, MeshDim::new("y")) // out of bounds
            .build()
            .unwrap();
    }

    #[test]
    #[should_panic = "InvalidDimension(\"Dimension 0 already mapped\")"]
    fn test_placement_dim_should_be_unique() {
        let _placement = PlacementBuilder::new(DeviceKind::Cpu, [2, 2])
            .with_dim(0, MeshDim::new("x"))
            .with_dim(0, MeshDim::new("y")) // already mapped
            .build()
            .unwrap();
    }

    #[test]
    #[should_panic = "InvalidPlacement(\"Not all mesh dimensions are named."]
    fn test_placement_dim_name_should_be_unique() {
        let _placement = PlacementBuilder::new(DeviceKind::Cpu, [2, 2])
            .with_dim(0, MeshDim::new("x"))
            .with_dim(1, MeshDim::new("x")) // same name is invalid
            .build()
            .unwrap();
    }

    #[test]
    #[should_panic = "InvalidPlacement(\"Shard factor of dimension 1 must be positive"]
    fn test_placement_factors_should_be_positive() {
        let _placement = Placement::new(DeviceKind::Cpu, vec![2, 0], ["x", "y"]).unwrap();
    }
}
