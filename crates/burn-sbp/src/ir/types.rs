use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Index;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::sharding::DistributedType;

/// A single tensor dimension, either known at compile time or dynamic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Statically known extent.
    Fixed(usize),
    /// Extent only known at runtime.
    Unknown,
}

impl Dimension {
    /// Whether the extent is statically known.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Dimension::Fixed(_))
    }

    /// The static extent, if any.
    pub fn fixed_value(&self) -> Option<usize> {
        match self {
            Dimension::Fixed(value) => Some(*value),
            Dimension::Unknown => None,
        }
    }
}

impl From<usize> for Dimension {
    fn from(value: usize) -> Self {
        Dimension::Fixed(value)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Fixed(value) => write!(f, "{value}"),
            Dimension::Unknown => f.write_str("?"),
        }
    }
}

/// Logical shape of a tensor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    /// Creates a shape from its dimensions.
    pub fn new<D: Into<Vec<Dimension>>>(dims: D) -> Self {
        Self { dims: dims.into() }
    }

    /// Creates a fully static shape.
    pub fn fixed<S: AsRef<[usize]>>(dims: S) -> Self {
        Self {
            dims: dims.as_ref().iter().map(|&d| Dimension::Fixed(d)).collect(),
        }
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The dimensions of this shape.
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Whether every dimension is statically known.
    pub fn is_fixed(&self) -> bool {
        self.dims.iter().all(Dimension::is_fixed)
    }

    /// The static extents, or `None` if any dimension is dynamic.
    pub fn fixed_dims(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(Dimension::fixed_value).collect()
    }
}

impl Index<usize> for Shape {
    type Output = Dimension;

    fn index(&self, index: usize) -> &Self::Output {
        &self.dims[index]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// Boolean.
    Bool,
    /// 8-bit unsigned integer.
    U8,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// IEEE half precision.
    F16,
    /// Brain floating point.
    BF16,
    /// IEEE single precision.
    F32,
    /// IEEE double precision.
    F64,
}

impl DType {
    /// Size of one element, in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }
}

/// Element type and logical shape of a tensor.
#[derive(new, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    /// Element type.
    pub dtype: DType,
    /// Logical (unsharded) shape.
    pub shape: Shape,
}

impl TensorType {
    /// Shorthand for a tensor with a fully static shape.
    pub fn fixed<S: AsRef<[usize]>>(dtype: DType, dims: S) -> Self {
        Self::new(dtype, Shape::fixed(dims))
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// The reason a type inference was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvalidType {
    reason: String,
}

impl InvalidType {
    /// Creates an invalid type carrying a human readable reason.
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the type is invalid.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The type of an IR value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Not yet known.
    Any,
    /// A tensor living on a single device.
    Tensor(TensorType),
    /// A tensor distributed over a placement.
    Distributed(DistributedType),
    /// A tuple of values.
    Tuple(Vec<IrType>),
    /// A rejected inference, with its diagnostic.
    Invalid(InvalidType),
}

impl IrType {
    /// Builds an [`IrType::Invalid`] carrying `reason`.
    pub fn invalid<S: Into<String>>(reason: S) -> Self {
        IrType::Invalid(InvalidType::new(reason))
    }

    /// Whether this is an [`IrType::Invalid`].
    pub fn is_invalid(&self) -> bool {
        matches!(self, IrType::Invalid(_))
    }

    /// The distributed type, if this is one.
    pub fn as_distributed(&self) -> Option<&DistributedType> {
        match self {
            IrType::Distributed(ty) => Some(ty),
            _ => None,
        }
    }

    /// The plain tensor type, if this is one.
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            IrType::Tensor(ty) => Some(ty),
            _ => None,
        }
    }
}

impl From<TensorType> for IrType {
    fn from(value: TensorType) -> Self {
        IrType::Tensor(value)
    }
}

impl From<DistributedType> for IrType {
    fn from(value: DistributedType) -> Self {
        IrType::Distributed(value)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Any => f.write_str("any"),
            IrType::Tensor(ty) => write!(f, "{ty}"),
            IrType::Distributed(ty) => write!(f, "{ty}"),
            IrType::Tuple(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
            IrType::Invalid(invalid) => write!(f, "invalid({})", invalid.reason()),
        }
    }
}
