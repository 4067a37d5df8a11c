//! The slice of the compiler IR the sharding subsystem depends on.
//!
//! Only what the sharding rules need is modelled here: dimensions that may be dynamic,
//! element types with a byte size, the [`IrType`] sum type and a small expression tree able
//! to carry [`Boxing`] nodes.

mod expr;
mod types;

pub use expr::*;
pub use types::*;
