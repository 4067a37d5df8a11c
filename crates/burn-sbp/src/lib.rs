#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Burn SBP sharding.
//!
//! Metadata describing how tensors are partitioned across a device mesh, the feasibility
//! checks deciding whether a partitioning is realizable, the candidate search primitives
//! used by auto-parallelization and the per-operator propagation rules.

extern crate alloc;

mod config;
mod error;

pub mod ir;
pub mod ops;
pub mod sharding;

pub use config::*;
pub use error::*;
