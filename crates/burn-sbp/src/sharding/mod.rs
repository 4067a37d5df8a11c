//! Distribution metadata: placements, SBP policies and distributed types, the feasibility
//! checks deciding whether a policy is realizable, and the candidate search primitives.

mod candidates;
mod distributed;
mod divide;
mod placement;
mod ranking;
mod sbp;

pub use candidates::*;
pub use distributed::*;
pub use divide::*;
pub use placement::*;
pub use ranking::*;
pub use sbp::*;
