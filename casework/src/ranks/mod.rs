//! Rank hierarchy and permission resolution
//!
//! ```text
//! RankTable (config) ──▶ RankDirectory ──▶ PermissionResolver ──▶ lifecycles
//!                                              ▲
//!                                   AccessPolicy (rule per Operation)
//! ```

pub mod directory;
pub mod policy;
pub mod resolver;

pub use directory::{CategoryRole, Rank, RankCategory, RankDirectory, RankSpec, RankTable, RankTableError};
pub use policy::{AccessPolicy, AccessRule, Operation};
pub use resolver::PermissionResolver;
