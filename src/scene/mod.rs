//! Skeleton runtime
//!
//! - OrderedSkeleton: one unit type's skeleton instance (blend tree + current pose)
//! - SkeletonCache: session registry; evaluates and bakes every tick

pub mod skeleton;
pub mod skeleton_cache;

pub use skeleton::{OrderedSkeleton, REST_POSE_NODE};
pub use skeleton_cache::SkeletonCache;
