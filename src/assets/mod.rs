pub mod io;
pub mod definition;
pub mod hierarchy;
pub mod anim_file;
pub mod skeleton_asset;

// Re-export common types
pub use io::{DirFileSystem, MemoryFileSystem, ReadOnlyFileSystem};
pub use definition::{
    BlendTreeDefinition, BoneDefinition, MaskDefinition, NodeDefinition, RestTransform,
    SkeletonDefinition,
};
pub use hierarchy::BoneHierarchy;
pub use anim_file::{SkeletalAnimReader, SkeletalAnimWriter};
pub use skeleton_asset::SkeletonAsset;
