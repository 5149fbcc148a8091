#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod errors;
pub mod settings;
pub mod animation;
pub mod assets;
pub mod resources;
pub mod scene;

pub use errors::{AnimError, Result};
pub use settings::AnimationSettings;
pub use animation::{
    AnimMask, BlendNodeKey, BlendTree, BlendTreeBuilder, BlendTreeNodeOutput, BlendTreeUtil,
    Frame, LoopMode, SkeletalAnim, Tick, Transformation,
};
pub use assets::{
    BoneDefinition, BoneHierarchy, DirFileSystem, MemoryFileSystem, ReadOnlyFileSystem,
    SkeletalAnimReader, SkeletalAnimWriter, SkeletonAsset, SkeletonDefinition,
};
pub use resources::{AnimTexture, AnimTextureRegion};
pub use scene::{OrderedSkeleton, SkeletonCache};
