mod values;
pub mod transform;
pub mod clip;
pub mod mask;
pub mod blend;
pub mod blend_tree;
pub mod builder;

pub use values::Interpolatable;
pub use transform::{Frame, Transformation};
pub use clip::{LoopMode, SkeletalAnim};
pub use mask::AnimMask;
pub use blend::{BlendTreeNodeOutput, BlendTreeUtil};
pub use blend_tree::{Blend2, Blend3, BlendNodeKey, BlendNodeKind, BlendTree, ClipNode, Tick};
pub use builder::BlendTreeBuilder;
