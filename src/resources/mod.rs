//! GPU-visible resources
//!
//! Currently only the shared bone-matrix texture:
//! - AnimTexture: matrix buffer shared by every skeleton instance

pub mod anim_texture;

pub use anim_texture::{AnimTexture, AnimTextureData, AnimTextureRegion};
