//! Skeleton Definitions
//!
//! Serde model of a unit's skeleton block: the bone hierarchy, the clip
//! files it references, reusable masks and the blend tree layout.
//!
//! ```json
//! {
//!   "bones": [
//!     { "name": "root" },
//!     { "name": "spine", "parent": "root" },
//!     { "name": "head", "parent": "spine", "rest": { "translation": [0, 1, 0] } }
//!   ],
//!   "anims": { "idle": "infantry-idle", "aim": "infantry-aim.anim" },
//!   "masks": { "upper": { "subtree": "spine" } },
//!   "blend_tree": {
//!     "root": "look",
//!     "nodes": [
//!       { "type": "clip", "name": "idle", "anim": "idle" },
//!       { "type": "clip", "name": "aim", "anim": "aim", "loop_mode": "once" },
//!       { "type": "blend2", "name": "look", "a": "idle", "b": "aim", "mask": "upper", "value": 0.5 }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use glam::{Quat, Vec3};
use serde::Deserialize;

use crate::animation::clip::LoopMode;
use crate::animation::transform::Transformation;
use crate::assets::io::ReadOnlyFileSystem;
use crate::errors::Result;

/// Already-resolved skeleton block of a unit definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkeletonDefinition {
    pub bones: Vec<BoneDefinition>,
    /// Sequence name → clip file path.
    pub anims: BTreeMap<String, String>,
    pub masks: BTreeMap<String, MaskDefinition>,
    pub blend_tree: Option<BlendTreeDefinition>,
}

impl SkeletonDefinition {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(fs: &dyn ReadOnlyFileSystem, path: &str) -> Result<Self> {
        let mut text = String::new();
        fs.open(path)?.read_to_string(&mut text)?;
        Self::from_json_str(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoneDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub rest: RestTransform,
}

impl BoneDefinition {
    #[must_use]
    pub fn new(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            rest: RestTransform::default(),
        }
    }
}

/// Bind-pose transform of a bone, as plain arrays.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RestTransform {
    pub scale: [f32; 3],
    /// x, y, z, w
    pub rotation: [f32; 4],
    pub translation: [f32; 3],
}

impl Default for RestTransform {
    fn default() -> Self {
        Self {
            scale: [1.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }
}

impl RestTransform {
    #[must_use]
    pub fn to_transformation(&self) -> Transformation {
        Transformation::new(
            Vec3::from_array(self.scale),
            Quat::from_array(self.rotation),
            Vec3::from_array(self.translation),
        )
    }
}

/// Bone selection of a named mask. `bones`, `subtree` and `weights` are
/// combined; explicit weights win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaskDefinition {
    pub bones: Vec<String>,
    pub subtree: Option<String>,
    pub weights: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlendTreeDefinition {
    pub root: String,
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDefinition {
    /// Outputs the skeleton's rest pose.
    Pose { name: String },
    /// Plays one registered clip.
    Clip {
        name: String,
        anim: String,
        #[serde(default)]
        loop_mode: LoopMode,
        #[serde(default)]
        start_frame: usize,
    },
    Blend2 {
        name: String,
        a: String,
        b: String,
        #[serde(default)]
        mask: Option<String>,
        #[serde(default)]
        value: f32,
    },
    Blend3 {
        name: String,
        mid: String,
        high: String,
        low: String,
        #[serde(default)]
        mask: Option<String>,
        #[serde(default)]
        value: f32,
    },
}

impl NodeDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Pose { name }
            | Self::Clip { name, .. }
            | Self::Blend2 { name, .. }
            | Self::Blend3 { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_definition() {
        let text = r#"{
            "bones": [
                { "name": "root" },
                { "name": "head", "parent": "root", "rest": { "translation": [0, 1, 0] } }
            ],
            "anims": { "idle": "idle.anim" },
            "masks": { "head": { "bones": ["head"] } },
            "blend_tree": {
                "root": "mix",
                "nodes": [
                    { "type": "pose", "name": "rest" },
                    { "type": "clip", "name": "idle", "anim": "idle", "loop_mode": "ping_pong" },
                    { "type": "blend2", "name": "mix", "a": "rest", "b": "idle", "mask": "head", "value": 0.25 }
                ]
            }
        }"#;

        let def = SkeletonDefinition::from_json_str(text).unwrap();
        assert_eq!(def.bones.len(), 2);
        assert_eq!(def.bones[1].parent.as_deref(), Some("root"));
        assert_eq!(def.bones[1].rest.translation, [0.0, 1.0, 0.0]);
        assert_eq!(def.bones[0].rest, RestTransform::default());
        assert_eq!(def.anims["idle"], "idle.anim");

        let tree = def.blend_tree.unwrap();
        assert_eq!(tree.root, "mix");
        assert!(matches!(
            tree.nodes[1],
            NodeDefinition::Clip { loop_mode: LoopMode::PingPong, .. }
        ));
        assert_eq!(tree.nodes[2].name(), "mix");
    }

    #[test]
    fn test_empty_definition() {
        let def = SkeletonDefinition::from_json_str("{}").unwrap();
        assert!(def.bones.is_empty());
        assert!(def.blend_tree.is_none());
    }
}
