use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::animation::blend_tree::{BlendTree, Tick};
use crate::animation::builder::BlendTreeBuilder;
use crate::animation::mask::AnimMask;
use crate::animation::transform::Transformation;
use crate::assets::definition::{MaskDefinition, NodeDefinition, SkeletonDefinition};
use crate::assets::hierarchy::BoneHierarchy;
use crate::assets::skeleton_asset::SkeletonAsset;
use crate::errors::{AnimError, Result};
use crate::resources::anim_texture::{AnimTexture, AnimTextureRegion};

/// Name of the implicit node used when a definition has no blend tree.
pub const REST_POSE_NODE: &str = "rest";

/// Runtime skeleton of one unit type.
///
/// Binds a shared [`SkeletonAsset`] to the unit's blend tree, keeps the pose
/// evaluated for the latest tick and owns a region of the shared
/// [`AnimTexture`].
#[derive(Debug)]
pub struct OrderedSkeleton {
    pub name: String,
    asset: Arc<SkeletonAsset>,
    tree: BlendTree,
    region: AnimTextureRegion,

    // === Runtime Data ===
    // Local pose of the last evaluated tick
    current_pose: Vec<Transformation>,
    // Model-space bone matrices
    model_matrices: Vec<Mat4>,
    // model * inverse bind; this is what gets baked
    skin_matrices: Vec<Mat4>,
    last_tick: Option<Tick>,
}

impl OrderedSkeleton {
    /// Builds the blend tree described by `definition` and reserves a texture region.
    pub fn new(
        name: &str,
        asset: Arc<SkeletonAsset>,
        definition: &SkeletonDefinition,
        texture: &AnimTexture,
    ) -> Result<Self> {
        let tree = build_blend_tree(&asset, definition)?;
        Ok(Self::with_tree(name, asset, tree, texture))
    }

    /// Uses an already assembled tree.
    #[must_use]
    pub fn with_tree(
        name: &str,
        asset: Arc<SkeletonAsset>,
        tree: BlendTree,
        texture: &AnimTexture,
    ) -> Self {
        let hierarchy = asset.hierarchy();
        let bone_count = hierarchy.len();
        let region = texture.reserve(bone_count);

        let current_pose = hierarchy.rest_pose().to_vec();
        let mut model_matrices = vec![Mat4::IDENTITY; bone_count];
        hierarchy.compose_model_matrices(&current_pose, &mut model_matrices);
        let skin_matrices = vec![Mat4::IDENTITY; bone_count];

        log::debug!(
            "OrderedSkeleton `{name}` bound to `{}`: {bone_count} bones at texture offset {}",
            asset.name,
            region.offset
        );

        let mut skeleton = Self {
            name: name.to_string(),
            asset,
            tree,
            region,
            current_pose,
            model_matrices,
            skin_matrices,
            last_tick: None,
        };
        skeleton.compute_skin_matrices();
        skeleton
    }

    #[inline]
    #[must_use]
    pub fn asset(&self) -> &Arc<SkeletonAsset> {
        &self.asset
    }

    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &BoneHierarchy {
        self.asset.hierarchy()
    }

    #[inline]
    #[must_use]
    pub fn tree(&self) -> &BlendTree {
        &self.tree
    }

    #[inline]
    pub fn tree_mut(&mut self) -> &mut BlendTree {
        &mut self.tree
    }

    #[inline]
    #[must_use]
    pub fn region(&self) -> AnimTextureRegion {
        self.region
    }

    /// Instance index the mesh renderer uses to find this skeleton's matrices.
    #[inline]
    #[must_use]
    pub fn draw_id(&self) -> u32 {
        self.region.draw_id
    }

    /// Offset of the first bone matrix in the shared texture.
    #[inline]
    #[must_use]
    pub fn texture_offset(&self) -> usize {
        self.region.offset
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.region.len
    }

    #[inline]
    #[must_use]
    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn current_pose(&self) -> &[Transformation] {
        &self.current_pose
    }

    pub fn model_matrices(&self) -> &[Mat4] {
        &self.model_matrices
    }

    pub fn skin_matrices(&self) -> &[Mat4] {
        &self.skin_matrices
    }

    /// Sets the weight of a named blend node.
    pub fn set_blend_value(&mut self, node: &str, value: f32) -> Result<()> {
        let key = self
            .tree
            .node(node)
            .ok_or_else(|| AnimError::UnknownNode(node.to_string()))?;
        self.tree.set_blend_value(key, value)
    }

    /// Evaluates the blend tree for `tick` and refreshes the bone matrices.
    ///
    /// Calling it again with the same tick does no work.
    pub fn update(&mut self, tick: Tick, run: bool, step: i32) {
        if self.last_tick == Some(tick) {
            return;
        }

        let output = self.tree.update(tick, run, step);
        let bone_count = self.region.len;
        let rest = self.asset.hierarchy().rest_pose();

        // Short outputs are padded with the rest pose.
        let taken = output.transforms.len().min(bone_count);
        self.current_pose.clear();
        self.current_pose.extend_from_slice(&output.transforms[..taken]);
        self.current_pose.extend_from_slice(&rest[taken..bone_count]);

        self.asset
            .hierarchy()
            .compose_model_matrices(&self.current_pose, &mut self.model_matrices);
        self.compute_skin_matrices();
        self.last_tick = Some(tick);
    }

    fn compute_skin_matrices(&mut self) {
        let ibm = self.asset.hierarchy().inverse_bind_matrices();
        for (i, skin) in self.skin_matrices.iter_mut().enumerate() {
            *skin = self.model_matrices[i] * ibm[i];
        }
    }

    /// Bakes the current skinning matrices into this skeleton's texture region.
    pub fn update_anim_texture_data(&self, texture: &AnimTexture) {
        texture.write_region(self.region, &self.skin_matrices);
    }
}

/// Assembles the blend tree of `definition` against `asset`'s bones and clips.
pub fn build_blend_tree(asset: &SkeletonAsset, definition: &SkeletonDefinition) -> Result<BlendTree> {
    let hierarchy = asset.hierarchy();
    let mut builder = BlendTreeBuilder::new(hierarchy.rest_pose().to_vec());

    let Some(tree_def) = &definition.blend_tree else {
        return builder.pose(REST_POSE_NODE).build(REST_POSE_NODE);
    };

    let mut masks: FxHashMap<&str, Arc<AnimMask>> = FxHashMap::default();
    for (name, mask_def) in &definition.masks {
        masks.insert(name.as_str(), Arc::new(build_mask(name, hierarchy, mask_def)?));
    }
    let full_mask = Arc::new(AnimMask::all("all", hierarchy.len()));
    let resolve_mask = |mask: &Option<String>| -> Result<Arc<AnimMask>> {
        match mask {
            None => Ok(full_mask.clone()),
            Some(name) => masks
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| AnimError::UnknownMask(name.clone())),
        }
    };

    for node in &tree_def.nodes {
        builder = match node {
            NodeDefinition::Pose { name } => builder.pose(name),
            NodeDefinition::Clip {
                name,
                anim,
                loop_mode,
                start_frame,
            } => {
                let clip = asset
                    .animation(anim)
                    .ok_or_else(|| AnimError::UnknownClip(anim.clone()))?;
                builder.clip_at(name, clip, *loop_mode, *start_frame)
            }
            NodeDefinition::Blend2 {
                name,
                a,
                b,
                mask,
                value,
            } => builder.blend2(name, a, b, resolve_mask(mask)?, *value),
            NodeDefinition::Blend3 {
                name,
                mid,
                high,
                low,
                mask,
                value,
            } => builder.blend3(name, mid, high, low, resolve_mask(mask)?, *value),
        };
    }

    builder.build(&tree_def.root)
}

fn build_mask(name: &str, hierarchy: &BoneHierarchy, def: &MaskDefinition) -> Result<AnimMask> {
    let mut mask = AnimMask::from_bone_names(name, hierarchy, &def.bones)?;

    if let Some(root) = &def.subtree {
        let subtree = AnimMask::from_subtree(name, hierarchy, root)?;
        for bone in 0..hierarchy.len() {
            if subtree.contains(bone) {
                mask = mask.with_weight(bone, 1.0);
            }
        }
    }

    for (bone, &weight) in &def.weights {
        let index = hierarchy.bone_index(bone).ok_or_else(|| AnimError::UnknownBone {
            skeleton: hierarchy.name().to_string(),
            bone: bone.clone(),
        })?;
        mask = mask.with_weight(index, weight);
    }

    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::clip::{LoopMode, SkeletalAnim};
    use crate::animation::transform::Frame;
    use crate::assets::definition::{BlendTreeDefinition, BoneDefinition};
    use crate::settings::AnimationSettings;
    use glam::{Quat, Vec3};

    fn asset() -> Arc<SkeletonAsset> {
        let mut spine = BoneDefinition::new("spine", Some("root"));
        spine.rest.translation = [0.0, 1.0, 0.0];
        let bones = vec![BoneDefinition::new("root", None), spine];
        let asset = SkeletonAsset::new("infantry", &bones).unwrap();

        let turn = Transformation::from_rotation(Quat::from_rotation_y(1.0));
        let rest = asset.hierarchy().rest_pose().to_vec();
        let frame = Frame::from_transforms(vec![turn, rest[1]]);
        asset.add_animation(SkeletalAnim::new("turn".into(), "turn".into(), vec![frame]));
        Arc::new(asset)
    }

    fn texture() -> AnimTexture {
        AnimTexture::new(&AnimationSettings::default(), None)
    }

    #[test]
    fn test_rest_pose_skins_to_identity() {
        let tex = texture();
        let mut skel = OrderedSkeleton::new("e1", asset(), &SkeletonDefinition::default(), &tex).unwrap();
        skel.update(1, true, 1);

        for m in skel.skin_matrices() {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        }
        assert_eq!(skel.last_tick(), Some(1));
        assert_eq!(skel.tree().node_name(skel.tree().root()), Some(REST_POSE_NODE));
    }

    #[test]
    fn test_clip_pose_reaches_texture() {
        let tex = texture();
        let def = SkeletonDefinition {
            blend_tree: Some(BlendTreeDefinition {
                root: "turn".into(),
                nodes: vec![NodeDefinition::Clip {
                    name: "turn".into(),
                    anim: "turn".into(),
                    loop_mode: LoopMode::Loop,
                    start_frame: 0,
                }],
            }),
            ..Default::default()
        };
        let mut skel = OrderedSkeleton::new("e1", asset(), &def, &tex).unwrap();
        skel.update(1, true, 1);
        skel.update_anim_texture_data(&tex);

        let baked = tex.region_matrices(skel.region());
        let expected_root = Mat4::from_quat(Quat::from_rotation_y(1.0));
        assert!(baked[0].abs_diff_eq(expected_root, 1e-5));
        // Child follows the parent's rotation.
        let head = skel.model_matrices()[1].transform_point3(Vec3::ZERO);
        assert!(head.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_unknown_clip_and_mask() {
        let tex = texture();
        let missing_clip = SkeletonDefinition {
            blend_tree: Some(BlendTreeDefinition {
                root: "walk".into(),
                nodes: vec![NodeDefinition::Clip {
                    name: "walk".into(),
                    anim: "walk".into(),
                    loop_mode: LoopMode::Loop,
                    start_frame: 0,
                }],
            }),
            ..Default::default()
        };
        assert!(matches!(
            OrderedSkeleton::new("e1", asset(), &missing_clip, &tex),
            Err(AnimError::UnknownClip(name)) if name == "walk"
        ));

        let missing_mask = SkeletonDefinition {
            blend_tree: Some(BlendTreeDefinition {
                root: "mix".into(),
                nodes: vec![
                    NodeDefinition::Pose { name: "rest".into() },
                    NodeDefinition::Blend2 {
                        name: "mix".into(),
                        a: "rest".into(),
                        b: "rest".into(),
                        mask: Some("upper".into()),
                        value: 0.5,
                    },
                ],
            }),
            ..Default::default()
        };
        assert!(matches!(
            OrderedSkeleton::new("e1", asset(), &missing_mask, &tex),
            Err(AnimError::UnknownMask(name)) if name == "upper"
        ));
    }

    #[test]
    fn test_mask_definition_combines_sources() {
        let asset = asset();
        let def = MaskDefinition {
            bones: vec![],
            subtree: Some("spine".into()),
            weights: [("root".to_string(), 0.25)].into_iter().collect(),
        };
        let mask = build_mask("upper", asset.hierarchy(), &def).unwrap();
        assert_eq!(mask.weights(), &[0.25, 1.0]);
    }
}
