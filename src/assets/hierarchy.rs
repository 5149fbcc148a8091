use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::animation::transform::Transformation;
use crate::assets::definition::BoneDefinition;
use crate::errors::{AnimError, Result};

/// Bone hierarchy of a skeleton definition.
///
/// Bones are addressed by a stable index: the position of the bone in the
/// definition. Parents may be declared after their children; [`eval_order`]
/// lists indices so that every parent precedes its children.
///
/// [`eval_order`]: BoneHierarchy::eval_order
#[derive(Debug, Clone)]
pub struct BoneHierarchy {
    name: String,
    bone_names: Vec<String>,
    /// -1 for root bones
    parent_indices: Vec<i16>,
    bone_index: FxHashMap<String, usize>,
    rest_pose: Vec<Transformation>,
    eval_order: Vec<usize>,
    inverse_bind_matrices: Vec<Mat4>,
}

impl BoneHierarchy {
    pub fn new(name: &str, bones: &[BoneDefinition]) -> Result<Self> {
        let invalid = |reason: String| AnimError::InvalidSkeleton {
            skeleton: name.to_string(),
            reason,
        };

        if bones.len() > i16::MAX as usize {
            return Err(invalid(format!("too many bones ({})", bones.len())));
        }

        let mut bone_index = FxHashMap::default();
        for (i, bone) in bones.iter().enumerate() {
            if bone_index.insert(bone.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate bone name `{}`", bone.name)));
            }
        }

        let mut parent_indices = Vec::with_capacity(bones.len());
        for bone in bones {
            let parent = match &bone.parent {
                None => -1,
                Some(parent) => {
                    let index = bone_index.get(parent).copied().ok_or_else(|| {
                        invalid(format!("bone `{}` has unknown parent `{parent}`", bone.name))
                    })?;
                    index as i16
                }
            };
            parent_indices.push(parent);
        }

        let eval_order = Self::sort_parents_first(&parent_indices)
            .map_err(|bone| invalid(format!("parent cycle through bone `{}`", bones[bone].name)))?;

        let rest_pose: Vec<Transformation> = bones.iter().map(|b| b.rest.to_transformation()).collect();

        let mut hierarchy = Self {
            name: name.to_string(),
            bone_names: bones.iter().map(|b| b.name.clone()).collect(),
            parent_indices,
            bone_index,
            rest_pose,
            eval_order,
            inverse_bind_matrices: Vec::new(),
        };

        let mut world = vec![Mat4::IDENTITY; hierarchy.len()];
        hierarchy.compose_model_matrices(&hierarchy.rest_pose, &mut world);
        if let Some(bone) = world.iter().position(|m| {
            let det = m.determinant();
            det == 0.0 || !det.is_finite()
        }) {
            return Err(invalid(format!(
                "rest pose of bone `{}` is not invertible",
                hierarchy.bone_names[bone]
            )));
        }
        hierarchy.inverse_bind_matrices = world.iter().map(Mat4::inverse).collect();

        Ok(hierarchy)
    }

    /// Depth-first ordering; returns the offending bone on a parent cycle.
    fn sort_parents_first(parents: &[i16]) -> std::result::Result<Vec<usize>, usize> {
        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state = vec![0u8; parents.len()];
        let mut order = Vec::with_capacity(parents.len());

        for start in 0..parents.len() {
            let mut chain = Vec::new();
            let mut current = start;
            loop {
                match state[current] {
                    2 => break,
                    1 => return Err(current),
                    _ => {}
                }
                state[current] = 1;
                chain.push(current);
                match usize::try_from(parents[current]) {
                    Ok(parent) => current = parent,
                    Err(_) => break,
                }
            }
            for &bone in chain.iter().rev() {
                state[bone] = 2;
                order.push(bone);
            }
        }

        Ok(order)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bone_names.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bone_names.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bone_index.get(name).copied()
    }

    #[must_use]
    pub fn bone_name(&self, index: usize) -> Option<&str> {
        self.bone_names.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parent_indices
            .get(index)
            .and_then(|&p| usize::try_from(p).ok())
    }

    pub fn parent_indices(&self) -> &[i16] {
        &self.parent_indices
    }

    pub fn rest_pose(&self) -> &[Transformation] {
        &self.rest_pose
    }

    pub fn eval_order(&self) -> &[usize] {
        &self.eval_order
    }

    pub fn inverse_bind_matrices(&self) -> &[Mat4] {
        &self.inverse_bind_matrices
    }

    /// True if `bone` is `ancestor` or lies below it.
    #[must_use]
    pub fn is_descendant_of(&self, bone: usize, ancestor: usize) -> bool {
        let mut current = Some(bone);
        // Parent chains are acyclic, bounded by len() anyway.
        for _ in 0..=self.len() {
            match current {
                Some(b) if b == ancestor => return true,
                Some(b) => current = self.parent(b),
                None => return false,
            }
        }
        false
    }

    /// Composes local transforms into model-space matrices.
    ///
    /// `pose` and `out` must both hold one entry per bone.
    pub fn compose_model_matrices(&self, pose: &[Transformation], out: &mut [Mat4]) {
        debug_assert_eq!(pose.len(), self.len());
        debug_assert_eq!(out.len(), self.len());

        for &bone in &self.eval_order {
            let local = pose[bone].to_matrix();
            out[bone] = match self.parent(bone) {
                Some(parent) => out[parent] * local,
                None => local,
            };
        }
    }
}
