use crate::assets::hierarchy::BoneHierarchy;
use crate::errors::{AnimError, Result};

/// Per-bone selection for blend nodes.
///
/// Each bone carries a weight in `[0, 1]`; zero means the bone is outside the
/// mask and blends pass the first input through untouched. Masks are immutable
/// once built and are shared between nodes via `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimMask {
    pub name: String,
    weights: Vec<f32>,
}

impl AnimMask {
    /// A mask selecting every bone at full weight.
    #[must_use]
    pub fn all(name: &str, bone_count: usize) -> Self {
        Self {
            name: name.to_string(),
            weights: vec![1.0; bone_count],
        }
    }

    /// A mask selecting no bone.
    #[must_use]
    pub fn none(name: &str, bone_count: usize) -> Self {
        Self {
            name: name.to_string(),
            weights: vec![0.0; bone_count],
        }
    }

    /// Selects the given bone indices at full weight. Out-of-range indices are ignored.
    #[must_use]
    pub fn from_indices(name: &str, bone_count: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::none(name, bone_count);
        for index in indices {
            if let Some(w) = mask.weights.get_mut(index) {
                *w = 1.0;
            }
        }
        mask
    }

    /// Selects bones by name. Every name must exist in the hierarchy.
    pub fn from_bone_names<S: AsRef<str>>(
        name: &str,
        hierarchy: &BoneHierarchy,
        bones: &[S],
    ) -> Result<Self> {
        let mut indices = Vec::with_capacity(bones.len());
        for bone in bones {
            let bone = bone.as_ref();
            let index = hierarchy
                .bone_index(bone)
                .ok_or_else(|| AnimError::UnknownBone {
                    skeleton: hierarchy.name().to_string(),
                    bone: bone.to_string(),
                })?;
            indices.push(index);
        }
        Ok(Self::from_indices(name, hierarchy.len(), indices))
    }

    /// Selects a bone and every descendant of it.
    pub fn from_subtree(name: &str, hierarchy: &BoneHierarchy, root_bone: &str) -> Result<Self> {
        let root = hierarchy
            .bone_index(root_bone)
            .ok_or_else(|| AnimError::UnknownBone {
                skeleton: hierarchy.name().to_string(),
                bone: root_bone.to_string(),
            })?;
        let indices = (0..hierarchy.len()).filter(|&i| hierarchy.is_descendant_of(i, root));
        Ok(Self::from_indices(name, hierarchy.len(), indices))
    }

    /// Returns a copy with one bone's weight replaced (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_weight(mut self, bone: usize, weight: f32) -> Self {
        if let Some(w) = self.weights.get_mut(bone) {
            *w = weight.clamp(0.0, 1.0);
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn weight(&self, bone: usize) -> f32 {
        self.weights.get(bone).copied().unwrap_or(0.0)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, bone: usize) -> bool {
        self.weight(bone) > 0.0
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_indices_ignores_out_of_range() {
        let mask = AnimMask::from_indices("upper", 3, [0, 2, 7]);
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert!(mask.contains(2));
        assert!(!mask.contains(7));
        assert_eq!(mask.bone_count(), 3);
    }

    #[test]
    fn test_with_weight_clamps() {
        let mask = AnimMask::none("m", 2).with_weight(1, 3.0);
        assert!((mask.weight(1) - 1.0).abs() < f32::EPSILON);
    }
}
