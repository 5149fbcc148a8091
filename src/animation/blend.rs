use glam::Mat4;

use crate::animation::mask::AnimMask;
use crate::animation::transform::Transformation;
use crate::animation::values::Interpolatable;

/// Output of one blend tree node for one tick: a local transform per bone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendTreeNodeOutput {
    pub transforms: Vec<Transformation>,
}

impl BlendTreeNodeOutput {
    #[must_use]
    pub fn new(transforms: Vec<Transformation>) -> Self {
        Self { transforms }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Per-bone local 4x4 matrices.
    pub fn matrices(&self) -> impl Iterator<Item = Mat4> + '_ {
        self.transforms.iter().map(Transformation::to_matrix)
    }
}

/// Pose interpolation shared by every blend node.
pub struct BlendTreeUtil;

impl BlendTreeUtil {
    /// Blends pose `b` over pose `a`.
    ///
    /// Bones inside `mask` interpolate scale and translation linearly and
    /// rotation by shortest-arc slerp, with `weight * mask_weight`. Bones
    /// outside the mask copy `a`. The weight is not clamped.
    #[must_use]
    pub fn blend(
        a: &[Transformation],
        b: &[Transformation],
        weight: f32,
        mask: &AnimMask,
    ) -> BlendTreeNodeOutput {
        let mut out = BlendTreeNodeOutput::default();
        Self::blend_into(a, b, weight, mask, &mut out.transforms);
        out
    }

    /// Same as [`blend`](Self::blend), reusing `out`'s allocation.
    pub fn blend_into(
        a: &[Transformation],
        b: &[Transformation],
        weight: f32,
        mask: &AnimMask,
        out: &mut Vec<Transformation>,
    ) {
        out.clear();
        out.reserve(a.len());

        for (i, ta) in a.iter().enumerate() {
            let bone_weight = mask.weight(i);
            let blended = match b.get(i) {
                Some(tb) if bone_weight > 0.0 => {
                    Transformation::interpolate_linear(*ta, *tb, weight * bone_weight)
                }
                _ => *ta,
            };
            out.push(blended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_unmasked_bones_copy_first_pose() {
        let a = vec![Transformation::from_translation(Vec3::X); 2];
        let b = vec![Transformation::from_translation(Vec3::Y); 2];
        let mask = AnimMask::from_indices("m", 2, [1]);

        let out = BlendTreeUtil::blend(&a, &b, 1.0, &mask);
        assert_eq!(out.transforms[0], a[0]);
        assert!(out.transforms[1].translation.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_partial_mask_weight_scales_blend() {
        let a = vec![Transformation::IDENTITY];
        let b = vec![Transformation::from_translation(Vec3::new(4.0, 0.0, 0.0))];
        let mask = AnimMask::all("m", 1).with_weight(0, 0.5);

        let out = BlendTreeUtil::blend(&a, &b, 1.0, &mask);
        assert!(out.transforms[0].translation.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_shorter_second_pose_falls_back_to_first() {
        let a = vec![Transformation::from_rotation(Quat::from_rotation_z(1.0)); 3];
        let b = vec![Transformation::IDENTITY; 1];
        let mask = AnimMask::all("m", 3);

        let out = BlendTreeUtil::blend(&a, &b, 1.0, &mask);
        assert_eq!(out.len(), 3);
        assert_eq!(out.transforms[2], a[2]);
    }
}
