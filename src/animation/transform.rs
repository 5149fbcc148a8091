use glam::{Mat4, Quat, Vec3};

/// One bone's local transform at one instant.
///
/// The rotation is kept unit length: every constructor and every blend
/// normalizes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for Transformation {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transformation {
    pub const IDENTITY: Self = Self {
        scale: Vec3::ONE,
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Builds a transformation, normalizing `rotation`.
    ///
    /// A degenerate (zero length or non-finite) rotation is replaced by identity.
    #[must_use]
    pub fn new(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self {
            scale,
            rotation: normalize_or_identity(rotation),
            translation,
        }
    }

    #[inline]
    #[must_use]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self::new(Vec3::ONE, rotation, Vec3::ZERO)
    }

    #[inline]
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Local matrix, applied as scale, then rotation, then translation.
    #[inline]
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Replaces the rotation, keeping it unit length.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = normalize_or_identity(rotation);
    }

    /// Component-wise comparison with a tolerance. Rotations `q` and `-q`
    /// describe the same orientation and compare equal.
    #[must_use]
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.scale.abs_diff_eq(other.scale, max_abs_diff)
            && self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && (self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
                || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff))
    }
}

pub(crate) fn normalize_or_identity(q: Quat) -> Quat {
    let len_sq = q.length_squared();
    if len_sq.is_finite() && len_sq > f32::EPSILON {
        q * len_sq.sqrt().recip()
    } else {
        Quat::IDENTITY
    }
}

/// One pose of a clip: a transform slot per canonical bone index of the
/// owning skeleton.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub trans: Vec<Transformation>,
}

impl Frame {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            trans: vec![Transformation::IDENTITY; size],
        }
    }

    #[must_use]
    pub fn from_transforms(trans: Vec<Transformation>) -> Self {
        Self { trans }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.trans.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trans.is_empty()
    }
}
