//! Animation Settings
//!
//! Process-wide knobs for clip lookup and the layout of the shared
//! bone-matrix texture.
//!
//! ```rust,ignore
//! use skelblend::settings::AnimationSettings;
//!
//! let settings = AnimationSettings {
//!     texture_width: 2048,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

use crate::errors::Result;

/// Number of RGBA32F texels occupied by one 4x4 bone matrix.
pub const TEXELS_PER_MATRIX: u32 = 4;

/// Global animation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Extension tried when a clip file is not found under its exact name.
    pub anim_extension: String,
    /// Width of the bone-matrix texture in texels.
    pub texture_width: u32,
    /// Number of matrices the texture is allocated for up front.
    pub initial_texture_matrices: usize,
}

impl Default for AnimationSettings {
    #[inline]
    fn default() -> Self {
        Self {
            anim_extension: "anim".to_string(),
            texture_width: 1024,
            initial_texture_matrices: 256,
        }
    }
}

impl AnimationSettings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        Ok(settings.validated())
    }

    /// Returns a copy whose texture width holds a whole number of matrices.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let width = self.texture_width.max(TEXELS_PER_MATRIX);
        let aligned = width.div_ceil(TEXELS_PER_MATRIX) * TEXELS_PER_MATRIX;
        if aligned != self.texture_width {
            log::warn!(
                "Anim texture width {} is not a multiple of {TEXELS_PER_MATRIX}, using {aligned}",
                self.texture_width
            );
            self.texture_width = aligned;
        }
        self
    }

    /// Matrices stored on one texture row.
    #[inline]
    #[must_use]
    pub fn matrices_per_row(&self) -> u32 {
        self.texture_width / TEXELS_PER_MATRIX
    }

    /// Clip file name with the configured extension appended.
    #[must_use]
    pub fn with_anim_extension(&self, name: &str) -> String {
        format!("{name}.{}", self.anim_extension)
    }
}
