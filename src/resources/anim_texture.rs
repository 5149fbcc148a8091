use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Mat4;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::settings::{AnimationSettings, TEXELS_PER_MATRIX};

// Global texture ID generator
static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(0);

/// Contiguous range of bone matrices owned by one skeleton instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimTextureRegion {
    /// First matrix of the region.
    pub offset: usize,
    /// Number of matrices (bones).
    pub len: usize,
    /// Instance index handed to the instanced mesh renderer.
    pub draw_id: u32,
}

#[derive(Debug)]
struct AnimTextureInner {
    matrices: Vec<Mat4>,
    allocated: usize,
    regions: u32,
}

#[derive(Debug)]
pub struct AnimTextureData {
    pub id: u64,
    pub label: String,
    /// Texture row width in RGBA32F texels.
    pub texture_width: u32,
    version: AtomicU64,
    inner: RwLock<AnimTextureInner>,
}

/// Shared bone-matrix texture.
///
/// CPU copy of the RGBA32F texture the instanced skinning shader reads. Each
/// matrix is four consecutive texels (columns). The renderer holds a clone of
/// this handle and re-uploads whenever [`version`](Self::version) changes.
#[derive(Debug, Clone)]
pub struct AnimTexture(Arc<AnimTextureData>);

impl PartialEq for AnimTexture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for AnimTexture {}

impl AnimTexture {
    #[must_use]
    pub fn new(settings: &AnimationSettings, label: Option<&str>) -> Self {
        let settings = settings.clone().validated();
        Self(Arc::new(AnimTextureData {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            label: label.unwrap_or("BoneAnimTexture").to_string(),
            texture_width: settings.texture_width,
            version: AtomicU64::new(0),
            inner: RwLock::new(AnimTextureInner {
                matrices: vec![Mat4::IDENTITY; settings.initial_texture_matrices],
                allocated: 0,
                regions: 0,
            }),
        }))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Bumped once per bake.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.0.version.load(Ordering::Relaxed)
    }

    /// Reserves `bone_count` contiguous matrices, growing the texture if needed.
    pub fn reserve(&self, bone_count: usize) -> AnimTextureRegion {
        let mut inner = self.0.inner.write();

        let offset = inner.allocated;
        let end = offset + bone_count;
        if end > inner.matrices.len() {
            let new_len = end.max(inner.matrices.len() * 2).max(1);
            log::debug!(
                "Growing `{}` from {} to {new_len} matrices",
                self.0.label,
                inner.matrices.len()
            );
            inner.matrices.resize(new_len, Mat4::IDENTITY);
        }
        inner.allocated = end;

        let draw_id = inner.regions;
        inner.regions += 1;

        AnimTextureRegion {
            offset,
            len: bone_count,
            draw_id,
        }
    }

    /// Writes one region's matrices in a single batch.
    ///
    /// Extra input matrices are ignored; missing ones leave the previous
    /// contents in place.
    pub fn write_region(&self, region: AnimTextureRegion, matrices: &[Mat4]) {
        if matrices.len() != region.len {
            log::warn!(
                "`{}`: region {} expects {} matrices, got {}",
                self.0.label,
                region.draw_id,
                region.len,
                matrices.len()
            );
        }

        let mut inner = self.0.inner.write();
        let count = region.len.min(matrices.len());
        let Some(dst) = inner.matrices.get_mut(region.offset..region.offset + count) else {
            log::warn!("`{}`: region {} is out of bounds", self.0.label, region.draw_id);
            return;
        };
        dst.copy_from_slice(&matrices[..count]);
    }

    /// Marks the end of a bake; the renderer picks the new data up.
    pub(crate) fn mark_baked(&self) {
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Matrices reserved so far.
    #[must_use]
    pub fn allocated_matrices(&self) -> usize {
        self.0.inner.read().allocated
    }

    /// Matrices the texture currently has room for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.0.inner.read().matrices.len()
    }

    /// Width and height of the backing texture in texels.
    #[must_use]
    pub fn texel_size(&self) -> (u32, u32) {
        let texels = self.capacity() as u64 * u64::from(TEXELS_PER_MATRIX);
        let width = u64::from(self.0.texture_width);
        (self.0.texture_width, texels.div_ceil(width).max(1) as u32)
    }

    /// Reads the whole matrix array.
    pub fn read_matrices(&self) -> MappedRwLockReadGuard<'_, [Mat4]> {
        RwLockReadGuard::map(self.0.inner.read(), |inner| inner.matrices.as_slice())
    }

    /// Reads one region.
    #[must_use]
    pub fn region_matrices(&self, region: AnimTextureRegion) -> Vec<Mat4> {
        let inner = self.0.inner.read();
        inner
            .matrices
            .get(region.offset..region.offset + region.len)
            .map(<[Mat4]>::to_vec)
            .unwrap_or_default()
    }

    /// Raw texel bytes for upload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let inner = self.0.inner.read();
        bytemuck::cast_slice::<Mat4, u8>(inner.matrices.as_slice()).to_vec()
    }
}

impl std::ops::Deref for AnimTexture {
    type Target = AnimTextureData;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(initial: usize) -> AnimationSettings {
        AnimationSettings {
            texture_width: 16,
            initial_texture_matrices: initial,
            ..Default::default()
        }
    }

    #[test]
    fn test_regions_are_contiguous() {
        let tex = AnimTexture::new(&settings(8), None);
        let a = tex.reserve(3);
        let b = tex.reserve(2);
        assert_eq!((a.offset, a.len, a.draw_id), (0, 3, 0));
        assert_eq!((b.offset, b.len, b.draw_id), (3, 2, 1));
        assert_eq!(tex.allocated_matrices(), 5);
    }

    #[test]
    fn test_grows_and_keeps_data() {
        let tex = AnimTexture::new(&settings(2), None);
        let a = tex.reserve(2);
        let m = Mat4::from_translation(glam::Vec3::X);
        tex.write_region(a, &[m, m]);

        let b = tex.reserve(5);
        assert!(tex.capacity() >= 7);
        assert_eq!(tex.region_matrices(a), vec![m, m]);
        assert_eq!(tex.region_matrices(b), vec![Mat4::IDENTITY; 5]);
    }

    #[test]
    fn test_texel_size_and_bytes() {
        let tex = AnimTexture::new(&settings(8), None);
        // 8 matrices * 4 texels / 16 wide
        assert_eq!(tex.texel_size(), (16, 2));
        assert_eq!(tex.to_bytes().len(), 8 * 64);
    }
}
