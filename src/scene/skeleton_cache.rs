use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::animation::blend_tree::Tick;
use crate::assets::definition::SkeletonDefinition;
use crate::assets::io::ReadOnlyFileSystem;
use crate::assets::skeleton_asset::SkeletonAsset;
use crate::errors::{AnimError, Result};
use crate::resources::anim_texture::AnimTexture;
use crate::scene::skeleton::OrderedSkeleton;
use crate::settings::AnimationSettings;

/// Session-wide skeleton registry.
///
/// Assets are keyed by definition file, runtime skeletons by unit type.
/// Both lookups are get-or-create. All skeletons share one [`AnimTexture`].
#[derive(Debug)]
pub struct SkeletonCache {
    settings: AnimationSettings,
    assets: FxHashMap<String, Arc<SkeletonAsset>>,
    // Registration order, so baking visits skeletons deterministically.
    ordered: Vec<OrderedSkeleton>,
    ordered_index: FxHashMap<String, usize>,
    texture: AnimTexture,
}

impl Default for SkeletonCache {
    fn default() -> Self {
        Self::new(AnimationSettings::default())
    }
}

impl SkeletonCache {
    #[must_use]
    pub fn new(settings: AnimationSettings) -> Self {
        let settings = settings.validated();
        let texture = AnimTexture::new(&settings, Some("SkeletonCache"));
        Self {
            settings,
            assets: FxHashMap::default(),
            ordered: Vec::new(),
            ordered_index: FxHashMap::default(),
            texture,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &AnimationSettings {
        &self.settings
    }

    /// Shared bone-matrix texture handed to the renderer.
    #[inline]
    #[must_use]
    pub fn anim_texture(&self) -> &AnimTexture {
        &self.texture
    }

    /// Key under which an asset file is registered.
    ///
    /// Definition blocks may list extra comma-separated fields after the
    /// file name; only the first one identifies the asset.
    #[must_use]
    pub fn asset_key(filename: &str) -> &str {
        filename.split(',').next().unwrap_or(filename).trim()
    }

    /// Returns the asset registered for `filename`, creating it on first use.
    ///
    /// Clips declared in `definition` but missing from an existing asset are
    /// loaded and added to it.
    pub fn update_skeleton_asset(
        &mut self,
        fs: &dyn ReadOnlyFileSystem,
        filename: &str,
        definition: &SkeletonDefinition,
        unit: &str,
    ) -> Result<Arc<SkeletonAsset>> {
        let key = Self::asset_key(filename);

        if definition.anims.is_empty() {
            log::warn!("Unit {unit} has no animations");
        }

        if let Some(asset) = self.assets.get(key) {
            log::debug!("Skeleton asset `{key}` already registered, reused by {unit}");
            for (sequence, clip_file) in &definition.anims {
                asset.try_add_animation(fs, &self.settings, sequence, clip_file)?;
            }
            return Ok(asset.clone());
        }

        let asset = Arc::new(SkeletonAsset::from_definition(
            fs,
            &self.settings,
            key,
            definition,
        )?);
        log::info!(
            "Registered skeleton asset `{key}`: {} bones, {} clips",
            asset.bone_count(),
            definition.anims.len()
        );
        self.assets.insert(key.to_string(), asset.clone());
        Ok(asset)
    }

    /// Returns the runtime skeleton of `unit`, building it on first use.
    pub fn update_ordered_skeleton(
        &mut self,
        asset: Arc<SkeletonAsset>,
        unit: &str,
        definition: &SkeletonDefinition,
    ) -> Result<&mut OrderedSkeleton> {
        if let Some(&index) = self.ordered_index.get(unit) {
            log::debug!("OrderedSkeleton `{unit}` already registered");
            return Ok(&mut self.ordered[index]);
        }

        let skeleton = OrderedSkeleton::new(unit, asset, definition, &self.texture)?;
        let index = self.ordered.len();
        self.ordered.push(skeleton);
        self.ordered_index.insert(unit.to_string(), index);
        Ok(&mut self.ordered[index])
    }

    pub fn get_skeleton_asset(&self, filename: &str) -> Result<Arc<SkeletonAsset>> {
        let key = Self::asset_key(filename);
        self.assets
            .get(key)
            .cloned()
            .ok_or_else(|| AnimError::UnknownSkeleton(key.to_string()))
    }

    pub fn get_ordered_skeleton(&self, unit: &str) -> Result<&OrderedSkeleton> {
        self.ordered_index
            .get(unit)
            .map(|&index| &self.ordered[index])
            .ok_or_else(|| AnimError::UnknownSkeleton(unit.to_string()))
    }

    pub fn get_ordered_skeleton_mut(&mut self, unit: &str) -> Result<&mut OrderedSkeleton> {
        match self.ordered_index.get(unit) {
            Some(&index) => Ok(&mut self.ordered[index]),
            None => Err(AnimError::UnknownSkeleton(unit.to_string())),
        }
    }

    #[must_use]
    pub fn has_skeleton_asset(&self, filename: &str) -> bool {
        self.assets.contains_key(Self::asset_key(filename))
    }

    #[must_use]
    pub fn has_ordered_skeleton(&self, unit: &str) -> bool {
        self.ordered_index.contains_key(unit)
    }

    /// Runtime skeletons in registration order.
    pub fn ordered_skeletons(&self) -> impl Iterator<Item = &OrderedSkeleton> {
        self.ordered.iter()
    }

    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn ordered_count(&self) -> usize {
        self.ordered.len()
    }

    /// Evaluates every skeleton for `tick`, then bakes them all.
    ///
    /// Baking only starts once every tree has been evaluated, so the texture
    /// never mixes poses of two ticks.
    pub fn tick(&mut self, tick: Tick, run: bool, step: i32) {
        for skeleton in &mut self.ordered {
            skeleton.update(tick, run, step);
        }
        self.update_all_skeleton_texture();
    }

    /// Writes every skeleton's current matrices into the shared texture.
    pub fn update_all_skeleton_texture(&self) {
        for skeleton in &self.ordered {
            skeleton.update_anim_texture_data(&self.texture);
        }
        self.texture.mark_baked();
    }
}
