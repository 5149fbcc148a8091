use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::animation::clip::SkeletalAnim;
use crate::assets::definition::{BoneDefinition, SkeletonDefinition};
use crate::assets::hierarchy::BoneHierarchy;
use crate::assets::io::ReadOnlyFileSystem;
use crate::errors::Result;
use crate::settings::AnimationSettings;

/// Shared skeleton definition: bone hierarchy plus the named clips loaded
/// against it.
///
/// One asset exists per distinct definition file and is shared by every
/// [`OrderedSkeleton`](crate::scene::skeleton::OrderedSkeleton) built from it.
/// Clips can be added after the asset is shared, hence the lock.
#[derive(Debug)]
pub struct SkeletonAsset {
    pub id: Uuid,
    pub name: String,
    hierarchy: BoneHierarchy,
    anims: RwLock<FxHashMap<String, Arc<SkeletalAnim>>>,
}

impl SkeletonAsset {
    pub fn new(name: &str, bones: &[BoneDefinition]) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            hierarchy: BoneHierarchy::new(name, bones)?,
            anims: RwLock::default(),
        })
    }

    /// Builds the hierarchy and loads every clip declared in `definition`.
    pub fn from_definition(
        fs: &dyn ReadOnlyFileSystem,
        settings: &AnimationSettings,
        name: &str,
        definition: &SkeletonDefinition,
    ) -> Result<Self> {
        let asset = Self::new(name, &definition.bones)?;
        for (sequence, filename) in &definition.anims {
            asset.try_add_animation(fs, settings, sequence, filename)?;
        }
        Ok(asset)
    }

    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &BoneHierarchy {
        &self.hierarchy
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.hierarchy.len()
    }

    /// Loads `filename` under `sequence` unless that sequence is already
    /// present, in which case the existing clip is returned.
    pub fn try_add_animation(
        &self,
        fs: &dyn ReadOnlyFileSystem,
        settings: &AnimationSettings,
        sequence: &str,
        filename: &str,
    ) -> Result<Arc<SkeletalAnim>> {
        if let Some(existing) = self.animation(sequence) {
            log::debug!("Skeleton `{}` already has animation `{sequence}`", self.name);
            return Ok(existing);
        }

        let clip = Arc::new(SkeletalAnim::load(
            fs,
            settings,
            sequence,
            filename,
            &self.hierarchy,
        )?);

        // Another caller may have raced us between the read and write lock.
        let mut anims = self.anims.write();
        Ok(anims
            .entry(sequence.to_string())
            .or_insert(clip)
            .clone())
    }

    /// Registers an already decoded clip under its sequence name.
    pub fn add_animation(&self, clip: SkeletalAnim) -> Arc<SkeletalAnim> {
        let mut anims = self.anims.write();
        anims
            .entry(clip.sequence.clone())
            .or_insert_with(|| Arc::new(clip))
            .clone()
    }

    #[must_use]
    pub fn animation(&self, sequence: &str) -> Option<Arc<SkeletalAnim>> {
        self.anims.read().get(sequence).cloned()
    }

    #[must_use]
    pub fn has_animation(&self, sequence: &str) -> bool {
        self.anims.read().contains_key(sequence)
    }

    /// Sorted sequence names.
    #[must_use]
    pub fn animation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.anims.read().keys().cloned().collect();
        names.sort();
        names
    }
}
