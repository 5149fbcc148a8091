//! Skeleton Registry Tests
//!
//! Tests for:
//! - SkeletonAsset / OrderedSkeleton get-or-create idempotency
//! - Definition-driven blend trees (JSON) and runtime blend control
//! - Lazy clip registration on shared assets
//! - Baking skinning matrices into the shared AnimTexture
//! - Error propagation for missing clips, masks and skeletons

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use skelblend::animation::{Frame, Transformation};
use skelblend::assets::{MemoryFileSystem, SkeletalAnimWriter, SkeletonDefinition};
use skelblend::errors::AnimError;
use skelblend::scene::SkeletonCache;
use skelblend::settings::AnimationSettings;

const EPSILON: f32 = 1e-5;

const INFANTRY: &str = r#"{
    "bones": [
        { "name": "root" },
        { "name": "spine", "parent": "root", "rest": { "translation": [0, 1, 0] } },
        { "name": "head", "parent": "spine", "rest": { "translation": [0, 0.5, 0] } }
    ],
    "anims": { "stand": "e1-stand", "aim": "e1-aim.anim" },
    "masks": { "upper": { "subtree": "spine" } },
    "blend_tree": {
        "root": "look",
        "nodes": [
            { "type": "clip", "name": "stand", "anim": "stand" },
            { "type": "clip", "name": "aim", "anim": "aim", "loop_mode": "once" },
            { "type": "blend2", "name": "look", "a": "stand", "b": "aim", "mask": "upper", "value": 0.0 }
        ]
    }
}"#;

fn rest() -> Vec<Transformation> {
    vec![
        Transformation::IDENTITY,
        Transformation::from_translation(Vec3::Y),
        Transformation::from_translation(Vec3::new(0.0, 0.5, 0.0)),
    ]
}

fn aim_pose() -> Vec<Transformation> {
    let mut pose = rest();
    pose[1].set_rotation(Quat::from_rotation_z(FRAC_PI_2));
    pose
}

fn clip_bytes(name: &str, pose: Vec<Transformation>) -> Vec<u8> {
    let frames = vec![Frame::from_transforms(pose)];
    SkeletalAnimWriter::to_bytes(name, &["root", "spine", "head"], &frames).unwrap()
}

fn fs() -> MemoryFileSystem {
    let mut fs = MemoryFileSystem::new();
    fs.insert("e1-stand.anim", clip_bytes("stand", rest()));
    fs.insert("e1-aim.anim", clip_bytes("aim", aim_pose()));
    fs
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registered(cache: &mut SkeletonCache, unit: &str) {
    init_logger();
    let def = SkeletonDefinition::from_json_str(INFANTRY).unwrap();
    let asset = cache
        .update_skeleton_asset(&fs(), "infantry.json", &def, unit)
        .unwrap();
    cache.update_ordered_skeleton(asset, unit, &def).unwrap();
}

// ============================================================================
// Registry Idempotency
// ============================================================================

#[test]
fn asset_registration_is_idempotent() {
    let mut cache = SkeletonCache::default();
    let def = SkeletonDefinition::from_json_str(INFANTRY).unwrap();

    let first = cache.update_skeleton_asset(&fs(), "infantry.json", &def, "e1").unwrap();
    let second = cache
        .update_skeleton_asset(&fs(), " infantry.json , lod0", &def, "e3")
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.asset_count(), 1);
    assert!(cache.has_skeleton_asset("infantry.json"));
    assert_eq!(first.animation_names(), vec!["aim", "stand"]);
}

#[test]
fn ordered_skeleton_registration_is_idempotent() {
    let mut cache = SkeletonCache::default();
    registered(&mut cache, "e1");
    let offset = cache.get_ordered_skeleton("e1").unwrap().texture_offset();

    registered(&mut cache, "e1");
    assert_eq!(cache.ordered_count(), 1);
    assert_eq!(cache.get_ordered_skeleton("e1").unwrap().texture_offset(), offset);
    assert_eq!(cache.anim_texture().allocated_matrices(), 3);
}

#[test]
fn units_share_asset_but_not_regions() {
    let mut cache = SkeletonCache::default();
    registered(&mut cache, "e1");
    registered(&mut cache, "e3");

    let e1 = cache.get_ordered_skeleton("e1").unwrap();
    let e3 = cache.get_ordered_skeleton("e3").unwrap();
    assert!(Arc::ptr_eq(e1.asset(), e3.asset()));
    assert_eq!((e1.texture_offset(), e1.draw_id()), (0, 0));
    assert_eq!((e3.texture_offset(), e3.draw_id()), (3, 1));

    let names: Vec<&str> = cache.ordered_skeletons().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["e1", "e3"]);
}

#[test]
fn clips_added_lazily_to_shared_asset() -> anyhow::Result<()> {
    let mut cache = SkeletonCache::default();
    let mut def = SkeletonDefinition::from_json_str(INFANTRY)?;
    let asset = cache.update_skeleton_asset(&fs(), "infantry.json", &def, "e1")?;

    let mut files = fs();
    files.insert("e1-wave.anim", clip_bytes("wave", rest()));
    def.anims.insert("wave".into(), "e1-wave".into());
    cache.update_skeleton_asset(&files, "infantry.json", &def, "e1")?;

    assert!(asset.has_animation("wave"));
    let stand = asset.animation("stand").expect("stand is registered");
    // Already known sequences are not reloaded
    let again = asset.try_add_animation(&files, cache.settings(), "stand", "e1-stand")?;
    assert!(Arc::ptr_eq(&stand, &again));
    Ok(())
}

// ============================================================================
// Evaluation and Baking
// ============================================================================

#[test]
fn rest_pose_bakes_identity() {
    let mut cache = SkeletonCache::default();
    registered(&mut cache, "e1");
    let version = cache.anim_texture().version();

    cache.tick(1, true, 1);

    let skel = cache.get_ordered_skeleton("e1").unwrap();
    assert_eq!(skel.last_tick(), Some(1));
    for m in cache.anim_texture().region_matrices(skel.region()) {
        assert!(m.abs_diff_eq(Mat4::IDENTITY, EPSILON));
    }
    assert_eq!(cache.anim_texture().version(), version + 1);
}

#[test]
fn blend_value_drives_baked_pose() -> anyhow::Result<()> {
    let mut cache = SkeletonCache::default();
    registered(&mut cache, "e1");

    cache.get_ordered_skeleton_mut("e1")?.set_blend_value("look", 1.0)?;
    cache.tick(1, true, 1);

    let skel = cache.get_ordered_skeleton("e1")?;
    // Spine bends 90 degrees about Z, head sits above it
    let head = skel.model_matrices()[2].transform_point3(Vec3::ZERO);
    assert!(head.abs_diff_eq(Vec3::new(-0.5, 1.0, 0.0), EPSILON), "head at {head}");

    // Root is outside the mask and stays at rest
    let baked = cache.anim_texture().region_matrices(skel.region());
    assert!(baked[0].abs_diff_eq(Mat4::IDENTITY, EPSILON));
    assert!(!baked[1].abs_diff_eq(Mat4::IDENTITY, EPSILON));
    // Skin matrix moves the rest-pose head position to the posed one
    let skinned = baked[2].transform_point3(Vec3::new(0.0, 1.5, 0.0));
    assert!(skinned.abs_diff_eq(head, EPSILON));
    Ok(())
}

#[test]
fn bake_waits_for_all_skeletons() {
    let mut cache = SkeletonCache::default();
    registered(&mut cache, "e1");
    registered(&mut cache, "e3");
    cache
        .get_ordered_skeleton_mut("e3")
        .unwrap()
        .set_blend_value("look", 1.0)
        .unwrap();

    cache.tick(5, true, 1);

    let tex = cache.anim_texture();
    let e1 = tex.region_matrices(cache.get_ordered_skeleton("e1").unwrap().region());
    let e3 = tex.region_matrices(cache.get_ordered_skeleton("e3").unwrap().region());
    assert!(e1[1].abs_diff_eq(Mat4::IDENTITY, EPSILON));
    assert!(!e3[1].abs_diff_eq(Mat4::IDENTITY, EPSILON));
    assert_eq!(
        cache.get_ordered_skeleton("e3").unwrap().skin_matrices(),
        e3.as_slice()
    );
}

#[test]
fn texture_grows_past_initial_capacity() {
    let settings = AnimationSettings {
        initial_texture_matrices: 4,
        ..Default::default()
    };
    let mut cache = SkeletonCache::new(settings);
    for unit in ["e1", "e2", "e3"] {
        registered(&mut cache, unit);
    }

    assert_eq!(cache.anim_texture().allocated_matrices(), 9);
    assert!(cache.anim_texture().capacity() >= 9);
    cache.tick(1, false, 0);
    assert_eq!(cache.anim_texture().to_bytes().len(), cache.anim_texture().capacity() * 64);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn missing_clip_file_fails_asset_load() {
    init_logger();
    let mut cache = SkeletonCache::default();
    let mut def = SkeletonDefinition::from_json_str(INFANTRY).unwrap();
    def.anims.insert("die".into(), "e1-die".into());

    let result = cache.update_skeleton_asset(&fs(), "infantry.json", &def, "e1");
    assert!(matches!(result, Err(AnimError::FileNotFound(path)) if path == "e1-die.anim"));
    assert!(!cache.has_skeleton_asset("infantry.json"));
}

#[test]
fn tree_referencing_unknown_mask_fails() {
    let mut cache = SkeletonCache::default();
    let mut def = SkeletonDefinition::from_json_str(INFANTRY).unwrap();
    def.masks.clear();

    let asset = cache.update_skeleton_asset(&fs(), "infantry.json", &def, "e1").unwrap();
    let result = cache.update_ordered_skeleton(asset, "e1", &def);
    assert!(matches!(result, Err(AnimError::UnknownMask(name)) if name == "upper"));
    assert!(!cache.has_ordered_skeleton("e1"));
}

#[test]
fn definition_without_tree_uses_rest_pose() {
    let mut cache = SkeletonCache::default();
    let def = SkeletonDefinition::from_json_str(
        r#"{ "bones": [ { "name": "hull" }, { "name": "turret", "parent": "hull" } ] }"#,
    )
    .unwrap();

    let asset = cache.update_skeleton_asset(&fs(), "tank.json", &def, "2tnk").unwrap();
    let skel = cache.update_ordered_skeleton(asset, "2tnk", &def).unwrap();
    assert_eq!(skel.bone_count(), 2);
    assert!(matches!(
        skel.set_blend_value("rest", 0.5),
        Err(AnimError::NotBlendNode(_))
    ));
    assert!(matches!(
        cache.get_ordered_skeleton("1tnk"),
        Err(AnimError::UnknownSkeleton(_))
    ));
}
