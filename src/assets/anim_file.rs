//! `.anim` Clip Format
//!
//! Little-endian binary layout:
//!
//! | Field                | Type                                   |
//! |----------------------|----------------------------------------|
//! | magic                | `char[8]` = `"ORA_ANIM"`               |
//! | clip name            | bytes terminated by `'?'`              |
//! | dictionary size      | `u32`                                  |
//! | dictionary entry     | `i32` bone id, bone name (`'?'`-terminated) |
//! | frame count          | `u32`                                  |
//! | per frame            | `u32` bone count, then bone records    |
//! | bone record          | `f32×3` scale, `f32×4` quat (x,y,z,w), `f32×3` translation |
//!
//! The `j`-th bone record of a frame belongs to file-local bone id `j`.
//! Bone ids are remapped to the target skeleton by name; bones the skeleton
//! does not know are skipped and keep the skeleton's rest pose.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::animation::transform::{Frame, Transformation};
use crate::assets::hierarchy::BoneHierarchy;
use crate::errors::{AnimError, Result};

pub const ANIM_MAGIC: &[u8; 8] = b"ORA_ANIM";
pub const NAME_TERMINATOR: u8 = b'?';

// Upper bound for speculative allocations driven by file counts.
const MAX_PREALLOC: usize = 4096;

/// Decoded contents of one `.anim` stream.
#[derive(Debug, Clone)]
pub struct SkeletalAnimReader {
    pub anim_name: String,
    pub frames: Vec<Frame>,
    /// File-local bone names that had no match in the target skeleton.
    pub skipped_bones: Vec<String>,
}

impl SkeletalAnimReader {
    pub fn read<R: Read>(s: &mut R, skeleton: &BoneHierarchy) -> Result<Self> {
        let mut header = [0u8; 8];
        s.read_exact(&mut header)
            .map_err(|e| AnimError::from_stream(e, "header"))?;
        if &header != ANIM_MAGIC {
            return Err(AnimError::Format(format!(
                "bad header {:?}, expected \"ORA_ANIM\"",
                String::from_utf8_lossy(&header)
            )));
        }

        let anim_name = read_name(s, "clip name")?;

        let dict_size = read_u32(s, "bone dictionary size")? as usize;
        let mut bone_id_to_name: FxHashMap<i32, String> =
            FxHashMap::with_capacity_and_hasher(dict_size.min(MAX_PREALLOC), Default::default());
        for _ in 0..dict_size {
            let id = s
                .read_i32::<LittleEndian>()
                .map_err(|e| AnimError::from_stream(e, "bone id"))?;
            let name = read_name(s, "bone name")?;
            if let Some(previous) = bone_id_to_name.insert(id, name) {
                log::warn!("Clip `{anim_name}`: bone id {id} declared twice, replacing `{previous}`");
            }
        }

        // Resolve the file-local ids once instead of per frame.
        let remap: FxHashMap<i32, Option<usize>> = bone_id_to_name
            .iter()
            .map(|(&id, name)| (id, skeleton.bone_index(name)))
            .collect();

        let frame_count = read_u32(s, "frame count")? as usize;
        let mut frames = Vec::with_capacity(frame_count.min(MAX_PREALLOC));
        let mut skipped: FxHashSet<String> = FxHashSet::default();

        for frame_index in 0..frame_count {
            let bones = read_u32(s, "frame bone count")? as usize;
            let mut frame = Frame::from_transforms(skeleton.rest_pose().to_vec());

            for j in 0..bones {
                let record = read_bone_record(s, &anim_name, frame_index, j)?;

                let target = i32::try_from(j)
                    .ok()
                    .and_then(|id| remap.get(&id).copied().flatten());

                match target {
                    Some(index) => frame.trans[index] = record,
                    None => {
                        let name = i32::try_from(j)
                            .ok()
                            .and_then(|id| bone_id_to_name.get(&id))
                            .cloned()
                            .unwrap_or_else(|| format!("#{j}"));
                        if skipped.insert(name.clone()) {
                            log::warn!(
                                "No match bone `{name}` of clip `{anim_name}` in skeleton `{}`",
                                skeleton.name()
                            );
                        }
                    }
                }
            }

            frames.push(frame);
        }

        let mut skipped_bones: Vec<String> = skipped.into_iter().collect();
        skipped_bones.sort();

        Ok(Self {
            anim_name,
            frames,
            skipped_bones,
        })
    }
}

fn read_u32<R: Read>(s: &mut R, what: &str) -> Result<u32> {
    s.read_u32::<LittleEndian>()
        .map_err(|e| AnimError::from_stream(e, what))
}

fn read_f32s<R: Read, const N: usize>(s: &mut R) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    s.read_f32_into::<LittleEndian>(&mut out)
        .map_err(|e| AnimError::from_stream(e, "bone transform"))?;
    Ok(out)
}

fn read_bone_record<R: Read>(
    s: &mut R,
    anim_name: &str,
    frame: usize,
    bone: usize,
) -> Result<Transformation> {
    let scale = Vec3::from_array(read_f32s::<R, 3>(s)?);
    let rotation = Quat::from_array(read_f32s::<R, 4>(s)?);
    let translation = Vec3::from_array(read_f32s::<R, 3>(s)?);

    let len_sq = rotation.length_squared();
    if !len_sq.is_finite() || len_sq <= f32::EPSILON {
        log::warn!("Clip `{anim_name}` frame {frame} bone {bone}: degenerate rotation, using identity");
    }

    Ok(Transformation::new(scale, rotation, translation))
}

/// Reads bytes up to (and consuming) the terminator.
fn read_name<R: Read>(s: &mut R, what: &str) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = s.read_u8().map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                AnimError::Format(format!("unterminated {what}"))
            } else {
                AnimError::Io(e)
            }
        })?;
        if b == NAME_TERMINATOR {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|_| AnimError::Format(format!("{what} is not valid UTF-8")))
}

/// Encodes clips in the `.anim` layout.
pub struct SkeletalAnimWriter;

impl SkeletalAnimWriter {
    /// Writes a clip whose bone ids are the positions in `bone_names`.
    ///
    /// Every frame must hold exactly one transform per bone name.
    pub fn write<W: Write, S: AsRef<str>>(
        w: &mut W,
        anim_name: &str,
        bone_names: &[S],
        frames: &[Frame],
    ) -> Result<()> {
        w.write_all(ANIM_MAGIC)?;
        write_name(w, anim_name)?;

        w.write_u32::<LittleEndian>(count_u32(bone_names.len(), "bone dictionary")?)?;
        for (id, name) in bone_names.iter().enumerate() {
            let id = i32::try_from(id)
                .map_err(|_| AnimError::Format("bone id does not fit in i32".to_string()))?;
            w.write_i32::<LittleEndian>(id)?;
            write_name(w, name.as_ref())?;
        }

        w.write_u32::<LittleEndian>(count_u32(frames.len(), "frame count")?)?;
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() != bone_names.len() {
                return Err(AnimError::Format(format!(
                    "frame {i} has {} bones, dictionary has {}",
                    frame.len(),
                    bone_names.len()
                )));
            }
            w.write_u32::<LittleEndian>(count_u32(frame.len(), "frame bone count")?)?;
            for t in &frame.trans {
                for v in t.scale.to_array() {
                    w.write_f32::<LittleEndian>(v)?;
                }
                for v in t.rotation.to_array() {
                    w.write_f32::<LittleEndian>(v)?;
                }
                for v in t.translation.to_array() {
                    w.write_f32::<LittleEndian>(v)?;
                }
            }
        }

        Ok(())
    }

    pub fn to_bytes<S: AsRef<str>>(anim_name: &str, bone_names: &[S], frames: &[Frame]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Self::write(&mut out, anim_name, bone_names, frames)?;
        Ok(out)
    }
}

fn count_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| AnimError::Format(format!("{what} {n} exceeds u32")))
}

fn write_name<W: Write>(w: &mut W, name: &str) -> Result<()> {
    if name.as_bytes().contains(&NAME_TERMINATOR) {
        return Err(AnimError::Format(format!(
            "name `{name}` contains the terminator '?'"
        )));
    }
    w.write_all(name.as_bytes())?;
    w.write_u8(NAME_TERMINATOR)?;
    Ok(())
}
