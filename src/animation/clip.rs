use serde::Deserialize;

use crate::animation::transform::Frame;
use crate::assets::anim_file::SkeletalAnimReader;
use crate::assets::hierarchy::BoneHierarchy;
use crate::assets::io::ReadOnlyFileSystem;
use crate::errors::{AnimError, Result};
use crate::settings::AnimationSettings;

/// A decoded clip: one pose per frame, already remapped into the bone index
/// space of the skeleton it was loaded for. Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletalAnim {
    pub name: String,
    pub sequence: String,
    pub frames: Vec<Frame>,
}

impl SkeletalAnim {
    #[must_use]
    pub fn new(name: String, sequence: String, frames: Vec<Frame>) -> Self {
        Self {
            name,
            sequence,
            frames,
        }
    }

    /// Resolves `filename` (falling back to `filename.anim`) and decodes it
    /// against `skeleton`.
    pub fn load(
        fs: &dyn ReadOnlyFileSystem,
        settings: &AnimationSettings,
        sequence: &str,
        filename: &str,
        skeleton: &BoneHierarchy,
    ) -> Result<Self> {
        let path = if fs.exists(filename) {
            filename.to_string()
        } else {
            let with_ext = settings.with_anim_extension(filename);
            if !fs.exists(&with_ext) {
                return Err(AnimError::FileNotFound(with_ext));
            }
            with_ext
        };

        let mut stream = fs.open(&path)?;
        let reader = SkeletalAnimReader::read(&mut stream, skeleton)?;

        log::debug!(
            "Loaded clip `{}` ({} frames) from {path} for skeleton `{}`",
            reader.anim_name,
            reader.frames.len(),
            skeleton.name()
        );

        Ok(Self::new(reader.anim_name, sequence.to_string(), reader.frames))
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }
}

/// How a clip cursor behaves when stepping past either end of the clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Stop on the first or last frame.
    Once,
    /// Wrap around.
    #[default]
    Loop,
    /// Reflect at both ends.
    PingPong,
}

impl LoopMode {
    /// Maps a playhead onto a frame index of a clip with `frame_count` frames.
    ///
    /// The playhead is not bounded to the clip: a `PingPong` playhead runs
    /// over a full forward and backward cycle so the direction is preserved.
    #[must_use]
    pub fn frame_at(self, cursor: i64, frame_count: usize) -> usize {
        if frame_count <= 1 {
            return 0;
        }
        let last = (frame_count - 1) as i64;

        match self {
            LoopMode::Once => cursor.clamp(0, last) as usize,
            LoopMode::Loop => cursor.rem_euclid(frame_count as i64) as usize,
            LoopMode::PingPong => {
                let period = last * 2;
                let t = cursor.rem_euclid(period);
                (if t > last { period - t } else { t }) as usize
            }
        }
    }

    /// Moves the playhead by `step` frames.
    ///
    /// Returns the new playhead and whether a `Once` clip reached its end.
    #[must_use]
    pub fn advance(self, cursor: i64, step: i32, frame_count: usize) -> (i64, bool) {
        let target = cursor + i64::from(step);
        let last = frame_count.saturating_sub(1) as i64;

        match self {
            LoopMode::Once => {
                let clamped = target.clamp(0, last);
                let finished = (step > 0 && clamped == last) || (step < 0 && clamped == 0);
                (clamped, finished)
            }
            // Wrapped to one period to keep the playhead bounded
            LoopMode::Loop => (target.rem_euclid((last + 1).max(1)), false),
            LoopMode::PingPong => (target.rem_euclid((last * 2).max(1)), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(mode: LoopMode, frame_count: usize, steps: usize) -> Vec<usize> {
        let mut cursor = 0;
        let mut frames = vec![mode.frame_at(cursor, frame_count)];
        for _ in 0..steps {
            cursor = mode.advance(cursor, 1, frame_count).0;
            frames.push(mode.frame_at(cursor, frame_count));
        }
        frames
    }

    #[test]
    fn test_loop_wraps_both_directions() {
        assert_eq!(play(LoopMode::Loop, 4, 5), vec![0, 1, 2, 3, 0, 1]);
        let (cursor, _) = LoopMode::Loop.advance(0, -1, 4);
        assert_eq!(LoopMode::Loop.frame_at(cursor, 4), 3);
    }

    #[test]
    fn test_once_clamps_and_finishes() {
        assert_eq!(LoopMode::Once.advance(2, 1, 4), (3, true));
        assert_eq!(LoopMode::Once.advance(3, 5, 4), (3, true));
        assert_eq!(LoopMode::Once.advance(1, 1, 4), (2, false));
        assert_eq!(LoopMode::Once.advance(1, -3, 4), (0, true));
    }

    #[test]
    fn test_ping_pong_keeps_direction() {
        assert_eq!(
            play(LoopMode::PingPong, 4, 8),
            vec![0, 1, 2, 3, 2, 1, 0, 1, 2]
        );
        let (cursor, _) = LoopMode::PingPong.advance(0, -1, 4);
        assert_eq!(LoopMode::PingPong.frame_at(cursor, 4), 1);
    }

    #[test]
    fn test_single_frame_clip() {
        assert_eq!(play(LoopMode::Loop, 1, 2), vec![0, 0, 0]);
        assert_eq!(play(LoopMode::PingPong, 1, 2), vec![0, 0, 0]);
        assert_eq!(LoopMode::Once.advance(0, 0, 1), (0, false));
        assert_eq!(LoopMode::Once.advance(0, 1, 1), (0, true));
    }
}
