//! Blend Tree Evaluation
//!
//! A blend tree is a DAG of nodes stored in an index-addressed arena. Each
//! slot memoizes its output under the tick it was computed for:
//!
//! - Asking a node for tick `t` twice returns the cached output without
//!   touching its inputs.
//! - A node shared by several parents is evaluated at most once per tick.
//!
//! The evaluator has no cycle guard. Acyclicity is established when the tree
//! is built ([`BlendTreeBuilder`](crate::animation::builder::BlendTreeBuilder))
//! and re-checked on every rewiring ([`BlendTree::set_inputs`]).

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::animation::blend::{BlendTreeNodeOutput, BlendTreeUtil};
use crate::animation::clip::{LoopMode, SkeletalAnim};
use crate::animation::mask::AnimMask;
use crate::animation::transform::Transformation;
use crate::errors::{AnimError, Result};

new_key_type! {
    pub struct BlendNodeKey;
}

/// Simulation step counter used as the memoization key.
pub type Tick = u64;

pub(crate) type NodeInputs = SmallVec<[BlendNodeKey; 3]>;

/// Leaf node sampling one clip.
#[derive(Debug, Clone)]
pub struct ClipNode {
    pub clip: Arc<SkeletalAnim>,
    pub loop_mode: LoopMode,
    // Playhead; see LoopMode::frame_at
    cursor: i64,
    finished: bool,
}

impl ClipNode {
    #[must_use]
    pub fn new(clip: Arc<SkeletalAnim>, loop_mode: LoopMode, start_frame: usize) -> Self {
        let cursor = start_frame.min(clip.frame_count().saturating_sub(1)) as i64;
        Self {
            clip,
            loop_mode,
            cursor,
            finished: false,
        }
    }

    /// Frame sampled on the next evaluation.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> usize {
        self.loop_mode.frame_at(self.cursor, self.clip.frame_count())
    }

    /// True while a [`LoopMode::Once`] clip rests on the end it was last
    /// stepped towards. Stepping the other way clears it.
    #[inline]
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn set_frame(&mut self, frame: usize) {
        self.cursor = frame.min(self.clip.frame_count().saturating_sub(1)) as i64;
        self.finished = false;
    }

    fn write_pose(&self, rest_pose: &[Transformation], out: &mut Vec<Transformation>) {
        out.clear();
        match self.clip.frame(self.frame()) {
            Some(frame) => out.extend_from_slice(&frame.trans),
            None => out.extend_from_slice(rest_pose),
        }
    }

    fn advance(&mut self, run: bool, step: i32) {
        if !run || step == 0 {
            return;
        }
        let (cursor, finished) = self
            .loop_mode
            .advance(self.cursor, step, self.clip.frame_count());
        self.cursor = cursor;
        self.finished = finished;
    }
}

/// Two-input blend: `b` over `a` by `blend_value`, restricted to `mask`.
#[derive(Debug, Clone)]
pub struct Blend2 {
    pub input_a: BlendNodeKey,
    pub input_b: BlendNodeKey,
    /// Not clamped; values outside `[0, 1]` extrapolate.
    pub blend_value: f32,
    pub mask: Arc<AnimMask>,
}

/// Signed three-input blend around a neutral `mid` pose.
///
/// Positive values blend towards `high`, negative values towards `low`.
#[derive(Debug, Clone)]
pub struct Blend3 {
    pub input_mid: BlendNodeKey,
    pub input_high: BlendNodeKey,
    pub input_low: BlendNodeKey,
    pub blend_value: f32,
    pub mask: Arc<AnimMask>,
}

#[derive(Debug, Clone)]
pub enum BlendNodeKind {
    /// The skeleton's rest pose.
    Pose,
    Clip(ClipNode),
    Blend2(Blend2),
    Blend3(Blend3),
}

impl BlendNodeKind {
    pub(crate) fn inputs(&self) -> NodeInputs {
        match self {
            Self::Pose | Self::Clip(_) => NodeInputs::new(),
            Self::Blend2(n) => [n.input_a, n.input_b].into_iter().collect(),
            Self::Blend3(n) => [n.input_mid, n.input_high, n.input_low].into_iter().collect(),
        }
    }

    #[must_use]
    pub fn input_count(&self) -> usize {
        match self {
            Self::Pose | Self::Clip(_) => 0,
            Self::Blend2(_) => 2,
            Self::Blend3(_) => 3,
        }
    }

    fn set_inputs(&mut self, inputs: &[BlendNodeKey]) {
        match (self, inputs) {
            (Self::Blend2(n), &[a, b]) => {
                n.input_a = a;
                n.input_b = b;
            }
            (Self::Blend3(n), &[mid, high, low]) => {
                n.input_mid = mid;
                n.input_high = high;
                n.input_low = low;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BlendNodeSlot {
    pub(crate) name: String,
    pub(crate) kind: BlendNodeKind,
    last_tick: Option<Tick>,
    output: BlendTreeNodeOutput,
    evaluations: u64,
}

impl BlendNodeSlot {
    pub(crate) fn new(name: String, kind: BlendNodeKind) -> Self {
        Self {
            name,
            kind,
            last_tick: None,
            output: BlendTreeNodeOutput::default(),
            evaluations: 0,
        }
    }
}

/// An acyclic blend graph with per-node memoized outputs.
#[derive(Debug, Clone)]
pub struct BlendTree {
    nodes: SlotMap<BlendNodeKey, BlendNodeSlot>,
    names: FxHashMap<String, BlendNodeKey>,
    rest_pose: Vec<Transformation>,
    root: BlendNodeKey,
}

impl BlendTree {
    /// Assembles a tree from slots already checked for cycles.
    pub(crate) fn from_checked_parts(
        nodes: SlotMap<BlendNodeKey, BlendNodeSlot>,
        rest_pose: Vec<Transformation>,
        root: BlendNodeKey,
    ) -> Self {
        let names = nodes
            .iter()
            .map(|(key, slot)| (slot.name.clone(), key))
            .collect();
        Self {
            nodes,
            names,
            rest_pose,
            root,
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> BlendNodeKey {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<BlendNodeKey> {
        self.names.get(name).copied()
    }

    #[must_use]
    pub fn node_name(&self, key: BlendNodeKey) -> Option<&str> {
        self.nodes.get(key).map(|slot| slot.name.as_str())
    }

    #[must_use]
    pub fn kind(&self, key: BlendNodeKey) -> Option<&BlendNodeKind> {
        self.nodes.get(key).map(|slot| &slot.kind)
    }

    #[must_use]
    pub fn inputs(&self, key: BlendNodeKey) -> Vec<BlendNodeKey> {
        self.nodes
            .get(key)
            .map(|slot| slot.kind.inputs().into_vec())
            .unwrap_or_default()
    }

    /// Number of times the node actually computed an output (memo misses).
    #[must_use]
    pub fn evaluation_count(&self, key: BlendNodeKey) -> u64 {
        self.nodes.get(key).map_or(0, |slot| slot.evaluations)
    }

    /// Tick of the cached output, if any.
    #[must_use]
    pub fn last_tick(&self, key: BlendNodeKey) -> Option<Tick> {
        self.nodes.get(key).and_then(|slot| slot.last_tick)
    }

    /// Cached output of the last evaluated tick.
    #[must_use]
    pub fn output(&self, key: BlendNodeKey) -> Option<&BlendTreeNodeOutput> {
        self.nodes
            .get(key)
            .filter(|slot| slot.last_tick.is_some())
            .map(|slot| &slot.output)
    }

    pub fn rest_pose(&self) -> &[Transformation] {
        &self.rest_pose
    }

    // ========================================================================
    // Runtime controls
    // ========================================================================

    /// Sets the weight of a `Blend2`/`Blend3` node. Takes effect from the next
    /// tick; an output already cached for the current tick is kept.
    pub fn set_blend_value(&mut self, key: BlendNodeKey, value: f32) -> Result<()> {
        let slot = self.slot_mut(key)?;
        match &mut slot.kind {
            BlendNodeKind::Blend2(n) => n.blend_value = value,
            BlendNodeKind::Blend3(n) => n.blend_value = value,
            _ => return Err(AnimError::NotBlendNode(slot.name.clone())),
        }
        Ok(())
    }

    #[must_use]
    pub fn blend_value(&self, key: BlendNodeKey) -> Option<f32> {
        match self.kind(key)? {
            BlendNodeKind::Blend2(n) => Some(n.blend_value),
            BlendNodeKind::Blend3(n) => Some(n.blend_value),
            _ => None,
        }
    }

    pub fn clip_node_mut(&mut self, key: BlendNodeKey) -> Option<&mut ClipNode> {
        match &mut self.nodes.get_mut(key)?.kind {
            BlendNodeKind::Clip(clip) => Some(clip),
            _ => None,
        }
    }

    /// Rewires the inputs of a blend node.
    ///
    /// The change is rejected, leaving the tree untouched, if it would create
    /// a cycle. On success the memoized outputs of `key` and of every node
    /// consuming it are dropped; other nodes, clip leaves included, keep the
    /// output of the current tick.
    pub fn set_inputs(&mut self, key: BlendNodeKey, inputs: &[BlendNodeKey]) -> Result<()> {
        let slot = self.slot(key)?;
        let expected = slot.kind.input_count();
        if expected == 0 || inputs.len() != expected {
            return Err(AnimError::InputArity {
                node: slot.name.clone(),
                expected,
                actual: inputs.len(),
            });
        }

        for &input in inputs {
            self.slot(input)?;
            if let Some(path) = self.find_path(input, key) {
                let mut nodes: Vec<String> = path
                    .iter()
                    .filter_map(|&k| self.node_name(k).map(str::to_string))
                    .collect();
                nodes.push(self.nodes[input].name.clone());
                return Err(AnimError::CyclicBlendGraph { nodes });
            }
        }

        self.nodes[key].kind.set_inputs(inputs);
        let stale: Vec<BlendNodeKey> = self
            .nodes
            .keys()
            .filter(|&k| self.find_path(k, key).is_some())
            .collect();
        for k in stale {
            self.nodes[k].last_tick = None;
        }
        Ok(())
    }

    /// Path `from -> ... -> to` following input edges, if `to` is reachable.
    fn find_path(&self, from: BlendNodeKey, to: BlendNodeKey) -> Option<Vec<BlendNodeKey>> {
        let mut stack = vec![(from, 0usize)];
        let mut path: Vec<BlendNodeKey> = Vec::new();
        let mut visited = slotmap::SecondaryMap::new();

        while let Some((key, depth)) = stack.pop() {
            path.truncate(depth);
            path.push(key);
            if key == to {
                return Some(path);
            }
            if visited.insert(key, ()).is_some() {
                continue;
            }
            for input in self.nodes[key].kind.inputs() {
                stack.push((input, depth + 1));
            }
        }
        None
    }

    fn slot(&self, key: BlendNodeKey) -> Result<&BlendNodeSlot> {
        self.nodes
            .get(key)
            .ok_or_else(|| AnimError::UnknownNode(format!("{key:?}")))
    }

    fn slot_mut(&mut self, key: BlendNodeKey) -> Result<&mut BlendNodeSlot> {
        self.nodes
            .get_mut(key)
            .ok_or_else(|| AnimError::UnknownNode(format!("{key:?}")))
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluates the root node for `tick`.
    pub fn update(&mut self, tick: Tick, run: bool, step: i32) -> &BlendTreeNodeOutput {
        let root = self.root;
        self.evaluate(root, tick, run, step);
        &self.nodes[root].output
    }

    /// Returns `key`'s output for `tick`, computing it (and any stale inputs)
    /// only if the cached output belongs to another tick.
    ///
    /// `run` and `step` are forwarded to clip leaves: when `run` is set a clip
    /// moves `step` frames after being sampled.
    pub fn update_output(
        &mut self,
        key: BlendNodeKey,
        tick: Tick,
        run: bool,
        step: i32,
    ) -> Result<&BlendTreeNodeOutput> {
        self.slot(key)?;
        self.evaluate(key, tick, run, step);
        Ok(&self.nodes[key].output)
    }

    fn evaluate(&mut self, key: BlendNodeKey, tick: Tick, run: bool, step: i32) {
        let slot = &self.nodes[key];
        if slot.last_tick == Some(tick) {
            return;
        }

        for input in slot.kind.inputs() {
            self.evaluate(input, tick, run, step);
        }

        let mut out = std::mem::take(&mut self.nodes[key].output.transforms);
        let slot = &self.nodes[key];
        match &slot.kind {
            BlendNodeKind::Pose => {
                out.clear();
                out.extend_from_slice(&self.rest_pose);
            }
            BlendNodeKind::Clip(clip) => clip.write_pose(&self.rest_pose, &mut out),
            BlendNodeKind::Blend2(n) => BlendTreeUtil::blend_into(
                &self.nodes[n.input_a].output.transforms,
                &self.nodes[n.input_b].output.transforms,
                n.blend_value,
                &n.mask,
                &mut out,
            ),
            BlendNodeKind::Blend3(n) => {
                let (other, weight) = if n.blend_value > 0.0 {
                    (n.input_high, n.blend_value)
                } else {
                    (n.input_low, -n.blend_value)
                };
                BlendTreeUtil::blend_into(
                    &self.nodes[n.input_mid].output.transforms,
                    &self.nodes[other].output.transforms,
                    weight,
                    &n.mask,
                    &mut out,
                );
            }
        }

        let slot = &mut self.nodes[key];
        if let BlendNodeKind::Clip(clip) = &mut slot.kind {
            clip.advance(run, step);
        }
        slot.output.transforms = out;
        slot.last_tick = Some(tick);
        slot.evaluations += 1;
    }
}
