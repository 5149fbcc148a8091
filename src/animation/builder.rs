use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::animation::blend_tree::{
    Blend2, Blend3, BlendNodeKey, BlendNodeKind, BlendNodeSlot, BlendTree, ClipNode,
};
use crate::animation::clip::{LoopMode, SkeletalAnim};
use crate::animation::mask::AnimMask;
use crate::animation::transform::Transformation;
use crate::errors::{AnimError, Result};

enum DeclKind {
    Pose,
    Clip {
        clip: Arc<SkeletalAnim>,
        loop_mode: LoopMode,
        start_frame: usize,
    },
    Blend2 {
        mask: Arc<AnimMask>,
        value: f32,
    },
    Blend3 {
        mask: Arc<AnimMask>,
        value: f32,
    },
}

struct NodeDecl {
    name: String,
    kind: DeclKind,
    inputs: Vec<String>,
}

/// Declares blend nodes by name and assembles them into a [`BlendTree`].
///
/// Inputs may reference nodes declared later. `build` resolves every name,
/// checks input counts and rejects cyclic graphs.
///
/// ```rust,ignore
/// let tree = BlendTreeBuilder::new(rest_pose)
///     .clip("idle", idle, LoopMode::Loop)
///     .clip("aim", aim, LoopMode::Once)
///     .blend2("look", "idle", "aim", upper_body, 0.5)
///     .build("look")?;
/// ```
pub struct BlendTreeBuilder {
    rest_pose: Vec<Transformation>,
    decls: Vec<NodeDecl>,
}

impl BlendTreeBuilder {
    #[must_use]
    pub fn new(rest_pose: Vec<Transformation>) -> Self {
        Self {
            rest_pose,
            decls: Vec::new(),
        }
    }

    fn push(mut self, name: &str, kind: DeclKind, inputs: &[&str]) -> Self {
        self.decls.push(NodeDecl {
            name: name.to_string(),
            kind,
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
        });
        self
    }

    #[must_use]
    pub fn pose(self, name: &str) -> Self {
        self.push(name, DeclKind::Pose, &[])
    }

    #[must_use]
    pub fn clip(self, name: &str, clip: Arc<SkeletalAnim>, loop_mode: LoopMode) -> Self {
        self.clip_at(name, clip, loop_mode, 0)
    }

    #[must_use]
    pub fn clip_at(
        self,
        name: &str,
        clip: Arc<SkeletalAnim>,
        loop_mode: LoopMode,
        start_frame: usize,
    ) -> Self {
        self.push(
            name,
            DeclKind::Clip {
                clip,
                loop_mode,
                start_frame,
            },
            &[],
        )
    }

    #[must_use]
    pub fn blend2(self, name: &str, a: &str, b: &str, mask: Arc<AnimMask>, value: f32) -> Self {
        self.push(name, DeclKind::Blend2 { mask, value }, &[a, b])
    }

    #[must_use]
    pub fn blend3(
        self,
        name: &str,
        mid: &str,
        high: &str,
        low: &str,
        mask: Arc<AnimMask>,
        value: f32,
    ) -> Self {
        self.push(name, DeclKind::Blend3 { mask, value }, &[mid, high, low])
    }

    pub fn build(self, root: &str) -> Result<BlendTree> {
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        for (i, decl) in self.decls.iter().enumerate() {
            if index.insert(decl.name.as_str(), i).is_some() {
                return Err(AnimError::DuplicateNode(decl.name.clone()));
            }
        }

        let root_index = *index
            .get(root)
            .ok_or_else(|| AnimError::UnknownNode(root.to_string()))?;

        // Resolve input names to declaration indices.
        let mut edges: Vec<Vec<usize>> = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            let resolved = decl
                .inputs
                .iter()
                .map(|input| {
                    index
                        .get(input.as_str())
                        .copied()
                        .ok_or_else(|| AnimError::UnknownNode(input.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            edges.push(resolved);
        }

        let order = topological_order(&edges).map_err(|cycle| AnimError::CyclicBlendGraph {
            nodes: cycle.iter().map(|&i| self.decls[i].name.clone()).collect(),
        })?;

        if log::log_enabled!(log::Level::Debug) {
            let reachable = reachable_from(root_index, &edges);
            for (i, decl) in self.decls.iter().enumerate() {
                if !reachable[i] {
                    log::debug!("Blend node `{}` is not reachable from root `{root}`", decl.name);
                }
            }
        }

        // Inputs are inserted before their consumers, so every key exists
        // by the time a blend node refers to it.
        let mut keys: Vec<Option<BlendNodeKey>> = vec![None; self.decls.len()];
        let mut nodes: SlotMap<BlendNodeKey, BlendNodeSlot> = SlotMap::with_key();
        let mut decls: Vec<Option<NodeDecl>> = self.decls.into_iter().map(Some).collect();

        for i in order {
            let Some(decl) = decls[i].take() else {
                continue;
            };
            let key_of = |j: usize| keys[edges[i][j]].ok_or_else(|| AnimError::UnknownNode(decl.inputs[j].clone()));

            let kind = match decl.kind {
                DeclKind::Pose => BlendNodeKind::Pose,
                DeclKind::Clip {
                    clip,
                    loop_mode,
                    start_frame,
                } => BlendNodeKind::Clip(ClipNode::new(clip, loop_mode, start_frame)),
                DeclKind::Blend2 { mask, value } => BlendNodeKind::Blend2(Blend2 {
                    input_a: key_of(0)?,
                    input_b: key_of(1)?,
                    blend_value: value,
                    mask,
                }),
                DeclKind::Blend3 { mask, value } => BlendNodeKind::Blend3(Blend3 {
                    input_mid: key_of(0)?,
                    input_high: key_of(1)?,
                    input_low: key_of(2)?,
                    blend_value: value,
                    mask,
                }),
            };

            keys[i] = Some(nodes.insert(BlendNodeSlot::new(decl.name, kind)));
        }

        let root_key = keys[root_index].ok_or_else(|| AnimError::UnknownNode(root.to_string()))?;
        Ok(BlendTree::from_checked_parts(nodes, self.rest_pose, root_key))
    }
}

/// Kahn's algorithm over `edges[node] = inputs`; inputs come first.
///
/// On failure returns one cycle, listed along input edges and closed by
/// repeating its first node.
fn topological_order(edges: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = edges.len();
    // pending[i] = inputs of i not yet emitted
    let mut pending: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, inputs) in edges.iter().enumerate() {
        for &input in inputs {
            consumers[input].push(node);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &consumer in &consumers[node] {
            pending[consumer] -= 1;
            if pending[consumer] == 0 {
                queue.push_back(consumer);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    // Every leftover node has a leftover input; walking those must loop.
    let mut on_path = vec![usize::MAX; n];
    let mut path = Vec::new();
    let mut current = (0..n).find(|&i| pending[i] > 0).unwrap_or(0);
    loop {
        if on_path[current] != usize::MAX {
            let mut cycle = path[on_path[current]..].to_vec();
            cycle.push(current);
            return Err(cycle);
        }
        on_path[current] = path.len();
        path.push(current);
        current = edges[current]
            .iter()
            .copied()
            .find(|&input| pending[input] > 0)
            .unwrap_or(current);
    }
}

fn reachable_from(root: usize, edges: &[Vec<usize>]) -> Vec<bool> {
    let mut seen = vec![false; edges.len()];
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if std::mem::replace(&mut seen[node], true) {
            continue;
        }
        stack.extend(edges[node].iter().copied());
    }
    seen
}
