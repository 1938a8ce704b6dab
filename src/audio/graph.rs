//! Node graph with generational ids.
//!
//! Nodes live in a slab; removing one bumps its slot's generation so stale
//! ids held elsewhere stop resolving. Each quantum, nodes reachable from the
//! output are processed in dependency order and every node's input is the
//! sum of its upstream outputs.

use super::nodes::{Node, ProcessContext, QUANTUM};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

struct GraphNode {
    node: Box<dyn Node>,
    inputs: Vec<NodeId>,
}

struct Slot {
    generation: u32,
    entry: Option<GraphNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Open,
    Done,
}

pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    outputs: Vec<[f32; QUANTUM]>,
    output: Option<NodeId>,
    order: Vec<usize>, // evaluation order, rebuilt when the topology changes
    marks: Vec<Mark>,
    stack: Vec<(usize, usize)>, // (slot, next input) while walking
    dirty: bool,
    live: usize,
    input_scratch: [f32; QUANTUM],
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            outputs: Vec::new(),
            output: None,
            order: Vec::new(),
            marks: Vec::new(),
            stack: Vec::new(),
            dirty: false,
            live: 0,
            input_scratch: [0.0; QUANTUM],
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn add(&mut self, node: Box<dyn Node>) -> NodeId {
        let entry = GraphNode { node, inputs: Vec::new() };
        self.live += 1;
        self.dirty = true;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            self.outputs[index as usize] = [0.0; QUANTUM];
            return NodeId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, entry: Some(entry) });
        self.outputs.push([0.0; QUANTUM]);
        NodeId { index, generation: 0 }
    }

    fn entry(&self, id: NodeId) -> Option<&GraphNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&(dyn Node + 'static)> {
        self.entry(id).map(|e| e.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut (dyn Node + 'static)> {
        self.entry_mut(id).map(|e| e.node.as_mut())
    }

    /// Feeds `src` into `dst`. Connecting twice is a no-op.
    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> bool {
        if !self.contains(src) {
            return false;
        }
        let Some(entry) = self.entry_mut(dst) else {
            return false;
        };
        if !entry.inputs.contains(&src) {
            entry.inputs.push(src);
            self.dirty = true;
        }
        true
    }

    pub fn disconnect(&mut self, src: NodeId, dst: NodeId) -> bool {
        let Some(entry) = self.entry_mut(dst) else {
            return false;
        };
        let before = entry.inputs.len();
        entry.inputs.retain(|i| *i != src);
        let changed = entry.inputs.len() != before;
        self.dirty |= changed;
        changed
    }

    pub fn is_connected(&self, src: NodeId, dst: NodeId) -> bool {
        self.entry(dst).is_some_and(|e| e.inputs.contains(&src))
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.entry.is_some())
        else {
            return false;
        };
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            entry.inputs.retain(|i| *i != id);
        }
        if self.output == Some(id) {
            self.output = None;
        }
        self.dirty = true;
        true
    }

    pub fn set_output(&mut self, id: NodeId) {
        self.output = Some(id);
        self.dirty = true;
    }

    // depth-first post-order from the output; a cycle edge reads last quantum's output
    fn rebuild_order(&mut self) {
        self.dirty = false;
        self.order.clear();
        let Some(root) = self.output.filter(|id| self.contains(*id)) else {
            return;
        };
        self.marks.clear();
        self.marks.resize(self.slots.len(), Mark::New);

        let root = root.index as usize;
        self.marks[root] = Mark::Open;
        self.stack.clear();
        self.stack.push((root, 0));
        while let Some(top) = self.stack.last_mut() {
            let (idx, cursor) = *top;
            let next = self.slots[idx]
                .entry
                .as_ref()
                .and_then(|e| e.inputs.get(cursor))
                .copied();
            match next {
                Some(input) => {
                    top.1 += 1;
                    let j = input.index as usize;
                    if self.marks[j] == Mark::New {
                        self.marks[j] = Mark::Open;
                        self.stack.push((j, 0));
                    }
                }
                None => {
                    self.marks[idx] = Mark::Done;
                    self.order.push(idx);
                    self.stack.pop();
                }
            }
        }
    }

    /// Renders one quantum (at most [`QUANTUM`] frames) of the output node.
    pub fn process(&mut self, ctx: &ProcessContext, out: &mut [f32]) {
        let frames = out.len().min(QUANTUM);
        if self.dirty {
            self.rebuild_order();
        }
        let Some(output) = self.output.filter(|_| !self.order.is_empty()) else {
            out.fill(0.0);
            return;
        };

        for &idx in &self.order {
            let Some(entry) = self.slots[idx].entry.as_mut() else {
                continue;
            };
            let scratch = &mut self.input_scratch[..frames];
            scratch.fill(0.0);
            for input in &entry.inputs {
                let src = &self.outputs[input.index as usize][..frames];
                for (acc, s) in scratch.iter_mut().zip(src) {
                    *acc += s;
                }
            }
            entry
                .node
                .process(ctx, scratch, &mut self.outputs[idx][..frames]);
        }

        out[..frames].copy_from_slice(&self.outputs[output.index as usize][..frames]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::nodes::Gain;

    struct Constant(f32);

    impl Node for Constant {
        fn process(&mut self, _ctx: &ProcessContext, _input: &[f32], output: &mut [f32]) {
            output.fill(self.0);
        }
    }

    fn ctx() -> ProcessContext {
        ProcessContext { start_time: 0.0, sample_rate: 48_000.0 }
    }

    #[test]
    fn inputs_are_summed_through_the_chain() {
        let mut graph = Graph::new();
        let a = graph.add(Box::new(Constant(0.25)));
        let b = graph.add(Box::new(Constant(0.5)));
        let gain = graph.add(Box::new(Gain::new(2.0, 0.0)));
        assert!(graph.connect(a, gain));
        assert!(graph.connect(b, gain));
        assert!(graph.connect(b, gain));
        graph.set_output(gain);

        let mut out = [0.0; QUANTUM];
        graph.process(&ctx(), &mut out);
        assert!(out.iter().all(|s| *s == 1.5));
    }

    #[test]
    fn removed_ids_go_stale() {
        let mut graph = Graph::new();
        let a = graph.add(Box::new(Constant(1.0)));
        let out_node = graph.add(Box::new(Gain::new(1.0, 0.0)));
        graph.connect(a, out_node);
        graph.set_output(out_node);

        assert!(graph.remove(a));
        assert!(!graph.remove(a));
        assert!(!graph.contains(a));
        assert!(!graph.is_connected(a, out_node));
        assert_eq!(graph.len(), 1);

        // the slot is reused under a new generation
        let c = graph.add(Box::new(Constant(0.1)));
        assert_ne!(a, c);
        assert!(!graph.contains(a));
        assert!(!graph.connect(a, out_node));

        let mut out = [1.0; QUANTUM];
        graph.process(&ctx(), &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn no_output_renders_silence() {
        let mut graph = Graph::new();
        graph.add(Box::new(Constant(1.0)));
        let mut out = [1.0; 64];
        graph.process(&ctx(), &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn reordering_reuses_the_walk_stack() {
        let mut graph = Graph::new();
        let out_node = graph.add(Box::new(Gain::new(1.0, 0.0)));
        graph.set_output(out_node);
        let mut prev = out_node;
        for _ in 0..8 {
            let g = graph.add(Box::new(Gain::new(1.0, 0.0)));
            graph.connect(g, prev);
            prev = g;
        }
        let mut out = [0.0; QUANTUM];
        graph.process(&ctx(), &mut out);
        assert_eq!(graph.order.len(), 9);
        let capacity = graph.stack.capacity();
        assert!(capacity >= 9);

        let leaf = graph.add(Box::new(Constant(0.5)));
        graph.connect(leaf, prev);
        graph.remove(leaf);
        graph.process(&ctx(), &mut out);
        assert!(graph.stack.is_empty());
        assert_eq!(graph.stack.capacity(), capacity);
    }

    #[test]
    fn cycles_do_not_hang() {
        let mut graph = Graph::new();
        let a = graph.add(Box::new(Gain::new(0.5, 0.0)));
        let b = graph.add(Box::new(Gain::new(0.5, 0.0)));
        let src = graph.add(Box::new(Constant(1.0)));
        graph.connect(src, a);
        graph.connect(a, b);
        graph.connect(b, a);
        graph.set_output(b);
        let mut out = [0.0; QUANTUM];
        graph.process(&ctx(), &mut out);
        assert!(out[0] > 0.0);
    }
}
