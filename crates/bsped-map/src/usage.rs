// usage.rs — Structure-usage tracking
//
// A UsageSet is one membership bitmap per lump kind, sized to the current
// arrays. mark() walks one model's trees iteratively with tri-color state:
// revisiting an in-progress entry is a back edge, i.e. a cyclic tree, and
// fails the request closed. Revisiting a finished entry is legitimate
// subtree sharing (compilers dedup clip trees) and is simply skipped.

use crate::bspfile::{ClipChild, NodeChild};
use crate::store::MapStore;
use bit_vec::BitVec;
use log::warn;

#[derive(Debug, Clone)]
pub struct UsageSet {
    pub planes: BitVec,
    pub textures: BitVec,
    pub vertices: BitVec,
    pub nodes: BitVec,
    pub texinfos: BitVec,
    pub faces: BitVec,
    pub clipnodes: BitVec,
    pub leaves: BitVec,
    pub marksurfaces: BitVec,
    pub edges: BitVec,
    pub surfedges: BitVec,
}

impl UsageSet {
    /// All-unmarked set sized to the store's current arrays.
    pub fn sized_to(store: &MapStore) -> UsageSet {
        UsageSet {
            planes: BitVec::from_elem(store.planes().len(), false),
            textures: BitVec::from_elem(store.textures().len(), false),
            vertices: BitVec::from_elem(store.vertices().len(), false),
            nodes: BitVec::from_elem(store.nodes().len(), false),
            texinfos: BitVec::from_elem(store.texinfos().len(), false),
            faces: BitVec::from_elem(store.faces().len(), false),
            clipnodes: BitVec::from_elem(store.clipnodes().len(), false),
            leaves: BitVec::from_elem(store.leaves().len(), false),
            marksurfaces: BitVec::from_elem(store.marksurfaces().len(), false),
            edges: BitVec::from_elem(store.edges().len(), false),
            surfedges: BitVec::from_elem(store.surfedges().len(), false),
        }
    }

    /// All-marked set (keep everything).
    pub fn full(store: &MapStore) -> UsageSet {
        let mut set = Self::sized_to(store);
        for bits in set.all_mut() {
            bits.set_all();
        }
        set
    }

    fn all_mut(&mut self) -> [&mut BitVec; 11] {
        [
            &mut self.planes,
            &mut self.textures,
            &mut self.vertices,
            &mut self.nodes,
            &mut self.texinfos,
            &mut self.faces,
            &mut self.clipnodes,
            &mut self.leaves,
            &mut self.marksurfaces,
            &mut self.edges,
            &mut self.surfedges,
        ]
    }

    fn all(&self) -> [&BitVec; 11] {
        [
            &self.planes,
            &self.textures,
            &self.vertices,
            &self.nodes,
            &self.texinfos,
            &self.faces,
            &self.clipnodes,
            &self.leaves,
            &self.marksurfaces,
            &self.edges,
            &self.surfedges,
        ]
    }

    /// In-place union. Both sets must come from the same store snapshot.
    pub fn union_with(&mut self, other: &UsageSet) {
        let theirs = other.all();
        for (i, bits) in self.all_mut().into_iter().enumerate() {
            bits.union(theirs[i]);
        }
    }

    /// New set marked in both inputs.
    pub fn intersect(&self, other: &UsageSet) -> UsageSet {
        let mut out = self.clone();
        let theirs = other.all();
        for (i, bits) in out.all_mut().into_iter().enumerate() {
            bits.intersect(theirs[i]);
        }
        out
    }

    pub fn marked_count(bits: &BitVec) -> usize {
        bits.iter().filter(|&b| b).count()
    }
}

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

enum Frame {
    Enter(u32),
    Exit(u32),
}

/// Everything one model's trees reach.
///
/// `skip_leaves` walks the render tree for its nodes and planes only, with
/// no leaf/marksurface/face expansion. `include_hull0_clipnodes` treats
/// head-node 0 as an additional clip-tree root (clipnode-only models store
/// a collision tree in the render slot).
///
/// Returns None when a tree is cyclic; the map is left untouched.
pub fn mark(
    store: &MapStore,
    model_idx: usize,
    skip_leaves: bool,
    include_hull0_clipnodes: bool,
) -> Option<UsageSet> {
    let Some(model) = store.models().get(model_idx) else {
        warn!("mark: model {} out of range", model_idx);
        return None;
    };

    let mut usage = UsageSet::sized_to(store);

    if let Some(root) = model.render_root() {
        if !mark_render_tree(store, &mut usage, root, skip_leaves, model_idx == 0) {
            warn!("mark: cyclic render tree in model {}", model_idx);
            return None;
        }
    }

    if !skip_leaves {
        mark_face_range(store, &mut usage, model.first_face, model.num_faces);
    }

    for hull in 1..model.head_nodes.len() {
        if let ClipChild::Node(root) = model.hull_root(hull) {
            if !mark_clip_tree(store, &mut usage, root) {
                warn!("mark: cyclic clip tree in model {} hull {}", model_idx, hull);
                return None;
            }
        }
    }

    if include_hull0_clipnodes {
        let head = model.head_nodes[0];
        if head >= 0 && (head as usize) < store.clipnodes().len() {
            if !mark_clip_tree(store, &mut usage, head as u32) {
                warn!("mark: cyclic hull-0 clip tree in model {}", model_idx);
                return None;
            }
        }
    }

    // the reserved dummy edge and the shared solid leaf belong to everyone
    if !usage.edges.is_empty() {
        usage.edges.set(0, true);
    }
    if !usage.leaves.is_empty() {
        usage.leaves.set(0, true);
    }

    Some(usage)
}

/// Union of mark() over every model except `exclude`.
pub fn mark_all_other_models(
    store: &MapStore,
    exclude: usize,
    skip_leaves: bool,
) -> Option<UsageSet> {
    let mut total = UsageSet::sized_to(store);
    for i in 0..store.models().len() {
        if i == exclude {
            continue;
        }
        let set = mark(store, i, skip_leaves, false)?;
        total.union_with(&set);
    }
    Some(total)
}

fn mark_render_tree(
    store: &MapStore,
    usage: &mut UsageSet,
    root: u32,
    skip_leaves: bool,
    expand_leaf_faces: bool,
) -> bool {
    let nodes = store.nodes();
    if root as usize >= nodes.len() {
        warn!("mark: render root {} out of range", root);
        return true;
    }

    let mut state = vec![WHITE; nodes.len()];
    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Exit(n) => state[n as usize] = BLACK,
            Frame::Enter(n) => {
                match state[n as usize] {
                    GRAY => return false, // back edge
                    BLACK => continue,
                    _ => {}
                }
                state[n as usize] = GRAY;
                stack.push(Frame::Exit(n));

                let node = &nodes[n as usize];
                usage.nodes.set(n as usize, true);
                mark_plane(store, usage, node.plane);
                if !skip_leaves {
                    mark_face_range(store, usage, node.first_face, node.num_faces);
                }

                for child in node.children {
                    match child {
                        NodeChild::Node(c) => {
                            if (c as usize) < nodes.len() {
                                stack.push(Frame::Enter(c));
                            } else {
                                warn!("mark: node {} child {} out of range", n, c);
                            }
                        }
                        NodeChild::Leaf(l) => {
                            if !skip_leaves {
                                mark_leaf(store, usage, l, expand_leaf_faces);
                            }
                        }
                    }
                }
            }
        }
    }
    true
}

fn mark_clip_tree(store: &MapStore, usage: &mut UsageSet, root: u32) -> bool {
    let clipnodes = store.clipnodes();
    if root as usize >= clipnodes.len() {
        warn!("mark: clip root {} out of range", root);
        return true;
    }

    let mut state = vec![WHITE; clipnodes.len()];
    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Exit(n) => state[n as usize] = BLACK,
            Frame::Enter(n) => {
                match state[n as usize] {
                    GRAY => return false,
                    BLACK => continue,
                    _ => {}
                }
                state[n as usize] = GRAY;
                stack.push(Frame::Exit(n));

                let clip = &clipnodes[n as usize];
                usage.clipnodes.set(n as usize, true);
                mark_plane(store, usage, clip.plane);

                for child in clip.children {
                    if let ClipChild::Node(c) = child {
                        if (c as usize) < clipnodes.len() {
                            stack.push(Frame::Enter(c));
                        } else {
                            warn!("mark: clipnode {} child {} out of range", n, c);
                        }
                    }
                }
            }
        }
    }
    true
}

fn mark_plane(store: &MapStore, usage: &mut UsageSet, plane: u32) {
    if (plane as usize) < store.planes().len() {
        usage.planes.set(plane as usize, true);
    } else {
        warn!("mark: plane {} out of range", plane);
    }
}

fn mark_leaf(store: &MapStore, usage: &mut UsageSet, leaf: u32, expand_faces: bool) {
    let Some(l) = store.leaves().get(leaf as usize) else {
        warn!("mark: leaf {} out of range", leaf);
        return;
    };
    usage.leaves.set(leaf as usize, true);

    if !expand_faces {
        // sub-models reuse world leaves; their marksurfaces stay world-owned
        return;
    }

    for m in l.first_marksurface..l.first_marksurface + l.num_marksurfaces {
        let Some(&face) = store.marksurfaces().get(m as usize) else {
            warn!("mark: leaf {} marksurface {} out of range", leaf, m);
            continue;
        };
        usage.marksurfaces.set(m as usize, true);
        mark_face(store, usage, face);
    }
}

fn mark_face_range(store: &MapStore, usage: &mut UsageSet, first: u32, count: u32) {
    for f in first..first + count {
        mark_face(store, usage, f);
    }
}

fn mark_face(store: &MapStore, usage: &mut UsageSet, face: u32) {
    let Some(f) = store.faces().get(face as usize) else {
        warn!("mark: face {} out of range", face);
        return;
    };
    usage.faces.set(face as usize, true);
    mark_plane(store, usage, f.plane);

    if let Some(ti) = store.texinfos().get(f.texinfo as usize) {
        usage.texinfos.set(f.texinfo as usize, true);
        if ti.miptex >= 0 && (ti.miptex as usize) < store.textures().len() {
            usage.textures.set(ti.miptex as usize, true);
        }
    } else {
        warn!("mark: face {} texinfo {} out of range", face, f.texinfo);
    }

    for s in f.first_surfedge..f.first_surfedge + f.num_surfedges {
        let Some(&se) = store.surfedges().get(s as usize) else {
            warn!("mark: face {} surfedge {} out of range", face, s);
            continue;
        };
        usage.surfedges.set(s as usize, true);
        let e = se.unsigned_abs() as usize;
        let Some(edge) = store.edges().get(e) else {
            warn!("mark: surfedge {} edge {} out of range", s, se);
            continue;
        };
        usage.edges.set(e, true);
        for v in edge.v {
            if (v as usize) < store.vertices().len() {
                usage.vertices.set(v as usize, true);
            } else {
                warn!("mark: edge {} vertex {} out of range", e, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspfile::{ClipNode, Contents, Edge, Face, Leaf, Node, TexFlags, TexInfo};
    use bsped_common::plane::Plane;

    /// Two-leaf map: one node splitting solid leaf 0 from empty leaf 1,
    /// with a single triangle face in the empty leaf.
    fn tiny_map() -> MapStore {
        let mut store = MapStore::empty();
        store.set_planes(vec![Plane::new([0.0, 0.0, 1.0], 0.0)]);
        store.set_vertices(vec![
            [0.0, 0.0, 0.0],
            [16.0, 0.0, 0.0],
            [0.0, 16.0, 0.0],
        ]);
        store.set_edges(vec![
            Edge { v: [0, 0] }, // reserved
            Edge { v: [0, 1] },
            Edge { v: [1, 2] },
            Edge { v: [2, 0] },
        ]);
        store.set_surfedges(vec![1, 2, 3]);
        store.set_texinfos(vec![TexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            miptex: -1,
            flags: TexFlags::empty(),
        }]);
        store.set_faces(vec![Face {
            plane: 0,
            side: 0,
            first_surfedge: 0,
            num_surfedges: 3,
            texinfo: 0,
            styles: [255; 4],
            light_ofs: -1,
        }]);
        store.set_marksurfaces(vec![0]);
        let mut leaves = store.leaves().to_vec();
        leaves.push(Leaf {
            contents: Contents::Empty,
            vis_ofs: -1,
            mins: [0.0; 3],
            maxs: [16.0; 3],
            first_marksurface: 0,
            num_marksurfaces: 1,
            ambient: [0; 4],
        });
        store.set_leaves(leaves);
        store.set_nodes(vec![Node {
            plane: 0,
            children: [NodeChild::Leaf(1), NodeChild::Leaf(0)],
            mins: [0.0; 3],
            maxs: [16.0; 3],
            first_face: 0,
            num_faces: 1,
        }]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[0] = 0;
        models[0].num_faces = 1;
        models[0].vis_leafs = 1;
        store.set_models(models);
        store
    }

    #[test]
    fn test_mark_world_reaches_everything() {
        let store = tiny_map();
        let usage = mark(&store, 0, false, false).unwrap();
        assert!(usage.nodes.get(0).unwrap());
        assert!(usage.planes.get(0).unwrap());
        assert!(usage.leaves.get(0).unwrap());
        assert!(usage.leaves.get(1).unwrap());
        assert!(usage.faces.get(0).unwrap());
        assert!(usage.marksurfaces.get(0).unwrap());
        for i in 0..3 {
            assert!(usage.vertices.get(i).unwrap());
        }
        for i in 1..4 {
            assert!(usage.edges.get(i).unwrap());
        }
        assert!(usage.texinfos.get(0).unwrap());
    }

    #[test]
    fn test_mark_skip_leaves() {
        let store = tiny_map();
        let usage = mark(&store, 0, true, false).unwrap();
        assert!(usage.nodes.get(0).unwrap());
        assert!(usage.planes.get(0).unwrap());
        assert!(!usage.leaves.get(1).unwrap());
        assert!(!usage.faces.get(0).unwrap());
        assert!(!usage.vertices.get(0).unwrap());
    }

    #[test]
    fn test_mark_clip_tree() {
        let mut store = tiny_map();
        store.set_planes(vec![
            Plane::new([0.0, 0.0, 1.0], 0.0),
            Plane::new([1.0, 0.0, 0.0], 8.0),
        ]);
        store.set_clipnodes(vec![ClipNode {
            plane: 1,
            children: [
                ClipChild::Contents(Contents::Empty),
                ClipChild::Contents(Contents::Solid),
            ],
        }]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[1] = 0;
        store.set_models(models);

        let usage = mark(&store, 0, false, false).unwrap();
        assert!(usage.clipnodes.get(0).unwrap());
        assert!(usage.planes.get(1).unwrap());
    }

    #[test]
    fn test_mark_rejects_cyclic_clip_tree() {
        let mut store = tiny_map();
        store.set_clipnodes(vec![
            ClipNode {
                plane: 0,
                children: [ClipChild::Node(1), ClipChild::Contents(Contents::Solid)],
            },
            ClipNode {
                plane: 0,
                children: [ClipChild::Node(0), ClipChild::Contents(Contents::Empty)],
            },
        ]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[1] = 0;
        store.set_models(models);

        assert!(mark(&store, 0, false, false).is_none());
    }

    #[test]
    fn test_mark_allows_shared_clip_subtree() {
        // diamond: both children of clipnode 0 reach clipnode 1
        let mut store = tiny_map();
        store.set_clipnodes(vec![
            ClipNode {
                plane: 0,
                children: [ClipChild::Node(1), ClipChild::Node(1)],
            },
            ClipNode {
                plane: 0,
                children: [
                    ClipChild::Contents(Contents::Empty),
                    ClipChild::Contents(Contents::Solid),
                ],
            },
        ]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[2] = 0;
        store.set_models(models);

        let usage = mark(&store, 0, false, false).unwrap();
        assert!(usage.clipnodes.get(0).unwrap());
        assert!(usage.clipnodes.get(1).unwrap());
    }

    #[test]
    fn test_mark_bad_model_index() {
        let store = tiny_map();
        assert!(mark(&store, 99, false, false).is_none());
    }

    #[test]
    fn test_usage_set_ops() {
        let store = tiny_map();
        let a = mark(&store, 0, false, false).unwrap();
        let empty = UsageSet::sized_to(&store);
        let both = a.intersect(&empty);
        assert_eq!(UsageSet::marked_count(&both.nodes), 0);

        let mut u = UsageSet::sized_to(&store);
        u.union_with(&a);
        assert_eq!(
            UsageSet::marked_count(&u.faces),
            UsageSet::marked_count(&a.faces)
        );
    }

    #[test]
    fn test_full_set_is_full() {
        let store = tiny_map();
        let full = UsageSet::full(&store);
        assert_eq!(
            UsageSet::marked_count(&full.leaves),
            store.leaves().len()
        );
    }
}
