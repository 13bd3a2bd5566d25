// remap.rs — Structure remapper / compactor
//
// compact() drops every entry not marked in the usage set, renumbers the
// survivors in order, and rewrites every cross-reference through the remap
// tables. Remaps for all kinds are computed up front, so the rewrite passes
// can run in any order without seeing half-renumbered state. Entries that
// must exist for the format to stay well-formed (edge 0, leaf 0) always
// survive. When world leaves are dropped, the visibility lump is re-coded
// at the new row stride.

use crate::bspfile::{ClipChild, Contents, NodeChild};
use crate::store::MapStore;
use crate::usage::{mark, UsageSet};
use crate::vis;
use bit_vec::BitVec;
use log::{debug, warn};

/// old index -> new index per lump kind; dropped entries map to 0, which is
/// always in range and never read back for a dropped entry.
#[derive(Debug, Clone)]
pub struct RemapTable {
    pub planes: Vec<u32>,
    pub textures: Vec<u32>,
    pub vertices: Vec<u32>,
    pub nodes: Vec<u32>,
    pub texinfos: Vec<u32>,
    pub faces: Vec<u32>,
    pub clipnodes: Vec<u32>,
    pub leaves: Vec<u32>,
    pub marksurfaces: Vec<u32>,
    pub edges: Vec<u32>,
    pub surfedges: Vec<u32>,
}

impl RemapTable {
    /// True when nothing was renumbered anywhere.
    pub fn is_identity(&self) -> bool {
        fn ident(v: &[u32]) -> bool {
            v.iter().enumerate().all(|(i, &n)| i as u32 == n)
        }
        ident(&self.planes)
            && ident(&self.textures)
            && ident(&self.vertices)
            && ident(&self.nodes)
            && ident(&self.texinfos)
            && ident(&self.faces)
            && ident(&self.clipnodes)
            && ident(&self.leaves)
            && ident(&self.marksurfaces)
            && ident(&self.edges)
            && ident(&self.surfedges)
    }
}

/// Entries dropped per lump kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactStats {
    pub planes: usize,
    pub textures: usize,
    pub vertices: usize,
    pub nodes: usize,
    pub texinfos: usize,
    pub faces: usize,
    pub clipnodes: usize,
    pub leaves: usize,
    pub marksurfaces: usize,
    pub edges: usize,
    pub surfedges: usize,
}

impl CompactStats {
    pub fn total(&self) -> usize {
        self.planes
            + self.textures
            + self.vertices
            + self.nodes
            + self.texinfos
            + self.faces
            + self.clipnodes
            + self.leaves
            + self.marksurfaces
            + self.edges
            + self.surfedges
    }
}

fn build_remap(bits: &BitVec) -> Vec<u32> {
    let mut remap = vec![0u32; bits.len()];
    let mut next = 0u32;
    for i in 0..bits.len() {
        if bits.get(i) == Some(true) {
            remap[i] = next;
            next += 1;
        }
    }
    remap
}

fn filter<T: Clone>(items: &[T], bits: &BitVec) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| bits.get(*i) == Some(true))
        .map(|(_, t)| t.clone())
        .collect()
}

fn kept(bits: &BitVec, i: u32) -> bool {
    bits.get(i as usize) == Some(true)
}

/// Drop everything not marked in `keep` and rewrite all cross-references.
/// The usage set must come from the Tracker against this exact store state;
/// internal consistency is a precondition, not re-validated here.
pub fn compact(store: &mut MapStore, keep: &UsageSet) -> (RemapTable, CompactStats) {
    let mut keep = keep.clone();

    // the reserved dummy edge and the shared solid leaf always survive
    if !keep.edges.is_empty() {
        keep.edges.set(0, true);
    }
    if !keep.leaves.is_empty() {
        keep.leaves.set(0, true);
    }

    let remap = RemapTable {
        planes: build_remap(&keep.planes),
        textures: build_remap(&keep.textures),
        vertices: build_remap(&keep.vertices),
        nodes: build_remap(&keep.nodes),
        texinfos: build_remap(&keep.texinfos),
        faces: build_remap(&keep.faces),
        clipnodes: build_remap(&keep.clipnodes),
        leaves: build_remap(&keep.leaves),
        marksurfaces: build_remap(&keep.marksurfaces),
        edges: build_remap(&keep.edges),
        surfedges: build_remap(&keep.surfedges),
    };

    let mut planes = filter(store.planes(), &keep.planes);
    let mut textures = filter(store.textures(), &keep.textures);
    let mut vertices = filter(store.vertices(), &keep.vertices);
    let mut texinfos = filter(store.texinfos(), &keep.texinfos);
    let mut marksurfaces = filter(store.marksurfaces(), &keep.marksurfaces);
    let mut edges = filter(store.edges(), &keep.edges);
    let mut surfedges = filter(store.surfedges(), &keep.surfedges);
    let mut faces = filter(store.faces(), &keep.faces);
    let mut nodes = filter(store.nodes(), &keep.nodes);
    let mut clipnodes = filter(store.clipnodes(), &keep.clipnodes);
    let mut leaves = filter(store.leaves(), &keep.leaves);
    let mut models = store.models().to_vec();

    let stats = CompactStats {
        planes: store.planes().len() - planes.len(),
        textures: store.textures().len() - textures.len(),
        vertices: store.vertices().len() - vertices.len(),
        nodes: store.nodes().len() - nodes.len(),
        texinfos: store.texinfos().len() - texinfos.len(),
        faces: store.faces().len() - faces.len(),
        clipnodes: store.clipnodes().len() - clipnodes.len(),
        leaves: store.leaves().len() - leaves.len(),
        marksurfaces: store.marksurfaces().len() - marksurfaces.len(),
        edges: store.edges().len() - edges.len(),
        surfedges: store.surfedges().len() - surfedges.len(),
    };

    // geometry leaves first: edges, surfedges, marksurfaces, texinfo
    for edge in &mut edges {
        for v in &mut edge.v {
            if kept(&keep.vertices, *v) {
                *v = remap.vertices[*v as usize];
            } else if *v != 0 {
                warn!("compact: edge vertex {} dangling, clamping", v);
                *v = 0;
            }
        }
    }
    for se in &mut surfedges {
        let e = se.unsigned_abs();
        if kept(&keep.edges, e) {
            let n = remap.edges[e as usize] as i32;
            *se = if *se < 0 { -n } else { n };
        } else {
            warn!("compact: surfedge edge {} dangling, clamping", e);
            *se = 0;
        }
    }
    for mark in &mut marksurfaces {
        if kept(&keep.faces, *mark) {
            *mark = remap.faces[*mark as usize];
        } else {
            warn!("compact: marksurface face {} dangling, clamping", mark);
            *mark = 0;
        }
    }
    for ti in &mut texinfos {
        if ti.miptex >= 0 {
            if kept(&keep.textures, ti.miptex as u32) {
                ti.miptex = remap.textures[ti.miptex as usize] as i32;
            } else {
                warn!("compact: texinfo miptex {} dropped", ti.miptex);
                ti.miptex = -1;
            }
        }
    }

    // faces next: they reference planes, texinfo and surfedge runs
    for face in &mut faces {
        if kept(&keep.planes, face.plane) {
            face.plane = remap.planes[face.plane as usize];
        }
        if kept(&keep.texinfos, face.texinfo) {
            face.texinfo = remap.texinfos[face.texinfo as usize];
        }
        if face.num_surfedges > 0 && kept(&keep.surfedges, face.first_surfedge) {
            face.first_surfedge = remap.surfedges[face.first_surfedge as usize];
        }
    }

    // tree structures
    for node in &mut nodes {
        if kept(&keep.planes, node.plane) {
            node.plane = remap.planes[node.plane as usize];
        }
        for child in &mut node.children {
            *child = match *child {
                NodeChild::Node(n) => {
                    if kept(&keep.nodes, n) {
                        NodeChild::Node(remap.nodes[n as usize])
                    } else {
                        warn!("compact: node child {} dropped, pointing at solid leaf", n);
                        NodeChild::Leaf(0)
                    }
                }
                NodeChild::Leaf(l) => {
                    if kept(&keep.leaves, l) {
                        NodeChild::Leaf(remap.leaves[l as usize])
                    } else {
                        warn!("compact: leaf child {} dropped, pointing at solid leaf", l);
                        NodeChild::Leaf(0)
                    }
                }
            };
        }
        if node.num_faces > 0 {
            if kept(&keep.faces, node.first_face) {
                node.first_face = remap.faces[node.first_face as usize];
            } else {
                node.first_face = 0;
                node.num_faces = 0;
            }
        }
    }

    for clip in &mut clipnodes {
        if kept(&keep.planes, clip.plane) {
            clip.plane = remap.planes[clip.plane as usize];
        }
        for child in &mut clip.children {
            if let ClipChild::Node(n) = *child {
                *child = if kept(&keep.clipnodes, n) {
                    ClipChild::Node(remap.clipnodes[n as usize])
                } else {
                    warn!("compact: clipnode child {} dropped, sealing empty", n);
                    ClipChild::Contents(Contents::Empty)
                };
            }
        }
    }

    for leaf in &mut leaves {
        if leaf.num_marksurfaces > 0 {
            if kept(&keep.marksurfaces, leaf.first_marksurface) {
                leaf.first_marksurface = remap.marksurfaces[leaf.first_marksurface as usize];
            } else {
                // run emptied out from under the leaf: clamp to a zero-length
                // range rather than leave it dangling
                leaf.first_marksurface = 0;
                leaf.num_marksurfaces = 0;
            }
        }
    }

    // models last: they reference every tree
    for (i, model) in models.iter_mut().enumerate() {
        if model.head_nodes[0] >= 0 {
            let head = model.head_nodes[0] as u32;
            if kept(&keep.nodes, head) {
                model.head_nodes[0] = remap.nodes[head as usize] as i32;
            } else {
                debug!("compact: model {} render tree removed", i);
                model.head_nodes[0] = -1;
                model.first_face = 0;
                model.num_faces = 0;
            }
        }
        for hull in 1..model.head_nodes.len() {
            let head = model.head_nodes[hull];
            if head >= 0 {
                if kept(&keep.clipnodes, head as u32) {
                    model.head_nodes[hull] = remap.clipnodes[head as usize] as i32;
                } else {
                    model.head_nodes[hull] = Contents::Empty.raw();
                }
            }
        }
        if model.num_faces > 0 {
            if kept(&keep.faces, model.first_face) {
                model.first_face = remap.faces[model.first_face as usize];
            } else {
                model.first_face = 0;
                model.num_faces = 0;
            }
        }
    }

    // leaf count changed: every stored row must be re-coded at the new stride
    if stats.leaves > 0 {
        let old_bits = store.leaves().len().saturating_sub(1);
        let new_bits = leaves.len().saturating_sub(1);

        let mut old_of_new = vec![0u32; leaves.len()];
        for old in 0..store.leaves().len() {
            if kept(&keep.leaves, old as u32) {
                old_of_new[remap.leaves[old] as usize] = old as u32;
            }
        }

        let mut new_vis = Vec::new();
        for leaf in &mut leaves {
            if leaf.vis_ofs < 0 {
                continue;
            }
            let old_row = vis::decompress(store.visdata(), leaf.vis_ofs as usize, old_bits);
            let mut new_row = BitVec::from_elem(new_bits, false);
            for k in 0..new_bits {
                let old_leaf = old_of_new[k + 1] as usize;
                if old_leaf >= 1 && old_row.get(old_leaf - 1) == Some(true) {
                    new_row.set(k, true);
                }
            }
            leaf.vis_ofs = new_vis.len() as i32;
            new_vis.extend(vis::compress(&new_row));
        }
        store.set_visdata(new_vis);

        if let Some(world) = models.first_mut() {
            world.vis_leafs = new_bits as i32;
        }
    }

    store.set_planes(planes);
    store.set_textures(textures);
    store.set_vertices(vertices);
    store.set_texinfos(texinfos);
    store.set_marksurfaces(marksurfaces);
    store.set_edges(edges);
    store.set_surfedges(surfedges);
    store.set_faces(faces);
    store.set_nodes(nodes);
    store.set_clipnodes(clipnodes);
    store.set_leaves(leaves);
    store.set_models(models);

    if stats.total() > 0 {
        debug!("compact: dropped {} entries", stats.total());
    }

    (remap, stats)
}

/// Remove one sub-model and compact away everything only it used.
///
/// The world model cannot be deleted. Entity keyvalues referencing model
/// numbers are the entity layer's concern and are not rewritten here.
/// `progress` is called between per-model marking iterations.
pub fn delete_model(
    store: &mut MapStore,
    model_idx: usize,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> Option<(RemapTable, CompactStats)> {
    if model_idx == 0 {
        warn!("delete_model: refusing to delete the world model");
        return None;
    }
    if model_idx >= store.models().len() {
        warn!("delete_model: model {} out of range", model_idx);
        return None;
    }

    let mut models = store.models().to_vec();
    models.remove(model_idx);
    store.set_models(models);

    let total = store.models().len();
    let mut keep = UsageSet::sized_to(store);
    for i in 0..total {
        let set = mark(store, i, false, false)?;
        keep.union_with(&set);
        if let Some(cb) = progress.as_mut() {
            cb(i + 1, total);
        }
    }

    Some(compact(store, &keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspfile::{ClipNode, Edge, Face, Leaf, Model, Node, TexFlags, TexInfo};
    use bsped_common::plane::Plane;

    /// World with one referenced face and one fully orphaned face (its own
    /// texinfo, surfedges, edges and vertices are referenced by nothing).
    fn two_face_map() -> MapStore {
        let mut store = MapStore::empty();
        store.set_planes(vec![
            Plane::new([0.0, 0.0, 1.0], 0.0),
            Plane::new([1.0, 0.0, 0.0], 32.0),
            Plane::new([0.0, 1.0, 0.0], 32.0),
        ]);
        store.set_vertices(vec![
            [0.0, 0.0, 0.0],
            [16.0, 0.0, 0.0],
            [0.0, 16.0, 0.0],
            [64.0, 64.0, 0.0],
            [80.0, 64.0, 0.0],
            [64.0, 80.0, 0.0],
        ]);
        store.set_edges(vec![
            Edge { v: [0, 0] },
            Edge { v: [0, 1] },
            Edge { v: [1, 2] },
            Edge { v: [2, 0] },
            Edge { v: [3, 4] },
            Edge { v: [4, 5] },
            Edge { v: [5, 3] },
        ]);
        store.set_surfedges(vec![1, 2, 3, 4, 5, 6]);
        store.set_texinfos(vec![
            TexInfo {
                vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
                miptex: -1,
                flags: TexFlags::empty(),
            },
            TexInfo {
                vecs: [[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
                miptex: -1,
                flags: TexFlags::empty(),
            },
        ]);
        store.set_faces(vec![
            Face {
                plane: 0,
                side: 0,
                first_surfedge: 0,
                num_surfedges: 3,
                texinfo: 0,
                styles: [255; 4],
                light_ofs: -1,
            },
            Face {
                plane: 2,
                side: 0,
                first_surfedge: 3,
                num_surfedges: 3,
                texinfo: 1,
                styles: [255; 4],
                light_ofs: -1,
            },
        ]);
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
        leaves.push(Leaf {
            contents: Contents::Empty,
            vis_ofs: -1,
            mins: [64.0; 3],
            maxs: [80.0; 3],
            first_marksurface: 0,
            num_marksurfaces: 0,
            ambient: [0; 4],
        });
        store.set_leaves(leaves);
        store.set_nodes(vec![
            Node {
                plane: 1,
                children: [NodeChild::Node(1), NodeChild::Leaf(1)],
                mins: [0.0; 3],
                maxs: [96.0; 3],
                first_face: 0,
                num_faces: 0,
            },
            Node {
                plane: 2,
                children: [NodeChild::Leaf(2), NodeChild::Leaf(0)],
                mins: [0.0; 3],
                maxs: [96.0; 3],
                first_face: 0,
                num_faces: 0,
            },
        ]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[0] = 0;
        models[0].num_faces = 1;
        models[0].vis_leafs = 2;
        store.set_models(models);
        store
    }

    #[test]
    fn test_compact_full_usage_is_noop() {
        let mut store = two_face_map();
        let before_planes = store.planes().len();
        let before_faces = store.faces().len();

        let full = UsageSet::full(&store);
        let (remap, stats) = compact(&mut store, &full);
        assert_eq!(stats.total(), 0);
        assert!(remap.is_identity());
        assert_eq!(store.planes().len(), before_planes);
        assert_eq!(store.faces().len(), before_faces);
        assert!(store.validate().is_empty(), "{:?}", store.validate());

        // and again: still identity
        let full = UsageSet::full(&store);
        let (remap, stats) = compact(&mut store, &full);
        assert_eq!(stats.total(), 0);
        assert!(remap.is_identity());
    }

    #[test]
    fn test_compact_drops_orphans() {
        let mut store = two_face_map();
        let usage = mark(&store, 0, false, false).unwrap();
        let (remap, stats) = compact(&mut store, &usage);

        // face 1 and its private structures are gone, nothing else
        assert_eq!(stats.faces, 1);
        assert_eq!(stats.texinfos, 1);
        assert_eq!(stats.surfedges, 3);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.vertices, 3);
        assert_eq!(stats.planes, 0);
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.leaves, 0);

        assert_eq!(store.faces().len(), 1);
        assert_eq!(remap.faces[0], 0);
        assert!(store.validate().is_empty(), "{:?}", store.validate());
    }

    #[test]
    fn test_mark_compact_duality() {
        let mut store = two_face_map();
        let usage = mark(&store, 0, false, false).unwrap();
        compact(&mut store, &usage);

        // everything that remains is reachable again
        let usage = mark(&store, 0, false, false).unwrap();
        assert_eq!(UsageSet::marked_count(&usage.faces), store.faces().len());
        assert_eq!(UsageSet::marked_count(&usage.nodes), store.nodes().len());
        assert_eq!(UsageSet::marked_count(&usage.planes), store.planes().len());
        assert_eq!(
            UsageSet::marked_count(&usage.vertices),
            store.vertices().len()
        );
        assert_eq!(UsageSet::marked_count(&usage.edges), store.edges().len());
        assert_eq!(
            UsageSet::marked_count(&usage.surfedges),
            store.surfedges().len()
        );
        assert_eq!(UsageSet::marked_count(&usage.leaves), store.leaves().len());
    }

    #[test]
    fn test_compact_rebuilds_vis_rows() {
        let mut store = two_face_map();

        // leaf 1 sees leaf 2, leaf 2 sees leaf 1; rows are 2 bits wide
        let mut row1 = BitVec::from_elem(2, false);
        row1.set(1, true); // leaf 1 sees leaf 2
        let mut row2 = BitVec::from_elem(2, false);
        row2.set(0, true); // leaf 2 sees leaf 1
        let mut visdata = vis::compress(&row1);
        let ofs2 = visdata.len();
        visdata.extend(vis::compress(&row2));
        store.set_visdata(visdata);

        let mut leaves = store.leaves().to_vec();
        leaves[1].vis_ofs = 0;
        leaves[2].vis_ofs = ofs2 as i32;
        store.set_leaves(leaves);

        // drop leaf 1 (and the face structures it holds)
        let mut keep = UsageSet::full(&store);
        keep.leaves.set(1, false);
        let (remap, stats) = compact(&mut store, &keep);
        assert_eq!(stats.leaves, 1);

        // old leaf 2 is now leaf 1, with a 1-bit row that sees nothing
        let new_idx = remap.leaves[2] as usize;
        assert_eq!(new_idx, 1);
        let leaf = store.leaves()[new_idx];
        assert!(leaf.vis_ofs >= 0);
        let row = vis::decompress(store.visdata(), leaf.vis_ofs as usize, 1);
        assert_eq!(row.get(0), Some(false));
        assert_eq!(store.models()[0].vis_leafs, 1);
    }

    #[test]
    fn test_compact_removed_render_tree_resets_model() {
        let mut store = two_face_map();
        let mut keep = UsageSet::full(&store);
        for n in 0..store.nodes().len() {
            keep.nodes.set(n, false);
        }
        compact(&mut store, &keep);
        let world = store.models()[0];
        assert_eq!(world.head_nodes[0], -1);
        assert_eq!(world.num_faces, 0);
        assert!(store.nodes().is_empty());
    }

    #[test]
    fn test_compact_seals_dropped_clipnode_children() {
        let mut store = two_face_map();
        store.set_clipnodes(vec![
            ClipNode {
                plane: 0,
                children: [ClipChild::Node(1), ClipChild::Contents(Contents::Solid)],
            },
            ClipNode {
                plane: 1,
                children: [
                    ClipChild::Contents(Contents::Empty),
                    ClipChild::Contents(Contents::Solid),
                ],
            },
        ]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[1] = 0;
        store.set_models(models);

        let mut keep = UsageSet::full(&store);
        keep.clipnodes.set(1, false);
        compact(&mut store, &keep);

        assert_eq!(store.clipnodes().len(), 1);
        assert_eq!(
            store.clipnodes()[0].children[0],
            ClipChild::Contents(Contents::Empty)
        );
    }

    #[test]
    fn test_delete_model_refuses_world() {
        let mut store = two_face_map();
        assert!(delete_model(&mut store, 0, None).is_none());
    }

    #[test]
    fn test_delete_model_removes_private_structures() {
        let mut store = two_face_map();

        // give the map a sub-model owning one private clipnode + plane
        let mut planes = store.planes().to_vec();
        planes.push(Plane::new([0.0, 1.0, 0.0], -64.0));
        let private_plane = (planes.len() - 1) as u32;
        store.set_planes(planes);
        store.set_clipnodes(vec![ClipNode {
            plane: private_plane,
            children: [
                ClipChild::Contents(Contents::Empty),
                ClipChild::Contents(Contents::Solid),
            ],
        }]);
        let mut models = store.models().to_vec();
        models.push(Model {
            mins: [0.0; 3],
            maxs: [8.0; 3],
            origin: [0.0; 3],
            head_nodes: [-1, 0, -1, -1],
            vis_leafs: 0,
            first_face: 0,
            num_faces: 0,
        });
        store.set_models(models);

        let planes_before = store.planes().len();
        let mut calls = 0usize;
        let (_, stats) = {
            let mut cb = |_done: usize, _total: usize| calls += 1;
            delete_model(&mut store, 1, Some(&mut cb)).unwrap()
        };
        assert_eq!(store.models().len(), 1);
        assert_eq!(stats.clipnodes, 1);
        assert_eq!(store.planes().len(), planes_before - 1);
        assert!(calls >= 1);
        assert!(store.validate().is_empty(), "{:?}", store.validate());
    }
}
