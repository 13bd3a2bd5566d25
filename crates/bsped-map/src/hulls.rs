// hulls.rs — Collision hull synthesis
//
// Two sources for a clip tree: a 6-plane axis-aligned box (one clipnode per
// face, chained inward, outside always empty, the last inside child solid)
// and a mirror of the render tree for the non-axial planes the box cannot
// express. The mirrored planes are pushed outward along their normal by the
// hull extent of their dominant axis. That shift is a known approximation
// of the true expanded solid and drifts on steeply angled planes; it is
// exact only for convex solids.

use crate::bspfile::{
    ClipChild, ClipNode, Contents, NodeChild, HULL_SIZES, MAX_MAP_HULLS,
};
use crate::store::MapStore;
use bsped_common::math::{vector_add, Vec3};
use bsped_common::plane::Plane;
use log::warn;

/// Tree-walk depth guard; well-formed maps stay far below this.
const MAX_TREE_DEPTH: usize = 1024;

/// Entries appended by a synthesis call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HullStats {
    pub planes: usize,
    pub clipnodes: usize,
}

/// Build the chained 6-node box tree for `mins`/`maxs` expanded by the
/// hull's extents. Returns the root clipnode index.
pub fn synthesize_box_hull(store: &mut MapStore, mins: &Vec3, maxs: &Vec3, hull: usize) -> u32 {
    let mut planes = store.planes().to_vec();
    let mut clipnodes = store.clipnodes().to_vec();
    let root = box_hull(
        &mut planes,
        &mut clipnodes,
        mins,
        maxs,
        hull,
        ClipChild::Contents(Contents::Solid),
    );
    store.set_planes(planes);
    store.set_clipnodes(clipnodes);
    root
}

fn box_hull(
    planes: &mut Vec<Plane>,
    clipnodes: &mut Vec<ClipNode>,
    mins: &Vec3,
    maxs: &Vec3,
    hull: usize,
    core: ClipChild,
) -> u32 {
    let hull = hull.min(MAX_MAP_HULLS - 1);
    let emins = vector_add(mins, &HULL_SIZES[hull][0]);
    let emaxs = vector_add(maxs, &HULL_SIZES[hull][1]);

    let first = clipnodes.len() as u32;
    for i in 0..6 {
        let axis = i >> 1;
        let side = i & 1;

        let mut normal = [0.0f32; 3];
        normal[axis] = 1.0;
        let dist = if side == 0 { emaxs[axis] } else { emins[axis] };
        let plane_idx = planes.len() as u32;
        planes.push(Plane::new(normal, dist));

        let mut children = [ClipChild::Contents(Contents::Empty); 2];
        children[side ^ 1] = if i == 5 {
            core
        } else {
            ClipChild::Node(first + i as u32 + 1)
        };
        clipnodes.push(ClipNode {
            plane: plane_idx,
            children,
        });
    }
    first
}

/// Mirror a render subtree into clip structure for one hull.
///
/// Axial splits are assumed covered by box synthesis and are descended
/// through toward their solid side; every surviving non-axial plane becomes
/// a fresh clipnode with the expanded plane. Appends to the store and
/// returns the new root (a bare contents when the subtree held no non-axial
/// structure).
pub fn regenerate_from_render_tree(
    store: &mut MapStore,
    child: NodeChild,
    hull: usize,
) -> ClipChild {
    let mut planes = store.planes().to_vec();
    let mut clipnodes = store.clipnodes().to_vec();
    let root = regen_child(store, &mut planes, &mut clipnodes, child, hull, 0);
    store.set_planes(planes);
    store.set_clipnodes(clipnodes);
    root
}

fn regen_child(
    store: &MapStore,
    planes: &mut Vec<Plane>,
    clipnodes: &mut Vec<ClipNode>,
    child: NodeChild,
    hull: usize,
    depth: usize,
) -> ClipChild {
    if depth > MAX_TREE_DEPTH {
        warn!("regenerate: render tree deeper than {}, assuming solid", MAX_TREE_DEPTH);
        return ClipChild::Contents(Contents::Solid);
    }

    let node = match child {
        NodeChild::Leaf(l) => {
            let contents = store
                .leaves()
                .get(l as usize)
                .map(|leaf| leaf.contents)
                .unwrap_or_else(|| {
                    warn!("regenerate: leaf {} out of range, assuming solid", l);
                    Contents::Solid
                });
            return if contents == Contents::Solid {
                ClipChild::Contents(Contents::Solid)
            } else {
                ClipChild::Contents(Contents::Empty)
            };
        }
        NodeChild::Node(n) => match store.nodes().get(n as usize) {
            Some(node) => *node,
            None => {
                warn!("regenerate: node {} out of range, assuming solid", n);
                return ClipChild::Contents(Contents::Solid);
            }
        },
    };

    let Some(plane) = store.planes().get(node.plane as usize).copied() else {
        warn!("regenerate: plane {} out of range, assuming solid", node.plane);
        return ClipChild::Contents(Contents::Solid);
    };

    let front_solid = subtree_has_solid(store, node.children[0], depth + 1);
    let back_solid = subtree_has_solid(store, node.children[1], depth + 1);

    if plane.is_axial() {
        // the box hull owns this split; continue toward the solid interior
        let next = if back_solid {
            node.children[1]
        } else if front_solid {
            node.children[0]
        } else {
            warn!("regenerate: no solid side below axial split, assuming solid");
            return ClipChild::Contents(Contents::Solid);
        };
        return regen_child(store, planes, clipnodes, next, hull, depth + 1);
    }

    // push the plane into the empty half-space by the dominant-axis extent
    let amount = HULL_SIZES[hull.min(MAX_MAP_HULLS - 1)][1][plane.dominant_axis()];
    let dist = if front_solid && !back_solid {
        plane.dist - amount
    } else {
        plane.dist + amount
    };
    let plane_idx = planes.len() as u32;
    planes.push(Plane::new(plane.normal, dist));

    let front = regen_child(store, planes, clipnodes, node.children[0], hull, depth + 1);
    let back = regen_child(store, planes, clipnodes, node.children[1], hull, depth + 1);
    let idx = clipnodes.len() as u32;
    clipnodes.push(ClipNode {
        plane: plane_idx,
        children: [front, back],
    });
    ClipChild::Node(idx)
}

fn subtree_has_solid(store: &MapStore, child: NodeChild, depth: usize) -> bool {
    if depth > MAX_TREE_DEPTH {
        return false;
    }
    match child {
        NodeChild::Leaf(l) => store
            .leaves()
            .get(l as usize)
            .is_some_and(|leaf| leaf.contents == Contents::Solid),
        NodeChild::Node(n) => store.nodes().get(n as usize).is_some_and(|node| {
            subtree_has_solid(store, node.children[0], depth + 1)
                || subtree_has_solid(store, node.children[1], depth + 1)
        }),
    }
}

/// Rebuild the given hulls (1-3) of one model from its render tree: a box
/// over the model bounds, with the regenerated non-axial subtree grafted in
/// place of the box's solid core when the tree produced one. Rewrites the
/// model's head nodes.
pub fn regenerate_model_hulls(
    store: &mut MapStore,
    model_idx: usize,
    hulls: &[usize],
) -> Option<HullStats> {
    let Some(model) = store.models().get(model_idx).copied() else {
        warn!("regenerate_model_hulls: model {} out of range", model_idx);
        return None;
    };

    let planes_before = store.planes().len();
    let clips_before = store.clipnodes().len();
    let mut heads = model.head_nodes;

    for &hull in hulls {
        if hull == 0 || hull >= MAX_MAP_HULLS {
            warn!("regenerate_model_hulls: hull {} is not a clip hull", hull);
            continue;
        }

        let core = match model.render_root() {
            None => {
                heads[hull] = Contents::Empty.raw();
                continue;
            }
            Some(root) => regenerate_from_render_tree(store, NodeChild::Node(root), hull),
        };

        if core == ClipChild::Contents(Contents::Empty) {
            heads[hull] = Contents::Empty.raw();
            continue;
        }

        let mut planes = store.planes().to_vec();
        let mut clipnodes = store.clipnodes().to_vec();
        let root = box_hull(
            &mut planes,
            &mut clipnodes,
            &model.mins,
            &model.maxs,
            hull,
            core,
        );
        store.set_planes(planes);
        store.set_clipnodes(clipnodes);
        heads[hull] = root as i32;
    }

    let mut models = store.models().to_vec();
    models[model_idx].head_nodes = heads;
    store.set_models(models);

    Some(HullStats {
        planes: store.planes().len() - planes_before,
        clipnodes: store.clipnodes().len() - clips_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspfile::{Leaf, Node};

    fn leaf(contents: Contents) -> Leaf {
        Leaf {
            contents,
            vis_ofs: -1,
            mins: [0.0; 3],
            maxs: [0.0; 3],
            first_marksurface: 0,
            num_marksurfaces: 0,
            ambient: [0; 4],
        }
    }

    #[test]
    fn test_box_hull_point_queries() {
        let mut store = MapStore::empty();
        let root = synthesize_box_hull(&mut store, &[-16.0; 3], &[16.0; 3], 0);
        assert_eq!(store.clipnodes().len(), 6);
        assert_eq!(store.planes().len(), 6);

        let head = ClipChild::Node(root);
        assert_eq!(store.point_contents(head, &[0.0, 0.0, 0.0]), Contents::Solid);
        assert_eq!(store.point_contents(head, &[15.0, -15.0, 15.0]), Contents::Solid);
        assert_eq!(store.point_contents(head, &[20.0, 0.0, 0.0]), Contents::Empty);
        assert_eq!(store.point_contents(head, &[0.0, 0.0, -30.0]), Contents::Empty);
    }

    #[test]
    fn test_box_hull_expansion() {
        let mut store = MapStore::empty();
        let root = synthesize_box_hull(&mut store, &[-16.0; 3], &[16.0; 3], 1);
        let head = ClipChild::Node(root);

        // expanded by (16, 16, 36)
        assert_eq!(store.point_contents(head, &[28.0, 0.0, 0.0]), Contents::Solid);
        assert_eq!(store.point_contents(head, &[36.0, 0.0, 0.0]), Contents::Empty);
        assert_eq!(store.point_contents(head, &[0.0, 0.0, 48.0]), Contents::Solid);
        assert_eq!(store.point_contents(head, &[0.0, 0.0, 56.0]), Contents::Empty);
    }

    #[test]
    fn test_regenerate_axial_tree_collapses_to_solid() {
        // single axial split: solid behind, empty in front
        let mut store = MapStore::empty();
        store.set_planes(vec![Plane::new([1.0, 0.0, 0.0], 16.0)]);
        let mut leaves = store.leaves().to_vec();
        leaves.push(leaf(Contents::Empty));
        store.set_leaves(leaves);
        store.set_nodes(vec![Node {
            plane: 0,
            children: [NodeChild::Leaf(1), NodeChild::Leaf(0)],
            mins: [-16.0; 3],
            maxs: [16.0; 3],
            first_face: 0,
            num_faces: 0,
        }]);

        let out = regenerate_from_render_tree(&mut store, NodeChild::Node(0), 1);
        assert_eq!(out, ClipChild::Contents(Contents::Solid));
        // nothing appended: the axial plane belongs to the box hull
        assert_eq!(store.clipnodes().len(), 0);
    }

    #[test]
    fn test_regenerate_nonaxial_plane_is_expanded() {
        let mut store = MapStore::empty();
        let n = 1.0 / 2.0f32.sqrt();
        store.set_planes(vec![Plane::new([n, n, 0.0], 8.0)]);
        let mut leaves = store.leaves().to_vec();
        leaves.push(leaf(Contents::Empty));
        store.set_leaves(leaves);
        // empty in front, solid behind
        store.set_nodes(vec![Node {
            plane: 0,
            children: [NodeChild::Leaf(1), NodeChild::Leaf(0)],
            mins: [-16.0; 3],
            maxs: [16.0; 3],
            first_face: 0,
            num_faces: 0,
        }]);

        let out = regenerate_from_render_tree(&mut store, NodeChild::Node(0), 1);
        let ClipChild::Node(root) = out else {
            panic!("expected a clipnode, got {:?}", out);
        };
        let clip = store.clipnodes()[root as usize];
        assert_eq!(clip.children[0], ClipChild::Contents(Contents::Empty));
        assert_eq!(clip.children[1], ClipChild::Contents(Contents::Solid));

        // dominant axis x, hull 1 extent 16: plane pushed toward the empty side
        let plane = store.planes()[clip.plane as usize];
        assert_eq!(plane.dist, 8.0 + 16.0);
        assert_eq!(plane.normal, [n, n, 0.0]);
    }

    #[test]
    fn test_regenerate_solid_in_front_shifts_inward() {
        let mut store = MapStore::empty();
        let n = 1.0 / 2.0f32.sqrt();
        store.set_planes(vec![Plane::new([n, 0.0, n], 8.0)]);
        let mut leaves = store.leaves().to_vec();
        leaves.push(leaf(Contents::Empty));
        store.set_leaves(leaves);
        // solid in front, empty behind: the expansion flips sign
        store.set_nodes(vec![Node {
            plane: 0,
            children: [NodeChild::Leaf(0), NodeChild::Leaf(1)],
            mins: [-16.0; 3],
            maxs: [16.0; 3],
            first_face: 0,
            num_faces: 0,
        }]);

        let out = regenerate_from_render_tree(&mut store, NodeChild::Node(0), 2);
        let ClipChild::Node(root) = out else {
            panic!("expected a clipnode");
        };
        let plane = store.planes()[store.clipnodes()[root as usize].plane as usize];
        assert_eq!(plane.dist, 8.0 - 32.0);
    }

    #[test]
    fn test_regenerate_model_hulls_grafts_core() {
        let mut store = MapStore::empty();
        let n = 1.0 / 2.0f32.sqrt();
        store.set_planes(vec![
            Plane::new([0.0, 0.0, 1.0], 16.0),
            Plane::new([n, n, 0.0], 4.0),
        ]);
        let mut leaves = store.leaves().to_vec();
        leaves.push(leaf(Contents::Empty));
        store.set_leaves(leaves);
        store.set_nodes(vec![
            // axial root: empty above, diagonal split below
            Node {
                plane: 0,
                children: [NodeChild::Leaf(1), NodeChild::Node(1)],
                mins: [-16.0; 3],
                maxs: [16.0; 3],
                first_face: 0,
                num_faces: 0,
            },
            Node {
                plane: 1,
                children: [NodeChild::Leaf(1), NodeChild::Leaf(0)],
                mins: [-16.0; 3],
                maxs: [16.0; 3],
                first_face: 0,
                num_faces: 0,
            },
        ]);
        let mut models = store.models().to_vec();
        models[0].head_nodes[0] = 0;
        models[0].mins = [-16.0; 3];
        models[0].maxs = [16.0; 3];
        store.set_models(models);

        let stats = regenerate_model_hulls(&mut store, 0, &[1]).unwrap();
        // 1 regenerated clipnode + 6 box clipnodes
        assert_eq!(stats.clipnodes, 7);
        assert_eq!(stats.planes, 7);

        let head = store.models()[0].head_nodes[1];
        assert!(head >= 0);
        // a point deep inside the solid wedge resolves solid
        let contents = store.point_contents(
            ClipChild::Node(head as u32),
            &[-20.0, -20.0, -20.0],
        );
        assert_eq!(contents, Contents::Solid);
        // far outside the expanded box is empty
        let contents = store.point_contents(ClipChild::Node(head as u32), &[80.0, 0.0, 0.0]);
        assert_eq!(contents, Contents::Empty);
        assert!(store.validate().is_empty(), "{:?}", store.validate());
    }

    #[test]
    fn test_regenerate_model_without_tree_seals_hull_empty() {
        let mut store = MapStore::empty();
        let stats = regenerate_model_hulls(&mut store, 0, &[1, 2, 3]).unwrap();
        assert_eq!(stats.clipnodes, 0);
        for hull in 1..4 {
            assert_eq!(store.models()[0].head_nodes[hull], Contents::Empty.raw());
        }
    }
}
