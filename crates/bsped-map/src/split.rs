// split.rs — Shared-structure splitter
//
// Compilers dedup planes, clip trees and texinfos across models, so editing
// one model in place could silently reshape its siblings. split_shared gives
// the target model private copies of every entry it shares with any other
// model, then re-points only the target model's trees at the copies. Leaves
// (reused by every sub-model per the format) and textures (referenced by
// name semantics) stay shared by design; sharing in any other lump kind is
// not produced by known compilers and is only reported.

use crate::bspfile::{ClipChild, ClipNode};
use crate::store::MapStore;
use crate::usage::{mark, mark_all_other_models};
use bit_vec::BitVec;
use log::warn;

/// Private copies appended per lump kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub planes: usize,
    pub clipnodes: usize,
    pub texinfos: usize,
}

impl SplitStats {
    pub fn total(&self) -> usize {
        self.planes + self.clipnodes + self.texinfos
    }
}

fn shared_indices(shared: &BitVec, skip_reserved: bool) -> Vec<usize> {
    shared
        .iter()
        .enumerate()
        .filter(|&(i, b)| b && !(skip_reserved && i == 0))
        .map(|(i, _)| i)
        .collect()
}

/// Give `model_idx` private copies of everything it shares with another
/// model. Returns None when a tree walk fails (malformed map); the store is
/// left untouched in that case.
pub fn split_shared(store: &mut MapStore, model_idx: usize) -> Option<SplitStats> {
    let target = mark(store, model_idx, false, false)?;
    let others = mark_all_other_models(store, model_idx, false)?;
    let shared = target.intersect(&others);

    // kinds that are never legitimately shared: report, don't duplicate
    for (name, bits, skip_reserved) in [
        ("nodes", &shared.nodes, false),
        ("faces", &shared.faces, false),
        ("marksurfaces", &shared.marksurfaces, false),
        ("vertices", &shared.vertices, false),
        ("edges", &shared.edges, true),
        ("surfedges", &shared.surfedges, false),
    ] {
        let count = shared_indices(bits, skip_reserved).len();
        if count > 0 {
            warn!(
                "split_shared: model {} unexpectedly shares {} {}",
                model_idx, count, name
            );
        }
    }

    let shared_planes = shared_indices(&shared.planes, false);
    let shared_clipnodes = shared_indices(&shared.clipnodes, false);
    let shared_texinfos = shared_indices(&shared.texinfos, false);

    let stats = SplitStats {
        planes: shared_planes.len(),
        clipnodes: shared_clipnodes.len(),
        texinfos: shared_texinfos.len(),
    };
    if stats.total() == 0 {
        return Some(stats);
    }

    // append the private copies and record old -> new
    let mut planes = store.planes().to_vec();
    let mut plane_remap = vec![None::<u32>; planes.len()];
    for &old in &shared_planes {
        plane_remap[old] = Some(planes.len() as u32);
        planes.push(planes[old]);
    }

    let mut texinfos = store.texinfos().to_vec();
    let mut texinfo_remap = vec![None::<u32>; texinfos.len()];
    for &old in &shared_texinfos {
        texinfo_remap[old] = Some(texinfos.len() as u32);
        texinfos.push(texinfos[old]);
    }

    let mut clipnodes = store.clipnodes().to_vec();
    let mut clipnode_remap = vec![None::<u32>; clipnodes.len()];
    for &old in &shared_clipnodes {
        clipnode_remap[old] = Some(clipnodes.len() as u32);
        clipnodes.push(clipnodes[old]);
    }

    let remap_plane = |p: u32| -> u32 {
        plane_remap
            .get(p as usize)
            .copied()
            .flatten()
            .unwrap_or(p)
    };
    let remap_clip_child = |c: ClipChild| -> ClipChild {
        match c {
            ClipChild::Node(n) => ClipChild::Node(
                clipnode_remap.get(n as usize).copied().flatten().unwrap_or(n),
            ),
            other => other,
        }
    };

    // rewrite only what the target model owns or just received:
    // its nodes and faces (exclusive by construction), its exclusive
    // clipnodes, and the fresh copies
    let mut nodes = store.nodes().to_vec();
    for (i, node) in nodes.iter_mut().enumerate() {
        if target.nodes.get(i) == Some(true) {
            node.plane = remap_plane(node.plane);
        }
    }

    let mut faces = store.faces().to_vec();
    for (i, face) in faces.iter_mut().enumerate() {
        if target.faces.get(i) == Some(true) {
            face.plane = remap_plane(face.plane);
            if let Some(new) = texinfo_remap.get(face.texinfo as usize).copied().flatten() {
                face.texinfo = new;
            }
        }
    }

    let rewrite_clip = |clip: &mut ClipNode| {
        clip.plane = remap_plane(clip.plane);
        for child in &mut clip.children {
            *child = remap_clip_child(*child);
        }
    };
    for i in 0..clipnode_remap.len() {
        let is_target = target.clipnodes.get(i) == Some(true);
        match clipnode_remap[i] {
            // shared: the original stays as the siblings see it, the copy
            // becomes the target's private version
            Some(new) => rewrite_clip(&mut clipnodes[new as usize]),
            None if is_target => rewrite_clip(&mut clipnodes[i]),
            None => {}
        }
    }

    let mut models = store.models().to_vec();
    let model = &mut models[model_idx];
    for hull in 1..model.head_nodes.len() {
        let head = model.head_nodes[hull];
        if head >= 0 {
            if let Some(new) = clipnode_remap.get(head as usize).copied().flatten() {
                model.head_nodes[hull] = new as i32;
            }
        }
    }

    store.set_planes(planes);
    store.set_texinfos(texinfos);
    store.set_clipnodes(clipnodes);
    store.set_nodes(nodes);
    store.set_faces(faces);
    store.set_models(models);

    Some(stats)
}
