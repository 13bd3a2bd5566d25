// encode.rs — Store-to-file encoder
//
// Picks the narrowest on-disk width that can represent every index, falls
// back to the extended tags when the map outgrows 16 bits, re-applies the
// quirks decode normalized away (Planes/Entities swap, monochrome
// lighting), and lays every lump out 4-byte aligned with zero padding.

use crate::bspfile::{
    BspVersion, Face, HEADER_LUMPS, IDEXTHEADER, LUMP_CLIPNODES, LUMP_EDGES, LUMP_ENTITIES,
    LUMP_FACES, LUMP_LEAVES, LUMP_LIGHTING, LUMP_MARKSURFACES, LUMP_MODELS, LUMP_NODES,
    LUMP_PLANES, LUMP_SURFEDGES, LUMP_TEXINFO, LUMP_TEXTURES, LUMP_VERTICES, LUMP_VISIBILITY,
    CLIPNODE_SIZE_V30, CLIPNODE_SIZE_WIDE, EDGE_SIZE_V30, EDGE_SIZE_WIDE, FACE_SIZE_V30,
    FACE_SIZE_WIDE, LEAF_SIZE_PSB2, LEAF_SIZE_V30, LEAF_SIZE_WIDE, MARKSURF_SIZE_V30,
    MARKSURF_SIZE_WIDE, MODEL_SIZE, NODE_SIZE_PSB2, NODE_SIZE_V30, NODE_SIZE_WIDE,
};
use crate::decode::{find_target_crc, HEADER_SIZE};
use crate::lumpdata::{
    self, encode_clipnode_v30, encode_clipnode_wide, encode_edge_v30, encode_edge_wide,
    encode_face_v30, encode_face_wide, encode_leaf_psb2, encode_leaf_v30, encode_leaf_wide,
    encode_node_psb2, encode_node_v30, encode_node_wide, serialize_records, write_i32_le,
    write_u16_le, write_u32_le,
};
use crate::store::MapStore;
use bsped_common::crc::{crc32_final, crc32_force_patch, crc32_init, crc32_update};
use log::debug;

pub fn encode(store: &MapStore) -> Vec<u8> {
    let narrow = fits_narrow(store);
    let version = match (narrow, store.version) {
        (true, BspVersion::V29) => BspVersion::V29,
        (true, BspVersion::V30) => BspVersion::V30,
        (true, _) if store.mono_lighting => BspVersion::V29,
        (true, _) => BspVersion::V30,
        (false, BspVersion::Psb2) => BspVersion::Psb2,
        (false, _) => BspVersion::Bsp2,
    };
    if version.is_extended() && !store.version.is_extended() {
        debug!("encode: map outgrew 16-bit records, writing extended format");
    }

    // faces carry lighting offsets in the on-disk unit
    let faces: Vec<Face> = if store.mono_lighting {
        store
            .faces()
            .iter()
            .map(|f| Face {
                light_ofs: if f.light_ofs >= 0 { f.light_ofs / 3 } else { f.light_ofs },
                ..*f
            })
            .collect()
    } else {
        store.faces().to_vec()
    };

    let lightdata = if store.mono_lighting {
        store.lightdata().iter().step_by(3).copied().collect()
    } else {
        store.lightdata().to_vec()
    };

    let mut blobs: Vec<Vec<u8>> = (0..HEADER_LUMPS).map(|_| Vec::new()).collect();
    blobs[LUMP_ENTITIES] = store.entities().to_vec();
    blobs[LUMP_PLANES] = lumpdata::planes_bytes(store.planes());
    blobs[LUMP_TEXTURES] = lumpdata::textures_bytes(store.textures());
    blobs[LUMP_VERTICES] = lumpdata::vertices_bytes(store.vertices());
    blobs[LUMP_VISIBILITY] = store.visdata().to_vec();
    blobs[LUMP_TEXINFO] = lumpdata::texinfos_bytes(store.texinfos());
    blobs[LUMP_LIGHTING] = lightdata;
    blobs[LUMP_SURFEDGES] = lumpdata::surfedges_bytes(store.surfedges());
    blobs[LUMP_MODELS] = lumpdata::models_bytes(store.models());

    blobs[LUMP_NODES] = match version {
        BspVersion::V29 | BspVersion::V30 => {
            serialize_records(store.nodes(), NODE_SIZE_V30, encode_node_v30)
        }
        BspVersion::Psb2 => serialize_records(store.nodes(), NODE_SIZE_PSB2, encode_node_psb2),
        BspVersion::Bsp2 => serialize_records(store.nodes(), NODE_SIZE_WIDE, encode_node_wide),
    };
    blobs[LUMP_CLIPNODES] = if version.is_extended() {
        serialize_records(store.clipnodes(), CLIPNODE_SIZE_WIDE, encode_clipnode_wide)
    } else {
        serialize_records(store.clipnodes(), CLIPNODE_SIZE_V30, encode_clipnode_v30)
    };
    blobs[LUMP_FACES] = if version.is_extended() {
        serialize_records(&faces, FACE_SIZE_WIDE, encode_face_wide)
    } else {
        serialize_records(&faces, FACE_SIZE_V30, encode_face_v30)
    };
    blobs[LUMP_LEAVES] = match version {
        BspVersion::V29 | BspVersion::V30 => {
            serialize_records(store.leaves(), LEAF_SIZE_V30, encode_leaf_v30)
        }
        BspVersion::Psb2 => serialize_records(store.leaves(), LEAF_SIZE_PSB2, encode_leaf_psb2),
        BspVersion::Bsp2 => serialize_records(store.leaves(), LEAF_SIZE_WIDE, encode_leaf_wide),
    };
    blobs[LUMP_MARKSURFACES] = if version.is_extended() {
        serialize_records(store.marksurfaces(), MARKSURF_SIZE_WIDE, |m, buf| {
            write_u32_le(buf, *m)
        })
    } else {
        serialize_records(store.marksurfaces(), MARKSURF_SIZE_V30, |m, buf| {
            write_u16_le(buf, *m as u16)
        })
    };
    blobs[LUMP_EDGES] = if version.is_extended() {
        serialize_records(store.edges(), EDGE_SIZE_WIDE, encode_edge_wide)
    } else {
        serialize_records(store.edges(), EDGE_SIZE_V30, encode_edge_v30)
    };

    // physical slot layout: the swap quirk is re-applied by crossing the
    // first two directory entries
    let entities_slot = if store.swapped_planes_entities {
        blobs.swap(LUMP_ENTITIES, LUMP_PLANES);
        LUMP_PLANES
    } else {
        LUMP_ENTITIES
    };

    if store.preserve_crc {
        patch_checksum(&mut blobs, entities_slot, store);
    }

    // assemble: header, optional aux directory, then 4-aligned lumps
    let aux = &store.aux_lumps;
    let mut out = Vec::new();
    out.resize(HEADER_SIZE, 0);
    out[..4].copy_from_slice(&version.tag().to_le_bytes());

    let mut aux_dir = 0usize;
    if !aux.is_empty() {
        out.extend_from_slice(&IDEXTHEADER.to_le_bytes());
        let mut count = Vec::new();
        write_i32_le(&mut count, aux.len() as i32);
        out.extend_from_slice(&count);
        aux_dir = out.len();
        out.resize(out.len() + aux.len() * 8, 0);
    }

    for (slot, blob) in blobs.iter().enumerate() {
        while !out.len().is_multiple_of(4) {
            out.push(0);
        }
        let ofs = out.len() as i32;
        let base = 4 + slot * 8;
        out[base..base + 4].copy_from_slice(&ofs.to_le_bytes());
        out[base + 4..base + 8].copy_from_slice(&(blob.len() as i32).to_le_bytes());
        out.extend_from_slice(blob);
    }

    for (i, blob) in aux.iter().enumerate() {
        while !out.len().is_multiple_of(4) {
            out.push(0);
        }
        let ofs = out.len() as i32;
        let base = aux_dir + i * 8;
        out[base..base + 4].copy_from_slice(&ofs.to_le_bytes());
        out[base + 4..base + 8].copy_from_slice(&(blob.len() as i32).to_le_bytes());
        out.extend_from_slice(blob);
    }

    out
}

/// Whether every index and bound fits the 16-bit record forms.
pub fn fits_narrow(store: &MapStore) -> bool {
    let i16_ok = |v: i32| (i16::MIN as i32..=i16::MAX as i32).contains(&v);
    let u16_ok = |v: u32| v <= u16::MAX as u32;
    let bounds_ok = |mins: &[f32; 3], maxs: &[f32; 3]| {
        mins.iter()
            .chain(maxs.iter())
            .all(|&b| b >= i16::MIN as f32 && b <= i16::MAX as f32)
    };

    store.nodes().iter().all(|n| {
        n.children.iter().all(|c| i16_ok(c.raw()))
            && u16_ok(n.first_face)
            && u16_ok(n.num_faces)
            && bounds_ok(&n.mins, &n.maxs)
    }) && store
        .clipnodes()
        .iter()
        .all(|c| c.children.iter().all(|ch| i16_ok(ch.raw())))
        && store.faces().iter().all(|f| {
            u16_ok(f.plane)
                && f.num_surfedges <= i16::MAX as u32
                && f.texinfo <= i16::MAX as u32
        })
        && store.leaves().iter().all(|l| {
            u16_ok(l.first_marksurface)
                && u16_ok(l.num_marksurfaces)
                && bounds_ok(&l.mins, &l.maxs)
        })
        && store.edges().iter().all(|e| e.v.iter().all(|&v| u16_ok(v)))
        && store.marksurfaces().iter().all(|&m| u16_ok(m))
}

/// The world entity records a checksum over every lump except Entities.
/// When the fresh value differs, append a dummy model record and patch its
/// trailing 4 bytes until the checksum matches.
fn patch_checksum(blobs: &mut [Vec<u8>], entities_slot: usize, store: &MapStore) {
    let Some(target) = find_target_crc(store.entities()) else {
        return;
    };

    let checksum_of = |blobs: &[Vec<u8>]| {
        let mut reg = crc32_init();
        for (slot, blob) in blobs.iter().enumerate() {
            if slot != entities_slot {
                reg = crc32_update(reg, blob);
            }
        }
        crc32_final(reg)
    };

    if checksum_of(blobs) == target {
        return;
    }

    // the Models lump is the last one in the checksum stream, so a record
    // appended there puts its tail at the stream's end
    blobs[LUMP_MODELS].extend_from_slice(&[0u8; MODEL_SIZE]);

    let mut reg = crc32_init();
    for (slot, blob) in blobs.iter().enumerate() {
        if slot == entities_slot {
            continue;
        }
        if slot == LUMP_MODELS {
            reg = crc32_update(reg, &blob[..blob.len() - 4]);
        } else {
            reg = crc32_update(reg, blob);
        }
    }
    let patch = crc32_force_patch(reg, target);
    let len = blobs[LUMP_MODELS].len();
    blobs[LUMP_MODELS][len - 4..].copy_from_slice(&patch);

    debug!("encode: appended dummy model to preserve checksum {:#010x}", target);
    debug_assert_eq!(checksum_of(blobs), target);
}
