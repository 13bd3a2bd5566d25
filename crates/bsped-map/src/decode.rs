// decode.rs — File-to-store decoder
//
// All-or-nothing: any truncation, unknown version tag, out-of-range lump
// directory entry or mis-strided record lump fails the whole load. Records
// are upconverted to the canonical wide layout in one pass; which narrow
// form they arrived in is remembered only as the file's version tag.

use crate::bspfile::{
    BspVersion, Edge, Face, Lump, LumpKind, TexFlags, TexInfo, HEADER_LUMPS, IDEXTHEADER,
    LM_SAMPLE_SIZE,
    LUMP_CLIPNODES, LUMP_EDGES, LUMP_ENTITIES, LUMP_FACES, LUMP_LEAVES, LUMP_LIGHTING,
    LUMP_MARKSURFACES, LUMP_MODELS, LUMP_NODES, LUMP_PLANES, LUMP_SURFEDGES, LUMP_TEXINFO,
    LUMP_TEXTURES, LUMP_VERTICES, LUMP_VISIBILITY, CLIPNODE_SIZE_V30, CLIPNODE_SIZE_WIDE,
    EDGE_SIZE_V30, EDGE_SIZE_WIDE, FACE_SIZE_V30, FACE_SIZE_WIDE, LEAF_SIZE_PSB2, LEAF_SIZE_V30,
    LEAF_SIZE_WIDE, MARKSURF_SIZE_V30, MARKSURF_SIZE_WIDE, NODE_SIZE_PSB2, NODE_SIZE_V30,
    NODE_SIZE_WIDE,
};
use crate::error::DecodeError;
use crate::lumpdata::{
    self, parse_records, read_i32_le, read_u16_le, read_u32_le,
};
use crate::store::MapStore;
use bsped_common::math::{dot_product, Vec3};
use log::debug;

/// Header size: version tag plus the fixed lump directory.
pub const HEADER_SIZE: usize = 4 + HEADER_LUMPS * 8;

/// How far into the nominal Entities lump the entity token is searched for.
const ENTITY_TOKEN_WINDOW: usize = 1024;

/// Key in the world entity naming the checksum the file wants preserved.
pub const CRC_KEY: &[u8] = b"\"origcrc\"";

/// Largest believable auxiliary-lump count.
const MAX_AUX_LUMPS: usize = 64;

pub fn decode(data: &[u8]) -> Result<MapStore, DecodeError> {
    if data.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated(data.len()));
    }

    let tag = read_u32_le(data, 0);
    let version = BspVersion::from_tag(tag).ok_or(DecodeError::BadVersion(tag))?;

    let mut lumps = [Lump::default(); HEADER_LUMPS];
    for i in 0..HEADER_LUMPS {
        let base = 4 + i * 8;
        let ofs = read_i32_le(data, base);
        let len = read_i32_le(data, base + 4);
        if ofs < 0 || len < 0 || (ofs as usize) + (len as usize) > data.len() {
            return Err(DecodeError::LumpOutOfRange {
                lump: i,
                offset: ofs as u32,
                length: len as u32,
                file_len: data.len(),
            });
        }
        lumps[i] = Lump {
            fileofs: ofs as u32,
            filelen: len as u32,
        };
    }

    let slice = |i: usize| {
        let l = &lumps[i];
        &data[l.fileofs as usize..(l.fileofs + l.filelen) as usize]
    };

    // optional auxiliary lump directory directly after the fixed one
    let mut aux_lumps = Vec::new();
    if data.len() >= HEADER_SIZE + 8 && read_u32_le(data, HEADER_SIZE) == IDEXTHEADER {
        let count = read_i32_le(data, HEADER_SIZE + 4);
        if count < 0 || count as usize > MAX_AUX_LUMPS {
            return Err(DecodeError::BadExtendedHeader(format!(
                "aux lump count {}",
                count
            )));
        }
        let dir = HEADER_SIZE + 8;
        if data.len() < dir + count as usize * 8 {
            return Err(DecodeError::Truncated(data.len()));
        }
        for i in 0..count as usize {
            let ofs = read_i32_le(data, dir + i * 8);
            let len = read_i32_le(data, dir + i * 8 + 4);
            if ofs < 0 || len < 0 || (ofs as usize) + (len as usize) > data.len() {
                return Err(DecodeError::BadExtendedHeader(format!(
                    "aux lump {} out of range",
                    i
                )));
            }
            aux_lumps.push(data[ofs as usize..(ofs + len) as usize].to_vec());
        }
        debug!("decode: {} auxiliary lumps", aux_lumps.len());
    }

    // Some legacy encoders write the Planes and Entities directory entries
    // swapped. The entities text is recognizable; raw plane records are not.
    let nominal_entities = slice(LUMP_ENTITIES);
    let nominal_planes = slice(LUMP_PLANES);
    let swapped = !has_entity_token(nominal_entities) && has_entity_token(nominal_planes);
    let (entity_bytes, plane_bytes) = if swapped {
        debug!("decode: Planes/Entities lumps are swapped");
        (nominal_planes, nominal_entities)
    } else {
        (nominal_entities, nominal_planes)
    };

    let planes = lumpdata::parse_planes(plane_bytes)?;
    let textures = lumpdata::parse_textures(slice(LUMP_TEXTURES))?;
    let vertices = lumpdata::parse_vertices(slice(LUMP_VERTICES))?;

    let nodes = match version {
        BspVersion::V29 | BspVersion::V30 => parse_records(
            LumpKind::Nodes,
            slice(LUMP_NODES),
            NODE_SIZE_V30,
            lumpdata::decode_node_v30,
        )?,
        BspVersion::Psb2 => parse_records(
            LumpKind::Nodes,
            slice(LUMP_NODES),
            NODE_SIZE_PSB2,
            lumpdata::decode_node_psb2,
        )?,
        BspVersion::Bsp2 => parse_records(
            LumpKind::Nodes,
            slice(LUMP_NODES),
            NODE_SIZE_WIDE,
            lumpdata::decode_node_wide,
        )?,
    };

    let clipnodes = if version.is_extended() {
        parse_records(
            LumpKind::ClipNodes,
            slice(LUMP_CLIPNODES),
            CLIPNODE_SIZE_WIDE,
            lumpdata::decode_clipnode_wide,
        )?
    } else {
        parse_records(
            LumpKind::ClipNodes,
            slice(LUMP_CLIPNODES),
            CLIPNODE_SIZE_V30,
            lumpdata::decode_clipnode_v30,
        )?
    };

    let texinfos = lumpdata::parse_texinfos(slice(LUMP_TEXINFO))?;

    let mut faces = if version.is_extended() {
        parse_records(
            LumpKind::Faces,
            slice(LUMP_FACES),
            FACE_SIZE_WIDE,
            lumpdata::decode_face_wide,
        )?
    } else {
        parse_records(
            LumpKind::Faces,
            slice(LUMP_FACES),
            FACE_SIZE_V30,
            lumpdata::decode_face_v30,
        )?
    };

    let leaves = match version {
        BspVersion::V29 | BspVersion::V30 => parse_records(
            LumpKind::Leaves,
            slice(LUMP_LEAVES),
            LEAF_SIZE_V30,
            lumpdata::decode_leaf_v30,
        )?,
        BspVersion::Psb2 => parse_records(
            LumpKind::Leaves,
            slice(LUMP_LEAVES),
            LEAF_SIZE_PSB2,
            lumpdata::decode_leaf_psb2,
        )?,
        BspVersion::Bsp2 => parse_records(
            LumpKind::Leaves,
            slice(LUMP_LEAVES),
            LEAF_SIZE_WIDE,
            lumpdata::decode_leaf_wide,
        )?,
    };

    let marksurfaces = if version.is_extended() {
        parse_records(
            LumpKind::MarkSurfaces,
            slice(LUMP_MARKSURFACES),
            MARKSURF_SIZE_WIDE,
            |c| Ok(read_u32_le(c, 0)),
        )?
    } else {
        parse_records(
            LumpKind::MarkSurfaces,
            slice(LUMP_MARKSURFACES),
            MARKSURF_SIZE_V30,
            |c| Ok(read_u16_le(c, 0) as u32),
        )?
    };

    let edges = if version.is_extended() {
        parse_records(
            LumpKind::Edges,
            slice(LUMP_EDGES),
            EDGE_SIZE_WIDE,
            lumpdata::decode_edge_wide,
        )?
    } else {
        parse_records(
            LumpKind::Edges,
            slice(LUMP_EDGES),
            EDGE_SIZE_V30,
            lumpdata::decode_edge_v30,
        )?
    };

    let surfedges = lumpdata::parse_surfedges(slice(LUMP_SURFEDGES))?;
    let models = lumpdata::parse_models(slice(LUMP_MODELS))?;

    let visdata = slice(LUMP_VISIBILITY).to_vec();
    let mut lightdata = slice(LUMP_LIGHTING).to_vec();
    let entities = entity_bytes.to_vec();

    // monochrome vs RGB lighting: compare the luxel total implied by the
    // face extents against the actual lump length
    let luxels = total_luxels(&faces, &texinfos, &vertices, &edges, &surfedges);
    let mono = !lightdata.is_empty()
        && luxels > 0
        && lightdata.len().abs_diff(luxels) < lightdata.len().abs_diff(luxels * 3);
    if mono {
        debug!(
            "decode: monochrome lighting ({} bytes for {} luxels), expanding",
            lightdata.len(),
            luxels
        );
        let mut rgb = Vec::with_capacity(lightdata.len() * 3);
        for &b in &lightdata {
            rgb.extend_from_slice(&[b, b, b]);
        }
        lightdata = rgb;
        for face in &mut faces {
            if face.light_ofs >= 0 {
                face.light_ofs *= 3;
            }
        }
    }

    let preserve_crc = find_target_crc(&entities).is_some();

    Ok(MapStore {
        version,
        entities,
        planes,
        textures,
        vertices,
        visdata,
        nodes,
        texinfos,
        faces,
        lightdata,
        clipnodes,
        leaves,
        marksurfaces,
        edges,
        surfedges,
        models,
        swapped_planes_entities: swapped,
        mono_lighting: mono,
        aux_lumps,
        preserve_crc,
    })
}

/// A lump is entity text when the worldspawn key token shows up early.
fn has_entity_token(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(ENTITY_TOKEN_WINDOW)];
    window
        .windows(b"\"classname\"".len())
        .any(|w| w == b"\"classname\"")
}

/// Checksum the world entity wants preserved, if it records one.
pub fn find_target_crc(entities: &[u8]) -> Option<u32> {
    let pos = entities
        .windows(CRC_KEY.len())
        .position(|w| w == CRC_KEY)?;
    let rest = &entities[pos + CRC_KEY.len()..];
    let open = rest.iter().position(|&b| b == b'"')?;
    let rest = &rest[open + 1..];
    let close = rest.iter().position(|&b| b == b'"')?;
    std::str::from_utf8(&rest[..close]).ok()?.trim().parse().ok()
}

// ============================================================
// Lightmap extents
// ============================================================

/// Lightmap sample count for one face, from its s/t extents.
pub fn face_luxels(
    face: &Face,
    texinfos: &[TexInfo],
    vertices: &[Vec3],
    edges: &[Edge],
    surfedges: &[i32],
) -> usize {
    if face.light_ofs < 0 || face.num_surfedges == 0 {
        return 0;
    }
    let Some(ti) = texinfos.get(face.texinfo as usize) else {
        return 0;
    };
    if ti.flags.contains(TexFlags::SPECIAL) {
        return 0;
    }

    let mut min_st = [f32::MAX; 2];
    let mut max_st = [f32::MIN; 2];
    for s in face.first_surfedge..face.first_surfedge + face.num_surfedges {
        let Some(&se) = surfedges.get(s as usize) else {
            return 0;
        };
        let Some(edge) = edges.get(se.unsigned_abs() as usize) else {
            return 0;
        };
        let v = if se >= 0 { edge.v[0] } else { edge.v[1] };
        let Some(point) = vertices.get(v as usize) else {
            return 0;
        };
        for axis in 0..2 {
            let vecs = &ti.vecs[axis];
            let val = dot_product(point, &[vecs[0], vecs[1], vecs[2]]) + vecs[3];
            min_st[axis] = min_st[axis].min(val);
            max_st[axis] = max_st[axis].max(val);
        }
    }

    let mut size = [0usize; 2];
    for axis in 0..2 {
        let bmin = (min_st[axis] / LM_SAMPLE_SIZE as f32).floor() as i64;
        let bmax = (max_st[axis] / LM_SAMPLE_SIZE as f32).ceil() as i64;
        size[axis] = (bmax - bmin + 1).max(0) as usize;
    }
    size[0] * size[1]
}

fn total_luxels(
    faces: &[Face],
    texinfos: &[TexInfo],
    vertices: &[Vec3],
    edges: &[Edge],
    surfedges: &[i32],
) -> usize {
    faces
        .iter()
        .map(|f| face_luxels(f, texinfos, vertices, edges, surfedges))
        .sum()
}
