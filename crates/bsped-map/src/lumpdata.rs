// lumpdata.rs — Record-level byte codecs for every lump width
//
// Every on-disk record variant gets an explicit decode/encode pair; nothing
// is reinterpreted in place. The canonical layout equals the widest ("BSP2")
// layout, so `parse_*`/`*_bytes` below double as the wire format of
// `replace_lump`.

use crate::bspfile::{
    ClipChild, ClipNode, Contents, Edge, Face, Leaf, LumpKind, Model, Node, NodeChild, TexFlags,
    TexInfo, Texture, TextureSlot, CLIPNODE_SIZE_WIDE, EDGE_SIZE_WIDE, FACE_SIZE_WIDE,
    LEAF_SIZE_WIDE, MARKSURF_SIZE_WIDE, MAXLIGHTMAPS, MAX_MAP_HULLS, MODEL_SIZE, NODE_SIZE_WIDE,
    NUM_AMBIENTS, PLANE_SIZE, SURFEDGE_SIZE, TEXINFO_SIZE, VERTEX_SIZE,
};
use crate::error::DecodeError;
use bsped_common::math::Vec3;
use bsped_common::plane::Plane;
use rayon::prelude::*;

/// Below this record count, sequential parsing is faster than fan-out.
pub const PARALLEL_LUMP_THRESHOLD: usize = 256;

// ============================================================
// Byte helpers
// ============================================================

#[inline]
pub fn read_i16_le(data: &[u8], ofs: usize) -> i16 {
    i16::from_le_bytes([data[ofs], data[ofs + 1]])
}

#[inline]
pub fn read_u16_le(data: &[u8], ofs: usize) -> u16 {
    u16::from_le_bytes([data[ofs], data[ofs + 1]])
}

#[inline]
pub fn read_i32_le(data: &[u8], ofs: usize) -> i32 {
    i32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

#[inline]
pub fn read_u32_le(data: &[u8], ofs: usize) -> u32 {
    u32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

#[inline]
pub fn read_f32_le(data: &[u8], ofs: usize) -> f32 {
    f32::from_le_bytes([data[ofs], data[ofs + 1], data[ofs + 2], data[ofs + 3]])
}

#[inline]
pub fn write_i16_le(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_u16_le(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_i32_le(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_f32_le(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_vec3(data: &[u8], ofs: usize) -> Vec3 {
    [
        read_f32_le(data, ofs),
        read_f32_le(data, ofs + 4),
        read_f32_le(data, ofs + 8),
    ]
}

fn write_vec3(buf: &mut Vec<u8>, v: &Vec3) {
    write_f32_le(buf, v[0]);
    write_f32_le(buf, v[1]);
    write_f32_le(buf, v[2]);
}

fn read_bounds_i16(data: &[u8], ofs: usize) -> (Vec3, Vec3) {
    let mut mins = [0.0f32; 3];
    let mut maxs = [0.0f32; 3];
    for i in 0..3 {
        mins[i] = read_i16_le(data, ofs + i * 2) as f32;
        maxs[i] = read_i16_le(data, ofs + 6 + i * 2) as f32;
    }
    (mins, maxs)
}

fn write_bounds_i16(buf: &mut Vec<u8>, mins: &Vec3, maxs: &Vec3) {
    for i in 0..3 {
        write_i16_le(buf, mins[i].floor() as i16);
    }
    for i in 0..3 {
        write_i16_le(buf, maxs[i].ceil() as i16);
    }
}

// ============================================================
// Bulk record parse / serialize
// ============================================================

/// Split a lump into `stride`-sized records and decode each, in parallel
/// above PARALLEL_LUMP_THRESHOLD. The stride check is fatal for the lump.
pub fn parse_records<T, F>(
    lump: LumpKind,
    bytes: &[u8],
    stride: usize,
    f: F,
) -> Result<Vec<T>, DecodeError>
where
    T: Send,
    F: Fn(&[u8]) -> Result<T, DecodeError> + Sync,
{
    if !bytes.len().is_multiple_of(stride) {
        return Err(DecodeError::FunnyLumpSize {
            lump: lump.index(),
            length: bytes.len(),
            stride,
        });
    }
    let count = bytes.len() / stride;
    if count >= PARALLEL_LUMP_THRESHOLD {
        bytes.par_chunks_exact(stride).map(&f).collect()
    } else {
        bytes.chunks_exact(stride).map(&f).collect()
    }
}

pub fn serialize_records<T, F>(items: &[T], stride: usize, mut f: F) -> Vec<u8>
where
    F: FnMut(&T, &mut Vec<u8>),
{
    let mut buf = Vec::with_capacity(items.len() * stride);
    for item in items {
        f(item, &mut buf);
    }
    buf
}

// ============================================================
// Planes
// ============================================================

fn decode_plane(c: &[u8]) -> Result<Plane, DecodeError> {
    Ok(Plane {
        normal: read_vec3(c, 0),
        dist: read_f32_le(c, 12),
        ptype: read_i32_le(c, 16) as u8,
    })
}

fn encode_plane(p: &Plane, buf: &mut Vec<u8>) {
    write_vec3(buf, &p.normal);
    write_f32_le(buf, p.dist);
    write_i32_le(buf, p.ptype as i32);
}

pub fn parse_planes(bytes: &[u8]) -> Result<Vec<Plane>, DecodeError> {
    parse_records(LumpKind::Planes, bytes, PLANE_SIZE, decode_plane)
}

pub fn planes_bytes(planes: &[Plane]) -> Vec<u8> {
    serialize_records(planes, PLANE_SIZE, encode_plane)
}

// ============================================================
// Vertices
// ============================================================

pub fn parse_vertices(bytes: &[u8]) -> Result<Vec<Vec3>, DecodeError> {
    parse_records(LumpKind::Vertices, bytes, VERTEX_SIZE, |c| Ok(read_vec3(c, 0)))
}

pub fn vertices_bytes(verts: &[Vec3]) -> Vec<u8> {
    serialize_records(verts, VERTEX_SIZE, |v, buf| write_vec3(buf, v))
}

// ============================================================
// Nodes
// ============================================================

pub fn decode_node_v30(c: &[u8]) -> Result<Node, DecodeError> {
    let (mins, maxs) = read_bounds_i16(c, 8);
    Ok(Node {
        plane: read_i32_le(c, 0) as u32,
        children: [
            NodeChild::from_raw(read_i16_le(c, 4) as i32),
            NodeChild::from_raw(read_i16_le(c, 6) as i32),
        ],
        mins,
        maxs,
        first_face: read_u16_le(c, 20) as u32,
        num_faces: read_u16_le(c, 22) as u32,
    })
}

pub fn decode_node_psb2(c: &[u8]) -> Result<Node, DecodeError> {
    let (mins, maxs) = read_bounds_i16(c, 12);
    Ok(Node {
        plane: read_i32_le(c, 0) as u32,
        children: [
            NodeChild::from_raw(read_i32_le(c, 4)),
            NodeChild::from_raw(read_i32_le(c, 8)),
        ],
        mins,
        maxs,
        first_face: read_u32_le(c, 24),
        num_faces: read_u32_le(c, 28),
    })
}

pub fn decode_node_wide(c: &[u8]) -> Result<Node, DecodeError> {
    Ok(Node {
        plane: read_i32_le(c, 0) as u32,
        children: [
            NodeChild::from_raw(read_i32_le(c, 4)),
            NodeChild::from_raw(read_i32_le(c, 8)),
        ],
        mins: read_vec3(c, 12),
        maxs: read_vec3(c, 24),
        first_face: read_u32_le(c, 36),
        num_faces: read_u32_le(c, 40),
    })
}

pub fn encode_node_v30(n: &Node, buf: &mut Vec<u8>) {
    write_i32_le(buf, n.plane as i32);
    write_i16_le(buf, n.children[0].raw() as i16);
    write_i16_le(buf, n.children[1].raw() as i16);
    write_bounds_i16(buf, &n.mins, &n.maxs);
    write_u16_le(buf, n.first_face as u16);
    write_u16_le(buf, n.num_faces as u16);
}

pub fn encode_node_psb2(n: &Node, buf: &mut Vec<u8>) {
    write_i32_le(buf, n.plane as i32);
    write_i32_le(buf, n.children[0].raw());
    write_i32_le(buf, n.children[1].raw());
    write_bounds_i16(buf, &n.mins, &n.maxs);
    write_u32_le(buf, n.first_face);
    write_u32_le(buf, n.num_faces);
}

pub fn encode_node_wide(n: &Node, buf: &mut Vec<u8>) {
    write_i32_le(buf, n.plane as i32);
    write_i32_le(buf, n.children[0].raw());
    write_i32_le(buf, n.children[1].raw());
    write_vec3(buf, &n.mins);
    write_vec3(buf, &n.maxs);
    write_u32_le(buf, n.first_face);
    write_u32_le(buf, n.num_faces);
}

pub fn parse_nodes(bytes: &[u8]) -> Result<Vec<Node>, DecodeError> {
    parse_records(LumpKind::Nodes, bytes, NODE_SIZE_WIDE, decode_node_wide)
}

pub fn nodes_bytes(nodes: &[Node]) -> Vec<u8> {
    serialize_records(nodes, NODE_SIZE_WIDE, encode_node_wide)
}

// ============================================================
// Clipnodes
// ============================================================

fn clip_child(raw: i32) -> Result<ClipChild, DecodeError> {
    ClipChild::from_raw(raw).ok_or(DecodeError::BadContents(raw))
}

pub fn decode_clipnode_v30(c: &[u8]) -> Result<ClipNode, DecodeError> {
    Ok(ClipNode {
        plane: read_i32_le(c, 0) as u32,
        children: [
            clip_child(read_i16_le(c, 4) as i32)?,
            clip_child(read_i16_le(c, 6) as i32)?,
        ],
    })
}

pub fn decode_clipnode_wide(c: &[u8]) -> Result<ClipNode, DecodeError> {
    Ok(ClipNode {
        plane: read_i32_le(c, 0) as u32,
        children: [
            clip_child(read_i32_le(c, 4))?,
            clip_child(read_i32_le(c, 8))?,
        ],
    })
}

pub fn encode_clipnode_v30(n: &ClipNode, buf: &mut Vec<u8>) {
    write_i32_le(buf, n.plane as i32);
    write_i16_le(buf, n.children[0].raw() as i16);
    write_i16_le(buf, n.children[1].raw() as i16);
}

pub fn encode_clipnode_wide(n: &ClipNode, buf: &mut Vec<u8>) {
    write_i32_le(buf, n.plane as i32);
    write_i32_le(buf, n.children[0].raw());
    write_i32_le(buf, n.children[1].raw());
}

pub fn parse_clipnodes(bytes: &[u8]) -> Result<Vec<ClipNode>, DecodeError> {
    parse_records(
        LumpKind::ClipNodes,
        bytes,
        CLIPNODE_SIZE_WIDE,
        decode_clipnode_wide,
    )
}

pub fn clipnodes_bytes(nodes: &[ClipNode]) -> Vec<u8> {
    serialize_records(nodes, CLIPNODE_SIZE_WIDE, encode_clipnode_wide)
}

// ============================================================
// TexInfo
// ============================================================

fn decode_texinfo(c: &[u8]) -> Result<TexInfo, DecodeError> {
    let mut vecs = [[0.0f32; 4]; 2];
    for i in 0..2 {
        for j in 0..4 {
            vecs[i][j] = read_f32_le(c, (i * 4 + j) * 4);
        }
    }
    Ok(TexInfo {
        vecs,
        miptex: read_i32_le(c, 32),
        flags: TexFlags::from_bits_retain(read_i32_le(c, 36) as u32),
    })
}

fn encode_texinfo(t: &TexInfo, buf: &mut Vec<u8>) {
    for i in 0..2 {
        for j in 0..4 {
            write_f32_le(buf, t.vecs[i][j]);
        }
    }
    write_i32_le(buf, t.miptex);
    write_i32_le(buf, t.flags.bits() as i32);
}

pub fn parse_texinfos(bytes: &[u8]) -> Result<Vec<TexInfo>, DecodeError> {
    parse_records(LumpKind::TexInfo, bytes, TEXINFO_SIZE, decode_texinfo)
}

pub fn texinfos_bytes(infos: &[TexInfo]) -> Vec<u8> {
    serialize_records(infos, TEXINFO_SIZE, encode_texinfo)
}

// ============================================================
// Faces
// ============================================================

pub fn decode_face_v30(c: &[u8]) -> Result<Face, DecodeError> {
    let mut styles = [0u8; MAXLIGHTMAPS];
    styles.copy_from_slice(&c[12..16]);
    Ok(Face {
        plane: read_u16_le(c, 0) as u32,
        side: read_i16_le(c, 2) as u32,
        first_surfedge: read_i32_le(c, 4) as u32,
        num_surfedges: read_i16_le(c, 8) as u32,
        texinfo: read_i16_le(c, 10) as u32,
        styles,
        light_ofs: read_i32_le(c, 16),
    })
}

pub fn decode_face_wide(c: &[u8]) -> Result<Face, DecodeError> {
    let mut styles = [0u8; MAXLIGHTMAPS];
    styles.copy_from_slice(&c[20..24]);
    Ok(Face {
        plane: read_i32_le(c, 0) as u32,
        side: read_i32_le(c, 4) as u32,
        first_surfedge: read_i32_le(c, 8) as u32,
        num_surfedges: read_i32_le(c, 12) as u32,
        texinfo: read_i32_le(c, 16) as u32,
        styles,
        light_ofs: read_i32_le(c, 24),
    })
}

pub fn encode_face_v30(f: &Face, buf: &mut Vec<u8>) {
    write_u16_le(buf, f.plane as u16);
    write_i16_le(buf, f.side as i16);
    write_i32_le(buf, f.first_surfedge as i32);
    write_i16_le(buf, f.num_surfedges as i16);
    write_i16_le(buf, f.texinfo as i16);
    buf.extend_from_slice(&f.styles);
    write_i32_le(buf, f.light_ofs);
}

pub fn encode_face_wide(f: &Face, buf: &mut Vec<u8>) {
    write_i32_le(buf, f.plane as i32);
    write_i32_le(buf, f.side as i32);
    write_i32_le(buf, f.first_surfedge as i32);
    write_i32_le(buf, f.num_surfedges as i32);
    write_i32_le(buf, f.texinfo as i32);
    buf.extend_from_slice(&f.styles);
    write_i32_le(buf, f.light_ofs);
}

pub fn parse_faces(bytes: &[u8]) -> Result<Vec<Face>, DecodeError> {
    parse_records(LumpKind::Faces, bytes, FACE_SIZE_WIDE, decode_face_wide)
}

pub fn faces_bytes(faces: &[Face]) -> Vec<u8> {
    serialize_records(faces, FACE_SIZE_WIDE, encode_face_wide)
}

// ============================================================
// Leaves
// ============================================================

pub fn decode_leaf_v30(c: &[u8]) -> Result<Leaf, DecodeError> {
    let contents_raw = read_i32_le(c, 0);
    let contents =
        Contents::from_raw(contents_raw).ok_or(DecodeError::BadContents(contents_raw))?;
    let (mins, maxs) = read_bounds_i16(c, 8);
    let mut ambient = [0u8; NUM_AMBIENTS];
    ambient.copy_from_slice(&c[24..28]);
    Ok(Leaf {
        contents,
        vis_ofs: read_i32_le(c, 4),
        mins,
        maxs,
        first_marksurface: read_u16_le(c, 20) as u32,
        num_marksurfaces: read_u16_le(c, 22) as u32,
        ambient,
    })
}

pub fn decode_leaf_psb2(c: &[u8]) -> Result<Leaf, DecodeError> {
    let contents_raw = read_i32_le(c, 0);
    let contents =
        Contents::from_raw(contents_raw).ok_or(DecodeError::BadContents(contents_raw))?;
    let (mins, maxs) = read_bounds_i16(c, 8);
    let mut ambient = [0u8; NUM_AMBIENTS];
    ambient.copy_from_slice(&c[28..32]);
    Ok(Leaf {
        contents,
        vis_ofs: read_i32_le(c, 4),
        mins,
        maxs,
        first_marksurface: read_u32_le(c, 20),
        num_marksurfaces: read_u32_le(c, 24),
        ambient,
    })
}

pub fn decode_leaf_wide(c: &[u8]) -> Result<Leaf, DecodeError> {
    let contents_raw = read_i32_le(c, 0);
    let contents =
        Contents::from_raw(contents_raw).ok_or(DecodeError::BadContents(contents_raw))?;
    let mut ambient = [0u8; NUM_AMBIENTS];
    ambient.copy_from_slice(&c[40..44]);
    Ok(Leaf {
        contents,
        vis_ofs: read_i32_le(c, 4),
        mins: read_vec3(c, 8),
        maxs: read_vec3(c, 20),
        first_marksurface: read_u32_le(c, 32),
        num_marksurfaces: read_u32_le(c, 36),
        ambient,
    })
}

pub fn encode_leaf_v30(l: &Leaf, buf: &mut Vec<u8>) {
    write_i32_le(buf, l.contents.raw());
    write_i32_le(buf, l.vis_ofs);
    write_bounds_i16(buf, &l.mins, &l.maxs);
    write_u16_le(buf, l.first_marksurface as u16);
    write_u16_le(buf, l.num_marksurfaces as u16);
    buf.extend_from_slice(&l.ambient);
}

pub fn encode_leaf_psb2(l: &Leaf, buf: &mut Vec<u8>) {
    write_i32_le(buf, l.contents.raw());
    write_i32_le(buf, l.vis_ofs);
    write_bounds_i16(buf, &l.mins, &l.maxs);
    write_u32_le(buf, l.first_marksurface);
    write_u32_le(buf, l.num_marksurfaces);
    buf.extend_from_slice(&l.ambient);
}

pub fn encode_leaf_wide(l: &Leaf, buf: &mut Vec<u8>) {
    write_i32_le(buf, l.contents.raw());
    write_i32_le(buf, l.vis_ofs);
    write_vec3(buf, &l.mins);
    write_vec3(buf, &l.maxs);
    write_u32_le(buf, l.first_marksurface);
    write_u32_le(buf, l.num_marksurfaces);
    buf.extend_from_slice(&l.ambient);
}

pub fn parse_leaves(bytes: &[u8]) -> Result<Vec<Leaf>, DecodeError> {
    parse_records(LumpKind::Leaves, bytes, LEAF_SIZE_WIDE, decode_leaf_wide)
}

pub fn leaves_bytes(leaves: &[Leaf]) -> Vec<u8> {
    serialize_records(leaves, LEAF_SIZE_WIDE, encode_leaf_wide)
}

// ============================================================
// Marksurfaces, edges, surfedges
// ============================================================

pub fn parse_marksurfaces(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    parse_records(LumpKind::MarkSurfaces, bytes, MARKSURF_SIZE_WIDE, |c| {
        Ok(read_u32_le(c, 0))
    })
}

pub fn marksurfaces_bytes(marks: &[u32]) -> Vec<u8> {
    serialize_records(marks, MARKSURF_SIZE_WIDE, |m, buf| write_u32_le(buf, *m))
}

pub fn decode_edge_v30(c: &[u8]) -> Result<Edge, DecodeError> {
    Ok(Edge {
        v: [read_u16_le(c, 0) as u32, read_u16_le(c, 2) as u32],
    })
}

pub fn decode_edge_wide(c: &[u8]) -> Result<Edge, DecodeError> {
    Ok(Edge {
        v: [read_u32_le(c, 0), read_u32_le(c, 4)],
    })
}

pub fn encode_edge_v30(e: &Edge, buf: &mut Vec<u8>) {
    write_u16_le(buf, e.v[0] as u16);
    write_u16_le(buf, e.v[1] as u16);
}

pub fn encode_edge_wide(e: &Edge, buf: &mut Vec<u8>) {
    write_u32_le(buf, e.v[0]);
    write_u32_le(buf, e.v[1]);
}

pub fn parse_edges(bytes: &[u8]) -> Result<Vec<Edge>, DecodeError> {
    parse_records(LumpKind::Edges, bytes, EDGE_SIZE_WIDE, decode_edge_wide)
}

pub fn edges_bytes(edges: &[Edge]) -> Vec<u8> {
    serialize_records(edges, EDGE_SIZE_WIDE, encode_edge_wide)
}

pub fn parse_surfedges(bytes: &[u8]) -> Result<Vec<i32>, DecodeError> {
    parse_records(LumpKind::SurfEdges, bytes, SURFEDGE_SIZE, |c| {
        Ok(read_i32_le(c, 0))
    })
}

pub fn surfedges_bytes(surfedges: &[i32]) -> Vec<u8> {
    serialize_records(surfedges, SURFEDGE_SIZE, |s, buf| write_i32_le(buf, *s))
}

// ============================================================
// Models
// ============================================================

fn decode_model(c: &[u8]) -> Result<Model, DecodeError> {
    let mut head_nodes = [0i32; MAX_MAP_HULLS];
    for i in 0..MAX_MAP_HULLS {
        head_nodes[i] = read_i32_le(c, 36 + i * 4);
    }
    Ok(Model {
        mins: read_vec3(c, 0),
        maxs: read_vec3(c, 12),
        origin: read_vec3(c, 24),
        head_nodes,
        vis_leafs: read_i32_le(c, 52),
        first_face: read_i32_le(c, 56) as u32,
        num_faces: read_i32_le(c, 60) as u32,
    })
}

fn encode_model(m: &Model, buf: &mut Vec<u8>) {
    write_vec3(buf, &m.mins);
    write_vec3(buf, &m.maxs);
    write_vec3(buf, &m.origin);
    for i in 0..MAX_MAP_HULLS {
        write_i32_le(buf, m.head_nodes[i]);
    }
    write_i32_le(buf, m.vis_leafs);
    write_i32_le(buf, m.first_face as i32);
    write_i32_le(buf, m.num_faces as i32);
}

pub fn parse_models(bytes: &[u8]) -> Result<Vec<Model>, DecodeError> {
    parse_records(LumpKind::Models, bytes, MODEL_SIZE, decode_model)
}

pub fn models_bytes(models: &[Model]) -> Vec<u8> {
    serialize_records(models, MODEL_SIZE, encode_model)
}

// ============================================================
// Texture lump
//
// Layout: i32 count, count offsets relative to the lump start (-1 for a
// slot resolved from an external archive by name), then the miptex chunks.
// Chunk boundaries are recovered from the sorted offsets, so whatever
// padding a compiler left between chunks rides along with the chunk that
// owns it.
// ============================================================

pub fn parse_textures(bytes: &[u8]) -> Result<Vec<TextureSlot>, DecodeError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < 4 {
        return Err(DecodeError::BadTextureLump("short count".into()));
    }
    let count = read_i32_le(bytes, 0);
    if count < 0 || 4 + (count as usize) * 4 > bytes.len() {
        return Err(DecodeError::BadTextureLump(format!(
            "count {} does not fit the directory",
            count
        )));
    }
    let count = count as usize;

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        offsets.push(read_i32_le(bytes, 4 + i * 4));
    }

    let mut sorted: Vec<usize> = offsets
        .iter()
        .filter(|&&o| o >= 0)
        .map(|&o| o as usize)
        .collect();
    sorted.sort_unstable();

    let mut out = Vec::with_capacity(count);
    for &ofs in &offsets {
        if ofs < 0 {
            out.push(None);
            continue;
        }
        let start = ofs as usize;
        if start > bytes.len() {
            return Err(DecodeError::BadTextureLump(format!(
                "offset {} past lump end {}",
                start,
                bytes.len()
            )));
        }
        let end = sorted
            .iter()
            .find(|&&o| o > start)
            .copied()
            .unwrap_or(bytes.len());
        out.push(Some(Texture {
            bytes: bytes[start..end].to_vec(),
        }));
    }
    Ok(out)
}

pub fn textures_bytes(textures: &[TextureSlot]) -> Vec<u8> {
    if textures.is_empty() {
        return Vec::new();
    }
    let mut buf = Vec::new();
    write_i32_le(&mut buf, textures.len() as i32);
    let dir_end = 4 + textures.len() * 4;
    let mut running = dir_end;
    for slot in textures {
        match slot {
            Some(tex) => {
                write_i32_le(&mut buf, running as i32);
                running += tex.bytes.len();
            }
            None => write_i32_le(&mut buf, -1),
        }
    }
    for slot in textures.iter().flatten() {
        buf.extend_from_slice(&slot.bytes);
    }
    buf
}
