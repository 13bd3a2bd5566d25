// bspfile.rs — On-disk BSP format constants and canonical record types
//
// Four version tags share one lump layout and differ only in record widths:
// 29 and 30 use 16-bit indices for tree children, faces, edges and
// marksurfaces; the "BSP2" and "2PSB" magics widen everything to 32 bits
// ("2PSB" keeps i16 node/leaf bounds, "BSP2" stores them as floats). The
// canonical in-memory representation is the widest form; narrow records
// exist only inside the codec.

use bsped_common::math::Vec3;

// ============================================================
// Version tags
// ============================================================

pub const BSPVERSION_29: i32 = 29;
pub const BSPVERSION_30: i32 = 30;

/// "BSP2" in little-endian
pub const IDBSP2HEADER: u32 =
    (b'2' as u32) << 24 | (b'P' as u32) << 16 | (b'S' as u32) << 8 | b'B' as u32;
/// "2PSB" in little-endian
pub const ID2PSBHEADER: u32 =
    (b'B' as u32) << 24 | (b'S' as u32) << 16 | (b'P' as u32) << 8 | b'2' as u32;

/// Extended auxiliary-lump directory magic, "XLMP" in little-endian
pub const IDEXTHEADER: u32 =
    (b'P' as u32) << 24 | (b'M' as u32) << 16 | (b'L' as u32) << 8 | b'X' as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BspVersion {
    /// version 29, 16-bit records, monochrome lighting
    V29,
    /// version 30, 16-bit records, RGB lighting
    V30,
    /// "BSP2" magic, 32-bit records, float tree bounds
    Bsp2,
    /// "2PSB" magic, 32-bit records, i16 tree bounds
    Psb2,
}

impl BspVersion {
    pub fn is_extended(self) -> bool {
        matches!(self, BspVersion::Bsp2 | BspVersion::Psb2)
    }

    /// The 4 bytes written at the start of the file.
    pub fn tag(self) -> u32 {
        match self {
            BspVersion::V29 => BSPVERSION_29 as u32,
            BspVersion::V30 => BSPVERSION_30 as u32,
            BspVersion::Bsp2 => IDBSP2HEADER,
            BspVersion::Psb2 => ID2PSBHEADER,
        }
    }

    pub fn from_tag(tag: u32) -> Option<BspVersion> {
        match tag {
            t if t == BSPVERSION_29 as u32 => Some(BspVersion::V29),
            t if t == BSPVERSION_30 as u32 => Some(BspVersion::V30),
            IDBSP2HEADER => Some(BspVersion::Bsp2),
            ID2PSBHEADER => Some(BspVersion::Psb2),
            _ => None,
        }
    }
}

// ============================================================
// Lump directory
// ============================================================

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_TEXTURES: usize = 2;
pub const LUMP_VERTICES: usize = 3;
pub const LUMP_VISIBILITY: usize = 4;
pub const LUMP_NODES: usize = 5;
pub const LUMP_TEXINFO: usize = 6;
pub const LUMP_FACES: usize = 7;
pub const LUMP_LIGHTING: usize = 8;
pub const LUMP_CLIPNODES: usize = 9;
pub const LUMP_LEAVES: usize = 10;
pub const LUMP_MARKSURFACES: usize = 11;
pub const LUMP_EDGES: usize = 12;
pub const LUMP_SURFEDGES: usize = 13;
pub const LUMP_MODELS: usize = 14;
pub const HEADER_LUMPS: usize = 15;

/// One typed array section of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LumpKind {
    Entities,
    Planes,
    Textures,
    Vertices,
    Visibility,
    Nodes,
    TexInfo,
    Faces,
    Lighting,
    ClipNodes,
    Leaves,
    MarkSurfaces,
    Edges,
    SurfEdges,
    Models,
}

impl LumpKind {
    pub const ALL: [LumpKind; HEADER_LUMPS] = [
        LumpKind::Entities,
        LumpKind::Planes,
        LumpKind::Textures,
        LumpKind::Vertices,
        LumpKind::Visibility,
        LumpKind::Nodes,
        LumpKind::TexInfo,
        LumpKind::Faces,
        LumpKind::Lighting,
        LumpKind::ClipNodes,
        LumpKind::Leaves,
        LumpKind::MarkSurfaces,
        LumpKind::Edges,
        LumpKind::SurfEdges,
        LumpKind::Models,
    ];

    /// Directory slot for this lump kind.
    pub fn index(self) -> usize {
        match self {
            LumpKind::Entities => LUMP_ENTITIES,
            LumpKind::Planes => LUMP_PLANES,
            LumpKind::Textures => LUMP_TEXTURES,
            LumpKind::Vertices => LUMP_VERTICES,
            LumpKind::Visibility => LUMP_VISIBILITY,
            LumpKind::Nodes => LUMP_NODES,
            LumpKind::TexInfo => LUMP_TEXINFO,
            LumpKind::Faces => LUMP_FACES,
            LumpKind::Lighting => LUMP_LIGHTING,
            LumpKind::ClipNodes => LUMP_CLIPNODES,
            LumpKind::Leaves => LUMP_LEAVES,
            LumpKind::MarkSurfaces => LUMP_MARKSURFACES,
            LumpKind::Edges => LUMP_EDGES,
            LumpKind::SurfEdges => LUMP_SURFEDGES,
            LumpKind::Models => LUMP_MODELS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lump {
    pub fileofs: u32,
    pub filelen: u32,
}

// ============================================================
// Design bounds (classic compiler limits; the extended formats
// exceed them, so these drive validation warnings, not errors)
// ============================================================

pub const MAX_MAP_MODELS: usize = 400;
pub const MAX_MAP_PLANES: usize = 32767;
pub const MAX_MAP_NODES: usize = 32767;
pub const MAX_MAP_CLIPNODES: usize = 32767;
pub const MAX_MAP_LEAVES: usize = 8192;
pub const MAX_MAP_VERTS: usize = 65535;
pub const MAX_MAP_FACES: usize = 65535;
pub const MAX_MAP_MARKSURFACES: usize = 65535;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_EDGES: usize = 256000;
pub const MAX_MAP_SURFEDGES: usize = 512000;

pub const MAX_MAP_HULLS: usize = 4;

pub const MAXLIGHTMAPS: usize = 4;
pub const NUM_AMBIENTS: usize = 4;

/// Texels per lightmap luxel on each axis.
pub const LM_SAMPLE_SIZE: i32 = 16;

pub const MIPLEVELS: usize = 4;
/// miptex header: 16-byte name + width + height + 4 mip offsets
pub const MIPTEX_HEADER_SIZE: usize = 16 + 4 + 4 + 4 * MIPLEVELS;
pub const MIPTEX_PALETTE_SIZE: usize = 256 * 3;

// ============================================================
// Contents
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Contents {
    Empty = -1,
    Solid = -2,
    Water = -3,
    Slime = -4,
    Lava = -5,
    Sky = -6,
    Origin = -7,
    Clip = -8,
    Current0 = -9,
    Current90 = -10,
    Current180 = -11,
    Current270 = -12,
    CurrentUp = -13,
    CurrentDown = -14,
    Translucent = -15,
}

impl Contents {
    pub fn from_raw(raw: i32) -> Option<Contents> {
        Some(match raw {
            -1 => Contents::Empty,
            -2 => Contents::Solid,
            -3 => Contents::Water,
            -4 => Contents::Slime,
            -5 => Contents::Lava,
            -6 => Contents::Sky,
            -7 => Contents::Origin,
            -8 => Contents::Clip,
            -9 => Contents::Current0,
            -10 => Contents::Current90,
            -11 => Contents::Current180,
            -12 => Contents::Current270,
            -13 => Contents::CurrentUp,
            -14 => Contents::CurrentDown,
            -15 => Contents::Translucent,
            _ => return None,
        })
    }

    #[inline]
    pub fn raw(self) -> i32 {
        self as i32
    }
}

// ============================================================
// Tagged child references
//
// On disk a child field is either a non-negative index or an encoded
// negative: nodes complement a leaf index, clipnodes overload small
// negatives as contents. The packed form exists only in the codec.
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChild {
    Node(u32),
    Leaf(u32),
}

impl NodeChild {
    pub fn from_raw(raw: i32) -> NodeChild {
        if raw >= 0 {
            NodeChild::Node(raw as u32)
        } else {
            NodeChild::Leaf(!raw as u32)
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            NodeChild::Node(n) => n as i32,
            NodeChild::Leaf(l) => !(l as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipChild {
    Node(u32),
    Contents(Contents),
}

impl ClipChild {
    pub fn from_raw(raw: i32) -> Option<ClipChild> {
        if raw >= 0 {
            Some(ClipChild::Node(raw as u32))
        } else {
            Contents::from_raw(raw).map(ClipChild::Contents)
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            ClipChild::Node(n) => n as i32,
            ClipChild::Contents(c) => c.raw(),
        }
    }
}

// ============================================================
// TexInfo flags
// ============================================================

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TexFlags: u32 {
        /// sky or liquid: no lightmap, subdivided purely for warp
        const SPECIAL = 1;
    }
}

// ============================================================
// Canonical (wide) record types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub plane: u32,
    pub children: [NodeChild; 2],
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_face: u32,
    pub num_faces: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipNode {
    pub plane: u32,
    pub children: [ClipChild; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    pub plane: u32,
    /// nonzero: face normal is the plane normal negated
    pub side: u32,
    pub first_surfedge: u32,
    pub num_surfedges: u32,
    pub texinfo: u32,
    pub styles: [u8; MAXLIGHTMAPS],
    /// byte offset into the lighting lump, -1 = unlit
    pub light_ofs: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexInfo {
    /// s/t axis vectors with shift in the fourth component
    pub vecs: [[f32; 4]; 2],
    pub miptex: i32,
    pub flags: TexFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf {
    pub contents: Contents,
    /// byte offset into the visibility lump, -1 = no vis (sees everything)
    pub vis_ofs: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_marksurface: u32,
    pub num_marksurfaces: u32,
    pub ambient: [u8; NUM_AMBIENTS],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub v: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    /// slot 0: render tree root (negative = empty); 1-3: clip hulls
    /// (non-negative = clipnode index, negative = contents sentinel)
    pub head_nodes: [i32; MAX_MAP_HULLS],
    pub vis_leafs: i32,
    pub first_face: u32,
    pub num_faces: u32,
}

impl Model {
    /// Render tree root, if the model has one.
    pub fn render_root(&self) -> Option<u32> {
        if self.head_nodes[0] >= 0 {
            Some(self.head_nodes[0] as u32)
        } else {
            None
        }
    }

    /// Hull 1-3 root as a tagged child.
    pub fn hull_root(&self, hull: usize) -> ClipChild {
        debug_assert!(hull >= 1 && hull < MAX_MAP_HULLS);
        ClipChild::from_raw(self.head_nodes[hull])
            .unwrap_or(ClipChild::Contents(Contents::Empty))
    }
}

/// One entry of the texture lump; `None` marks a directory slot whose
/// offset is -1 (texture referenced by name from an external archive).
pub type TextureSlot = Option<Texture>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    /// raw miptex bytes: header, optional mip data, optional palette
    pub bytes: Vec<u8>,
}

impl Texture {
    pub fn name(&self) -> String {
        let raw = &self.bytes[..self.bytes.len().min(16)];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).to_string()
    }

    pub fn width(&self) -> u32 {
        if self.bytes.len() >= 20 {
            u32::from_le_bytes([self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19]])
        } else {
            0
        }
    }

    pub fn height(&self) -> u32 {
        if self.bytes.len() >= 24 {
            u32::from_le_bytes([self.bytes[20], self.bytes[21], self.bytes[22], self.bytes[23]])
        } else {
            0
        }
    }

    /// Whether the first mip offset is nonzero, i.e. pixel data is embedded.
    pub fn is_embedded(&self) -> bool {
        self.bytes.len() >= MIPTEX_HEADER_SIZE
            && u32::from_le_bytes([self.bytes[24], self.bytes[25], self.bytes[26], self.bytes[27]])
                != 0
    }

    /// Expected byte count for header plus the four mip levels.
    pub fn expected_mip_size(&self) -> usize {
        let pixels = (self.width() as usize) * (self.height() as usize);
        MIPTEX_HEADER_SIZE + pixels + pixels / 4 + pixels / 16 + pixels / 64
    }

    /// Whether the embedded data carries an explicit palette after the mips.
    pub fn has_palette(&self) -> bool {
        self.is_embedded() && self.bytes.len() >= self.expected_mip_size() + 2 + MIPTEX_PALETTE_SIZE
    }
}

// ============================================================
// Hull dimensions
// ============================================================

/// Per-hull bounding boxes: 0 = point, 1 = standing player,
/// 2 = large, 3 = crouching player.
pub const HULL_SIZES: [[Vec3; 2]; MAX_MAP_HULLS] = [
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
    [[-16.0, -16.0, -36.0], [16.0, 16.0, 36.0]],
    [[-32.0, -32.0, -32.0], [32.0, 32.0, 32.0]],
    [[-16.0, -16.0, -18.0], [16.0, 16.0, 18.0]],
];

// ============================================================
// Record strides per width
// ============================================================

pub const PLANE_SIZE: usize = 20;
pub const VERTEX_SIZE: usize = 12;
pub const TEXINFO_SIZE: usize = 40;
pub const SURFEDGE_SIZE: usize = 4;
pub const MODEL_SIZE: usize = 64;

pub const NODE_SIZE_V30: usize = 24;
pub const NODE_SIZE_PSB2: usize = 32;
pub const NODE_SIZE_WIDE: usize = 44;

pub const CLIPNODE_SIZE_V30: usize = 8;
pub const CLIPNODE_SIZE_WIDE: usize = 12;

pub const FACE_SIZE_V30: usize = 20;
pub const FACE_SIZE_WIDE: usize = 28;

pub const LEAF_SIZE_V30: usize = 28;
pub const LEAF_SIZE_PSB2: usize = 32;
pub const LEAF_SIZE_WIDE: usize = 44;

pub const EDGE_SIZE_V30: usize = 4;
pub const EDGE_SIZE_WIDE: usize = 8;

pub const MARKSURF_SIZE_V30: usize = 2;
pub const MARKSURF_SIZE_WIDE: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tags() {
        assert_eq!(IDBSP2HEADER.to_le_bytes(), *b"BSP2");
        assert_eq!(ID2PSBHEADER.to_le_bytes(), *b"2PSB");
        assert_eq!(IDEXTHEADER.to_le_bytes(), *b"XLMP");
    }

    #[test]
    fn test_version_round_trip() {
        for v in [BspVersion::V29, BspVersion::V30, BspVersion::Bsp2, BspVersion::Psb2] {
            assert_eq!(BspVersion::from_tag(v.tag()), Some(v));
        }
        assert_eq!(BspVersion::from_tag(31), None);
    }

    #[test]
    fn test_header_lumps_count() {
        assert_eq!(HEADER_LUMPS, 15);
        assert_eq!(LumpKind::ALL.len(), HEADER_LUMPS);
        for (i, kind) in LumpKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_node_child_encoding() {
        assert_eq!(NodeChild::from_raw(5), NodeChild::Node(5));
        assert_eq!(NodeChild::from_raw(-1), NodeChild::Leaf(0));
        assert_eq!(NodeChild::from_raw(-4), NodeChild::Leaf(3));
        assert_eq!(NodeChild::Leaf(3).raw(), -4);
        assert_eq!(NodeChild::Node(7).raw(), 7);
    }

    #[test]
    fn test_clip_child_encoding() {
        assert_eq!(ClipChild::from_raw(9), Some(ClipChild::Node(9)));
        assert_eq!(
            ClipChild::from_raw(-2),
            Some(ClipChild::Contents(Contents::Solid))
        );
        assert_eq!(ClipChild::from_raw(-99), None);
        assert_eq!(ClipChild::Contents(Contents::Empty).raw(), -1);
    }

    #[test]
    fn test_contents_round_trip() {
        for raw in -15..=-1 {
            let c = Contents::from_raw(raw).unwrap();
            assert_eq!(c.raw(), raw);
        }
        assert!(Contents::from_raw(0).is_none());
        assert!(Contents::from_raw(-16).is_none());
    }

    #[test]
    fn test_miptex_helpers() {
        let mut bytes = vec![0u8; MIPTEX_HEADER_SIZE];
        bytes[..4].copy_from_slice(b"wall");
        bytes[16..20].copy_from_slice(&16u32.to_le_bytes());
        bytes[20..24].copy_from_slice(&16u32.to_le_bytes());
        let tex = Texture { bytes: bytes.clone() };
        assert_eq!(tex.name(), "wall");
        assert_eq!(tex.width(), 16);
        assert_eq!(tex.height(), 16);
        assert!(!tex.is_embedded());

        // embedded with palette
        bytes[24..28].copy_from_slice(&(MIPTEX_HEADER_SIZE as u32).to_le_bytes());
        let pixels = 16 * 16;
        let full = MIPTEX_HEADER_SIZE + pixels + pixels / 4 + pixels / 16 + pixels / 64;
        bytes.resize(full + 2 + MIPTEX_PALETTE_SIZE, 0);
        let tex = Texture { bytes };
        assert!(tex.is_embedded());
        assert!(tex.has_palette());
    }

    #[test]
    fn test_hull_sizes_symmetric() {
        for h in 0..MAX_MAP_HULLS {
            for i in 0..3 {
                assert_eq!(HULL_SIZES[h][0][i], -HULL_SIZES[h][1][i]);
            }
        }
    }
}
