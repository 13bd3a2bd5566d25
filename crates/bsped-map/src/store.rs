// store.rs — Canonical in-memory lump store
//
// One growable owned array per lump kind. All mutation funnels through
// `replace_lump`, which parses the canonical wide byte layout and swaps the
// backing array; the typed `set_*` helpers serialize through the same path.
// Nothing outside the codec modules ever sees a narrow record.

use crate::bspfile::{
    ClipChild, ClipNode, Contents, Edge, Face, Leaf, LumpKind, Model, Node, NodeChild, TexInfo,
    TextureSlot, BspVersion, MAX_MAP_HULLS,
};
use crate::error::DecodeError;
use crate::lumpdata;
use bsped_common::math::Vec3;
use bsped_common::plane::Plane;
use log::warn;

pub struct MapStore {
    pub version: BspVersion,

    pub(crate) entities: Vec<u8>,
    pub(crate) planes: Vec<Plane>,
    pub(crate) textures: Vec<TextureSlot>,
    pub(crate) vertices: Vec<Vec3>,
    pub(crate) visdata: Vec<u8>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) texinfos: Vec<TexInfo>,
    pub(crate) faces: Vec<Face>,
    pub(crate) lightdata: Vec<u8>,
    pub(crate) clipnodes: Vec<ClipNode>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) marksurfaces: Vec<u32>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) surfedges: Vec<i32>,
    pub(crate) models: Vec<Model>,

    /// Planes and Entities directory entries arrived swapped; redo on encode.
    pub swapped_planes_entities: bool,
    /// Lighting arrived monochrome and was expanded to RGB; narrow on encode.
    pub mono_lighting: bool,
    /// Opaque auxiliary lumps from the extended header, re-emitted verbatim.
    pub aux_lumps: Vec<Vec<u8>>,
    /// Patch a dummy model on encode until the lump checksum matches the
    /// value recorded in the world entity.
    pub preserve_crc: bool,
}

impl Default for MapStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl MapStore {
    /// Minimal valid map: the shared solid leaf, the reserved dummy edge,
    /// and an empty world model.
    pub fn empty() -> MapStore {
        MapStore {
            version: BspVersion::V30,
            entities: b"{\n\"classname\" \"worldspawn\"\n}\n".to_vec(),
            planes: Vec::new(),
            textures: Vec::new(),
            vertices: Vec::new(),
            visdata: Vec::new(),
            nodes: Vec::new(),
            texinfos: Vec::new(),
            faces: Vec::new(),
            lightdata: Vec::new(),
            clipnodes: Vec::new(),
            leaves: vec![Leaf {
                contents: Contents::Solid,
                vis_ofs: -1,
                mins: [0.0; 3],
                maxs: [0.0; 3],
                first_marksurface: 0,
                num_marksurfaces: 0,
                ambient: [0; 4],
            }],
            marksurfaces: Vec::new(),
            edges: vec![Edge { v: [0, 0] }],
            surfedges: Vec::new(),
            models: vec![Model {
                mins: [0.0; 3],
                maxs: [0.0; 3],
                origin: [0.0; 3],
                head_nodes: [-1; MAX_MAP_HULLS],
                vis_leafs: 0,
                first_face: 0,
                num_faces: 0,
            }],
            swapped_planes_entities: false,
            mono_lighting: false,
            aux_lumps: Vec::new(),
            preserve_crc: false,
        }
    }

    // ============================================================
    // The single write path
    // ============================================================

    /// Swap one lump's backing array for the given canonical-layout bytes.
    /// Counts are implicit in the array lengths, so they follow atomically.
    pub fn replace_lump(&mut self, kind: LumpKind, bytes: &[u8]) -> Result<(), DecodeError> {
        match kind {
            LumpKind::Entities => self.entities = bytes.to_vec(),
            LumpKind::Planes => self.planes = lumpdata::parse_planes(bytes)?,
            LumpKind::Textures => self.textures = lumpdata::parse_textures(bytes)?,
            LumpKind::Vertices => self.vertices = lumpdata::parse_vertices(bytes)?,
            LumpKind::Visibility => self.visdata = bytes.to_vec(),
            LumpKind::Nodes => self.nodes = lumpdata::parse_nodes(bytes)?,
            LumpKind::TexInfo => self.texinfos = lumpdata::parse_texinfos(bytes)?,
            LumpKind::Faces => self.faces = lumpdata::parse_faces(bytes)?,
            LumpKind::Lighting => self.lightdata = bytes.to_vec(),
            LumpKind::ClipNodes => self.clipnodes = lumpdata::parse_clipnodes(bytes)?,
            LumpKind::Leaves => self.leaves = lumpdata::parse_leaves(bytes)?,
            LumpKind::MarkSurfaces => self.marksurfaces = lumpdata::parse_marksurfaces(bytes)?,
            LumpKind::Edges => self.edges = lumpdata::parse_edges(bytes)?,
            LumpKind::SurfEdges => self.surfedges = lumpdata::parse_surfedges(bytes)?,
            LumpKind::Models => self.models = lumpdata::parse_models(bytes)?,
        }
        Ok(())
    }

    /// Current canonical bytes for one lump, as `replace_lump` accepts them.
    pub fn lump_bytes(&self, kind: LumpKind) -> Vec<u8> {
        match kind {
            LumpKind::Entities => self.entities.clone(),
            LumpKind::Planes => lumpdata::planes_bytes(&self.planes),
            LumpKind::Textures => lumpdata::textures_bytes(&self.textures),
            LumpKind::Vertices => lumpdata::vertices_bytes(&self.vertices),
            LumpKind::Visibility => self.visdata.clone(),
            LumpKind::Nodes => lumpdata::nodes_bytes(&self.nodes),
            LumpKind::TexInfo => lumpdata::texinfos_bytes(&self.texinfos),
            LumpKind::Faces => lumpdata::faces_bytes(&self.faces),
            LumpKind::Lighting => self.lightdata.clone(),
            LumpKind::ClipNodes => lumpdata::clipnodes_bytes(&self.clipnodes),
            LumpKind::Leaves => lumpdata::leaves_bytes(&self.leaves),
            LumpKind::MarkSurfaces => lumpdata::marksurfaces_bytes(&self.marksurfaces),
            LumpKind::Edges => lumpdata::edges_bytes(&self.edges),
            LumpKind::SurfEdges => lumpdata::surfedges_bytes(&self.surfedges),
            LumpKind::Models => lumpdata::models_bytes(&self.models),
        }
    }

    fn install(&mut self, kind: LumpKind, bytes: Vec<u8>) {
        // canonical bytes built by this crate always re-parse
        self.replace_lump(kind, &bytes)
            .expect("canonical lump bytes failed to re-parse");
    }

    pub fn set_planes(&mut self, planes: Vec<Plane>) {
        let bytes = lumpdata::planes_bytes(&planes);
        self.install(LumpKind::Planes, bytes);
    }

    pub fn set_textures(&mut self, textures: Vec<TextureSlot>) {
        let bytes = lumpdata::textures_bytes(&textures);
        self.install(LumpKind::Textures, bytes);
    }

    pub fn set_vertices(&mut self, vertices: Vec<Vec3>) {
        let bytes = lumpdata::vertices_bytes(&vertices);
        self.install(LumpKind::Vertices, bytes);
    }

    pub fn set_visdata(&mut self, visdata: Vec<u8>) {
        self.install(LumpKind::Visibility, visdata);
    }

    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        let bytes = lumpdata::nodes_bytes(&nodes);
        self.install(LumpKind::Nodes, bytes);
    }

    pub fn set_texinfos(&mut self, texinfos: Vec<TexInfo>) {
        let bytes = lumpdata::texinfos_bytes(&texinfos);
        self.install(LumpKind::TexInfo, bytes);
    }

    pub fn set_faces(&mut self, faces: Vec<Face>) {
        let bytes = lumpdata::faces_bytes(&faces);
        self.install(LumpKind::Faces, bytes);
    }

    pub fn set_lightdata(&mut self, lightdata: Vec<u8>) {
        self.install(LumpKind::Lighting, lightdata);
    }

    pub fn set_clipnodes(&mut self, clipnodes: Vec<ClipNode>) {
        let bytes = lumpdata::clipnodes_bytes(&clipnodes);
        self.install(LumpKind::ClipNodes, bytes);
    }

    pub fn set_leaves(&mut self, leaves: Vec<Leaf>) {
        let bytes = lumpdata::leaves_bytes(&leaves);
        self.install(LumpKind::Leaves, bytes);
    }

    pub fn set_marksurfaces(&mut self, marks: Vec<u32>) {
        let bytes = lumpdata::marksurfaces_bytes(&marks);
        self.install(LumpKind::MarkSurfaces, bytes);
    }

    pub fn set_edges(&mut self, edges: Vec<Edge>) {
        let bytes = lumpdata::edges_bytes(&edges);
        self.install(LumpKind::Edges, bytes);
    }

    pub fn set_surfedges(&mut self, surfedges: Vec<i32>) {
        let bytes = lumpdata::surfedges_bytes(&surfedges);
        self.install(LumpKind::SurfEdges, bytes);
    }

    pub fn set_models(&mut self, models: Vec<Model>) {
        let bytes = lumpdata::models_bytes(&models);
        self.install(LumpKind::Models, bytes);
    }

    pub fn set_entities(&mut self, entities: Vec<u8>) {
        self.install(LumpKind::Entities, entities);
    }

    // ============================================================
    // Read-only accessors
    // ============================================================

    pub fn entities(&self) -> &[u8] {
        &self.entities
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn visdata(&self) -> &[u8] {
        &self.visdata
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn texinfos(&self) -> &[TexInfo] {
        &self.texinfos
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn lightdata(&self) -> &[u8] {
        &self.lightdata
    }

    pub fn clipnodes(&self) -> &[ClipNode] {
        &self.clipnodes
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn marksurfaces(&self) -> &[u32] {
        &self.marksurfaces
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn surfedges(&self) -> &[i32] {
        &self.surfedges
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    // ============================================================
    // Point queries
    // ============================================================

    /// Leaf index containing the point, walking the world render tree.
    pub fn point_leaf(&self, p: &Vec3) -> u32 {
        let Some(root) = self.models.first().and_then(|m| m.render_root()) else {
            return 0;
        };
        let mut child = NodeChild::Node(root);
        let mut steps = 0usize;
        loop {
            match child {
                NodeChild::Leaf(l) => return l,
                NodeChild::Node(n) => {
                    let Some(node) = self.nodes.get(n as usize) else {
                        warn!("point_leaf: node {} out of range", n);
                        return 0;
                    };
                    let Some(plane) = self.planes.get(node.plane as usize) else {
                        warn!("point_leaf: plane {} out of range", node.plane);
                        return 0;
                    };
                    child = if plane.point_dist(p) >= 0.0 {
                        node.children[0]
                    } else {
                        node.children[1]
                    };
                }
            }
            steps += 1;
            if steps > self.nodes.len() + 1 {
                warn!("point_leaf: cyclic node tree");
                return 0;
            }
        }
    }

    /// Contents at the point in one collision hull tree.
    pub fn point_contents(&self, head: ClipChild, p: &Vec3) -> Contents {
        let mut child = head;
        let mut steps = 0usize;
        loop {
            match child {
                ClipChild::Contents(c) => return c,
                ClipChild::Node(n) => {
                    let Some(clip) = self.clipnodes.get(n as usize) else {
                        warn!("point_contents: clipnode {} out of range", n);
                        return Contents::Solid;
                    };
                    let Some(plane) = self.planes.get(clip.plane as usize) else {
                        warn!("point_contents: plane {} out of range", clip.plane);
                        return Contents::Solid;
                    };
                    child = if plane.point_dist(p) >= 0.0 {
                        clip.children[0]
                    } else {
                        clip.children[1]
                    };
                }
            }
            steps += 1;
            if steps > self.clipnodes.len() + 1 {
                warn!("point_contents: cyclic clipnode tree");
                return Contents::Solid;
            }
        }
    }

    // ============================================================
    // Invariant sweep
    // ============================================================

    /// Check every cross-reference field; returns human-readable findings.
    pub fn validate(&self) -> Vec<String> {
        let mut findings = Vec::new();

        if self.models.is_empty() {
            findings.push("no world model".to_string());
        }

        for (i, face) in self.faces.iter().enumerate() {
            if face.plane as usize >= self.planes.len() {
                findings.push(format!("face {} plane {} out of range", i, face.plane));
            }
            if face.texinfo as usize >= self.texinfos.len() {
                findings.push(format!("face {} texinfo {} out of range", i, face.texinfo));
            }
            if face.num_surfedges < 3 {
                findings.push(format!("face {} has {} edges", i, face.num_surfedges));
            }
            let end = face.first_surfedge as usize + face.num_surfedges as usize;
            if end > self.surfedges.len() {
                findings.push(format!("face {} surfedge run ends at {}", i, end));
            }
            if face.light_ofs >= 0 && face.light_ofs as usize >= self.lightdata.len().max(1) {
                findings.push(format!("face {} light offset {} out of range", i, face.light_ofs));
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.plane as usize >= self.planes.len() {
                findings.push(format!("node {} plane {} out of range", i, node.plane));
            }
            for child in node.children {
                match child {
                    NodeChild::Node(n) if n as usize >= self.nodes.len() => {
                        findings.push(format!("node {} child node {} out of range", i, n));
                    }
                    NodeChild::Leaf(l) if l as usize >= self.leaves.len() => {
                        findings.push(format!("node {} child leaf {} out of range", i, l));
                    }
                    _ => {}
                }
            }
            let end = node.first_face as usize + node.num_faces as usize;
            if end > self.faces.len() {
                findings.push(format!("node {} face run ends at {}", i, end));
            }
        }

        for (i, clip) in self.clipnodes.iter().enumerate() {
            if clip.plane as usize >= self.planes.len() {
                findings.push(format!("clipnode {} plane {} out of range", i, clip.plane));
            }
            for child in clip.children {
                if let ClipChild::Node(n) = child {
                    if n as usize >= self.clipnodes.len() {
                        findings.push(format!("clipnode {} child {} out of range", i, n));
                    }
                }
            }
        }

        for (i, leaf) in self.leaves.iter().enumerate() {
            let end = leaf.first_marksurface as usize + leaf.num_marksurfaces as usize;
            if end > self.marksurfaces.len() {
                findings.push(format!("leaf {} marksurface run ends at {}", i, end));
            }
            if leaf.vis_ofs >= 0 && leaf.vis_ofs as usize >= self.visdata.len().max(1) {
                findings.push(format!("leaf {} vis offset {} out of range", i, leaf.vis_ofs));
            }
        }

        for (i, &mark) in self.marksurfaces.iter().enumerate() {
            if mark as usize >= self.faces.len() {
                findings.push(format!("marksurface {} face {} out of range", i, mark));
            }
        }

        for (i, edge) in self.edges.iter().enumerate() {
            for v in edge.v {
                if v as usize >= self.vertices.len().max(1) {
                    findings.push(format!("edge {} vertex {} out of range", i, v));
                }
            }
        }

        for (i, &se) in self.surfedges.iter().enumerate() {
            if se.unsigned_abs() as usize >= self.edges.len() {
                findings.push(format!("surfedge {} edge {} out of range", i, se));
            }
        }

        for (i, ti) in self.texinfos.iter().enumerate() {
            if ti.miptex >= 0 && ti.miptex as usize >= self.textures.len() {
                findings.push(format!("texinfo {} miptex {} out of range", i, ti.miptex));
            }
        }

        for (i, model) in self.models.iter().enumerate() {
            if model.head_nodes[0] >= 0 && model.head_nodes[0] as usize >= self.nodes.len() {
                findings.push(format!(
                    "model {} render head {} out of range",
                    i, model.head_nodes[0]
                ));
            }
            for hull in 1..MAX_MAP_HULLS {
                let head = model.head_nodes[hull];
                if head >= 0 && head as usize >= self.clipnodes.len() {
                    findings.push(format!("model {} hull {} head {} out of range", i, hull, head));
                } else if head < 0 && Contents::from_raw(head).is_none() {
                    findings.push(format!("model {} hull {} bad sentinel {}", i, hull, head));
                }
            }
            let end = model.first_face as usize + model.num_faces as usize;
            if end > self.faces.len() {
                findings.push(format!("model {} face run ends at {}", i, end));
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspfile::LumpKind;

    #[test]
    fn test_empty_map_is_valid() {
        let store = MapStore::empty();
        assert!(store.validate().is_empty(), "{:?}", store.validate());
        assert_eq!(store.leaves().len(), 1);
        assert_eq!(store.leaves()[0].contents, Contents::Solid);
        assert_eq!(store.edges().len(), 1);
        assert_eq!(store.models().len(), 1);
    }

    #[test]
    fn test_replace_lump_swaps_and_recounts() {
        let mut store = MapStore::empty();
        let planes = vec![
            Plane::new([0.0, 0.0, 1.0], 8.0),
            Plane::new([1.0, 0.0, 0.0], -4.0),
        ];
        let bytes = lumpdata::planes_bytes(&planes);
        store.replace_lump(LumpKind::Planes, &bytes).unwrap();
        assert_eq!(store.planes().len(), 2);
        assert_eq!(store.planes()[0].dist, 8.0);
    }

    #[test]
    fn test_replace_lump_rejects_funny_size() {
        let mut store = MapStore::empty();
        let err = store.replace_lump(LumpKind::Planes, &[0u8; 7]);
        assert!(err.is_err());
        // store untouched on failure
        assert!(store.planes().is_empty());
    }

    #[test]
    fn test_lump_bytes_round_trip() {
        let mut store = MapStore::empty();
        store.set_vertices(vec![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
        let bytes = store.lump_bytes(LumpKind::Vertices);
        let mut other = MapStore::empty();
        other.replace_lump(LumpKind::Vertices, &bytes).unwrap();
        assert_eq!(other.vertices(), store.vertices());
    }

    #[test]
    fn test_validate_catches_dangling_face_plane() {
        let mut store = MapStore::empty();
        store.set_faces(vec![Face {
            plane: 5,
            side: 0,
            first_surfedge: 0,
            num_surfedges: 3,
            texinfo: 0,
            styles: [0; 4],
            light_ofs: -1,
        }]);
        let findings = store.validate();
        assert!(findings.iter().any(|f| f.contains("face 0 plane 5")));
    }

    #[test]
    fn test_point_queries_on_empty_map() {
        let store = MapStore::empty();
        assert_eq!(store.point_leaf(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(
            store.point_contents(
                ClipChild::Contents(Contents::Empty),
                &[10.0, 0.0, 0.0]
            ),
            Contents::Empty
        );
    }
}
