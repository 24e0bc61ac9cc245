//! Mesh storage: GPU vertex/index buffers, a vertex layout object and the
//! per-subset attribute table. Data reaches the buffers through a
//! lock/unlock pair: lock hands out a host staging slice, unlock flushes it
//! to the device and frees it.

use std::path::Path;

use corelib::{AttributeRange, GfxError, GfxResult, Material, VertexElement, VertexLayout};
use corelib::vertex::{DeclType, DeclUsage};

use asset::qm::QmMesh;

use crate::device::{
    AttribFormat, AttributeBinding, BufferId, BufferTarget, GraphicsDevice, IndexFormat, LayoutId,
};

/// Vertex count at which indices switch from u16 to u32. Applies to both the
/// staging size and the draw path.
const WIDE_INDEX_THRESHOLD: u32 = 0xffff;

pub struct Mesh {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    layout: LayoutId,
    stride: u32,
    num_vertices: u32,
    num_indices: u32,
    subsets: Vec<AttributeRange>,
    vertex_staging: Option<Vec<u8>>,
    index_staging: Option<Vec<u8>>,
}

impl Mesh {
    #[inline]
    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    #[inline]
    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    /// Packed vertex size in bytes.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    pub fn index_format(&self) -> IndexFormat {
        if self.num_vertices >= WIDE_INDEX_THRESHOLD {
            IndexFormat::U32
        } else {
            IndexFormat::U16
        }
    }

    #[inline]
    pub fn subsets(&self) -> &[AttributeRange] {
        &self.subsets
    }

    /// Host staging slice for vertex data, zero-initialized and sized
    /// `num_vertices * stride`. Flushed and freed by
    /// [`Mesh::unlock_vertex_buffer`].
    pub fn lock_vertex_buffer(&mut self) -> GfxResult<&mut [u8]> {
        let size = (self.num_vertices as usize) * (self.stride as usize);
        Ok(self.vertex_staging.insert(vec![0u8; size]).as_mut_slice())
    }

    /// Flush the locked vertex staging buffer to the device. The staging
    /// memory is released whether or not the upload succeeds; the slice from
    /// the lock call must not be used again.
    pub fn unlock_vertex_buffer(&mut self, device: &mut dyn GraphicsDevice) -> GfxResult<()> {
        if let Some(data) = self.vertex_staging.take() {
            device.upload_buffer(self.vertex_buffer, BufferTarget::Vertex, &data)?;
        }
        Ok(())
    }

    /// Host staging slice for index data, sized by the index-width
    /// invariant.
    pub fn lock_index_buffer(&mut self) -> GfxResult<&mut [u8]> {
        let size = (self.num_indices as usize) * (self.index_format().byte_size() as usize);
        Ok(self.index_staging.insert(vec![0u8; size]).as_mut_slice())
    }

    pub fn unlock_index_buffer(&mut self, device: &mut dyn GraphicsDevice) -> GfxResult<()> {
        if let Some(data) = self.index_staging.take() {
            device.upload_buffer(self.index_buffer, BufferTarget::Index, &data)?;
        }
        Ok(())
    }

    /// Replace the subset table.
    pub fn set_attribute_table(&mut self, table: &[AttributeRange]) {
        self.subsets = table.to_vec();
    }

    /// Draw one subset's face range; a mesh without a subset table draws
    /// everything.
    pub fn draw_subset(&self, device: &mut dyn GraphicsDevice, subset: u32) {
        match self.subsets.get(subset as usize) {
            Some(range) => device.draw_indexed(
                self.layout,
                range.face_start * 3,
                range.face_count * 3,
                self.index_format(),
            ),
            None => device.draw_indexed(self.layout, 0, self.num_indices, self.index_format()),
        }
    }

    /// Release all device objects. Any still-locked staging buffers drop
    /// with the value.
    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        device.delete_vertex_layout(self.layout);
        device.delete_buffer(self.vertex_buffer);
        device.delete_buffer(self.index_buffer);
    }
}

/// Create an empty mesh: buffers plus a layout object binding every
/// recognized declaration element. The declaration may be terminated by a
/// sentinel element; offsets and stride are derived, never taken from the
/// caller. Fails only if the device rejects an allocation.
pub fn create_mesh(
    device: &mut dyn GraphicsDevice,
    num_faces: u32,
    num_vertices: u32,
    decl: &[VertexElement],
) -> GfxResult<Mesh> {
    let layout = VertexLayout::from_decl(decl);
    let stride = u32::from(layout.stride());

    let mut bindings = Vec::with_capacity(layout.elements().len());
    for elem in layout.elements() {
        let Some(binding) = element_binding(elem, stride) else {
            log::warn!("unhandled layout element {:?}/{}", elem.usage, elem.usage_index);
            continue;
        };
        bindings.push(binding);
    }

    let vertex_buffer = device.create_buffer(BufferTarget::Vertex)?;
    let index_buffer = match device.create_buffer(BufferTarget::Index) {
        Ok(b) => b,
        Err(e) => {
            device.delete_buffer(vertex_buffer);
            return Err(e);
        }
    };
    let layout_id = match device.create_vertex_layout(vertex_buffer, index_buffer, &bindings) {
        Ok(l) => l,
        Err(e) => {
            device.delete_buffer(vertex_buffer);
            device.delete_buffer(index_buffer);
            return Err(e);
        }
    };

    Ok(Mesh {
        vertex_buffer,
        index_buffer,
        layout: layout_id,
        stride,
        num_vertices,
        num_indices: num_faces * 3,
        subsets: Vec::new(),
        vertex_staging: None,
        index_staging: None,
    })
}

/// Per-usage attribute binding: position as 3 floats (4 when declared
/// Float4), color as 4 normalized bytes, normal as 3 floats, texcoords with
/// the declared component count on their indexed slot. Other usages have no
/// binding here.
fn element_binding(elem: &VertexElement, stride: u32) -> Option<AttributeBinding> {
    let slot = elem.usage.attribute_slot(elem.usage_index)?;
    let (components, format) = match elem.usage {
        DeclUsage::Position | DeclUsage::PositionT => (
            if elem.ty == DeclType::Float4 { 4 } else { 3 },
            AttribFormat::F32,
        ),
        DeclUsage::Color => (4, AttribFormat::U8Norm),
        DeclUsage::Normal => (3, AttribFormat::F32),
        DeclUsage::Texcoord => (elem.ty.component_count(), AttribFormat::F32),
        _ => return None,
    };

    Some(AttributeBinding {
        slot,
        components,
        format,
        stride,
        offset: u32::from(elem.offset),
    })
}

/// Upload a parsed QM mesh through the lock/unlock discipline and attach its
/// subset table.
pub fn mesh_from_qm(device: &mut dyn GraphicsDevice, qm: &QmMesh) -> GfxResult<Mesh> {
    let mut mesh = create_mesh(device, qm.num_faces(), qm.num_vertices, &qm.elements)?;
    debug_assert_eq!(mesh.stride(), qm.stride);

    {
        let staging = mesh.lock_vertex_buffer()?;
        let n = staging.len().min(qm.vertex_data.len());
        staging[..n].copy_from_slice(&qm.vertex_data[..n]);
    }
    mesh.unlock_vertex_buffer(device)?;

    let file_stride = qm.index_stride;
    let mesh_stride = mesh.index_format().byte_size();
    if file_stride != mesh_stride {
        log::warn!(
            "QM index stride {} disagrees with the {}-byte width for {} vertices",
            file_stride,
            mesh_stride,
            qm.num_vertices
        );
    }
    {
        let staging = mesh.lock_index_buffer()?;
        let n = staging.len().min(qm.index_data.len());
        staging[..n].copy_from_slice(&qm.index_data[..n]);
    }
    mesh.unlock_index_buffer(device)?;

    mesh.set_attribute_table(&qm.subsets);
    Ok(mesh)
}

/// Load a QM mesh file into device buffers. Returns the mesh and one
/// material per subset; on failure no partial mesh or materials are handed
/// out.
pub fn load_mesh_from_qm(
    device: &mut dyn GraphicsDevice,
    path: impl AsRef<Path>,
) -> GfxResult<(Mesh, Vec<Material>)> {
    let qm = asset::qm::load_qm_from_path(path)
        .map_err(|e| GfxError::MeshParse(format!("{:#}", e)))?;
    let mesh = mesh_from_qm(device, &qm)?;
    Ok((mesh, qm.materials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    struct PosVertex {
        pos: [f32; 3],
    }

    fn pos_decl() -> Vec<VertexElement> {
        vec![
            VertexElement::new(0, DeclUsage::Position, DeclType::Float3, 0),
            VertexElement::stop(),
        ]
    }

    #[test]
    fn index_width_switches_at_the_vertex_threshold() {
        let cases = [
            (100u32, IndexFormat::U16),
            (65534, IndexFormat::U16),
            (65535, IndexFormat::U32),
            (70000, IndexFormat::U32),
        ];

        for (verts, expected) in cases {
            let mut device = HeadlessDevice::new();
            let mut mesh = create_mesh(&mut device, 2, verts, &pos_decl()).unwrap();
            assert_eq!(mesh.index_format(), expected, "verts={}", verts);

            // both the staging size and the uploaded byte count follow the width
            let staging_len = mesh.lock_index_buffer().unwrap().len();
            assert_eq!(staging_len, (6 * expected.byte_size()) as usize);
            mesh.unlock_index_buffer(&mut device).unwrap();

            mesh.draw_subset(&mut device, 0);
            assert_eq!(device.draw_calls[0].format, expected);
        }
    }

    #[test]
    fn lock_fill_unlock_round_trips_vertex_bytes() {
        let mut device = HeadlessDevice::new();
        let mut mesh = create_mesh(&mut device, 1, 3, &pos_decl()).unwrap();
        assert_eq!(mesh.stride(), 12);

        let vertices = [
            PosVertex { pos: [0.0, 0.0, 0.0] },
            PosVertex { pos: [1.0, 0.0, 0.0] },
            PosVertex { pos: [0.0, 1.0, 0.0] },
        ];

        {
            let staging = mesh.lock_vertex_buffer().unwrap();
            staging.copy_from_slice(bytemuck::cast_slice(&vertices));
        }
        mesh.unlock_vertex_buffer(&mut device).unwrap();

        let mut expected = Vec::new();
        for v in &vertices {
            expected.extend_from_slice(bytemuck::bytes_of(v));
        }
        let uploaded: Vec<u8> = device
            .buffer_data(BufferId(1))
            .expect("vertex buffer uploaded")
            .to_vec();
        assert_eq!(uploaded, expected);
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_indices(), 3);
    }

    #[test]
    fn unlock_without_lock_is_a_noop() {
        let mut device = HeadlessDevice::new();
        let mut mesh = create_mesh(&mut device, 1, 3, &pos_decl()).unwrap();
        mesh.unlock_vertex_buffer(&mut device).unwrap();
        mesh.unlock_index_buffer(&mut device).unwrap();
        assert!(device.buffer_data(BufferId(1)).unwrap().is_empty());
    }

    #[test]
    fn layout_binds_recognized_usages_with_derived_offsets() {
        let mut device = HeadlessDevice::new();
        let decl = [
            VertexElement::new(0, DeclUsage::Position, DeclType::Float3, 0),
            VertexElement::new(0, DeclUsage::Normal, DeclType::Float3, 0),
            VertexElement::new(0, DeclUsage::Texcoord, DeclType::Float2, 1),
            VertexElement::new(0, DeclUsage::Color, DeclType::Ubyte4, 0),
            VertexElement::new(0, DeclUsage::BlendWeight, DeclType::Float4, 0), // skipped
        ];
        let mesh = create_mesh(&mut device, 1, 3, &decl).unwrap();
        assert_eq!(mesh.stride(), 12 + 12 + 8 + 4 + 16);

        let bindings = device.layout_bindings(mesh.layout).unwrap().to_vec();
        assert_eq!(bindings.len(), 4);

        assert_eq!(bindings[0].slot, 0);
        assert_eq!(bindings[0].components, 3);
        assert_eq!(bindings[0].format, AttribFormat::F32);
        assert_eq!(bindings[0].offset, 0);

        assert_eq!(bindings[1].slot, 1);
        assert_eq!(bindings[1].offset, 12);

        // texcoord1 fans out to slot 6, two components, offset after normal
        assert_eq!(bindings[2].slot, 6);
        assert_eq!(bindings[2].components, 2);
        assert_eq!(bindings[2].offset, 24);

        assert_eq!(bindings[3].slot, 4);
        assert_eq!(bindings[3].format, AttribFormat::U8Norm);
        assert_eq!(bindings[3].offset, 32);
    }

    #[test]
    fn draw_subset_uses_the_attribute_table() {
        let mut device = HeadlessDevice::new();
        let mut mesh = create_mesh(&mut device, 10, 30, &pos_decl()).unwrap();
        mesh.set_attribute_table(&[
            AttributeRange {
                attrib_id: 0,
                face_start: 0,
                face_count: 4,
                vertex_start: 0,
                vertex_count: 12,
            },
            AttributeRange {
                attrib_id: 1,
                face_start: 4,
                face_count: 6,
                vertex_start: 12,
                vertex_count: 18,
            },
        ]);

        mesh.draw_subset(&mut device, 1);
        let call = device.draw_calls[0];
        assert_eq!(call.first_index, 12);
        assert_eq!(call.index_count, 18);
    }

    #[test]
    fn qm_payload_reaches_the_device_with_subsets_attached() {
        use std::io::Cursor;

        fn u32le(buf: &mut Vec<u8>, v: u32) {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        let vertices = [
            PosVertex { pos: [0.0, 0.0, 0.0] },
            PosVertex { pos: [1.0, 0.0, 0.0] },
            PosVertex { pos: [0.0, 1.0, 0.0] },
        ];
        let indices: [u16; 3] = [0, 1, 2];

        let mut buf = Vec::new();
        u32le(&mut buf, 1 << 16); // version 1
        u32le(&mut buf, 3); // indices
        u32le(&mut buf, 2); // index stride
        u32le(&mut buf, 1); // subsets
        u32le(&mut buf, 3); // vertices
        u32le(&mut buf, 0);
        u32le(&mut buf, 0);
        u32le(&mut buf, 0);
        u32le(&mut buf, 1); // one element: stream 0, position, float3
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&[0u8, 2, 0]);
        buf.extend_from_slice(bytemuck::cast_slice(&vertices));
        buf.extend_from_slice(bytemuck::cast_slice(&indices));
        // subset record, no material
        u32le(&mut buf, 0);
        u32le(&mut buf, 0);
        u32le(&mut buf, 3);
        u32le(&mut buf, 3);
        u32le(&mut buf, 0);
        buf.extend_from_slice(&[0u8; 24]); // bounds block
        buf.extend_from_slice(b"subset0\n,,\n,,\n\n\n\n\n\n\n\n");

        let qm = asset::qm::load_qm_from_reader(Cursor::new(buf)).expect("parse QM");
        let mut device = HeadlessDevice::new();
        let mesh = mesh_from_qm(&mut device, &qm).expect("upload QM");

        assert_eq!(
            device.buffer_data(mesh.vertex_buffer).unwrap(),
            bytemuck::cast_slice::<PosVertex, u8>(&vertices)
        );
        assert_eq!(
            device.buffer_data(mesh.index_buffer).unwrap(),
            bytemuck::cast_slice::<u16, u8>(&indices)
        );
        assert_eq!(mesh.subsets().len(), 1);
        assert_eq!(mesh.subsets()[0].face_count, 1);
        assert_eq!(qm.materials.len(), 1);
        assert!(qm.materials[0].texture.is_none());
    }

    #[test]
    fn destroy_releases_all_device_objects() {
        let mut device = HeadlessDevice::new();
        let mut mesh = create_mesh(&mut device, 1, 3, &pos_decl()).unwrap();
        assert_eq!(device.live_objects(), 3);
        mesh.destroy(&mut device);
        assert_eq!(device.live_objects(), 0);
    }
}
