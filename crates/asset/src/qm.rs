//! QM binary mesh parser.
//!
//! QM is a little-endian container holding a vertex declaration, raw
//! vertex/index payloads and a per-subset attribute/material table. Numeric
//! fields are fixed-width; names and texture paths are newline-delimited
//! text fields. Subset text fields follow a closed convention of the format:
//! a field whose second byte is a comma (or that is shorter than two bytes)
//! is "trivial", i.e. carries no value. This is not a general emptiness
//! test, only what QM writers emit.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, bail};

use corelib::{AttributeRange, Color, Material, VertexElement, VertexLayout};
use corelib::vertex::{DeclType, DeclUsage};

/// Hard cap on one newline-delimited text field. The format itself has no
/// bound; an over-long field fails the parse instead of growing without
/// limit.
pub const QM_MAX_TEXT_FIELD: usize = 1024;

/// Most elements a declaration may carry; matches the layout binder's
/// fixed-size declaration walk.
pub const QM_MAX_ELEMENTS: u32 = 16;

/// File usage codes in table order.
const USAGES: [DeclUsage; 11] = [
    DeclUsage::Position,
    DeclUsage::PositionT,
    DeclUsage::Color,
    DeclUsage::BlendWeight,
    DeclUsage::BlendIndices,
    DeclUsage::Normal,
    DeclUsage::Texcoord,
    DeclUsage::Tangent,
    DeclUsage::Binormal,
    DeclUsage::PSize,
    DeclUsage::TessFactor,
];

/// File type codes in table order.
const TYPES: [DeclType; 6] = [
    DeclType::Float1,
    DeclType::Float2,
    DeclType::Float3,
    DeclType::Float4,
    DeclType::UbyteColor,
    DeclType::Ubyte4,
];

/// Parsed QM file: geometry payload plus subset/material tables, ready for
/// GPU upload by the renderer.
#[derive(Clone, Debug)]
pub struct QmMesh {
    pub version: u16,
    pub num_vertices: u32,
    pub num_indices: u32,
    /// Index element width as stored in the file (bytes).
    pub index_stride: u32,
    /// Vertex declaration with offsets accumulated in declared order.
    pub elements: Vec<VertexElement>,
    /// Packed vertex size, the sum of element sizes.
    pub stride: u32,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub subsets: Vec<AttributeRange>,
    pub materials: Vec<Material>,
}

impl QmMesh {
    #[inline]
    pub fn num_faces(&self) -> u32 {
        self.num_indices / 3
    }
}

/// Load a QM mesh from a file path.
pub fn load_qm_from_path(path: impl AsRef<Path>) -> Result<QmMesh> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open QM file: {}", path.as_ref().display()))?;
    load_qm_from_reader(BufReader::new(file))
}

/// Load a QM mesh from any [`Read`] implementation.
pub fn load_qm_from_reader<R: Read>(mut reader: R) -> Result<QmMesh> {
    parse_qm(&mut reader)
}

fn parse_qm<R: Read>(r: &mut R) -> Result<QmMesh> {
    // Fixed header. The first word packs the format version in its high
    // 16 bits; the low bits are unused.
    let packed = read_u32(r).context("QM header truncated")?;
    let num_indices = read_u32(r)?;
    let index_stride = read_u32(r)?;
    let num_subsets = read_u32(r)?;
    let version = (packed >> 16) as u16;

    let num_vertices = read_u32(r)?;
    for _ in 0..3 {
        read_u32(r)?; // reserved
    }

    // Vertex declaration.
    let num_elements = read_u32(r).context("QM declaration truncated")?;
    if num_elements > QM_MAX_ELEMENTS {
        bail!("QM declares {} vertex elements (max {})", num_elements, QM_MAX_ELEMENTS);
    }

    let mut elements = Vec::with_capacity(num_elements as usize);
    let mut stride: u32 = 0;

    for i in 0..num_elements {
        let stream = read_u16(r)?;
        let usage_code = read_u8(r)?;
        let type_code = read_u8(r)?;
        let usage_index = read_u8(r)?;

        let usage = *USAGES
            .get(usage_code as usize)
            .with_context(|| format!("element {}: unknown usage code {}", i, usage_code))?;
        let ty = *TYPES
            .get(type_code as usize)
            .with_context(|| format!("element {}: unknown type code {}", i, type_code))?;

        let mut elem = VertexElement::new(stream, usage, ty, usage_index);
        elem.offset = stride as u16;
        stride += u32::from(ty.byte_size());
        elements.push(elem);
    }

    debug_assert_eq!(u32::from(VertexLayout::from_decl(&elements).stride()), stride);

    // Geometry payload.
    let vertex_len = (num_vertices as usize)
        .checked_mul(stride as usize)
        .context("vertex payload size overflow")?;
    let index_len = (num_indices as usize)
        .checked_mul(index_stride as usize)
        .context("index payload size overflow")?;

    let mut vertex_data = vec![0u8; vertex_len];
    r.read_exact(&mut vertex_data)
        .context("QM vertex payload truncated")?;

    let mut index_data = vec![0u8; index_len];
    r.read_exact(&mut index_data)
        .context("QM index payload truncated")?;

    // Versions past 1 insert a block of 8-byte records we don't interpret.
    if version > 1 {
        let extra = read_u32(r).context("QM extra block truncated")?;
        if extra > 0 {
            skip_bytes(r, 8 * extra as u64).context("QM extra block truncated")?;
        }
    }

    // Subset records with optional inline materials.
    let mut subsets = Vec::with_capacity(num_subsets as usize);
    let mut materials = Vec::with_capacity(num_subsets as usize);

    for i in 0..num_subsets {
        let ctx = |what: &str| format!("subset {}: {}", i, what);

        // Face fields are stored as index counts (x3) and exposed as faces.
        let face_start = read_u32(r).with_context(|| ctx("record truncated"))? / 3;
        let vertex_start = read_u32(r)?;
        let vertex_count = read_u32(r)?;
        let face_count = read_u32(r)? / 3;
        read_u32(r)?; // reserved

        subsets.push(AttributeRange {
            attrib_id: i,
            face_start,
            face_count,
            vertex_start,
            vertex_count,
        });

        skip_bytes(r, 6 * 4).with_context(|| ctx("bounds block truncated"))?;

        read_text_field(r).with_context(|| ctx("name field"))?;
        let marker = read_text_field(r).with_context(|| ctx("material marker field"))?;

        let mut mat = Material::default();

        if !is_trivial(&marker) {
            mat.ambient = read_color(r).with_context(|| ctx("material block truncated"))?;
            mat.diffuse = read_color(r)?;
            mat.specular = read_color(r)?;
            mat.emissive = read_color(r)?;
            mat.power = read_f32(r)?;
            mat.diffuse.a = read_f32(r)?;
            read_u32(r)?; // reserved

            let texture = read_text_field(r).with_context(|| ctx("texture field"))?;
            if !is_trivial(&texture) {
                mat.texture = Some(String::from_utf8_lossy(&texture).into_owned());
            }

            for _ in 0..7 {
                read_text_field(r).with_context(|| ctx("material tail field"))?;
            }
        }

        // A texture path may also trail the record; it only applies when the
        // material block didn't already name one.
        let fallback = read_text_field(r).with_context(|| ctx("fallback texture field"))?;
        if !is_trivial(&fallback) && mat.texture.is_none() {
            mat.texture = Some(String::from_utf8_lossy(&fallback).into_owned());
        }

        for _ in 0..7 {
            read_text_field(r).with_context(|| ctx("tail field"))?;
        }

        materials.push(mat);
    }

    log::info!(
        "Parsed QM mesh v{}: {} vertices, {} indices, {} subsets",
        version,
        num_vertices,
        num_indices,
        num_subsets
    );

    Ok(QmMesh {
        version,
        num_vertices,
        num_indices,
        index_stride,
        elements,
        stride,
        vertex_data,
        index_data,
        subsets,
        materials,
    })
}

/// QM's "no value here" marker: the second byte is a comma. Fields shorter
/// than two bytes cannot carry a value either.
fn is_trivial(field: &[u8]) -> bool {
    field.len() < 2 || field[1] == b','
}

/// Bytes up to (and excluding) the next newline, bounded by
/// [`QM_MAX_TEXT_FIELD`].
fn read_text_field<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let mut field = Vec::new();
    loop {
        let byte = read_u8(r).context("unterminated text field")?;
        if byte == b'\n' {
            return Ok(field);
        }
        if field.len() >= QM_MAX_TEXT_FIELD {
            bail!("text field exceeds {} bytes", QM_MAX_TEXT_FIELD);
        }
        field.push(byte);
    }
}

fn skip_bytes<R: Read>(r: &mut R, count: u64) -> io::Result<()> {
    let copied = io::copy(&mut r.by_ref().take(count), &mut io::sink())?;
    if copied != count {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_color<R: Read>(r: &mut R) -> io::Result<Color> {
    Ok(Color::new(
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
    ))
}
