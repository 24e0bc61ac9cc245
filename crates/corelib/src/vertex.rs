//! Vertex declarations: usage semantics, element types, derived layouts.

/// Semantic meaning of one vertex stream element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclUsage {
    Position,
    PositionT,
    Color,
    BlendWeight,
    BlendIndices,
    Normal,
    Texcoord,
    Tangent,
    Binormal,
    PSize,
    TessFactor,
}

impl DeclUsage {
    /// Fixed semantic attribute slot for this usage. Texcoords fan out by
    /// usage index; every other usage ignores it.
    ///
    /// Position=0, Normal=1, Tangent=2, Binormal=3, Color=4, Texcoord0..7=5..12.
    /// Usages without a slot (blend weights etc.) return `None` and are
    /// skipped by the layout binder.
    pub fn attribute_slot(self, usage_index: u8) -> Option<u32> {
        match self {
            DeclUsage::Position | DeclUsage::PositionT => Some(0),
            DeclUsage::Normal => Some(1),
            DeclUsage::Tangent => Some(2),
            DeclUsage::Binormal => Some(3),
            DeclUsage::Color => Some(4),
            DeclUsage::Texcoord if usage_index < 8 => Some(5 + usage_index as u32),
            _ => None,
        }
    }
}

/// Storage type of one vertex stream element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclType {
    Float1,
    Float2,
    Float3,
    Float4,
    Ubyte4,
    /// Packed 4x u8 color, normalized on fetch.
    UbyteColor,
}

impl DeclType {
    /// Size of one element in bytes.
    #[inline]
    pub const fn byte_size(self) -> u16 {
        match self {
            DeclType::Float1 => 4,
            DeclType::Float2 => 8,
            DeclType::Float3 => 12,
            DeclType::Float4 => 16,
            DeclType::Ubyte4 | DeclType::UbyteColor => 4,
        }
    }

    #[inline]
    pub const fn component_count(self) -> u8 {
        match self {
            DeclType::Float1 => 1,
            DeclType::Float2 => 2,
            DeclType::Float3 => 3,
            DeclType::Float4 => 4,
            DeclType::Ubyte4 | DeclType::UbyteColor => 4,
        }
    }
}

/// One field of a vertex declaration. `offset` is always derived by
/// [`VertexLayout::from_decl`], never supplied by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexElement {
    pub stream: u16,
    pub usage: DeclUsage,
    pub ty: DeclType,
    pub usage_index: u8,
    pub offset: u16,
}

impl VertexElement {
    /// Stream id marking the end of a declaration array.
    pub const STOP_STREAM: u16 = 0xff;

    pub const fn new(stream: u16, usage: DeclUsage, ty: DeclType, usage_index: u8) -> Self {
        Self {
            stream,
            usage,
            ty,
            usage_index,
            offset: 0,
        }
    }

    /// Terminator element for declarations built as sentinel-ended arrays.
    pub const fn stop() -> Self {
        Self::new(Self::STOP_STREAM, DeclUsage::Position, DeclType::Float1, 0)
    }

    #[inline]
    pub const fn is_stop(&self) -> bool {
        self.stream == Self::STOP_STREAM
    }
}

/// Owned vertex declaration with derived stride.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexLayout {
    elements: Vec<VertexElement>,
    stride: u16,
}

impl VertexLayout {
    /// Build a layout from a declaration slice, stopping at the first
    /// sentinel element if one is present. Byte offsets are assigned as the
    /// running size sum in declared order; the final sum is the stride.
    pub fn from_decl(decl: &[VertexElement]) -> Self {
        let mut elements = Vec::with_capacity(decl.len());
        let mut stride: u16 = 0;

        for elem in decl {
            if elem.is_stop() {
                break;
            }
            let mut elem = *elem;
            elem.offset = stride;
            stride += elem.ty.byte_size();
            elements.push(elem);
        }

        Self { elements, stride }
    }

    #[inline]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Size of one packed vertex in bytes.
    #[inline]
    pub fn stride(&self) -> u16 {
        self.stride
    }
}
