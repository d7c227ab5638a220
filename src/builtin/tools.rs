//! Builtin tools and the formats each of them produces.

use super::codecs::BuiltinCodecs;
use crate::block::{
    BLOCK_BC1, BLOCK_BC2_BC3, BLOCK_BGR, BLOCK_BGRA, BLOCK_ETC_RGB, BLOCK_ETC_RGBA,
    BLOCK_PVRTC_2BPP, BLOCK_PVRTC_4BPP, BlockGeometry,
};
use crate::container::dds::{D3DFMT_A8R8G8B8, D3DFMT_R8G8B8};
use crate::encode::{ExternalEncoder, ExternalTool, IspcEncoder, RawEncoder, TextureEncoder};
use crate::registry::{CodecId, Features, FormatDef, FourCC, GlTriple, Registry, ToolDef};

const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_BGR: u32 = 0x80E0;
const GL_BGRA: u32 = 0x80E1;
const GL_RGB8: u32 = 0x8051;
const GL_RGBA8: u32 = 0x8058;

/// Compressed formats are selected by internal format alone.
const fn compressed(internal_format: u32) -> Option<GlTriple> {
    Some(GlTriple {
        format: 0,
        internal_format,
        element_type: 0,
    })
}

struct FormatEntry {
    name: &'static str,
    full_name: &'static str,
    parm: &'static str,
    fourcc: FourCC,
    gl: Option<GlTriple>,
    features: Features,
    block: BlockGeometry,
}

const ALPHA: Features = Features::ALPHA;
const CUTOUT: Features = Features::ALPHA.union(Features::BINARY_ALPHA);

const DXT1: FormatEntry = FormatEntry {
    name: "DXT1",
    full_name: "BC1 opaque",
    parm: "dxt1",
    fourcc: FourCC::from_bytes(b"DXT1"),
    gl: compressed(0x83F0),
    features: Features::NONE,
    block: BLOCK_BC1,
};
const DXT1A: FormatEntry = FormatEntry {
    name: "DXT1A",
    full_name: "BC1 with 1-bit alpha",
    parm: "dxt1a",
    fourcc: FourCC::from_bytes(b"DXT1"),
    gl: compressed(0x83F1),
    features: CUTOUT,
    block: BLOCK_BC1,
};
const DXT3: FormatEntry = FormatEntry {
    name: "DXT3",
    full_name: "BC2 explicit alpha",
    parm: "dxt3",
    fourcc: FourCC::from_bytes(b"DXT3"),
    gl: compressed(0x83F2),
    features: ALPHA,
    block: BLOCK_BC2_BC3,
};
const DXT5: FormatEntry = FormatEntry {
    name: "DXT5",
    full_name: "BC3 interpolated alpha",
    parm: "dxt5",
    fourcc: FourCC::from_bytes(b"DXT5"),
    gl: compressed(0x83F3),
    features: ALPHA,
    block: BLOCK_BC2_BC3,
};
const ETC1: FormatEntry = FormatEntry {
    name: "ETC1",
    full_name: "ETC1 RGB",
    parm: "etc1rgb",
    fourcc: FourCC::from_bytes(b"ETC1"),
    gl: compressed(0x8D64),
    features: Features::NONE,
    block: BLOCK_ETC_RGB,
};
const ETC2_RGB: FormatEntry = FormatEntry {
    name: "ETC2_RGB",
    full_name: "ETC2 RGB",
    parm: "etc2rgb",
    fourcc: FourCC::from_bytes(b"ETC2"),
    gl: compressed(0x9274),
    features: Features::NONE,
    block: BLOCK_ETC_RGB,
};
const ETC2_RGBA: FormatEntry = FormatEntry {
    name: "ETC2_RGBA",
    full_name: "ETC2 RGBA (EAC alpha)",
    parm: "etc2rgba",
    fourcc: FourCC::from_bytes(b"ETCA"),
    gl: compressed(0x9278),
    features: ALPHA,
    block: BLOCK_ETC_RGBA,
};
const ETC2_RGBA1: FormatEntry = FormatEntry {
    name: "ETC2_RGBA1",
    full_name: "ETC2 RGB with punch-through alpha",
    parm: "etc2rgba1",
    fourcc: FourCC::from_bytes(b"ETCP"),
    gl: compressed(0x9276),
    features: CUTOUT,
    block: BLOCK_ETC_RGB,
};
const PVRTC2: FormatEntry = FormatEntry {
    name: "PVRTC2",
    full_name: "PVRTC 2bpp RGB",
    parm: "pvrtc2",
    fourcc: FourCC::from_bytes(b"PTC2"),
    gl: compressed(0x8C01),
    features: Features::NONE,
    block: BLOCK_PVRTC_2BPP,
};
const PVRTC2A: FormatEntry = FormatEntry {
    name: "PVRTC2A",
    full_name: "PVRTC 2bpp RGBA",
    parm: "pvrtc2a",
    fourcc: FourCC::from_bytes(b"PTC2"),
    gl: compressed(0x8C03),
    features: ALPHA,
    block: BLOCK_PVRTC_2BPP,
};
const PVRTC4: FormatEntry = FormatEntry {
    name: "PVRTC4",
    full_name: "PVRTC 4bpp RGB",
    parm: "pvrtc4",
    fourcc: FourCC::from_bytes(b"PTC4"),
    gl: compressed(0x8C00),
    features: Features::NONE,
    block: BLOCK_PVRTC_4BPP,
};
const PVRTC4A: FormatEntry = FormatEntry {
    name: "PVRTC4A",
    full_name: "PVRTC 4bpp RGBA",
    parm: "pvrtc4a",
    fourcc: FourCC::from_bytes(b"PTC4"),
    gl: compressed(0x8C02),
    features: ALPHA,
    block: BLOCK_PVRTC_4BPP,
};
const BGRA: FormatEntry = FormatEntry {
    name: "BGRA",
    full_name: "32-bit BGRA",
    parm: "bgra32",
    fourcc: D3DFMT_A8R8G8B8,
    gl: Some(GlTriple {
        format: GL_BGRA,
        internal_format: GL_RGBA8,
        element_type: GL_UNSIGNED_BYTE,
    }),
    features: ALPHA,
    block: BLOCK_BGRA,
};
const BGR: FormatEntry = FormatEntry {
    name: "BGR",
    full_name: "24-bit BGR",
    parm: "bgr24",
    fourcc: D3DFMT_R8G8B8,
    gl: Some(GlTriple {
        format: GL_BGR,
        internal_format: GL_RGB8,
        element_type: GL_UNSIGNED_BYTE,
    }),
    features: Features::NONE,
    block: BLOCK_BGR,
};

fn add_tool(
    registry: &mut Registry,
    codec: CodecId,
    (name, full_name, parm): (&str, &str, &str),
    encoder: Box<dyn TextureEncoder>,
    formats: &[FormatEntry],
) {
    let tool = registry.register_tool(
        ToolDef {
            name: name.to_string(),
            full_name: full_name.to_string(),
            parm_name: parm.to_string(),
            encoder,
        },
        codec,
    );
    for entry in formats {
        registry.register_format(
            FormatDef {
                name: entry.name.to_string(),
                full_name: entry.full_name.to_string(),
                parm_name: entry.parm.to_string(),
                codec,
                fourcc: entry.fourcc,
                gl: entry.gl,
                features: entry.features,
                block: entry.block,
            },
            tool,
        );
    }
}

/// Register every builtin tool, in priority order within each codec.
pub fn install(registry: &mut Registry, codecs: &BuiltinCodecs) {
    add_tool(
        registry,
        codecs.dxt,
        ("ispc", "Intel ISPC Texture Compressor", "ispc"),
        Box::new(IspcEncoder),
        &[DXT1, DXT5],
    );
    add_tool(
        registry,
        codecs.dxt,
        ("nvtt", "NVIDIA Texture Tools", "nvtt"),
        Box::new(ExternalEncoder::new(ExternalTool::Nvcompress)),
        &[DXT1, DXT1A, DXT3, DXT5],
    );
    add_tool(
        registry,
        codecs.etc1,
        ("ispc-etc", "Intel ISPC ETC1 Compressor", "ispcetc"),
        Box::new(IspcEncoder),
        &[ETC1],
    );
    add_tool(
        registry,
        codecs.etc2,
        ("etc2comp", "Google etc2comp", "etc2comp"),
        Box::new(ExternalEncoder::new(ExternalTool::EtcTool)),
        &[ETC2_RGB, ETC2_RGBA, ETC2_RGBA1],
    );
    add_tool(
        registry,
        codecs.pvrtc,
        ("pvrtextool", "Imagination PVRTexTool", "pvrtextool"),
        Box::new(ExternalEncoder::new(ExternalTool::PvrTexTool)),
        &[PVRTC2, PVRTC2A, PVRTC4, PVRTC4A],
    );
    add_tool(
        registry,
        codecs.bgra,
        ("raw", "Uncompressed writer", "raw"),
        Box::new(RawEncoder),
        &[BGRA, BGR],
    );
}
