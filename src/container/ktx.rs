//! Khronos KTX 1.1 container.

use super::{
    ContainerError, ContainerFormat, FormatKey, TextureDescriptor, TextureHeader, check_extent,
    put_u32_le, read_u32_le,
};
use crate::registry::{ContainerDef, GlTriple};

pub const IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
pub const HEADER_LEN: usize = 64;
const ENDIAN_LE: u32 = 0x0403_0201;
const ENDIAN_BE: u32 = 0x0102_0304;

const GL_RGB: u32 = 0x1907;
const GL_RGBA: u32 = 0x1908;

pub struct Ktx;

pub fn definition() -> ContainerDef {
    ContainerDef {
        name: "KTX".into(),
        full_name: "Khronos Texture 1.1".into(),
        extension: "ktx".into(),
        scan_bytes: IDENTIFIER.len(),
        mip_header_size: 4,
        mip_data_padding: 4,
        handler: Box::new(Ktx),
    }
}

/// Header fields, in file order after identifier and endianness.
struct Fields {
    gl_type: u32,
    gl_format: u32,
    gl_internal_format: u32,
    width: u32,
    height: u32,
    levels: u32,
    key_value_bytes: u32,
}

fn read_fields(bytes: &[u8]) -> Result<Fields, ContainerError> {
    if !bytes.starts_with(&IDENTIFIER) {
        return Err(ContainerError::BadMagic("KTX"));
    }
    if bytes.len() < HEADER_LEN {
        return Err(ContainerError::Truncated {
            needed: HEADER_LEN,
            got: bytes.len(),
        });
    }
    let swap = match read_u32_le(bytes, 12)? {
        ENDIAN_LE => false,
        ENDIAN_BE => true,
        other => {
            return Err(ContainerError::Unsupported {
                container: "KTX",
                reason: format!("endianness marker 0x{other:08x}"),
            });
        }
    };
    let field = |offset: usize| -> Result<u32, ContainerError> {
        let v = read_u32_le(bytes, offset)?;
        Ok(if swap { v.swap_bytes() } else { v })
    };
    Ok(Fields {
        gl_type: field(16)?,
        gl_format: field(24)?,
        gl_internal_format: field(28)?,
        width: field(36)?,
        height: field(40)?,
        levels: field(56)?,
        key_value_bytes: field(60)?,
    })
}

impl ContainerFormat for Ktx {
    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(&IDENTIFIER)
    }

    fn read_descriptor(&self, bytes: &[u8]) -> Result<TextureDescriptor, ContainerError> {
        let f = read_fields(bytes)?;
        let (height, levels) = (f.height.max(1), f.levels.max(1));
        check_extent("KTX", f.width, height, levels)?;
        Ok(TextureDescriptor {
            key: FormatKey::Gl(GlTriple {
                format: f.gl_format,
                internal_format: f.gl_internal_format,
                element_type: f.gl_type,
            }),
            width: f.width,
            height,
            levels,
        })
    }

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn stored_header_len(&self, bytes: &[u8]) -> Result<usize, ContainerError> {
        Ok(HEADER_LEN + read_fields(bytes)?.key_value_bytes as usize)
    }

    fn write_header(
        &self,
        header: &TextureHeader<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), ContainerError> {
        let format = header.format;
        let gl = format.gl.ok_or_else(|| ContainerError::Unsupported {
            container: "KTX",
            reason: format!("{} has no GL format identifiers", format.name),
        })?;
        let compressed = gl.element_type == 0;

        let mut h = [0u8; HEADER_LEN];
        h[..12].copy_from_slice(&IDENTIFIER);
        put_u32_le(&mut h, 12, ENDIAN_LE);
        put_u32_le(&mut h, 16, gl.element_type);
        // glTypeSize: 1 for compressed and byte-typed data alike
        put_u32_le(&mut h, 20, 1);
        put_u32_le(&mut h, 24, gl.format);
        put_u32_le(&mut h, 28, gl.internal_format);
        let base = if compressed {
            if format.has_alpha() { GL_RGBA } else { GL_RGB }
        } else {
            gl.format
        };
        put_u32_le(&mut h, 32, base);
        put_u32_le(&mut h, 36, header.width);
        put_u32_le(&mut h, 40, header.height);
        // depth 0, array elements 0
        put_u32_le(&mut h, 52, 1);
        put_u32_le(&mut h, 56, header.levels);
        put_u32_le(&mut h, 60, 0);
        out.extend_from_slice(&h);
        Ok(())
    }

    fn write_level_header(&self, payload_len: u64, out: &mut Vec<u8>) {
        out.extend_from_slice(&(payload_len as u32).to_le_bytes());
    }
}

/// Payload of the first level of a KTX file, as written by external tools.
pub fn first_level_payload(bytes: &[u8]) -> Result<&[u8], ContainerError> {
    let f = read_fields(bytes)?;
    let offset = HEADER_LEN + f.key_value_bytes as usize;
    let size = read_u32_le(bytes, offset)? as usize;
    let start = offset + 4;
    bytes.get(start..start + size).ok_or(ContainerError::Truncated {
        needed: start + size,
        got: bytes.len(),
    })
}
