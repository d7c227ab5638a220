//! DirectDraw Surface container.

use super::{
    ContainerError, ContainerFormat, FormatKey, Signature, TextureDescriptor, TextureHeader,
    check_extent, put_u32_le, read_u32_le,
};
use crate::registry::{ContainerDef, FourCC};

const MAGIC: &[u8; 4] = b"DDS ";
pub const HEADER_LEN: usize = 128;
const DX10_HEADER_LEN: usize = 20;

// DDS_HEADER.dwFlags
const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PITCH: u32 = 0x8;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_MIPMAPCOUNT: u32 = 0x20000;
const DDSD_LINEARSIZE: u32 = 0x80000;

// DDS_PIXELFORMAT.dwFlags
const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;

// dwCaps
const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_MIPMAP: u32 = 0x40_0000;

/// D3DFMT codes used for uncompressed pixel formats in place of a FourCC.
pub const D3DFMT_R8G8B8: FourCC = FourCC(20);
pub const D3DFMT_A8R8G8B8: FourCC = FourCC(21);

const FOURCC_DX10: FourCC = FourCC::from_bytes(b"DX10");

/// First of the eleven reserved header words.
const SIGNATURE_OFFSET: usize = 32;

const OFF_FLAGS: usize = 8;
const OFF_HEIGHT: usize = 12;
const OFF_WIDTH: usize = 16;
const OFF_PITCH: usize = 20;
const OFF_MIPCOUNT: usize = 28;
const OFF_PF: usize = 76;
const OFF_CAPS: usize = 108;

pub struct Dds;

pub fn definition() -> ContainerDef {
    ContainerDef {
        name: "DDS".into(),
        full_name: "DirectDraw Surface".into(),
        extension: "dds".into(),
        scan_bytes: MAGIC.len(),
        mip_header_size: 0,
        mip_data_padding: 0,
        handler: Box::new(Dds),
    }
}

impl ContainerFormat for Dds {
    fn matches(&self, prefix: &[u8]) -> bool {
        prefix.starts_with(MAGIC)
    }

    fn read_descriptor(&self, bytes: &[u8]) -> Result<TextureDescriptor, ContainerError> {
        if !bytes.starts_with(MAGIC) {
            return Err(ContainerError::BadMagic("DDS"));
        }
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::Truncated {
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let height = read_u32_le(bytes, OFF_HEIGHT)?;
        let width = read_u32_le(bytes, OFF_WIDTH)?;
        let levels = read_u32_le(bytes, OFF_MIPCOUNT)?.max(1);
        let pf_flags = read_u32_le(bytes, OFF_PF + 4)?;
        let alpha = pf_flags & DDPF_ALPHAPIXELS != 0;

        let fourcc = if pf_flags & DDPF_FOURCC != 0 {
            let fourcc = FourCC(read_u32_le(bytes, OFF_PF + 8)?);
            if fourcc == FOURCC_DX10 {
                return Err(ContainerError::Unsupported {
                    container: "DDS",
                    reason: "DX10 extended header".into(),
                });
            }
            fourcc
        } else if pf_flags & DDPF_RGB != 0 {
            match read_u32_le(bytes, OFF_PF + 12)? {
                32 => D3DFMT_A8R8G8B8,
                24 => D3DFMT_R8G8B8,
                bits => {
                    return Err(ContainerError::Unsupported {
                        container: "DDS",
                        reason: format!("{bits}-bit RGB"),
                    });
                }
            }
        } else {
            return Err(ContainerError::Unsupported {
                container: "DDS",
                reason: format!("pixel format flags 0x{pf_flags:x}"),
            });
        };

        check_extent("DDS", width, height, levels)?;
        Ok(TextureDescriptor {
            key: FormatKey::FourCC { fourcc, alpha },
            width,
            height,
            levels,
        })
    }

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn write_header(
        &self,
        header: &TextureHeader<'_>,
        out: &mut Vec<u8>,
    ) -> Result<(), ContainerError> {
        let format = header.format;
        let uncompressed = format.block.width == 1 && format.block.height == 1;
        let mut h = [0u8; HEADER_LEN];
        h[..4].copy_from_slice(MAGIC);
        put_u32_le(&mut h, 4, 124);

        let mut flags = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT;
        flags |= if uncompressed { DDSD_PITCH } else { DDSD_LINEARSIZE };
        if header.levels > 1 {
            flags |= DDSD_MIPMAPCOUNT;
        }
        put_u32_le(&mut h, OFF_FLAGS, flags);
        put_u32_le(&mut h, OFF_HEIGHT, header.height);
        put_u32_le(&mut h, OFF_WIDTH, header.width);
        let pitch = if uncompressed {
            header.width * format.block.bits / 8
        } else {
            format.block.level_payload(header.width, header.height) as u32
        };
        put_u32_le(&mut h, OFF_PITCH, pitch);
        put_u32_le(&mut h, OFF_MIPCOUNT, header.levels);

        if let Some(Signature {
            word1,
            word2,
            version,
        }) = header.signature
        {
            h[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(&word1);
            h[SIGNATURE_OFFSET + 4..SIGNATURE_OFFSET + 8].copy_from_slice(&word2);
            put_u32_le(&mut h, SIGNATURE_OFFSET + 8, version);
        }

        put_u32_le(&mut h, OFF_PF, 32);
        let alpha = if format.has_alpha() { DDPF_ALPHAPIXELS } else { 0 };
        if format.fourcc == D3DFMT_A8R8G8B8 || format.fourcc == D3DFMT_R8G8B8 {
            put_u32_le(&mut h, OFF_PF + 4, DDPF_RGB | alpha);
            put_u32_le(&mut h, OFF_PF + 12, format.block.bits);
            put_u32_le(&mut h, OFF_PF + 16, 0x00ff_0000);
            put_u32_le(&mut h, OFF_PF + 20, 0x0000_ff00);
            put_u32_le(&mut h, OFF_PF + 24, 0x0000_00ff);
            if format.has_alpha() {
                put_u32_le(&mut h, OFF_PF + 28, 0xff00_0000);
            }
        } else {
            put_u32_le(&mut h, OFF_PF + 4, DDPF_FOURCC | alpha);
            put_u32_le(&mut h, OFF_PF + 8, format.fourcc.0);
        }

        let mut caps = DDSCAPS_TEXTURE;
        if header.levels > 1 {
            caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
        }
        put_u32_le(&mut h, OFF_CAPS, caps);

        out.extend_from_slice(&h);
        Ok(())
    }
}

/// Payload of the first level of a DDS file, as written by external tools.
pub fn first_level_payload(bytes: &[u8]) -> Result<&[u8], ContainerError> {
    if !bytes.starts_with(MAGIC) {
        return Err(ContainerError::BadMagic("DDS"));
    }
    let mut offset = HEADER_LEN;
    if FourCC(read_u32_le(bytes, OFF_PF + 8)?) == FOURCC_DX10 {
        offset += DX10_HEADER_LEN;
    }
    bytes.get(offset..).filter(|p| !p.is_empty()).ok_or(ContainerError::Truncated {
        needed: offset + 1,
        got: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    fn header_for(name: &str, levels: u32, signature: Option<Signature>) -> Vec<u8> {
        let reg = builtin::registry().unwrap();
        let format = reg.find_format(name).unwrap();
        let mut out = Vec::new();
        Dds.write_header(
            &TextureHeader {
                format,
                width: 64,
                height: 32,
                levels,
                signature,
            },
            &mut out,
        )
        .unwrap();
        out
    }

    #[test]
    fn absurd_dimensions_are_rejected() {
        let mut h = header_for("BGRA", 1, None);
        put_u32_le(&mut h, OFF_WIDTH, u32::MAX);
        put_u32_le(&mut h, OFF_HEIGHT, u32::MAX);
        assert!(matches!(
            Dds.read_descriptor(&h),
            Err(ContainerError::Unsupported { container: "DDS", .. })
        ));
    }

    #[test]
    fn header_is_128_bytes_with_magic() {
        let h = header_for("DXT1", 1, None);
        assert_eq!(h.len(), 128);
        assert!(Dds.matches(&h));
        assert!(!Dds.matches(b"KTX "));
    }

    #[test]
    fn compressed_descriptor_round_trips() {
        let h = header_for("DXT5", 7, None);
        let d = Dds.read_descriptor(&h).unwrap();
        assert_eq!(
            d.key,
            FormatKey::FourCC {
                fourcc: FourCC::from_bytes(b"DXT5"),
                alpha: true
            }
        );
        assert_eq!((d.width, d.height, d.levels), (64, 32, 7));
    }

    #[test]
    fn dxt1a_sets_alpha_flag_on_shared_fourcc() {
        let opaque = Dds.read_descriptor(&header_for("DXT1", 1, None)).unwrap();
        let cutout = Dds.read_descriptor(&header_for("DXT1A", 1, None)).unwrap();
        assert_eq!(
            opaque.key,
            FormatKey::FourCC {
                fourcc: FourCC::from_bytes(b"DXT1"),
                alpha: false
            }
        );
        assert_eq!(
            cutout.key,
            FormatKey::FourCC {
                fourcc: FourCC::from_bytes(b"DXT1"),
                alpha: true
            }
        );
    }

    #[test]
    fn uncompressed_descriptor_maps_to_d3dfmt() {
        let d = Dds.read_descriptor(&header_for("BGRA", 1, None)).unwrap();
        assert_eq!(
            d.key,
            FormatKey::FourCC {
                fourcc: D3DFMT_A8R8G8B8,
                alpha: true
            }
        );
        let d = Dds.read_descriptor(&header_for("BGR", 1, None)).unwrap();
        assert_eq!(
            d.key,
            FormatKey::FourCC {
                fourcc: D3DFMT_R8G8B8,
                alpha: false
            }
        );
    }

    #[test]
    fn signature_only_when_requested() {
        assert_eq!(&header_for("DXT1", 1, true)[32..36], SIGNATURE);
        assert_eq!(&header_for("DXT1", 1, None)[32..36], &[0, 0, 0, 0]);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let h = header_for("DXT1", 1, None);
        assert!(matches!(
            Dds.read_descriptor(&h[..40]),
            Err(ContainerError::Truncated { .. })
        ));
    }

    #[test]
    fn first_level_payload_skips_header() {
        let mut file = header_for("DXT1", 1, None);
        file.extend_from_slice(&[7u8; 8]);
        assert_eq!(first_level_payload(&file).unwrap(), &[7u8; 8]);
        assert!(first_level_payload(b"nope").is_err());
    }
}
