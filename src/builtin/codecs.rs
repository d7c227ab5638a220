//! Builtin codec families and their format-selection policies.
//!
//! | Codec | No alpha | Binary alpha | Full alpha | Rejects |
//! |---|---|---|---|---|
//! | DXT | DXT1 | DXT1A, DXT5 | DXT5, DXT3 | — |
//! | ETC1 | ETC1 | — | — | any alpha |
//! | ETC2 | ETC2_RGB | ETC2_RGBA1, ETC2_RGBA | ETC2_RGBA | — |
//! | PVRTC | PVRTC4, PVRTC2 | PVRTC4A, PVRTC2A | PVRTC4A, PVRTC2A | non-square or NPOT |
//! | BGRA | BGR, BGRA | BGRA | BGRA | — |
//!
//! Each list is a preference order over the codec's *enabled* formats; the
//! first one present wins. A rejected image goes to the codec's fallback.

use crate::imaging::ImageTraits;
use crate::registry::{CodecDef, CodecId, CodecPolicy, Format, Registry};

/// Codec used as fallback by every other codec.
pub const FALLBACK_CODEC: &str = "BGRA";

/// Ids of the builtin codecs, for wiring tools and formats.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinCodecs {
    pub dxt: CodecId,
    pub etc1: CodecId,
    pub etc2: CodecId,
    pub pvrtc: CodecId,
    pub bgra: CodecId,
}

fn first_of<'a>(formats: &[&'a Format], preference: &[&str]) -> Option<&'a Format> {
    preference
        .iter()
        .find_map(|name| formats.iter().copied().find(|f| f.name == *name))
}

pub struct DxtPolicy;

impl CodecPolicy for DxtPolicy {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        let preference: &[&str] = match (image.has_alpha, image.binary_alpha) {
            (false, _) => &["DXT1"],
            (true, true) => &["DXT1A", "DXT5", "DXT3"],
            (true, false) => &["DXT5", "DXT3"],
        };
        first_of(formats, preference)
    }
}

pub struct Etc1Policy;

impl CodecPolicy for Etc1Policy {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        if image.has_alpha {
            return None;
        }
        first_of(formats, &["ETC1"])
    }
}

pub struct Etc2Policy;

impl CodecPolicy for Etc2Policy {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        let preference: &[&str] = match (image.has_alpha, image.binary_alpha) {
            (false, _) => &["ETC2_RGB"],
            (true, true) => &["ETC2_RGBA1", "ETC2_RGBA"],
            (true, false) => &["ETC2_RGBA"],
        };
        first_of(formats, preference)
    }
}

pub struct PvrtcPolicy;

impl CodecPolicy for PvrtcPolicy {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        // PVRTC 1 hardware only samples square power-of-two textures.
        if !image.is_square_power_of_two() {
            return None;
        }
        let preference: &[&str] = if image.has_alpha {
            &["PVRTC4A", "PVRTC2A"]
        } else {
            &["PVRTC4", "PVRTC2"]
        };
        first_of(formats, preference)
    }
}

pub struct BgraPolicy;

impl CodecPolicy for BgraPolicy {
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format> {
        let preference: &[&str] = if image.has_alpha {
            &["BGRA"]
        } else {
            &["BGR", "BGRA"]
        };
        first_of(formats, preference)
    }
}

fn codec(name: &str, full_name: &str, parm: &str, policy: Box<dyn CodecPolicy>) -> CodecDef {
    CodecDef {
        name: name.to_string(),
        full_name: full_name.to_string(),
        parm_name: parm.to_string(),
        policy,
    }
}

pub fn install(registry: &mut Registry) -> BuiltinCodecs {
    BuiltinCodecs {
        dxt: registry.register_codec(codec(
            "DXT",
            "DirectX Texture Compression",
            "dxt",
            Box::new(DxtPolicy),
        )),
        etc1: registry.register_codec(codec(
            "ETC1",
            "Ericsson Texture Compression",
            "etc1",
            Box::new(Etc1Policy),
        )),
        etc2: registry.register_codec(codec(
            "ETC2",
            "Ericsson Texture Compression 2",
            "etc2",
            Box::new(Etc2Policy),
        )),
        pvrtc: registry.register_codec(codec(
            "PVRTC",
            "PowerVR Texture Compression",
            "pvrtc",
            Box::new(PvrtcPolicy),
        )),
        bgra: registry.register_codec(codec(
            "BGRA",
            "Uncompressed BGRA",
            "bgra",
            Box::new(BgraPolicy),
        )),
    }
}
