//! Command-line tokens derived from an entity's short parameter name.
//!
//! Every codec, tool, format and container gets its tokens computed once at
//! registration. The derivation is a pure function of the short name, so a
//! plugin never spells out its own flags:
//!
//! | Token | Codec | Tool / Format | Container |
//! |---|---|---|---|
//! | enable | `-dxt` | `-ispc` | `-dds` |
//! | disable | `-disable#dxt` | `-disable#ispc` | — |
//! | force group | — | `force_ispc` | — |
//! | filename suffix | — | `_ispc` | — |

/// Enable token: `-<parm>`.
pub fn enable_token(parm: &str) -> String {
    format!("-{parm}")
}

/// Disable token: `-disable#<parm>`.
pub fn disable_token(parm: &str) -> String {
    format!("-disable#{parm}")
}

/// Name of the configuration group listing files forced onto a tool/format.
pub fn force_group(parm: &str) -> String {
    format!("force_{parm}")
}

/// Output filename suffix: `_<parm>`.
pub fn suffix(parm: &str) -> String {
    format!("_{parm}")
}

/// Tokens carried by codecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecTokens {
    pub enable: String,
    pub disable: String,
}

impl CodecTokens {
    pub fn derive(parm: &str) -> Self {
        Self {
            enable: enable_token(parm),
            disable: disable_token(parm),
        }
    }
}

/// Tokens carried by tools and formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorTokens {
    pub enable: String,
    pub disable: String,
    pub force_group: String,
    pub suffix: String,
}

impl SelectorTokens {
    pub fn derive(parm: &str) -> Self {
        Self {
            enable: enable_token(parm),
            disable: disable_token(parm),
            force_group: force_group(parm),
            suffix: suffix(parm),
        }
    }
}
