//! Output file naming.
//!
//! A converted texture lands at
//!
//! ```text
//! <dest>[/<codec>]/<relative dir>/<stem><suffix>.<container ext>
//! ```
//!
//! where the per-codec directory is present whenever more than one codec can
//! write into the same destination, and `<suffix>` is built from the suffix
//! flags:
//!
//! | Flag | Token | Adds |
//! |---|---|---|
//! | tool | `-st` | `_<tool parm>` e.g. `_ispc` |
//! | format | `-sf` | `_<format parm>` e.g. `_dxt1` |
//! | profile | `-sp` | `_<profile>` e.g. `_hq` |
//!
//! Flags combine in that fixed order: `-stfp` gives `wall_ispc_dxt1_hq.dds`.

use crate::encode::Profile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuffixFlags {
    pub tool: bool,
    pub format: bool,
    pub profile: bool,
}

impl SuffixFlags {
    /// Parse a combination of `t`, `f` and `p`, e.g. `"tf"`. Letters may repeat
    /// in any order; anything else is rejected.
    pub fn parse(letters: &str) -> Option<Self> {
        if letters.is_empty() {
            return None;
        }
        let mut flags = Self::default();
        for c in letters.chars() {
            match c.to_ascii_lowercase() {
                't' => flags.tool = true,
                'f' => flags.format = true,
                'p' => flags.profile = true,
                _ => return None,
            }
        }
        Some(flags)
    }

    /// Recognise the short tokens `-st`, `-sf`, `-sp`, `-stf` ... `-stfp`.
    pub fn from_token(token: &str) -> Option<Self> {
        token.strip_prefix("-s").and_then(Self::parse)
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            tool: self.tool || other.tool,
            format: self.format || other.format,
            profile: self.profile || other.profile,
        }
    }

    pub fn compose(self, tool_suffix: &str, format_suffix: &str, profile: Profile) -> String {
        let mut out = String::new();
        if self.tool {
            out.push_str(tool_suffix);
        }
        if self.format {
            out.push_str(format_suffix);
        }
        if self.profile {
            out.push('_');
            out.push_str(profile.name());
        }
        out
    }
}

/// `<relative dir>/<stem><suffix>.<ext>`
pub fn relative_output(relative: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}{suffix}.{extension}");
    match relative.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_combinations() {
        let tf = SuffixFlags::parse("tf").unwrap();
        assert!(tf.tool && tf.format && !tf.profile);
        assert_eq!(SuffixFlags::parse("pft"), SuffixFlags::parse("tfp"));
        assert!(SuffixFlags::parse("").is_none());
        assert!(SuffixFlags::parse("tx").is_none());
    }

    #[test]
    fn short_tokens() {
        for token in ["-st", "-sf", "-sp", "-stf", "-stp", "-sfp", "-stfp"] {
            assert!(SuffixFlags::from_token(token).is_some(), "{token}");
        }
        assert!(SuffixFlags::from_token("-scaler").is_none());
        assert!(SuffixFlags::from_token("-s").is_none());
        assert!(SuffixFlags::from_token("st").is_none());
    }

    #[test]
    fn compose_in_fixed_order() {
        let all = SuffixFlags::parse("pft").unwrap();
        assert_eq!(all.compose("_ispc", "_dxt1", Profile::Hq), "_ispc_dxt1_hq");
        let fmt = SuffixFlags::parse("f").unwrap();
        assert_eq!(fmt.compose("_ispc", "_dxt1", Profile::Hq), "_dxt1");
        assert_eq!(SuffixFlags::default().compose("_a", "_b", Profile::Fast), "");
    }

    #[test]
    fn union_merges_flags() {
        let t = SuffixFlags::parse("t").unwrap();
        let p = SuffixFlags::parse("p").unwrap();
        assert_eq!(t.union(p), SuffixFlags::parse("tp").unwrap());
    }

    #[test]
    fn output_paths() {
        assert_eq!(
            relative_output(Path::new("textures/wall.tga"), "_dxt1", "dds"),
            PathBuf::from("textures/wall_dxt1.dds")
        );
        assert_eq!(
            relative_output(Path::new("wall.png"), "", "ktx"),
            PathBuf::from("wall.ktx")
        );
    }

    #[test]
    fn only_last_extension_is_replaced() {
        assert_eq!(
            relative_output(Path::new("a/b.c.png"), "", "dds"),
            PathBuf::from("a/b.c.dds")
        );
    }
}
