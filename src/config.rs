//! Run configuration.
//!
//! Configuration is layered, each layer overriding the one before:
//!
//! 1. Stock defaults ([`TexConfig::default`])
//! 2. `texforge.toml` in the source directory, or the file given by `--config`
//! 3. Command-line flags
//! 4. Registry tokens (`-dxt`, `-disable#nvtt`, `-ktx`, ...)
//!
//! Layers 1 and 2 are merged here as TOML tables; layers 3 and 4 are applied
//! by the binary on top of the resulting [`TexConfig`].
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! default_codecs = ["DXT"]   # used when no codec token is given
//! container = "DDS"          # output container
//! game_dir = "id1"           # data directory searched for when run without arguments
//!
//! [files]
//! include = []               # masks; empty = every supported file
//! nomip = []                 # masks of files converted without mipmaps
//! scale2x = []               # masks of files upscaled 2x
//! scale4x = []               # masks of files upscaled 4x
//!
//! [archive]
//! extensions = ["*.zip", "*.pk3"]
//! path = ""                  # prefix for every archive entry
//! zip_in_memory = 0          # MiB; build archives up to this size in memory
//!
//! [scale]
//! first = "super2x"
//! second = "super2x"
//!
//! [alpha]
//! binary = false
//! min = 0
//! max = 255
//! threshold = 99.0
//!
//! [output]
//! power_of_two = true
//! mipmaps = true
//! sign = true
//! gimp_signature = false
//! profile = "regular"
//! error_metric = "auto"
//!
//! [output.suffix]
//! tool = false
//! format = false
//! profile = false
//!
//! [force]
//! force_nvtt = ["gfx/*.tga"] # files that must use a tool or format
//!
//! [processing]
//! max_threads = 4            # omit for auto = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::encode::{ErrorMetric, Profile};
use crate::imaging::{AlphaDetection, Scaler};
use crate::naming::SuffixFlags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file looked up in the source directory.
pub const CONFIG_FILENAME: &str = "texforge.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TexConfig {
    /// Codecs activated when the command line names none.
    pub default_codecs: Vec<String>,
    /// Output container name.
    pub container: String,
    /// Data directory searched for in parent directories when run without arguments.
    pub game_dir: String,
    pub files: FilesConfig,
    pub archive: ArchiveConfig,
    pub scale: ScaleConfig,
    pub alpha: AlphaDetection,
    pub output: OutputConfig,
    /// `force_<parm>` → masks of files pinned to that tool or format.
    pub force: BTreeMap<String, Vec<String>>,
    pub processing: ProcessingConfig,
}

impl Default for TexConfig {
    fn default() -> Self {
        Self {
            default_codecs: vec!["DXT".to_string()],
            container: "DDS".to_string(),
            game_dir: "id1".to_string(),
            files: FilesConfig::default(),
            archive: ArchiveConfig::default(),
            scale: ScaleConfig::default(),
            alpha: AlphaDetection::default(),
            output: OutputConfig::default(),
            force: BTreeMap::new(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl TexConfig {
    /// Validate value ranges and mask syntax.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha.min > self.alpha.max {
            return Err(ConfigError::Validation(
                "alpha.min must not exceed alpha.max".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.alpha.threshold) {
            return Err(ConfigError::Validation(
                "alpha.threshold must be 0-100".into(),
            ));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        if self.container.is_empty() {
            return Err(ConfigError::Validation("container must not be empty".into()));
        }
        let lists = [
            ("files.include", &self.files.include),
            ("files.nomip", &self.files.nomip),
            ("files.scale2x", &self.files.scale2x),
            ("files.scale4x", &self.files.scale4x),
            ("archive.extensions", &self.archive.extensions),
        ];
        for (name, masks) in lists {
            check_masks(name, masks)?;
        }
        for (group, masks) in &self.force {
            if !group.starts_with("force_") {
                return Err(ConfigError::Validation(format!(
                    "force.{group}: keys must look like force_<tool or format>"
                )));
            }
            check_masks(&format!("force.{group}"), masks)?;
        }
        Ok(())
    }
}

fn check_masks(name: &str, masks: &[String]) -> Result<(), ConfigError> {
    for mask in masks {
        glob::Pattern::new(mask)
            .map_err(|e| ConfigError::Validation(format!("{name}: bad mask {mask:?}: {e}")))?;
    }
    Ok(())
}

/// Compile masks validated by [`TexConfig::validate`]; invalid ones are dropped.
pub fn patterns(masks: &[String]) -> Vec<glob::Pattern> {
    masks
        .iter()
        .filter_map(|m| glob::Pattern::new(m).ok())
        .collect()
}

/// Per-file mask lists, matched against paths relative to the source root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    /// Empty means every supported file.
    pub include: Vec<String>,
    pub nomip: Vec<String>,
    pub scale2x: Vec<String>,
    pub scale4x: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Destination masks that switch output to an archive.
    pub extensions: Vec<String>,
    /// Prefix for every archive entry.
    pub path: String,
    /// In-memory archive threshold in MiB; 0 always streams to disk.
    pub zip_in_memory: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["*.zip".to_string(), "*.pk3".to_string()],
            path: String::new(),
            zip_in_memory: 0,
        }
    }
}

/// Filters for the 2x pass and the second pass of 4x.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleConfig {
    pub first: Scaler,
    pub second: Scaler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Resize up to power-of-two dimensions.
    pub power_of_two: bool,
    pub mipmaps: bool,
    /// Stamp a writer signature into container headers that have room.
    pub sign: bool,
    /// Use the GIMP DDS plugin's signature instead of texforge's own.
    pub gimp_signature: bool,
    pub profile: Profile,
    pub error_metric: ErrorMetric,
    pub suffix: SuffixFlags,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            power_of_two: true,
            mipmaps: true,
            sign: true,
            gimp_signature: false,
            profile: Profile::default(),
            error_metric: ErrorMetric::default(),
            suffix: SuffixFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The stock defaults as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(TexConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<TexConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: TexConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective configuration.
///
/// `explicit` (from `--config`) must exist; otherwise `texforge.toml` in
/// `source_dir` is used when present.
pub fn load_config(source_dir: &Path, explicit: Option<&Path>) -> Result<TexConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str(&content)?)
        }
        None => load_raw_config(&source_dir.join(CONFIG_FILENAME))?,
    };
    resolve_config(overlay)
}

/// A fully-commented stock `texforge.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# texforge configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file as texforge.toml in the source directory, or pass it with
# --config. Command-line flags and codec tokens override it.
# Unknown keys will cause an error.

# Codecs used when the command line names none (e.g. -dxt -etc1).
default_codecs = ["DXT"]

# Output container: DDS or KTX.
container = "DDS"

# Data directory searched for in ../, ../../, ... when run without arguments.
game_dir = "id1"

# ---------------------------------------------------------------------------
# File masks (matched against paths relative to the source directory)
# ---------------------------------------------------------------------------
[files]
# Only convert files matching one of these masks. Empty = every supported file.
include = []

# Files converted without mipmaps (e.g. UI graphics).
nomip = []

# Files upscaled 2x / 4x before compression.
scale2x = []
scale4x = []

# ---------------------------------------------------------------------------
# Archive output
# ---------------------------------------------------------------------------
[archive]
# A destination matching one of these masks is written as a single archive.
extensions = ["*.zip", "*.pk3"]

# Prefix for every archive entry, e.g. "textures/".
path = ""

# Build archives whose inputs total at most this many MiB in memory.
# 0 streams every archive to disk.
zip_in_memory = 0

# ---------------------------------------------------------------------------
# Upscaling filters
# ---------------------------------------------------------------------------
# nearest, bilinear, bicubic, bspline, catmullrom, lanczos, scale2x, super2x
[scale]
first = "super2x"
second = "super2x"

# ---------------------------------------------------------------------------
# Alpha analysis
# ---------------------------------------------------------------------------
[alpha]
# Detect cut-out (binary) alpha so codecs can pick 1-bit alpha formats.
binary = false
# Alpha values <= min or >= max count as binary.
min = 0
max = 255
# Percentage of pixels that must be binary.
threshold = 99.0

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Resize non-power-of-two images up to the next power of two.
power_of_two = true

# Generate the full mipmap chain.
mipmaps = true

# Stamp a writer signature into DDS headers.
sign = true

# Use the GIMP DDS plugin signature instead (GIMP then reads the file as its own).
gimp_signature = false

# Encoder effort: fast, regular, hq.
profile = "regular"

# Compression error metric: auto, uniform, perceptual.
error_metric = "auto"

# Output filename suffixes: _<tool>, _<format>, _<profile>.
[output.suffix]
tool = false
format = false
profile = false

# ---------------------------------------------------------------------------
# Forced tools and formats
# ---------------------------------------------------------------------------
# force_<tool or format parameter name> = [masks]
[force]
# force_nvtt = ["gfx/*"]
# force_dxt5 = ["textures/glass*"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4
"##
}
