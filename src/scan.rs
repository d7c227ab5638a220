//! Input resolution and source enumeration.
//!
//! Stage 1 of a run. Works out where textures come from and where they go,
//! then lists the files to convert.
//!
//! ## Input Modes
//!
//! | Invocation | Source | Destination | Codec dirs | Cache |
//! |---|---|---|---|---|
//! | `texforge` (no arguments) | first `../<game_dir>` found, up to 10 levels up | same | yes | yes |
//! | `texforge DIR [flags]` | `DIR` recursively | `-o` or `DIR` | only without `-o` | yes |
//! | `texforge DIR/*.tga [flags]` | files in `DIR` matching the mask | `-o` or `DIR` | only without `-o` | yes |
//! | `texforge PATH...` (dropped, no flags) | first path | beside the input | for directories | no |
//!
//! Extra dropped paths are converted as additional single files.
//!
//! ## Enumeration
//!
//! ```text
//! id1/                         # source root
//! ├── texforge.toml            # ignored (not an image)
//! ├── textures/
//! │   ├── wall.tga             # Image: decoded and encoded
//! │   └── glass.png
//! ├── gfx/sky.dds              # Texture: already in a registered container
//! └── DXT/...                  # previous output, skipped when it is a codec dir
//! ```
//!
//! A file is a source if it has a decodable image extension or a registered
//! container extension, matches the optional file mask, and matches one of the
//! `[files] include` masks (when any are configured).

use crate::registry::Registry;
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// How many parent directories are searched for the game directory.
const SEARCH_DEPTH: usize = 10;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("No input given and no {0} directory found in parent directories")]
    NoInput(String),
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Bad file mask {mask:?}: {reason}")]
    BadMask { mask: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Found by searching parent directories for the game directory.
    Discovered,
    /// Explicit source on a command line with flags.
    Normal,
    /// Directory dropped onto the executable.
    DropDirectory,
    /// File dropped onto the executable.
    DropFile,
}

/// Where to read from and write to, decided before enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPlan {
    pub mode: InputMode,
    pub source_dir: PathBuf,
    /// File name or mask inside `source_dir`; `None` walks the whole tree.
    pub file_mask: Option<String>,
    /// Further dropped files. Their output lands flat in `destination`
    /// under their bare file names, not beside each source.
    pub extra_files: Vec<PathBuf>,
    pub destination: PathBuf,
    /// Write into `<destination>/<codec>/...`.
    pub per_codec_dirs: bool,
    /// Drop mode never uses the cache.
    pub allow_cache: bool,
}

impl InputPlan {
    /// A single named file (not a mask): eligible for inspection.
    pub fn single_file(&self) -> Option<PathBuf> {
        let name = self.file_mask.as_ref()?;
        if has_wildcards(name) || !self.extra_files.is_empty() {
            return None;
        }
        Some(self.source_dir.join(name))
    }
}

fn has_wildcards(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Decide the input mode.
///
/// `dropped` is true when the command line held nothing but paths.
pub fn plan_input(
    positional: &[PathBuf],
    output: Option<&Path>,
    dropped: bool,
    game_dir: &str,
    cwd: &Path,
) -> Result<InputPlan, ScanError> {
    let Some(first) = positional.first() else {
        return find_game_dir(game_dir, cwd);
    };

    if dropped && output.is_none() {
        let extra_files = positional[1..].to_vec();
        if first.is_dir() {
            return Ok(InputPlan {
                mode: InputMode::DropDirectory,
                source_dir: first.clone(),
                file_mask: None,
                extra_files,
                destination: first.clone(),
                per_codec_dirs: true,
                allow_cache: false,
            });
        }
        let (dir, name) = split_file(first)?;
        return Ok(InputPlan {
            mode: InputMode::DropFile,
            source_dir: dir.clone(),
            file_mask: Some(name),
            extra_files,
            destination: dir,
            per_codec_dirs: false,
            allow_cache: false,
        });
    }

    let (source_dir, file_mask) = if first.is_dir() {
        (first.clone(), None)
    } else {
        let (dir, name) = split_file(first)?;
        (dir, Some(name))
    };
    let (destination, per_codec_dirs) = match output {
        Some(o) => (o.to_path_buf(), false),
        None => (source_dir.clone(), true),
    };
    Ok(InputPlan {
        mode: InputMode::Normal,
        source_dir,
        file_mask,
        extra_files: Vec::new(),
        destination,
        per_codec_dirs,
        allow_cache: true,
    })
}

/// Split a file path or mask into (directory, name). A plain file name must
/// exist; a mask is taken as given.
fn split_file(path: &Path) -> Result<(PathBuf, String), ScanError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ScanError::SourceNotFound(path.to_path_buf()))?;
    if !has_wildcards(&name) && !path.is_file() {
        return Err(ScanError::SourceNotFound(path.to_path_buf()));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}

fn find_game_dir(game_dir: &str, cwd: &Path) -> Result<InputPlan, ScanError> {
    if !game_dir.is_empty() {
        let mut base = cwd.to_path_buf();
        for _ in 0..SEARCH_DEPTH {
            base.push("..");
            let candidate = base.join(game_dir);
            if candidate.is_dir() {
                tracing::info!(dir = %candidate.display(), "base and output directory detected");
                return Ok(InputPlan {
                    mode: InputMode::Discovered,
                    source_dir: candidate.clone(),
                    file_mask: None,
                    extra_files: Vec::new(),
                    destination: candidate,
                    per_codec_dirs: true,
                    allow_cache: true,
                });
            }
        }
    }
    Err(ScanError::NoInput(game_dir.to_string()))
}

// ============================================================================
// Enumeration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Decodable image, to be encoded.
    Image,
    /// Already wrapped in a registered container.
    Texture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Relative to the source root; just the file name for extra files.
    pub relative: PathBuf,
    pub size: u64,
    pub kind: SourceKind,
}

/// Relative path with `/` separators, used for masks, cache keys and archive
/// entries.
pub fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Masks match case-insensitively, `*` crossing directory separators.
pub fn mask_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    }
}

pub fn matches_any(patterns: &[Pattern], relative: &str) -> bool {
    let options = mask_options();
    patterns.iter().any(|p| p.matches_with(relative, options))
}

fn classify(path: &Path, registry: &Registry) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?;
    if crate::imaging::supported_input_extensions()
        .iter()
        .any(|e| e.eq_ignore_ascii_case(ext))
    {
        return Some(SourceKind::Image);
    }
    registry
        .containers()
        .any(|c| c.extension.eq_ignore_ascii_case(ext))
        .then_some(SourceKind::Texture)
}

/// List every source file of `plan`, sorted by relative path.
pub fn enumerate(
    plan: &InputPlan,
    include: &[Pattern],
    registry: &Registry,
) -> Result<Vec<SourceFile>, ScanError> {
    let mask = plan
        .file_mask
        .as_deref()
        .map(|m| {
            Pattern::new(m).map_err(|e| ScanError::BadMask {
                mask: m.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()?;
    let skip_dirs = output_dirs(plan, registry);
    let max_depth = if plan.file_mask.is_some() { 1 } else { usize::MAX };

    let mut files = Vec::new();
    let walker = WalkDir::new(&plan.source_dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && skip_dirs.iter().any(|d| d == e.path())));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(&plan.source_dir) else {
            continue;
        };
        let key = relative_key(relative);
        if let Some(mask) = &mask
            && !mask.matches_with(&key, mask_options())
        {
            continue;
        }
        if !include.is_empty() && !matches_any(include, &key) {
            continue;
        }
        let Some(kind) = classify(path, registry) else {
            continue;
        };
        files.push(SourceFile {
            path: path.to_path_buf(),
            relative: relative.to_path_buf(),
            size: entry.metadata()?.len(),
            kind,
        });
    }

    for extra in &plan.extra_files {
        let Some(kind) = classify(extra, registry) else {
            tracing::warn!(path = %extra.display(), "not a supported file, skipped");
            continue;
        };
        let Some(name) = extra.file_name() else {
            continue;
        };
        files.push(SourceFile {
            path: extra.clone(),
            relative: PathBuf::from(name),
            size: std::fs::metadata(extra)?.len(),
            kind,
        });
    }
    Ok(files)
}

/// Per-codec output directories nested in the source tree; walking them
/// would feed previous output back in as input.
fn output_dirs(plan: &InputPlan, registry: &Registry) -> Vec<PathBuf> {
    if !plan.per_codec_dirs {
        return Vec::new();
    }
    registry
        .codecs()
        .map(|c| plan.destination.join(&c.name))
        .collect()
}
