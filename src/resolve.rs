//! Map files and wire identifiers back to registered entities.
//!
//! Three lookups, all in registration order with first match winning:
//!
//! - [`resolve_container`]: content sniffing over a single prefix of
//!   [`Registry::max_scan_bytes`] bytes, then case-insensitive extension.
//! - [`resolve_format_by_fourcc_and_alpha`]: FourCC with an alpha-aware
//!   first pass, so DXT1 and DXT1A (same FourCC) resolve by intent.
//! - [`resolve_format_by_api_triple`]: exact GL (format, internal, type).
//!
//! [`resolve_texture`] combines them to describe an existing texture file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::container::{ContainerError, FormatKey, TextureDescriptor};
use crate::registry::{Container, Features, Format, FourCC, GlTriple, Registry};

/// Find the container owning `path`.
///
/// `bytes` is the file content when it is already in memory; otherwise the
/// prefix is read from disk. A prefix shorter than the registry-wide scan
/// length skips sniffing entirely.
pub fn resolve_container<'r>(
    registry: &'r Registry,
    path: &Path,
    bytes: Option<&[u8]>,
) -> Option<&'r Container> {
    let scan = registry.max_scan_bytes();
    if scan > 0 {
        let prefix = match bytes {
            Some(b) => b.get(..scan).map(<[u8]>::to_vec),
            None => read_prefix(path, scan),
        };
        if let Some(prefix) = prefix
            && let Some(c) = registry
                .containers()
                .find(|c| c.handler().matches(&prefix))
        {
            return Some(c);
        }
    }

    let ext = path.extension()?.to_str()?;
    registry
        .containers()
        .find(|c| c.extension.eq_ignore_ascii_case(ext))
}

/// Exactly `len` bytes from the start of `path`, or `None` if the file is
/// shorter or unreadable.
fn read_prefix(path: &Path, len: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; len];
    File::open(path).ok()?.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Two passes over every codec's formats. With `wants_alpha` the first pass
/// demands the alpha feature; the second ignores features, for containers
/// that flag alpha on formats without a real alpha channel.
pub fn resolve_format_by_fourcc_and_alpha(
    registry: &Registry,
    fourcc: FourCC,
    wants_alpha: bool,
) -> Option<&Format> {
    let candidates: Vec<&Format> = registry
        .codecs()
        .flat_map(|c| registry.codec_formats(c.id))
        .filter(|f| f.fourcc == fourcc)
        .collect();
    if wants_alpha
        && let Some(f) = candidates
            .iter()
            .find(|f| f.features.contains(Features::ALPHA))
    {
        return Some(f);
    }
    candidates.first().copied()
}

pub fn resolve_format_by_api_triple(
    registry: &Registry,
    format: u32,
    internal_format: u32,
    element_type: u32,
) -> Option<&Format> {
    let wanted = GlTriple {
        format,
        internal_format,
        element_type,
    };
    registry
        .codecs()
        .flat_map(|c| registry.codec_formats(c.id))
        .find(|f| f.gl == Some(wanted))
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No registered container recognises {0}")]
    UnknownContainer(String),
    #[error("{container} file with unregistered format {key:?}")]
    UnknownFormat { container: String, key: FormatKey },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A compressed texture file mapped to its container and format.
#[derive(Debug)]
pub struct ResolvedTexture<'r> {
    pub container: &'r Container,
    pub format: &'r Format,
    pub descriptor: TextureDescriptor,
}

/// Resolve container, then format, for an existing texture file.
pub fn resolve_texture<'r>(
    registry: &'r Registry,
    path: &Path,
    bytes: &[u8],
) -> Result<ResolvedTexture<'r>, ResolveError> {
    let container = resolve_container(registry, path, Some(bytes))
        .ok_or_else(|| ResolveError::UnknownContainer(path.display().to_string()))?;
    let descriptor = container.handler().read_descriptor(bytes)?;
    let format = match descriptor.key {
        FormatKey::FourCC { fourcc, alpha } => {
            resolve_format_by_fourcc_and_alpha(registry, fourcc, alpha)
        }
        FormatKey::Gl(gl) => {
            resolve_format_by_api_triple(registry, gl.format, gl.internal_format, gl.element_type)
        }
    }
    .ok_or_else(|| ResolveError::UnknownFormat {
        container: container.name.clone(),
        key: descriptor.key,
    })?;
    Ok(ResolvedTexture {
        container,
        format,
        descriptor,
    })
}
