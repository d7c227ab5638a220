//! Plugin registry: codecs, tools, formats and containers.
//!
//! The registry is the single owner of every pluggable entity. It is built once
//! during start-up (see [`builtin::install`](crate::builtin::install)) and is
//! read-only afterwards, so worker threads share it by plain reference.
//!
//! # Entities
//!
//! - **Codec**: a compression family (DXT, ETC1, …). Owns an ordered list of
//!   tools, exposes the formats its tools can produce, and names a fallback
//!   codec used when its policy rejects an image.
//! - **Tool**: one encoder implementation for a codec. A tool belongs to
//!   exactly one codec; formats may be shared between tools of that codec.
//! - **Format**: a concrete encoding: FourCC, optional GL triple, feature
//!   bits and block geometry.
//! - **Container**: a file wrapper (DDS, KTX) with content sniffing and the
//!   per-level header/padding parameters used by the layout calculator.
//!
//! # Registration rules
//!
//! Names are unique per catalog, compared case-insensitively. Re-registering a
//! codec, tool or container name logs a warning and keeps the first entry;
//! duplicate formats are skipped silently. Each registration derives its CLI
//! tokens from the short parameter name (see [`tokens`]) and then runs the
//! entity's `init` hook.
//!
//! # Active chain
//!
//! The active codec chain is an ordered subset of registered codecs, in the
//! order they were requested. Every converted image is encoded once per active
//! codec; the order also decides which codec claims an already-compressed input.

mod catalog;
pub mod tokens;

use crate::block::BlockGeometry;
use crate::container::ContainerFormat;
use crate::encode::TextureEncoder;
use crate::imaging::ImageTraits;
use catalog::{Catalog, Named};
use std::fmt;
use thiserror::Error;
use tokens::{CodecTokens, SelectorTokens};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unsupported texture codec: {0}")]
    UnknownCodec(String),
    #[error("Unsupported texture tool: {0}")]
    UnknownTool(String),
    #[error("Unsupported texture format: {0}")]
    UnknownFormat(String),
    #[error("Unsupported container: {0}")]
    UnknownContainer(String),
    #[error("Unknown force group: {0}")]
    UnknownForceGroup(String),
    #[error("Invalid file mask '{mask}': {reason}")]
    InvalidMask { mask: String, reason: String },
}

// ============================================================================
// Identifiers and small value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodecId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

/// Four-character code identifying a format on the wire (little-endian packed).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub u32);

impl FourCC {
    pub const NONE: FourCC = FourCC(0);

    pub const fn from_bytes(b: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*b))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "{}", String::from_utf8_lossy(&bytes))
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

/// `(format, internal format, element type)` as used by GL-style APIs and KTX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTriple {
    pub format: u32,
    pub internal_format: u32,
    pub element_type: u32,
}

/// Feature bits used to disambiguate formats sharing a FourCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features(u32);

impl Features {
    pub const NONE: Features = Features(0);
    pub const ALPHA: Features = Features(1);
    pub const BINARY_ALPHA: Features = Features(1 << 1);

    pub const fn union(self, other: Features) -> Features {
        Features(self.0 | other.0)
    }

    pub fn contains(self, other: Features) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Format-selection policy of a codec family.
pub trait CodecPolicy: Send + Sync {
    /// Runs once after the codec is registered.
    fn init(&self) {}

    /// Pick the format to encode `image` with, among the codec's enabled
    /// formats. `None` rejects the image; the codec's fallback takes over.
    fn select_format<'a>(&self, image: &ImageTraits, formats: &[&'a Format]) -> Option<&'a Format>;
}

// ============================================================================
// Definitions (registration input)
// ============================================================================

pub struct CodecDef {
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub policy: Box<dyn CodecPolicy>,
}

pub struct ToolDef {
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub encoder: Box<dyn TextureEncoder>,
}

#[derive(Debug, Clone)]
pub struct FormatDef {
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub codec: CodecId,
    pub fourcc: FourCC,
    pub gl: Option<GlTriple>,
    pub features: Features,
    pub block: BlockGeometry,
}

pub struct ContainerDef {
    pub name: String,
    pub full_name: String,
    pub extension: String,
    pub scan_bytes: usize,
    pub mip_header_size: u64,
    pub mip_data_padding: u64,
    pub handler: Box<dyn ContainerFormat>,
}

// ============================================================================
// Registered entities
// ============================================================================

pub struct Codec {
    pub id: CodecId,
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub tokens: CodecTokens,
    pub tools: Vec<ToolId>,
    pub formats: Vec<FormatId>,
    pub fallback: Option<CodecId>,
    policy: Box<dyn CodecPolicy>,
}

impl Named for Codec {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tools", &self.tools)
            .field("formats", &self.formats)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub codec: CodecId,
    pub tokens: SelectorTokens,
    pub formats: Vec<FormatId>,
    pub force_files: Vec<glob::Pattern>,
    encoder: Box<dyn TextureEncoder>,
}

impl Tool {
    pub fn version(&self) -> String {
        self.encoder.version()
    }

    pub fn encoder(&self) -> &dyn TextureEncoder {
        self.encoder.as_ref()
    }

    pub fn supports(&self, format: FormatId) -> bool {
        self.formats.contains(&format)
    }
}

impl Named for Tool {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("codec", &self.codec)
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Format {
    pub id: FormatId,
    pub name: String,
    pub full_name: String,
    pub parm_name: String,
    pub codec: CodecId,
    pub fourcc: FourCC,
    pub gl: Option<GlTriple>,
    pub features: Features,
    pub block: BlockGeometry,
    pub tokens: SelectorTokens,
    pub force_files: Vec<glob::Pattern>,
}

impl Format {
    pub fn has_alpha(&self) -> bool {
        self.features.contains(Features::ALPHA)
    }
}

impl Named for Format {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub full_name: String,
    pub extension: String,
    pub scan_bytes: usize,
    pub mip_header_size: u64,
    pub mip_data_padding: u64,
    pub enable_token: String,
    handler: Box<dyn ContainerFormat>,
}

impl Container {
    pub fn handler(&self) -> &dyn ContainerFormat {
        self.handler.as_ref()
    }
}

impl Named for Container {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("extension", &self.extension)
            .field("scan_bytes", &self.scan_bytes)
            .field("mip_header_size", &self.mip_header_size)
            .field("mip_data_padding", &self.mip_data_padding)
            .finish_non_exhaustive()
    }
}

/// What a command-line token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTarget {
    EnableCodec(CodecId),
    DisableCodec(CodecId),
    EnableTool(ToolId),
    DisableTool(ToolId),
    EnableFormat(FormatId),
    DisableFormat(FormatId),
    Container(ContainerId),
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
pub struct Registry {
    codecs: Catalog<Codec>,
    tools: Catalog<Tool>,
    formats: Catalog<Format>,
    containers: Catalog<Container>,
    max_scan_bytes: usize,
    active: Vec<CodecId>,
    warnings: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- registration ------------------------------------------------------

    pub fn register_codec(&mut self, def: CodecDef) -> CodecId {
        let id = CodecId(self.codecs.len());
        let codec = Codec {
            id,
            tokens: CodecTokens::derive(&def.parm_name),
            name: def.name,
            full_name: def.full_name,
            parm_name: def.parm_name,
            tools: Vec::new(),
            formats: Vec::new(),
            fallback: None,
            policy: def.policy,
        };
        match self.codecs.insert(codec) {
            Ok(pos) => {
                let codec = &self.codecs[pos];
                codec.policy.init();
                CodecId(pos)
            }
            Err(existing) => {
                let full_name = self.codecs.get(existing).map(|c| c.full_name.clone());
                self.warn(format!(
                    "Texture codec '{}' already registered",
                    full_name.unwrap_or_default()
                ));
                CodecId(existing)
            }
        }
    }

    pub fn register_tool(&mut self, def: ToolDef, codec: CodecId) -> ToolId {
        // Codec scope first: a tool name appears once per codec.
        let scoped = self.codecs.get(codec.0).and_then(|c| {
            c.tools
                .iter()
                .copied()
                .find(|t| self.tools.get(t.0).is_some_and(|t| t.name.eq_ignore_ascii_case(&def.name)))
        });

        let id = match self.tools.position(&def.name) {
            Some(existing) => {
                let full_name = self.tools.get(existing).map(|t| t.full_name.clone());
                self.warn(format!(
                    "Texture tool '{}' already registered",
                    full_name.unwrap_or_default()
                ));
                ToolId(existing)
            }
            None => {
                let id = ToolId(self.tools.len());
                let tool = Tool {
                    id,
                    tokens: SelectorTokens::derive(&def.parm_name),
                    name: def.name,
                    full_name: def.full_name,
                    parm_name: def.parm_name,
                    codec,
                    formats: Vec::new(),
                    force_files: Vec::new(),
                    encoder: def.encoder,
                };
                let pos = self.tools.insert(tool).unwrap_or_else(|existing| existing);
                if let Some(tool) = self.tools.get(pos) {
                    tool.encoder.init();
                }
                ToolId(pos)
            }
        };

        if scoped.is_none()
            && let Some(c) = self.codecs.get_mut(codec.0)
        {
            c.tools.push(id);
        }
        self.promote_formats(id, codec);
        id
    }

    pub fn register_format(&mut self, def: FormatDef, tool: ToolId) -> FormatId {
        let id = match self.formats.position(&def.name) {
            Some(existing) => FormatId(existing),
            None => {
                let id = FormatId(self.formats.len());
                let format = Format {
                    id,
                    tokens: SelectorTokens::derive(&def.parm_name),
                    name: def.name,
                    full_name: def.full_name,
                    parm_name: def.parm_name,
                    codec: def.codec,
                    fourcc: def.fourcc,
                    gl: def.gl,
                    features: def.features,
                    block: def.block,
                    force_files: Vec::new(),
                };
                FormatId(self.formats.insert(format).unwrap_or_else(|existing| existing))
            }
        };

        let name = self.formats.get(id.0).map(|f| f.name.clone()).unwrap_or_default();
        let in_tool = self.tools.get(tool.0).is_some_and(|t| {
            t.formats
                .iter()
                .any(|f| self.format(*f).name.eq_ignore_ascii_case(&name))
        });
        if !in_tool && let Some(t) = self.tools.get_mut(tool.0) {
            t.formats.push(id);
        }
        if let Some(owner) = self.tools.get(tool.0).map(|t| t.codec) {
            self.promote_formats(tool, owner);
        }
        id
    }

    pub fn register_container(&mut self, def: ContainerDef) -> ContainerId {
        let id = ContainerId(self.containers.len());
        let container = Container {
            id,
            enable_token: tokens::enable_token(&def.extension.to_lowercase()),
            name: def.name,
            full_name: def.full_name,
            extension: def.extension,
            scan_bytes: def.scan_bytes,
            mip_header_size: def.mip_header_size,
            mip_data_padding: def.mip_data_padding,
            handler: def.handler,
        };
        match self.containers.insert(container) {
            Ok(pos) => {
                let container = &self.containers[pos];
                self.max_scan_bytes = self.max_scan_bytes.max(container.scan_bytes);
                container.handler.init();
                ContainerId(pos)
            }
            Err(existing) => {
                let full_name = self.containers.get(existing).map(|c| c.full_name.clone());
                self.warn(format!(
                    "Texture container '{}' already registered",
                    full_name.unwrap_or_default()
                ));
                ContainerId(existing)
            }
        }
    }

    /// Copy every format reachable through `tool` that belongs to `codec`
    /// into the codec's format list, deduplicated by name.
    fn promote_formats(&mut self, tool: ToolId, codec: CodecId) {
        let Some(tool_formats) = self.tools.get(tool.0).map(|t| t.formats.clone()) else {
            return;
        };
        for fid in tool_formats {
            let format = self.format(fid);
            if format.codec != codec {
                continue;
            }
            let name = format.name.clone();
            let known = self.codecs.get(codec.0).is_some_and(|c| {
                c.formats
                    .iter()
                    .any(|f| self.format(*f).name.eq_ignore_ascii_case(&name))
            });
            if !known && let Some(c) = self.codecs.get_mut(codec.0) {
                c.formats.push(fid);
            }
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Point every registered codec's fallback at `name`.
    pub fn assign_fallback(&mut self, name: &str) -> Result<CodecId, RegistryError> {
        let fallback = self.codec_id(name)?;
        for pos in 0..self.codecs.len() {
            if let Some(c) = self.codecs.get_mut(pos) {
                c.fallback = Some(fallback);
            }
        }
        Ok(fallback)
    }

    /// Attach a list of file masks to the tool or format owning `group`
    /// (`force_<parm>`).
    pub fn set_force_files(&mut self, group: &str, masks: &[String]) -> Result<(), RegistryError> {
        let patterns = masks
            .iter()
            .map(|m| {
                glob::Pattern::new(m).map_err(|e| RegistryError::InvalidMask {
                    mask: m.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pos) = (0..self.tools.len())
            .find(|&i| self.tools.get(i).is_some_and(|t| t.tokens.force_group.eq_ignore_ascii_case(group)))
        {
            if let Some(t) = self.tools.get_mut(pos) {
                t.force_files = patterns;
            }
            return Ok(());
        }
        if let Some(pos) = (0..self.formats.len())
            .find(|&i| self.formats.get(i).is_some_and(|f| f.tokens.force_group.eq_ignore_ascii_case(group)))
        {
            if let Some(f) = self.formats.get_mut(pos) {
                f.force_files = patterns;
            }
            return Ok(());
        }
        Err(RegistryError::UnknownForceGroup(group.to_string()))
    }

    // ---- active chain ------------------------------------------------------

    /// Append a codec to the active chain. Unknown names are fatal; an already
    /// active codec keeps its position.
    pub fn activate(&mut self, name: &str) -> Result<CodecId, RegistryError> {
        let id = self.codec_id(name)?;
        if !self.active.contains(&id) {
            self.active.push(id);
        }
        Ok(id)
    }

    pub fn deactivate(&mut self, id: CodecId) {
        self.active.retain(|c| *c != id);
    }

    pub fn active_codecs(&self) -> impl Iterator<Item = &Codec> {
        self.active.iter().map(|id| self.codec(*id))
    }

    pub fn is_active(&self, id: CodecId) -> bool {
        self.active.contains(&id)
    }

    // ---- lookup ------------------------------------------------------------

    // Ids are only minted by this registry and entries are never removed.
    pub fn codec(&self, id: CodecId) -> &Codec {
        &self.codecs[id.0]
    }

    pub fn tool(&self, id: ToolId) -> &Tool {
        &self.tools[id.0]
    }

    pub fn format(&self, id: FormatId) -> &Format {
        &self.formats[id.0]
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.containers[id.0]
    }

    pub fn find_codec(&self, name: &str) -> Option<&Codec> {
        self.codecs.find(name)
    }

    pub fn find_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.find(name)
    }

    pub fn find_format(&self, name: &str) -> Option<&Format> {
        self.formats.find(name)
    }

    pub fn find_container(&self, name: &str) -> Option<&Container> {
        self.containers.find(name)
    }

    pub fn codec_id(&self, name: &str) -> Result<CodecId, RegistryError> {
        self.codecs
            .position(name)
            .map(CodecId)
            .ok_or_else(|| RegistryError::UnknownCodec(name.to_string()))
    }

    pub fn tool_id(&self, name: &str) -> Result<ToolId, RegistryError> {
        self.tools
            .position(name)
            .map(ToolId)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn format_id(&self, name: &str) -> Result<FormatId, RegistryError> {
        self.formats
            .position(name)
            .map(FormatId)
            .ok_or_else(|| RegistryError::UnknownFormat(name.to_string()))
    }

    pub fn container_id(&self, name: &str) -> Result<ContainerId, RegistryError> {
        self.containers
            .position(name)
            .map(ContainerId)
            .ok_or_else(|| RegistryError::UnknownContainer(name.to_string()))
    }

    pub fn codecs(&self) -> impl Iterator<Item = &Codec> {
        self.codecs.iter()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn formats(&self) -> impl Iterator<Item = &Format> {
        self.formats.iter()
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    /// Prefix length needed to sniff every registered container.
    pub fn max_scan_bytes(&self) -> usize {
        self.max_scan_bytes
    }

    /// Registration conflicts reported so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Formats of `codec`, in promotion order.
    pub fn codec_formats(&self, codec: CodecId) -> impl Iterator<Item = &Format> {
        self.codec(codec).formats.iter().map(|f| self.format(*f))
    }

    /// Run the codec's selection policy over the formats accepted by `enabled`.
    pub fn select_format(
        &self,
        codec: CodecId,
        image: &ImageTraits,
        enabled: impl Fn(&Format) -> bool,
    ) -> Option<&Format> {
        let candidates: Vec<&Format> = self.codec_formats(codec).filter(|f| enabled(f)).collect();
        self.codec(codec).policy.select_format(image, &candidates)
    }

    /// Map a command-line token back to the entity that derived it.
    pub fn match_token(&self, token: &str) -> Option<TokenTarget> {
        for c in self.codecs.iter() {
            if c.tokens.enable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::EnableCodec(c.id));
            }
            if c.tokens.disable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::DisableCodec(c.id));
            }
        }
        for t in self.tools.iter() {
            if t.tokens.enable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::EnableTool(t.id));
            }
            if t.tokens.disable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::DisableTool(t.id));
            }
        }
        for f in self.formats.iter() {
            if f.tokens.enable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::EnableFormat(f.id));
            }
            if f.tokens.disable.eq_ignore_ascii_case(token) {
                return Some(TokenTarget::DisableFormat(f.id));
            }
        }
        self.containers
            .iter()
            .find(|c| c.enable_token.eq_ignore_ascii_case(token))
            .map(|c| TokenTarget::Container(c.id))
    }
}
