//! Parallel conversion of source files.
//!
//! Stage 2 of a run. Every source file is converted once per active codec:
//!
//! ```text
//! source ─ decode ─ prepare (scale, PoT, alpha, mips) ─┬─ DXT:  select format → pick tool → encode → frame → verify → write
//!                                                      └─ ETC1: ...
//! ```
//!
//! ## Format and tool selection
//!
//! 1. A format forced for this codec (token or `force_<format>` mask) wins.
//! 2. Otherwise the codec's policy picks among its enabled formats.
//! 3. If the policy rejects the image, the codec's fallback codec picks
//!    instead. Output still goes to the requesting codec's directory and
//!    statistics.
//!
//! The tool is the first enabled tool of the format's codec that supports the
//! format, preferring tools forced by token, then tools whose force masks
//! match the file.
//!
//! Sources already wrapped in a registered container are resolved and copied
//! unchanged into the directory of the codec owning their format.
//!
//! ## Concurrency
//!
//! Jobs run on a dedicated rayon pool of the requested size. Each worker folds
//! its jobs into a private [`WorkerAccumulator`]; the accumulators are merged
//! on the calling thread after the pool has finished, which is the only place
//! run totals are written. The registry is only read during the parallel
//! phase. Progress goes out as [`JobEvent`]s over an mpsc channel.
//!
//! A failed file is recorded and the worker moves on. Nothing aborts a run
//! once dispatch has begun.

use crate::archive::{ArchiveError, ArchiveSink, entry_name};
use crate::config::ScaleConfig;
use crate::container::{ContainerError, Signature, TextureHeader, assemble};
use crate::encode::{EncodeError, EncodeSettings};
use crate::imaging::{
    AlphaDetection, DecodeError, ImageTraits, PrepareOptions, PreparedImage, load_rgba, prepare,
    rgba_bytes,
};
use crate::layout::{MipChain, compressed_size};
use crate::naming::{SuffixFlags, relative_output};
use crate::registry::{CodecId, ContainerId, Format, FormatId, Registry, TokenTarget, Tool, ToolId};
use crate::resolve::{ResolveError, resolve_texture};
use crate::scan::{SourceFile, SourceKind, matches_any, relative_key};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why one file could not be converted for one codec.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("{tool}: {source}")]
    Encode {
        tool: String,
        #[source]
        source: EncodeError,
    },
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("No enabled {codec} format accepts this image")]
    NoFormat { codec: String },
    #[error("No enabled tool produces {format}")]
    NoTool { format: String },
    #[error("Already compressed as {format}, which {codec} does not use")]
    Incompatible { format: String, codec: String },
    #[error("Output is {actual} bytes, layout expects {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Fatal conditions that stop a run before dispatch or after the join.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("No codec is active")]
    NoActiveCodecs,
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

// ============================================================================
// Options
// ============================================================================

/// Tool and format choices made on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub forced_tools: Vec<ToolId>,
    pub disabled_tools: Vec<ToolId>,
    pub forced_formats: Vec<FormatId>,
    pub disabled_formats: Vec<FormatId>,
}

impl Selection {
    /// Record a tool or format token. Codec and container tokens are not
    /// selections and are ignored.
    pub fn apply(&mut self, target: TokenTarget) {
        match target {
            TokenTarget::EnableTool(id) => push_unique(&mut self.forced_tools, id),
            TokenTarget::DisableTool(id) => push_unique(&mut self.disabled_tools, id),
            TokenTarget::EnableFormat(id) => push_unique(&mut self.forced_formats, id),
            TokenTarget::DisableFormat(id) => push_unique(&mut self.disabled_formats, id),
            TokenTarget::EnableCodec(_)
            | TokenTarget::DisableCodec(_)
            | TokenTarget::Container(_) => {}
        }
    }

    pub fn format_enabled(&self, format: &Format) -> bool {
        !self.disabled_formats.contains(&format.id)
    }

    /// Format of `codec` forced by token or by a force mask matching `key`.
    pub fn forced_format<'r>(
        &self,
        registry: &'r Registry,
        codec: CodecId,
        key: &str,
    ) -> Option<&'r Format> {
        let mut formats = registry.codec_formats(codec).filter(|f| self.format_enabled(f));
        formats.find(|f| self.forced_formats.contains(&f.id) || matches_any(&f.force_files, key))
    }

    /// Tool that will encode `format` for the file `key`.
    pub fn pick_tool<'r>(&self, registry: &'r Registry, format: &Format, key: &str) -> Option<&'r Tool> {
        let candidates: Vec<&Tool> = registry
            .codec(format.codec)
            .tools
            .iter()
            .map(|t| registry.tool(*t))
            .filter(|t| t.supports(format.id) && !self.disabled_tools.contains(&t.id))
            .collect();
        candidates
            .iter()
            .find(|t| self.forced_tools.contains(&t.id))
            .or_else(|| candidates.iter().find(|t| matches_any(&t.force_files, key)))
            .or_else(|| candidates.first())
            .copied()
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Upscaling forced for every file by `--2x` / `--4x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForcedScale {
    #[default]
    None,
    X2,
    X4,
}

/// Per-file image preparation rules.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub power_of_two: bool,
    pub mipmaps: bool,
    pub alpha: AlphaDetection,
    pub scale: ScaleConfig,
    pub forced_scale: ForcedScale,
    pub nomip: Vec<glob::Pattern>,
    pub scale2x: Vec<glob::Pattern>,
    pub scale4x: Vec<glob::Pattern>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            power_of_two: true,
            mipmaps: true,
            alpha: AlphaDetection::default(),
            scale: ScaleConfig::default(),
            forced_scale: ForcedScale::None,
            nomip: Vec::new(),
            scale2x: Vec::new(),
            scale4x: Vec::new(),
        }
    }
}

impl ImageSettings {
    pub fn prepare_options(&self, key: &str) -> PrepareOptions {
        let x4 = self.forced_scale == ForcedScale::X4 || matches_any(&self.scale4x, key);
        let x2 = self.forced_scale == ForcedScale::X2 || matches_any(&self.scale2x, key);
        let scale_passes = if x4 {
            vec![self.scale.first, self.scale.second]
        } else if x2 {
            vec![self.scale.first]
        } else {
            Vec::new()
        };
        PrepareOptions {
            scale_passes,
            power_of_two: self.power_of_two,
            mipmaps: self.mipmaps && !matches_any(&self.nomip, key),
            alpha: self.alpha,
        }
    }
}

/// Where converted files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Files {
        destination: PathBuf,
        /// Insert a `<codec>/` directory below the destination.
        per_codec_dirs: bool,
    },
    /// Collected in memory and appended to the archive after the join.
    Archive { prefix: String },
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub container: ContainerId,
    pub target: OutputTarget,
    pub selection: Selection,
    pub image: ImageSettings,
    pub encode: EncodeSettings,
    pub suffix: SuffixFlags,
    pub signature: Option<Signature>,
}

impl ConvertOptions {
    pub fn new(container: ContainerId, target: OutputTarget) -> Self {
        Self {
            container,
            target,
            selection: Selection::default(),
            image: ImageSettings::default(),
            encode: EncodeSettings::default(),
            suffix: SuffixFlags::default(),
            signature: Some(Signature::texforge()),
        }
    }
}

// ============================================================================
// Statistics and events
// ============================================================================

/// Totals for one codec. All fields are plain sums.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecStats {
    pub textures: u64,
    /// Fallback-codec encodes among `textures`.
    pub fallbacks: u64,
    pub input_disk_bytes: u64,
    /// Decoded RGBA8 size at source dimensions.
    pub input_ram_bytes: u64,
    /// Decoded RGBA8 size after scaling and power-of-two resize.
    pub input_pot_ram_bytes: u64,
    pub output_disk_bytes: u64,
    /// Texture memory of all levels, from the layout calculator.
    pub output_vram_bytes: u64,
}

impl CodecStats {
    pub fn merge(&mut self, other: &CodecStats) {
        self.textures += other.textures;
        self.fallbacks += other.fallbacks;
        self.input_disk_bytes += other.input_disk_bytes;
        self.input_ram_bytes += other.input_ram_bytes;
        self.input_pot_ram_bytes += other.input_pot_ram_bytes;
        self.output_disk_bytes += other.output_disk_bytes;
        self.output_vram_bytes += other.output_vram_bytes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileFailure {
    pub path: String,
    /// `None` when the file failed before any codec ran.
    pub codec: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub exported_files: u64,
    /// Disk size of every dispatched source, counted once per file.
    pub original_bytes: u64,
    /// Files skipped because the cache said they were unchanged.
    pub skipped_files: u64,
    pub codecs: BTreeMap<String, CodecStats>,
    /// Sorted by path, then codec.
    pub failures: Vec<FileFailure>,
    pub archive_bytes: u64,
}

impl RunStats {
    pub fn codec_mut(&mut self, name: &str) -> &mut CodecStats {
        self.codecs.entry(name.to_string()).or_default()
    }

    /// Commutative: merging in any order gives the same totals once
    /// failures are sorted.
    pub fn merge(&mut self, other: &RunStats) {
        self.exported_files += other.exported_files;
        self.original_bytes += other.original_bytes;
        self.skipped_files += other.skipped_files;
        for (name, stats) in &other.codecs {
            self.codec_mut(name).merge(stats);
        }
        self.failures.extend(other.failures.iter().cloned());
        self.failures.sort();
        self.archive_bytes += other.archive_bytes;
    }

    /// Distinct files with at least one failure.
    pub fn failed_files(&self) -> usize {
        let mut paths: Vec<&str> = self.failures.iter().map(|f| f.path.as_str()).collect();
        paths.dedup();
        paths.len()
    }
}

/// Progress notifications, sent while workers run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started {
        index: usize,
        total: usize,
        path: String,
    },
    Converted {
        path: String,
        codec: String,
        format: String,
        tool: String,
        fallback: bool,
        output: String,
    },
    PassedThrough {
        path: String,
        codec: String,
        output: String,
    },
    Failed(FileFailure),
}

/// Private per-worker state folded over that worker's jobs.
#[derive(Debug, Default)]
pub struct WorkerAccumulator {
    pub stats: RunStats,
    /// Indices of jobs that succeeded for every active codec.
    pub succeeded: Vec<usize>,
    /// Archive entries awaiting the join.
    pub entries: Vec<(String, Vec<u8>)>,
}

impl WorkerAccumulator {
    pub fn merge(&mut self, other: WorkerAccumulator) {
        self.stats.merge(&other.stats);
        self.succeeded.extend(other.succeeded);
        self.succeeded.sort_unstable();
        self.entries.extend(other.entries);
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RunStats,
    pub succeeded: Vec<usize>,
    pub elapsed: Duration,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler<'r> {
    registry: &'r Registry,
    options: ConvertOptions,
}

/// One encoded texture ready to be delivered.
struct Encoded<'r> {
    format: &'r Format,
    tool: &'r Tool,
    fallback: bool,
    bytes: Vec<u8>,
    vram: u64,
}

impl<'r> Scheduler<'r> {
    pub fn new(registry: &'r Registry, options: ConvertOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `jobs` on `threads` workers.
    ///
    /// In archive mode the collected entries are appended to `archive`, sorted
    /// by name, after every worker has finished.
    pub fn run(
        &self,
        jobs: &[SourceFile],
        threads: usize,
        archive: Option<&mut ArchiveSink>,
        progress: Option<Sender<JobEvent>>,
    ) -> Result<RunOutcome, RunError> {
        if self.registry.active_codecs().next().is_none() {
            return Err(RunError::NoActiveCodecs);
        }
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()?;
        let total = jobs.len();
        let progress = progress.as_ref();

        let partials: Vec<WorkerAccumulator> = pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .fold(WorkerAccumulator::default, |mut acc, (index, job)| {
                    self.process(index, total, job, &mut acc, progress);
                    acc
                })
                .collect()
        });

        let mut merged = WorkerAccumulator::default();
        for partial in partials {
            merged.merge(partial);
        }
        tracing::debug!(
            jobs = total,
            failed = merged.stats.failures.len(),
            "workers joined"
        );

        if let Some(sink) = archive {
            for (name, bytes) in &merged.entries {
                sink.add(name, bytes)?;
            }
        }

        Ok(RunOutcome {
            stats: merged.stats,
            succeeded: merged.succeeded,
            elapsed: start.elapsed(),
        })
    }

    fn process(
        &self,
        index: usize,
        total: usize,
        job: &SourceFile,
        acc: &mut WorkerAccumulator,
        progress: Option<&Sender<JobEvent>>,
    ) {
        let key = relative_key(&job.relative);
        send(
            progress,
            JobEvent::Started {
                index,
                total,
                path: key.clone(),
            },
        );
        acc.stats.original_bytes += job.size;

        let ok = match job.kind {
            SourceKind::Image => self.convert_image(job, &key, acc, progress),
            SourceKind::Texture => self.pass_through(job, &key, acc, progress),
        };
        if ok {
            acc.succeeded.push(index);
        }
    }

    fn convert_image(
        &self,
        job: &SourceFile,
        key: &str,
        acc: &mut WorkerAccumulator,
        progress: Option<&Sender<JobEvent>>,
    ) -> bool {
        let image = match load_rgba(&job.path) {
            Ok(image) => image,
            Err(e) => {
                fail(acc, progress, key, None, &ConvertError::from(e));
                return false;
            }
        };
        let (source_w, source_h) = image.dimensions();
        let prepared = prepare(image, &self.options.image.prepare_options(key));
        let (base_w, base_h) = prepared.base().dimensions();

        let mut all_ok = true;
        for codec in self.registry.active_codecs() {
            let result = self
                .encode_for(codec.id, &prepared, key)
                .and_then(|mut encoded| {
                    let relative = relative_output(
                        &job.relative,
                        &self.options.suffix.compose(
                            &encoded.tool.tokens.suffix,
                            &encoded.format.tokens.suffix,
                            self.options.encode.profile,
                        ),
                        &self.registry.container(self.options.container).extension,
                    );
                    let bytes = std::mem::take(&mut encoded.bytes);
                    let len = bytes.len() as u64;
                    let output = self.deliver(&codec.name, &relative, bytes, acc)?;
                    Ok((encoded, len, output))
                });
            match result {
                Ok((encoded, len, output)) => {
                    let s = acc.stats.codec_mut(&codec.name);
                    s.textures += 1;
                    s.fallbacks += u64::from(encoded.fallback);
                    s.input_disk_bytes += job.size;
                    s.input_ram_bytes += rgba_bytes(source_w, source_h);
                    s.input_pot_ram_bytes += rgba_bytes(base_w, base_h);
                    s.output_disk_bytes += len;
                    s.output_vram_bytes += encoded.vram;
                    acc.stats.exported_files += 1;
                    send(
                        progress,
                        JobEvent::Converted {
                            path: key.to_string(),
                            codec: codec.name.clone(),
                            format: encoded.format.name.clone(),
                            tool: encoded.tool.name.clone(),
                            fallback: encoded.fallback,
                            output,
                        },
                    );
                }
                Err(e) => {
                    fail(acc, progress, key, Some(codec.name.as_str()), &e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    /// Choose format and tool, encode every level, frame and verify.
    fn encode_for(
        &self,
        codec: CodecId,
        prepared: &PreparedImage,
        key: &str,
    ) -> Result<Encoded<'r>, ConvertError> {
        let registry = self.registry;
        let selection = &self.options.selection;
        let (format, fallback) = self.select_format(codec, &prepared.traits, key)?;
        let tool = selection
            .pick_tool(registry, format, key)
            .ok_or_else(|| ConvertError::NoTool {
                format: format.name.clone(),
            })?;

        let levels = prepared
            .levels
            .iter()
            .map(|level| tool.encoder().encode(level, format, &self.options.encode))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ConvertError::Encode {
                tool: tool.name.clone(),
                source,
            })?;

        let container = registry.container(self.options.container);
        let (width, height) = prepared.base().dimensions();
        let header = TextureHeader {
            format,
            width,
            height,
            levels: levels.len() as u32,
            signature: self.options.signature,
        };
        let bytes = assemble(container, &header, &levels)?;

        let chain = MipChain::from_levels(prepared.dimensions())
            .unwrap_or_else(|| MipChain::base_only(width, height));
        let vram = compressed_size(&chain, format, container, true, true);
        let expected = container.handler().header_len() as u64 + vram;
        if bytes.len() as u64 != expected {
            return Err(ConvertError::SizeMismatch {
                expected,
                actual: bytes.len() as u64,
            });
        }

        Ok(Encoded {
            format,
            tool,
            fallback,
            bytes,
            vram,
        })
    }

    fn select_format(
        &self,
        codec: CodecId,
        traits: &ImageTraits,
        key: &str,
    ) -> Result<(&'r Format, bool), ConvertError> {
        let registry = self.registry;
        let selection = &self.options.selection;
        if let Some(format) = selection.forced_format(registry, codec, key) {
            return Ok((format, false));
        }
        if let Some(format) = registry.select_format(codec, traits, |f| selection.format_enabled(f)) {
            return Ok((format, false));
        }
        if let Some(fallback) = registry.codec(codec).fallback
            && fallback != codec
            && let Some(format) =
                registry.select_format(fallback, traits, |f| selection.format_enabled(f))
        {
            return Ok((format, true));
        }
        Err(ConvertError::NoFormat {
            codec: registry.codec(codec).name.clone(),
        })
    }

    /// Copy an already-compressed texture into the directory of the codec
    /// that owns its format.
    fn pass_through(
        &self,
        job: &SourceFile,
        key: &str,
        acc: &mut WorkerAccumulator,
        progress: Option<&Sender<JobEvent>>,
    ) -> bool {
        let resolved = std::fs::read(&job.path)
            .map_err(ConvertError::from)
            .and_then(|bytes| {
                let r = resolve_texture(self.registry, &job.path, &bytes)?;
                let d = r.descriptor;
                let chain = MipChain::with_levels(d.width, d.height, d.levels);
                let vram = compressed_size(&chain, r.format, r.container, true, true);
                let header = r.container.handler().stored_header_len(&bytes)? as u64;
                let expected = header.saturating_add(vram);
                if bytes.len() as u64 != expected {
                    return Err(ConvertError::SizeMismatch {
                        expected,
                        actual: bytes.len() as u64,
                    });
                }
                Ok((r.format, d, vram, bytes))
            });
        let (format, descriptor, vram, bytes) = match resolved {
            Ok(r) => r,
            Err(e) => {
                fail(acc, progress, key, None, &e);
                return false;
            }
        };

        let (w, h) = (descriptor.width, descriptor.height);

        let mut all_ok = true;
        for codec in self.registry.active_codecs() {
            if format.codec != codec.id {
                let e = ConvertError::Incompatible {
                    format: format.name.clone(),
                    codec: codec.name.clone(),
                };
                fail(acc, progress, key, Some(codec.name.as_str()), &e);
                all_ok = false;
                continue;
            }
            match self.deliver(&codec.name, &job.relative, bytes.clone(), acc) {
                Ok(output) => {
                    let s = acc.stats.codec_mut(&codec.name);
                    s.textures += 1;
                    s.input_disk_bytes += job.size;
                    s.input_ram_bytes += rgba_bytes(w, h);
                    s.input_pot_ram_bytes += rgba_bytes(w, h);
                    s.output_disk_bytes += job.size;
                    s.output_vram_bytes += vram;
                    acc.stats.exported_files += 1;
                    send(
                        progress,
                        JobEvent::PassedThrough {
                            path: key.to_string(),
                            codec: codec.name.clone(),
                            output,
                        },
                    );
                }
                Err(e) => {
                    fail(acc, progress, key, Some(codec.name.as_str()), &e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    /// Write a file, or queue an archive entry. Returns where it went.
    fn deliver(
        &self,
        codec: &str,
        relative: &Path,
        bytes: Vec<u8>,
        acc: &mut WorkerAccumulator,
    ) -> Result<String, ConvertError> {
        match &self.options.target {
            OutputTarget::Files {
                destination,
                per_codec_dirs,
            } => {
                let mut path = destination.clone();
                if *per_codec_dirs {
                    path.push(codec);
                }
                path.push(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, &bytes)?;
                Ok(path.display().to_string())
            }
            OutputTarget::Archive { prefix } => {
                let name = entry_name(prefix, codec, relative);
                acc.entries.push((name.clone(), bytes));
                Ok(name)
            }
        }
    }
}

fn send(progress: Option<&Sender<JobEvent>>, event: JobEvent) {
    if let Some(tx) = progress {
        // A closed channel only means nobody is listening.
        let _ = tx.send(event);
    }
}

fn fail(
    acc: &mut WorkerAccumulator,
    progress: Option<&Sender<JobEvent>>,
    path: &str,
    codec: Option<&str>,
    error: &ConvertError,
) {
    tracing::warn!(path, codec, error = %error, "conversion failed");
    let failure = FileFailure {
        path: path.to_string(),
        codec: codec.map(str::to_string),
        reason: error.to_string(),
    };
    acc.stats.failures.push(failure.clone());
    send(progress, JobEvent::Failed(failure));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::scan::{InputPlan, enumerate, plan_input};
    use crate::test_helpers::{MockEncoder, mock_registry, setup_fixtures, write_png_with, write_test_png};
    use image::Rgba;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn files_target(dest: &Path) -> OutputTarget {
        OutputTarget::Files {
            destination: dest.to_path_buf(),
            per_codec_dirs: true,
        }
    }

    fn jobs_in(dir: &Path, registry: &Registry) -> Vec<SourceFile> {
        let plan: InputPlan = plan_input(&[dir.to_path_buf()], None, false, "id1", dir).unwrap();
        enumerate(&plan, &[], registry).unwrap()
    }

    fn options(registry: &Registry, target: OutputTarget) -> ConvertOptions {
        ConvertOptions::new(registry.container_id("DDS").unwrap(), target)
    }

    // =========================================================================
    // Selection
    // =========================================================================

    #[test]
    fn tool_tokens_are_recorded_once() {
        let reg = builtin::registry().unwrap();
        let nvtt = reg.tool_id("nvtt").unwrap();
        let mut s = Selection::default();
        s.apply(TokenTarget::EnableTool(nvtt));
        s.apply(TokenTarget::EnableTool(nvtt));
        s.apply(TokenTarget::EnableCodec(reg.codec_id("DXT").unwrap()));
        assert_eq!(s.forced_tools, vec![nvtt]);
        assert!(s.forced_formats.is_empty());
    }

    #[test]
    fn default_tool_is_first_registered() {
        let reg = builtin::registry().unwrap();
        let dxt1 = reg.find_format("DXT1").unwrap();
        let s = Selection::default();
        assert_eq!(s.pick_tool(&reg, dxt1, "a.png").unwrap().name, "ispc");
        // only nvtt produces DXT1A
        let dxt1a = reg.find_format("DXT1A").unwrap();
        assert_eq!(s.pick_tool(&reg, dxt1a, "a.png").unwrap().name, "nvtt");
    }

    #[test]
    fn forced_and_disabled_tools() {
        let reg = builtin::registry().unwrap();
        let dxt1 = reg.find_format("DXT1").unwrap();
        let mut s = Selection::default();
        s.apply(TokenTarget::EnableTool(reg.tool_id("nvtt").unwrap()));
        assert_eq!(s.pick_tool(&reg, dxt1, "a.png").unwrap().name, "nvtt");

        let mut s = Selection::default();
        s.apply(TokenTarget::DisableTool(reg.tool_id("ispc").unwrap()));
        assert_eq!(s.pick_tool(&reg, dxt1, "a.png").unwrap().name, "nvtt");
        s.apply(TokenTarget::DisableTool(reg.tool_id("nvtt").unwrap()));
        assert!(s.pick_tool(&reg, dxt1, "a.png").is_none());
    }

    #[test]
    fn force_masks_pick_tool_per_file() {
        let mut reg = builtin::registry().unwrap();
        reg.set_force_files("force_nvtt", &["gfx/*".to_string()]).unwrap();
        let dxt1 = reg.find_format("DXT1").unwrap();
        let s = Selection::default();
        assert_eq!(s.pick_tool(&reg, dxt1, "gfx/menu/title.png").unwrap().name, "nvtt");
        assert_eq!(s.pick_tool(&reg, dxt1, "textures/wall.png").unwrap().name, "ispc");
    }

    #[test]
    fn forced_format_stays_within_codec() {
        let reg = builtin::registry().unwrap();
        let mut s = Selection::default();
        s.apply(TokenTarget::EnableFormat(reg.format_id("DXT3").unwrap()));
        let dxt = reg.codec_id("DXT").unwrap();
        let etc1 = reg.codec_id("ETC1").unwrap();
        assert_eq!(s.forced_format(&reg, dxt, "a.png").unwrap().name, "DXT3");
        assert!(s.forced_format(&reg, etc1, "a.png").is_none());
    }

    #[test]
    fn prepare_options_follow_masks() {
        let settings = ImageSettings {
            nomip: vec![glob::Pattern::new("gfx/*").unwrap()],
            scale4x: vec![glob::Pattern::new("*.tga").unwrap()],
            ..ImageSettings::default()
        };
        let gfx = settings.prepare_options("gfx/title.png");
        assert!(!gfx.mipmaps);
        assert!(gfx.scale_passes.is_empty());
        let tga = settings.prepare_options("textures/wall.tga");
        assert!(tga.mipmaps);
        assert_eq!(tga.scale_passes.len(), 2);

        let forced = ImageSettings {
            forced_scale: ForcedScale::X2,
            ..ImageSettings::default()
        };
        assert_eq!(forced.prepare_options("a.png").scale_passes.len(), 1);
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    #[test]
    fn stats_merge_is_order_independent() {
        let mut a = RunStats::default();
        a.exported_files = 2;
        a.codec_mut("DXT").textures = 2;
        a.failures.push(FileFailure {
            path: "z.png".into(),
            codec: None,
            reason: "bad".into(),
        });
        let mut b = RunStats::default();
        b.exported_files = 1;
        b.codec_mut("DXT").output_disk_bytes = 10;
        b.codec_mut("ETC1").textures = 1;
        b.failures.push(FileFailure {
            path: "a.png".into(),
            codec: Some("DXT".into()),
            reason: "bad".into(),
        });

        let mut ab = RunStats::default();
        ab.merge(&a);
        ab.merge(&b);
        let mut ba = RunStats::default();
        ba.merge(&b);
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.exported_files, 3);
        assert_eq!(ab.codecs["DXT"].textures, 2);
        assert_eq!(ab.failures[0].path, "a.png");
        assert_eq!(ab.failed_files(), 2);
    }

    // =========================================================================
    // Runs
    // =========================================================================

    #[test]
    fn converts_every_file_for_each_codec() {
        let tmp = setup_fixtures();
        let (mut reg, calls) = mock_registry(MockEncoder::default());
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let scheduler = Scheduler::new(&reg, options(&reg, files_target(tmp.path())));
        let outcome = scheduler.run(&jobs, 2, None, None).unwrap();

        assert!(outcome.stats.failures.is_empty(), "{:?}", outcome.stats.failures);
        assert_eq!(outcome.stats.exported_files, 3);
        assert_eq!(outcome.succeeded, vec![0, 1, 2]);
        let mock = &outcome.stats.codecs["MOCK"];
        assert_eq!(mock.textures, 3);
        // glass.png has alpha: the mock policy rejects it, BGRA takes over
        assert_eq!(mock.fallbacks, 1);
        assert!(tmp.path().join("MOCK/textures/wall.dds").is_file());
        assert!(tmp.path().join("MOCK/textures/glass.dds").is_file());
        assert!(tmp.path().join("MOCK/gfx/menu/title.dds").is_file());
        // 8×8 → 4 levels for wall; glass went through the raw encoder
        assert_eq!(
            calls.lock().unwrap().iter().filter(|c| c.2 == "M32").count(),
            4 + 4
        );
    }

    #[test]
    fn output_size_matches_layout() {
        let tmp = setup_fixtures();
        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let scheduler = Scheduler::new(&reg, options(&reg, files_target(tmp.path())));
        let outcome = scheduler.run(&jobs, 1, None, None).unwrap();
        let wall = std::fs::metadata(tmp.path().join("MOCK/textures/wall.dds")).unwrap();
        // 8×8 + 4×4 + 2×2 + 1×1 pixels at 4 bytes, plus the 128-byte DDS header
        assert_eq!(wall.len(), 128 + (64 + 16 + 4 + 1) * 4);
        let mock = &outcome.stats.codecs["MOCK"];
        assert_eq!(mock.output_disk_bytes, mock.output_vram_bytes + 3 * 128);
    }

    #[test]
    fn one_worker_and_many_workers_agree() {
        let tmp = TempDir::new().unwrap();
        for i in 0..12u32 {
            write_test_png(&tmp.path().join(format!("set/t{i:02}.png")), 4 + i, 4, 255);
        }
        write_test_png(&tmp.path().join("set/alpha.png"), 8, 8, 10);
        std::fs::write(tmp.path().join("set/broken.png"), b"not a png").unwrap();

        let run = |threads: usize, out: &Path| {
            let (mut reg, _) = mock_registry(MockEncoder::default());
            reg.activate("MOCK").unwrap();
            reg.activate("BGRA").unwrap();
            let jobs = jobs_in(&tmp.path().join("set"), &reg);
            let target = OutputTarget::Files {
                destination: out.to_path_buf(),
                per_codec_dirs: true,
            };
            Scheduler::new(&reg, options(&reg, target))
                .run(&jobs, threads, None, None)
                .unwrap()
        };
        let one = run(1, &tmp.path().join("out1"));
        let many = run(4, &tmp.path().join("out4"));
        assert_eq!(one.stats, many.stats);
        assert_eq!(one.succeeded, many.succeeded);
        assert_eq!(one.stats.failed_files(), 1);
        assert_eq!(one.stats.exported_files, 13 * 2);
    }

    #[test]
    fn encoder_failure_is_per_file() {
        let tmp = TempDir::new().unwrap();
        write_png_with(&tmp.path().join("red.png"), 4, 4, |_, _| Rgba([200, 0, 0, 255]));
        write_png_with(&tmp.path().join("blue.png"), 4, 4, |_, _| Rgba([0, 0, 200, 255]));
        let (mut reg, _) = mock_registry(MockEncoder::failing_on_red(200));
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let (tx, rx) = mpsc::channel();
        let scheduler = Scheduler::new(&reg, options(&reg, files_target(tmp.path())));
        let outcome = scheduler.run(&jobs, 2, None, Some(tx)).unwrap();

        assert_eq!(outcome.stats.exported_files, 1);
        assert_eq!(outcome.stats.failures.len(), 1);
        assert_eq!(outcome.stats.failures[0].path, "red.png");
        assert_eq!(outcome.stats.failures[0].codec.as_deref(), Some("MOCK"));
        assert_eq!(outcome.succeeded, vec![0]);

        let events: Vec<JobEvent> = rx.iter().collect();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, JobEvent::Started { .. }))
                .count(),
            2
        );
        assert!(events.iter().any(|e| matches!(e, JobEvent::Failed(f) if f.path == "red.png")));
    }

    #[test]
    fn archive_entries_are_added_after_join() {
        let tmp = setup_fixtures();
        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let archive_path = tmp.path().join("out.pk3");
        let mut sink =
            ArchiveSink::create(&archive_path, crate::archive::ArchiveStrategy::Memory).unwrap();
        let target = OutputTarget::Archive {
            prefix: "textures/".into(),
        };
        let scheduler = Scheduler::new(&reg, options(&reg, target));
        let outcome = scheduler.run(&jobs, 3, Some(&mut sink), None).unwrap();
        assert_eq!(sink.len(), 3);
        assert_eq!(outcome.stats.codecs["MOCK"].textures, 3);

        sink.finish().unwrap();
        let archive = zip::ZipArchive::new(std::fs::File::open(&archive_path).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "textures/MOCK/gfx/menu/title.dds",
                "textures/MOCK/textures/glass.dds",
                "textures/MOCK/textures/wall.dds"
            ]
        );
        assert!(!tmp.path().join("MOCK").exists());
    }

    #[test]
    fn suffix_flags_shape_file_names() {
        let tmp = TempDir::new().unwrap();
        write_test_png(&tmp.path().join("wall.png"), 4, 4, 255);
        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let mut opts = options(&reg, files_target(tmp.path()));
        opts.suffix = SuffixFlags::parse("tf").unwrap();
        Scheduler::new(&reg, opts).run(&jobs, 1, None, None).unwrap();
        assert!(tmp.path().join("MOCK/wall_mocktool_m32.dds").is_file());
    }

    #[test]
    fn textures_pass_through_to_owning_codec() {
        let tmp = TempDir::new().unwrap();
        let reg0 = builtin::registry().unwrap();
        let bgra = reg0.find_format("BGRA").unwrap();
        let header = TextureHeader {
            format: bgra,
            width: 2,
            height: 2,
            levels: 1,
            signature: None,
        };
        let bytes = assemble(reg0.find_container("DDS").unwrap(), &header, &[vec![0u8; 16]]).unwrap();
        std::fs::write(tmp.path().join("sky.dds"), &bytes).unwrap();

        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("BGRA").unwrap();
        reg.activate("MOCK").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let outcome = Scheduler::new(&reg, options(&reg, files_target(tmp.path())))
            .run(&jobs, 1, None, None)
            .unwrap();

        assert_eq!(
            std::fs::read(tmp.path().join("BGRA/sky.dds")).unwrap(),
            bytes
        );
        assert_eq!(outcome.stats.codecs["BGRA"].output_vram_bytes, 16);
        assert_eq!(outcome.stats.failures.len(), 1);
        assert_eq!(outcome.stats.failures[0].codec.as_deref(), Some("MOCK"));
    }

    fn write_bgra_dds(path: &Path, width: u32, height: u32, payload: usize) -> Vec<u8> {
        let reg = builtin::registry().unwrap();
        let header = TextureHeader {
            format: reg.find_format("BGRA").unwrap(),
            width,
            height,
            levels: 1,
            signature: None,
        };
        let bytes =
            assemble(reg.find_container("DDS").unwrap(), &header, &[vec![0u8; payload]]).unwrap();
        std::fs::write(path, &bytes).unwrap();
        bytes
    }

    #[test]
    fn absurd_texture_header_fails_only_that_file() {
        let tmp = TempDir::new().unwrap();
        let mut huge = write_bgra_dds(&tmp.path().join("huge.dds"), 4, 4, 64);
        // DDS height at 12, width at 16
        crate::container::put_u32_le(&mut huge, 12, u32::MAX);
        crate::container::put_u32_le(&mut huge, 16, u32::MAX);
        std::fs::write(tmp.path().join("huge.dds"), &huge).unwrap();
        write_bgra_dds(&tmp.path().join("ok.dds"), 2, 2, 16);

        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("BGRA").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let outcome = Scheduler::new(&reg, options(&reg, files_target(tmp.path())))
            .run(&jobs, 2, None, None)
            .unwrap();

        assert!(tmp.path().join("BGRA/ok.dds").exists());
        assert_eq!(outcome.stats.codecs["BGRA"].textures, 1);
        assert_eq!(outcome.stats.failures.len(), 1);
        assert_eq!(outcome.stats.failures[0].path, "huge.dds");
    }

    #[test]
    fn truncated_texture_is_not_copied() {
        let tmp = TempDir::new().unwrap();
        // 64×64 BGRA needs 16 KiB of payload
        write_bgra_dds(&tmp.path().join("short.dds"), 64, 64, 16);

        let (mut reg, _) = mock_registry(MockEncoder::default());
        reg.activate("BGRA").unwrap();
        let jobs = jobs_in(tmp.path(), &reg);
        let outcome = Scheduler::new(&reg, options(&reg, files_target(tmp.path())))
            .run(&jobs, 1, None, None)
            .unwrap();

        assert!(!tmp.path().join("BGRA/short.dds").exists());
        assert!(!outcome.stats.codecs.contains_key("BGRA"));
        assert_eq!(outcome.stats.failures.len(), 1);
        assert!(outcome.stats.failures[0].reason.contains("layout expects 16512"));
    }

    #[test]
    fn no_active_codec_is_fatal() {
        let (reg, _) = mock_registry(MockEncoder::default());
        let scheduler = Scheduler::new(&reg, options(&reg, files_target(Path::new("."))));
        assert!(matches!(
            scheduler.run(&[], 1, None, None),
            Err(RunError::NoActiveCodecs)
        ));
    }
}
