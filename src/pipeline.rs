//! A complete conversion run.
//!
//! ```text
//! configure_registry   tokens + config  → active codecs, container, selection
//! run
//!   1. enumerate       InputPlan        → source files
//!   2. cache filter    checksums        → pending jobs       (files only)
//!   3. archive sink    total input size → memory / disk      (archives only)
//!   4. schedule        pending jobs     → RunStats
//!   5. cache save / archive finish
//! ```
//!
//! The cache and the archive sink are only touched before dispatch and after
//! the join. An archive destination always turns the cache off: the archive
//! is rebuilt from scratch every run, so skipped files would be missing from it.

use crate::archive::{ArchiveError, ArchiveSink, ArchiveStrategy, is_archive_destination};
use crate::cache::{FileCache, cache_path_for, hash_file, hash_settings};
use crate::config::{TexConfig, effective_threads, patterns};
use crate::container::Signature;
use crate::encode::EncodeSettings;
use crate::registry::{ContainerId, Registry, RegistryError, TokenTarget};
use crate::scan::{InputPlan, ScanError, SourceFile, enumerate, relative_key};
use crate::scheduler::{
    ConvertOptions, ForcedScale, ImageSettings, JobEvent, OutputTarget, RunError, RunStats,
    Scheduler, Selection,
};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Registry state chosen for this run.
#[derive(Debug, Clone)]
pub struct Activation {
    pub container: ContainerId,
    pub selection: Selection,
}

/// Apply force masks, codec activation and registry tokens.
///
/// Codec enable tokens activate codecs in the order given; without any, the
/// configured `default_codecs` are activated. Disable tokens are applied
/// last, so `-disable#dxt` also removes a default codec. A container token
/// overrides the configured container.
pub fn configure_registry(
    registry: &mut Registry,
    config: &TexConfig,
    tokens: &[TokenTarget],
) -> Result<Activation, RegistryError> {
    for (group, masks) in &config.force {
        registry.set_force_files(group, masks)?;
    }

    let enabled: Vec<String> = tokens
        .iter()
        .filter_map(|t| match t {
            TokenTarget::EnableCodec(id) => Some(registry.codec(*id).name.clone()),
            _ => None,
        })
        .collect();
    let names = if enabled.is_empty() {
        &config.default_codecs
    } else {
        &enabled
    };
    for name in names {
        registry.activate(name)?;
    }

    let mut container = None;
    let mut selection = Selection::default();
    for token in tokens {
        match *token {
            TokenTarget::DisableCodec(id) => registry.deactivate(id),
            TokenTarget::Container(id) => container = Some(id),
            TokenTarget::EnableCodec(_) => {}
            other => selection.apply(other),
        }
    }
    let container = match container {
        Some(id) => id,
        None => registry.container_id(&config.container)?,
    };
    Ok(Activation {
        container,
        selection,
    })
}

/// Everything [`run`] needs besides the registry.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub plan: InputPlan,
    pub config: TexConfig,
    pub activation: Activation,
    pub forced_scale: ForcedScale,
    /// `false` when the cache was turned off on the command line.
    pub use_cache: bool,
}

impl RunRequest {
    pub fn is_archive(&self) -> bool {
        is_archive_destination(
            &self.plan.destination,
            &patterns(&self.config.archive.extensions),
        )
    }

    /// Conversion options for the scheduler.
    pub fn convert_options(&self) -> ConvertOptions {
        let config = &self.config;
        let target = if self.is_archive() {
            OutputTarget::Archive {
                prefix: config.archive.path.clone(),
            }
        } else {
            OutputTarget::Files {
                destination: self.plan.destination.clone(),
                per_codec_dirs: self.plan.per_codec_dirs,
            }
        };
        let signature = match (config.output.sign, config.output.gimp_signature) {
            (false, _) => None,
            (true, true) => Some(Signature::GIMP),
            (true, false) => Some(Signature::texforge()),
        };
        ConvertOptions {
            container: self.activation.container,
            target,
            selection: self.activation.selection.clone(),
            image: ImageSettings {
                power_of_two: config.output.power_of_two,
                mipmaps: config.output.mipmaps,
                alpha: config.alpha,
                scale: config.scale,
                forced_scale: self.forced_scale,
                nomip: patterns(&config.files.nomip),
                scale2x: patterns(&config.files.scale2x),
                scale4x: patterns(&config.files.scale4x),
            },
            encode: EncodeSettings {
                profile: config.output.profile,
                metric: config.output.error_metric,
            },
            suffix: config.output.suffix,
            signature,
        }
    }

    /// Hash of every setting that changes the bytes written. A cache written
    /// under different settings is discarded.
    pub fn settings_hash(&self, registry: &Registry) -> String {
        let options = self.convert_options();
        let mut parts: Vec<String> = registry
            .active_codecs()
            .map(|c| format!("codec={}", c.name))
            .collect();
        parts.push(format!(
            "container={}",
            registry.container(options.container).name
        ));
        let selection = &options.selection;
        for (label, ids) in [
            ("force_tool", &selection.forced_tools),
            ("disable_tool", &selection.disabled_tools),
        ] {
            parts.extend(ids.iter().map(|id| format!("{label}={}", registry.tool(*id).name)));
        }
        for (label, ids) in [
            ("force_format", &selection.forced_formats),
            ("disable_format", &selection.disabled_formats),
        ] {
            parts.extend(ids.iter().map(|id| format!("{label}={}", registry.format(*id).name)));
        }
        parts.push(format!("files={:?}", self.config.files));
        parts.push(format!("force={:?}", self.config.force));
        parts.push(format!("scale={:?}/{:?}", options.image.scale, self.forced_scale));
        parts.push(format!("alpha={:?}", options.image.alpha));
        parts.push(format!("output={:?}", self.config.output));
        hash_settings(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub strategy: ArchiveStrategy,
    pub entries: usize,
}

/// What a finished run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub stats: RunStats,
    /// Files found by enumeration, before the cache filter.
    pub discovered: usize,
    pub elapsed: Duration,
    /// Policy decisions worth telling the user about.
    pub notices: Vec<String>,
    pub archive: Option<ArchiveSummary>,
    pub cache_file: Option<PathBuf>,
}

impl RunReport {
    /// Every dispatched file failed. Nothing dispatched is not a failure.
    pub fn all_failed(&self) -> bool {
        let dispatched = self.discovered as u64 - self.stats.skipped_files;
        dispatched > 0 && self.stats.failed_files() as u64 == dispatched
    }
}

/// Run the whole pipeline against an already configured registry.
pub fn run(
    registry: &Registry,
    request: &RunRequest,
    progress: Option<Sender<JobEvent>>,
) -> Result<RunReport, PipelineError> {
    let start = Instant::now();
    let mut report = RunReport::default();
    let config = &request.config;
    let plan = &request.plan;

    let sources = enumerate(plan, &patterns(&config.files.include), registry)?;
    report.discovered = sources.len();
    tracing::info!(files = sources.len(), source = %plan.source_dir.display(), "enumerated");

    let archive = request.is_archive();
    let mut use_cache = request.use_cache && plan.allow_cache;
    if archive && use_cache {
        use_cache = false;
        report
            .notices
            .push("Cache disabled: the destination is an archive".to_string());
    }

    let mut cache = None;
    let mut pending: Vec<(SourceFile, Option<String>)> = Vec::with_capacity(sources.len());
    if use_cache {
        let path = cache_path_for(&plan.destination);
        let loaded = FileCache::load(&path, &request.settings_hash(registry));
        for source in sources {
            let checksum = match hash_file(&source.path) {
                Ok(sum) => Some(sum),
                Err(e) => {
                    tracing::debug!(path = %source.path.display(), error = %e, "checksum failed");
                    None
                }
            };
            let key = relative_key(&source.relative);
            if let Some(sum) = &checksum
                && loaded.should_skip(&key, sum)
            {
                report.stats.skipped_files += 1;
                continue;
            }
            pending.push((source, checksum));
        }
        report.cache_file = Some(path.clone());
        cache = Some((path, loaded));
    } else {
        pending.extend(sources.into_iter().map(|s| (s, None)));
    }

    if pending.is_empty() {
        report.elapsed = start.elapsed();
        return Ok(report);
    }

    let jobs: Vec<SourceFile> = pending.iter().map(|(s, _)| s.clone()).collect();
    let mut sink = if archive {
        let total: u64 = jobs.iter().map(|j| j.size).sum();
        let strategy = ArchiveStrategy::choose(config.archive.zip_in_memory, total);
        tracing::info!(strategy = strategy.name(), total, "archive output");
        Some(ArchiveSink::create(&plan.destination, strategy)?)
    } else {
        None
    };

    let scheduler = Scheduler::new(registry, request.convert_options());
    let threads = effective_threads(&config.processing);
    let outcome = scheduler.run(&jobs, threads, sink.as_mut(), progress)?;
    let skipped = report.stats.skipped_files;
    report.stats = outcome.stats;
    report.stats.skipped_files = skipped;

    if let Some((path, mut cache)) = cache {
        for (index, (source, checksum)) in pending.into_iter().enumerate() {
            let key = relative_key(&source.relative);
            match checksum {
                Some(sum) if outcome.succeeded.binary_search(&index).is_ok() => {
                    cache.record(key, sum)
                }
                _ => cache.remove(&key),
            }
        }
        if let Err(e) = cache.save(&path) {
            tracing::warn!(path = %path.display(), error = %e, "could not write cache");
        }
    }

    if let Some(sink) = sink {
        let strategy = sink.strategy();
        let entries = sink.len();
        report.stats.archive_bytes = sink.finish()?;
        report.archive = Some(ArchiveSummary {
            path: plan.destination.clone(),
            strategy,
            entries,
        });
    }

    report.elapsed = start.elapsed();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::scan::plan_input;
    use crate::test_helpers::{MockEncoder, mock_registry, setup_fixtures, write_test_png};
    use std::path::Path;
    use tempfile::TempDir;

    fn tokens(registry: &Registry, list: &[&str]) -> Vec<TokenTarget> {
        list.iter().map(|t| registry.match_token(t).unwrap()).collect()
    }

    /// Output goes to `<out>/dest` so the cache sidecar stays inside `out`.
    fn request(registry: &mut Registry, dir: &Path, output: Option<&Path>, list: &[&str]) -> RunRequest {
        let config = TexConfig::default();
        let targets = tokens(registry, list);
        let activation = configure_registry(registry, &config, &targets).unwrap();
        RunRequest {
            plan: plan_input(&[dir.to_path_buf()], output, false, "id1", dir).unwrap(),
            config,
            activation,
            forced_scale: ForcedScale::None,
            use_cache: true,
        }
    }

    // =========================================================================
    // Registry configuration
    // =========================================================================

    #[test]
    fn default_codecs_without_tokens() {
        let mut reg = builtin::registry().unwrap();
        let act = configure_registry(&mut reg, &TexConfig::default(), &[]).unwrap();
        let active: Vec<&str> = reg.active_codecs().map(|c| c.name.as_str()).collect();
        assert_eq!(active, vec!["DXT"]);
        assert_eq!(reg.container(act.container).name, "DDS");
    }

    #[test]
    fn tokens_activate_in_given_order() {
        let mut reg = builtin::registry().unwrap();
        let t = tokens(&reg, &["-etc1", "-dxt", "-ktx", "-disable#nvtt"]);
        let act = configure_registry(&mut reg, &TexConfig::default(), &t).unwrap();
        let active: Vec<&str> = reg.active_codecs().map(|c| c.name.as_str()).collect();
        assert_eq!(active, vec!["ETC1", "DXT"]);
        assert_eq!(reg.container(act.container).name, "KTX");
        assert_eq!(act.selection.disabled_tools, vec![reg.tool_id("nvtt").unwrap()]);
    }

    #[test]
    fn disable_token_removes_default_codec() {
        let mut reg = builtin::registry().unwrap();
        let t = tokens(&reg, &["-disable#dxt"]);
        configure_registry(&mut reg, &TexConfig::default(), &t).unwrap();
        assert_eq!(reg.active_codecs().count(), 0);
    }

    #[test]
    fn unknown_default_codec_is_fatal() {
        let mut reg = builtin::registry().unwrap();
        let config = TexConfig {
            default_codecs: vec!["S3TC".into()],
            ..TexConfig::default()
        };
        assert_eq!(
            configure_registry(&mut reg, &config, &[]).unwrap_err(),
            RegistryError::UnknownCodec("S3TC".into())
        );
    }

    #[test]
    fn unknown_force_group_is_fatal() {
        let mut reg = builtin::registry().unwrap();
        let mut config = TexConfig::default();
        config.force.insert("force_nothing".into(), vec!["*".into()]);
        assert!(matches!(
            configure_registry(&mut reg, &config, &[]),
            Err(RegistryError::UnknownForceGroup(_))
        ));
    }

    #[test]
    fn signature_follows_output_flags() {
        let tmp = setup_fixtures();
        let mut reg = builtin::registry().unwrap();
        let mut req = request(&mut reg, tmp.path(), None, &[]);
        assert_eq!(req.convert_options().signature, Some(Signature::texforge()));
        req.config.output.gimp_signature = true;
        assert_eq!(req.convert_options().signature, Some(Signature::GIMP));
        req.config.output.sign = false;
        assert_eq!(req.convert_options().signature, None);
    }

    #[test]
    fn settings_hash_tracks_codecs_and_flags() {
        let tmp = setup_fixtures();
        let mut reg = builtin::registry().unwrap();
        let mut req = request(&mut reg, tmp.path(), None, &[]);
        let base = req.settings_hash(&reg);
        assert_eq!(base, req.settings_hash(&reg));
        req.config.output.mipmaps = false;
        assert_ne!(base, req.settings_hash(&reg));
        req.config.output.mipmaps = true;
        reg.activate("ETC1").unwrap();
        assert_ne!(base, req.settings_hash(&reg));
    }

    // =========================================================================
    // Runs
    // =========================================================================

    #[test]
    fn second_run_skips_unchanged_files() {
        let tmp = setup_fixtures();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("dest");
        let (mut reg, calls) = mock_registry(MockEncoder::default());
        let req = request(&mut reg, tmp.path(), Some(&dest), &["-mock"]);

        let first = run(&reg, &req, None).unwrap();
        assert_eq!(first.stats.exported_files, 3);
        assert_eq!(first.stats.skipped_files, 0);
        let cache_file = first.cache_file.clone().unwrap();
        assert_eq!(cache_file, out.path().join("dest_filescrc.txt"));
        assert!(cache_file.is_file());
        assert!(dest.join("textures/wall.dds").is_file());
        let encoded = calls.lock().unwrap().len();

        write_test_png(&tmp.path().join("textures/wall.png"), 4, 4, 255);
        let second = run(&reg, &req, None).unwrap();
        assert_eq!(second.stats.skipped_files, 2);
        assert_eq!(second.stats.exported_files, 1);
        // 4×4 → 3 levels
        assert_eq!(calls.lock().unwrap().len(), encoded + 3);

        let third = run(&reg, &req, None).unwrap();
        assert_eq!(third.stats.skipped_files, 3);
        assert_eq!(third.stats.exported_files, 0);
        assert!(!third.all_failed());
    }

    #[test]
    fn failed_files_are_retried() {
        let tmp = TempDir::new().unwrap();
        write_test_png(&tmp.path().join("ok.png"), 4, 4, 255);
        std::fs::write(tmp.path().join("bad.png"), b"garbage").unwrap();
        let out = TempDir::new().unwrap();
        let (mut reg, _) = mock_registry(MockEncoder::default());
        let req = request(&mut reg, tmp.path(), Some(&out.path().join("dest")), &["-mock"]);

        let first = run(&reg, &req, None).unwrap();
        assert_eq!(first.stats.failed_files(), 1);
        assert!(!first.all_failed());
        let second = run(&reg, &req, None).unwrap();
        assert_eq!(second.stats.skipped_files, 1);
        assert_eq!(second.stats.failed_files(), 1);
        assert!(second.all_failed());
    }

    #[test]
    fn no_cache_request_converts_everything() {
        let tmp = setup_fixtures();
        let out = TempDir::new().unwrap();
        let (mut reg, _) = mock_registry(MockEncoder::default());
        let mut req = request(&mut reg, tmp.path(), Some(&out.path().join("dest")), &["-mock"]);
        req.use_cache = false;
        run(&reg, &req, None).unwrap();
        let again = run(&reg, &req, None).unwrap();
        assert_eq!(again.stats.exported_files, 3);
        assert!(again.cache_file.is_none());
        assert!(!out.path().join("dest_filescrc.txt").exists());
    }

    #[test]
    fn archive_destination_disables_cache() {
        let tmp = setup_fixtures();
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out/pak1.pk3");
        let (mut reg, _) = mock_registry(MockEncoder::default());
        let mut req = request(&mut reg, tmp.path(), Some(&out), &["-mock"]);
        req.config.archive.path = "textures".into();
        req.config.archive.zip_in_memory = 64;

        let report = run(&reg, &req, None).unwrap();
        assert!(report.cache_file.is_none());
        assert_eq!(report.notices.len(), 1);
        let summary = report.archive.unwrap();
        assert_eq!(summary.strategy, ArchiveStrategy::Memory);
        assert_eq!(summary.entries, 3);
        assert_eq!(report.stats.archive_bytes, std::fs::metadata(&out).unwrap().len());
        assert!(!cache_path_for(&out).exists());

        let archive = zip::ZipArchive::new(std::fs::File::open(&out).unwrap()).unwrap();
        assert!(archive.file_names().any(|n| n == "textures/MOCK/textures/wall.dds"));
    }

    #[test]
    fn empty_input_is_a_successful_run() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        let mut reg = builtin::registry().unwrap();
        let req = request(&mut reg, tmp.path(), None, &[]);
        let report = run(&reg, &req, None).unwrap();
        assert_eq!(report.discovered, 0);
        assert!(!report.all_failed());
    }

    #[test]
    fn no_active_codec_aborts() {
        let tmp = setup_fixtures();
        let mut reg = builtin::registry().unwrap();
        let req = request(&mut reg, tmp.path(), None, &["-disable#dxt"]);
        assert!(matches!(
            run(&reg, &req, None),
            Err(PipelineError::Run(RunError::NoActiveCodecs))
        ));
    }
}
