use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use texforge::config::{self, TexConfig};
use texforge::encode::{ErrorMetric, Profile};
use texforge::imaging::Scaler;
use texforge::naming::SuffixFlags;
use texforge::pipeline::{self, RunRequest};
use texforge::registry::{Registry, TokenTarget};
use texforge::scan::{self, InputMode};
use texforge::scheduler::ForcedScale;
use texforge::{builtin, output, resolve};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; the version string lives for the whole process.
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "texforge")]
#[command(about = "Batch texture compression into DDS / KTX")]
#[command(long_about = "\
Batch texture compression into DDS / KTX

Converts every image under a source directory into GPU-compressed textures,
one set per codec, and skips files unchanged since the last run.

Input modes:

  texforge                      search ../id1, ../../id1, ... (see game_dir)
  texforge DIR [flags]          convert DIR recursively into DIR/<codec>/
  texforge 'DIR/*.tga' [flags]  convert matching files in DIR
  texforge DIR -o OUT           convert into OUT (no codec subdirectories)
  texforge DIR -o pak1.pk3      convert into a single archive
  texforge PATH...              drop mode: output beside the input, no cache

Registry tokens (mix freely with the flags):

  -dxt -etc1 -etc2 -pvrtc -bgra   activate codecs, in this order
  -disable#<name>                 disable a codec, tool or format
  -ispc -nvtt -dxt5 ...           force a tool or format for every file
  -dds -ktx                       output container
  -st -sf -sp -stfp ...           add tool / format / profile filename suffixes
  -<scaler> / -2<scaler>          first / second upscale filter

Run 'texforge list' to see every codec, tool, format and container.
Run 'texforge gen-config' to generate a documented texforge.toml.")]
#[command(version = version_string())]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Source directory, file or file mask; further paths in drop mode
    inputs: Vec<PathBuf>,

    /// Output directory or archive
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Convert everything, ignoring and not writing the checksum cache
    #[arg(long)]
    nocache: bool,

    /// Keep original dimensions instead of resizing to powers of two
    #[arg(long)]
    npot: bool,

    /// Do not generate mipmaps
    #[arg(long)]
    nomip: bool,

    /// Upscale every image 2x
    #[arg(long = "2x", conflicts_with = "scale4x")]
    scale2x: bool,

    /// Upscale every image 4x
    #[arg(long = "4x")]
    scale4x: bool,

    /// Filter for the first upscale pass
    #[arg(long, value_parser = parse_scaler)]
    scaler: Option<Scaler>,

    /// Filter for the second pass of 4x
    #[arg(long, value_parser = parse_scaler)]
    scaler2: Option<Scaler>,

    /// Prefix for every archive entry
    #[arg(long)]
    ap: Option<String>,

    /// Build archives in memory when the input totals at most this many MiB
    #[arg(long)]
    zipmem: Option<u64>,

    /// Filename suffixes: any combination of t (tool), f (format), p (profile)
    #[arg(long, value_parser = parse_suffix)]
    suffix: Option<SuffixFlags>,

    /// Compression error metric
    #[arg(long, value_enum)]
    errormetric: Option<ErrorMetric>,

    /// Encoder effort
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Maximum worker threads (default: CPU cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Do not stamp a writer signature into headers
    #[arg(long, conflicts_with = "gimpsign")]
    nosign: bool,

    /// Stamp the GIMP DDS plugin signature instead of texforge's
    #[arg(long)]
    gimpsign: bool,

    /// Configuration file (default: texforge.toml in the source directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log progress details (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List codecs, tools, formats and containers with their tokens
    List,
    /// Show container, codec and format of a compressed texture
    Inspect { file: PathBuf },
    /// Print a stock texforge.toml with all options documented
    GenConfig,
}

/// Single-dash spellings accepted for the long flags.
const LEGACY_FLAGS: &[&str] = &[
    "nocache",
    "npot",
    "nomip",
    "2x",
    "4x",
    "scaler",
    "scaler2",
    "ap",
    "zipmem",
    "errormetric",
    "profile",
    "nosign",
    "gimpsign",
];

/// The command line with registry-style tokens taken out.
#[derive(Debug, Default)]
struct SplitArgs {
    clap_args: Vec<String>,
    tokens: Vec<TokenTarget>,
    suffix: SuffixFlags,
    scaler: Option<Scaler>,
    scaler2: Option<Scaler>,
}

fn find_scaler(name: &str) -> Option<Scaler> {
    Scaler::value_variants()
        .iter()
        .copied()
        .find(|s| s.name().eq_ignore_ascii_case(name))
}

fn parse_scaler(name: &str) -> Result<Scaler, String> {
    find_scaler(name).ok_or_else(|| {
        let names: Vec<&str> = Scaler::value_variants().iter().map(|s| s.name()).collect();
        format!("expected one of {}", names.join(", "))
    })
}

fn parse_suffix(letters: &str) -> Result<SuffixFlags, String> {
    SuffixFlags::parse(letters).ok_or_else(|| "expected a combination of t, f and p".to_string())
}

/// Pull registry tokens, suffix tokens and scaler tokens out of `args`
/// (program name first) and rewrite legacy single-dash flags.
fn split_args(args: Vec<String>, registry: &Registry) -> SplitArgs {
    let mut split = SplitArgs::default();
    let mut iter = args.into_iter();
    split.clap_args.extend(iter.next());
    for arg in iter {
        if let Some(target) = registry.match_token(&arg) {
            split.tokens.push(target);
        } else if let Some(flags) = SuffixFlags::from_token(&arg) {
            split.suffix = split.suffix.union(flags);
        } else if let Some(s) = arg.strip_prefix("-2").and_then(find_scaler) {
            split.scaler2 = Some(s);
        } else if let Some(s) = arg.strip_prefix('-').and_then(find_scaler) {
            split.scaler = Some(s);
        } else if let Some(flag) = arg.strip_prefix('-')
            && !flag.starts_with('-')
            && LEGACY_FLAGS.contains(&flag)
        {
            split.clap_args.push(format!("--{flag}"));
        } else {
            split.clap_args.push(arg);
        }
    }
    split
}

/// Drop mode: nothing but paths on the command line.
fn is_drop(split: &SplitArgs) -> bool {
    split.tokens.is_empty()
        && split.suffix == SuffixFlags::default()
        && split.scaler.is_none()
        && split.scaler2.is_none()
        && split.clap_args.len() > 1
        && split.clap_args[1..].iter().all(|a| !a.starts_with('-'))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    init_tracing(args.iter().any(|a| a == "-v" || a == "--verbose"));

    let mut registry = builtin::registry()?;
    let split = split_args(args, &registry);
    let dropped = is_drop(&split);
    let cli = Cli::parse_from(&split.clap_args);
    let cwd = std::env::current_dir()?;

    match cli.command {
        Some(Command::List) => {
            let config = config::load_config(&cwd, cli.config.as_deref())?;
            pipeline::configure_registry(&mut registry, &config, &split.tokens)?;
            output::print_registry(&registry);
        }
        Some(Command::Inspect { ref file }) => inspect(&registry, file)?,
        Some(Command::GenConfig) => {
            print!("{}", config::stock_config_toml());
        }
        None => convert(&cli, &split, dropped, registry, &cwd)?,
    }

    Ok(())
}

fn convert(
    cli: &Cli,
    split: &SplitArgs,
    dropped: bool,
    mut registry: Registry,
    cwd: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let game_dir = match &cli.config {
        Some(path) => config::load_config(cwd, Some(path.as_path()))?.game_dir,
        None => TexConfig::default().game_dir,
    };
    let plan = scan::plan_input(&cli.inputs, cli.output.as_deref(), dropped, &game_dir, cwd)?;

    // A single dropped texture is inspected rather than converted.
    if plan.mode == InputMode::DropFile
        && let Some(file) = plan.single_file()
        && resolve::resolve_container(&registry, &file, None).is_some()
    {
        return inspect(&registry, &file);
    }

    let mut config = config::load_config(&plan.source_dir, cli.config.as_deref())?;
    apply_flags(cli, split, &mut config);
    config.validate()?;

    let activation = pipeline::configure_registry(&mut registry, &config, &split.tokens)?;
    let forced_scale = if cli.scale4x {
        ForcedScale::X4
    } else if cli.scale2x {
        ForcedScale::X2
    } else {
        ForcedScale::None
    };
    let request = RunRequest {
        plan,
        config,
        activation,
        forced_scale,
        use_cache: !cli.nocache,
    };
    tracing::info!(
        source = %request.plan.source_dir.display(),
        destination = %request.plan.destination.display(),
        mode = ?request.plan.mode,
        "starting"
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_job_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = pipeline::run(&registry, &request, Some(tx));
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    let report = result?;
    output::print_run_summary(&report);

    if report.all_failed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Command-line flags and short tokens override the configuration file.
fn apply_flags(cli: &Cli, split: &SplitArgs, config: &mut TexConfig) {
    let out = &mut config.output;
    if cli.npot {
        out.power_of_two = false;
    }
    if cli.nomip {
        out.mipmaps = false;
    }
    if cli.nosign {
        out.sign = false;
    }
    if cli.gimpsign {
        out.sign = true;
        out.gimp_signature = true;
    }
    if let Some(profile) = cli.profile {
        out.profile = profile;
    }
    if let Some(metric) = cli.errormetric {
        out.error_metric = metric;
    }
    out.suffix = out.suffix.union(split.suffix);
    if let Some(flags) = cli.suffix {
        out.suffix = out.suffix.union(flags);
    }

    if let Some(s) = cli.scaler.or(split.scaler) {
        config.scale.first = s;
    }
    if let Some(s) = cli.scaler2.or(split.scaler2) {
        config.scale.second = s;
    }
    if let Some(ap) = &cli.ap {
        config.archive.path = ap.clone();
    }
    if let Some(mib) = cli.zipmem {
        config.archive.zip_in_memory = mib;
    }
    if let Some(n) = cli.threads {
        config.processing.max_threads = Some(n);
    }
}

fn inspect(registry: &Registry, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    let texture = resolve::resolve_texture(registry, file, &bytes)?;
    output::print_inspect(
        &file.display().to_string(),
        &texture,
        registry,
        bytes.len() as u64,
    );
    Ok(())
}

/// `warn` by default, `info` with `--verbose`; `RUST_LOG` wins over both.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("texforge")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn registry_tokens_are_extracted() {
        let reg = builtin::registry().unwrap();
        let split = split_args(args(&["id1", "-dxt", "-disable#nvtt", "-ktx", "-o", "out"]), &reg);
        assert_eq!(split.clap_args, args(&["id1", "-o", "out"]));
        assert_eq!(split.tokens.len(), 3);
        assert!(!is_drop(&split));
    }

    #[test]
    fn suffix_and_scaler_tokens() {
        let reg = builtin::registry().unwrap();
        let split = split_args(args(&["id1", "-st", "-sf", "-nearest", "-2lanczos"]), &reg);
        assert_eq!(split.suffix, SuffixFlags::parse("tf").unwrap());
        assert_eq!(split.scaler, Some(Scaler::Nearest));
        assert_eq!(split.scaler2, Some(Scaler::Lanczos));
        assert_eq!(split.clap_args, args(&["id1"]));
    }

    #[test]
    fn legacy_flags_get_a_second_dash() {
        let reg = builtin::registry().unwrap();
        let split = split_args(args(&["-nocache", "-2x", "-zipmem", "64", "--npot"]), &reg);
        assert_eq!(
            split.clap_args,
            args(&["--nocache", "--2x", "--zipmem", "64", "--npot"])
        );
        let cli = Cli::parse_from(&split.clap_args);
        assert!(cli.nocache && cli.scale2x && cli.npot);
        assert_eq!(cli.zipmem, Some(64));
    }

    #[test]
    fn only_paths_is_drop_mode() {
        let reg = builtin::registry().unwrap();
        assert!(is_drop(&split_args(args(&["a.tga", "b.tga"]), &reg)));
        assert!(!is_drop(&split_args(args(&[]), &reg)));
        assert!(!is_drop(&split_args(args(&["a.tga", "-dxt"]), &reg)));
        assert!(!is_drop(&split_args(args(&["a.tga", "--npot"]), &reg)));
    }

    #[test]
    fn flags_override_config() {
        let reg = builtin::registry().unwrap();
        let split = split_args(
            args(&["id1", "--npot", "--gimpsign", "--scaler", "bicubic", "-sp", "--threads", "2"]),
            &reg,
        );
        let cli = Cli::parse_from(&split.clap_args);
        let mut config = TexConfig::default();
        apply_flags(&cli, &split, &mut config);
        assert!(!config.output.power_of_two);
        assert!(config.output.gimp_signature);
        assert_eq!(config.scale.first, Scaler::Bicubic);
        assert!(config.output.suffix.profile);
        assert_eq!(config.processing.max_threads, Some(2));
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::parse_from(args(&["inspect", "sky.dds"]));
        assert!(matches!(cli.command, Some(Command::Inspect { .. })));
        let cli = Cli::parse_from(args(&["gen-config"]));
        assert!(matches!(cli.command, Some(Command::GenConfig)));
    }
}
