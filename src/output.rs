//! CLI output formatting.
//!
//! # Output Format
//!
//! ## List
//!
//! ```text
//! Codecs
//!        DXT: DirectX Texture Compression (-dxt, -disable#dxt) [active]
//!            ispc: Intel ISPC Texture Compressor v0.5 (-ispc)
//!                DXT1, DXT5
//!            nvtt: NVIDIA Texture Tools vmissing (-nvtt)
//!                DXT1, DXT1A, DXT3, DXT5
//!
//! Containers
//!        DDS: DirectDraw Surface .dds (-dds)
//! ```
//!
//! ## Progress
//!
//! One line per event. Workers interleave, so every line names its file:
//!
//! ```text
//! 001/120 textures/wall.tga
//! textures/wall.tga [DXT] DXT1 via ispc → id1/DXT/textures/wall.dds
//! textures/glass.tga [ETC1] BGRA via raw (fallback) → id1/ETC1/textures/glass.dds
//! textures/broken.tga [DXT] failed: Cannot decode image
//! ```
//!
//! ## Summary
//!
//! ```text
//! Exported 118 files in 0:42.7
//! Input: 64.0 MB
//!        DXT: 59 textures, input 60.1 MB (VRAM 80.2 MB, PoT VRAM 96.0 MB), output 24.1 MB (VRAM 24.0 MB)
//! Failed: 1 file
//!     textures/broken.tga: Cannot decode image
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::layout::{MipChain, compressed_size};
use crate::pipeline::RunReport;
use crate::registry::Registry;
use crate::resolve::ResolvedTexture;
use crate::scheduler::{FileFailure, JobEvent};
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Megabytes with one decimal, e.g. `12.4 MB`.
fn format_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Elapsed time as `m:ss.s`.
fn format_duration(elapsed: Duration) -> String {
    let tenths = elapsed.as_millis() / 100;
    let minutes = tenths / 600;
    let seconds = (tenths % 600) / 10;
    format!("{}:{:02}.{}", minutes, seconds, tenths % 10)
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn failure_line(failure: &FileFailure) -> String {
    match &failure.codec {
        Some(codec) => format!("{} [{}] failed: {}", failure.path, codec, failure.reason),
        None => format!("{} failed: {}", failure.path, failure.reason),
    }
}

// ============================================================================
// Registry listing
// ============================================================================

/// Every codec with its tools and formats, then every container.
pub fn format_registry(registry: &Registry) -> Vec<String> {
    let mut lines = vec!["Codecs".to_string()];
    for codec in registry.codecs() {
        let active = if registry.is_active(codec.id) {
            " [active]"
        } else {
            ""
        };
        lines.push(format!(
            "{:>10}: {} ({}, {}){}",
            codec.name, codec.full_name, codec.tokens.enable, codec.tokens.disable, active
        ));
        for tool in codec.tools.iter().map(|t| registry.tool(*t)) {
            lines.push(format!(
                "    {:>10}: {} v{} ({})",
                tool.name,
                tool.full_name,
                tool.version(),
                tool.tokens.enable
            ));
            let formats: Vec<&str> = tool
                .formats
                .iter()
                .map(|f| registry.format(*f).name.as_str())
                .collect();
            lines.push(format!("                {}", formats.join(", ")));
        }
        if let Some(fallback) = codec.fallback
            && fallback != codec.id
        {
            lines.push(format!("    fallback: {}", registry.codec(fallback).name));
        }
    }

    lines.push(String::new());
    lines.push("Containers".to_string());
    for container in registry.containers() {
        lines.push(format!(
            "{:>10}: {} .{} ({})",
            container.name, container.full_name, container.extension, container.enable_token
        ));
    }

    for warning in registry.warnings() {
        lines.push(format!("warning: {warning}"));
    }
    lines
}

pub fn print_registry(registry: &Registry) {
    for line in format_registry(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_job_event(event: &JobEvent) -> Vec<String> {
    match event {
        JobEvent::Started { index, total, path } => {
            let width = total.to_string().len().max(3);
            vec![format!(
                "{:0>width$}/{:0>width$} {}",
                index + 1,
                total,
                path,
                width = width
            )]
        }
        JobEvent::Converted {
            path,
            codec,
            format,
            tool,
            fallback,
            output,
        } => {
            let note = if *fallback { " (fallback)" } else { "" };
            vec![format!(
                "{path} [{codec}] {format} via {tool}{note} \u{2192} {output}"
            )]
        }
        JobEvent::PassedThrough {
            path,
            codec,
            output,
        } => vec![format!("{path} [{codec}] copied \u{2192} {output}")],
        JobEvent::Failed(failure) => vec![failure_line(failure)],
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Totals at the end of a run.
pub fn format_run_summary(report: &RunReport) -> Vec<String> {
    let stats = &report.stats;
    let mut lines = Vec::new();
    for notice in &report.notices {
        lines.push(format!("Note: {notice}"));
    }

    if report.discovered == 0 {
        lines.push("No input files found".to_string());
        return lines;
    }

    lines.push(format!(
        "Exported {} in {}",
        plural(stats.exported_files, "file"),
        format_duration(report.elapsed)
    ));
    if stats.skipped_files > 0 {
        lines.push(format!(
            "Skipped {} (unchanged since last run)",
            plural(stats.skipped_files, "file")
        ));
    }
    if stats.original_bytes > 0 {
        lines.push(format!("Input: {}", format_mb(stats.original_bytes)));
    }

    for (name, codec) in &stats.codecs {
        let mut line = format!(
            "{:>10}: {}, input {} (VRAM {}, PoT VRAM {}), output {} (VRAM {})",
            name,
            plural(codec.textures, "texture"),
            format_mb(codec.input_disk_bytes),
            format_mb(codec.input_ram_bytes),
            format_mb(codec.input_pot_ram_bytes),
            format_mb(codec.output_disk_bytes),
            format_mb(codec.output_vram_bytes),
        );
        if codec.fallbacks > 0 {
            line.push_str(&format!(", {} via fallback", codec.fallbacks));
        }
        lines.push(line);
    }

    if let Some(archive) = &report.archive {
        let entries = match archive.entries {
            1 => "1 entry".to_string(),
            n => format!("{n} entries"),
        };
        lines.push(format!(
            "Archive: {} ({}, {}, {})",
            archive.path.display(),
            entries,
            archive.strategy.name(),
            format_mb(stats.archive_bytes)
        ));
    }

    if !stats.failures.is_empty() {
        lines.push(format!(
            "Failed: {}",
            plural(stats.failed_files() as u64, "file")
        ));
        for failure in &stats.failures {
            lines.push(format!("    {}", failure_line(failure)));
        }
    }
    lines
}

pub fn print_run_summary(report: &RunReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Inspect
// ============================================================================

/// What a compressed texture resolves to, and whether its size adds up.
pub fn format_inspect(path: &str, texture: &ResolvedTexture<'_>, registry: &Registry, file_len: u64) -> Vec<String> {
    let d = &texture.descriptor;
    let codec = registry.codec(texture.format.codec);
    let chain = MipChain::with_levels(d.width, d.height, d.levels);
    let expected = texture.container.handler().header_len() as u64
        + compressed_size(&chain, texture.format, texture.container, true, true);
    let size_note = if expected == file_len {
        "matches layout".to_string()
    } else {
        format!("layout expects {expected}")
    };
    vec![
        path.to_string(),
        format!("    Container: {}", texture.container.name),
        format!("    Codec: {}", codec.name),
        format!(
            "    Format: {} ({})",
            texture.format.name, texture.format.full_name
        ),
        format!(
            "    Size: {}x{}, {}",
            d.width,
            d.height,
            plural(chain.len() as u64, "level")
        ),
        format!("    Bytes: {file_len} ({size_note})"),
    ]
}

pub fn print_inspect(path: &str, texture: &ResolvedTexture<'_>, registry: &Registry, file_len: u64) {
    for line in format_inspect(path, texture, registry, file_len) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
