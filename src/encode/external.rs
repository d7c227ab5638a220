//! Encoders backed by vendor command-line tools.
//!
//! Each level is written to a scratch PNG, the tool is run to produce a
//! single-level DDS or KTX file, and the payload is cut back out of that file.
//! The executable is checked once at registration; when it is missing the tool
//! stays registered and every encode attempt fails for that file only.

use super::{EncodeError, EncodeSettings, ErrorMetric, Profile, TextureEncoder};
use crate::container::{dds, ktx};
use crate::registry::Format;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Which vendor tool an [`ExternalEncoder`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalTool {
    /// NVIDIA Texture Tools `nvcompress`.
    Nvcompress,
    /// `EtcTool` from etc2comp.
    EtcTool,
    /// Imagination `PVRTexToolCLI`.
    PvrTexTool,
}

impl ExternalTool {
    pub fn program(self) -> &'static str {
        match self {
            ExternalTool::Nvcompress => "nvcompress",
            ExternalTool::EtcTool => "EtcTool",
            ExternalTool::PvrTexTool => "PVRTexToolCLI",
        }
    }

    fn output_extension(self) -> &'static str {
        match self {
            ExternalTool::Nvcompress => "dds",
            ExternalTool::EtcTool | ExternalTool::PvrTexTool => "ktx",
        }
    }

    fn version_args(self) -> &'static [&'static str] {
        match self {
            ExternalTool::Nvcompress => &[],
            ExternalTool::EtcTool => &["-help"],
            ExternalTool::PvrTexTool => &["-version"],
        }
    }

    /// Tool-specific format switch, or `None` when the tool cannot produce it.
    fn format_args(self, format: &str) -> Option<Vec<&'static str>> {
        let args = match (self, format) {
            (ExternalTool::Nvcompress, "DXT1") => vec!["-bc1"],
            (ExternalTool::Nvcompress, "DXT1A") => vec!["-bc1a"],
            (ExternalTool::Nvcompress, "DXT3") => vec!["-bc2"],
            (ExternalTool::Nvcompress, "DXT5") => vec!["-bc3"],
            (ExternalTool::EtcTool, "ETC2_RGB") => vec!["-format", "RGB8"],
            (ExternalTool::EtcTool, "ETC2_RGBA") => vec!["-format", "RGBA8"],
            (ExternalTool::EtcTool, "ETC2_RGBA1") => vec!["-format", "RGB8A1"],
            (ExternalTool::PvrTexTool, "PVRTC2") => vec!["-f", "PVRTC1_2_RGB"],
            (ExternalTool::PvrTexTool, "PVRTC2A") => vec!["-f", "PVRTC1_2"],
            (ExternalTool::PvrTexTool, "PVRTC4") => vec!["-f", "PVRTC1_4_RGB"],
            (ExternalTool::PvrTexTool, "PVRTC4A") => vec!["-f", "PVRTC1_4"],
            _ => return None,
        };
        Some(args)
    }

    fn quality_args(self, settings: &EncodeSettings) -> Vec<&'static str> {
        match self {
            ExternalTool::Nvcompress => match settings.profile {
                Profile::Fast => vec!["-fast"],
                Profile::Regular => vec![],
                Profile::Hq => vec!["-production"],
            },
            ExternalTool::EtcTool => {
                let effort = match settings.profile {
                    Profile::Fast => "0",
                    Profile::Regular => "40",
                    Profile::Hq => "100",
                };
                let metric = match settings.metric {
                    ErrorMetric::Uniform => "numeric",
                    ErrorMetric::Auto | ErrorMetric::Perceptual => "rec709",
                };
                vec!["-effort", effort, "-errormetric", metric]
            }
            ExternalTool::PvrTexTool => {
                let quality = match settings.profile {
                    Profile::Fast => "pvrtcfast",
                    Profile::Regular => "pvrtcnormal",
                    Profile::Hq => "pvrtcbest",
                };
                vec!["-q", quality]
            }
        }
    }

    /// Full argument list for one conversion.
    pub fn command_args(
        self,
        input: &Path,
        output: &Path,
        format: &str,
        settings: &EncodeSettings,
    ) -> Option<Vec<String>> {
        let format_args = self.format_args(format)?;
        let quality = self.quality_args(settings);
        let input = input.display().to_string();
        let output = output.display().to_string();
        let mut args: Vec<String> = Vec::new();
        match self {
            ExternalTool::Nvcompress => {
                args.push("-nomips".into());
                args.extend(format_args.iter().map(|s| s.to_string()));
                args.extend(quality.iter().map(|s| s.to_string()));
                args.push(input);
                args.push(output);
            }
            ExternalTool::EtcTool => {
                args.push(input);
                args.extend(format_args.iter().map(|s| s.to_string()));
                args.extend(quality.iter().map(|s| s.to_string()));
                args.push("-output".into());
                args.push(output);
            }
            ExternalTool::PvrTexTool => {
                args.extend(["-i".to_string(), input, "-o".to_string(), output]);
                args.extend(format_args.iter().map(|s| s.to_string()));
                args.extend(quality.iter().map(|s| s.to_string()));
            }
        }
        Some(args)
    }
}

pub struct ExternalEncoder {
    tool: ExternalTool,
    program: PathBuf,
    version: OnceLock<Result<String, String>>,
}

impl ExternalEncoder {
    pub fn new(tool: ExternalTool) -> Self {
        Self::with_program(tool, tool.program())
    }

    /// Drive `tool` through an explicit executable path.
    pub fn with_program(tool: ExternalTool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            version: OnceLock::new(),
        }
    }

    fn availability(&self) -> &Result<String, String> {
        self.version.get_or_init(|| {
            let output = Command::new(&self.program)
                .args(self.tool.version_args())
                .output()
                .map_err(|e| format!("'{}' not found: {e}", self.program.display()))?;
            // Several of these tools print their banner on stderr and exit
            // non-zero when run without inputs.
            let text = [output.stdout.as_slice(), output.stderr.as_slice()].concat();
            let text = String::from_utf8_lossy(&text);
            Ok(text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("unknown version")
                .to_string())
        })
    }

    fn run(&self, dir: &Path, level: &RgbaImage, format: &Format, settings: &EncodeSettings) -> Result<Vec<u8>, EncodeError> {
        let input = dir.join("level.png");
        let output = dir.join(format!("level.{}", self.tool.output_extension()));
        level.save(&input).map_err(|e| EncodeError::ToolFailed {
            tool: self.tool.program().to_string(),
            message: format!("could not write scratch image: {e}"),
        })?;

        let args = self
            .tool
            .command_args(&input, &output, &format.name, settings)
            .ok_or_else(|| EncodeError::Unsupported {
                tool: self.tool.program().to_string(),
                format: format.name.clone(),
            })?;

        tracing::debug!(program = %self.program.display(), ?args, "running external encoder");
        let result = Command::new(&self.program).args(&args).output()?;
        if !result.status.success() {
            return Err(EncodeError::ToolFailed {
                tool: self.tool.program().to_string(),
                message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let bytes = std::fs::read(&output)?;
        let payload = match self.tool.output_extension() {
            "dds" => dds::first_level_payload(&bytes)?,
            _ => ktx::first_level_payload(&bytes)?,
        };
        Ok(payload.to_vec())
    }
}

impl TextureEncoder for ExternalEncoder {
    fn init(&self) {
        if let Err(reason) = self.availability() {
            tracing::debug!(tool = self.tool.program(), %reason, "external encoder unavailable");
        }
    }

    fn version(&self) -> String {
        match self.availability() {
            Ok(v) => v.clone(),
            Err(_) => "not installed".to_string(),
        }
    }

    fn encode(
        &self,
        level: &RgbaImage,
        format: &Format,
        settings: &EncodeSettings,
    ) -> Result<Vec<u8>, EncodeError> {
        if self.tool.format_args(&format.name).is_none() {
            return Err(EncodeError::Unsupported {
                tool: self.tool.program().to_string(),
                format: format.name.clone(),
            });
        }
        if let Err(reason) = self.availability() {
            return Err(EncodeError::ToolMissing {
                tool: self.tool.program().to_string(),
                reason: reason.clone(),
            });
        }

        in_scratch_dir(|dir| self.run(dir, level, format, settings))
    }
}

/// Run `f` inside a fresh temporary directory, removed afterwards whatever
/// `f` returns.
fn in_scratch_dir<T>(f: impl FnOnce(&Path) -> Result<T, EncodeError>) -> Result<T, EncodeError> {
    let dir = tempfile::Builder::new().prefix("texforge-").tempdir()?;
    let result = f(dir.path());
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        tracing::debug!(dir = %path.display(), error = %e, "could not remove scratch directory");
    }
    result
}
