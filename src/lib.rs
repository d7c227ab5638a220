//! # texforge
//!
//! A batch texture compression pipeline. Point it at a game's data directory
//! and it converts every image into GPU-ready compressed textures, one set per
//! requested codec family, skipping files that have not changed since the
//! last run.
//!
//! # Architecture: Registry, then Three Stages
//!
//! Everything pluggable lives in one [`registry::Registry`] built at start-up:
//! codecs, the tools that encode them, the formats those tools produce, and the
//! containers that wrap the result. The command line then selects from it and
//! a run proceeds in stages:
//!
//! ```text
//! 0. Registry   builtin::registry()  →  codecs / tools / formats / containers
//! 1. Scan       source tree          →  list of source files
//! 2. Convert    source files         →  <dest>/<codec>/…  or one archive
//! 3. Report     run statistics       →  stdout
//! ```
//!
//! The registry is mutated only during start-up (registration, activation,
//! force masks). During conversion it is shared read-only by all workers.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`registry`] | Catalogs of codecs, tools, formats and containers; token derivation; active codec chain |
//! | [`builtin`] | The stock DXT / ETC1 / ETC2 / PVRTC / BGRA codecs, their tools, DDS and KTX |
//! | [`block`] | Block geometry of every compressed format |
//! | [`resolve`] | Maps a file or a FourCC / GL triple back to container and format |
//! | [`layout`] | Exact byte size of a base level and mip chain in a container |
//! | [`imaging`] | Decoding, alpha analysis, upscaling, power-of-two resize, mip generation |
//! | [`encode`] | Encoder implementations: ISPC, raw BGRA, external command-line tools |
//! | [`container`] | DDS and KTX header writing and reading |
//! | [`scan`] | Input modes and source enumeration |
//! | [`scheduler`] | Parallel conversion with per-worker statistics |
//! | [`cache`] | Checksum sidecar for incremental runs |
//! | [`archive`] | Zip / pk3 output |
//! | [`naming`] | Output paths and filename suffixes |
//! | [`pipeline`] | Wires scan, cache, scheduler and archive into one run |
//! | [`config`] | Layered `texforge.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Tokens Derived, Never Written
//!
//! Each entity has a short parameter name (`dxt`, `ispc`, `dxt5`, `ktx`) and
//! its command-line tokens are derived from it at registration: `-dxt`,
//! `-disable#dxt`, `force_ispc`, `_dxt5`. Adding a tool never means touching
//! the argument parser.
//!
//! ## Sizes Are Checked, Not Trusted
//!
//! Every encoded texture is compared against [`layout::compressed_size`]
//! before it is written. An encoder returning the wrong number of bytes is a
//! per-file failure rather than a corrupt texture on disk.
//!
//! ## Private Accumulators
//!
//! Workers never share mutable state. Each folds its jobs into its own
//! statistics and the results are merged once on the calling thread, so a run
//! on one thread and a run on sixteen report identical totals.
//!
//! ## Cache Or Archive, Not Both
//!
//! An archive is rebuilt from scratch on every run; a cache would leave
//! unchanged files out of it. An archive destination therefore always turns
//! the cache off, with a notice.

pub mod archive;
pub mod block;
pub mod builtin;
pub mod cache;
pub mod config;
pub mod container;
pub mod encode;
pub mod imaging;
pub mod layout;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod scan;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;
