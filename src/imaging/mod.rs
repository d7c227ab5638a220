//! Image preparation: decoding and pixel work ahead of encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` → RGBA8 |
//! | **Alpha analysis** | single pass over the alpha channel |
//! | **2x / 4x upscale** | `image::imageops::resize`, or Scale2x / Super2x |
//! | **Power-of-two resize** | `imageops::resize` with `Lanczos3` |
//! | **Mip chain** | repeated halving with `Triangle` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing what to do to an image
//! - **Decode**: file / memory → `RgbaImage`
//! - **Analysis**: [`ImageTraits`] consumed by codec format policies
//! - **Operations**: [`prepare`] combining all of the above

mod analysis;
mod calculations;
pub mod decode;
pub mod operations;
mod params;

pub use analysis::{ImageTraits, analyze};
pub use calculations::{is_power_of_two, mip_dimensions, next_power_of_two, rgba_bytes};
pub use decode::{DecodeError, decode_rgba, is_decodable, load_rgba, supported_input_extensions};
pub use operations::{PreparedImage, prepare, upscale};
pub use params::{AlphaDetection, PrepareOptions, Scaler};
