//! Builtin codecs, tools, formats and containers.
//!
//! [`install`] populates a [`Registry`] in a fixed order (codecs, tools with
//! their formats, containers) and then points every codec's fallback at the
//! uncompressed BGRA codec. Order matters: it is the resolver's tie-break for
//! formats sharing a FourCC and the default tool priority within a codec.

pub mod codecs;
pub mod tools;

use crate::container::{dds, ktx};
use crate::registry::{Registry, RegistryError};

pub use codecs::FALLBACK_CODEC;

pub fn install(registry: &mut Registry) -> Result<(), RegistryError> {
    let ids = codecs::install(registry);
    tools::install(registry, &ids);
    registry.register_container(dds::definition());
    registry.register_container(ktx::definition());
    registry.assign_fallback(FALLBACK_CODEC)?;
    Ok(())
}

/// A fresh registry holding every builtin entity, with no codec active.
pub fn registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    install(&mut registry)?;
    Ok(registry)
}
