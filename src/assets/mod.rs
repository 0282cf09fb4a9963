//! Asset pipeline: bytes on disk to device textures.
//!
//! [`loader::AssetLoader`] fronts four caches (parsed movies, compiled
//! sprites, rasterized shape textures, flat image textures) behind
//! get-or-kick accessors. The device seam is [`device::TextureDevice`];
//! everything that touches it runs under an exclusive borrow of the device.

pub mod decode;
pub mod device;
pub mod loader;
