//! Skelter composes skeletal 2D characters out of binary vector-animation
//! containers.
//!
//! The pipeline is asset-driven and never blocks the render loop:
//!
//! - An [`AssetLoader`] parses containers into [`Movie`]s, compiles sprite
//!   timelines into [`CompiledSprite`]s, and rasterizes shapes into textures
//!   owned by a host-implemented [`TextureDevice`]
//! - Background workers decode; the render thread uploads a bounded batch per
//!   frame through [`AssetLoader::upload_frame_budget`]
//! - A [`Compositor`] flattens one skeleton frame plus a [`Descriptor`] into
//!   an ordered list of [`DrawableSprite`]s for the host to draw
#![forbid(unsafe_code)]

mod foundation;

pub mod assets;
pub mod cache;
pub mod movie;
pub mod pose;
pub mod raster;

pub use crate::assets::device::{Texture, TextureDevice, TextureId};
pub use crate::assets::loader::{AssetLoader, LoaderOpts};
pub use crate::cache::single::Cache;
pub use crate::cache::upload::{UploadCache, UploadOps};
pub use crate::foundation::core::{
    Affine, BezPath, CharacterId, Depth, Point, Rect, Rgba8, Tint, Vec2,
};
pub use crate::foundation::error::{SkelterError, SkelterResult};
pub use crate::movie::parse::Movie;
pub use crate::movie::timeline::{CompiledSprite, Frame, Layer};
pub use crate::pose::compose::{Compositor, DrawableSprite, InstanceId};
pub use crate::pose::descriptor::{CustomArt, Descriptor, Toggles};
pub use crate::pose::tables::{BoneKind, BoneMeta, BoneTable, SwapClass};
pub use crate::raster::{RasterBitmap, rasterize};
