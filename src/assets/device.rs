use crate::foundation::core::{Affine, Point};
use crate::foundation::error::SkelterResult;

/// Opaque handle to a texture owned by the host's [`TextureDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Owner of texture storage, implemented by the host renderer.
///
/// Every method takes `&mut self`: the exclusive borrow is the proof that the
/// caller is on the thread that owns the device, so upload and release work
/// cannot race the renderer. The crate only calls these from
/// `upload_frame_budget` and the `*_sync` loaders.
pub trait TextureDevice {
    /// Create a texture from tightly packed premultiplied RGBA8 rows.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba8_premul: &[u8],
    ) -> SkelterResult<TextureId>;

    /// Release a texture previously returned by
    /// [`create_texture`](Self::create_texture).
    fn release_texture(&mut self, id: TextureId);
}

/// A device texture plus the placement metadata needed to draw it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    /// Pixel-space top-left of the source artwork. Zero for flat images.
    pub offset: Point,
    /// Source pixels per local pixel baked into the texture.
    pub quality: f64,
}

impl Texture {
    /// Zero-sized sentinel returned while the real texture is still decoding
    /// or waiting in the upload queue. Never draw it.
    pub fn placeholder() -> Self {
        Self {
            id: TextureId(0),
            width: 0,
            height: 0,
            offset: Point::ZERO,
            quality: 1.0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Texture pixels -> local pixels of the artwork it was baked from.
    pub fn to_local(&self) -> Affine {
        Affine::translate(self.offset.to_vec2()) * Affine::scale(1.0 / self.quality)
    }
}
