use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::assets::decode::{DecodedImage, decode_image};
use crate::assets::device::{Texture, TextureDevice};
use crate::cache::single::Cache;
use crate::cache::upload::{UploadCache, UploadOps};
use crate::foundation::core::{CharacterId, Point};
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::movie::parse::Movie;
use crate::movie::timeline::{self, CompiledSprite};
use crate::raster::{self, RasterBitmap};

/// Tuning for an [`AssetLoader`].
#[derive(Clone, Copy, Debug)]
pub struct LoaderOpts {
    /// Output pixels per local pixel when rasterizing shape textures, before
    /// any per-instance scale.
    pub raster_quality: f64,
    /// Upload budget per texture cache per [`AssetLoader::upload_frame_budget`]
    /// call.
    pub uploads_per_frame: usize,
}

impl Default for LoaderOpts {
    fn default() -> Self {
        Self {
            raster_quality: 2.0,
            uploads_per_frame: 2,
        }
    }
}

type SpriteKey = (Arc<str>, CharacterId);

/// Cache key for a rasterized shape texture. Quality is keyed by its bit
/// pattern so the key stays `Eq + Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ShapeKey {
    path: Arc<str>,
    character: CharacterId,
    quality_bits: u64,
}

impl ShapeKey {
    fn new(path: Arc<str>, character: CharacterId, quality: f64) -> Self {
        Self {
            path,
            character,
            quality_bits: quality.to_bits(),
        }
    }

    fn quality(&self) -> f64 {
        f64::from_bits(self.quality_bits)
    }
}

struct ShapeTextureOps {
    movies: Cache<Arc<str>, Arc<Movie>>,
}

impl UploadOps for ShapeTextureOps {
    type Key = ShapeKey;
    type Intermediate = RasterBitmap;
    type Value = Texture;
    type Device = dyn TextureDevice;

    fn decode(&self, key: &ShapeKey) -> SkelterResult<RasterBitmap> {
        // The movie may have been evicted between scheduling and running;
        // failing here is retryable once it is back.
        let movie = self.movies.get_or_none(&key.path).ok_or_else(|| {
            SkelterError::validation(format!("movie {:?} is not loaded", key.path))
        })?;
        let shape = movie.shape(key.character).ok_or_else(|| {
            SkelterError::validation(format!(
                "movie {:?} has no shape {:?}",
                key.path, key.character
            ))
        })?;
        raster::rasterize(shape, key.quality())
    }

    fn to_gpu(
        &self,
        bitmap: RasterBitmap,
        dev: &mut (dyn TextureDevice + 'static),
    ) -> SkelterResult<Texture> {
        let id = dev.create_texture(bitmap.width, bitmap.height, &bitmap.rgba8_premul)?;
        Ok(Texture {
            id,
            width: bitmap.width,
            height: bitmap.height,
            offset: bitmap.offset,
            quality: bitmap.quality,
        })
    }

    fn release_value(&self, value: Texture, dev: &mut (dyn TextureDevice + 'static)) {
        dev.release_texture(value.id);
    }
}

struct FlatTextureOps {
    root: PathBuf,
}

impl UploadOps for FlatTextureOps {
    type Key = Arc<str>;
    type Intermediate = DecodedImage;
    type Value = Texture;
    type Device = dyn TextureDevice;

    fn decode(&self, key: &Arc<str>) -> SkelterResult<DecodedImage> {
        let bytes = read_asset(&self.root, key)?;
        decode_image(&bytes)
    }

    fn to_gpu(
        &self,
        image: DecodedImage,
        dev: &mut (dyn TextureDevice + 'static),
    ) -> SkelterResult<Texture> {
        let id = dev.create_texture(image.width, image.height, &image.rgba8_premul)?;
        Ok(Texture {
            id,
            width: image.width,
            height: image.height,
            offset: Point::ZERO,
            quality: 1.0,
        })
    }

    fn release_value(&self, value: Texture, dev: &mut (dyn TextureDevice + 'static)) {
        dev.release_texture(value.id);
    }
}

/// Façade over the four asset caches: parsed movies, compiled sprites,
/// rasterized shape textures, and flat image textures.
///
/// The plain accessors are get-or-kick: they answer from cache and otherwise
/// schedule a background load and report a miss, so a caller polling once per
/// frame picks the value up a few frames later without ever blocking. The
/// `*_sync` variants block and are for the device thread's first-use needs.
#[derive(Clone)]
pub struct AssetLoader {
    opts: LoaderOpts,
    movies: Cache<Arc<str>, Arc<Movie>>,
    sprites: Cache<SpriteKey, Arc<CompiledSprite>>,
    shape_textures: UploadCache<ShapeTextureOps>,
    flat_textures: UploadCache<FlatTextureOps>,
}

impl AssetLoader {
    /// Create a loader rooted at `root`; every asset path is resolved under
    /// it.
    pub fn new(root: impl Into<PathBuf>, opts: LoaderOpts) -> Self {
        let root = root.into();
        let movies = {
            let root = root.clone();
            Cache::new("movie", move |path: &Arc<str>| {
                let bytes = read_asset(&root, path)?;
                Ok(Arc::new(Movie::parse(&bytes)?))
            })
        };
        let sprites = {
            let movies = movies.clone();
            Cache::new("sprite", move |key: &SpriteKey| {
                let movie = movies.get_or_none(&key.0).ok_or_else(|| {
                    SkelterError::validation(format!("movie {:?} is not loaded", key.0))
                })?;
                let def = movie.sprite(key.1).ok_or_else(|| {
                    SkelterError::validation(format!(
                        "movie {:?} has no sprite {:?}",
                        key.0, key.1
                    ))
                })?;
                Ok(Arc::new(timeline::compile(def)))
            })
        };
        let shape_textures = UploadCache::new(
            "shape-texture",
            ShapeTextureOps {
                movies: movies.clone(),
            },
        );
        let flat_textures = UploadCache::new("flat-texture", FlatTextureOps { root });
        Self {
            opts,
            movies,
            sprites,
            shape_textures,
            flat_textures,
        }
    }

    /// Parsed movie for `path`, or `None` with a background load kicked off.
    pub fn movie(&self, path: &str) -> Option<Arc<Movie>> {
        let key: Arc<str> = Arc::from(path);
        if let Some(movie) = self.movies.get_or_none(&key) {
            return Some(movie);
        }
        self.movies.load_async(&key);
        None
    }

    /// Parsed movie for `path`, loading on the calling thread on a miss.
    pub fn movie_sync(&self, path: &str) -> SkelterResult<Arc<Movie>> {
        self.movies.load_sync(&Arc::from(path))
    }

    /// Compiled sprite timeline, or `None` with the missing stage (movie or
    /// compilation) kicked off in the background.
    pub fn sprite(&self, path: &str, id: CharacterId) -> Option<Arc<CompiledSprite>> {
        let path: Arc<str> = Arc::from(path);
        let key = (path.clone(), id);
        if let Some(sprite) = self.sprites.get_or_none(&key) {
            return Some(sprite);
        }
        // Compilation reads the parsed movie, so that has to land first.
        if self.movies.get_or_none(&path).is_none() {
            self.movies.load_async(&path);
            return None;
        }
        self.sprites.load_async(&key);
        None
    }

    pub fn sprite_sync(&self, path: &str, id: CharacterId) -> SkelterResult<Arc<CompiledSprite>> {
        let path: Arc<str> = Arc::from(path);
        self.movies.load_sync(&path)?;
        self.sprites.load_sync(&(path, id))
    }

    /// Rasterized texture for a shape character, or `None` with the missing
    /// stage kicked off in the background.
    pub fn shape_texture(&self, path: &str, id: CharacterId, quality: f64) -> Option<Texture> {
        let path: Arc<str> = Arc::from(path);
        let key = ShapeKey::new(path.clone(), id, quality);
        if let Some(texture) = self.shape_textures.get_or_none(&key) {
            return Some(texture);
        }
        if self.movies.get_or_none(&path).is_none() {
            self.movies.load_async(&path);
            return None;
        }
        self.shape_textures.load_async(&key);
        None
    }

    /// Device-thread variant of [`Self::shape_texture`]: decodes and uploads
    /// on the calling thread.
    pub fn shape_texture_sync(
        &self,
        path: &str,
        id: CharacterId,
        quality: f64,
        dev: &mut (dyn TextureDevice + 'static),
    ) -> SkelterResult<Texture> {
        let path: Arc<str> = Arc::from(path);
        self.movies.load_sync(&path)?;
        self.shape_textures
            .load_sync(&ShapeKey::new(path, id, quality), dev)
    }

    /// Flat image texture for `path`. Returns the placeholder until the real
    /// texture has been decoded and uploaded.
    pub fn texture(&self, path: &str) -> Texture {
        let key: Arc<str> = Arc::from(path);
        if let Some(texture) = self.flat_textures.get_or_none(&key) {
            return texture;
        }
        self.flat_textures.load_async(&key);
        Texture::placeholder()
    }

    pub fn texture_sync(
        &self,
        path: &str,
        dev: &mut (dyn TextureDevice + 'static),
    ) -> SkelterResult<Texture> {
        self.flat_textures.load_sync(&Arc::from(path), dev)
    }

    /// Per-frame device service: release deferred deletions, then upload at
    /// most the configured budget of freshly decoded textures per cache.
    /// Device thread only. Returns how many textures were stored.
    pub fn upload_frame_budget(&self, dev: &mut (dyn TextureDevice + 'static)) -> usize {
        let budget = self.opts.uploads_per_frame;
        self.shape_textures.upload(budget, dev) + self.flat_textures.upload(budget, dev)
    }

    /// Evict everything from all four caches. Safe from any thread: device
    /// resources are released by the next [`Self::upload_frame_budget`] on the
    /// device thread.
    pub fn clear_all(&self) {
        tracing::debug!("clearing all asset caches");
        self.movies.clear();
        self.sprites.clear();
        self.shape_textures.clear();
        self.flat_textures.clear();
    }

    /// Shape raster quality before any per-instance scale.
    pub fn raster_quality(&self) -> f64 {
        self.opts.raster_quality
    }
}

/// Resolve `path` under `root`, refusing absolute paths and `..` components
/// so assets cannot escape the root.
fn resolve_path(root: &Path, path: &str) -> SkelterResult<PathBuf> {
    let rel = Path::new(path);
    if rel.is_absolute() {
        return Err(SkelterError::validation(format!(
            "asset path {path:?} must be relative"
        )));
    }
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SkelterError::validation(format!(
            "asset path {path:?} may not contain '..'"
        )));
    }
    Ok(root.join(rel))
}

fn read_asset(root: &Path, path: &str) -> SkelterResult<Vec<u8>> {
    let full = resolve_path(root, path)?;
    let bytes =
        std::fs::read(&full).with_context(|| format!("read asset {}", full.display()))?;
    Ok(bytes)
}
