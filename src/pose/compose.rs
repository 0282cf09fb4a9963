use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::assets::device::Texture;
use crate::assets::loader::AssetLoader;
use crate::foundation::core::{Affine, CharacterId, Depth, Tint, Vec2, linear_det};
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::movie::parse::Movie;
use crate::movie::timeline::Layer;
use crate::pose::descriptor::Descriptor;
use crate::pose::tables::{BoneKind, BoneTable};

/// Placement recursion cap; a cycle in authored data stops here.
const MAX_DEPTH: u32 = 32;

/// Host-assigned identity for one drawn object, keying its draw offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

/// One textured quad for the host renderer. The transform maps texture
/// pixels into the caller's coordinate space.
#[derive(Clone, Debug)]
pub struct DrawableSprite {
    pub texture: Texture,
    pub transform: Affine,
    pub tint: Tint,
    pub opacity: f32,
}

/// Flattens one skeleton frame into an ordered back-to-front draw list.
///
/// Holds the static bone table and the per-instance draw offsets the host
/// registers up front; everything else is scoped to a single
/// [`Compositor::build_frame`] call.
pub struct Compositor {
    loader: AssetLoader,
    table: Arc<BoneTable>,
    offsets: HashMap<InstanceId, Vec2>,
}

/// Call-constant drawing parameters threaded through the recursion.
struct DrawCtx {
    tint: Tint,
    opacity: f32,
    quality: f64,
}

enum BoneArt {
    /// A layer whose depth is outside the bone table; its placed character
    /// draws as-is.
    Direct(CharacterId),
    /// A bone, drawing a resolved symbol from the descriptor movie
    /// (`source` = `None`) or a custom-art file.
    Symbol { source: Option<String>, name: String },
}

struct BoneInstance {
    kind: BoneKind,
    mirrored: bool,
    visible: bool,
    hidden_variant: bool,
    art: BoneArt,
    matrix: Affine,
    frame_offset: u32,
}

/// Tracks alternating hand bones within one frame. The second hand of a pair
/// repeats the first's resolved name and must not draw again.
#[derive(Default)]
struct HandTracker {
    prev: Option<String>,
}

impl HandTracker {
    /// Whether `name` repeats the previous hand. A match consumes the pair;
    /// a miss starts a new one.
    fn is_other_hand(&mut self, name: &str) -> bool {
        match self.prev.take() {
            Some(prev) if prev == name => true,
            _ => {
                self.prev = Some(name.to_owned());
                false
            }
        }
    }
}

impl Compositor {
    pub fn new(loader: AssetLoader, table: Arc<BoneTable>) -> Self {
        Self {
            loader,
            table,
            offsets: HashMap::new(),
        }
    }

    /// Register the draw offset for an instance. Building a frame for an
    /// instance that was never registered fails.
    pub fn register_instance(&mut self, id: InstanceId, offset: Vec2) {
        self.offsets.insert(id, offset);
    }

    pub fn clear_instances(&mut self) {
        self.offsets.clear();
    }

    /// Shared handle to the loader this compositor resolves assets through.
    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    /// Flatten `animation` at `frame` into a draw list.
    ///
    /// Assets still decoding contribute nothing this call; polling again a
    /// few frames later fills them in. With `loop_limit >= 0` the animation
    /// ends (empty list) once `|frame|` reaches `loop_limit` times its frame
    /// count; a negative limit loops forever.
    #[tracing::instrument(skip(self, desc, base))]
    pub fn build_frame(
        &self,
        instance: InstanceId,
        desc: &Descriptor,
        animation: &str,
        frame: i64,
        base: Affine,
        loop_limit: i32,
    ) -> SkelterResult<Vec<DrawableSprite>> {
        let offset = *self.offsets.get(&instance).ok_or_else(|| {
            SkelterError::validation(format!(
                "instance {instance:?} was never registered with the compositor"
            ))
        })?;
        let root = base * Affine::translate(offset) * Affine::scale(desc.anim_scale);
        let ctx = DrawCtx {
            tint: desc.tint,
            opacity: desc.opacity,
            quality: desc.anim_scale * self.loader.raster_quality(),
        };

        if let Some(flat) = &desc.flat_movie {
            return self.build_flat(&ctx, flat, animation, frame, root, loop_limit);
        }

        let path = desc.movie.as_str();
        let Some(movie) = self.loader.movie(path) else {
            return Ok(Vec::new());
        };
        let id = movie.character(animation).ok_or_else(|| {
            SkelterError::compose(format!(
                "animation {animation:?} is not exported by {path:?}"
            ))
        })?;
        if movie.sprite(id).is_none() {
            return Err(SkelterError::compose(format!(
                "animation {animation:?} in {path:?} does not name a sprite"
            )));
        }
        let Some(compiled) = self.loader.sprite(path, id) else {
            return Ok(Vec::new());
        };
        let count = compiled.frame_count();
        if count == 0 || past_loop_limit(frame, count, loop_limit) {
            return Ok(Vec::new());
        }
        let selected = frame.rem_euclid(count as i64) as usize;

        let global_mirror = linear_det(root) < 0.0;
        let mut hands = HandTracker::default();
        let mut bones: SmallVec<[BoneInstance; 16]> = SmallVec::new();
        for (&depth, layer) in &compiled.frames[selected] {
            bones.push(self.resolve_bone(desc, depth, layer, &mut hands));
        }

        // Toggle pass. Each armed switch is one token, consumed by the first
        // bone of its kind; every member of the fired pair re-derives
        // visibility from the mirror test, so exactly the opposite side of
        // the default shows.
        let mut toggles = desc.use_right;
        let mut fired: SmallVec<[(String, BoneKind); 4]> = SmallVec::new();
        for bone in &mut bones {
            let BoneArt::Symbol { name, .. } = &bone.art else {
                continue;
            };
            if fired.iter().any(|(n, k)| n == name && *k == bone.kind) {
                bone.visible = bone.mirrored != global_mirror;
            } else if toggles.take(bone.kind) {
                fired.push((name.clone(), bone.kind));
                bone.visible = bone.mirrored != global_mirror;
            }
        }

        let mut out = Vec::new();
        for bone in &bones {
            if !bone.visible || bone.hidden_variant {
                continue;
            }
            let transform = root * bone.matrix;
            let child_frame = frame + i64::from(bone.frame_offset);
            match &bone.art {
                BoneArt::Direct(id) => {
                    self.draw_character(&ctx, &mut out, path, &movie, *id, transform, child_frame, 0);
                }
                BoneArt::Symbol { source, name } => {
                    let src = source.as_deref().unwrap_or(path);
                    let Some(src_movie) = self.loader.movie(src) else {
                        continue;
                    };
                    let Some(id) = src_movie.character(name) else {
                        tracing::debug!(bone = %name, movie = %src, "resolved symbol missing, bone skipped");
                        continue;
                    };
                    self.draw_character(
                        &ctx,
                        &mut out,
                        src,
                        &src_movie,
                        id,
                        transform,
                        child_frame,
                        0,
                    );
                }
            }
        }
        Ok(out)
    }

    /// Pre-flattened variant: the whole animation is one sprite subtree at
    /// the root transform, no bone logic.
    fn build_flat(
        &self,
        ctx: &DrawCtx,
        path: &str,
        animation: &str,
        frame: i64,
        root: Affine,
        loop_limit: i32,
    ) -> SkelterResult<Vec<DrawableSprite>> {
        let Some(movie) = self.loader.movie(path) else {
            return Ok(Vec::new());
        };
        let id = movie.character(animation).ok_or_else(|| {
            SkelterError::compose(format!(
                "animation {animation:?} is not exported by {path:?}"
            ))
        })?;
        if movie.sprite(id).is_some() {
            let Some(compiled) = self.loader.sprite(path, id) else {
                return Ok(Vec::new());
            };
            if past_loop_limit(frame, compiled.frame_count(), loop_limit) {
                return Ok(Vec::new());
            }
        }
        let mut out = Vec::new();
        self.draw_character(ctx, &mut out, path, &movie, id, root, frame, 0);
        Ok(out)
    }

    /// Resolve one timeline layer of the selected frame into a bone.
    fn resolve_bone(
        &self,
        desc: &Descriptor,
        depth: Depth,
        layer: &Layer,
        hands: &mut HandTracker,
    ) -> BoneInstance {
        let Some(base) = self.table.name(depth.0) else {
            // Not a bone: a decoration layer the rig placed directly.
            return BoneInstance {
                kind: BoneKind::Generic,
                mirrored: false,
                visible: true,
                hidden_variant: false,
                art: BoneArt::Direct(layer.character),
                matrix: layer.matrix,
                frame_offset: layer.frame_offset,
            };
        };
        let meta = self.table.meta(base);
        let mirrored =
            meta.mirror_sensitive && ((linear_det(layer.matrix) < 0.0) != meta.default_flipped);

        let mut name = if let Some(over) = desc.overrides.get(base) {
            over.clone()
        } else if mirrored {
            match self.table.swap(base) {
                Some((swapped, class)) if !desc.disabled_swaps.contains(class) => {
                    swapped.to_owned()
                }
                _ => base.to_owned(),
            }
        } else {
            base.to_owned()
        };

        let mut visible = true;
        if meta.kind == BoneKind::Hand && hands.is_other_hand(&name) {
            visible = false;
        }

        // Custom art, newest entry first. An entry whose file is loaded but
        // lacks the symbol falls through to older entries; one whose file is
        // still loading is taken as-is so the request stays hot.
        let mut source = None;
        for art in desc.custom_art.iter().rev() {
            if !art.kinds.is_empty() && !art.kinds.contains(&meta.kind) {
                continue;
            }
            if art.mirrored.is_some_and(|m| m != mirrored) {
                continue;
            }
            match self.loader.movie(&art.path) {
                Some(art_movie) => {
                    if art_movie.character(&art.symbol).is_some() {
                        source = Some(art.path.clone());
                        name = art.symbol.clone();
                        break;
                    }
                }
                None => {
                    source = Some(art.path.clone());
                    name = art.symbol.clone();
                    break;
                }
            }
        }

        BoneInstance {
            kind: meta.kind,
            mirrored,
            visible,
            hidden_variant: self.table.is_hidden_variant(meta.kind, base),
            art: BoneArt::Symbol { source, name },
            matrix: layer.matrix,
            frame_offset: layer.frame_offset,
        }
    }

    /// Draw one placed character: a shape becomes a single drawable, a
    /// nested sprite recurses through its own selected frame. Pending assets
    /// draw nothing; the accessors have already queued their loads.
    #[allow(clippy::too_many_arguments)]
    fn draw_character(
        &self,
        ctx: &DrawCtx,
        out: &mut Vec<DrawableSprite>,
        path: &str,
        movie: &Movie,
        id: CharacterId,
        transform: Affine,
        frame: i64,
        depth: u32,
    ) {
        if depth >= MAX_DEPTH {
            tracing::warn!(character = ?id, "placement recursion too deep, dropping subtree");
            return;
        }
        if movie.shape(id).is_some() {
            let Some(texture) = self.loader.shape_texture(path, id, ctx.quality) else {
                return;
            };
            out.push(DrawableSprite {
                texture,
                transform: transform * texture.to_local(),
                tint: ctx.tint,
                opacity: ctx.opacity,
            });
        } else if movie.sprite(id).is_some() {
            let Some(compiled) = self.loader.sprite(path, id) else {
                return;
            };
            let count = compiled.frame_count();
            if count == 0 {
                return;
            }
            let selected = frame.rem_euclid(count as i64) as usize;
            for layer in compiled.frames[selected].values() {
                self.draw_character(
                    ctx,
                    out,
                    path,
                    movie,
                    layer.character,
                    transform * layer.matrix,
                    frame + i64::from(layer.frame_offset),
                    depth + 1,
                );
            }
        } else {
            tracing::debug!(character = ?id, "placed character has no definition");
        }
    }
}

/// Whether a non-looping animation is past its end.
fn past_loop_limit(frame: i64, frame_count: usize, loop_limit: i32) -> bool {
    if loop_limit < 0 {
        return false;
    }
    frame.unsigned_abs() >= loop_limit as u64 * frame_count as u64
}

#[cfg(test)]
#[path = "../../tests/unit/pose/compose.rs"]
mod tests;
