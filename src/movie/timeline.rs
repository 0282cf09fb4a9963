use std::collections::BTreeMap;

use crate::foundation::core::{Affine, CharacterId, Depth};
use crate::movie::parse::{ControlTag, SpriteDef};

/// One placed character on a compiled frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub character: CharacterId,
    pub matrix: Affine,
    /// Frames elapsed since this layer was (re)placed; the child's own
    /// playback position when the parent displays this frame.
    pub frame_offset: u32,
}

/// Depth-ordered layers visible on one frame. Iteration order is draw order,
/// back to front.
pub type Frame = BTreeMap<Depth, Layer>;

/// Fully unrolled sprite timeline.
#[derive(Clone, Debug, Default)]
pub struct CompiledSprite {
    pub frames: Vec<Frame>,
}

impl CompiledSprite {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Unroll a sprite's control stream into per-frame layer maps.
///
/// One mutable working frame is scanned forward and snapshotted at every
/// `ShowFrame`, so a definition with f ShowFrames compiles to exactly f
/// frames. Mutations after the last ShowFrame describe a state no frame ever
/// displays and are discarded.
pub fn compile(def: &SpriteDef) -> CompiledSprite {
    let mut frames = Vec::with_capacity(usize::from(def.declared_frames));
    let mut current: Frame = BTreeMap::new();
    for tag in &def.control {
        match tag {
            ControlTag::Place {
                depth,
                character,
                matrix,
            } => match current.get_mut(depth) {
                Some(layer) => {
                    // Partial update: only the provided pieces change, but any
                    // placement restarts the child's clock.
                    if let Some(id) = character {
                        layer.character = *id;
                    }
                    if let Some(m) = matrix {
                        layer.matrix = *m;
                    }
                    layer.frame_offset = 0;
                }
                None => {
                    // An update aimed at an empty depth has nothing to modify.
                    let Some(id) = character else { continue };
                    current.insert(
                        *depth,
                        Layer {
                            character: *id,
                            matrix: matrix.unwrap_or(Affine::IDENTITY),
                            frame_offset: 0,
                        },
                    );
                }
            },
            ControlTag::Remove { depth } => {
                current.remove(depth);
            }
            ControlTag::ShowFrame => {
                frames.push(current.clone());
                for layer in current.values_mut() {
                    layer.frame_offset += 1;
                }
            }
        }
    }
    CompiledSprite { frames }
}

#[cfg(test)]
#[path = "../../tests/unit/movie/timeline.rs"]
mod tests;
