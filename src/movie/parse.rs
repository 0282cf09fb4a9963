use std::collections::HashMap;

use crate::foundation::core::{Affine, CharacterId, Depth};
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::movie::shape::{ShapeDef, parse_define_shape};
use crate::movie::tags::{self, Reader};

/// One control instruction on a sprite timeline, in stream order.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlTag {
    /// Place or update the layer at `depth`. Absent pieces of an update keep
    /// their previous value.
    Place {
        depth: Depth,
        character: Option<CharacterId>,
        matrix: Option<Affine>,
    },
    /// Clear the layer at `depth`.
    Remove { depth: Depth },
    /// Commit the current layer state as one displayed frame.
    ShowFrame,
}

/// Sprite definition: a raw timeline, unrolled later by
/// [`crate::movie::timeline::compile`].
#[derive(Clone, Debug)]
pub struct SpriteDef {
    pub id: CharacterId,
    /// Frame count declared in the file; the compiled frame list is
    /// authoritative.
    pub declared_frames: u16,
    pub control: Vec<ControlTag>,
}

/// A parsed container: the exported symbol table plus shape and sprite
/// definitions indexed by id.
#[derive(Clone, Debug, Default)]
pub struct Movie {
    symbols: HashMap<String, CharacterId>,
    shapes: HashMap<CharacterId, ShapeDef>,
    sprites: HashMap<CharacterId, SpriteDef>,
}

impl Movie {
    /// Decode a container from bytes. Pure; does no I/O.
    ///
    /// The tag stream is walked once, then indexed in two passes: first the
    /// symbol table (a container that exports no names can never be used, so
    /// its absence is fatal), then the definitions. Unknown tags and the root
    /// timeline's own control tags are skipped. Duplicate definition ids and
    /// duplicate exported names both resolve to the last occurrence.
    pub fn parse(bytes: &[u8]) -> SkelterResult<Self> {
        let mut r = Reader::new(bytes);
        let signature = r.take(3)?;
        match signature {
            b"FWS" => {}
            b"CWS" | b"ZWS" => {
                return Err(SkelterError::parse(format!(
                    "compressed container signature {:?} is outside the supported profile",
                    String::from_utf8_lossy(signature)
                )));
            }
            _ => {
                return Err(SkelterError::parse(
                    "not a vector-animation container (bad signature)",
                ));
            }
        }
        let _version = r.read_u8()?;
        let _file_length = r.read_u32()?;
        let _stage = tags::read_rect(&mut r)?;
        let _frame_rate = r.read_u16()?;
        let _frame_count = r.read_u16()?;

        let mut top = Vec::new();
        while !r.is_empty() {
            let (code, body) = tags::read_tag(&mut r)?;
            if code == tags::TAG_END {
                break;
            }
            top.push((code, body));
        }

        let mut symbols = HashMap::new();
        let mut saw_table = false;
        for (code, body) in &top {
            if *code == tags::TAG_SYMBOL_CLASS {
                saw_table = true;
                read_symbol_class(body, &mut symbols)?;
            }
        }
        if !saw_table {
            return Err(SkelterError::MissingSymbolTable);
        }

        let mut shapes = HashMap::new();
        let mut sprites = HashMap::new();
        for (code, body) in &top {
            let shape_version = match *code {
                tags::TAG_DEFINE_SHAPE => Some(1),
                tags::TAG_DEFINE_SHAPE2 => Some(2),
                tags::TAG_DEFINE_SHAPE3 => Some(3),
                tags::TAG_DEFINE_SHAPE4 => Some(4),
                _ => None,
            };
            if let Some(version) = shape_version {
                let shape = parse_define_shape(body, version)?;
                shapes.insert(shape.id, shape);
            } else if *code == tags::TAG_DEFINE_SPRITE {
                let sprite = parse_define_sprite(body)?;
                sprites.insert(sprite.id, sprite);
            }
        }

        tracing::debug!(
            symbols = symbols.len(),
            shapes = shapes.len(),
            sprites = sprites.len(),
            "parsed container"
        );
        Ok(Self {
            symbols,
            shapes,
            sprites,
        })
    }

    /// Resolve an exported name to its definition id.
    pub fn character(&self, name: &str) -> Option<CharacterId> {
        self.symbols.get(name).copied()
    }

    pub fn shape(&self, id: CharacterId) -> Option<&ShapeDef> {
        self.shapes.get(&id)
    }

    pub fn sprite(&self, id: CharacterId) -> Option<&SpriteDef> {
        self.sprites.get(&id)
    }

    /// Exported names and their ids, in no particular order.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, CharacterId)> {
        self.symbols.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

fn read_symbol_class(
    body: &[u8],
    symbols: &mut HashMap<String, CharacterId>,
) -> SkelterResult<()> {
    let mut r = Reader::new(body);
    let count = r.read_u16()?;
    for _ in 0..count {
        let id = CharacterId(r.read_u16()?);
        let name = r.read_cstring()?;
        symbols.insert(name, id);
    }
    Ok(())
}

fn parse_define_sprite(body: &[u8]) -> SkelterResult<SpriteDef> {
    let mut r = Reader::new(body);
    let id = CharacterId(r.read_u16()?);
    let declared_frames = r.read_u16()?;
    let mut control = Vec::new();
    while !r.is_empty() {
        let (code, tag_body) = tags::read_tag(&mut r)?;
        match code {
            tags::TAG_END => break,
            tags::TAG_SHOW_FRAME => control.push(ControlTag::ShowFrame),
            tags::TAG_PLACE_OBJECT2 => control.push(read_place(tag_body)?),
            tags::TAG_REMOVE_OBJECT2 => control.push(read_remove(tag_body)?),
            _ => {}
        }
    }
    Ok(SpriteDef {
        id,
        declared_frames,
        control,
    })
}

fn read_place(body: &[u8]) -> SkelterResult<ControlTag> {
    let mut r = Reader::new(body);
    let flags = r.read_u8()?;
    let depth = Depth(r.read_u16()?);
    let character = if flags & 0x02 != 0 {
        Some(CharacterId(r.read_u16()?))
    } else {
        None
    };
    let matrix = if flags & 0x04 != 0 {
        Some(tags::read_matrix(&mut r)?)
    } else {
        None
    };
    // Color transforms, ratios, clip depths and names follow in the body but
    // are not part of the profile; the rest of the slice is ignored.
    Ok(ControlTag::Place {
        depth,
        character,
        matrix,
    })
}

fn read_remove(body: &[u8]) -> SkelterResult<ControlTag> {
    let mut r = Reader::new(body);
    let depth = Depth(r.read_u16()?);
    Ok(ControlTag::Remove { depth })
}

#[cfg(test)]
#[path = "../../tests/unit/movie/parse.rs"]
mod tests;
