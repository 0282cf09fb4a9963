use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{SkelterError, SkelterResult};

/// Behavioral class of a bone, keyed off its base name.
///
/// The paired kinds participate in mirroring, hand pairing, and the
/// "use right" toggles; everything else is `Generic` and gets none of that.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoneKind {
    Torso,
    Jaw,
    Eye,
    Mouth,
    Hair,
    Gauntlet,
    Katar,
    Forearm,
    Shoulder,
    Leg,
    Shin,
    Hand,
    #[default]
    Generic,
}

/// Static behavior flags for one bone name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneMeta {
    #[serde(default)]
    pub kind: BoneKind,
    /// Whether a negative layer-matrix determinant flips this bone.
    #[serde(default)]
    pub mirror_sensitive: bool,
    /// Art authored facing the mirrored way; inverts the determinant test.
    #[serde(default)]
    pub default_flipped: bool,
}

/// Group tag for asymmetry swaps, so a descriptor can disable a whole family
/// of swaps (all arm swaps, all leg swaps) at once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapClass(pub String);

impl SwapClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SwapEntry {
    mirrored: String,
    class: SwapClass,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct HiddenRule {
    kind: BoneKind,
    suffix: String,
}

/// Read-only skeleton data: bone names by id, per-name behavior, asymmetry
/// swaps, and the always-hidden variant rules. Loaded once by the host.
#[derive(Clone, Debug, Default)]
pub struct BoneTable {
    /// Bone ids are 1-indexed timeline depths; `names[0]` is bone 1.
    names: Vec<String>,
    meta: HashMap<String, BoneMeta>,
    swaps: HashMap<String, SwapEntry>,
    hidden: Vec<HiddenRule>,
}

#[derive(Deserialize)]
struct BoneTableDef {
    bones: Vec<String>,
    #[serde(default)]
    meta: HashMap<String, BoneMeta>,
    #[serde(default)]
    swaps: HashMap<String, SwapEntry>,
    #[serde(default)]
    hidden: Vec<HiddenRule>,
}

impl BoneTable {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            meta: HashMap::new(),
            swaps: HashMap::new(),
            hidden: Vec::new(),
        }
    }

    /// Parse a bone table from its JSON form.
    pub fn from_json_str(json: &str) -> SkelterResult<Self> {
        let def: BoneTableDef = serde_json::from_str(json)
            .map_err(|e| SkelterError::validation(format!("parse bone table JSON: {e}")))?;
        Ok(Self {
            names: def.bones,
            meta: def.meta,
            swaps: def.swaps,
            hidden: def.hidden,
        })
    }

    /// Parse a bone table from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> SkelterResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            SkelterError::validation(format!("open bone table '{}': {e}", path.display()))
        })?;
        let def: BoneTableDef = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| SkelterError::validation(format!("parse bone table JSON: {e}")))?;
        Ok(Self {
            names: def.bones,
            meta: def.meta,
            swaps: def.swaps,
            hidden: def.hidden,
        })
    }

    pub fn set_meta(&mut self, name: impl Into<String>, meta: BoneMeta) {
        self.meta.insert(name.into(), meta);
    }

    pub fn set_swap(
        &mut self,
        name: impl Into<String>,
        mirrored: impl Into<String>,
        class: SwapClass,
    ) {
        self.swaps.insert(
            name.into(),
            SwapEntry {
                mirrored: mirrored.into(),
                class,
            },
        );
    }

    pub fn add_hidden_rule(&mut self, kind: BoneKind, suffix: impl Into<String>) {
        self.hidden.push(HiddenRule {
            kind,
            suffix: suffix.into(),
        });
    }

    /// Bone name for a 1-indexed bone id (a timeline depth). Ids outside the
    /// table are not bones.
    pub fn name(&self, id: u16) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.names.get(usize::from(id) - 1).map(String::as_str)
    }

    /// Behavior for a bone name; names without an entry are plain `Generic`.
    pub fn meta(&self, name: &str) -> BoneMeta {
        self.meta.get(name).copied().unwrap_or_default()
    }

    /// Asymmetry swap for a name: the mirrored counterpart and its class.
    pub fn swap(&self, name: &str) -> Option<(&str, &SwapClass)> {
        self.swaps
            .get(name)
            .map(|entry| (entry.mirrored.as_str(), &entry.class))
    }

    /// Whether `name` is a bookkeeping variant of `kind` that is never drawn.
    pub fn is_hidden_variant(&self, kind: BoneKind, name: &str) -> bool {
        self.hidden
            .iter()
            .any(|rule| rule.kind == kind && name.ends_with(&rule.suffix))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pose/tables.rs"]
mod tests;
