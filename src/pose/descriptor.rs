use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::foundation::core::Tint;
use crate::foundation::error::{SkelterError, SkelterResult};
use crate::pose::tables::{BoneKind, SwapClass};

/// Everything the surrounding editor or game data says about one animated
/// character or prop. Immutable for the duration of a frame build.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Descriptor {
    /// Skeletal animation movie, relative to the loader root.
    pub movie: String,
    /// Pre-flattened variant: when set, animations resolve here as single
    /// sprites and the skeletal pass is skipped.
    #[serde(default)]
    pub flat_movie: Option<String>,
    #[serde(default = "default_anim_scale")]
    pub anim_scale: f64,
    #[serde(default)]
    pub tint: Tint,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Explicit per-bone symbol overrides, highest priority.
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    /// Swap classes the asymmetry table must not apply.
    #[serde(default)]
    pub disabled_swaps: HashSet<SwapClass>,
    /// Replacement art, scanned back to front; later entries win.
    #[serde(default)]
    pub custom_art: Vec<CustomArt>,
    #[serde(default)]
    pub use_right: Toggles,
}

fn default_anim_scale() -> f64 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            movie: String::new(),
            flat_movie: None,
            anim_scale: default_anim_scale(),
            tint: Tint::default(),
            opacity: default_opacity(),
            overrides: HashMap::new(),
            disabled_swaps: HashSet::new(),
            custom_art: Vec::new(),
            use_right: Toggles::default(),
        }
    }
}

impl Descriptor {
    /// Parse a descriptor from its JSON form.
    pub fn from_json_str(json: &str) -> SkelterResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SkelterError::validation(format!("parse descriptor JSON: {e}")))
    }
}

/// One replacement-art entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomArt {
    /// Bone kinds this art applies to; empty matches every kind.
    #[serde(default)]
    pub kinds: Vec<BoneKind>,
    /// Restrict to mirrored (`true`) or unmirrored (`false`) bones.
    #[serde(default)]
    pub mirrored: Option<bool>,
    /// Movie file the art lives in, relative to the loader root.
    pub path: String,
    /// Exported symbol name inside that movie.
    pub symbol: String,
}

/// The "use right X" switches. Each armed switch is a single token consumed
/// by the first bone of the matching kind in a frame build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggles {
    #[serde(default)]
    pub torso: bool,
    #[serde(default)]
    pub jaw: bool,
    #[serde(default)]
    pub eye: bool,
    #[serde(default)]
    pub mouth: bool,
    #[serde(default)]
    pub hair: bool,
    #[serde(default)]
    pub gauntlet: bool,
    #[serde(default)]
    pub katar: bool,
    #[serde(default)]
    pub forearm: bool,
    #[serde(default)]
    pub shoulder: bool,
    #[serde(default)]
    pub leg: bool,
    #[serde(default)]
    pub shin: bool,
    #[serde(default)]
    pub hand: bool,
}

impl Toggles {
    /// Consume the token for `kind`, reporting whether it was armed.
    pub(crate) fn take(&mut self, kind: BoneKind) -> bool {
        let slot = match kind {
            BoneKind::Torso => &mut self.torso,
            BoneKind::Jaw => &mut self.jaw,
            BoneKind::Eye => &mut self.eye,
            BoneKind::Mouth => &mut self.mouth,
            BoneKind::Hair => &mut self.hair,
            BoneKind::Gauntlet => &mut self.gauntlet,
            BoneKind::Katar => &mut self.katar,
            BoneKind::Forearm => &mut self.forearm,
            BoneKind::Shoulder => &mut self.shoulder,
            BoneKind::Leg => &mut self.leg,
            BoneKind::Shin => &mut self.shin,
            BoneKind::Hand => &mut self.hand,
            BoneKind::Generic => return false,
        };
        std::mem::take(slot)
    }
}
