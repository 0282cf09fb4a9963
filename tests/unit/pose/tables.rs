use super::*;

#[test]
fn bone_ids_are_one_indexed() {
    let table = BoneTable::new(vec!["torso".into(), "head".into()]);
    assert_eq!(table.name(0), None);
    assert_eq!(table.name(1), Some("torso"));
    assert_eq!(table.name(2), Some("head"));
    assert_eq!(table.name(3), None);
    assert_eq!(table.len(), 2);
    assert!(!table.is_empty());
}

#[test]
fn unknown_names_default_to_generic() {
    let mut table = BoneTable::new(vec!["arm_l".into()]);
    table.set_meta(
        "arm_l",
        BoneMeta {
            kind: BoneKind::Forearm,
            mirror_sensitive: true,
            default_flipped: false,
        },
    );
    assert_eq!(table.meta("arm_l").kind, BoneKind::Forearm);
    assert!(table.meta("arm_l").mirror_sensitive);

    let fallback = table.meta("never-registered");
    assert_eq!(fallback.kind, BoneKind::Generic);
    assert!(!fallback.mirror_sensitive);
    assert!(!fallback.default_flipped);
}

#[test]
fn swaps_carry_their_class() {
    let mut table = BoneTable::new(Vec::new());
    table.set_swap("arm_l", "arm_r", SwapClass::new("arms"));
    let (mirrored, class) = table.swap("arm_l").unwrap();
    assert_eq!(mirrored, "arm_r");
    assert_eq!(class, &SwapClass::new("arms"));
    // Swaps are directional; the counterpart has no entry of its own here.
    assert!(table.swap("arm_r").is_none());
}

#[test]
fn hidden_variants_match_kind_and_suffix() {
    let mut table = BoneTable::new(Vec::new());
    table.add_hidden_rule(BoneKind::Hand, "_rest");
    assert!(table.is_hidden_variant(BoneKind::Hand, "hand_l_rest"));
    assert!(!table.is_hidden_variant(BoneKind::Hand, "hand_l"));
    // The suffix alone is not enough; the kind must match too.
    assert!(!table.is_hidden_variant(BoneKind::Forearm, "arm_l_rest"));
}

#[test]
fn json_form_fills_in_defaults() {
    let table = BoneTable::from_json_str(
        r#"{
            "bones": ["torso", "hand_l"],
            "meta": {
                "hand_l": { "kind": "hand", "mirror_sensitive": true }
            },
            "swaps": {
                "hand_l": { "mirrored": "hand_r", "class": "hands" }
            },
            "hidden": [
                { "kind": "hand", "suffix": "_rest" }
            ]
        }"#,
    )
    .unwrap();

    assert_eq!(table.name(2), Some("hand_l"));
    let meta = table.meta("hand_l");
    assert_eq!(meta.kind, BoneKind::Hand);
    assert!(meta.mirror_sensitive);
    assert!(!meta.default_flipped); // omitted field takes the default

    let (mirrored, class) = table.swap("hand_l").unwrap();
    assert_eq!(mirrored, "hand_r");
    assert_eq!(class.0, "hands");
    assert!(table.is_hidden_variant(BoneKind::Hand, "hand_l_rest"));
}

#[test]
fn json_sections_other_than_bones_are_optional() {
    let table = BoneTable::from_json_str(r#"{ "bones": ["torso"] }"#).unwrap();
    assert_eq!(table.name(1), Some("torso"));
    assert_eq!(table.meta("torso").kind, BoneKind::Generic);
}

#[test]
fn malformed_json_is_a_validation_error() {
    let err = BoneTable::from_json_str("{").unwrap_err();
    assert!(err.to_string().contains("bone table"));
}

#[test]
fn from_path_reads_a_json_file() {
    let tmp = std::env::temp_dir().join(format!(
        "skelter-bone-table-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos(),
    ));
    std::fs::create_dir_all(&tmp).unwrap();
    let path = tmp.join("bones.json");
    std::fs::write(&path, r#"{ "bones": ["torso", "head"] }"#).unwrap();

    let table = BoneTable::from_path(&path).unwrap();
    assert_eq!(table.name(2), Some("head"));

    assert!(BoneTable::from_path(tmp.join("missing.json")).is_err());
    std::fs::remove_dir_all(&tmp).ok();
}
