use super::*;

#[test]
fn default_config_validates() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn unknown_keys_are_ignored() {
    let cfg = Config::parse_from_string(r#"{"totallyUnknown": 42, "enabled": false}"#).unwrap();
    assert!(!cfg.enabled);
}

#[test]
fn out_of_range_values_snap_to_default() {
    let cfg = Config::parse_from_string(r#"{"mainPaneSize": 19}"#).unwrap();
    assert_eq!(cfg.main_pane_size, 60);
    let cfg = Config::parse_from_string(r#"{"mainPaneSize": 81}"#).unwrap();
    assert_eq!(cfg.main_pane_size, 60);
}

#[test]
fn boundary_values_are_preserved() {
    let cfg = Config::parse_from_string(r#"{"mainPaneSize": 20}"#).unwrap();
    assert_eq!(cfg.main_pane_size, 20);
    let cfg = Config::parse_from_string(r#"{"mainPaneSize": 80}"#).unwrap();
    assert_eq!(cfg.main_pane_size, 80);
}

#[test]
fn invalid_layout_is_rejected_in_favor_of_default() {
    let cfg = Config::parse_from_string(r#"{"layout": "not-a-real-layout"}"#).unwrap();
    assert_eq!(cfg.layout, "main-vertical");
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert!(Config::parse_from_string("{not json").is_err());
}

#[test]
fn load_from_directory_falls_back_to_defaults_when_nothing_found() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::load_from_directory(dir.path());
    assert_eq!(cfg, Config::default());
}

#[test]
fn load_from_directory_prefers_primary_over_legacy_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("opentmux.json"), r#"{"enabled": false}"#).unwrap();
    std::fs::write(
        dir.path().join("opencode-agent-tmux.json"),
        r#"{"enabled": true}"#,
    )
    .unwrap();
    let cfg = Config::load_from_directory(dir.path());
    assert!(!cfg.enabled);
}

proptest::proptest! {
    #[test]
    fn main_pane_size_always_in_range_after_normalize(raw in -100i64..200) {
        let raw_cfg = RawConfig {
            main_pane_size: u32::try_from(raw).ok(),
            ..Default::default()
        };
        let cfg = Config::default().merge(raw_cfg);
        proptest::prop_assert!(cfg.main_pane_size >= 20 && cfg.main_pane_size <= 80);
    }

    #[test]
    fn layout_never_empty_after_normalize(s in "\\PC*") {
        let raw_cfg = RawConfig {
            layout: Some(s),
            ..Default::default()
        };
        let cfg = Config::default().merge(raw_cfg);
        proptest::prop_assert!(!cfg.layout.is_empty());
    }
}
