#![allow(clippy::float_cmp)]

use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let cfg = EngineConfig::default().validate().unwrap();
    assert_eq!(cfg.min_scale, DEFAULT_MIN_SCALE);
    assert_eq!(cfg.max_scale, DEFAULT_MAX_SCALE);
    assert_eq!(cfg.history_limit, DEFAULT_HISTORY_LIMIT);
}

#[test]
fn from_lookup_without_vars_uses_defaults() {
    let cfg = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg, EngineConfig::default());
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = EngineConfig::from_lookup(lookup_from(&[
        ("BOARD_MIN_SCALE", "0.25"),
        ("BOARD_MAX_SCALE", " 4 "),
        ("BOARD_CULL_PADDING", "64"),
        ("BOARD_HISTORY_LIMIT", "10"),
        ("BOARD_MIN_ENTITY_SIZE", "2"),
        ("BOARD_INK_MIN_LENGTH", "5"),
        ("BOARD_INK_PRESSURE_WIDTH", "1.5"),
    ]))
    .unwrap();
    assert_eq!(cfg.min_scale, 0.25);
    assert_eq!(cfg.max_scale, 4.0);
    assert_eq!(cfg.cull_padding_px, 64.0);
    assert_eq!(cfg.history_limit, 10);
    assert_eq!(cfg.min_entity_size, 2.0);
    assert_eq!(cfg.ink, InkConfig { min_length: 5.0, pressure_width: 1.5 });
}

#[test]
fn from_lookup_rejects_garbage() {
    let err = EngineConfig::from_lookup(lookup_from(&[("BOARD_HISTORY_LIMIT", "lots")])).unwrap_err();
    assert_eq!(err, ConfigError::Parse { var: "BOARD_HISTORY_LIMIT", value: "lots".into() });
}

#[test]
fn inverted_scale_range_rejected() {
    let err = EngineConfig::from_lookup(lookup_from(&[("BOARD_MIN_SCALE", "5"), ("BOARD_MAX_SCALE", "2")])).unwrap_err();
    assert!(matches!(err, ConfigError::ScaleRange { .. }));
}

#[test]
fn zero_min_scale_rejected() {
    let cfg = EngineConfig { min_scale: 0.0, ..EngineConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::ScaleRange { .. })));
}

#[test]
fn negative_padding_rejected() {
    let cfg = EngineConfig { cull_padding_px: -1.0, ..EngineConfig::default() };
    assert_eq!(
        cfg.validate().unwrap_err(),
        ConfigError::Negative { field: "cull_padding_px", value: -1.0 }
    );
}

#[test]
fn zero_history_rejected() {
    let cfg = EngineConfig { history_limit: 0, ..EngineConfig::default() };
    assert_eq!(cfg.validate().unwrap_err(), ConfigError::EmptyHistory);
}

#[test]
fn from_json_fills_missing_fields() {
    let cfg = EngineConfig::from_json(r#"{"max_scale": 8, "ink": {"min_length": 3}}"#).unwrap();
    assert_eq!(cfg.max_scale, 8.0);
    assert_eq!(cfg.min_scale, DEFAULT_MIN_SCALE);
    assert_eq!(cfg.ink.min_length, 3.0);
    assert_eq!(cfg.ink.pressure_width, DEFAULT_INK_PRESSURE_WIDTH);
}

#[test]
fn from_json_malformed_is_error() {
    assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Json(_))));
}

#[test]
fn clamp_scale_respects_range() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.clamp_scale(100.0), DEFAULT_MAX_SCALE);
    assert_eq!(cfg.clamp_scale(0.0), DEFAULT_MIN_SCALE);
    assert_eq!(cfg.clamp_scale(2.0), 2.0);
}
