use super::*;

#[test]
fn empty_json_yields_defaults() {
    let opts = EngineOpts::from_json_str("{}").unwrap();
    assert_eq!(opts, EngineOpts::default());
    assert!(opts.trimap);
    assert_eq!(opts.project_format.width, 1920);
    assert_eq!(opts.memory_pressure.granularity, PressureGranularity::FullWindow);
}

#[test]
fn partial_json_overrides_fields() {
    let opts = EngineOpts::from_json_str(
        r#"{
            "threads": 2,
            "trimap": false,
            "project_format": { "width": 640, "height": 480 },
            "memory_pressure": { "granularity": "missing_rects" },
            "cache": { "capacity_bytes": 4096 }
        }"#,
    )
    .unwrap();
    assert_eq!(opts.threads, Some(2));
    assert!(!opts.trimap);
    assert_eq!(opts.project_format.pixel_aspect, 1.0);
    assert!(opts.memory_pressure.enabled);
    assert_eq!(
        opts.memory_pressure.granularity,
        PressureGranularity::MissingRects
    );
    assert_eq!(opts.cache.capacity_bytes, 4096);
    assert_eq!(opts.cache.near_full_ratio, 0.9);
}

#[test]
fn unknown_fields_and_bad_values_are_config_errors() {
    assert!(matches!(
        EngineOpts::from_json_str(r#"{ "thread": 2 }"#),
        Err(FxError::Config(_))
    ));
    assert!(matches!(
        EngineOpts::from_json_str(r#"{ "threads": 0 }"#),
        Err(FxError::Config(_))
    ));
    assert!(matches!(
        EngineOpts::from_json_str(r#"{ "cache": { "near_full_ratio": 1.5 } }"#),
        Err(FxError::Config(_))
    ));
    assert!(matches!(
        EngineOpts::from_json_str(r#"{ "max_recursion_depth": 0 }"#),
        Err(FxError::Config(_))
    ));
}
