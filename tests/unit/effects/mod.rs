use super::*;

use serde_json::json;

#[test]
fn parses_known_kinds_with_defaults() {
    for kind in ["checkerboard", "gain", "translate", "dot", " Gain "] {
        assert!(parse_effect(kind, &serde_json::Value::Null).is_ok(), "{kind}");
    }
    let t = parse_effect("translate", &json!({ "dx": 4.0, "dy": -2.0 })).unwrap();
    assert!(t.capabilities().can_transform);
    assert_eq!(t.plugin_id(), "pullfx.translate");
}

#[test]
fn rejects_bad_params() {
    assert!(matches!(
        parse_effect("", &serde_json::Value::Null),
        Err(FxError::Validation(_))
    ));
    assert!(parse_effect("blur", &serde_json::Value::Null).is_err());
    assert!(parse_effect("gain", &json!([1.0])).is_err());
    assert!(parse_effect("gain", &json!({ "gain": "loud" })).is_err());
    assert!(parse_effect("checkerboard", &json!({ "size": 0.0 })).is_err());
}

#[test]
fn missing_channels_read_as_opaque_black() {
    let rgb = ImageComponents::rgb();
    let px = [0.25, 0.5, 0.75];
    assert_eq!(channel_value(&rgb, &px, "G"), 0.5);
    assert_eq!(channel_value(&rgb, &px, "A"), 1.0);
    assert_eq!(channel_value(&ImageComponents::alpha(), &[0.3], "R"), 0.0);
}
