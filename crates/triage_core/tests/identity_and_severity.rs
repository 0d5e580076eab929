use serde_json::json;

use triage_core::identity::{incident_id, sorted_key_json};
use triage_core::normalize::timestamps::{display_utc, parse_event_timestamp};
use triage_core::severity::{format_severity, label_escalates, Severity, UNKNOWN_STYLE};

fn pod_event() -> serde_json::Value {
    json!({
        "detail-type": "K8s Pod Failure",
        "source": "custom.k8s",
        "time": "2026-03-01T12:00:00Z",
        "detail": {
            "pod_name": "api-7d9f",
            "namespace": "prod",
            "status": "CrashLoopBackOff",
            "restart_count": 5,
            "note": "café 🚀"
        }
    })
}

#[test]
fn sorted_key_json_uses_spaced_separators_and_sorted_keys() {
    let v = json!({ "b": [1, { "z": null, "a": true }], "a": "x" });
    let out = String::from_utf8(sorted_key_json(&v)).expect("ascii output");
    assert_eq!(out, r#"{"a": "x", "b": [1, {"a": true, "z": null}]}"#);
}

#[test]
fn sorted_key_json_escapes_non_ascii_as_utf16_units() {
    let out = String::from_utf8(sorted_key_json(&json!({ "s": "é🚀\u{7f}" }))).expect("ascii");
    assert_eq!(out, r#"{"s": "\u00e9\ud83d\ude80\u007f"}"#);
}

#[test]
fn incident_id_matches_known_vector() {
    assert_eq!(incident_id(&pod_event()), "INC-8E4F89297E03");
}

#[test]
fn incident_id_is_stable_and_content_sensitive() {
    let a = incident_id(&pod_event());
    let b = incident_id(&pod_event());
    assert_eq!(a, b);
    assert!(a.starts_with("INC-"));
    assert_eq!(a.len(), 4 + 12);
    assert!(a[4..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));

    let mut changed = pod_event();
    changed["detail"]["restart_count"] = json!(6);
    assert_ne!(incident_id(&changed), a);
}

#[test]
fn incident_id_ignores_key_order() {
    let one: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":{"y":2,"x":3}}"#).expect("json");
    let two: serde_json::Value = serde_json::from_str(r#"{"b":{"x":3,"y":2},"a":1}"#).expect("json");
    assert_eq!(incident_id(&one), incident_id(&two));
}

#[test]
fn severity_parse_is_case_insensitive() {
    assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
    assert_eq!(Severity::parse(" Critical "), Some(Severity::Critical));
    assert_eq!(Severity::parse("low"), Some(Severity::Low));
    assert_eq!(Severity::parse("urgent"), None);
    assert_eq!(Severity::parse(""), None);
    assert_eq!(Severity::Medium.display_label(), "MEDIUM");
}

#[test]
fn severity_formatting_covers_closed_set_and_unknown() {
    assert_eq!(format_severity("low").color, "#36a64f");
    assert_eq!(format_severity("MEDIUM").color, "#ff9900");
    assert_eq!(format_severity("High").glyph, "🔴");
    assert_eq!(format_severity("critical").color, "#8B0000");
    assert_eq!(format_severity("critical").glyph, "🚨");
    assert_eq!(format_severity("sev0"), UNKNOWN_STYLE);
    assert_eq!(UNKNOWN_STYLE.color, "#808080");
}

#[test]
fn escalation_threshold_is_high_and_critical() {
    assert!(Severity::Critical.escalates());
    assert!(Severity::High.escalates());
    assert!(!Severity::Medium.escalates());
    assert!(!Severity::Low.escalates());
    assert!(label_escalates("HIGH"));
    assert!(!label_escalates("unknown"));
}

#[test]
fn display_utc_formats_known_forms_and_preserves_others() {
    assert_eq!(display_utc("2026-03-01T12:00:00Z"), "2026-03-01 12:00:00 UTC");
    assert_eq!(display_utc("2026-03-01T14:00:00+02:00"), "2026-03-01 12:00:00 UTC");
    assert_eq!(display_utc("2026-03-01T12:00:00.123456"), "2026-03-01 12:00:00 UTC");
    assert_eq!(display_utc("yesterday"), "yesterday");
    assert!(parse_event_timestamp("  ").is_none());
}
