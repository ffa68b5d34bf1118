use math_explainer::sanitize::{Profile, sanitize};
use math_explainer::script::{Layout, normalize, normalize_or_fallback};
use serde_json::json;

#[test]
fn malformed_model_output_falls_back() {
    let script = normalize_or_fallback(Some(&json!({"title": "x"})), "Pythagoras");
    assert_eq!(script.segments.len(), 2);
    assert_eq!(script.segments[0].layout, Layout::Title);

    let err = normalize(&json!({"segments": [{"narration": "only one"}]}), "t").unwrap_err();
    assert_eq!(err.kind(), "TooFewSegments");
}

#[test]
fn sanitized_text_is_stable_and_bounded() {
    let long = "long ".repeat(100);
    let samples = [
        "",
        "\"quoted\" and 'single'",
        "tabs\tand\nnewlines\r\n",
        "x² + y² = r²",
        "{\\frac{a}{b}}",
        long.as_str(),
    ];
    for raw in samples {
        for profile in [Profile::Display, Profile::Math] {
            let once = sanitize(raw, profile);
            assert!(!once.is_empty());
            assert!(once.chars().count() <= profile.max_chars());
            assert!(!once.contains(['"', '\'', '\\', '\n', '\t']));
            assert_eq!(sanitize(&once, profile), once);
        }
    }
}
