#![cfg(feature = "onnx")]

use spamdetect::{ArtifactLoadError, ClassifierError, InferenceService, SpamLabel, Verdict};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn setup_service(classifier: &str) -> Result<InferenceService, ArtifactLoadError> {
    InferenceService::builder()
        .with_vectorizer_file(fixture("vectorizer.json"))?
        .with_classifier_file(fixture(classifier))?
        .build()
}

const SPAMMY: &str = "WIN a FREE prize now!!!";
const HAMMY: &str = "Meeting moved to tomorrow at 10";

#[test]
fn test_onnx_graph_matches_logistic_regression() -> Result<(), Box<dyn std::error::Error>> {
    // linear.onnx encodes the same weights as classifier.json
    let onnx = setup_service("onnx.json")?;
    let reference = setup_service("classifier.json")?;

    let info = onnx.info();
    assert_eq!(info.classifier_kind, "onnx");
    assert!(info.supports_probabilities);

    for text in [SPAMMY, HAMMY, "free money", "see you at the meeting"] {
        let verdict = onnx.classify_text(text)?;
        let expected = reference.classify_text(text)?;
        assert_eq!(verdict.label, expected.label, "{:?}", text);
        // the graph computes in f32
        assert!((verdict.spam_probability - expected.spam_probability).abs() < 1e-3);
        assert!((verdict.spam_probability + verdict.ham_probability - 100.0).abs() < 0.01);
    }
    Ok(())
}

#[test]
fn test_onnx_without_probability_output_is_label_only() -> Result<(), Box<dyn std::error::Error>> {
    let service = setup_service("onnx_labels.json")?;
    assert!(!service.info().supports_probabilities);

    assert_eq!(
        service.classify_text(SPAMMY)?,
        Verdict {
            label: SpamLabel::Spam,
            spam_probability: 100.0,
            ham_probability: 0.0,
        }
    );
    let verdict = service.classify_text(HAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Ham);
    assert_eq!(verdict.ham_probability, 100.0);
    Ok(())
}

#[test]
fn test_onnx_width_mismatch_fails_at_startup() {
    assert!(matches!(
        setup_service("onnx_wrong_width.json"),
        Err(ArtifactLoadError::Invalid { .. })
    ));
}

#[test]
fn test_onnx_rejects_empty_input() -> Result<(), Box<dyn std::error::Error>> {
    let service = setup_service("onnx.json")?;
    assert!(matches!(service.classify_text("  "), Err(ClassifierError::EmptyInput)));
    Ok(())
}
