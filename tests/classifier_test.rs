use spamdetect::{ClassifierError, InferenceService, SpamLabel, Verdict};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn setup_service(classifier: &str) -> InferenceService {
    InferenceService::builder()
        .with_vectorizer_file(fixture("vectorizer.json"))
        .unwrap()
        .with_classifier_file(fixture(classifier))
        .unwrap()
        .build()
        .expect("Failed to create service")
}

const SPAMMY: &str = "WIN a FREE prize now!!!";
const HAMMY: &str = "Meeting moved to tomorrow at 10";

#[test]
fn test_logistic_regression_verdicts() -> Result<(), ClassifierError> {
    let service = setup_service("classifier.json");

    let verdict = service.classify_text(SPAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Spam);
    assert!(verdict.spam_probability > 90.0);

    let verdict = service.classify_text(HAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Ham);
    assert!(verdict.ham_probability > 90.0);
    Ok(())
}

#[test]
fn test_out_of_vocabulary_text_uses_intercept() -> Result<(), ClassifierError> {
    let service = setup_service("classifier.json");
    // no known terms: the feature vector is all zeros and only the intercept (-0.3) remains
    let verdict = service.classify_text("hello there, how are you?")?;
    let expected_spam = 100.0 / (1.0 + 0.3_f64.exp());
    assert_eq!(verdict.label, SpamLabel::Ham);
    assert!((verdict.spam_probability - expected_spam).abs() < 1e-9);
    assert!((verdict.ham_probability - (100.0 - expected_spam)).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_label_only_classifier_gives_degenerate_distribution() -> Result<(), ClassifierError> {
    let service = setup_service("svm.json");
    assert!(!service.info().supports_probabilities);

    let verdict = service.classify_text(SPAMMY)?;
    assert_eq!(
        verdict,
        Verdict {
            label: SpamLabel::Spam,
            spam_probability: 100.0,
            ham_probability: 0.0,
        }
    );

    let verdict = service.classify_text(HAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Ham);
    assert_eq!(verdict.ham_probability, 100.0);
    assert_eq!(verdict.spam_probability, 0.0);
    Ok(())
}

#[test]
fn test_naive_bayes_verdicts() -> Result<(), ClassifierError> {
    let service = setup_service("naive_bayes.json");
    assert!(service.info().supports_probabilities);

    let verdict = service.classify_text(SPAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Spam);
    let verdict = service.classify_text(HAMMY)?;
    assert_eq!(verdict.label, SpamLabel::Ham);
    Ok(())
}

#[test]
fn test_verdict_properties_hold_for_many_inputs() -> Result<(), ClassifierError> {
    let inputs = [
        SPAMMY,
        HAMMY,
        "free money free money free money",
        "Win",
        "prize meeting",
        "Can we move the meeting? Also, free lunch tomorrow.",
        "no known words here",
        "ünïcödé wïn prïze",
        "x",
        "\n\nmultiline\nfree\n\nmoney\n",
    ];

    for classifier in ["classifier.json", "naive_bayes.json", "svm.json", "balanced.json"] {
        let service = setup_service(classifier);
        for text in inputs {
            let verdict = service.classify_text(text)?;
            assert!(matches!(verdict.label, SpamLabel::Spam | SpamLabel::Ham));
            assert!(
                (verdict.spam_probability + verdict.ham_probability - 100.0).abs() < 0.01,
                "{} on {:?}: {:?}",
                classifier,
                text,
                verdict
            );
            // the label follows the larger probability; an exact tie goes to ham
            assert_eq!(
                verdict.label == SpamLabel::Spam,
                verdict.spam_probability > verdict.ham_probability,
                "{} on {:?}: {:?}",
                classifier,
                text,
                verdict
            );
            // no hidden state between calls
            assert_eq!(service.classify_text(text)?, verdict);
        }
    }
    Ok(())
}

#[test]
fn test_exact_tie_goes_to_ham() -> Result<(), ClassifierError> {
    let service = setup_service("balanced.json");
    // no known terms and a zero intercept: the decision is exactly 0
    let verdict = service.classify_text("no known words here")?;
    assert_eq!(
        verdict,
        Verdict {
            label: SpamLabel::Ham,
            spam_probability: 50.0,
            ham_probability: 50.0,
        }
    );
    assert_eq!(verdict.display_percentage(), 50);
    Ok(())
}

#[test]
fn test_empty_input_rejected() {
    let service = setup_service("classifier.json");
    for text in ["", "   ", "\n\t\r\n"] {
        let err = service.classify_text(text).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyInput));
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), spamdetect::EMPTY_INPUT_MESSAGE);
    }
    // the service keeps serving after a rejected request
    assert!(service.classify_text(SPAMMY).is_ok());
}

#[test]
fn test_thread_safety() {
    let service = Arc::new(setup_service("classifier.json"));
    let expected = service.classify_text(SPAMMY).unwrap();
    let mut handles = vec![];

    for _ in 0..4 {
        let service = Arc::clone(&service);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                assert_eq!(service.classify_text(SPAMMY).unwrap(), expected);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_service_info() {
    let service = setup_service("classifier.json");
    let info = service.info();
    assert_eq!(info.n_features, 6);
    assert_eq!(info.vectorizer_kind, "tfidf");
    assert_eq!(info.classifier_kind, "logistic_regression");
    assert!(info.supports_probabilities);
    assert_eq!(info.classifier_path, Some(fixture("classifier.json")));
}
