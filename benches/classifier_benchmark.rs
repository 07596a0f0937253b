use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spamdetect::{ClassificationRequest, InferenceService};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn setup_benchmark_service(classifier: &str) -> InferenceService {
    InferenceService::builder()
        .with_vectorizer_file(fixture("vectorizer.json"))
        .unwrap()
        .with_classifier_file(fixture(classifier))
        .unwrap()
        .build()
        .unwrap()
}

const SHORT_TEXT: &str = "WIN a FREE prize now";
const LONG_TEXT: &str = "Dear customer, this is a much longer message that contains multiple \
    paragraphs and should take more time to vectorize. It mentions money, a meeting, \
    a free prize and a chance to win.\n\n\
    The second paragraph adds more content: please confirm the meeting for tomorrow \
    and review the attached invoice before the end of the week.\n\n\
    Finally, this last paragraph checks how vectorization scales with input size for \
    the kind of email bodies that show up in real mailboxes.";

fn bench_vectorization(c: &mut Criterion) {
    let service = setup_benchmark_service("classifier.json");
    let mut group = c.benchmark_group("Vectorization");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let short = ClassificationRequest::new(SHORT_TEXT).unwrap();
    let long = ClassificationRequest::new(LONG_TEXT.repeat(20)).unwrap();
    group.bench_function("short_text", |b| b.iter(|| service.features(black_box(&short)).unwrap()));
    group.bench_function("long_text", |b| b.iter(|| service.features(black_box(&long)).unwrap()));

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Classification");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    for classifier in ["classifier.json", "naive_bayes.json", "svm.json"] {
        let service = setup_benchmark_service(classifier);
        let request = ClassificationRequest::new(LONG_TEXT).unwrap();
        group.bench_function(format!("classify_{}", service.info().classifier_kind), |b| {
            b.iter(|| service.classify(black_box(&request)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_vectorization, bench_classification);
criterion_main!(benches);
