mod common;

use std::cell::Cell;
use std::fs;
use std::sync::Arc;

use common::{config_with, pipeline, write_pdf, EchoChat, HashEmbedder};
use rag::{
    DocumentFingerprint, Phase, QueryKind, QueryOutcome, QueryRejection, RagError, Session,
    VectorIndex,
};

struct Fixture {
    dir: tempfile::TempDir,
    session: Session,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::new(dir.path().join("staging").join("temp_file.pdf"));
    Fixture { dir, session }
}

#[test]
fn phases_follow_upload_and_query() {
    let mut fx = fixture();
    assert_eq!(fx.session.phase(), Phase::Idle);
    assert_eq!(
        fx.session.begin_query("revenue?").err(),
        Some(QueryRejection::NoDocument)
    );

    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    let staged = fx.session.upload(&source).expect("upload").clone();
    assert_eq!(staged.name, "a.pdf");
    assert_eq!(staged.path.as_path(), fx.session.staging_path());
    assert_eq!(fs::read(&source).expect("src"), fs::read(&staged.path).expect("staged"));
    assert_eq!(fx.session.phase(), Phase::Uploaded);

    let job = fx.session.begin_query("revenue?").expect("query should start");
    assert!(job.needs_index());
    assert_eq!(fx.session.phase(), Phase::Querying);
    assert_eq!(fx.session.begin_query("rent?").err(), Some(QueryRejection::Busy));
}

#[test]
fn index_is_built_once_and_reused_across_queries() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000", "Rent: $9,000"]);
    fx.session.upload(&source).expect("upload");

    let embedder = HashEmbedder::default();
    let chat = EchoChat::default();
    let pipeline = pipeline(config_with(&[]), &embedder, &chat);

    let first = fx.session.begin_query("What is the revenue?").expect("first").run(&pipeline);
    fx.session.finish_query(&first);
    let answer = first.answer.as_ref().expect("first answer");
    assert!(answer.text.contains("42,000"));
    assert!(fx.session.has_cached_index());
    let embed_calls_after_first = embedder.batch_sizes().len();

    let second = fx.session.begin_query("What is the rent?").expect("second");
    assert!(!second.needs_index());
    let second = second.run(&pipeline);
    fx.session.finish_query(&second);
    assert!(second.answer.as_ref().expect("second answer").text.contains("9,000"));
    // Only the question was embedded the second time.
    assert_eq!(embedder.batch_sizes().len(), embed_calls_after_first + 1);
    assert_eq!(embedder.batch_sizes().last(), Some(&1));
}

#[test]
fn unchanged_or_blank_queries_do_not_rerun() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fx.session.upload(&source).expect("upload");

    let pipeline = pipeline(config_with(&[]), &HashEmbedder::default(), &EchoChat::default());
    let outcome = fx.session.begin_query(" revenue? ").expect("first").run(&pipeline);
    fx.session.finish_query(&outcome);

    assert_eq!(fx.session.begin_query("revenue?").err(), Some(QueryRejection::Unchanged));
    assert_eq!(fx.session.begin_query("  ").err(), Some(QueryRejection::Blank));
    assert!(fx.session.begin_query("revenue in 2023?").is_ok());
}

#[test]
fn failed_requests_can_be_retried_with_the_same_text() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fx.session.upload(&source).expect("upload");

    let failing = pipeline(config_with(&[]), &HashEmbedder::failing(), &EchoChat::default());
    let outcome = fx.session.begin_query("revenue?").expect("start").run(&failing);
    fx.session.finish_query(&outcome);
    assert!(matches!(outcome.answer, Err(RagError::Embedding(_))));
    assert!(outcome.index.is_none());
    assert!(!fx.session.has_cached_index());
    assert_eq!(fx.session.phase(), Phase::Uploaded);

    let working = pipeline(config_with(&[]), &HashEmbedder::default(), &EchoChat::default());
    let outcome = fx.session.begin_query("revenue?").expect("retry allowed").run(&working);
    assert!(outcome.answer.is_ok());
}

#[test]
fn reupload_replaces_previous_document_and_index() {
    let mut fx = fixture();
    let first = fx.dir.path().join("first.pdf");
    let second = fx.dir.path().join("second.pdf");
    write_pdf(&first, &["Revenue: $42,000 from lemonade stands"]);
    write_pdf(&second, &["Revenue: $7,500 from bicycle repairs"]);

    let pipeline = pipeline(config_with(&[]), &HashEmbedder::default(), &EchoChat::default());

    fx.session.upload(&first).expect("first upload");
    let outcome = fx.session.begin_query("What is the revenue?").expect("q1").run(&pipeline);
    fx.session.finish_query(&outcome);
    assert!(fx.session.has_cached_index());

    fx.session.upload(&second).expect("second upload");
    assert!(!fx.session.has_cached_index());
    let job = fx.session.begin_query("What is the revenue?").expect("same text, new document");
    assert!(job.needs_index());
    let outcome = job.run(&pipeline);
    fx.session.finish_query(&outcome);

    let answer = outcome.answer.expect("answer");
    assert!(answer.text.contains("7,500"));
    assert!(!answer.text.contains("42,000"));
    assert!(!answer.context.contains("lemonade"));
}

#[test]
fn reuploading_identical_bytes_keeps_the_index() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    let copy = fx.dir.path().join("a-copy.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fs::copy(&source, &copy).expect("copy");

    let pipeline = pipeline(config_with(&[]), &HashEmbedder::default(), &EchoChat::default());
    fx.session.upload(&source).expect("upload");
    let outcome = fx.session.begin_query("revenue?").expect("q").run(&pipeline);
    fx.session.finish_query(&outcome);

    fx.session.upload(&copy).expect("reupload");
    assert!(fx.session.has_cached_index());
}

#[test]
fn stale_outcome_never_populates_cache() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fx.session.upload(&source).expect("upload");
    let job = fx.session.begin_query("revenue?").expect("start");

    let stale = QueryOutcome {
        fingerprint: DocumentFingerprint::of_bytes(b"some other upload"),
        kind: job.kind.clone(),
        index: Some(Arc::new(VectorIndex::default())),
        answer: Err(RagError::NoDocument),
    };
    fx.session.finish_query(&stale);
    assert!(!fx.session.has_cached_index());
    assert_eq!(fx.session.phase(), Phase::Uploaded);
}

#[test]
fn recommended_fields_job_builds_index_and_asks_analyst_question() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000", "Headcount: 17"]);
    fx.session.upload(&source).expect("upload");

    let chat = EchoChat::replying("Revenue, headcount");
    let pipeline = pipeline(config_with(&[]), &HashEmbedder::default(), &chat);
    let job = fx.session.begin_recommended_fields().expect("insights");
    assert_eq!(job.kind, QueryKind::RecommendedFields);
    let outcome = job.run(&pipeline);
    fx.session.finish_query(&outcome);
    assert_eq!(outcome.answer.expect("answer").text, "Revenue, headcount");
    assert!(chat.last_user_prompt().contains("data analyst"));
}

#[test]
fn bad_uploads_leave_state_untouched_and_cleanup_removes_staging() {
    let mut fx = fixture();
    let text = fx.dir.path().join("notes.txt");
    fs::write(&text, "hello").expect("write");
    let err = fx.session.upload(&text).expect_err("txt should be rejected");
    assert!(matches!(err, RagError::Ingestion { .. }));
    assert_eq!(fx.session.phase(), Phase::Idle);

    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fx.session.upload(&source).expect("upload");
    assert!(fx.session.staging_path().exists());

    fx.session.cleanup().expect("cleanup");
    assert!(!fx.session.staging_path().exists());
    assert_eq!(fx.session.phase(), Phase::Idle);
    fx.session.cleanup().expect("cleanup twice is fine");
}

#[test]
fn index_progress_is_reported_only_for_fresh_builds() {
    let mut fx = fixture();
    let source = fx.dir.path().join("a.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    fx.session.upload(&source).expect("upload");
    let pipeline = pipeline(config_with(&[]), &HashEmbedder::default(), &EchoChat::default());

    let built = Cell::new(0);
    let outcome = fx
        .session
        .begin_query("revenue?")
        .expect("cold")
        .run_with(&pipeline, || built.set(built.get() + 1));
    fx.session.finish_query(&outcome);
    assert_eq!(built.get(), 1);

    let outcome = fx
        .session
        .begin_query("rent?")
        .expect("warm")
        .run_with(&pipeline, || built.set(built.get() + 1));
    fx.session.finish_query(&outcome);
    assert!(outcome.answer.is_ok());
    assert_eq!(built.get(), 1);

    let mut cold = fixture();
    let source = cold.dir.path().join("b.pdf");
    write_pdf(&source, &["Revenue: $42,000"]);
    cold.session.upload(&source).expect("upload");
    let failing = common::pipeline(config_with(&[]), &HashEmbedder::failing(), &EchoChat::default());
    let outcome = cold
        .session
        .begin_query("revenue?")
        .expect("start")
        .run_with(&failing, || built.set(built.get() + 1));
    assert!(outcome.answer.is_err());
    assert_eq!(built.get(), 1);
}
