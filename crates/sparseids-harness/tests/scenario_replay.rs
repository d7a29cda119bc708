use std::collections::BTreeSet;

use sparseids_harness::{
    HarnessError, Scenario, Transcript, TranscriptEntry, init_test_logging, replay,
};
use sparseids_index::{ConflictPolicy, MsgId, SliceUpdateKind};

const CHAT_HISTORY: &str = include_str!("fixtures/chat_history.json");
const DISJOINT_PAGES: &str = include_str!("fixtures/disjoint_pages.toml");

#[test]
fn chat_history_fixture_passes() {
    init_test_logging();
    let scenario = Scenario::from_json(CHAT_HISTORY).expect("fixture parses");
    let transcript = replay(&scenario).into_result().expect("fixture replays");

    let kinds = transcript
        .updates()
        .map(|(step, update)| (step, update.kind))
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            (0, SliceUpdateKind::Merged),
            (2, SliceUpdateKind::Merged),
            (4, SliceUpdateKind::Removed),
            (9, SliceUpdateKind::Invalidated),
        ]
    );
    assert_eq!(transcript.query_results().count(), 4);

    let Some(TranscriptEntry::Finish { steps, stats }) = transcript.entries().last() else {
        panic!("transcript must end with a finish entry");
    };
    assert_eq!(*steps, scenario.steps.len());
    assert_eq!(stats.events_emitted, 4);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn toml_fixture_passes() {
    init_test_logging();
    let scenario: Scenario = toml::from_str(DISJOINT_PAGES).expect("fixture parses");
    assert_eq!(scenario.config.conflict_policy, ConflictPolicy::Reject);
    assert!(scenario.config.enforce_new_ordering);

    let transcript = replay(&scenario).into_result().expect("fixture replays");
    let rejected = transcript
        .entries()
        .iter()
        .filter_map(|entry| match entry {
            TranscriptEntry::Rejected { step, reason_code, .. } => Some((*step, reason_code.as_str())),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(rejected, vec![(5, "conflicting_members")]);

    let (_, merged) = transcript
        .updates()
        .find(|(step, _)| *step == 3)
        .expect("bridging page publishes");
    let expected: BTreeSet<MsgId> = [5, 9, 17].into_iter().map(MsgId::new).collect();
    assert_eq!(merged.members, expected);
}

#[test]
fn replay_is_deterministic() {
    let scenario = Scenario::from_json(CHAT_HISTORY).expect("fixture parses");
    let first = replay(&scenario).into_result().expect("first replay");
    let second = replay(&scenario).into_result().expect("second replay");
    assert_eq!(first, second);
}

#[test]
fn transcript_survives_jsonl_file() {
    let scenario = Scenario::from_json(CHAT_HISTORY).expect("fixture parses");
    let transcript = replay(&scenario).into_result().expect("replay");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chat_history.jsonl");
    transcript.write_jsonl(&path).expect("write");

    let text = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(text.lines().count(), transcript.entries().len());
    assert!(text.starts_with(r#"{"entry":"start","schema_version":1"#));

    let reread = Transcript::read_jsonl(&path).expect("parse back");
    assert_eq!(reread, transcript);
}

#[test]
fn malformed_transcript_line_is_located() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.jsonl");
    std::fs::write(
        &path,
        "{\"entry\":\"start\",\"schema_version\":1,\"scenario\":\"x\"}\n{\"entry\":\"bogus\"}\n",
    )
    .expect("write");
    let err = Transcript::read_jsonl(&path).expect_err("second line is bogus");
    assert!(matches!(err, HarnessError::TranscriptLine { line: 2, .. }), "{err}");
}

#[test]
fn missing_transcript_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.jsonl");
    let err = Transcript::read_jsonl(&path).expect_err("file is absent");
    assert!(matches!(err, HarnessError::Io { .. }));
    assert!(err.to_string().contains("absent.jsonl"), "{err}");
}

#[test]
fn failing_fixture_names_the_step() {
    let mut scenario = Scenario::from_json(CHAT_HISTORY).expect("fixture parses");
    scenario.name = "tampered".to_owned();
    if let sparseids_harness::Step::AddNew { expect, .. } = &mut scenario.steps[2] {
        expect.count = Some(99);
    }
    let err = replay(&scenario).into_result().expect_err("count expectation is wrong");
    let message = err.to_string();
    assert!(message.starts_with("scenario 'tampered' failed at step 2"), "{message}");
}
