use gradebookd::config::ExamScale;
use gradebookd::record::{AssessmentSlot, Edit, ScoreRecord};
use gradebookd::store;
use gradebookd::upsert;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn seeded() -> Vec<ScoreRecord> {
    let mut alice = ScoreRecord::new("CS101", "alice");
    alice.quizzes = [4, 5, 6, 7];
    alice.assignments = [8, 9, 10, 1];
    alice.mid = 12;
    alice.final_exam = 33;
    let mut bob = ScoreRecord::new("CS101", "bob");
    bob.mid = 19;
    let mut alice_math = ScoreRecord::new("MA201", "alice");
    alice_math.final_exam = 40;
    vec![alice, bob, alice_math]
}

fn all_slots() -> Vec<AssessmentSlot> {
    let mut v = Vec::new();
    for n in 1..=4 {
        v.push(AssessmentSlot::Quiz(n));
        v.push(AssessmentSlot::Assignment(n));
    }
    v.push(AssessmentSlot::Mid);
    v.push(AssessmentSlot::Final);
    v
}

#[test]
fn identities_stay_unique_after_mixed_batches() {
    let mut records = seeded();
    let batches: Vec<(&str, AssessmentSlot, Vec<Edit>)> = vec![
        (
            "CS101",
            AssessmentSlot::Quiz(1),
            vec![Edit::new("alice", 3), Edit::new("carol", 2), Edit::new("carol", 9)],
        ),
        ("cs101", AssessmentSlot::Final, vec![Edit::new("carol", 20), Edit::new("dave", 1)]),
        ("MA201", AssessmentSlot::Mid, vec![Edit::new("bob", 5), Edit::new("alice", 6)]),
    ];
    for (subject, slot, edits) in batches {
        records = upsert::apply(&records, subject, slot, &edits, ExamScale::default())
            .expect("apply batch")
            .records;
    }

    let mut seen = HashSet::new();
    for r in &records {
        assert!(
            seen.insert((r.subject_code.to_ascii_lowercase(), r.student_username.clone())),
            "duplicate identity for {:?}",
            r
        );
    }
    assert_eq!(records.len(), 6);
}

#[test]
fn edits_change_only_the_named_slot() {
    let before = seeded();
    for slot in all_slots() {
        let out = upsert::apply(&before, "CS101", slot, &[Edit::new("alice", 1)], ExamScale::default())
            .expect("apply");
        assert!(out.rejected.is_empty());
        let after = &out.records[0];
        assert_eq!(after.get(slot), 1, "{slot}");
        for other in all_slots().into_iter().filter(|s| *s != slot) {
            assert_eq!(after.get(other), before[0].get(other), "{slot} touched {other}");
        }
        assert_eq!(&out.records[1..], &before[1..]);
    }
}

#[test]
fn lazy_created_record_is_zero_filled() {
    let out = upsert::apply(
        &seeded(),
        "CS101",
        AssessmentSlot::Quiz(3),
        &[Edit::new("erin", 7)],
        ExamScale::default(),
    )
    .expect("apply");
    assert_eq!(out.created, 1);
    assert_eq!(out.updated, 0);
    let erin = out.records.last().expect("appended record");
    assert_eq!(erin.subject_code, "CS101");
    assert_eq!(erin.student_username, "erin");
    assert_eq!(erin.quizzes, [0, 0, 7, 0]);
    assert_eq!(erin.assignments, [0, 0, 0, 0]);
    assert_eq!(erin.mid, 0);
    assert_eq!(erin.final_exam, 0);
}

#[test]
fn out_of_range_edit_is_isolated_and_the_rest_persist() {
    let dir = temp_dir("gradebook-upsert-isolation");
    let path = dir.join("marks.csv");
    store::persist(&path, &seeded()).expect("seed file");

    let existing = store::load_all(&path).expect("load");
    let out = upsert::apply(
        &existing,
        "CS101",
        AssessmentSlot::Quiz(2),
        &[Edit::new("bob", 8), Edit::new("alice", 15)],
        ExamScale::default(),
    )
    .expect("apply");
    assert_eq!(out.updated, 1);
    assert_eq!(out.rejected.len(), 1);
    let rej = &out.rejected[0];
    assert_eq!(rej.username, "alice");
    assert_eq!(rej.value, 15);
    assert_eq!(rej.code, "out_of_range");
    assert!(rej.message.contains("alice"), "{}", rej.message);
    assert!(rej.message.contains("0–10"), "{}", rej.message);

    store::persist(&path, &out.records).expect("persist");
    let reloaded = store::load_all(&path).expect("reload");
    let bob = reloaded
        .iter()
        .find(|r| r.matches("CS101", "bob"))
        .expect("bob");
    assert_eq!(bob.quizzes, [0, 8, 0, 0]);
    let alice = reloaded
        .iter()
        .find(|r| r.matches("CS101", "alice"))
        .expect("alice");
    assert_eq!(alice.quizzes, [4, 5, 6, 7]);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn negative_and_boundary_values() {
    let out = upsert::apply(
        &[],
        "CS101",
        AssessmentSlot::Mid,
        &[
            Edit::new("a", -1),
            Edit::new("b", 0),
            Edit::new("c", 20),
            Edit::new("d", 21),
        ],
        ExamScale::Mid20Final40,
    )
    .expect("apply");
    let rejected: Vec<&str> = out.rejected.iter().map(|r| r.username.as_str()).collect();
    assert_eq!(rejected, vec!["a", "d"]);
    assert_eq!(out.created, 2);

    let wider = upsert::apply(
        &[],
        "CS101",
        AssessmentSlot::Mid,
        &[Edit::new("d", 21)],
        ExamScale::Mid25Final35,
    )
    .expect("apply");
    assert!(wider.rejected.is_empty());
}

#[test]
fn unknown_slot_name_is_rejected_before_applying() {
    let e = "quiz7".parse::<AssessmentSlot>().expect_err("quiz7 is not a slot");
    assert_eq!(e.code(), "unknown_slot");
    assert!(e.to_string().contains("quiz7"));
}
