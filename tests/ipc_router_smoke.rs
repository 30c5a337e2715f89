use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOK_WORKSPACE")
        .env_remove("GRADEBOOK_WEIGHTS")
        .env_remove("GRADEBOOK_EXAM_SCALE")
        .env_remove("GRADEBOOK_LETTER_SCALE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value["result"].clone()
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (stdin, reader) = (&mut stdin, &mut reader);

    let health = request_ok(stdin, reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["examScale"]["midMax"], 20);
    assert_eq!(health["examScale"]["finalMax"], 40);

    let early = send(stdin, reader, "2", "marks.list", json!({}));
    assert_eq!(error_code(&early), "no_workspace");

    let selected = request_ok(
        stdin,
        reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["recordCount"], 0);
    assert!(workspace.join("marks.csv").is_file());

    let enrolled = request_ok(
        stdin,
        reader,
        "4",
        "marks.enroll",
        json!({ "subjectCode": "CS101", "username": "alice" }),
    );
    assert_eq!(enrolled["created"], true);
    let again = request_ok(
        stdin,
        reader,
        "5",
        "marks.enroll",
        json!({ "subjectCode": "cs101", "username": "alice" }),
    );
    assert_eq!(again["created"], false);

    // One good edit, one out of range: the good one still lands.
    let bulk = request_ok(
        stdin,
        reader,
        "6",
        "marks.bulkUpdate",
        json!({
            "subjectCode": "CS101",
            "slot": "quiz1",
            "edits": [
                { "username": "bob", "value": 8 },
                { "username": "alice", "value": 15 }
            ]
        }),
    );
    assert_eq!(bulk["created"], 1);
    assert_eq!(bulk["updated"], 0);
    assert_eq!(bulk["rejected"], 1);
    let message = bulk["errors"][0]["message"].as_str().unwrap_or("");
    assert!(message.contains("alice"), "{message}");
    assert!(message.contains("0–10"), "{message}");
    assert_eq!(bulk["errors"][0]["code"], "out_of_range");

    let bad_slot = send(
        stdin,
        reader,
        "7",
        "marks.bulkUpdate",
        json!({
            "subjectCode": "CS101",
            "slot": "quiz9",
            "edits": [{ "username": "bob", "value": 1 }]
        }),
    );
    assert_eq!(error_code(&bad_slot), "unknown_slot");

    let mid = request_ok(
        stdin,
        reader,
        "8",
        "marks.bulkUpdate",
        json!({
            "subjectCode": "CS101",
            "slot": "mid",
            "edits": [{ "username": "alice", "value": 18 }]
        }),
    );
    assert_eq!(mid["updated"], 1);
    assert!(mid.get("errors").is_none());

    let page = request_ok(
        stdin,
        reader,
        "9",
        "marks.list",
        json!({ "subjectCode": "cs101", "rowStart": 1, "rowCount": 1 }),
    );
    assert_eq!(page["total"], 2);
    assert_eq!(page["rowCount"], 1);
    assert_eq!(page["records"][0]["studentUsername"], "bob");
    assert_eq!(page["records"][0]["quizzes"], json!([8, 0, 0, 0]));

    let policy = request_ok(stdin, reader, "10", "policy.get", json!({}));
    assert_eq!(policy["policy"], "absolute");
    let _ = request_ok(stdin, reader, "11", "policy.set", json!({ "policy": "Relative" }));
    let policy = request_ok(stdin, reader, "12", "policy.get", json!({}));
    assert_eq!(policy["policy"], "relative");
    let bad_policy = send(stdin, reader, "13", "policy.set", json!({ "policy": "curve" }));
    assert_eq!(error_code(&bad_policy), "bad_params");

    let report = request_ok(
        stdin,
        reader,
        "14",
        "grades.subjectReport",
        json!({ "subjectCode": "CS101" }),
    );
    assert_eq!(report["policy"], "relative");
    assert_eq!(report["stats"]["count"], 2);
    assert_eq!(report["students"].as_array().map(|a| a.len()), Some(2));

    let weighted = request_ok(
        stdin,
        reader,
        "15",
        "grades.weighted",
        json!({ "subjectCode": "CS101", "username": "bob" }),
    );
    let pct = weighted["weightedPercentage"].as_f64().unwrap_or(-1.0);
    assert!((pct - 4.0).abs() < 1e-9, "{pct}");

    let classified = request_ok(
        stdin,
        reader,
        "16",
        "grades.classify",
        json!({ "score": 80.0, "population": [60.0, 70.0, 80.0, 90.0] }),
    );
    assert_eq!(classified["grade"], "B-");
    let absolute = request_ok(
        stdin,
        reader,
        "17",
        "grades.classify",
        json!({ "score": 80.0, "policy": "absolute" }),
    );
    assert_eq!(absolute["grade"], "B+");

    // bob: quiz1=8 gives 4%; mid needs 16/20 to reach 20% with final still at zero.
    let required = request_ok(
        stdin,
        reader,
        "18",
        "grades.required",
        json!({ "subjectCode": "CS101", "username": "bob", "target": 20.0 }),
    );
    assert_eq!(required["pending"], json!(["mid", "final"]));
    assert_eq!(required["slot"], "mid");
    let needed = required["required"]["needed"].as_f64().unwrap_or(-1.0);
    assert!((needed - 16.0).abs() < 1e-9, "{needed}");
    assert_eq!(required["required"]["outOf"], 20);

    let unreachable = send(
        stdin,
        reader,
        "19",
        "grades.required",
        json!({ "subjectCode": "CS101", "username": "bob", "target": 90.0 }),
    );
    assert_eq!(error_code(&unreachable), "unachievable");

    let exported = request_ok(
        stdin,
        reader,
        "20",
        "backup.export",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(exported["entryCount"], 3);

    let removed = request_ok(
        stdin,
        reader,
        "21",
        "subject.remove",
        json!({ "subjectCode": "cs101" }),
    );
    assert_eq!(removed["removed"], 2);

    let imported = request_ok(
        stdin,
        reader,
        "22",
        "backup.import",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], "gradebook-workspace-v1");
    let page = request_ok(stdin, reader, "23", "marks.list", json!({}));
    assert_eq!(page["total"], 2);

    let unknown = send(stdin, reader, "24", "no.such.method", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let bad = read_response(reader);
    assert_eq!(bad["id"], "");
    assert_eq!(error_code(&bad), "bad_json");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn oversized_bulk_update_reports_limit_exceeded() {
    let workspace = temp_dir("gradebook-router-limit");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (stdin, reader) = (&mut stdin, &mut reader);

    let _ = request_ok(
        stdin,
        reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let edits: Vec<serde_json::Value> = (0..5001)
        .map(|i| json!({ "username": format!("s{i}"), "value": 1 }))
        .collect();
    let result = request_ok(
        stdin,
        reader,
        "2",
        "marks.bulkUpdate",
        json!({ "subjectCode": "CS101", "slot": "quiz1", "edits": edits }),
    );
    assert_eq!(result["limitExceeded"], true);
    assert_eq!(result["updated"], 0);
    assert_eq!(result["rejected"], 5001);

    let page = request_ok(stdin, reader, "3", "marks.list", json!({}));
    assert_eq!(page["total"], 0);

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unrepresentable_values_are_rejected_per_edit() {
    let workspace = temp_dir("gradebook-router-values");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (stdin, reader) = (&mut stdin, &mut reader);

    let _ = request_ok(
        stdin,
        reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let result = request_ok(
        stdin,
        reader,
        "2",
        "marks.bulkUpdate",
        json!({
            "subjectCode": "CS101",
            "slot": "quiz2",
            "edits": [
                { "username": "alice", "value": 7.5 },
                { "username": "bob", "value": 9 },
                { "username": "carol", "value": 9223372036854775808u64 },
                { "username": "dave", "value": 1e20 },
                { "username": "erin", "value": 11 },
                { "username": "frank", "value": 6 }
            ]
        }),
    );
    assert_eq!(result["created"], 2);
    assert_eq!(result["rejected"], 4);
    let errors = result["errors"].as_array().cloned().unwrap_or_default();
    let indices: Vec<u64> = errors.iter().filter_map(|e| e["index"].as_u64()).collect();
    assert_eq!(indices, vec![0, 2, 3, 4]);
    for (e, who) in errors.iter().zip(["alice", "carol", "dave", "erin"]) {
        assert_eq!(e["username"], who);
        assert_eq!(e["code"], "out_of_range");
        let message = e["message"].as_str().unwrap_or("");
        assert!(message.contains(who) && message.contains("0–10"), "{message}");
    }

    let page = request_ok(stdin, reader, "3", "marks.list", json!({ "subjectCode": "CS101" }));
    assert_eq!(page["total"], 2);
    assert_eq!(page["records"][0]["studentUsername"], "bob");
    assert_eq!(page["records"][0]["quizzes"], json!([0, 9, 0, 0]));
    assert_eq!(page["records"][1]["studentUsername"], "frank");

    let missing_name = send(
        stdin,
        reader,
        "4",
        "marks.bulkUpdate",
        json!({
            "subjectCode": "CS101",
            "slot": "quiz2",
            "edits": [{ "value": 3 }]
        }),
    );
    assert_eq!(error_code(&missing_name), "bad_params");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
