//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const SESSION: &str = "20260101_120000";

fn solver() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("exam-solver").unwrap();
    cmd.env_remove("RESULTS_DIR")
        .env_remove("OPTION_LABELS")
        .env_remove("RUST_LOG");
    cmd
}

fn write_pass(dir: &Path, option_index: usize, label: &str, marks: [bool; 3]) {
    write_session_pass(dir, SESSION, option_index, label, marks);
}

fn write_session_pass(
    dir: &Path,
    session: &str,
    option_index: usize,
    label: &str,
    marks: [bool; 3],
) {
    let per_question: serde_json::Map<String, serde_json::Value> = marks
        .iter()
        .enumerate()
        .map(|(i, &c)| ((i + 1).to_string(), json!(c)))
        .collect();
    let correct = marks.iter().filter(|&&c| c).count();
    let pass = json!({
        "sessionId": session,
        "optionIndex": option_index,
        "optionLabel": label,
        "score": correct as f64 / 3.0 * 100.0,
        "totalQuestions": 3,
        "perQuestion": per_question,
        "timestamp": "2026-01-01T12:05:00+08:00",
        "durationSeconds": 4.2
    });
    std::fs::write(
        dir.join(format!("option_{}_{}.json", option_index, session)),
        serde_json::to_string_pretty(&pass).unwrap(),
    )
    .unwrap();
}

fn seeded_results() -> TempDir {
    let dir = TempDir::new().unwrap();
    let session = json!({
        "sessionId": SESSION,
        "examUrl": "https://exam.example",
        "startTime": "2026-01-01T12:00:00+08:00",
        "totalQuestions": 3
    });
    std::fs::write(
        dir.path().join(format!("session_{}.json", SESSION)),
        session.to_string(),
    )
    .unwrap();
    write_pass(dir.path(), 0, "A", [true, false, false]);
    write_pass(dir.path(), 1, "B", [false, true, false]);
    dir
}

#[test]
fn status_lists_completed_and_missing_options() {
    let dir = seeded_results();
    solver()
        .arg("status")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("会话 20260101_120000（3 道题）"))
        .stdout(predicate::str::contains("A: ✓ 总分 33.3%，答对 1/3"))
        .stdout(predicate::str::contains("缺少选项: C, D"));
}

#[test]
fn analyze_writes_answer_key_artifact() {
    let dir = seeded_results();
    solver()
        .arg("analyze")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("第 1 题: A（确定）"))
        .stdout(predicate::str::contains("第 2 题: B（确定）"))
        .stdout(predicate::str::contains("第 3 题: C（未测试，已排除 A, B）"))
        .stdout(predicate::str::contains("预期得分: 75.0%"));

    let artifacts: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("final_answer_key_")
        })
        .collect();
    assert_eq!(artifacts.len(), 1);

    let artifact: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifacts[0].path()).unwrap()).unwrap();
    assert_eq!(artifact["answerKey"], json!({"1": 0, "2": 1, "3": 2}));
    assert_eq!(artifact["summaryCounts"]["high"], 2);
    assert_eq!(artifact["perQuestionAnalysis"]["3"]["confidence"], "untested_guess");
}

#[test]
fn analyze_all_combines_single_option_sessions() {
    let dir = TempDir::new().unwrap();
    write_session_pass(dir.path(), "20260101_120000", 0, "A", [true, false, false]);
    write_session_pass(dir.path(), "20260101_121000", 1, "B", [false, true, false]);
    write_session_pass(dir.path(), "20260101_122000", 2, "C", [false, false, true]);

    solver()
        .args(["analyze", "--all"])
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("参与分析的会话"))
        .stdout(predicate::str::contains("第 3 题: C（确定）"))
        .stdout(predicate::str::contains("预期得分: 100.0%"));

    let artifact = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("final_answer_key_")
        })
        .unwrap();
    let artifact: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifact.path()).unwrap()).unwrap();
    assert_eq!(artifact["sessionsAnalyzed"].as_array().unwrap().len(), 3);
    assert_eq!(artifact["answerKey"], json!({"1": 0, "2": 1, "3": 2}));
}

#[test]
fn submit_warns_when_answer_key_labels_differ() {
    let dir = seeded_results();
    solver()
        .arg("analyze")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .success();

    solver()
        .arg("submit")
        .arg("--results-dir")
        .arg(dir.path())
        .env("OPTION_LABELS", "A,B,C")
        .env("BROWSER_DEBUG_PORT", "1")
        .env("HEADLESS", "false")
        .assert()
        .failure()
        .stdout(predicate::str::contains("答案文件的选项"))
        .stderr(predicate::str::contains("无法连接到浏览器 (端口: 1)"));
}

#[test]
fn analyze_without_sessions_fails() {
    let dir = TempDir::new().unwrap();
    solver()
        .arg("analyze")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn pass_rejects_unknown_option() {
    let dir = TempDir::new().unwrap();
    solver()
        .args(["pass", "--option", "Z"])
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("未知选项"));
}

#[test]
fn submit_without_answer_key_fails() {
    let dir = TempDir::new().unwrap();
    solver()
        .arg("submit")
        .arg("--results-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("没有答案文件"));
}
