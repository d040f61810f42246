//! 基于模拟考试会话的端到端推断测试

use std::collections::BTreeSet;

use exam_key_solver::error::RunError;
use exam_key_solver::{
    Config, Confidence, InferenceRun, MockExamSession, ResultStore, RunState,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> Config {
    Config {
        results_dir: dir.path().display().to_string(),
        ..Config::default().without_waits()
    }
}

const ANSWERS: [usize; 12] = [0, 1, 2, 3, 3, 2, 1, 0, 1, 1, 2, 0];

#[tokio::test]
async fn infers_exact_key_and_passes() {
    let dir = TempDir::new().unwrap();
    let mut run = InferenceRun::new(config(&dir), MockExamSession::with_answer_key(&ANSWERS, 4));

    let report = tokio_test::assert_ok!(run.run(None).await);

    assert_eq!(report.state, RunState::FinalSubmitted);
    let analysis = report.analysis.as_ref().unwrap();
    for (i, &answer) in ANSWERS.iter().enumerate() {
        assert_eq!(analysis.key.get(i as u32 + 1), Some(answer));
    }
    assert_eq!(analysis.report.counts.high, 12);
    assert!((analysis.report.expected_score() - 100.0).abs() < 1e-9);
    assert!(report.final_outcome.as_ref().unwrap().passed);

    let store = ResultStore::new(dir.path());
    assert_eq!(store.load_all(&report.session_id).await.unwrap().len(), 4);
    let record = store.load_session(&report.session_id).await.unwrap().unwrap();
    assert_eq!(record.total_questions, Some(12));
    assert!(store.latest_answer_key().await.unwrap().is_some());
}

#[tokio::test]
async fn resume_skips_completed_options() {
    let dir = TempDir::new().unwrap();
    {
        let mut first = InferenceRun::new(config(&dir), MockExamSession::with_answer_key(&ANSWERS, 4));
        first.run_single_pass(Some("resume-me"), 0).await.unwrap();
        first.run_single_pass(Some("resume-me"), 1).await.unwrap();
    }

    let mut run = InferenceRun::new(config(&dir), MockExamSession::with_answer_key(&ANSWERS, 4));
    let report = run.run(Some("resume-me")).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed_options, BTreeSet::from([0, 1, 2, 3]));
    // 两轮 + 最终交卷
    assert_eq!(run.session().submissions(), 3);
    let tested: BTreeSet<usize> = run.session().selection_log()[..ANSWERS.len() * 2]
        .iter()
        .map(|&(_, o)| o)
        .collect();
    assert_eq!(tested, BTreeSet::from([2, 3]));
}

#[tokio::test]
async fn retake_exhaustion_keeps_partial_key() {
    let dir = TempDir::new().unwrap();
    let mut session = MockExamSession::with_answer_key(&ANSWERS, 4);
    session.retake_failures = 100;
    let mut run = InferenceRun::new(config(&dir), session);

    let report = run.run(None).await.unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert!(matches!(
        report.abort_reason,
        Some(RunError::RetakeExhausted { attempts: 3 })
    ));
    assert_eq!(report.completed_options, BTreeSet::from([0]));

    let analysis = report.analysis.expect("partial key");
    for (i, &answer) in ANSWERS.iter().enumerate() {
        let a = &analysis.analysis[&(i as u32 + 1)];
        if answer == 0 {
            assert_eq!(a.confidence, Confidence::High);
        } else {
            assert_eq!(a.confidence, Confidence::UntestedGuess);
            assert_eq!(a.recommended, 1);
        }
    }
    assert!(report.final_outcome.is_none());
}

#[tokio::test]
async fn lost_session_recovers_and_continues() {
    let dir = TempDir::new().unwrap();
    let mut session = MockExamSession::with_answer_key(&ANSWERS, 4);
    session.fail_health_after_selections = Some(3);
    let mut run = InferenceRun::new(config(&dir), session);

    let report = run.run(None).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.failed_options, vec![0]);
    // A 在恢复后重跑
    assert_eq!(report.completed_options, BTreeSet::from([0, 1, 2, 3]));
    assert_eq!(run.session().reconnects(), 1);
    assert_eq!(report.analysis.as_ref().unwrap().report.counts.high, 12);
    assert_eq!(report.final_outcome.unwrap().score, Some(100.0));
}

#[tokio::test]
async fn unrecoverable_session_aborts_without_key() {
    let dir = TempDir::new().unwrap();
    let mut session = MockExamSession::with_answer_key(&ANSWERS, 4);
    session.fail_health_after_selections = Some(2);
    session.reconnects_needed = Some(99);
    let mut run = InferenceRun::new(config(&dir), session);

    let report = run.run(None).await.unwrap();

    assert!(matches!(
        report.abort_reason,
        Some(RunError::SessionUnrecoverable { attempts: 3 })
    ));
    assert!(report.completed_options.is_empty());
    assert!(report.analysis.is_none());
}

#[tokio::test]
async fn multiple_correct_is_surfaced_as_anomaly() {
    let dir = TempDir::new().unwrap();
    let correct = vec![
        BTreeSet::from([1]),
        BTreeSet::from([0, 2]),
        BTreeSet::from([3]),
    ];
    let mut run = InferenceRun::new(config(&dir), MockExamSession::with_correct_sets(correct, 4));

    let report = run.run(None).await.unwrap();

    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.report.anomalies, vec![2]);
    assert_eq!(analysis.key.get(2), Some(0));
    assert_eq!(
        analysis.analysis[&2].confidence,
        Confidence::MultipleCorrect
    );
    let log = std::fs::read_to_string(dir.path().join("anomalies.txt")).unwrap();
    assert!(log.contains("multiple_correct"));
    assert!(report.final_outcome.unwrap().passed);
}

#[tokio::test]
async fn question_count_change_after_retake_is_flagged() {
    let dir = TempDir::new().unwrap();
    let mut session = MockExamSession::with_answer_key(&ANSWERS, 4);
    // A 交卷后重新考试，页面只剩 10 道题
    session.question_count_after_retake = Some(10);
    let mut run = InferenceRun::new(config(&dir), session);

    let report = run.run(None).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.total_questions, Some(12));

    let store = ResultStore::new(dir.path());
    let passes = store.load_all(&report.session_id).await.unwrap();
    assert!(!passes[0].flags.question_count_changed);
    for pass in &passes[1..] {
        assert!(pass.flags.question_count_changed);
        assert_eq!(pass.total_questions, 10);
    }
    let log = std::fs::read_to_string(dir.path().join("anomalies.txt")).unwrap();
    assert!(log.contains("选项 B"));

    let analysis = report.analysis.as_ref().unwrap();
    // 第 11 题只有 A 的结果（答错），其余选项未测
    let q11 = &analysis.analysis[&11];
    assert_eq!(q11.incorrect_options, vec![0]);
    assert_eq!(q11.untested_options, vec![1, 2, 3]);
    assert_eq!(q11.confidence, Confidence::UntestedGuess);
    assert_eq!(q11.recommended, 1);
    // 第 12 题的正确答案恰好是 A
    assert_eq!(analysis.analysis[&12].confidence, Confidence::High);
    assert_eq!(analysis.key.get(12), Some(0));
}
