//! 分析阶段 - 编排层
//!
//! ## 职责
//!
//! 从结果存储加载轮次，交给 Analyzer 和 AnswerKeyBuilder，
//! 把答案文件写回结果目录，并把需要复核的题目追加到 anomalies.txt。
//!
//! 两种取数方式：
//! - 单个会话：该会话保存的全部轮次
//! - 全部会话：每个选项取最新的一轮（每个选项单独起一个会话时用）
//!
//! 不需要浏览器：`run` 命令在所有轮次完成后调用，`analyze` 命令离线调用。

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Local;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AnswerKey, OptionSet, PassResult, QuestionAnalysis, SessionSummary};
use crate::services::{analyze, AnomalyWriter, AnswerKeyBuilder, KeyReport, ResultStore};

/// 一次分析的产物
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    /// 提供了轮次的会话，按时间升序
    pub sessions: Vec<SessionSummary>,
    pub total_questions: u32,
    /// 参与分析的轮次（选项索引）
    pub options_tested: Vec<usize>,
    pub analysis: BTreeMap<u32, QuestionAnalysis>,
    pub key: AnswerKey,
    pub report: KeyReport,
    pub artifact_path: PathBuf,
}

/// 分析某会话并保存答案文件
pub async fn analyze_session(
    store: &ResultStore,
    options: &OptionSet,
    session_id: &str,
) -> AppResult<AnalysisOutput> {
    let record = store.load_session(session_id).await?;
    let passes = store.load_all(session_id).await?;

    let total_questions = record
        .as_ref()
        .and_then(|r| r.total_questions)
        .or_else(|| passes.iter().map(|p| p.total_questions).max())
        .ok_or_else(|| {
            AppError::Other(format!(
                "会话 {} 没有题目数记录，也没有任何轮次结果",
                session_id
            ))
        })?;

    info!(
        "📂 会话 {}: {} 道题目，已有 {} 轮结果",
        session_id,
        total_questions,
        passes.len()
    );

    let started = record
        .as_ref()
        .map(|r| r.start_time)
        .or_else(|| passes.iter().map(|p| p.timestamp).min())
        .unwrap_or_else(Local::now);
    let sessions = vec![SessionSummary {
        session_id: session_id.to_string(),
        timestamp: started,
    }];

    build_and_save(store, options, total_questions, passes, sessions).await
}

/// 跨会话分析：每个选项取最新的一轮
pub async fn analyze_all_sessions(
    store: &ResultStore,
    options: &OptionSet,
) -> AppResult<AnalysisOutput> {
    let mut newest: BTreeMap<usize, PassResult> = BTreeMap::new();
    for pass in store.load_every_session().await? {
        // 按时间升序加载，后来的覆盖先前的
        newest.insert(pass.option_index, pass);
    }
    if newest.is_empty() {
        return Err(AppError::Other(format!(
            "{} 中没有任何轮次结果",
            store.dir().display()
        )));
    }
    let passes: Vec<PassResult> = newest.into_values().collect();

    let session_ids: BTreeSet<&str> = passes.iter().map(|p| p.session_id.as_str()).collect();
    let mut sessions = Vec::new();
    let mut recorded_total = None;
    for id in session_ids {
        let record = store.load_session(id).await?;
        recorded_total = recorded_total.max(record.as_ref().and_then(|r| r.total_questions));
        let started = record
            .map(|r| r.start_time)
            .or_else(|| {
                passes
                    .iter()
                    .filter(|p| p.session_id == id)
                    .map(|p| p.timestamp)
                    .min()
            })
            .unwrap_or_else(Local::now);
        sessions.push(SessionSummary {
            session_id: id.to_string(),
            timestamp: started,
        });
    }
    sessions.sort_by_key(|s| s.timestamp);

    let total_questions = recorded_total
        .or_else(|| passes.iter().map(|p| p.total_questions).max())
        .unwrap_or(0);

    info!(
        "📂 {} 个会话: {} 道题目，共 {} 轮结果",
        sessions.len(),
        total_questions,
        passes.len()
    );
    for pass in &passes {
        info!(
            "  选项 {}: 来自会话 {}，答对 {}/{}",
            pass.option_label,
            pass.session_id,
            pass.correct_count(),
            pass.total_questions
        );
    }

    build_and_save(store, options, total_questions, passes, sessions).await
}

async fn build_and_save(
    store: &ResultStore,
    options: &OptionSet,
    total_questions: u32,
    passes: Vec<PassResult>,
    sessions: Vec<SessionSummary>,
) -> AppResult<AnalysisOutput> {
    if passes.is_empty() {
        warn!("⚠️ 没有任何轮次结果，所有答案都只是猜测");
    }

    let analysis = analyze(total_questions, &passes, options);
    let builder = AnswerKeyBuilder::new(options.clone());
    let (key, report) = builder.build(&analysis);

    let source = sessions
        .iter()
        .map(|s| s.session_id.as_str())
        .collect::<Vec<_>>()
        .join("+");
    let anomalies = AnomalyWriter::new(store.dir());
    for q in &report.anomalies {
        if let Some(a) = analysis.get(q) {
            warn!("⚠️ 题目 {} 数据异常: {}", q, a.confidence);
            if let Err(e) = anomalies.write_question(&source, a, options).await {
                warn!("写入 anomalies.txt 失败: {:#}", e);
            }
        }
    }

    let artifact = builder.artifact(analysis.clone(), key.clone(), &report, sessions.clone());
    let artifact_path = store.save_answer_key(&artifact).await?;
    info!("💾 答案已保存至: {}", artifact_path.display());

    Ok(AnalysisOutput {
        sessions,
        total_questions,
        options_tested: passes.iter().map(|p| p.option_index).collect(),
        analysis,
        key,
        report,
        artifact_path,
    })
}
