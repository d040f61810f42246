//! 子命令实现

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use exam_key_solver::services::ResultStore;
use exam_key_solver::utils::logging;
use exam_key_solver::workflow::{FinalSubmitter, Recovery};
use exam_key_solver::{
    analyze_all_sessions, analyze_session, BrowserExamSession, Config, InferenceRun,
};

pub async fn run(config: Config, session: Option<String>) -> Result<()> {
    logging::init_log_file(&config.output_log_file)?;
    logging::log_startup(&config);

    let browser = BrowserExamSession::connect(&config)
        .await
        .context("无法建立浏览器会话")?;
    let log_file = config.output_log_file.clone();
    let threshold = config.pass_threshold;
    let options = config.options();
    let mut inference = InferenceRun::new(config, browser);

    let cancel = inference.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到中断信号，当前轮次结束后停止");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = inference.run(session.as_deref()).await?;

    logging::print_final_stats(&report, &log_file);
    let mut log_text = logging::summarize_run(&report);
    if let Some(analysis) = &report.analysis {
        log_text = format!("{}\n\n{}", analysis.report.render(&options, threshold), log_text);
    }
    if let Err(e) = logging::append_log(&log_file, &log_text) {
        warn!("写入日志文件失败: {:#}", e);
    }

    match report.abort_reason {
        Some(reason) => Err(anyhow!(reason).context(format!(
            "会话 {} 未完成，可用 --session {} 继续",
            report.session_id, report.session_id
        ))),
        None => Ok(()),
    }
}

pub async fn pass(config: Config, option: &str, session: Option<String>) -> Result<()> {
    let options = config.options();
    let option_index = options
        .resolve(option)
        .ok_or_else(|| anyhow!("未知选项 '{}'，可选: {:?}", option, config.option_labels))?;

    let browser = BrowserExamSession::connect(&config)
        .await
        .context("无法建立浏览器会话")?;
    let mut inference = InferenceRun::new(config, browser);
    let pass = inference.run_single_pass(session.as_deref(), option_index).await?;

    println!(
        "会话 {} 选项 {}: 总分 {}，答对 {}/{}",
        pass.session_id,
        pass.option_label,
        pass.score
            .map(|s| format!("{:.1}%", s))
            .unwrap_or_else(|| "未知".to_string()),
        pass.correct_count(),
        pass.total_questions
    );
    for note in pass.flags.describe() {
        println!("  ⚠️ {}", note);
    }
    Ok(())
}

pub async fn analyze(config: Config, session: Option<String>, all: bool) -> Result<()> {
    let store = ResultStore::new(&config.results_dir);
    let options = config.options();

    let output = if all {
        analyze_all_sessions(&store, &options).await?
    } else {
        let session_id = resolve_session(&store, session).await?;
        analyze_session(&store, &options, &session_id).await?
    };

    if output.sessions.len() > 1 {
        let ids: Vec<&str> = output.sessions.iter().map(|s| s.session_id.as_str()).collect();
        println!("参与分析的会话: {}", ids.join(", "));
    }
    println!("{}", output.report.render(&options, config.pass_threshold));
    println!("答案文件: {}", output.artifact_path.display());
    Ok(())
}

pub async fn submit(config: Config, key: Option<PathBuf>) -> Result<()> {
    let store = ResultStore::new(&config.results_dir);
    let (path, artifact) = match key {
        Some(path) => {
            let artifact = store.load_answer_key(&path).await?;
            (path, artifact)
        }
        None => store
            .latest_answer_key()
            .await?
            .ok_or_else(|| anyhow!("{} 中没有答案文件，请先运行 analyze", config.results_dir))?,
    };
    info!("📄 使用答案文件: {}", path.display());
    if artifact.option_labels != config.options() {
        warn!(
            "⚠️ 答案文件的选项 {:?} 与当前配置 {:?} 不同",
            artifact.option_labels, config.option_labels
        );
    }

    let mut browser = BrowserExamSession::connect(&config)
        .await
        .context("无法建立浏览器会话")?;
    Recovery::new(&config)
        .ensure_on_exam_page(&mut browser)
        .await?;
    let outcome = FinalSubmitter::new(&config)
        .submit(&mut browser, &artifact.answer_key)
        .await?;

    println!("{}", outcome);
    Ok(())
}

pub async fn status(config: Config, session: Option<String>) -> Result<()> {
    let store = ResultStore::new(&config.results_dir);
    let session_id = resolve_session(&store, session).await?;
    let options = config.options();

    let record = store.load_session(&session_id).await?;
    let passes = store.load_all(&session_id).await?;
    let total = record
        .as_ref()
        .and_then(|r| r.total_questions)
        .or_else(|| passes.iter().map(|p| p.total_questions).max());

    match total {
        Some(total) => println!("会话 {}（{} 道题）", session_id, total),
        None => println!("会话 {}（题目数未知）", session_id),
    }

    let mut missing = Vec::new();
    for option_index in options.indices() {
        let label = options.label(option_index);
        match passes.iter().find(|p| p.option_index == option_index) {
            Some(pass) => {
                let score = pass
                    .score
                    .map(|s| format!("{:.1}%", s))
                    .unwrap_or_else(|| "未知".to_string());
                let flagged = if pass.flags.is_flagged() { " ⚠️" } else { "" };
                println!(
                    "  {}: ✓ 总分 {}，答对 {}/{}{}",
                    label,
                    score,
                    pass.correct_count(),
                    pass.total_questions,
                    flagged
                );
            }
            None => {
                println!("  {}: 未测试", label);
                missing.push(label);
            }
        }
    }

    if missing.is_empty() {
        println!("所有选项均已完成");
    } else {
        println!("缺少选项: {}", missing.join(", "));
    }
    Ok(())
}

async fn resolve_session(store: &ResultStore, session: Option<String>) -> Result<String> {
    if let Some(id) = session {
        return Ok(id);
    }
    match store.latest_session_id().await? {
        Some(id) => Ok(id),
        None => bail!("{} 中没有任何会话", store.dir().display()),
    }
}
