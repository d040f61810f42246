//! 日志工具模块
//!
//! 提供日志初始化、运行日志文件和统计输出的辅助函数

use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::RunReport;

/// 初始化 tracing 输出
///
/// 优先使用 `RUST_LOG`，否则默认 info，详细模式下为 debug。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 库和命令行两个 crate 的默认日志级别
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("exam_key_solver={level},exam_solver={level}")
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n答案推断日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法创建日志文件 {}", log_file_path))?;
    Ok(())
}

/// 向日志文件追加一段文本
pub fn append_log(log_file_path: &str, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件 {}", log_file_path))?;
    writeln!(file, "{}", text)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多轮答案推断模式");
    info!("🌐 考试地址: {}", config.exam_url);
    info!("🔤 候选选项: {}", config.option_labels.join(", "));
    info!("📁 结果目录: {}", config.results_dir);
    info!("🎯 及格线: {:.0}%", config.pass_threshold);
    info!("{}", "=".repeat(60));
}

/// 运行汇总的文本形式（同时用于终端和日志文件）
pub fn summarize_run(report: &RunReport) -> String {
    let mut lines = vec![
        "=".repeat(60),
        "📊 运行结束统计".to_string(),
        format!(
            "完成时间: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ),
        format!("会话: {}", report.session_id),
        format!("状态: {:?}", report.state),
    ];
    if let Some(total) = report.total_questions {
        lines.push(format!("题目数: {}", total));
    }
    lines.push(format!(
        "✅ 已完成选项: {:?}",
        report.completed_options
    ));
    if !report.failed_options.is_empty() {
        lines.push(format!("❌ 失败的轮次: {:?}", report.failed_options));
    }
    if let Some(analysis) = &report.analysis {
        lines.push(format!(
            "📋 预期得分: {:.1}%",
            analysis.report.expected_score()
        ));
        lines.push(format!("💾 答案文件: {}", analysis.artifact_path.display()));
    }
    if let Some(outcome) = &report.final_outcome {
        lines.push(format!("🏁 最终结果: {}", outcome));
    }
    if let Some(reason) = &report.abort_reason {
        lines.push(format!("⛔ 终止原因: {}", reason));
    }
    lines.push("=".repeat(60));
    lines.join("\n")
}

/// 打印最终统计信息
pub fn print_final_stats(report: &RunReport, log_file_path: &str) {
    for line in summarize_run(report).lines() {
        info!("{}", line);
    }
    info!("日志已保存至: {}", log_file_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_cover_library_and_cli() {
        let info = default_directives(false);
        assert!(info.contains("exam_key_solver=info"));
        assert!(info.contains("exam_solver=info"));
        assert!(default_directives(true).contains("exam_solver=debug"));
        assert!(EnvFilter::try_new(info).is_ok());
    }

    #[test]
    fn log_file_header_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let path = path.to_str().unwrap();

        init_log_file(path).unwrap();
        append_log(path, "第一行").unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("答案推断日志"));
        assert!(content.ends_with("第一行\n"));
    }
}
