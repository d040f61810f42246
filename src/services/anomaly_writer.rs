//! 异常记录服务 - 业务能力层
//!
//! 只负责"写 anomalies.txt"能力，不关心流程

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::{OptionSet, PassResult, QuestionAnalysis};

pub const ANOMALY_FILE: &str = "anomalies.txt";

/// 异常记录服务
///
/// 职责：
/// - 把数据异常的题目（multiple_correct / all_incorrect）追加到 anomalies.txt
/// - 把带诊断标记的轮次追加到 anomalies.txt
/// - 只追加，不做判断
pub struct AnomalyWriter {
    path: PathBuf,
}

impl AnomalyWriter {
    /// 在结果目录下写 anomalies.txt
    pub fn new(results_dir: impl AsRef<Path>) -> Self {
        Self {
            path: results_dir.as_ref().join(ANOMALY_FILE),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 记录一道需要复核的题目
    ///
    /// 同样的内容已经记录过时跳过，返回是否写入。
    pub async fn write_question(
        &self,
        session_id: &str,
        analysis: &QuestionAnalysis,
        options: &OptionSet,
    ) -> Result<bool> {
        let labels = |indices: &[usize]| {
            indices
                .iter()
                .map(|&i| options.label(i))
                .collect::<Vec<_>>()
                .join(",")
        };
        let line = format!(
            "会话 {} | 题目 {} | {} | 判对: [{}] | 判错: [{}] | 推荐: {}",
            session_id,
            analysis.question_number,
            analysis.confidence,
            labels(&analysis.correct_options),
            labels(&analysis.incorrect_options),
            options.label(analysis.recommended)
        );
        if self.already_recorded(&line).await? {
            debug!("已记录过，跳过: {}", line);
            return Ok(false);
        }
        self.append(&line).await?;
        Ok(true)
    }

    /// 记录一个带诊断标记的轮次
    pub async fn write_pass(&self, pass: &PassResult) -> Result<()> {
        let line = format!(
            "会话 {} | 选项 {} | 选择 {}/{} | {}",
            pass.session_id,
            pass.option_label,
            pass.successful_selections,
            pass.total_questions,
            pass.flags.describe().join("; ")
        );
        self.append(&line).await
    }

    /// 去掉时间戳后是否已有相同的记录
    async fn already_recorded(&self, line: &str) -> Result<bool> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(false);
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("无法读取 {}", self.path.display()))?;
        Ok(content
            .lines()
            .any(|l| l.split_once("] ").map(|(_, body)| body) == Some(line)))
    }

    async fn append(&self, line: &str) -> Result<()> {
        debug!("写入异常记录: {}", line);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建目录 {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("无法打开 {}", self.path.display()))?;

        let entry = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
