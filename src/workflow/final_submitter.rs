//! 最终交卷流程 - 流程层
//!
//! 按答案逐题选择、交卷、抓取总分，与及格线比较。不自动重试。

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{AnswerKey, OptionSet};
use crate::session::ExamSession;

/// 最终交卷的结果
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutcome {
    pub score: Option<f64>,
    pub threshold: f64,
    /// 没有抓到总分时视为未及格
    pub passed: bool,
    pub total_questions: u32,
    pub applied: u32,
    pub failed_selections: u32,
}

impl fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "及格" } else { "未及格" };
        match self.score {
            Some(s) => write!(f, "总分 {:.1}%（及格线 {:.0}%）: {}", s, self.threshold, verdict)?,
            None => write!(f, "未抓取到总分（及格线 {:.0}%）: {}", self.threshold, verdict)?,
        }
        if self.failed_selections > 0 {
            write!(f, "，{} 道题选择失败", self.failed_selections)?;
        }
        Ok(())
    }
}

pub struct FinalSubmitter {
    threshold: f64,
    options: OptionSet,
    selection_delay: Duration,
    settle_wait: Duration,
}

impl FinalSubmitter {
    pub fn new(config: &Config) -> Self {
        Self {
            threshold: config.pass_threshold,
            options: config.options(),
            selection_delay: config.selection_delay(),
            settle_wait: config.settle_wait(),
        }
    }

    /// 应用答案并交卷
    ///
    /// 调用方需保证页面在答题页上。
    pub async fn submit(&self, session: &mut dyn ExamSession, key: &AnswerKey) -> Result<FinalOutcome> {
        let questions = session.discover_questions().await?;
        if questions.is_empty() {
            bail!("答题页上没有找到题目");
        }
        let total = questions.len() as u32;
        if !key.covers(total) {
            warn!(
                "⚠️ 答案覆盖 {} 道题，页面上有 {} 道题",
                key.len(),
                total
            );
        }

        info!("📝 正在填写最终答案...");
        let mut applied = 0u32;
        let mut failed = 0u32;
        for (q, option) in key.iter() {
            let ok = match session.select_answer(q, option).await {
                Ok(ok) => ok,
                Err(e) => {
                    debug!("题目 {} 选择出错: {:#}", q, e);
                    false
                }
            };
            if ok {
                applied += 1;
            } else {
                warn!("⚠️ 题目 {} 无法选择 {}", q, self.options.label(option));
                failed += 1;
            }
            if !self.selection_delay.is_zero() {
                sleep(self.selection_delay).await;
            }
        }
        info!("✓ 已填写 {}/{} 道题目", applied, key.len());

        if !self.settle_wait.is_zero() {
            sleep(self.settle_wait).await;
        }

        if !session.submit().await? {
            bail!("没有找到交卷按钮");
        }

        let score = session.await_and_scrape_score().await.unwrap_or_else(|e| {
            warn!("抓取总分出错: {:#}", e);
            None
        });
        let passed = score.is_some_and(|s| s >= self.threshold);

        let outcome = FinalOutcome {
            score,
            threshold: self.threshold,
            passed,
            total_questions: total,
            applied,
            failed_selections: failed,
        };
        if passed {
            info!("🎉 {}", outcome);
        } else {
            warn!("❌ {}", outcome);
        }
        Ok(outcome)
    }
}
