//! 单轮测试流程 - 流程层
//!
//! 核心职责：定义"一轮"的完整流程
//!
//! 流程顺序：
//! 1. 重新发现题目（旧的题号映射一律作废）
//! 2. 按题号升序为每道题选择同一个选项
//! 3. 交卷 → 等待结果 → 抓取总分和逐题对错
//! 4. 先落盘再返回

use std::time::{Duration, Instant};

use chrono::Local;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::PassError;
use crate::models::{normalize_per_question, PassFlags, PassResult};
use crate::services::{AnomalyWriter, ResultStore};
use crate::session::{CorrectnessScrape, ExamSession};
use crate::workflow::pass_ctx::PassCtx;

/// 单轮测试流程
///
/// - 单题选择失败只计数，不中断本轮
/// - 不持有会话，会话由调用方以 `&mut` 借入
/// - 只依赖业务能力（services）
pub struct PassRunner {
    store: ResultStore,
    anomalies: AnomalyWriter,
    selection_floor: f64,
    health_check_interval: u32,
    selection_delay: Duration,
    settle_wait: Duration,
}

impl PassRunner {
    pub fn new(config: &Config, store: ResultStore) -> Self {
        let anomalies = AnomalyWriter::new(store.dir());
        Self {
            store,
            anomalies,
            selection_floor: config.selection_success_floor,
            health_check_interval: config.health_check_interval,
            selection_delay: config.selection_delay(),
            settle_wait: config.settle_wait(),
        }
    }

    /// 跑一轮并保存结果
    ///
    /// `expected_total` 是会话记录里的题目数，本轮发现的题目数与之不同时只打标记。
    pub async fn run_pass(
        &self,
        session: &mut dyn ExamSession,
        ctx: &PassCtx,
        expected_total: Option<u32>,
    ) -> Result<PassResult, PassError> {
        let started = Instant::now();
        let mut flags = PassFlags::default();

        // ========== 发现题目 ==========
        let mut questions = match session.discover_questions().await {
            Ok(q) => q,
            Err(e) => {
                warn!("{} 发现题目出错: {:#}", ctx, e);
                Vec::new()
            }
        };
        if questions.is_empty() {
            return Err(PassError::DiscoveryFailed {
                option_label: ctx.option_label.clone(),
            });
        }
        questions.sort_by_key(|q| q.number);
        let total = questions.len() as u32;
        info!("{} 🔍 发现 {} 道题目", ctx, total);

        if let Some(expected) = expected_total.filter(|&e| e != total) {
            warn!(
                "{} ⚠️ 题目数量变化: 会话记录 {} 道，本轮 {} 道",
                ctx, expected, total
            );
            flags.question_count_changed = true;
        }

        // ========== 逐题选择 ==========
        let mut succeeded = 0u32;
        let mut failed = 0u32;
        for (i, question) in questions.iter().enumerate() {
            if self.health_check_interval > 0
                && i > 0
                && i % self.health_check_interval as usize == 0
                && !session.is_healthy().await
            {
                return Err(PassError::SessionLost {
                    option_label: ctx.option_label.clone(),
                    question: question.number,
                });
            }

            if ctx.option_index >= question.option_count {
                debug!(
                    "{} 题目 {} 只有 {} 个选项",
                    ctx, question.number, question.option_count
                );
                failed += 1;
                continue;
            }

            match session.select_answer(question.number, ctx.option_index).await {
                Ok(true) => succeeded += 1,
                Ok(false) => {
                    debug!("{} 题目 {} 选择失败", ctx, question.number);
                    failed += 1;
                }
                Err(e) => {
                    debug!("{} 题目 {} 选择出错: {:#}", ctx, question.number, e);
                    failed += 1;
                    if !session.is_healthy().await {
                        return Err(PassError::SessionLost {
                            option_label: ctx.option_label.clone(),
                            question: question.number,
                        });
                    }
                }
            }

            if !self.selection_delay.is_zero() {
                sleep(self.selection_delay).await;
            }
        }

        if succeeded == 0 {
            return Err(PassError::NoSelections {
                option_label: ctx.option_label.clone(),
                total,
            });
        }

        let ratio = succeeded as f64 / total as f64;
        info!(
            "{} ✓ 已选择 {}/{} 道题目 ({:.0}%)",
            ctx,
            succeeded,
            total,
            ratio * 100.0
        );
        if ratio < self.selection_floor {
            warn!(
                "{} ⚠️ 选择成功率 {:.0}% 低于 {:.0}%，本轮标记为低可信",
                ctx,
                ratio * 100.0,
                self.selection_floor * 100.0
            );
            flags.low_selection_ratio = true;
        }

        if !self.settle_wait.is_zero() {
            sleep(self.settle_wait).await;
        }

        // ========== 交卷 ==========
        match session.submit().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(PassError::SubmitFailed {
                    option_label: ctx.option_label.clone(),
                })
            }
            Err(e) => {
                warn!("{} 交卷出错: {:#}", ctx, e);
                if !session.is_healthy().await {
                    return Err(PassError::SessionLostOnSubmit {
                        option_label: ctx.option_label.clone(),
                    });
                }
                return Err(PassError::SubmitFailed {
                    option_label: ctx.option_label.clone(),
                });
            }
        }

        // ========== 抓取结果 ==========
        let score = session.await_and_scrape_score().await.unwrap_or_else(|e| {
            warn!("{} 抓取总分出错: {:#}", ctx, e);
            None
        });
        flags.score_missing = score.is_none();

        let scrape = session
            .await_and_scrape_correctness(total)
            .await
            .unwrap_or_else(|e| {
                warn!("{} 抓取逐题结果出错: {:#}", ctx, e);
                CorrectnessScrape::all_defaulted(total)
            });
        let (per_question, extra_defaults) = normalize_per_question(&scrape.per_question, total);
        flags.correctness_defaulted = scrape.defaulted.len() as u32 + extra_defaults;
        if flags.correctness_defaulted > 0 {
            warn!(
                "{} ⚠️ {} 道题未报告对错，按答错处理",
                ctx, flags.correctness_defaulted
            );
        }

        let correct = per_question.values().filter(|&&c| c).count();
        if PassResult::score_disagrees(score, correct) {
            warn!(
                "{} ⚠️ 总分 {:?} 与逐题结果（{} 道答对）不一致",
                ctx, score, correct
            );
            flags.score_mismatch = true;
        }

        let pass = PassResult {
            session_id: ctx.session_id.clone(),
            option_index: ctx.option_index,
            option_label: ctx.option_label.clone(),
            score,
            total_questions: total,
            per_question,
            timestamp: Local::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
            successful_selections: succeeded,
            failed_selections: failed,
            flags,
        };

        // ========== 落盘 ==========
        self.store
            .save(&pass)
            .await
            .map_err(|source| PassError::Persist {
                option_label: ctx.option_label.clone(),
                source,
            })?;

        if pass.flags.is_flagged() {
            if let Err(e) = self.anomalies.write_pass(&pass).await {
                warn!("{} 写入 anomalies.txt 失败: {:#}", ctx, e);
            }
        }

        match score {
            Some(s) => info!(
                "{} 📊 总分 {:.1}%，答对 {}/{}，用时 {:.1}s",
                ctx, s, correct, total, pass.duration_seconds
            ),
            None => info!(
                "{} 📊 总分未知，答对 {}/{}，用时 {:.1}s",
                ctx, correct, total, pass.duration_seconds
            ),
        }
        Ok(pass)
    }
}
