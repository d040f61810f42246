//! 推断运行 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个推断过程的入口，持有唯一的考试会话并按状态机推进：
//!
//! ```text
//! Init → Discovering → Pass(A) → Pass(B) → ... → Analyzing → KeyBuilt → FinalSubmitted
//!                  \________________ 任一步不可恢复 ________________/→ Aborted
//! ```
//!
//! ## 核心功能
//!
//! 1. **会话管理**：新建或恢复会话记录，恢复时跳过已完成的选项
//! 2. **逐轮调度**：每轮之前确保会话存活并回到答题页，再委托 PassRunner
//! 3. **故障吸收**：单轮失败后恢复会话并重跑该选项，重跑次数有上限；
//!    仍有选项缺结果时不交卷，直接终止并保留会话
//! 4. **分析与交卷**：委托分析阶段生成答案，再委托 FinalSubmitter 交卷
//!
//! 终止时已保存的轮次全部保留，并尽量用现有数据生成一份答案文件。

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{error_chain, AppResult, RunError};
use crate::models::{OptionSet, PassResult, SessionRecord};
use crate::orchestrator::analysis_stage::{analyze_session, AnalysisOutput};
use crate::services::ResultStore;
use crate::session::ExamSession;
use crate::workflow::{FinalOutcome, FinalSubmitter, PassCtx, PassRunner, Recovery};

/// 推断运行的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Discovering,
    /// 正在跑某个选项的轮次
    Pass(usize),
    Analyzing,
    KeyBuilt,
    FinalSubmitted,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::FinalSubmitted | RunState::Aborted)
    }
}

/// 一次运行的汇总
#[derive(Debug)]
pub struct RunReport {
    pub session_id: String,
    pub state: RunState,
    pub total_questions: Option<u32>,
    /// 运行结束时已保存结果的选项
    pub completed_options: BTreeSet<usize>,
    /// 本次运行中至少失败过一次的选项
    pub failed_options: Vec<usize>,
    pub analysis: Option<AnalysisOutput>,
    pub final_outcome: Option<FinalOutcome>,
    pub abort_reason: Option<RunError>,
}

impl RunReport {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: RunState::Init,
            total_questions: None,
            completed_options: BTreeSet::new(),
            failed_options: Vec::new(),
            analysis: None,
            final_outcome: None,
            abort_reason: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::FinalSubmitted
    }
}

/// 推断运行
///
/// 唯一持有考试会话的模块；PassRunner 和 FinalSubmitter 只在被调用期间借用它。
pub struct InferenceRun<S: ExamSession> {
    config: Config,
    session: S,
    store: ResultStore,
    options: OptionSet,
    runner: PassRunner,
    recovery: Recovery,
    submitter: FinalSubmitter,
    state: RunState,
    cancel: Arc<AtomicBool>,
}

impl<S: ExamSession> InferenceRun<S> {
    pub fn new(config: Config, session: S) -> Self {
        let store = ResultStore::new(&config.results_dir);
        Self {
            options: config.options(),
            runner: PassRunner::new(&config, store.clone()),
            recovery: Recovery::new(&config),
            submitter: FinalSubmitter::new(&config),
            store,
            session,
            config,
            state: RunState::Init,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 置位后，运行在下一轮开始前终止
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// 完整运行：所有选项的轮次 → 分析 → 交卷
    ///
    /// `resume` 给出会话 ID 时继续该会话，已保存结果的选项不再重跑。
    pub async fn run(&mut self, resume: Option<&str>) -> AppResult<RunReport> {
        self.transition(RunState::Init);
        let mut record = self.open_session(resume).await?;
        let session_id = record.session_id.clone();
        let mut report = RunReport::new(&session_id);

        let mut completed = self.store.completed_options(&session_id).await?;
        if !completed.is_empty() {
            info!(
                "⏭️ 会话 {} 已完成选项 {}，将跳过",
                session_id,
                self.labels(&completed)
            );
        }

        // ========== 发现题目 ==========
        self.transition(RunState::Discovering);
        let total = match self.discover(&mut record).await {
            Ok(total) => total,
            Err(reason) => return self.abort(report, reason).await,
        };
        report.total_questions = Some(total);

        // ========== 逐个选项测试 ==========
        let max_attempts = self.config.pass_max_attempts.max(1);
        let mut missing = BTreeSet::new();
        let mut first = true;
        for option_index in self.options.indices() {
            if completed.contains(&option_index) {
                continue;
            }
            let ctx = PassCtx::new(&session_id, option_index, &self.options);

            if self.is_cancelled() {
                return self.abort(report, RunError::Cancelled).await;
            }
            if !first && self.config.confirm_between_passes && !self.confirm_next(&ctx).await {
                return self.abort(report, RunError::Cancelled).await;
            }
            first = false;

            self.transition(RunState::Pass(option_index));
            info!("\n{}", "─".repeat(60));
            info!("{} 🚀 开始测试", ctx);

            for attempt in 1..=max_attempts {
                if attempt > 1 {
                    if self.is_cancelled() {
                        return self.abort(report, RunError::Cancelled).await;
                    }
                    info!("{} 🔁 重跑 (第 {}/{} 次)", ctx, attempt, max_attempts);
                }
                if let Err(reason) = self.recovery.ensure_on_exam_page(&mut self.session).await {
                    return self.abort(report, reason).await;
                }

                match self
                    .runner
                    .run_pass(&mut self.session, &ctx, Some(total))
                    .await
                {
                    Ok(_) => {
                        completed.insert(option_index);
                        break;
                    }
                    Err(e) => {
                        error!("{} ❌ {}", ctx, error_chain(&e));
                        if !report.failed_options.contains(&option_index) {
                            report.failed_options.push(option_index);
                        }
                        if e.needs_recovery() {
                            if let Err(reason) = self.recovery.recover(&mut self.session).await {
                                return self.abort(report, reason).await;
                            }
                        }
                    }
                }
            }

            if !completed.contains(&option_index) {
                warn!("{} ⚠️ 已跑 {} 次仍未完成", ctx, max_attempts);
                missing.insert(option_index);
            }
        }

        // 有选项缺结果时不交卷，保留会话以便继续
        if !missing.is_empty() {
            let reason = RunError::PassesIncomplete {
                missing: self.labels(&missing),
                attempts: max_attempts,
            };
            return self.abort(report, reason).await;
        }

        // ========== 分析 ==========
        self.transition(RunState::Analyzing);
        let output = analyze_session(&self.store, &self.options, &session_id).await?;
        self.transition(RunState::KeyBuilt);
        for line in output.report.render(&self.options, self.config.pass_threshold).lines() {
            info!("{}", line);
        }
        let key = output.key.clone();
        report.analysis = Some(output);

        // ========== 最终交卷 ==========
        if self.is_cancelled() {
            return self.abort(report, RunError::Cancelled).await;
        }
        if let Err(reason) = self.recovery.ensure_on_exam_page(&mut self.session).await {
            return self.abort(report, reason).await;
        }
        match self.submitter.submit(&mut self.session, &key).await {
            Ok(outcome) => {
                report.final_outcome = Some(outcome);
                self.transition(RunState::FinalSubmitted);
            }
            Err(e) => {
                let reason = RunError::FinalSubmitFailed {
                    reason: format!("{:#}", e),
                };
                return self.abort(report, reason).await;
            }
        }

        self.finish(report).await
    }

    /// 只跑一个选项的轮次（新会话或继续已有会话）
    pub async fn run_single_pass(
        &mut self,
        resume: Option<&str>,
        option_index: usize,
    ) -> AppResult<PassResult> {
        self.transition(RunState::Init);
        let mut record = self.open_session(resume).await?;
        let ctx = PassCtx::new(&record.session_id, option_index, &self.options);

        if self
            .store
            .completed_options(&record.session_id)
            .await?
            .contains(&option_index)
        {
            warn!("{} 已有结果，将被覆盖", ctx);
        }

        self.transition(RunState::Discovering);
        let total = self.discover(&mut record).await?;

        self.transition(RunState::Pass(option_index));
        let pass = self.runner.run_pass(&mut self.session, &ctx, Some(total)).await?;
        Ok(pass)
    }

    // ========== 阶段辅助方法 ==========

    /// 新建或加载会话记录；新会话先等待操作员登录
    async fn open_session(&mut self, resume: Option<&str>) -> AppResult<SessionRecord> {
        let record = match resume {
            Some(id) => match self.store.load_session(id).await? {
                Some(record) => {
                    info!("📂 继续会话 {}", id);
                    record
                }
                None => {
                    warn!("⚠️ 会话 {} 没有记录，按新会话创建", id);
                    SessionRecord::with_id(id, &self.config.exam_url)
                }
            },
            None => {
                let login_wait = self.config.login_wait();
                if !login_wait.is_zero() {
                    info!(
                        "⏳ 请在 {} 秒内完成登录并打开考试页面...",
                        login_wait.as_secs()
                    );
                    sleep(login_wait).await;
                }
                SessionRecord::new(&self.config.exam_url)
            }
        };
        self.store.save_session(&record).await?;
        info!("🆔 会话 ID: {}", record.session_id);
        Ok(record)
    }

    /// 确保在答题页并发现题目，把题目数写入会话记录
    async fn discover(&mut self, record: &mut SessionRecord) -> Result<u32, RunError> {
        self.recovery.ensure_on_exam_page(&mut self.session).await?;

        let found = match self.session.discover_questions().await {
            Ok(questions) => questions.len() as u32,
            Err(e) => {
                warn!("发现题目出错: {:#}", e);
                0
            }
        };
        if found == 0 {
            return Err(RunError::DiscoveryFailed);
        }
        if let Some(url) = self.session.current_url().await {
            debug!("当前页面: {}", url);
        }

        let total = match record.total_questions {
            Some(known) if known != found => {
                warn!(
                    "⚠️ 页面现有 {} 道题，会话记录为 {} 道，以会话记录为准",
                    found, known
                );
                known
            }
            Some(known) => known,
            None => {
                record.total_questions = Some(found);
                if let Err(e) = self.store.save_session(record).await {
                    warn!("更新会话记录失败: {}", error_chain(&e));
                }
                found
            }
        };
        info!("✓ 共 {} 道题目", total);
        Ok(total)
    }

    async fn abort(&mut self, mut report: RunReport, reason: RunError) -> AppResult<RunReport> {
        error!("❌ 运行终止: {}", reason);

        let has_passes = self
            .store
            .completed_options(&report.session_id)
            .await
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        if report.analysis.is_none() && has_passes {
            match analyze_session(&self.store, &self.options, &report.session_id).await {
                Ok(output) => {
                    info!("💡 已用现有结果生成答案: {}", output.artifact_path.display());
                    report.analysis = Some(output);
                }
                Err(e) => warn!("无法用现有结果生成答案: {}", error_chain(&e)),
            }
        }

        report.abort_reason = Some(reason);
        self.transition(RunState::Aborted);
        self.finish(report).await
    }

    async fn finish(&mut self, mut report: RunReport) -> AppResult<RunReport> {
        report.state = self.state;
        report.completed_options = self.store.completed_options(&report.session_id).await?;
        Ok(report)
    }

    /// 等待操作员确认下一轮；输入 q 或读到 EOF 视为中断
    async fn confirm_next(&self, ctx: &PassCtx) -> bool {
        println!("{} 按回车开始测试，输入 q 退出: ", ctx);
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => false,
            Ok(_) => !line.trim().eq_ignore_ascii_case("q"),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: RunState) {
        debug!("状态: {:?} → {:?}", self.state, next);
        self.state = next;
    }

    fn labels(&self, indices: &BTreeSet<usize>) -> String {
        indices
            .iter()
            .map(|&i| self.options.label(i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
