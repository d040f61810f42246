//! # Exam Key Solver
//!
//! 通过多轮统一选项交卷，推断一份选择题考试的标准答案，然后提交推断出的答案
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `session/` - `ExamSession` 能力边界，浏览器实现与模拟实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `ResultStore` - 轮次结果、会话记录、答案文件的读写
//! - `analyze` - 纯函数：全部轮次 → 每题推荐与可信度
//! - `AnswerKeyBuilder` - 答案、报告、预期得分
//! - `AnomalyWriter` - 写 anomalies.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一轮"和"最终交卷"的完整流程
//! - `PassCtx` - 上下文封装（session_id + option）
//! - `PassRunner` - 发现 → 逐题选择 → 交卷 → 抓取 → 落盘
//! - `FinalSubmitter` - 按答案选择 → 交卷 → 与及格线比较
//! - `Recovery` - 有上限的会话恢复和重新考试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/inference_run` - 推断运行状态机，持有会话
//! - `orchestrator/analysis_stage` - 加载轮次、分析、保存答案
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod session;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{AnswerKey, Confidence, OptionSet, PassResult, QuestionAnalysis};
pub use orchestrator::{analyze_all_sessions, analyze_session, InferenceRun, RunReport, RunState};
pub use services::{analyze, AnswerKeyBuilder, ResultStore};
pub use session::{BrowserExamSession, ExamSession, MockExamSession};
pub use workflow::{FinalOutcome, FinalSubmitter, PassCtx, PassRunner};
