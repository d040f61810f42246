//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次推断运行的状态推进，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `inference_run` - 推断运行
//! - 持有唯一的考试会话
//! - 新建或恢复会话，跳过已完成的选项
//! - 逐个选项调度 PassRunner，吸收单轮故障
//! - 处理中断、会话恢复失败、重新考试耗尽
//! - 委托 FinalSubmitter 交卷
//!
//! ### `analysis_stage` - 分析阶段
//! - 从结果存储加载全部轮次
//! - 调用 Analyzer 和 AnswerKeyBuilder
//! - 保存答案文件、记录异常
//!
//! ## 层次关系
//!
//! ```text
//! inference_run (处理所有选项)
//!     ↓
//! workflow::PassRunner / FinalSubmitter (处理一轮)
//!     ↓
//! services (能力层：store / analyzer / key builder / anomalies)
//!     ↓
//! session::ExamSession → infrastructure (JsExecutor)
//! ```

pub mod analysis_stage;
pub mod inference_run;

pub use analysis_stage::{analyze_all_sessions, analyze_session, AnalysisOutput};
pub use inference_run::{InferenceRun, RunReport, RunState};
