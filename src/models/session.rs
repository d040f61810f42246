use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 一次推断运行的会话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub exam_url: String,
    pub start_time: DateTime<Local>,
    /// 发现题目成功后固定下来的题目数
    pub total_questions: Option<u32>,
}

impl SessionRecord {
    pub fn new(exam_url: impl Into<String>) -> Self {
        let start_time = Local::now();
        Self {
            session_id: start_time.format("%Y%m%d_%H%M%S").to_string(),
            exam_url: exam_url.into(),
            start_time,
            total_questions: None,
        }
    }

    pub fn with_id(session_id: impl Into<String>, exam_url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            exam_url: exam_url.into(),
            start_time: Local::now(),
            total_questions: None,
        }
    }
}

/// 答案文件中记录的被分析会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub timestamp: DateTime<Local>,
}
