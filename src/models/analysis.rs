use std::fmt;

use serde::{Deserialize, Serialize};

/// 推荐答案的可信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// 恰好一个选项被判对
    High,
    /// 多个选项都被判对（数据异常）
    MultipleCorrect,
    /// 所有选项都测过且都错（抓取或流程缺陷）
    AllIncorrect,
    /// 还有未测过的选项，取其中索引最小者
    UntestedGuess,
    /// 兜底
    Fallback,
}

impl Confidence {
    pub const ALL: [Confidence; 5] = [
        Confidence::High,
        Confidence::MultipleCorrect,
        Confidence::AllIncorrect,
        Confidence::UntestedGuess,
        Confidence::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::MultipleCorrect => "multiple_correct",
            Confidence::AllIncorrect => "all_incorrect",
            Confidence::UntestedGuess => "untested_guess",
            Confidence::Fallback => "fallback",
        }
    }

    /// 需要操作员复核的数据异常
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Confidence::MultipleCorrect | Confidence::AllIncorrect)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单道题的分析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalysis {
    pub question_number: u32,
    /// 被判对的选项（升序）
    pub correct_options: Vec<usize>,
    /// 被判错的选项（升序）
    pub incorrect_options: Vec<usize>,
    /// 从未测试过的选项（升序）
    pub untested_options: Vec<usize>,
    pub recommended: usize,
    pub confidence: Confidence,
}
