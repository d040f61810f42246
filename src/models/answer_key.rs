use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::analysis::{Confidence, QuestionAnalysis};
use super::option::OptionSet;
use super::session::SessionSummary;

/// 最终答案：题号 → 选项索引
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey(BTreeMap<u32, usize>);

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question_number: u32, option_index: usize) {
        self.0.insert(question_number, option_index);
    }

    pub fn get(&self, question_number: u32) -> Option<usize> {
        self.0.get(&question_number).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按题号升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.0.iter().map(|(&q, &o)| (q, o))
    }

    /// 是否恰好覆盖 1..=total_questions
    pub fn covers(&self, total_questions: u32) -> bool {
        self.0.len() == total_questions as usize
            && self.0.keys().copied().eq(1..=total_questions)
    }
}

impl FromIterator<(u32, usize)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (u32, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 各可信度的题目数和预期得分
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCounts {
    pub high: u32,
    pub multiple_correct: u32,
    pub all_incorrect: u32,
    pub untested_guess: u32,
    pub fallback: u32,
    pub expected_score: f64,
}

impl SummaryCounts {
    pub fn count(&self, confidence: Confidence) -> u32 {
        match confidence {
            Confidence::High => self.high,
            Confidence::MultipleCorrect => self.multiple_correct,
            Confidence::AllIncorrect => self.all_incorrect,
            Confidence::UntestedGuess => self.untested_guess,
            Confidence::Fallback => self.fallback,
        }
    }

    pub fn record(&mut self, confidence: Confidence) {
        match confidence {
            Confidence::High => self.high += 1,
            Confidence::MultipleCorrect => self.multiple_correct += 1,
            Confidence::AllIncorrect => self.all_incorrect += 1,
            Confidence::UntestedGuess => self.untested_guess += 1,
            Confidence::Fallback => self.fallback += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.high + self.multiple_correct + self.all_incorrect + self.untested_guess + self.fallback
    }
}

/// 持久化的答案文件，可脱离推断过程单独复用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeyArtifact {
    pub generated_at: DateTime<Local>,
    pub total_questions: u32,
    pub sessions_analyzed: Vec<SessionSummary>,
    pub option_labels: OptionSet,
    pub answer_key: AnswerKey,
    pub per_question_analysis: BTreeMap<u32, QuestionAnalysis>,
    pub summary_counts: SummaryCounts,
}
