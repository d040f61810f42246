//! 单轮测试结果
//!
//! 一轮 = 所有题目统一选择同一个选项、交卷、抓取结果。
//! 记录一旦保存即不可变，同一会话内同一选项重跑会覆盖旧记录。

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 诊断标记，不影响结果是否可用
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PassFlags {
    /// 选择成功率低于下限
    pub low_selection_ratio: bool,
    /// 没有抓到总分
    pub score_missing: bool,
    /// 页面未报告、按"答错"补齐的题目数
    pub correctness_defaulted: u32,
    /// 本轮发现的题目数与会话记录不一致
    pub question_count_changed: bool,
    /// 总分与逐题结果互相矛盾
    pub score_mismatch: bool,
}

impl PassFlags {
    pub fn is_flagged(&self) -> bool {
        self.low_selection_ratio
            || self.score_missing
            || self.correctness_defaulted > 0
            || self.question_count_changed
            || self.score_mismatch
    }

    /// 人类可读的标记列表
    pub fn describe(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.low_selection_ratio {
            notes.push("选择成功率过低".to_string());
        }
        if self.score_missing {
            notes.push("未抓取到总分".to_string());
        }
        if self.correctness_defaulted > 0 {
            notes.push(format!("{} 道题未报告对错", self.correctness_defaulted));
        }
        if self.question_count_changed {
            notes.push("题目数量发生变化".to_string());
        }
        if self.score_mismatch {
            notes.push("总分与逐题结果不一致".to_string());
        }
        notes
    }
}

/// 一次完整交卷的结果记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub session_id: String,
    pub option_index: usize,
    pub option_label: String,
    pub score: Option<f64>,
    pub total_questions: u32,
    /// 题号 → 是否答对，键恰好是 1..=total_questions
    pub per_question: BTreeMap<u32, bool>,
    pub timestamp: DateTime<Local>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub successful_selections: u32,
    #[serde(default)]
    pub failed_selections: u32,
    #[serde(default)]
    pub flags: PassFlags,
}

impl PassResult {
    pub fn correct_count(&self) -> usize {
        self.per_question.values().filter(|&&c| c).count()
    }

    /// 题号是否恰好覆盖 1..=total_questions
    pub fn has_total_coverage(&self) -> bool {
        self.per_question.len() == self.total_questions as usize
            && self
                .per_question
                .keys()
                .copied()
                .eq(1..=self.total_questions)
    }

    /// 总分与逐题结果的一致性检查
    pub fn score_disagrees(score: Option<f64>, correct_count: usize) -> bool {
        match score {
            Some(s) if correct_count == 0 && s > 0.0 => true,
            Some(s) if s == 0.0 && correct_count > 0 => true,
            _ => false,
        }
    }
}

/// 把抓取到的逐题结果规整成 1..=total 的完整映射
///
/// 超出范围的题号被丢弃，缺失的题号按"答错"补齐。
/// 返回 (规整后的映射, 补齐的数量)。
pub fn normalize_per_question(
    raw: &BTreeMap<u32, bool>,
    total_questions: u32,
) -> (BTreeMap<u32, bool>, u32) {
    let mut defaulted = 0;
    let normalized = (1..=total_questions)
        .map(|q| match raw.get(&q) {
            Some(&correct) => (q, correct),
            None => {
                defaulted += 1;
                (q, false)
            }
        })
        .collect();
    (normalized, defaulted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(per_question: BTreeMap<u32, bool>) -> PassResult {
        PassResult {
            session_id: "20260101_120000".into(),
            option_index: 0,
            option_label: "A".into(),
            score: Some(33.0),
            total_questions: per_question.len() as u32,
            per_question,
            timestamp: Local::now(),
            duration_seconds: 1.5,
            successful_selections: 3,
            failed_selections: 0,
            flags: PassFlags::default(),
        }
    }

    #[test]
    fn normalize_fills_gaps_and_drops_extras() {
        let raw = BTreeMap::from([(1, true), (3, false), (9, true)]);
        let (normalized, defaulted) = normalize_per_question(&raw, 4);
        assert_eq!(
            normalized,
            BTreeMap::from([(1, true), (2, false), (3, false), (4, false)])
        );
        assert_eq!(defaulted, 2);
    }

    #[test]
    fn coverage_invariant() {
        let pass = sample(BTreeMap::from([(1, true), (2, false), (3, false)]));
        assert!(pass.has_total_coverage());

        let mut gap = pass.clone();
        gap.per_question.remove(&2);
        gap.per_question.insert(4, true);
        assert!(!gap.has_total_coverage());
    }

    #[test]
    fn json_uses_camel_case_and_string_question_keys() {
        let pass = sample(BTreeMap::from([(1, true), (2, false)]));
        let json = serde_json::to_value(&pass).unwrap();
        assert_eq!(json["optionLabel"], "A");
        assert_eq!(json["perQuestion"]["1"], true);
        assert_eq!(json["totalQuestions"], 2);

        let back: PassResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.per_question, pass.per_question);
    }

    #[test]
    fn score_mismatch_detection() {
        assert!(PassResult::score_disagrees(Some(40.0), 0));
        assert!(PassResult::score_disagrees(Some(0.0), 2));
        assert!(!PassResult::score_disagrees(Some(40.0), 4));
        assert!(!PassResult::score_disagrees(None, 0));
    }

    #[test]
    fn flags_describe() {
        let flags = PassFlags {
            low_selection_ratio: true,
            correctness_defaulted: 2,
            ..Default::default()
        };
        assert!(flags.is_flagged());
        assert_eq!(flags.describe().len(), 2);
        assert!(!PassFlags::default().is_flagged());
    }
}
