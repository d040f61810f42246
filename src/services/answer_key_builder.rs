//! 答案生成服务 - 业务能力层
//!
//! 把逐题分析结果变成最终答案和可读报告，并组装可持久化的答案文件。

use std::collections::BTreeMap;

use chrono::Local;
use tracing::debug;

use crate::models::{
    AnswerKey, AnswerKeyArtifact, Confidence, OptionSet, QuestionAnalysis, SessionSummary,
    SummaryCounts,
};

/// 答案报告
#[derive(Debug, Clone, PartialEq)]
pub struct KeyReport {
    pub total_questions: u32,
    pub counts: SummaryCounts,
    /// 选项索引 → 被推荐的题目数
    pub distribution: BTreeMap<usize, u32>,
    /// 每道题一行说明
    pub details: Vec<String>,
    /// 需要复核的题号
    pub anomalies: Vec<u32>,
}

impl KeyReport {
    pub fn expected_score(&self) -> f64 {
        self.counts.expected_score
    }

    /// 按预期得分判断是否有望及格
    pub fn expects_pass(&self, threshold: f64) -> bool {
        self.counts.expected_score >= threshold
    }

    /// 渲染成多行文本
    pub fn render(&self, options: &OptionSet, threshold: f64) -> String {
        let mut lines = Vec::new();
        lines.push("=".repeat(60));
        lines.push(format!("📋 答案报告（共 {} 道题）", self.total_questions));
        lines.push("=".repeat(60));

        lines.push("可信度分布:".to_string());
        for confidence in Confidence::ALL {
            lines.push(format!(
                "  {:<16} {}",
                confidence.as_str(),
                self.counts.count(confidence)
            ));
        }

        lines.push("答案分布:".to_string());
        for (&option, &count) in &self.distribution {
            lines.push(format!("  {}: {} 题", options.label(option), count));
        }

        lines.push("逐题说明:".to_string());
        lines.extend(self.details.iter().map(|d| format!("  {}", d)));

        lines.push("─".repeat(60));
        lines.push(format!("📊 预期得分: {:.1}%", self.counts.expected_score));
        if self.expects_pass(threshold) {
            lines.push(format!("✅ 预期可以及格（及格线 {:.0}%）", threshold));
        } else {
            lines.push(format!("⚠️ 预期达不到及格线 {:.0}%", threshold));
        }
        if !self.anomalies.is_empty() {
            lines.push(format!(
                "⚠️ {} 道题数据异常，需要复核: {:?}",
                self.anomalies.len(),
                self.anomalies
            ));
        }
        lines.join("\n")
    }
}

/// 预期得分：确定的题算满分，猜的题按 1/选项数 计
pub fn expected_score(counts: &SummaryCounts, total_questions: u32, guess_probability: f64) -> f64 {
    if total_questions == 0 {
        return 0.0;
    }
    let sure = (counts.high + counts.multiple_correct) as f64;
    let guessed = (counts.untested_guess + counts.fallback) as f64 * guess_probability;
    (sure + guessed) / total_questions as f64 * 100.0
}

/// 答案生成服务
///
/// 职责：
/// - 每道题恰好一个答案
/// - 汇总可信度并估算得分
/// - 不读写文件
pub struct AnswerKeyBuilder {
    options: OptionSet,
}

impl AnswerKeyBuilder {
    pub fn new(options: OptionSet) -> Self {
        Self { options }
    }

    pub fn build(&self, analysis: &BTreeMap<u32, QuestionAnalysis>) -> (AnswerKey, KeyReport) {
        let mut key = AnswerKey::new();
        let mut counts = SummaryCounts::default();
        let mut distribution: BTreeMap<usize, u32> = BTreeMap::new();
        let mut details = Vec::with_capacity(analysis.len());
        let mut anomalies = Vec::new();

        for (&q, a) in analysis {
            key.insert(q, a.recommended);
            counts.record(a.confidence);
            *distribution.entry(a.recommended).or_default() += 1;
            details.push(self.describe(a));
            if a.confidence.is_anomaly() {
                anomalies.push(q);
            }
        }

        let total_questions = analysis.len() as u32;
        counts.expected_score =
            expected_score(&counts, total_questions, self.options.guess_probability());

        debug!(
            "生成答案 {} 题，预期得分 {:.1}%",
            total_questions, counts.expected_score
        );

        let report = KeyReport {
            total_questions,
            counts,
            distribution,
            details,
            anomalies,
        };
        (key, report)
    }

    /// 组装答案文件
    pub fn artifact(
        &self,
        analysis: BTreeMap<u32, QuestionAnalysis>,
        key: AnswerKey,
        report: &KeyReport,
        sessions_analyzed: Vec<SessionSummary>,
    ) -> AnswerKeyArtifact {
        AnswerKeyArtifact {
            generated_at: Local::now(),
            total_questions: report.total_questions,
            sessions_analyzed,
            option_labels: self.options.clone(),
            answer_key: key,
            per_question_analysis: analysis,
            summary_counts: report.counts.clone(),
        }
    }

    fn labels(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .map(|&i| self.options.label(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn describe(&self, a: &QuestionAnalysis) -> String {
        let answer = self.options.label(a.recommended);
        let note = match a.confidence {
            Confidence::High => "确定".to_string(),
            Confidence::MultipleCorrect => {
                let others: Vec<usize> = a
                    .correct_options
                    .iter()
                    .copied()
                    .filter(|&o| o != a.recommended)
                    .collect();
                format!("{} 也被判对", self.labels(&others))
            }
            Confidence::AllIncorrect => "所有选项都被判错".to_string(),
            Confidence::UntestedGuess if a.incorrect_options.is_empty() => "未测试，猜测".to_string(),
            Confidence::UntestedGuess => {
                format!("未测试，已排除 {}", self.labels(&a.incorrect_options))
            }
            Confidence::Fallback => "兜底".to_string(),
        };
        format!("第 {} 题: {}（{}）", a.question_number, answer, note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analyzer;

    fn analysis(q: u32, recommended: usize, confidence: Confidence) -> QuestionAnalysis {
        QuestionAnalysis {
            question_number: q,
            correct_options: if confidence == Confidence::High { vec![recommended] } else { Vec::new() },
            incorrect_options: Vec::new(),
            untested_options: Vec::new(),
            recommended,
            confidence,
        }
    }

    #[test]
    fn expected_score_eight_high_two_guesses() {
        let mut map = BTreeMap::new();
        for q in 1..=8 {
            map.insert(q, analysis(q, 0, Confidence::High));
        }
        for q in 9..=10 {
            map.insert(q, analysis(q, 1, Confidence::UntestedGuess));
        }
        let (key, report) = AnswerKeyBuilder::new(OptionSet::default()).build(&map);

        assert!(key.covers(10));
        assert!((report.expected_score() - 85.0).abs() < 1e-9);
        assert!(report.expects_pass(70.0));
        assert_eq!(report.distribution, BTreeMap::from([(0, 8), (1, 2)]));
    }

    #[test]
    fn all_incorrect_contributes_nothing() {
        let mut map = BTreeMap::new();
        map.insert(1, analysis(1, 0, Confidence::AllIncorrect));
        map.insert(2, analysis(2, 0, Confidence::MultipleCorrect));
        let (_, report) = AnswerKeyBuilder::new(OptionSet::default()).build(&map);
        assert!((report.expected_score() - 50.0).abs() < 1e-9);
        assert_eq!(report.anomalies, vec![1, 2]);
    }

    #[test]
    fn expected_score_of_empty_exam_is_zero() {
        let counts = SummaryCounts::default();
        assert_eq!(expected_score(&counts, 0, 0.25), 0.0);
    }

    #[test]
    fn guess_weight_follows_option_count() {
        let counts = SummaryCounts {
            untested_guess: 1,
            fallback: 1,
            ..Default::default()
        };
        assert!((expected_score(&counts, 2, 1.0 / 3.0) - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn key_from_no_passes_covers_every_question() {
        let options = OptionSet::default();
        for total in [1, 7, 40] {
            let analysis = analyzer::analyze(total, &[], &options);
            let (key, report) = AnswerKeyBuilder::new(options.clone()).build(&analysis);
            assert!(key.covers(total));
            assert_eq!(report.counts.total(), total);
            assert!((report.expected_score() - 25.0).abs() < 1e-9);
        }
    }

    #[test]
    fn detail_lines_name_the_evidence() {
        let options = OptionSet::default();
        let a = QuestionAnalysis {
            question_number: 3,
            correct_options: vec![1, 2],
            incorrect_options: vec![0],
            untested_options: vec![3],
            recommended: 1,
            confidence: Confidence::MultipleCorrect,
        };
        let b = QuestionAnalysis {
            question_number: 4,
            correct_options: Vec::new(),
            incorrect_options: vec![0, 1],
            untested_options: vec![2, 3],
            recommended: 2,
            confidence: Confidence::UntestedGuess,
        };
        let builder = AnswerKeyBuilder::new(options.clone());
        let (_, report) = builder.build(&BTreeMap::from([(3, a), (4, b)]));
        assert_eq!(report.details[0], "第 3 题: B（C 也被判对）");
        assert_eq!(report.details[1], "第 4 题: C（未测试，已排除 A, B）");

        let text = report.render(&options, 70.0);
        assert!(text.contains("multiple_correct"));
        assert!(text.contains("B: 1 题"));
    }

    #[test]
    fn artifact_carries_counts_and_labels() {
        let options = OptionSet::default();
        let analysis = analyzer::analyze(2, &[], &options);
        let builder = AnswerKeyBuilder::new(options.clone());
        let (key, report) = builder.build(&analysis);
        let artifact = builder.artifact(analysis, key.clone(), &report, Vec::new());

        assert_eq!(artifact.total_questions, 2);
        assert_eq!(artifact.answer_key, key);
        assert_eq!(artifact.option_labels, options);
        assert_eq!(artifact.summary_counts.untested_guess, 2);
    }
}
