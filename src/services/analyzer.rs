//! 结果分析 - 业务能力层
//!
//! 纯函数：输入某会话的全部轮次结果，输出每道题的推荐选项和可信度。
//! 不持有状态，同样的输入永远得到同样的输出。

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::models::{Confidence, OptionSet, PassResult, QuestionAnalysis};

/// 分析全部轮次，为 1..=total_questions 的每道题给出推荐
///
/// 某选项的轮次不存在、或该轮次没有这道题的记录（题目数变化），
/// 都视为该选项对这道题"未测试"。
pub fn analyze(
    total_questions: u32,
    passes: &[PassResult],
    options: &OptionSet,
) -> BTreeMap<u32, QuestionAnalysis> {
    let usable: Vec<&PassResult> = passes
        .iter()
        .filter(|p| {
            let known = options.contains(p.option_index);
            if !known {
                warn!(
                    "忽略选项索引 {} 的结果（只配置了 {} 个选项）",
                    p.option_index,
                    options.len()
                );
            }
            known
        })
        .collect();

    debug!(
        "分析 {} 道题目，可用轮次 {}/{}",
        total_questions,
        usable.len(),
        passes.len()
    );

    (1..=total_questions)
        .map(|q| (q, analyze_question(q, &usable, options)))
        .collect()
}

fn analyze_question(question_number: u32, passes: &[&PassResult], options: &OptionSet) -> QuestionAnalysis {
    let mut correct = BTreeSet::new();
    let mut incorrect = BTreeSet::new();

    for pass in passes {
        match pass.per_question.get(&question_number) {
            Some(true) => {
                correct.insert(pass.option_index);
            }
            Some(false) => {
                incorrect.insert(pass.option_index);
            }
            None => {}
        }
    }

    let untested: BTreeSet<usize> = options
        .indices()
        .filter(|o| !correct.contains(o) && !incorrect.contains(o))
        .collect();

    let (recommended, confidence) = resolve(&correct, &incorrect, &untested, options);

    QuestionAnalysis {
        question_number,
        correct_options: correct.into_iter().collect(),
        incorrect_options: incorrect.into_iter().collect(),
        untested_options: untested.into_iter().collect(),
        recommended,
        confidence,
    }
}

/// 按固定优先级决定推荐选项，第一条命中的规则生效
///
/// 1. 恰好一个判对 → 该选项, high
/// 2. 多个判对 → 索引最小者, multiple_correct
/// 3. 所有选项都判错 → 第一个选项, all_incorrect
/// 4. 存在未测选项 → 索引最小的未测选项, untested_guess
/// 5. 其他 → 第一个选项, fallback
pub fn resolve(
    correct: &BTreeSet<usize>,
    incorrect: &BTreeSet<usize>,
    untested: &BTreeSet<usize>,
    options: &OptionSet,
) -> (usize, Confidence) {
    if let Some(&lowest) = correct.first() {
        return if correct.len() == 1 {
            (lowest, Confidence::High)
        } else {
            (lowest, Confidence::MultipleCorrect)
        };
    }
    if !options.is_empty() && options.indices().all(|o| incorrect.contains(&o)) {
        return (0, Confidence::AllIncorrect);
    }
    if let Some(&first_untested) = untested.first() {
        return (first_untested, Confidence::UntestedGuess);
    }
    (0, Confidence::Fallback)
}
