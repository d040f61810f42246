//! 结果页解析
//!
//! 浏览器只负责把页面文本取回来，解析都在这里完成，便于离线测试。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

/// 页面上一个对错标记及其祖先节点的文本
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerContext {
    /// 标记元素自身的文本
    pub marker: String,
    /// 由近到远的祖先文本（最多 5 层）
    pub ancestors: Vec<String>,
}

fn explicit_score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)You got a score of (\d+(?:\.\d+)?)").expect("valid regex")
    })
}

fn fallback_score_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(\d+(?:\.\d+)?)\s*%",
            r"(?i)Score[:\s]+(\d+(?:\.\d+)?)",
            r"(?i)Grade[:\s]+(\d+(?:\.\d+)?)",
            r"(\d+(?:\.\d+)?)\s*/\s*100",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

fn question_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Question\s+(\d+)").expect("valid regex"))
}

fn incorrect_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bIncorrect\b").expect("valid regex"))
}

fn correct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bCorrect\b").expect("valid regex"))
}

/// 从结果页 HTML 中解析总分
///
/// 优先匹配 "You got a score of N"，其次是通用的百分比写法。
/// 通用写法中的 100 容易是误报，只有明确句子里的 100 才采信。
pub fn parse_score(page_source: &str) -> Option<f64> {
    if let Some(score) = explicit_score_re()
        .captures(page_source)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        return Some(score);
    }

    let explicit_hundred = page_source
        .to_lowercase()
        .contains("you got a score of 100");

    for re in fallback_score_res() {
        for caps in re.captures_iter(page_source) {
            let Ok(score) = caps[1].parse::<f64>() else {
                continue;
            };
            if !(0.0..=100.0).contains(&score) {
                continue;
            }
            if score == 100.0 && !explicit_hundred {
                continue;
            }
            return Some(score);
        }
    }
    None
}

/// 标记文本的对错判定；Incorrect 先于 Correct 判断
pub fn classify_marker(text: &str) -> Option<bool> {
    if incorrect_re().is_match(text) {
        Some(false)
    } else if correct_re().is_match(text) {
        Some(true)
    } else {
        None
    }
}

/// 在祖先文本中查找属于 1..=total 的题号
pub fn find_question_number(ancestors: &[String], total_questions: u32) -> Option<u32> {
    ancestors.iter().find_map(|text| {
        question_number_re()
            .captures(text)
            .and_then(|c| c[1].parse::<u32>().ok())
            .filter(|q| (1..=total_questions).contains(q))
    })
}

/// 把页面上的对错标记归并为题号 → 对错
///
/// 同一题既有 Correct 又有 Incorrect 标记时，以 Correct 为准。
pub fn parse_correctness_marks(markers: &[MarkerContext], total_questions: u32) -> BTreeMap<u32, bool> {
    let mut marks = BTreeMap::new();
    for m in markers {
        let Some(correct) = classify_marker(&m.marker) else {
            continue;
        };
        let Some(q) = find_question_number(&m.ancestors, total_questions) else {
            continue;
        };
        let entry = marks.entry(q).or_insert(correct);
        *entry = *entry || correct;
    }
    marks
}
