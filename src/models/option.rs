//! 候选选项集合

use serde::{Deserialize, Serialize};

/// 有序的候选选项标签（索引 0.. 对应 A, B, C, D）
///
/// 顺序只在默认平局规则（取最小索引）中有意义。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    labels: Vec<String>,
}

impl OptionSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        0..self.labels.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.labels.len()
    }

    /// 选项标签；超出范围时用 `#索引` 表示
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{}", index))
    }

    /// 解析命令行传入的选项：既接受标签（不区分大小写）也接受索引
    pub fn resolve(&self, input: &str) -> Option<usize> {
        let input = input.trim();
        if let Some(pos) = self
            .labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(input))
        {
            return Some(pos);
        }
        input.parse::<usize>().ok().filter(|&i| self.contains(i))
    }

    /// 随机猜中一题的概率
    pub fn guess_probability(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            1.0 / self.labels.len() as f64
        }
    }
}

impl Default for OptionSet {
    fn default() -> Self {
        Self::new(["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_label_or_index() {
        let options = OptionSet::default();
        assert_eq!(options.resolve("b"), Some(1));
        assert_eq!(options.resolve("D"), Some(3));
        assert_eq!(options.resolve("2"), Some(2));
        assert_eq!(options.resolve("4"), None);
        assert_eq!(options.resolve("E"), None);
    }

    #[test]
    fn guess_probability_follows_option_count() {
        assert_eq!(OptionSet::default().guess_probability(), 0.25);
        let five = OptionSet::new(vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()]);
        assert!((five.guess_probability() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn label_out_of_range() {
        assert_eq!(OptionSet::default().label(7), "#7");
    }
}
