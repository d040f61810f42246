//! 考试会话能力 - 外部协作者边界
//!
//! 推断引擎只通过 [`ExamSession`] 与考试页面交互：
//! 发现题目、选择答案、交卷、抓取分数与逐题对错、重新考试、健康检查。
//! 页面上具体怎么找按钮、怎么识别"Correct"标记，都是实现内部的策略。

pub mod browser_session;
pub mod mock;
pub mod scrape;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use browser_session::BrowserExamSession;
pub use mock::MockExamSession;

/// 页面上发现的一道题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredQuestion {
    /// 本次发现时分配的题号（从 1 开始）
    pub number: u32,
    /// 页面上单选组的 name
    pub group: String,
    pub option_count: usize,
}

/// 逐题对错的抓取结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectnessScrape {
    /// 题号 → 是否答对，已按"答错"补齐缺失项
    pub per_question: BTreeMap<u32, bool>,
    /// 页面没有报告、被补成默认值的题号
    pub defaulted: Vec<u32>,
}

impl CorrectnessScrape {
    /// 用页面上实际识别到的标记构建，缺失的题号补为 false
    pub fn from_marks(marks: BTreeMap<u32, bool>, total_questions: u32) -> Self {
        let mut per_question = BTreeMap::new();
        let mut defaulted = Vec::new();
        for q in 1..=total_questions {
            match marks.get(&q) {
                Some(&correct) => {
                    per_question.insert(q, correct);
                }
                None => {
                    per_question.insert(q, false);
                    defaulted.push(q);
                }
            }
        }
        Self {
            per_question,
            defaulted,
        }
    }

    /// 页面什么都没报告时的结果
    pub fn all_defaulted(total_questions: u32) -> Self {
        Self::from_marks(BTreeMap::new(), total_questions)
    }
}

/// 考试会话
///
/// 职责：
/// - 持有唯一的考试页面，同一时刻只被一个组件以 `&mut` 独占
/// - 不认识 PassResult / AnswerKey
/// - 不做任何推断决策
///
/// 返回 `Ok(false)` 表示操作没有生效，`Err` 表示与页面的通信本身出错；
/// 调用方对两者一视同仁地按失败处理。
#[async_trait]
pub trait ExamSession: Send {
    /// 重新发现页面上的题目（每轮开始都要调用，旧的题号映射作废）
    async fn discover_questions(&mut self) -> Result<Vec<DiscoveredQuestion>>;

    /// 为某题选择某个选项
    async fn select_answer(&mut self, question_number: u32, option_index: usize) -> Result<bool>;

    /// 交卷
    async fn submit(&mut self) -> Result<bool>;

    /// 等待结果页并抓取总分（百分比）
    async fn await_and_scrape_score(&mut self) -> Result<Option<f64>>;

    /// 等待结果页并抓取逐题对错，未报告的题目按答错补齐
    async fn await_and_scrape_correctness(
        &mut self,
        total_questions: u32,
    ) -> Result<CorrectnessScrape>;

    /// 结果页上是否有"重新考试"入口
    async fn retake_available(&mut self) -> Result<bool>;

    /// 点击"重新考试"，回到答题页
    async fn retake(&mut self) -> Result<bool>;

    /// 存活探测
    async fn is_healthy(&mut self) -> bool;

    /// 重新建立会话（重连浏览器并导航到考试入口）
    async fn reconnect(&mut self) -> Result<()>;

    /// 当前页面地址（仅用于日志和会话记录）
    async fn current_url(&mut self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_marks_fills_defaults() {
        let scrape = CorrectnessScrape::from_marks(BTreeMap::from([(2, true), (7, true)]), 3);
        assert_eq!(
            scrape.per_question,
            BTreeMap::from([(1, false), (2, true), (3, false)])
        );
        assert_eq!(scrape.defaulted, vec![1, 3]);
    }
}
