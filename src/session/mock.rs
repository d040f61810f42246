//! 可编程的模拟考试会话，用于在没有浏览器的情况下测试推断引擎

use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{CorrectnessScrape, DiscoveredQuestion, ExamSession};

/// 模拟的考试页面
///
/// 按给定的标准答案判分；可以注入选择失败、交卷失败、
/// 漏报对错、失去响应、重新考试失败等故障。
pub struct MockExamSession {
    /// 每题可被判对的选项
    correct: Vec<BTreeSet<usize>>,
    option_count: usize,
    selections: BTreeMap<u32, usize>,
    on_results_page: bool,

    /// 这些题的选择总是失败
    pub failing_selections: HashSet<u32>,
    /// 接下来多少次交卷会失败
    pub submit_failures: u32,
    /// 结果页上不报告这些题的对错
    pub unreported: HashSet<u32>,
    /// 结果页上不显示总分
    pub hide_score: bool,
    /// 接下来多少次重新考试会失败
    pub retake_failures: u32,
    /// 是否存活
    pub healthy: bool,
    /// 第几次选择之后失去响应
    pub fail_health_after_selections: Option<usize>,
    /// 重连多少次之后才恢复存活（None 表示重连即恢复）
    pub reconnects_needed: Option<u32>,
    /// 重新考试后页面显示的题目数（模拟页面重排）
    pub question_count_after_retake: Option<usize>,

    selection_log: Vec<(u32, usize)>,
    submissions: u32,
    reconnects: u32,
    retakes: u32,
}

impl MockExamSession {
    /// 每题恰好一个正确选项
    pub fn with_answer_key(answers: &[usize], option_count: usize) -> Self {
        Self::with_correct_sets(
            answers.iter().map(|&a| BTreeSet::from([a])).collect(),
            option_count,
        )
    }

    /// 每题可以有任意个正确选项（包括没有）
    pub fn with_correct_sets(correct: Vec<BTreeSet<usize>>, option_count: usize) -> Self {
        Self {
            correct,
            option_count,
            selections: BTreeMap::new(),
            on_results_page: false,
            failing_selections: HashSet::new(),
            submit_failures: 0,
            unreported: HashSet::new(),
            hide_score: false,
            retake_failures: 0,
            healthy: true,
            fail_health_after_selections: None,
            reconnects_needed: None,
            question_count_after_retake: None,
            selection_log: Vec::new(),
            submissions: 0,
            reconnects: 0,
            retakes: 0,
        }
    }

    pub fn question_count(&self) -> usize {
        self.correct.len()
    }

    /// 所有选择调用（题号, 选项），按调用顺序
    pub fn selection_log(&self) -> &[(u32, usize)] {
        &self.selection_log
    }

    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn retakes(&self) -> u32 {
        self.retakes
    }

    fn is_correct(&self, question_number: u32) -> bool {
        let idx = question_number as usize - 1;
        match (self.selections.get(&question_number), self.correct.get(idx)) {
            (Some(selected), Some(set)) => set.contains(selected),
            _ => false,
        }
    }
}

#[async_trait]
impl ExamSession for MockExamSession {
    async fn discover_questions(&mut self) -> Result<Vec<DiscoveredQuestion>> {
        if !self.healthy {
            bail!("page not responding");
        }
        if self.on_results_page {
            return Ok(Vec::new());
        }
        Ok((1..=self.correct.len() as u32)
            .map(|number| DiscoveredQuestion {
                number,
                group: format!("q{}", number),
                option_count: self.option_count,
            })
            .collect())
    }

    async fn select_answer(&mut self, question_number: u32, option_index: usize) -> Result<bool> {
        if !self.healthy {
            bail!("page not responding");
        }
        self.selection_log.push((question_number, option_index));
        if let Some(limit) = self.fail_health_after_selections {
            if self.selection_log.len() >= limit {
                self.healthy = false;
            }
        }
        if self.on_results_page
            || self.failing_selections.contains(&question_number)
            || question_number == 0
            || question_number as usize > self.correct.len()
            || option_index >= self.option_count
        {
            return Ok(false);
        }
        self.selections.insert(question_number, option_index);
        Ok(true)
    }

    async fn submit(&mut self) -> Result<bool> {
        if !self.healthy {
            bail!("page not responding");
        }
        if self.submit_failures > 0 {
            self.submit_failures -= 1;
            return Ok(false);
        }
        self.submissions += 1;
        self.on_results_page = true;
        Ok(true)
    }

    async fn await_and_scrape_score(&mut self) -> Result<Option<f64>> {
        if !self.on_results_page || self.hide_score || self.correct.is_empty() {
            return Ok(None);
        }
        let total = self.correct.len() as u32;
        let correct = (1..=total).filter(|&q| self.is_correct(q)).count();
        Ok(Some(correct as f64 / total as f64 * 100.0))
    }

    async fn await_and_scrape_correctness(
        &mut self,
        total_questions: u32,
    ) -> Result<CorrectnessScrape> {
        if !self.on_results_page {
            return Ok(CorrectnessScrape::all_defaulted(total_questions));
        }
        let marks = (1..=self.correct.len() as u32)
            .filter(|q| !self.unreported.contains(q))
            .map(|q| (q, self.is_correct(q)))
            .collect();
        Ok(CorrectnessScrape::from_marks(marks, total_questions))
    }

    async fn retake_available(&mut self) -> Result<bool> {
        Ok(self.healthy && self.on_results_page)
    }

    async fn retake(&mut self) -> Result<bool> {
        if !self.healthy || !self.on_results_page {
            return Ok(false);
        }
        if self.retake_failures > 0 {
            self.retake_failures -= 1;
            return Ok(false);
        }
        self.retakes += 1;
        self.on_results_page = false;
        self.selections.clear();
        if let Some(count) = self.question_count_after_retake.take() {
            self.correct.resize(count, BTreeSet::from([0]));
        }
        Ok(true)
    }

    async fn is_healthy(&mut self) -> bool {
        self.healthy
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        match self.reconnects_needed {
            Some(needed) if self.reconnects < needed => bail!("browser still unreachable"),
            _ => {
                self.healthy = true;
                self.fail_health_after_selections = None;
                Ok(())
            }
        }
    }

    async fn current_url(&mut self) -> Option<String> {
        self.healthy.then(|| "mock://exam".to_string())
    }
}
