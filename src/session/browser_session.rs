//! 基于 chromiumoxide 的考试会话
//!
//! 页面操作都通过 [`JsExecutor`] 执行脚本完成；脚本只负责取数据和点击，
//! 分数与对错的识别交给 [`scrape`](super::scrape) 在 Rust 端完成。

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::Browser;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::scrape::{self, MarkerContext};
use super::{CorrectnessScrape, DiscoveredQuestion, ExamSession};
use crate::browser;
use crate::config::Config;
use crate::error::BrowserError;
use crate::infrastructure::JsExecutor;

/// 结果页抓取的轮询次数
const SCRAPE_ATTEMPTS: u32 = 3;

const DISCOVER_JS: &str = r#"
(() => {
    const counts = new Map();
    const order = [];
    document.querySelectorAll('input[type="radio"]').forEach(r => {
        if (!r.name) return;
        if (!counts.has(r.name)) {
            counts.set(r.name, 0);
            order.push(r.name);
        }
        counts.set(r.name, counts.get(r.name) + 1);
    });
    return order
        .filter(name => counts.get(name) >= 2)
        .map(name => ({ group: name, optionCount: counts.get(name) }));
})()
"#;

const MARKERS_JS: &str = r#"
(() => {
    const out = [];
    for (const el of document.body.querySelectorAll('*')) {
        const own = Array.from(el.childNodes)
            .filter(n => n.nodeType === Node.TEXT_NODE)
            .map(n => n.textContent)
            .join(' ')
            .trim();
        if (!/\b(Correct|Incorrect)\b/.test(own)) continue;
        const ancestors = [];
        let cur = el.parentElement;
        for (let i = 0; i < 5 && cur; i++, cur = cur.parentElement) {
            ancestors.push(cur.innerText || '');
        }
        out.push({ marker: own, ancestors });
    }
    return out;
})()
"#;

const READY_STATE_JS: &str = "document.readyState";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadioGroup {
    group: String,
    option_count: usize,
}

/// 浏览器考试会话
pub struct BrowserExamSession {
    port: u16,
    headless: bool,
    executable: Option<String>,
    exam_url: String,
    results_wait: Duration,
    _browser: Option<Browser>,
    executor: Option<JsExecutor>,
    /// 最近一次发现的单选组，下标 = 题号 - 1
    groups: Vec<String>,
}

impl BrowserExamSession {
    /// 按配置连接（或启动）浏览器并打开考试页面
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut session = Self {
            port: config.browser_debug_port,
            headless: config.headless,
            executable: config.browser_executable.clone(),
            exam_url: config.exam_url.clone(),
            results_wait: config.results_wait(),
            _browser: None,
            executor: None,
            groups: Vec::new(),
        };
        session.reconnect().await?;
        Ok(session)
    }

    fn executor(&self) -> Result<&JsExecutor> {
        self.executor
            .as_ref()
            .ok_or_else(|| BrowserError::Disconnected.into())
    }

    /// 查找按钮脚本：按文本/value 关键词匹配可见且可用的按钮
    fn button_script(keywords: &[&str], click: bool, allow_submit_fallback: bool) -> String {
        let keywords = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"
            (() => {{
                const usable = el => !el.disabled
                    && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
                const text = el => ((el.innerText || '') + ' ' + (el.value || '')).toLowerCase();
                const candidates = Array.from(document.querySelectorAll(
                    'button, a, input[type="submit"], input[type="button"]'));
                let target = null;
                for (const kw of {keywords}) {{
                    target = candidates.find(el => usable(el) && text(el).includes(kw));
                    if (target) break;
                }}
                if (!target && {fallback}) {{
                    target = candidates.find(el => usable(el) && el.type === 'submit');
                }}
                if (!target) return false;
                if ({click}) {{
                    target.scrollIntoView({{ block: 'center' }});
                    target.click();
                }}
                return true;
            }})()
            "#,
            keywords = keywords,
            fallback = allow_submit_fallback,
            click = click,
        )
    }

    fn select_script(group: &str, option_index: usize) -> Result<String> {
        Ok(format!(
            r#"
            (() => {{
                const name = {};
                const radios = Array.from(document.querySelectorAll('input[type="radio"]'))
                    .filter(r => r.name === name);
                const radio = radios[{}];
                if (!radio) return false;
                radio.scrollIntoView({{ block: 'center' }});
                radio.click();
                return radio.checked === true;
            }})()
            "#,
            serde_json::to_string(group)?,
            option_index
        ))
    }
}

#[async_trait]
impl ExamSession for BrowserExamSession {
    async fn discover_questions(&mut self) -> Result<Vec<DiscoveredQuestion>> {
        let groups: Vec<RadioGroup> = self
            .executor()?
            .eval_as(DISCOVER_JS)
            .await
            .context("发现题目脚本执行失败")?;

        debug!("发现 {} 个单选组", groups.len());
        self.groups = groups.iter().map(|g| g.group.clone()).collect();

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(i, g)| DiscoveredQuestion {
                number: i as u32 + 1,
                group: g.group,
                option_count: g.option_count,
            })
            .collect())
    }

    async fn select_answer(&mut self, question_number: u32, option_index: usize) -> Result<bool> {
        let Some(group) = self
            .groups
            .get((question_number as usize).wrapping_sub(1))
            .cloned()
        else {
            warn!("题目 {} 不在当前发现的题目中", question_number);
            return Ok(false);
        };
        let script = Self::select_script(&group, option_index)?;
        let checked: bool = self.executor()?.eval_as(script).await?;
        Ok(checked)
    }

    async fn submit(&mut self) -> Result<bool> {
        let script = Self::button_script(&["grade my exam", "grade"], true, true);
        let clicked: bool = self.executor()?.eval_as(script).await?;
        if clicked {
            info!("🎯 已点击交卷按钮，等待结果页...");
            sleep(self.results_wait).await;
        } else {
            warn!("❌ 未找到交卷按钮");
        }
        Ok(clicked)
    }

    async fn await_and_scrape_score(&mut self) -> Result<Option<f64>> {
        for attempt in 1..=SCRAPE_ATTEMPTS {
            let html = self.executor()?.page_source().await?;
            if let Some(score) = scrape::parse_score(&html) {
                info!("📊 抓取到总分: {}%", score);
                return Ok(Some(score));
            }
            debug!("未找到总分 (尝试 {}/{})", attempt, SCRAPE_ATTEMPTS);
            sleep(Duration::from_secs(1)).await;
        }
        warn!("❌ 页面上没有找到总分");
        Ok(None)
    }

    async fn await_and_scrape_correctness(
        &mut self,
        total_questions: u32,
    ) -> Result<CorrectnessScrape> {
        let mut marks = Default::default();
        for attempt in 1..=SCRAPE_ATTEMPTS {
            let markers: Vec<MarkerContext> = self.executor()?.eval_as(MARKERS_JS).await?;
            debug!("找到 {} 个对错标记", markers.len());
            marks = scrape::parse_correctness_marks(&markers, total_questions);
            if !marks.is_empty() {
                break;
            }
            debug!("未识别到逐题结果 (尝试 {}/{})", attempt, SCRAPE_ATTEMPTS);
            sleep(Duration::from_secs(1)).await;
        }
        Ok(CorrectnessScrape::from_marks(marks, total_questions))
    }

    async fn retake_available(&mut self) -> Result<bool> {
        let script = Self::button_script(&["retake exam", "retake"], false, false);
        let found: bool = self.executor()?.eval_as(script).await?;
        Ok(found)
    }

    async fn retake(&mut self) -> Result<bool> {
        let script = Self::button_script(&["retake exam", "retake"], true, false);
        let clicked: bool = self.executor()?.eval_as(script).await?;
        if !clicked {
            warn!("❌ 未找到重新考试按钮");
            return Ok(false);
        }
        info!("⏳ 等待答题页加载...");
        sleep(self.results_wait).await;

        let questions = self.discover_questions().await?;
        if questions.is_empty() {
            warn!("⚠️ 重新考试后没有找到题目");
            return Ok(false);
        }
        info!("✅ 已回到答题页，找到 {} 道题目", questions.len());
        Ok(true)
    }

    async fn is_healthy(&mut self) -> bool {
        let Ok(executor) = self.executor() else {
            return false;
        };
        match executor.url().await {
            Ok(Some(_)) => {}
            _ => return false,
        }
        matches!(executor.eval(READY_STATE_JS).await, Ok(v) if v.is_string())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.executor = None;
        self._browser = None;
        self.groups.clear();

        let (browser, page) = if self.headless {
            browser::launch_headless_browser(&self.exam_url, self.executable.as_deref()).await?
        } else {
            browser::connect_to_browser_and_page(self.port, Some(&self.exam_url)).await?
        };
        self._browser = Some(browser);
        self.executor = Some(JsExecutor::new(page));
        Ok(())
    }

    async fn current_url(&mut self) -> Option<String> {
        self.executor().ok()?.url().await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_script_escapes_group_name() {
        let script = BrowserExamSession::select_script(r#"q"1"#, 2).unwrap();
        assert!(script.contains(r#"const name = "q\"1";"#));
        assert!(script.contains("radios[2]"));
    }

    #[test]
    fn button_script_embeds_keywords_in_order() {
        let script = BrowserExamSession::button_script(&["grade my exam", "grade"], true, true);
        assert!(script.contains(r#"["grade my exam","grade"]"#));
        assert!(script.contains("if (!target && true)"));
        assert!(script.contains("if (true)"));
    }
}
