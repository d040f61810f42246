//! 会话恢复 - 流程层
//!
//! 有上限的重试：会话失去响应时重连并等待操作员回到考试页面，
//! 重新考试失败时先重试，再走会话恢复。超过上限即返回 [`RunError`]。

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RunError;
use crate::session::ExamSession;

pub struct Recovery {
    max_attempts: u32,
    retake_attempts: u32,
    reanchor_wait: Duration,
}

impl Recovery {
    pub fn new(config: &Config) -> Self {
        Self {
            max_attempts: config.recovery_max_attempts,
            retake_attempts: config.retake_max_attempts,
            reanchor_wait: config.reanchor_wait(),
        }
    }

    /// 会话存活则直接返回，否则走恢复流程
    pub async fn ensure_healthy(&self, session: &mut dyn ExamSession) -> Result<(), RunError> {
        if session.is_healthy().await {
            return Ok(());
        }
        warn!("⚠️ 浏览器会话无响应，开始恢复");
        self.recover(session).await
    }

    /// 重新建立会话，最多尝试 `recovery_max_attempts` 次
    pub async fn recover(&self, session: &mut dyn ExamSession) -> Result<(), RunError> {
        for attempt in 1..=self.max_attempts {
            info!("🔄 恢复会话 (尝试 {}/{})", attempt, self.max_attempts);
            if let Err(e) = session.reconnect().await {
                warn!("重连失败: {:#}", e);
                continue;
            }
            if !self.reanchor_wait.is_zero() {
                info!(
                    "⏳ 请在 {} 秒内回到考试页面...",
                    self.reanchor_wait.as_secs()
                );
                sleep(self.reanchor_wait).await;
            }
            if session.is_healthy().await {
                info!("✓ 会话已恢复");
                return Ok(());
            }
        }
        Err(RunError::SessionUnrecoverable {
            attempts: self.max_attempts,
        })
    }

    /// 从结果页回到答题页
    ///
    /// 每次点击失败后，如果会话已无响应则先恢复；恢复后页面已经在答题页时视为成功。
    pub async fn retake(&self, session: &mut dyn ExamSession) -> Result<(), RunError> {
        for attempt in 1..=self.retake_attempts {
            match session.retake().await {
                Ok(true) => return Ok(()),
                Ok(false) => warn!(
                    "⚠️ 重新考试失败 (尝试 {}/{})",
                    attempt, self.retake_attempts
                ),
                Err(e) => warn!(
                    "⚠️ 重新考试出错 (尝试 {}/{}): {:#}",
                    attempt, self.retake_attempts, e
                ),
            }

            if !session.is_healthy().await {
                self.recover(session).await?;
                if matches!(session.discover_questions().await, Ok(q) if !q.is_empty()) {
                    info!("✓ 恢复后已在答题页");
                    return Ok(());
                }
            }
        }
        Err(RunError::RetakeExhausted {
            attempts: self.retake_attempts,
        })
    }

    /// 如果当前在结果页，先回到答题页
    pub async fn ensure_on_exam_page(&self, session: &mut dyn ExamSession) -> Result<(), RunError> {
        self.ensure_healthy(session).await?;
        match session.retake_available().await {
            Ok(true) => self.retake(session).await,
            Ok(false) => Ok(()),
            Err(e) => {
                warn!("无法判断是否在结果页: {:#}", e);
                Ok(())
            }
        }
    }
}
