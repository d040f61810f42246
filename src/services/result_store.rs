//! 结果存储服务 - 业务能力层
//!
//! 只负责"读写结果文件"能力：每个 (会话, 选项) 一个轮次文件，
//! 每个会话一个会话文件，每次分析一个带时间戳的答案文件。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{AnswerKeyArtifact, PassResult, SessionRecord};

const PASS_PREFIX: &str = "option_";
const SESSION_PREFIX: &str = "session_";
const ANSWER_KEY_PREFIX: &str = "final_answer_key_";

/// 结果存储
///
/// 职责：
/// - 持久化 PassResult，同一会话同一选项重跑即覆盖
/// - 进程重启后仍能加载此前保存的全部轮次
/// - 不做任何分析
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pass_path(&self, session_id: &str, option_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{}_{}.json", PASS_PREFIX, option_index, session_id))
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", SESSION_PREFIX, session_id))
    }

    /// 保存一轮结果（覆盖同一会话同一选项的旧记录）
    pub async fn save(&self, pass: &PassResult) -> Result<PathBuf, StoreError> {
        let path = self.pass_path(&pass.session_id, pass.option_index);
        self.write_json(&path, pass).await?;
        debug!(
            "已保存选项 {} 的结果: {}",
            pass.option_label,
            path.display()
        );
        Ok(path)
    }

    /// 加载某会话已保存的全部轮次，按选项索引升序
    pub async fn load_all(&self, session_id: &str) -> Result<Vec<PassResult>, StoreError> {
        let mut passes: Vec<PassResult> = self
            .load_matching::<PassResult>(PASS_PREFIX)
            .await?
            .into_iter()
            .filter(|p| p.session_id == session_id)
            .collect();
        passes.sort_by_key(|p| p.option_index);
        Ok(passes)
    }

    /// 所有会话的全部轮次，按时间升序
    pub async fn load_every_session(&self) -> Result<Vec<PassResult>, StoreError> {
        let mut passes: Vec<PassResult> = self.load_matching(PASS_PREFIX).await?;
        passes.sort_by_key(|p| p.timestamp);
        Ok(passes)
    }

    /// 某会话已完成的选项索引
    pub async fn completed_options(&self, session_id: &str) -> Result<BTreeSet<usize>, StoreError> {
        Ok(self
            .load_all(session_id)
            .await?
            .into_iter()
            .map(|p| p.option_index)
            .collect())
    }

    pub async fn save_session(&self, record: &SessionRecord) -> Result<PathBuf, StoreError> {
        let path = self.session_path(&record.session_id);
        self.write_json(&path, record).await?;
        Ok(path)
    }

    pub async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.session_path(session_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        self.read_json(&path).await.map(Some)
    }

    /// 所有会话记录，按开始时间升序
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let mut sessions: Vec<SessionRecord> = self.load_matching(SESSION_PREFIX).await?;
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    /// 最近的会话：优先看会话记录，没有会话记录时看轮次文件
    pub async fn latest_session_id(&self) -> Result<Option<String>, StoreError> {
        if let Some(last) = self.list_sessions().await?.pop() {
            return Ok(Some(last.session_id));
        }
        let passes: Vec<PassResult> = self.load_matching(PASS_PREFIX).await?;
        Ok(passes
            .into_iter()
            .max_by_key(|p| p.timestamp)
            .map(|p| p.session_id))
    }

    /// 保存答案文件，文件名带生成时间
    pub async fn save_answer_key(&self, artifact: &AnswerKeyArtifact) -> Result<PathBuf, StoreError> {
        let stamp = artifact.generated_at.format("%Y%m%d_%H%M%S_%3f");
        let path = self
            .dir
            .join(format!("{}{}.json", ANSWER_KEY_PREFIX, stamp));
        self.write_json(&path, artifact).await?;
        Ok(path)
    }

    pub async fn load_answer_key(&self, path: &Path) -> Result<AnswerKeyArtifact, StoreError> {
        self.read_json(path).await
    }

    /// 最新生成的答案文件
    pub async fn latest_answer_key(&self) -> Result<Option<(PathBuf, AnswerKeyArtifact)>, StoreError> {
        let mut paths = self.list_files(ANSWER_KEY_PREFIX).await?;
        paths.sort();
        match paths.pop() {
            Some(path) => {
                let artifact = self.read_json(&path).await?;
                Ok(Some((path, artifact)))
            }
            None => Ok(None),
        }
    }

    // ========== 文件辅助方法 ==========

    /// 先写临时文件再改名，崩溃时不会留下半截记录
    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::write_failed(self.dir.display().to_string(), e))?;

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::json_failed(path.display().to_string(), e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::write_failed(tmp.display().to_string(), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::write_failed(path.display().to_string(), e))?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::read_failed(path.display().to_string(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::json_failed(path.display().to_string(), e))
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<PathBuf>, StoreError> {
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::read_failed(self.dir.display().to_string(), e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::read_failed(self.dir.display().to_string(), e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(prefix) && name.ends_with(".json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// 加载所有前缀匹配的文件；损坏的文件跳过并告警
    async fn load_matching<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        let mut paths = self.list_files(prefix).await?;
        paths.sort();

        let mut items = Vec::new();
        for path in paths {
            match self.read_json(&path).await {
                Ok(item) => items.push(item),
                Err(e) => warn!("跳过无法加载的文件 {}: {}", path.display(), e),
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassFlags;
    use chrono::Local;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn pass(session: &str, option_index: usize, marks: &[bool]) -> PassResult {
        PassResult {
            session_id: session.to_string(),
            option_index,
            option_label: ["A", "B", "C", "D"][option_index].to_string(),
            score: Some(0.0),
            total_questions: marks.len() as u32,
            per_question: marks
                .iter()
                .enumerate()
                .map(|(i, &c)| (i as u32 + 1, c))
                .collect::<BTreeMap<_, _>>(),
            timestamp: Local::now(),
            duration_seconds: 0.5,
            successful_selections: marks.len() as u32,
            failed_selections: 0,
            flags: PassFlags::default(),
        }
    }

    #[tokio::test]
    async fn save_and_reload_survives_new_store_instance() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.save(&pass("s1", 2, &[true, false])).await.unwrap();
        store.save(&pass("s1", 0, &[false, true])).await.unwrap();
        store.save(&pass("s2", 1, &[true, true])).await.unwrap();

        let reopened = ResultStore::new(dir.path());
        let passes = reopened.load_all("s1").await.unwrap();
        assert_eq!(passes.iter().map(|p| p.option_index).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(
            reopened.completed_options("s2").await.unwrap(),
            BTreeSet::from([1])
        );
    }

    #[tokio::test]
    async fn rerunning_an_option_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.save(&pass("s1", 1, &[false, false])).await.unwrap();
        store.save(&pass("s1", 1, &[true, false])).await.unwrap();

        let passes = store.load_all("s1").await.unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].per_question[&1], true);
    }

    #[tokio::test]
    async fn missing_directory_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("nope"));
        assert!(store.load_all("s1").await.unwrap().is_empty());
        assert!(store.latest_session_id().await.unwrap().is_none());
        assert!(store.latest_answer_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_pass_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.save(&pass("s1", 0, &[true])).await.unwrap();
        std::fs::write(dir.path().join("option_3_s1.json"), "{ not json").unwrap();

        let passes = store.load_all("s1").await.unwrap();
        assert_eq!(passes.len(), 1);
    }

    #[tokio::test]
    async fn session_records_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        let mut first = SessionRecord::with_id("20260101_090000", "https://exam");
        first.start_time = Local::now() - chrono::Duration::hours(1);
        let mut second = SessionRecord::with_id("20260101_100000", "https://exam");
        second.total_questions = Some(25);
        store.save_session(&second).await.unwrap();
        store.save_session(&first).await.unwrap();

        assert_eq!(
            store.latest_session_id().await.unwrap().as_deref(),
            Some("20260101_100000")
        );
        let loaded = store.load_session("20260101_100000").await.unwrap().unwrap();
        assert_eq!(loaded.total_questions, Some(25));
        assert!(store.load_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.save(&pass("s1", 0, &[true])).await.unwrap();
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
