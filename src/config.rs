use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::OptionSet;

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否自己启动无头浏览器（否则连接调试端口上已运行的浏览器）
    pub headless: bool,
    /// 无头模式下的浏览器可执行文件
    pub browser_executable: Option<String>,
    /// 考试入口 URL
    pub exam_url: String,
    /// 结果存放目录
    pub results_dir: String,
    /// 选项标签，顺序即选项索引
    pub option_labels: Vec<String>,
    /// 及格线（百分比）
    pub pass_threshold: f64,
    /// 选择成功率下限，低于则该轮标记为低可信
    pub selection_success_floor: f64,
    /// 重新考试的最大尝试次数
    pub retake_max_attempts: u32,
    /// 会话恢复的最大尝试次数
    pub recovery_max_attempts: u32,
    /// 每个选项的轮次最多跑几次（含第一次）
    pub pass_max_attempts: u32,
    /// 等待操作员登录的秒数
    pub login_wait_secs: u64,
    /// 恢复后等待操作员回到考试页面的秒数
    pub reanchor_wait_secs: u64,
    /// 每次选择后的间隔（毫秒）
    pub selection_delay_ms: u64,
    /// 全部选择完成后等待页面登记的时间（毫秒）
    pub settle_wait_ms: u64,
    /// 交卷后等待结果页面的时间（毫秒）
    pub results_wait_ms: u64,
    /// 每多少次选择做一次健康检查
    pub health_check_interval: u32,
    /// 每轮之间是否需要操作员确认
    pub confirm_between_passes: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            headless: false,
            browser_executable: None,
            exam_url: "https://mastercpe.com".to_string(),
            results_dir: "exam_results".to_string(),
            option_labels: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            pass_threshold: 70.0,
            selection_success_floor: 0.8,
            retake_max_attempts: 3,
            recovery_max_attempts: 3,
            pass_max_attempts: 3,
            login_wait_secs: 60,
            reanchor_wait_secs: 30,
            selection_delay_ms: 20,
            settle_wait_ms: 2000,
            results_wait_ms: 5000,
            health_check_interval: 10,
            confirm_between_passes: false,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取配置（未设置的项使用默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件，然后用环境变量覆盖
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            field: "config".to_string(),
            reason: format!("无法读取 {}: {}", path.display(), e),
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        let base = self;
        Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(base.browser_debug_port),
            headless: env_parse("HEADLESS").unwrap_or(base.headless),
            browser_executable: std::env::var("BROWSER_EXECUTABLE").ok().or(base.browser_executable),
            exam_url: std::env::var("EXAM_URL").unwrap_or(base.exam_url),
            results_dir: std::env::var("RESULTS_DIR").unwrap_or(base.results_dir),
            option_labels: std::env::var("OPTION_LABELS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or(base.option_labels),
            pass_threshold: env_parse("PASS_THRESHOLD").unwrap_or(base.pass_threshold),
            selection_success_floor: env_parse("SELECTION_SUCCESS_FLOOR").unwrap_or(base.selection_success_floor),
            retake_max_attempts: env_parse("RETAKE_MAX_ATTEMPTS").unwrap_or(base.retake_max_attempts),
            recovery_max_attempts: env_parse("RECOVERY_MAX_ATTEMPTS").unwrap_or(base.recovery_max_attempts),
            pass_max_attempts: env_parse("PASS_MAX_ATTEMPTS").unwrap_or(base.pass_max_attempts),
            login_wait_secs: env_parse("LOGIN_WAIT_SECS").unwrap_or(base.login_wait_secs),
            reanchor_wait_secs: env_parse("REANCHOR_WAIT_SECS").unwrap_or(base.reanchor_wait_secs),
            selection_delay_ms: env_parse("SELECTION_DELAY_MS").unwrap_or(base.selection_delay_ms),
            settle_wait_ms: env_parse("SETTLE_WAIT_MS").unwrap_or(base.settle_wait_ms),
            results_wait_ms: env_parse("RESULTS_WAIT_MS").unwrap_or(base.results_wait_ms),
            health_check_interval: env_parse("HEALTH_CHECK_INTERVAL").unwrap_or(base.health_check_interval),
            confirm_between_passes: env_parse("CONFIRM_BETWEEN_PASSES").unwrap_or(base.confirm_between_passes),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(base.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(base.output_log_file),
        }
    }

    /// 检查配置项的取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.option_labels.is_empty() {
            return Err(ConfigError::Invalid {
                field: "option_labels".to_string(),
                reason: "至少需要一个选项".to_string(),
            });
        }
        if self.pass_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "pass_max_attempts".to_string(),
                reason: "至少需要跑一次".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.selection_success_floor) {
            return Err(ConfigError::Invalid {
                field: "selection_success_floor".to_string(),
                reason: format!("{} 不在 [0, 1] 范围内", self.selection_success_floor),
            });
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(ConfigError::Invalid {
                field: "pass_threshold".to_string(),
                reason: format!("{} 不在 [0, 100] 范围内", self.pass_threshold),
            });
        }
        Ok(())
    }

    pub fn options(&self) -> OptionSet {
        OptionSet::new(self.option_labels.clone())
    }

    pub fn selection_delay(&self) -> Duration {
        Duration::from_millis(self.selection_delay_ms)
    }

    pub fn settle_wait(&self) -> Duration {
        Duration::from_millis(self.settle_wait_ms)
    }

    pub fn results_wait(&self) -> Duration {
        Duration::from_millis(self.results_wait_ms)
    }

    pub fn login_wait(&self) -> Duration {
        Duration::from_secs(self.login_wait_secs)
    }

    pub fn reanchor_wait(&self) -> Duration {
        Duration::from_secs(self.reanchor_wait_secs)
    }

    /// 测试用配置：所有等待时间为零
    pub fn without_waits(mut self) -> Self {
        self.login_wait_secs = 0;
        self.reanchor_wait_secs = 0;
        self.selection_delay_ms = 0;
        self.settle_wait_ms = 0;
        self.results_wait_ms = 0;
        self
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(
                "{}",
                ConfigError::EnvVarParseFailed {
                    var_name: var_name.to_string(),
                    value,
                    expected_type: std::any::type_name::<T>().to_string(),
                }
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.options().len(), 4);
        assert_eq!(config.pass_threshold, 70.0);
    }

    #[test]
    fn load_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solver.toml");
        std::fs::write(
            &path,
            "results_dir = \"my_results\"\noption_labels = [\"A\", \"B\", \"C\"]\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.option_labels.len(), 3);
        assert_eq!(config.retake_max_attempts, 3);
        assert_eq!(config.pass_max_attempts, 3);
    }

    #[test]
    fn rejects_empty_option_list() {
        let config = Config {
            option_labels: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "option_labels"
        ));
    }

    #[test]
    fn rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "pass_threshold = \"high\"").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::TomlParseFailed { .. })
        ));
    }
}
