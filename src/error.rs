use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error(transparent)]
    Browser(#[from] BrowserError),
    /// 结果存储错误
    #[error(transparent)]
    Store(#[from] StoreError),
    /// 单轮测试错误
    #[error(transparent)]
    Pass(#[from] PassError),
    /// 整体运行终止
    #[error(transparent)]
    Run(#[from] RunError),
    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port})")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动无头浏览器失败
    #[error("启动无头浏览器失败")]
    LaunchFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败")]
    NavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    #[error("执行脚本失败")]
    ScriptExecutionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 会话已断开
    #[error("浏览器会话已断开")]
    Disconnected,
}

/// 结果存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读取文件失败
    #[error("读取文件失败 ({path})")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path})")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path})")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 单轮测试错误（只影响当前轮次，不影响已保存的结果）
#[derive(Debug, Error)]
pub enum PassError {
    /// 页面上没有找到任何题目
    #[error("选项 {option_label}: 未找到任何题目")]
    DiscoveryFailed { option_label: String },
    /// 所有题目都没能选中
    #[error("选项 {option_label}: {total} 道题目全部选择失败")]
    NoSelections { option_label: String, total: u32 },
    /// 交卷失败
    #[error("选项 {option_label}: 交卷失败")]
    SubmitFailed { option_label: String },
    /// 测试过程中会话失去响应
    #[error("选项 {option_label}: 第 {question} 题时浏览器失去响应")]
    SessionLost { option_label: String, question: u32 },
    /// 交卷时会话失去响应
    #[error("选项 {option_label}: 交卷时浏览器失去响应")]
    SessionLostOnSubmit { option_label: String },
    /// 结果保存失败
    #[error("选项 {option_label}: 结果保存失败")]
    Persist {
        option_label: String,
        #[source]
        source: StoreError,
    },
}

/// 导致整次运行进入 Aborted 的原因
#[derive(Debug, Error)]
pub enum RunError {
    /// 恢复次数耗尽，会话仍无响应
    #[error("会话恢复失败，已尝试 {attempts} 次")]
    SessionUnrecoverable { attempts: u32 },
    /// 重做按钮多次点击失败
    #[error("重新考试失败，已尝试 {attempts} 次")]
    RetakeExhausted { attempts: u32 },
    /// 首次发现题目失败
    #[error("首次发现题目失败: 页面上没有题目")]
    DiscoveryFailed,
    /// 某些选项多次重跑仍没有结果，不能交卷
    #[error("选项 {missing} 重跑 {attempts} 次仍未完成")]
    PassesIncomplete { missing: String, attempts: u32 },
    /// 最终答案没能提交
    #[error("最终交卷失败: {reason}")]
    FinalSubmitFailed { reason: String },
    /// 操作员中断
    #[error("操作员中断运行")]
    Cancelled,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件 {path} 解析失败")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置项取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.into())
    }
}

// ========== 便捷构造函数 ==========

impl BrowserError {
    /// 创建浏览器连接错误
    pub fn connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        }
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

impl StoreError {
    pub fn read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn json_failed(path: impl Into<String>, source: serde_json::Error) -> Self {
        StoreError::JsonParseFailed {
            path: path.into(),
            source,
        }
    }
}

impl PassError {
    /// 是否需要在继续之前先做会话恢复
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            PassError::SessionLost { .. }
                | PassError::SessionLostOnSubmit { .. }
                | PassError::DiscoveryFailed { .. }
        )
    }
}

/// 错误本身加上整条原因链，用 ": " 连接
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_error_recovery_classification() {
        let lost = PassError::SessionLost {
            option_label: "A".into(),
            question: 10,
        };
        let submit = PassError::SubmitFailed {
            option_label: "B".into(),
        };
        assert!(lost.needs_recovery());
        assert!(!submit.needs_recovery());
    }

    #[test]
    fn app_error_wraps_layer_errors() {
        let err: AppError = RunError::RetakeExhausted { attempts: 3 }.into();
        assert!(err.to_string().contains("3"));
        assert!(matches!(err, AppError::Run(_)));
    }

    #[test]
    fn cause_appears_once_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk says no");
        let err: AppError = StoreError::write_failed("results/option_0_s1.json", io).into();

        let chain = error_chain(&err);
        assert_eq!(chain, "写入文件失败 (results/option_0_s1.json): disk says no");

        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chain.matches("disk says no").count(), 1);
    }
}
