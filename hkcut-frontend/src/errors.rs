use hkcut_config::ConfigError;
use hkcut_engine::EngineError;
use hkcut_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("序列化报告失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("无效的板料尺寸 `{0}`，应为 WxH，例如 48x96")]
    InvalidSheet(String),
    #[error("命令 `{command}` 执行失败: {message}")]
    Command { command: String, message: String },
}
