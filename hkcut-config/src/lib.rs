use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "HKCUT_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
    #[serde(default)]
    pub breakup: BreakupConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `HKCUT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 校验字段组合：板料宽高需同时给出且为正。
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.sheet.width, self.sheet.height) {
            (None, None) => {}
            (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {}
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid {
                    message: "[sheet] width 与 height 必须为正数".to_string(),
                });
            }
            _ => {
                return Err(ConfigError::Invalid {
                    message: "[sheet] width 与 height 需同时设置".to_string(),
                });
            }
        }
        if self.breakup.sequence_step == 0 {
            return Err(ConfigError::Invalid {
                message: "[breakup] sequence_step 不能为 0".to_string(),
            });
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 板料尺寸覆盖。设置后优先于程序中的 `HKINI`。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetConfig {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
}

impl SheetConfig {
    /// 宽高均已设置时返回 `(width, height)`。
    pub fn dimensions(&self) -> Option<(f64, f64)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakupConfig {
    #[serde(default = "BreakupConfig::default_horizontal")]
    pub horizontal_count: usize,
    #[serde(default = "BreakupConfig::default_vertical")]
    pub vertical_count: usize,
    #[serde(default = "BreakupConfig::default_tech")]
    pub tech_code: u32,
    #[serde(default = "BreakupConfig::default_program_id")]
    pub program_id: u32,
    #[serde(default = "BreakupConfig::default_sequence_start")]
    pub sequence_start: u32,
    #[serde(default = "BreakupConfig::default_sequence_step")]
    pub sequence_step: u32,
}

impl BreakupConfig {
    fn default_horizontal() -> usize {
        3
    }

    fn default_vertical() -> usize {
        2
    }

    fn default_tech() -> u32 {
        99
    }

    fn default_program_id() -> u32 {
        990001
    }

    fn default_sequence_start() -> u32 {
        900000
    }

    fn default_sequence_step() -> u32 {
        10
    }
}

impl Default for BreakupConfig {
    fn default() -> Self {
        Self {
            horizontal_count: Self::default_horizontal(),
            vertical_count: Self::default_vertical(),
            tech_code: Self::default_tech(),
            program_id: Self::default_program_id(),
            sequence_start: Self::default_sequence_start(),
            sequence_step: Self::default_sequence_step(),
        }
    }
}

/// 输出文件命名：未指定 `-o` 时在输入文件名后追加后缀。
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "OutputConfig::default_reorder_suffix")]
    pub reorder_suffix: String,
    #[serde(default = "OutputConfig::default_breakup_suffix")]
    pub breakup_suffix: String,
}

impl OutputConfig {
    fn default_reorder_suffix() -> String {
        "_reordered".to_string()
    }

    fn default_breakup_suffix() -> String {
        "_breakup".to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            reorder_suffix: Self::default_reorder_suffix(),
            breakup_suffix: Self::default_breakup_suffix(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置无效: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.sheet.dimensions().is_none());
        assert_eq!(cfg.breakup.horizontal_count, 3);
        assert_eq!(cfg.breakup.vertical_count, 2);
        assert_eq!(cfg.breakup.tech_code, 99);
        assert_eq!(cfg.breakup.sequence_start, 900000);
        assert!(cfg.output.directory.is_none());
        assert_eq!(cfg.output.breakup_suffix, "_breakup");
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [sheet]
            width = 60.0
            height = 120.0

            [breakup]
            horizontal_count = 5
            tech_code = 12

            [output]
            directory = "../out"
            reorder_suffix = "-ord"
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.sheet.dimensions(), Some((60.0, 120.0)));
        assert_eq!(cfg.sheet.origin_x, 0.0);
        assert_eq!(cfg.breakup.horizontal_count, 5);
        assert_eq!(cfg.breakup.vertical_count, 2);
        assert_eq!(cfg.breakup.tech_code, 12);
        assert_eq!(cfg.breakup.program_id, 990001);
        assert_eq!(
            cfg.output
                .directory
                .as_deref()
                .map(|p| p.to_string_lossy().to_string()),
            Some("../out".to_string())
        );
        assert_eq!(cfg.output.reorder_suffix, "-ord");
        assert_eq!(cfg.output.breakup_suffix, "_breakup");
    }

    #[test]
    fn partial_sheet_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[sheet]\nwidth = 48.0\n").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[breakup\nhorizontal_count = 2").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_sequence_step_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[breakup]\nsequence_step = 0\n").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
