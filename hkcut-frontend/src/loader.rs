use std::path::{Path, PathBuf};

use hkcut_config::{AppConfig, BreakupConfig, OutputConfig, SheetConfig};
use hkcut_core::document::Sheet;
use hkcut_core::geometry::Point2;
use hkcut_engine::BreakupParams;
use hkcut_engine::job::Job;
use hkcut_io::{MpfFacade, ProgramLoader};
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 读取配置：给出路径时只读该文件，否则按 `HKCUT_CONFIG` 与 `./config/default.toml` 查找。
/// 文件存在但无法读取或校验失败时返回错误。
pub fn load_app_config(explicit: Option<&Path>) -> Result<AppConfig, FrontendError> {
    let config = match explicit {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::discover()?,
    };
    Ok(config)
}

/// 配置文件中的板料覆盖，宽高未设置时返回 `None`。
pub fn sheet_from_config(sheet: &SheetConfig) -> Option<Sheet> {
    sheet.dimensions().map(|(width, height)| {
        Sheet::with_origin(Point2::new(sheet.origin_x, sheet.origin_y), width, height)
    })
}

/// 解析命令行中 `48x96` 形式的板料尺寸。
pub fn parse_sheet_arg(text: &str) -> Result<Sheet, FrontendError> {
    let invalid = || FrontendError::InvalidSheet(text.to_string());
    let (width, height) = text.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: f64 = width.trim().parse().map_err(|_| invalid())?;
    let height: f64 = height.trim().parse().map_err(|_| invalid())?;
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(invalid());
    }
    Ok(Sheet::new(width, height))
}

pub fn breakup_params(config: &BreakupConfig) -> BreakupParams {
    BreakupParams {
        horizontal_count: config.horizontal_count,
        vertical_count: config.vertical_count,
        tech_code: config.tech_code,
        program_id: config.program_id,
        sequence_start: config.sequence_start,
        sequence_step: config.sequence_step,
    }
}

/// 加载 MPF 程序并创建作业；文档告警逐条记录。
pub fn load_job(
    path: &Path,
    sheet: Option<Sheet>,
    params: BreakupParams,
) -> Result<Job, FrontendError> {
    let document = MpfFacade::with_sheet(sheet).load(path)?;
    for warning in document.warnings() {
        warn!(path = %path.display(), "{warning}");
    }
    info!(
        path = %path.display(),
        parts = document.parts().len(),
        blocks = document.blocks().len(),
        "程序已载入作业"
    );
    Ok(Job::with_document(document).with_params(params))
}

/// 输出路径：显式给出时直接使用，否则在输入文件名后追加后缀，
/// 目录取 `[output] directory`，未设置时与输入同目录。
pub fn output_path(
    input: &Path,
    explicit: Option<&Path>,
    output: &OutputConfig,
    suffix: &str,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string());
    let file_name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    let dir = match (&output.directory, input.parent()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(parent)) => parent.to_path_buf(),
        (None, None) => PathBuf::new(),
    };
    dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn explicit_config_errors_are_reported() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("hkcut.toml");
        fs::write(&path, "[breakup]\ntech_code = \"oops\"\n").expect("写入配置失败");
        let err = load_app_config(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, FrontendError::Config(_)), "{err}");

        let err = load_app_config(Some(dir.path().join("missing.toml").as_path())).unwrap_err();
        assert!(matches!(err, FrontendError::Config(_)), "{err}");

        fs::write(&path, "[breakup]\ntech_code = 7\n").expect("写入配置失败");
        let config = load_app_config(Some(path.as_path())).expect("读取配置失败");
        assert_eq!(config.breakup.tech_code, 7);
    }

    #[test]
    fn sheet_argument_accepts_both_separators() {
        let sheet = parse_sheet_arg("48x96").expect("解析失败");
        assert_eq!((sheet.width, sheet.height), (48.0, 96.0));
        let sheet = parse_sheet_arg("60.5X120").expect("解析失败");
        assert_eq!((sheet.width, sheet.height), (60.5, 120.0));
    }

    #[test]
    fn sheet_argument_rejects_bad_input() {
        for text in ["48", "48x", "x96", "0x96", "-1x5", "ax b", "NaNx4"] {
            assert!(
                matches!(parse_sheet_arg(text), Err(FrontendError::InvalidSheet(_))),
                "`{text}` 应被拒绝"
            );
        }
    }

    #[test]
    fn configured_sheet_carries_origin() {
        let config = SheetConfig {
            width: Some(10.0),
            height: Some(20.0),
            origin_x: 1.0,
            origin_y: 2.0,
        };
        let sheet = sheet_from_config(&config).expect("应有板料");
        assert_eq!(sheet.origin, Point2::new(1.0, 2.0));
        assert!(sheet_from_config(&SheetConfig::default()).is_none());
    }

    #[test]
    fn output_path_appends_suffix() {
        let output = OutputConfig::default();
        assert_eq!(
            output_path(Path::new("jobs/nest.mpf"), None, &output, "_breakup"),
            PathBuf::from("jobs/nest_breakup.mpf")
        );
        assert_eq!(
            output_path(Path::new("NEST"), None, &output, "_reordered"),
            PathBuf::from("NEST_reordered")
        );
        assert_eq!(
            output_path(
                Path::new("jobs/nest.mpf"),
                Some(Path::new("out.mpf")),
                &output,
                "_breakup"
            ),
            PathBuf::from("out.mpf")
        );

        let output = OutputConfig {
            directory: Some(PathBuf::from("out")),
            ..OutputConfig::default()
        };
        assert_eq!(
            output_path(Path::new("jobs/nest.mpf"), None, &output, "_breakup"),
            PathBuf::from("out/nest_breakup.mpf")
        );
    }

    #[test]
    fn load_job_applies_sheet_and_params() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("single.mpf");
        fs::write(
            &path,
            "HKOST(0,0,0,1,1)\nHKSTR(0,1,1,1)\nHKCUT\nG1 X4 Y1\nG1 X4 Y4\nG1 X1 Y4\nG1 X1 Y1\nHKSTO\nHKPED\n",
        )
        .expect("写入程序失败");

        let params = BreakupParams {
            tech_code: 5,
            ..BreakupParams::default()
        };
        let job = load_job(&path, Some(Sheet::new(10.0, 10.0)), params.clone()).expect("加载失败");
        let document = job.document().expect("应有文档");
        assert_eq!(document.parts().len(), 1);
        assert_eq!(document.sheet().map(|sheet| sheet.width), Some(10.0));
        assert_eq!(job.params(), &params);
    }

    #[test]
    fn load_job_reports_missing_file() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let err = load_job(&dir.path().join("missing.mpf"), None, BreakupParams::default())
            .unwrap_err();
        assert!(matches!(err, FrontendError::Io(_)));
    }
}
