pub mod cli;
pub mod errors;
pub mod loader;

use std::fs;
use std::path::{Path, PathBuf};

use errors::FrontendError;
use hkcut_config::AppConfig;
use hkcut_core::document::Sheet;
use hkcut_engine::BreakupParams;
use hkcut_engine::command::{CommandBus, CommandContext};
use hkcut_engine::job::Job;
use hkcut_io::{IoError, MpfFacade, ProgramSaver};
use tracing::info;

pub use cli::{BreakupReport, SkeletonReport, SummaryReport};

/// 单次命令调用的设置：配置文件内容加命令行覆盖。
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: AppConfig,
    /// 命令行 `--sheet`，优先于配置文件与 `HKINI`。
    pub sheet: Option<Sheet>,
}

impl RunOptions {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sheet: None,
        }
    }

    pub fn with_sheet(mut self, sheet: Option<Sheet>) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn sheet_override(&self) -> Option<Sheet> {
        self.sheet
            .or_else(|| loader::sheet_from_config(&self.config.sheet))
    }

    /// 配置文件中的分离线参数。
    pub fn breakup_params(&self) -> BreakupParams {
        loader::breakup_params(&self.config.breakup)
    }
}

/// 加载程序并生成概览。
pub fn run_summary(input: &Path, options: &RunOptions) -> Result<SummaryReport, FrontendError> {
    info!(input = %input.display(), "生成程序概览");
    let job = loader::load_job(input, options.sheet_override(), options.breakup_params())?;
    Ok(cli::summarize(input, job.require_document()?))
}

/// 按 `order`（逗号分隔的零件编号）重排并写出，返回输出路径。
pub fn run_reorder(
    input: &Path,
    order: &str,
    output: Option<&Path>,
    options: &RunOptions,
) -> Result<PathBuf, FrontendError> {
    info!(input = %input.display(), order, "重排零件");
    let mut job = loader::load_job(input, options.sheet_override(), options.breakup_params())?;
    run_command(&mut job, "reorder", &[order.to_string()])?;

    let target = loader::output_path(
        input,
        output,
        &options.config.output,
        &options.config.output.reorder_suffix,
    );
    save(&job, &target)?;
    Ok(target)
}

/// 按 `order`（逗号分隔的轮廓序号）重排零件 `part` 内的轮廓并写出，返回输出路径。
pub fn run_reorder_contours(
    input: &Path,
    part: u32,
    order: &str,
    output: Option<&Path>,
    options: &RunOptions,
) -> Result<PathBuf, FrontendError> {
    info!(input = %input.display(), part, order, "重排轮廓");
    let mut job = loader::load_job(input, options.sheet_override(), options.breakup_params())?;
    run_command(
        &mut job,
        "reorder_contours",
        &[part.to_string(), order.to_string()],
    )?;

    let target = loader::output_path(
        input,
        output,
        &options.config.output,
        &options.config.output.reorder_suffix,
    );
    save(&job, &target)?;
    Ok(target)
}

/// 计算余料区域。
pub fn run_skeleton(input: &Path, options: &RunOptions) -> Result<SkeletonReport, FrontendError> {
    info!(input = %input.display(), "计算余料");
    let mut job = loader::load_job(input, options.sheet_override(), options.breakup_params())?;
    run_command(&mut job, "skeleton", &[])?;
    Ok(cli::skeleton_report(job.skeleton()?))
}

/// 生成分离线零件并写出。
pub fn run_breakup(
    input: &Path,
    output: Option<&Path>,
    params: BreakupParams,
    options: &RunOptions,
) -> Result<BreakupReport, FrontendError> {
    info!(
        input = %input.display(),
        horizontal = params.horizontal_count,
        vertical = params.vertical_count,
        tech = params.tech_code,
        "生成分离线"
    );
    let mut job = loader::load_job(input, options.sheet_override(), params)?;
    run_command(&mut job, "breakup", &[])?;

    let target = loader::output_path(
        input,
        output,
        &options.config.output,
        &options.config.output.breakup_suffix,
    );
    save(&job, &target)?;

    let plan = job.last_plan().cloned().unwrap_or_default();
    Ok(cli::breakup_report(target, &plan))
}

fn run_command(job: &mut Job, name: &str, args: &[String]) -> Result<String, FrontendError> {
    let bus = CommandBus::new();
    let mut context = CommandContext { job };
    cli::dispatch_cli_command(&bus, name, args, &mut context).map_err(|message| {
        FrontendError::Command {
            command: name.to_string(),
            message,
        }
    })
}

fn save(job: &Job, target: &Path) -> Result<(), FrontendError> {
    if let Some(parent) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| IoError::WriteError {
            path: target.to_path_buf(),
            source,
        })?;
    }
    MpfFacade::new().save(job.require_document()?, target)?;
    Ok(())
}
