use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hkcut_config::AppConfig;
use hkcut_frontend::{RunOptions, cli, loader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "hkcut", version, about = "HK/Siemens MPF 切割程序工具")]
struct Cli {
    /// 配置文件路径，默认读取 HKCUT_CONFIG 或 ./config/default.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 覆盖板料尺寸，例如 48x96
    #[arg(long, global = true, value_name = "WxH")]
    sheet: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 以 JSON 输出零件、板料与告警概览
    Summary {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// 按新顺序重排零件（或某个零件内的轮廓）并写出
    Reorder {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// 新的零件顺序，例如 3,1,2；给出 --part 时为该零件的轮廓序号
        #[arg(long, value_name = "IDS")]
        order: String,
        /// 只重排该零件内的轮廓
        #[arg(long, value_name = "ID")]
        part: Option<u32>,
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// 计算余料区域
    Skeleton {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// 生成分离线零件并写出
    Breakup {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
        /// 水平分离线条数
        #[arg(long, value_name = "N")]
        horizontal: Option<usize>,
        /// 竖直分离线条数
        #[arg(long, value_name = "N")]
        vertical: Option<usize>,
        /// 分离线零件的工艺号
        #[arg(long, value_name = "N")]
        tech: Option<u32>,
    },
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = start(args) {
        error!(error = %err, "命令执行失败");
        eprintln!("错误：{err:#}");
        std::process::exit(1);
    }
}

fn start(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => loader::load_app_config(Some(path.as_path()))
            .with_context(|| format!("加载配置 {} 失败", path.display()))?,
        None => loader::load_app_config(None).context("加载配置失败")?,
    };
    init_logging(&config);
    info!("启动 hkcut");
    run(args, config)
}

fn run(args: Cli, config: AppConfig) -> Result<()> {
    let sheet = args
        .sheet
        .as_deref()
        .map(loader::parse_sheet_arg)
        .transpose()
        .context("解析 --sheet 失败")?;
    let options = RunOptions::new(config).with_sheet(sheet);

    match args.command {
        Command::Summary { input } => {
            let report = hkcut_frontend::run_summary(&input, &options)
                .with_context(|| format!("无法汇总 {}", input.display()))?;
            cli::print_json(&report)?;
        }
        Command::Reorder {
            input,
            order,
            part,
            output,
        } => {
            let target = match part {
                Some(part) => hkcut_frontend::run_reorder_contours(
                    &input,
                    part,
                    &order,
                    output.as_deref(),
                    &options,
                ),
                None => hkcut_frontend::run_reorder(&input, &order, output.as_deref(), &options),
            }
            .with_context(|| format!("无法重排 {}", input.display()))?;
            println!("已写入 {}", target.display());
        }
        Command::Skeleton { input } => {
            let report = hkcut_frontend::run_skeleton(&input, &options)
                .with_context(|| format!("无法计算 {} 的余料", input.display()))?;
            cli::print_skeleton(&report);
        }
        Command::Breakup {
            input,
            output,
            horizontal,
            vertical,
            tech,
        } => {
            let mut params = options.breakup_params();
            if let Some(count) = horizontal {
                params.horizontal_count = count;
            }
            if let Some(count) = vertical {
                params.vertical_count = count;
            }
            if let Some(code) = tech {
                params.tech_code = code;
            }
            let report =
                hkcut_frontend::run_breakup(&input, output.as_deref(), params, &options)
                    .with_context(|| format!("无法为 {} 生成分离线", input.display()))?;
            cli::print_breakup(&report);
        }
    }
    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 标准输出留给报告
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
