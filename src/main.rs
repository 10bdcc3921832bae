// ============================================================================
// 命令行入口：解析参数、加载选项、触发一次部署周期
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use static_resource_deployer_lib::models::dtos::BuildStatus;
use static_resource_deployer_lib::services::validator::load_options;
use static_resource_deployer_lib::{run, Trigger};

/// 将构建产物打包为 Static Resource 并 upsert 到 Salesforce
#[derive(Parser, Debug)]
#[command(name = "static-resource-deployer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 部署选项 JSON 文件
    #[arg(short, long, default_value = "deploy.json")]
    config: PathBuf,

    /// 上游构建失败，只报告错误
    #[arg(long)]
    build_failed: bool,

    /// 上游构建的错误信息（可重复）
    #[arg(long = "build-error", value_name = "MESSAGE")]
    build_errors: Vec<String>,

    /// 只打包 / 写本地，不执行远程 upsert
    #[arg(long)]
    no_deploy: bool,

    /// 日志级别 (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 构建命令，写在 `--` 之后；命令结束后再部署
    #[arg(last = true, value_name = "BUILD_COMMAND")]
    command: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut options = match load_options(&cli.config) {
        Ok(options) => options,
        Err(e) => {
            log::error!("ERROR: {}", e);
            return ExitCode::from(2);
        }
    };
    if cli.no_deploy {
        options.deploy = false;
    }

    let trigger = match cli.command.split_first() {
        Some((program, args)) => Trigger::Command {
            program: program.clone(),
            args: args.to_vec(),
        },
        None if cli.build_failed || !cli.build_errors.is_empty() => {
            Trigger::Finished(BuildStatus::failed(cli.build_errors))
        }
        None => Trigger::Finished(BuildStatus::succeeded()),
    };

    match run(&options, trigger) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
