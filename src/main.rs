//! exam-solver 命令行入口

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use exam_key_solver::utils::logging;
use exam_key_solver::Config;

mod commands;

#[derive(Parser)]
#[command(name = "exam-solver", version, about = "多轮统一选项交卷，推断选择题考试的答案")]
struct Cli {
    /// 配置文件（TOML），环境变量会覆盖其中的值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 结果目录，覆盖配置
    #[arg(long, global = true)]
    results_dir: Option<String>,

    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 完整运行：逐个选项测试 → 分析 → 提交答案
    Run {
        /// 继续指定的会话，跳过已完成的选项
        #[arg(long)]
        session: Option<String>,
    },

    /// 只测试一个选项
    Pass {
        /// 选项标签或索引（如 B 或 1）
        #[arg(long)]
        option: String,

        /// 继续指定的会话（默认新建）
        #[arg(long)]
        session: Option<String>,
    },

    /// 离线分析已保存的轮次并生成答案文件
    Analyze {
        /// 会话 ID（默认最近的会话）
        #[arg(long, conflicts_with = "all")]
        session: Option<String>,

        /// 跨所有会话分析，每个选项取最新的一轮
        #[arg(long)]
        all: bool,
    },

    /// 提交答案文件中的答案
    Submit {
        /// 答案文件（默认最新的）
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// 查看会话已完成和缺少的选项
    Status {
        /// 会话 ID（默认最近的会话）
        #[arg(long)]
        session: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    if let Some(dir) = &cli.results_dir {
        config.results_dir = dir.clone();
    }
    if cli.verbose {
        config.verbose_logging = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };
    logging::init(config.verbose_logging);

    let result = match cli.command {
        Commands::Run { session } => commands::run(config, session).await,
        Commands::Pass { option, session } => commands::pass(config, &option, session).await,
        Commands::Analyze { session, all } => commands::analyze(config, session, all).await,
        Commands::Submit { key } => commands::submit(config, key).await,
        Commands::Status { session } => commands::status(config, session).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
