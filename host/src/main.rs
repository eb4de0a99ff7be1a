//! # Host (headless)
//!
//! 读取配置，构建飞船场景，按固定 tick 驱动开场序列与各组件，结束时输出运行摘要。
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p host
//! cargo run -p host -- --config config.json --ticks 600
//! cargo run -p host -- --shutdown-at 5 --task-at 2 --interact-at 3 --glitch 4:0.8
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use host::{Action, AppConfig, AppState, Timeline, run_headless};

#[derive(Parser, Debug)]
#[command(name = "host")]
#[command(about = "开场序列 headless 驱动")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// 运行的 tick 数（默认：driver.max_seconds * tick_rate）
    #[arg(short, long)]
    ticks: Option<u64>,

    /// 每秒 tick 数（覆盖配置）
    #[arg(long)]
    tick_rate: Option<u32>,

    /// 日志级别（覆盖配置）
    #[arg(long)]
    log_level: Option<String>,

    /// 发电机关闭时间（秒）
    #[arg(long)]
    shutdown_at: Option<f32>,

    /// 机房任务完成时间（秒）
    #[arg(long)]
    task_at: Option<f32>,

    /// 与矿物交互的时间（秒）
    #[arg(long)]
    interact_at: Option<f32>,

    /// 故障强度采样，格式 `<秒>:<强度>`，可重复
    #[arg(long, value_parser = parse_glitch)]
    glitch: Vec<(f32, f32)>,
}

fn parse_glitch(s: &str) -> Result<(f32, f32), String> {
    let (at, intensity) = s
        .split_once(':')
        .ok_or_else(|| format!("格式应为 <秒>:<强度>，实际为 '{s}'"))?;
    let at = at.trim().parse::<f32>().map_err(|e| format!("时间无效: {e}"))?;
    let intensity = intensity
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("强度无效: {e}"))?;
    Ok((at, intensity))
}

fn init_logging(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn build_timeline(cli: &Cli) -> Timeline {
    let mut timeline = Timeline::new();
    if let Some(at) = cli.shutdown_at {
        timeline.push(at, Action::Shutdown);
    }
    if let Some(at) = cli.task_at {
        timeline.push(at, Action::CompleteTask);
    }
    if let Some(at) = cli.interact_at {
        timeline.push(
            at,
            Action::Interact {
                agent: "player".to_string(),
            },
        );
    }
    for &(at, intensity) in &cli.glitch {
        timeline.push(at, Action::Glitch { intensity });
    }
    timeline
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 日志级别可能来自配置文件，加载结果在日志初始化之后再输出
    let (mut config, load_error) = AppConfig::load_or_default(&cli.config);
    if let Some(rate) = cli.tick_rate {
        config.driver.tick_rate = rate;
    }
    if let Some(level) = &cli.log_level {
        config.driver.log_level = level.clone();
    }
    init_logging(&config.driver.log_level);
    AppConfig::report_load(&cli.config, load_error.as_ref());

    let ticks = cli.ticks.unwrap_or_else(|| {
        (config.driver.max_seconds * config.driver.tick_rate as f32).ceil() as u64
    });
    let timeline = build_timeline(&cli);

    let mut app_state = match AppState::new(config) {
        Ok(app_state) => app_state,
        Err(e) => {
            error!(error = %e, "初始化失败");
            return ExitCode::FAILURE;
        }
    };

    let summary = match run_headless(&mut app_state, timeline, ticks) {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "运行失败");
            return ExitCode::FAILURE;
        }
    };
    app_state.shutdown();

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error = %e, "摘要序列化失败");
            return ExitCode::FAILURE;
        }
    }
    info!("完成");
    ExitCode::SUCCESS
}
