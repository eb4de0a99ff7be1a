//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `cov-runtime`: 运行 seq-runtime 覆盖率
//! - `cov-workspace`: 运行 workspace 覆盖率
//! - `config-check`: 检查配置文件（解析、取值范围、场景绑定）

use std::path::Path;
use std::process::{Command, ExitCode};

use host::{AppConfig, AppState};

/// 门禁步骤，按顺序执行，任一失败即停止
const CHECK_STEPS: &[&[&str]] = &[
    &["fmt", "--all", "--", "--check"],
    &["clippy", "--workspace", "--all-targets"],
    &["test", "--workspace"],
];

const COVERAGE_REPORT: &str = "target/llvm-cov/html/index.html";

/// 执行一条 cargo 命令，输出步骤标题
fn cargo(args: &[&str]) -> anyhow::Result<()> {
    let step = format!("cargo {}", args.join(" "));
    eprintln!("\n==> {step}");
    let status = Command::new("cargo").args(args).status()?;
    anyhow::ensure!(status.success(), "{step} failed with {status}");
    Ok(())
}

/// 以 llvm-cov 运行测试并生成 HTML 报告；`scope` 为包选择参数
fn coverage(scope: &[&str]) -> anyhow::Result<()> {
    let probe = Command::new("cargo").args(["llvm-cov", "--version"]).output();
    if !probe.is_ok_and(|out| out.status.success()) {
        anyhow::bail!(
            "cargo llvm-cov 不可用。\n\
请先安装：\n\
  - cargo install cargo-llvm-cov\n\
  - rustup component add llvm-tools-preview\n\
然后重试。"
        );
    }

    let mut args = vec!["llvm-cov"];
    args.extend_from_slice(scope);
    args.extend(["--all-features", "--html"]);
    cargo(&args)?;

    eprintln!("\nCoverage HTML: {COVERAGE_REPORT}");
    Ok(())
}

fn main() -> ExitCode {
    match real_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("xtask error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn real_main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let sub = args.next().unwrap_or_else(|| "help".to_string());

    match sub.as_str() {
        "check-all" => CHECK_STEPS.iter().copied().try_for_each(cargo)?,
        "cov-runtime" => coverage(&["-p", "seq-runtime"])?,
        // xtask 本身不计入 workspace 覆盖率
        "cov-workspace" => coverage(&["--workspace", "--exclude", "xtask"])?,
        "config-check" => {
            let path = args.next().unwrap_or_else(|| "config.json".to_string());
            config_check(Path::new(&path))?;
        }
        "help" | "-h" | "--help" => print_help(),
        other => anyhow::bail!("unknown xtask subcommand: {other}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - 开发辅助工具

USAGE:
  cargo xtask <command>

COMMANDS:
  check-all       运行 fmt、clippy、test 门禁检查
  cov-runtime     运行 seq-runtime 覆盖率报告
  cov-workspace   运行 workspace 覆盖率报告
  config-check    检查配置文件

CONFIG-CHECK:
  cargo xtask config-check [path]

  不带参数：检查当前目录下的 config.json
  带路径参数：检查指定文件

  检查内容：
    - JSON 解析（缺省字段使用默认值）
    - 时长、tick 频率、日志级别的取值范围
    - 组件引用的场景对象是否存在

ALIASES (in .cargo/config.toml):
  cargo check-all     -> cargo xtask check-all
  cargo cov-runtime   -> cargo xtask cov-runtime
  cargo cov-workspace -> cargo xtask cov-workspace
  cargo config-check  -> cargo xtask config-check
"#
    );
}

//=============================================================================
// config-check 命令实现
//=============================================================================

fn config_check(path: &Path) -> anyhow::Result<()> {
    eprintln!("==> 检查配置文件: {}\n", path.display());

    let config = AppConfig::load_strict(path)?;
    config.validate()?;

    // 完整初始化一次，验证所有场景绑定
    let mut app_state = AppState::new(config.clone())?;
    app_state.shutdown();

    eprintln!("{}", serde_json::to_string_pretty(&config)?);
    eprintln!();
    eprintln!(
        "开场序列总时长: {:.2}s（首尾等待 {:.2}s）",
        config.opening.total_time(),
        config.opening.edge_wait()
    );
    eprintln!("✅ 检查通过，无错误");
    Ok(())
}
