//! # vn-cli
//!
//! 无界面的 Host：从磁盘读取脚本，用合成时钟驱动引擎，存档写为 JSON 文件。
//!
//! ## 用法
//!
//! ```bash
//! vn-cli run first.txt --root game --saves saves
//! vn-cli check game/first.txt game/second.txt
//! vn-cli saves --saves saves
//! vn-cli -vv --config engine.json run first.txt
//! ```

mod headless;
mod save_manager;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::Level;
use vn_conductor::{
    Engine, EngineConfig, SaveStorage, SystemData, TagRegistry, analyze_script,
    extract_resource_references, parse_script,
};

use headless::{FsResourceLoader, FsScriptSource, RunOptions};
use save_manager::SaveManager;

#[derive(Parser)]
#[command(name = "vn-cli")]
#[command(about = "视觉小说脚本引擎的命令行 Host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 引擎配置文件（JSON，缺失字段使用默认值）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志详细程度（-v: info, -vv: debug, -vvv: trace）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行脚本，自动点击并打印每次点击等待时的文字
    Run {
        /// 入口脚本（相对于 --root）
        script: String,

        /// 脚本与资源的根目录
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// 存档目录
        #[arg(short, long, default_value = "saves")]
        saves: PathBuf,

        /// 每帧推进的时间（ms）
        #[arg(long, default_value = "16")]
        frame_ms: u64,

        /// 最多运行的帧数
        #[arg(long, default_value = "100000")]
        max_frames: u64,

        /// 最多自动点击的次数
        #[arg(long, default_value = "1000")]
        max_clicks: u64,
    },

    /// 静态检查脚本
    Check {
        /// 脚本文件
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },

    /// 列出存档槽位
    Saves {
        /// 存档目录
        #[arg(short, long, default_value = "saves")]
        saves: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };
    if let Err(e) = config.validate() {
        bail!("配置不合法: {}", e);
    }

    match cli.command {
        Commands::Run {
            script,
            root,
            saves,
            frame_ms,
            max_frames,
            max_clicks,
        } => {
            let options = RunOptions {
                frame_ms,
                max_frames,
                max_clicks,
            };
            run(config, &script, &root, &saves, &options)
        }
        Commands::Check { scripts } => check(&scripts),
        Commands::Saves { saves } => list_saves(&saves),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: EngineConfig, script: &str, root: &Path, saves: &Path, options: &RunOptions) -> Result<()> {
    let mut engine = Engine::new(config, Box::new(FsScriptSource::new(root)))
        .context("无法创建引擎")?
        .with_loader(Box::new(FsResourceLoader::new(root)))
        .with_storage(Box::new(SaveManager::new(saves)));
    engine
        .start(script)
        .with_context(|| format!("无法启动脚本 {}", script))?;

    // 脚本出错时也保留已读记录
    let driven = headless::drive(&mut engine, options);
    let saved = engine.save_system_data();
    let summary = driven?;
    saved.context("无法写入系统存档")?;
    for (i, page) in summary.transcript.iter().enumerate() {
        println!("── {} ──", i + 1);
        println!("{}", page.trim_end());
    }
    if !summary.finished {
        println!("（在第 {} 帧中止：脚本仍在等待）", summary.frames);
    }
    Ok(())
}

fn check(scripts: &[PathBuf]) -> Result<()> {
    let registry = TagRegistry::build(vn_conductor::tags::all()).context("指令注册失败")?;
    let mut errors = 0;

    for path in scripts {
        let text = std::fs::read_to_string(path).with_context(|| format!("无法读取 {:?}", path))?;
        let name = path.to_string_lossy();
        let parsed = match parse_script(&name, &text) {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("[ERROR] {}: {}", name, e);
                errors += 1;
                continue;
            }
        };

        let result = analyze_script(&parsed, &registry);
        for diagnostic in &result.diagnostics {
            println!("{}", diagnostic);
        }
        errors += result.error_count();

        let root = path.parent().unwrap_or(Path::new("."));
        for reference in extract_resource_references(&parsed) {
            if !root.join(&reference.path).exists() {
                println!(
                    "[WARN] {}:{}: 引用的{:?}资源不存在: {}",
                    name, reference.line, reference.kind, reference.path
                );
            }
        }
    }

    if errors > 0 {
        bail!("发现 {} 个错误", errors);
    }
    Ok(())
}

fn list_saves(saves: &Path) -> Result<()> {
    let manager = SaveManager::new(saves);
    let system = match manager.read(vn_conductor::storage::SYSTEM_KEY)? {
        Some(json) => SystemData::from_json(&json).context("系统存档损坏")?,
        None => SystemData::default(),
    };

    let slots = manager.list_slots();
    if slots.is_empty() {
        println!("没有存档");
        return Ok(());
    }
    for slot in slots {
        match system.slots.get(&slot) {
            Some(meta) => println!("{:03}  {}  {}  {}", slot, meta.date, meta.comment, meta.text),
            None => println!("{:03}  （无索引信息）", slot),
        }
    }
    Ok(())
}
