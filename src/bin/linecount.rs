// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 过线计数 (Line Counter)
//!
//! 读取追踪器输出的逐帧跟踪结果, 统计各类别目标穿越画面中线的次数
//!
//! 系统架构:
//! 1. 读取线程: 解析跟踪结果, 按帧序号重排 (独立工作线程)
//! 2. 主线程:   逐帧计数, 可选增强 + HUD渲染, 输出报告

use anyhow::Result;
use clap::Parser;
use linecount::enhance::EnhanceType;
use linecount::overlay::HudMode;
use linecount::report::format_tally;
use linecount::{CountingConfig, Pipeline, PipelineOptions};
use std::path::PathBuf;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// 过线计数参数
#[derive(Parser, Debug)]
#[command(author, version, about = "过线计数 - 按类别统计穿越中线的目标", long_about = None)]
struct Args {
    /// 跟踪结果文件 (JSON lines, 每行一帧)
    #[arg(short, long)]
    tracks: PathBuf,

    /// 帧图片目录 (文件名: 000001.jpg ...)
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// 帧图片扩展名
    #[arg(long, default_value = "jpg")]
    frame_ext: String,

    /// 画面高度 (像素); 未提供帧图片时必填
    #[arg(long)]
    frame_height: Option<u32>,

    /// 图像增强: none/he/clahe/cs/brightness/gamma/unsharp/bilateral/saturation
    #[arg(short, long, default_value = "none")]
    enhance: EnhanceType,

    /// 配置文件
    #[arg(short, long, default_value = "counting.json")]
    config: PathBuf,

    /// 输出目录
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// 最多处理的帧数
    #[arg(long)]
    max_frames: Option<u64>,

    /// 不输出标注帧
    #[arg(long)]
    no_render: bool,

    /// 标注方式: count (计数HUD) / detect (仅检测框与数量)
    #[arg(short, long, default_value = "count")]
    mode: HudMode,

    /// HUD 字体 (TTF/OTF)
    #[arg(long)]
    font: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(); // RUST_LOG 可覆盖

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = CountingConfig::load(&args.config);
    config.log_summary();

    info!(
        tracks = %args.tracks.display(),
        enhance = %args.enhance,
        mode = %args.mode,
        "🚀 过线计数启动"
    );

    let options = PipelineOptions {
        tracks: args.tracks,
        frames_dir: args.frames_dir,
        frame_ext: args.frame_ext,
        frame_height: args.frame_height,
        enhance: args.enhance,
        output_dir: args.output,
        max_frames: args.max_frames,
        render: !args.no_render,
        hud_mode: args.mode,
        font: args.font,
    };

    let outcome = Pipeline::new(config, options).run()?;
    let report = &outcome.report;

    println!();
    println!("📊 计数结果 (线 y = {}):", report.line_y);
    print!("{}", format_tally(&report.tally));
    if report.cancelled {
        println!("⏹️ 已提前停止, 以上为部分结果");
    }
    println!("💾 报告: {}", outcome.report_path.display());
    if let Some(dir) = &outcome.annotated_dir {
        println!("🖼️ 标注帧: {}", dir.display());
    }
    Ok(())
}
