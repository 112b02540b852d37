// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数流水线 (Counting Pipeline)
//!
//! 双线程架构, 通过有界通道通信:
//! - Reader:  读取跟踪结果并按帧序号重排 (独立线程)
//! - Counter: 计数 + 增强 + HUD渲染 + 保存 (当前线程, 严格逐帧)

use crate::config::CountingConfig;
use crate::counting::CountingEngine;
use crate::enhance::{enhance, EnhanceType};
use crate::input::{FrameRecord, TrackFileReader};
use crate::overlay::{HudMode, HudRenderer};
use crate::report::CountingReport;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 流水线参数
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// 跟踪结果文件 (JSON lines)
    pub tracks: PathBuf,
    /// 帧图片目录, 文件名为 `{帧序号:06}.{ext}`
    pub frames_dir: Option<PathBuf>,
    pub frame_ext: String,
    /// 未提供帧图片时必须指定
    pub frame_height: Option<u32>,
    pub enhance: EnhanceType,
    pub output_dir: PathBuf,
    /// 处理到指定帧数后停止
    pub max_frames: Option<u64>,
    pub render: bool,
    /// 标注帧的HUD样式
    pub hud_mode: HudMode,
    pub font: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn new(tracks: impl Into<PathBuf>) -> Self {
        Self {
            tracks: tracks.into(),
            frames_dir: None,
            frame_ext: "jpg".to_string(),
            frame_height: None,
            enhance: EnhanceType::None,
            output_dir: PathBuf::from("outputs"),
            max_frames: None,
            render: true,
            hud_mode: HudMode::Count,
            font: None,
        }
    }
}

/// 流水线运行结果
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: CountingReport,
    pub report_path: PathBuf,
    /// 标注帧输出目录 (有渲染时)
    pub annotated_dir: Option<PathBuf>,
}

pub struct Pipeline {
    config: CountingConfig,
    options: PipelineOptions,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: CountingConfig, options: PipelineOptions) -> Self {
        Self {
            config,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 取消标志: 置位后在下一帧之前停止, 已有计数作为部分结果保留
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn frame_path(&self, frame_index: u64) -> Option<PathBuf> {
        self.options
            .frames_dir
            .as_ref()
            .map(|dir| dir.join(format!("{:06}.{}", frame_index, self.options.frame_ext)))
    }

    fn load_frame(&self, frame_index: u64) -> Option<RgbImage> {
        let path = self.frame_path(frame_index)?;
        match image::open(&path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(frame_index, path = %path.display(), error = %e, "⚠️ 帧图片读取失败");
                None
            }
        }
    }

    /// 画面高度: 优先使用参数, 否则读取第一帧图片
    fn resolve_frame_height(&self, first: Option<&FrameRecord>) -> Result<u32> {
        if let Some(height) = self.options.frame_height {
            return Ok(height);
        }
        let Some(first) = first else {
            bail!("跟踪结果为空, 且未指定画面高度");
        };
        let Some(path) = self.frame_path(first.frame_index) else {
            bail!("未指定画面高度 (--frame-height) 也未提供帧图片目录");
        };
        let (_, height) = image::image_dimensions(&path)
            .with_context(|| format!("无法读取帧尺寸: {}", path.display()))?;
        Ok(height)
    }

    pub fn run(&self) -> Result<PipelineOutcome> {
        let rx = TrackFileReader::new(&self.options.tracks).spawn();
        let mut engine = CountingEngine::from_config(&self.config);

        let first = match rx.recv() {
            Ok(record) => Some(record?),
            Err(_) => None,
        };
        let frame_height = self.resolve_frame_height(first.as_ref())?;
        let line_y = engine.start_session(frame_height)?;

        let counting_dir = self.options.output_dir.join("counting");
        let hud = self.build_hud()?;
        let annotated_dir = match &hud {
            Some(_) => {
                let dir = counting_dir.join(format!("frames_{}", crate::gen_time_string()));
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
                Some(dir)
            }
            None => None,
        };

        let mut events = Vec::new();
        let mut frames_processed = 0u64;
        let mut malformed_input = 0usize;
        let mut cancelled = false;
        let started = Instant::now();

        let records = first.into_iter().map(Ok).chain(rx.iter());
        for record in records {
            if self.stop.load(Ordering::Relaxed)
                || self.options.max_frames.is_some_and(|max| frames_processed >= max)
            {
                info!(frames_processed, "⏹️ 计数已取消, 保留部分结果");
                cancelled = true;
                break;
            }

            let record = record?;
            malformed_input += record.malformed;
            let report = engine.process_frame(&record.detections, record.frame_index)?;
            frames_processed += 1;

            if let (Some(hud), Some(dir)) = (&hud, &annotated_dir) {
                if let Some(frame) = self.load_frame(record.frame_index) {
                    let mut frame = enhance(&frame, self.options.enhance);
                    match self.options.hud_mode {
                        HudMode::Count => hud.render(
                            &mut frame,
                            line_y,
                            &record.detections,
                            engine.mapper(),
                            &report,
                        ),
                        HudMode::Detect => hud.render_detections(&mut frame, &record.detections),
                    }
                    let out = dir.join(format!("{:06}.png", record.frame_index));
                    frame
                        .save(&out)
                        .with_context(|| format!("保存标注帧失败: {}", out.display()))?;
                }
            }

            events.extend(report.events);

            if frames_processed % 100 == 0 {
                let fps = frames_processed as f64 / started.elapsed().as_secs_f64().max(1e-6);
                debug!(frames_processed, fps, "处理进度");
            }
        }

        let stats = engine.stats().cloned().unwrap_or_default();
        let tally = engine.end_session()?;

        let report = CountingReport {
            generated_at: chrono::Local::now().to_rfc3339(),
            source: self.options.tracks.display().to_string(),
            frame_height,
            line_y,
            frames_processed,
            cancelled,
            tally,
            events,
            stats,
            malformed_input,
        };
        let report_path = report.write_to(&counting_dir)?;

        Ok(PipelineOutcome {
            report,
            report_path,
            annotated_dir,
        })
    }

    fn build_hud(&self) -> Result<Option<HudRenderer>> {
        if !self.options.render || self.options.frames_dir.is_none() {
            return Ok(None);
        }
        let mut hud = HudRenderer::new(self.config.hud.clone());
        if let Some(font) = &self.options.font {
            hud = hud.with_font_file(font)?;
        }
        if !hud.has_font() {
            info!("未指定字体, HUD面板不绘制文字");
        }
        Ok(Some(hud))
    }
}
