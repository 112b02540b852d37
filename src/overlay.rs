// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HUD 叠加渲染
//!
//! 计数模式: 检测框, 计数线, 目标中心点, 以及各类别进出统计面板
//! 检测模式: 检测框 + 检测数量面板

use crate::config::HudConfig;
use crate::counting::{
    CategoryMapper, CountedCategory, Direction, FrameReport, TrackId, TrackedDetection,
};
use crate::enhance::hsv_to_rgb;
use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, bail, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 标注方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HudMode {
    /// 计数线 + 分类进出统计
    #[default]
    Count,
    /// 只标注检测框和检测数量
    Detect,
}

impl fmt::Display for HudMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HudMode::Count => f.write_str("count"),
            HudMode::Detect => f.write_str("detect"),
        }
    }
}

impl FromStr for HudMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "count" => Ok(HudMode::Count),
            "detect" => Ok(HudMode::Detect),
            other => bail!("未知的标注方式: {}", other),
        }
    }
}

// ========== 颜色 ==========

pub const LINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const IN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUT_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// 无追踪ID的检测框
pub const UNTRACKED_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 根据追踪ID生成不同颜色 (黄金角度采样)
pub fn id_to_color(id: TrackId) -> Rgb<u8> {
    let hue = ((id % 360_000) as f32 * 137.508) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.8, 0.9);
    Rgb([r, g, b])
}

// ========== 面板布局 ==========

const PANEL: (u32, u32, u32, u32) = (10, 10, 320, 290); // x1, y1, x2, y2
const COL_NAME: i32 = 20;
const COL_COLON: i32 = 140;
const COL_IN: i32 = 170;
const COL_SEP: i32 = 220;
const COL_OUT: i32 = 250;
const HEADER_Y: i32 = 40;
const ROW_START_Y: i32 = 80;
const ROW_STEP: i32 = 40;
const DETECT_PANEL: (u32, u32, u32, u32) = (10, 10, 280, 70);
const DETECT_TEXT: (i32, i32) = (25, 50);

/// HUD 渲染器
pub struct HudRenderer {
    config: HudConfig,
    font: Option<FontVec>,
}

impl HudRenderer {
    /// 不带字体: 面板只画背景, 不写文字
    pub fn new(config: HudConfig) -> Self {
        Self { config, font: None }
    }

    /// 加载 TTF/OTF 字体
    pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).with_context(|| format!("读取字体失败: {}", path.display()))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| anyhow!("字体解析失败 {}: {}", path.display(), e))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 计数模式的HUD
    pub fn render(
        &self,
        img: &mut RgbImage,
        line_y: f32,
        detections: &[TrackedDetection],
        mapper: &CategoryMapper,
        report: &FrameReport,
    ) {
        let width = img.width() as f32;

        self.draw_boxes(img, detections);

        if self.config.show_centers {
            for det in detections {
                // 只有参与计数的目标才画中心点
                if det.identity.is_none()
                    || mapper.map(&det.class_label).is_none()
                    || !det.bbox.is_finite()
                {
                    continue;
                }
                let (cx, cy) = det.bbox.center();
                draw_filled_circle_mut(img, (cx as i32, cy as i32), 6, CENTER_COLOR);
            }
        }

        // 本帧有目标过线时加粗高亮
        for event in &report.events {
            let color = match event.direction {
                Direction::Down => IN_COLOR,
                Direction::Up => OUT_COLOR,
            };
            draw_thick_hline(img, line_y, width, 5, color);
        }
        draw_thick_hline(img, line_y, width, 2, LINE_COLOR);

        self.draw_panel(img, report);
    }

    /// 检测模式的HUD: 全部检测框 + 检测数量
    pub fn render_detections(&self, img: &mut RgbImage, detections: &[TrackedDetection]) {
        self.draw_boxes(img, detections);
        blend_rect(img, DETECT_PANEL, Rgb([0, 0, 0]), self.config.panel_alpha);

        if let Some(font) = &self.font {
            let scale = PxScale::from(self.config.font_scale * 1.25);
            let (x, y) = DETECT_TEXT;
            let text = format!("Detected: {}", detections.len());
            draw_text_mut(img, TEXT_COLOR, x, y - scale.y as i32, scale, font, &text);
        }
    }

    /// 检测框 + 标签, 未映射类别和无ID目标同样绘制
    fn draw_boxes(&self, img: &mut RgbImage, detections: &[TrackedDetection]) {
        let label_scale = PxScale::from(self.config.font_scale * 0.75);

        for det in detections {
            let Some(rect) = bbox_rect(det) else {
                continue;
            };
            let color = det.identity.map_or(UNTRACKED_COLOR, id_to_color);
            draw_hollow_rect_mut(img, rect, color);
            // 加粗一圈
            if rect.width() > 2 && rect.height() > 2 {
                let inner = Rect::at(rect.left() + 1, rect.top() + 1)
                    .of_size(rect.width() - 2, rect.height() - 2);
                draw_hollow_rect_mut(img, inner, color);
            }

            if let Some(font) = &self.font {
                let mut label = det.class_label.clone();
                if let Some(id) = det.identity {
                    label.push_str(&format!(" #{}", id));
                }
                if let Some(conf) = det.confidence {
                    label.push_str(&format!(" {:.2}", conf));
                }
                let y = rect.top() - label_scale.y as i32 - 2;
                draw_text_mut(img, color, rect.left(), y, label_scale, font, &label);
            }
        }
    }

    fn draw_panel(&self, img: &mut RgbImage, report: &FrameReport) {
        blend_rect(img, PANEL, Rgb([0, 0, 0]), self.config.panel_alpha);

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(self.config.font_scale);
        // cv2 以基线定位, imageproc 以顶部定位
        let lift = self.config.font_scale as i32;

        let text = |img: &mut RgbImage, x: i32, y: i32, s: &str| {
            draw_text_mut(img, TEXT_COLOR, x, y - lift, scale, font, s);
        };

        text(img, COL_NAME, HEADER_Y, "TYPE");
        text(img, COL_IN - 10, HEADER_Y, "IN");
        text(img, COL_SEP, HEADER_Y, "|");
        text(img, COL_OUT - 10, HEADER_Y, "OUT");
        draw_line_segment_mut(img, (20.0, 50.0), (310.0, 50.0), TEXT_COLOR);

        let mut y = ROW_START_Y;
        for category in CountedCategory::DISPLAY_ORDER {
            let count = report.tally.get(category);
            text(img, COL_NAME, y, category.name());
            text(img, COL_COLON, y, ":");
            text(img, COL_IN, y, &count.inbound.to_string());
            text(img, COL_SEP, y, "|");
            text(img, COL_OUT, y, &count.outbound.to_string());
            y += ROW_STEP;
        }
    }
}

/// 检测框转为像素矩形; 坐标非法时返回 None
fn bbox_rect(det: &TrackedDetection) -> Option<Rect> {
    let b = det.bbox;
    if !b.is_finite() {
        return None;
    }
    let x = b.x1.round() as i32;
    let y = b.y1.round() as i32;
    let w = ((b.x2 - b.x1).round() as i32).max(1) as u32;
    let h = ((b.y2 - b.y1).round() as i32).max(1) as u32;
    Some(Rect::at(x, y).of_size(w, h))
}

/// 以 y 为中心画 thickness 行宽的水平线
fn draw_thick_hline(img: &mut RgbImage, y: f32, width: f32, thickness: i32, color: Rgb<u8>) {
    let start = -(thickness / 2);
    for dy in start..start + thickness {
        let row = y + dy as f32;
        draw_line_segment_mut(img, (0.0, row), (width, row), color);
    }
}

/// 半透明填充矩形, 超出画面部分裁掉
fn blend_rect(img: &mut RgbImage, rect: (u32, u32, u32, u32), color: Rgb<u8>, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let (x1, y1, x2, y2) = rect;
    let x2 = x2.min(img.width());
    let y2 = y2.min(img.height());
    for y in y1..y2 {
        for x in x1..x2 {
            let p = img.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] = (p[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8;
            }
        }
    }
}
