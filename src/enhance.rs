// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 图像增强 (逐像素, 无状态)
//! Stateless per-frame enhancement applied before detection / rendering

use anyhow::{bail, Result};
use image::{GrayImage, ImageBuffer, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::{bilateral_filter, separable_filter_equal};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnhanceType {
    #[default]
    None,
    /// 亮度通道直方图均衡
    HistogramEqualization,
    /// 限制对比度的自适应直方图均衡 (8x8 分块)
    Clahe,
    /// 线性对比度拉伸
    ContrastStretch,
    Brightness,
    Gamma,
    Unsharp,
    /// 保边去噪
    Bilateral,
    Saturation,
}

impl EnhanceType {
    pub fn name(&self) -> &'static str {
        match self {
            EnhanceType::None => "none",
            EnhanceType::HistogramEqualization => "he",
            EnhanceType::Clahe => "clahe",
            EnhanceType::ContrastStretch => "cs",
            EnhanceType::Brightness => "brightness",
            EnhanceType::Gamma => "gamma",
            EnhanceType::Unsharp => "unsharp",
            EnhanceType::Bilateral => "bilateral",
            EnhanceType::Saturation => "saturation",
        }
    }
}

impl fmt::Display for EnhanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnhanceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_lowercase().as_str() {
            "none" => EnhanceType::None,
            "he" => EnhanceType::HistogramEqualization,
            "clahe" => EnhanceType::Clahe,
            "cs" => EnhanceType::ContrastStretch,
            "brightness" => EnhanceType::Brightness,
            "gamma" => EnhanceType::Gamma,
            "unsharp" => EnhanceType::Unsharp,
            "bilateral" => EnhanceType::Bilateral,
            "saturation" => EnhanceType::Saturation,
            other => bail!("未知的增强方式: {}", other),
        };
        Ok(kind)
    }
}

/// 按类型增强图像, None 返回原图副本
pub fn enhance(img: &RgbImage, kind: EnhanceType) -> RgbImage {
    match kind {
        EnhanceType::None => img.clone(),
        EnhanceType::HistogramEqualization => equalize_luma(img),
        EnhanceType::Clahe => clahe(img, 2.0, 8),
        EnhanceType::ContrastStretch => contrast_stretch(img),
        EnhanceType::Brightness => brightness(img, 1.2, 30.0),
        EnhanceType::Gamma => gamma(img, 1.5),
        EnhanceType::Unsharp => unsharp(img, 9, 10.0),
        EnhanceType::Bilateral => bilateral(img, 9, 75.0, 75.0),
        EnhanceType::Saturation => saturation(img, 1.3),
    }
}

fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn luma_image(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        image::Luma([saturate(luma(img.get_pixel(x, y)))])
    })
}

/// 用新的亮度替换旧亮度, 色差保持不变
fn apply_luma(img: &RgbImage, old: &GrayImage, new: &GrayImage) -> RgbImage {
    let mut out = img.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        let delta = new.get_pixel(x, y)[0] as f32 - old.get_pixel(x, y)[0] as f32;
        for c in 0..3 {
            p[c] = saturate(p[c] as f32 + delta);
        }
    }
    out
}

/// 只均衡亮度
pub fn equalize_luma(img: &RgbImage) -> RgbImage {
    let y = luma_image(img);
    let eq = equalize_histogram(&y);
    apply_luma(img, &y, &eq)
}

/// 亮度通道 CLAHE: `grid` x `grid` 分块, 每块直方图按 `clip_limit` 截断后均衡,
/// 块间映射双线性插值
pub fn clahe(img: &RgbImage, clip_limit: f32, grid: u32) -> RgbImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let y = luma_image(img);
    let eq = clahe_gray(&y, clip_limit, grid);
    apply_luma(img, &y, &eq)
}

fn clahe_gray(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let gx = grid.clamp(1, w);
    let gy = grid.clamp(1, h);

    // 每块的映射表, 行优先
    let mut luts = Vec::with_capacity((gx * gy) as usize);
    for ty in 0..gy {
        for tx in 0..gx {
            let (x0, x1) = (tx * w / gx, (tx + 1) * w / gx);
            let (y0, y1) = (ty * h / gy, (ty + 1) * h / gy);
            let mut hist = [0u32; 256];
            for yy in y0..y1 {
                for xx in x0..x1 {
                    hist[gray.get_pixel(xx, yy)[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let tile_w = w as f32 / gx as f32;
    let tile_h = h as f32 / gy as f32;
    // 像素在块中心网格上的位置: (下标, 下一个下标, 权重)
    let locate = |p: u32, size: f32, count: u32| {
        let f = (p as f32 + 0.5) / size - 0.5;
        let i0 = f.floor().clamp(0.0, (count - 1) as f32) as u32;
        let i1 = (i0 + 1).min(count - 1);
        let a = (f - i0 as f32).clamp(0.0, 1.0);
        (i0, i1, a)
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = locate(x, tile_w, gx);
        let (ty0, ty1, ay) = locate(y, tile_h, gy);
        let at = |tx: u32, ty: u32| luts[(ty * gx + tx) as usize][v] as f32;
        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        image::Luma([saturate(top * (1.0 - ay) + bottom * ay)])
    })
}

/// 截断直方图, 超出部分平均分回各灰度级, 再累积成映射表
fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let batch = excess / 256;
    let mut residual = excess % 256;
    let step = if residual > 0 { (256 / residual).max(1) as usize } else { 1 };
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    for bin in hist.iter_mut().step_by(step) {
        if residual == 0 {
            break;
        }
        *bin += 1;
        residual -= 1;
    }

    let scale = 255.0 / area as f32;
    let mut sum = 0u32;
    for (v, &count) in lut.iter_mut().zip(hist.iter()) {
        sum += count;
        *v = saturate(sum as f32 * scale);
    }
    lut
}

/// 全图 min-max 拉伸到 0..255
pub fn contrast_stretch(img: &RgbImage) -> RgbImage {
    let (min, max) = img
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return img.clone();
    }
    let scale = 255.0 / (max - min) as f32;
    let mut out = img.clone();
    for v in out.iter_mut() {
        *v = saturate((*v - min) as f32 * scale);
    }
    out
}

/// out = |alpha * v + beta|
pub fn brightness(img: &RgbImage, alpha: f32, beta: f32) -> RgbImage {
    let mut out = img.clone();
    for v in out.iter_mut() {
        *v = saturate((alpha * *v as f32 + beta).abs());
    }
    out
}

pub fn gamma(img: &RgbImage, gamma: f32) -> RgbImage {
    let inv = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, t) in table.iter_mut().enumerate() {
        *t = ((i as f32 / 255.0).powf(inv) * 255.0) as u8;
    }
    let mut out = img.clone();
    for v in out.iter_mut() {
        *v = table[*v as usize];
    }
    out
}

/// 固定窗口的归一化高斯核
fn gaussian_kernel(taps: usize, sigma: f32) -> Vec<f32> {
    let center = (taps as f32 - 1.0) / 2.0;
    let kernel: Vec<f32> = (0..taps)
        .map(|i| {
            let d = i as f32 - center;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.into_iter().map(|k| k / sum).collect()
}

/// out = 1.5 * img - 0.5 * gaussian(img), 高斯窗口 `taps` x `taps`
pub fn unsharp(img: &RgbImage, taps: usize, sigma: f32) -> RgbImage {
    let kernel = gaussian_kernel(taps, sigma);
    // 浮点卷积, 避免中间结果截断
    let float: ImageBuffer<Rgb<f32>, Vec<f32>> =
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
            let p = img.get_pixel(x, y);
            Rgb([p[0] as f32, p[1] as f32, p[2] as f32])
        });
    let blurred = separable_filter_equal(&float, &kernel);
    let mut out = img.clone();
    for (v, b) in out.iter_mut().zip(blurred.iter()) {
        *v = saturate(1.5 * *v as f32 - 0.5 * *b);
    }
    out
}

/// 逐通道双边滤波
pub fn bilateral(
    img: &RgbImage,
    window: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let channels: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(img.width(), img.height(), |x, y| {
                image::Luma([img.get_pixel(x, y)[c]])
            });
            bilateral_filter(&plane, window, sigma_color, sigma_space)
        })
        .collect();
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        Rgb([
            channels[0].get_pixel(x, y)[0],
            channels[1].get_pixel(x, y)[0],
            channels[2].get_pixel(x, y)[0],
        ])
    })
}

pub fn saturation(img: &RgbImage, scale: f32) -> RgbImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(p[0], p[1], p[2]);
        let (r, g, b) = hsv_to_rgb(h, (s * scale).min(1.0), v);
        *p = Rgb([r, g, b]);
    }
    out
}

/// RGB转HSV, h: 0-360, s/v: 0-1
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

/// HSV转RGB
pub(crate) fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        saturate((r + m) * 255.0),
        saturate((g + m) * 255.0),
        saturate((b + m) * 255.0),
    )
}
