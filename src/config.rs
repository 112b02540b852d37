// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数配置 - 通过JSON文件调整参数

use crate::counting::CountedCategory;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// 帧乱序时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameOrderPolicy {
    /// 返回错误
    #[default]
    Reject,
    /// 打印警告并丢弃该帧
    Warn,
}

/// HUD 显示参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    pub show_centers: bool, // 绘制目标中心点
    pub panel_alpha: f32,   // 统计面板透明度 (0-1)
    pub font_scale: f32,    // 字号 (像素)
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            show_centers: true,
            panel_alpha: 0.5,
            font_scale: 24.0,
        }
    }
}

/// 计数参数配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// 追加的类别映射, 例如 {"van": "car"}
    pub extra_labels: BTreeMap<String, CountedCategory>,
    pub frame_order: FrameOrderPolicy,
    pub hud: HudConfig,
}

impl CountingConfig {
    /// 从JSON文件加载配置; 文件不存在时写出默认配置, 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!(path = %path.display(), "✅ 配置已加载");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "⚠️ 配置文件解析失败, 使用默认值");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "📝 配置文件不存在, 创建默认配置");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!(error = %e, "❌ 保存默认配置失败");
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入配置失败: {}", path.display()))?;
        info!(path = %path.display(), "💾 配置已保存");
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            extra_labels = self.extra_labels.len(),
            frame_order = ?self.frame_order,
            show_centers = self.hud.show_centers,
            "🎛️ 当前计数配置"
        );
    }
}
