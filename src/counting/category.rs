// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 类别映射: 检测器原始类别名 → 计数类别

use super::types::CountedCategory;
use phf::phf_map;
use std::collections::HashMap;

/// 默认映射表 (键为小写)
static DEFAULT_LABELS: phf::Map<&'static str, CountedCategory> = phf_map! {
    "car" => CountedCategory::Car,
    "motorcycle" => CountedCategory::Motorcycle,
    "motorbike" => CountedCategory::Motorcycle,
    "bus" => CountedCategory::Bus,
    "truck" => CountedCategory::Truck,
    "bicycle" => CountedCategory::Bicycle,
};

/// 类别映射器, 构造后不可变
#[derive(Clone, Debug, Default)]
pub struct CategoryMapper {
    /// 配置追加/覆盖的映射 (键已转小写)
    overrides: HashMap<String, CountedCategory>,
}

impl CategoryMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在默认表之上叠加配置中的映射
    pub fn with_overrides<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = (S, CountedCategory)>,
        S: AsRef<str>,
    {
        let overrides = extra
            .into_iter()
            .map(|(label, category)| (label.as_ref().to_lowercase(), category))
            .collect();
        Self { overrides }
    }

    /// 大小写不敏感的精确查找; 未映射的类别返回 None
    pub fn map(&self, raw_label: &str) -> Option<CountedCategory> {
        let key = raw_label.to_lowercase();
        self.overrides
            .get(&key)
            .copied()
            .or_else(|| DEFAULT_LABELS.get(key.as_str()).copied())
    }

    /// 当前生效的全部原始类别名 (排序后)
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = DEFAULT_LABELS
            .keys()
            .map(|k| k.to_string())
            .chain(self.overrides.keys().cloned())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}
