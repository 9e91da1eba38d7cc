use log::debug;

use crate::error::Result;
use crate::index::IndexHandle;

/// 构建参数策略：按向量数量线性增长，并限制在 `[min, max]` 范围内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    pub min_quality: usize,
    pub max_quality: usize,
    /// 每多少个向量增加 1
    pub items_per_quality: usize,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self { min_quality: 10, max_quality: 25, items_per_quality: 5 }
    }
}

impl BuildPolicy {
    /// 给定向量数量时使用的构建参数
    pub fn quality(&self, items: usize) -> usize {
        let q = items / self.items_per_quality.max(1) + 1;
        q.clamp(self.min_quality, self.max_quality.max(self.min_quality))
    }
}

/// 按顺序将向量添加到索引中并构建，向量在列表中的位置即为其 ID
pub fn build_index<V: AsRef<[f32]>>(
    handle: &mut IndexHandle,
    vectors: &[V],
    policy: &BuildPolicy,
) -> Result<()> {
    for (i, v) in vectors.iter().enumerate() {
        handle.add_item(i, v.as_ref())?;
    }
    let quality = policy.quality(vectors.len());
    debug!("构建索引: {} 个向量, quality = {}", vectors.len(), quality);
    handle.build(quality)
}
