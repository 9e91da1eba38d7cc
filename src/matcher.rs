use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::index::IndexHandle;

/// 一对重复图片，`first_image_id < second_image_id`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DuplicatePair {
    pub first_image_id: usize,
    pub second_image_id: usize,
    /// 相似度，范围 `[0, 1]`
    pub similarity: f32,
}

/// 比较内积时允许的误差
///
/// 归一化后的 f32 向量与自身的内积可能是 0.99999994 而不是 1，
/// 阈值为 1 时完全相同的图片也应当被找出。
pub const SCORE_TOLERANCE: f32 = 1e-6;

/// `[0, 1]` 相似度 -> `[-1, 1]` 内积
#[inline]
pub fn to_raw(similarity: f32) -> f32 {
    similarity * 2. - 1.
}

/// `[-1, 1]` 内积 -> `[0, 1]` 相似度
#[inline]
pub fn to_similarity(raw: f32) -> f32 {
    (raw + 1.) / 2.
}

/// 检查阈值是否在 `[0, 1]` 范围内
pub fn check_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Validation(format!("阈值必须在 0 到 1 之间: {}", threshold)));
    }
    Ok(())
}

/// 穷举索引中的所有向量对，返回相似度不低于 `threshold` 的向量对
///
/// 近邻搜索只返回每个向量的前 k 个结果，无法保证找全，所以这里是 O(n²) 的两两比较。
///
/// 内积与阈值的差距在 [`SCORE_TOLERANCE`] 以内也视为重复。
/// 结果按 `(first_image_id, second_image_id)` 升序排列。
pub fn find_pairs(handle: &IndexHandle, threshold: f32) -> Result<Vec<DuplicatePair>> {
    check_threshold(threshold)?;
    let raw_threshold = to_raw(threshold) - SCORE_TOLERANCE;
    let n = handle.item_count()?;
    if n < 2 {
        return Ok(vec![]);
    }

    let start = Instant::now();
    let pairs = (0..n - 1)
        .into_par_iter()
        .map(|i| {
            let mut row = vec![];
            for j in i + 1..n {
                // 浮点误差可能使内积略微超出 [-1, 1]
                let raw = handle.score(i, j)?.clamp(-1., 1.);
                if raw >= raw_threshold {
                    row.push(DuplicatePair {
                        first_image_id: i,
                        second_image_id: j,
                        similarity: to_similarity(raw),
                    });
                }
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    debug!(
        "比较 {} 对向量，找到 {} 对重复，耗时 {:.2}ms",
        n * (n - 1) / 2,
        pairs.len(),
        start.elapsed().as_secs_f32() * 1000.
    );
    Ok(pairs)
}
