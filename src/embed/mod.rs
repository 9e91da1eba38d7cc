mod histogram;
mod thumbnail;

use clap::ValueEnum;
pub use histogram::ColorHistogramEmbedder;
use image::RgbImage;
pub use thumbnail::ThumbnailEmbedder;

use crate::error::Result;

/// 特征提取器，将一张图片映射为固定长度的向量
pub trait Embedder: Send + Sync {
    /// 输出向量的维度，在整个生命周期内不变
    fn dimensions(&self) -> usize;

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>>;
}

/// 特征提取器类型
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// 灰度缩略图
    Thumbnail,
    /// RGB 颜色直方图
    Histogram,
}

/// L2 归一化，范数接近 0 的向量会被替换为全 0 向量
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        v.fill(0.);
    } else {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// 减去均值，使不相关的图片内积趋近 0 而不是始终为正
fn center(v: &mut [f32]) {
    if v.is_empty() {
        return;
    }
    let mean = v.iter().sum::<f32>() / v.len() as f32;
    v.iter_mut().for_each(|x| *x -= mean);
}
