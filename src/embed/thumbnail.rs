use image::RgbImage;
use image::imageops::{self, FilterType};

use super::{Embedder, center};
use crate::error::{Error, Result};

/// 缩略图边长上限，对应 65536 维向量
pub const MAX_SIZE: u32 = 256;

/// 将图片缩放为 `size x size` 的灰度缩略图，并以去均值后的像素作为特征
///
/// 对缩放、重新压缩和轻微调色不敏感，但无法识别裁剪和旋转。
#[derive(Debug, Clone)]
pub struct ThumbnailEmbedder {
    /// 取值 `1..=MAX_SIZE`
    size: u32,
}

impl ThumbnailEmbedder {
    pub fn new(size: u32) -> Result<Self> {
        if !(1..=MAX_SIZE).contains(&size) {
            return Err(Error::Validation(format!("缩略图尺寸必须在 1 到 {} 之间: {}", MAX_SIZE, size)));
        }
        Ok(Self { size })
    }
}

impl Default for ThumbnailEmbedder {
    fn default() -> Self {
        Self { size: 16 }
    }
}

impl Embedder for ThumbnailEmbedder {
    fn dimensions(&self) -> usize {
        self.size as usize * self.size as usize
    }

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Embedding("图片尺寸为 0".to_string()));
        }
        let gray = imageops::grayscale(image);
        let small = imageops::resize(&gray, self.size, self.size, FilterType::Triangle);
        let mut v = small.pixels().map(|p| p.0[0] as f32 / 255.).collect::<Vec<_>>();
        center(&mut v);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_dimensions() {
        let embedder = ThumbnailEmbedder::new(8).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        let img = RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]));
        assert_eq!(embedder.embed(&img).unwrap().len(), 64);
    }

    #[test]
    fn test_size_bounds() {
        assert_eq!(ThumbnailEmbedder::new(MAX_SIZE).unwrap().dimensions(), 65536);
        for size in [0, MAX_SIZE + 1, 70000, u32::MAX] {
            assert!(matches!(ThumbnailEmbedder::new(size), Err(Error::Validation(_))));
        }
    }

    #[test]
    fn test_uniform_image_is_zero() {
        let embedder = ThumbnailEmbedder::default();
        let img = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        let v = embedder.embed(&img).unwrap();
        assert!(v.iter().all(|x| x.abs() < 1e-6));
    }
}
