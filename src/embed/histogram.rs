use image::RgbImage;

use super::{Embedder, center};
use crate::error::{Error, Result};

/// RGB 联合颜色直方图，每个通道 `bins` 个桶
#[derive(Debug, Clone)]
pub struct ColorHistogramEmbedder {
    bins: u32,
}

impl ColorHistogramEmbedder {
    pub fn new(bins: u32) -> Result<Self> {
        if !(1..=64).contains(&bins) {
            return Err(Error::Validation(format!("直方图桶数必须在 1 到 64 之间: {}", bins)));
        }
        Ok(Self { bins })
    }

    fn bucket(&self, c: u8) -> usize {
        (c as u32 * self.bins / 256) as usize
    }
}

impl Default for ColorHistogramEmbedder {
    fn default() -> Self {
        Self { bins: 8 }
    }
}

impl Embedder for ColorHistogramEmbedder {
    fn dimensions(&self) -> usize {
        self.bins.pow(3) as usize
    }

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let total = image.width() as usize * image.height() as usize;
        if total == 0 {
            return Err(Error::Embedding("图片尺寸为 0".to_string()));
        }
        let bins = self.bins as usize;
        let mut hist = vec![0f32; self.dimensions()];
        for p in image.pixels() {
            let [r, g, b] = p.0;
            hist[(self.bucket(r) * bins + self.bucket(g)) * bins + self.bucket(b)] += 1.;
        }
        hist.iter_mut().for_each(|x| *x /= total as f32);
        center(&mut hist);
        Ok(hist)
    }
}
