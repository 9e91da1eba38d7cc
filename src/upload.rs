use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbImage};
use log::warn;

use crate::error::Result;

/// 上传文件的校验规则
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// 支持的 MIME 类型
    pub content_types: Vec<String>,
    /// 单个文件的最大字节数
    pub max_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            content_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
            // 10M
            max_size: 10 * 1024 * 1024,
        }
    }
}

impl UploadPolicy {
    /// 检查文件类型和大小，不合法时打印警告并返回 false
    pub fn check(&self, name: &str, content_type: Option<&str>, size: usize) -> bool {
        match content_type {
            Some(ct) if self.content_types.iter().any(|t| t == ct) => {}
            _ => {
                warn!("跳过不支持的文件类型 {}: {:?}", name, content_type);
                return false;
            }
        }
        if size > self.max_size {
            warn!("跳过过大的文件 {}: {} 字节", name, size);
            return false;
        }
        true
    }
}

/// 根据文件后缀推断 MIME 类型
pub fn guess_content_type(path: impl AsRef<Path>) -> Option<&'static str> {
    let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// 解码图片，按照 EXIF 方向旋转，并转换为 RGB
pub fn decode_image(data: &[u8]) -> Result<RgbImage> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image.into_rgb8())
}
