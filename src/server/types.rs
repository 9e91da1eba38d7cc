use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// 上传请求
#[derive(TryFromMultipart)]
pub struct UploadRequest {
    /// 单个文件的大小由 UploadPolicy 检查
    #[form_data(limit = "unlimited")]
    pub files: Vec<FieldData<Bytes>>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// 上传的图片文件，支持 PNG 和 JPEG，可以是多张图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub files: Vec<String>,
}

/// 查重参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DuplicatesQuery {
    /// 相似度阈值，范围从 0 到 1，不填则使用服务端默认值
    pub threshold: Option<f32>,
}
