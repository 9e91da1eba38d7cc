use std::sync::Arc;

use crate::CollectionService;
use crate::upload::UploadPolicy;

/// 应用状态
pub struct AppState {
    /// 集合服务
    pub service: CollectionService,
    /// 上传文件校验规则
    pub upload: UploadPolicy,
    /// 默认的相似度阈值
    pub threshold: f32,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(service: CollectionService, upload: UploadPolicy, threshold: f32) -> Arc<Self> {
        Arc::new(AppState { service, upload, threshold })
    }
}
