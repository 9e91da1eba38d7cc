use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_typed_multipart::TypedMultipart;
use log::{info, warn};
use rayon::prelude::*;
use serde_json::{Value, json};
use tokio::task::block_in_place;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::upload::decode_image;
use crate::{CollectionId, DuplicatePair, IngestReport};

/// 服务状态
#[utoipa::path(get, path = "/")]
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "dupfind",
        "status": "OK",
    }))
}

/// 上传一组图片，创建集合
///
/// 类型或大小不符合要求、无法解码的图片会被跳过，对应的 `image_ids` 为 null
#[utoipa::path(
    post,
    path = "/images",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = IngestReport),
        (status = 400, description = "有效图片少于 2 张"),
    )
)]
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<UploadRequest>,
) -> Result<Json<IngestReport>> {
    info!("收到 {} 个上传文件", data.files.len());

    let report = block_in_place(|| {
        let images = data
            .files
            .par_iter()
            .map(|file| {
                let name = file.metadata.file_name.as_deref().unwrap_or("<unnamed>");
                let content_type = file.metadata.content_type.as_deref();
                if !state.upload.check(name, content_type, file.contents.len()) {
                    return None;
                }
                match decode_image(&file.contents) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!("解码图片失败 {}: {}", name, e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        state.service.ingest(images)
    })?;

    Ok(Json(report))
}

/// 查找集合中的重复图片
#[utoipa::path(
    get,
    path = "/duplicates/{id}",
    params(("id" = String, Path, description = "集合 ID"), DuplicatesQuery),
    responses(
        (status = 200, body = [DuplicatePair]),
        (status = 400, description = "阈值不在 0 到 1 之间"),
        (status = 404, description = "集合不存在"),
    )
)]
pub async fn duplicates_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CollectionId>,
    Query(query): Query<DuplicatesQuery>,
) -> Result<Json<Vec<DuplicatePair>>> {
    let threshold = query.threshold.unwrap_or(state.threshold);
    let pairs = block_in_place(|| state.service.find_duplicates(id, threshold))?;
    Ok(Json(pairs))
}

/// prometheus 指标
#[utoipa::path(get, path = "/metrics")]
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}
