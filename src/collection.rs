use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::builder::{BuildPolicy, build_index};
use crate::embed::{Embedder, normalize};
use crate::error::{Error, Result};
use crate::matcher::{DuplicatePair, check_threshold, find_pairs};
use crate::metrics;
use crate::store::{CollectionId, IndexStore};

/// 一个集合至少需要的图片数量
pub const MIN_ITEMS: usize = 2;

/// 默认的重复判定阈值
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// 上传结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestReport {
    /// 集合 ID
    #[schema(value_type = String)]
    pub collection_id: CollectionId,
    /// 与上传顺序一一对应，成功的图片为其 ID，被跳过的图片为 null
    pub image_ids: Vec<Option<usize>>,
}

/// 集合服务：创建集合、查找重复图片
pub struct CollectionService {
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    policy: BuildPolicy,
}

impl CollectionService {
    /// 特征提取器和索引的维度必须一致
    pub fn new(embedder: Arc<dyn Embedder>, store: IndexStore) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: store.dimensions(),
                got: embedder.dimensions(),
            });
        }
        Ok(Self { embedder, store, policy: BuildPolicy::default() })
    }

    pub fn with_policy(mut self, policy: BuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// 并行提取所有图片的特征，保持输入顺序
    pub fn embed_all(&self, images: &[RgbImage]) -> Result<Vec<Vec<f32>>> {
        images
            .par_iter()
            .map(|image| {
                let v = self.embedder.embed(image)?;
                if v.len() != self.embedder.dimensions() {
                    return Err(Error::DimensionMismatch {
                        expected: self.embedder.dimensions(),
                        got: v.len(),
                    });
                }
                Ok(v)
            })
            .collect()
    }

    /// 使用一组图片创建集合，返回集合 ID
    pub fn create_collection(&self, images: &[RgbImage]) -> Result<CollectionId> {
        check_size(images.len())?;
        let vectors = self.embed_all(images)?;
        self.create_from_vectors(&vectors)
    }

    /// 使用一组特征向量创建集合，向量会先做 L2 归一化
    pub fn create_from_vectors<V: AsRef<[f32]>>(&self, vectors: &[V]) -> Result<CollectionId> {
        check_size(vectors.len())?;

        let start = Instant::now();
        let vectors = vectors
            .iter()
            .map(|v| {
                let mut v = v.as_ref().to_vec();
                normalize(&mut v);
                v
            })
            .collect::<Vec<_>>();

        let mut handle = self.store.create_index()?;
        build_index(&mut handle, &vectors, &self.policy)?;
        let id = self.store.save_index(&mut handle, true)?;

        metrics::inc_collection_count(vectors.len());
        info!(
            "集合创建完成: {} ({} 张图片, {:.2}ms)",
            id,
            vectors.len(),
            start.elapsed().as_secs_f32() * 1000.
        );
        Ok(id)
    }

    /// 使用部分可能缺失的图片创建集合，缺失的图片不占用 ID
    ///
    /// 返回的 `image_ids` 与输入一一对应。
    pub fn ingest(&self, images: Vec<Option<RgbImage>>) -> Result<IngestReport> {
        let mut image_ids = Vec::with_capacity(images.len());
        let mut valid = vec![];
        for image in images {
            match image {
                Some(image) => {
                    image_ids.push(Some(valid.len()));
                    valid.push(image);
                }
                None => image_ids.push(None),
            }
        }

        let skipped = image_ids.len() - valid.len();
        if skipped > 0 {
            metrics::inc_skipped_image_count(skipped);
        }

        let collection_id = self.create_collection(&valid)?;
        Ok(IngestReport { collection_id, image_ids })
    }

    /// 查找集合中相似度不低于 `threshold` 的图片对
    pub fn find_duplicates(&self, id: CollectionId, threshold: f32) -> Result<Vec<DuplicatePair>> {
        check_threshold(threshold)?;

        let start = Instant::now();
        let mut handle = self.store.load_index(id)?;
        let result = find_pairs(&handle, threshold);
        self.store.unload(&mut handle);
        let pairs = result?;

        let elapsed = start.elapsed().as_secs_f32();
        metrics::observe_query_duration(elapsed);
        info!("集合 {} 查询完成: {} 对重复 (阈值 {}, {:.2}ms)", id, pairs.len(), threshold, elapsed * 1000.);
        Ok(pairs)
    }
}

fn check_size(n: usize) -> Result<()> {
    if n < MIN_ITEMS {
        return Err(Error::Validation(format!("至少需要 {} 张有效图片，实际 {} 张", MIN_ITEMS, n)));
    }
    Ok(())
}
