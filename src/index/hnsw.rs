use std::path::Path;
use std::sync::OnceLock;

use log::debug;
use memmap2::Mmap;
use rayon::prelude::*;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::envelope::{self, Header};
use super::{VectorIndex, inner_product};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"DPFU";

/// usearch HNSW 索引，度量为内积
///
/// usearch 的连接数需要在创建时确定，而构建参数要等到所有向量添加完才知道，
/// 所以构建前的向量先缓存在内存中，`build` 时再一次性写入 HNSW。
///
/// 数据区为 usearch 自身的序列化结果，外层的文件头和校验和见 [`envelope`]，
/// 这样损坏的文件在交给 usearch 之前就会被发现。
pub struct USearchIndex {
    dimensions: usize,
    quality: u32,
    pending: Vec<f32>,
    index: Option<Index>,
    /// view 模式下 `index` 直接引用这段映射，字段顺序保证 `index` 先被释放
    map: Option<Mmap>,
    /// 两两比较时使用的向量副本，首次打分时从 usearch 中取出
    vectors: OnceLock<Vec<f32>>,
    released: bool,
}

fn options(dimensions: usize, connectivity: usize) -> IndexOptions {
    IndexOptions {
        dimensions,
        metric: MetricKind::IP,
        quantization: ScalarKind::F32,
        connectivity,
        // 此处为 usearch 默认参数
        expansion_add: 128,
        expansion_search: 64,
        ..Default::default()
    }
}

fn index_err(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}

impl USearchIndex {
    fn index(&self) -> Result<&Index> {
        if self.released {
            return Err(Error::UseAfterUnload);
        }
        self.index.as_ref().ok_or(Error::NotBuilt)
    }

    fn vectors(&self) -> Result<&[f32]> {
        if let Some(v) = self.vectors.get() {
            return Ok(v);
        }
        let index = self.index()?;
        let mut all = vec![0f32; index.size() * self.dimensions];
        for (key, v) in all.chunks_exact_mut(self.dimensions).enumerate() {
            let found = index.get(key as u64, v).map_err(index_err)?;
            if found == 0 {
                return Err(Error::Index(format!("向量 ID {} 不存在", key)));
            }
        }
        Ok(self.vectors.get_or_init(|| all))
    }

    fn vector(&self, id: usize) -> Result<&[f32]> {
        let d = self.dimensions;
        self.vectors()?
            .get(id * d..(id + 1) * d)
            .ok_or_else(|| Error::Index(format!("向量 ID {} 越界", id)))
    }
}

impl VectorIndex for USearchIndex {
    fn create(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Validation("向量维度不能为 0".to_string()));
        }
        Ok(Self {
            dimensions,
            quality: 0,
            pending: vec![],
            index: None,
            map: None,
            vectors: OnceLock::new(),
            released: false,
        })
    }

    fn load(path: &Path, dimensions: usize, mmap: bool) -> Result<Self> {
        let (header, map, payload) = envelope::open(path, MAGIC, dimensions)?;
        let index = Index::new(&options(dimensions, header.quality as usize)).map_err(index_err)?;

        let map = if mmap {
            // 映射随索引一起保存，直到 release 或 drop
            unsafe { index.view_from_buffer(&map[payload]) }
                .map_err(|e| Error::corrupt(path, e.to_string()))?;
            Some(map)
        } else {
            index.load_from_buffer(&map[payload]).map_err(|e| Error::corrupt(path, e.to_string()))?;
            None
        };

        if index.dimensions() != dimensions {
            return Err(Error::corrupt(path, format!("usearch 索引维度为 {}", index.dimensions())));
        }
        if index.size() != header.count {
            return Err(Error::corrupt(path, "向量数量与文件头不一致"));
        }
        debug!("usearch 索引已加载: {} 个向量", index.size());
        Ok(Self {
            dimensions,
            quality: header.quality,
            pending: vec![],
            index: Some(index),
            map,
            vectors: OnceLock::new(),
            released: false,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn add_item(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        if self.released {
            return Err(Error::UseAfterUnload);
        }
        if self.index.is_some() {
            return Err(Error::AlreadyBuilt);
        }
        let count = self.pending.len() / self.dimensions;
        if id != count {
            return Err(Error::Validation(format!("向量必须按顺序添加，期望 ID {}，实际 {}", count, id)));
        }
        self.pending.extend_from_slice(vector);
        Ok(())
    }

    fn build(&mut self, quality: usize) -> Result<()> {
        if self.released {
            return Err(Error::UseAfterUnload);
        }
        if self.index.is_some() {
            return Err(Error::AlreadyBuilt);
        }
        let index = Index::new(&options(self.dimensions, quality.max(2))).map_err(index_err)?;
        let count = self.pending.len() / self.dimensions;
        index.reserve(count).map_err(index_err)?;
        self.pending
            .par_chunks_exact(self.dimensions)
            .enumerate()
            .try_for_each(|(i, v)| index.add(i as u64, v).map_err(index_err))?;
        self.pending = vec![];
        self.index = Some(index);
        self.quality = quality.clamp(1, u32::MAX as usize) as u32;
        Ok(())
    }

    fn is_built(&self) -> bool {
        self.index.is_some()
    }

    fn save(&self, path: &Path) -> Result<()> {
        let index = self.index()?;
        let mut buf = vec![0u8; index.serialized_length()];
        index.save_to_buffer(&mut buf).map_err(index_err)?;
        let header = Header { dimensions: self.dimensions, quality: self.quality, count: index.size() };
        envelope::write(path, MAGIC, &header, &buf)
    }

    fn item_count(&self) -> usize {
        if self.released {
            return 0;
        }
        match &self.index {
            Some(index) => index.size(),
            None => self.pending.len() / self.dimensions,
        }
    }

    fn score(&self, a: usize, b: usize) -> Result<f32> {
        Ok(inner_product(self.vector(a)?, self.vector(b)?))
    }

    fn release(&mut self) {
        // 先释放索引，再解除映射
        self.index = None;
        self.map = None;
        self.vectors = OnceLock::new();
        self.pending = vec![];
        self.released = true;
    }
}
