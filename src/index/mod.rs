mod envelope;
mod flat;
mod hnsw;

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
pub use flat::FlatIndex;
pub use hnsw::USearchIndex;

use crate::error::{Error, Result};

/// 以内积为度量的向量索引
///
/// 向量必须按 0, 1, 2... 的顺序依次添加，添加时的位置即为该向量的 ID。
/// 索引只能构建一次，构建后不能再添加向量。
pub trait VectorIndex: Send + Sync {
    /// 创建一个指定维度的空索引
    fn create(dimensions: usize) -> Result<Self>
    where
        Self: Sized;

    /// 从指定路径加载已构建的索引
    ///
    /// * `mmap` - 是否使用 mmap 模式加载
    fn load(path: &Path, dimensions: usize, mmap: bool) -> Result<Self>
    where
        Self: Sized;

    /// 向量维度
    fn dimensions(&self) -> usize;

    /// 添加一个向量，`id` 必须等于当前的向量数量
    fn add_item(&mut self, id: usize, vector: &[f32]) -> Result<()>;

    /// 构建索引，`quality` 越大，构建越慢，搜索越准确
    fn build(&mut self, quality: usize) -> Result<()>;

    fn is_built(&self) -> bool;

    /// 将已构建的索引写入指定路径
    fn save(&self, path: &Path) -> Result<()>;

    /// 向量数量
    fn item_count(&self) -> usize;

    /// 两个向量之间的原始相似度，即内积
    fn score(&self, a: usize, b: usize) -> Result<f32>;

    /// 释放索引占用的内存或 mmap，重复调用无副作用
    fn release(&mut self);
}

/// 索引实现
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// 精确的暴力索引
    Flat,
    /// usearch HNSW 近似索引
    Usearch,
}

impl IndexBackend {
    /// 索引文件的后缀名
    pub fn extension(&self) -> &'static str {
        match self {
            IndexBackend::Flat => "flat",
            IndexBackend::Usearch => "usearch",
        }
    }

    pub fn create(&self, dimensions: usize) -> Result<Box<dyn VectorIndex>> {
        Ok(match self {
            IndexBackend::Flat => Box::new(FlatIndex::create(dimensions)?),
            IndexBackend::Usearch => Box::new(USearchIndex::create(dimensions)?),
        })
    }

    pub fn load(&self, path: &Path, dimensions: usize, mmap: bool) -> Result<Box<dyn VectorIndex>> {
        Ok(match self {
            IndexBackend::Flat => Box::new(FlatIndex::load(path, dimensions, mmap)?),
            IndexBackend::Usearch => Box::new(USearchIndex::load(path, dimensions, mmap)?),
        })
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// 索引句柄，独占一个索引，释放后任何操作都会返回 [`Error::UseAfterUnload`]
///
/// 句柄在 drop 时会自动释放索引。
pub struct IndexHandle {
    inner: Option<Box<dyn VectorIndex>>,
}

impl IndexHandle {
    pub fn new(index: Box<dyn VectorIndex>) -> Self {
        Self { inner: Some(index) }
    }

    fn get(&self) -> Result<&dyn VectorIndex> {
        self.inner.as_deref().ok_or(Error::UseAfterUnload)
    }

    fn get_mut(&mut self) -> Result<&mut (dyn VectorIndex + 'static)> {
        self.inner.as_deref_mut().ok_or(Error::UseAfterUnload)
    }

    pub fn dimensions(&self) -> Result<usize> {
        Ok(self.get()?.dimensions())
    }

    pub fn add_item(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        let index = self.get_mut()?;
        if index.is_built() {
            return Err(Error::AlreadyBuilt);
        }
        if vector.len() != index.dimensions() {
            return Err(Error::DimensionMismatch { expected: index.dimensions(), got: vector.len() });
        }
        index.add_item(id, vector)
    }

    pub fn build(&mut self, quality: usize) -> Result<()> {
        let index = self.get_mut()?;
        if index.is_built() {
            return Err(Error::AlreadyBuilt);
        }
        index.build(quality)
    }

    pub fn is_built(&self) -> Result<bool> {
        Ok(self.get()?.is_built())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let index = self.get()?;
        if !index.is_built() {
            return Err(Error::NotBuilt);
        }
        index.save(path)
    }

    pub fn item_count(&self) -> Result<usize> {
        Ok(self.get()?.item_count())
    }

    pub fn score(&self, a: usize, b: usize) -> Result<f32> {
        self.get()?.score(a, b)
    }

    /// 当前句柄是否仍然持有索引
    pub fn is_loaded(&self) -> bool {
        self.inner.is_some()
    }

    /// 释放索引，可以重复调用
    pub fn unload(&mut self) {
        if let Some(mut index) = self.inner.take() {
            index.release();
        }
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        self.unload();
    }
}

/// 计算两个等长向量的内积
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
