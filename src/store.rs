use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::{IndexBackend, IndexHandle};

/// 集合 ID，128 位随机值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// 生成一个新的随机 ID
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for CollectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for CollectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 索引文件存储，每个集合对应目录下的一个文件
pub struct IndexStore {
    dir: PathBuf,
    dimensions: usize,
    backend: IndexBackend,
    mmap: bool,
}

impl IndexStore {
    /// 打开存储目录，不存在则创建
    ///
    /// # Arguments
    ///
    /// * `dir` - 索引文件所在目录
    /// * `dimensions` - 向量维度，必须和特征提取器一致
    /// * `backend` - 索引实现
    pub fn open(dir: impl Into<PathBuf>, dimensions: usize, backend: IndexBackend) -> Result<Self> {
        let dir = dir.into();
        if dir.exists() && !dir.is_dir() {
            let e = io::Error::new(io::ErrorKind::InvalidInput, "不是目录");
            return Err(Error::storage(dir, e));
        }
        fs::create_dir_all(&dir).map_err(|e| Error::storage(&dir, e))?;
        info!("索引目录: {} ({}, {} 维)", dir.display(), backend, dimensions);
        Ok(Self { dir, dimensions, backend, mmap: true })
    }

    /// 是否使用 mmap 模式加载索引，默认开启
    pub fn mmap(mut self, mmap: bool) -> Self {
        self.mmap = mmap;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn backend(&self) -> IndexBackend {
        self.backend
    }

    /// 返回集合对应的索引文件路径
    pub fn path_of(&self, id: CollectionId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, self.backend.extension()))
    }

    /// 创建一个空索引
    pub fn create_index(&self) -> Result<IndexHandle> {
        Ok(IndexHandle::new(self.backend.create(self.dimensions)?))
    }

    /// 保存已构建的索引，返回新分配的集合 ID
    ///
    /// # Arguments
    ///
    /// * `handle` - 已构建的索引
    /// * `unload` - 保存成功后是否释放索引
    pub fn save_index(&self, handle: &mut IndexHandle, unload: bool) -> Result<CollectionId> {
        self.save_index_with(handle, unload, CollectionId::random)
    }

    /// 同 [`IndexStore::save_index`]，但使用指定的 ID 生成器
    ///
    /// 目标文件已存在时会重新生成 ID，直到找到一个未被占用的 ID。
    pub fn save_index_with(
        &self,
        handle: &mut IndexHandle,
        unload: bool,
        mut next_id: impl FnMut() -> CollectionId,
    ) -> Result<CollectionId> {
        // 先写入临时文件，再通过硬链接发布，这样读者不会看到写了一半的文件，
        // 而且硬链接在目标存在时会失败，不会覆盖其他集合
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = handle.save(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(match e {
                Error::Index(msg) => Error::storage(&tmp, io::Error::other(msg)),
                e => e,
            });
        }

        let id = loop {
            let id = next_id();
            let target = self.path_of(id);
            if target.exists() {
                warn!("集合 ID 冲突，重新生成: {}", id);
                continue;
            }
            match publish(&tmp, &target) {
                Ok(()) => break id,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("集合 ID 冲突，重新生成: {}", id);
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp);
                    return Err(Error::storage(target, e));
                }
            }
        };

        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("删除临时文件失败 {}: {}", tmp.display(), e);
            }
        }

        if unload {
            handle.unload();
        }

        info!("集合已保存: {} -> {}", id, self.path_of(id).display());
        Ok(id)
    }

    /// 加载集合对应的索引
    pub fn load_index(&self, id: CollectionId) -> Result<IndexHandle> {
        let path = self.path_of(id);
        if !path.is_file() {
            return Err(Error::NotFound(id));
        }
        let index = match self.backend.load(&path, self.dimensions, self.mmap) {
            Ok(index) => index,
            Err(Error::Storage { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(id));
            }
            Err(e) => return Err(e),
        };
        debug!("集合已加载: {} ({} 个向量)", id, index.item_count());
        Ok(IndexHandle::new(index))
    }

    /// 释放索引句柄，可以重复调用
    pub fn unload(&self, handle: &mut IndexHandle) {
        handle.unload();
    }
}

/// 将临时文件发布到目标路径，目标已存在时返回 `AlreadyExists`
fn publish(tmp: &Path, target: &Path) -> io::Result<()> {
    publish_with(tmp, target, |src, dst| fs::hard_link(src, dst))
}

/// 以 `link` 原子地发布文件，目标已存在时返回 `AlreadyExists`
///
/// 文件系统不支持或不允许硬链接时退化为 rename，此时检查与 rename 之间存在竞争。
fn publish_with(tmp: &Path, target: &Path, link: impl Fn(&Path, &Path) -> io::Result<()>) -> io::Result<()> {
    match link(tmp, target) {
        Err(e) if matches!(e.kind(), io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied) => {
            debug!("无法创建硬链接（{}），改用 rename", e);
            if target.exists() {
                return Err(io::Error::from(io::ErrorKind::AlreadyExists));
            }
            fs::rename(tmp, target)
        }
        r => r,
    }
}
