use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::CollectionId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// 对外暴露的错误类型
///
/// 外层（CLI、HTTP）只应该依赖 [`Error::kind`] 的结果来决定如何响应，
/// 不应该匹配具体的底层错误
#[derive(Debug, Error)]
pub enum Error {
    /// 调用方可以修正的输入错误
    #[error("无效的输入: {0}")]
    Validation(String),

    /// 集合不存在
    #[error("集合不存在: {0}")]
    NotFound(CollectionId),

    /// 索引文件结构损坏、被截断或尚未构建
    #[error("索引文件损坏 ({path}): {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// 存储目录不可读写
    #[error("存储错误 ({path}): {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 索引句柄已经释放
    #[error("索引句柄已释放")]
    UseAfterUnload,

    /// 索引已经构建，不能再添加向量
    #[error("索引已构建，不能再添加向量")]
    AlreadyBuilt,

    /// 索引尚未构建
    #[error("索引尚未构建")]
    NotBuilt,

    /// 向量维度与索引配置不一致
    #[error("向量维度不匹配: 期望 {expected}，实际 {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// 向量索引库内部错误
    #[error("索引错误: {0}")]
    Index(String),

    /// 特征提取失败
    #[error("特征提取失败: {0}")]
    Embedding(String),

    /// 图片解码失败
    #[error("图片解码失败: {0}")]
    Image(#[from] image::ImageError),
}

/// 错误分类，不携带任何细节，供外层映射为响应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    CorruptIndex,
    Storage,
    UseAfterUnload,
    AlreadyBuilt,
    Configuration,
    Embedding,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Image(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::CorruptIndex { .. } => ErrorKind::CorruptIndex,
            Error::Storage { .. } => ErrorKind::Storage,
            Error::UseAfterUnload => ErrorKind::UseAfterUnload,
            Error::AlreadyBuilt => ErrorKind::AlreadyBuilt,
            Error::DimensionMismatch { .. } => ErrorKind::Configuration,
            Error::Embedding(_) => ErrorKind::Embedding,
            Error::NotBuilt | Error::Index(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Storage { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptIndex { path: path.into(), reason: reason.into() }
    }
}

