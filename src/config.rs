use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::builder::BuildPolicy;
use crate::cli::*;
use crate::collection::{CollectionService, DEFAULT_THRESHOLD};
use crate::embed::{ColorHistogramEmbedder, Embedder, EmbedderKind, ThumbnailEmbedder};
use crate::index::IndexBackend;
use crate::store::IndexStore;

static DATA_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "dupfind", "dupfind")
        .map(|dirs| dirs.data_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("data/index"))
        .to_string_lossy()
        .into_owned()
});

fn default_data_dir() -> &'static str {
    DATA_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct ServiceOptions {
    /// 索引实现
    #[arg(long, value_enum, default_value_t = IndexBackend::Flat)]
    pub backend: IndexBackend,
    /// 特征提取器
    #[arg(long, value_enum, default_value_t = EmbedderKind::Thumbnail)]
    pub embedder: EmbedderKind,
    /// 缩略图特征的边长，特征维度为其平方，最大 256
    #[arg(long, value_name = "SIZE", default_value_t = 16)]
    pub thumbnail_size: u32,
    /// 颜色直方图每个通道的桶数，特征维度为其立方
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub histogram_bins: u32,
    /// 不使用 mmap 模式加载索引，而是一次性全部加载到内存
    #[arg(long)]
    pub no_mmap: bool,
    /// 索引构建参数的下限
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub min_quality: usize,
    /// 索引构建参数的上限
    #[arg(long, value_name = "N", default_value_t = 25)]
    pub max_quality: usize,
    /// 每多少张图片构建参数加 1
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub items_per_quality: usize,
}

impl ServiceOptions {
    pub fn build_policy(&self) -> BuildPolicy {
        BuildPolicy {
            min_quality: self.min_quality,
            max_quality: self.max_quality,
            items_per_quality: self.items_per_quality,
        }
    }

    pub fn embedder(&self) -> crate::Result<Arc<dyn Embedder>> {
        Ok(match self.embedder {
            EmbedderKind::Thumbnail => Arc::new(ThumbnailEmbedder::new(self.thumbnail_size)?),
            EmbedderKind::Histogram => Arc::new(ColorHistogramEmbedder::new(self.histogram_bins)?),
        })
    }

    /// 根据配置创建集合服务
    pub fn open(&self, opts: &Opts) -> crate::Result<CollectionService> {
        let embedder = self.embedder()?;
        let store =
            IndexStore::open(&opts.data_dir, embedder.dimensions(), self.backend)?.mmap(!self.no_mmap);
        Ok(CollectionService::new(embedder, store)?.with_policy(self.build_policy()))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DuplicateOptions {
    /// 相似度阈值，范围从 0 到 1
    #[arg(short, long, value_name = "THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "dupfind", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 索引文件目录
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 使用一组图片创建集合
    Create(CreateCommand),
    /// 查找集合中的重复图片
    Duplicates(DuplicatesCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}
