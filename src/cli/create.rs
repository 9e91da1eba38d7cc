use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use image::RgbImage;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use rayon::prelude::*;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, ServiceOptions};
use crate::upload::{UploadPolicy, decode_image, guess_content_type};
use crate::utils::{expand_paths, pb_style, suffix_regex};

#[derive(Parser, Debug, Clone)]
pub struct CreateCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    /// 图片文件或所在目录，目录会被递归扫描
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// 扫描目录时的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
}

impl SubCommandExtend for CreateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let service = self.service.open(opts)?;
        let re_suf = suffix_regex(&self.suffix)?;
        let files = expand_paths(&self.paths, &re_suf);
        info!("共 {} 个文件", files.len());

        let policy = UploadPolicy::default();
        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let images = block_in_place(|| {
            files
                .par_iter()
                .progress_with(pb.clone())
                .map(|path| read_image(path, &policy))
                .collect::<Vec<_>>()
        });
        pb.finish_and_clear();

        let report = block_in_place(|| service.ingest(images))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

/// 读取并解码一张图片，任何一步失败都只打印警告并返回 None
fn read_image(path: &Path, policy: &UploadPolicy) -> Option<RgbImage> {
    let name = path.display().to_string();
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("读取文件失败 {}: {}", name, e);
            return None;
        }
    };
    if !policy.check(&name, guess_content_type(path), data.len()) {
        return None;
    }
    match decode_image(&data) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("解码图片失败 {}: {}", name, e);
            None
        }
    }
}
