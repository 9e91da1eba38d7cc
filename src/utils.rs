use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;
use regex::Regex;
use walkdir::WalkDir;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .expect("invalid progress bar template")
}

/// 展开路径列表：文件原样保留，目录按文件名排序递归扫描后缀匹配的文件
pub fn expand_paths(paths: &[PathBuf], re_suf: &Regex) -> Vec<PathBuf> {
    let mut result = vec![];
    for path in paths {
        if path.is_dir() {
            let entries = WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| has_suffix(path, re_suf));
            result.extend(entries);
        } else {
            result.push(path.clone());
        }
    }
    result
}

fn has_suffix(path: &Path, re_suf: &Regex) -> bool {
    path.extension().map(|ext| re_suf.is_match(&ext.to_string_lossy())).unwrap_or(false)
}

/// 将逗号分隔的后缀列表转换为正则表达式
pub fn suffix_regex(suffix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?i)({})$", suffix.replace(',', "|")))
}
