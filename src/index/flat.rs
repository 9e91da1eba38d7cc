use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use bytemuck::cast_slice;
use memmap2::Mmap;

use super::envelope::{self, HEADER_LEN, Header};
use super::{VectorIndex, inner_product};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"DPFX";

enum Vectors {
    Owned(Vec<f32>),
    /// 整个索引文件的映射，向量数据从 HEADER_LEN 开始
    Mapped(Mmap),
    Released,
}

/// 精确的暴力索引，所有向量连续存放
///
/// 数据区为小端序的 `f32 * count * dimensions`，文件头和校验和见 [`envelope`]。
pub struct FlatIndex {
    dimensions: usize,
    count: usize,
    quality: u32,
    vectors: Vectors,
}

impl FlatIndex {
    fn vectors(&self) -> Result<&[f32]> {
        match &self.vectors {
            Vectors::Owned(v) => Ok(v),
            Vectors::Mapped(mmap) => {
                let len = self.count * self.dimensions * size_of::<f32>();
                // mmap 起始地址按页对齐，HEADER_LEN 为 4 的倍数，所以这里不会出现未对齐
                Ok(cast_slice(&mmap[HEADER_LEN..HEADER_LEN + len]))
            }
            Vectors::Released => Err(Error::UseAfterUnload),
        }
    }

    fn vector(&self, id: usize) -> Result<&[f32]> {
        if id >= self.count {
            return Err(Error::Index(format!("向量 ID {} 越界，共 {} 个向量", id, self.count)));
        }
        let d = self.dimensions;
        Ok(&self.vectors()?[id * d..(id + 1) * d])
    }
}

impl VectorIndex for FlatIndex {
    fn create(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Validation("向量维度不能为 0".to_string()));
        }
        Ok(Self { dimensions, count: 0, quality: 0, vectors: Vectors::Owned(vec![]) })
    }

    fn load(path: &Path, dimensions: usize, mmap: bool) -> Result<Self> {
        let (header, map, payload) = envelope::open(path, MAGIC, dimensions)?;
        let data_len = header
            .count
            .checked_mul(dimensions)
            .and_then(|n| n.checked_mul(size_of::<f32>()))
            .ok_or_else(|| Error::corrupt(path, "向量数量无效"))?;
        if payload.len() != data_len {
            return Err(Error::corrupt(path, "文件长度与向量数量不一致"));
        }

        let vectors = if mmap && cfg!(target_endian = "little") {
            Vectors::Mapped(map)
        } else {
            let mut v = vec![0f32; header.count * dimensions];
            LittleEndian::read_f32_into(&map[payload], &mut v);
            Vectors::Owned(v)
        };

        Ok(Self { dimensions, count: header.count, quality: header.quality, vectors })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn add_item(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        if self.quality != 0 {
            return Err(Error::AlreadyBuilt);
        }
        if id != self.count {
            return Err(Error::Validation(format!("向量必须按顺序添加，期望 ID {}，实际 {}", self.count, id)));
        }
        match &mut self.vectors {
            Vectors::Owned(v) => v.extend_from_slice(vector),
            Vectors::Mapped(_) => return Err(Error::AlreadyBuilt),
            Vectors::Released => return Err(Error::UseAfterUnload),
        }
        self.count += 1;
        Ok(())
    }

    fn build(&mut self, quality: usize) -> Result<()> {
        if self.quality != 0 {
            return Err(Error::AlreadyBuilt);
        }
        // 暴力索引不需要额外结构，这里仅记录构建参数
        self.quality = quality.clamp(1, u32::MAX as usize) as u32;
        Ok(())
    }

    fn is_built(&self) -> bool {
        self.quality != 0
    }

    fn save(&self, path: &Path) -> Result<()> {
        let vectors = self.vectors()?;
        let mut body = vec![0u8; vectors.len() * size_of::<f32>()];
        LittleEndian::write_f32_into(vectors, &mut body);
        let header = Header { dimensions: self.dimensions, quality: self.quality, count: self.count };
        envelope::write(path, MAGIC, &header, &body)
    }

    fn item_count(&self) -> usize {
        match self.vectors {
            Vectors::Released => 0,
            _ => self.count,
        }
    }

    fn score(&self, a: usize, b: usize) -> Result<f32> {
        Ok(inner_product(self.vector(a)?, self.vector(b)?))
    }

    fn release(&mut self) {
        self.vectors = Vectors::Released;
    }
}
