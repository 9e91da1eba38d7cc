use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::error::{Error, Result};

const VERSION: u32 = 1;
/// magic(4) + version(4) + dimensions(4) + quality(4) + count(8) + payload(8) + reserved(32)
///
/// 取 64 字节，使 mmap 后的数据区按 64 字节对齐
pub const HEADER_LEN: usize = 64;
/// 文件末尾的 blake3 校验和
const CHECKSUM_LEN: usize = 32;

/// 索引文件头
///
/// 文件格式（小端序）：
///
/// ```text
/// | magic | version | dimensions | quality | count | payload_len | reserved | payload | blake3 |
/// ```
///
/// `quality` 为 0 表示索引尚未构建，校验和覆盖文件头和数据区。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub dimensions: usize,
    pub quality: u32,
    pub count: usize,
}

impl Header {
    fn encode(&self, magic: &[u8; 4], payload_len: usize) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(magic);
        LittleEndian::write_u32(&mut buf[4..8], VERSION);
        LittleEndian::write_u32(&mut buf[8..12], self.dimensions as u32);
        LittleEndian::write_u32(&mut buf[12..16], self.quality);
        LittleEndian::write_u64(&mut buf[16..24], self.count as u64);
        LittleEndian::write_u64(&mut buf[24..32], payload_len as u64);
        buf
    }
}

/// 写入文件头、数据区和校验和，并同步到磁盘
pub fn write(path: &Path, magic: &[u8; 4], header: &Header, payload: &[u8]) -> Result<()> {
    let storage = |e| Error::storage(path, e);

    let head = header.encode(magic, payload.len());
    let mut hasher = blake3::Hasher::new();
    hasher.update(&head);
    hasher.update(payload);

    let file = File::create(path).map_err(storage)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&head).map_err(storage)?;
    writer.write_all(payload).map_err(storage)?;
    writer.write_all(hasher.finalize().as_bytes()).map_err(storage)?;
    writer.flush().map_err(storage)?;
    writer.into_inner().map_err(|e| storage(e.into_error()))?.sync_all().map_err(storage)?;
    Ok(())
}

/// 映射并校验索引文件
///
/// 返回文件头、整个文件的映射，以及数据区在映射中的范围。
/// 截断、文件头无效、尚未构建或校验和不匹配都返回 [`Error::CorruptIndex`]，
/// 维度不一致返回 [`Error::DimensionMismatch`]。
pub fn open(path: &Path, magic: &[u8; 4], dimensions: usize) -> Result<(Header, Mmap, Range<usize>)> {
    let file = File::open(path).map_err(|e| Error::storage(path, e))?;
    let file_len = file.metadata().map_err(|e| Error::storage(path, e))?.len();
    // 空文件无法映射，必须先检查长度
    if file_len < (HEADER_LEN + CHECKSUM_LEN) as u64 {
        return Err(Error::corrupt(path, "文件被截断"));
    }

    let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::storage(path, e))?;
    if &map[0..4] != magic {
        return Err(Error::corrupt(path, "文件头无效"));
    }
    let version = LittleEndian::read_u32(&map[4..8]);
    if version != VERSION {
        return Err(Error::corrupt(path, format!("不支持的版本 {}", version)));
    }
    let file_dimensions = LittleEndian::read_u32(&map[8..12]) as usize;
    if file_dimensions != dimensions {
        return Err(Error::DimensionMismatch { expected: dimensions, got: file_dimensions });
    }
    let quality = LittleEndian::read_u32(&map[12..16]);
    if quality == 0 {
        return Err(Error::corrupt(path, "索引尚未构建"));
    }
    let count = usize::try_from(LittleEndian::read_u64(&map[16..24]))
        .map_err(|_| Error::corrupt(path, "向量数量无效"))?;
    let payload_len = usize::try_from(LittleEndian::read_u64(&map[24..32]))
        .map_err(|_| Error::corrupt(path, "数据区长度无效"))?;

    let expected_len = payload_len
        .checked_add(HEADER_LEN + CHECKSUM_LEN)
        .ok_or_else(|| Error::corrupt(path, "数据区长度无效"))?;
    if map.len() != expected_len {
        return Err(Error::corrupt(path, "文件长度与文件头不一致"));
    }
    let (body, checksum) = map.split_at(HEADER_LEN + payload_len);
    if blake3::hash(body).as_bytes() != checksum {
        return Err(Error::corrupt(path, "校验和不匹配"));
    }

    let header = Header { dimensions, quality, count };
    Ok((header, map, HEADER_LEN..HEADER_LEN + payload_len))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const MAGIC: &[u8; 4] = b"TEST";

    #[test]
    fn test_write_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a");
        let header = Header { dimensions: 3, quality: 7, count: 2 };
        write(&path, MAGIC, &header, b"payload").unwrap();

        let (h, map, range) = open(&path, MAGIC, 3).unwrap();
        assert_eq!(h, header);
        assert_eq!(&map[range], b"payload");
    }

    #[test]
    fn test_open_rejects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a");

        let unbuilt = Header { dimensions: 3, quality: 0, count: 0 };
        write(&path, MAGIC, &unbuilt, b"").unwrap();
        assert!(matches!(open(&path, MAGIC, 3), Err(Error::CorruptIndex { .. })));

        let header = Header { dimensions: 3, quality: 1, count: 0 };
        write(&path, MAGIC, &header, b"").unwrap();
        assert!(matches!(open(&path, b"XXXX", 3), Err(Error::CorruptIndex { .. })));
        assert!(matches!(open(&path, MAGIC, 4), Err(Error::DimensionMismatch { expected: 4, got: 3 })));
    }
}
