// 上传分片划分
//
// 分片规则：
// - 分片大小固定（默认 5MB），最后一个分片可以较短
// - 分片号从 1 开始连续编号，无空洞
// - 所有分片的字节范围恰好覆盖 [0, 文件大小)

use std::ops::Range;
use tracing::debug;

/// 默认上传分片大小: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// 分片描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 分片号（从 1 开始）
    pub part_number: u32,
    /// 字节范围 [start, end)
    pub range: Range<u64>,
}

impl ChunkDescriptor {
    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// 单个文件的分片计划
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    chunks: Vec<ChunkDescriptor>,
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// 按固定分片大小划分文件
    ///
    /// # 参数
    /// * `total_size` - 文件总大小
    /// * `chunk_size` - 分片大小（为 0 时按 1 处理）
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::with_capacity(total_size.div_ceil(chunk_size) as usize);
        let mut offset = 0u64;
        let mut part_number = 1u32;

        while offset < total_size {
            let end = (offset + chunk_size).min(total_size);
            chunks.push(ChunkDescriptor {
                part_number,
                range: offset..end,
            });
            offset = end;
            part_number += 1;
        }

        debug!(
            "分片计划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            total_size,
            chunk_size,
            chunks.len()
        );

        Self {
            chunks,
            total_size,
            chunk_size,
        }
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}
