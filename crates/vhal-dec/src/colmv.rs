//! 共位运动矢量 (colmv) 缓冲池.
//!
//! 每个 DPB 槽位配一块 colmv 缓冲, 解码当前帧时写出本帧运动矢量,
//! 后续帧的时域直接预测从参考帧对应的 colmv 缓冲读取.
//! 池只整体重建: 所需大小变大或槽位数变化时全部释放后重新分配.

use log::debug;
use vhal_core::HalResult;

use crate::buffer::{BufferAllocator, BufferHandle, DeviceBuffer};

/// 单个 colmv 缓冲大小: `width * height / 2`, 场编码时加倍
pub const fn colmv_size(width: usize, height: usize, field_coding: bool) -> usize {
    let size = width * height / 2;
    if field_coding { size * 2 } else { size }
}

/// 共位运动矢量缓冲池
#[derive(Debug, Default)]
pub struct ColMvPool {
    buffers: Vec<DeviceBuffer>,
    buffer_size: usize,
    provisioned: bool,
}

impl ColMvPool {
    /// 创建空池
    pub fn new() -> Self {
        Self::default()
    }

    /// 确保池中有 `slot_count` 块至少 `buffer_size` 字节的缓冲, 返回是否重建
    ///
    /// 重建过程中任何一次分配失败, 已分配的缓冲全部释放, 池保持为空.
    pub fn ensure_capacity(
        &mut self,
        allocator: &mut dyn BufferAllocator,
        slot_count: usize,
        buffer_size: usize,
    ) -> HalResult<bool> {
        if self.provisioned && buffer_size <= self.buffer_size && slot_count == self.buffers.len()
        {
            return Ok(false);
        }

        self.release_all(allocator);
        let mut buffers = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            match allocator.alloc(buffer_size) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    for buffer in buffers {
                        allocator.release(buffer);
                    }
                    return Err(e);
                }
            }
        }
        debug!(
            "colmv 缓冲池重建: {} 个槽位, 每块 {} 字节",
            slot_count, buffer_size
        );
        self.buffers = buffers;
        self.buffer_size = buffer_size;
        self.provisioned = true;
        Ok(true)
    }

    /// 槽位对应的缓冲句柄, 越界时返回无效句柄
    pub fn get(&self, slot: usize) -> BufferHandle {
        self.buffers
            .get(slot)
            .map_or(BufferHandle::INVALID, DeviceBuffer::handle)
    }

    /// 当前每块缓冲大小
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 当前槽位数
    pub fn slot_count(&self) -> usize {
        self.buffers.len()
    }

    /// 释放全部缓冲
    pub fn release_all(&mut self, allocator: &mut dyn BufferAllocator) {
        for buffer in self.buffers.drain(..) {
            allocator.release(buffer);
        }
        self.buffer_size = 0;
        self.provisioned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAllocator;

    #[test]
    fn test_colmv_size_1080p() {
        assert_eq!(colmv_size(1920, 1080, false), 1_036_800);
        assert_eq!(colmv_size(1920, 1080, true), 2_073_600);
    }

    #[test]
    fn test_first_use_allocates_every_slot() {
        let mut alloc = SimAllocator::new();
        let mut pool = ColMvPool::new();
        assert!(!pool.get(0).is_valid());
        assert!(pool.ensure_capacity(&mut alloc, 4, 1024).unwrap());
        assert_eq!(pool.slot_count(), 4);
        assert_eq!(alloc.live_count(), 4);
        let handles: Vec<_> = (0..4).map(|s| pool.get(s)).collect();
        assert!(handles.iter().all(BufferHandle::is_valid));
        assert!(!pool.get(4).is_valid());
    }

    #[test]
    fn test_smaller_request_reuses_pool() {
        let mut alloc = SimAllocator::new();
        let mut pool = ColMvPool::new();
        pool.ensure_capacity(&mut alloc, 2, 4096).unwrap();
        assert!(!pool.ensure_capacity(&mut alloc, 2, 4096).unwrap());
        assert!(!pool.ensure_capacity(&mut alloc, 2, 100).unwrap());
        assert_eq!(alloc.alloc_count(), 2);
    }

    #[test]
    fn test_growth_rebuilds_whole_pool() {
        let mut alloc = SimAllocator::new();
        let mut pool = ColMvPool::new();
        pool.ensure_capacity(&mut alloc, 3, 4096).unwrap();
        assert!(pool.ensure_capacity(&mut alloc, 3, 8192).unwrap());
        assert_eq!(alloc.alloc_count(), 6);
        assert_eq!(alloc.live_count(), 3);
        assert_eq!(pool.buffer_size(), 8192);

        assert!(pool.ensure_capacity(&mut alloc, 5, 8192).unwrap());
        assert_eq!(alloc.live_count(), 5);
    }

    #[test]
    fn test_allocation_failure_leaves_pool_empty() {
        let mut alloc = SimAllocator::new();
        alloc.fail_after(2);
        let mut pool = ColMvPool::new();
        assert!(pool.ensure_capacity(&mut alloc, 4, 1024).is_err());
        assert_eq!(pool.slot_count(), 0);
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_empty_dpb_provisions_once() {
        let mut alloc = SimAllocator::new();
        let mut pool = ColMvPool::new();
        assert!(pool.ensure_capacity(&mut alloc, 0, 1024).unwrap());
        assert!(!pool.ensure_capacity(&mut alloc, 0, 1024).unwrap());
        assert!(!pool.ensure_capacity(&mut alloc, 0, 512).unwrap());
        assert_eq!(alloc.alloc_count(), 0);

        // 释放后重新计为首次使用
        pool.release_all(&mut alloc);
        assert!(pool.ensure_capacity(&mut alloc, 2, 1024).unwrap());
        assert_eq!(alloc.live_count(), 2);
    }
}
