//! 设备缓冲区与帧槽位服务.
//!
//! HAL 不直接管理 DMA 内存与文件描述符生命周期, 而是通过两个外部协作者:
//! - [`BufferAllocator`]: 分配/释放设备可见缓冲区 (scratch, RCB, colmv)
//! - [`FrameSlots`]: 解码器持有的帧缓冲池, 按 DPB 槽位索引查询输出/参考帧
//!
//! 寄存器中的地址字段一律写入缓冲区句柄 (类似文件描述符的令牌), 从不写入裸指针.

use serde::{Deserialize, Serialize};
use vhal_core::align::{align_256_odd, align_up};
use vhal_core::{FrameFormat, HalError, HalResult};

/// 设备缓冲区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferHandle(pub i32);

impl BufferHandle {
    /// 无效句柄
    pub const INVALID: Self = Self(-1);

    /// 是否为有效句柄
    pub const fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// 写入地址寄存器的值, 无效句柄写 0
    pub const fn reg_value(&self) -> u32 {
        if self.0 >= 0 { self.0 as u32 } else { 0 }
    }
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// 设备可见缓冲区
///
/// `data` 为 CPU 侧映射, 写入后需调用 [`BufferAllocator::sync_for_device`].
#[derive(Debug)]
pub struct DeviceBuffer {
    handle: BufferHandle,
    data: Vec<u8>,
}

impl DeviceBuffer {
    /// 创建指定大小的缓冲区映射 (由分配器调用)
    pub fn new(handle: BufferHandle, size: usize) -> Self {
        Self {
            handle,
            data: vec![0; size],
        }
    }

    /// 缓冲区句柄
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// 缓冲区大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// CPU 侧只读映射
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// CPU 侧可写映射
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 在 `offset` 处写入数据
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> HalResult<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                HalError::InvalidArgument(format!(
                    "缓冲区写入越界: offset={}, len={}, size={}",
                    offset,
                    bytes.len(),
                    self.data.len()
                ))
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// 设备缓冲区分配器
pub trait BufferAllocator: Send {
    /// 分配 `size` 字节的设备可见缓冲区
    fn alloc(&mut self, size: usize) -> HalResult<DeviceBuffer>;

    /// 释放缓冲区
    fn release(&mut self, buffer: DeviceBuffer);

    /// 把 CPU 写入同步给设备
    ///
    /// 默认实现为空操作, 适用于一致性内存.
    fn sync_for_device(&mut self, _buffer: &DeviceBuffer) -> HalResult<()> {
        Ok(())
    }
}

/// 输出帧水平步长对齐策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrideAlign {
    /// 16 字节对齐
    #[default]
    Align16,
    /// 256 字节奇数倍对齐 (大分辨率)
    Align256Odd,
}

impl StrideAlign {
    /// 对一行字节数应用对齐
    pub const fn apply(&self, row_bytes: usize) -> usize {
        match self {
            Self::Align16 => align_up(row_bytes, 16),
            Self::Align256Odd => align_256_odd(row_bytes),
        }
    }
}

/// 帧缓冲信息 (由帧槽位服务提供)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBufferInfo {
    /// 缓冲区句柄
    pub handle: BufferHandle,
    /// 图像宽度 (像素)
    pub width: u32,
    /// 图像高度 (像素)
    pub height: u32,
    /// 水平步长 (字节)
    pub hor_stride: u32,
    /// 垂直步长 (行)
    pub ver_stride: u32,
    /// 像素格式
    pub format: FrameFormat,
    /// 是否为 FBC 压缩帧
    pub fbc: bool,
    /// 该帧解码时是否出错
    pub has_error: bool,
}

/// 帧槽位服务
///
/// 由解码器核心实现, HAL 通过它把 DPB 槽位索引换算成缓冲区句柄和几何信息.
/// 对齐策略可被 `control` 命令在运行时切换, 因此 setter 使用 `&self` (内部可变).
pub trait FrameSlots: Send + Sync {
    /// 查询槽位对应的帧缓冲, 槽位无效时返回 `None`
    fn frame(&self, slot: usize) -> Option<FrameBufferInfo>;

    /// 槽位总数 (DPB 大小)
    fn slot_count(&self) -> usize;

    /// 切换水平步长对齐策略
    fn set_stride_align(&self, align: StrideAlign);
}
