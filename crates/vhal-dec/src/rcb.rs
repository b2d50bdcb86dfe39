//! RCB (行/列重建缓存) 缓冲区尺寸计算与惰性重分配.
//!
//! 加速器的若干流水级需要按行或按列缓存中间数据, 每一类缓存的大小由当前
//! 图像几何与格式决定. 各类大小先以位计算, 再换算为字节并按 [`RCB_ALIGN`] 对齐,
//! 所有类依次排布在同一块设备缓冲区中.
//!
//! 只有当 `(位深, chroma_format_idc, 场编码, 对齐宽度, 对齐高度)` 变化时才重新分配.

use log::debug;
use vhal_core::{HalResult, align_up};

use crate::buffer::{BufferAllocator, BufferHandle, DeviceBuffer};
use crate::device::RcbInfoEntry;

/// RCB 每类缓冲的字节对齐
pub const RCB_ALIGN: usize = 64;

/// RCB 缓冲类数
pub const RCB_CLASS_COUNT: usize = 9;

/// RCB 缓冲类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RcbClass {
    /// 熵解码行缓存
    StrmdRow,
    /// 反变换行缓存
    TransdRow,
    /// 反变换列缓存
    TransdCol,
    /// 帧间预测行缓存
    InterRow,
    /// 帧间预测列缓存
    InterCol,
    /// 帧内预测行缓存
    IntraRow,
    /// 去块滤波行缓存
    DblkRow,
    /// SAO 行缓存
    SaoRow,
    /// FBC 行缓存
    FbcRow,
}

impl RcbClass {
    /// 全部缓冲类 (寄存器排布顺序)
    pub const ALL: [Self; RCB_CLASS_COUNT] = [
        Self::StrmdRow,
        Self::TransdRow,
        Self::TransdCol,
        Self::InterRow,
        Self::InterCol,
        Self::IntraRow,
        Self::DblkRow,
        Self::SaoRow,
        Self::FbcRow,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::StrmdRow => "strmd_row",
            Self::TransdRow => "transd_row",
            Self::TransdCol => "transd_col",
            Self::InterRow => "inter_row",
            Self::InterCol => "inter_col",
            Self::IntraRow => "intra_row",
            Self::DblkRow => "dblk_row",
            Self::SaoRow => "sao_row",
            Self::FbcRow => "fbc_row",
        }
    }
}

/// RCB 尺寸计算输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcbInput {
    /// 图像宽度 (像素, 未对齐)
    pub width: usize,
    /// 图像高度 (像素, 未对齐)
    pub height: usize,
    /// 亮度位深
    pub bit_depth: u32,
    pub chroma_format_idc: u32,
    /// 是否场编码
    pub field_coding: bool,
    /// 是否输出 FBC 帧
    pub fbc: bool,
}

impl RcbInput {
    /// 决定是否需要重分配的几何键
    pub fn geometry(&self) -> RcbGeometry {
        RcbGeometry {
            bit_depth: self.bit_depth,
            chroma_format_idc: self.chroma_format_idc,
            field_coding: self.field_coding,
            width: align_up(self.width, 16),
            height: align_up(self.height, 16),
        }
    }
}

/// RCB 几何键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RcbGeometry {
    pub bit_depth: u32,
    pub chroma_format_idc: u32,
    pub field_coding: bool,
    /// 16 对齐宽度
    pub width: usize,
    /// 16 对齐高度
    pub height: usize,
}

/// 单类 RCB 的排布信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcbInfo {
    pub class: RcbClass,
    /// 地址寄存器索引
    pub reg: usize,
    /// 在 RCB 缓冲区内的字节偏移
    pub offset: usize,
    /// 字节大小 (已对齐)
    pub size: usize,
}

/// 位数换算为对齐后的字节数
const fn rcb_bytes(bits: usize) -> usize {
    align_up(bits.div_ceil(8), RCB_ALIGN)
}

/// RCB 尺寸计算器
pub struct RcbSizer;

impl RcbSizer {
    /// 计算单类缓冲所需位数
    pub fn class_bits(class: RcbClass, input: &RcbInput) -> usize {
        let geo = input.geometry();
        let (w, h) = (geo.width, geo.height);
        let depth = geo.bit_depth as usize;
        match class {
            RcbClass::StrmdRow => {
                if w > 4096 {
                    w.div_ceil(16) * 154 * if geo.field_coding { 2 } else { 1 }
                } else {
                    0
                }
            }
            RcbClass::TransdRow => {
                if w > 8192 {
                    (w - 8192).div_ceil(4) * 2
                } else {
                    0
                }
            }
            RcbClass::TransdCol => {
                if h > 8192 {
                    (h - 8192).div_ceil(4) * 2
                } else {
                    0
                }
            }
            RcbClass::InterRow => w * 42,
            RcbClass::InterCol => 0,
            RcbClass::IntraRow => w * 44,
            RcbClass::DblkRow => {
                let per_depth = if geo.field_coding { 12 } else { 6 };
                w * (2 + per_depth * depth)
            }
            RcbClass::SaoRow => 0,
            RcbClass::FbcRow => {
                if input.fbc && geo.chroma_format_idc > 1 {
                    2 * w * depth
                } else {
                    0
                }
            }
        }
    }

    /// 填充每类的大小与偏移, 返回缓冲区总大小
    pub fn compute(info: &mut [RcbInfo], input: &RcbInput) -> usize {
        let mut offset = 0;
        for entry in info.iter_mut() {
            entry.offset = offset;
            entry.size = rcb_bytes(Self::class_bits(entry.class, input));
            offset += entry.size;
        }
        offset
    }

    /// 几何键是否变化 (首次使用视为变化)
    pub fn needs_realloc(prev: Option<&RcbGeometry>, cur: &RcbGeometry) -> bool {
        prev != Some(cur)
    }

    /// 设备协议要求的 RCB 信息表: 按大小降序, 遇到第一个零大小项截止
    pub fn device_entries(info: &[RcbInfo]) -> Vec<RcbInfoEntry> {
        let mut sorted: Vec<&RcbInfo> = info.iter().collect();
        sorted.sort_by(|a, b| b.size.cmp(&a.size));
        sorted
            .into_iter()
            .take_while(|e| e.size > 0)
            .map(|e| RcbInfoEntry {
                reg: e.reg as u32,
                size: e.size as u32,
            })
            .collect()
    }
}

/// RCB 缓冲区缓存
///
/// 持有当前 RCB 缓冲区与其几何键, 几何不变时跨帧复用.
#[derive(Debug)]
pub struct RcbBufferCache {
    info: [RcbInfo; RCB_CLASS_COUNT],
    key: Option<RcbGeometry>,
    buffer: Option<DeviceBuffer>,
}

impl RcbBufferCache {
    /// 以各类地址寄存器索引构造 (顺序同 [`RcbClass::ALL`])
    pub fn new(regs: [usize; RCB_CLASS_COUNT]) -> Self {
        let info = std::array::from_fn(|i| RcbInfo {
            class: RcbClass::ALL[i],
            reg: regs[i],
            offset: 0,
            size: 0,
        });
        Self {
            info,
            key: None,
            buffer: None,
        }
    }

    /// 标记失效, 下次 `ensure` 强制重新计算与分配
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// 按需 (重新) 分配, 返回本次是否发生了分配
    pub fn ensure(
        &mut self,
        allocator: &mut dyn BufferAllocator,
        input: &RcbInput,
    ) -> HalResult<bool> {
        let geometry = input.geometry();
        if self.buffer.is_some() && !RcbSizer::needs_realloc(self.key.as_ref(), &geometry) {
            return Ok(false);
        }

        self.release(allocator);
        let total = RcbSizer::compute(&mut self.info, input);
        let buffer = allocator.alloc(total)?;
        debug!(
            "RCB 重新分配: {}x{} depth={} chroma={} field={} fbc={} -> {} 字节",
            geometry.width,
            geometry.height,
            geometry.bit_depth,
            geometry.chroma_format_idc,
            geometry.field_coding,
            input.fbc,
            total
        );
        self.buffer = Some(buffer);
        self.key = Some(geometry);
        Ok(true)
    }

    /// 各类排布信息
    pub fn info(&self) -> &[RcbInfo] {
        &self.info
    }

    /// RCB 缓冲区句柄, 尚未分配时为无效句柄
    pub fn handle(&self) -> BufferHandle {
        self.buffer
            .as_ref()
            .map_or(BufferHandle::INVALID, DeviceBuffer::handle)
    }

    /// 当前缓冲区大小
    pub fn size(&self) -> usize {
        self.buffer.as_ref().map_or(0, DeviceBuffer::size)
    }

    /// 释放缓冲区
    pub fn release(&mut self, allocator: &mut dyn BufferAllocator) {
        if let Some(buffer) = self.buffer.take() {
            allocator.release(buffer);
        }
        self.key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAllocator;

    fn input_1080p() -> RcbInput {
        RcbInput {
            width: 1920,
            height: 1080,
            bit_depth: 8,
            chroma_format_idc: 1,
            field_coding: false,
            fbc: false,
        }
    }

    fn cache() -> RcbBufferCache {
        RcbBufferCache::new(std::array::from_fn(|i| 100 + i))
    }

    #[test]
    fn test_1080p_sizes() {
        let mut c = cache();
        let total = RcbSizer::compute(&mut c.info, &input_1080p());
        let sizes: Vec<usize> = c.info.iter().map(|e| e.size).collect();
        assert_eq!(sizes, vec![0, 0, 0, 10112, 0, 10560, 12032, 0, 0]);
        assert_eq!(total, 32704);
        // 偏移连续排布
        assert_eq!(c.info[5].offset, 10112);
        assert_eq!(c.info[6].offset, 10112 + 10560);
    }

    #[test]
    fn test_wide_picture_enables_strmd_row() {
        let mut input = input_1080p();
        input.width = 4112;
        assert_eq!(RcbSizer::class_bits(RcbClass::StrmdRow, &input), 257 * 154);
        input.field_coding = true;
        assert_eq!(RcbSizer::class_bits(RcbClass::StrmdRow, &input), 257 * 154 * 2);
        assert_eq!(RcbSizer::class_bits(RcbClass::DblkRow, &input), 4112 * 98);
    }

    #[test]
    fn test_fbc_row_only_for_high_chroma() {
        let mut input = input_1080p();
        input.fbc = true;
        assert_eq!(RcbSizer::class_bits(RcbClass::FbcRow, &input), 0);
        input.chroma_format_idc = 2;
        assert_eq!(RcbSizer::class_bits(RcbClass::FbcRow, &input), 2 * 1920 * 8);
    }

    #[test]
    fn test_device_entries_sorted_and_truncated() {
        let mut c = cache();
        RcbSizer::compute(&mut c.info, &input_1080p());
        let entries = RcbSizer::device_entries(&c.info);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], RcbInfoEntry { reg: 106, size: 12032 });
        assert_eq!(entries[1], RcbInfoEntry { reg: 105, size: 10560 });
        assert_eq!(entries[2], RcbInfoEntry { reg: 103, size: 10112 });
    }

    #[test]
    fn test_needs_realloc() {
        let a = input_1080p().geometry();
        assert!(RcbSizer::needs_realloc(None, &a));
        assert!(!RcbSizer::needs_realloc(Some(&a), &a));
        // 1080 与 1088 对齐后相同
        let mut same = input_1080p();
        same.height = 1088;
        assert!(!RcbSizer::needs_realloc(Some(&a), &same.geometry()));
        let mut deeper = input_1080p();
        deeper.bit_depth = 10;
        assert!(RcbSizer::needs_realloc(Some(&a), &deeper.geometry()));
    }

    #[test]
    fn test_ensure_reallocates_once_per_geometry() {
        let mut alloc = SimAllocator::new();
        let mut c = cache();
        assert!(c.ensure(&mut alloc, &input_1080p()).unwrap());
        for _ in 0..5 {
            assert!(!c.ensure(&mut alloc, &input_1080p()).unwrap());
        }
        assert_eq!(alloc.alloc_count(), 1);

        let mut bigger = input_1080p();
        bigger.width = 3840;
        assert!(c.ensure(&mut alloc, &bigger).unwrap());
        assert_eq!(alloc.alloc_count(), 2);
        assert_eq!(alloc.live_count(), 1);

        c.invalidate();
        assert!(c.ensure(&mut alloc, &bigger).unwrap());
        assert_eq!(alloc.live_count(), 1);
        c.release(&mut alloc);
        assert_eq!(alloc.live_count(), 0);
        assert!(!c.handle().is_valid());
    }
}
