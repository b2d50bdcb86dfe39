//! 暂存缓冲区布局.
//!
//! 每个 HAL 实例持有一块连续的设备缓冲区, 划分为:
//!
//! ```text
//! +-------------+-------------+---------+---------+-----+-------------+
//! | CABAC 表    | 错误信息    | 区域 0  | 区域 1  | ... | 区域 N-1    |
//! | (共享)      | (共享)      | 参数/参考列表/缩放表 (每槽位一份)      |
//! +-------------+-------------+---------+---------+-----+-------------+
//! ```
//!
//! 每个子区域起点按 4 KiB 对齐. 非快速模式只有一个区域.

use vhal_core::align_4k;

/// 各子区域原始大小 (字节)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScratchSizes {
    /// CABAC 上下文初始化表
    pub cabac: usize,
    /// 错误信息区
    pub error_info: usize,
    /// 参数集块
    pub param: usize,
    /// 参考列表块
    pub reflist: usize,
    /// 缩放矩阵块
    pub scaling: usize,
}

/// 单个区域内三个子块的绝对偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchRegion {
    /// 参数集块偏移
    pub param: usize,
    /// 参考列表块偏移
    pub reflist: usize,
    /// 缩放矩阵块偏移
    pub scaling: usize,
}

/// 暂存缓冲区布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    sizes: ScratchSizes,
    copies: usize,
}

impl ScratchLayout {
    /// 以子区域大小与区域份数构造布局, 份数至少为 1
    pub fn new(sizes: ScratchSizes, copies: usize) -> Self {
        Self {
            sizes,
            copies: copies.max(1),
        }
    }

    /// 子区域原始大小
    pub fn sizes(&self) -> &ScratchSizes {
        &self.sizes
    }

    /// 区域份数
    pub fn copies(&self) -> usize {
        self.copies
    }

    pub fn cabac_offset(&self) -> usize {
        0
    }

    pub fn error_info_offset(&self) -> usize {
        align_4k(self.sizes.cabac)
    }

    /// 第一个区域的起点
    fn regions_base(&self) -> usize {
        self.error_info_offset() + align_4k(self.sizes.error_info)
    }

    /// 相邻区域之间的跨距
    pub fn region_stride(&self) -> usize {
        align_4k(self.sizes.param) + align_4k(self.sizes.reflist) + align_4k(self.sizes.scaling)
    }

    /// 第 `p` 个区域的参数集块偏移
    pub fn param_offset(&self, p: usize) -> usize {
        self.regions_base() + p * self.region_stride()
    }

    /// 第 `p` 个区域的参考列表块偏移
    pub fn reflist_offset(&self, p: usize) -> usize {
        self.param_offset(p) + align_4k(self.sizes.param)
    }

    /// 第 `p` 个区域的缩放矩阵块偏移
    pub fn scaling_offset(&self, p: usize) -> usize {
        self.reflist_offset(p) + align_4k(self.sizes.reflist)
    }

    /// 第 `p` 个区域的全部子块偏移
    pub fn region(&self, p: usize) -> ScratchRegion {
        ScratchRegion {
            param: self.param_offset(p),
            reflist: self.reflist_offset(p),
            scaling: self.scaling_offset(p),
        }
    }

    /// 整块缓冲区大小
    pub fn total_size(&self) -> usize {
        self.regions_base() + self.copies * self.region_stride()
    }
}
