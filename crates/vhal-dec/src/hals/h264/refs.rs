//! 参考帧解析.
//!
//! 硬件的每个参考槽位都必须填入有效的帧缓冲地址, 即便逻辑上该参考不存在.
//! 缺失项用 "最近的前一个有效项" 代替; 第 0 项缺失时用当前图像自身的槽位.
//! 代替值会级联: 连续缺失项全部沿用同一个前驱.
//!
//! 同时挑选错误隐藏用的替换参考: 在无错误的有效参考中, 取 frame_num
//! 严格小于当前图像且最小者; 找不到时使用第 0 个参考槽位解析出的帧.

use log::trace;

use crate::buffer::FrameSlots;

use super::syntax::{PictureParameters, RefFrameEntry};

/// 单个硬件参考槽位的解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedRef {
    /// 参考帧表中该项有效
    pub present: bool,
    /// 填入地址寄存器的 DPB 槽位 (缺失项为代替槽位)
    pub dpb_slot: usize,
    pub field_pic: bool,
    pub top_used: bool,
    pub bottom_used: bool,
    pub colmv_used: bool,
    pub top_poc: i32,
    pub bottom_poc: i32,
}

impl ResolvedRef {
    fn from_entry(entry: &RefFrameEntry) -> Self {
        Self {
            present: true,
            dpb_slot: entry.dpb_slot,
            field_pic: entry.field_pic,
            top_used: entry.top_used,
            bottom_used: entry.bottom_used,
            colmv_used: entry.colmv_used,
            top_poc: entry.top_poc,
            bottom_poc: entry.bottom_poc,
        }
    }

    fn fallback(slot: usize) -> Self {
        Self {
            dpb_slot: slot,
            ..Default::default()
        }
    }
}

/// 硬件参考块 (`N` 为硬件参考槽位数)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReferenceBlock<const N: usize> {
    pub refs: [ResolvedRef; N],
    /// 错误隐藏替换参考所在的 DPB 槽位
    pub error_ref_slot: usize,
}

impl<const N: usize> RegisterReferenceBlock<N> {
    fn bitmap(&self, pred: impl Fn(&ResolvedRef) -> bool) -> u32 {
        self.refs
            .iter()
            .enumerate()
            .filter(|(_, r)| pred(r))
            .fold(0, |bits, (i, _)| bits | (1 << i))
    }

    /// 场编码参考位图
    pub fn field_flags(&self) -> u32 {
        self.bitmap(|r| r.field_pic)
    }

    pub fn top_used_flags(&self) -> u32 {
        self.bitmap(|r| r.top_used)
    }

    pub fn bottom_used_flags(&self) -> u32 {
        self.bitmap(|r| r.bottom_used)
    }

    pub fn colmv_use_flags(&self) -> u32 {
        self.bitmap(|r| r.colmv_used)
    }
}

/// 参考帧解析器
pub struct ReferencePictureResolver<const N: usize>;

impl<const N: usize> ReferencePictureResolver<N> {
    /// 解析参考帧表
    ///
    /// `frames` 用于查询参考帧是否带错误.
    pub fn resolve(pic: &PictureParameters, frames: &dyn FrameSlots) -> RegisterReferenceBlock<N> {
        let mut refs = [ResolvedRef::default(); N];
        let mut near = pic.curr_slot;
        let mut error_ref: Option<(u32, usize)> = None;

        for (i, resolved) in refs.iter_mut().enumerate() {
            match pic.ref_frames.get(i).filter(|e| e.present) {
                Some(entry) => {
                    *resolved = ResolvedRef::from_entry(entry);
                    near = entry.dpb_slot;

                    let clean = frames
                        .frame(entry.dpb_slot)
                        .is_some_and(|f| !f.has_error);
                    let better = error_ref.is_none_or(|(min, _)| entry.frame_num < min);
                    if clean && entry.frame_num < pic.frame_num && better {
                        error_ref = Some((entry.frame_num, entry.dpb_slot));
                    }
                }
                None => *resolved = ResolvedRef::fallback(near),
            }
        }

        let error_ref_slot = match error_ref {
            Some((_, slot)) => slot,
            None => refs.first().map_or(pic.curr_slot, |r| r.dpb_slot),
        };
        trace!(
            "参考解析: 有效位图 {:#06x}, 替换参考槽位 {}",
            pic.presence_bitmap(),
            error_ref_slot
        );
        RegisterReferenceBlock {
            refs,
            error_ref_slot,
        }
    }
}
