//! 合成 H.264 图像序列.
//!
//! IPPP 结构: 第 0 帧为 IDR, 之后每帧以最近的至多 [`MAX_REFS`] 帧为参考.
//! 槽位按帧序号轮转, DPB 槽位数须大于 `MAX_REFS`.

use vhal_dec::hals::h264::syntax::{H264Syntax, PictureParameters, RefFrameEntry, SequenceParams};

/// 每帧最多引用的前序帧数
pub const MAX_REFS: usize = 4;

/// frame_num 的取值周期 (log2_max_frame_num = 4)
const FRAME_NUM_PERIOD: u64 = 16;

/// 合成序列参数
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSequence {
    width: u32,
    height: u32,
    field: bool,
    dpb_slots: usize,
}

impl SyntheticSequence {
    pub fn new(width: u32, height: u32, field: bool, dpb_slots: usize) -> Self {
        Self {
            width,
            height,
            field,
            dpb_slots: dpb_slots.max(MAX_REFS + 1),
        }
    }

    /// 第 `index` 帧所在的 DPB 槽位
    pub fn slot_of(&self, index: u64) -> usize {
        (index % self.dpb_slots as u64) as usize
    }

    fn frame_num(index: u64) -> u32 {
        (index % FRAME_NUM_PERIOD) as u32
    }

    fn poc(index: u64) -> (i32, i32) {
        let top = (index * 2) as i32;
        (top, top + 1)
    }

    /// 生成第 `index` 帧的语法
    pub fn picture(&self, index: u64) -> H264Syntax {
        let sps = SequenceParams {
            frame_mbs_only: !self.field,
            ..Default::default()
        }
        .with_size(self.width, self.height);
        let (cur_top_poc, cur_bottom_poc) = Self::poc(index);

        let mut pic = PictureParameters {
            sps,
            curr_slot: self.slot_of(index),
            frame_num: Self::frame_num(index),
            field_pic: self.field,
            idr: index == 0,
            cur_top_poc,
            cur_bottom_poc,
            ..Default::default()
        };

        let ref_count = (index as usize).min(MAX_REFS);
        let mut list0 = Vec::with_capacity(ref_count);
        for k in 0..ref_count {
            let ref_index = index - 1 - k as u64;
            let (top_poc, bottom_poc) = Self::poc(ref_index);
            pic.ref_frames[k] = RefFrameEntry {
                present: true,
                dpb_slot: self.slot_of(ref_index),
                long_term: false,
                frame_num: Self::frame_num(ref_index),
                field_pic: self.field,
                top_used: true,
                bottom_used: true,
                colmv_used: true,
                top_poc,
                bottom_poc,
            };
            list0.push(pic.list_entry(k as u8, false));
        }

        let mut syntax = H264Syntax {
            pic,
            ..Default::default()
        };
        syntax.slice_refs.lists[0] = list0;
        syntax
    }
}
