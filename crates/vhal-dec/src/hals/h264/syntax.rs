//! H.264 图像级语法 (由上游解析器填充, HAL 只读).

/// 参考帧表容量
pub const MAX_REF_FRAMES: usize = 16;

/// 单个参考列表的最大长度
pub const MAX_LIST_ENTRIES: usize = 32;

/// 序列参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceParams {
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// profile_idc (66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    pub constraint_set3: bool,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub qpprime_y_zero_transform_bypass: bool,
    pub log2_max_frame_num_minus4: u32,
    pub max_num_ref_frames: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_poc_lsb_minus4: u32,
    pub delta_pic_order_always_zero: bool,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// 以宏块计的宽度
    pub pic_width_in_mbs: u32,
    /// 以映射单元计的高度 (场编码时为半帧高度)
    pub pic_height_in_map_units: u32,
    /// 是否只含帧宏块 (非场编码)
    pub frame_mbs_only: bool,
    pub mb_adaptive_frame_field: bool,
    pub direct_8x8_inference: bool,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            sps_id: 0,
            profile_idc: 100,
            constraint_set3: false,
            chroma_format_idc: 1,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            qpprime_y_zero_transform_bypass: false,
            log2_max_frame_num_minus4: 0,
            max_num_ref_frames: 4,
            pic_order_cnt_type: 0,
            log2_max_poc_lsb_minus4: 2,
            delta_pic_order_always_zero: false,
            width: 16,
            height: 16,
            pic_width_in_mbs: 1,
            pic_height_in_map_units: 1,
            frame_mbs_only: true,
            mb_adaptive_frame_field: false,
            direct_8x8_inference: true,
        }
    }
}

impl SequenceParams {
    /// 按像素尺寸设置宏块数
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self.pic_width_in_mbs = width.div_ceil(16);
        let frame_height_in_mbs = height.div_ceil(16);
        self.pic_height_in_map_units = if self.frame_mbs_only {
            frame_height_in_mbs
        } else {
            frame_height_in_mbs.div_ceil(2)
        };
        self
    }

    /// 编码宽度 (像素, 16 对齐)
    pub fn coded_width(&self) -> u32 {
        self.pic_width_in_mbs * 16
    }

    /// 编码高度 (像素, 16 对齐)
    pub fn coded_height(&self) -> u32 {
        let map_unit_rows = if self.frame_mbs_only { 1 } else { 2 };
        self.pic_height_in_map_units * 16 * map_unit_rows
    }

    /// 是否场编码序列
    pub fn field_coding(&self) -> bool {
        !self.frame_mbs_only
    }
}

/// 图像参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureParamSet {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 熵编码模式 (false=CAVLC, true=CABAC)
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present: bool,
    pub constrained_intra_pred: bool,
    pub redundant_pic_cnt_present: bool,
    pub transform_8x8_mode: bool,
    pub second_chroma_qp_index_offset: i32,
    pub scaling_matrix_present: bool,
}

impl Default for PictureParamSet {
    fn default() -> Self {
        Self {
            pps_id: 0,
            entropy_coding_mode: true,
            bottom_field_pic_order_in_frame_present: false,
            num_ref_idx_l0_default_active_minus1: 0,
            num_ref_idx_l1_default_active_minus1: 0,
            weighted_pred: false,
            weighted_bipred_idc: 0,
            pic_init_qp_minus26: 0,
            pic_init_qs_minus26: 0,
            chroma_qp_index_offset: 0,
            deblocking_filter_control_present: true,
            constrained_intra_pred: false,
            redundant_pic_cnt_present: false,
            transform_8x8_mode: false,
            second_chroma_qp_index_offset: 0,
            scaling_matrix_present: false,
        }
    }
}

/// 参考帧表项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefFrameEntry {
    /// 表项是否有效
    pub present: bool,
    /// 帧所在的 DPB 槽位
    pub dpb_slot: usize,
    /// 长期参考
    pub long_term: bool,
    /// frame_num (长期参考为 long_term_frame_idx)
    pub frame_num: u32,
    /// 参考帧以场方式编码
    pub field_pic: bool,
    /// 顶场被用于参考
    pub top_used: bool,
    /// 底场被用于参考
    pub bottom_used: bool,
    /// 该参考帧的 colmv 可用于时域直接预测
    pub colmv_used: bool,
    pub top_poc: i32,
    pub bottom_poc: i32,
}

/// 当前图像的参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PictureParameters {
    pub sps: SequenceParams,
    pub pps: PictureParamSet,
    /// 当前图像的 DPB 槽位
    pub curr_slot: usize,
    pub frame_num: u32,
    /// 当前图像是场
    pub field_pic: bool,
    /// 当前场为底场
    pub bottom_field: bool,
    pub idr: bool,
    pub cur_top_poc: i32,
    pub cur_bottom_poc: i32,
    /// 参考帧表
    pub ref_frames: [RefFrameEntry; MAX_REF_FRAMES],
    /// 上游指示参数集内容已更新 (即使 id 未变)
    pub param_set_update: bool,
    /// 缩放矩阵, 缺省为平坦矩阵
    pub scaling: Option<ScalingLists>,
}

impl PictureParameters {
    /// 帧级 MBAFF
    pub fn mbaff(&self) -> bool {
        self.sps.mb_adaptive_frame_field && !self.field_pic
    }

    /// 长期参考位图 (bit i 对应参考帧表第 i 项)
    pub fn long_term_bitmap(&self) -> u16 {
        self.ref_bitmap(|e| e.long_term)
    }

    /// 有效参考位图
    pub fn presence_bitmap(&self) -> u16 {
        self.ref_bitmap(|_| true)
    }

    /// 引用参考帧表第 `ref_index` 项的列表项, 表项无效时标记为无效
    pub fn list_entry(&self, ref_index: u8, bottom: bool) -> RefListEntry {
        match self.ref_frames.get(usize::from(ref_index)) {
            Some(frame) if frame.present => RefListEntry {
                present: true,
                ref_index,
                dpb_slot: frame.dpb_slot,
                bottom,
            },
            _ => RefListEntry {
                ref_index,
                bottom,
                ..Default::default()
            },
        }
    }

    fn ref_bitmap(&self, pred: impl Fn(&RefFrameEntry) -> bool) -> u16 {
        self.ref_frames
            .iter()
            .enumerate()
            .filter(|(_, e)| e.present && pred(e))
            .fold(0u16, |bits, (i, _)| bits | (1 << i))
    }
}

/// 参考列表项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefListEntry {
    /// 表项有效
    pub present: bool,
    /// 参考帧表索引
    pub ref_index: u8,
    /// 被引用帧所在的 DPB 槽位, 与 `ref_frames[ref_index].dpb_slot` 一致
    pub dpb_slot: usize,
    /// 引用底场
    pub bottom: bool,
}

/// 片参考列表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SliceReferenceList {
    /// list0 / list1, 超过 [`MAX_LIST_ENTRIES`] 的部分被忽略
    pub lists: [Vec<RefListEntry>; 2],
}

/// 缩放矩阵 (6 个 4x4 与 6 个 8x8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingLists {
    pub list_4x4: [[u8; 16]; 6],
    pub list_8x8: [[u8; 64]; 6],
}

impl ScalingLists {
    /// 序列化后的字节数
    pub const BYTES: usize = 6 * 16 + 6 * 64;

    /// 平坦矩阵 (全 16)
    pub const fn flat() -> Self {
        Self {
            list_4x4: [[16; 16]; 6],
            list_8x8: [[16; 64]; 6],
        }
    }
}

impl Default for ScalingLists {
    fn default() -> Self {
        Self::flat()
    }
}

/// 单个 H.264 任务携带的全部语法
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct H264Syntax {
    pub pic: PictureParameters,
    pub slice_refs: SliceReferenceList,
}
