//! H.264 寄存器镜像与暂存块生成.
//!
//! 把图像语法和解析后的参考块映射到寄存器镜像, 并把参数集、参考列表、
//! 缩放矩阵序列化到当前槽位的暂存区域. 地址字段只写缓冲区句柄,
//! 子区域偏移通过寄存器偏移补丁表提交.

use vhal_core::bitwriter::{BitWriter, words_to_le_bytes};
use vhal_core::{HalResult, RegField, align_up};

use crate::buffer::{BufferHandle, DeviceBuffer, FrameBufferInfo, FrameSlots};
use crate::codec_id::CodecId;
use crate::colmv::ColMvPool;
use crate::device::RegOffsetTable;
use crate::hal::HalConfig;
use crate::image::RegisterImage;
use crate::rcb::RcbBufferCache;
use crate::scratch::{ScratchRegion, ScratchSizes};

use super::cabac::CABAC_TABLE_SIZE;
use super::refs::RegisterReferenceBlock;
use super::regs::*;
use super::syntax::{
    H264Syntax, MAX_LIST_ENTRIES, MAX_REF_FRAMES, PictureParameters, ScalingLists,
    SliceReferenceList,
};

/// 参数集表项数 (每个 PPS id 一项)
pub const PARAM_ENTRIES: usize = 256;
/// 单个参数集表项字节数
pub const PARAM_ENTRY_BYTES: usize = 48;
/// 单个参数集表项的 64 位字数
const PARAM_WORDS: usize = PARAM_ENTRY_BYTES / 8;
/// 参考列表块字节数
pub const REFLIST_BYTES: usize = 128;
const REFLIST_WORDS: usize = REFLIST_BYTES / 8;

/// H.264 暂存区域大小
pub const SCRATCH_SIZES: ScratchSizes = ScratchSizes {
    cabac: CABAC_TABLE_SIZE,
    error_info: 0,
    param: PARAM_ENTRIES * PARAM_ENTRY_BYTES,
    reflist: REFLIST_BYTES,
    scaling: ScalingLists::BYTES,
};

/// 已序列化参数集的缓存 (每个暂存区域一份)
#[derive(Debug, Clone, Default)]
pub struct ParamSetCache {
    key: Option<(u32, u32)>,
    header_bits: usize,
    words: [u64; PARAM_WORDS],
}

impl ParamSetCache {
    /// 上次序列化的 (sps_id, pps_id)
    pub fn key(&self) -> Option<(u32, u32)> {
        self.key
    }
}

/// 单次构建所需的上下文
pub struct BuildContext<'a> {
    pub syntax: &'a H264Syntax,
    pub refs: &'a RegisterReferenceBlock<MAX_REF_FRAMES>,
    pub frames: &'a dyn FrameSlots,
    /// 码流缓冲区
    pub stream: BufferHandle,
    pub stream_len: usize,
    pub output_slot: usize,
    /// 本任务使用的暂存区域
    pub region: ScratchRegion,
    pub colmv: &'a ColMvPool,
    pub rcb: &'a RcbBufferCache,
    /// FBC 输出
    pub fbc: bool,
    /// 强制完整序列化参数集 (快速模式)
    pub full_param_set: bool,
}

/// 寄存器构建器
pub struct RegisterBuilder;

impl RegisterBuilder {
    /// 写入每个槽位只需初始化一次的公共寄存器
    pub fn init_common(image: &mut RegisterImage, config: &HalConfig) {
        image.set(DEC_MODE, CodecId::H264.engine_mode());
        image.set_flag(ERR_HEAD_FILL_EN, config.error_conceal);
        image.set_flag(ERR_COLMV_FILL_EN, config.error_conceal);
        image.set_flag(ERROR_CONCEAL_EN, config.error_conceal);
        image.set_flag(ERROR_INTRA_MODE, config.error_conceal);
        image.set_flag(BUF_EMPTY_EN, true);
        image.set_flag(CLKGATE_EN, config.clock_gating);
        image.set_flag(WR_DDR_ALIGN_EN, true);
        image.set(TIMEOUT_THRESHOLD, config.watchdog_cycles);
    }

    /// 构建一个任务的寄存器镜像与暂存块, 返回参数集是否被完整序列化
    pub fn build(
        ctx: &BuildContext<'_>,
        image: &mut RegisterImage,
        offsets: &mut RegOffsetTable,
        scratch: &mut DeviceBuffer,
        cache: &mut ParamSetCache,
    ) -> HalResult<bool> {
        let pic = &ctx.syntax.pic;
        image.clear_section(&SEC_CODEC_PARAMS);
        image.clear_section(&SEC_COMMON_ADDR);
        image.clear_section(&SEC_CODEC_ADDR);
        image.clear_section(&SEC_IRQ_STATUS);
        image.clear_section(&SEC_STATISTICS);
        offsets.clear();

        let full = Self::write_param_blob(pic, ctx.full_param_set, cache, scratch, ctx.region)?;
        Self::write_reflist_blob(pic, &ctx.syntax.slice_refs, scratch, ctx.region)?;
        Self::write_scaling_blob(pic, scratch, ctx.region)?;

        let output = ctx.frames.frame(ctx.output_slot);
        image.set(STREAM_LEN, ctx.stream_len as u32);
        Self::set_geometry(image, output.as_ref(), pic, ctx.fbc);
        Self::set_picture_fields(image, pic, ctx.refs);
        Self::set_addresses(ctx, image, offsets, scratch.handle(), output.as_ref())?;
        Ok(full)
    }

    /// 参数集块
    ///
    /// 参数集未变化时复用上次的序列化结果, 只重写其后的每图像位图.
    fn write_param_blob(
        pic: &PictureParameters,
        force_full: bool,
        cache: &mut ParamSetCache,
        scratch: &mut DeviceBuffer,
        region: ScratchRegion,
    ) -> HalResult<bool> {
        let key = (pic.sps.sps_id, pic.pps.pps_id);
        let full = force_full || pic.param_set_update || cache.key != Some(key);

        let mut bw = if full {
            let mut bw = BitWriter::new(&mut cache.words);
            Self::put_sequence(&mut bw, pic);
            Self::put_picture_param_set(&mut bw, pic);
            cache.header_bits = bw.bits_written();
            bw
        } else {
            BitWriter::resume(&mut cache.words, cache.header_bits)
        };
        bw.put_bits(u64::from(pic.long_term_bitmap()), 16);
        bw.put_bits(u64::from(pic.presence_bitmap()), 16);
        bw.put_align(128, 0);
        cache.key = Some(key);

        let mut entry = [0u8; PARAM_ENTRY_BYTES];
        words_to_le_bytes(&cache.words, &mut entry);
        for i in 0..PARAM_ENTRIES {
            scratch.write_at(region.param + i * PARAM_ENTRY_BYTES, &entry)?;
        }
        Ok(full)
    }

    fn put_sequence(bw: &mut BitWriter<'_>, pic: &PictureParameters) {
        let sps = &pic.sps;
        bw.put_bits(u64::from(sps.sps_id), 5);
        bw.put_bits(u64::from(sps.profile_idc), 8);
        bw.put_bits(u64::from(sps.constraint_set3), 1);
        bw.put_bits(u64::from(sps.chroma_format_idc), 2);
        bw.put_bits(u64::from(sps.bit_depth_luma.saturating_sub(8)), 3);
        bw.put_bits(u64::from(sps.bit_depth_chroma.saturating_sub(8)), 3);
        bw.put_bits(u64::from(sps.qpprime_y_zero_transform_bypass), 1);
        bw.put_bits(u64::from(sps.log2_max_frame_num_minus4), 4);
        bw.put_bits(u64::from(sps.max_num_ref_frames), 5);
        bw.put_bits(u64::from(sps.pic_order_cnt_type), 2);
        bw.put_bits(u64::from(sps.log2_max_poc_lsb_minus4), 4);
        bw.put_bits(u64::from(sps.delta_pic_order_always_zero), 1);
        bw.put_bits(u64::from(sps.pic_width_in_mbs), 16);
        bw.put_bits(u64::from(sps.pic_height_in_map_units), 16);
        bw.put_bits(u64::from(sps.frame_mbs_only), 1);
        bw.put_bits(u64::from(sps.mb_adaptive_frame_field), 1);
        bw.put_bits(u64::from(sps.direct_8x8_inference), 1);
    }

    fn put_picture_param_set(bw: &mut BitWriter<'_>, pic: &PictureParameters) {
        let pps = &pic.pps;
        // 有符号字段按二进制补码截断到字段宽度
        let signed = |v: i32| u64::from(v as u32);
        bw.put_bits(u64::from(pps.pps_id), 8);
        bw.put_bits(u64::from(pps.entropy_coding_mode), 1);
        bw.put_bits(u64::from(pps.bottom_field_pic_order_in_frame_present), 1);
        bw.put_bits(u64::from(pps.num_ref_idx_l0_default_active_minus1), 5);
        bw.put_bits(u64::from(pps.num_ref_idx_l1_default_active_minus1), 5);
        bw.put_bits(u64::from(pps.weighted_pred), 1);
        bw.put_bits(u64::from(pps.weighted_bipred_idc), 2);
        bw.put_bits(signed(pps.pic_init_qp_minus26), 7);
        bw.put_bits(signed(pps.pic_init_qs_minus26), 6);
        bw.put_bits(signed(pps.chroma_qp_index_offset), 5);
        bw.put_bits(u64::from(pps.deblocking_filter_control_present), 1);
        bw.put_bits(u64::from(pps.constrained_intra_pred), 1);
        bw.put_bits(u64::from(pps.redundant_pic_cnt_present), 1);
        bw.put_bits(u64::from(pps.transform_8x8_mode), 1);
        bw.put_bits(signed(pps.second_chroma_qp_index_offset), 5);
        bw.put_bits(u64::from(pps.scaling_matrix_present), 1);
    }

    /// 参考列表块: 16 个 frame_num, 然后 list0/list1 各 32 项
    /// (参考帧表索引 5 位, 底场 1 位, 有效 1 位)
    fn write_reflist_blob(
        pic: &PictureParameters,
        lists: &SliceReferenceList,
        scratch: &mut DeviceBuffer,
        region: ScratchRegion,
    ) -> HalResult<()> {
        let mut words = [0u64; REFLIST_WORDS];
        let mut bw = BitWriter::new(&mut words);
        for entry in &pic.ref_frames {
            let frame_num = if entry.present { entry.frame_num } else { 0 };
            bw.put_bits(u64::from(frame_num), 16);
        }
        for list in &lists.lists {
            for j in 0..MAX_LIST_ENTRIES {
                match list.get(j).filter(|e| e.present) {
                    Some(e) => {
                        bw.put_bits(u64::from(e.ref_index), 5);
                        bw.put_bits(u64::from(e.bottom), 1);
                        bw.put_bits(1, 1);
                    }
                    None => bw.put_bits(0, 7),
                }
            }
        }
        bw.put_align(128, 0);

        let mut bytes = [0u8; REFLIST_BYTES];
        words_to_le_bytes(&words, &mut bytes);
        scratch.write_at(region.reflist, &bytes)
    }

    /// 缩放矩阵块: 6 个 4x4 后接 6 个 8x8, 缺省为平坦矩阵
    fn write_scaling_blob(
        pic: &PictureParameters,
        scratch: &mut DeviceBuffer,
        region: ScratchRegion,
    ) -> HalResult<()> {
        let flat = ScalingLists::flat();
        let lists = pic.scaling.as_ref().unwrap_or(&flat);
        let mut bytes = Vec::with_capacity(ScalingLists::BYTES);
        lists.list_4x4.iter().for_each(|l| bytes.extend_from_slice(l));
        lists.list_8x8.iter().for_each(|l| bytes.extend_from_slice(l));
        scratch.write_at(region.scaling, &bytes)
    }

    /// 步长与 FBC 字段, 取自输出帧缓冲的实际步长
    fn set_geometry(
        image: &mut RegisterImage,
        output: Option<&FrameBufferInfo>,
        pic: &PictureParameters,
        fbc: bool,
    ) {
        image.set_flag(FBC_EN, fbc);
        let Some(out) = output else {
            image.set(Y_HOR_VIRSTRIDE, 0);
            image.set(UV_HOR_VIRSTRIDE, 0);
            image.set(Y_VIRSTRIDE, 0);
            image.set(FBC_PAYLOAD_OFFSET, 0);
            return;
        };
        let hor = out.hor_stride as usize;
        let ver = out.ver_stride as usize;

        if fbc {
            let hdr_stride = align_up(out.width as usize, 64);
            let payload = align_up(hdr_stride * align_up(ver, 64) / 16, 4096);
            image.set(Y_HOR_VIRSTRIDE, (hdr_stride / 64) as u32);
            image.set(UV_HOR_VIRSTRIDE, (hdr_stride / 64) as u32);
            image.set(Y_VIRSTRIDE, 0);
            image.set(FBC_PAYLOAD_OFFSET, (payload >> 4) as u32);
        } else {
            let uv_hor = if pic.sps.chroma_format_idc == 3 { hor * 2 } else { hor };
            image.set(Y_HOR_VIRSTRIDE, (hor / 16) as u32);
            image.set(UV_HOR_VIRSTRIDE, (uv_hor / 16) as u32);
            image.set(Y_VIRSTRIDE, (hor * ver / 16) as u32);
            image.set(FBC_PAYLOAD_OFFSET, 0);
        }
    }

    fn set_picture_fields(
        image: &mut RegisterImage,
        pic: &PictureParameters,
        refs: &RegisterReferenceBlock<MAX_REF_FRAMES>,
    ) {
        image.set(CUR_TOP_POC, pic.cur_top_poc as u32);
        image.set(CUR_BOT_POC, pic.cur_bottom_poc as u32);
        for (i, r) in refs.refs.iter().enumerate() {
            image.set(ref_poc(i, false), r.top_poc as u32);
            image.set(ref_poc(i, true), r.bottom_poc as u32);
        }
        image.set(REF_FIELD_FLAGS, refs.field_flags());
        image.set(REF_TOPFIELD_USED, refs.top_used_flags());
        image.set(REF_BOTFIELD_USED, refs.bottom_used_flags());
        image.set(REF_COLMV_USE, refs.colmv_use_flags());
        image.set_flag(CUR_FIELD, pic.field_pic);
        image.set_flag(CUR_BOTTOM_FIELD, pic.field_pic && pic.bottom_field);
        image.set_flag(CUR_MBAFF, pic.mbaff());
        image.set_flag(CUR_IDR, pic.idr);
    }

    /// 地址字段: 句柄写入寄存器, 非零偏移进入补丁表
    fn set_addresses(
        ctx: &BuildContext<'_>,
        image: &mut RegisterImage,
        offsets: &mut RegOffsetTable,
        scratch: BufferHandle,
        output: Option<&FrameBufferInfo>,
    ) -> HalResult<()> {
        let frame_handle =
            |slot: usize| ctx.frames.frame(slot).map_or(0, |f| f.handle.reg_value());
        let pic = &ctx.syntax.pic;

        image.set(STRM_BASE, ctx.stream.reg_value());
        image.set(DECOUT_BASE, output.map_or(0, |f| f.handle.reg_value()));
        image.set(COLMV_CUR_BASE, ctx.colmv.get(pic.curr_slot).reg_value());
        image.set(ERROR_REF_BASE, frame_handle(ctx.refs.error_ref_slot));

        let rcb_handle = ctx.rcb.handle().reg_value();
        for info in ctx.rcb.info() {
            if info.size == 0 {
                continue;
            }
            image.set(RegField::word(info.reg), rcb_handle);
            offsets.push(info.reg, info.offset)?;
        }

        let scratch_value = scratch.reg_value();
        for (field, offset) in [
            (PPS_BASE, ctx.region.param),
            (RPS_BASE, ctx.region.reflist),
            (SCALING_BASE, ctx.region.scaling),
            (CABAC_BASE, 0),
        ] {
            image.set(field, scratch_value);
            offsets.push(field.reg, offset)?;
        }
        // 错误信息区大小为 0, 不启用
        image.set(ERRINFO_BASE, 0);

        for (i, r) in ctx.refs.refs.iter().enumerate() {
            image.set(ref_base(i), frame_handle(r.dpb_slot));
            image.set(colmv_base(i), ctx.colmv.get(r.dpb_slot).reg_value());
        }
        Ok(())
    }
}
