//! vdpu 代际 H.264 解码 HAL.
//!
//! 状态机: Idle → RegsBuilt → Submitted → (完成 | 错误) → Idle.
//!
//! 资源:
//! - 一块暂存缓冲区: CABAC 表 (init 时写入一次) + 每槽位一份参数集/参考列表/缩放矩阵
//! - RCB 缓冲区: 几何或格式变化时重新分配
//! - colmv 缓冲池: 每个 DPB 槽位一块
//! - 流水线槽位: 快速模式下 `pipeline_depth` 个, 否则 1 个

mod builder;
pub mod cabac;
mod refs;
pub mod regs;
pub mod syntax;

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use vhal_core::{HalError, HalResult};

use crate::buffer::{BufferAllocator, DeviceBuffer, FrameSlots, StrideAlign};
use crate::codec_id::CodecId;
use crate::colmv::{ColMvPool, colmv_size};
use crate::device::{Device, RcbInfoEntry, RegOffsetTable};
use crate::hal::{
    CompletionCallback, ControlCommand, DecodeReport, DecoderHal, HalConfig, HalResources,
    HwCapability,
};
use crate::image::RegisterImage;
use crate::rcb::{RcbBufferCache, RcbInput, RcbSizer};
use crate::scratch::ScratchLayout;
use crate::slots::{PipelineSlotPool, SlotStage};
use crate::task::{HalTask, PictureSyntax};

pub use builder::{BuildContext, ParamSetCache, RegisterBuilder, SCRATCH_SIZES};
pub use refs::{ReferencePictureResolver, RegisterReferenceBlock, ResolvedRef};
pub use syntax::H264Syntax;

use regs::{HwStatus, IRQ_STATUS, REG_COUNT, SEC_IRQ_STATUS, WRITE_SECTIONS};
use syntax::MAX_REF_FRAMES;

/// HAL 名称
pub const HAL_NAME: &str = "vdpu-h264";

/// 最大解码宽度
pub const MAX_WIDTH: u32 = 4096;

/// 最大解码高度
pub const MAX_HEIGHT: u32 = 2304;

/// 超过该尺寸时输出步长改用 256 奇数倍对齐
const STRIDE_256_ODD_WIDTH: u32 = 1920;
const STRIDE_256_ODD_HEIGHT: u32 = 1088;

/// 流水线槽位负载
#[derive(Debug)]
struct SlotData {
    image: RegisterImage,
    offsets: RegOffsetTable,
    rcb_entries: Vec<RcbInfoEntry>,
    task_id: Option<u64>,
}

/// init 之后才存在的运行期状态
struct Active {
    config: HalConfig,
    device: Box<dyn Device>,
    allocator: Box<dyn BufferAllocator>,
    frames: Arc<dyn FrameSlots>,
    callback: Option<CompletionCallback>,
    layout: ScratchLayout,
    scratch: Option<DeviceBuffer>,
    slots: PipelineSlotPool<SlotData>,
    param_caches: Vec<ParamSetCache>,
    rcb: RcbBufferCache,
    colmv: ColMvPool,
    fbc: bool,
}

/// vdpu H.264 解码 HAL
pub struct H264Hal {
    active: Option<Active>,
}

impl H264Hal {
    /// 创建未初始化的 HAL
    pub fn new() -> Self {
        Self { active: None }
    }

    /// 工厂函数 (供注册表使用)
    pub fn create() -> HalResult<Box<dyn DecoderHal>> {
        Ok(Box::new(Self::new()))
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// 在用流水线槽位数
    pub fn slots_in_use(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.slots.in_use())
    }

    /// 暂存缓冲区布局
    pub fn scratch_layout(&self) -> Option<ScratchLayout> {
        self.active.as_ref().map(|a| a.layout)
    }

    /// 槽位的寄存器镜像 (用于转储与检查)
    pub fn slot_image(&self, idx: usize) -> Option<&RegisterImage> {
        let slot = self.active.as_ref()?.slots.get(idx)?;
        Some(&slot.data.image)
    }

    /// 槽位的寄存器偏移补丁表
    pub fn slot_offsets(&self, idx: usize) -> Option<&RegOffsetTable> {
        let slot = self.active.as_ref()?.slots.get(idx)?;
        Some(&slot.data.offsets)
    }

    /// 槽位最近一次服务的任务编号
    pub fn slot_task(&self, idx: usize) -> Option<u64> {
        self.active.as_ref()?.slots.get(idx)?.data.task_id
    }

    /// 暂存缓冲区内容
    pub fn scratch_bytes(&self) -> Option<&[u8]> {
        let scratch = self.active.as_ref()?.scratch.as_ref()?;
        Some(scratch.as_slice())
    }

    fn active_mut(&mut self) -> HalResult<&mut Active> {
        self.active
            .as_mut()
            .ok_or_else(|| HalError::InvalidState("HAL 未初始化".into()))
    }

    /// 分配暂存缓冲区并写入 CABAC 表
    fn alloc_scratch(active: &mut Active) -> HalResult<()> {
        let size = active.layout.total_size();
        let mut scratch = active.allocator.alloc(size)?;
        if let Err(e) = scratch.write_at(active.layout.cabac_offset(), &cabac::CABAC_TABLE) {
            active.allocator.release(scratch);
            return Err(e);
        }
        if let Err(e) = active.allocator.sync_for_device(&scratch) {
            active.allocator.release(scratch);
            return Err(e);
        }
        debug!(
            "{}: 暂存缓冲区 {} 字节, {} 个区域",
            HAL_NAME,
            size,
            active.layout.copies()
        );
        active.scratch = Some(scratch);
        Ok(())
    }

    /// 归还槽位
    fn release_slot(active: &mut Active, idx: usize) {
        active.slots.release(idx);
    }

    /// 占用槽位: 快速模式线性扫描, 否则只有槽位 0
    fn acquire_slot(active: &mut Active) -> HalResult<usize> {
        let fast_mode = active.config.fast_mode;
        let capacity = active.slots.capacity();
        active.slots.acquire().ok_or_else(|| {
            if fast_mode {
                HalError::ResourceBusy(format!("流水线槽位已全部在用 ({} 个)", capacity))
            } else {
                HalError::ResourceBusy("上一个任务尚未 wait, 槽位 0 不可复用".into())
            }
        })
    }

    /// 检查任务持有的槽位处于 `expected` 阶段且归属该任务
    fn owned_slot(active: &Active, task: &HalTask, expected: SlotStage) -> HalResult<usize> {
        let idx = task
            .reg_slot
            .ok_or_else(|| HalError::InvalidState(format!("任务 {} 尚未生成寄存器", task.id)))?;
        let slot = active.slots.get(idx).ok_or_else(|| {
            HalError::InvalidState(format!("任务 {} 的槽位 {} 不存在", task.id, idx))
        })?;
        if !slot.is_valid() || slot.data.task_id != Some(task.id) {
            return Err(HalError::InvalidState(format!(
                "槽位 {} 不属于任务 {} (当前 {:?})",
                idx, task.id, slot.data.task_id
            )));
        }
        if slot.stage() != expected {
            return Err(HalError::InvalidState(format!(
                "任务 {} 的槽位 {} 处于 {:?}, 需要 {:?}",
                task.id,
                idx,
                slot.stage(),
                expected
            )));
        }
        Ok(idx)
    }

    /// 准备辅助缓冲区并构建寄存器镜像
    fn prepare(
        active: &mut Active,
        idx: usize,
        task: &HalTask,
        syntax: &H264Syntax,
    ) -> HalResult<()> {
        let sps = &syntax.pic.sps;
        let rcb_input = RcbInput {
            width: sps.width as usize,
            height: sps.height as usize,
            bit_depth: sps.bit_depth_luma,
            chroma_format_idc: sps.chroma_format_idc,
            field_coding: sps.field_coding(),
            fbc: active.fbc,
        };
        if active.rcb.ensure(active.allocator.as_mut(), &rcb_input)? {
            debug!("{}: RCB 缓冲区 {} 字节", HAL_NAME, active.rcb.size());
        }
        let mv_size = colmv_size(sps.width as usize, sps.height as usize, sps.field_coding());
        active.colmv.ensure_capacity(
            active.allocator.as_mut(),
            active.frames.slot_count(),
            mv_size,
        )?;

        let refs = ReferencePictureResolver::<MAX_REF_FRAMES>::resolve(
            &syntax.pic,
            active.frames.as_ref(),
        );
        let scratch = active
            .scratch
            .as_mut()
            .ok_or_else(|| HalError::InvalidState("暂存缓冲区未分配".into()))?;
        let cache = active
            .param_caches
            .get_mut(idx)
            .ok_or_else(|| HalError::Internal(format!("参数集缓存索引越界: {}", idx)))?;
        let slot = active
            .slots
            .data_mut(idx)
            .ok_or_else(|| HalError::Internal(format!("槽位索引越界: {}", idx)))?;

        let ctx = BuildContext {
            syntax,
            refs: &refs,
            frames: active.frames.as_ref(),
            stream: task.input,
            stream_len: task.stream_len,
            output_slot: task.output_slot,
            region: active.layout.region(idx),
            colmv: &active.colmv,
            rcb: &active.rcb,
            fbc: active.fbc,
            full_param_set: active.config.fast_mode,
        };
        let full = RegisterBuilder::build(&ctx, &mut slot.image, &mut slot.offsets, scratch, cache)?;
        slot.rcb_entries = RcbSizer::device_entries(active.rcb.info());
        slot.task_id = Some(task.id);
        active.allocator.sync_for_device(scratch)?;
        debug!(
            "{}: 任务 {} 使用槽位 {}, 参数集{}",
            HAL_NAME,
            task.id,
            idx,
            if full { "完整序列化" } else { "复用" }
        );
        Ok(())
    }

    /// 把寄存器写入设备并发出开始命令
    fn submit(active: &mut Active, idx: usize) -> HalResult<()> {
        let slot = active
            .slots
            .get(idx)
            .ok_or_else(|| HalError::Internal(format!("槽位索引越界: {}", idx)))?;
        let data = &slot.data;
        for section in &WRITE_SECTIONS {
            active
                .device
                .reg_write(section.offset() as u32, data.image.section(section))?;
        }
        active.device.set_reg_offsets(&data.offsets)?;
        active.device.set_rcb_info(&data.rcb_entries)?;
        active.device.cmd_send()
    }

    /// 阻塞等待完成并回读状态段
    fn poll(active: &mut Active, idx: usize) -> HalResult<()> {
        active.device.cmd_poll()?;
        let slot = active
            .slots
            .data_mut(idx)
            .ok_or_else(|| HalError::Internal(format!("槽位索引越界: {}", idx)))?;
        let status = slot.image.section_mut(&SEC_IRQ_STATUS);
        active
            .device
            .reg_read(SEC_IRQ_STATUS.offset() as u32, status)
    }

    fn notify(active: &mut Active, report: &DecodeReport) {
        if let Some(callback) = active.callback.as_mut() {
            callback(report);
        }
    }

    /// 切换 FBC 输出, 变化时 RCB 需要重新计算
    fn set_fbc(active: &mut Active, fbc: bool) {
        if active.fbc != fbc {
            active.fbc = fbc;
            active.rcb.invalidate();
            debug!("{}: FBC 输出 {}", HAL_NAME, if fbc { "开启" } else { "关闭" });
        }
    }
}

impl Default for H264Hal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for H264Hal {
    fn drop(&mut self) {
        if let Err(e) = self.deinit() {
            warn!("{}: 释放资源失败: {}", HAL_NAME, e);
        }
    }
}

impl DecoderHal for H264Hal {
    fn name(&self) -> &str {
        HAL_NAME
    }

    fn codec_id(&self) -> CodecId {
        CodecId::H264
    }

    fn init(&mut self, config: &HalConfig, resources: HalResources) -> HalResult<HwCapability> {
        config.validate()?;
        if self.active.is_some() {
            self.deinit()?;
        }

        let slot_count = config.slot_count();
        let slots = PipelineSlotPool::new(slot_count, |_| {
            let mut image = RegisterImage::new(REG_COUNT);
            RegisterBuilder::init_common(&mut image, config);
            SlotData {
                image,
                offsets: RegOffsetTable::new(),
                rcb_entries: Vec::new(),
                task_id: None,
            }
        });
        let active = self.active.insert(Active {
            config: config.clone(),
            device: resources.device,
            allocator: resources.allocator,
            frames: resources.frames,
            callback: resources.callback,
            layout: ScratchLayout::new(SCRATCH_SIZES, slot_count),
            scratch: None,
            slots,
            param_caches: vec![ParamSetCache::default(); slot_count],
            rcb: RcbBufferCache::new(regs::rcb_regs()),
            colmv: ColMvPool::new(),
            fbc: false,
        });

        if let Err(e) = Self::alloc_scratch(active) {
            warn!("{}: 初始化失败: {}", HAL_NAME, e);
            self.deinit()?;
            return Err(e);
        }

        debug!(
            "{}: 初始化完成, fast_mode={}, 槽位 {}",
            HAL_NAME, config.fast_mode, slot_count
        );
        Ok(HwCapability {
            name: HAL_NAME.into(),
            codec: CodecId::H264,
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
            reg_bytes: REG_COUNT * vhal_core::regfield::REG_BYTES,
            fbc_support: true,
            fast_mode: config.fast_mode,
            pipeline_depth: slot_count,
            ref_slots: MAX_REF_FRAMES,
        })
    }

    fn deinit(&mut self) -> HalResult<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        if let Some(scratch) = active.scratch.take() {
            active.allocator.release(scratch);
        }
        active.rcb.release(active.allocator.as_mut());
        active.colmv.release_all(active.allocator.as_mut());
        if active.slots.in_use() > 0 {
            warn!(
                "{}: 释放时仍有 {} 个任务在途",
                HAL_NAME,
                active.slots.in_use()
            );
        }
        debug!("{}: 资源已释放", HAL_NAME);
        Ok(())
    }

    fn gen_regs(&mut self, task: &mut HalTask) -> HalResult<()> {
        let active = self.active_mut()?;
        if task.flags.has_error() {
            task.reg_slot = None;
            debug!(
                "{}: 任务 {} 带上游错误标志 {:?}, 跳过寄存器生成",
                HAL_NAME, task.id, task.flags
            );
            return Ok(());
        }
        if let Some(held) = task.reg_slot {
            let owned = active
                .slots
                .get(held)
                .is_some_and(|slot| slot.is_valid() && slot.data.task_id == Some(task.id));
            if owned {
                return Err(HalError::InvalidState(format!(
                    "任务 {} 已持有槽位 {}, 需先 wait",
                    task.id, held
                )));
            }
        }
        let PictureSyntax::H264(syntax) = &task.syntax;

        let idx = Self::acquire_slot(active)?;
        if let Err(e) = Self::prepare(active, idx, task, syntax) {
            Self::release_slot(active, idx);
            return Err(e);
        }
        active.slots.set_stage(idx, SlotStage::RegsBuilt);
        task.reg_slot = Some(idx);
        Ok(())
    }

    fn start(&mut self, task: &HalTask) -> HalResult<()> {
        let active = self.active_mut()?;
        if task.flags.has_error() {
            debug!("{}: 任务 {} 带错误标志, 不提交硬件", HAL_NAME, task.id);
            return Ok(());
        }
        let idx = Self::owned_slot(active, task, SlotStage::RegsBuilt)?;

        if let Err(e) = Self::submit(active, idx) {
            warn!("{}: 任务 {} 提交失败: {}", HAL_NAME, task.id, e);
            Self::release_slot(active, idx);
            return Err(e);
        }
        active.slots.set_stage(idx, SlotStage::Submitted);
        Ok(())
    }

    fn wait(&mut self, task: &HalTask) -> HalResult<()> {
        let active = self.active_mut()?;
        if task.flags.has_error() {
            let report = DecodeReport {
                task_id: task.id,
                output_slot: task.output_slot,
                hard_err: true,
                skipped: true,
                status: 0,
                regs: Bytes::new(),
            };
            Self::notify(active, &report);
            return Ok(());
        }
        let idx = Self::owned_slot(active, task, SlotStage::Submitted)?;

        let result = Self::poll(active, idx);
        let slot = active
            .slots
            .data_mut(idx)
            .ok_or_else(|| HalError::Internal(format!("槽位索引越界: {}", idx)))?;
        let status = slot.image.get(IRQ_STATUS);
        let hard_err = match &result {
            Ok(()) => {
                let hw = HwStatus::classify(slot.image.as_bytes());
                if hw.hard_err() {
                    warn!(
                        "{}: 任务 {} 硬件错误: status={:#x} {:?}",
                        HAL_NAME, task.id, status, hw
                    );
                }
                hw.hard_err()
            }
            Err(e) => {
                warn!("{}: 任务 {} 轮询失败: {}", HAL_NAME, task.id, e);
                true
            }
        };
        let report = DecodeReport {
            task_id: task.id,
            output_slot: task.output_slot,
            hard_err,
            skipped: false,
            status,
            regs: slot.image.snapshot(),
        };
        // 只清主状态字
        slot.image.set(IRQ_STATUS, 0);

        Self::notify(active, &report);
        Self::release_slot(active, idx);
        result
    }

    fn reset(&mut self) -> HalResult<()> {
        debug!("{}: reset", HAL_NAME);
        Ok(())
    }

    fn flush(&mut self) -> HalResult<()> {
        debug!("{}: flush", HAL_NAME);
        Ok(())
    }

    fn control(&mut self, cmd: &ControlCommand) -> HalResult<()> {
        let active = self.active_mut()?;
        match cmd {
            ControlCommand::SetFrameInfo(info) => {
                let align = if info.width > STRIDE_256_ODD_WIDTH
                    || info.height > STRIDE_256_ODD_HEIGHT
                {
                    StrideAlign::Align256Odd
                } else {
                    StrideAlign::Align16
                };
                active.frames.set_stride_align(align);
                Self::set_fbc(active, info.fbc);
                debug!(
                    "{}: 输出 {}x{} {}, 步长对齐 {:?}",
                    HAL_NAME, info.width, info.height, info.format, align
                );
            }
            ControlCommand::SetOutputFormat { format, fbc } => {
                Self::set_fbc(active, *fbc);
                debug!("{}: 输出格式 {}", HAL_NAME, format);
            }
            ControlCommand::Other { id, .. } => {
                debug!("{}: 忽略控制命令 {:#x}", HAL_NAME, id);
            }
        }
        Ok(())
    }
}
