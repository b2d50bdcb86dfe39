//! 解码 HAL trait 定义.
//!
//! 每种 "硬件代际 + 编解码标准" 组合实现一次 [`DecoderHal`], 由注册表在构造时选择.
//!
//! 单个任务的生命周期:
//! 1. `gen_regs()`: 把图像语法映射为寄存器镜像与辅助缓冲区内容
//! 2. `start()`: 把寄存器段写入设备并发出开始命令
//! 3. `wait()`: 阻塞等待完成, 判定硬件状态, 调用完成回调并归还槽位
//!
//! 快速模式下, 调用方可以在 `wait(k)` 之前对任务 k+1 调用 `gen_regs`/`start`,
//! 只要还有空闲流水线槽位.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use vhal_core::{FrameFormat, HalError, HalResult};

use crate::buffer::{BufferAllocator, FrameSlots};
use crate::codec_id::CodecId;
use crate::device::Device;
use crate::task::HalTask;

/// 流水线深度上限
pub const MAX_PIPELINE_DEPTH: usize = 8;

/// HAL 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// 快速模式: 多个任务同时在途
    pub fast_mode: bool,
    /// 流水线深度 (快速模式下的槽位数)
    pub pipeline_depth: usize,
    /// 启用硬件错误隐藏
    pub error_conceal: bool,
    /// 硬件看门狗超时周期数
    pub watchdog_cycles: u32,
    /// 启用时钟门控
    pub clock_gating: bool,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            fast_mode: true,
            pipeline_depth: 3,
            error_conceal: true,
            watchdog_cycles: 0x00ff_ffff,
            clock_gating: true,
        }
    }
}

impl HalConfig {
    /// 校验配置
    pub fn validate(&self) -> HalResult<()> {
        if self.pipeline_depth == 0 || self.pipeline_depth > MAX_PIPELINE_DEPTH {
            return Err(HalError::InvalidArgument(format!(
                "流水线深度必须在 1..={}, 实际为 {}",
                MAX_PIPELINE_DEPTH, self.pipeline_depth
            )));
        }
        Ok(())
    }

    /// 实际使用的流水线槽位数 (非快速模式为 1)
    pub fn slot_count(&self) -> usize {
        if self.fast_mode { self.pipeline_depth } else { 1 }
    }
}

/// 硬件能力信息 (`init` 的返回值)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwCapability {
    /// HAL 名称
    pub name: String,
    /// 编解码标准
    pub codec: CodecId,
    /// 最大宽度
    pub max_width: u32,
    /// 最大高度
    pub max_height: u32,
    /// 寄存器文件字节数
    pub reg_bytes: usize,
    /// 是否支持 FBC 输出
    pub fbc_support: bool,
    pub fast_mode: bool,
    pub pipeline_depth: usize,
    /// 硬件参考帧槽位数
    pub ref_slots: usize,
}

/// 任务完成报告 (交给完成回调)
#[derive(Debug, Clone)]
pub struct DecodeReport {
    /// 任务编号
    pub task_id: u64,
    /// 输出帧槽位
    pub output_slot: usize,
    /// 是否判定为硬件错误 (或任务被上游标记为错误)
    pub hard_err: bool,
    /// 任务被上游标记为错误, 未经过硬件
    pub skipped: bool,
    /// 主状态字原值
    pub status: u32,
    /// 完成时的寄存器镜像快照, 跳过的任务为空
    pub regs: Bytes,
}

/// 完成回调
pub type CompletionCallback = Box<dyn FnMut(&DecodeReport) + Send>;

/// HAL 外部协作者
///
/// 与可序列化的 [`HalConfig`] 分开传入.
pub struct HalResources {
    /// 设备控制接口
    pub device: Box<dyn Device>,
    /// 设备缓冲区分配器
    pub allocator: Box<dyn BufferAllocator>,
    /// 帧槽位服务
    pub frames: Arc<dyn FrameSlots>,
    /// 完成回调 (可选)
    pub callback: Option<CompletionCallback>,
}

/// 输出帧信息 (`SetFrameInfo` 的参数)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub fbc: bool,
}

/// 带外控制命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// 输出帧尺寸/格式变化, HAL 据此切换步长对齐策略
    SetFrameInfo(FrameInfo),
    /// 切换输出格式与 FBC
    SetOutputFormat { format: FrameFormat, fbc: bool },
    /// 其他命令 (不识别的命令被接受并忽略)
    Other { id: u32, param: Vec<u8> },
}

/// 解码 HAL trait
///
/// 所有调用由同一线程串行发起; 若需多线程驱动, 调用方应把整个 HAL 放入互斥锁.
pub trait DecoderHal: Send {
    /// 获取 HAL 名称
    fn name(&self) -> &str;

    /// 获取服务的编解码标准
    fn codec_id(&self) -> CodecId;

    /// 分配内部资源, 初始化各槽位的公共寄存器, 返回硬件能力
    ///
    /// 任一步骤失败时, 已获取的资源全部释放后再返回错误.
    fn init(&mut self, config: &HalConfig, resources: HalResources) -> HalResult<HwCapability>;

    /// 释放全部内部资源, 可重复调用
    fn deinit(&mut self) -> HalResult<()>;

    /// 生成寄存器镜像
    ///
    /// 被上游标记为错误的任务直接返回, 不触碰任何缓冲区.
    /// 任务占用的槽位直到 `wait` 才归还; 已持有槽位的任务再次调用返回
    /// `InvalidState`, 没有空闲槽位时返回 `ResourceBusy`.
    fn gen_regs(&mut self, task: &mut HalTask) -> HalResult<()>;

    /// 提交任务给硬件
    ///
    /// 槽位不属于该任务时返回 `InvalidState`.
    fn start(&mut self, task: &HalTask) -> HalResult<()>;

    /// 等待任务完成
    ///
    /// 无论硬件是否报错, 返回前都会调用一次完成回调.
    fn wait(&mut self, task: &HalTask) -> HalResult<()>;

    /// 复位 (默认无操作)
    fn reset(&mut self) -> HalResult<()> {
        Ok(())
    }

    /// 刷新 (默认无操作)
    fn flush(&mut self) -> HalResult<()> {
        Ok(())
    }

    /// 处理带外控制命令, 不影响在途任务
    fn control(&mut self, cmd: &ControlCommand) -> HalResult<()>;
}
