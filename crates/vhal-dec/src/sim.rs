//! 软件模拟的外部协作者.
//!
//! - [`SimDevice`]: 记录每一次设备边界操作, 模拟寄存器文件与任务完成状态
//! - [`SimAllocator`]: 发放缓冲区句柄, 统计在用缓冲, 可注入分配失败
//! - [`SimFrameSlots`]: 按当前对齐策略报告帧缓冲几何的帧槽位服务
//!
//! 三者均为 `Arc<Mutex<..>>` 共享状态的句柄, clone 后交给 HAL,
//! 调用方保留另一份用于检查与注入.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vhal_core::align_up;
use vhal_core::regfield::{read_reg, write_reg};
use vhal_core::{FrameFormat, HalError, HalResult};

use crate::buffer::{
    BufferAllocator, BufferHandle, DeviceBuffer, FrameBufferInfo, FrameSlots, StrideAlign,
};
use crate::device::{Device, RcbInfoEntry, RegOffset, RegOffsetTable};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 模拟寄存器空间大小 (字节)
pub const SIM_REG_SPACE: usize = 4096;

/// 设备边界操作记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    RegWrite { offset: u32, len: usize },
    RegRead { offset: u32, len: usize },
    RcbInfo(Vec<RcbInfoEntry>),
    RegOffsets(Vec<RegOffset>),
    CmdSend,
    CmdPoll,
}

/// 任务完成时设备写回的 `(寄存器索引, 值)` 列表
pub type Completion = Vec<(usize, u32)>;

#[derive(Debug)]
struct DeviceState {
    regs: Vec<u8>,
    ops: Vec<DeviceOp>,
    default_completion: Completion,
    scripted: VecDeque<Completion>,
    in_flight: VecDeque<Completion>,
    fail_poll: bool,
}

/// 模拟设备
#[derive(Debug, Clone)]
pub struct SimDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    /// 创建模拟设备, 未编排的任务完成时写回 `default_completion`
    pub fn new(default_completion: Completion) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                regs: vec![0; SIM_REG_SPACE],
                ops: Vec::new(),
                default_completion,
                scripted: VecDeque::new(),
                in_flight: VecDeque::new(),
                fail_poll: false,
            })),
        }
    }

    /// 为下一个提交的任务编排完成状态 (按提交顺序消费)
    pub fn push_completion(&self, completion: Completion) {
        lock(&self.state).scripted.push_back(completion);
    }

    /// 注入轮询失败
    pub fn set_fail_poll(&self, fail: bool) {
        lock(&self.state).fail_poll = fail;
    }

    /// 全部操作记录
    pub fn ops(&self) -> Vec<DeviceOp> {
        lock(&self.state).ops.clone()
    }

    /// 清空操作记录
    pub fn clear_ops(&self) {
        lock(&self.state).ops.clear();
    }

    /// 满足条件的操作数
    pub fn count_ops(&self, pred: impl Fn(&DeviceOp) -> bool) -> usize {
        lock(&self.state).ops.iter().filter(|op| pred(op)).count()
    }

    /// 寄存器写入次数
    pub fn write_count(&self) -> usize {
        self.count_ops(|op| matches!(op, DeviceOp::RegWrite { .. }))
    }

    /// 轮询次数
    pub fn poll_count(&self) -> usize {
        self.count_ops(|op| matches!(op, DeviceOp::CmdPoll))
    }

    /// 已提交未完成的任务数
    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// 读取模拟寄存器
    pub fn reg(&self, reg: usize) -> u32 {
        read_reg(&lock(&self.state).regs, reg)
    }

    fn check_range(offset: u32, len: usize) -> HalResult<std::ops::Range<usize>> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= SIM_REG_SPACE => Ok(start..end),
            _ => Err(HalError::DeviceIo(format!(
                "寄存器访问越界: offset={:#x}, len={}",
                offset, len
            ))),
        }
    }
}

impl Device for SimDevice {
    fn reg_write(&mut self, offset: u32, data: &[u8]) -> HalResult<()> {
        let range = Self::check_range(offset, data.len())?;
        let mut state = lock(&self.state);
        state.regs[range].copy_from_slice(data);
        state.ops.push(DeviceOp::RegWrite {
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn reg_read(&mut self, offset: u32, out: &mut [u8]) -> HalResult<()> {
        let range = Self::check_range(offset, out.len())?;
        let mut state = lock(&self.state);
        out.copy_from_slice(&state.regs[range]);
        state.ops.push(DeviceOp::RegRead {
            offset,
            len: out.len(),
        });
        Ok(())
    }

    fn set_rcb_info(&mut self, entries: &[RcbInfoEntry]) -> HalResult<()> {
        lock(&self.state).ops.push(DeviceOp::RcbInfo(entries.to_vec()));
        Ok(())
    }

    fn set_reg_offsets(&mut self, table: &RegOffsetTable) -> HalResult<()> {
        lock(&self.state)
            .ops
            .push(DeviceOp::RegOffsets(table.entries().to_vec()));
        Ok(())
    }

    fn cmd_send(&mut self) -> HalResult<()> {
        let mut state = lock(&self.state);
        let completion = match state.scripted.pop_front() {
            Some(c) => c,
            None => state.default_completion.clone(),
        };
        state.in_flight.push_back(completion);
        state.ops.push(DeviceOp::CmdSend);
        Ok(())
    }

    fn cmd_poll(&mut self) -> HalResult<()> {
        let mut state = lock(&self.state);
        state.ops.push(DeviceOp::CmdPoll);
        if state.fail_poll {
            return Err(HalError::DeviceIo("轮询失败 (注入)".into()));
        }
        let completion = state
            .in_flight
            .pop_front()
            .ok_or_else(|| HalError::DeviceIo("没有在途任务可轮询".into()))?;
        for (reg, value) in completion {
            write_reg(&mut state.regs, reg, value);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AllocState {
    next_handle: i32,
    live: Vec<(i32, usize)>,
    sizes: Vec<usize>,
    fail_after: Option<usize>,
}

/// 模拟缓冲区分配器
#[derive(Debug, Clone)]
pub struct SimAllocator {
    state: Arc<Mutex<AllocState>>,
}

impl SimAllocator {
    /// 句柄从 10 开始发放
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AllocState {
                next_handle: 10,
                ..Default::default()
            })),
        }
    }

    /// 累计成功分配 `n` 次后, 后续分配全部失败
    pub fn fail_after(&self, n: usize) {
        lock(&self.state).fail_after = Some(n);
    }

    /// 取消失败注入
    pub fn clear_failure(&self) {
        lock(&self.state).fail_after = None;
    }

    /// 累计成功分配次数
    pub fn alloc_count(&self) -> usize {
        lock(&self.state).sizes.len()
    }

    /// 每次成功分配的大小 (按时间顺序)
    pub fn alloc_sizes(&self) -> Vec<usize> {
        lock(&self.state).sizes.clone()
    }

    /// 在用缓冲数
    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// 在用缓冲总字节数
    pub fn live_bytes(&self) -> usize {
        lock(&self.state).live.iter().map(|(_, size)| size).sum()
    }
}

impl Default for SimAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferAllocator for SimAllocator {
    fn alloc(&mut self, size: usize) -> HalResult<DeviceBuffer> {
        let mut state = lock(&self.state);
        if state.fail_after.is_some_and(|n| state.sizes.len() >= n) {
            return Err(HalError::AllocationFailure(format!(
                "模拟分配失败: {} 字节",
                size
            )));
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.live.push((handle, size));
        state.sizes.push(size);
        Ok(DeviceBuffer::new(BufferHandle(handle), size))
    }

    fn release(&mut self, buffer: DeviceBuffer) {
        let handle = buffer.handle().0;
        lock(&self.state).live.retain(|(h, _)| *h != handle);
    }
}

#[derive(Debug)]
struct FrameState {
    errors: Vec<bool>,
    width: u32,
    height: u32,
    format: FrameFormat,
    fbc: bool,
    stride_align: StrideAlign,
}

/// 模拟帧槽位服务
#[derive(Debug, Clone)]
pub struct SimFrameSlots {
    state: Arc<Mutex<FrameState>>,
}

impl SimFrameSlots {
    /// 句柄基数, 槽位 `i` 的帧缓冲句柄为 `FRAME_HANDLE_BASE + i`
    pub const FRAME_HANDLE_BASE: i32 = 1000;

    pub fn new(slot_count: usize, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            state: Arc::new(Mutex::new(FrameState {
                errors: vec![false; slot_count],
                width,
                height,
                format,
                fbc: false,
                stride_align: StrideAlign::default(),
            })),
        }
    }

    /// 标记槽位帧的错误状态
    pub fn set_error(&self, slot: usize, has_error: bool) {
        if let Some(flag) = lock(&self.state).errors.get_mut(slot) {
            *flag = has_error;
        }
    }

    /// 切换 FBC 输出
    pub fn set_fbc(&self, fbc: bool) {
        lock(&self.state).fbc = fbc;
    }

    /// 当前步长对齐策略
    pub fn stride_align(&self) -> StrideAlign {
        lock(&self.state).stride_align
    }
}

impl FrameSlots for SimFrameSlots {
    fn frame(&self, slot: usize) -> Option<FrameBufferInfo> {
        let state = lock(&self.state);
        let has_error = *state.errors.get(slot)?;
        let row_bytes = state.format.luma_row_bytes(state.width as usize);
        Some(FrameBufferInfo {
            handle: BufferHandle(Self::FRAME_HANDLE_BASE + slot as i32),
            width: state.width,
            height: state.height,
            hor_stride: state.stride_align.apply(row_bytes) as u32,
            ver_stride: align_up(state.height as usize, 16) as u32,
            format: state.format,
            fbc: state.fbc,
            has_error,
        })
    }

    fn slot_count(&self) -> usize {
        lock(&self.state).errors.len()
    }

    fn set_stride_align(&self, align: StrideAlign) {
        lock(&self.state).stride_align = align;
    }
}
