//! 流水线槽位池.
//!
//! 快速模式下 HAL 允许多个任务同时在途, 非快速模式只有一个槽位.
//! 每个在途任务独占一个槽位 (寄存器镜像 + 偏移补丁表 + RCB 信息).
//! 槽位在 `gen_regs` 中被占用, 在 `wait` 中释放, 期间不得被其他任务复用.
//!
//! 池本身不加锁; 同一 HAL 实例的 gen_regs/start/wait 由调用方串行化.

/// 槽位所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStage {
    /// 空闲
    #[default]
    Idle,
    /// 寄存器已生成, 尚未提交
    RegsBuilt,
    /// 已提交给硬件, 等待完成
    Submitted,
}

/// 单个流水线槽位
#[derive(Debug)]
pub struct PipelineSlot<T> {
    valid: bool,
    stage: SlotStage,
    /// 槽位负载
    pub data: T,
}

impl<T> PipelineSlot<T> {
    /// 是否被在途任务占用
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 当前阶段
    pub fn stage(&self) -> SlotStage {
        self.stage
    }
}

/// 固定容量的流水线槽位池
#[derive(Debug)]
pub struct PipelineSlotPool<T> {
    slots: Vec<PipelineSlot<T>>,
}

impl<T> PipelineSlotPool<T> {
    /// 创建 `depth` 个槽位, 负载由 `init(索引)` 构造
    pub fn new(depth: usize, mut init: impl FnMut(usize) -> T) -> Self {
        let slots = (0..depth)
            .map(|idx| PipelineSlot {
                valid: false,
                stage: SlotStage::Idle,
                data: init(idx),
            })
            .collect();
        Self { slots }
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 在用槽位数
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.valid).count()
    }

    /// 线性扫描占用第一个空闲槽位, 全部在用时返回 `None`
    pub fn acquire(&mut self) -> Option<usize> {
        let idx = self.slots.iter().position(|s| !s.valid)?;
        let slot = &mut self.slots[idx];
        slot.valid = true;
        slot.stage = SlotStage::Idle;
        Some(idx)
    }

    /// 释放槽位, 返回该槽位此前是否在用
    pub fn release(&mut self, idx: usize) -> bool {
        match self.slots.get_mut(idx) {
            Some(slot) => {
                let was_valid = slot.valid;
                slot.valid = false;
                slot.stage = SlotStage::Idle;
                was_valid
            }
            None => false,
        }
    }

    /// 查询槽位阶段
    pub fn stage(&self, idx: usize) -> Option<SlotStage> {
        self.slots.get(idx).map(|s| s.stage)
    }

    /// 设置槽位阶段
    pub fn set_stage(&mut self, idx: usize, stage: SlotStage) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.stage = stage;
        }
    }

    /// 获取槽位
    pub fn get(&self, idx: usize) -> Option<&PipelineSlot<T>> {
        self.slots.get(idx)
    }

    /// 获取槽位负载 (可写)
    pub fn data_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.slots.get_mut(idx).map(|s| &mut s.data)
    }

    /// 遍历全部槽位负载 (可写)
    pub fn iter_data_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|s| &mut s.data)
    }
}
