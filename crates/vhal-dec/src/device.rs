//! 设备控制接口.
//!
//! 加速器通过通用的设备控制接口访问, 协议为固定偏移的二进制读写:
//! - `REG_WRITE` / `REG_READ`: 按字节偏移写入/读取寄存器段
//! - `RCB_INFO`: 按大小降序提交 RCB 缓冲类表
//! - `REG_OFFSET_PATCH`: 对位宽不足以容纳字节偏移的地址寄存器, 通过旁路表补充偏移
//! - `CMD_SEND` / `CMD_POLL`: 启动处理与阻塞等待完成
//!
//! 真正的系统调用边界由实现方负责, 本 crate 只定义数据契约.

use byteorder::{ByteOrder, LittleEndian};
use vhal_core::{HalError, HalResult};

/// 寄存器偏移补丁表的魔数 ("REOF")
pub const REG_OFFSET_MAGIC: u32 = 0x5245_4f46;

/// 寄存器偏移补丁表容量
pub const REG_OFFSET_MAX: usize = 16;

/// RCB 缓冲类信息表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcbInfoEntry {
    /// 该类 RCB 地址寄存器的索引
    pub reg: u32,
    /// 缓冲大小 (字节)
    pub size: u32,
}

/// 寄存器偏移补丁
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegOffset {
    /// 地址寄存器索引
    pub reg: u32,
    /// 相对于该寄存器中句柄所指缓冲区的字节偏移
    pub offset: u32,
}

/// 寄存器偏移补丁表
///
/// 地址寄存器只存放缓冲区句柄, 子区域偏移记录在这里, 随寄存器一起提交给设备.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegOffsetTable {
    entries: Vec<RegOffset>,
}

impl RegOffsetTable {
    /// 创建空表
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(REG_OFFSET_MAX),
        }
    }

    /// 清空
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 记录一个偏移补丁
    ///
    /// 偏移为 0 时无需补丁, 直接忽略; 同一寄存器重复记录时覆盖旧值.
    pub fn push(&mut self, reg: usize, offset: usize) -> HalResult<()> {
        if offset == 0 {
            return Ok(());
        }
        let reg = u32::try_from(reg)
            .map_err(|_| HalError::InvalidArgument(format!("寄存器索引过大: {}", reg)))?;
        let offset = u32::try_from(offset)
            .map_err(|_| HalError::InvalidArgument(format!("寄存器偏移过大: {}", offset)))?;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.reg == reg) {
            entry.offset = offset;
            return Ok(());
        }
        if self.entries.len() >= REG_OFFSET_MAX {
            return Err(HalError::InvalidArgument(format!(
                "寄存器偏移补丁表已满 ({} 项), reg={}",
                REG_OFFSET_MAX, reg
            )));
        }
        self.entries.push(RegOffset { reg, offset });
        Ok(())
    }

    /// 全部表项
    pub fn entries(&self) -> &[RegOffset] {
        &self.entries
    }

    /// 查询某寄存器的偏移
    pub fn offset_of(&self, reg: usize) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.reg as usize == reg)
            .map(|e| e.offset)
    }

    /// 表项数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 序列化为设备协议格式: magic, count, 然后每项 (reg, offset), 均为 32 位小端
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; 8 + self.entries.len() * 8];
        LittleEndian::write_u32(&mut out[0..4], REG_OFFSET_MAGIC);
        LittleEndian::write_u32(&mut out[4..8], self.entries.len() as u32);
        for (chunk, entry) in out[8..].chunks_exact_mut(8).zip(&self.entries) {
            LittleEndian::write_u32(&mut chunk[0..4], entry.reg);
            LittleEndian::write_u32(&mut chunk[4..8], entry.offset);
        }
        out
    }
}

/// 设备控制接口
///
/// 每个 HAL 实例独占一个实现, 调用均为同步阻塞.
pub trait Device: Send {
    /// 从 `offset` 开始写入寄存器段
    fn reg_write(&mut self, offset: u32, data: &[u8]) -> HalResult<()>;

    /// 从 `offset` 开始读取寄存器段到 `out`
    fn reg_read(&mut self, offset: u32, out: &mut [u8]) -> HalResult<()>;

    /// 提交 RCB 缓冲类表 (已按大小降序排列, 不含零大小项)
    fn set_rcb_info(&mut self, entries: &[RcbInfoEntry]) -> HalResult<()>;

    /// 提交寄存器偏移补丁表
    fn set_reg_offsets(&mut self, table: &RegOffsetTable) -> HalResult<()>;

    /// 发出 "开始处理" 命令
    fn cmd_send(&mut self) -> HalResult<()>;

    /// 阻塞等待当前最早提交的任务完成
    fn cmd_poll(&mut self) -> HalResult<()>;
}
