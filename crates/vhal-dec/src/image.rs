//! 寄存器镜像.
//!
//! 一块与硬件寄存器文件等长的字节缓冲区, 按功能划分为若干段.
//! 提交时各段分别以字节偏移写入设备, 完成后回读状态段.

use bytes::Bytes;
use vhal_core::RegField;
use vhal_core::regfield::REG_BYTES;

/// 寄存器段描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSection {
    /// 段名 (用于日志与转储)
    pub name: &'static str,
    /// 首个寄存器索引
    pub first_reg: usize,
    /// 寄存器个数
    pub reg_count: usize,
}

impl RegSection {
    /// 定义寄存器段
    pub const fn new(name: &'static str, first_reg: usize, reg_count: usize) -> Self {
        Self {
            name,
            first_reg,
            reg_count,
        }
    }

    /// 段起始字节偏移
    pub const fn offset(&self) -> usize {
        self.first_reg * REG_BYTES
    }

    /// 段字节长度
    pub const fn size(&self) -> usize {
        self.reg_count * REG_BYTES
    }

    /// 段末尾 (不含) 的字节偏移
    pub const fn end(&self) -> usize {
        self.offset() + self.size()
    }

    /// 寄存器是否落在本段内
    pub const fn contains(&self, reg: usize) -> bool {
        reg >= self.first_reg && reg < self.first_reg + self.reg_count
    }
}

/// 寄存器镜像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterImage {
    bytes: Vec<u8>,
}

impl RegisterImage {
    /// 创建 `reg_count` 个寄存器的全零镜像
    pub fn new(reg_count: usize) -> Self {
        Self {
            bytes: vec![0; reg_count * REG_BYTES],
        }
    }

    /// 寄存器个数
    pub fn reg_count(&self) -> usize {
        self.bytes.len() / REG_BYTES
    }

    /// 整个镜像
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 整个镜像 (可写)
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// 读取字段
    pub fn get(&self, field: RegField) -> u32 {
        field.get(&self.bytes)
    }

    /// 写入字段
    pub fn set(&mut self, field: RegField, value: u32) {
        field.set(&mut self.bytes, value);
    }

    /// 写入布尔字段
    pub fn set_flag(&mut self, field: RegField, value: bool) {
        field.set_flag(&mut self.bytes, value);
    }

    /// 某段的字节视图, 超出镜像范围时截断
    pub fn section(&self, section: &RegSection) -> &[u8] {
        let end = section.end().min(self.bytes.len());
        let start = section.offset().min(end);
        &self.bytes[start..end]
    }

    /// 某段的可写字节视图
    pub fn section_mut(&mut self, section: &RegSection) -> &mut [u8] {
        let end = section.end().min(self.bytes.len());
        let start = section.offset().min(end);
        &mut self.bytes[start..end]
    }

    /// 清零某段
    pub fn clear_section(&mut self, section: &RegSection) {
        self.section_mut(section).fill(0);
    }

    /// 拷贝一份不可变快照 (随完成回调交给调用方)
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bytes)
    }
}
