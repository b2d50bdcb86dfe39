//! 寄存器字段描述符.
//!
//! 硬件寄存器文件是一段平坦的设备可见内存, 每个寄存器为 32 位小端字,
//! 字段是某个寄存器内的一段连续位. 这里用显式的 `(寄存器索引, 起始位, 位宽)`
//! 描述字段, 通过 get/set 访问字节缓冲区, 不依赖任何编译器定义的内存布局,
//! 因而在不同工具链下字节布局完全一致.
//!
//! 位编号约定: bit 0 为寄存器字的最低有效位.

use byteorder::{ByteOrder, LittleEndian};

/// 寄存器字节宽度
pub const REG_BYTES: usize = 4;

/// 寄存器字段描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegField {
    /// 寄存器索引 (以 32 位字计)
    pub reg: usize,
    /// 字段起始位 (0-31)
    pub bit: u32,
    /// 字段位宽 (1-32)
    pub width: u32,
}

impl RegField {
    /// 定义字段, 编译期校验字段不跨越寄存器
    pub const fn new(reg: usize, bit: u32, width: u32) -> Self {
        assert!(width >= 1 && width <= 32, "寄存器字段位宽必须在 1..=32");
        assert!(bit + width <= 32, "寄存器字段不能跨越 32 位寄存器");
        Self { reg, bit, width }
    }

    /// 定义占满整个寄存器的字段
    pub const fn word(reg: usize) -> Self {
        Self::new(reg, 0, 32)
    }

    /// 定义单个位字段
    pub const fn flag(reg: usize, bit: u32) -> Self {
        Self::new(reg, bit, 1)
    }

    /// 字段所在寄存器的字节偏移
    pub const fn byte_offset(&self) -> usize {
        self.reg * REG_BYTES
    }

    /// 字段掩码 (已移位到字段位置)
    pub const fn mask(&self) -> u32 {
        let low = if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        };
        low << self.bit
    }

    /// 从寄存器镜像中读取字段值
    ///
    /// 镜像长度不足时返回 0.
    pub fn get(&self, image: &[u8]) -> u32 {
        let offset = self.byte_offset();
        match image.get(offset..offset + REG_BYTES) {
            Some(bytes) => (LittleEndian::read_u32(bytes) & self.mask()) >> self.bit,
            None => 0,
        }
    }

    /// 向寄存器镜像写入字段值, 超出位宽的高位被截断
    ///
    /// 镜像长度不足时不做任何修改.
    pub fn set(&self, image: &mut [u8], value: u32) {
        let offset = self.byte_offset();
        if let Some(bytes) = image.get_mut(offset..offset + REG_BYTES) {
            let word = LittleEndian::read_u32(bytes);
            let word = (word & !self.mask()) | ((value << self.bit) & self.mask());
            LittleEndian::write_u32(bytes, word);
        }
    }

    /// 写入布尔字段
    pub fn set_flag(&self, image: &mut [u8], value: bool) {
        self.set(image, u32::from(value));
    }
}

/// 读取整个寄存器字
pub fn read_reg(image: &[u8], reg: usize) -> u32 {
    RegField::word(reg).get(image)
}

/// 写入整个寄存器字
pub fn write_reg(image: &mut [u8], reg: usize, value: u32) {
    RegField::word(reg).set(image, value);
}
