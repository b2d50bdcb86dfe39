//! 比特流写入器.
//!
//! 向 64 位字缓冲区按位写入数据, 用于把语法元素序列化为硬件直接读取的参数块.
//!
//! 位序为大端 (MSB first): 第一个写入的位落在第 0 个字的 bit 63.
//! 缓冲区容量在构造时固定, 超出容量的写入被静默丢弃, 并置位 `truncated` 标志.

use log::warn;

/// 取低 `n` 位的掩码 (n 可为 64)
#[inline]
const fn low_mask(n: u32) -> u64 {
    if n >= 64 { u64::MAX } else { (1u64 << n) - 1 }
}

/// 比特流写入器
///
/// 写入目标是调用方提供的 `u64` 字切片, 写入器只负责游标与拼接.
///
/// # 示例
/// ```
/// use vhal_core::bitwriter::BitWriter;
///
/// let mut words = [0u64; 2];
/// let mut bw = BitWriter::new(&mut words);
/// bw.put_bits(0b1011, 4);
/// bw.put_bits(0xff, 8);
/// assert_eq!(bw.bits_written(), 12);
/// assert_eq!(words[0] >> 52, 0b1011_1111_1111);
/// ```
pub struct BitWriter<'a> {
    /// 输出字缓冲区
    words: &'a mut [u64],
    /// 可写字数 (不超过 `words.len()`)
    capacity: usize,
    /// 当前字索引
    index: usize,
    /// 当前字中已填充的位数 (0-63)
    bit_pos: u32,
    /// 是否发生过越界丢弃
    truncated: bool,
}

impl<'a> BitWriter<'a> {
    /// 以整个切片为容量创建写入器
    pub fn new(words: &'a mut [u64]) -> Self {
        let capacity = words.len();
        Self::with_capacity(words, capacity)
    }

    /// 以声明容量 (字数) 创建写入器, 并清零缓冲区
    ///
    /// 声明容量大于切片长度时取切片长度.
    pub fn with_capacity(words: &'a mut [u64], word_capacity: usize) -> Self {
        let capacity = word_capacity.min(words.len());
        let mut bw = Self {
            words,
            capacity,
            index: 0,
            bit_pos: 0,
            truncated: false,
        };
        bw.reset();
        bw
    }

    /// 在已有内容的 `bit_offset` 处继续写入
    ///
    /// 保留偏移之前的位, 清零之后的位. 用于复用上次序列化的固定头部.
    pub fn resume(words: &'a mut [u64], bit_offset: usize) -> Self {
        let capacity = words.len();
        let mut bw = Self {
            words,
            capacity,
            index: 0,
            bit_pos: 0,
            truncated: false,
        };
        bw.seek(bit_offset);
        bw
    }

    /// 清零缓冲区并回到起点
    pub fn reset(&mut self) {
        self.words[..self.capacity].fill(0);
        self.index = 0;
        self.bit_pos = 0;
        self.truncated = false;
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.index * 64 + self.bit_pos as usize
    }

    /// 获取已触及的字数 (包含未写满的当前字)
    pub fn words_used(&self) -> usize {
        (self.index + usize::from(self.bit_pos > 0)).min(self.capacity)
    }

    /// 声明容量 (字数)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 是否有写入因超出容量被丢弃
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// 写入 `value` 的低 `width` 位 (最多 64 位), 高位在前
    ///
    /// 当 `width + 当前位偏移 >= 64` 时跨越当前字与下一个字.
    /// 游标已到达容量末尾时写入被丢弃.
    pub fn put_bits(&mut self, value: u64, width: u32) {
        debug_assert!(width <= 64, "put_bits: width={} 超过 64 位", width);
        let width = width.min(64);
        if width == 0 {
            return;
        }
        if self.index >= self.capacity {
            self.mark_truncated();
            return;
        }

        let value = value & low_mask(width);
        let available = 64 - self.bit_pos;

        if width < available {
            self.words[self.index] |= value << (available - width);
            self.bit_pos += width;
            return;
        }

        // 填满当前字, 余下部分写入下一个字的高位
        let rest = width - available;
        self.words[self.index] |= value >> rest;
        self.index += 1;
        self.bit_pos = 0;
        if rest == 0 {
            return;
        }
        if self.index >= self.capacity {
            self.mark_truncated();
            return;
        }
        self.words[self.index] |= (value & low_mask(rest)) << (64 - rest);
        self.bit_pos = rest;
    }

    /// 以 `fill` (0 或 1) 填充, 直到总位数为 `align_bits` 的整数倍
    ///
    /// 已对齐时为空操作.
    pub fn put_align(&mut self, align_bits: u32, fill: u32) {
        if align_bits == 0 {
            return;
        }
        let align = align_bits as usize;
        let mut pad = (align - self.bits_written() % align) % align;
        let pattern = if fill & 1 == 1 { u64::MAX } else { 0 };
        while pad > 0 {
            let chunk = pad.min(64) as u32;
            self.put_bits(pattern, chunk);
            if self.truncated {
                return;
            }
            pad -= chunk as usize;
        }
    }

    /// 将游标移动到 `bit_offset`, 保留其之前的内容, 清零其之后的内容
    ///
    /// 用于复用已序列化的固定头部, 只重写其后的可变部分.
    pub fn seek(&mut self, bit_offset: usize) {
        let index = bit_offset / 64;
        let bit_pos = (bit_offset % 64) as u32;
        if index >= self.capacity {
            self.index = self.capacity;
            self.bit_pos = 0;
            return;
        }
        self.index = index;
        self.bit_pos = bit_pos;
        let keep = if bit_pos == 0 { 0 } else { !low_mask(64 - bit_pos) };
        self.words[index] &= keep;
        self.words[index + 1..self.capacity].fill(0);
    }

    fn mark_truncated(&mut self) {
        if !self.truncated {
            warn!(
                "BitWriter: 超出容量 {} 字, 后续写入被丢弃",
                self.capacity
            );
        }
        self.truncated = true;
    }
}

/// 把字缓冲区按小端字节序展开为字节流 (硬件按 64 位小端字读取)
pub fn words_to_le_bytes(words: &[u64], out: &mut [u8]) {
    for (chunk, word) in out.chunks_mut(8).zip(words) {
        let bytes = word.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_put_bits_basic() {
        let mut words = [0u64; 1];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0b1011, 4);
        bw.put_bits(0b0001, 4);
        assert_eq!(bw.bits_written(), 8);
        assert_eq!(words[0], 0b1011_0001u64 << 56);
    }

    #[test]
    fn test_put_bits_cross_word() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0, 60);
        bw.put_bits(0xabc, 12);
        assert_eq!(bw.bits_written(), 72);
        assert_eq!(bw.words_used(), 2);
        // 高 4 位落在第 0 字末尾, 低 8 位落在第 1 字开头
        assert_eq!(words[0] & 0xf, 0xa);
        assert_eq!(words[1] >> 56, 0xbc);
    }

    #[test]
    fn test_put_bits_exact_word_boundary() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(1, 32);
        bw.put_bits(0xffff_ffff, 32);
        assert_eq!(bw.bits_written(), 64);
        bw.put_bits(1, 1);
        assert_eq!(words[0], 0x0000_0001_ffff_ffff);
        assert_eq!(words[1], 1u64 << 63);
    }

    #[test]
    fn test_put_bits_full_word() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0b1, 1);
        bw.put_bits(u64::MAX, 64);
        assert_eq!(words[0], u64::MAX);
        assert_eq!(words[1], 1u64 << 63);
    }

    #[test]
    fn test_put_bits_value_truncated_to_width() {
        let mut words = [0u64; 1];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0xff, 4);
        assert_eq!(words[0] >> 60, 0xf);
        assert_eq!(words[0] << 4, 0);
    }

    #[test]
    fn test_roundtrip_all_widths() {
        for width in 1..64u32 {
            let value = 0x9e37_79b9_7f4a_7c15u64 & low_mask(width);
            let mut words = [0u64; 4];
            let mut bw = BitWriter::new(&mut words);
            // 先写入奇数个位, 使目标字段跨越字边界
            bw.put_bits(0b101, 3);
            bw.put_bits(value, width);
            bw.put_bits(0b11, 2);

            let mut br = BitReader::new(&words);
            assert_eq!(br.read_bits(3).unwrap(), 0b101);
            assert_eq!(br.read_bits(width).unwrap(), value, "width={} 往返失败", width);
            assert_eq!(br.read_bits(2).unwrap(), 0b11);
        }
    }

    #[test]
    fn test_put_align_idempotent() {
        let mut words = [0u64; 4];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0b1, 5);
        bw.put_align(128, 0);
        assert_eq!(bw.bits_written(), 128);
        bw.put_align(128, 0);
        assert_eq!(bw.bits_written(), 128, "已对齐时第二次对齐应为空操作");
    }

    #[test]
    fn test_put_align_fill_ones() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0, 4);
        bw.put_align(8, 1);
        assert_eq!(bw.bits_written(), 8);
        assert_eq!(words[0] >> 56, 0x0f);
    }

    #[test]
    fn test_overflow_is_dropped() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::with_capacity(&mut words, 1);
        bw.put_bits(u64::MAX, 64);
        assert!(!bw.truncated());
        bw.put_bits(0x7f, 7);
        assert!(bw.truncated());
        assert_eq!(bw.bits_written(), 64);
        assert_eq!(words[1], 0, "超出声明容量的字不应被写入");
    }

    #[test]
    fn test_seek_keeps_header() {
        let mut words = [0u64; 2];
        let mut bw = BitWriter::new(&mut words);
        bw.put_bits(0xabc, 12);
        bw.put_bits(0xfff, 12);
        bw.put_bits(u64::MAX, 64);
        bw.seek(12);
        assert_eq!(bw.bits_written(), 12);
        bw.put_bits(0x5, 4);
        assert_eq!(words[0] >> 48, 0xabc5);
        assert_eq!(words[0] & low_mask(48), 0);
        assert_eq!(words[1], 0);
    }

    #[test]
    fn test_resume_after_header() {
        let mut words = [0u64; 2];
        {
            let mut bw = BitWriter::new(&mut words);
            bw.put_bits(0x3ff, 10);
            bw.put_bits(0xffff, 16);
        }
        let mut bw = BitWriter::resume(&mut words, 10);
        assert_eq!(bw.bits_written(), 10);
        bw.put_bits(0x1, 2);
        assert_eq!(words[0] >> 52, 0xffd);
        assert_eq!(words[0] & low_mask(52), 0);
    }

    #[test]
    fn test_words_to_le_bytes() {
        let words = [0x0102_0304_0506_0708u64];
        let mut out = [0u8; 8];
        words_to_le_bytes(&words, &mut out);
        assert_eq!(out, [8, 7, 6, 5, 4, 3, 2, 1]);
    }
}
