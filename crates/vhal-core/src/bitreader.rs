//! 比特流读取器.
//!
//! 从 64 位字缓冲区中按位读取数据, 位序与 [`BitWriter`](crate::bitwriter::BitWriter) 一致 (MSB first).
//! 用于回读已序列化的参数块, 例如校验或调试转储.

use crate::{HalError, HalResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use vhal_core::bitreader::BitReader;
///
/// let words = [0xb100_0000_0000_0000u64];
/// let mut br = BitReader::new(&words);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    words: &'a [u64],
    /// 当前字索引
    index: usize,
    /// 当前字中已读取的位数 (0-63)
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(words: &'a [u64]) -> Self {
        Self {
            words,
            index: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.index * 64 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.words.len() * 64).saturating_sub(self.bits_read())
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> HalResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits(&mut self, n: u32) -> HalResult<u64> {
        if n == 0 {
            return Ok(0);
        }
        if n > 64 {
            return Err(HalError::InvalidArgument(format!(
                "BitReader: 单次最多读取 64 位, n={}",
                n
            )));
        }
        if self.bits_left() < n as usize {
            return Err(HalError::InvalidArgument(format!(
                "BitReader: 剩余 {} 位, 不足 {} 位",
                self.bits_left(),
                n
            )));
        }

        let available = 64 - self.bit_pos;
        let word = self.words[self.index] << self.bit_pos;
        if n < available {
            self.bit_pos += n;
            return Ok(word >> (64 - n));
        }

        let rest = n - available;
        // 当前字剩余的 available 位作为结果高位
        let high = if available == 64 { word } else { word >> (64 - available) };
        self.index += 1;
        self.bit_pos = 0;
        if rest == 0 {
            return Ok(high);
        }
        let low = self.words[self.index] >> (64 - rest);
        self.bit_pos = rest;
        Ok((high << rest) | low)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> HalResult<()> {
        if self.bits_left() < n {
            return Err(HalError::InvalidArgument(format!(
                "BitReader: 剩余 {} 位, 无法跳过 {} 位",
                self.bits_left(),
                n
            )));
        }
        let pos = self.bits_read() + n;
        self.index = pos / 64;
        self.bit_pos = (pos % 64) as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_across_words() {
        let words = [0x0000_0000_0000_000au64, 0xbc00_0000_0000_0000];
        let mut br = BitReader::new(&words);
        br.skip_bits(60).unwrap();
        assert_eq!(br.read_bits(12).unwrap(), 0xabc);
        assert_eq!(br.bits_read(), 72);
    }

    #[test]
    fn test_read_past_end() {
        let words = [0u64];
        let mut br = BitReader::new(&words);
        assert!(br.read_bits(64).is_ok());
        assert!(br.read_bit().is_err());
    }
}
