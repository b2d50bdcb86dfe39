//! 输出帧格式定义.
//!
//! 描述加速器写出的解码帧像素排列. 视频解码硬件只输出半平面 (SP) 格式,
//! 10 位格式为紧凑打包 (每 4 个样点 5 字节).

use std::fmt;

use serde::{Deserialize, Serialize};

/// 解码输出帧格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FrameFormat {
    /// YUV 4:2:0 半平面, 8 位
    Nv12,
    /// YUV 4:2:2 半平面, 8 位
    Nv16,
    /// YUV 4:4:4 半平面, 8 位
    Nv24,
    /// YUV 4:2:0 半平面, 10 位紧凑打包
    Nv15,
    /// YUV 4:2:2 半平面, 10 位紧凑打包
    Nv20,
    /// YUV 4:4:4 半平面, 10 位紧凑打包
    Nv30,
    /// 单色 (4:0:0), 8 位
    Gray8,
}

impl FrameFormat {
    /// 由 `chroma_format_idc` 与位深推导输出格式
    ///
    /// 不支持的组合返回 `None`.
    pub const fn from_syntax(chroma_format_idc: u32, bit_depth: u32) -> Option<Self> {
        match (chroma_format_idc, bit_depth) {
            (0, 8) => Some(Self::Gray8),
            (1, 8) => Some(Self::Nv12),
            (2, 8) => Some(Self::Nv16),
            (3, 8) => Some(Self::Nv24),
            (1, 10) => Some(Self::Nv15),
            (2, 10) => Some(Self::Nv20),
            (3, 10) => Some(Self::Nv30),
            _ => None,
        }
    }

    /// 分量位深
    pub const fn bit_depth(&self) -> u32 {
        match self {
            Self::Nv15 | Self::Nv20 | Self::Nv30 => 10,
            _ => 8,
        }
    }

    /// 对应的 `chroma_format_idc`
    pub const fn chroma_format_idc(&self) -> u32 {
        match self {
            Self::Gray8 => 0,
            Self::Nv12 | Self::Nv15 => 1,
            Self::Nv16 | Self::Nv20 => 2,
            Self::Nv24 | Self::Nv30 => 3,
        }
    }

    /// 一行亮度样点占用的字节数 (未对齐)
    pub const fn luma_row_bytes(&self, width: usize) -> usize {
        (width * self.bit_depth() as usize).div_ceil(8)
    }

    /// 色度平面相对亮度平面的大小 (乘以 2 后的比例)
    ///
    /// 4:2:0 为 1 (即 0.5 倍), 4:2:2 为 2, 4:4:4 为 4, 单色为 0.
    pub const fn chroma_ratio_x2(&self) -> usize {
        match self.chroma_format_idc() {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        }
    }

    /// 获取格式名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nv12 => "nv12",
            Self::Nv16 => "nv16",
            Self::Nv24 => "nv24",
            Self::Nv15 => "nv15",
            Self::Nv20 => "nv20",
            Self::Nv30 => "nv30",
            Self::Gray8 => "gray8",
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_syntax() {
        assert_eq!(FrameFormat::from_syntax(1, 8), Some(FrameFormat::Nv12));
        assert_eq!(FrameFormat::from_syntax(2, 10), Some(FrameFormat::Nv20));
        assert_eq!(FrameFormat::from_syntax(1, 12), None);
    }

    #[test]
    fn test_luma_row_bytes() {
        assert_eq!(FrameFormat::Nv12.luma_row_bytes(1920), 1920);
        assert_eq!(FrameFormat::Nv15.luma_row_bytes(1920), 2400);
    }

    #[test]
    fn test_roundtrip_idc() {
        for fmt in [FrameFormat::Nv12, FrameFormat::Nv20, FrameFormat::Nv30] {
            assert_eq!(
                FrameFormat::from_syntax(fmt.chroma_format_idc(), fmt.bit_depth()),
                Some(fmt)
            );
        }
    }
}
