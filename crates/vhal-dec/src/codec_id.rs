//! 编解码器标识符.
//!
//! 每个 HAL 实现服务于一种编解码标准, 注册表以此为键查找实现.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CodecId {
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC / MPEG-H Part 2
    H265,
    /// VP9
    Vp9,
    /// AVS2
    Avs2,
    /// AV1 (Alliance for Open Media)
    Av1,
}

impl CodecId {
    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vp9 => "vp9",
            Self::Avs2 => "avs2",
            Self::Av1 => "av1",
        }
    }

    /// 解码引擎模式选择值 (写入公共寄存器 `dec_mode`)
    pub const fn engine_mode(&self) -> u32 {
        match self {
            Self::H265 => 0,
            Self::H264 => 1,
            Self::Vp9 => 2,
            Self::Avs2 => 3,
            Self::Av1 => 4,
        }
    }

    /// 按名称查找
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "h264" | "avc" => Some(Self::H264),
            "hevc" | "h265" => Some(Self::H265),
            "vp9" => Some(Self::Vp9),
            "avs2" => Some(Self::Avs2),
            "av1" => Some(Self::Av1),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
