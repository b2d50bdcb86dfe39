//! HAL 实现模块.

pub mod h264;

use crate::codec_id::CodecId;
use crate::registry::HalRegistry;

/// 注册所有内置 HAL
pub fn register_all_hals(registry: &mut HalRegistry) {
    registry.register(CodecId::H264, h264::HAL_NAME, h264::H264Hal::create);
}
