//! # vhal-dec
//!
//! 视频解码加速器 HAL 框架与具体实现.
//!
//! HAL 位于码流解析器与硬件加速器之间: 把解析得到的图像语法转换为加速器直接
//! 读取的寄存器镜像和辅助缓冲区, 提交给设备, 并解释完成状态.
//!
//! ## 支持的硬件
//!
//! - **vdpu-h264**: vdpu 代际 H.264 解码 HAL (支持快速模式流水线, FBC 输出)
//!
//! ## 使用示例
//!
//! ```rust
//! use vhal_dec::{CodecId, HalRegistry};
//!
//! let mut reg = HalRegistry::new();
//! vhal_dec::register_all(&mut reg);
//!
//! let hal = reg.create(CodecId::H264).unwrap();
//! assert_eq!(hal.name(), "vdpu-h264");
//! ```

pub mod buffer;
pub mod codec_id;
pub mod colmv;
pub mod device;
pub mod hal;
pub mod hals;
pub mod image;
pub mod rcb;
pub mod registry;
pub mod scratch;
pub mod sim;
pub mod slots;
pub mod task;

// 重导出常用类型
pub use buffer::{BufferAllocator, BufferHandle, DeviceBuffer, FrameBufferInfo, FrameSlots};
pub use codec_id::CodecId;
pub use device::{Device, RcbInfoEntry, RegOffsetTable};
pub use hal::{
    CompletionCallback, ControlCommand, DecodeReport, DecoderHal, FrameInfo, HalConfig,
    HalResources, HwCapability,
};
pub use registry::HalRegistry;
pub use task::{HalTask, PictureSyntax, TaskFlags};

/// 注册所有内置 HAL
pub fn register_all(registry: &mut HalRegistry) {
    hals::register_all_hals(registry);
}
