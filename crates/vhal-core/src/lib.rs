//! # vhal-core
//!
//! vhal 硬件抽象层核心库, 提供基础类型定义、错误处理和位操作工具.
//!
//! 本 crate 不依赖任何具体硬件, 为上层 HAL 提供:
//! - 统一错误类型 [`HalError`]
//! - 按 64 位字打包的比特写入器 [`bitwriter::BitWriter`] 及对应读取器
//! - 寄存器字段描述符 [`regfield::RegField`]
//! - 对齐工具与输出帧格式

pub mod align;
pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod frame_format;
pub mod regfield;

// 重导出常用类型
pub use align::{align_4k, align_up};
pub use error::{HalError, HalResult};
pub use frame_format::FrameFormat;
pub use regfield::RegField;
