//! # vhal
//!
//! 纯 Rust 实现的视频解码加速器硬件抽象层.
//!
//! HAL 位于码流解析器与硬件加速器之间, 负责:
//! - **寄存器生成**: 把图像语法映射为加速器寄存器镜像
//! - **辅助缓冲区**: 参数集/参考列表/缩放矩阵暂存块, RCB 行缓存, colmv 缓冲池
//! - **任务流水线**: 快速模式下多个任务同时在途
//! - **完成判定**: 解释中断状态, 通过回调上报硬件错误
//!
//! # 快速开始
//!
//! ```rust
//! use vhal::dec::CodecId;
//!
//! let registry = vhal::default_hal_registry();
//! let hal = registry.create(CodecId::H264).unwrap();
//! println!("{} {}", hal.name(), vhal::version());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `vhal-core` | 错误类型、比特写入器、寄存器字段、对齐工具 |
//! | `vhal-dec` | 解码 HAL 框架与 H.264 实现 |

/// 核心类型与工具
pub use vhal_core as core;

/// 解码 HAL 框架
pub use vhal_dec as dec;

/// 获取 vhal 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置 HAL 的注册表
pub fn default_hal_registry() -> vhal_dec::HalRegistry {
    let mut registry = vhal_dec::HalRegistry::new();
    vhal_dec::register_all(&mut registry);
    registry
}
