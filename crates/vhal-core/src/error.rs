//! 统一错误类型定义.
//!
//! 所有 vhal crate 共用的错误类型, 支持跨模块传播.
//!
//! 注意: 上游解析错误与硬件中断状态错误不属于 `HalError`,
//! 前者以任务标志传入, 后者通过完成回调的 `hard_err` 上报.

use thiserror::Error;

/// vhal 统一错误类型
#[derive(Debug, Error)]
pub enum HalError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 设备可见缓冲区分配失败
    #[error("内存分配失败: {0}")]
    AllocationFailure(String),

    /// 设备控制接口读写失败
    #[error("设备 I/O 错误: {0}")]
    DeviceIo(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 未找到指定的 HAL 实现
    #[error("未找到 HAL: {0}")]
    HalNotFound(String),

    /// 调用顺序与状态机不符
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// 资源耗尽 (如流水线槽位全部在用)
    #[error("资源繁忙: {0}")]
    ResourceBusy(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// vhal 统一 Result 类型
pub type HalResult<T> = Result<T, HalError>;
