//! HAL 任务.
//!
//! 调用方每帧创建一个任务, 依次经过 `gen_regs → start → wait`.

use crate::buffer::BufferHandle;
use crate::hals::h264::H264Syntax;

/// 上游错误标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags {
    /// 码流解析出错
    pub parse_err: bool,
    /// 参考帧缺失或损坏
    pub ref_err: bool,
}

impl TaskFlags {
    /// 任一错误标志置位
    pub const fn has_error(&self) -> bool {
        self.parse_err || self.ref_err
    }
}

/// 按编解码标准区分的图像语法
#[derive(Debug, Clone)]
pub enum PictureSyntax {
    H264(Box<H264Syntax>),
}

/// HAL 任务
#[derive(Debug, Clone)]
pub struct HalTask {
    /// 任务编号 (回调中原样带回)
    pub id: u64,
    /// 码流缓冲区
    pub input: BufferHandle,
    /// 码流有效字节数
    pub stream_len: usize,
    /// 输出帧槽位
    pub output_slot: usize,
    /// 上游错误标志
    pub flags: TaskFlags,
    /// 图像语法
    pub syntax: PictureSyntax,
    /// `gen_regs` 占用的流水线槽位, 跳过的任务为 `None`
    pub reg_slot: Option<usize>,
}

impl HalTask {
    /// 创建 H.264 任务
    pub fn h264(
        id: u64,
        input: BufferHandle,
        stream_len: usize,
        output_slot: usize,
        syntax: H264Syntax,
    ) -> Self {
        Self {
            id,
            input,
            stream_len,
            output_slot,
            flags: TaskFlags::default(),
            syntax: PictureSyntax::H264(Box::new(syntax)),
            reg_slot: None,
        }
    }

    /// 设置上游错误标志
    pub fn with_flags(mut self, flags: TaskFlags) -> Self {
        self.flags = flags;
        self
    }
}
