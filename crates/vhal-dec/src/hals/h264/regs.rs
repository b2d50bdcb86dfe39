//! vdpu H.264 寄存器文件布局.
//!
//! 寄存器文件共 [`REG_COUNT`] 个 32 位寄存器, 分为六段:
//!
//! | 段 | 寄存器 | 方向 |
//! |----|--------|------|
//! | common | 8..32 | 写 |
//! | codec_params | 64..112 | 写 |
//! | common_addr | 128..144 | 写 |
//! | codec_addr | 160..200 | 写 |
//! | irq_status | 224..228 | 读 |
//! | statistics | 256..264 | 写 |

use bitflags::bitflags;
use vhal_core::RegField;

use crate::image::RegSection;
use crate::rcb::RCB_CLASS_COUNT;
use crate::sim::Completion;

use super::syntax::MAX_REF_FRAMES;

/// 寄存器总数
pub const REG_COUNT: usize = 264;

pub const SEC_COMMON: RegSection = RegSection::new("common", 8, 24);
pub const SEC_CODEC_PARAMS: RegSection = RegSection::new("codec_params", 64, 48);
pub const SEC_COMMON_ADDR: RegSection = RegSection::new("common_addr", 128, 16);
pub const SEC_CODEC_ADDR: RegSection = RegSection::new("codec_addr", 160, 40);
pub const SEC_IRQ_STATUS: RegSection = RegSection::new("irq_status", 224, 4);
pub const SEC_STATISTICS: RegSection = RegSection::new("statistics", 256, 8);

/// `start` 写入设备的段 (状态段只读, 不写)
pub const WRITE_SECTIONS: [RegSection; 5] = [
    SEC_COMMON,
    SEC_CODEC_PARAMS,
    SEC_COMMON_ADDR,
    SEC_CODEC_ADDR,
    SEC_STATISTICS,
];

// ------------------------------------------------------------
// common
// ------------------------------------------------------------

/// 解码引擎模式
pub const DEC_MODE: RegField = RegField::new(9, 0, 10);
/// 出错时填充头信息
pub const ERR_HEAD_FILL_EN: RegField = RegField::flag(10, 0);
/// 出错时填充 colmv
pub const ERR_COLMV_FILL_EN: RegField = RegField::flag(10, 1);
/// 错误隐藏使能
pub const ERROR_CONCEAL_EN: RegField = RegField::flag(10, 2);
/// 错误宏块按帧内方式隐藏
pub const ERROR_INTRA_MODE: RegField = RegField::flag(10, 3);
/// 码流耗尽时上报 buf_empty
pub const BUF_EMPTY_EN: RegField = RegField::flag(10, 4);
/// 时钟门控使能
pub const CLKGATE_EN: RegField = RegField::flag(11, 0);
/// 写 DDR 对齐
pub const WR_DDR_ALIGN_EN: RegField = RegField::flag(11, 2);
/// FBC 输出使能
pub const FBC_EN: RegField = RegField::flag(12, 0);
/// 看门狗超时周期
pub const TIMEOUT_THRESHOLD: RegField = RegField::word(13);
/// 码流长度 (字节)
pub const STREAM_LEN: RegField = RegField::word(16);
/// 亮度水平虚步长 (16 字节单位)
pub const Y_HOR_VIRSTRIDE: RegField = RegField::new(18, 0, 16);
/// 色度水平虚步长 (16 字节单位)
pub const UV_HOR_VIRSTRIDE: RegField = RegField::new(19, 0, 16);
/// 亮度平面大小 (16 字节单位)
pub const Y_VIRSTRIDE: RegField = RegField::new(20, 0, 28);
/// FBC 负载偏移 (16 字节单位)
pub const FBC_PAYLOAD_OFFSET: RegField = RegField::new(21, 0, 28);

// ------------------------------------------------------------
// codec_params
// ------------------------------------------------------------

pub const CUR_TOP_POC: RegField = RegField::word(64);
pub const CUR_BOT_POC: RegField = RegField::word(65);

/// 参考帧 `i` 的顶场/底场 POC
pub const fn ref_poc(i: usize, bottom: bool) -> RegField {
    RegField::word(66 + 2 * i + bottom as usize)
}

/// 参考帧以场方式编码 (bit i 对应第 i 个参考槽位)
pub const REF_FIELD_FLAGS: RegField = RegField::new(98, 0, 16);
/// 顶场被用于参考
pub const REF_TOPFIELD_USED: RegField = RegField::new(99, 0, 16);
/// 底场被用于参考
pub const REF_BOTFIELD_USED: RegField = RegField::new(100, 0, 16);
/// 参考帧 colmv 可用
pub const REF_COLMV_USE: RegField = RegField::new(101, 0, 16);
/// 当前图像为场
pub const CUR_FIELD: RegField = RegField::flag(103, 0);
/// 当前场为底场
pub const CUR_BOTTOM_FIELD: RegField = RegField::flag(103, 1);
pub const CUR_MBAFF: RegField = RegField::flag(103, 2);
pub const CUR_IDR: RegField = RegField::flag(103, 3);

// ------------------------------------------------------------
// common_addr
// ------------------------------------------------------------

pub const STRM_BASE: RegField = RegField::word(128);
pub const DECOUT_BASE: RegField = RegField::word(129);
/// 当前帧 colmv 输出
pub const COLMV_CUR_BASE: RegField = RegField::word(130);
/// 错误隐藏替换参考
pub const ERROR_REF_BASE: RegField = RegField::word(131);
/// 第一个 RCB 地址寄存器
pub const RCB_BASE_FIRST: usize = 132;

/// 各 RCB 类地址寄存器索引
pub const fn rcb_regs() -> [usize; RCB_CLASS_COUNT] {
    let mut regs = [0; RCB_CLASS_COUNT];
    let mut i = 0;
    while i < RCB_CLASS_COUNT {
        regs[i] = RCB_BASE_FIRST + i;
        i += 1;
    }
    regs
}

// ------------------------------------------------------------
// codec_addr
// ------------------------------------------------------------

/// 参数集块
pub const PPS_BASE: RegField = RegField::word(160);
/// 参考列表块
pub const RPS_BASE: RegField = RegField::word(161);
/// 缩放矩阵块
pub const SCALING_BASE: RegField = RegField::word(162);
/// CABAC 表
pub const CABAC_BASE: RegField = RegField::word(163);
/// 错误信息区
pub const ERRINFO_BASE: RegField = RegField::word(164);

/// 参考帧 `i` 的帧缓冲
pub const fn ref_base(i: usize) -> RegField {
    RegField::word(165 + i)
}

/// 参考帧 `i` 的 colmv 缓冲
pub const fn colmv_base(i: usize) -> RegField {
    RegField::word(165 + MAX_REF_FRAMES + i)
}

// ------------------------------------------------------------
// irq_status
// ------------------------------------------------------------

/// 主状态字
pub const IRQ_STATUS: RegField = RegField::word(224);
/// 熵解码错误
pub const STRMD_ERROR: RegField = RegField::flag(225, 0);
/// colmv 参考错误
pub const COLMV_REF_ERROR: RegField = RegField::flag(226, 0);

bitflags! {
    /// 主状态字位定义
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IrqStatus: u32 {
        /// 中断已产生
        const IRQ = 1 << 0;
        /// 解码完成
        const DEC_RDY = 1 << 1;
        /// 总线错误
        const BUS_ERR = 1 << 2;
        /// 解码错误
        const ERROR = 1 << 3;
        /// 看门狗超时
        const TIMEOUT = 1 << 4;
        /// 码流耗尽
        const BUF_EMPTY = 1 << 5;
    }
}

/// 归为 "解码错误" 的状态位
const DECODE_ERROR_BITS: IrqStatus = IrqStatus::BUS_ERR
    .union(IrqStatus::ERROR)
    .union(IrqStatus::TIMEOUT);

/// 完成状态判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwStatus {
    pub decode_error: bool,
    pub not_ready: bool,
    pub buf_empty: bool,
    pub strmd_error: bool,
    pub colmv_ref_error: bool,
}

impl HwStatus {
    /// 从回读的寄存器镜像判定
    pub fn classify(image: &[u8]) -> Self {
        let status = IrqStatus::from_bits_retain(IRQ_STATUS.get(image));
        Self {
            decode_error: status.intersects(DECODE_ERROR_BITS),
            not_ready: !status.contains(IrqStatus::DEC_RDY),
            buf_empty: status.contains(IrqStatus::BUF_EMPTY),
            strmd_error: STRMD_ERROR.get(image) != 0,
            colmv_ref_error: COLMV_REF_ERROR.get(image) != 0,
        }
    }

    /// 任一错误成立
    pub fn hard_err(&self) -> bool {
        self.decode_error
            || self.not_ready
            || self.buf_empty
            || self.strmd_error
            || self.colmv_ref_error
    }
}

/// 模拟设备的任务完成写回: 主状态字与两个次级错误字
pub fn sim_completion(status: IrqStatus, strmd_error: bool, colmv_ref_error: bool) -> Completion {
    vec![
        (IRQ_STATUS.reg, status.bits()),
        (STRMD_ERROR.reg, u32::from(strmd_error)),
        (COLMV_REF_ERROR.reg, u32::from(colmv_ref_error)),
    ]
}

/// 正常完成
pub fn sim_completion_ok() -> Completion {
    sim_completion(IrqStatus::IRQ | IrqStatus::DEC_RDY, false, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RegisterImage;

    #[test]
    fn test_sections_do_not_overlap() {
        let mut all = WRITE_SECTIONS.to_vec();
        all.push(SEC_IRQ_STATUS);
        all.sort_by_key(|s| s.first_reg);
        for pair in all.windows(2) {
            assert!(pair[0].first_reg + pair[0].reg_count <= pair[1].first_reg);
        }
        assert_eq!(SEC_STATISTICS.first_reg + SEC_STATISTICS.reg_count, REG_COUNT);
    }

    #[test]
    fn test_fields_live_in_their_sections() {
        assert!(SEC_COMMON.contains(DEC_MODE.reg));
        assert!(SEC_COMMON.contains(FBC_PAYLOAD_OFFSET.reg));
        assert!(SEC_CODEC_PARAMS.contains(ref_poc(15, true).reg));
        assert!(SEC_CODEC_PARAMS.contains(CUR_IDR.reg));
        assert!(SEC_COMMON_ADDR.contains(rcb_regs()[RCB_CLASS_COUNT - 1]));
        assert!(SEC_CODEC_ADDR.contains(colmv_base(MAX_REF_FRAMES - 1).reg));
        assert!(SEC_IRQ_STATUS.contains(COLMV_REF_ERROR.reg));
    }

    #[test]
    fn test_classify_ready() {
        let mut image = RegisterImage::new(REG_COUNT);
        image.set(IRQ_STATUS, (IrqStatus::IRQ | IrqStatus::DEC_RDY).bits());
        let status = HwStatus::classify(image.as_bytes());
        assert!(!status.hard_err());
    }

    #[test]
    fn test_classify_errors() {
        let mut image = RegisterImage::new(REG_COUNT);
        // 未置 DEC_RDY
        image.set(IRQ_STATUS, IrqStatus::IRQ.bits());
        assert!(HwStatus::classify(image.as_bytes()).not_ready);

        image.set(IRQ_STATUS, (IrqStatus::DEC_RDY | IrqStatus::TIMEOUT).bits());
        let status = HwStatus::classify(image.as_bytes());
        assert!(status.decode_error && status.hard_err());

        image.set(IRQ_STATUS, IrqStatus::DEC_RDY.bits());
        image.set_flag(COLMV_REF_ERROR, true);
        let status = HwStatus::classify(image.as_bytes());
        assert!(status.colmv_ref_error && status.hard_err());
    }
}
