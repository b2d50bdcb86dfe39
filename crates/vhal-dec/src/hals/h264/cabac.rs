//! CABAC 上下文初始化表.
//!
//! 硬件在每个片开始时从暂存缓冲区读取 (m, n) 初始化参数自行计算上下文状态.
//! 表按 4 个初始化模型排列 (I 片, cabac_init_idc 0/1/2), 每个模型
//! [`CABAC_CONTEXTS`] 个上下文, 每个上下文 16 位: 高 8 位 m, 低 8 位 n (有符号).
//!
//! 表在编译期生成, 字节序与 `BitWriter` 逐字打包后按小端写出一致:
//! 每个 64 位字承载 4 个上下文, 字内字节倒序存放.
//!
//! 目前只收录上下文 0-23 (mb_type 与 mb_skip) 的实际 (m, n) 取值,
//! 其余上下文是以 (0, 64) 填充的占位项, 即等概率状态.

/// 每个初始化模型的上下文数
pub const CABAC_CONTEXTS: usize = 460;

/// 初始化模型数
pub const CABAC_MODELS: usize = 4;

/// 暂存缓冲区中 CABAC 区域的大小 (含尾部保留区)
pub const CABAC_TABLE_SIZE: usize = 4024;

/// 未列出上下文的初始化参数
const NEUTRAL: (i8, i8) = (0, 64);

/// 上下文 0-10 (mb_type SI/I 前缀), 四个模型共用
const MB_TYPE_I: [(i8, i8); 11] = [
    (20, -15),
    (2, 54),
    (3, 74),
    (20, -15),
    (2, 54),
    (3, 74),
    (-28, 127),
    (-23, 104),
    (-6, 53),
    (-1, 54),
    (7, 51),
];

/// 上下文 11-23 (P/B 片 mb_type 与 mb_skip), 按 cabac_init_idc 区分
const MB_TYPE_PB: [[(i8, i8); 13]; 3] = [
    [
        (23, 33),
        (23, 2),
        (21, 0),
        (1, 9),
        (0, 49),
        (-37, 118),
        (5, 57),
        (-13, 78),
        (-11, 65),
        (1, 62),
        (12, 49),
        (-4, 73),
        (17, 50),
    ],
    [
        (22, 25),
        (34, 0),
        (16, 0),
        (-2, 9),
        (4, 41),
        (-29, 118),
        (2, 65),
        (-6, 71),
        (-13, 79),
        (5, 52),
        (9, 50),
        (-3, 70),
        (10, 54),
    ],
    [
        (29, 16),
        (25, 0),
        (14, 0),
        (-10, 51),
        (-3, 62),
        (-27, 99),
        (26, 16),
        (-4, 85),
        (-24, 102),
        (5, 57),
        (6, 57),
        (-17, 73),
        (14, 57),
    ],
];

/// 模型 `model` 中上下文 `ctx` 的 (m, n)
pub const fn init_value(model: usize, ctx: usize) -> (i8, i8) {
    match ctx {
        0..=10 => MB_TYPE_I[ctx],
        11..=23 if model > 0 => MB_TYPE_PB[model - 1][ctx - 11],
        _ => NEUTRAL,
    }
}

/// 打包后的表
pub static CABAC_TABLE: [u8; CABAC_TABLE_SIZE] = pack_table();

const fn pack_table() -> [u8; CABAC_TABLE_SIZE] {
    let mut out = [0u8; CABAC_TABLE_SIZE];
    let mut model = 0;
    while model < CABAC_MODELS {
        let mut ctx = 0;
        while ctx < CABAC_CONTEXTS {
            let (m, n) = init_value(model, ctx);
            let k = (model * CABAC_CONTEXTS + ctx) * 2;
            out[le_index(k)] = m as u8;
            out[le_index(k + 1)] = n as u8;
            ctx += 1;
        }
        model += 1;
    }
    out
}

/// 码流第 `k` 字节在小端字序中的位置
const fn le_index(k: usize) -> usize {
    (k / 8) * 8 + 7 - k % 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_size() {
        assert_eq!(CABAC_TABLE.len(), CABAC_TABLE_SIZE);
        assert!(CABAC_MODELS * CABAC_CONTEXTS * 2 <= CABAC_TABLE_SIZE);
    }

    #[test]
    fn test_first_context_layout() {
        // 第一个 64 位字包含上下文 0-3, 以小端字节序存放
        let word = u64::from_le_bytes(CABAC_TABLE[0..8].try_into().unwrap());
        assert_eq!((word >> 56) as u8 as i8, 20);
        assert_eq!((word >> 48) as u8 as i8, -15);
        assert_eq!((word >> 40) as u8 as i8, 2);
        assert_eq!((word >> 32) as u8 as i8, 54);
    }

    #[test]
    fn test_model_specific_contexts() {
        assert_eq!(init_value(0, 11), NEUTRAL);
        assert_eq!(init_value(1, 11), (23, 33));
        assert_eq!(init_value(3, 23), (14, 57));
        assert_eq!(init_value(2, 5), (3, 74));
        assert_eq!(init_value(1, 459), NEUTRAL);
    }

    #[test]
    fn test_matches_bitwriter_packing() {
        use vhal_core::bitwriter::{BitWriter, words_to_le_bytes};

        let mut words = vec![0u64; CABAC_TABLE_SIZE.div_ceil(8)];
        let mut bw = BitWriter::new(&mut words);
        for model in 0..CABAC_MODELS {
            for ctx in 0..CABAC_CONTEXTS {
                let (m, n) = init_value(model, ctx);
                bw.put_bits(u64::from(m as u8), 8);
                bw.put_bits(u64::from(n as u8), 8);
            }
        }
        assert!(!bw.truncated());
        let mut packed = vec![0u8; CABAC_TABLE_SIZE];
        words_to_le_bytes(&words, &mut packed);
        assert_eq!(&packed[..], &CABAC_TABLE[..]);
    }

    #[test]
    fn test_reserved_tail_is_zero() {
        let used = CABAC_MODELS * CABAC_CONTEXTS * 2;
        assert!(CABAC_TABLE[used..].iter().all(|&b| b == 0));
    }
}
