//! 对齐工具.

/// 硬件页粒度, scratch 子区域均按此对齐
pub const PAGE_SIZE: usize = 4096;

/// 向上对齐到 `align` 的整数倍
///
/// `align` 为 0 时原样返回.
pub const fn align_up(value: usize, align: usize) -> usize {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// 向上对齐到 4096 字节
pub const fn align_4k(value: usize) -> usize {
    align_up(value, PAGE_SIZE)
}

/// 先对齐到 256 再强制为 256 的奇数倍
///
/// 大分辨率输出时用于错开 DDR bank, 避免行间访问冲突.
pub const fn align_256_odd(value: usize) -> usize {
    align_up(value, 256) | 256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(1080, 16), 1088);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn test_align_4k() {
        assert_eq!(align_4k(0), 0);
        assert_eq!(align_4k(4024), 4096);
        assert_eq!(align_4k(256 * 48), 12288);
        assert_eq!(align_4k(4097), 8192);
    }

    #[test]
    fn test_align_256_odd() {
        // 3840 = 15 * 256, 已是奇数倍
        assert_eq!(align_256_odd(3840), 3840);
        // 4096 = 16 * 256, 需要加到 17 倍
        assert_eq!(align_256_odd(4096), 4352);
        assert_eq!(align_256_odd(1921), 2304);
    }
}
