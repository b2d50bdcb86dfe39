//! HAL 注册表.
//!
//! 按 CodecId 查找并实例化解码 HAL, 取代按硬件类型强转句柄的分发方式.

use std::collections::HashMap;

use vhal_core::{HalError, HalResult};

use crate::codec_id::CodecId;
use crate::hal::DecoderHal;

/// HAL 工厂函数类型
pub type HalFactory = fn() -> HalResult<Box<dyn DecoderHal>>;

/// HAL 注册条目
struct HalEntry {
    /// HAL 名称
    name: String,
    /// 工厂函数
    factory: HalFactory,
}

/// HAL 注册表
pub struct HalRegistry {
    hals: HashMap<CodecId, Vec<HalEntry>>,
}

impl HalRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            hals: HashMap::new(),
        }
    }

    /// 注册一个 HAL
    pub fn register(&mut self, codec_id: CodecId, name: impl Into<String>, factory: HalFactory) {
        self.hals.entry(codec_id).or_default().push(HalEntry {
            name: name.into(),
            factory,
        });
    }

    /// 创建指定编解码标准的 HAL 实例 (先注册者优先)
    pub fn create(&self, codec_id: CodecId) -> HalResult<Box<dyn DecoderHal>> {
        let entry = self
            .hals
            .get(&codec_id)
            .and_then(|entries| entries.first())
            .ok_or_else(|| HalError::HalNotFound(format!("未找到 {} 的 HAL", codec_id)))?;
        (entry.factory)()
    }

    /// 按名称创建 HAL 实例
    pub fn create_by_name(&self, name: &str) -> HalResult<Box<dyn DecoderHal>> {
        let entry = self
            .hals
            .values()
            .flatten()
            .find(|entry| entry.name == name)
            .ok_or_else(|| HalError::HalNotFound(format!("未找到名为 {} 的 HAL", name)))?;
        (entry.factory)()
    }

    /// 获取所有已注册的 HAL, 按名称排序
    pub fn list(&self) -> Vec<(CodecId, &str)> {
        let mut result: Vec<(CodecId, &str)> = self
            .hals
            .iter()
            .flat_map(|(id, entries)| entries.iter().map(move |e| (*id, e.name.as_str())))
            .collect();
        result.sort_by(|a, b| a.1.cmp(b.1));
        result
    }
}

impl Default for HalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_注册所有_hal() {
        let mut registry = HalRegistry::new();
        crate::register_all(&mut registry);
        let hals = registry.list();
        assert_eq!(hals, vec![(CodecId::H264, "vdpu-h264")]);
    }

    #[test]
    fn test_创建_h264_hal() {
        let mut registry = HalRegistry::new();
        crate::register_all(&mut registry);
        let hal = registry.create(CodecId::H264).unwrap();
        assert_eq!(hal.codec_id(), CodecId::H264);
        assert_eq!(hal.name(), "vdpu-h264");
        assert!(registry.create_by_name("vdpu-h264").is_ok());
    }

    #[test]
    fn test_未注册的编解码器() {
        let registry = HalRegistry::default();
        assert!(matches!(
            registry.create(CodecId::Vp9),
            Err(HalError::HalNotFound(_))
        ));
        assert!(registry.create_by_name("nope").is_err());
    }
}
