//! 设备边界协议集成测试
//!
//! 检查 start 时提交给设备的 RCB 信息表与寄存器偏移补丁表.

use std::sync::Arc;

use vhal::core::FrameFormat;
use vhal::dec::device::{REG_OFFSET_MAGIC, RegOffset};
use vhal::dec::hals::h264::H264Hal;
use vhal::dec::hals::h264::regs;
use vhal::dec::hals::h264::syntax::{H264Syntax, SequenceParams};
use vhal::dec::sim::{DeviceOp, SimAllocator, SimDevice, SimFrameSlots};
use vhal::dec::{BufferHandle, DecoderHal, HalConfig, HalResources, HalTask, RcbInfoEntry};

fn submit_one(width: u32, height: u32, field: bool) -> (H264Hal, SimDevice) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = SimDevice::new(regs::sim_completion_ok());
    let mut hal = H264Hal::new();
    hal.init(
        &HalConfig::default(),
        HalResources {
            device: Box::new(device.clone()),
            allocator: Box::new(SimAllocator::new()),
            frames: Arc::new(SimFrameSlots::new(4, width, height, FrameFormat::Nv12)),
            callback: None,
        },
    )
    .unwrap();

    let mut syntax = H264Syntax::default();
    syntax.pic.sps = SequenceParams {
        frame_mbs_only: !field,
        ..Default::default()
    }
    .with_size(width, height);
    let mut task = HalTask::h264(0, BufferHandle(1), 1024, 0, syntax);
    hal.gen_regs(&mut task).unwrap();
    hal.start(&task).unwrap();
    (hal, device)
}

fn rcb_entries(device: &SimDevice) -> Vec<RcbInfoEntry> {
    device
        .ops()
        .into_iter()
        .find_map(|op| match op {
            DeviceOp::RcbInfo(entries) => Some(entries),
            _ => None,
        })
        .expect("没有提交 RCB 信息")
}

fn reg_offsets(device: &SimDevice) -> Vec<RegOffset> {
    device
        .ops()
        .into_iter()
        .find_map(|op| match op {
            DeviceOp::RegOffsets(entries) => Some(entries),
            _ => None,
        })
        .expect("没有提交寄存器偏移表")
}

#[test]
fn test_rcb_info_sorted_descending_without_zero_entries() {
    let (_hal, device) = submit_one(1920, 1080, false);
    let entries = rcb_entries(&device);
    assert!(!entries.is_empty());
    assert!(entries.windows(2).all(|w| w[0].size >= w[1].size));
    assert!(entries.iter().all(|e| e.size > 0));
    // 宽度不超过 4096 时码流行缓存为 0, 不会出现在表中
    assert!(entries.len() < vhal::dec::rcb::RCB_CLASS_COUNT);
    let rcb_regs = regs::rcb_regs();
    assert!(entries.iter().all(|e| rcb_regs.contains(&(e.reg as usize))));
}

#[test]
fn test_field_coding_grows_rcb() {
    let total = |field| {
        let (_hal, device) = submit_one(1920, 1080, field);
        rcb_entries(&device).iter().map(|e| e.size).sum::<u32>()
    };
    assert!(total(true) > total(false));
}

#[test]
fn test_offset_patches_cover_scratch_regions() {
    let (hal, device) = submit_one(1280, 720, false);
    let layout = hal.scratch_layout().unwrap();
    let offsets = reg_offsets(&device);
    let find = |reg: usize| {
        offsets
            .iter()
            .find(|o| o.reg as usize == reg)
            .map(|o| o.offset as usize)
    };
    assert_eq!(find(regs::PPS_BASE.reg), Some(layout.param_offset(0)));
    assert_eq!(find(regs::RPS_BASE.reg), Some(layout.reflist_offset(0)));
    assert_eq!(find(regs::SCALING_BASE.reg), Some(layout.scaling_offset(0)));
    // CABAC 表位于偏移 0, 无需补丁
    assert_eq!(find(regs::CABAC_BASE.reg), None);
    assert!(offsets.iter().all(|o| o.offset != 0));

    let table = hal.slot_offsets(0).unwrap();
    let bytes = table.to_bytes();
    assert_eq!(
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        REG_OFFSET_MAGIC
    );
    assert_eq!(
        u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize,
        offsets.len()
    );
}

#[test]
fn test_status_section_is_never_written() {
    let (_hal, device) = submit_one(640, 480, false);
    let status = regs::SEC_IRQ_STATUS;
    let writes = device.count_ops(|op| match op {
        DeviceOp::RegWrite { offset, len } => {
            let start = *offset as usize;
            start < status.end() && start + len > status.offset()
        }
        _ => false,
    });
    assert_eq!(writes, 0);
    assert_eq!(device.write_count(), regs::WRITE_SECTIONS.len());
}
