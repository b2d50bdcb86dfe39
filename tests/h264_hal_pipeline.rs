//! H.264 HAL 端到端集成测试
//!
//! 通过门面 crate 的注册表创建 HAL, 在模拟设备上跑完整的
//! gen_regs → start → wait 流水线.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use vhal::core::{FrameFormat, HalError};
use vhal::dec::hals::h264::H264Hal;
use vhal::dec::hals::h264::regs::{self, IrqStatus};
use vhal::dec::hals::h264::syntax::{H264Syntax, RefFrameEntry, SequenceParams};
use vhal::dec::sim::{SimAllocator, SimDevice, SimFrameSlots};
use vhal::dec::{
    BufferHandle, CodecId, ControlCommand, DecodeReport, DecoderHal, FrameInfo, HalConfig,
    HalResources, HalTask, TaskFlags,
};

const DPB_SLOTS: usize = 17;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Env {
    device: SimDevice,
    allocator: SimAllocator,
    frames: SimFrameSlots,
    reports: Receiver<DecodeReport>,
}

/// 初始化 HAL, 返回模拟协作者与报告接收端
fn init_hal(hal: &mut dyn DecoderHal, config: &HalConfig, width: u32, height: u32) -> Env {
    let device = SimDevice::new(regs::sim_completion_ok());
    let allocator = SimAllocator::new();
    let frames = SimFrameSlots::new(DPB_SLOTS, width, height, FrameFormat::Nv12);
    let (tx, rx) = mpsc::channel();
    hal.init(
        config,
        HalResources {
            device: Box::new(device.clone()),
            allocator: Box::new(allocator.clone()),
            frames: Arc::new(frames.clone()),
            callback: Some(Box::new(move |r: &DecodeReport| {
                tx.send(r.clone()).ok();
            })),
        },
    )
    .expect("HAL 初始化失败");
    Env {
        device,
        allocator,
        frames,
        reports: rx,
    }
}

/// IPPP 序列的第 `index` 帧, 以前一帧为唯一参考
fn picture(index: u64, width: u32, height: u32) -> H264Syntax {
    let mut syntax = H264Syntax::default();
    syntax.pic.sps = SequenceParams::default().with_size(width, height);
    syntax.pic.curr_slot = index as usize % DPB_SLOTS;
    syntax.pic.frame_num = index as u32;
    syntax.pic.idr = index == 0;
    syntax.pic.cur_top_poc = index as i32 * 2;
    syntax.pic.cur_bottom_poc = index as i32 * 2 + 1;
    if index > 0 {
        let prev = index - 1;
        syntax.pic.ref_frames[0] = RefFrameEntry {
            present: true,
            dpb_slot: prev as usize % DPB_SLOTS,
            frame_num: prev as u32,
            top_used: true,
            bottom_used: true,
            colmv_used: true,
            top_poc: prev as i32 * 2,
            bottom_poc: prev as i32 * 2 + 1,
            ..Default::default()
        };
        let entry = syntax.pic.list_entry(0, false);
        syntax.slice_refs.lists[0].push(entry);
    }
    syntax
}

fn task(index: u64, width: u32, height: u32) -> HalTask {
    HalTask::h264(
        index,
        BufferHandle(1),
        4096,
        index as usize % DPB_SLOTS,
        picture(index, width, height),
    )
}

// ============================================================
// 注册表
// ============================================================

#[test]
fn test_default_registry() {
    let registry = vhal::default_hal_registry();
    assert_eq!(registry.list(), vec![(CodecId::H264, "vdpu-h264")]);

    let hal = registry.create(CodecId::H264).expect("创建 H.264 HAL 失败");
    assert_eq!(hal.codec_id(), CodecId::H264);

    match registry.create(CodecId::Vp9) {
        Err(HalError::HalNotFound(_)) => {}
        Err(e) => panic!("错误类型不符: {e}"),
        Ok(_) => panic!("VP9 不应有已注册的 HAL"),
    }
    assert!(!vhal::version().is_empty());
}

// ============================================================
// 流水线
// ============================================================

#[test]
fn test_pipelined_sequence_completes_in_order() {
    init_logger();
    let registry = vhal::default_hal_registry();
    let mut hal = registry.create(CodecId::H264).unwrap();
    let config = HalConfig::default();
    let env = init_hal(hal.as_mut(), &config, 1920, 1080);

    let mut in_flight = std::collections::VecDeque::new();
    for index in 0..12 {
        if in_flight.len() == config.pipeline_depth {
            let done: HalTask = in_flight.pop_front().unwrap();
            hal.wait(&done).unwrap();
        }
        let mut t = task(index, 1920, 1080);
        hal.gen_regs(&mut t).unwrap();
        hal.start(&t).unwrap();
        in_flight.push_back(t);
    }
    while let Some(done) = in_flight.pop_front() {
        hal.wait(&done).unwrap();
    }

    let reports: Vec<DecodeReport> = env.reports.try_iter().collect();
    let ids: Vec<u64> = reports.iter().map(|r| r.task_id).collect();
    assert_eq!(ids, (0..12).collect::<Vec<_>>());
    assert!(reports.iter().all(|r| !r.hard_err && !r.skipped));
    assert_eq!(env.device.in_flight(), 0);
    // 暂存缓冲 + RCB + 每个 DPB 槽位一块 colmv, 之后不再分配
    assert_eq!(env.allocator.alloc_count(), 2 + DPB_SLOTS);

    hal.deinit().unwrap();
    assert_eq!(env.allocator.live_count(), 0);
}

#[test]
fn test_errors_never_block_the_pipeline() {
    init_logger();
    let mut hal = H264Hal::new();
    let env = init_hal(&mut hal, &HalConfig::default(), 1280, 720);

    for index in 0..6 {
        let flags = TaskFlags {
            parse_err: index == 2,
            ref_err: index == 3,
        };
        let mut t = task(index, 1280, 720).with_flags(flags);
        if index == 4 {
            env.device.push_completion(regs::sim_completion(
                IrqStatus::IRQ | IrqStatus::DEC_RDY | IrqStatus::TIMEOUT,
                false,
                false,
            ));
        }
        hal.gen_regs(&mut t).unwrap();
        hal.start(&t).unwrap();
        hal.wait(&t).unwrap();
    }

    let reports: Vec<DecodeReport> = env.reports.try_iter().collect();
    assert_eq!(reports.len(), 6);
    let states: Vec<(bool, bool)> = reports.iter().map(|r| (r.skipped, r.hard_err)).collect();
    assert_eq!(
        states,
        vec![
            (false, false),
            (false, false),
            (true, true),
            (true, true),
            (false, true),
            (false, false),
        ]
    );
    assert_eq!(hal.slots_in_use(), 0);
    // 两个跳过的任务没有触发设备提交
    assert_eq!(
        env.device
            .count_ops(|op| matches!(op, vhal::dec::sim::DeviceOp::CmdSend)),
        4
    );
}

#[test]
fn test_non_fast_mode_reuses_param_blob() {
    init_logger();
    let non_fast = HalConfig {
        fast_mode: false,
        ..Default::default()
    };

    // 非快速模式: 第二帧复用参数集表头, 只重写每图像位图
    let mut reuse = H264Hal::new();
    let _env = init_hal(&mut reuse, &non_fast, 640, 480);
    for index in 0..2 {
        let mut t = task(index, 640, 480);
        reuse.gen_regs(&mut t).unwrap();
        reuse.start(&t).unwrap();
        reuse.wait(&t).unwrap();
    }

    // 同一帧走完整序列化
    let mut full = H264Hal::new();
    let _env = init_hal(&mut full, &non_fast, 640, 480);
    let mut t = task(1, 640, 480);
    t.syntax = match t.syntax {
        vhal::dec::PictureSyntax::H264(mut s) => {
            s.pic.param_set_update = true;
            vhal::dec::PictureSyntax::H264(s)
        }
    };
    full.gen_regs(&mut t).unwrap();

    let layout = reuse.scratch_layout().unwrap();
    let param = layout.param_offset(0)..layout.reflist_offset(0);
    let a = &reuse.scratch_bytes().unwrap()[param.clone()];
    let b = &full.scratch_bytes().unwrap()[param];
    assert_eq!(a, b);
    // 全部 256 个表项内容相同
    assert_eq!(&a[..48], &a[255 * 48..256 * 48]);
}

// ============================================================
// 控制命令
// ============================================================

#[test]
fn test_large_output_switches_to_odd_256_stride() {
    init_logger();
    let mut hal = H264Hal::new();
    let env = init_hal(&mut hal, &HalConfig::default(), 4096, 2160);

    let mut t = task(0, 4096, 2160);
    hal.gen_regs(&mut t).unwrap();
    let idx = t.reg_slot.unwrap();
    assert_eq!(hal.slot_image(idx).unwrap().get(regs::Y_HOR_VIRSTRIDE), 4096 / 16);
    hal.start(&t).unwrap();
    hal.wait(&t).unwrap();

    hal.control(&ControlCommand::SetFrameInfo(FrameInfo {
        width: 4096,
        height: 2160,
        format: FrameFormat::Nv12,
        fbc: false,
    }))
    .unwrap();
    assert_eq!(
        env.frames.stride_align(),
        vhal::dec::buffer::StrideAlign::Align256Odd
    );

    let mut t = task(1, 4096, 2160);
    hal.gen_regs(&mut t).unwrap();
    let image = hal.slot_image(t.reg_slot.unwrap()).unwrap();
    // 4096 对齐到 256 的奇数倍为 4352
    assert_eq!(image.get(regs::Y_HOR_VIRSTRIDE), 4352 / 16);
    assert_eq!(image.get(regs::Y_VIRSTRIDE), (4352 * 2160 / 16) as u32);
}
