//! vhal 性能基准测试.
//!
//! 覆盖比特打包、RCB 尺寸计算与完整的单帧 HAL 任务周期.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vhal::core::FrameFormat;
use vhal::core::bitwriter::BitWriter;
use vhal::dec::hals::h264::regs;
use vhal::dec::hals::h264::syntax::{H264Syntax, RefFrameEntry, SequenceParams};
use vhal::dec::hals::h264::H264Hal;
use vhal::dec::rcb::{RcbBufferCache, RcbInput, RcbSizer};
use vhal::dec::sim::{SimAllocator, SimDevice, SimFrameSlots};
use vhal::dec::{BufferHandle, DecoderHal, HalConfig, HalResources, HalTask};

fn bench_bitwriter_pack(c: &mut Criterion) {
    c.bench_function("bitwriter_pack_256x48B", |b| {
        let mut words = [0u64; 6];
        b.iter(|| {
            for _ in 0..256 {
                let mut bw = BitWriter::new(&mut words);
                for width in 1..=23u32 {
                    bw.put_bits(black_box(0x5a5a_5a5a), width);
                }
                bw.put_align(128, 0);
            }
            black_box(words[0])
        });
    });
}

fn bench_rcb_compute(c: &mut Criterion) {
    let input = RcbInput {
        width: 3840,
        height: 2160,
        bit_depth: 10,
        chroma_format_idc: 1,
        field_coding: false,
        fbc: true,
    };
    c.bench_function("rcb_compute_2160p", |b| {
        let mut cache = RcbBufferCache::new(regs::rcb_regs());
        let mut alloc = SimAllocator::new();
        cache.ensure(&mut alloc, &input).unwrap();
        b.iter(|| {
            let total: usize = cache
                .info()
                .iter()
                .map(|i| RcbSizer::class_bits(i.class, black_box(&input)))
                .sum();
            black_box(total)
        });
    });
}

fn bench_task_cycle(c: &mut Criterion) {
    c.bench_function("h264_gen_start_wait_1080p", |b| {
        let mut hal = H264Hal::new();
        hal.init(
            &HalConfig::default(),
            HalResources {
                device: Box::new(SimDevice::new(regs::sim_completion_ok())),
                allocator: Box::new(SimAllocator::new()),
                frames: Arc::new(SimFrameSlots::new(17, 1920, 1080, FrameFormat::Nv12)),
                callback: None,
            },
        )
        .unwrap();

        let mut syntax = H264Syntax::default();
        syntax.pic.sps = SequenceParams::default().with_size(1920, 1080);
        syntax.pic.curr_slot = 1;
        syntax.pic.frame_num = 1;
        syntax.pic.ref_frames[0] = RefFrameEntry {
            present: true,
            dpb_slot: 0,
            top_used: true,
            bottom_used: true,
            ..Default::default()
        };
        let template = HalTask::h264(1, BufferHandle(1), 4096, 1, syntax);

        b.iter(|| {
            let mut task = template.clone();
            hal.gen_regs(&mut task).unwrap();
            hal.start(&task).unwrap();
            hal.wait(&task).unwrap();
        });
    });
}

criterion_group!(benches, bench_bitwriter_pack, bench_rcb_compute, bench_task_cycle);
criterion_main!(benches);
