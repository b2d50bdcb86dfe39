//! vhal-cli - 解码 HAL 命令行驱动
//!
//! 在模拟设备上把合成的 H.264 图像序列逐帧送入 HAL, 报告每个任务的完成状态,
//! 可选转储寄存器镜像.

mod logging;
mod sequence;

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use vhal_core::FrameFormat;
use vhal_dec::hals::h264::regs::{self, IrqStatus, WRITE_SECTIONS};
use vhal_dec::sim::{SimAllocator, SimDevice, SimFrameSlots};
use vhal_dec::{
    BufferHandle, CodecId, ControlCommand, DecodeReport, DecoderHal, FrameInfo, HalConfig,
    HalRegistry, HalResources, HalTask, TaskFlags,
};

use sequence::SyntheticSequence;

/// DPB 槽位数 (16 个参考 + 当前帧)
const DPB_SLOTS: usize = 17;

/// 模拟码流缓冲区句柄
const STREAM_HANDLE: BufferHandle = BufferHandle(1);

/// 模拟码流长度
const STREAM_LEN: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "vhal-cli", version, about = "在模拟设备上驱动视频解码 HAL")]
struct Cli {
    /// 编解码标准
    #[arg(long, default_value = "h264")]
    codec: String,

    /// 帧数
    #[arg(short = 'n', long, default_value_t = 8)]
    frames: u64,

    /// 图像宽度
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// 图像高度
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// 场编码序列
    #[arg(long)]
    field: bool,

    /// FBC 输出
    #[arg(long)]
    fbc: bool,

    /// 流水线深度 (覆盖配置文件)
    #[arg(long)]
    depth: Option<usize>,

    /// 关闭快速模式
    #[arg(long)]
    no_fast: bool,

    /// JSON 格式的 HAL 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 标记为解析错误的帧序号 (逗号分隔)
    #[arg(long, value_delimiter = ',')]
    parse_error: Vec<u64>,

    /// 模拟硬件报错的帧序号 (逗号分隔)
    #[arg(long, value_delimiter = ',')]
    hw_error: Vec<u64>,

    /// 转储每个任务完成时的寄存器镜像
    #[arg(long)]
    dump_regs: bool,

    /// 以 JSON 行输出任务报告
    #[arg(long)]
    json: bool,

    /// 列出已注册的 HAL
    #[arg(long)]
    list: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 单个任务的输出记录
#[derive(Debug, Serialize)]
struct TaskSummary {
    task_id: u64,
    output_slot: usize,
    hard_err: bool,
    skipped: bool,
    status: u32,
}

impl From<&DecodeReport> for TaskSummary {
    fn from(report: &DecodeReport) -> Self {
        Self {
            task_id: report.task_id,
            output_slot: report.output_slot,
            hard_err: report.hard_err,
            skipped: report.skipped,
            status: report.status,
        }
    }
}

/// 运行结束后的统计
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    tasks: u64,
    hard_errors: u64,
    skipped: u64,
    allocations: usize,
    live_bytes: usize,
    reg_writes: usize,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("vhal-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let registry = default_registry();
    if cli.list {
        for (codec, name) in registry.list() {
            println!("{:<8} {}", codec, name);
        }
        return Ok(());
    }

    let config = build_config(cli)?;
    let codec = CodecId::from_name(&cli.codec)
        .with_context(|| format!("未知的编解码标准: {}", cli.codec))?;
    let mut hal = registry
        .create(codec)
        .with_context(|| format!("创建 {} HAL 失败", codec))?;

    let device = SimDevice::new(regs::sim_completion_ok());
    let allocator = SimAllocator::new();
    let frames = SimFrameSlots::new(DPB_SLOTS, cli.width, cli.height, FrameFormat::Nv12);
    frames.set_fbc(cli.fbc);
    let (tx, rx) = mpsc::channel::<DecodeReport>();

    let cap = hal
        .init(
            &config,
            HalResources {
                device: Box::new(device.clone()),
                allocator: Box::new(allocator.clone()),
                frames: Arc::new(frames.clone()),
                callback: Some(Box::new(move |report: &DecodeReport| {
                    tx.send(report.clone()).ok();
                })),
            },
        )
        .context("HAL 初始化失败")?;
    info!(
        "{}: 最大 {}x{}, 流水线深度 {}, fast_mode={}",
        cap.name, cap.max_width, cap.max_height, cap.pipeline_depth, cap.fast_mode
    );
    if cli.width > cap.max_width || cli.height > cap.max_height {
        bail!(
            "尺寸 {}x{} 超出 {} 的上限 {}x{}",
            cli.width,
            cli.height,
            cap.name,
            cap.max_width,
            cap.max_height
        );
    }

    hal.control(&ControlCommand::SetFrameInfo(FrameInfo {
        width: cli.width,
        height: cli.height,
        format: FrameFormat::Nv12,
        fbc: cli.fbc,
    }))?;

    let parse_errors: HashSet<u64> = cli.parse_error.iter().copied().collect();
    let hw_errors: HashSet<u64> = cli.hw_error.iter().copied().collect();
    let seq = SyntheticSequence::new(cli.width, cli.height, cli.field, DPB_SLOTS);
    let mut in_flight: VecDeque<HalTask> = VecDeque::with_capacity(cap.pipeline_depth);
    let mut summary = RunSummary::default();

    for index in 0..cli.frames {
        if in_flight.len() >= cap.pipeline_depth {
            if let Some(done) = in_flight.pop_front() {
                hal.wait(&done)
                    .with_context(|| format!("等待任务 {} 失败", done.id))?;
            }
            drain_reports(&rx, cli, &mut summary)?;
        }

        let mut task = HalTask::h264(
            index,
            STREAM_HANDLE,
            STREAM_LEN,
            seq.slot_of(index),
            seq.picture(index),
        )
        .with_flags(TaskFlags {
            parse_err: parse_errors.contains(&index),
            ref_err: false,
        });

        // 跳过的任务不经过设备, 不消费编排的完成状态
        if hw_errors.contains(&index) && !task.flags.has_error() {
            device.push_completion(regs::sim_completion(
                IrqStatus::IRQ | IrqStatus::DEC_RDY | IrqStatus::ERROR,
                false,
                false,
            ));
        }
        hal.gen_regs(&mut task)
            .with_context(|| format!("任务 {} 寄存器生成失败", index))?;
        hal.start(&task)
            .with_context(|| format!("任务 {} 提交失败", index))?;
        in_flight.push_back(task);
    }

    while let Some(done) = in_flight.pop_front() {
        hal.wait(&done)
            .with_context(|| format!("等待任务 {} 失败", done.id))?;
    }
    drain_reports(&rx, cli, &mut summary)?;

    summary.allocations = allocator.alloc_count();
    summary.live_bytes = allocator.live_bytes();
    summary.reg_writes = device.write_count();
    hal.deinit()?;
    if allocator.live_count() != 0 {
        warn!("deinit 后仍有 {} 个缓冲区未释放", allocator.live_count());
    }

    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "共 {} 个任务: 硬件错误 {}, 跳过 {}; 分配 {} 次, 在用 {} 字节, 寄存器写入 {} 次",
            summary.tasks,
            summary.hard_errors,
            summary.skipped,
            summary.allocations,
            summary.live_bytes,
            summary.reg_writes
        );
    }
    Ok(())
}

fn default_registry() -> HalRegistry {
    let mut registry = HalRegistry::new();
    vhal_dec::register_all(&mut registry);
    registry
}

/// 读取配置文件并应用命令行覆盖
fn build_config(cli: &Cli) -> Result<HalConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HalConfig::default(),
    };
    if let Some(depth) = cli.depth {
        config.pipeline_depth = depth;
    }
    if cli.no_fast {
        config.fast_mode = false;
    }
    config.validate().context("HAL 配置无效")?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<HalConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("解析配置文件失败, path={}", path.display()))
}

/// 输出已完成任务的报告
fn drain_reports(rx: &Receiver<DecodeReport>, cli: &Cli, summary: &mut RunSummary) -> Result<()> {
    for report in rx.try_iter() {
        summary.tasks += 1;
        summary.hard_errors += u64::from(report.hard_err && !report.skipped);
        summary.skipped += u64::from(report.skipped);

        let line = TaskSummary::from(&report);
        if cli.json {
            println!("{}", serde_json::to_string(&line)?);
        } else {
            let state = match (report.skipped, report.hard_err) {
                (true, _) => "跳过",
                (false, true) => "硬件错误",
                (false, false) => "完成",
            };
            println!(
                "任务 {:>4}: 槽位 {:>2} {} (status={:#06x})",
                line.task_id, line.output_slot, state, line.status
            );
        }
        if cli.dump_regs && !report.regs.is_empty() {
            dump_regs(&report);
        }
    }
    Ok(())
}

/// 按段打印非零寄存器
fn dump_regs(report: &DecodeReport) {
    for section in &WRITE_SECTIONS {
        let bytes = &report.regs[section.offset()..section.end()];
        for (i, word) in bytes.chunks_exact(4).enumerate() {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            if value != 0 {
                println!(
                    "  {:<13} reg{:03} = {:#010x}",
                    section.name,
                    section.first_reg + i,
                    value
                );
            }
        }
    }
}
