//! 并行离散事件仿真
//!
//! 读取 JSON 模型，按 ranks × threads 切分后运行，输出汇总

use clap::Parser;
use parsim_rs::checkpoint::DirCheckpointWriter;
use parsim_rs::config::{ModelSpec, RuntimeConfig};
use parsim_rs::runtime::{SimReport, Simulation};
use parsim_rs::sim::{SignalFlag, SimTime};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "parsim", about = "并行离散事件仿真：运行 JSON 模型")]
struct Args {
    /// 模型描述文件（JSON）
    #[arg(long)]
    model: PathBuf,
    #[arg(long, default_value_t = 1)]
    ranks: u32,
    /// 每个 rank 的线程数
    #[arg(long, default_value_t = 1)]
    threads: u32,
    /// 结束时间（周期），覆盖 SIM_STOP_AT
    #[arg(long)]
    stop_at: Option<u64>,
    /// 检查点周期（周期），覆盖 SIM_CHECKPOINT_PERIOD
    #[arg(long)]
    checkpoint_period: Option<u64>,
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,
    /// 从 checkpoint_dir 中该时刻的检查点重启
    #[arg(long)]
    restore_at: Option<u64>,
    /// 没有跨分区链路时的屏障间隔
    #[arg(long)]
    idle_sync_period: Option<u64>,
    /// 以 JSON 输出汇总
    #[arg(long)]
    json: bool,
}

fn config_from(args: &Args) -> Result<RuntimeConfig, String> {
    let mut config = RuntimeConfig::from_env().map_err(|e| e.to_string())?;
    config.ranks = args.ranks;
    config.threads = args.threads;
    if let Some(t) = args.stop_at {
        config.stop_at = Some(SimTime(t));
    }
    if let Some(p) = args.checkpoint_period {
        config.checkpoint_period = Some(SimTime(p));
    }
    if let Some(p) = args.idle_sync_period {
        config.idle_sync_period = SimTime(p);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn build(args: &Args) -> Result<Simulation, String> {
    let config = config_from(args)?;
    let spec = ModelSpec::load(&args.model).map_err(|e| e.to_string())?;
    let model = spec
        .build(config.ranks, config.threads)
        .map_err(|e| e.to_string())?;

    let signal = SignalFlag::install().unwrap_or_else(|e| {
        warn!(error = %e, "无法登记信号处理");
        SignalFlag::new()
    });
    let checkpointing = config.checkpoint_period.is_some();
    let mut sim = Simulation::new(model, config).with_signal(signal);
    if checkpointing {
        let writer = DirCheckpointWriter::new(&args.checkpoint_dir).map_err(|e| e.to_string())?;
        sim = sim.with_checkpoint_writer(Arc::new(writer));
    }
    if let Some(t) = args.restore_at {
        let records = DirCheckpointWriter::load(&args.checkpoint_dir, SimTime(t))
            .map_err(|e| e.to_string())?;
        sim = sim.restore_from(records);
    }
    Ok(sim)
}

fn print_report(report: &SimReport, as_json: bool) {
    if as_json {
        let summary = json!({
            "end_time": report.end_time,
            "reason": report.reason,
            "exit_code": report.exit_code(),
            "events": report.total_events(),
            "clock_ticks": report.total_clock_ticks(),
            "barriers": report.barriers(),
            "partitions": report.partitions,
        });
        println!("{summary:#}");
        return;
    }
    println!(
        "done @ {} reason={} events={} barriers={}",
        report.end_time,
        report.reason,
        report.total_events(),
        report.barriers()
    );
    for c in report.components() {
        let counters: Vec<String> = c
            .summary
            .counters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("component {} {}", c.name, counters.join(" "));
    }
}

fn main() {
    // 初始化 tracing；stdout 只留给汇总
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let sim = match build(&args) {
        Ok(sim) => sim,
        Err(msg) => {
            eprintln!("parsim: {msg}");
            std::process::exit(1);
        }
    };

    match sim.run() {
        Ok(report) => {
            print_report(&report, args.json);
            std::process::exit(report.exit_code());
        }
        // 失败行已由运行时输出
        Err(e) => std::process::exit(e.exit_code()),
    }
}
