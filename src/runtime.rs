//! 运行时
//!
//! 把装配好的模型切成分区，每个分区一个 OS 线程（`std::thread::scope`），
//! 每个 rank 的 0 号线程持有该 rank 的传输端点。所有分区结束后汇总报告；
//! 出错时只在这里输出一行失败日志。

use crate::checkpoint::{CheckpointWriter, PartitionCheckpoint};
use crate::config::RuntimeConfig;
use crate::model::Model;
use crate::sim::{
    ComponentReport, ConfigError, ErrorKind, Partition, PartitionId, PartitionReport, SignalFlag,
    SimError, SimResult, SimTime, StopReason,
};
use crate::sync::{RankShared, SyncManager};
use crate::transport::{Fabric, SingleRank, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// 一次运行的汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimReport {
    pub end_time: SimTime,
    pub reason: StopReason,
    pub partitions: Vec<PartitionReport>,
}

impl SimReport {
    /// 正常结束为 0，信号停止为 2
    pub fn exit_code(&self) -> i32 {
        match self.reason {
            StopReason::Signal => SimError::SignalAbort.exit_code(),
            _ => 0,
        }
    }

    pub fn total_events(&self) -> u64 {
        self.partitions.iter().map(|p| p.stats.events).sum()
    }

    pub fn total_clock_ticks(&self) -> u64 {
        self.partitions.iter().map(|p| p.stats.clock_ticks).sum()
    }

    /// 屏障次数（所有分区相同）
    pub fn barriers(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.stats.barriers)
            .max()
            .unwrap_or(0)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentReport> {
        self.partitions.iter().flat_map(|p| p.components.iter())
    }

    pub fn component(&self, name: &str) -> Option<&ComponentReport> {
        self.components().find(|c| c.name == name)
    }
}

/// 某个分区的失败
#[derive(Debug)]
pub struct PartitionFailure {
    pub partition: PartitionId,
    pub time: SimTime,
    pub error: SimError,
}

/// 由其他分区的失败引起的错误
fn is_secondary(error: &SimError) -> bool {
    matches!(
        error,
        SimError::RemoteAbort { .. } | SimError::Transport(TransportError::PeerDeparted { .. })
    )
}

pub struct Simulation {
    model: Model,
    config: RuntimeConfig,
    writer: Option<Arc<dyn CheckpointWriter>>,
    signal: SignalFlag,
    restore: Vec<PartitionCheckpoint>,
}

impl Simulation {
    pub fn new(model: Model, config: RuntimeConfig) -> Self {
        Self {
            model,
            config,
            writer: None,
            signal: SignalFlag::new(),
            restore: Vec::new(),
        }
    }

    pub fn with_checkpoint_writer(mut self, writer: Arc<dyn CheckpointWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_signal(mut self, signal: SignalFlag) -> Self {
        self.signal = signal;
        self
    }

    /// 从同一时刻所有分区的检查点重启
    pub fn restore_from(mut self, records: Vec<PartitionCheckpoint>) -> Self {
        self.restore = records;
        self
    }

    fn partitions(&mut self) -> SimResult<Vec<Partition>> {
        let ranks = self.model.ranks;
        let threads = self.model.threads;
        let plans = std::mem::take(&mut self.model.partitions);
        let parallel = plans.len() > 1;

        let mut shared: Vec<Arc<RankShared>> = Vec::new();
        let mut transports: Vec<Option<Box<dyn Transport>>> = Vec::new();
        if parallel {
            let mut demux = std::mem::take(&mut self.model.demux);
            demux.resize_with(ranks as usize, HashMap::new);
            for (rank, table) in demux.into_iter().enumerate() {
                shared.push(Arc::new(RankShared::new(
                    rank as u32,
                    ranks,
                    threads,
                    table,
                    Arc::clone(&self.model.event_types),
                )));
            }
            if ranks == 1 {
                transports.push(Some(Box::new(SingleRank::new()) as Box<dyn Transport>));
            } else {
                transports.extend(
                    Fabric::new(ranks)
                        .into_iter()
                        .map(|ep| Some(Box::new(ep) as Box<dyn Transport>)),
                );
            }
        }

        let checkpoint = match (self.config.checkpoint_period, &self.writer) {
            (Some(period), Some(writer)) => Some((period, Arc::clone(writer))),
            (Some(_), None) => {
                return Err(ConfigError::Model(
                    "checkpoint period is set but no checkpoint writer is attached".to_string(),
                )
                .into());
            }
            _ => None,
        };

        let mut out = Vec::with_capacity(plans.len());
        for plan in plans {
            let id = plan.id;
            let mut partition = if parallel {
                let rank_shared = Arc::clone(&shared[id.rank as usize]);
                let transport = if id.thread == 0 {
                    transports[id.rank as usize].take()
                } else {
                    None
                };
                let sync = SyncManager::parallel(id, Arc::clone(&rank_shared), transport);
                Partition::new(plan, sync, Some(rank_shared))
            } else {
                Partition::serial(plan)
            };
            partition = partition
                .with_signal(self.signal.clone())
                .with_idle_sync_period(self.config.idle_sync_period);
            if let Some((period, writer)) = &checkpoint {
                partition = partition.with_checkpoint(*period, Arc::clone(writer));
            }
            out.push(partition);
        }
        Ok(out)
    }

    fn apply_restore(&mut self, partitions: &mut [Partition]) -> SimResult<()> {
        if self.restore.is_empty() {
            return Ok(());
        }
        let mut records: HashMap<PartitionId, PartitionCheckpoint> = std::mem::take(&mut self.restore)
            .into_iter()
            .map(|r| (r.partition, r))
            .collect();
        let times: Vec<SimTime> = records.values().map(|r| r.time).collect();
        if times.windows(2).any(|w| w[0] != w[1]) {
            return Err(ConfigError::Model(
                "checkpoints to restore were taken at different times".to_string(),
            )
            .into());
        }
        for partition in partitions.iter_mut() {
            let record = records.remove(&partition.id()).ok_or_else(|| {
                ConfigError::Partitioning(format!("no checkpoint for partition {}", partition.id()))
            })?;
            partition.restore(&record)?;
        }
        if let Some(extra) = records.keys().next() {
            return Err(ConfigError::Partitioning(format!(
                "checkpoint for partition {extra} does not exist in this model"
            ))
            .into());
        }
        Ok(())
    }

    /// 运行所有分区直到一致停止。
    #[tracing::instrument(skip(self), fields(ranks = self.config.ranks, threads = self.config.threads))]
    pub fn run(mut self) -> SimResult<SimReport> {
        self.config.validate()?;
        if self.model.ranks != self.config.ranks || self.model.threads != self.config.threads {
            return Err(ConfigError::Partitioning(format!(
                "model was built for {}x{} partitions but the run asks for {}x{}",
                self.model.ranks, self.model.threads, self.config.ranks, self.config.threads
            ))
            .into());
        }
        let end_time = self.config.end_time();
        let mut partitions = self.partitions()?;
        self.apply_restore(&mut partitions)?;

        info!(
            partitions = partitions.len(),
            end_time = %end_time,
            "▶️  开始运行仿真"
        );

        let results: Vec<(Partition, SimResult<_>)> = if partitions.len() == 1 {
            partitions
                .into_iter()
                .map(|mut p| {
                    let r = p.run(end_time);
                    (p, r)
                })
                .collect()
        } else {
            thread::scope(|s| {
                let handles: Vec<_> = partitions
                    .into_iter()
                    .map(|mut p| {
                        s.spawn(move || {
                            let r = p.run(end_time);
                            (p, r)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect()
            })
        };

        let mut reports = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (mut partition, result) in results {
            match result {
                Ok(outcome) => reports.push(partition.finish(outcome)),
                Err(error) => failures.push(PartitionFailure {
                    partition: partition.id(),
                    time: partition.now(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            let idx = failures
                .iter()
                .position(|f| !is_secondary(&f.error))
                .or_else(|| {
                    failures
                        .iter()
                        .position(|f| f.error.kind() != ErrorKind::RemoteAbort)
                })
                .unwrap_or(0);
            let failure = failures.swap_remove(idx);
            error!(
                partition = %failure.partition,
                time = %failure.time,
                kind = failure.error.kind().as_str(),
                "仿真中止: {}",
                failure.error
            );
            return Err(failure.error);
        }

        reports.sort_by_key(|r| r.partition);
        let (end_time, reason) = reports
            .first()
            .map(|r| (r.end_time, r.reason))
            .unwrap_or((SimTime::ZERO, StopReason::Quiescent));
        let report = SimReport {
            end_time,
            reason,
            partitions: reports,
        };
        info!(
            end_time = %report.end_time,
            reason = %report.reason,
            events = report.total_events(),
            barriers = report.barriers(),
            "✅ 仿真完成"
        );
        Ok(report)
    }
}
