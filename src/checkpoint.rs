//! 检查点
//!
//! 每个分区在检查点时刻把待处理活动、组件状态、链路和退出计数打包成
//! `PartitionCheckpoint`，交给共享的 `CheckpointWriter`。插入序号不保存，
//! 恢复时重新分配。

use crate::model::Link;
use crate::sim::{
    Activity, ActivityKind, ClockTick, ComponentId, Event, EventType, HandlerKey, LinkId,
    PartitionId, Priority, SimTime,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {path} is malformed: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no checkpoint for time {time} in {dir}")]
    NotFound { dir: PathBuf, time: SimTime },
}

/// 待处理活动的记录形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub time: SimTime,
    pub priority: Priority,
    #[serde(flatten)]
    pub kind: ActivityRecordKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityRecordKind {
    Event {
        link: LinkId,
        ty: EventType,
        payload: Vec<u8>,
        handler: HandlerKey,
    },
    ClockTick {
        handler: HandlerKey,
        period: SimTime,
        /// 已注销、下一次触发时移除
        #[serde(default)]
        cancelled: bool,
    },
}

impl ActivityRecord {
    /// 调度器动作不记录，恢复后由分区重新生成。
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let kind = match activity.kind() {
            ActivityKind::Event(ev) => ActivityRecordKind::Event {
                link: ev.link,
                ty: ev.ty,
                payload: ev.payload.clone(),
                handler: ev.handler,
            },
            ActivityKind::ClockTick(tick) => ActivityRecordKind::ClockTick {
                handler: tick.handler,
                period: tick.period,
                cancelled: false,
            },
            ActivityKind::Action(_) => return None,
        };
        Some(Self {
            time: activity.time(),
            priority: activity.priority(),
            kind,
        })
    }

    pub fn handler(&self) -> HandlerKey {
        match &self.kind {
            ActivityRecordKind::Event { handler, .. } => *handler,
            ActivityRecordKind::ClockTick { handler, .. } => *handler,
        }
    }

    pub fn into_activity(self) -> Activity {
        match self.kind {
            ActivityRecordKind::Event {
                link,
                ty,
                payload,
                handler,
            } => Activity::event(
                self.time,
                self.priority,
                Event {
                    link,
                    ty,
                    payload,
                    handler,
                },
            ),
            ActivityRecordKind::ClockTick { handler, period, .. } => Activity::clock_tick(
                self.time,
                self.priority,
                ClockTick { handler, period },
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: ComponentId,
    pub name: String,
    pub state: Vec<u8>,
}

/// 单个分区在某个检查点时刻的完整状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCheckpoint {
    pub partition: PartitionId,
    pub time: SimTime,
    pub activities: Vec<ActivityRecord>,
    pub components: Vec<ComponentRecord>,
    pub links: Vec<Link>,
    pub exit_refcount: u64,
    pub exit_primaries: u64,
    #[serde(default)]
    pub exit_end_candidate: Option<SimTime>,
    #[serde(default)]
    pub last_event: SimTime,
}

impl PartitionCheckpoint {
    pub fn file_name(&self) -> String {
        format!(
            "cpt_{}_r{}_t{}.json",
            self.time.0, self.partition.rank, self.partition.thread
        )
    }
}

/// 检查点写入端，由所有分区线程共享
pub trait CheckpointWriter: Send + Sync {
    fn write(&self, checkpoint: &PartitionCheckpoint) -> Result<(), CheckpointError>;
}

/// 每个分区每个检查点一个 JSON 文件
#[derive(Debug, Clone)]
pub struct DirCheckpointWriter {
    dir: PathBuf,
}

impl DirCheckpointWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 读取某个时刻所有分区的检查点，按分区排序
    pub fn load(dir: &Path, time: SimTime) -> Result<Vec<PartitionCheckpoint>, CheckpointError> {
        let prefix = format!("cpt_{}_", time.0);
        let entries = fs::read_dir(dir).map_err(|source| CheckpointError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let path = entry.path();
            let bytes = fs::read(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
            let record: PartitionCheckpoint = serde_json::from_slice(&bytes)
                .map_err(|source| CheckpointError::Json { path, source })?;
            records.push(record);
        }
        if records.is_empty() {
            return Err(CheckpointError::NotFound {
                dir: dir.to_path_buf(),
                time,
            });
        }
        records.sort_by_key(|r| r.partition);
        Ok(records)
    }

    /// 目录中出现过的检查点时刻（升序，去重）
    pub fn times(dir: &Path) -> Result<Vec<SimTime>, CheckpointError> {
        let entries = fs::read_dir(dir).map_err(|source| CheckpointError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut times: Vec<SimTime> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let rest = name.strip_prefix("cpt_")?;
                let (time, _) = rest.split_once('_')?;
                time.parse().ok().map(SimTime)
            })
            .collect();
        times.sort();
        times.dedup();
        Ok(times)
    }
}

impl CheckpointWriter for DirCheckpointWriter {
    fn write(&self, checkpoint: &PartitionCheckpoint) -> Result<(), CheckpointError> {
        let path = self.dir.join(checkpoint.file_name());
        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|source| {
            CheckpointError::Json {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, bytes).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "💾 写入检查点");
        Ok(())
    }
}

/// 把检查点收集在内存中
#[derive(Debug, Default)]
pub struct MemoryCheckpointWriter {
    records: Mutex<Vec<PartitionCheckpoint>>,
}

impl MemoryCheckpointWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PartitionCheckpoint> {
        self.records.lock().clone()
    }

    /// 某个时刻所有分区的检查点，按分区排序
    pub fn at(&self, time: SimTime) -> Vec<PartitionCheckpoint> {
        let mut out: Vec<PartitionCheckpoint> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.time == time)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.partition);
        out
    }
}

impl CheckpointWriter for MemoryCheckpointWriter {
    fn write(&self, checkpoint: &PartitionCheckpoint) -> Result<(), CheckpointError> {
        debug!(partition = %checkpoint.partition, time = %checkpoint.time, "检查点写入内存");
        self.records.lock().push(checkpoint.clone());
        Ok(())
    }
}
