//! Live Visit Collector owner task (§4.E, §5).
//!
//! A single owner task holds the only mutable reference to the collector
//! map. Producers — the event listener and RPC callers — never touch state
//! directly; they enqueue onto one of four queues (parsed FSDJump, parsed
//! Docked, control commands, shutdown) and the owner task applies them in
//! receive order. This is the teacher's channel-of-commands idiom, generalized
//! from a single-resource collector to the galaxy visit map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::collector::events::{DockedEvent, FsdJumpEvent};
use crate::geometry::{distance, Point3D};
use crate::histogram::{SystemVisitHistogram, Visit};

/// Queue capacity for each of the three producer-facing channels (§5 resource caps).
pub const QUEUE_CAPACITY: usize = 10;

const JUMP_MAX_MARKS: usize = 168;
const JUMP_TIMEFRAME_SECS: i64 = 3600;

/// Per-system visit record: a jump histogram plus one dock histogram per station.
#[derive(Debug, Clone)]
pub struct SystemShipStat {
    pub name: String,
    pub coords: Point3D,
    pub jumps: SystemVisitHistogram,
    pub stations: HashMap<String, SystemVisitHistogram>,
}

impl SystemShipStat {
    fn new(name: String, coords: Point3D) -> Self {
        Self {
            name,
            coords,
            jumps: SystemVisitHistogram::new(JUMP_MAX_MARKS, JUMP_TIMEFRAME_SECS),
            stations: HashMap::new(),
        }
    }
}

/// A single row of `GetSystemStat`'s reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatEntry {
    pub name: String,
    pub coords: Point3D,
    pub total_count: u64,
}

/// One hour-aligned bucket of `GetGalaxyActivityStat`'s reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityBucket {
    pub time_mark: i64,
    pub jump_count: u32,
    pub dock_count: u32,
}

/// Control commands accepted by the owner task, each carrying its own reply channel.
pub enum Command {
    Backup { path: String, reply: oneshot::Sender<bool> },
    Restore { path: String, reply: oneshot::Sender<bool> },
    GetSystemStat {
        origin: Point3D,
        max_radius: f64,
        reply: oneshot::Sender<(Vec<SystemStatEntry>, u64)>,
    },
    GetActivity {
        origin: Point3D,
        max_radius: f64,
        hours: usize,
        reply: oneshot::Sender<Vec<ActivityBucket>>,
    },
    Exit { reply: oneshot::Sender<()> },
}

/// Producer-facing queue-full signal (§7 `BusyError`, §8 scenario 5).
#[derive(Debug, Clone, PartialEq)]
pub struct BusyError(pub String);

impl std::fmt::Display for BusyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BusyError {}

/// Handle held by producers: the network listener and RPC callers. Cloning is
/// cheap — every clone shares the same owner task.
#[derive(Clone)]
pub struct CollectorHandle {
    jump_tx: mpsc::Sender<FsdJumpEvent>,
    dock_tx: mpsc::Sender<DockedEvent>,
    cmd_tx: mpsc::Sender<Command>,
}

impl CollectorHandle {
    /// Enqueues a parsed `FSDJump`. Non-blocking: a full queue returns `BusyError`
    /// immediately rather than stalling the caller.
    pub fn note_fsd_jump(&self, ev: FsdJumpEvent) -> Result<(), BusyError> {
        self.jump_tx
            .try_send(ev)
            .map_err(|_| BusyError("FSD channel is busy".to_string()))
    }

    /// Enqueues a parsed `Docked`. Non-blocking, same contract as `note_fsd_jump`.
    pub fn note_docked(&self, ev: DockedEvent) -> Result<(), BusyError> {
        self.dock_tx
            .try_send(ev)
            .map_err(|_| BusyError("Docked channel is busy".to_string()))
    }

    pub async fn backup(&self, path: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Backup { path: path.into(), reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn restore(&self, path: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Restore { path: path.into(), reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn get_system_stat(
        &self,
        origin: Point3D,
        max_radius: f64,
    ) -> (Vec<SystemStatEntry>, u64) {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::GetSystemStat { origin, max_radius, reply })
            .await
            .is_err()
        {
            return (Vec::new(), 0);
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get_activity(
        &self,
        origin: Point3D,
        max_radius: f64,
        hours: usize,
    ) -> Vec<ActivityBucket> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::GetActivity { origin, max_radius, hours, reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Sends `Exit` and waits for the owner task to acknowledge, draining its
    /// queues first (§5 shutdown ordering).
    pub async fn exit(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Exit { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// The owner task. Not `Clone`, not `Send`-shared — only reachable through `CollectorHandle`.
pub struct CollectorActor {
    systems: HashMap<String, SystemShipStat>,
    jump_rx: mpsc::Receiver<FsdJumpEvent>,
    dock_rx: mpsc::Receiver<DockedEvent>,
    cmd_rx: mpsc::Receiver<Command>,
}

/// Spawns the owner task and returns the handle producers use to reach it.
pub fn spawn() -> (CollectorHandle, tokio::task::JoinHandle<()>) {
    let (jump_tx, jump_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (dock_tx, dock_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (cmd_tx, cmd_rx) = mpsc::channel(QUEUE_CAPACITY);

    let actor = CollectorActor {
        systems: HashMap::new(),
        jump_rx,
        dock_rx,
        cmd_rx,
    };
    let task = tokio::spawn(actor.run());

    (CollectorHandle { jump_tx, dock_tx, cmd_tx }, task)
}

impl CollectorActor {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(ev) = self.jump_rx.recv() => self.apply_fsd_jump(ev),
                Some(ev) = self.dock_rx.recv() => self.apply_docked(ev),
                Some(cmd) = self.cmd_rx.recv() => {
                    if self.apply_command(cmd) {
                        break;
                    }
                }
                else => break,
            }
        }
        info!("collector owner task exiting with {} tracked systems", self.systems.len());
    }

    fn apply_fsd_jump(&mut self, ev: FsdJumpEvent) {
        let key = ev.star_system.to_uppercase();
        let coords = ev.coords;
        let name = ev.star_system.clone();
        let stat = self
            .systems
            .entry(key)
            .or_insert_with(|| SystemShipStat::new(name, coords));
        stat.jumps.note(ev.timestamp_unix);
    }

    fn apply_docked(&mut self, ev: DockedEvent) {
        let key = ev.star_system.to_uppercase();
        let coords = ev.coords;
        let name = ev.star_system.clone();
        let mut newly_created = false;
        let stat = self.systems.entry(key).or_insert_with(|| {
            newly_created = true;
            SystemShipStat::new(name, coords)
        });
        if newly_created {
            // Observer effect: discovering the system via a dock also counts as a jump.
            stat.jumps.note(ev.timestamp_unix);
        }
        let station_hist = stat
            .stations
            .entry(ev.station_name.clone())
            .or_insert_with(|| SystemVisitHistogram::new(JUMP_MAX_MARKS, JUMP_TIMEFRAME_SECS));
        station_hist.note(ev.timestamp_unix);
    }

    /// Applies a control command. Returns `true` if the owner task should stop.
    fn apply_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Backup { path, reply } => {
                let ok = write_backup(&self.systems, &path).is_ok();
                let _ = reply.send(ok);
            }
            Command::Restore { path, reply } => {
                let ok = match read_backup(&path) {
                    Ok(systems) => {
                        self.systems = systems;
                        true
                    }
                    Err(e) => {
                        warn!("restore from {path} failed: {e}");
                        false
                    }
                };
                let _ = reply.send(ok);
            }
            Command::GetSystemStat { origin, max_radius, reply } => {
                let result = self.get_system_stat(origin, max_radius);
                let _ = reply.send(result);
            }
            Command::GetActivity { origin, max_radius, hours, reply } => {
                let result = self.get_activity(origin, max_radius, hours);
                let _ = reply.send(result);
            }
            Command::Exit { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn get_system_stat(&self, origin: Point3D, max_radius: f64) -> (Vec<SystemStatEntry>, u64) {
        let mut entries = Vec::new();
        let mut total = 0u64;
        for stat in self.systems.values() {
            if distance(origin, stat.coords) <= max_radius {
                let count = stat.jumps.total_count();
                total += count;
                entries.push(SystemStatEntry {
                    name: stat.name.clone(),
                    coords: stat.coords,
                    total_count: count,
                });
            }
        }
        (entries, total)
    }

    fn get_activity(&self, origin: Point3D, max_radius: f64, hours: usize) -> Vec<ActivityBucket> {
        let mut jumps: HashMap<i64, u32> = HashMap::new();
        let mut docks: HashMap<i64, u32> = HashMap::new();

        for stat in self.systems.values().filter(|s| distance(origin, s.coords) <= max_radius) {
            for v in &stat.jumps.visits {
                *jumps.entry(v.time_mark).or_insert(0) += v.visit_count;
            }
            for station_hist in stat.stations.values() {
                for v in &station_hist.visits {
                    *docks.entry(v.time_mark).or_insert(0) += v.visit_count;
                }
            }
        }

        let mut marks: Vec<i64> = jumps.keys().chain(docks.keys()).copied().collect();
        marks.sort_unstable();
        marks.dedup();
        let start = marks.len().saturating_sub(hours);

        marks[start..]
            .iter()
            .map(|mark| ActivityBucket {
                time_mark: *mark,
                jump_count: *jumps.get(mark).unwrap_or(&0),
                dock_count: *docks.get(mark).unwrap_or(&0),
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupHistogram {
    max_marks: usize,
    timeframe: i64,
    #[serde(rename = "Visits")]
    visits: Vec<Visit>,
}

impl From<&SystemVisitHistogram> for BackupHistogram {
    fn from(h: &SystemVisitHistogram) -> Self {
        Self { max_marks: h.max_marks, timeframe: h.timeframe, visits: h.visits.clone() }
    }
}

impl From<BackupHistogram> for SystemVisitHistogram {
    fn from(h: BackupHistogram) -> Self {
        Self { max_marks: h.max_marks, timeframe: h.timeframe, visits: h.visits }
    }
}

/// On-disk shape of one line of the NDJSON backup file (§4.E).
#[derive(Debug, Serialize, Deserialize)]
struct BackupRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Coords")]
    coords: Point3D,
    systems_visits: BackupHistogram,
    stations_visits: HashMap<String, BackupHistogram>,
}

impl From<&SystemShipStat> for BackupRecord {
    fn from(stat: &SystemShipStat) -> Self {
        Self {
            name: stat.name.clone(),
            coords: stat.coords,
            systems_visits: BackupHistogram::from(&stat.jumps),
            stations_visits: stat
                .stations
                .iter()
                .map(|(name, hist)| (name.clone(), BackupHistogram::from(hist)))
                .collect(),
        }
    }
}

impl From<BackupRecord> for SystemShipStat {
    fn from(record: BackupRecord) -> Self {
        Self {
            name: record.name,
            coords: record.coords,
            jumps: record.systems_visits.into(),
            stations: record
                .stations_visits
                .into_iter()
                .map(|(name, hist)| (name, hist.into()))
                .collect(),
        }
    }
}

fn write_backup(systems: &HashMap<String, SystemShipStat>, path: &str) -> std::io::Result<()> {
    let mut out = String::new();
    for stat in systems.values() {
        let record = BackupRecord::from(stat);
        out.push_str(&serde_json::to_string(&record).expect("backup record always serializes"));
        out.push('\n');
    }
    std::fs::write(path, out)
}

fn read_backup(path: &str) -> std::io::Result<HashMap<String, SystemShipStat>> {
    let content = std::fs::read_to_string(path)?;
    let mut systems = HashMap::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BackupRecord>(line) {
            Ok(record) => {
                let stat: SystemShipStat = record.into();
                systems.insert(stat.name.to_uppercase(), stat);
            }
            Err(e) => warn!("skipping malformed backup line {}: {e}", line_no + 1),
        }
    }
    Ok(systems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jump(system: &str, x: f64, y: f64, z: f64, ts: i64) -> FsdJumpEvent {
        FsdJumpEvent {
            star_system: system.to_string(),
            coords: Point3D::new(x, y, z),
            timestamp_unix: ts,
        }
    }

    fn dock(system: &str, station: &str, x: f64, y: f64, z: f64, ts: i64) -> DockedEvent {
        DockedEvent {
            star_system: system.to_string(),
            coords: Point3D::new(x, y, z),
            station_name: station.to_string(),
            timestamp_unix: ts,
        }
    }

    #[tokio::test]
    async fn jump_then_stat_reports_total_count() {
        let (handle, task) = spawn();
        handle.note_fsd_jump(jump("Sol", 0.0, 0.0, 0.0, 0)).unwrap();
        handle.note_fsd_jump(jump("Sol", 0.0, 0.0, 0.0, 3600)).unwrap();

        let (entries, total) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_count, 2);
        assert_eq!(total, 2);

        handle.exit().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn docked_without_prior_jump_also_counts_as_a_jump() {
        let (handle, task) = spawn();
        handle.note_docked(dock("Sol", "Daedalus", 0.0, 0.0, 0.0, 0)).unwrap();

        let (entries, _) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_count, 1, "the discovering dock should also count as a jump");

        handle.exit().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn docked_after_a_known_jump_does_not_double_count_as_jump() {
        let (handle, task) = spawn();
        handle.note_fsd_jump(jump("Sol", 0.0, 0.0, 0.0, 0)).unwrap();
        handle.note_docked(dock("Sol", "Daedalus", 0.0, 0.0, 0.0, 60)).unwrap();

        let (entries, _) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
        assert_eq!(entries[0].total_count, 1);

        handle.exit().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn systems_outside_radius_are_excluded() {
        let (handle, task) = spawn();
        handle.note_fsd_jump(jump("Near", 1.0, 0.0, 0.0, 0)).unwrap();
        handle.note_fsd_jump(jump("Far", 1000.0, 0.0, 0.0, 0)).unwrap();

        let (entries, total) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Near");
        assert_eq!(total, 1);

        handle.exit().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips_histograms() {
        let (handle, task) = spawn();
        handle.note_fsd_jump(jump("Sol", 0.0, 0.0, 0.0, 0)).unwrap();
        handle.note_docked(dock("Sol", "Daedalus", 0.0, 0.0, 0.0, 0)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.ndjson");
        let path_str = path.to_string_lossy().into_owned();

        assert!(handle.backup(path_str.clone()).await);

        let (before, before_total) =
            handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;

        assert!(handle.restore(path_str).await);
        let (after, after_total) = handle.get_system_stat(Point3D::new(0.0, 0.0, 0.0), 10.0).await;

        assert_eq!(before_total, after_total);
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].total_count, after[0].total_count);

        handle.exit().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn eleventh_queued_jump_is_busy_until_drained() {
        let (handle, task) = spawn();
        // current_thread flavor: the owner task cannot run until this test
        // yields, and none of the note_fsd_jump calls below are awaited, so
        // the send loop runs to completion before the owner task drains
        // anything. Exactly QUEUE_CAPACITY sends succeed, the rest are busy.
        let mut ok_count: usize = 0;
        let mut busy_count: usize = 0;
        for i in 0..(QUEUE_CAPACITY as i64 * 4) {
            match handle.note_fsd_jump(jump("Sol", 0.0, 0.0, 0.0, i)) {
                Ok(()) => ok_count += 1,
                Err(_) => busy_count += 1,
            }
        }
        assert_eq!(ok_count, QUEUE_CAPACITY);
        assert_eq!(busy_count, QUEUE_CAPACITY * 4 - QUEUE_CAPACITY);

        handle.exit().await;
        task.await.unwrap();
    }
}
