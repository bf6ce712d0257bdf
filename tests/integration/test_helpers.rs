//! Shared helpers for engine-level integration tests.
//!
//! [`FakeAgents`] is a scripted in-memory [`AgentClient`]: it serves
//! snapshots from a host table, records every command it receives, and
//! once a transfer has been started feeds the target's disk usage from a
//! script of readings.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use seed_coordinator::agent::{AgentClient, AgentFuture};
use seed_coordinator::models::agent::{AgentCommand, AgentSnapshot, LogicalVolume, MountPoint};
use seed_coordinator::orchestrator::seed_engine::{SeedEngine, SeedTiming};
use seed_coordinator::persistence::db;
use seed_coordinator::persistence::seed_repo::SeedRepo;
use seed_coordinator::AppError;

/// Timing with no waits and the standard stall limit.
pub fn fast_timing() -> SeedTiming {
    SeedTiming {
        listen_grace: Duration::ZERO,
        poll_interval: Duration::ZERO,
        max_stale_polls: 10,
    }
}

/// Timing whose polls never come back within a test.
pub fn slow_timing() -> SeedTiming {
    SeedTiming {
        listen_grace: Duration::ZERO,
        poll_interval: Duration::from_secs(3600),
        max_stale_polls: 10,
    }
}

/// Idle host with no volumes and nothing mounted.
pub fn host(hostname: &str) -> AgentSnapshot {
    AgentSnapshot {
        hostname: hostname.to_owned(),
        port: 3002,
        token: format!("token-{hostname}"),
        mysql_port: 3306,
        ..AgentSnapshot::default()
    }
}

/// Source host offering the given volume paths.
pub fn source_host(hostname: &str, volumes: &[&str]) -> AgentSnapshot {
    let mut snapshot = host(hostname);
    snapshot.mysql_running = true;
    snapshot.logical_volumes = volumes
        .iter()
        .map(|path| LogicalVolume {
            path: (*path).to_owned(),
            is_snapshot: true,
            ..LogicalVolume::default()
        })
        .collect();
    snapshot
}

#[derive(Default)]
struct FakeState {
    hosts: HashMap<String, AgentSnapshot>,
    mounted_usage: HashMap<String, i64>,
    readings: VecDeque<i64>,
    last_reading: i64,
    transfer_target: Option<String>,
    commands: Vec<(String, AgentCommand)>,
    failing_commands: HashSet<String>,
    failing_poll: Option<usize>,
    panicking_host: Option<String>,
}

/// Scripted agent client.
#[derive(Default)]
pub struct FakeAgents {
    state: Mutex<FakeState>,
    polls: AtomicUsize,
}

impl FakeAgents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_host(&self, snapshot: AgentSnapshot) {
        self.lock()
            .hosts
            .insert(snapshot.hostname.clone(), snapshot);
    }

    /// Data volume size `hostname` reports once a volume is mounted.
    pub fn set_mounted_usage(&self, hostname: &str, bytes: i64) {
        self.lock().mounted_usage.insert(hostname.to_owned(), bytes);
    }

    /// Target disk usage readings served after the transfer starts. The
    /// last reading repeats once the script runs out.
    pub fn script_readings(&self, readings: &[i64]) {
        self.lock().readings = readings.iter().copied().collect();
    }

    /// Make every command with this path fail.
    pub fn fail_command(&self, path: &str) {
        self.lock().failing_commands.insert(path.to_owned());
    }

    /// Make the `poll`-th progress poll (1-based) fail.
    pub fn fail_poll(&self, poll: usize) {
        self.lock().failing_poll = Some(poll);
    }

    /// Panic when `hostname` is snapshotted.
    pub fn panic_on(&self, hostname: &str) {
        self.lock().panicking_host = Some(hostname.to_owned());
    }

    /// Progress polls served so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Commands received, in order.
    pub fn commands(&self) -> Vec<(String, AgentCommand)> {
        self.lock().commands.clone()
    }

    /// Command paths received by `hostname`, in order.
    pub fn command_paths(&self, hostname: &str) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .filter(|(host, _)| host == hostname)
            .map(|(_, command)| command.path())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn read(&self, hostname: &str) -> seed_coordinator::Result<AgentSnapshot> {
        let mut state = self.lock();

        if state.panicking_host.as_deref() == Some(hostname) {
            drop(state);
            panic!("scripted panic while reading {hostname}");
        }

        let mut snapshot = state
            .hosts
            .get(hostname)
            .cloned()
            .ok_or_else(|| AppError::UnknownAgent(format!("cannot get agent/token: {hostname}")))?;

        if state.transfer_target.as_deref() == Some(hostname) {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if state.failing_poll == Some(poll) {
                return Err(AppError::AgentUnreachable(format!(
                    "{hostname}/mysql-du: connection refused"
                )));
            }
            if let Some(next) = state.readings.pop_front() {
                state.last_reading = next;
            }
            snapshot.mysql_disk_usage = state.last_reading;
        }

        Ok(snapshot)
    }

    fn execute(&self, hostname: &str, command: &AgentCommand) -> seed_coordinator::Result<String> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.commands.push((hostname.to_owned(), command.clone()));

        if state.failing_commands.contains(&command.path()) {
            return Err(AppError::AgentCommandFailed(format!(
                "{command} on {hostname}: response status 500 Internal Server Error"
            )));
        }

        let mounted_usage = state.mounted_usage.get(hostname).copied().unwrap_or(0);
        let Some(snapshot) = state.hosts.get_mut(hostname) else {
            return Err(AppError::UnknownAgent(format!(
                "cannot get agent/token: {hostname}"
            )));
        };

        match command {
            AgentCommand::MountLogicalVolume(lv) => {
                snapshot.mount_point = MountPoint {
                    path: "/snapshot".into(),
                    lv_path: lv.clone(),
                    is_mounted: true,
                    mysql_disk_usage: mounted_usage,
                    ..MountPoint::default()
                };
            }
            AgentCommand::Unmount => snapshot.mount_point = MountPoint::default(),
            AgentCommand::DeleteDatadir => snapshot.mysql_disk_usage = 0,
            AgentCommand::StopMysql => snapshot.mysql_running = false,
            AgentCommand::StartMysql => snapshot.mysql_running = true,
            AgentCommand::ReceiveSeedData => {}
            AgentCommand::SendSeedData(target) => state.transfer_target = Some(target.clone()),
        }

        Ok("true".into())
    }
}

impl AgentClient for FakeAgents {
    fn snapshot<'a>(&'a self, hostname: &'a str) -> AgentFuture<'a, AgentSnapshot> {
        Box::pin(async move { self.read(hostname) })
    }

    fn run_command<'a>(
        &'a self,
        hostname: &'a str,
        command: &'a AgentCommand,
    ) -> AgentFuture<'a, String> {
        Box::pin(async move { self.execute(hostname, command) })
    }
}

/// Engine over an in-memory database and the given fake agents.
pub async fn test_engine(agents: &Arc<FakeAgents>, timing: SeedTiming) -> (SeedEngine, SeedRepo) {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let repo = SeedRepo::new(db);
    let client: Arc<dyn AgentClient> = Arc::clone(agents) as Arc<dyn AgentClient>;
    let engine = SeedEngine::new(client, repo.clone(), timing);
    (engine, repo)
}

/// The `db2` <- `db1` pair used across scenarios: `db1` offers
/// `/dev/vg0/lv0` holding 1,000,000 bytes.
pub fn standard_pair() -> Arc<FakeAgents> {
    let agents = FakeAgents::new();
    agents.add_host(host("db2"));
    agents.add_host(source_host("db1", &["/dev/vg0/lv0"]));
    agents.set_mounted_usage("db1", 1_000_000);
    agents
}
