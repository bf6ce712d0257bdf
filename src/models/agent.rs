//! Agent registry records, point-in-time host snapshots, and agent commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered agent as listed by the registry. Tokens are never included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Agent {
    /// Host the agent runs on.
    pub hostname: String,
    /// Port of the agent HTTP API.
    pub port: u16,
    /// Last time the agent announced itself.
    pub last_submitted: DateTime<Utc>,
    /// Last time the coordinator tried to refresh this agent.
    pub last_checked: Option<DateTime<Utc>>,
    /// Last time a refresh succeeded.
    pub last_seen: Option<DateTime<Utc>>,
    /// Logical volume count observed at the last successful refresh.
    pub count_mysql_snapshots: i64,
}

/// Registry entry carrying the capability token needed to talk to an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    /// Host the agent runs on.
    pub hostname: String,
    /// Port of the agent HTTP API.
    pub port: u16,
    /// Capability token passed on every request.
    pub token: String,
}

impl AgentEndpoint {
    /// Base URI of the agent API.
    #[must_use]
    pub fn base_uri(&self) -> String {
        format!("http://{}:{}/api", self.hostname, self.port)
    }
}

/// A candidate cloneable volume reported by `/lvs-snapshots`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct LogicalVolume {
    /// Volume name.
    pub name: String,
    /// Volume group the volume belongs to.
    pub group_name: String,
    /// Device path passed to `mountlv`.
    pub path: String,
    /// Whether the volume is an LVM snapshot.
    pub is_snapshot: bool,
    /// Fill percentage of the snapshot's copy-on-write area.
    pub snapshot_percent: f64,
}

/// Mount state of the agent's snapshot mount point, reported by `/mount`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct MountPoint {
    /// Mount directory.
    pub path: String,
    /// Mounted device.
    pub device: String,
    /// Logical volume path backing the mount.
    #[serde(rename = "LVPath")]
    pub lv_path: String,
    /// File system type.
    pub file_system: String,
    /// Whether a volume is currently mounted.
    pub is_mounted: bool,
    /// Total disk usage of the mount, in bytes.
    pub disk_usage: i64,
    /// Size of the MySQL data directory on the mount, in bytes.
    #[serde(rename = "MySQLDiskUsage")]
    pub mysql_disk_usage: i64,
}

/// Point-in-time view of a host, fetched fresh on every read.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentSnapshot {
    /// Host the snapshot describes.
    pub hostname: String,
    /// Port of the agent HTTP API.
    pub port: u16,
    /// Capability token; never serialized.
    #[serde(skip)]
    pub token: String,
    /// Whether `mysqld` is running on the host.
    pub mysql_running: bool,
    /// Port `mysqld` listens on.
    pub mysql_port: i64,
    /// Size of the live MySQL data directory, in bytes.
    pub mysql_disk_usage: i64,
    /// Snapshot mount point state.
    pub mount_point: MountPoint,
    /// Candidate source volumes, in the order the agent listed them.
    pub logical_volumes: Vec<LogicalVolume>,
    /// Hosts in the same datacenter that hold snapshots.
    pub available_local_snapshots: Vec<String>,
    /// All hosts that hold snapshots.
    pub available_snapshots: Vec<String>,
}

/// Control command issued to an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Mount the given logical volume on the snapshot mount point.
    MountLogicalVolume(String),
    /// Unmount the snapshot mount point.
    Unmount,
    /// Delete the MySQL data directory. Irreversible.
    DeleteDatadir,
    /// Stop `mysqld`.
    StopMysql,
    /// Start `mysqld`.
    StartMysql,
    /// Start listening for incoming seed data in the background.
    ReceiveSeedData,
    /// Stream the mounted data directory to the given target host.
    SendSeedData(String),
}

impl AgentCommand {
    /// Path segment appended to the agent base URI.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::MountLogicalVolume(_) => "mountlv".into(),
            Self::Unmount => "umount".into(),
            Self::DeleteDatadir => "delete-mysql-datadir".into(),
            Self::StopMysql => "mysql-stop".into(),
            Self::StartMysql => "mysql-start".into(),
            Self::ReceiveSeedData => "receive-mysql-seed-data".into(),
            Self::SendSeedData(target) => format!("send-mysql-seed-data/{target}"),
        }
    }

    /// Command arguments carried as query parameters, excluding the token.
    #[must_use]
    pub fn args(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::MountLogicalVolume(lv) => vec![("lv", lv.clone())],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MountLogicalVolume(lv) => write!(f, "mountlv {lv}"),
            other => f.write_str(&other.path()),
        }
    }
}
