use serde_json::json;

use seed_coordinator::models::agent::{
    AgentCommand, AgentEndpoint, AgentSnapshot, LogicalVolume, MountPoint,
};
use seed_coordinator::models::seed::{SeedOperation, SeedStep};
use seed_coordinator::orchestrator::SeedState;

#[test]
fn command_paths_match_agent_api() {
    let cases = [
        (AgentCommand::MountLogicalVolume("/dev/vg0/lv0".into()), "mountlv"),
        (AgentCommand::Unmount, "umount"),
        (AgentCommand::DeleteDatadir, "delete-mysql-datadir"),
        (AgentCommand::StopMysql, "mysql-stop"),
        (AgentCommand::StartMysql, "mysql-start"),
        (AgentCommand::ReceiveSeedData, "receive-mysql-seed-data"),
        (
            AgentCommand::SendSeedData("db2".into()),
            "send-mysql-seed-data/db2",
        ),
    ];

    for (command, path) in cases {
        assert_eq!(command.path(), path);
    }
}

#[test]
fn only_mount_carries_arguments() {
    let mount = AgentCommand::MountLogicalVolume("/dev/vg0/lv0".into());
    assert_eq!(mount.args(), vec![("lv", "/dev/vg0/lv0".to_owned())]);
    assert_eq!(mount.to_string(), "mountlv /dev/vg0/lv0");

    assert!(AgentCommand::SendSeedData("db2".into()).args().is_empty());
    assert_eq!(AgentCommand::Unmount.to_string(), "umount");
}

#[test]
fn endpoint_base_uri_points_at_api_root() {
    let endpoint = AgentEndpoint {
        hostname: "db1".into(),
        port: 3002,
        token: "t".into(),
    };
    assert_eq!(endpoint.base_uri(), "http://db1:3002/api");
}

#[test]
fn agent_volume_and_mount_json_is_pascal_case() {
    let volume: LogicalVolume = serde_json::from_value(json!({
        "Name": "lv0",
        "GroupName": "vg0",
        "Path": "/dev/vg0/lv0",
        "IsSnapshot": true,
        "SnapshotPercent": 12.5,
        "Unexpected": "ignored"
    }))
    .expect("volume");
    assert_eq!(volume.group_name, "vg0");
    assert!(volume.is_snapshot);
    assert!((volume.snapshot_percent - 12.5).abs() < f64::EPSILON);

    let mount: MountPoint = serde_json::from_value(json!({
        "LVPath": "/dev/vg0/lv0",
        "IsMounted": true,
        "MySQLDiskUsage": 42
    }))
    .expect("mount");
    assert_eq!(mount.lv_path, "/dev/vg0/lv0");
    assert!(mount.is_mounted);
    assert_eq!(mount.mysql_disk_usage, 42);
    assert!(mount.path.is_empty());
}

#[test]
fn snapshot_json_never_carries_token() {
    let snapshot = AgentSnapshot {
        hostname: "db1".into(),
        token: "secret".into(),
        ..AgentSnapshot::default()
    };

    let value = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(value["hostname"], "db1");
    assert!(value.get("token").is_none());
    assert!(!value.to_string().contains("secret"));
}

#[test]
fn new_operation_is_incomplete() {
    let operation = SeedOperation::new("db2".into(), "db1".into());

    assert!(!operation.is_complete);
    assert!(!operation.is_successful);
    assert!(operation.end_timestamp.is_none());
    assert!(operation.involves("db1"));
    assert!(operation.involves("db2"));
    assert!(!operation.involves("db3"));
    assert_ne!(
        operation.id,
        SeedOperation::new("db2".into(), "db1".into()).id
    );
}

#[test]
fn new_step_has_no_error() {
    let step = SeedStep::new("op".into(), "Erasing MySQL data on db2".into());
    assert!(step.error_message.is_empty());
    assert_eq!(step.seed_operation_id, "op");
}

#[test]
fn only_completed_and_failed_are_terminal() {
    assert!(SeedState::Completed.is_terminal());
    assert!(SeedState::Failed.is_terminal());
    assert!(!SeedState::Validating.is_terminal());
    assert!(!SeedState::Polling.is_terminal());
    assert_eq!(
        serde_json::to_value(SeedState::PrecheckTarget).expect("serialize"),
        json!("precheck_target")
    );
}
