use std::sync::Arc;
use std::time::Duration;

use seed_coordinator::persistence::agent_repo::AgentRepo;
use seed_coordinator::persistence::db;
use seed_coordinator::AppError;

async fn repo() -> AgentRepo {
    AgentRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

#[tokio::test]
async fn submit_registers_and_updates_agent() {
    let repo = repo().await;

    repo.submit("db1", 3002, "first").await.expect("submit");
    let registered = repo.get("db1").await.expect("get").expect("db1");
    assert_eq!(registered.port, 3002);
    assert!(registered.last_checked.is_none());
    assert!(registered.last_seen.is_none());

    repo.submit("db1", 4002, "second").await.expect("resubmit");
    let updated = repo.get("db1").await.expect("get").expect("db1");
    assert_eq!(updated.port, 4002);
    assert!(updated.last_submitted >= registered.last_submitted);

    let endpoint = repo.lookup_endpoint("db1").await.expect("endpoint");
    assert_eq!(endpoint.token, "second");
    assert_eq!(endpoint.port, 4002);
    assert_eq!(repo.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn lookup_requires_registration_and_token() {
    let repo = repo().await;
    repo.submit("db1", 3002, "").await.expect("submit");

    for hostname in ["db1", "db9"] {
        let err = repo.lookup_endpoint(hostname).await.expect_err("unknown");
        assert_eq!(
            err,
            AppError::UnknownAgent(format!("cannot get agent/token: {hostname}"))
        );
    }
}

#[tokio::test]
async fn list_is_sorted_by_hostname() {
    let repo = repo().await;
    for hostname in ["db3", "db1", "db2"] {
        repo.submit(hostname, 3002, "t").await.expect("submit");
    }

    let hostnames: Vec<String> = repo
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|agent| agent.hostname)
        .collect();
    assert_eq!(hostnames, vec!["db1", "db2", "db3"]);
}

#[tokio::test]
async fn checked_agents_leave_outdated_list() {
    let repo = repo().await;
    repo.submit("db1", 3002, "t").await.expect("submit");
    repo.submit("db2", 3002, "t").await.expect("submit");

    assert_eq!(
        repo.list_outdated_hostnames(60).await.expect("outdated"),
        vec!["db1", "db2"]
    );

    repo.update_last_checked("db1").await.expect("checked");
    assert_eq!(
        repo.list_outdated_hostnames(60).await.expect("outdated"),
        vec!["db2"]
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(
        repo.list_outdated_hostnames(0).await.expect("outdated"),
        vec!["db1", "db2"]
    );
}

#[tokio::test]
async fn update_info_records_volume_count() {
    let repo = repo().await;
    repo.submit("db1", 3002, "t").await.expect("submit");

    repo.update_info("db1", 3).await.expect("info");

    let agent = repo.get("db1").await.expect("get").expect("db1");
    assert!(agent.last_seen.is_some());
    assert_eq!(agent.count_mysql_snapshots, 3);
    assert_eq!(
        repo.count_snapshots(&["db1".to_owned(), "db9".to_owned()])
            .await
            .expect("count"),
        vec![("db1".to_owned(), 3)]
    );
}

#[tokio::test]
async fn forget_removes_only_stale_submissions() {
    let repo = repo().await;
    repo.submit("db1", 3002, "t").await.expect("submit");

    assert_eq!(repo.forget_unseen(6).await.expect("forget"), 0);
    assert!(repo.get("db1").await.expect("get").is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(repo.forget_unseen(0).await.expect("forget"), 1);
    assert!(repo.get("db1").await.expect("get").is_none());
}
