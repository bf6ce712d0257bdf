//! HTTP implementation of [`AgentClient`].
//!
//! Every request resolves the host's capability token from the registry
//! first and passes it as the `token` query parameter.

use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

use crate::models::agent::{
    AgentCommand, AgentEndpoint, AgentSnapshot, LogicalVolume, MountPoint,
};
use crate::persistence::agent_repo::AgentRepo;
use crate::{AppError, Result};

use super::{AgentClient, AgentFuture};

/// Agent client backed by `reqwest` and the agent registry.
#[derive(Clone)]
pub struct HttpAgentClient {
    registry: AgentRepo,
    http: reqwest::Client,
}

impl HttpAgentClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(registry: AgentRepo, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { registry, http })
    }

    /// Issue a status read and decode its JSON body.
    async fn query<T: DeserializeOwned>(&self, endpoint: &AgentEndpoint, path: &str) -> Result<T> {
        let unreachable = |detail: String| {
            AppError::AgentUnreachable(format!("{}/{path}: {detail}", endpoint.hostname))
        };

        let response = self
            .http
            .get(format!("{}/{path}", endpoint.base_uri()))
            .query(&[("token", endpoint.token.as_str())])
            .send()
            .await
            .map_err(|err| unreachable(redact(err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("response status {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| unreachable(format!("malformed response: {}", redact(err))))
    }

    /// Status read whose failure leaves the field at its default.
    async fn query_or_default<T: DeserializeOwned + Default>(
        &self,
        endpoint: &AgentEndpoint,
        path: &str,
    ) -> T {
        match self.query(endpoint, path).await {
            Ok(value) => value,
            Err(err) => {
                debug!(hostname = %endpoint.hostname, path, %err, "optional agent query failed");
                T::default()
            }
        }
    }

    async fn fetch_snapshot(&self, hostname: &str) -> Result<AgentSnapshot> {
        let endpoint = self.registry.lookup_endpoint(hostname).await?;

        let (
            logical_volumes,
            mount_point,
            available_local_snapshots,
            available_snapshots,
            mysql_running,
            mysql_port,
            mysql_disk_usage,
        ) = tokio::join!(
            self.query::<Vec<LogicalVolume>>(&endpoint, "lvs-snapshots"),
            self.query::<MountPoint>(&endpoint, "mount"),
            self.query_or_default::<Vec<String>>(&endpoint, "available-snapshots-local"),
            self.query_or_default::<Vec<String>>(&endpoint, "available-snapshots"),
            self.query_or_default::<bool>(&endpoint, "mysql-status"),
            self.query_or_default::<i64>(&endpoint, "mysql-port"),
            self.query_or_default::<i64>(&endpoint, "mysql-du"),
        );

        Ok(AgentSnapshot {
            hostname: endpoint.hostname.clone(),
            port: endpoint.port,
            token: endpoint.token.clone(),
            mysql_running,
            mysql_port,
            mysql_disk_usage,
            mount_point: mount_point?,
            logical_volumes: logical_volumes?,
            available_local_snapshots,
            available_snapshots,
        })
    }

    async fn execute(&self, hostname: &str, command: &AgentCommand) -> Result<String> {
        let endpoint = self.registry.lookup_endpoint(hostname).await?;
        let unreachable = |detail: String| {
            AppError::AgentUnreachable(format!("{command} on {hostname}: {detail}"))
        };

        let mut params = command.args();
        params.push(("token", endpoint.token.clone()));

        debug!(hostname, %command, "issuing agent command");
        let response = self
            .http
            .get(format!("{}/{}", endpoint.base_uri(), command.path()))
            .query(&params)
            .send()
            .await
            .map_err(|err| unreachable(redact(err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| unreachable(format!("unreadable response: {}", redact(err))))?;

        if !status.is_success() {
            return Err(AppError::AgentCommandFailed(format!(
                "{command} on {hostname}: response status {status}: {}",
                body.trim()
            )));
        }

        Ok(body)
    }
}

/// Render a transport error without its request URL, which carries the token.
pub(crate) fn redact(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

impl AgentClient for HttpAgentClient {
    fn snapshot<'a>(&'a self, hostname: &'a str) -> AgentFuture<'a, AgentSnapshot> {
        Box::pin(
            self.fetch_snapshot(hostname)
                .instrument(info_span!("agent_snapshot", hostname)),
        )
    }

    fn run_command<'a>(
        &'a self,
        hostname: &'a str,
        command: &'a AgentCommand,
    ) -> AgentFuture<'a, String> {
        Box::pin(
            self.execute(hostname, command)
                .instrument(info_span!("agent_command", hostname)),
        )
    }
}
