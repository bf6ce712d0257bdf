//! Remote host agent access.
//!
//! The [`AgentClient`] trait is the seam between the seed engine and the
//! per-host agents. [`http_client::HttpAgentClient`] talks to real agents
//! over HTTP; tests substitute scripted implementations.

pub mod http_client;
pub mod refresh;

use std::future::Future;
use std::pin::Pin;

use crate::models::agent::{AgentCommand, AgentSnapshot};
use crate::Result;

/// Boxed future returned by [`AgentClient`] methods.
pub type AgentFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Reads state from and issues commands to a single host's agent.
pub trait AgentClient: Send + Sync {
    /// Fetch a fresh snapshot of `hostname`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownAgent`](crate::AppError::UnknownAgent) if
    /// the host is not registered, or
    /// [`AppError::AgentUnreachable`](crate::AppError::AgentUnreachable) if
    /// the mount or volume query fails.
    fn snapshot<'a>(&'a self, hostname: &'a str) -> AgentFuture<'a, AgentSnapshot>;

    /// Issue `command` to the agent on `hostname`, returning the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownAgent`](crate::AppError::UnknownAgent) if
    /// the host is not registered,
    /// [`AppError::AgentUnreachable`](crate::AppError::AgentUnreachable) if
    /// the request cannot be sent or times out, or
    /// [`AppError::AgentCommandFailed`](crate::AppError::AgentCommandFailed)
    /// if the agent answers with an error status.
    fn run_command<'a>(
        &'a self,
        hostname: &'a str,
        command: &'a AgentCommand,
    ) -> AgentFuture<'a, String>;
}
