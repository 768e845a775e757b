// ABOUTME: MySQL connection establishment for the mirror engine
// ABOUTME: Builds connection options, applies the connect timeout and retry budget

use crate::config::{EndpointConfig, MirrorConfig, RetryPolicy};
use crate::utils::retry_with_backoff;
use anyhow::{Context, Result};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use std::time::Duration;

/// Build mysql_async connection options from an endpoint config.
fn build_opts(endpoint: &EndpointConfig) -> OptsBuilder {
    OptsBuilder::default()
        .ip_or_hostname(endpoint.host.clone())
        .tcp_port(endpoint.port)
        .user(Some(endpoint.user.clone()))
        .pass(Some(endpoint.password.clone()))
        .db_name(Some(endpoint.database.clone()))
}

/// Connect to a MySQL endpoint with a per-attempt timeout and bounded retries.
///
/// Each attempt is capped at `connect_timeout`; failed attempts are retried
/// with exponential backoff until the policy's budget is exhausted.
pub async fn connect(
    endpoint: &EndpointConfig,
    connect_timeout: Duration,
    policy: &RetryPolicy,
) -> Result<Conn> {
    let display = endpoint.display();

    retry_with_backoff(
        || async {
            let opts = build_opts(endpoint);
            match tokio::time::timeout(connect_timeout, Conn::new(opts)).await {
                Ok(conn) => conn.with_context(|| format!("Failed to connect to {}", display)),
                Err(_) => anyhow::bail!(
                    "Connection to {} timed out after {:?}",
                    display,
                    connect_timeout
                ),
            }
        },
        policy,
    )
    .await
    .with_context(|| {
        format!(
            "Connection to {} failed after {} attempt(s)",
            display, policy.max_attempts
        )
    })
}

/// Connect to the source endpoint of a mirror config.
pub async fn connect_source(config: &MirrorConfig) -> Result<Conn> {
    tracing::info!("Connecting to source {}", config.source.display());
    connect(&config.source, config.connect_timeout, &config.retry).await
}

/// Connect to the target endpoint of a mirror config.
pub async fn connect_target(config: &MirrorConfig) -> Result<Conn> {
    tracing::info!("Connecting to target {}", config.target.display());
    connect(&config.target, config.connect_timeout, &config.retry).await
}

/// Toggle foreign key enforcement on the session.
///
/// Session-scoped, not transactional: callers must restore enforcement
/// before the connection is reused for anything else.
pub async fn set_foreign_key_checks(conn: &mut Conn, enabled: bool) -> Result<()> {
    let value = if enabled { 1 } else { 0 };
    conn.query_drop(format!("SET FOREIGN_KEY_CHECKS = {}", value))
        .await
        .with_context(|| format!("Failed to set FOREIGN_KEY_CHECKS = {}", value))
}
