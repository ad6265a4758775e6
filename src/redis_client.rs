use redis::{aio::ConnectionManager, Client, RedisError, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RedisConfig;

#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl RedisClient {
    pub async fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(RedisClient {
            conn,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Runs `op` on a fresh handle of the shared connection, repeating it only
    /// while the failure is a pure connectivity problem.
    pub async fn with_retry<T, F, Fut>(&self, op_name: &str, mut op: F) -> RedisResult<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(self.conn.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry_attempts && is_connectivity_failure(&e) => {
                    warn!(
                        "redis {} failed on attempt {}/{}: {}; retrying",
                        op_name, attempt, self.retry_attempts, e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Connection-level failures. Script errors, type errors and the like are
/// answers from the server and must not be replayed.
pub fn is_connectivity_failure(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_answers_are_not_retried() {
        let type_error = RedisError::from((redis::ErrorKind::TypeError, "Parse error"));
        assert!(!is_connectivity_failure(&type_error));

        let script_error = RedisError::from((redis::ErrorKind::ResponseError, "ERR user_script"));
        assert!(!is_connectivity_failure(&script_error));
    }

    #[test]
    fn io_failures_are_retried() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_connectivity_failure(&RedisError::from(io)));
    }
}
