use reverse_relay_common::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::{Config, Worker, local};

/// Launches `max_connections` workers and waits on them
pub struct AgentPool {
    config: Arc<Config>,
}

impl AgentPool {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run all workers
    ///
    /// Workers heal themselves, so this only returns when one of them halts on
    /// a fatal error (a rejected secret). The remaining workers are aborted.
    pub async fn run(&self) -> Result<()> {
        let client = local::build_client(self.config.request_timeout)?;
        let mut workers = JoinSet::new();

        for id in 0..self.config.max_connections {
            let worker = Worker::new(id, self.config.clone(), client.clone());
            workers.spawn(worker.run());
        }

        info!(
            "Launched {} tunnel workers towards {}",
            self.config.max_connections, self.config.relay_addr
        );

        while let Some(result) = workers.join_next().await {
            match result {
                Ok(Err(e)) => return Err(e),
                Ok(Ok(())) => {}
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        Ok(())
    }
}
