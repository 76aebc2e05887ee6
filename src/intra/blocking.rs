//! Blocking adapters over [`IntraClient`].
//!
//! The detector is a synchronous fold, so it runs on a blocking thread and
//! these adapters drive each request to completion with [`Handle::block_on`].
//! They must not be used from inside an async task.

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::IntraClient;
use crate::analysis::LevelResolver;
use crate::models::EvaluationRecord;
use crate::source::RecordSource;

/// Level lookups against `/v2/users/:login`.
pub struct IntraLevels {
    client: Arc<IntraClient>,
    handle: Handle,
}

impl IntraLevels {
    pub fn new(client: Arc<IntraClient>, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl LevelResolver for IntraLevels {
    fn resolve(&mut self, login: &str) -> Option<f64> {
        match self.handle.block_on(self.client.user_level(login)) {
            Ok(level) => level,
            Err(e) if e.is_not_found() => {
                debug!("User {} not found", login);
                None
            }
            Err(e) => {
                warn!("Level lookup for {} failed: {}", login, e);
                None
            }
        }
    }
}

/// Evaluations given by a login, fetched page by page.
pub struct IntraRecords {
    client: Arc<IntraClient>,
    handle: Handle,
}

impl IntraRecords {
    pub fn new(client: Arc<IntraClient>, handle: Handle) -> Self {
        Self { client, handle }
    }
}

impl RecordSource for IntraRecords {
    fn given_by(&mut self, login: &str) -> Vec<EvaluationRecord> {
        match self.handle.block_on(self.client.given_evaluations(login)) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not fetch evaluations of {}: {}", login, e);
                Vec::new()
            }
        }
    }

    fn received_by(&mut self, login: &str) -> Vec<EvaluationRecord> {
        match self.handle.block_on(self.client.received_evaluations(login)) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not fetch evaluations received by {}: {}", login, e);
                Vec::new()
            }
        }
    }

    fn describe(&self) -> String {
        self.client.config().api_url.clone()
    }
}
