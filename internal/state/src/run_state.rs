//! Bookkeeping the pass manager uses to resume an interrupted run: which
//! pass last completed, and what schema version the artifacts on disk were
//! written with. Mirrors the `run_state` table in `cvs2dvcs-store`.

use serde::{Deserialize, Serialize};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunState {
    pub last_completed_pass: Option<String>,
    pub schema_version: u32,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            last_completed_pass: None,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}
