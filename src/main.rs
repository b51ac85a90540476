//! Flowline server entry point
//!
//! Serves:
//! - Run triggers at POST /api/runs
//! - Node status polling at GET /api/runs/{run_id}/status
//! - Workflow upserts at POST /api/workflows
//! - Health check at /healthz

use flowline::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to 0.0.0.0:3004 and ./data/flowline.db, overridable via FLOWLINE_* env vars
    let config = Config::default();

    start_server(config).await
}
