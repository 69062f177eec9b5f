//! Store maintenance.

use serde::Serialize;
use tracing::{debug, info};

use crate::driver::GraphStore;
use crate::errors::Result;

/// What [`reset`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub constraints: usize,
    pub indexes: usize,
}

/// Drop every constraint, then every index, then delete all nodes and edges.
///
/// Not atomic: a failure partway returns the error and leaves whatever was
/// already dropped dropped.
pub async fn reset<S: GraphStore>(store: &S) -> Result<ResetReport> {
    let mut report = ResetReport::default();

    for name in store.list_constraints().await? {
        store.drop_constraint(&name).await?;
        debug!(constraint = %name, "dropped constraint");
        report.constraints += 1;
    }

    // Listed after the constraints go, since dropping a constraint also
    // removes its backing index.
    for name in store.list_indexes().await? {
        store.drop_index(&name).await?;
        debug!(index = %name, "dropped index");
        report.indexes += 1;
    }

    store.delete_all().await?;
    info!(
        constraints = report.constraints,
        indexes = report.indexes,
        "store reset"
    );
    Ok(report)
}
