//! Revocation workers.
//!
//! A fixed pool of tasks drains the [`RevocationJob`] queue fed by the grant
//! store. Failures are logged and dropped; nothing is retried.

use std::sync::Arc;

use gatekeeper_core::MembershipId;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use super::grant_store::RevocationJob;
use crate::directory::{Directory, DirectoryError, OperationPoller};

/// Delete a membership and wait for the operation to finish.
///
/// # Errors
///
/// Returns any [`DirectoryError`] from the delete call or the poller.
#[instrument(skip(directory, poller), fields(membership = %membership))]
pub async fn revoke_membership(
    directory: &dyn Directory,
    poller: &OperationPoller,
    membership: &MembershipId,
) -> Result<(), DirectoryError> {
    let operation = directory.delete_membership(membership).await?;
    poller.wait(directory, operation).await?;
    Ok(())
}

/// Start `count` workers sharing one job receiver.
///
/// Workers exit once every sender is dropped and the queue is drained.
pub fn spawn_revocation_workers(
    count: usize,
    jobs: mpsc::UnboundedReceiver<RevocationJob>,
    directory: Arc<dyn Directory>,
    poller: OperationPoller,
) -> Vec<JoinHandle<()>> {
    let jobs = Arc::new(Mutex::new(jobs));

    (0..count.max(1))
        .map(|worker| {
            let jobs = Arc::clone(&jobs);
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                loop {
                    let job = jobs.lock().await.recv().await;
                    let Some(RevocationJob { record }) = job else {
                        break;
                    };

                    match revoke_membership(directory.as_ref(), &poller, &record.membership_id)
                        .await
                    {
                        Ok(()) => info!(
                            worker,
                            membership = %record.membership_id,
                            enqueued_at = %record.enqueued_at,
                            "Membership revoked"
                        ),
                        Err(e) => error!(
                            worker,
                            membership = %record.membership_id,
                            error = %e,
                            "Failed to revoke membership"
                        ),
                    }
                }
            })
        })
        .collect()
}
