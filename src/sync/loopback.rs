//! In-process transport: a replica session wired straight to a master
//! service in the same process. Used by tests and single-process demos.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::client::{ReplicaSession, SessionCallback};
use super::dispatcher::SessionId;
use super::server::MasterService;
use super::ForwardChannel;
use crate::core::{Result, SyncConfig};

/// Connect a new replica to an in-process master.
///
/// The callback channel is attached before the snapshot replay, like a
/// real transport would: events arriving during the replay reconcile by
/// identifier instead of duplicating.
pub async fn connect(
    master: &Arc<MasterService>,
    config: &SyncConfig,
) -> Result<(Arc<ReplicaSession>, SessionId, oneshot::Receiver<()>)> {
    let forward: Arc<dyn ForwardChannel> = Arc::clone(master) as Arc<dyn ForwardChannel>;
    let (session, lost) = ReplicaSession::new(forward, config);
    let session_id = master
        .attach_replica(Arc::new(SessionCallback::new(Arc::clone(&session))))
        .await;
    session.bootstrap().await?;
    Ok((session, session_id, lost))
}
