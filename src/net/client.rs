use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::wire::{Frame, Request, Response};
use crate::core::{ActionResult, EntityId, Result, SyncConfig, SyncError};
use crate::sync::client::ReplicaSession;
use crate::sync::ForwardChannel;

/// Connect to a master over TCP and open a replica session on the
/// connection: pushes are applied as they arrive, then the snapshot is
/// replayed.
pub async fn connect(
    addr: &str,
    config: &SyncConfig,
) -> Result<(Arc<ReplicaSession>, oneshot::Receiver<()>)> {
    let socket = TcpStream::connect(addr).await?;
    let (reader, writer) = socket.into_split();

    let forward = Arc::new(TcpForward {
        writer: Mutex::new(writer),
        pending: Mutex::new(VecDeque::new()),
    });
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_loop(reader, Arc::clone(&forward), push_tx));

    let channel: Arc<dyn ForwardChannel> = Arc::clone(&forward) as Arc<dyn ForwardChannel>;
    let (session, lost) = ReplicaSession::new(channel, config);

    let push_session = Arc::clone(&session);
    tokio::spawn(async move {
        while let Some(event) = push_rx.recv().await {
            if let Err(e) = push_session.handle_event(event).await {
                warn!("applying pushed event failed: {e}");
            }
        }
    });

    session.bootstrap().await?;
    Ok((session, lost))
}

/// Forward channel over one TCP connection. Requests are written one at a
/// time and the master answers strictly in order, so replies correlate to
/// the oldest pending request.
struct TcpForward {
    writer: Mutex<OwnedWriteHalf>,
    pending: Mutex<VecDeque<oneshot::Sender<Response>>>,
}

impl TcpForward {
    async fn call(&self, request: Request) -> Result<Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            // hold the pending queue across the write so enqueue order
            // matches wire order
            let mut pending = self.pending.lock().await;
            pending.push_back(reply_tx);
            let mut line = serde_json::to_vec(&request)?;
            line.push(b'\n');
            let mut writer = self.writer.lock().await;
            writer.write_all(&line).await?;
            writer.flush().await?;
        }
        let response = reply_rx.await.map_err(|_| {
            SyncError::CommunicationFault("connection closed before reply".to_string())
        })?;
        match response {
            Response::Error { message } => Err(SyncError::Remote(message)),
            other => Ok(other),
        }
    }

    async fn complete(&self, response: Response) {
        match self.pending.lock().await.pop_front() {
            Some(reply_tx) => {
                let _ = reply_tx.send(response);
            }
            None => warn!("reply frame without a pending request"),
        }
    }

    async fn fail_pending(&self) {
        // dropping the senders wakes every waiting call with a fault
        self.pending.lock().await.clear();
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    forward: Arc<TcpForward>,
    push_tx: mpsc::UnboundedSender<crate::core::SyncEvent>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(&line) {
                    Ok(Frame::Reply(response)) => forward.complete(response).await,
                    Ok(Frame::Push(event)) => {
                        if push_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("unreadable frame from master: {e}");
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("master closed the connection");
                break;
            }
            Err(e) => {
                debug!("connection to master failed: {e}");
                break;
            }
        }
    }
    forward.fail_pending().await;
}

fn unexpected(operation: &str) -> SyncError {
    SyncError::Remote(format!("unexpected reply to {operation}"))
}

#[async_trait]
impl ForwardChannel for TcpForward {
    async fn create_user(&self, name: &str) -> Result<EntityId> {
        match self
            .call(Request::CreateUser {
                name: name.to_string(),
            })
            .await?
        {
            Response::Created { id } => Ok(id),
            _ => Err(unexpected("CreateUser")),
        }
    }

    async fn create_role(&self, name: &str) -> Result<EntityId> {
        match self
            .call(Request::CreateRole {
                name: name.to_string(),
            })
            .await?
        {
            Response::Created { id } => Ok(id),
            _ => Err(unexpected("CreateRole")),
        }
    }

    async fn set_role(
        &self,
        user: EntityId,
        role: EntityId,
        present: bool,
    ) -> Result<ActionResult> {
        match self
            .call(Request::SetRole {
                user,
                role,
                present,
            })
            .await?
        {
            Response::Acted { result } => Ok(result),
            _ => Err(unexpected("SetRole")),
        }
    }

    async fn delete_user(&self, user: EntityId) -> Result<ActionResult> {
        match self.call(Request::DeleteUser { user }).await? {
            Response::Acted { result } => Ok(result),
            _ => Err(unexpected("DeleteUser")),
        }
    }

    async fn delete_role(&self, role: EntityId) -> Result<ActionResult> {
        match self.call(Request::DeleteRole { role }).await? {
            Response::Acted { result } => Ok(result),
            _ => Err(unexpected("DeleteRole")),
        }
    }

    async fn fetch_users(&self) -> Result<Vec<(EntityId, String)>> {
        match self.call(Request::FetchUsers).await? {
            Response::Entities { entries } => Ok(entries),
            _ => Err(unexpected("FetchUsers")),
        }
    }

    async fn fetch_roles(&self) -> Result<Vec<(EntityId, String)>> {
        match self.call(Request::FetchRoles).await? {
            Response::Entities { entries } => Ok(entries),
            _ => Err(unexpected("FetchRoles")),
        }
    }

    async fn fetch_user_roles(&self) -> Result<Vec<(EntityId, EntityId)>> {
        match self.call(Request::FetchUserRoles).await? {
            Response::Pairs { entries } => Ok(entries),
            _ => Err(unexpected("FetchUserRoles")),
        }
    }
}
