use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use super::wire::{Frame, Request, Response};
use crate::core::{Result, SyncError, SyncEvent};
use crate::sync::server::MasterService;
use crate::sync::{CallbackChannel, ForwardChannel};

/// TCP front of a master: accepts replica connections and serves the
/// forward operations over newline-delimited JSON, pushing callback frames
/// down the same connection.
pub struct SyncServer {
    master: Arc<MasterService>,
    listener: TcpListener,
}

impl SyncServer {
    pub async fn bind(master: Arc<MasterService>, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("sync server listening on {}", listener.local_addr()?);
        Ok(Self { master, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!("replica connected from {peer}");
            let master = Arc::clone(&self.master);
            tokio::spawn(async move {
                if let Err(e) = serve_replica(master, socket).await {
                    debug!("replica {peer} disconnected: {e}");
                }
            });
        }
    }
}

/// Push half of one connection; write faults surface as communication
/// faults so the dispatcher queues the event.
struct TcpCallback {
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

#[async_trait]
impl CallbackChannel for TcpCallback {
    async fn deliver(&self, event: SyncEvent) -> Result<()> {
        write_frame(&self.writer, &Frame::Push(event))
            .await
            .map_err(|e| SyncError::CommunicationFault(e.to_string()))
    }
}

async fn serve_replica(master: Arc<MasterService>, socket: TcpStream) -> Result<()> {
    let (reader, writer) = socket.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let session = master
        .attach_replica(Arc::new(TcpCallback {
            writer: Arc::clone(&writer),
        }))
        .await;

    let result = request_loop(&master, reader, &writer).await;
    master.detach_replica(session).await;
    result
}

async fn request_loop(
    master: &Arc<MasterService>,
    reader: tokio::net::tcp::OwnedReadHalf,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
) -> Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        let request: Request = serde_json::from_str(&line)?;
        let response = handle_request(master, request).await;
        write_frame(writer, &Frame::Reply(response)).await?;
    }
    Ok(())
}

async fn handle_request(master: &Arc<MasterService>, request: Request) -> Response {
    let result = dispatch(master, request).await;
    match result {
        Ok(response) => response,
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    }
}

async fn dispatch(master: &Arc<MasterService>, request: Request) -> Result<Response> {
    Ok(match request {
        Request::CreateUser { name } => Response::Created {
            id: master.create_user(&name).await?,
        },
        Request::CreateRole { name } => Response::Created {
            id: master.create_role(&name).await?,
        },
        Request::SetRole {
            user,
            role,
            present,
        } => Response::Acted {
            result: master.set_role(user, role, present).await?,
        },
        Request::DeleteUser { user } => Response::Acted {
            result: master.delete_user(user).await?,
        },
        Request::DeleteRole { role } => Response::Acted {
            result: master.delete_role(role).await?,
        },
        Request::FetchUsers => Response::Entities {
            entries: master.fetch_users().await?,
        },
        Request::FetchRoles => Response::Entities {
            entries: master.fetch_roles().await?,
        },
        Request::FetchUserRoles => Response::Pairs {
            entries: master.fetch_user_roles().await?,
        },
    })
}

async fn write_frame(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    frame: &Frame,
) -> Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    let mut writer = writer.lock().await;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
