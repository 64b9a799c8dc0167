use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use orgsync::net::SyncServer;
use orgsync::{Coordinator, MasterService, SyncConfig, UserView, net};

/// Replicated users-and-roles directory node.
///
/// Without `--connect` this node becomes the master and serves replicas on
/// the listen address; with it, the node joins the given master as a
/// replica. Either way a small command shell drives the directory.
#[derive(Parser)]
#[command(name = "orgsync")]
struct Args {
    /// Master address to join; omit to become the master
    #[arg(long)]
    connect: Option<String>,

    /// Listen address in master mode
    #[arg(long, default_value = "127.0.0.1:7455")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = SyncConfig::new();

    match args.connect {
        None => run_master(&args.listen, config).await,
        Some(addr) => run_replica(&addr, config).await,
    }
}

async fn run_master(listen: &str, config: SyncConfig) -> anyhow::Result<()> {
    let master = MasterService::start(&config);
    let server = SyncServer::bind(Arc::clone(&master), listen)
        .await
        .with_context(|| format!("cannot listen on {listen}"))?;
    println!("master node, listening on {}", server.local_addr()?);

    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("sync server stopped: {e}");
        }
    });

    shell(Arc::clone(master.coordinator())).await
}

async fn run_replica(addr: &str, config: SyncConfig) -> anyhow::Result<()> {
    let (session, lost) = net::connect(addr, &config)
        .await
        .with_context(|| format!("cannot join master at {addr}"))?;
    println!("replica node, joined master at {addr}");

    let coordinator = Arc::clone(session.coordinator());
    tokio::select! {
        result = shell(coordinator) => result,
        _ = lost => {
            session.close();
            anyhow::bail!("connection to master lost; session is void")
        }
    }
}

async fn shell(coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    println!(
        "commands: add-user, add-role, grant, revoke, del-user, del-role, users, roles, grants, quit"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["add-user", name] => {
                match coordinator.add_user(name, None).await? {
                    Some(id) => println!("user '{name}' -> {id}"),
                    None => println!("user '{name}' pending confirmation"),
                }
            }
            ["add-role", name] => {
                match coordinator.add_role(name, None).await? {
                    Some(id) => println!("role '{name}' -> {id}"),
                    None => println!("role '{name}' pending confirmation"),
                }
            }
            ["grant", user, role] => {
                println!("{:?}", coordinator.add_role_to_user(user, role).await);
            }
            ["revoke", user, role] => {
                println!("{:?}", coordinator.remove_role_from_user(user, role).await);
            }
            ["del-user", name] => {
                coordinator.delete_user_by_name(name).await;
                println!("ok");
            }
            ["del-role", name] => {
                coordinator.delete_role_by_name(name).await;
                println!("ok");
            }
            ["users"] => {
                for view in coordinator.list_users().await {
                    let id = view
                        .id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "pending".to_string());
                    println!("{} [{}] roles: {}", view.name, id, view.roles.join(", "));
                }
            }
            ["roles"] => {
                for (name, id) in coordinator.list_roles().await {
                    let id = id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "pending".to_string());
                    println!("{name} [{id}]");
                }
            }
            ["grants"] => {
                for line in grant_lines(&coordinator.list_users().await) {
                    println!("{line}");
                }
            }
            _ => println!("unrecognized command"),
        }
    }
    Ok(())
}

/// One line per user-role membership, role names resolved locally.
fn grant_lines(views: &[UserView]) -> Vec<String> {
    views
        .iter()
        .flat_map(|view| {
            view.roles
                .iter()
                .map(move |role| format!("{} -> {}", view.name, role))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_lines_render_memberships() {
        let master = MasterService::start(&SyncConfig::new());
        let directory = master.coordinator();

        let admin = directory.add_role("Admin", None).await.unwrap().unwrap();
        let dev = directory.add_role("Dev", None).await.unwrap().unwrap();
        let alice = directory.add_user("alice", None).await.unwrap().unwrap();
        let bob = directory.add_user("bob", None).await.unwrap().unwrap();
        directory.set_role(alice, admin, true).await;
        directory.set_role(alice, dev, true).await;
        directory.set_role(bob, dev, true).await;

        let lines = grant_lines(&directory.list_users().await);
        assert_eq!(lines, vec!["alice -> Admin", "alice -> Dev", "bob -> Dev"]);
    }
}
