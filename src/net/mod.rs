pub mod client;
pub mod server;
pub mod wire;

pub use client::connect;
pub use server::SyncServer;
pub use wire::{Frame, Request, Response};
