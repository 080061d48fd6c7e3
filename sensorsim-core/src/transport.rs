//! Abstraction du bus utilisée par les capteurs.
//!
//! Un [`Transport`] ouvre un [`BusLink`] par client id. Les publish reçus sur un
//! topic abonné arrivent dans l'[`Inbox`] retournée par `subscribe`.

use crate::error::BusError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Payloads reçus sur un topic abonné.
pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

#[async_trait]
pub trait BusLink: Send + Sync {
    /// Connecte si besoin, borné par le timeout du transport.
    async fn connect(&self) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;

    /// Publish best-effort, at-most-once.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, topic: &str) -> Result<Inbox, BusError>;

    async fn disconnect(&self) -> Result<(), BusError>;
}

pub trait Transport: Send + Sync {
    fn open(&self, client_id: &str) -> Arc<dyn BusLink>;
}
