use crate::config::BrokerConfig;
use crate::error::BusError;
use crate::transport::{BusLink, Inbox, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Ouvre des liens rumqttc vers un broker.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    broker: BrokerConfig,
}

impl MqttTransport {
    pub fn new(broker: BrokerConfig) -> Self {
        Self { broker }
    }
}

impl Transport for MqttTransport {
    fn open(&self, client_id: &str) -> Arc<dyn BusLink> {
        Arc::new(MqttLink::new(client_id, self.broker.clone()))
    }
}

struct Session {
    client: AsyncClient,
    pump: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

/// Une connexion client MQTT, son event loop pollée dans une task dédiée.
pub struct MqttLink {
    client_id: String,
    broker: BrokerConfig,
    session: Mutex<Option<Session>>,
    routes: Routes,
}

impl MqttLink {
    pub fn new(client_id: &str, broker: BrokerConfig) -> Self {
        Self {
            client_id: client_id.to_string(),
            broker,
            session: Mutex::new(None),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client(&self) -> Result<AsyncClient, BusError> {
        match self.session.lock().as_ref() {
            Some(s) if s.alive.load(Ordering::Acquire) => Ok(s.client.clone()),
            _ => Err(BusError::NotConnected),
        }
    }
}

#[async_trait]
impl BusLink for MqttLink {
    async fn connect(&self) -> Result<(), BusError> {
        if self.is_connected() {
            return Ok(());
        }
        // jette une session morte laissée par un event loop cassé
        if let Some(stale) = self.session.lock().take() {
            stale.pump.abort();
        }

        let mut opts = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        opts.set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs));
        opts.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        let alive = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let pump = tokio::spawn(pump(
            self.client_id.clone(),
            eventloop,
            Arc::clone(&self.routes),
            Arc::clone(&alive),
            ready_tx,
        ));

        let wait = Duration::from_secs(self.broker.connect_timeout_secs);
        let outcome = match timeout(wait, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(BusError::Connect {
                host: self.broker.host.clone(),
                port: self.broker.port,
                reason,
            }),
            Ok(Err(_)) => Err(BusError::Connect {
                host: self.broker.host.clone(),
                port: self.broker.port,
                reason: "event loop ended".into(),
            }),
            Err(_) => Err(BusError::Timeout(self.broker.connect_timeout_secs)),
        };

        match outcome {
            Ok(()) => {
                debug!("[{}] connected to {}:{}", self.client_id, self.broker.host, self.broker.port);
                *self.session.lock() = Some(Session { client, pump, alive });
                Ok(())
            }
            Err(e) => {
                pump.abort();
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.alive.load(Ordering::Acquire))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let client = self.client()?;
        client.publish(topic, QoS::AtMostOnce, false, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Inbox, BusError> {
        let client = self.client()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(topic.to_string(), tx);
        if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
            self.routes.lock().remove(topic);
            return Err(e.into());
        }
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };
        self.routes.lock().clear();

        let Session { client, mut pump, .. } = session;
        let sent = client.disconnect().await;
        // laisse l'event loop vider les publish en file avant le DISCONNECT
        if timeout(DISCONNECT_GRACE, &mut pump).await.is_err() {
            pump.abort();
        }
        sent.map_err(BusError::from)
    }
}

async fn pump(
    client_id: String,
    mut eventloop: EventLoop,
    routes: Routes,
    alive: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                alive.store(true, Ordering::Release);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if let Some(tx) = routes.lock().get(&p.topic) {
                    let _ = tx.send(p.payload.to_vec());
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                match ready.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e.to_string()));
                    }
                    None => warn!("[{client_id}] MQTT connection lost: {e}"),
                }
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
}
