/*!
Bus MQTT mocké pour développement sans broker

Implémente `Transport` / `BusLink` de sensorsim-core en mémoire.
Enregistre tous les messages publiés, route les publications vers les
abonnés comme le ferait un broker, et permet de simuler la réception
ou une panne du broker.
*/

use async_trait::async_trait;
use sensorsim_core::error::BusError;
use sensorsim_core::kind::SensorKind;
use sensorsim_core::transport::{BusLink, Inbox, Transport};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// `None` pour les messages injectés par `simulate_incoming`
    pub client_id: Option<String>,
}

struct Subscriber {
    client_id: String,
    topic: String,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

struct BusState {
    published: Vec<MockMessage>,
    subscribers: Vec<Subscriber>,
    connected: HashSet<String>,
    reachable: bool,
    connect_attempts: usize,
}

impl BusState {
    fn deliver(&mut self, topic: &str, payload: &[u8]) -> usize {
        // les inbox fermées sont purgées au passage
        self.subscribers
            .retain(|s| s.topic != topic || s.sender.send(payload.to_vec()).is_ok());
        self.subscribers.iter().filter(|s| s.topic == topic).count()
    }

    fn drop_client(&mut self, client_id: &str) {
        self.connected.remove(client_id);
        self.subscribers.retain(|s| s.client_id != client_id);
    }
}

/// Broker en mémoire partagé par tous les liens qu'il ouvre
#[derive(Clone)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                published: Vec::new(),
                subscribers: Vec::new(),
                connected: HashSet::new(),
                reachable: true,
                connect_attempts: 0,
            })),
        }
    }

    /// Simule une panne (ou le retour) du broker pour les prochains `connect`
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
        log::info!("[MOCK] broker reachable = {}", reachable);
    }

    /// Simule la réception d'un message; retourne le nombre d'abonnés servis
    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> usize
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let topic = topic.into();
        let payload = payload.into();
        let delivered = self.state.lock().unwrap().deliver(&topic, &payload);
        log::info!("[MOCK] simulated incoming on {} -> {} subscribers", topic, delivered);
        delivered
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Toute la télémétrie publiée par un capteur, tous topics confondus
    pub fn telemetry_for(&self, sensor_id: u32) -> Vec<Value> {
        let topics: Vec<&str> = SensorKind::ALL.iter().map(|k| k.topic()).collect();
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|msg| topics.contains(&msg.topic.as_str()))
            .filter_map(|msg| serde_json::from_slice::<Value>(&msg.payload).ok())
            .filter(|json| json["sensorId"] == sensor_id)
            .collect()
    }

    /// Abonnements actifs sous forme (client, topic)
    pub fn get_subscriptions(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .map(|s| (s.client_id.clone(), s.topic.clone()))
            .collect()
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state.lock().unwrap().connected.contains(client_id)
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Reset des messages enregistrés (les connexions restent ouvertes)
    pub fn clear(&self) {
        self.state.lock().unwrap().published.clear();
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockBus {
    fn open(&self, client_id: &str) -> Arc<dyn BusLink> {
        Arc::new(MockLink {
            client_id: client_id.to_string(),
            bus: self.clone(),
        })
    }
}

struct MockLink {
    client_id: String,
    bus: MockBus,
}

#[async_trait]
impl BusLink for MockLink {
    async fn connect(&self) -> Result<(), BusError> {
        let mut state = self.bus.state.lock().unwrap();
        state.connect_attempts += 1;
        if !state.reachable {
            return Err(BusError::Connect {
                host: "mock".into(),
                port: 1883,
                reason: "broker unreachable".into(),
            });
        }
        // clean session
        state.drop_client(&self.client_id);
        state.connected.insert(self.client_id.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.bus.is_connected(&self.client_id)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.bus.state.lock().unwrap();
        if !state.connected.contains(&self.client_id) {
            return Err(BusError::NotConnected);
        }
        state.deliver(topic, &payload);
        state.published.push(MockMessage {
            topic: topic.to_string(),
            payload,
            client_id: Some(self.client_id.clone()),
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Inbox, BusError> {
        let mut state = self.bus.state.lock().unwrap();
        if !state.connected.contains(&self.client_id) {
            return Err(BusError::NotConnected);
        }
        let (sender, inbox) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            client_id: self.client_id.clone(),
            topic: topic.to_string(),
            sender,
        });
        Ok(inbox)
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.bus.state.lock().unwrap().drop_client(&self.client_id);
        Ok(())
    }
}

/// Helper pour créer des messages de contrôle bruts (y compris invalides)
pub struct ControlMessageBuilder;

impl ControlMessageBuilder {
    pub fn broadcast(command: &str) -> Value {
        serde_json::json!({ "command": command })
    }

    pub fn targeted(command: &str, sensor_id: u32) -> Value {
        serde_json::json!({ "command": command, "sensorId": sensor_id })
    }

    pub fn set_value(sensor_id: u32, value: Value) -> Value {
        serde_json::json!({ "command": "set_value", "sensorId": sensor_id, "value": value })
    }

    pub fn set_range(sensor_id: u32, min: Value, max: Value) -> Value {
        serde_json::json!({ "command": "set_range", "sensorId": sensor_id, "min": min, "max": max })
    }

    pub fn set_rate(sensor_id: u32, rate: Value) -> Value {
        serde_json::json!({ "command": "set_rate", "sensorId": sensor_id, "rate": rate })
    }
}
