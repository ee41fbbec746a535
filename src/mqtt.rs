use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{MqttOptions, QoS, SubscribeFilter};
use serde_derive::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config;
use crate::manager::RefreshService;
use crate::messages::{StateChanged, StateField, StateUpdate, TrackerMessage};
use crate::snapshot::Snapshot;

/// Timestamp fields published alongside an entity's state; not part of it
const IGNORED_FIELDS: [&str; 3] = ["last_changed", "last_updated", "last_reported"];

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    topic_path: String,
    topics: HubTopics,
    refresh_service: String,
}

/// Where the hub publishes, and how each topic is read
#[derive(Debug, Clone)]
struct HubTopics {
    eventstream: String,
    statestream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    event_type: String,
    #[serde(default)]
    event_data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StateChangedData {
    entity_id: String,
    old_state: Option<Snapshot>,
    new_state: Option<Snapshot>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ServiceCallMessage<'a> {
    service: &'a str,
    entity_id: &'a str,
}

impl MqttClient {
    pub fn new(
        config: &config::MqttConfig,
        refresh_service: &str,
    ) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"zwave-settle".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id,
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                topic_path: config
                    .topic_path
                    .clone()
                    .unwrap_or("zwave-settle".to_string()),
                topics: HubTopics {
                    eventstream: config
                        .eventstream_topic
                        .clone()
                        .unwrap_or("homeassistant/events".to_string()),
                    statestream: config.statestream_topic.clone(),
                },
                refresh_service: refresh_service.to_string(),
            },
            eventloop,
        )
    }

    pub async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        let mut filters = vec![SubscribeFilter::new(
            self.topics.eventstream.clone(),
            QoS::AtLeastOnce,
        )];
        if let Some(base) = &self.topics.statestream {
            filters.push(SubscribeFilter::new(format!("{base}/#"), QoS::AtMostOnce));
        }
        self.client.subscribe_many(filters).await
    }

    /// Forward hub publications to the tracker until its inbox closes
    pub async fn event_loop(
        &self,
        eventloop: &mut rumqttc::EventLoop,
        tx: mpsc::UnboundedSender<TrackerMessage>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::Publish(p)) => {
                        let Some(message) = self.topics.route(&p.topic, &p.payload, p.retain)
                        else {
                            continue;
                        };
                        if tx.send(message).is_err() {
                            debug!("Tracker inbox closed, leaving MQTT event loop");
                            break;
                        }
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::SubAck(_)) => {
                        debug!("Subscription acknowledged");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        info!("Connected to MQTT broker");
                        if let Err(err) = self.subscribe().await {
                            error!("Error subscribing to MQTT topics: {:?}", err);
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub async fn call_service(&self, entity_id: &str) -> Result<(), rumqttc::ClientError> {
        let message = ServiceCallMessage {
            service: &self.refresh_service,
            entity_id,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Could not encode service call for {}: {:?}", entity_id, err);
                return Ok(());
            }
        };
        self.client
            .publish(
                format!("{}/service", self.topic_path),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .await
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

impl RefreshService for MqttClient {
    async fn refresh(&self, entity_id: &str) {
        debug!("refresh for {}", entity_id);
        if let Err(err) = self.call_service(entity_id).await {
            error!("Error requesting refresh of {}: {:?}", entity_id, err);
        }
    }
}

impl HubTopics {
    fn route(&self, topic: &str, payload: &[u8], retain: bool) -> Option<TrackerMessage> {
        if topic == self.eventstream {
            return parse_eventstream(payload, retain).map(TrackerMessage::StateChanged);
        }
        let base = self.statestream.as_deref()?;
        parse_statestream(base, topic, payload).map(TrackerMessage::StateUpdate)
    }
}

/// Read a `state_changed` event from the event stream; other events are skipped
fn parse_eventstream(payload: &[u8], retain: bool) -> Option<StateChanged> {
    let message: EventMessage = match serde_json::from_slice(payload) {
        Ok(message) => message,
        Err(err) => {
            warn!("Unreadable event stream message: {:?}", err);
            return None;
        }
    };
    if message.event_type != "state_changed" {
        return None;
    }
    let data: StateChangedData = match serde_json::from_value(message.event_data) {
        Ok(data) => data,
        Err(err) => {
            warn!("Malformed state_changed event: {:?}", err);
            return None;
        }
    };
    Some(StateChanged {
        entity_id: data.entity_id,
        old: data.old_state,
        new: data.new_state,
        retained: retain,
    })
}

/// Turn `<base>/<domain>/<object_id>/<field>` into a state update
fn parse_statestream(base: &str, topic: &str, payload: &[u8]) -> Option<StateUpdate> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let (Some(domain), Some(object_id), Some(field), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if domain.is_empty() || object_id.is_empty() || IGNORED_FIELDS.contains(&field) {
        return None;
    }

    let field = match field {
        "state" => StateField::State(String::from_utf8_lossy(payload).into_owned()),
        name => {
            let value = serde_json::from_slice(payload).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
            });
            StateField::Attribute(name.to_string(), value)
        }
    };

    Some(StateUpdate {
        entity_id: format!("{domain}.{object_id}"),
        field,
    })
}
