// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/binwatch

//! MQTT live feed

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn, debug};

use super::{FeedConfig, FeedMessage, FeedStatus, FeedSubscription, LiveFeed, LiveReading};
use crate::error::{TelemetryError, TelemetryResult};

/// Subscribes to per-bin telemetry published by the sensor backend
pub struct MqttFeed {
    config: FeedConfig,
}

impl MqttFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker,
            self.config.port,
        );

        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username, password);
        }

        options
    }
}

#[async_trait]
impl LiveFeed for MqttFeed {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn subscribe(&mut self) -> TelemetryResult<FeedSubscription> {
        if self.config.topic.trim().is_empty() {
            return Err(TelemetryError::FeedUnavailable("no MQTT topic configured".into()));
        }

        let (client, mut eventloop) = AsyncClient::new(self.options(), 100);
        info!(
            "Subscribing to {} on {}:{}",
            self.config.topic, self.config.broker, self.config.port
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let reconnect = Duration::from_millis(self.config.reconnect_interval_ms);
        let topic = self.config.topic.clone();

        // Spawn eventloop handler
        tokio::spawn(async move {
            let mut session = Session::new();
            let _ = tx.send(FeedMessage::Status(session.status())).await;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!("MQTT feed cancelled");
                        let _ = client.disconnect().await;
                        break;
                    }
                    event = eventloop.poll() => {
                        let action = match event {
                            Ok(Event::Incoming(packet)) => session.on_packet(packet),
                            Ok(Event::Outgoing(_)) => Action::Ignore,
                            Err(e) => {
                                warn!("MQTT feed error: {:?}", e);
                                let action = session.on_error();
                                if let Action::Forward(message) = action {
                                    if tx.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                // Back off before the eventloop reconnects
                                tokio::select! {
                                    _ = &mut cancel_rx => {
                                        let _ = client.disconnect().await;
                                        break;
                                    }
                                    _ = tokio::time::sleep(reconnect) => {}
                                }
                                Action::Ignore
                            }
                        };

                        let message = match action {
                            // Clean sessions lose their subscriptions, so ask again on every connect
                            Action::Resubscribe => match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                                Ok(()) => None,
                                Err(e) => {
                                    warn!("MQTT subscribe failed: {}", e);
                                    match session.on_error() {
                                        Action::Forward(message) => Some(message),
                                        _ => None,
                                    }
                                }
                            },
                            Action::Forward(message) => Some(message),
                            Action::Ignore => None,
                        };

                        if let Some(message) = message {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(FeedSubscription::new(rx, move || {
            let _ = cancel_tx.send(());
        }))
    }
}

/// What the eventloop task does after an incoming packet
#[derive(Debug)]
enum Action {
    Resubscribe,
    Forward(FeedMessage),
    Ignore,
}

/// Connection state seen by the eventloop task.
///
/// The feed only turns `Live` once the broker acknowledges the topic
/// subscription, so a reconnect that has not resubscribed yet never
/// makes it authoritative.
struct Session {
    status: FeedStatus,
}

impl Session {
    fn new() -> Self {
        Self {
            status: FeedStatus::Connecting,
        }
    }

    fn status(&self) -> FeedStatus {
        self.status
    }

    fn on_packet(&mut self, packet: Packet) -> Action {
        match packet {
            Packet::ConnAck(_) => {
                info!("MQTT feed connected");
                Action::Resubscribe
            }
            Packet::SubAck(suback) => {
                let refused = suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if refused {
                    warn!("MQTT broker refused the telemetry subscription");
                    self.transition(FeedStatus::Unavailable)
                } else {
                    self.transition(FeedStatus::Live)
                }
            }
            Packet::Publish(publish) => Action::Forward(decode(&publish.topic, &publish.payload)),
            _ => Action::Ignore,
        }
    }

    fn on_error(&mut self) -> Action {
        self.transition(FeedStatus::Unavailable)
    }

    fn transition(&mut self, status: FeedStatus) -> Action {
        if self.status == status {
            return Action::Ignore;
        }
        self.status = status;
        Action::Forward(FeedMessage::Status(status))
    }
}

/// Decode a publish, taking the bin id from the topic when the payload omits it
fn decode(topic: &str, payload: &[u8]) -> FeedMessage {
    match LiveReading::from_json(payload) {
        Ok(mut reading) => {
            if reading.bin_id.is_empty() {
                if let Some(bin_id) = bin_id_from_topic(topic) {
                    reading.bin_id = bin_id.to_string();
                }
            }
            FeedMessage::Reading(reading)
        }
        Err(e) => FeedMessage::Rejected(e),
    }
}

/// `smartbin/bins/<bin_id>/telemetry` -> `<bin_id>`
fn bin_id_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    while let Some(part) = parts.next() {
        if part == "bins" {
            return parts.next().filter(|id| !id.is_empty());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, SubAck};

    #[test]
    fn test_bin_id_from_topic() {
        assert_eq!(bin_id_from_topic("smartbin/bins/SB01/telemetry"), Some("SB01"));
        assert_eq!(bin_id_from_topic("smartbin/other"), None);
        assert_eq!(bin_id_from_topic("bins//telemetry"), None);
    }

    #[test]
    fn test_decode_fills_bin_id_from_topic() {
        let payload = br#"{"fill_level_percent":12,"timestamp":"2026-01-01T00:00:00Z"}"#;
        match decode("smartbin/bins/SB07/telemetry", payload) {
            FeedMessage::Reading(r) => {
                assert_eq!(r.bin_id, "SB07");
                assert_eq!(r.fill_level_percent, Some(12.0));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    fn connack() -> Packet {
        Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false))
    }

    fn suback(code: SubscribeReasonCode) -> Packet {
        Packet::SubAck(SubAck::new(1, vec![code]))
    }

    fn forwarded_status(action: Action) -> Option<FeedStatus> {
        match action {
            Action::Forward(FeedMessage::Status(status)) => Some(status),
            _ => None,
        }
    }

    #[test]
    fn test_live_only_after_subscription_is_acknowledged() {
        let mut session = Session::new();

        assert!(matches!(session.on_packet(connack()), Action::Resubscribe));
        assert_eq!(session.status(), FeedStatus::Connecting);

        let action = session.on_packet(suback(SubscribeReasonCode::Success(QoS::AtLeastOnce)));
        assert_eq!(forwarded_status(action), Some(FeedStatus::Live));
    }

    #[test]
    fn test_reconnect_resubscribes_before_going_live_again() {
        let mut session = Session::new();
        session.on_packet(connack());
        session.on_packet(suback(SubscribeReasonCode::Success(QoS::AtLeastOnce)));

        assert_eq!(forwarded_status(session.on_error()), Some(FeedStatus::Unavailable));
        // repeated errors while down report nothing new
        assert!(matches!(session.on_error(), Action::Ignore));

        assert!(matches!(session.on_packet(connack()), Action::Resubscribe));
        assert_eq!(session.status(), FeedStatus::Unavailable);
        assert!(!session.status().is_authoritative());

        let action = session.on_packet(suback(SubscribeReasonCode::Success(QoS::AtLeastOnce)));
        assert_eq!(forwarded_status(action), Some(FeedStatus::Live));
    }

    #[test]
    fn test_refused_subscription_is_unavailable() {
        let mut session = Session::new();
        session.on_packet(connack());
        let action = session.on_packet(suback(SubscribeReasonCode::Failure));
        assert_eq!(forwarded_status(action), Some(FeedStatus::Unavailable));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("smartbin/bins/SB01/telemetry", b"\x00\x01"),
            FeedMessage::Rejected(_)
        ));
    }
}
