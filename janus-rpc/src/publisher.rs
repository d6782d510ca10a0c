//! The PUB fanout (§4.9, §6): every event the bus dispatches is re-published
//! on a ZeroMQ `PUB` socket, topic-tagged the way §6 describes (`eTick`,
//! `eOrder`, ..., plus `eTick.<vt_symbol>` for ticks), with a periodic
//! heartbeat so a client can detect a silently-dead socket (§11 supplement).
//!
//! `zmq::Socket` is `!Send` across an await point in practice (the crate
//! gives no such guarantee), so the socket itself lives on a dedicated OS
//! thread; the async side only ever touches a `std::sync::mpsc::Sender`,
//! mirroring how `janus-broker-a::http` keeps its blocking client off the
//! async path.

use janus_bus::{Event, EventBus, LogEvent};
use janus_core::data::{AccountData, ContractData, OrderData, PositionData, TickData, TradeData};
use serde::{Deserialize, Serialize};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireEvent {
    Tick(TickData),
    Trade(TradeData),
    Order(OrderData),
    Position(PositionData),
    Account(AccountData),
    Contract(ContractData),
    Log(LogEvent),
    Heartbeat,
}

fn to_wire(event: &Event) -> Option<WireEvent> {
    match event {
        Event::Tick(tick) => Some(WireEvent::Tick((**tick).clone())),
        Event::Trade(trade) => Some(WireEvent::Trade((**trade).clone())),
        Event::Order(order) => Some(WireEvent::Order((**order).clone())),
        Event::Position(position) => Some(WireEvent::Position((**position).clone())),
        Event::Account(account) => Some(WireEvent::Account((**account).clone())),
        Event::Contract(contract) => Some(WireEvent::Contract((**contract).clone())),
        Event::Log(log) => Some(WireEvent::Log((**log).clone())),
        // Timer is internal cadence, never one of §6's publisher topics.
        Event::Timer(_) => None,
    }
}

/// Runs the publisher until `bus` shuts down. Returns the dedicated socket
/// thread's handle alongside the async drain task so a caller can join both
/// on shutdown (§5 "close sockets → join threads").
pub fn spawn(
    bus: Arc<EventBus>,
    pub_addr: String,
    heartbeat_interval: Duration,
) -> (tokio::task::JoinHandle<()>, std::thread::JoinHandle<()>) {
    let (tx, rx) = std_mpsc::channel::<(String, Vec<u8>)>();

    let socket_addr = pub_addr.clone();
    let socket_thread = std::thread::spawn(move || socket_loop(socket_addr, rx));

    let drain_task = tokio::spawn(async move { drain_bus(bus, tx, heartbeat_interval).await });

    (drain_task, socket_thread)
}

fn socket_loop(pub_addr: String, rx: std_mpsc::Receiver<(String, Vec<u8>)>) {
    let ctx = zmq::Context::new();
    let socket = match ctx.socket(zmq::PUB) {
        Ok(socket) => socket,
        Err(err) => {
            error!(error = %err, "failed to create PUB socket");
            return;
        }
    };
    if let Err(err) = socket.bind(&pub_addr) {
        error!(error = %err, addr = %pub_addr, "failed to bind PUB socket");
        return;
    }
    info!(addr = %pub_addr, "RPC PUB socket bound");

    while let Ok((topic, payload)) = rx.recv() {
        if let Err(err) = socket.send_multipart([topic.as_bytes(), payload.as_slice()], 0) {
            warn!(error = %err, topic = %topic, "failed to publish event");
        }
    }
    info!("RPC PUB loop stopped");
}

async fn drain_bus(bus: Arc<EventBus>, tx: std_mpsc::Sender<(String, Vec<u8>)>, heartbeat_interval: Duration) {
    let mut rx = bus.subscribe_all();
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(event) => publish_event(&tx, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "RPC publisher dropped events due to lag");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("event bus closed, stopping RPC publisher");
                        return;
                    }
                }
            }
            _ = heartbeat.tick() => {
                publish_heartbeat(&tx);
            }
        }
    }
}

fn publish_event(tx: &std_mpsc::Sender<(String, Vec<u8>)>, event: &Event) {
    let Some(wire) = to_wire(event) else { return };
    let topic = event.symbol_topic().unwrap_or_else(|| event.topic().wire_name().to_string());
    match crate::protocol::encode(&wire) {
        Ok(payload) => {
            if tx.send((topic, payload)).is_err() {
                warn!("RPC PUB socket thread is gone, dropping event");
            }
        }
        Err(err) => warn!(error = %err, "failed to encode event for publish"),
    }
}

fn publish_heartbeat(tx: &std_mpsc::Sender<(String, Vec<u8>)>) {
    match crate::protocol::encode(&WireEvent::Heartbeat) {
        Ok(payload) => {
            let _ = tx.send((janus_bus::Topic::Log.wire_name().to_string(), payload));
        }
        Err(err) => warn!(error = %err, "failed to encode heartbeat"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use janus_bus::{LogEvent, LogLevel};

    #[test]
    fn timer_events_are_not_published() {
        assert!(to_wire(&Event::Timer(Utc::now())).is_none());
    }

    #[test]
    fn log_events_round_trip_to_wire() {
        let log = LogEvent {
            level: LogLevel::Info,
            source: "test".to_string(),
            message: "hello".to_string(),
            timestamp: Utc::now(),
        };
        let wire = to_wire(&Event::Log(Arc::new(log.clone()))).unwrap();
        match wire {
            WireEvent::Log(inner) => assert_eq!(inner, log),
            _ => panic!("expected WireEvent::Log"),
        }
    }
}
