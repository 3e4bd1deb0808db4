//! # libp2p Gossip Transport
//!
//! A [`Transport`] over a libp2p gossipsub swarm (TCP, Noise, Yamux).
//!
//! The swarm is owned by a single driver task. [`P2pTransport`] talks to it
//! over channels: publishes go in as commands, gossip messages come out on
//! an inbound queue. Gossipsub does not deliver a node's own messages back
//! to it, so the driver copies every local publish onto the inbound queue
//! as well. The local receive loop then sees the same stream a remote peer
//! does, and drops the copy as a duplicate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spore_protocol::config::{MAX_ENVELOPE_BYTES, PUBSUB_TOPIC};
use spore_protocol::network::transport::{InboundMessage, Transport, TransportError};

use crate::metrics::SharedMetrics;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const COMMAND_QUEUE: usize = 256;
const INBOUND_QUEUE: usize = 1024;

#[derive(NetworkBehaviour)]
struct SporeBehaviour {
    gossipsub: gossipsub::Behaviour,
}

enum Command {
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Settings for [`spawn`].
#[derive(Debug, Clone)]
pub struct P2pConfig {
    pub listen_port: u16,
    pub bootstrap: Vec<String>,
}

/// Handle to the swarm driver.
pub struct P2pTransport {
    local_peer_id: PeerId,
    commands: mpsc::Sender<Command>,
    inbound: Mutex<mpsc::Receiver<InboundMessage>>,
    peers: Arc<AtomicU64>,
}

impl P2pTransport {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Shared count of connected peers, for the status endpoint.
    pub fn peer_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.peers)
    }
}

#[async_trait]
impl Transport for P2pTransport {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(Command::Publish {
                topic: topic.to_string(),
                data,
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        done.await.map_err(|_| TransportError::Closed)?
    }

    async fn next_message(&self) -> Result<InboundMessage, TransportError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }
}

/// Build the swarm, subscribe to the ledger topic, dial bootstrap peers,
/// and start the driver task. The driver stops once every
/// [`P2pTransport`] handle is dropped.
pub fn spawn(config: P2pConfig, metrics: SharedMetrics) -> Result<(P2pTransport, JoinHandle<()>)> {
    let mut swarm = build_swarm()?;
    let local_peer_id = *swarm.local_peer_id();

    let topic = gossipsub::IdentTopic::new(PUBSUB_TOPIC);
    swarm
        .behaviour_mut()
        .gossipsub
        .subscribe(&topic)
        .map_err(|e| anyhow!("gossipsub subscribe failed: {e:?}"))?;

    let listen: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.listen_port)
        .parse()
        .context("invalid listen address")?;
    swarm
        .listen_on(listen)
        .context("failed to start p2p listener")?;

    for raw in &config.bootstrap {
        match raw.parse::<Multiaddr>() {
            Ok(addr) => match swarm.dial(addr.clone()) {
                Ok(()) => info!(%addr, "dialing bootstrap peer"),
                Err(e) => warn!(%addr, error = %e, "bootstrap dial failed"),
            },
            Err(e) => warn!(addr = %raw, error = %e, "ignoring invalid bootstrap address"),
        }
    }

    let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let peers = Arc::new(AtomicU64::new(0));

    let driver = Driver {
        swarm,
        local_peer_id,
        inbound: inbound_tx,
        peers: Arc::clone(&peers),
        metrics,
    };
    let handle = tokio::spawn(driver.run(command_rx));

    info!(peer_id = %local_peer_id, topic = PUBSUB_TOPIC, "p2p transport started");
    Ok((
        P2pTransport {
            local_peer_id,
            commands,
            inbound: Mutex::new(inbound_rx),
            peers,
        },
        handle,
    ))
}

fn build_swarm() -> Result<Swarm<SporeBehaviour>> {
    let swarm = libp2p::SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| anyhow!("failed to configure tcp transport: {e}"))?
        .with_behaviour(|key| -> Result<SporeBehaviour, BoxError> {
            let config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(1))
                .validation_mode(gossipsub::ValidationMode::Strict)
                .max_transmit_size(MAX_ENVELOPE_BYTES as usize)
                .build()?;
            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                config,
            )?;
            Ok(SporeBehaviour { gossipsub })
        })
        .map_err(|e| anyhow!("failed to build behaviour: {e}"))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    Ok(swarm)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver {
    swarm: Swarm<SporeBehaviour>,
    local_peer_id: PeerId,
    inbound: mpsc::Sender<InboundMessage>,
    peers: Arc<AtomicU64>,
    metrics: SharedMetrics,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Publish { topic, data, reply }) => {
                        let result = self.publish(topic, data).await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                event = self.swarm.select_next_some() => self.on_event(event).await,
            }
        }
        info!("p2p transport stopped");
    }

    async fn publish(&mut self, topic: String, data: Vec<u8>) -> Result<(), TransportError> {
        let ident = gossipsub::IdentTopic::new(topic.clone());
        match self
            .swarm
            .behaviour_mut()
            .gossipsub
            .publish(ident, data.clone())
        {
            Ok(_) => {}
            Err(gossipsub::PublishError::InsufficientPeers) => {
                debug!("no gossip peers yet, message stays local");
            }
            Err(e) => return Err(TransportError::Publish(e.to_string())),
        }
        self.deliver(InboundMessage {
            topic,
            source: Some(self.local_peer_id.to_string()),
            data,
        })
        .await;
        Ok(())
    }

    async fn deliver(&mut self, message: InboundMessage) {
        if self.inbound.send(message).await.is_err() {
            debug!("inbound queue closed, dropping message");
        }
    }

    async fn on_event(&mut self, event: SwarmEvent<SporeBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(SporeBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                self.deliver(InboundMessage {
                    topic: message.topic.as_str().to_string(),
                    source: Some(propagation_source.to_string()),
                    data: message.data,
                })
                .await;
            }
            SwarmEvent::Behaviour(SporeBehaviourEvent::Gossipsub(
                gossipsub::Event::Subscribed { peer_id, topic },
            )) => {
                debug!(%peer_id, topic = %topic, "peer subscribed");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "p2p listening");
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                if num_established.get() == 1 {
                    self.set_peers(self.peers.load(Ordering::Relaxed) + 1);
                }
                info!(%peer_id, "peer connected");
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.set_peers(self.peers.load(Ordering::Relaxed).saturating_sub(1));
                }
                info!(%peer_id, "peer disconnected");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(peer_id = ?peer_id, error = %error, "outgoing connection failed");
            }
            _ => {}
        }
    }

    fn set_peers(&self, count: u64) {
        self.peers.store(count, Ordering::Relaxed);
        self.metrics.connected_peers.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use spore_protocol::metrics::LedgerMetrics;

    #[tokio::test]
    async fn own_publishes_loop_back() {
        let metrics = Arc::new(NodeMetrics::new(LedgerMetrics::new()));
        let (transport, driver) = spawn(
            P2pConfig {
                listen_port: 0,
                bootstrap: vec!["not-a-multiaddr".into()],
            },
            metrics,
        )
        .unwrap();

        transport
            .publish(PUBSUB_TOPIC, b"looped".to_vec())
            .await
            .unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), transport.next_message())
            .await
            .expect("loopback in time")
            .unwrap();

        assert_eq!(message.topic, PUBSUB_TOPIC);
        assert_eq!(message.data, b"looped".to_vec());
        assert_eq!(
            message.source,
            Some(transport.local_peer_id().to_string())
        );
        assert_eq!(transport.peer_counter().load(Ordering::Relaxed), 0);

        drop(transport);
        tokio::time::timeout(Duration::from_secs(5), driver)
            .await
            .expect("driver stops")
            .unwrap();
    }
}
