//! In-process gossip fan-out.
//!
//! The production transport is an external collaborator; this hub is the
//! narrow stand-in that connects the engines of an N-node cluster inside
//! one process. Delivery is best-effort, unordered between peers, and
//! never back to the sender: the exact contract the engine assumes.

use std::collections::HashMap;
use std::sync::Arc;

use agora_consensus::{ChainTag, Gossip, Inbound, MessageKind};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::wire::Envelope;

pub struct LocalHub {
    peers: RwLock<HashMap<String, mpsc::UnboundedSender<Envelope>>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { peers: RwLock::new(HashMap::new()) })
    }

    /// Register a node. Inbound envelopes are routed by chain tag to the
    /// node's per-chain stores on a dedicated dispatch task; the returned
    /// handle is the node's outbound side.
    pub fn join(
        self: &Arc<Self>,
        node_id: impl Into<String>,
        data: Arc<dyn Inbound>,
        table: Arc<dyn Inbound>,
    ) -> Arc<HubGossip> {
        let node_id = node_id.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        self.peers.write().insert(node_id.clone(), tx);

        let dispatch_id = node_id.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let kind = match envelope.message_kind() {
                    Ok(kind) => kind,
                    Err(e) => {
                        debug!(node = %dispatch_id, error = %e, "dropping envelope");
                        continue;
                    }
                };
                match envelope.chain_tag() {
                    Ok(ChainTag::Data) => data.deliver(kind, &envelope.payload),
                    Ok(ChainTag::Table) => table.deliver(kind, &envelope.payload),
                    Err(e) => debug!(node = %dispatch_id, error = %e, "dropping envelope"),
                }
            }
        });

        Arc::new(HubGossip { hub: self.clone(), node_id })
    }

    /// Unregister a node; its dispatch task drains and exits.
    pub fn leave(&self, node_id: &str) {
        self.peers.write().remove(node_id);
    }

    fn fan_out(&self, from: &str, envelope: Envelope) {
        let peers = self.peers.read();
        for (id, tx) in peers.iter() {
            if id == from {
                continue;
            }
            // A closed receiver just means the peer left; best-effort.
            let _ = tx.send(envelope.clone());
        }
    }
}

/// A node's outbound gossip handle into the hub.
pub struct HubGossip {
    hub: Arc<LocalHub>,
    node_id: String,
}

impl HubGossip {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl Gossip for HubGossip {
    fn gossip(&self, chain: ChainTag, kind: MessageKind, payload: Vec<u8>) {
        self.hub.fan_out(&self.node_id, Envelope::new(chain, kind, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records everything delivered to it.
    struct Recorder {
        seen: Mutex<Vec<(MessageKind, Vec<u8>)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<(MessageKind, Vec<u8>)> {
            self.seen.lock().clone()
        }
    }

    impl Inbound for Recorder {
        fn deliver(&self, kind: MessageKind, payload: &[u8]) {
            self.seen.lock().push((kind, payload.to_vec()));
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn fan_out_skips_the_sender() {
        let hub = LocalHub::new();
        let (a_data, a_table) = (Recorder::new(), Recorder::new());
        let (b_data, b_table) = (Recorder::new(), Recorder::new());
        let a = hub.join("a", a_data.clone(), a_table.clone());
        let _b = hub.join("b", b_data.clone(), b_table.clone());

        a.gossip(ChainTag::Data, MessageKind::Block, vec![7]);
        settle().await;

        assert!(a_data.seen().is_empty());
        assert_eq!(b_data.seen(), vec![(MessageKind::Block, vec![7])]);
        assert!(b_table.seen().is_empty());
    }

    #[tokio::test]
    async fn envelopes_route_by_chain_tag() {
        let hub = LocalHub::new();
        let a = hub.join("a", Recorder::new(), Recorder::new());
        let (b_data, b_table) = (Recorder::new(), Recorder::new());
        let _b = hub.join("b", b_data.clone(), b_table.clone());

        a.gossip(ChainTag::Table, MessageKind::Vote, vec![1]);
        a.gossip(ChainTag::Data, MessageKind::Vote, vec![2]);
        settle().await;

        assert_eq!(b_table.seen(), vec![(MessageKind::Vote, vec![1])]);
        assert_eq!(b_data.seen(), vec![(MessageKind::Vote, vec![2])]);
    }

    #[tokio::test]
    async fn all_peers_except_sender_receive() {
        let hub = LocalHub::new();
        let recorders: Vec<_> = (0..4).map(|_| Recorder::new()).collect();
        let mut handles = Vec::new();
        for (i, rec) in recorders.iter().enumerate() {
            handles.push(hub.join(format!("node-{i}"), rec.clone(), Recorder::new()));
        }

        handles[2].gossip(ChainTag::Data, MessageKind::Proposal, vec![9]);
        settle().await;

        for (i, rec) in recorders.iter().enumerate() {
            if i == 2 {
                assert!(rec.seen().is_empty());
            } else {
                assert_eq!(rec.seen().len(), 1);
            }
        }
    }

    #[tokio::test]
    async fn departed_peers_stop_receiving() {
        let hub = LocalHub::new();
        let a = hub.join("a", Recorder::new(), Recorder::new());
        let b_data = Recorder::new();
        let _b = hub.join("b", b_data.clone(), Recorder::new());

        hub.leave("b");
        a.gossip(ChainTag::Data, MessageKind::Block, vec![1]);
        settle().await;

        assert!(b_data.seen().is_empty());
    }
}
