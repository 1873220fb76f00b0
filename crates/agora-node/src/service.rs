//! Node service wiring.
//!
//! Builds the fixed-membership cluster in-process: per member, a keypair,
//! two chains with their peer stores, and two engines joined to the
//! gossip hub. The application chains are external collaborators, so
//! dev-mode stand-ins bridge their queues: a ticker feeds payload hashes
//! in, a logging consumer drains committed blocks out.

use std::sync::Arc;
use std::time::Duration;

use agora_consensus::{ChainTag, Engine, Gossip, PayloadDescriptor, Peer};
use agora_core::{Block, Blockchain};
use agora_crypto::{sha256_concat, Keypair};
use agora_network::LocalHub;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use crate::config::Config;

/// Queue depth between the application side and an engine. One payload
/// is consumed per round, so a short buffer is plenty.
const PAYLOAD_QUEUE_DEPTH: usize = 8;

pub struct NodeService {
    config: Config,
}

impl NodeService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bring up every cluster member and run until Ctrl-C.
    pub async fn start(&self) -> anyhow::Result<()> {
        let hub = LocalHub::new();
        let mut tasks = Vec::new();

        for member in &self.config.cluster.members {
            let keypair = self.member_keypair(member)?;
            info!(node = %member, pubkey = %keypair.public(), "starting cluster member");
            tasks.extend(spawn_member(&hub, member, keypair, &self.config));
        }

        info!(members = self.config.cluster.members.len(), "cluster running, Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        for task in tasks {
            task.abort();
        }
        Ok(())
    }

    /// This node's key comes from the config when set; other in-process
    /// members derive deterministic dev keys from their names.
    fn member_keypair(&self, member: &str) -> anyhow::Result<Keypair> {
        if member == self.config.node.name {
            if let Some(seed) = self.config.key_seed()? {
                return Ok(Keypair::from_seed(seed)?);
            }
        }
        let seed = sha256_concat(&[b"agora-dev-key:", member.as_bytes()]);
        Ok(Keypair::from_seed(seed)?)
    }
}

/// Spawn both engines of one member plus their dev-mode queue bridges.
fn spawn_member(
    hub: &Arc<LocalHub>,
    member: &str,
    keypair: Keypair,
    config: &Config,
) -> Vec<JoinHandle<()>> {
    let keypair = Arc::new(keypair);
    let data_chain = Arc::new(Blockchain::new());
    let table_chain = Arc::new(Blockchain::new());
    let data_peer = Arc::new(Peer::new(data_chain.clone()));
    let table_peer = Arc::new(Peer::new(table_chain.clone()));
    let gossip: Arc<dyn Gossip> = hub.join(member, data_peer.clone(), table_peer.clone());

    let mut tasks = Vec::new();
    for (tag, chain, peer) in [
        (ChainTag::Data, data_chain, data_peer),
        (ChainTag::Table, table_chain, table_peer),
    ] {
        let engine = Arc::new(Engine::new(tag, keypair.clone(), chain, peer, gossip.clone()));
        let (payload_tx, payload_rx) = mpsc::channel(PAYLOAD_QUEUE_DEPTH);
        let (block_tx, block_rx) = mpsc::channel(PAYLOAD_QUEUE_DEPTH);

        tasks.push(spawn_payload_ticker(
            member.to_string(),
            tag,
            config.dev.payload_interval_ms,
            payload_tx,
        ));
        tasks.push(spawn_commit_logger(member.to_string(), tag, block_rx));

        let name = member.to_string();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = engine.run(payload_rx, block_tx).await {
                error!(node = %name, chain = %tag, error = %e, "engine stopped fatally");
            }
        }));
    }
    tasks
}

/// Dev stand-in for the inbound application queue: deterministic payload
/// hashes derived from node name, chain and sequence number.
fn spawn_payload_ticker(
    member: String,
    tag: ChainTag,
    interval_ms: u64,
    tx: mpsc::Sender<PayloadDescriptor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
        let mut sequence = 0u64;
        loop {
            ticker.tick().await;
            sequence += 1;
            let payload_hash = sha256_concat(&[
                member.as_bytes(),
                tag.to_string().as_bytes(),
                &sequence.to_be_bytes(),
            ]);
            let descriptor =
                PayloadDescriptor { payload_hash: payload_hash.to_vec(), round_hint: sequence };
            if tx.send(descriptor).await.is_err() {
                break;
            }
        }
    })
}

/// Dev stand-in for the outbound application queue: log every committed
/// block where the application chain would consume it.
fn spawn_commit_logger(
    member: String,
    tag: ChainTag,
    mut rx: mpsc::Receiver<Block>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(block) = rx.recv().await {
            info!(
                node = %member,
                chain = %tag,
                round = block.round,
                kind = ?block.kind,
                empty = block.is_empty(),
                hash = %hex::encode(block.hash()),
                "block committed"
            );
        }
    })
}
