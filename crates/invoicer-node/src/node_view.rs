//! In-memory view of our channels, serving both as the gossip source for
//! candidate inbound channels and as the local peer directory.
//!
//! The view is seeded from configuration and can be updated at runtime as
//! channels change state or peers come and go.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use invoicer_types::amount::{AmountMsat, AmountSat};
use invoicer_types::collaborator::{
    ChannelGossip, ChannelSnapshot, ChannelState, GossipError, PeerDirectory,
};
use invoicer_types::route::{NodeId, RouteInfo, ShortChannelId};

/// One of our channels, as written in the node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub peer: NodeId,
    pub short_channel_id: ShortChannelId,
    /// Fee policy the peer charges to forward to us.
    #[serde(default)]
    pub fee_base_msat: u32,
    #[serde(default)]
    pub fee_proportional_millionths: u32,
    #[serde(default = "default_cltv_expiry_delta")]
    pub cltv_expiry_delta: u16,
    /// Unannounced channel.
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_state")]
    pub state: ChannelState,
    pub funding_sat: AmountSat,
    pub our_msat: AmountMsat,
    #[serde(default)]
    pub their_reserve_sat: AmountSat,
    #[serde(default)]
    pub our_reserve_sat: AmountSat,
    #[serde(default = "default_connected")]
    pub connected: bool,
}

fn default_cltv_expiry_delta() -> u16 {
    6
}

fn default_state() -> ChannelState {
    ChannelState::Normal
}

fn default_connected() -> bool {
    true
}

impl ChannelEntry {
    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            short_channel_id: Some(self.short_channel_id),
            state: self.state,
            funding: self.funding_sat,
            our_msat: self.our_msat,
            their_reserve: self.their_reserve_sat,
            our_reserve: self.our_reserve_sat,
            connected: self.connected,
        }
    }

    fn route_info(&self) -> RouteInfo {
        RouteInfo {
            pubkey: self.peer,
            short_channel_id: self.short_channel_id,
            fee_base_msat: self.fee_base_msat,
            fee_proportional_millionths: self.fee_proportional_millionths,
            cltv_expiry_delta: self.cltv_expiry_delta,
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeView {
    peers: DashMap<NodeId, Vec<ChannelEntry>>,
}

impl NodeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_channels(channels: impl IntoIterator<Item = ChannelEntry>) -> Self {
        let view = Self::new();
        for channel in channels {
            view.upsert_channel(channel);
        }
        view
    }

    /// Adds a channel, or replaces the one with the same short channel id.
    pub fn upsert_channel(&self, channel: ChannelEntry) {
        let mut entries = self.peers.entry(channel.peer).or_default();
        match entries
            .iter()
            .position(|c| c.short_channel_id == channel.short_channel_id)
        {
            Some(i) => entries[i] = channel,
            None => entries.push(channel),
        }
    }

    /// Marks every channel with `peer` as connected or not.
    #[cfg(test)]
    fn set_connected(&self, peer: &NodeId, connected: bool) {
        if let Some(mut entries) = self.peers.get_mut(peer) {
            for channel in entries.iter_mut() {
                channel.connected = connected;
            }
        }
    }

    #[cfg(test)]
    fn remove_peer(&self, peer: &NodeId) {
        self.peers.remove(peer);
    }
}

#[async_trait]
impl ChannelGossip for NodeView {
    /// Active channels as route hints. Private channels are included when
    /// asked for, or when left to us and no public channel exists.
    async fn incoming_channels(
        &self,
        expose_private: Option<bool>,
    ) -> Result<Vec<RouteInfo>, GossipError> {
        let active: Vec<ChannelEntry> = self
            .peers
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|c| c.state == ChannelState::Normal)
            .collect();
        let include_private = match expose_private {
            Some(expose) => expose,
            None => active.iter().all(|c| c.private),
        };
        Ok(active
            .iter()
            .filter(|c| include_private || !c.private)
            .map(ChannelEntry::route_info)
            .collect())
    }
}

impl PeerDirectory for NodeView {
    fn peer_channels(&self, peer: &NodeId) -> Option<Vec<ChannelSnapshot>> {
        self.peers
            .get(peer)
            .map(|entries| entries.iter().map(ChannelEntry::snapshot).collect())
    }
}
