//! Routing-hint selection for new invoices.
//!
//! Candidates come from gossip; the local peer view decides which of them
//! could actually carry the payment to us. Among the suitable ones, a single
//! hint is drawn by weighted reservoir sampling (A-Chao with k = 1), weighting
//! each channel by its spare inbound capacity relative to its size:
//!
//! ```text
//! excess   = (their_balance - their_reserve) - amount
//! capacity = funding - (our_reserve + their_reserve)
//! weight   = excess / capacity
//! ```
//!
//! Sampling, rather than always taking the largest channel, keeps the hint
//! from revealing which of our channels has the most inbound liquidity.

use rand::Rng;

use invoicer_types::amount::AmountMsat;
use invoicer_types::collaborator::{ChannelSnapshot, ChannelState, PeerDirectory};
use invoicer_types::route::RouteInfo;

/// Result of a selection round.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub hint: Option<RouteInfo>,
    /// Some otherwise suitable channel was skipped because its peer is offline.
    pub any_offline: bool,
}

enum Suitability {
    Unsuitable,
    Offline,
    Weighted(f64),
}

fn suitability(
    peers: &dyn PeerDirectory,
    amount: AmountMsat,
    candidate: &RouteInfo,
) -> Suitability {
    let Some(channels) = peers.peer_channels(&candidate.pubkey) else {
        return Suitability::Unsuitable;
    };
    let mut normal = channels.iter().filter(|c| c.state == ChannelState::Normal);
    let (Some(channel), None) = (normal.next(), normal.next()) else {
        return Suitability::Unsuitable;
    };
    let Some(excess) = inbound_excess(channel, amount, candidate) else {
        return Suitability::Unsuitable;
    };
    if !channel.connected {
        return Suitability::Offline;
    }
    let Some(capacity) = channel
        .our_reserve
        .checked_add(channel.their_reserve)
        .and_then(|reserves| reserves.to_msat())
        .and_then(|reserves| channel.funding.checked_sub_msat(reserves))
    else {
        tracing::error!(
            peer = %candidate.pubkey,
            funding = %channel.funding,
            our_reserve = %channel.our_reserve,
            their_reserve = %channel.their_reserve,
            "capacity overflow"
        );
        return Suitability::Unsuitable;
    };
    match excess.fraction_of(capacity) {
        Some(weight) => Suitability::Weighted(weight),
        None => Suitability::Unsuitable,
    }
}

/// Inbound capacity left over after `amount`, or `None` if the channel cannot carry it.
fn inbound_excess(
    channel: &ChannelSnapshot,
    amount: AmountMsat,
    candidate: &RouteInfo,
) -> Option<AmountMsat> {
    let Some(their_msat) = channel.funding.checked_sub_msat(channel.our_msat) else {
        tracing::error!(
            peer = %candidate.pubkey,
            funding = %channel.funding,
            our_msat = %channel.our_msat,
            "underflow: funding minus our balance"
        );
        return None;
    };
    let Some(capacity_to_pay_us) = their_msat.checked_sub_sat(channel.their_reserve) else {
        // Their balance below their reserve: nothing to spare.
        return None;
    };
    capacity_to_pay_us.checked_sub(amount)
}

/// Picks at most one routing hint for receiving `amount`.
pub fn select_inchan<R: Rng + ?Sized>(
    peers: &dyn PeerDirectory,
    amount: AmountMsat,
    candidates: &[RouteInfo],
    rng: &mut R,
) -> Selection {
    let mut selection = Selection::default();
    let mut wsum = 0.0;
    for candidate in candidates {
        let weight = match suitability(peers, amount, candidate) {
            Suitability::Unsuitable => continue,
            Suitability::Offline => {
                selection.any_offline = true;
                continue;
            }
            Suitability::Weighted(weight) => weight,
        };
        wsum += weight;
        let replace = match selection.hint {
            None => true,
            Some(_) => rng.random::<f64>() <= weight / wsum,
        };
        if replace {
            selection.hint = Some(candidate.clone());
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicer_types::amount::AmountSat;
    use invoicer_types::route::{NodeId, ShortChannelId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Peers(HashMap<NodeId, Vec<ChannelSnapshot>>);

    impl PeerDirectory for Peers {
        fn peer_channels(&self, peer: &NodeId) -> Option<Vec<ChannelSnapshot>> {
            self.0.get(peer).cloned()
        }
    }

    fn node(seed: u8) -> NodeId {
        let secret = SecretKey::from_slice(&[seed; 32]).unwrap();
        NodeId::from_public_key(PublicKey::from_secret_key(&Secp256k1::new(), &secret))
    }

    fn hint(peer: NodeId, block: u32) -> RouteInfo {
        RouteInfo {
            pubkey: peer,
            short_channel_id: ShortChannelId::new(block, 1, 0).unwrap(),
            fee_base_msat: 1000,
            fee_proportional_millionths: 10,
            cltv_expiry_delta: 6,
        }
    }

    fn channel(funding_sat: u64, our_sat: u64) -> ChannelSnapshot {
        ChannelSnapshot {
            short_channel_id: None,
            state: ChannelState::Normal,
            funding: AmountSat::from_sat(funding_sat),
            our_msat: AmountMsat::from_msat(our_sat * 1000),
            their_reserve: AmountSat::from_sat(0),
            our_reserve: AmountSat::from_sat(0),
            connected: true,
        }
    }

    fn sat(sat: u64) -> AmountMsat {
        AmountMsat::from_msat(sat * 1000)
    }

    fn select_seeded(peers: &Peers, amount: AmountMsat, candidates: &[RouteInfo]) -> Selection {
        select_inchan(peers, amount, candidates, &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn no_candidates_no_hint() {
        let selection = select_seeded(&Peers::default(), sat(1), &[]);
        assert_eq!(selection, Selection::default());
    }

    #[test]
    fn unknown_peer_and_insufficient_capacity_are_skipped() {
        let known = node(1);
        let mut peers = Peers::default();
        peers.0.insert(known, vec![channel(100_000, 99_000)]);
        let candidates = [hint(node(2), 100), hint(known, 101)];
        let selection = select_seeded(&peers, sat(5_000), &candidates);
        assert_eq!(selection.hint, None);
        assert!(!selection.any_offline);
    }

    #[test]
    fn offline_peer_raises_flag() {
        let peer = node(1);
        let mut offline = channel(100_000, 10_000);
        offline.connected = false;
        let mut peers = Peers::default();
        peers.0.insert(peer, vec![offline]);
        let selection = select_seeded(&peers, sat(1_000), &[hint(peer, 100)]);
        assert_eq!(selection.hint, None);
        assert!(selection.any_offline);
    }

    #[test]
    fn peer_with_two_normal_channels_is_skipped() {
        let peer = node(1);
        let mut peers = Peers::default();
        peers.0.insert(peer, vec![channel(100_000, 0), channel(100_000, 0)]);
        let selection = select_seeded(&peers, sat(1_000), &[hint(peer, 100)]);
        assert_eq!(selection.hint, None);

        let mut closing = channel(100_000, 0);
        closing.state = ChannelState::Closing;
        peers.0.insert(peer, vec![channel(100_000, 0), closing]);
        let selection = select_seeded(&peers, sat(1_000), &[hint(peer, 100)]);
        assert_eq!(selection.hint, Some(hint(peer, 100)));
    }

    #[test]
    fn balance_underflow_is_skipped() {
        let peer = node(1);
        let mut peers = Peers::default();
        peers.0.insert(peer, vec![channel(1_000, 2_000)]);
        let selection = select_seeded(&peers, sat(1), &[hint(peer, 100)]);
        assert_eq!(selection.hint, None);
    }

    #[test]
    fn reserves_are_respected() {
        let peer = node(1);
        let mut reserved = channel(100_000, 0);
        reserved.their_reserve = AmountSat::from_sat(99_500);
        let mut peers = Peers::default();
        peers.0.insert(peer, vec![reserved]);
        let selection = select_seeded(&peers, sat(1_000), &[hint(peer, 100)]);
        assert_eq!(selection.hint, None);
    }

    #[test]
    fn sampling_follows_relative_weight() {
        // C1: capacity 100k, excess 80k (0.8). C2: capacity 50k, excess 45k (0.9).
        let (c1, c2) = (node(1), node(2));
        let mut peers = Peers::default();
        peers.0.insert(c1, vec![channel(100_000, 19_000)]);
        peers.0.insert(c2, vec![channel(50_000, 4_000)]);
        let candidates = [hint(c1, 100), hint(c2, 200)];

        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let mut picked_c2 = 0;
        for _ in 0..trials {
            let selection = select_inchan(&peers, sat(1_000), &candidates, &mut rng);
            match selection.hint {
                Some(h) if h.pubkey == c2 => picked_c2 += 1,
                Some(h) => assert_eq!(h.pubkey, c1),
                None => panic!("a suitable channel was not picked"),
            }
        }
        let share = f64::from(picked_c2) / f64::from(trials);
        let expected = 0.9 / 1.7;
        assert!(picked_c2 > trials - picked_c2);
        assert!((share - expected).abs() < 0.02, "share {share}");
    }
}
