use bitcoin::hashes::Hash;
use lightning_invoice::{RawBolt11Invoice, RawTaggedField, SignedRawBolt11Invoice, TaggedField};
use lightning_types::routing::RouteHintHop;
use std::str::FromStr;

use super::{
    Bolt11Error, Bolt11Invoice, DEFAULT_EXPIRY_SECS, DEFAULT_MIN_FINAL_CLTV_EXPIRY, ExtraField,
    Fallback,
};
use crate::amount::AmountMsat;
use crate::hash::{PaymentHash, sha256};
use crate::network::Network;
use crate::route::{NodeId, RouteInfo, ShortChannelId};
use crate::timestamp::UnixTimestamp;

fn route_info(hop: &RouteHintHop) -> RouteInfo {
    RouteInfo {
        pubkey: NodeId::from_public_key(hop.src_node_id),
        short_channel_id: ShortChannelId::from_u64(hop.short_channel_id),
        fee_base_msat: hop.fees.base_msat,
        fee_proportional_millionths: hop.fees.proportional_millionths,
        cltv_expiry_delta: hop.cltv_expiry_delta,
    }
}

/// Feature bits of the `9` field, most significant byte first.
pub(super) fn big_endian_features(raw: &RawBolt11Invoice) -> Vec<u8> {
    raw.data
        .tagged_fields
        .iter()
        .find_map(|field| match field {
            RawTaggedField::KnownSemantics(TaggedField::Features(features)) => {
                Some(features.le_flags().iter().rev().copied().collect())
            }
            _ => None,
        })
        .unwrap_or_default()
}

/// Decodes and signature-checks a payment request.
///
/// If `description` is given and the invoice commits to a description hash,
/// the hash must match it.
pub fn decode(s: &str, description: Option<&str>) -> Result<Bolt11Invoice, Bolt11Error> {
    let signed = SignedRawBolt11Invoice::from_str(s)?;
    let raw = signed.raw_invoice();
    let network = Network::from_currency(&raw.hrp.currency)?;
    let amount = match raw.amount_pico_btc() {
        Some(pico) if pico % 10 != 0 => return Err(Bolt11Error::BadAmount(pico)),
        pico => pico.map(|p| AmountMsat::from_msat(p / 10)),
    };

    let mut payment_hash = None;
    let mut payment_secret = None;
    let mut description_text = None;
    let mut description_hash = None;
    let mut payee = None;
    let mut expiry = DEFAULT_EXPIRY_SECS;
    let mut min_final_cltv_expiry = DEFAULT_MIN_FINAL_CLTV_EXPIRY;
    let mut fallbacks = Vec::new();
    let mut routes = Vec::new();
    let mut extra = Vec::new();

    for field in &raw.data.tagged_fields {
        let field = match field {
            RawTaggedField::KnownSemantics(field) => field,
            // Tag letter, two length groups, then the data.
            RawTaggedField::UnknownSemantics(data) => {
                if let Some(tag) = data.first() {
                    extra.push(ExtraField {
                        tag: tag.to_char(),
                        data: data.iter().skip(3).map(|group| group.to_char()).collect(),
                    });
                }
                continue;
            }
        };
        match field {
            TaggedField::PaymentHash(hash) => {
                payment_hash = Some(PaymentHash::from_byte_array(hash.0.to_byte_array()));
            }
            TaggedField::PaymentSecret(secret) => payment_secret = Some(secret.0),
            TaggedField::Description(text) => description_text = Some(text.as_inner().0.clone()),
            TaggedField::DescriptionHash(hash) => description_hash = Some(hash.0.to_byte_array()),
            TaggedField::PayeePubKey(key) => payee = Some(NodeId::from_public_key(key.0)),
            TaggedField::ExpiryTime(time) => expiry = time.as_seconds(),
            TaggedField::MinFinalCltvExpiryDelta(delta) => min_final_cltv_expiry = delta.0,
            TaggedField::Fallback(fallback) => fallbacks.extend(Fallback::from_lightning(fallback)),
            TaggedField::PrivateRoute(route) => {
                routes.push(route.clone().into_inner().0.iter().map(route_info).collect());
            }
            _ => {}
        }
    }

    let payment_hash = payment_hash.ok_or(Bolt11Error::MissingPaymentHash)?;

    if let (Some(hash), Some(description)) = (&description_hash, description) {
        if sha256(description.as_bytes()) != *hash {
            return Err(Bolt11Error::DescriptionMismatch);
        }
    }

    let recovered = NodeId::from_public_key(signed.recover_payee_pub_key()?.0);
    let payee = match payee {
        Some(claimed) if claimed != recovered => {
            return Err(Bolt11Error::SignatureMismatch(claimed));
        }
        Some(claimed) => claimed,
        None => recovered,
    };

    Ok(Bolt11Invoice {
        network,
        amount,
        timestamp: UnixTimestamp::from_secs(raw.data.timestamp.as_unix_timestamp()),
        payee,
        payment_hash,
        payment_secret,
        description: description_text,
        description_hash,
        expiry,
        min_final_cltv_expiry,
        fallbacks,
        routes,
        features: big_endian_features(raw),
        extra,
        signature: signed.signature().0,
    })
}
