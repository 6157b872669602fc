use bitcoin::hashes::{Hash, sha256};
use lightning_invoice::InvoiceBuilder;
use lightning_types::payment::PaymentSecret;
use lightning_types::routing::{RouteHint, RouteHintHop, RoutingFees};
use std::time::Duration;

use super::decode::big_endian_features;
use super::{Bolt11Error, Bolt11Invoice, UnsignedBolt11};
use crate::collaborator::InvoiceSigner;
use crate::route::RouteInfo;

fn route_hint(route: &[RouteInfo]) -> RouteHint {
    RouteHint(
        route
            .iter()
            .map(|hop| RouteHintHop {
                src_node_id: *hop.pubkey.public_key(),
                short_channel_id: hop.short_channel_id.as_u64(),
                fees: RoutingFees {
                    base_msat: hop.fee_base_msat,
                    proportional_millionths: hop.fee_proportional_millionths,
                },
                cltv_expiry_delta: hop.cltv_expiry_delta,
                htlc_minimum_msat: None,
                htlc_maximum_msat: None,
            })
            .collect(),
    )
}

impl UnsignedBolt11 {
    /// Signs and encodes the payment request.
    ///
    /// Returns the text form together with the decoded view of what was signed,
    /// so callers never need to re-parse their own output.
    pub async fn sign(
        self,
        signer: &dyn InvoiceSigner,
    ) -> Result<(String, Bolt11Invoice), Bolt11Error> {
        let mut builder = InvoiceBuilder::new(self.network.to_currency())
            .description(self.description.clone())
            .payment_hash(sha256::Hash::from_byte_array(*self.payment_hash.as_bytes()))
            .payment_secret(PaymentSecret(self.payment_secret))
            .duration_since_epoch(Duration::from_secs(self.timestamp.as_secs()))
            .min_final_cltv_expiry_delta(self.min_final_cltv_expiry)
            .expiry_time(Duration::from_secs(self.expiry));
        if let Some(amount) = self.amount {
            builder = builder.amount_milli_satoshis(amount.msat());
        }
        for fallback in &self.fallbacks {
            builder = builder.fallback(fallback.to_lightning());
        }
        for route in &self.routes {
            builder = builder.private_route(route_hint(route));
        }
        let raw = builder.build_raw()?;

        let signature = signer.sign_invoice(&raw).await?;
        let signed = raw.sign::<_, Bolt11Error>(|_| Ok(signature))?;
        let features = big_endian_features(signed.raw_invoice());

        let invoice = Bolt11Invoice {
            network: self.network,
            amount: self.amount,
            timestamp: self.timestamp,
            payee: signer.node_id(),
            payment_hash: self.payment_hash,
            payment_secret: Some(self.payment_secret),
            description: Some(self.description),
            description_hash: None,
            expiry: self.expiry,
            min_final_cltv_expiry: self.min_final_cltv_expiry,
            fallbacks: self.fallbacks,
            routes: self.routes,
            features,
            extra: Vec::new(),
            signature,
        };
        Ok((signed.to_string(), invoice))
    }
}
