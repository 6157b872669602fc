//! Signing with a node key held in process memory.

use async_trait::async_trait;
use secp256k1::ecdsa::RecoverableSignature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use invoicer_types::bolt11::RawBolt11Invoice;
use invoicer_types::collaborator::{InvoiceSigner, SignerError};
use invoicer_types::route::NodeId;

pub struct LocalSigner {
    secp: Secp256k1<All>,
    secret: SecretKey,
    node_id: NodeId,
}

impl LocalSigner {
    pub fn new(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let node_id = NodeId::from_public_key(PublicKey::from_secret_key(&secp, &secret));
        Self {
            secp,
            secret,
            node_id,
        }
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InvoiceSigner for LocalSigner {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn sign_invoice(
        &self,
        invoice: &RawBolt11Invoice,
    ) -> Result<RecoverableSignature, SignerError> {
        let message = Message::from_digest(invoice.signable_hash());
        Ok(self.secp.sign_ecdsa_recoverable(&message, &self.secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use invoicer_types::amount::AmountMsat;
    use invoicer_types::bolt11::{self, UnsignedBolt11};
    use invoicer_types::hash::Preimage;
    use invoicer_types::network::Network;
    use invoicer_types::timestamp::UnixTimestamp;

    #[tokio::test]
    async fn signature_recovers_to_node_id() {
        let signer = LocalSigner::new(SecretKey::from_slice(&[0x11; 32]).unwrap());
        let unsigned = UnsignedBolt11 {
            network: Network::Regtest,
            amount: Some(AmountMsat::from_msat(1000)),
            timestamp: UnixTimestamp::from_secs(1_700_000_000),
            payment_hash: Preimage::from_byte_array([1u8; 32]).payment_hash(),
            payment_secret: [2u8; 32],
            description: "tea".to_string(),
            expiry: 60,
            min_final_cltv_expiry: 18,
            fallbacks: Vec::new(),
            routes: Vec::new(),
        };
        let (text, _) = unsigned.sign(&signer).await.unwrap();
        let decoded = bolt11::decode(&text, None).unwrap();
        assert_eq!(decoded.payee, signer.node_id());
    }

    #[test]
    fn debug_hides_secret() {
        let signer = LocalSigner::new(SecretKey::from_slice(&[0x11; 32]).unwrap());
        assert!(!format!("{signer:?}").contains(&"11".repeat(32)));
    }
}
