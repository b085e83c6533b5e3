//! Signing identities for log entries.
//!
//! An [`Identity`] is the public material attached to every entry: a free-form
//! id, a secp256k1 public key, and the self-attesting [`Signatures`] pair. The
//! private half lives behind an [`IdentityProvider`], which is the only thing
//! that can produce signatures.

use crate::error::Error;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Self-attestations carried by an identity: a signature over its id, and a
/// signature over the public key concatenated with that id signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    id: String,
    pub_key: String,
}

impl Signatures {
    pub fn new(id: &str, pub_key: &str) -> Signatures {
        Signatures {
            id: id.to_owned(),
            pub_key: pub_key.to_owned(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pub_key(&self) -> &str {
        &self.pub_key
    }
}

/// Public identity material. Entries embed the full identity, so signature
/// checks never need any state beyond the entry itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    pub_key: String,
    signatures: Signatures,
}

impl Identity {
    pub fn new(id: &str, pub_key: &str, signatures: Signatures) -> Identity {
        Identity {
            id: id.to_owned(),
            pub_key: pub_key.to_owned(),
            signatures,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hex-encoded compressed secp256k1 public key. Also used as the id of the
    /// owning log's Lamport clock.
    pub fn pub_key(&self) -> &str {
        &self.pub_key
    }

    pub fn signatures(&self) -> &Signatures {
        &self.signatures
    }
}

/// Signer and verifier handle passed to the log and its access controller.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider {
    /// The identity this provider signs for.
    fn identity(&self) -> &Identity;

    /// Signs `data`, returning a hex-encoded compact ECDSA signature.
    async fn sign(&self, data: &[u8]) -> Result<String, Error>;

    /// Checks `signature` over `data` against `identity`'s public key.
    ///
    /// Malformed keys or signatures count as verification failure, not as an
    /// error: an entry carrying them is inadmissible either way.
    async fn verify(
        &self,
        identity: &Identity,
        signature: &str,
        data: &[u8],
    ) -> Result<bool, Error>;
}

/// An in-process identity backed by a locally held secp256k1 secret key.
pub struct LocalIdentity {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    identity: Identity,
}

impl LocalIdentity {
    /// Creates an identity with a freshly generated keypair.
    pub fn generate(id: &str) -> LocalIdentity {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
        LocalIdentity::from_secret_key(id, secret_key)
    }

    /// Creates an identity from a caller-supplied secret key.
    pub fn from_secret_key(id: &str, secret_key: SecretKey) -> LocalIdentity {
        let secp = Secp256k1::new();
        let pub_key = hex::encode(PublicKey::from_secret_key(&secp, &secret_key).serialize());
        let id_sig = sign_digest(&secp, &secret_key, id.as_bytes());
        let pub_key_sig = sign_digest(
            &secp,
            &secret_key,
            format!("{}{}", pub_key, id_sig).as_bytes(),
        );
        let identity = Identity::new(id, &pub_key, Signatures::new(&id_sig, &pub_key_sig));
        LocalIdentity {
            secp,
            secret_key,
            identity,
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn sign(&self, data: &[u8]) -> Result<String, Error> {
        Ok(sign_digest(&self.secp, &self.secret_key, data))
    }

    async fn verify(
        &self,
        identity: &Identity,
        signature: &str,
        data: &[u8],
    ) -> Result<bool, Error> {
        let key = match hex::decode(identity.pub_key())
            .ok()
            .and_then(|raw| PublicKey::from_slice(&raw).ok())
        {
            Some(key) => key,
            None => return Ok(false),
        };
        let sig = match hex::decode(signature)
            .ok()
            .and_then(|raw| Signature::from_compact(&raw).ok())
        {
            Some(sig) => sig,
            None => return Ok(false),
        };
        let digest: [u8; 32] = Sha256::digest(data).into();
        let msg = Message::from_digest(digest);
        Ok(self.secp.verify_ecdsa(&msg, &sig, &key).is_ok())
    }
}

fn sign_digest(secp: &Secp256k1<All>, secret_key: &SecretKey, data: &[u8]) -> String {
    let digest: [u8; 32] = Sha256::digest(data).into();
    let msg = Message::from_digest(digest);
    hex::encode(secp.sign_ecdsa(&msg, secret_key).serialize_compact())
}
