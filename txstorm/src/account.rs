/// Test accounts and signed transfers
///
/// Keys are secp256k1 and derived from the account's global index, so every
/// generator instance agrees on them without any key distribution.

use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 20-byte account address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Unsigned value transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub amount: u128,
    pub chain_id: u64,
}

impl Transfer {
    /// Fixed-layout encoding covered by the signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(20 + 20 + 8 + 16 + 8);
        bytes.extend_from_slice(&self.from.0);
        bytes.extend_from_slice(&self.to.0);
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.chain_id.to_be_bytes());
        bytes
    }
}

#[derive(Clone, Debug)]
pub struct SignedTransfer {
    pub transfer: Transfer,
    signature: Signature,
    signer: VerifyingKey,
}

impl SignedTransfer {
    /// Signature matches the payload and the signer owns `from`
    pub fn verify(&self) -> bool {
        address_of(&self.signer) == self.transfer.from
            && self
                .signer
                .verify(&self.transfer.signing_bytes(), &self.signature)
                .is_ok()
    }

    pub fn signature_bytes(&self) -> Vec<u8> {
        self.signature.to_bytes().to_vec()
    }

    /// Hash of payload and signature, hex encoded
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.transfer.signing_bytes());
        hasher.update(self.signature.to_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A generated account
#[derive(Clone)]
pub struct Account {
    index: u64,
    key: SigningKey,
    address: Address,
}

impl Account {
    /// Deterministic account for a global index
    pub fn derive(index: u64) -> Self {
        let mut attempt: u32 = 0;
        loop {
            let mut hasher = Sha256::new();
            hasher.update(b"txstorm-account");
            hasher.update(index.to_be_bytes());
            hasher.update(attempt.to_be_bytes());
            let seed = hasher.finalize();
            // Zero or out-of-range scalars are astronomically rare; rehash
            if let Ok(key) = SigningKey::from_bytes(&seed) {
                let address = address_of(key.verifying_key());
                return Self {
                    index,
                    key,
                    address,
                };
            }
            attempt += 1;
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn transfer_to(&self, to: &Account, nonce: u64, amount: u128, chain_id: u64) -> SignedTransfer {
        let transfer = Transfer {
            from: self.address,
            to: to.address,
            nonce,
            amount,
            chain_id,
        };
        let signature: Signature = self.key.sign(&transfer.signing_bytes());
        SignedTransfer {
            transfer,
            signature,
            signer: VerifyingKey::from(&self.key),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("address", &self.address)
            .finish()
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let digest = Sha256::digest(key.to_sec1_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Address(address)
}
