use std::fmt;

use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Private half of an actor's Ed25519 key pair. Never printed.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Public half of an actor's key pair, as held by the key ring.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Ed25519 signature over an event hash or a statement.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("bytes are not a valid ed25519 public key")]
    InvalidKey,
    #[error("bad hex encoding: {0}")]
    InvalidEncoding(String),
}

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    /// Key from a 64-character hex seed, the form used in configuration.
    pub fn from_hex_seed(seed: &str) -> Result<Self, SignatureError> {
        decode_hex::<32>(seed).map(Self::from_bytes)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl VerifyingKey {
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        match self.0.verify(message, &signature.0) {
            Ok(()) => Ok(()),
            Err(_) => Err(SignatureError::InvalidSignature),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn from_hex(raw: &str) -> Result<Self, SignatureError> {
        let bytes = decode_hex::<32>(raw)?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(raw: &str) -> Result<Self, SignatureError> {
        decode_hex::<64>(raw).map(|bytes| Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }
}

fn decode_hex<const N: usize>(raw: &str) -> Result<[u8; N], SignatureError> {
    let bytes = hex::decode(raw).map_err(|e| SignatureError::InvalidEncoding(e.to_string()))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        SignatureError::InvalidEncoding(format!("{} bytes, want {N}", bytes.len()))
    })
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VerifyingKey").field(&self.to_hex()).finish()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}..)", &hex[..16])
    }
}

// Keys and signatures travel as lowercase hex strings.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                <$ty>::from_hex(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(VerifyingKey);
hex_serde!(Signature);
