//! BLS signatures on BN254.
//!
//! Signatures live in G1 and public keys in G2, the layout the quorum aggregator expects:
//! signatures from every operator over the same digest add up in G1 and are checked with
//! one pairing against the summed G2 keys. Digests are mapped to G1 by try-and-increment
//! on the x coordinate (`y² = x³ + 3`); BN254's G1 has cofactor 1, so every point found
//! this way is in the prime-order subgroup.
//!
//! Points travel as arkworks' compressed encoding: 32 bytes for G1, 64 for G2.

use ark_bn254::{Bn254, Fq, Fr, G1Affine, G2Affine};
use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, Field, One, PrimeField, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::rngs::OsRng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

pub const SECRET_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlsError {
    #[error("secret key must be a non-zero scalar below the BN254 group order")]
    InvalidSecretKey,

    #[error("invalid {kind} encoding: {reason}")]
    InvalidPoint { kind: &'static str, reason: String },
}

/// Map a 32-byte digest onto G1
pub fn hash_to_g1(digest: &[u8; 32]) -> G1Affine {
    let b = Fq::from(3u64);
    let mut x = Fq::from_be_bytes_mod_order(digest);
    loop {
        let rhs = x.square() * x + b;
        if let Some(y) = rhs.sqrt() {
            return G1Affine::new_unchecked(x, y);
        }
        x += Fq::one();
    }
}

fn encode_point<const N: usize>(
    point: &impl CanonicalSerialize,
    kind: &'static str,
) -> Result<[u8; N], BlsError> {
    let mut bytes = [0u8; N];
    point
        .serialize_compressed(&mut bytes[..])
        .map_err(|e| BlsError::InvalidPoint {
            kind,
            reason: e.to_string(),
        })?;
    Ok(bytes)
}

fn decode_point<P: CanonicalDeserialize>(s: &str, kind: &'static str) -> Result<P, BlsError> {
    let invalid = |reason: String| BlsError::InvalidPoint { kind, reason };
    let bytes = alloy::hex::decode(s).map_err(|e| invalid(e.to_string()))?;
    P::deserialize_compressed(bytes.as_slice()).map_err(|e| invalid(e.to_string()))
}

macro_rules! point_newtype {
    ($(#[$meta:meta])* $name:ident, $point:ty, $len:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name($point);

        impl $name {
            pub fn point(&self) -> &$point {
                &self.0
            }

            pub fn to_bytes(&self) -> Result<[u8; $len], BlsError> {
                encode_point::<$len>(&self.0, $kind)
            }
        }

        impl From<$point> for $name {
            fn from(point: $point) -> Self {
                Self(point)
            }
        }

        impl FromStr for $name {
            type Err = BlsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_point(s, $kind).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let bytes = self.to_bytes().map_err(|_| fmt::Error)?;
                f.write_str(&alloy::hex::encode_prefixed(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&alloy::hex::encode_prefixed(bytes))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                value.parse().map_err(de::Error::custom)
            }
        }
    };
}

point_newtype!(
    /// Signature over a task response digest (a G1 point)
    BlsSignature,
    G1Affine,
    SIGNATURE_LEN,
    "G1 signature"
);

point_newtype!(
    /// Operator public key (a G2 point)
    BlsPublicKey,
    G2Affine,
    PUBLIC_KEY_LEN,
    "G2 public key"
);

impl BlsPublicKey {
    /// `e(signature, g2) == e(H(digest), public_key)`
    pub fn verify(&self, digest: &[u8; 32], signature: &BlsSignature) -> bool {
        if self.0.is_zero() || signature.0.is_zero() {
            return false;
        }
        let message = hash_to_g1(digest);
        Bn254::pairing(signature.0, G2Affine::generator()) == Bn254::pairing(message, self.0)
    }
}

/// BN254 secret scalar plus its G2 public key.
///
/// `Debug` never prints the scalar.
#[derive(Clone)]
pub struct BlsKeyPair {
    secret: Fr,
    public_key: BlsPublicKey,
}

impl BlsKeyPair {
    pub fn generate() -> Self {
        loop {
            let secret = Fr::rand(&mut OsRng);
            if !secret.is_zero() {
                return Self::from_scalar(secret);
            }
        }
    }

    /// Big-endian scalar; anything zero or not below the group order is rejected
    pub fn from_secret_bytes(bytes: &[u8; SECRET_KEY_LEN]) -> Result<Self, BlsError> {
        let secret = Fr::from_be_bytes_mod_order(bytes);
        if secret.is_zero() || secret.into_bigint().to_bytes_be().as_slice() != bytes.as_slice() {
            return Err(BlsError::InvalidSecretKey);
        }
        Ok(Self::from_scalar(secret))
    }

    fn from_scalar(secret: Fr) -> Self {
        let public_key = BlsPublicKey((G2Affine::generator() * secret).into_affine());
        Self { secret, public_key }
    }

    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LEN]> {
        let mut bytes = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        let encoded = Zeroizing::new(self.secret.into_bigint().to_bytes_be());
        bytes.copy_from_slice(&encoded);
        bytes
    }

    pub fn public_key(&self) -> BlsPublicKey {
        self.public_key
    }

    pub fn sign(&self, digest: &[u8; 32]) -> BlsSignature {
        BlsSignature((hash_to_g1(digest) * self.secret).into_affine())
    }
}

impl fmt::Debug for BlsKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlsKeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}
