//! Verification of minisign signatures over check bundles
//!
//! Public key: base64 of `"Ed" || key id (8) || Ed25519 key (32)`.
//!
//! Signature file:
//!
//! ```text
//! untrusted comment: <free text>
//! base64("Ed" || key id (8) || signature (64))
//! trusted comment: <free text>
//! base64(global signature over signature || trusted comment)
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};

use super::error::ChecksError;

const ALG_ED25519: &[u8; 2] = b"Ed";
const ALG_PREHASHED: &[u8; 2] = b"ED";
const UNTRUSTED_PREFIX: &str = "untrusted comment:";
const TRUSTED_PREFIX: &str = "trusted comment: ";

fn verification(msg: impl Into<String>) -> ChecksError {
    ChecksError::Verification(msg.into())
}

fn decode_base64(line: &str, what: &str) -> Result<Vec<u8>, ChecksError> {
    STANDARD
        .decode(line.trim())
        .map_err(|e| verification(format!("invalid {what} encoding: {e}")))
}

/// A trusted key checks must be signed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key_id: [u8; 8],
    key: VerifyingKey,
}

impl PublicKey {
    /// Decode a key as printed by minisign, with or without its comment line.
    pub fn decode(input: &str) -> Result<Self, ChecksError> {
        let line = input
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with(UNTRUSTED_PREFIX))
            .last()
            .ok_or_else(|| verification("empty public key"))?;

        let bytes = decode_base64(line, "public key")?;
        if bytes.len() != 42 {
            return Err(verification(format!(
                "public key has {} bytes, expected 42",
                bytes.len()
            )));
        }
        if &bytes[..2] != ALG_ED25519 {
            return Err(verification("unsupported public key algorithm"));
        }

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&bytes[2..10]);
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[10..]);
        let key = VerifyingKey::from_bytes(&key)
            .map_err(|e| verification(format!("invalid public key: {e}")))?;

        Ok(Self { key_id, key })
    }

    pub fn key_id(&self) -> String {
        hex::encode_upper(self.key_id.iter().rev().copied().collect::<Vec<_>>())
    }
}

#[derive(Debug)]
struct Signature {
    key_id: [u8; 8],
    signature: [u8; 64],
    trusted_comment: String,
    global_signature: [u8; 64],
}

impl Signature {
    fn decode(input: &str) -> Result<Self, ChecksError> {
        let mut lines = input.lines();
        let mut next = |what: &str| {
            lines
                .next()
                .ok_or_else(|| verification(format!("signature is missing its {what}")))
        };

        let untrusted = next("untrusted comment")?;
        if !untrusted.starts_with(UNTRUSTED_PREFIX) {
            return Err(verification("signature does not start with an untrusted comment"));
        }

        let bytes = decode_base64(next("signature line")?, "signature")?;
        if bytes.len() != 74 {
            return Err(verification(format!(
                "signature has {} bytes, expected 74",
                bytes.len()
            )));
        }
        match &bytes[..2] {
            alg if alg == ALG_ED25519 => {}
            alg if alg == ALG_PREHASHED => {
                return Err(verification("prehashed signatures are not supported"));
            }
            _ => return Err(verification("unsupported signature algorithm")),
        }

        let trusted_comment = next("trusted comment")?
            .strip_prefix(TRUSTED_PREFIX)
            .ok_or_else(|| verification("invalid trusted comment"))?
            .to_string();

        let global = decode_base64(next("global signature")?, "global signature")?;
        let global_signature: [u8; 64] = global
            .as_slice()
            .try_into()
            .map_err(|_| verification("global signature must be 64 bytes"))?;

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&bytes[2..10]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[10..]);

        Ok(Self {
            key_id,
            signature,
            trusted_comment,
            global_signature,
        })
    }
}

/// Check `signature` over `data` against any of the trusted keys.
pub fn verify(data: &[u8], keys: &[PublicKey], signature: &str) -> Result<(), ChecksError> {
    let sig = Signature::decode(signature)?;

    let key = keys
        .iter()
        .find(|k| k.key_id == sig.key_id)
        .ok_or_else(|| verification("no trusted public key matches the signature key id"))?;

    key.key
        .verify(data, &Ed25519Signature::from_bytes(&sig.signature))
        .map_err(|_| verification("invalid signature"))?;

    let mut global = Vec::with_capacity(64 + sig.trusted_comment.len());
    global.extend_from_slice(&sig.signature);
    global.extend_from_slice(sig.trusted_comment.as_bytes());
    key.key
        .verify(&global, &Ed25519Signature::from_bytes(&sig.global_signature))
        .map_err(|_| verification("invalid global signature"))?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    /// Signs like `minisign -S`, returning (public key, signature file).
    pub(crate) fn sign(secret: [u8; 32], key_id: [u8; 8], data: &[u8]) -> (String, String) {
        let signing = SigningKey::from_bytes(&secret);

        let mut public = Vec::with_capacity(42);
        public.extend_from_slice(ALG_ED25519);
        public.extend_from_slice(&key_id);
        public.extend_from_slice(signing.verifying_key().as_bytes());

        let signature = signing.sign(data).to_bytes();
        let mut sig_line = Vec::with_capacity(74);
        sig_line.extend_from_slice(ALG_ED25519);
        sig_line.extend_from_slice(&key_id);
        sig_line.extend_from_slice(&signature);

        let trusted = "timestamp:1600000000\tfile:checks.yml";
        let mut global = signature.to_vec();
        global.extend_from_slice(trusted.as_bytes());
        let global = signing.sign(&global).to_bytes();

        let file = format!(
            "untrusted comment: signature from minisign secret key\n{}\ntrusted comment: {}\n{}\n",
            STANDARD.encode(sig_line),
            trusted,
            STANDARD.encode(global)
        );
        (STANDARD.encode(public), file)
    }
}
