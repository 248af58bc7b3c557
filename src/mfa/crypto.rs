//! At-rest sealing for TOTP secrets.
//!
//! A secret only ever reaches the store as `base64(nonce || ciphertext)`,
//! AEAD-sealed under a key derived from the service secret. The owning
//! identity is bound in as AAD, so a sealed value lifted from one row cannot
//! be replayed onto another account.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

const NONCE_LEN: usize = 12;

pub fn seal_secret(key: &[u8; 32], secret: &[u8], identity_id: Uuid) -> AuthResult<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(identity_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: secret,
                aad: &aad,
            },
        )
        .map_err(|err| AuthError::Store(anyhow::anyhow!("sealing failure: {err}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

pub fn open_secret(key: &[u8; 32], sealed: &str, identity_id: Uuid) -> AuthResult<Vec<u8>> {
    let data = URL_SAFE_NO_PAD
        .decode(sealed)
        .map_err(|err| AuthError::Store(anyhow::anyhow!("sealed secret is not base64: {err}")))?;
    if data.len() < NONCE_LEN {
        return Err(AuthError::Store(anyhow::anyhow!(
            "sealed secret too short"
        )));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let aad = aad(identity_id);
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|err| AuthError::Store(anyhow::anyhow!("unsealing failure: {err}")))
}

fn aad(identity_id: Uuid) -> Vec<u8> {
    format!("mfa-secret:v1|{identity_id}").into_bytes()
}
