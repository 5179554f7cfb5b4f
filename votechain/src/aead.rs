use crate::*;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::{rngs::OsRng, RngCore};

pub const AES_KEY_LENGTH: usize = 32;
pub const AES_IV_LENGTH: usize = 12;

pub type AesKey = [u8; AES_KEY_LENGTH];
pub type AesIv = [u8; AES_IV_LENGTH];

pub fn random_aes_key() -> AesKey {
    let mut key = [0u8; AES_KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

pub fn random_iv() -> AesIv {
    let mut iv = [0u8; AES_IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt under an explicit IV, returning `iv || ciphertext`
pub fn aes_encrypt_with_iv(key: &AesKey, iv: &AesIv, msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKey)?;
    let encrypted = aead
        .encrypt(Nonce::from_slice(iv), Payload { msg, aad })
        .map_err(|_| Error::EncryptionError)?;

    let mut output = Vec::with_capacity(AES_IV_LENGTH + encrypted.len());
    output.extend_from_slice(iv);
    output.extend(encrypted);
    Ok(output)
}

/// Encrypt under a fresh random IV, returning `iv || ciphertext`
pub fn aes_encrypt(key: &AesKey, msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
    aes_encrypt_with_iv(key, &random_iv(), msg, aad)
}

/// Decrypt an `iv || ciphertext` blob
pub fn aes_decrypt(key: &AesKey, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() <= AES_IV_LENGTH {
        return Err(Error::DecryptionError);
    }
    let aead = Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKey)?;
    let (iv, encrypted) = ciphertext.split_at(AES_IV_LENGTH);
    aead.decrypt(Nonce::from_slice(iv), Payload { msg: encrypted, aad })
        .map_err(|_| Error::DecryptionError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes() {
        let key = random_aes_key();
        let plaintext = b"ATTACK AT DAWN";
        let encrypted = aes_encrypt(&key, plaintext, b"").unwrap();
        let decrypted = aes_decrypt(&key, &encrypted, b"").unwrap();
        assert_eq!(decrypted, plaintext);

        // Wrong key
        assert!(aes_decrypt(&random_aes_key(), &encrypted, b"").is_err());

        // Wrong associated data
        let bound = aes_encrypt(&key, plaintext, b"election-1").unwrap();
        assert!(aes_decrypt(&key, &bound, b"election-2").is_err());

        // Truncated
        assert!(aes_decrypt(&key, &encrypted[..AES_IV_LENGTH], b"").is_err());
    }

    #[test]
    fn explicit_iv_is_deterministic() {
        let key = random_aes_key();
        let iv = random_iv();
        let a = aes_encrypt_with_iv(&key, &iv, b"same", b"").unwrap();
        let b = aes_encrypt_with_iv(&key, &iv, b"same", b"").unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..AES_IV_LENGTH], &iv);
    }
}
