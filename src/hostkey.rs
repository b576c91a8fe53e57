//! Host-key-derived identifier path (C12).
//!
//! A PEM "PUBLIC KEY" block's body is already the key's DER encoding
//! (SubjectPublicKeyInfo), so the identifier is just `SHA-256` of that body
//! -- no need to shell out to an external tool to re-derive the DER form.

use crate::error::{ChordError, ChordResult};
use crate::identifier::Identifier;
use std::fs;
use std::path::Path;

/// Derives `self.id` from a PEM-encoded public key file: `SHA-256(DER(public_key)) mod 2^bits`.
pub fn id_from_pem_file(path: impl AsRef<Path>, bits: u32) -> ChordResult<Identifier> {
    let contents = fs::read_to_string(&path).map_err(|e| ChordError::InvalidArgument(format!("reading hostkey file: {e}")))?;
    let parsed = pem::parse(&contents).map_err(|e| ChordError::InvalidArgument(format!("parsing hostkey PEM: {e}")))?;
    Ok(Identifier::hash_of(parsed.contents(), bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic_for_the_same_key_bytes() {
        let der = b"not-a-real-der-blob-but-deterministic";
        let pem_text = pem::encode(&pem::Pem::new("PUBLIC KEY", der.to_vec()));
        let dir = std::env::temp_dir().join(format!("chordring-hostkey-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("key.pem");
        fs::write(&path, &pem_text).unwrap();

        let a = id_from_pem_file(&path, 8).unwrap();
        let b = id_from_pem_file(&path, 8).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Identifier::hash_of(der, 8));

        let _ = fs::remove_dir_all(&dir);
    }
}
