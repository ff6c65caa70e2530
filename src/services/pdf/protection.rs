//! Password protection with the standard security handler.

use crate::services::error::{ConvertError, ConvertResult};
use lopdf::encryption::{EncryptionState, EncryptionVersion, Permissions};
use lopdf::{Document, Object, StringFormat};
use rand::RngCore;
use std::path::Path;

/// RC4 key length in bits.
const KEY_LENGTH: usize = 128;

/// Encrypts `doc` so that `password` is required to open it.
///
/// The same password is used as user and owner password, with all permissions
/// granted once opened.
pub fn protect(doc: &mut Document, password: &str) -> ConvertResult<()> {
    if password.is_empty() {
        return Err(ConvertError::invalid("Password must not be empty"));
    }
    if doc.is_encrypted() {
        return Err(ConvertError::invalid("PDF is already password protected"));
    }

    ensure_document_id(doc);
    let version = EncryptionVersion::V2 {
        document: &*doc,
        owner_password: password,
        user_password: password,
        key_length: KEY_LENGTH,
        permissions: Permissions::all(),
    };
    let state = EncryptionState::try_from(version)
        .map_err(|e| ConvertError::tool("pdf encryption", e.to_string()))?;
    doc.encrypt(&state)
        .map_err(|e| ConvertError::tool("pdf encryption", e.to_string()))?;
    Ok(())
}

/// Loads `path` and removes its encryption using `password`.
///
/// Files that only carry an owner password open with an empty user password and
/// are returned decrypted whatever `password` is.
pub fn unlock(path: &Path, password: &str) -> ConvertResult<Document> {
    let mut doc = Document::load(path)?;
    if !doc.is_encrypted() && !doc.was_encrypted() {
        return Err(ConvertError::NotEncrypted);
    }

    // A user password stops the plain load after the /Encrypt dictionary.
    if doc.is_encrypted() {
        doc = Document::load_with_password(path, password).map_err(|e| match e {
            lopdf::Error::InvalidPassword => ConvertError::WrongPassword,
            other => ConvertError::Pdf(other),
        })?;
    }
    doc.trailer.remove(b"Encrypt");
    doc.encryption_state = None;
    Ok(doc)
}

/// The key derivation hashes the first `/ID` string, so one must exist.
fn ensure_document_id(doc: &mut Document) {
    let has_id = matches!(doc.trailer.get(b"ID"), Ok(Object::Array(ids)) if !ids.is_empty());
    if has_id {
        return;
    }
    let mut id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    let id = Object::String(id.to_vec(), StringFormat::Hexadecimal);
    doc.trailer.set("ID", vec![id.clone(), id]);
}
