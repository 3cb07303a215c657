//! Credential vault collaborator (spec §4.5 step 3). Encryption and storage
//! of the vault itself are out of scope here; this module only defines the
//! interface the ingest pipeline calls against and the pointer-fact
//! convention (`value = vault://service:type`).

/// Outcome of a single vault write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultWrite {
    /// A new credential was stored.
    Stored,
    /// An identical credential already existed; nothing was written.
    DuplicateSkipped,
}

/// A parsed `(service, type, value)` triplet extracted from credential-like text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFields {
    pub service: String,
    pub cred_type: String,
    pub value: String,
}

/// External collaborator storing raw secret material outside the Fact Store
/// (spec §6.4 `credentials.*`, property P10: no raw secret is ever stored in
/// a fact row when a vault is configured).
pub trait CredentialVault: Send + Sync {
    /// Stores `value` under `(service, type)` unless an identical value is
    /// already present, in which case it reports `DuplicateSkipped`.
    fn store_if_new(&self, service: &str, cred_type: &str, value: &str) -> Result<VaultWrite, String>;

    /// Deletes the credential at `(service, type)`; used as a compensating
    /// action when the pointer fact cannot be written after a successful
    /// vault write.
    fn delete(&self, service: &str, cred_type: &str) -> Result<(), String>;
}

/// Builds the pointer-fact value for a stored credential.
#[must_use]
pub fn pointer_value(service: &str, cred_type: &str) -> String {
    format!("vault://{service}:{cred_type}")
}
