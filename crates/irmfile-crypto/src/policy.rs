use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::cancel::CancelFlag;
use crate::error::CryptoError;
use crate::license::PublishingLicense;
use crate::provider::{CipherMode, CryptoProvider};

/// Identity on whose behalf a protect/unprotect operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyAcquisitionOptions {
    pub offline_only: bool,
}

/// Where an acquired policy may be cached by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCacheFlags {
    pub in_memory: bool,
    pub on_disk: bool,
    pub crypted: bool,
}

impl ResponseCacheFlags {
    pub const NO_CACHE: Self = Self {
        in_memory: false,
        on_disk: false,
        crypted: false,
    };
    pub const ALL: Self = Self {
        in_memory: true,
        on_disk: true,
        crypted: true,
    };
}

/// Cipher selection exposed on the public protect options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoOptions {
    Aes128Ecb,
    Aes128Cbc4k,
}

impl Default for CryptoOptions {
    fn default() -> Self {
        CryptoOptions::Aes128Cbc4k
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtectOptions {
    pub allow_audited_extraction: bool,
    pub crypto: CryptoOptions,
    pub signed_app_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnprotectOptions {
    pub offline_only: bool,
    pub use_cache: bool,
}

impl UnprotectOptions {
    pub fn acquisition_options(&self) -> PolicyAcquisitionOptions {
        PolicyAcquisitionOptions {
            offline_only: self.offline_only,
        }
    }

    pub fn cache_flags(&self) -> ResponseCacheFlags {
        if self.use_cache {
            ResponseCacheFlags::ALL
        } else {
            ResponseCacheFlags::NO_CACHE
        }
    }
}

/// Options passed to the policy service when a policy is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserPolicyCreationOptions {
    pub allow_audited_extraction: bool,
    pub prefer_deprecated_algorithms: bool,
}

impl From<&ProtectOptions> for UserPolicyCreationOptions {
    fn from(options: &ProtectOptions) -> Self {
        Self {
            allow_audited_extraction: options.allow_audited_extraction,
            prefer_deprecated_algorithms: matches!(options.crypto, CryptoOptions::Aes128Ecb),
        }
    }
}

/// Custom-rights policy description.
#[derive(Debug, Clone, Default)]
pub struct PolicyDescriptor {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub users: Vec<String>,
}

/// Capability object tying a document's content key and rights to a user.
///
/// Immutable once built; share it with `Arc`.
pub struct UserPolicy {
    provider: CryptoProvider,
    owner: String,
    issued_to: String,
    allow_audited_extraction: bool,
    serialized: Vec<u8>,
}

impl UserPolicy {
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.provider
    }

    pub fn uses_deprecated_algorithms(&self) -> bool {
        self.provider.mode().uses_deprecated_algorithms()
    }

    pub fn is_issued_to_owner(&self) -> bool {
        self.issued_to.eq_ignore_ascii_case(&self.owner)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn allow_audited_extraction(&self) -> bool {
        self.allow_audited_extraction
    }

    /// The publishing license to embed in the protected container.
    pub fn serialized_policy(&self) -> &[u8] {
        &self.serialized
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStatus {
    Success,
    NoRights,
    Expired,
    ServiceUnavailable,
}

pub struct PolicyAcquisition {
    pub status: AcquisitionStatus,
    pub policy: Option<Arc<UserPolicy>>,
}

/// Seam to the rights-management service.
///
/// A production implementation talks to a licensing endpoint; the bundled
/// [`LocalPolicyService`] issues and re-opens self-contained licenses so the
/// engine can run without one.
pub trait PolicyService {
    fn acquire(
        &self,
        publishing_license: &[u8],
        user: &UserContext,
        options: PolicyAcquisitionOptions,
        cache: ResponseCacheFlags,
        cancel: &CancelFlag,
    ) -> Result<PolicyAcquisition, CryptoError>;

    fn create_from_template(
        &self,
        template_id: &str,
        user: &UserContext,
        options: UserPolicyCreationOptions,
        signed_app_data: &BTreeMap<String, String>,
        cancel: &CancelFlag,
    ) -> Result<Arc<UserPolicy>, CryptoError>;

    fn create_from_descriptor(
        &self,
        descriptor: &PolicyDescriptor,
        user: &UserContext,
        options: UserPolicyCreationOptions,
        cancel: &CancelFlag,
    ) -> Result<Arc<UserPolicy>, CryptoError>;
}

/// Offline policy issuer.
///
/// The publishing license it emits carries the content key, so anything
/// protected with it can be opened by the owner with no service round-trip.
/// Useful for tests, tooling, and air-gapped flows; not a substitute for a
/// real licensing endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPolicyService;

impl LocalPolicyService {
    pub fn new() -> Self {
        Self
    }

    fn issue(
        &self,
        owner: &str,
        options: UserPolicyCreationOptions,
        cancel: &CancelFlag,
    ) -> Result<Arc<UserPolicy>, CryptoError> {
        cancel.check()?;

        let mut key = Zeroizing::new([0u8; 16]);
        OsRng.fill_bytes(&mut key[..]);
        let mut iv_salt = [0u8; 16];
        OsRng.fill_bytes(&mut iv_salt);

        let mode = if options.prefer_deprecated_algorithms {
            CipherMode::Aes128Ecb
        } else {
            CipherMode::Aes128Cbc4k
        };

        let license = PublishingLicense {
            mode,
            allow_audited_extraction: options.allow_audited_extraction,
            key: key.clone(),
            iv_salt,
            owner: owner.to_string(),
        };
        let serialized = license.to_bytes();

        Ok(Arc::new(UserPolicy {
            provider: CryptoProvider::new(mode, *key, iv_salt),
            owner: owner.to_string(),
            issued_to: owner.to_string(),
            allow_audited_extraction: options.allow_audited_extraction,
            serialized,
        }))
    }
}

impl PolicyService for LocalPolicyService {
    fn acquire(
        &self,
        publishing_license: &[u8],
        user: &UserContext,
        _options: PolicyAcquisitionOptions,
        _cache: ResponseCacheFlags,
        cancel: &CancelFlag,
    ) -> Result<PolicyAcquisition, CryptoError> {
        cancel.check()?;

        let license = match PublishingLicense::parse(publishing_license) {
            Ok(license) => license,
            Err(err) => {
                log::warn!("publishing license rejected: {err}");
                return Ok(PolicyAcquisition {
                    status: AcquisitionStatus::NoRights,
                    policy: None,
                });
            }
        };

        let policy = UserPolicy {
            provider: CryptoProvider::new(license.mode, *license.key, license.iv_salt),
            owner: license.owner,
            issued_to: user.user_id.clone(),
            allow_audited_extraction: license.allow_audited_extraction,
            serialized: publishing_license.to_vec(),
        };

        Ok(PolicyAcquisition {
            status: AcquisitionStatus::Success,
            policy: Some(Arc::new(policy)),
        })
    }

    fn create_from_template(
        &self,
        _template_id: &str,
        user: &UserContext,
        options: UserPolicyCreationOptions,
        _signed_app_data: &BTreeMap<String, String>,
        cancel: &CancelFlag,
    ) -> Result<Arc<UserPolicy>, CryptoError> {
        self.issue(&user.user_id, options, cancel)
    }

    fn create_from_descriptor(
        &self,
        descriptor: &PolicyDescriptor,
        user: &UserContext,
        options: UserPolicyCreationOptions,
        cancel: &CancelFlag,
    ) -> Result<Arc<UserPolicy>, CryptoError> {
        let owner = if descriptor.owner.is_empty() {
            user.user_id.as_str()
        } else {
            descriptor.owner.as_str()
        };
        self.issue(owner, options, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_policy_is_issued_to_owner() {
        let service = LocalPolicyService::new();
        let user = UserContext::new("owner@contoso.com");
        let policy = service
            .create_from_template(
                "general",
                &user,
                UserPolicyCreationOptions::default(),
                &BTreeMap::new(),
                &CancelFlag::new(),
            )
            .expect("create");
        assert!(policy.is_issued_to_owner());
        assert!(!policy.uses_deprecated_algorithms());
        assert!(!policy.serialized_policy().is_empty());
    }

    #[test]
    fn acquire_for_owner_succeeds_and_preserves_key() {
        let service = LocalPolicyService::new();
        let owner = UserContext::new("owner@contoso.com");
        let policy = service
            .create_from_template(
                "general",
                &owner,
                UserPolicyCreationOptions::default(),
                &BTreeMap::new(),
                &CancelFlag::new(),
            )
            .expect("create");

        let acquired = service
            .acquire(
                policy.serialized_policy(),
                &owner,
                PolicyAcquisitionOptions::default(),
                ResponseCacheFlags::NO_CACHE,
                &CancelFlag::new(),
            )
            .expect("acquire");
        assert_eq!(acquired.status, AcquisitionStatus::Success);
        let acquired = acquired.policy.expect("policy");
        assert!(acquired.is_issued_to_owner());

        let mut block = vec![0x3Cu8; 32];
        policy
            .crypto_provider()
            .encrypt_block(0, &mut block)
            .expect("encrypt");
        acquired
            .crypto_provider()
            .decrypt_block(0, &mut block)
            .expect("decrypt");
        assert_eq!(block, vec![0x3Cu8; 32]);
    }

    #[test]
    fn acquire_for_other_user_is_not_owner() {
        let service = LocalPolicyService::new();
        let owner = UserContext::new("owner@contoso.com");
        let policy = service
            .create_from_template(
                "general",
                &owner,
                UserPolicyCreationOptions::default(),
                &BTreeMap::new(),
                &CancelFlag::new(),
            )
            .expect("create");

        let intruder = UserContext::new("viewer@contoso.com");
        let acquired = service
            .acquire(
                policy.serialized_policy(),
                &intruder,
                PolicyAcquisitionOptions::default(),
                ResponseCacheFlags::NO_CACHE,
                &CancelFlag::new(),
            )
            .expect("acquire");
        assert_eq!(acquired.status, AcquisitionStatus::Success);
        assert!(!acquired.policy.expect("policy").is_issued_to_owner());
    }

    #[test]
    fn garbage_license_reports_no_rights() {
        let service = LocalPolicyService::new();
        let acquired = service
            .acquire(
                b"not a license",
                &UserContext::new("owner@contoso.com"),
                PolicyAcquisitionOptions::default(),
                ResponseCacheFlags::NO_CACHE,
                &CancelFlag::new(),
            )
            .expect("acquire returns a classification, not an error");
        assert_eq!(acquired.status, AcquisitionStatus::NoRights);
        assert!(acquired.policy.is_none());
    }

    #[test]
    fn ecb_preference_is_honored_and_flagged() {
        let service = LocalPolicyService::new();
        let options = UserPolicyCreationOptions {
            prefer_deprecated_algorithms: true,
            ..Default::default()
        };
        let policy = service
            .create_from_template(
                "general",
                &UserContext::new("owner@contoso.com"),
                options,
                &BTreeMap::new(),
                &CancelFlag::new(),
            )
            .expect("create");
        assert!(policy.uses_deprecated_algorithms());
    }
}
