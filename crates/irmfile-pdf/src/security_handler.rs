use std::sync::Arc;

use irmfile_crypto::{
    AcquisitionStatus, CancelFlag, PolicyService, UnprotectOptions, UserContext, UserPolicy,
};

use crate::crypto_handler::CryptoHandler;
use crate::error::PdfError;
use crate::object_model::{PdfCryptoHandler, PdfSecurityHandler};

/// Gatekeeper the object model consults before decrypting: acquires the user
/// policy from the publishing license and enforces the owner right.
pub struct SecurityHandler<'a, P: PolicyService> {
    service: &'a P,
    user: UserContext,
    options: UnprotectOptions,
    cancel: CancelFlag,
    policy: Option<Arc<UserPolicy>>,
    handler: Option<CryptoHandler>,
}

impl<'a, P: PolicyService> SecurityHandler<'a, P> {
    pub fn new(
        service: &'a P,
        user: UserContext,
        options: UnprotectOptions,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            service,
            user,
            options,
            cancel,
            policy: None,
            handler: None,
        }
    }

    /// The policy acquired by `on_init`, once the object model has run.
    pub fn policy(&self) -> Option<&Arc<UserPolicy>> {
        self.policy.as_ref()
    }
}

impl<P: PolicyService> PdfSecurityHandler for SecurityHandler<'_, P> {
    fn on_init(&mut self, publishing_license: &[u8]) -> Result<(), PdfError> {
        let acquisition = self.service.acquire(
            publishing_license,
            &self.user,
            self.options.acquisition_options(),
            self.options.cache_flags(),
            &self.cancel,
        )?;

        if acquisition.status != AcquisitionStatus::Success {
            log::warn!("policy acquisition unsuccessful: {:?}", acquisition.status);
            return Err(PdfError::CannotAcquirePolicy {
                status: acquisition.status,
            });
        }
        let policy = acquisition
            .policy
            .ok_or(PdfError::InvalidArgument {
                context: "policy service reported success without a policy",
            })?;

        if !policy.is_issued_to_owner() {
            log::warn!("only the owner has the right to unprotect the document");
            return Err(PdfError::RightsError);
        }

        self.policy = Some(policy);
        Ok(())
    }

    fn crypto_handler(&mut self) -> Result<&mut dyn PdfCryptoHandler, PdfError> {
        let policy = self.policy.clone().ok_or(PdfError::InvalidArgument {
            context: "crypto_handler requested before on_init",
        })?;
        let handler = self
            .handler
            .get_or_insert_with(|| CryptoHandler::new(policy, self.cancel.clone()));
        Ok(handler)
    }
}
