use std::sync::Arc;

use irmfile_crypto::{
    CancelFlag, PolicyDescriptor, PolicyService, ProtectOptions, UnprotectOptions, UserContext,
    UserPolicy, UserPolicyCreationOptions,
};

use crate::crypto_handler::CryptoHandler;
use crate::error::PdfError;
use crate::object_model::{ensure_module_initialized, PdfObjectModel};
use crate::security_handler::SecurityHandler;
use crate::wrapper::{
    WrapperCreator, WrapperDoc, PDF_PROTECTOR_FILTER_NAME, PDF_PROTECTOR_WRAPPER_DES,
    PDF_PROTECTOR_WRAPPER_FILENAME, PDF_PROTECTOR_WRAPPER_SUBTYPE, PDF_PROTECTOR_WRAPPER_VERSION,
};

/// Protects and unprotects one PDF document.
///
/// The protector owns the input bytes and the collaborating object model and
/// policy service; each public operation validates its inputs before any
/// crypto state is allocated.
pub struct PdfProtector<M, P> {
    input: Vec<u8>,
    wrapper_template: Option<Vec<u8>>,
    object_model: M,
    policy_service: P,
    policy: Option<Arc<UserPolicy>>,
}

impl<M: PdfObjectModel, P: PolicyService> PdfProtector<M, P> {
    pub fn new(input: Vec<u8>, object_model: M, policy_service: P) -> Self {
        ensure_module_initialized();
        Self {
            input,
            wrapper_template: None,
            object_model,
            policy_service,
            policy: None,
        }
    }

    /// The "empty" outer PDF shown by viewers that do not understand the IRM
    /// filter. Required before protecting.
    pub fn set_wrapper_template(&mut self, template: Vec<u8>) {
        self.wrapper_template = Some(template);
    }

    /// The policy in effect after a successful protect or unprotect.
    pub fn user_policy(&self) -> Option<&Arc<UserPolicy>> {
        self.policy.as_ref()
    }

    pub fn is_protected(&self) -> bool {
        WrapperDoc::parse(&self.input).is_valid_protected(PDF_PROTECTOR_WRAPPER_SUBTYPE)
    }

    pub fn protect_with_template(
        &mut self,
        user: &UserContext,
        template_id: &str,
        options: &ProtectOptions,
        output: &mut Vec<u8>,
        cancel: &CancelFlag,
    ) -> Result<(), PdfError> {
        self.check_protect_preconditions()?;
        let policy = self.policy_service.create_from_template(
            template_id,
            user,
            UserPolicyCreationOptions::from(options),
            &options.signed_app_data,
            cancel,
        )?;
        self.policy = Some(policy);
        self.protect(output, cancel)
    }

    pub fn protect_with_custom_rights(
        &mut self,
        user: &UserContext,
        descriptor: &PolicyDescriptor,
        options: &ProtectOptions,
        output: &mut Vec<u8>,
        cancel: &CancelFlag,
    ) -> Result<(), PdfError> {
        self.check_protect_preconditions()?;
        let policy = self.policy_service.create_from_descriptor(
            descriptor,
            user,
            UserPolicyCreationOptions::from(options),
            cancel,
        )?;
        self.policy = Some(policy);
        self.protect(output, cancel)
    }

    pub fn unprotect(
        &mut self,
        user: &UserContext,
        options: UnprotectOptions,
        output: &mut Vec<u8>,
        cancel: &CancelFlag,
    ) -> Result<(), PdfError> {
        if self.input.is_empty() {
            return Err(PdfError::StreamInvalid);
        }

        let doc = WrapperDoc::parse(&self.input);
        if !doc.is_valid_protected(PDF_PROTECTOR_WRAPPER_SUBTYPE) {
            log::warn!("input is not a valid rights-protected file");
            return Err(PdfError::NotValidFile);
        }

        let mut payload = Vec::with_capacity(doc.payload_size() as usize);
        doc.start_get_payload(&mut payload)?;

        let mut security =
            SecurityHandler::new(&self.policy_service, user.clone(), options, cancel.clone());
        self.object_model.unprotect_custom_encrypted_file(
            &payload,
            PDF_PROTECTOR_FILTER_NAME,
            &mut security,
            output,
        )?;

        self.policy = security.policy().cloned();
        Ok(())
    }

    fn check_protect_preconditions(&self) -> Result<(), PdfError> {
        if self.input.is_empty() {
            return Err(PdfError::StreamInvalid);
        }
        if self.is_protected() {
            log::warn!("file is already protected");
            return Err(PdfError::AlreadyProtected);
        }
        if self.wrapper_template.is_none() {
            return Err(PdfError::InvalidArgument {
                context: "wrapper template not set",
            });
        }
        Ok(())
    }

    fn protect(&mut self, output: &mut Vec<u8>, cancel: &CancelFlag) -> Result<(), PdfError> {
        let policy = self.policy.clone().ok_or(PdfError::InvalidArgument {
            context: "user policy creation failed",
        })?;
        let publishing_license = policy.serialized_policy().to_vec();

        let mut handler = CryptoHandler::new(policy, cancel.clone());
        let mut encrypted = Vec::new();
        self.object_model.create_custom_encrypted_file(
            &self.input,
            PDF_PROTECTOR_FILTER_NAME,
            &publishing_license,
            &mut handler,
            &mut encrypted,
        )?;

        let template = self
            .wrapper_template
            .clone()
            .expect("checked in check_protect_preconditions");
        let mut creator = WrapperCreator::new(template);
        creator.set_payload_info(
            PDF_PROTECTOR_WRAPPER_SUBTYPE,
            PDF_PROTECTOR_WRAPPER_FILENAME,
            PDF_PROTECTOR_WRAPPER_DES,
            PDF_PROTECTOR_WRAPPER_VERSION,
        );
        creator.set_payload(encrypted);
        let wrapped = creator.write_to()?;

        output.clear();
        output.extend_from_slice(&wrapped);
        Ok(())
    }
}
