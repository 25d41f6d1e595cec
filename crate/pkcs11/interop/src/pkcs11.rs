use std::{ffi::c_void, ptr};

use cosmian_logger::{debug, trace};
use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_TYPE, CK_BBOOL, CK_C_INITIALIZE_ARGS, CK_FALSE, CK_FLAGS, CK_INFO,
    CK_MECHANISM_INFO, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_RV, CK_SESSION_HANDLE,
    CK_SESSION_INFO, CK_SLOT_ID, CK_SLOT_INFO, CK_TOKEN_INFO, CK_TRUE, CK_ULONG,
    CK_UNAVAILABLE_INFORMATION, CK_USER_TYPE, CK_VOID_PTR, CKF_DONT_BLOCK, CKF_OS_LOCKING_OK,
    CKF_SERIAL_SESSION, CKR_ATTRIBUTE_SENSITIVE, CKR_ATTRIBUTE_TYPE_INVALID, CKR_NO_EVENT, CKR_OK,
};

use crate::{
    InteropError, InteropResult,
    adapter::{pkcs11_call, pkcs11_check},
    attribute::ObjectAttribute,
    config::Pkcs11Config,
    error::check_rv,
    function_table::FunctionTable,
    info::{Info, MechanismInfo, SessionInfo, SlotInfo, TokenInfo},
    loader::NativeLibrary,
    mechanism::NativeMechanism,
    protocol::{call_for_bytes, call_with_buffer},
};

/// Number of handles requested per `C_FindObjects` call.
const FIND_OBJECTS_BATCH: usize = 64;

fn raw_template(template: &[ObjectAttribute]) -> Vec<CK_ATTRIBUTE> {
    template.iter().map(ObjectAttribute::raw).collect()
}

/// A loaded PKCS#11 module and its resolved entry points, with typed wrappers
/// over the calls applications use most.
///
/// Every other entry point is reachable through [`Pkcs11::functions`].
pub struct Pkcs11 {
    library: NativeLibrary,
    functions: FunctionTable,
}

impl Pkcs11 {
    /// Load the module named by `config` and resolve its function table.
    pub fn load(config: &Pkcs11Config) -> InteropResult<Self> {
        config.validate()?;
        let library = NativeLibrary::load(&config.library_path)?;
        let functions = *library.function_table(config.strategy, config.layout())?;
        debug!(
            "{} loaded, function list version: {:?}",
            config.library_path.display(),
            functions.version()
        );
        Ok(Self { library, functions })
    }

    /// Close the module. The binding is consumed, so it cannot be used again.
    pub fn unload(mut self) -> InteropResult<()> {
        self.library.unload()
    }

    #[must_use]
    pub const fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    #[must_use]
    pub const fn library(&self) -> &NativeLibrary {
        &self.library
    }

    /// `C_Initialize`, letting the module use OS locking primitives.
    pub fn initialize(&self) -> InteropResult<()> {
        let mut args = CK_C_INITIALIZE_ARGS {
            flags: CKF_OS_LOCKING_OK,
            ..CK_C_INITIALIZE_ARGS::default()
        };
        pkcs11_check!(
            self.functions,
            C_Initialize,
            (&raw mut args).cast::<c_void>()
        )
    }

    pub fn finalize(&self) -> InteropResult<()> {
        pkcs11_check!(self.functions, C_Finalize, ptr::null_mut())
    }

    pub fn get_info(&self) -> InteropResult<Info> {
        let mut info = CK_INFO::default();
        pkcs11_check!(self.functions, C_GetInfo, &raw mut info)?;
        Ok(info.into())
    }

    pub fn get_slot_list(&self, token_present: bool) -> InteropResult<Vec<CK_SLOT_ID>> {
        let token_present: CK_BBOOL = if token_present { CK_TRUE } else { CK_FALSE };
        call_with_buffer("C_GetSlotList", |slots, count| {
            pkcs11_call!(self.functions, C_GetSlotList, token_present, slots, count)
        })
    }

    pub fn get_slot_info(&self, slot_id: CK_SLOT_ID) -> InteropResult<SlotInfo> {
        let mut info = CK_SLOT_INFO::default();
        pkcs11_check!(self.functions, C_GetSlotInfo, slot_id, &raw mut info)?;
        Ok(info.into())
    }

    pub fn get_token_info(&self, slot_id: CK_SLOT_ID) -> InteropResult<TokenInfo> {
        let mut info = CK_TOKEN_INFO::default();
        pkcs11_check!(self.functions, C_GetTokenInfo, slot_id, &raw mut info)?;
        Ok(info.into())
    }

    pub fn get_mechanism_list(&self, slot_id: CK_SLOT_ID) -> InteropResult<Vec<CK_MECHANISM_TYPE>> {
        call_with_buffer("C_GetMechanismList", |mechanisms, count| {
            pkcs11_call!(self.functions, C_GetMechanismList, slot_id, mechanisms, count)
        })
    }

    pub fn get_mechanism_info(
        &self,
        slot_id: CK_SLOT_ID,
        mechanism: CK_MECHANISM_TYPE,
    ) -> InteropResult<MechanismInfo> {
        let mut info = CK_MECHANISM_INFO::default();
        pkcs11_check!(
            self.functions,
            C_GetMechanismInfo,
            slot_id,
            mechanism,
            &raw mut info
        )?;
        Ok(info.into())
    }

    /// Open a session; `flags` are added to `CKF_SERIAL_SESSION`.
    pub fn open_session(
        &self,
        slot_id: CK_SLOT_ID,
        flags: CK_FLAGS,
    ) -> InteropResult<CK_SESSION_HANDLE> {
        let mut session: CK_SESSION_HANDLE = 0;
        pkcs11_check!(
            self.functions,
            C_OpenSession,
            slot_id,
            flags | CKF_SERIAL_SESSION,
            ptr::null_mut(),
            None,
            &raw mut session
        )?;
        trace!("session {session} opened on slot {slot_id}");
        Ok(session)
    }

    pub fn close_session(&self, session: CK_SESSION_HANDLE) -> InteropResult<()> {
        pkcs11_check!(self.functions, C_CloseSession, session)
    }

    pub fn close_all_sessions(&self, slot_id: CK_SLOT_ID) -> InteropResult<()> {
        pkcs11_check!(self.functions, C_CloseAllSessions, slot_id)
    }

    pub fn get_session_info(&self, session: CK_SESSION_HANDLE) -> InteropResult<SessionInfo> {
        let mut info = CK_SESSION_INFO::default();
        pkcs11_check!(self.functions, C_GetSessionInfo, session, &raw mut info)?;
        Ok(info.into())
    }

    /// Log in with `pin`, or through a protected authentication path when `None`.
    pub fn login(
        &self,
        session: CK_SESSION_HANDLE,
        user_type: CK_USER_TYPE,
        pin: Option<&[u8]>,
    ) -> InteropResult<()> {
        let mut pin = pin.map(<[u8]>::to_vec).unwrap_or_default();
        let pin_len = CK_ULONG::try_from(pin.len())?;
        let p_pin = if pin.is_empty() {
            ptr::null_mut()
        } else {
            pin.as_mut_ptr()
        };
        let result = pkcs11_check!(self.functions, C_Login, session, user_type, p_pin, pin_len);
        zeroize::Zeroize::zeroize(&mut pin);
        result
    }

    pub fn logout(&self, session: CK_SESSION_HANDLE) -> InteropResult<()> {
        pkcs11_check!(self.functions, C_Logout, session)
    }

    pub fn create_object(
        &self,
        session: CK_SESSION_HANDLE,
        template: &[ObjectAttribute],
    ) -> InteropResult<CK_OBJECT_HANDLE> {
        let mut attributes = raw_template(template);
        let mut object: CK_OBJECT_HANDLE = 0;
        pkcs11_check!(
            self.functions,
            C_CreateObject,
            session,
            attributes.as_mut_ptr(),
            CK_ULONG::try_from(attributes.len())?,
            &raw mut object
        )?;
        Ok(object)
    }

    pub fn destroy_object(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
    ) -> InteropResult<()> {
        pkcs11_check!(self.functions, C_DestroyObject, session, object)
    }

    pub fn get_object_size(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
    ) -> InteropResult<CK_ULONG> {
        let mut size: CK_ULONG = 0;
        pkcs11_check!(self.functions, C_GetObjectSize, session, object, &raw mut size)?;
        Ok(size)
    }

    /// Read the attributes `types` of `object`, one two-call round per attribute.
    ///
    /// Attributes the module cannot reveal (sensitive, unknown to the object)
    /// come back without a value, in the requested order.
    pub fn get_attribute_value(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
        types: &[CK_ATTRIBUTE_TYPE],
    ) -> InteropResult<Vec<ObjectAttribute>> {
        types
            .iter()
            .map(|&type_| self.get_single_attribute(session, object, type_))
            .collect()
    }

    fn get_single_attribute(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
        type_: CK_ATTRIBUTE_TYPE,
    ) -> InteropResult<ObjectAttribute> {
        let mut query = ObjectAttribute::new(type_).raw();
        let rv = pkcs11_call!(
            self.functions,
            C_GetAttributeValue,
            session,
            object,
            &raw mut query,
            1
        );
        let len = query.ulValueLen;
        if matches!(rv, CKR_ATTRIBUTE_SENSITIVE | CKR_ATTRIBUTE_TYPE_INVALID)
            || len == CK_UNAVAILABLE_INFORMATION
        {
            trace!("attribute {type_:#x} of object {object} is unavailable");
            return Ok(ObjectAttribute::new(type_));
        }
        check_rv("C_GetAttributeValue", rv)?;
        if len == 0 {
            return Ok(ObjectAttribute::new(type_));
        }

        let attribute = ObjectAttribute::with_capacity(type_, usize::try_from(len)?)?;
        let mut fill = attribute.raw();
        pkcs11_check!(self.functions, C_GetAttributeValue, session, object, &raw mut fill, 1)?;
        let filled = fill.ulValueLen;
        if filled == len {
            return Ok(attribute);
        }
        // the module wrote less than it announced
        let bytes = attribute.value().unwrap_or_default();
        let filled = usize::try_from(filled)?.min(bytes.len());
        ObjectAttribute::from_bytes(type_, Some(&bytes[..filled]))
    }

    pub fn set_attribute_value(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
        template: &[ObjectAttribute],
    ) -> InteropResult<()> {
        let mut attributes = raw_template(template);
        pkcs11_check!(
            self.functions,
            C_SetAttributeValue,
            session,
            object,
            attributes.as_mut_ptr(),
            CK_ULONG::try_from(attributes.len())?
        )
    }

    /// Every object matching `template`: init, batched search, final.
    pub fn find_objects(
        &self,
        session: CK_SESSION_HANDLE,
        template: &[ObjectAttribute],
    ) -> InteropResult<Vec<CK_OBJECT_HANDLE>> {
        let mut attributes = raw_template(template);
        pkcs11_check!(
            self.functions,
            C_FindObjectsInit,
            session,
            attributes.as_mut_ptr(),
            CK_ULONG::try_from(attributes.len())?
        )?;

        let search = self.find_objects_batches(session);
        // the search must be closed even when a batch failed
        let closed = pkcs11_check!(self.functions, C_FindObjectsFinal, session);
        let handles = search?;
        closed?;
        Ok(handles)
    }

    fn find_objects_batches(
        &self,
        session: CK_SESSION_HANDLE,
    ) -> InteropResult<Vec<CK_OBJECT_HANDLE>> {
        let mut handles = Vec::new();
        let mut batch = vec![CK_OBJECT_HANDLE::default(); FIND_OBJECTS_BATCH];
        let max_count = CK_ULONG::try_from(FIND_OBJECTS_BATCH)?;
        loop {
            let mut count: CK_ULONG = 0;
            pkcs11_check!(
                self.functions,
                C_FindObjects,
                session,
                batch.as_mut_ptr(),
                max_count,
                &raw mut count
            )?;
            if count == 0 {
                break;
            }
            let count = usize::try_from(count)?;
            let found = batch.get(..count).ok_or(InteropError::ObjectCount {
                function: "C_FindObjects",
                returned: count,
                requested: FIND_OBJECTS_BATCH,
            })?;
            trace!("found {count} objects");
            handles.extend_from_slice(found);
        }
        Ok(handles)
    }

    /// Single-part encryption of `data` with `key`.
    pub fn encrypt(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        key: CK_OBJECT_HANDLE,
        data: &[u8],
    ) -> InteropResult<Vec<u8>> {
        let mut raw_mechanism = mechanism.raw();
        pkcs11_check!(self.functions, C_EncryptInit, session, &raw mut raw_mechanism, key)?;
        let mut data = data.to_vec();
        let data_len = CK_ULONG::try_from(data.len())?;
        call_for_bytes("C_Encrypt", |output, output_len| {
            pkcs11_call!(
                self.functions,
                C_Encrypt,
                session,
                data.as_mut_ptr(),
                data_len,
                output,
                output_len
            )
        })
    }

    /// Single-part decryption of `data` with `key`.
    pub fn decrypt(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        key: CK_OBJECT_HANDLE,
        data: &[u8],
    ) -> InteropResult<Vec<u8>> {
        let mut raw_mechanism = mechanism.raw();
        pkcs11_check!(self.functions, C_DecryptInit, session, &raw mut raw_mechanism, key)?;
        let mut data = data.to_vec();
        let data_len = CK_ULONG::try_from(data.len())?;
        call_for_bytes("C_Decrypt", |output, output_len| {
            pkcs11_call!(
                self.functions,
                C_Decrypt,
                session,
                data.as_mut_ptr(),
                data_len,
                output,
                output_len
            )
        })
    }

    pub fn digest(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        data: &[u8],
    ) -> InteropResult<Vec<u8>> {
        let mut raw_mechanism = mechanism.raw();
        pkcs11_check!(self.functions, C_DigestInit, session, &raw mut raw_mechanism)?;
        let mut data = data.to_vec();
        let data_len = CK_ULONG::try_from(data.len())?;
        call_for_bytes("C_Digest", |output, output_len| {
            pkcs11_call!(
                self.functions,
                C_Digest,
                session,
                data.as_mut_ptr(),
                data_len,
                output,
                output_len
            )
        })
    }

    pub fn sign(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        key: CK_OBJECT_HANDLE,
        data: &[u8],
    ) -> InteropResult<Vec<u8>> {
        let mut raw_mechanism = mechanism.raw();
        pkcs11_check!(self.functions, C_SignInit, session, &raw mut raw_mechanism, key)?;
        let mut data = data.to_vec();
        let data_len = CK_ULONG::try_from(data.len())?;
        call_for_bytes("C_Sign", |output, output_len| {
            pkcs11_call!(
                self.functions,
                C_Sign,
                session,
                data.as_mut_ptr(),
                data_len,
                output,
                output_len
            )
        })
    }

    /// Verify `signature` over `data`. An invalid signature is reported as the
    /// module's `CKR_SIGNATURE_INVALID` return value.
    pub fn verify(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        key: CK_OBJECT_HANDLE,
        data: &[u8],
        signature: &[u8],
    ) -> InteropResult<()> {
        let mut raw_mechanism = mechanism.raw();
        pkcs11_check!(self.functions, C_VerifyInit, session, &raw mut raw_mechanism, key)?;
        let mut data = data.to_vec();
        let mut signature = signature.to_vec();
        pkcs11_check!(
            self.functions,
            C_Verify,
            session,
            data.as_mut_ptr(),
            CK_ULONG::try_from(data.len())?,
            signature.as_mut_ptr(),
            CK_ULONG::try_from(signature.len())?
        )
    }

    pub fn generate_key(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        template: &[ObjectAttribute],
    ) -> InteropResult<CK_OBJECT_HANDLE> {
        let mut raw_mechanism = mechanism.raw();
        let mut attributes = raw_template(template);
        let mut key: CK_OBJECT_HANDLE = 0;
        pkcs11_check!(
            self.functions,
            C_GenerateKey,
            session,
            &raw mut raw_mechanism,
            attributes.as_mut_ptr(),
            CK_ULONG::try_from(attributes.len())?,
            &raw mut key
        )?;
        Ok(key)
    }

    /// Wrap `key` with `wrapping_key`.
    pub fn wrap_key(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: &NativeMechanism,
        wrapping_key: CK_OBJECT_HANDLE,
        key: CK_OBJECT_HANDLE,
    ) -> InteropResult<Vec<u8>> {
        let mut raw_mechanism = mechanism.raw();
        call_for_bytes("C_WrapKey", |wrapped, wrapped_len| {
            pkcs11_call!(
                self.functions,
                C_WrapKey,
                session,
                &raw mut raw_mechanism,
                wrapping_key,
                key,
                wrapped,
                wrapped_len
            )
        })
    }

    pub fn get_operation_state(&self, session: CK_SESSION_HANDLE) -> InteropResult<Vec<u8>> {
        call_for_bytes("C_GetOperationState", |state, state_len| {
            pkcs11_call!(self.functions, C_GetOperationState, session, state, state_len)
        })
    }

    pub fn seed_random(&self, session: CK_SESSION_HANDLE, seed: &[u8]) -> InteropResult<()> {
        let mut seed = seed.to_vec();
        pkcs11_check!(
            self.functions,
            C_SeedRandom,
            session,
            seed.as_mut_ptr(),
            CK_ULONG::try_from(seed.len())?
        )
    }

    pub fn generate_random(
        &self,
        session: CK_SESSION_HANDLE,
        len: usize,
    ) -> InteropResult<Vec<u8>> {
        let mut values = vec![0_u8; len];
        pkcs11_check!(
            self.functions,
            C_GenerateRandom,
            session,
            values.as_mut_ptr(),
            CK_ULONG::try_from(len)?
        )?;
        Ok(values)
    }

    /// Wait for a slot event. With `block == false`, `Ok(None)` means no event
    /// is pending.
    pub fn wait_for_slot_event(&self, block: bool) -> InteropResult<Option<CK_SLOT_ID>> {
        let flags = if block { 0 } else { CKF_DONT_BLOCK };
        let mut slot: CK_SLOT_ID = 0;
        let reserved: CK_VOID_PTR = ptr::null_mut();
        match pkcs11_call!(self.functions, C_WaitForSlotEvent, flags, &raw mut slot, reserved) {
            CKR_OK => Ok(Some(slot)),
            CKR_NO_EVENT => Ok(None),
            rv => Err(InteropError::ReturnValue {
                function: "C_WaitForSlotEvent",
                rv,
            }),
        }
    }

    /// Legacy `C_GetFunctionStatus`; modules answer `CKR_FUNCTION_NOT_PARALLEL`.
    #[must_use]
    pub fn get_function_status(&self, session: CK_SESSION_HANDLE) -> CK_RV {
        pkcs11_call!(self.functions, C_GetFunctionStatus, session)
    }

    /// Legacy `C_CancelFunction`; modules answer `CKR_FUNCTION_NOT_PARALLEL`.
    #[must_use]
    pub fn cancel_function(&self, session: CK_SESSION_HANDLE) -> CK_RV {
        pkcs11_call!(self.functions, C_CancelFunction, session)
    }
}
