//! The state of the single token: sessions, objects and the random generator.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use cosmian_logger::debug;
use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE_TYPE, CK_FLAGS, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_SESSION_HANDLE,
    CK_SLOT_ID, CK_STATE, CK_TRUE, CK_ULONG, CKA_SENSITIVE, CKA_VALUE, CKF_DIGEST, CKF_GENERATE,
    CKF_RW_SESSION, CKM_AES_KEY_GEN, CKM_GENERIC_SECRET_KEY_GEN, CKM_SHA3_256,
    CKS_RO_PUBLIC_SESSION, CKS_RO_USER_FUNCTIONS, CKS_RW_PUBLIC_SESSION, CKS_RW_USER_FUNCTIONS,
};
use once_cell::sync::Lazy;

use crate::{MockError, MockResult};

/// The slot holding the token.
pub const TOKEN_SLOT_ID: CK_SLOT_ID = 1;
/// A slot without a token.
pub const EMPTY_SLOT_ID: CK_SLOT_ID = 2;
pub const USER_PIN: &[u8] = b"1234";

/// `(mechanism, min key size, max key size, flags)` of the token.
pub const MECHANISMS: [(CK_MECHANISM_TYPE, CK_ULONG, CK_ULONG, CK_FLAGS); 3] = [
    (CKM_AES_KEY_GEN, 16, 32, CKF_GENERATE),
    (CKM_GENERIC_SECRET_KEY_GEN, 1, 512, CKF_GENERATE),
    (CKM_SHA3_256, 0, 0, CKF_DIGEST),
];

pub(crate) type Object = BTreeMap<CK_ATTRIBUTE_TYPE, Vec<u8>>;

pub(crate) enum Operation {
    Find(Vec<CK_OBJECT_HANDLE>),
    Digest(Vec<u8>),
}

pub(crate) struct Session {
    pub slot_id: CK_SLOT_ID,
    pub flags: CK_FLAGS,
    pub operation: Option<Operation>,
}

pub(crate) struct Token {
    pub logged_in: bool,
    sessions: HashMap<CK_SESSION_HANDLE, Session>,
    objects: BTreeMap<CK_OBJECT_HANDLE, Object>,
    last_handle: CK_ULONG,
    random_state: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            logged_in: false,
            sessions: HashMap::new(),
            objects: BTreeMap::new(),
            last_handle: 0,
            random_state: 0x9E37_79B9_7F4A_7C15,
        }
    }
}

static TOKEN: Lazy<Mutex<Token>> = Lazy::new(Default::default);

pub(crate) fn token() -> MockResult<MutexGuard<'static, Token>> {
    TOKEN.lock().map_err(|_| MockError::Poisoned)
}

impl Token {
    /// Forget every session and object, as `C_Finalize` requires.
    pub(crate) fn reset(&mut self) {
        debug!(
            "resetting the token: {} sessions, {} objects",
            self.sessions.len(),
            self.objects.len()
        );
        *self = Self::default();
    }

    fn next_handle(&mut self) -> CK_ULONG {
        self.last_handle += 1;
        self.last_handle
    }

    pub(crate) fn open_session(
        &mut self,
        slot_id: CK_SLOT_ID,
        flags: CK_FLAGS,
    ) -> CK_SESSION_HANDLE {
        let handle = self.next_handle();
        self.sessions.insert(
            handle,
            Session {
                slot_id,
                flags,
                operation: None,
            },
        );
        handle
    }

    pub(crate) fn close_session(&mut self, handle: CK_SESSION_HANDLE) -> MockResult<()> {
        self.sessions
            .remove(&handle)
            .map(|_| ())
            .ok_or(MockError::SessionHandleInvalid(handle))?;
        if self.sessions.is_empty() {
            self.logged_in = false;
        }
        Ok(())
    }

    pub(crate) fn close_all_sessions(&mut self, slot_id: CK_SLOT_ID) {
        self.sessions.retain(|_, session| session.slot_id != slot_id);
        if self.sessions.is_empty() {
            self.logged_in = false;
        }
    }

    pub(crate) fn session(&self, handle: CK_SESSION_HANDLE) -> MockResult<&Session> {
        self.sessions
            .get(&handle)
            .ok_or(MockError::SessionHandleInvalid(handle))
    }

    pub(crate) fn session_mut(&mut self, handle: CK_SESSION_HANDLE) -> MockResult<&mut Session> {
        self.sessions
            .get_mut(&handle)
            .ok_or(MockError::SessionHandleInvalid(handle))
    }

    /// `(all sessions, read-write sessions)`.
    pub(crate) fn session_counts(&self) -> MockResult<(CK_ULONG, CK_ULONG)> {
        let rw = self
            .sessions
            .values()
            .filter(|session| session.flags & CKF_RW_SESSION != 0)
            .count();
        Ok((
            CK_ULONG::try_from(self.sessions.len())?,
            CK_ULONG::try_from(rw)?,
        ))
    }

    pub(crate) fn session_state(&self, session: &Session) -> CK_STATE {
        match (session.flags & CKF_RW_SESSION != 0, self.logged_in) {
            (false, false) => CKS_RO_PUBLIC_SESSION,
            (false, true) => CKS_RO_USER_FUNCTIONS,
            (true, false) => CKS_RW_PUBLIC_SESSION,
            (true, true) => CKS_RW_USER_FUNCTIONS,
        }
    }

    pub(crate) fn insert_object(&mut self, object: Object) -> CK_OBJECT_HANDLE {
        let handle = self.next_handle();
        self.objects.insert(handle, object);
        handle
    }

    pub(crate) fn object(&self, handle: CK_OBJECT_HANDLE) -> MockResult<&Object> {
        self.objects
            .get(&handle)
            .ok_or(MockError::ObjectHandleInvalid(handle))
    }

    pub(crate) fn object_mut(&mut self, handle: CK_OBJECT_HANDLE) -> MockResult<&mut Object> {
        self.objects
            .get_mut(&handle)
            .ok_or(MockError::ObjectHandleInvalid(handle))
    }

    pub(crate) fn remove_object(&mut self, handle: CK_OBJECT_HANDLE) -> MockResult<()> {
        self.objects
            .remove(&handle)
            .map(|_| ())
            .ok_or(MockError::ObjectHandleInvalid(handle))
    }

    /// Handles of the objects holding every attribute of `template` with the same value.
    pub(crate) fn matching(
        &self,
        template: &[(CK_ATTRIBUTE_TYPE, Vec<u8>)],
    ) -> Vec<CK_OBJECT_HANDLE> {
        self.objects
            .iter()
            .filter(|(_, object)| {
                template
                    .iter()
                    .all(|(type_, value)| object.get(type_) == Some(value))
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub(crate) fn seed(&mut self, seed: &[u8]) {
        for byte in seed {
            self.random_state = self
                .random_state
                .rotate_left(8)
                .wrapping_mul(0x100_0000_01B3)
                ^ u64::from(*byte);
        }
        if self.random_state == 0 {
            self.random_state = 1;
        }
    }

    /// `len` bytes of a xorshift sequence: reproducible, not secure.
    pub(crate) fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            let mut x = self.random_state;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.random_state = x;
            bytes.extend(x.to_le_bytes().into_iter().take(len - bytes.len()));
        }
        bytes
    }
}

/// Whether `object` marks `type_` as unreadable.
pub(crate) fn is_sensitive(object: &Object, type_: CK_ATTRIBUTE_TYPE) -> bool {
    type_ == CKA_VALUE
        && object.get(&CKA_SENSITIVE).map(Vec::as_slice) == Some(&[CK_TRUE][..])
}
