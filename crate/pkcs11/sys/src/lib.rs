// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Raw PKCS#11 v2.40 ABI definitions.
//!
//! Section 2.1 "Structure packing" of the PKCS#11 base standard asks for 1-byte packing.
//! In practice only Windows modules honour it; POSIX modules use natural alignment.
//! Records are therefore packed on Windows only. The function list is the exception:
//! both layouts are defined on every platform, so that a loader can pick one at runtime.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::os::raw::{c_long, c_ulong, c_void};

mod constants;
pub use constants::*;

pub type CK_BYTE = u8;
pub type CK_CHAR = CK_BYTE;
pub type CK_UTF8CHAR = CK_BYTE;
pub type CK_BBOOL = CK_BYTE;
pub type CK_ULONG = c_ulong;
pub type CK_LONG = c_long;
pub type CK_FLAGS = CK_ULONG;

pub type CK_BYTE_PTR = *mut CK_BYTE;
pub type CK_CHAR_PTR = *mut CK_CHAR;
pub type CK_UTF8CHAR_PTR = *mut CK_UTF8CHAR;
pub type CK_ULONG_PTR = *mut CK_ULONG;
pub type CK_VOID_PTR = *mut c_void;
pub type CK_VOID_PTR_PTR = *mut CK_VOID_PTR;

pub type CK_RV = CK_ULONG;
pub type CK_NOTIFICATION = CK_ULONG;
pub type CK_SLOT_ID = CK_ULONG;
pub type CK_SLOT_ID_PTR = *mut CK_SLOT_ID;
pub type CK_SESSION_HANDLE = CK_ULONG;
pub type CK_SESSION_HANDLE_PTR = *mut CK_SESSION_HANDLE;
pub type CK_USER_TYPE = CK_ULONG;
pub type CK_STATE = CK_ULONG;
pub type CK_OBJECT_HANDLE = CK_ULONG;
pub type CK_OBJECT_HANDLE_PTR = *mut CK_OBJECT_HANDLE;
pub type CK_OBJECT_CLASS = CK_ULONG;
pub type CK_KEY_TYPE = CK_ULONG;
pub type CK_CERTIFICATE_TYPE = CK_ULONG;
pub type CK_ATTRIBUTE_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE_PTR = *mut CK_MECHANISM_TYPE;
pub type CK_RSA_PKCS_MGF_TYPE = CK_ULONG;
pub type CK_RSA_PKCS_OAEP_SOURCE_TYPE = CK_ULONG;

/// bindgen style zeroed `Default` for records holding raw pointers or long arrays.
macro_rules! zeroed_default {
    ($($record:ty),* $(,)?) => {
        $(
            impl Default for $record {
                fn default() -> Self {
                    let mut s = ::std::mem::MaybeUninit::<Self>::uninit();
                    unsafe {
                        ::std::ptr::write_bytes(s.as_mut_ptr(), 0, 1);
                        s.assume_init()
                    }
                }
            }
        )*
    };
}

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CK_VERSION {
    pub major: CK_BYTE,
    pub minor: CK_BYTE,
}

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CK_INFO {
    pub cryptokiVersion: CK_VERSION,
    pub manufacturerID: [CK_UTF8CHAR; 32],
    pub flags: CK_FLAGS,
    pub libraryDescription: [CK_UTF8CHAR; 32],
    pub libraryVersion: CK_VERSION,
}
pub type CK_INFO_PTR = *mut CK_INFO;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_SLOT_INFO {
    pub slotDescription: [CK_UTF8CHAR; 64],
    pub manufacturerID: [CK_UTF8CHAR; 32],
    pub flags: CK_FLAGS,
    pub hardwareVersion: CK_VERSION,
    pub firmwareVersion: CK_VERSION,
}
pub type CK_SLOT_INFO_PTR = *mut CK_SLOT_INFO;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CK_TOKEN_INFO {
    pub label: [CK_UTF8CHAR; 32],
    pub manufacturerID: [CK_UTF8CHAR; 32],
    pub model: [CK_UTF8CHAR; 16],
    pub serialNumber: [CK_CHAR; 16],
    pub flags: CK_FLAGS,
    pub ulMaxSessionCount: CK_ULONG,
    pub ulSessionCount: CK_ULONG,
    pub ulMaxRwSessionCount: CK_ULONG,
    pub ulRwSessionCount: CK_ULONG,
    pub ulMaxPinLen: CK_ULONG,
    pub ulMinPinLen: CK_ULONG,
    pub ulTotalPublicMemory: CK_ULONG,
    pub ulFreePublicMemory: CK_ULONG,
    pub ulTotalPrivateMemory: CK_ULONG,
    pub ulFreePrivateMemory: CK_ULONG,
    pub hardwareVersion: CK_VERSION,
    pub firmwareVersion: CK_VERSION,
    pub utcTime: [CK_CHAR; 16],
}
pub type CK_TOKEN_INFO_PTR = *mut CK_TOKEN_INFO;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CK_SESSION_INFO {
    pub slotID: CK_SLOT_ID,
    pub state: CK_STATE,
    pub flags: CK_FLAGS,
    pub ulDeviceError: CK_ULONG,
}
pub type CK_SESSION_INFO_PTR = *mut CK_SESSION_INFO;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CK_MECHANISM_INFO {
    pub ulMinKeySize: CK_ULONG,
    pub ulMaxKeySize: CK_ULONG,
    pub flags: CK_FLAGS,
}
pub type CK_MECHANISM_INFO_PTR = *mut CK_MECHANISM_INFO;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_ATTRIBUTE {
    pub type_: CK_ATTRIBUTE_TYPE,
    pub pValue: CK_VOID_PTR,
    pub ulValueLen: CK_ULONG,
}
pub type CK_ATTRIBUTE_PTR = *mut CK_ATTRIBUTE;

/// A date as three fixed-width runs of ASCII digits, `YYYY` `MM` `DD`.
#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CK_DATE {
    pub year: [CK_CHAR; 4],
    pub month: [CK_CHAR; 2],
    pub day: [CK_CHAR; 2],
}

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_MECHANISM {
    pub mechanism: CK_MECHANISM_TYPE,
    pub pParameter: CK_VOID_PTR,
    pub ulParameterLen: CK_ULONG,
}
pub type CK_MECHANISM_PTR = *mut CK_MECHANISM;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_RSA_PKCS_OAEP_PARAMS {
    pub hashAlg: CK_MECHANISM_TYPE,
    pub mgf: CK_RSA_PKCS_MGF_TYPE,
    pub source: CK_RSA_PKCS_OAEP_SOURCE_TYPE,
    pub pSourceData: CK_VOID_PTR,
    pub ulSourceDataLen: CK_ULONG,
}

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CK_RSA_PKCS_PSS_PARAMS {
    pub hashAlg: CK_MECHANISM_TYPE,
    pub mgf: CK_RSA_PKCS_MGF_TYPE,
    pub sLen: CK_ULONG,
}

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_GCM_PARAMS {
    pub pIv: CK_BYTE_PTR,
    pub ulIvLen: CK_ULONG,
    pub ulIvBits: CK_ULONG,
    pub pAAD: CK_BYTE_PTR,
    pub ulAADLen: CK_ULONG,
    pub ulTagBits: CK_ULONG,
}

pub type CK_CREATEMUTEX = Option<unsafe extern "C" fn(ppMutex: CK_VOID_PTR_PTR) -> CK_RV>;
pub type CK_DESTROYMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_LOCKMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_UNLOCKMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_NOTIFY = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        event: CK_NOTIFICATION,
        pApplication: CK_VOID_PTR,
    ) -> CK_RV,
>;

#[cfg_attr(not(target_os = "windows"), repr(C))]
#[cfg_attr(target_os = "windows", repr(C, packed))]
#[derive(Debug, Clone, Copy)]
pub struct CK_C_INITIALIZE_ARGS {
    pub CreateMutex: CK_CREATEMUTEX,
    pub DestroyMutex: CK_DESTROYMUTEX,
    pub LockMutex: CK_LOCKMUTEX,
    pub UnlockMutex: CK_UNLOCKMUTEX,
    pub flags: CK_FLAGS,
    pub pReserved: CK_VOID_PTR,
}
pub type CK_C_INITIALIZE_ARGS_PTR = *mut CK_C_INITIALIZE_ARGS;

zeroed_default!(
    CK_SLOT_INFO,
    CK_ATTRIBUTE,
    CK_MECHANISM,
    CK_RSA_PKCS_OAEP_PARAMS,
    CK_GCM_PARAMS,
    CK_C_INITIALIZE_ARGS,
);

pub type CK_C_Initialize = unsafe extern "C" fn(pInitArgs: CK_VOID_PTR) -> CK_RV;
pub type CK_C_Finalize = unsafe extern "C" fn(pReserved: CK_VOID_PTR) -> CK_RV;
pub type CK_C_GetInfo = unsafe extern "C" fn(pInfo: CK_INFO_PTR) -> CK_RV;
pub type CK_C_GetFunctionList =
    unsafe extern "C" fn(ppFunctionList: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV;
pub type CK_C_GetSlotList = unsafe extern "C" fn(
    tokenPresent: CK_BBOOL,
    pSlotList: CK_SLOT_ID_PTR,
    pulCount: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_GetSlotInfo =
    unsafe extern "C" fn(slotID: CK_SLOT_ID, pInfo: CK_SLOT_INFO_PTR) -> CK_RV;
pub type CK_C_GetTokenInfo =
    unsafe extern "C" fn(slotID: CK_SLOT_ID, pInfo: CK_TOKEN_INFO_PTR) -> CK_RV;
pub type CK_C_GetMechanismList = unsafe extern "C" fn(
    slotID: CK_SLOT_ID,
    pMechanismList: CK_MECHANISM_TYPE_PTR,
    pulCount: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_GetMechanismInfo = unsafe extern "C" fn(
    slotID: CK_SLOT_ID,
    type_: CK_MECHANISM_TYPE,
    pInfo: CK_MECHANISM_INFO_PTR,
) -> CK_RV;
pub type CK_C_InitToken = unsafe extern "C" fn(
    slotID: CK_SLOT_ID,
    pPin: CK_UTF8CHAR_PTR,
    ulPinLen: CK_ULONG,
    pLabel: CK_UTF8CHAR_PTR,
) -> CK_RV;
pub type CK_C_InitPIN = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPin: CK_UTF8CHAR_PTR,
    ulPinLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_SetPIN = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pOldPin: CK_UTF8CHAR_PTR,
    ulOldLen: CK_ULONG,
    pNewPin: CK_UTF8CHAR_PTR,
    ulNewLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_OpenSession = unsafe extern "C" fn(
    slotID: CK_SLOT_ID,
    flags: CK_FLAGS,
    pApplication: CK_VOID_PTR,
    Notify: CK_NOTIFY,
    phSession: CK_SESSION_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_CloseSession = unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV;
pub type CK_C_CloseAllSessions = unsafe extern "C" fn(slotID: CK_SLOT_ID) -> CK_RV;
pub type CK_C_GetSessionInfo =
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, pInfo: CK_SESSION_INFO_PTR) -> CK_RV;
pub type CK_C_GetOperationState = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pOperationState: CK_BYTE_PTR,
    pulOperationStateLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_SetOperationState = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pOperationState: CK_BYTE_PTR,
    ulOperationStateLen: CK_ULONG,
    hEncryptionKey: CK_OBJECT_HANDLE,
    hAuthenticationKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_Login = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    userType: CK_USER_TYPE,
    pPin: CK_UTF8CHAR_PTR,
    ulPinLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_Logout = unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV;
pub type CK_C_CreateObject = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phObject: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_CopyObject = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phNewObject: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_DestroyObject =
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, hObject: CK_OBJECT_HANDLE) -> CK_RV;
pub type CK_C_GetObjectSize = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pulSize: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_GetAttributeValue = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV;
pub type CK_C_SetAttributeValue = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    hObject: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV;
pub type CK_C_FindObjectsInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
) -> CK_RV;
pub type CK_C_FindObjects = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    phObject: CK_OBJECT_HANDLE_PTR,
    ulMaxObjectCount: CK_ULONG,
    pulObjectCount: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_FindObjectsFinal = unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV;
pub type CK_C_EncryptInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_Encrypt = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pEncryptedData: CK_BYTE_PTR,
    pulEncryptedDataLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_EncryptUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_EncryptFinal = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pLastEncryptedPart: CK_BYTE_PTR,
    pulLastEncryptedPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DecryptInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_Decrypt = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pEncryptedData: CK_BYTE_PTR,
    ulEncryptedDataLen: CK_ULONG,
    pData: CK_BYTE_PTR,
    pulDataLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DecryptUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DecryptFinal = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pLastPart: CK_BYTE_PTR,
    pulLastPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DigestInit =
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, pMechanism: CK_MECHANISM_PTR) -> CK_RV;
pub type CK_C_Digest = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pDigest: CK_BYTE_PTR,
    pulDigestLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DigestUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_DigestKey =
    unsafe extern "C" fn(hSession: CK_SESSION_HANDLE, hKey: CK_OBJECT_HANDLE) -> CK_RV;
pub type CK_C_DigestFinal = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pDigest: CK_BYTE_PTR,
    pulDigestLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_SignInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_Sign = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_SignUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_SignFinal = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_SignRecoverInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_SignRecover = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_VerifyInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_Verify = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_VerifyUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_VerifyFinal = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_VerifyRecoverInit = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE,
) -> CK_RV;
pub type CK_C_VerifyRecover = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG,
    pData: CK_BYTE_PTR,
    pulDataLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DigestEncryptUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DecryptDigestUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_SignEncryptUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_DecryptVerifyUpdate = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_GenerateKey = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_GenerateKeyPair = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    pPublicKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPublicKeyAttributeCount: CK_ULONG,
    pPrivateKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPrivateKeyAttributeCount: CK_ULONG,
    phPublicKey: CK_OBJECT_HANDLE_PTR,
    phPrivateKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_WrapKey = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hWrappingKey: CK_OBJECT_HANDLE,
    hKey: CK_OBJECT_HANDLE,
    pWrappedKey: CK_BYTE_PTR,
    pulWrappedKeyLen: CK_ULONG_PTR,
) -> CK_RV;
pub type CK_C_UnwrapKey = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hUnwrappingKey: CK_OBJECT_HANDLE,
    pWrappedKey: CK_BYTE_PTR,
    ulWrappedKeyLen: CK_ULONG,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_DeriveKey = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hBaseKey: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR,
) -> CK_RV;
pub type CK_C_SeedRandom = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    pSeed: CK_BYTE_PTR,
    ulSeedLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_GenerateRandom = unsafe extern "C" fn(
    hSession: CK_SESSION_HANDLE,
    RandomData: CK_BYTE_PTR,
    ulRandomLen: CK_ULONG,
) -> CK_RV;
pub type CK_C_GetFunctionStatus = unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV;
pub type CK_C_CancelFunction = unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV;
pub type CK_C_WaitForSlotEvent = unsafe extern "C" fn(
    flags: CK_FLAGS,
    pSlot: CK_SLOT_ID_PTR,
    pRserved: CK_VOID_PTR,
) -> CK_RV;

/// Invokes `$callback! { C_Initialize: CK_C_Initialize, ... }` with every entry point
/// of the function list, in struct order.
///
/// This is the only place the entry-point set is spelled out. Both function-list
/// layouts below and any table built by a loader are generated from it.
#[macro_export]
macro_rules! with_pkcs11_functions {
    ($callback:ident) => {
        $callback! {
            C_Initialize: $crate::CK_C_Initialize,
            C_Finalize: $crate::CK_C_Finalize,
            C_GetInfo: $crate::CK_C_GetInfo,
            C_GetFunctionList: $crate::CK_C_GetFunctionList,
            C_GetSlotList: $crate::CK_C_GetSlotList,
            C_GetSlotInfo: $crate::CK_C_GetSlotInfo,
            C_GetTokenInfo: $crate::CK_C_GetTokenInfo,
            C_GetMechanismList: $crate::CK_C_GetMechanismList,
            C_GetMechanismInfo: $crate::CK_C_GetMechanismInfo,
            C_InitToken: $crate::CK_C_InitToken,
            C_InitPIN: $crate::CK_C_InitPIN,
            C_SetPIN: $crate::CK_C_SetPIN,
            C_OpenSession: $crate::CK_C_OpenSession,
            C_CloseSession: $crate::CK_C_CloseSession,
            C_CloseAllSessions: $crate::CK_C_CloseAllSessions,
            C_GetSessionInfo: $crate::CK_C_GetSessionInfo,
            C_GetOperationState: $crate::CK_C_GetOperationState,
            C_SetOperationState: $crate::CK_C_SetOperationState,
            C_Login: $crate::CK_C_Login,
            C_Logout: $crate::CK_C_Logout,
            C_CreateObject: $crate::CK_C_CreateObject,
            C_CopyObject: $crate::CK_C_CopyObject,
            C_DestroyObject: $crate::CK_C_DestroyObject,
            C_GetObjectSize: $crate::CK_C_GetObjectSize,
            C_GetAttributeValue: $crate::CK_C_GetAttributeValue,
            C_SetAttributeValue: $crate::CK_C_SetAttributeValue,
            C_FindObjectsInit: $crate::CK_C_FindObjectsInit,
            C_FindObjects: $crate::CK_C_FindObjects,
            C_FindObjectsFinal: $crate::CK_C_FindObjectsFinal,
            C_EncryptInit: $crate::CK_C_EncryptInit,
            C_Encrypt: $crate::CK_C_Encrypt,
            C_EncryptUpdate: $crate::CK_C_EncryptUpdate,
            C_EncryptFinal: $crate::CK_C_EncryptFinal,
            C_DecryptInit: $crate::CK_C_DecryptInit,
            C_Decrypt: $crate::CK_C_Decrypt,
            C_DecryptUpdate: $crate::CK_C_DecryptUpdate,
            C_DecryptFinal: $crate::CK_C_DecryptFinal,
            C_DigestInit: $crate::CK_C_DigestInit,
            C_Digest: $crate::CK_C_Digest,
            C_DigestUpdate: $crate::CK_C_DigestUpdate,
            C_DigestKey: $crate::CK_C_DigestKey,
            C_DigestFinal: $crate::CK_C_DigestFinal,
            C_SignInit: $crate::CK_C_SignInit,
            C_Sign: $crate::CK_C_Sign,
            C_SignUpdate: $crate::CK_C_SignUpdate,
            C_SignFinal: $crate::CK_C_SignFinal,
            C_SignRecoverInit: $crate::CK_C_SignRecoverInit,
            C_SignRecover: $crate::CK_C_SignRecover,
            C_VerifyInit: $crate::CK_C_VerifyInit,
            C_Verify: $crate::CK_C_Verify,
            C_VerifyUpdate: $crate::CK_C_VerifyUpdate,
            C_VerifyFinal: $crate::CK_C_VerifyFinal,
            C_VerifyRecoverInit: $crate::CK_C_VerifyRecoverInit,
            C_VerifyRecover: $crate::CK_C_VerifyRecover,
            C_DigestEncryptUpdate: $crate::CK_C_DigestEncryptUpdate,
            C_DecryptDigestUpdate: $crate::CK_C_DecryptDigestUpdate,
            C_SignEncryptUpdate: $crate::CK_C_SignEncryptUpdate,
            C_DecryptVerifyUpdate: $crate::CK_C_DecryptVerifyUpdate,
            C_GenerateKey: $crate::CK_C_GenerateKey,
            C_GenerateKeyPair: $crate::CK_C_GenerateKeyPair,
            C_WrapKey: $crate::CK_C_WrapKey,
            C_UnwrapKey: $crate::CK_C_UnwrapKey,
            C_DeriveKey: $crate::CK_C_DeriveKey,
            C_SeedRandom: $crate::CK_C_SeedRandom,
            C_GenerateRandom: $crate::CK_C_GenerateRandom,
            C_GetFunctionStatus: $crate::CK_C_GetFunctionStatus,
            C_CancelFunction: $crate::CK_C_CancelFunction,
            C_WaitForSlotEvent: $crate::CK_C_WaitForSlotEvent,
        }
    };
}

macro_rules! define_function_lists {
    ($($name:ident: $signature:ty),* $(,)?) => {
        /// The function list as POSIX compilers lay it out: natural alignment, so the
        /// first entry point sits after the padding that follows `version`.
        #[repr(C)]
        #[derive(Debug, Default, Clone, Copy)]
        pub struct CK_FUNCTION_LIST {
            pub version: CK_VERSION,
            $(pub $name: Option<$signature>,)*
        }

        /// The function list as the Windows headers lay it out under `#pragma pack(1)`:
        /// the first entry point follows `version` immediately.
        #[repr(C, packed)]
        #[derive(Debug, Default, Clone, Copy)]
        pub struct CK_FUNCTION_LIST_PACKED {
            pub version: CK_VERSION,
            $(pub $name: Option<$signature>,)*
        }

        /// Exported symbol names, in function-list order.
        pub const CK_FUNCTION_NAMES: &[&str] = &[$(stringify!($name)),*];
    };
}

with_pkcs11_functions!(define_function_lists);

pub type CK_FUNCTION_LIST_PTR = *mut CK_FUNCTION_LIST;
pub type CK_FUNCTION_LIST_PTR_PTR = *mut CK_FUNCTION_LIST_PTR;
