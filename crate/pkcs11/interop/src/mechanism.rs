use std::{fmt, mem::size_of, ptr};

use cosmian_pkcs11_sys::{
    CK_GCM_PARAMS, CK_MECHANISM, CK_MECHANISM_TYPE, CK_RSA_PKCS_MGF_TYPE,
    CK_RSA_PKCS_OAEP_PARAMS, CK_ULONG, CKM_AES_GCM, CKM_RSA_PKCS_OAEP, CKZ_DATA_SPECIFIED,
};

use crate::{InteropError, InteropResult, memory::UnmanagedBuffer};

/// A `CK_MECHANISM` together with its parameter block and every buffer the
/// parameter block points to.
pub struct NativeMechanism {
    mechanism: CK_MECHANISM_TYPE,
    parameter: Option<UnmanagedBuffer>,
    /// Buffers referenced by pointer fields of the parameter block.
    dependents: Vec<UnmanagedBuffer>,
}

impl NativeMechanism {
    /// A mechanism without parameter.
    #[must_use]
    pub const fn new(mechanism: CK_MECHANISM_TYPE) -> Self {
        Self {
            mechanism,
            parameter: None,
            dependents: Vec::new(),
        }
    }

    /// A parameter given as raw bytes, e.g. the IV of `CKM_AES_CBC`.
    pub fn with_bytes(
        mechanism: CK_MECHANISM_TYPE,
        parameter: Option<&[u8]>,
    ) -> InteropResult<Self> {
        let parameter = match parameter {
            Some(bytes) => Some(UnmanagedBuffer::from_bytes(bytes)?).filter(|b| !b.is_empty()),
            None => None,
        };
        Ok(Self {
            mechanism,
            parameter,
            dependents: Vec::new(),
        })
    }

    /// A parameter given as a structure, copied with its native layout.
    ///
    /// The layout of `P` must be the one the mechanism documents; it is not checked.
    pub fn with_parameters<P: Copy>(
        mechanism: CK_MECHANISM_TYPE,
        parameters: &P,
    ) -> InteropResult<Self> {
        let buffer = UnmanagedBuffer::from_value(parameters)?;
        Ok(Self {
            mechanism,
            parameter: (!buffer.is_empty()).then_some(buffer),
            dependents: Vec::new(),
        })
    }

    /// `CKM_RSA_PKCS_OAEP` with an optional encoding parameter (label).
    pub fn rsa_pkcs_oaep(
        hash_alg: CK_MECHANISM_TYPE,
        mgf: CK_RSA_PKCS_MGF_TYPE,
        source_data: Option<&[u8]>,
    ) -> InteropResult<Self> {
        let source = match source_data {
            Some(bytes) => UnmanagedBuffer::from_bytes(bytes)?,
            None => UnmanagedBuffer::empty(),
        };
        let params = CK_RSA_PKCS_OAEP_PARAMS {
            hashAlg: hash_alg,
            mgf,
            source: CKZ_DATA_SPECIFIED,
            pSourceData: source.as_mut_ptr(),
            ulSourceDataLen: source.ck_len(),
        };
        let mut mechanism = Self::with_parameters(CKM_RSA_PKCS_OAEP, &params)?;
        mechanism.dependents.push(source);
        Ok(mechanism)
    }

    /// `CKM_AES_GCM` with the given IV, additional data and tag length in bits.
    pub fn aes_gcm(iv: &[u8], aad: Option<&[u8]>, tag_bits: CK_ULONG) -> InteropResult<Self> {
        let iv = UnmanagedBuffer::from_bytes(iv)?;
        let aad = match aad {
            Some(bytes) => UnmanagedBuffer::from_bytes(bytes)?,
            None => UnmanagedBuffer::empty(),
        };
        let iv_bits = iv
            .ck_len()
            .checked_mul(8)
            .ok_or_else(|| InteropError::Allocation(format!("IV of {} bytes", iv.len())))?;
        let params = CK_GCM_PARAMS {
            pIv: iv.as_mut_ptr().cast(),
            ulIvLen: iv.ck_len(),
            ulIvBits: iv_bits,
            pAAD: aad.as_mut_ptr().cast(),
            ulAADLen: aad.ck_len(),
            ulTagBits: tag_bits,
        };
        let mut mechanism = Self::with_parameters(CKM_AES_GCM, &params)?;
        mechanism.dependents.push(iv);
        mechanism.dependents.push(aad);
        Ok(mechanism)
    }

    #[must_use]
    pub const fn mechanism_type(&self) -> CK_MECHANISM_TYPE {
        self.mechanism
    }

    #[must_use]
    pub fn parameter(&self) -> Option<&[u8]> {
        self.parameter.as_ref().map(UnmanagedBuffer::as_slice)
    }

    /// The record to hand to a module, valid as long as `self` lives.
    #[must_use]
    pub fn raw(&self) -> CK_MECHANISM {
        match &self.parameter {
            Some(buffer) => CK_MECHANISM {
                mechanism: self.mechanism,
                pParameter: buffer.as_mut_ptr(),
                ulParameterLen: buffer.ck_len(),
            },
            None => CK_MECHANISM {
                mechanism: self.mechanism,
                pParameter: ptr::null_mut(),
                ulParameterLen: 0,
            },
        }
    }

    /// Read the parameter block back as a `P`. `None` without parameter.
    ///
    /// # Safety
    ///
    /// Every bit pattern of the parameter block must be a valid `P`.
    pub unsafe fn read_parameters<P: Copy>(&self) -> InteropResult<Option<P>> {
        let Some(buffer) = &self.parameter else {
            return Ok(None);
        };
        if buffer.len() != size_of::<P>() {
            return Err(InteropError::MalformedValue {
                type_: self.mechanism,
                length: buffer.len(),
                element_size: size_of::<P>(),
            });
        }
        Ok(Some(unsafe { buffer.read_value::<P>(0) }?))
    }

    /// Release the parameter block and its dependents now.
    pub fn free(self) {
        drop(self);
    }
}

impl fmt::Debug for NativeMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMechanism")
            .field("mechanism", &format_args!("{:#x}", self.mechanism))
            .field("parameter_len", &self.parameter.as_ref().map_or(0, UnmanagedBuffer::len))
            .field("dependents", &self.dependents.len())
            .finish()
    }
}
