/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the error type shared by the security engine crates.

    Error codes are laid out as 0xCCCC_KKNN:

    * CCCC - component (engine, keyslot, rsa, cipher)
    * KK   - error kind (see `ErrorKind`)
    * NN   - sequence number within the component and kind

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// Security Engine Error Type
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SecEngError(pub NonZeroU32);

/// Error taxonomy shared by every component.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed caller input
    InvalidArgs,

    /// Feature not available on this platform or engine
    Unsupported,

    /// Operation invoked out of sequence
    BadState,

    /// Key material failed a shape or validity check
    InvalidKey,

    /// Hardware reported an error after a command
    EngineFault,

    /// Wait for engine idle exceeded its bound
    Timeout,

    /// Code does not carry a known kind
    Unknown,
}

impl ErrorKind {
    const fn from_code(code: u32) -> Self {
        match (code >> 8) & 0xff {
            0x01 => Self::InvalidArgs,
            0x02 => Self::Unsupported,
            0x03 => Self::BadState,
            0x04 => Self::InvalidKey,
            0x05 => Self::EngineFault,
            0x06 => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: SecEngError = SecEngError::new_const($value);
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl SecEngError {
    /// Create an error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get a SecEngError from a u32 is to
    /// use `SecEngError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("SecEngError cannot be 0"),
        }
    }

    /// Kind of the error, decoded from the code.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.0.get())
    }

    /// Component that raised the error.
    pub const fn component(&self) -> u16 {
        (self.0.get() >> 16) as u16
    }

    define_error_constants![
        (
            DRIVER_ENGINE_CLASS_MISMATCH,
            0x0001_0101,
            "Engine Error: engine class does not match the operation"
        ),
        (
            DRIVER_ENGINE_DMA_ADDRESS,
            0x0001_0102,
            "Engine Error: buffer address cannot be translated for DMA"
        ),
        (
            DRIVER_ENGINE_NOT_FOUND,
            0x0001_0201,
            "Engine Error: no active engine of the requested class"
        ),
        (
            DRIVER_ENGINE_FAULT,
            0x0001_0501,
            "Engine Error: hardware reported a fault"
        ),
        (
            DRIVER_ENGINE_TIMEOUT,
            0x0001_0601,
            "Engine Error: timed out waiting for engine idle"
        ),
        (
            DRIVER_KEYSLOT_OUT_OF_RANGE,
            0x0002_0101,
            "Keyslot Error: keyslot index out of range"
        ),
        (
            DRIVER_KAC_INVALID_KEY_SIZE,
            0x0002_0102,
            "Keyslot Error: unsupported key size"
        ),
        (
            DRIVER_KAC_KEY_LEN_MISMATCH,
            0x0002_0103,
            "Keyslot Error: key data length does not match key size"
        ),
        (
            DRIVER_KAC_UNEXPECTED_KEY_DATA,
            0x0002_0104,
            "Keyslot Error: key data supplied to generate"
        ),
        (
            DRIVER_KAC_MISSING_KEY_DATA,
            0x0002_0105,
            "Keyslot Error: key data missing for insert"
        ),
        (
            DRIVER_KAC_CLONE_SAME_KEYSLOT,
            0x0002_0106,
            "Keyslot Error: clone source and destination are the same"
        ),
        (
            DRIVER_KAC_GENERATE_UNSUPPORTED,
            0x0002_0201,
            "Keyslot Error: key generation not supported"
        ),
        (
            DRIVER_KAC_CLONE_UNSUPPORTED,
            0x0002_0202,
            "Keyslot Error: keyslot clone not supported"
        ),
        (
            DRIVER_KAC_LOCK_UNSUPPORTED,
            0x0002_0203,
            "Keyslot Error: keyslot lock not supported"
        ),
        (
            DRIVER_KAC_ALGORITHM_UNSUPPORTED,
            0x0002_0204,
            "Keyslot Error: algorithm has no keyslot purpose"
        ),
        (
            DRIVER_KAC_INVALID_STATE,
            0x0002_0301,
            "Keyslot Error: keyslot operation out of sequence"
        ),
        (
            DRIVER_KAC_OP_NOT_KEY_SET,
            0x0002_0302,
            "Keyslot Error: operation cannot be routed through key set"
        ),
        (
            DRIVER_KAC_INVALID_USER,
            0x0002_0401,
            "Keyslot Error: reserved manifest user"
        ),
        (
            DRIVER_KAC_INVALID_PURPOSE,
            0x0002_0402,
            "Keyslot Error: unknown manifest purpose"
        ),
        (
            DRIVER_KAC_INVALID_SW_TAG,
            0x0002_0403,
            "Keyslot Error: software tag does not fit the manifest"
        ),
        (
            DRIVER_KAC_OP_FAILED,
            0x0002_0501,
            "Keyslot Error: keyslot operation failed"
        ),
        (
            DRIVER_KAC_KEYSLOT_LOCKED,
            0x0002_0502,
            "Keyslot Error: keyslot is locked"
        ),
        (
            DRIVER_RSA_INVALID_ARGS,
            0x0003_0101,
            "RSA Error: missing or empty key buffer"
        ),
        (
            DRIVER_RSA_BUFFER_SIZE,
            0x0003_0102,
            "RSA Error: buffer length does not match the key size"
        ),
        (
            DRIVER_RSA_KEYSLOTS_UNSUPPORTED,
            0x0003_0201,
            "RSA Error: engine cannot hold RSA keyslots"
        ),
        (
            DRIVER_RSA_MONTGOMERY_UNSUPPORTED,
            0x0003_0202,
            "RSA Error: engine cannot store Montgomery values"
        ),
        (
            DRIVER_RSA_UNSUPPORTED_KEY_SIZE,
            0x0003_0401,
            "RSA Error: unsupported RSA key size"
        ),
        (
            DRIVER_RSA_INVALID_EXPONENT_SIZE,
            0x0003_0402,
            "RSA Error: unsupported exponent size"
        ),
        (
            DRIVER_RSA_MODULUS_MSB_CLEAR,
            0x0003_0403,
            "RSA Error: modulus most significant bit clear"
        ),
        (
            DRIVER_RSA_MODULUS_EVEN,
            0x0003_0404,
            "RSA Error: modulus is even"
        ),
        (
            DRIVER_RSA_EXPONENT_EVEN,
            0x0003_0405,
            "RSA Error: exponent is even"
        ),
        (
            DRIVER_RSA_MONT_R2_ZERO,
            0x0003_0406,
            "RSA Error: Montgomery R^2 is zero"
        ),
        (
            DRIVER_RSA_MONT_R2_OUT_OF_BOUNDS,
            0x0003_0407,
            "RSA Error: Montgomery R^2 not below the modulus"
        ),
        (
            DRIVER_RSA_MONT_M_PRIME_ZERO,
            0x0003_0408,
            "RSA Error: Montgomery M' is zero"
        ),
        (
            DRIVER_RSA_CLEAR_FAILED,
            0x0003_0501,
            "RSA Error: keyslot clear failed"
        ),
        (
            DRIVER_AES_ZERO_LENGTH,
            0x0004_0101,
            "AES Error: zero length input"
        ),
        (
            DRIVER_AES_UNALIGNED_LENGTH,
            0x0004_0102,
            "AES Error: input length not block aligned"
        ),
        (
            DRIVER_AES_OUTPUT_TOO_SMALL,
            0x0004_0103,
            "AES Error: destination smaller than required"
        ),
        (
            DRIVER_AES_INVALID_UNUSED_BITS,
            0x0004_0104,
            "AES Error: unused trailing bit count out of range"
        ),
        (
            DRIVER_AES_TOO_MANY_BLOCKS,
            0x0004_0105,
            "AES Error: input exceeds the last block register"
        ),
        (
            DRIVER_AES_INVALID_COUNTER_INCREMENT,
            0x0004_0106,
            "AES Error: counter increment out of range"
        ),
        (
            DRIVER_AES_NOT_A_CIPHER,
            0x0004_0107,
            "AES Error: algorithm is not a cipher"
        ),
        (
            DRIVER_AES_MISSING_SECOND_KEYSLOT,
            0x0004_0108,
            "AES Error: two-key mode without a second keyslot"
        ),
        (
            DRIVER_AES_INVALID_KEY_MATERIAL,
            0x0004_0109,
            "AES Error: key material length invalid for the algorithm"
        ),
        (
            DRIVER_AES_ALGORITHM_UNSUPPORTED,
            0x0004_0201,
            "AES Error: algorithm not supported by the cipher engine"
        ),
        (
            DRIVER_AES_ALREADY_STARTED,
            0x0004_0301,
            "AES Error: operation already started"
        ),
        (
            DRIVER_AES_INVALID_STATE,
            0x0004_0302,
            "AES Error: operation out of sequence"
        ),
        (
            DRIVER_AES_KEY_ON_OTHER_ENGINE,
            0x0004_0303,
            "AES Error: context key is resident on another engine"
        ),
        (
            DRIVER_AES_OP_FAILED,
            0x0004_0501,
            "AES Error: cipher operation failed"
        ),
    ];
}

impl From<core::num::NonZeroU32> for crate::SecEngError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::SecEngError(val)
    }
}

impl From<SecEngError> for core::num::NonZeroU32 {
    fn from(val: SecEngError) -> Self {
        val.0
    }
}

impl From<SecEngError> for u32 {
    fn from(val: SecEngError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for SecEngError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(SecEngError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type SecEngResult<T> = Result<T, SecEngError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_try_from() {
        assert!(SecEngError::try_from(0).is_err());
        assert_eq!(
            Ok(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE),
            SecEngError::try_from(0x0002_0101)
        );
    }

    #[test]
    fn test_kind_decoding() {
        assert_eq!(
            SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE.kind(),
            ErrorKind::InvalidArgs
        );
        assert_eq!(
            SecEngError::DRIVER_KAC_LOCK_UNSUPPORTED.kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            SecEngError::DRIVER_AES_ALREADY_STARTED.kind(),
            ErrorKind::BadState
        );
        assert_eq!(
            SecEngError::DRIVER_RSA_MODULUS_EVEN.kind(),
            ErrorKind::InvalidKey
        );
        assert_eq!(
            SecEngError::DRIVER_KAC_KEYSLOT_LOCKED.kind(),
            ErrorKind::EngineFault
        );
        assert_eq!(
            SecEngError::DRIVER_ENGINE_TIMEOUT.kind(),
            ErrorKind::Timeout
        );
        assert_eq!(SecEngError::DRIVER_RSA_MODULUS_EVEN.component(), 3);
    }

    #[test]
    fn test_error_constants_uniqueness() {
        let constants = SecEngError::all_constants();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in constants {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }
}
