/*++

Licensed under the Apache-2.0 license.

File Name:

    algorithm.rs

Abstract:

    File contains the algorithm identifiers understood by the engine drivers.

--*/

/// Role of a key in a two-key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationKeyRole {
    /// Key derivation key
    Kdk,

    /// Key derivation data
    Kdd,
}

/// Security engine algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeAlgorithm {
    AesEcb,
    AesCbc,
    AesCts,
    AesCtr,
    AesOfb,
    AesCcm,
    AesGcm,
    AesGmac,
    AesXts,
    AesCmac,
    AesKeyWrap,
    AesKeyUnwrap,
    AesKeyWrapUnwrap,
    Kdf2Key(DerivationKeyRole),
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl SeAlgorithm {
    /// Algorithm runs on the AES engine
    pub fn is_cipher(self) -> bool {
        match self {
            Self::AesEcb
            | Self::AesCbc
            | Self::AesCts
            | Self::AesCtr
            | Self::AesOfb
            | Self::AesCcm
            | Self::AesGcm
            | Self::AesGmac
            | Self::AesXts
            | Self::AesCmac
            | Self::AesKeyWrap
            | Self::AesKeyUnwrap
            | Self::AesKeyWrapUnwrap => true,
            Self::Kdf2Key(_)
            | Self::HmacSha1
            | Self::HmacSha224
            | Self::HmacSha256
            | Self::HmacSha384
            | Self::HmacSha512
            | Self::Sha1
            | Self::Sha224
            | Self::Sha256
            | Self::Sha384
            | Self::Sha512 => false,
        }
    }

    /// Input may end in a partial block
    pub fn allows_residual(self) -> bool {
        matches!(
            self,
            Self::AesXts
                | Self::AesGcm
                | Self::AesGmac
                | Self::AesKeyWrap
                | Self::AesKeyUnwrap
                | Self::AesKeyWrapUnwrap
        )
    }

    pub fn is_key_wrap(self) -> bool {
        matches!(
            self,
            Self::AesKeyWrap | Self::AesKeyUnwrap | Self::AesKeyWrapUnwrap
        )
    }

    /// Mode keeps a 128-bit counter in the linear counter register
    pub fn uses_linear_counter(self) -> bool {
        matches!(self, Self::AesCtr | Self::AesCcm | Self::AesGcm)
    }
}

/// Cipher direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    Encrypt,
    Decrypt,
}

/// Byte order of a multi-precision operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}
