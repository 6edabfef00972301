/*++

Licensed under the Apache-2.0 license.

File Name:

    manifest.rs

Abstract:

    File contains the key access controller manifest and keyslot control
    encoding, and the mapping from algorithms to keyslot purposes.

--*/

use bitfield::bitfield;
use seceng_error::{SecEngError, SecEngResult};

use crate::{DerivationKeyRole, SeAlgorithm, SupportedFeatures};

/// Largest software tag the manifest can carry
pub const MAX_SW_TAG: u32 = 0xffff;

/// Keyslot User
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KacUser {
    Reserved = 0,
    Psc = 1,
    Tz = 2,
    Ns = 3,
    Fsi = 4,
}

/// Keyslot Purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KacPurpose {
    Enc = 0,
    Cmac = 1,
    Hmac = 2,
    Kw = 3,
    Kuw = 4,
    Kwuw = 5,
    Kdk = 6,
    Kdd = 7,
    KddKuw = 8,
    Xts = 9,
    Gcm = 10,

    /// Placeholder, never written to hardware
    Unknown = 0x1f,
}

/// Keyslot key size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Bits128,
    Bits192,
    Bits256,
}

impl KeySize {
    pub fn from_bits(bits: u32) -> SecEngResult<Self> {
        match bits {
            128 => Ok(Self::Bits128),
            192 => Ok(Self::Bits192),
            256 => Ok(Self::Bits256),
            _ => Err(SecEngError::DRIVER_KAC_INVALID_KEY_SIZE),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits128 => 128,
            Self::Bits192 => 192,
            Self::Bits256 => 256,
        }
    }

    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    fn field(self) -> u32 {
        match self {
            Self::Bits128 => 0,
            Self::Bits192 => 1,
            Self::Bits256 => 2,
        }
    }
}

bitfield! {
    /// KAC Manifest register word
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct ManifestReg(u32);

    /// Purpose of the key
    pub u32, purpose, set_purpose: 4, 0;

    /// Owner allowed to use the key
    pub u32, user, set_user: 7, 5;

    /// Key may be exported from the keyslot
    pub exportable, set_exportable: 8;

    /// Origin of the key, written by hardware
    pub u32, origin, _: 11, 9;

    /// Key size
    pub u32, size, set_size: 15, 14;

    /// Software tag
    pub u32, sw, set_sw: 31, 16;
}

bitfield! {
    /// KAC Control register word
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct KeyslotCtrlReg(u32);

    /// Keyslot is locked until engine reset
    pub lock, set_lock: 0;

    /// Keyslot holds a key, written by hardware
    pub valid, _: 1;
}

/// Manifest of a key inserted or generated into a keyslot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KacManifest {
    pub user: KacUser,
    pub purpose: KacPurpose,
    pub size: KeySize,
    pub exportable: bool,
    pub sw_tag: u32,
}

impl KacManifest {
    /// Pack the manifest into its register word
    pub fn pack(&self) -> u32 {
        let mut reg = ManifestReg::default();
        reg.set_purpose(self.purpose as u32);
        reg.set_user(self.user as u32);
        reg.set_exportable(self.exportable);
        reg.set_size(self.size.field());
        reg.set_sw(self.sw_tag & MAX_SW_TAG);
        reg.0
    }

    /// Pack the destination manifest of a clone. Purpose and size are copied
    /// from the source keyslot by hardware.
    pub fn pack_clone(user: KacUser, sw_tag: u32, exportable: bool) -> u32 {
        let mut reg = ManifestReg::default();
        reg.set_user(user as u32);
        reg.set_exportable(exportable);
        reg.set_sw(sw_tag & MAX_SW_TAG);
        reg.0
    }
}

/// Keyslot control word
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyslotCtrl {
    pub lock: bool,
}

impl KeyslotCtrl {
    pub fn pack(&self) -> u32 {
        let mut reg = KeyslotCtrlReg::default();
        reg.set_lock(self.lock);
        reg.0
    }
}

/// Map an algorithm to the purpose its keyslot must carry
pub fn map_algorithm_to_purpose(
    algorithm: SeAlgorithm,
    features: SupportedFeatures,
) -> SecEngResult<KacPurpose> {
    let purpose = match algorithm {
        SeAlgorithm::AesEcb
        | SeAlgorithm::AesCbc
        | SeAlgorithm::AesCts
        | SeAlgorithm::AesCtr
        | SeAlgorithm::AesOfb
        | SeAlgorithm::AesCcm => KacPurpose::Enc,
        SeAlgorithm::AesGcm | SeAlgorithm::AesGmac => KacPurpose::Gcm,
        SeAlgorithm::AesXts => KacPurpose::Xts,
        SeAlgorithm::AesCmac => {
            if features.contains(SupportedFeatures::HW_CMAC) {
                KacPurpose::Cmac
            } else {
                KacPurpose::Enc
            }
        }
        SeAlgorithm::AesKeyWrap => KacPurpose::Kw,
        SeAlgorithm::AesKeyUnwrap => KacPurpose::Kuw,
        SeAlgorithm::AesKeyWrapUnwrap => KacPurpose::Kwuw,
        SeAlgorithm::Kdf2Key(DerivationKeyRole::Kdk) => KacPurpose::Kdk,
        SeAlgorithm::Kdf2Key(DerivationKeyRole::Kdd) => KacPurpose::Kdd,
        SeAlgorithm::HmacSha224
        | SeAlgorithm::HmacSha256
        | SeAlgorithm::HmacSha384
        | SeAlgorithm::HmacSha512 => KacPurpose::Hmac,
        SeAlgorithm::HmacSha1
        | SeAlgorithm::Sha1
        | SeAlgorithm::Sha224
        | SeAlgorithm::Sha256
        | SeAlgorithm::Sha384
        | SeAlgorithm::Sha512 => Err(SecEngError::DRIVER_KAC_ALGORITHM_UNSUPPORTED)?,
    };
    Ok(purpose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seceng_error::ErrorKind;

    #[test]
    fn test_manifest_pack() {
        let manifest = KacManifest {
            user: KacUser::Ns,
            purpose: KacPurpose::Xts,
            size: KeySize::Bits256,
            exportable: true,
            sw_tag: 0xbeef,
        };
        let word = manifest.pack();
        assert_eq!(word, 0xbeef_0000 | (2 << 14) | (1 << 8) | (3 << 5) | 9);
        assert_eq!(word, manifest.pack());

        let reg = ManifestReg(word);
        assert_eq!(reg.purpose(), 9);
        assert_eq!(reg.user(), 3);
        assert!(reg.exportable());
        assert_eq!(reg.origin(), 0);
        assert_eq!(reg.size(), 2);
        assert_eq!(reg.sw(), 0xbeef);
    }

    #[test]
    fn test_manifest_pack_is_field_exact() {
        let a = KacManifest {
            user: KacUser::Psc,
            purpose: KacPurpose::Enc,
            size: KeySize::Bits128,
            exportable: false,
            sw_tag: 0,
        };
        let b = KacManifest {
            purpose: KacPurpose::Gcm,
            ..a
        };
        assert_eq!(a.pack(), 1 << 5);
        assert_eq!(a.pack() ^ b.pack(), KacPurpose::Gcm as u32);
    }

    #[test]
    fn test_clone_manifest_leaves_purpose_and_size() {
        let word = KacManifest::pack_clone(KacUser::Tz, 0x1234, false);
        let reg = ManifestReg(word);
        assert_eq!(reg.purpose(), 0);
        assert_eq!(reg.size(), 0);
        assert_eq!(reg.user(), 2);
        assert_eq!(reg.sw(), 0x1234);
    }

    #[test]
    fn test_keyslot_ctrl_pack() {
        assert_eq!(KeyslotCtrl { lock: false }.pack(), 0);
        assert_eq!(KeyslotCtrl { lock: true }.pack(), 1);
    }

    #[test]
    fn test_key_size() {
        assert_eq!(KeySize::from_bits(192), Ok(KeySize::Bits192));
        assert_eq!(KeySize::Bits256.bytes(), 32);
        assert_eq!(
            KeySize::from_bits(512),
            Err(SecEngError::DRIVER_KAC_INVALID_KEY_SIZE)
        );
    }

    #[test]
    fn test_cmac_purpose() {
        let soft = SupportedFeatures::empty();
        let hard = SupportedFeatures::HW_CMAC;
        assert_eq!(
            map_algorithm_to_purpose(SeAlgorithm::AesCmac, soft),
            Ok(KacPurpose::Enc)
        );
        assert_eq!(
            map_algorithm_to_purpose(SeAlgorithm::AesCmac, soft),
            map_algorithm_to_purpose(SeAlgorithm::AesCmac, soft)
        );
        assert_eq!(
            map_algorithm_to_purpose(SeAlgorithm::AesCmac, hard),
            Ok(KacPurpose::Cmac)
        );
    }

    #[test]
    fn test_purpose_mapping() {
        let f = SupportedFeatures::all();
        let cases = [
            (SeAlgorithm::AesEcb, KacPurpose::Enc),
            (SeAlgorithm::AesCts, KacPurpose::Enc),
            (SeAlgorithm::AesCcm, KacPurpose::Enc),
            (SeAlgorithm::AesGmac, KacPurpose::Gcm),
            (SeAlgorithm::AesXts, KacPurpose::Xts),
            (SeAlgorithm::AesKeyUnwrap, KacPurpose::Kuw),
            (SeAlgorithm::AesKeyWrapUnwrap, KacPurpose::Kwuw),
            (SeAlgorithm::HmacSha384, KacPurpose::Hmac),
            (
                SeAlgorithm::Kdf2Key(DerivationKeyRole::Kdk),
                KacPurpose::Kdk,
            ),
            (
                SeAlgorithm::Kdf2Key(DerivationKeyRole::Kdd),
                KacPurpose::Kdd,
            ),
        ];
        for (algorithm, purpose) in cases {
            assert_eq!(map_algorithm_to_purpose(algorithm, f), Ok(purpose));
        }

        let err = map_algorithm_to_purpose(SeAlgorithm::HmacSha1, f).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(map_algorithm_to_purpose(SeAlgorithm::Sha256, f).is_err());
    }
}
