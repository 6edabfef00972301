/*++

Licensed under the Apache-2.0 license.

File Name:

    cipher_mode.rs

Abstract:

    File contains the translation of a cipher algorithm and its parameters
    into AES engine register values, and the block accounting of an input.

--*/

use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::{CONFIG, CRYPTO_CONFIG, CRYPTO_KEYSLOT, LAST_BLOCK};
use tock_registers::fields::FieldValue;

use crate::engine::EngineClass;
use crate::{CipherDirection, SeAlgorithm, SupportedFeatures};

pub const AES_BLOCK_SIZE: usize = 16;

/// Largest number of unused bits in the final byte of an input
pub const MAX_UNUSED_BITS: u32 = 7;

/// Largest block count the last block register can describe
pub const MAX_BLOCKS: u32 = 1 << 20;

/// Largest per-block counter increment
pub const MAX_CTR_INCREMENT: u32 = 0xff;

/// Parameters of one cipher call that shape the register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherModeParams {
    pub keyslot: u32,

    /// Second keyslot of two-key modes
    pub keyslot2: Option<u32>,

    /// First call of a sequence
    pub first_call: bool,

    /// Running state stays resident in the engine between calls
    pub hw_context: bool,

    /// Counter increment per block, counter modes only
    pub ctr_increment: u32,

    /// Counter is big endian, counter modes only
    pub ctr_big_endian: bool,

    pub features: SupportedFeatures,
}

/// Source of the IV the engine uses for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSource {
    /// Engine internal state
    Default,

    /// IV or counter register written by software
    Reg,

    /// IV the engine left behind after the previous call
    Updated,
}

/// AES engine register values of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherRegisterSet {
    pub config: u32,
    pub crypto_config: u32,
    pub keyslots: u32,
}

/// Block accounting of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCount {
    pub blocks: u32,
    pub last_block: u32,
    pub residual_bits: u32,
}

impl BlockCount {
    /// Last block register value
    pub fn last_block_register(&self) -> u32 {
        (LAST_BLOCK::LAST_BLOCK.val(self.last_block)
            + LAST_BLOCK::RESIDUAL_BITS.val(self.residual_bits))
        .value
    }
}

/// Select the IV source of a call
pub fn iv_source(algorithm: SeAlgorithm, params: &CipherModeParams) -> IvSource {
    match algorithm {
        SeAlgorithm::AesEcb | SeAlgorithm::AesGcm | SeAlgorithm::AesGmac => IvSource::Default,
        SeAlgorithm::AesCtr | SeAlgorithm::AesCcm | SeAlgorithm::AesCmac => IvSource::Reg,
        _ if params.hw_context => IvSource::Default,
        _ if params.first_call => IvSource::Reg,
        _ => IvSource::Updated,
    }
}

type CryptoConfig = FieldValue<u32, CRYPTO_CONFIG::Register>;

fn core_direction(direction: CipherDirection) -> CryptoConfig {
    match direction {
        CipherDirection::Encrypt => CRYPTO_CONFIG::CORE_SEL::ENCRYPT,
        CipherDirection::Decrypt => CRYPTO_CONFIG::CORE_SEL::DECRYPT,
    }
}

fn config_direction(direction: CipherDirection) -> FieldValue<u32, CONFIG::Register> {
    match direction {
        CipherDirection::Encrypt => CONFIG::ENC_ALG::AES_ENC + CONFIG::DEC_ALG::NOP,
        CipherDirection::Decrypt => CONFIG::ENC_ALG::NOP + CONFIG::DEC_ALG::AES_DEC,
    }
}

fn keyslot_field(keyslot: u32) -> SecEngResult<u32> {
    if keyslot >= EngineClass::Aes.max_keyslots() {
        Err(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE)?;
    }
    Ok(keyslot)
}

/// Build the register values of a cipher call
///
/// # Arguments
///
/// * `algorithm` - Cipher algorithm
/// * `direction` - Cipher direction
/// * `params` - Keyslots, counter and sequencing parameters
pub fn build_registers(
    algorithm: SeAlgorithm,
    direction: CipherDirection,
    params: &CipherModeParams,
) -> SecEngResult<CipherRegisterSet> {
    let keyslot = keyslot_field(params.keyslot)?;
    let mut keyslots = CRYPTO_KEYSLOT::KEY_INDEX.val(keyslot);

    let encrypt_only = CONFIG::ENC_ALG::AES_ENC + CONFIG::DEC_ALG::NOP;
    let (config, datapath) = match algorithm {
        SeAlgorithm::AesEcb => (
            CONFIG::MODE::DATAPATH + config_direction(direction),
            Some(
                CRYPTO_CONFIG::XOR_POS::BYPASS
                    + CRYPTO_CONFIG::INPUT_SEL::MEMORY
                    + core_direction(direction),
            ),
        ),
        SeAlgorithm::AesCbc | SeAlgorithm::AesCts => {
            let chaining = match direction {
                CipherDirection::Encrypt => {
                    CRYPTO_CONFIG::XOR_POS::TOP + CRYPTO_CONFIG::VCTRAM_SEL::AESOUT
                }
                CipherDirection::Decrypt => {
                    CRYPTO_CONFIG::XOR_POS::BOTTOM + CRYPTO_CONFIG::VCTRAM_SEL::PREV_MEMORY
                }
            };
            (
                CONFIG::MODE::DATAPATH + config_direction(direction),
                Some(chaining + CRYPTO_CONFIG::INPUT_SEL::MEMORY + core_direction(direction)),
            )
        }
        SeAlgorithm::AesCmac => {
            let mode = if params.features.contains(SupportedFeatures::HW_CMAC) {
                CONFIG::MODE::CMAC + CONFIG::DST::HASH_REG
            } else {
                CONFIG::MODE::DATAPATH + CONFIG::DST::MEMORY
            };
            (
                mode + encrypt_only,
                Some(
                    CRYPTO_CONFIG::XOR_POS::TOP
                        + CRYPTO_CONFIG::INPUT_SEL::MEMORY
                        + CRYPTO_CONFIG::VCTRAM_SEL::AESOUT
                        + CRYPTO_CONFIG::CORE_SEL::ENCRYPT,
                ),
            )
        }
        SeAlgorithm::AesOfb => (
            CONFIG::MODE::DATAPATH + encrypt_only,
            Some(
                CRYPTO_CONFIG::XOR_POS::BOTTOM
                    + CRYPTO_CONFIG::INPUT_SEL::AESOUT
                    + CRYPTO_CONFIG::VCTRAM_SEL::MEMORY
                    + CRYPTO_CONFIG::CORE_SEL::ENCRYPT,
            ),
        ),
        SeAlgorithm::AesCtr | SeAlgorithm::AesCcm => {
            if params.ctr_increment == 0 || params.ctr_increment > MAX_CTR_INCREMENT {
                Err(SecEngError::DRIVER_AES_INVALID_COUNTER_INCREMENT)?;
            }
            let endian = if params.ctr_big_endian {
                CRYPTO_CONFIG::CTR_LE::CLEAR
            } else {
                CRYPTO_CONFIG::CTR_LE::SET
            };
            (
                CONFIG::MODE::DATAPATH + encrypt_only,
                Some(
                    CRYPTO_CONFIG::XOR_POS::BOTTOM
                        + CRYPTO_CONFIG::INPUT_SEL::LINEAR_CTR
                        + CRYPTO_CONFIG::VCTRAM_SEL::MEMORY
                        + CRYPTO_CONFIG::CORE_SEL::ENCRYPT
                        + CRYPTO_CONFIG::CTR_CNTN.val(params.ctr_increment)
                        + endian,
                ),
            )
        }
        SeAlgorithm::AesGcm => (CONFIG::MODE::GCM + config_direction(direction), None),
        SeAlgorithm::AesGmac => (CONFIG::MODE::GMAC + config_direction(direction), None),
        SeAlgorithm::AesXts => {
            let keyslot2 = params
                .keyslot2
                .ok_or(SecEngError::DRIVER_AES_MISSING_SECOND_KEYSLOT)?;
            keyslots = keyslots + CRYPTO_KEYSLOT::KEY2_INDEX.val(keyslot_field(keyslot2)?);
            (
                CONFIG::MODE::DATAPATH + config_direction(direction),
                Some(
                    CRYPTO_CONFIG::XOR_POS::BOTH
                        + CRYPTO_CONFIG::INPUT_SEL::MEMORY
                        + CRYPTO_CONFIG::VCTRAM_SEL::TWEAK
                        + core_direction(direction),
                ),
            )
        }
        SeAlgorithm::AesKeyWrap | SeAlgorithm::AesKeyUnwrap | SeAlgorithm::AesKeyWrapUnwrap => {
            Err(SecEngError::DRIVER_AES_ALGORITHM_UNSUPPORTED)?
        }
        SeAlgorithm::Kdf2Key(_)
        | SeAlgorithm::HmacSha1
        | SeAlgorithm::HmacSha224
        | SeAlgorithm::HmacSha256
        | SeAlgorithm::HmacSha384
        | SeAlgorithm::HmacSha512
        | SeAlgorithm::Sha1
        | SeAlgorithm::Sha224
        | SeAlgorithm::Sha256
        | SeAlgorithm::Sha384
        | SeAlgorithm::Sha512 => Err(SecEngError::DRIVER_AES_NOT_A_CIPHER)?,
    };

    let scc = if params.features.contains(SupportedFeatures::AES_SCC) {
        CRYPTO_CONFIG::SCC_EN::SET
    } else {
        CRYPTO_CONFIG::SCC_EN::CLEAR
    };
    let iv = match iv_source(algorithm, params) {
        IvSource::Default => CRYPTO_CONFIG::IV_SEL::DEFAULT,
        IvSource::Reg => CRYPTO_CONFIG::IV_SEL::REG,
        IvSource::Updated => CRYPTO_CONFIG::IV_SEL::UPDATED,
    };
    // GCM and GMAC sequence the datapath internally.
    let crypto_config = match datapath {
        Some(datapath) => datapath + iv + scc,
        None => scc,
    };

    Ok(CipherRegisterSet {
        config: config.value,
        crypto_config: crypto_config.value,
        keyslots: keyslots.value,
    })
}

/// Compute the block accounting of an input
///
/// # Arguments
///
/// * `algorithm` - Cipher algorithm
/// * `byte_length` - Input length in bytes
/// * `unused_bits` - Unused trailing bits of the final byte
pub fn compute_block_count(
    algorithm: SeAlgorithm,
    byte_length: usize,
    unused_bits: u32,
) -> SecEngResult<BlockCount> {
    if !algorithm.is_cipher() {
        Err(SecEngError::DRIVER_AES_NOT_A_CIPHER)?;
    }
    if byte_length == 0 {
        Err(SecEngError::DRIVER_AES_ZERO_LENGTH)?;
    }
    if unused_bits > MAX_UNUSED_BITS {
        Err(SecEngError::DRIVER_AES_INVALID_UNUSED_BITS)?;
    }

    let full = byte_length / AES_BLOCK_SIZE;
    let partial = byte_length % AES_BLOCK_SIZE;
    let (blocks, residual_bits) = if algorithm.allows_residual() {
        let residual_bits = if partial != 0 {
            (partial as u32) * 8 - unused_bits
        } else if unused_bits != 0 {
            (AES_BLOCK_SIZE as u32) * 8 - unused_bits
        } else {
            0
        };
        (full + usize::from(partial != 0), residual_bits)
    } else {
        if partial != 0 {
            Err(SecEngError::DRIVER_AES_UNALIGNED_LENGTH)?;
        }
        if unused_bits != 0 {
            Err(SecEngError::DRIVER_AES_INVALID_UNUSED_BITS)?;
        }
        (full, 0)
    };

    if blocks > MAX_BLOCKS as usize {
        Err(SecEngError::DRIVER_AES_TOO_MANY_BLOCKS)?;
    }
    let blocks = blocks as u32;
    Ok(BlockCount {
        blocks,
        last_block: blocks - 1,
        residual_bits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use seceng_error::ErrorKind;
    use tock_registers::LocalRegisterCopy;

    fn params() -> CipherModeParams {
        CipherModeParams {
            keyslot: 3,
            keyslot2: None,
            first_call: true,
            hw_context: false,
            ctr_increment: 1,
            ctr_big_endian: true,
            features: SupportedFeatures::empty(),
        }
    }

    fn crypto(regs: &CipherRegisterSet) -> LocalRegisterCopy<u32, CRYPTO_CONFIG::Register> {
        LocalRegisterCopy::new(regs.crypto_config)
    }

    #[test]
    fn test_ctr_uses_counter_register() {
        let mut p = params();
        p.first_call = false;
        p.ctr_increment = 4;
        let regs = build_registers(SeAlgorithm::AesCtr, CipherDirection::Decrypt, &p).unwrap();
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::IV_SEL::REG));
        assert!(cc.matches_all(CRYPTO_CONFIG::INPUT_SEL::LINEAR_CTR));
        assert!(cc.matches_all(CRYPTO_CONFIG::XOR_POS::BOTTOM));
        assert!(cc.matches_all(CRYPTO_CONFIG::CORE_SEL::ENCRYPT));
        assert_eq!(cc.read(CRYPTO_CONFIG::CTR_CNTN), 4);
        assert!(!cc.is_set(CRYPTO_CONFIG::CTR_LE));

        p.ctr_big_endian = false;
        let regs = build_registers(SeAlgorithm::AesCcm, CipherDirection::Encrypt, &p).unwrap();
        assert!(crypto(&regs).is_set(CRYPTO_CONFIG::CTR_LE));
    }

    #[test]
    fn test_ctr_increment_range() {
        let mut p = params();
        p.ctr_increment = 0;
        assert_eq!(
            build_registers(SeAlgorithm::AesCtr, CipherDirection::Encrypt, &p),
            Err(SecEngError::DRIVER_AES_INVALID_COUNTER_INCREMENT)
        );
        p.ctr_increment = 256;
        assert!(build_registers(SeAlgorithm::AesCtr, CipherDirection::Encrypt, &p).is_err());
    }

    #[test]
    fn test_ofb_feeds_back_cipher_output() {
        let regs = build_registers(SeAlgorithm::AesOfb, CipherDirection::Encrypt, &params())
            .unwrap();
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::INPUT_SEL::AESOUT));
        assert!(cc.matches_all(CRYPTO_CONFIG::VCTRAM_SEL::MEMORY));
        assert!(cc.matches_all(CRYPTO_CONFIG::XOR_POS::BOTTOM));
    }

    #[test]
    fn test_cbc_chaining() {
        let regs = build_registers(SeAlgorithm::AesCbc, CipherDirection::Encrypt, &params())
            .unwrap();
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::XOR_POS::TOP));
        assert!(cc.matches_all(CRYPTO_CONFIG::VCTRAM_SEL::AESOUT));
        assert!(cc.matches_all(CRYPTO_CONFIG::CORE_SEL::ENCRYPT));
        let config = LocalRegisterCopy::<u32, CONFIG::Register>::new(regs.config);
        assert!(config.matches_all(CONFIG::ENC_ALG::AES_ENC + CONFIG::DEC_ALG::NOP));

        let regs = build_registers(SeAlgorithm::AesCts, CipherDirection::Decrypt, &params())
            .unwrap();
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::XOR_POS::BOTTOM));
        assert!(cc.matches_all(CRYPTO_CONFIG::VCTRAM_SEL::PREV_MEMORY));
        assert!(cc.matches_all(CRYPTO_CONFIG::CORE_SEL::DECRYPT));
    }

    #[test]
    fn test_cmac_always_encrypts() {
        let regs = build_registers(SeAlgorithm::AesCmac, CipherDirection::Decrypt, &params())
            .unwrap();
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::CORE_SEL::ENCRYPT));
        assert!(cc.matches_all(CRYPTO_CONFIG::IV_SEL::REG));

        let mut p = params();
        p.features = SupportedFeatures::HW_CMAC;
        let regs = build_registers(SeAlgorithm::AesCmac, CipherDirection::Encrypt, &p).unwrap();
        let config = LocalRegisterCopy::<u32, CONFIG::Register>::new(regs.config);
        assert!(config.matches_all(CONFIG::MODE::CMAC + CONFIG::DST::HASH_REG));
    }

    #[test]
    fn test_gcm_only_mode_keyslot_and_scc() {
        let mut p = params();
        p.features = SupportedFeatures::AES_SCC;
        let regs = build_registers(SeAlgorithm::AesGcm, CipherDirection::Decrypt, &p).unwrap();
        assert_eq!(regs.crypto_config, CRYPTO_CONFIG::SCC_EN::SET.value);
        assert_eq!(regs.keyslots, 3);
        let config = LocalRegisterCopy::<u32, CONFIG::Register>::new(regs.config);
        assert!(config.matches_all(CONFIG::MODE::GCM + CONFIG::DEC_ALG::AES_DEC));

        let regs = build_registers(SeAlgorithm::AesGmac, CipherDirection::Encrypt, &params())
            .unwrap();
        assert_eq!(regs.crypto_config, 0);
    }

    #[test]
    fn test_xts_needs_two_keyslots() {
        let mut p = params();
        assert_eq!(
            build_registers(SeAlgorithm::AesXts, CipherDirection::Encrypt, &p),
            Err(SecEngError::DRIVER_AES_MISSING_SECOND_KEYSLOT)
        );
        p.keyslot2 = Some(16);
        assert_eq!(
            build_registers(SeAlgorithm::AesXts, CipherDirection::Encrypt, &p),
            Err(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE)
        );
        p.keyslot2 = Some(9);
        let regs = build_registers(SeAlgorithm::AesXts, CipherDirection::Encrypt, &p).unwrap();
        assert_eq!(regs.keyslots, 3 | (9 << 8));
        let cc = crypto(&regs);
        assert!(cc.matches_all(CRYPTO_CONFIG::XOR_POS::BOTH));
        assert!(cc.matches_all(CRYPTO_CONFIG::VCTRAM_SEL::TWEAK));
    }

    #[test]
    fn test_build_rejects() {
        let mut p = params();
        assert_eq!(
            build_registers(SeAlgorithm::Sha256, CipherDirection::Encrypt, &p),
            Err(SecEngError::DRIVER_AES_NOT_A_CIPHER)
        );
        let err =
            build_registers(SeAlgorithm::AesKeyWrap, CipherDirection::Encrypt, &p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        p.keyslot = 16;
        assert_eq!(
            build_registers(SeAlgorithm::AesEcb, CipherDirection::Encrypt, &p),
            Err(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE)
        );
    }

    #[test]
    fn test_iv_source() {
        let mut p = params();
        assert_eq!(iv_source(SeAlgorithm::AesCbc, &p), IvSource::Reg);
        p.first_call = false;
        assert_eq!(iv_source(SeAlgorithm::AesCbc, &p), IvSource::Updated);
        assert_eq!(iv_source(SeAlgorithm::AesCtr, &p), IvSource::Reg);
        assert_eq!(iv_source(SeAlgorithm::AesEcb, &p), IvSource::Default);
        p.hw_context = true;
        assert_eq!(iv_source(SeAlgorithm::AesOfb, &p), IvSource::Default);
        assert_eq!(iv_source(SeAlgorithm::AesCmac, &p), IvSource::Reg);
    }

    #[test]
    fn test_residual_bits() {
        let count = compute_block_count(SeAlgorithm::AesXts, 33, 0).unwrap();
        assert_eq!(
            count,
            BlockCount {
                blocks: 3,
                last_block: 2,
                residual_bits: 8
            }
        );
        assert_eq!(count.last_block_register(), 2 | (8 << 20));

        let count = compute_block_count(SeAlgorithm::AesXts, 32, 0).unwrap();
        assert_eq!(
            count,
            BlockCount {
                blocks: 2,
                last_block: 1,
                residual_bits: 0
            }
        );

        let count = compute_block_count(SeAlgorithm::AesGcm, 20, 3).unwrap();
        assert_eq!(count.residual_bits, 29);
        let count = compute_block_count(SeAlgorithm::AesGcm, 16, 1).unwrap();
        assert_eq!(count.blocks, 1);
        assert_eq!(count.residual_bits, 127);
    }

    #[test]
    fn test_block_count_rejects() {
        assert_eq!(
            compute_block_count(SeAlgorithm::AesCbc, 0, 0),
            Err(SecEngError::DRIVER_AES_ZERO_LENGTH)
        );
        assert_eq!(
            compute_block_count(SeAlgorithm::AesCbc, 17, 0),
            Err(SecEngError::DRIVER_AES_UNALIGNED_LENGTH)
        );
        assert_eq!(
            compute_block_count(SeAlgorithm::AesEcb, 16, 2),
            Err(SecEngError::DRIVER_AES_INVALID_UNUSED_BITS)
        );
        assert_eq!(
            compute_block_count(SeAlgorithm::AesXts, 17, 8),
            Err(SecEngError::DRIVER_AES_INVALID_UNUSED_BITS)
        );
        assert_eq!(
            compute_block_count(SeAlgorithm::AesCtr, (MAX_BLOCKS as usize + 1) * 16, 0),
            Err(SecEngError::DRIVER_AES_TOO_MANY_BLOCKS)
        );
        assert_eq!(
            compute_block_count(SeAlgorithm::HmacSha256, 64, 0),
            Err(SecEngError::DRIVER_AES_NOT_A_CIPHER)
        );
        let count = compute_block_count(SeAlgorithm::AesCtr, MAX_BLOCKS as usize * 16, 0).unwrap();
        assert_eq!(count.last_block, MAX_BLOCKS - 1);
    }
}
