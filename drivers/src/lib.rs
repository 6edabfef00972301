/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the security engine keyslot and cipher-mode
    drivers.

--*/

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod aes;
mod algorithm;
mod cipher_mode;
mod engine;
mod kac;
mod manifest;
pub mod printer;
mod rsa;
mod validator;

pub use aes::{run_cipher_block, zeroize_iv_registers, AesOperation, CipherContext, CipherFlags};
pub use algorithm::{CipherDirection, DerivationKeyRole, Endianness, SeAlgorithm};
pub use cipher_mode::{
    build_registers, compute_block_count, iv_source, BlockCount, CipherModeParams,
    CipherRegisterSet, IvSource, AES_BLOCK_SIZE, MAX_BLOCKS, MAX_CTR_INCREMENT, MAX_UNUSED_BITS,
};
pub use engine::{
    Engine, EngineClass, EngineGuard, EngineHw, EngineId, Operation, SeDevice, SupportedFeatures,
};
pub use kac::{
    clone_key, generate_key, insert_key, invalidate_keyslot, keyslot_op, lock_keyslot,
    KacCloneArgs, KacKeyArgs, KacOp, KacOpArgs,
};
pub use manifest::{
    map_algorithm_to_purpose, KacManifest, KacPurpose, KacUser, KeySize, KeyslotCtrl,
    ManifestReg, MAX_SW_TAG,
};
pub use rsa::{clear_rsa_keyslot, set_rsa_keyslot, RsaKeyArgs, RsaMontgomery};
pub use seceng_error::{ErrorKind, SecEngError, SecEngResult};
pub use validator::{
    is_supported_rsa_size, validate_kac_request, validate_montgomery, validate_rsa_key,
    RSA_KEY_SIZES,
};
