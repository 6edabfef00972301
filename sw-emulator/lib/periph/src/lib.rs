/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the security engine emulator peripheral
    library.

--*/

mod datapath;
mod engine;
mod keyslot;
mod rsa_keytable;

pub use datapath::{AesCore, Block, BLOCK_SIZE};
pub use engine::EmuEngine;
pub use keyslot::{
    Keyslot, KEYSLOT_COUNT, KEY_BYTES, ORIGIN_CLONED, ORIGIN_GENERATED, ORIGIN_INSERTED,
};
pub use rsa_keytable::{BANK_MODULUS, RSA_BANK_COUNT, RSA_KEYSLOT_COUNT};
