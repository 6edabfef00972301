/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa_keytable.rs

Abstract:

    File contains the RSA keyslot storage model, reachable through the
    unified keytable address/data pair and the legacy PKA bank interface.

--*/

use seceng_registers::{PKA_KEYSLOT_CTRL, RSA_KEYTABLE_ADDR, RSA_MAX_WORDS};
use tock_registers::LocalRegisterCopy;

pub const RSA_KEYSLOT_COUNT: usize = 4;
pub const RSA_BANK_COUNT: usize = 4;

/// Bank index of the modulus
pub const BANK_MODULUS: usize = 1;

type Bank = [u32; RSA_MAX_WORDS];

/// PKA bank write pointer latched by the control register
#[derive(Debug, Default, Clone, Copy)]
struct PkaCursor {
    keyslot: usize,
    bank: usize,
    word: usize,
    auto_inc: bool,
}

pub struct RsaKeytable {
    banks: [[Bank; RSA_BANK_COUNT]; RSA_KEYSLOT_COUNT],

    /// Engine derives M' and R^2 from the modulus of the keyslot
    precompute: [bool; RSA_KEYSLOT_COUNT],

    cursor: PkaCursor,
}

impl Default for RsaKeytable {
    fn default() -> Self {
        Self {
            banks: [[[0u32; RSA_MAX_WORDS]; RSA_BANK_COUNT]; RSA_KEYSLOT_COUNT],
            precompute: [false; RSA_KEYSLOT_COUNT],
            cursor: PkaCursor::default(),
        }
    }
}

impl RsaKeytable {
    /// Words of one bank, least significant word first
    pub fn words(&self, keyslot: usize, bank: usize) -> &[u32] {
        &self.banks[keyslot][bank]
    }

    pub fn precompute(&self, keyslot: usize) -> bool {
        self.precompute[keyslot]
    }

    /// Keytable data write at the address held in the address register
    pub fn keytable_write(&mut self, addr: u32, value: u32) {
        let addr = LocalRegisterCopy::<u32, RSA_KEYTABLE_ADDR::Register>::new(addr);
        let keyslot = addr.read(RSA_KEYTABLE_ADDR::KEYSLOT) as usize;
        let bank = addr.read(RSA_KEYTABLE_ADDR::BANK) as usize;
        let word = addr.read(RSA_KEYTABLE_ADDR::WORD_ADDR) as usize;
        self.banks[keyslot][bank][word] = value;
    }

    /// PKA control write. Either clears a keyslot or latches a new cursor.
    pub fn pka_ctrl(&mut self, value: u32) {
        let ctrl = LocalRegisterCopy::<u32, PKA_KEYSLOT_CTRL::Register>::new(value);
        let keyslot = ctrl.read(PKA_KEYSLOT_CTRL::KEYSLOT) as usize;
        if ctrl.is_set(PKA_KEYSLOT_CTRL::CLEAR) {
            self.clear(keyslot);
            return;
        }
        let bank = ctrl.read(PKA_KEYSLOT_CTRL::BANK) as usize;
        if bank == BANK_MODULUS {
            self.precompute[keyslot] = ctrl.is_set(PKA_KEYSLOT_CTRL::MONT_PRECOMPUTE);
        }
        self.cursor = PkaCursor {
            keyslot,
            bank,
            word: 0,
            auto_inc: ctrl.is_set(PKA_KEYSLOT_CTRL::AUTO_INC),
        };
    }

    /// PKA data write at the cursor
    pub fn pka_data(&mut self, value: u32) {
        let cursor = &mut self.cursor;
        if cursor.word >= RSA_MAX_WORDS {
            return;
        }
        self.banks[cursor.keyslot][cursor.bank][cursor.word] = value;
        if cursor.auto_inc {
            cursor.word += 1;
        }
    }

    pub fn clear(&mut self, keyslot: usize) {
        self.banks[keyslot] = [[0u32; RSA_MAX_WORDS]; RSA_BANK_COUNT];
        self.precompute[keyslot] = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
