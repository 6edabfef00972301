// Licensed under the Apache-2.0 license
//
// Register map of the security engine, shared by the drivers and the
// software emulator. Offsets are relative to the base of one engine instance.
#![no_std]

use tock_registers::register_bitfields;

/// Registers common to every engine instance.
pub mod common {
    /// Operation trigger.
    pub const OPERATION: u32 = 0x000;

    /// Error status of the last command.
    pub const STATUS: u32 = 0x0f0;
}

/// AES engine cipher registers.
pub mod aes {
    pub const CONFIG: u32 = 0x004;
    pub const CRYPTO_CONFIG: u32 = 0x008;
    pub const CRYPTO_KEYSLOT: u32 = 0x00c;

    /// Linear counter, 4 words.
    pub const LINEAR_CTR: u32 = 0x010;

    /// Original IV, 4 words.
    pub const IV: u32 = 0x020;

    /// Hardware-updated IV, 4 words, read-only.
    pub const UPDATED_IV: u32 = 0x030;

    pub const LAST_BLOCK: u32 = 0x040;

    pub const IN_ADDR_LO: u32 = 0x050;
    pub const IN_ADDR_HI: u32 = 0x054;
    pub const IN_SIZE: u32 = 0x058;
    pub const OUT_ADDR_LO: u32 = 0x05c;
    pub const OUT_ADDR_HI: u32 = 0x060;
    pub const OUT_SIZE: u32 = 0x064;

    pub const BLOCK_WORDS: usize = 4;
}

/// Key access controller registers, present on AES and SHA engines.
pub mod kac {
    pub const MANIFEST: u32 = 0x100;
    pub const CTRL: u32 = 0x104;
    pub const KEYSLOT: u32 = 0x108;

    /// Temporary key injection buffer, 8 words.
    pub const KEY_BUF: u32 = 0x120;
    pub const KEY_BUF_WORDS: usize = 8;
}

/// Unified security engine RSA keytable.
pub mod rsa {
    pub const KEYTABLE_ADDR: u32 = 0x200;
    pub const KEYTABLE_DATA: u32 = 0x204;
}

/// Legacy PKA keyslot bank.
pub mod pka {
    pub const KEYSLOT_CTRL: u32 = 0x300;
    pub const KEYSLOT_DATA: u32 = 0x304;
}

/// Largest RSA operand in 32-bit words.
pub const RSA_MAX_WORDS: usize = 4096 / 32;

register_bitfields! [
    u32,

    /// Operation Register Fields
    pub OPERATION [
        OP OFFSET(0) NUMBITS(4) [
            NOP = 0,
            START = 1,
            KAC_INSERT = 2,
            KAC_GENERATE = 3,
            KAC_CLONE = 4,
            KAC_LOCK = 5,
            KAC_INVALIDATE = 6,
        ],
    ],

    /// Status Register Fields
    pub STATUS [
        ERR OFFSET(0) NUMBITS(8) [
            NONE = 0,
            KEYSLOT_LOCKED = 1,
            KEYSLOT_EMPTY = 2,
            PURPOSE_MISMATCH = 3,
            BAD_CONFIG = 4,
            BAD_DMA = 5,
            BAD_KEYSLOT = 6,
        ],
        BUSY OFFSET(31) NUMBITS(1) [],
    ],

    /// AES Config Register Fields
    pub CONFIG [
        MODE OFFSET(0) NUMBITS(4) [
            DATAPATH = 0,
            GCM = 1,
            GMAC = 2,
            CMAC = 3,
        ],
        ENC_ALG OFFSET(4) NUMBITS(2) [
            NOP = 0,
            AES_ENC = 1,
        ],
        DEC_ALG OFFSET(6) NUMBITS(2) [
            NOP = 0,
            AES_DEC = 1,
        ],
        DST OFFSET(8) NUMBITS(2) [
            MEMORY = 0,
            HASH_REG = 1,
        ],
    ],

    /// AES Crypto Config Register Fields
    pub CRYPTO_CONFIG [
        XOR_POS OFFSET(0) NUMBITS(2) [
            BYPASS = 0,
            BOTH = 1,
            TOP = 2,
            BOTTOM = 3,
        ],
        INPUT_SEL OFFSET(2) NUMBITS(2) [
            MEMORY = 0,
            RANDOM = 1,
            AESOUT = 2,
            LINEAR_CTR = 3,
        ],
        VCTRAM_SEL OFFSET(4) NUMBITS(2) [
            MEMORY = 0,
            TWEAK = 1,
            AESOUT = 2,
            PREV_MEMORY = 3,
        ],
        IV_SEL OFFSET(6) NUMBITS(2) [
            DEFAULT = 0,
            REG = 1,
            UPDATED = 2,
        ],
        CORE_SEL OFFSET(8) NUMBITS(1) [
            DECRYPT = 0,
            ENCRYPT = 1,
        ],
        SCC_EN OFFSET(9) NUMBITS(1) [],
        CTR_LE OFFSET(10) NUMBITS(1) [],
        CTR_CNTN OFFSET(16) NUMBITS(8) [],
    ],

    /// AES Keyslot Register Fields
    pub CRYPTO_KEYSLOT [
        KEY_INDEX OFFSET(0) NUMBITS(6) [],
        KEY2_INDEX OFFSET(8) NUMBITS(6) [],
    ],

    /// Last Block Register Fields
    pub LAST_BLOCK [
        LAST_BLOCK OFFSET(0) NUMBITS(20) [],
        RESIDUAL_BITS OFFSET(20) NUMBITS(7) [],
    ],

    /// KAC Manifest Register Fields
    pub KAC_MANIFEST [
        PURPOSE OFFSET(0) NUMBITS(5) [],
        USER OFFSET(5) NUMBITS(3) [],
        EXPORTABLE OFFSET(8) NUMBITS(1) [],
        ORIGIN OFFSET(9) NUMBITS(3) [],
        SIZE OFFSET(14) NUMBITS(2) [
            KEY_128 = 0,
            KEY_192 = 1,
            KEY_256 = 2,
        ],
        SW OFFSET(16) NUMBITS(16) [],
    ],

    /// KAC Control Register Fields
    pub KAC_CTRL [
        LOCK OFFSET(0) NUMBITS(1) [],
        VALID OFFSET(1) NUMBITS(1) [],
    ],

    /// KAC Keyslot Register Fields
    pub KAC_KEYSLOT [
        DST OFFSET(0) NUMBITS(6) [],
        SRC OFFSET(8) NUMBITS(6) [],
    ],

    /// RSA Keytable Address Register Fields
    pub RSA_KEYTABLE_ADDR [
        WORD_ADDR OFFSET(0) NUMBITS(7) [],
        BANK OFFSET(8) NUMBITS(2) [
            EXPONENT = 0,
            MODULUS = 1,
            M_PRIME = 2,
            R2 = 3,
        ],
        KEYSLOT OFFSET(12) NUMBITS(2) [],
    ],

    /// PKA Keyslot Control Register Fields
    pub PKA_KEYSLOT_CTRL [
        KEYSLOT OFFSET(0) NUMBITS(2) [],
        BANK OFFSET(4) NUMBITS(2) [
            EXPONENT = 0,
            MODULUS = 1,
            M_PRIME = 2,
            R2 = 3,
        ],
        AUTO_INC OFFSET(8) NUMBITS(1) [],
        MONT_PRECOMPUTE OFFSET(9) NUMBITS(1) [],
        CLEAR OFFSET(10) NUMBITS(1) [],
    ],
];
