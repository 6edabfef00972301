/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa.rs

Abstract:

    File contains the RSA keyslot manager for the unified security engine
    keytable and the legacy PKA keyslot bank.

--*/

use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::{pka, rsa, PKA_KEYSLOT_CTRL, RSA_KEYTABLE_ADDR, RSA_MAX_WORDS};
use tock_registers::fields::FieldValue;

use crate::engine::{Engine, EngineClass, EngineGuard, EngineHw, EngineId};
use crate::validator::{validate_montgomery, validate_rsa_key};
use crate::{cprintln, printer::ErrorCode, Endianness, SupportedFeatures};

/// Caller supplied Montgomery values, each the length of the modulus
#[derive(Debug, Clone, Copy)]
pub struct RsaMontgomery<'a> {
    /// R^2 mod N
    pub r2: &'a [u8],

    /// -N^-1 mod R
    pub m_prime: &'a [u8],
}

/// RSA key to install into a keyslot
#[derive(Debug, Clone, Copy)]
pub struct RsaKeyArgs<'a> {
    pub exponent: &'a [u8],
    pub modulus: &'a [u8],
    pub rsa_size_bits: u32,
    pub endianness: Endianness,
    pub montgomery: Option<RsaMontgomery<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bank {
    Exponent,
    Modulus,
    MPrime,
    R2,
}

impl Bank {
    fn keytable(self) -> FieldValue<u32, RSA_KEYTABLE_ADDR::Register> {
        match self {
            Self::Exponent => RSA_KEYTABLE_ADDR::BANK::EXPONENT,
            Self::Modulus => RSA_KEYTABLE_ADDR::BANK::MODULUS,
            Self::MPrime => RSA_KEYTABLE_ADDR::BANK::M_PRIME,
            Self::R2 => RSA_KEYTABLE_ADDR::BANK::R2,
        }
    }

    fn pka(self) -> FieldValue<u32, PKA_KEYSLOT_CTRL::Register> {
        match self {
            Self::Exponent => PKA_KEYSLOT_CTRL::BANK::EXPONENT,
            Self::Modulus => PKA_KEYSLOT_CTRL::BANK::MODULUS,
            Self::MPrime => PKA_KEYSLOT_CTRL::BANK::M_PRIME,
            Self::R2 => PKA_KEYSLOT_CTRL::BANK::R2,
        }
    }
}

/// Operand as 32-bit words, least significant word first
fn operand_words(buf: &[u8], endianness: Endianness) -> impl Iterator<Item = u32> + '_ {
    let (le, be) = match endianness {
        Endianness::Little => (Some(buf.chunks(4)), None),
        Endianness::Big => (None, Some(buf.rchunks(4))),
    };
    let le = le.into_iter().flatten().map(|chunk| {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(bytes)
    });
    let be = be.into_iter().flatten().map(|chunk| {
        let mut bytes = [0u8; 4];
        bytes[4 - chunk.len()..].copy_from_slice(chunk);
        u32::from_be_bytes(bytes)
    });
    le.chain(be)
}

fn word_count(rsa_size_bits: u32) -> usize {
    (rsa_size_bits / 32) as usize
}

/// Install an RSA key into a keyslot of an RSA class engine
pub fn set_rsa_keyslot<H: EngineHw>(
    engine: &Engine<H>,
    keyslot: u32,
    args: &RsaKeyArgs,
) -> SecEngResult<()> {
    engine.require_class(EngineClass::Rsa)?;
    engine.check_keyslot(keyslot)?;
    validate_rsa_key(args.modulus, args.exponent, args.rsa_size_bits, args.endianness)?;
    if let Some(mont) = args.montgomery {
        validate_montgomery(
            args.rsa_size_bits,
            mont.r2,
            mont.m_prime,
            args.modulus,
            args.endianness,
        )?;
    }
    let features = engine.features();
    if !features.contains(SupportedFeatures::RSA_KEYSLOTS) {
        Err(SecEngError::DRIVER_RSA_KEYSLOTS_UNSUPPORTED)?;
    }
    let montgomery_storage = match engine.id() {
        EngineId::Pka => true,
        EngineId::Rsa => features.contains(SupportedFeatures::RSA_MONTGOMERY),
        EngineId::Aes0 | EngineId::Aes1 | EngineId::Sha => false,
    };
    if args.montgomery.is_some() && !montgomery_storage {
        Err(SecEngError::DRIVER_RSA_MONTGOMERY_UNSUPPORTED)?;
    }

    let guard = engine.lock();
    let result = match engine.id() {
        EngineId::Pka => pka_set_keyslot(&guard, keyslot, args),
        EngineId::Rsa => {
            keytable_set_keyslot(&guard, keyslot, args);
            Ok(())
        }
        EngineId::Aes0 | EngineId::Aes1 | EngineId::Sha => {
            Err(SecEngError::DRIVER_ENGINE_CLASS_MISMATCH)
        }
    };
    match result {
        Ok(()) => cprintln!(
            "[rsa] keyslot {} set, {} bits",
            keyslot,
            args.rsa_size_bits
        ),
        Err(err) => cprintln!("[rsa] keyslot {} set failed {}", keyslot, ErrorCode::from(err)),
    }
    result
}

/// Clear every bank of an RSA keyslot
pub fn clear_rsa_keyslot<H: EngineHw>(engine: &Engine<H>, keyslot: u32) -> SecEngResult<()> {
    engine.require_class(EngineClass::Rsa)?;
    engine.check_keyslot(keyslot)?;
    let features = engine.features();
    if !features.contains(SupportedFeatures::RSA_KEYSLOTS) {
        Err(SecEngError::DRIVER_RSA_KEYSLOTS_UNSUPPORTED)?;
    }

    let guard = engine.lock();
    let result = match engine.id() {
        EngineId::Pka => {
            guard.write(
                pka::KEYSLOT_CTRL,
                (PKA_KEYSLOT_CTRL::KEYSLOT.val(keyslot) + PKA_KEYSLOT_CTRL::CLEAR::SET).value,
            );
            guard
                .wait_idle()
                .and_then(|_| guard.check_status(SecEngError::DRIVER_RSA_CLEAR_FAILED))
        }
        EngineId::Rsa => {
            let zeros = core::iter::repeat(0).take(RSA_MAX_WORDS);
            keytable_write(&guard, keyslot, Bank::Exponent, zeros.clone());
            keytable_write(&guard, keyslot, Bank::Modulus, zeros.clone());
            if features.contains(SupportedFeatures::RSA_MONTGOMERY) {
                keytable_write(&guard, keyslot, Bank::MPrime, zeros.clone());
                keytable_write(&guard, keyslot, Bank::R2, zeros);
            }
            guard
                .wait_idle()
                .and_then(|_| guard.check_status(SecEngError::DRIVER_RSA_CLEAR_FAILED))
        }
        EngineId::Aes0 | EngineId::Aes1 | EngineId::Sha => {
            Err(SecEngError::DRIVER_ENGINE_CLASS_MISMATCH)
        }
    };
    match result {
        Ok(()) => cprintln!("[rsa] keyslot {} cleared", keyslot),
        Err(err) => cprintln!(
            "[rsa] keyslot {} clear failed {}",
            keyslot,
            ErrorCode::from(err)
        ),
    }
    result
}

fn keytable_write<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    keyslot: u32,
    bank: Bank,
    words: impl Iterator<Item = u32>,
) {
    for (idx, word) in words.enumerate() {
        let addr = RSA_KEYTABLE_ADDR::KEYSLOT.val(keyslot)
            + bank.keytable()
            + RSA_KEYTABLE_ADDR::WORD_ADDR.val(idx as u32);
        guard.write(rsa::KEYTABLE_ADDR, addr.value);
        guard.write(rsa::KEYTABLE_DATA, word);
    }
}

fn keytable_set_keyslot<H: EngineHw>(guard: &EngineGuard<'_, H>, keyslot: u32, args: &RsaKeyArgs) {
    let words = word_count(args.rsa_size_bits);
    let exponent = operand_words(args.exponent, args.endianness)
        .chain(core::iter::repeat(0))
        .take(words);
    keytable_write(guard, keyslot, Bank::Exponent, exponent);
    keytable_write(
        guard,
        keyslot,
        Bank::Modulus,
        operand_words(args.modulus, args.endianness),
    );
    if let Some(mont) = args.montgomery {
        keytable_write(
            guard,
            keyslot,
            Bank::MPrime,
            operand_words(mont.m_prime, args.endianness),
        );
        keytable_write(guard, keyslot, Bank::R2, operand_words(mont.r2, args.endianness));
    }
}

fn pka_write<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    keyslot: u32,
    bank: Bank,
    precompute: bool,
    words: impl Iterator<Item = u32>,
) {
    let precompute = if precompute {
        PKA_KEYSLOT_CTRL::MONT_PRECOMPUTE::SET
    } else {
        PKA_KEYSLOT_CTRL::MONT_PRECOMPUTE::CLEAR
    };
    let ctrl = PKA_KEYSLOT_CTRL::KEYSLOT.val(keyslot)
        + bank.pka()
        + PKA_KEYSLOT_CTRL::AUTO_INC::SET
        + precompute;
    guard.write(pka::KEYSLOT_CTRL, ctrl.value);
    for word in words {
        guard.write(pka::KEYSLOT_DATA, word);
    }
}

fn pka_set_keyslot<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    keyslot: u32,
    args: &RsaKeyArgs,
) -> SecEngResult<()> {
    let words = word_count(args.rsa_size_bits);
    let exponent = operand_words(args.exponent, args.endianness)
        .chain(core::iter::repeat(0))
        .take(words);
    pka_write(guard, keyslot, Bank::Exponent, false, exponent);

    match args.montgomery {
        Some(mont) => {
            pka_write(
                guard,
                keyslot,
                Bank::Modulus,
                false,
                operand_words(args.modulus, args.endianness),
            );
            pka_write(
                guard,
                keyslot,
                Bank::MPrime,
                false,
                operand_words(mont.m_prime, args.endianness),
            );
            pka_write(
                guard,
                keyslot,
                Bank::R2,
                false,
                operand_words(mont.r2, args.endianness),
            );
        }
        None => {
            // Engine derives M' and R^2 from the modulus.
            pka_write(
                guard,
                keyslot,
                Bank::Modulus,
                true,
                operand_words(args.modulus, args.endianness),
            );
        }
    }
    guard
        .wait_idle()
        .and_then(|_| guard.check_status(SecEngError::DRIVER_ENGINE_FAULT))
}
