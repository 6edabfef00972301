/*++

Licensed under the Apache-2.0 license.

File Name:

    validator.rs

Abstract:

    File contains argument and key shape checks run before any keyslot is
    touched. None of the routines here have side effects.

--*/

use core::cmp::Ordering;

use seceng_error::{SecEngError, SecEngResult};

use crate::manifest::{KacPurpose, KacUser, KeySize, MAX_SW_TAG};
use crate::Endianness;

/// RSA key sizes accepted by the engine, in bits
pub const RSA_KEY_SIZES: [u32; 7] = [512, 768, 1024, 1536, 2048, 3072, 4096];

/// Exponent length accepted regardless of the key size
pub const RSA_SHORT_EXPONENT_LEN: usize = 4;

pub fn is_supported_rsa_size(bits: u32) -> bool {
    RSA_KEY_SIZES.contains(&bits)
}

fn rsa_size_bytes(rsa_size_bits: u32) -> SecEngResult<usize> {
    if !is_supported_rsa_size(rsa_size_bits) {
        Err(SecEngError::DRIVER_RSA_UNSUPPORTED_KEY_SIZE)?;
    }
    Ok((rsa_size_bits / 8) as usize)
}

/// Byte holding the most significant bits of `buf`
fn most_significant(buf: &[u8], endianness: Endianness) -> u8 {
    let byte = match endianness {
        Endianness::Big => buf.first(),
        Endianness::Little => buf.last(),
    };
    byte.copied().unwrap_or(0)
}

/// Byte holding the least significant bits of `buf`
fn least_significant(buf: &[u8], endianness: Endianness) -> u8 {
    let byte = match endianness {
        Endianness::Big => buf.last(),
        Endianness::Little => buf.first(),
    };
    byte.copied().unwrap_or(0)
}

/// Compare two equal length operands by magnitude
fn compare_magnitude(a: &[u8], b: &[u8], endianness: Endianness) -> Ordering {
    match endianness {
        Endianness::Big => a.iter().cmp(b.iter()),
        Endianness::Little => a.iter().rev().cmp(b.iter().rev()),
    }
}

fn is_zero(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Validate the shape of an RSA key
///
/// # Arguments
///
/// * `modulus` - Modulus, `rsa_size_bits / 8` bytes
/// * `exponent` - Exponent, 4 bytes or a supported RSA key length no longer
///   than the modulus
/// * `rsa_size_bits` - RSA key size
/// * `endianness` - Byte order of both operands
pub fn validate_rsa_key(
    modulus: &[u8],
    exponent: &[u8],
    rsa_size_bits: u32,
    endianness: Endianness,
) -> SecEngResult<()> {
    let size = rsa_size_bytes(rsa_size_bits)?;
    if modulus.is_empty() || exponent.is_empty() {
        Err(SecEngError::DRIVER_RSA_INVALID_ARGS)?;
    }
    if modulus.len() != size {
        Err(SecEngError::DRIVER_RSA_BUFFER_SIZE)?;
    }
    let exponent_size_ok = exponent.len() == RSA_SHORT_EXPONENT_LEN
        || (is_supported_rsa_size((exponent.len() * 8) as u32) && exponent.len() <= size);
    if !exponent_size_ok {
        Err(SecEngError::DRIVER_RSA_INVALID_EXPONENT_SIZE)?;
    }
    if most_significant(modulus, endianness) & 0x80 == 0 {
        Err(SecEngError::DRIVER_RSA_MODULUS_MSB_CLEAR)?;
    }
    if least_significant(modulus, endianness) & 1 == 0 {
        Err(SecEngError::DRIVER_RSA_MODULUS_EVEN)?;
    }
    if least_significant(exponent, endianness) & 1 == 0 {
        Err(SecEngError::DRIVER_RSA_EXPONENT_EVEN)?;
    }
    Ok(())
}

/// Validate caller supplied Montgomery values against the modulus.
///
/// `m_prime` is only checked for being nonzero. Its bound is defined modulo
/// a power of two the engine picks, which is not known here.
pub fn validate_montgomery(
    rsa_size_bits: u32,
    r2: &[u8],
    m_prime: &[u8],
    modulus: &[u8],
    endianness: Endianness,
) -> SecEngResult<()> {
    let size = rsa_size_bytes(rsa_size_bits)?;
    if r2.is_empty() || m_prime.is_empty() {
        Err(SecEngError::DRIVER_RSA_INVALID_ARGS)?;
    }
    if r2.len() != size || m_prime.len() != size || modulus.len() != size {
        Err(SecEngError::DRIVER_RSA_BUFFER_SIZE)?;
    }
    if is_zero(r2) {
        Err(SecEngError::DRIVER_RSA_MONT_R2_ZERO)?;
    }
    if compare_magnitude(r2, modulus, endianness) != Ordering::Less {
        Err(SecEngError::DRIVER_RSA_MONT_R2_OUT_OF_BOUNDS)?;
    }
    if is_zero(m_prime) {
        Err(SecEngError::DRIVER_RSA_MONT_M_PRIME_ZERO)?;
    }
    Ok(())
}

/// Validate the manifest fields and key size of an insert or generate request
///
/// Whether the purpose suits the algorithm is checked by
/// `map_algorithm_to_purpose`, not here.
pub fn validate_kac_request(
    user: KacUser,
    purpose: KacPurpose,
    sw_tag: u32,
    key_bits: u32,
) -> SecEngResult<KeySize> {
    if user == KacUser::Reserved {
        Err(SecEngError::DRIVER_KAC_INVALID_USER)?;
    }
    if purpose == KacPurpose::Unknown {
        Err(SecEngError::DRIVER_KAC_INVALID_PURPOSE)?;
    }
    if sw_tag > MAX_SW_TAG {
        Err(SecEngError::DRIVER_KAC_INVALID_SW_TAG)?;
    }
    KeySize::from_bits(key_bits)
}
