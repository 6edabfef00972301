/*++

Licensed under the Apache-2.0 license.

File Name:

    datapath.rs

Abstract:

    File contains the AES engine datapath model: the configurable XOR
    datapath, the XTS tweak path and the GCM counter path.

--*/

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use rand::RngCore;
use seceng_registers::{CRYPTO_CONFIG, STATUS};
use tock_registers::LocalRegisterCopy;

pub const BLOCK_SIZE: usize = 16;

pub type Block = [u8; BLOCK_SIZE];

const BAD_CONFIG: u32 = STATUS::ERR::BAD_CONFIG.value;

/// AES block cipher keyed from a keyslot
pub enum AesCore {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesCore {
    pub fn new(key: &[u8]) -> Result<Self, u32> {
        let core = match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128),
            24 => Aes192::new_from_slice(key).map(Self::Aes192),
            32 => Aes256::new_from_slice(key).map(Self::Aes256),
            _ => return Err(BAD_CONFIG),
        };
        core.map_err(|_| BAD_CONFIG)
    }

    pub fn encrypt(&self, block: &mut Block) {
        let mut data = GenericArray::clone_from_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(&mut data),
            Self::Aes192(c) => c.encrypt_block(&mut data),
            Self::Aes256(c) => c.encrypt_block(&mut data),
        }
        block.copy_from_slice(&data);
    }

    pub fn decrypt(&self, block: &mut Block) {
        let mut data = GenericArray::clone_from_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(&mut data),
            Self::Aes192(c) => c.decrypt_block(&mut data),
            Self::Aes256(c) => c.decrypt_block(&mut data),
        }
        block.copy_from_slice(&data);
    }

    fn process(&self, encrypt: bool, block: &mut Block) {
        if encrypt {
            self.encrypt(block)
        } else {
            self.decrypt(block)
        }
    }
}

/// Chaining state carried between datapath calls
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DatapathState {
    /// Chaining value, the IV on entry and the updated IV on exit
    pub iv: Block,

    /// Linear counter
    pub counter: Block,
}

fn xor_block(block: &mut Block, vector: &Block) {
    for (b, v) in block.iter_mut().zip(vector) {
        *b ^= v;
    }
}

fn to_block(src: &[u8]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[..src.len()].copy_from_slice(src);
    block
}

fn step_counter(counter: &mut Block, step: u32, little_endian: bool) {
    let step = u128::from(step);
    *counter = if little_endian {
        u128::from_le_bytes(*counter).wrapping_add(step).to_le_bytes()
    } else {
        u128::from_be_bytes(*counter).wrapping_add(step).to_be_bytes()
    };
}

/// Run block aligned data through the XOR datapath selected by the crypto
/// config register.
pub fn run_datapath(
    core: &AesCore,
    crypto_config: u32,
    state: &mut DatapathState,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), u32> {
    use CRYPTO_CONFIG::{INPUT_SEL, VCTRAM_SEL, XOR_POS};

    let cfg = LocalRegisterCopy::<u32, CRYPTO_CONFIG::Register>::new(crypto_config);
    let xor = cfg.read_as_enum(XOR_POS).ok_or(BAD_CONFIG)?;
    let input_sel = cfg.read_as_enum(INPUT_SEL).ok_or(BAD_CONFIG)?;
    let vector_sel = cfg.read_as_enum(VCTRAM_SEL).ok_or(BAD_CONFIG)?;
    let encrypt = cfg.matches_all(CRYPTO_CONFIG::CORE_SEL::ENCRYPT);
    let ctr_le = cfg.is_set(CRYPTO_CONFIG::CTR_LE);
    let ctr_step = cfg.read(CRYPTO_CONFIG::CTR_CNTN);

    if matches!(xor, XOR_POS::Value::BOTH) || matches!(vector_sel, VCTRAM_SEL::Value::TWEAK) {
        return Err(BAD_CONFIG);
    }
    if input.len() % BLOCK_SIZE != 0 || output.len() < input.len() {
        return Err(BAD_CONFIG);
    }

    let mut prev_out = state.iv;
    let mut prev_mem = state.iv;
    for (src, dst) in input
        .chunks_exact(BLOCK_SIZE)
        .zip(output.chunks_exact_mut(BLOCK_SIZE))
    {
        let mem = to_block(src);
        let vector = match vector_sel {
            VCTRAM_SEL::Value::MEMORY => mem,
            VCTRAM_SEL::Value::AESOUT => prev_out,
            VCTRAM_SEL::Value::PREV_MEMORY => prev_mem,
            VCTRAM_SEL::Value::TWEAK => return Err(BAD_CONFIG),
        };
        let mut block = match input_sel {
            INPUT_SEL::Value::MEMORY => mem,
            INPUT_SEL::Value::AESOUT => prev_out,
            INPUT_SEL::Value::LINEAR_CTR => {
                let block = state.counter;
                step_counter(&mut state.counter, ctr_step, ctr_le);
                block
            }
            INPUT_SEL::Value::RANDOM => {
                let mut block = [0u8; BLOCK_SIZE];
                rand::thread_rng().fill_bytes(&mut block);
                block
            }
        };

        if matches!(xor, XOR_POS::Value::TOP) {
            xor_block(&mut block, &vector);
        }
        core.process(encrypt, &mut block);
        prev_out = block;
        if matches!(xor, XOR_POS::Value::BOTTOM) {
            xor_block(&mut block, &vector);
        }
        dst.copy_from_slice(&block);
        prev_mem = mem;
    }

    state.iv = if matches!(vector_sel, VCTRAM_SEL::Value::PREV_MEMORY) {
        prev_mem
    } else {
        prev_out
    };
    Ok(())
}

/// Multiply an XTS tweak by the primitive element of GF(2^128)
fn mul_alpha(tweak: &mut Block) {
    let value = u128::from_le_bytes(*tweak);
    let carry = value >> 127;
    *tweak = ((value << 1) ^ (carry * 0x87)).to_le_bytes();
}

fn xts_block(core: &AesCore, encrypt: bool, tweak: &Block, block: &mut Block) {
    xor_block(block, tweak);
    core.process(encrypt, block);
    xor_block(block, tweak);
}

/// XTS with ciphertext stealing. `key1` processes data, `key2` encrypts the
/// IV into the initial tweak.
pub fn run_xts(
    key1: &AesCore,
    key2: &AesCore,
    encrypt: bool,
    iv: &Block,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), u32> {
    let len = input.len();
    if len < BLOCK_SIZE || output.len() < len {
        return Err(BAD_CONFIG);
    }
    let mut tweak = *iv;
    key2.encrypt(&mut tweak);

    let tail = len % BLOCK_SIZE;
    let full = len / BLOCK_SIZE;
    let regular = if tail == 0 { full } else { full - 1 };
    for idx in 0..regular {
        let range = idx * BLOCK_SIZE..(idx + 1) * BLOCK_SIZE;
        let mut block = to_block(&input[range.clone()]);
        xts_block(key1, encrypt, &tweak, &mut block);
        output[range].copy_from_slice(&block);
        mul_alpha(&mut tweak);
    }
    if tail == 0 {
        return Ok(());
    }

    let last = regular * BLOCK_SIZE..(regular + 1) * BLOCK_SIZE;
    let stolen = last.end..len;
    let mut next_tweak = tweak;
    mul_alpha(&mut next_tweak);
    let (first_tweak, second_tweak) = if encrypt {
        (tweak, next_tweak)
    } else {
        (next_tweak, tweak)
    };

    let mut block = to_block(&input[last.clone()]);
    xts_block(key1, encrypt, &first_tweak, &mut block);
    output[stolen.clone()].copy_from_slice(&block[..tail]);

    let mut merged = block;
    merged[..tail].copy_from_slice(&input[stolen]);
    xts_block(key1, encrypt, &second_tweak, &mut merged);
    output[last].copy_from_slice(&merged);
    Ok(())
}

/// Add `blocks` to the low 32 bits of a counter block
fn inc32(counter: &mut Block, blocks: u32) {
    let mut low = [0u8; 4];
    low.copy_from_slice(&counter[12..]);
    let low = u32::from_be_bytes(low).wrapping_add(blocks);
    counter[12..].copy_from_slice(&low.to_be_bytes());
}

/// GCM counter mode keystream over `input`, the final block may be partial
pub fn run_gctr(
    core: &AesCore,
    counter: &mut Block,
    input: &[u8],
    output: &mut [u8],
) -> Result<(), u32> {
    if output.len() < input.len() {
        return Err(BAD_CONFIG);
    }
    for (src, dst) in input.chunks(BLOCK_SIZE).zip(output.chunks_mut(BLOCK_SIZE)) {
        let mut keystream = *counter;
        core.encrypt(&mut keystream);
        for ((d, s), k) in dst.iter_mut().zip(src).zip(&keystream) {
            *d = s ^ k;
        }
        inc32(counter, 1);
    }
    Ok(())
}
