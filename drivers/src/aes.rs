/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains the AES engine cipher lifecycle: key installation, register
    staging, start, completion and keyslot cleanup.

--*/

use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::aes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher_mode::{
    build_registers, compute_block_count, iv_source, BlockCount, CipherModeParams,
    CipherRegisterSet, IvSource, AES_BLOCK_SIZE,
};
use crate::engine::{Engine, EngineClass, EngineGuard, EngineHw, EngineId, Operation};
use crate::kac::{self, KacKeyArgs, KacOp, KacOpArgs};
use crate::manifest::{map_algorithm_to_purpose, KacPurpose, KacUser};
use crate::{cprintln, printer::ErrorCode};
use crate::{CipherDirection, SeAlgorithm, SupportedFeatures};

mod lifecycle {
    use smlang::statemachine;

    statemachine! {
        transitions: {
            *NotStarted + SetKey = KeySet,
            KeySet + Stage = Staged,
            Staged + Start = Started,
            Started + Complete = Completed,
            NotStarted + Fail = Errored,
            KeySet + Fail = Errored,
            Staged + Fail = Errored,
            Started + Fail = Errored,
            Completed + Resolve = KeyslotResolved,
            Errored + Resolve = KeyslotResolved,
        }
    }

    pub struct Context;

    impl StateMachineContext for Context {}
}

use lifecycle::{Context, Events, StateMachine, States};

/// Largest key material a context carries, two 256-bit keys
const MAX_KEY_MATERIAL: usize = 64;

bitflags::bitflags! {
    /// Cipher context flags
    pub struct CipherFlags: u32 {
        /// Running IV or counter stays in the engine between calls
        const HW_CONTEXT = 1 << 0;

        /// Keep the installed key and IV registers after a successful call
        const LEAVE_KEY = 1 << 1;

        /// Counter is big endian
        const CTR_BIG_ENDIAN = 1 << 2;
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyMaterial {
    bytes: [u8; MAX_KEY_MATERIAL],
    len: usize,
}

impl KeyMaterial {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// State of a sequence of cipher calls
pub struct CipherContext {
    algorithm: SeAlgorithm,
    direction: CipherDirection,
    keyslot: u32,
    keyslot2: Option<u32>,

    /// Key to install. `None` when the caller manages the keyslot.
    key: Option<KeyMaterial>,
    user: KacUser,
    sw_tag: u32,

    iv: [u8; AES_BLOCK_SIZE],
    flags: CipherFlags,
    ctr_increment: u32,
    unused_bits: u32,

    /// A key this driver installed is still in the keyslot
    key_resident: bool,

    /// Engine holding the resident key or the chaining value of the previous
    /// call
    engine: Option<EngineId>,

    /// The engine updated IV of the previous call is valid
    continuation: bool,
}

impl CipherContext {
    /// Create a context using a key the caller already placed in `keyslot`
    pub fn new(algorithm: SeAlgorithm, direction: CipherDirection, keyslot: u32) -> Self {
        Self {
            algorithm,
            direction,
            keyslot,
            keyslot2: None,
            key: None,
            user: KacUser::Reserved,
            sw_tag: 0,
            iv: [0u8; AES_BLOCK_SIZE],
            flags: CipherFlags::CTR_BIG_ENDIAN,
            ctr_increment: 1,
            unused_bits: 0,
            key_resident: false,
            engine: None,
            continuation: false,
        }
    }

    /// Install `key` on the first call, tagged with `user` and `sw_tag`.
    /// XTS takes both keys concatenated.
    pub fn with_key(mut self, key: &[u8], user: KacUser, sw_tag: u32) -> SecEngResult<Self> {
        if key.is_empty() || key.len() > MAX_KEY_MATERIAL {
            Err(SecEngError::DRIVER_AES_INVALID_KEY_MATERIAL)?;
        }
        let mut material = KeyMaterial {
            bytes: [0u8; MAX_KEY_MATERIAL],
            len: key.len(),
        };
        material.bytes[..key.len()].copy_from_slice(key);
        self.key = Some(material);
        self.user = user;
        self.sw_tag = sw_tag;
        Ok(self)
    }

    pub fn with_second_keyslot(mut self, keyslot: u32) -> Self {
        self.keyslot2 = Some(keyslot);
        self
    }

    pub fn with_iv(mut self, iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        self.iv.copy_from_slice(iv);
        self
    }

    pub fn with_flags(mut self, flags: CipherFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_counter_increment(mut self, increment: u32) -> Self {
        self.ctr_increment = increment;
        self
    }

    /// Unused trailing bits of the final input byte
    pub fn with_unused_bits(mut self, unused_bits: u32) -> Self {
        self.unused_bits = unused_bits;
        self
    }

    /// Change the flags between calls. Clearing `LEAVE_KEY` makes the next
    /// call release the keyslot.
    pub fn set_flags(&mut self, flags: CipherFlags) {
        self.flags = flags;
    }

    /// Restart the sequence with a new IV
    pub fn set_iv(&mut self, iv: &[u8; AES_BLOCK_SIZE]) {
        self.iv.copy_from_slice(iv);
        self.continuation = false;
    }

    /// IV or counter for the next call
    pub fn iv(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.iv
    }

    pub fn algorithm(&self) -> SeAlgorithm {
        self.algorithm
    }

    pub fn key_resident(&self) -> bool {
        self.key_resident
    }

    /// Engine the next call must run on, if any
    pub fn engine(&self) -> Option<EngineId> {
        self.engine
    }

    pub fn continuation(&self) -> bool {
        self.continuation
    }

    fn mode_params(&self, features: SupportedFeatures) -> CipherModeParams {
        CipherModeParams {
            keyslot: self.keyslot,
            keyslot2: self.keyslot2,
            first_call: !self.continuation,
            hw_context: self.flags.contains(CipherFlags::HW_CONTEXT),
            ctr_increment: self.ctr_increment,
            ctr_big_endian: self.flags.contains(CipherFlags::CTR_BIG_ENDIAN),
            features,
        }
    }

    fn check_key_material(&self) -> SecEngResult<()> {
        let Some(key) = &self.key else {
            return Ok(());
        };
        let valid = match self.algorithm {
            SeAlgorithm::AesXts => matches!(key.len, 32 | 64),
            _ => matches!(key.len, 16 | 24 | 32),
        };
        if !valid {
            Err(SecEngError::DRIVER_AES_INVALID_KEY_MATERIAL)?;
        }
        Ok(())
    }
}

impl Drop for CipherContext {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

/// Validated register values of one call
struct Plan {
    blocks: BlockCount,
    regs: CipherRegisterSet,
    iv_source: IvSource,
    purpose: KacPurpose,
}

/// One asynchronous cipher call. The engine stays acquired until the
/// operation is dropped.
pub struct AesOperation<'a, H: EngineHw> {
    guard: EngineGuard<'a, H>,
    ctx: &'a mut CipherContext,
    input: &'a [u8],
    output: &'a mut [u8],
    blocks: Option<BlockCount>,
    in_dma: Option<u64>,
    out_dma: Option<u64>,
    sm: StateMachine<Context>,
    status: SecEngResult<()>,
}

impl<'a, H: EngineHw> AesOperation<'a, H> {
    /// Acquire an AES engine for one call
    pub fn new(
        engine: &'a Engine<H>,
        ctx: &'a mut CipherContext,
        input: &'a [u8],
        output: &'a mut [u8],
    ) -> SecEngResult<Self> {
        engine.require_class(EngineClass::Aes)?;
        Ok(Self {
            guard: engine.lock(),
            ctx,
            input,
            output,
            blocks: None,
            in_dma: None,
            out_dma: None,
            sm: StateMachine::new(Context),
            status: Ok(()),
        })
    }

    /// Install the key, stage the registers and start the engine
    pub fn start(&mut self) -> SecEngResult<()> {
        if !matches!(self.sm.state(), States::NotStarted) {
            Err(SecEngError::DRIVER_AES_ALREADY_STARTED)?;
        }
        let id = self.guard.engine().id();
        if matches!(self.ctx.engine, Some(owner) if owner != id) {
            Err(SecEngError::DRIVER_AES_KEY_ON_OTHER_ENGINE)?;
        }
        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(err) => {
                // A key or IV left by an earlier call does not outlive a
                // failed call.
                if self.ctx.engine.is_some() {
                    self.status = Err(err);
                    let _ = advance(&mut self.sm, Events::Fail);
                    let _ = self.resolve_keyslot();
                }
                return Err(err);
            }
        };
        self.blocks = Some(plan.blocks);

        if let Err(err) = self.program(&plan) {
            cprintln!("[aes] start failed {}", ErrorCode::from(err));
            self.status = Err(err);
            self.release_dma(false);
            let _ = advance(&mut self.sm, Events::Fail);
            let _ = self.resolve_keyslot();
            return Err(err);
        }
        Ok(())
    }

    /// Wait for the engine, collect the next IV and release the keyslot
    pub fn finish(mut self) -> SecEngResult<()> {
        if !matches!(self.sm.state(), States::Started) {
            Err(SecEngError::DRIVER_AES_INVALID_STATE)?;
        }
        let result = self
            .guard
            .wait_idle()
            .and_then(|_| self.guard.check_status(SecEngError::DRIVER_AES_OP_FAILED));
        self.release_dma(result.is_ok());
        match result {
            Ok(()) => {
                advance(&mut self.sm, Events::Complete)?;
                self.update_iv();
            }
            Err(err) => {
                cprintln!("[aes] operation failed {}", ErrorCode::from(err));
                self.status = Err(err);
                advance(&mut self.sm, Events::Fail)?;
            }
        }
        let cleanup = self.resolve_keyslot();
        self.status.and(cleanup)
    }

    fn plan(&self) -> SecEngResult<Plan> {
        let engine = self.guard.engine();
        let features = engine.features();
        let ctx = &*self.ctx;
        let algorithm = ctx.algorithm;

        if !algorithm.is_cipher() {
            Err(SecEngError::DRIVER_AES_NOT_A_CIPHER)?;
        }
        let unsupported = match algorithm {
            SeAlgorithm::AesGmac => true,
            SeAlgorithm::AesCmac => features.contains(SupportedFeatures::HW_CMAC),
            _ => algorithm.is_key_wrap(),
        };
        if unsupported {
            Err(SecEngError::DRIVER_AES_ALGORITHM_UNSUPPORTED)?;
        }

        let blocks = compute_block_count(algorithm, self.input.len(), ctx.unused_bits)?;
        if self.output.len() < self.input.len() {
            Err(SecEngError::DRIVER_AES_OUTPUT_TOO_SMALL)?;
        }
        engine.check_keyslot(ctx.keyslot)?;
        if algorithm == SeAlgorithm::AesXts {
            let keyslot2 = ctx
                .keyslot2
                .ok_or(SecEngError::DRIVER_AES_MISSING_SECOND_KEYSLOT)?;
            engine.check_keyslot(keyslot2)?;
        }
        ctx.check_key_material()?;

        let params = ctx.mode_params(features);
        Ok(Plan {
            blocks,
            regs: build_registers(algorithm, ctx.direction, &params)?,
            iv_source: iv_source(algorithm, &params),
            purpose: map_algorithm_to_purpose(algorithm, features)?,
        })
    }

    fn program(&mut self, plan: &Plan) -> SecEngResult<()> {
        let guard = &self.guard;
        let ctx = &mut *self.ctx;

        if ctx.key.is_some() && !ctx.key_resident {
            // Marked first so a partial install is still invalidated.
            ctx.key_resident = true;
            ctx.engine = Some(guard.engine().id());
            install_key(guard, ctx, plan.purpose)?;
        }
        advance(&mut self.sm, Events::SetKey)?;

        let write_iv = match plan.iv_source {
            IvSource::Reg => true,
            IvSource::Updated => false,
            IvSource::Default => {
                ctx.algorithm == SeAlgorithm::AesGcm
                    && !ctx.flags.contains(CipherFlags::HW_CONTEXT)
            }
        };
        if write_iv {
            let offset = if ctx.algorithm.uses_linear_counter() {
                aes::LINEAR_CTR
            } else {
                aes::IV
            };
            let mut words = block_words(&ctx.iv);
            guard.write_words(offset, &words);
            words.zeroize();
        }

        let in_addr = guard.phys_addr(self.input)?;
        self.in_dma = Some(in_addr);
        let out_addr = guard.phys_addr(&*self.output)?;
        self.out_dma = Some(out_addr);
        let size = self.input.len() as u32;
        guard.write(aes::CONFIG, plan.regs.config);
        guard.write(aes::CRYPTO_CONFIG, plan.regs.crypto_config);
        guard.write(aes::CRYPTO_KEYSLOT, plan.regs.keyslots);
        guard.write(aes::LAST_BLOCK, plan.blocks.last_block_register());
        guard.write(aes::IN_ADDR_LO, in_addr as u32);
        guard.write(aes::IN_ADDR_HI, (in_addr >> 32) as u32);
        guard.write(aes::IN_SIZE, size);
        guard.write(aes::OUT_ADDR_LO, out_addr as u32);
        guard.write(aes::OUT_ADDR_HI, (out_addr >> 32) as u32);
        guard.write(aes::OUT_SIZE, size);
        advance(&mut self.sm, Events::Stage)?;

        guard.start(Operation::Start)?;
        advance(&mut self.sm, Events::Start)
    }

    /// Record the IV or counter the next call continues from
    fn update_iv(&mut self) {
        let Some(blocks) = self.blocks else {
            return;
        };
        let len = self.input.len();
        let full_tail = len >= AES_BLOCK_SIZE;
        let tail = len.saturating_sub(AES_BLOCK_SIZE)..len;
        let ctx = &mut *self.ctx;
        match ctx.algorithm {
            SeAlgorithm::AesCbc | SeAlgorithm::AesCts | SeAlgorithm::AesCmac if full_tail => {
                let src = match (ctx.algorithm, ctx.direction) {
                    (SeAlgorithm::AesCmac, _) | (_, CipherDirection::Encrypt) => &self.output[tail],
                    (_, CipherDirection::Decrypt) => &self.input[tail],
                };
                ctx.iv.copy_from_slice(src);
            }
            SeAlgorithm::AesOfb if full_tail => {
                let out = &self.output[tail.clone()];
                let inp = &self.input[tail];
                for (iv, (o, i)) in ctx.iv.iter_mut().zip(out.iter().zip(inp)) {
                    *iv = o ^ i;
                }
            }
            SeAlgorithm::AesCtr | SeAlgorithm::AesCcm => {
                let amount = u128::from(blocks.blocks) * u128::from(ctx.ctr_increment);
                let big_endian = ctx.flags.contains(CipherFlags::CTR_BIG_ENDIAN);
                advance_counter(&mut ctx.iv, amount, big_endian);
            }
            SeAlgorithm::AesGcm => inc32(&mut ctx.iv, blocks.blocks),
            _ => {}
        }
    }

    /// Invalidate keys this driver installed and clear the IV registers,
    /// unless the context keeps them for the next call.
    fn resolve_keyslot(&mut self) -> SecEngResult<()> {
        let ctx = &mut *self.ctx;
        let leave = ctx.flags.contains(CipherFlags::LEAVE_KEY) && self.status.is_ok();
        let mut result = Ok(());
        if leave {
            ctx.continuation = true;
            ctx.engine = Some(self.guard.engine().id());
        } else {
            ctx.continuation = false;
            ctx.engine = None;
            if ctx.key_resident {
                ctx.key_resident = false;
                let mut keyslots = [Some(ctx.keyslot), None];
                if ctx.algorithm == SeAlgorithm::AesXts {
                    keyslots[1] = ctx.keyslot2;
                }
                for keyslot in keyslots.into_iter().flatten() {
                    let args = KacOpArgs::keyslot_only(KacOp::Invalidate, keyslot);
                    let invalidated = kac::keyslot_op_locked(&self.guard, &args);
                    result = result.and(invalidated);
                }
            }
            clear_iv_registers(&self.guard);
        }
        let _ = advance(&mut self.sm, Events::Resolve);
        if let Err(err) = result {
            cprintln!("[aes] keyslot cleanup failed {}", ErrorCode::from(err));
        }
        result
    }

    /// Hand the buffers back to the platform. The output only takes what
    /// the engine wrote when the operation completed.
    fn release_dma(&mut self, completed: bool) {
        if let Some(addr) = self.in_dma.take() {
            self.guard.dma_release(addr, None);
        }
        if let Some(addr) = self.out_dma.take() {
            let out = if completed {
                Some(&mut *self.output)
            } else {
                None
            };
            self.guard.dma_release(addr, out);
        }
    }

    fn abandon(&mut self) {
        if self.status.is_ok() {
            self.status = Err(SecEngError::DRIVER_AES_INVALID_STATE);
        }
        self.release_dma(false);
        let _ = advance(&mut self.sm, Events::Fail);
        let _ = self.resolve_keyslot();
    }
}

impl<H: EngineHw> Drop for AesOperation<'_, H> {
    fn drop(&mut self) {
        let started = match self.sm.state() {
            States::NotStarted | States::KeyslotResolved => return,
            States::Started => true,
            _ => false,
        };
        if started {
            let _ = self.guard.wait_idle();
        }
        self.abandon();
    }
}

/// Run one cipher call to completion
///
/// # Arguments
///
/// * `engine` - AES engine
/// * `ctx` - Cipher context, updated with the IV of the next call
/// * `input` - Input data
/// * `output` - Output buffer, at least as large as `input`
pub fn run_cipher_block<H: EngineHw>(
    engine: &Engine<H>,
    ctx: &mut CipherContext,
    input: &[u8],
    output: &mut [u8],
) -> SecEngResult<()> {
    let mut op = AesOperation::new(engine, ctx, input, output)?;
    op.start()?;
    op.finish()
}

/// Zero the IV and linear counter registers.
///
/// This is useful to call from a fatal-error-handling routine.
pub fn zeroize_iv_registers<H: EngineHw>(engine: &Engine<H>) -> SecEngResult<()> {
    engine.require_class(EngineClass::Aes)?;
    let guard = engine.lock();
    clear_iv_registers(&guard);
    Ok(())
}

fn clear_iv_registers<H: EngineHw>(guard: &EngineGuard<'_, H>) {
    let zeros = [0u32; aes::BLOCK_WORDS];
    guard.write_words(aes::IV, &zeros);
    guard.write_words(aes::LINEAR_CTR, &zeros);
}

fn install_key<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    ctx: &CipherContext,
    purpose: KacPurpose,
) -> SecEngResult<()> {
    let Some(key) = &ctx.key else {
        return Ok(());
    };
    let key = key.as_bytes();
    let manifest = KacKeyArgs {
        user: ctx.user,
        purpose,
        sw_tag: ctx.sw_tag,
        exportable: false,
    };
    let (first, second) = match (ctx.algorithm, ctx.keyslot2) {
        (SeAlgorithm::AesXts, Some(keyslot2)) => {
            let (k1, k2) = key.split_at(key.len() / 2);
            (k1, Some((keyslot2, k2)))
        }
        _ => (key, None),
    };
    let insert = |keyslot: u32, key: &[u8]| {
        kac::set_key(
            guard,
            &KacOpArgs {
                op: KacOp::Insert,
                keyslot,
                src_keyslot: keyslot,
                key: Some(key),
                key_bits: (key.len() * 8) as u32,
                manifest,
            },
        )
    };
    insert(ctx.keyslot, first)?;
    if let Some((keyslot2, key2)) = second {
        insert(keyslot2, key2)?;
    }
    Ok(())
}

fn advance(sm: &mut StateMachine<Context>, event: Events) -> SecEngResult<()> {
    sm.process_event(event)
        .map(|_| ())
        .map_err(|_| SecEngError::DRIVER_AES_INVALID_STATE)
}

fn block_words(block: &[u8; AES_BLOCK_SIZE]) -> [u32; aes::BLOCK_WORDS] {
    core::array::from_fn(|i| {
        u32::from_le_bytes([
            block[i * 4],
            block[i * 4 + 1],
            block[i * 4 + 2],
            block[i * 4 + 3],
        ])
    })
}

/// Add `amount` to a 128-bit counter
fn advance_counter(counter: &mut [u8; AES_BLOCK_SIZE], amount: u128, big_endian: bool) {
    if big_endian {
        let value = u128::from_be_bytes(*counter).wrapping_add(amount);
        *counter = value.to_be_bytes();
    } else {
        let value = u128::from_le_bytes(*counter).wrapping_add(amount);
        *counter = value.to_le_bytes();
    }
}

/// Add `blocks` to the low 32 bits of a GCM counter block
fn inc32(counter: &mut [u8; AES_BLOCK_SIZE], blocks: u32) {
    let mut low = [0u8; 4];
    low.copy_from_slice(&counter[12..]);
    let low = u32::from_be_bytes(low).wrapping_add(blocks);
    counter[12..].copy_from_slice(&low.to_be_bytes());
}
