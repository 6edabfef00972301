/*++

Licensed under the Apache-2.0 license.

File Name:

    kac.rs

Abstract:

    File contains the key access controller keyslot operations of the AES
    and SHA engines: insert, generate, clone, lock and invalidate.

--*/

use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::{kac, KAC_KEYSLOT};
use zeroize::Zeroize;

use crate::engine::{Engine, EngineGuard, EngineHw, Operation};
use crate::manifest::{KacManifest, KacPurpose, KacUser, KeyslotCtrl, MAX_SW_TAG};
use crate::validator::validate_kac_request;
use crate::{cprintln, printer::ErrorCode, SupportedFeatures};

mod command {
    use smlang::statemachine;

    statemachine! {
        transitions: {
            *Idle + Stage = RegistersStaged,
            RegistersStaged + Start = Started,
            RegistersStaged + Fail = Failed,
            Started + Complete = Completed,
            Started + Fail = Failed,
        }
    }

    pub struct Context;

    impl StateMachineContext for Context {}
}

use command::{Context, Events, StateMachine};

/// Manifest fields of a key inserted or generated into a keyslot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KacKeyArgs {
    pub user: KacUser,
    pub purpose: KacPurpose,
    pub sw_tag: u32,
    pub exportable: bool,
}

/// Manifest fields of a cloned keyslot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KacCloneArgs {
    pub user: KacUser,
    pub sw_tag: u32,
    pub exportable: bool,
}

/// Keyslot operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KacOp {
    Insert,
    Generate,
    Clone,
    Lock,
    Invalidate,
}

impl KacOp {
    fn operation(self) -> Operation {
        match self {
            Self::Insert => Operation::KacInsert,
            Self::Generate => Operation::KacGenerate,
            Self::Clone => Operation::KacClone,
            Self::Lock => Operation::KacLock,
            Self::Invalidate => Operation::KacInvalidate,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Generate => "generate",
            Self::Clone => "clone",
            Self::Lock => "lock",
            Self::Invalidate => "invalidate",
        }
    }
}

/// Arguments of the generic keyslot operation
#[derive(Debug, Clone, Copy)]
pub struct KacOpArgs<'a> {
    pub op: KacOp,

    /// Target keyslot, the destination of a clone
    pub keyslot: u32,

    /// Source keyslot of a clone
    pub src_keyslot: u32,

    /// Key data, insert only
    pub key: Option<&'a [u8]>,

    /// Key size in bits, insert and generate only
    pub key_bits: u32,

    /// Manifest fields. The purpose is ignored by clone.
    pub manifest: KacKeyArgs,
}

impl<'a> KacOpArgs<'a> {
    pub(crate) fn keyslot_only(op: KacOp, keyslot: u32) -> Self {
        Self {
            op,
            keyslot,
            src_keyslot: keyslot,
            key: None,
            key_bits: 0,
            manifest: KacKeyArgs {
                user: KacUser::Reserved,
                purpose: KacPurpose::Unknown,
                sw_tag: 0,
                exportable: false,
            },
        }
    }
}

/// Insert a software key into a keyslot
///
/// # Arguments
///
/// * `engine` - AES or SHA engine
/// * `keyslot` - Destination keyslot
/// * `key` - Key data, `key_bits / 8` bytes
/// * `key_bits` - Key size, 128, 192 or 256
/// * `args` - Manifest of the key
pub fn insert_key<H: EngineHw>(
    engine: &Engine<H>,
    keyslot: u32,
    key: &[u8],
    key_bits: u32,
    args: KacKeyArgs,
) -> SecEngResult<()> {
    keyslot_op(
        engine,
        &KacOpArgs {
            op: KacOp::Insert,
            keyslot,
            src_keyslot: keyslot,
            key: Some(key),
            key_bits,
            manifest: args,
        },
    )
}

/// Generate a random key inside a keyslot
pub fn generate_key<H: EngineHw>(
    engine: &Engine<H>,
    keyslot: u32,
    key_bits: u32,
    args: KacKeyArgs,
) -> SecEngResult<()> {
    keyslot_op(
        engine,
        &KacOpArgs {
            op: KacOp::Generate,
            keyslot,
            src_keyslot: keyslot,
            key: None,
            key_bits,
            manifest: args,
        },
    )
}

/// Clone the key of `src` into `dst`
pub fn clone_key<H: EngineHw>(
    engine: &Engine<H>,
    dst: u32,
    src: u32,
    args: KacCloneArgs,
) -> SecEngResult<()> {
    keyslot_op(
        engine,
        &KacOpArgs {
            op: KacOp::Clone,
            keyslot: dst,
            src_keyslot: src,
            key: None,
            key_bits: 0,
            manifest: KacKeyArgs {
                user: args.user,
                purpose: KacPurpose::Unknown,
                sw_tag: args.sw_tag,
                exportable: args.exportable,
            },
        },
    )
}

/// Lock a keyslot until the engine is reset
pub fn lock_keyslot<H: EngineHw>(engine: &Engine<H>, keyslot: u32) -> SecEngResult<()> {
    keyslot_op(engine, &KacOpArgs::keyslot_only(KacOp::Lock, keyslot))
}

/// Zero the key and manifest of an unlocked keyslot
pub fn invalidate_keyslot<H: EngineHw>(engine: &Engine<H>, keyslot: u32) -> SecEngResult<()> {
    keyslot_op(engine, &KacOpArgs::keyslot_only(KacOp::Invalidate, keyslot))
}

/// Run a keyslot operation under the engine guard
pub fn keyslot_op<H: EngineHw>(engine: &Engine<H>, args: &KacOpArgs) -> SecEngResult<()> {
    if !engine.class().has_kac() {
        Err(SecEngError::DRIVER_ENGINE_CLASS_MISMATCH)?;
    }
    let guard = engine.lock();
    keyslot_op_locked(&guard, args)
}

pub(crate) fn keyslot_op_locked<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    args: &KacOpArgs,
) -> SecEngResult<()> {
    match args.op {
        KacOp::Insert | KacOp::Generate => set_key(guard, args),
        KacOp::Clone => clone_locked(guard, args),
        KacOp::Lock => {
            guard.engine().check_keyslot(args.keyslot)?;
            if !guard.engine().features().contains(SupportedFeatures::KAC_LOCK) {
                Err(SecEngError::DRIVER_KAC_LOCK_UNSUPPORTED)?;
            }
            run_command(guard, KacOp::Lock, args.keyslot, |g| {
                g.write(kac::KEYSLOT, KAC_KEYSLOT::DST.val(args.keyslot).value);
            })
        }
        KacOp::Invalidate => {
            guard.engine().check_keyslot(args.keyslot)?;
            run_command(guard, KacOp::Invalidate, args.keyslot, |g| {
                g.write(kac::KEYSLOT, KAC_KEYSLOT::DST.val(args.keyslot).value);
            })
        }
    }
}

/// Insert or generate a key. Nothing is written when validation fails.
pub(crate) fn set_key<H: EngineHw>(
    guard: &EngineGuard<'_, H>,
    args: &KacOpArgs,
) -> SecEngResult<()> {
    let engine = guard.engine();
    match args.op {
        KacOp::Insert | KacOp::Generate => {}
        KacOp::Clone | KacOp::Lock | KacOp::Invalidate => {
            Err(SecEngError::DRIVER_KAC_OP_NOT_KEY_SET)?
        }
    }
    engine.check_keyslot(args.keyslot)?;
    let m = &args.manifest;
    let size = validate_kac_request(m.user, m.purpose, m.sw_tag, args.key_bits)?;
    match (args.op, args.key) {
        (KacOp::Insert, None) => Err(SecEngError::DRIVER_KAC_MISSING_KEY_DATA)?,
        (KacOp::Insert, Some(key)) if key.len() != size.bytes() => {
            Err(SecEngError::DRIVER_KAC_KEY_LEN_MISMATCH)?
        }
        (KacOp::Generate, Some(_)) => Err(SecEngError::DRIVER_KAC_UNEXPECTED_KEY_DATA)?,
        _ => {}
    }
    if args.op == KacOp::Generate && !engine.features().contains(SupportedFeatures::KAC_GENERATE)
    {
        Err(SecEngError::DRIVER_KAC_GENERATE_UNSUPPORTED)?;
    }

    let manifest = KacManifest {
        user: m.user,
        purpose: m.purpose,
        size,
        exportable: m.exportable,
        sw_tag: m.sw_tag,
    }
    .pack();

    let _scrub = KeyBufferScrub(guard);
    run_command(guard, args.op, args.keyslot, |g| {
        g.write(kac::MANIFEST, manifest);
        g.write(kac::CTRL, KeyslotCtrl::default().pack());
        g.write(kac::KEYSLOT, KAC_KEYSLOT::DST.val(args.keyslot).value);
        if let Some(key) = args.key {
            let mut words = key_words(key);
            g.write_words(kac::KEY_BUF, &words);
            words.zeroize();
        }
    })
}

fn clone_locked<H: EngineHw>(guard: &EngineGuard<'_, H>, args: &KacOpArgs) -> SecEngResult<()> {
    let engine = guard.engine();
    let (dst, src) = (args.keyslot, args.src_keyslot);
    engine.check_keyslot(dst)?;
    engine.check_keyslot(src)?;
    if dst == src {
        Err(SecEngError::DRIVER_KAC_CLONE_SAME_KEYSLOT)?;
    }
    if args.manifest.user == KacUser::Reserved {
        Err(SecEngError::DRIVER_KAC_INVALID_USER)?;
    }
    if args.manifest.sw_tag > MAX_SW_TAG {
        Err(SecEngError::DRIVER_KAC_INVALID_SW_TAG)?;
    }
    if !engine.features().contains(SupportedFeatures::KAC_CLONE) {
        Err(SecEngError::DRIVER_KAC_CLONE_UNSUPPORTED)?;
    }

    let manifest =
        KacManifest::pack_clone(args.manifest.user, args.manifest.sw_tag, args.manifest.exportable);
    run_command(guard, KacOp::Clone, dst, |g| {
        g.write(kac::MANIFEST, manifest);
        g.write(kac::CTRL, KeyslotCtrl::default().pack());
        g.write(
            kac::KEYSLOT,
            (KAC_KEYSLOT::DST.val(dst) + KAC_KEYSLOT::SRC.val(src)).value,
        );
    })
}

/// Stage registers, start the command and wait for its completion
fn run_command<'a, H: EngineHw>(
    guard: &EngineGuard<'a, H>,
    op: KacOp,
    keyslot: u32,
    stage: impl FnOnce(&EngineGuard<'a, H>),
) -> SecEngResult<()> {
    let mut sm = StateMachine::new(Context);

    stage(guard);
    advance(&mut sm, Events::Stage)?;

    if let Err(err) = guard.start(op.operation()) {
        advance(&mut sm, Events::Fail)?;
        return Err(err);
    }
    advance(&mut sm, Events::Start)?;

    let result = guard
        .wait_idle()
        .and_then(|_| guard.check_status(SecEngError::DRIVER_KAC_OP_FAILED));
    match result {
        Ok(()) => {
            cprintln!("[kac] {} keyslot {}", op.name(), keyslot);
            advance(&mut sm, Events::Complete)
        }
        Err(err) => {
            cprintln!(
                "[kac] {} keyslot {} failed {}",
                op.name(),
                keyslot,
                ErrorCode::from(err)
            );
            advance(&mut sm, Events::Fail)?;
            Err(err)
        }
    }
}

fn advance(sm: &mut StateMachine<Context>, event: Events) -> SecEngResult<()> {
    sm.process_event(event)
        .map(|_| ())
        .map_err(|_| SecEngError::DRIVER_KAC_INVALID_STATE)
}

/// Pack key bytes into the temporary key buffer layout
fn key_words(key: &[u8]) -> [u32; kac::KEY_BUF_WORDS] {
    let mut words = [0u32; kac::KEY_BUF_WORDS];
    for (word, chunk) in words.iter_mut().zip(key.chunks(4)) {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        *word = u32::from_le_bytes(bytes);
        bytes.zeroize();
    }
    words
}

/// Zeroes the temporary key buffer when dropped
struct KeyBufferScrub<'g, 'a, H: EngineHw>(&'g EngineGuard<'a, H>);

impl<H: EngineHw> Drop for KeyBufferScrub<'_, '_, H> {
    fn drop(&mut self) {
        self.0.write_words(kac::KEY_BUF, &[0u32; kac::KEY_BUF_WORDS]);
    }
}
