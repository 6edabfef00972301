/*++

Licensed under the Apache-2.0 license.

File Name:

    engine.rs

Abstract:

    File contains the engine handle, the engine guard and the device engine
    table. All register access goes through an `EngineGuard`.

--*/

use crate::{cprintln, printer::ErrorCode};
use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::{common, OPERATION, STATUS};
use tock_registers::LocalRegisterCopy;

bitflags::bitflags! {
    /// Optional capabilities of an engine instance
    pub struct SupportedFeatures: u32 {
        /// AES engine computes CMAC natively
        const HW_CMAC = 1 << 0;

        /// KAC can generate random keys into a keyslot
        const KAC_GENERATE = 1 << 1;

        /// KAC can clone one keyslot into another
        const KAC_CLONE = 1 << 2;

        /// KAC can lock a keyslot until engine reset
        const KAC_LOCK = 1 << 3;

        /// Engine holds RSA keys in keyslots
        const RSA_KEYSLOTS = 1 << 4;

        /// Unified RSA keytable stores Montgomery values
        const RSA_MONTGOMERY = 1 << 5;

        /// AES side-channel countermeasures
        const AES_SCC = 1 << 6;
    }
}

/// Engine Capability Class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineClass {
    Aes,
    Sha,
    Rsa,
}

impl EngineClass {
    /// Number of keyslots of an engine of this class
    pub const fn max_keyslots(self) -> u32 {
        match self {
            Self::Aes => 16,
            Self::Sha => 16,
            Self::Rsa => 4,
        }
    }

    /// Classes whose keyslots are managed by the key access controller
    pub const fn has_kac(self) -> bool {
        match self {
            Self::Aes | Self::Sha => true,
            Self::Rsa => false,
        }
    }
}

/// Engine Instance Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineId {
    Aes0 = 0,
    Aes1 = 1,
    Sha = 2,

    /// RSA keytable of the unified security engine
    Rsa = 3,

    /// Legacy public key accelerator
    Pka = 4,
}

impl EngineId {
    pub const ALL: [EngineId; 5] = [
        EngineId::Aes0,
        EngineId::Aes1,
        EngineId::Sha,
        EngineId::Rsa,
        EngineId::Pka,
    ];

    pub const fn class(self) -> EngineClass {
        match self {
            Self::Aes0 | Self::Aes1 => EngineClass::Aes,
            Self::Sha => EngineClass::Sha,
            Self::Rsa | Self::Pka => EngineClass::Rsa,
        }
    }
}

impl From<EngineId> for usize {
    fn from(id: EngineId) -> Self {
        id as Self
    }
}

/// Command written to the operation register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    KacInsert,
    KacGenerate,
    KacClone,
    KacLock,
    KacInvalidate,
}

impl Operation {
    /// Operation register preset value
    pub fn preset(self) -> u32 {
        let op = match self {
            Self::Start => OPERATION::OP::START,
            Self::KacInsert => OPERATION::OP::KAC_INSERT,
            Self::KacGenerate => OPERATION::OP::KAC_GENERATE,
            Self::KacClone => OPERATION::OP::KAC_CLONE,
            Self::KacLock => OPERATION::OP::KAC_LOCK,
            Self::KacInvalidate => OPERATION::OP::KAC_INVALIDATE,
        };
        op.value
    }
}

/// Platform services backing one engine instance.
///
/// Register offsets are relative to the engine base. `start_operation`
/// receives the operation register preset. `wait_engine_idle` is bounded and
/// reports `DRIVER_ENGINE_TIMEOUT` when the bound is exceeded. A buffer passed
/// to `phys_addr` stays borrowed by the driver until `dma_release`.
pub trait EngineHw {
    fn acquire(&self);

    fn release(&self);

    fn read_register(&self, offset: u32) -> u32;

    fn write_register(&self, offset: u32, value: u32);

    fn start_operation(&self, preset: u32) -> SecEngResult<()>;

    fn wait_engine_idle(&self) -> SecEngResult<()>;

    /// Translate a buffer into the address the engine DMA uses
    fn phys_addr(&self, buf: &[u8]) -> SecEngResult<u64>;

    /// Hand a translated buffer back after the engine drained. A destination
    /// buffer is passed as `out` to receive what the engine wrote.
    fn dma_release(&self, _addr: u64, _out: Option<&mut [u8]>) {}
}

/// One engine instance
pub struct Engine<H: EngineHw> {
    id: EngineId,
    hw: H,
    features: SupportedFeatures,
}

impl<H: EngineHw> Engine<H> {
    pub fn new(id: EngineId, hw: H, features: SupportedFeatures) -> Self {
        Self { id, hw, features }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn class(&self) -> EngineClass {
        self.id.class()
    }

    pub fn features(&self) -> SupportedFeatures {
        self.features
    }

    /// Acquire the engine. The engine is released when the guard is dropped.
    pub fn lock(&self) -> EngineGuard<'_, H> {
        self.hw.acquire();
        EngineGuard { engine: self }
    }

    pub(crate) fn require_class(&self, class: EngineClass) -> SecEngResult<()> {
        if self.class() != class {
            Err(SecEngError::DRIVER_ENGINE_CLASS_MISMATCH)?;
        }
        Ok(())
    }

    pub(crate) fn check_keyslot(&self, keyslot: u32) -> SecEngResult<()> {
        if keyslot >= self.class().max_keyslots() {
            Err(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE)?;
        }
        Ok(())
    }
}

/// Exclusive access to an engine's registers
pub struct EngineGuard<'a, H: EngineHw> {
    engine: &'a Engine<H>,
}

impl<'a, H: EngineHw> EngineGuard<'a, H> {
    pub fn engine(&self) -> &'a Engine<H> {
        self.engine
    }

    pub(crate) fn read(&self, offset: u32) -> u32 {
        self.engine.hw.read_register(offset)
    }

    pub(crate) fn write(&self, offset: u32, value: u32) {
        self.engine.hw.write_register(offset, value)
    }

    /// Write consecutive words starting at `offset`
    pub(crate) fn write_words(&self, offset: u32, words: &[u32]) {
        for (idx, word) in words.iter().enumerate() {
            self.write(offset + (idx as u32) * 4, *word);
        }
    }

    pub(crate) fn start(&self, op: Operation) -> SecEngResult<()> {
        self.engine.hw.start_operation(op.preset())
    }

    pub(crate) fn wait_idle(&self) -> SecEngResult<()> {
        self.engine.hw.wait_engine_idle()
    }

    pub(crate) fn phys_addr(&self, buf: &[u8]) -> SecEngResult<u64> {
        self.engine.hw.phys_addr(buf)
    }

    pub(crate) fn dma_release(&self, addr: u64, out: Option<&mut [u8]>) {
        self.engine.hw.dma_release(addr, out)
    }

    /// Check the status of the last command.
    ///
    /// A locked keyslot maps to `DRIVER_KAC_KEYSLOT_LOCKED`, every other
    /// hardware error maps to `fault`.
    pub(crate) fn check_status(&self, fault: SecEngError) -> SecEngResult<()> {
        let status = LocalRegisterCopy::<u32, STATUS::Register>::new(self.read(common::STATUS));
        match status.read_as_enum(STATUS::ERR) {
            Some(STATUS::ERR::Value::NONE) => Ok(()),
            Some(STATUS::ERR::Value::KEYSLOT_LOCKED) => {
                Err(SecEngError::DRIVER_KAC_KEYSLOT_LOCKED)
            }
            _ => {
                cprintln!(
                    "[seceng] engine {} status {}",
                    self.engine.id as u32,
                    ErrorCode(status.get())
                );
                Err(fault)
            }
        }
    }
}

impl<H: EngineHw> Drop for EngineGuard<'_, H> {
    fn drop(&mut self) {
        self.engine.hw.release();
    }
}

/// Engine table of one security engine device
pub struct SeDevice<H: EngineHw> {
    engines: [Option<Engine<H>>; EngineId::ALL.len()],
}

impl<H: EngineHw> Default for SeDevice<H> {
    fn default() -> Self {
        Self {
            engines: core::array::from_fn(|_| None),
        }
    }
}

impl<H: EngineHw> SeDevice<H> {
    /// Register an engine, replacing any engine with the same id
    pub fn add_engine(&mut self, engine: Engine<H>) {
        let idx = usize::from(engine.id());
        self.engines[idx] = Some(engine);
    }

    pub fn engine(&self, id: EngineId) -> SecEngResult<&Engine<H>> {
        self.engines[usize::from(id)]
            .as_ref()
            .ok_or(SecEngError::DRIVER_ENGINE_NOT_FOUND)
    }

    /// Select the first active engine of `class`
    pub fn select_engine(&self, class: EngineClass) -> SecEngResult<&Engine<H>> {
        self.engines
            .iter()
            .flatten()
            .find(|engine| engine.class() == class)
            .ok_or(SecEngError::DRIVER_ENGINE_NOT_FOUND)
    }
}
