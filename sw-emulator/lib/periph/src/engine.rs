/*++

Licensed under the Apache-2.0 license.

File Name:

    engine.rs

Abstract:

    File contains the security engine instance model. It backs the driver
    `EngineHw` interface with a register file, the keyslot table, the RSA
    keytable and the AES datapath.

--*/

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use seceng_drivers::{EngineHw, KacPurpose};
use seceng_error::{SecEngError, SecEngResult};
use seceng_registers::{
    aes, common, kac, pka, rsa, CONFIG, CRYPTO_CONFIG, CRYPTO_KEYSLOT, KAC_CTRL, KAC_KEYSLOT,
    LAST_BLOCK, OPERATION, STATUS,
};
use tock_registers::LocalRegisterCopy;

use crate::datapath::{run_datapath, run_gctr, run_xts, AesCore, Block, DatapathState, BLOCK_SIZE};
use crate::keyslot::{Keyslot, KeyslotTable, KEY_BYTES};
use crate::rsa_keytable::RsaKeytable;

/// Size of the register window of one engine instance
const REG_FILE_SIZE: u32 = 0x400;

/// First address handed out for a mapped buffer
const DMA_BASE: u64 = 0x8000_0000;

/// Mapped buffers start on this alignment
const DMA_ALIGN: u64 = 0x1000;

const ERR_NONE: u32 = STATUS::ERR::NONE.value;
const ERR_PURPOSE_MISMATCH: u32 = STATUS::ERR::PURPOSE_MISMATCH.value;
const ERR_BAD_CONFIG: u32 = STATUS::ERR::BAD_CONFIG.value;
const ERR_BAD_DMA: u32 = STATUS::ERR::BAD_DMA.value;

/// Index of `offset` within a run of `words` registers starting at `base`
fn word_index(offset: u32, base: u32, words: usize) -> Option<usize> {
    let end = base + (words as u32) * 4;
    if offset >= base && offset < end && offset % 4 == 0 {
        Some(((offset - base) / 4) as usize)
    } else {
        None
    }
}

fn block_from_words(words: &[u32]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    for (chunk, word) in block.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    block
}

fn block_word(block: &Block, idx: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&block[idx * 4..idx * 4 + 4]);
    u32::from_le_bytes(bytes)
}

struct DmaRegion {
    addr: u64,
    data: Vec<u8>,
}

/// Host buffers mapped for engine DMA. The engine reads and writes mapped
/// copies, which are handed back when the driver releases them.
struct DmaMemory {
    regions: Vec<DmaRegion>,
    next: u64,
}

impl DmaMemory {
    fn new() -> Self {
        Self {
            regions: Vec::new(),
            next: DMA_BASE,
        }
    }

    fn map(&mut self, buf: &[u8]) -> u64 {
        let addr = self.next;
        let len = (buf.len() as u64).max(1);
        self.next = addr + (len + DMA_ALIGN - 1) / DMA_ALIGN * DMA_ALIGN;
        self.regions.push(DmaRegion {
            addr,
            data: buf.to_vec(),
        });
        addr
    }

    /// `len` bytes at `addr`, if they lie inside one mapped buffer
    fn region_mut(&mut self, addr: u64, len: usize) -> Option<&mut [u8]> {
        self.regions.iter_mut().find_map(|region| {
            let start = usize::try_from(addr.checked_sub(region.addr)?).ok()?;
            region.data.get_mut(start..start.checked_add(len)?)
        })
    }

    fn unmap(&mut self, addr: u64) -> Option<Vec<u8>> {
        let idx = self.regions.iter().position(|region| region.addr == addr)?;
        Some(self.regions.swap_remove(idx).data)
    }
}

struct SeEngineModel {
    regs: [u32; (REG_FILE_SIZE / 4) as usize],

    /// Status of the last command
    status: u32,

    /// Chaining value left behind by the last cipher operation
    updated_iv: Block,

    /// Temporary key buffer, write-only to software
    key_buf: [u32; kac::KEY_BUF_WORDS],

    keyslots: KeyslotTable,
    rsa: RsaKeytable,

    /// Commands started since the last reset
    commands: u32,

    pending_timeout: bool,
    pending_fault: Option<u32>,
    dma_fault: bool,
    dma: DmaMemory,
}

impl SeEngineModel {
    fn new() -> Self {
        Self {
            regs: [0u32; (REG_FILE_SIZE / 4) as usize],
            status: ERR_NONE,
            updated_iv: [0u8; BLOCK_SIZE],
            key_buf: [0u32; kac::KEY_BUF_WORDS],
            keyslots: KeyslotTable::default(),
            rsa: RsaKeytable::default(),
            commands: 0,
            pending_timeout: false,
            pending_fault: None,
            dma_fault: false,
            dma: DmaMemory::new(),
        }
    }

    fn reg(&self, offset: u32) -> u32 {
        self.regs
            .get((offset / 4) as usize)
            .copied()
            .unwrap_or_default()
    }

    fn reg_block(&self, offset: u32) -> Block {
        let start = (offset / 4) as usize;
        block_from_words(&self.regs[start..start + aes::BLOCK_WORDS])
    }

    fn set_reg_block(&mut self, offset: u32, block: &Block) {
        let start = (offset / 4) as usize;
        for idx in 0..aes::BLOCK_WORDS {
            self.regs[start + idx] = block_word(block, idx);
        }
    }

    fn read(&self, offset: u32) -> u32 {
        if offset == common::STATUS {
            return self.status;
        }
        if let Some(idx) = word_index(offset, aes::UPDATED_IV, aes::BLOCK_WORDS) {
            return block_word(&self.updated_iv, idx);
        }
        if word_index(offset, kac::KEY_BUF, kac::KEY_BUF_WORDS).is_some() {
            return 0;
        }
        self.reg(offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            rsa::KEYTABLE_DATA => {
                let addr = self.reg(rsa::KEYTABLE_ADDR);
                self.rsa.keytable_write(addr, value);
            }
            pka::KEYSLOT_CTRL => self.rsa.pka_ctrl(value),
            pka::KEYSLOT_DATA => self.rsa.pka_data(value),
            _ => {}
        }
        if let Some(idx) = word_index(offset, kac::KEY_BUF, kac::KEY_BUF_WORDS) {
            self.key_buf[idx] = value;
            return;
        }
        if word_index(offset, aes::UPDATED_IV, aes::BLOCK_WORDS).is_some()
            || offset == common::STATUS
        {
            return;
        }
        // Loading the IV register also reloads the engine chaining value.
        if let Some(idx) = word_index(offset, aes::IV, aes::BLOCK_WORDS) {
            self.updated_iv[idx * 4..idx * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        if let Some(reg) = self.regs.get_mut((offset / 4) as usize) {
            *reg = value;
        }
    }

    fn start(&mut self, preset: u32) {
        self.commands += 1;
        if let Some(err) = self.pending_fault.take() {
            self.status = err;
            return;
        }
        let op = LocalRegisterCopy::<u32, OPERATION::Register>::new(preset);
        let result = match op.read_as_enum(OPERATION::OP) {
            Some(OPERATION::OP::Value::NOP) => Ok(()),
            Some(OPERATION::OP::Value::START) => self.run_cipher(),
            Some(OPERATION::OP::Value::KAC_INSERT) => self.kac_insert(),
            Some(OPERATION::OP::Value::KAC_GENERATE) => {
                let (dst, _) = self.kac_keyslots();
                let manifest = self.reg(kac::MANIFEST);
                let lock = self.kac_lock_requested();
                self.keyslots.generate(dst, manifest, lock)
            }
            Some(OPERATION::OP::Value::KAC_CLONE) => {
                let (dst, src) = self.kac_keyslots();
                let manifest = self.reg(kac::MANIFEST);
                let lock = self.kac_lock_requested();
                self.keyslots.clone_slot(dst, src, manifest, lock)
            }
            Some(OPERATION::OP::Value::KAC_LOCK) => {
                let (dst, _) = self.kac_keyslots();
                self.keyslots.lock(dst)
            }
            Some(OPERATION::OP::Value::KAC_INVALIDATE) => {
                let (dst, _) = self.kac_keyslots();
                self.keyslots.invalidate(dst)
            }
            None => Err(ERR_BAD_CONFIG),
        };
        self.status = match result {
            Ok(()) => ERR_NONE,
            Err(err) => err,
        };
    }

    fn kac_keyslots(&self) -> (u32, u32) {
        let reg = LocalRegisterCopy::<u32, KAC_KEYSLOT::Register>::new(self.reg(kac::KEYSLOT));
        (reg.read(KAC_KEYSLOT::DST), reg.read(KAC_KEYSLOT::SRC))
    }

    fn kac_lock_requested(&self) -> bool {
        LocalRegisterCopy::<u32, KAC_CTRL::Register>::new(self.reg(kac::CTRL)).is_set(KAC_CTRL::LOCK)
    }

    fn kac_insert(&mut self) -> Result<(), u32> {
        let (dst, _) = self.kac_keyslots();
        let manifest = self.reg(kac::MANIFEST);
        let lock = self.kac_lock_requested();
        let mut key = [0u8; KEY_BYTES];
        for (chunk, word) in key.chunks_exact_mut(4).zip(self.key_buf) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let result = self.keyslots.insert(dst, manifest, lock, &key);
        key.fill(0);
        result
    }

    fn dma_addr(&self, lo: u32, hi: u32) -> u64 {
        (u64::from(self.reg(hi)) << 32) | u64::from(self.reg(lo))
    }

    /// Keyed AES core of a keyslot carrying `purpose`
    fn keyed_core(&self, keyslot: u32, purpose: KacPurpose) -> Result<AesCore, u32> {
        let slot = self.keyslots.usable(keyslot)?;
        if slot.purpose() != purpose as u32 {
            return Err(ERR_PURPOSE_MISMATCH);
        }
        AesCore::new(slot.key_bytes().ok_or(ERR_BAD_CONFIG)?)
    }

    fn run_cipher(&mut self) -> Result<(), u32> {
        let config = LocalRegisterCopy::<u32, CONFIG::Register>::new(self.reg(aes::CONFIG));
        let crypto =
            LocalRegisterCopy::<u32, CRYPTO_CONFIG::Register>::new(self.reg(aes::CRYPTO_CONFIG));
        let keyslots =
            LocalRegisterCopy::<u32, CRYPTO_KEYSLOT::Register>::new(self.reg(aes::CRYPTO_KEYSLOT));
        let last = LocalRegisterCopy::<u32, LAST_BLOCK::Register>::new(self.reg(aes::LAST_BLOCK));

        let xts = crypto.matches_all(CRYPTO_CONFIG::XOR_POS::BOTH + CRYPTO_CONFIG::VCTRAM_SEL::TWEAK);
        let mode = config.read_as_enum(CONFIG::MODE).ok_or(ERR_BAD_CONFIG)?;
        let purpose = match mode {
            CONFIG::MODE::Value::DATAPATH if xts => KacPurpose::Xts,
            CONFIG::MODE::Value::DATAPATH => KacPurpose::Enc,
            CONFIG::MODE::Value::GCM => KacPurpose::Gcm,
            CONFIG::MODE::Value::GMAC | CONFIG::MODE::Value::CMAC => return Err(ERR_BAD_CONFIG),
        };
        let core = self.keyed_core(keyslots.read(CRYPTO_KEYSLOT::KEY_INDEX), purpose)?;

        let blocks = last.read(LAST_BLOCK::LAST_BLOCK) as usize + 1;
        let residual_bits = last.read(LAST_BLOCK::RESIDUAL_BITS) as usize;
        let expected = if residual_bits == 0 {
            blocks * BLOCK_SIZE
        } else {
            (blocks - 1) * BLOCK_SIZE + (residual_bits + 7) / 8
        };
        let in_size = self.reg(aes::IN_SIZE) as usize;
        if in_size != expected {
            return Err(ERR_BAD_CONFIG);
        }
        if residual_bits != 0 && !xts && !matches!(mode, CONFIG::MODE::Value::GCM) {
            return Err(ERR_BAD_CONFIG);
        }
        if (self.reg(aes::OUT_SIZE) as usize) < in_size {
            return Err(ERR_BAD_DMA);
        }
        let in_addr = self.dma_addr(aes::IN_ADDR_LO, aes::IN_ADDR_HI);
        let out_addr = self.dma_addr(aes::OUT_ADDR_LO, aes::OUT_ADDR_HI);
        if self.dma.region_mut(out_addr, in_size).is_none() {
            return Err(ERR_BAD_DMA);
        }
        let input = self
            .dma
            .region_mut(in_addr, in_size)
            .ok_or(ERR_BAD_DMA)?
            .to_vec();
        let mut output = vec![0u8; in_size];

        let iv = match crypto.read_as_enum(CRYPTO_CONFIG::IV_SEL) {
            Some(CRYPTO_CONFIG::IV_SEL::Value::REG) => self.reg_block(aes::IV),
            Some(CRYPTO_CONFIG::IV_SEL::Value::UPDATED)
            | Some(CRYPTO_CONFIG::IV_SEL::Value::DEFAULT) => self.updated_iv,
            None => return Err(ERR_BAD_CONFIG),
        };
        let encrypt = crypto.matches_all(CRYPTO_CONFIG::CORE_SEL::ENCRYPT);

        match mode {
            CONFIG::MODE::Value::GCM => {
                let mut counter = self.reg_block(aes::LINEAR_CTR);
                run_gctr(&core, &mut counter, &input, &mut output)?;
                self.set_reg_block(aes::LINEAR_CTR, &counter);
            }
            _ if xts => {
                let key2 = self.keyed_core(keyslots.read(CRYPTO_KEYSLOT::KEY2_INDEX), purpose)?;
                run_xts(&core, &key2, encrypt, &iv, &input, &mut output)?;
            }
            _ => {
                let mut state = DatapathState {
                    iv,
                    counter: self.reg_block(aes::LINEAR_CTR),
                };
                run_datapath(&core, crypto.get(), &mut state, &input, &mut output)?;
                self.updated_iv = state.iv;
                self.set_reg_block(aes::LINEAR_CTR, &state.counter);
            }
        }

        let dst = self
            .dma
            .region_mut(out_addr, in_size)
            .ok_or(ERR_BAD_DMA)?;
        dst.copy_from_slice(&output);
        Ok(())
    }

    /// Engine reset. Buffers mapped by the host stay mapped.
    fn reset(&mut self) {
        self.regs = [0u32; (REG_FILE_SIZE / 4) as usize];
        self.status = ERR_NONE;
        self.updated_iv = [0u8; BLOCK_SIZE];
        self.key_buf = [0u32; kac::KEY_BUF_WORDS];
        self.keyslots.reset();
        self.rsa.reset();
        self.commands = 0;
        self.pending_timeout = false;
        self.pending_fault = None;
    }
}

struct Shared {
    model: RefCell<SeEngineModel>,
    acquired: Cell<bool>,
}

/// One emulated engine instance. Clones share the same hardware state, so a
/// test can hand one clone to the driver and inspect the engine through
/// another.
#[derive(Clone)]
pub struct EmuEngine {
    shared: Rc<Shared>,
}

impl Default for EmuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmuEngine {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                model: RefCell::new(SeEngineModel::new()),
                acquired: Cell::new(false),
            }),
        }
    }

    /// Snapshot of a keyslot
    pub fn keyslot(&self, idx: u32) -> Option<Keyslot> {
        self.shared.model.borrow().keyslots.get(idx).copied()
    }

    /// Contents of the temporary key buffer
    pub fn key_buffer(&self) -> [u32; kac::KEY_BUF_WORDS] {
        self.shared.model.borrow().key_buf
    }

    /// Words of an RSA keyslot bank, least significant word first
    pub fn rsa_words(&self, keyslot: usize, bank: usize) -> Vec<u32> {
        self.shared.model.borrow().rsa.words(keyslot, bank).to_vec()
    }

    /// Whether the engine derives Montgomery values for an RSA keyslot
    pub fn pka_precompute(&self, keyslot: usize) -> bool {
        self.shared.model.borrow().rsa.precompute(keyslot)
    }

    /// IV register contents
    pub fn iv_register(&self) -> Block {
        self.shared.model.borrow().reg_block(aes::IV)
    }

    /// Linear counter register contents
    pub fn linear_counter(&self) -> Block {
        self.shared.model.borrow().reg_block(aes::LINEAR_CTR)
    }

    /// Chaining value the next `IV_SEL::UPDATED` operation starts from
    pub fn updated_iv(&self) -> Block {
        self.shared.model.borrow().updated_iv
    }

    pub fn status(&self) -> u32 {
        self.shared.model.borrow().status
    }

    /// Commands started since the last reset
    pub fn commands(&self) -> u32 {
        self.shared.model.borrow().commands
    }

    pub fn is_acquired(&self) -> bool {
        self.shared.acquired.get()
    }

    /// Buffers translated by `phys_addr` and not yet released
    pub fn mapped_buffers(&self) -> usize {
        self.shared.model.borrow().dma.regions.len()
    }

    /// Engine reset. Unlocks and erases every keyslot.
    pub fn reset(&self) {
        self.shared.model.borrow_mut().reset();
    }

    /// The next wait for idle times out
    pub fn inject_timeout(&self) {
        self.shared.model.borrow_mut().pending_timeout = true;
    }

    /// The next command completes with status error `err`
    pub fn inject_fault(&self, err: u32) {
        self.shared.model.borrow_mut().pending_fault = Some(err);
    }

    /// Make DMA address translation fail
    pub fn fail_dma(&self, fail: bool) {
        self.shared.model.borrow_mut().dma_fault = fail;
    }
}

impl EngineHw for EmuEngine {
    fn acquire(&self) {
        assert!(
            !self.shared.acquired.replace(true),
            "engine acquired while held"
        );
    }

    fn release(&self) {
        self.shared.acquired.set(false);
    }

    fn read_register(&self, offset: u32) -> u32 {
        self.shared.model.borrow().read(offset)
    }

    fn write_register(&self, offset: u32, value: u32) {
        self.shared.model.borrow_mut().write(offset, value);
    }

    fn start_operation(&self, preset: u32) -> SecEngResult<()> {
        self.shared.model.borrow_mut().start(preset);
        Ok(())
    }

    fn wait_engine_idle(&self) -> SecEngResult<()> {
        let mut model = self.shared.model.borrow_mut();
        if model.pending_timeout {
            model.pending_timeout = false;
            Err(SecEngError::DRIVER_ENGINE_TIMEOUT)?;
        }
        // Commands without a start, such as PKA bank writes, fault here.
        if let Some(err) = model.pending_fault.take() {
            model.status = err;
        }
        Ok(())
    }

    fn phys_addr(&self, buf: &[u8]) -> SecEngResult<u64> {
        let mut model = self.shared.model.borrow_mut();
        if model.dma_fault {
            Err(SecEngError::DRIVER_ENGINE_DMA_ADDRESS)?;
        }
        Ok(model.dma.map(buf))
    }

    fn dma_release(&self, addr: u64, out: Option<&mut [u8]>) {
        let data = self.shared.model.borrow_mut().dma.unmap(addr);
        if let (Some(data), Some(out)) = (data, out) {
            let len = data.len().min(out.len());
            out[..len].copy_from_slice(&data[..len]);
        }
    }
}
