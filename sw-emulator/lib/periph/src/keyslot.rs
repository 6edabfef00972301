/*++

Licensed under the Apache-2.0 license.

File Name:

    keyslot.rs

Abstract:

    File contains the keyslot table of the key access controller model.

--*/

use rand::RngCore;
use seceng_registers::{KAC_MANIFEST, STATUS};
use tock_registers::LocalRegisterCopy;

pub const KEYSLOT_COUNT: usize = 16;
pub const KEY_BYTES: usize = 32;

/// Manifest origin of a key inserted by software
pub const ORIGIN_INSERTED: u32 = 1;

/// Manifest origin of a key generated by the engine
pub const ORIGIN_GENERATED: u32 = 2;

/// Manifest origin of a cloned key
pub const ORIGIN_CLONED: u32 = 3;

/// Status error value of a failed command
pub type KacStatus = u32;

fn status(err: tock_registers::fields::FieldValue<u32, STATUS::Register>) -> KacStatus {
    err.value
}

/// One keyslot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keyslot {
    pub key: [u8; KEY_BYTES],
    pub manifest: u32,
    pub valid: bool,
    pub locked: bool,
}

impl Keyslot {
    fn manifest_reg(&self) -> LocalRegisterCopy<u32, KAC_MANIFEST::Register> {
        LocalRegisterCopy::new(self.manifest)
    }

    pub fn purpose(&self) -> u32 {
        self.manifest_reg().read(KAC_MANIFEST::PURPOSE)
    }

    pub fn origin(&self) -> u32 {
        self.manifest_reg().read(KAC_MANIFEST::ORIGIN)
    }

    /// Key length in bytes encoded in the manifest
    pub fn key_len(&self) -> Option<usize> {
        key_len(self.manifest)
    }

    /// Key bytes in use
    pub fn key_bytes(&self) -> Option<&[u8]> {
        if !self.valid {
            return None;
        }
        self.key_len().map(|len| &self.key[..len])
    }
}

fn key_len(manifest: u32) -> Option<usize> {
    let reg = LocalRegisterCopy::<u32, KAC_MANIFEST::Register>::new(manifest);
    match reg.read_as_enum(KAC_MANIFEST::SIZE) {
        Some(KAC_MANIFEST::SIZE::Value::KEY_128) => Some(16),
        Some(KAC_MANIFEST::SIZE::Value::KEY_192) => Some(24),
        Some(KAC_MANIFEST::SIZE::Value::KEY_256) => Some(32),
        None => None,
    }
}

fn with_origin(manifest: u32, origin: u32) -> u32 {
    let mut reg = LocalRegisterCopy::<u32, KAC_MANIFEST::Register>::new(manifest);
    reg.modify(KAC_MANIFEST::ORIGIN.val(origin));
    reg.get()
}

#[derive(Default)]
pub struct KeyslotTable {
    slots: [Keyslot; KEYSLOT_COUNT],
}

impl KeyslotTable {
    pub fn get(&self, idx: u32) -> Option<&Keyslot> {
        self.slots.get(idx as usize)
    }

    /// Valid keyslot usable by a cipher operation
    pub fn usable(&self, idx: u32) -> Result<&Keyslot, KacStatus> {
        match self.get(idx) {
            None => Err(status(STATUS::ERR::BAD_KEYSLOT)),
            Some(slot) if !slot.valid => Err(status(STATUS::ERR::KEYSLOT_EMPTY)),
            Some(slot) => Ok(slot),
        }
    }

    fn writable(&mut self, idx: u32) -> Result<&mut Keyslot, KacStatus> {
        let slot = self
            .slots
            .get_mut(idx as usize)
            .ok_or(status(STATUS::ERR::BAD_KEYSLOT))?;
        if slot.locked {
            Err(status(STATUS::ERR::KEYSLOT_LOCKED))?;
        }
        Ok(slot)
    }

    pub fn insert(
        &mut self,
        idx: u32,
        manifest: u32,
        lock: bool,
        key: &[u8; KEY_BYTES],
    ) -> Result<(), KacStatus> {
        let len = key_len(manifest).ok_or(status(STATUS::ERR::BAD_CONFIG))?;
        let slot = self.writable(idx)?;
        slot.key = [0u8; KEY_BYTES];
        slot.key[..len].copy_from_slice(&key[..len]);
        slot.manifest = with_origin(manifest, ORIGIN_INSERTED);
        slot.valid = true;
        slot.locked = lock;
        Ok(())
    }

    pub fn generate(&mut self, idx: u32, manifest: u32, lock: bool) -> Result<(), KacStatus> {
        let len = key_len(manifest).ok_or(status(STATUS::ERR::BAD_CONFIG))?;
        let slot = self.writable(idx)?;
        slot.key = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut slot.key[..len]);
        slot.manifest = with_origin(manifest, ORIGIN_GENERATED);
        slot.valid = true;
        slot.locked = lock;
        Ok(())
    }

    /// Copy the key of `src` into `dst`. Purpose and size come from the
    /// source manifest, user, exportable and software tag from `manifest`.
    pub fn clone_slot(
        &mut self,
        dst: u32,
        src: u32,
        manifest: u32,
        lock: bool,
    ) -> Result<(), KacStatus> {
        let source = *self.usable(src)?;
        let mut reg = LocalRegisterCopy::<u32, KAC_MANIFEST::Register>::new(manifest);
        let src_reg = LocalRegisterCopy::<u32, KAC_MANIFEST::Register>::new(source.manifest);
        reg.modify(
            KAC_MANIFEST::PURPOSE.val(src_reg.read(KAC_MANIFEST::PURPOSE))
                + KAC_MANIFEST::SIZE.val(src_reg.read(KAC_MANIFEST::SIZE))
                + KAC_MANIFEST::ORIGIN.val(ORIGIN_CLONED),
        );

        let slot = self.writable(dst)?;
        slot.key = source.key;
        slot.manifest = reg.get();
        slot.valid = true;
        slot.locked = lock;
        Ok(())
    }

    pub fn lock(&mut self, idx: u32) -> Result<(), KacStatus> {
        let slot = self
            .slots
            .get_mut(idx as usize)
            .ok_or(status(STATUS::ERR::BAD_KEYSLOT))?;
        slot.locked = true;
        Ok(())
    }

    pub fn invalidate(&mut self, idx: u32) -> Result<(), KacStatus> {
        let slot = self.writable(idx)?;
        *slot = Keyslot::default();
        Ok(())
    }

    /// Engine reset: every keyslot is erased and unlocked
    pub fn reset(&mut self) {
        self.slots = [Keyslot::default(); KEYSLOT_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_ENC_128: u32 = 1 << 5;
    const MANIFEST_XTS_256: u32 = 9 | (1 << 5) | (2 << 14);

    #[test]
    fn test_insert_sets_origin_and_length() {
        let mut table = KeyslotTable::default();
        let key = [0xa5u8; KEY_BYTES];
        table.insert(2, MANIFEST_ENC_128, false, &key).unwrap();

        let slot = table.get(2).unwrap();
        assert_eq!(slot.key_bytes(), Some(&key[..16]));
        assert_eq!(slot.key[16..], [0u8; 16]);
        assert_eq!(slot.origin(), ORIGIN_INSERTED);
    }

    #[test]
    fn test_locked_keyslot_rejects_writes_until_reset() {
        let mut table = KeyslotTable::default();
        let key = [1u8; KEY_BYTES];
        table.insert(0, MANIFEST_ENC_128, false, &key).unwrap();
        table.lock(0).unwrap();

        assert_eq!(
            table.insert(0, MANIFEST_ENC_128, false, &key),
            Err(STATUS::ERR::KEYSLOT_LOCKED.value)
        );
        assert!(table.invalidate(0).is_err());

        table.reset();
        assert!(table.insert(0, MANIFEST_ENC_128, false, &key).is_ok());
    }

    #[test]
    fn test_clone_copies_purpose_and_size() {
        let mut table = KeyslotTable::default();
        table.generate(4, MANIFEST_XTS_256, false).unwrap();
        table.clone_slot(5, 4, 3 << 5, false).unwrap();

        let src = *table.get(4).unwrap();
        let dst = *table.get(5).unwrap();
        assert_eq!(dst.key, src.key);
        assert_eq!(dst.purpose(), 9);
        assert_eq!(dst.key_len(), Some(32));
        assert_eq!(dst.origin(), ORIGIN_CLONED);

        assert_eq!(
            table.clone_slot(6, 7, 3 << 5, false),
            Err(STATUS::ERR::KEYSLOT_EMPTY.value)
        );
    }
}
