/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    File contains helpers shared by the driver tests running against the
    engine emulator.

--*/

#![allow(dead_code)]

use seceng_drivers::{
    insert_key, Engine, EngineId, KacKeyArgs, KacPurpose, KacUser, SupportedFeatures,
};
use seceng_emu_periph::EmuEngine;

/// Features of a fully capable unified engine without native CMAC
pub fn full_features() -> SupportedFeatures {
    SupportedFeatures::all() - SupportedFeatures::HW_CMAC
}

/// Create an engine driven by the emulator. The second value is a handle on
/// the same emulated hardware for inspection.
pub fn emu_engine(id: EngineId, features: SupportedFeatures) -> (Engine<EmuEngine>, EmuEngine) {
    let hw = EmuEngine::new();
    (Engine::new(id, hw.clone(), features), hw)
}

pub fn aes_engine() -> (Engine<EmuEngine>, EmuEngine) {
    emu_engine(EngineId::Aes0, full_features())
}

pub fn key_args(purpose: KacPurpose) -> KacKeyArgs {
    KacKeyArgs {
        user: KacUser::Ns,
        purpose,
        sw_tag: 0x1234,
        exportable: false,
    }
}

/// Insert `key` into `keyslot`, panicking on failure
pub fn load_key(engine: &Engine<EmuEngine>, keyslot: u32, key: &[u8], purpose: KacPurpose) {
    insert_key(
        engine,
        keyslot,
        key,
        (key.len() * 8) as u32,
        key_args(purpose),
    )
    .unwrap();
}
