// Licensed under the Apache-2.0 license

mod harness;

use harness::{aes_engine, emu_engine, full_features, key_args, load_key};
use seceng_drivers::{
    clone_key, generate_key, insert_key, invalidate_keyslot, keyslot_op, lock_keyslot, EngineId,
    ErrorKind, KacCloneArgs, KacKeyArgs, KacManifest, KacOp, KacOpArgs, KacPurpose, KacUser,
    KeySize, SecEngError, SupportedFeatures,
};
use seceng_emu_periph::{ORIGIN_CLONED, ORIGIN_GENERATED, ORIGIN_INSERTED};

const ORIGIN_MASK: u32 = 0x7 << 9;

#[test]
fn test_insert_key_populates_keyslot() {
    let (engine, hw) = aes_engine();
    let key: [u8; 24] = core::array::from_fn(|i| i as u8 + 1);
    insert_key(&engine, 5, &key, 192, key_args(KacPurpose::Enc)).unwrap();

    let slot = hw.keyslot(5).unwrap();
    assert!(slot.valid);
    assert!(!slot.locked);
    assert_eq!(slot.key_bytes(), Some(&key[..]));
    assert_eq!(slot.origin(), ORIGIN_INSERTED);

    let expected = KacManifest {
        user: KacUser::Ns,
        purpose: KacPurpose::Enc,
        size: KeySize::Bits192,
        exportable: false,
        sw_tag: 0x1234,
    }
    .pack();
    assert_eq!(slot.manifest & !ORIGIN_MASK, expected);

    // Temporary key buffer is scrubbed after the command.
    assert_eq!(hw.key_buffer(), [0u32; 8]);
    assert!(!hw.is_acquired());
}

#[test]
fn test_keyslot_out_of_range_issues_no_command() {
    let (engine, hw) = aes_engine();
    let key = [0u8; 16];
    let errors = [
        insert_key(&engine, 16, &key, 128, key_args(KacPurpose::Enc)),
        generate_key(&engine, 40, 128, key_args(KacPurpose::Enc)),
        lock_keyslot(&engine, 16),
        invalidate_keyslot(&engine, 16),
        clone_key(
            &engine,
            16,
            0,
            KacCloneArgs {
                user: KacUser::Ns,
                sw_tag: 0,
                exportable: false,
            },
        ),
    ];
    for err in errors {
        assert_eq!(err, Err(SecEngError::DRIVER_KEYSLOT_OUT_OF_RANGE));
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidArgs);
    }
    assert_eq!(hw.commands(), 0);
    assert!(!hw.is_acquired());
}

#[test]
fn test_insert_rejects_bad_requests() {
    let (engine, hw) = aes_engine();
    let key = [0u8; 16];

    assert_eq!(
        insert_key(&engine, 0, &key, 256, key_args(KacPurpose::Enc)),
        Err(SecEngError::DRIVER_KAC_KEY_LEN_MISMATCH)
    );
    assert_eq!(
        insert_key(&engine, 0, &key, 100, key_args(KacPurpose::Enc)),
        Err(SecEngError::DRIVER_KAC_INVALID_KEY_SIZE)
    );
    let reserved = KacKeyArgs {
        user: KacUser::Reserved,
        ..key_args(KacPurpose::Enc)
    };
    assert_eq!(
        insert_key(&engine, 0, &key, 128, reserved),
        Err(SecEngError::DRIVER_KAC_INVALID_USER)
    );
    let big_tag = KacKeyArgs {
        sw_tag: 0x1_0000,
        ..key_args(KacPurpose::Enc)
    };
    assert_eq!(
        insert_key(&engine, 0, &key, 128, big_tag),
        Err(SecEngError::DRIVER_KAC_INVALID_SW_TAG)
    );
    assert_eq!(
        insert_key(&engine, 0, &key, 128, key_args(KacPurpose::Unknown)),
        Err(SecEngError::DRIVER_KAC_INVALID_PURPOSE)
    );

    let missing = KacOpArgs {
        op: KacOp::Insert,
        keyslot: 0,
        src_keyslot: 0,
        key: None,
        key_bits: 128,
        manifest: key_args(KacPurpose::Enc),
    };
    assert_eq!(
        keyslot_op(&engine, &missing),
        Err(SecEngError::DRIVER_KAC_MISSING_KEY_DATA)
    );
    let generate_with_key = KacOpArgs {
        op: KacOp::Generate,
        key: Some(&key),
        ..missing
    };
    assert_eq!(
        keyslot_op(&engine, &generate_with_key),
        Err(SecEngError::DRIVER_KAC_UNEXPECTED_KEY_DATA)
    );

    assert_eq!(hw.commands(), 0);
    assert!(!hw.keyslot(0).unwrap().valid);
}

#[test]
fn test_lock_blocks_writes_until_reset() {
    let (engine, hw) = aes_engine();
    load_key(&engine, 2, &[0x11u8; 16], KacPurpose::Enc);
    lock_keyslot(&engine, 2).unwrap();
    assert!(hw.keyslot(2).unwrap().locked);

    let err = insert_key(&engine, 2, &[0x22u8; 16], 128, key_args(KacPurpose::Enc));
    assert_eq!(err, Err(SecEngError::DRIVER_KAC_KEYSLOT_LOCKED));
    assert_eq!(err.unwrap_err().kind(), ErrorKind::EngineFault);
    assert_eq!(
        invalidate_keyslot(&engine, 2),
        Err(SecEngError::DRIVER_KAC_KEYSLOT_LOCKED)
    );
    assert_eq!(
        hw.keyslot(2).unwrap().key_bytes(),
        Some(&[0x11u8; 16][..])
    );
    assert_eq!(hw.key_buffer(), [0u32; 8]);

    hw.reset();
    load_key(&engine, 2, &[0x22u8; 16], KacPurpose::Enc);
    assert_eq!(
        hw.keyslot(2).unwrap().key_bytes(),
        Some(&[0x22u8; 16][..])
    );
}

#[test]
fn test_generate_key() {
    let (engine, hw) = aes_engine();
    generate_key(&engine, 7, 256, key_args(KacPurpose::Xts)).unwrap();

    let slot = hw.keyslot(7).unwrap();
    assert!(slot.valid);
    assert_eq!(slot.origin(), ORIGIN_GENERATED);
    assert_eq!(slot.purpose(), KacPurpose::Xts as u32);
    assert_eq!(slot.key_len(), Some(32));

    let (engine, hw) = emu_engine(
        EngineId::Aes1,
        full_features() - SupportedFeatures::KAC_GENERATE,
    );
    let err = generate_key(&engine, 7, 256, key_args(KacPurpose::Xts));
    assert_eq!(err, Err(SecEngError::DRIVER_KAC_GENERATE_UNSUPPORTED));
    assert_eq!(err.unwrap_err().kind(), ErrorKind::Unsupported);
    assert_eq!(hw.commands(), 0);
}

#[test]
fn test_clone_key() {
    let (engine, hw) = aes_engine();
    let key = [0x3cu8; 32];
    load_key(&engine, 1, &key, KacPurpose::Gcm);

    let args = KacCloneArgs {
        user: KacUser::Tz,
        sw_tag: 7,
        exportable: true,
    };
    clone_key(&engine, 9, 1, args).unwrap();
    let slot = hw.keyslot(9).unwrap();
    assert_eq!(slot.key_bytes(), Some(&key[..]));
    assert_eq!(slot.purpose(), KacPurpose::Gcm as u32);
    assert_eq!(slot.origin(), ORIGIN_CLONED);
    assert_eq!((slot.manifest >> 5) & 0x7, KacUser::Tz as u32);
    assert_eq!(slot.manifest >> 16, 7);

    assert_eq!(
        clone_key(&engine, 1, 1, args),
        Err(SecEngError::DRIVER_KAC_CLONE_SAME_KEYSLOT)
    );
    // Hardware reports the empty source.
    assert_eq!(
        clone_key(&engine, 4, 3, args),
        Err(SecEngError::DRIVER_KAC_OP_FAILED)
    );

    let (engine, hw) = emu_engine(
        EngineId::Aes0,
        full_features() - SupportedFeatures::KAC_CLONE,
    );
    assert_eq!(
        clone_key(&engine, 4, 3, args),
        Err(SecEngError::DRIVER_KAC_CLONE_UNSUPPORTED)
    );
    assert_eq!(hw.commands(), 0);
}

#[test]
fn test_lock_unsupported() {
    let (engine, hw) = emu_engine(EngineId::Sha, full_features() - SupportedFeatures::KAC_LOCK);
    assert_eq!(
        lock_keyslot(&engine, 0),
        Err(SecEngError::DRIVER_KAC_LOCK_UNSUPPORTED)
    );
    assert_eq!(hw.commands(), 0);
}

#[test]
fn test_invalidate_zeroes_keyslot() {
    let (engine, hw) = aes_engine();
    load_key(&engine, 3, &[0xeeu8; 16], KacPurpose::Enc);
    invalidate_keyslot(&engine, 3).unwrap();

    let slot = hw.keyslot(3).unwrap();
    assert!(!slot.valid);
    assert_eq!(slot.key, [0u8; 32]);
    assert_eq!(slot.manifest, 0);
}

#[test]
fn test_keyslot_op_requires_kac_engine() {
    let (engine, hw) = emu_engine(EngineId::Pka, full_features());
    assert_eq!(
        invalidate_keyslot(&engine, 0),
        Err(SecEngError::DRIVER_ENGINE_CLASS_MISMATCH)
    );
    assert!(!hw.is_acquired());
}

#[test]
fn test_timeout_releases_engine_and_scrubs_buffer() {
    let (engine, hw) = aes_engine();
    hw.inject_timeout();
    let err = insert_key(&engine, 0, &[0x77u8; 16], 128, key_args(KacPurpose::Enc));
    assert_eq!(err, Err(SecEngError::DRIVER_ENGINE_TIMEOUT));
    assert_eq!(err.unwrap_err().kind(), ErrorKind::Timeout);
    assert_eq!(hw.key_buffer(), [0u32; 8]);
    assert!(!hw.is_acquired());

    load_key(&engine, 0, &[0x77u8; 16], KacPurpose::Enc);
}
