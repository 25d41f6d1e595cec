//! Loads the mock module as a shared library and drives it through the
//! interop layer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{
    env::{
        self,
        consts::{DLL_PREFIX, DLL_SUFFIX},
    },
    path::PathBuf,
};

use cosmian_logger::log_init;
use cosmian_pkcs11_interop::{
    FunctionTableStrategy, InteropError, InteropResult, NativeLibrary, NativeMechanism,
    ObjectAttribute, Pkcs11, Pkcs11Config, live_allocations,
};
use cosmian_pkcs11_mock_module::{EMPTY_SLOT_ID, TOKEN_SLOT_ID, USER_PIN};
use cosmian_pkcs11_sys::{
    CK_ULONG, CK_VERSION, CKA_CLASS, CKA_ID, CKA_KEY_TYPE, CKA_LABEL, CKA_SENSITIVE, CKA_VALUE,
    CKA_VALUE_LEN, CKF_RW_SESSION, CKK_AES, CKM_AES_KEY_GEN, CKM_SHA3_256, CKM_SHA256, CKO_DATA,
    CKR_ATTRIBUTE_VALUE_INVALID, CKR_CRYPTOKI_ALREADY_INITIALIZED, CKR_CRYPTOKI_NOT_INITIALIZED,
    CKR_FUNCTION_NOT_PARALLEL, CKR_FUNCTION_NOT_SUPPORTED, CKR_MECHANISM_INVALID,
    CKR_PIN_INCORRECT, CKR_SESSION_HANDLE_INVALID, CKR_TOKEN_NOT_PRESENT, CKS_RW_PUBLIC_SESSION,
    CKS_RW_USER_FUNCTIONS, CKU_USER,
};
use serial_test::serial;
use sha3::{Digest, Sha3_256};

/// The cdylib cargo builds next to the test executable.
fn mock_library_path() -> PathBuf {
    let name = format!("{DLL_PREFIX}cosmian_pkcs11_mock_module{DLL_SUFFIX}");
    let exe = env::current_exe().expect("no test executable path");
    exe.ancestors()
        .skip(1)
        .take(3)
        .map(|dir| dir.join(&name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("{name} not found near {}", exe.display()))
}

fn load(strategy: FunctionTableStrategy) -> InteropResult<Pkcs11> {
    log_init(Some("debug"));
    let config = Pkcs11Config::new(mock_library_path()).with_strategy(strategy);
    Pkcs11::load(&config)
}

fn load_initialized() -> InteropResult<Pkcs11> {
    let pkcs11 = load(FunctionTableStrategy::SelfDescribing)?;
    pkcs11.initialize()?;
    Ok(pkcs11)
}

fn rv_of<T: std::fmt::Debug>(result: InteropResult<T>) -> CK_ULONG {
    result
        .expect_err("the call should have failed")
        .rv()
        .expect("the error should carry a return value")
}

#[test]
#[serial]
fn test_both_strategies_resolve_every_entry_point() -> InteropResult<()> {
    for strategy in [
        FunctionTableStrategy::SelfDescribing,
        FunctionTableStrategy::PerSymbol,
    ] {
        let pkcs11 = load(strategy)?;
        let entries = pkcs11.functions().entries();
        assert_eq!(entries.len(), 68);
        assert!(entries.iter().all(|(_, address)| !address.is_null()));
        match strategy {
            FunctionTableStrategy::SelfDescribing => assert_eq!(
                pkcs11.functions().version(),
                Some(CK_VERSION {
                    major: 2,
                    minor: 40
                })
            ),
            FunctionTableStrategy::PerSymbol => assert_eq!(pkcs11.functions().version(), None),
        }

        pkcs11.initialize()?;
        let info = pkcs11.get_info()?;
        assert_eq!(info.cryptoki_version.to_string(), "2.40");
        assert_eq!(info.manufacturer_id, "Cosmian");
        assert_eq!(info.library_description, "Cosmian PKCS#11 mock module");
        pkcs11.finalize()?;
        pkcs11.unload()?;
    }
    Ok(())
}

#[test]
#[serial]
fn test_hello_world_label_through_the_self_describing_table() -> InteropResult<()> {
    let pkcs11 = load(FunctionTableStrategy::SelfDescribing)?;
    assert!(
        pkcs11
            .functions()
            .entries()
            .iter()
            .all(|(_, address)| !address.is_null())
    );

    let label = ObjectAttribute::from_string(CKA_LABEL, Some("Hello world"))?;
    assert_eq!(live_allocations(), 1);
    assert_eq!(label.get_string()?.as_deref(), Some("Hello world"));
    label.free();
    assert_eq!(live_allocations(), 0);

    pkcs11.unload()
}

#[test]
#[serial]
fn test_initialization_is_enforced() -> InteropResult<()> {
    let pkcs11 = load(FunctionTableStrategy::PerSymbol)?;
    assert_eq!(rv_of(pkcs11.get_info()), CKR_CRYPTOKI_NOT_INITIALIZED);
    pkcs11.initialize()?;
    assert_eq!(rv_of(pkcs11.initialize()), CKR_CRYPTOKI_ALREADY_INITIALIZED);
    pkcs11.finalize()?;
    assert_eq!(rv_of(pkcs11.finalize()), CKR_CRYPTOKI_NOT_INITIALIZED);
    Ok(())
}

#[test]
#[serial]
fn test_slots_tokens_and_mechanisms() -> InteropResult<()> {
    let pkcs11 = load_initialized()?;

    assert_eq!(pkcs11.get_slot_list(true)?, vec![TOKEN_SLOT_ID]);
    assert_eq!(pkcs11.get_slot_list(false)?, vec![TOKEN_SLOT_ID, EMPTY_SLOT_ID]);
    assert!(pkcs11.get_slot_info(TOKEN_SLOT_ID)?.token_present());
    assert!(!pkcs11.get_slot_info(EMPTY_SLOT_ID)?.token_present());

    let token = pkcs11.get_token_info(TOKEN_SLOT_ID)?;
    assert_eq!(token.label, "Cosmian mock token");
    assert_eq!(token.session_count, 0);
    assert_eq!(rv_of(pkcs11.get_token_info(EMPTY_SLOT_ID)), CKR_TOKEN_NOT_PRESENT);

    let mechanisms = pkcs11.get_mechanism_list(TOKEN_SLOT_ID)?;
    assert_eq!(mechanisms.len(), 3);
    assert!(mechanisms.contains(&CKM_SHA3_256));
    let aes = pkcs11.get_mechanism_info(TOKEN_SLOT_ID, CKM_AES_KEY_GEN)?;
    assert_eq!((aes.min_key_size, aes.max_key_size), (16, 32));
    assert_eq!(
        rv_of(pkcs11.get_mechanism_info(TOKEN_SLOT_ID, CKM_SHA256)),
        CKR_MECHANISM_INVALID
    );

    pkcs11.finalize()
}

#[test]
#[serial]
fn test_object_lifecycle() -> InteropResult<()> {
    let pkcs11 = load_initialized()?;
    let baseline = live_allocations();

    let session = pkcs11.open_session(TOKEN_SLOT_ID, CKF_RW_SESSION)?;
    assert_eq!(pkcs11.get_session_info(session)?.state, CKS_RW_PUBLIC_SESSION);
    assert_eq!(
        rv_of(pkcs11.login(session, CKU_USER, Some(b"0000"))),
        CKR_PIN_INCORRECT
    );
    pkcs11.login(session, CKU_USER, Some(USER_PIN))?;
    assert_eq!(pkcs11.get_session_info(session)?.state, CKS_RW_USER_FUNCTIONS);

    let object = pkcs11.create_object(
        session,
        &[
            ObjectAttribute::from_ulong(CKA_CLASS, CKO_DATA)?,
            ObjectAttribute::from_string(CKA_LABEL, Some("Hello world"))?,
            ObjectAttribute::from_bytes(CKA_VALUE, Some(b"payload"))?,
        ],
    )?;

    let attributes = pkcs11.get_attribute_value(session, object, &[CKA_LABEL, CKA_VALUE, CKA_ID])?;
    assert_eq!(attributes[0].get_string()?.as_deref(), Some("Hello world"));
    assert_eq!(attributes[1].get_bytes()?, Some(b"payload".to_vec()));
    assert!(!attributes[2].has_value());
    drop(attributes);

    pkcs11.set_attribute_value(
        session,
        object,
        &[ObjectAttribute::from_string(CKA_LABEL, Some("Renamed"))?],
    )?;
    let renamed = [ObjectAttribute::from_string(CKA_LABEL, Some("Renamed"))?];
    assert_eq!(pkcs11.find_objects(session, &renamed)?, vec![object]);
    let original = [ObjectAttribute::from_string(CKA_LABEL, Some("Hello world"))?];
    assert!(pkcs11.find_objects(session, &original)?.is_empty());
    assert_eq!(
        pkcs11.get_object_size(session, object)?,
        CK_ULONG::try_from(size_of::<CK_ULONG>() + "Renamed".len() + "payload".len())?
    );

    pkcs11.destroy_object(session, object)?;
    assert!(pkcs11.find_objects(session, &[])?.is_empty());
    drop((renamed, original));

    pkcs11.logout(session)?;
    pkcs11.close_session(session)?;
    assert_eq!(rv_of(pkcs11.get_session_info(session)), CKR_SESSION_HANDLE_INVALID);
    assert_eq!(live_allocations(), baseline);

    pkcs11.finalize()
}

#[test]
#[serial]
fn test_digest_key_generation_and_random() -> InteropResult<()> {
    let pkcs11 = load_initialized()?;
    let session = pkcs11.open_session(TOKEN_SLOT_ID, CKF_RW_SESSION)?;

    let digest = pkcs11.digest(session, &NativeMechanism::new(CKM_SHA3_256), b"abc")?;
    assert_eq!(digest, Sha3_256::digest(b"abc").to_vec());
    assert_eq!(
        rv_of(pkcs11.digest(session, &NativeMechanism::new(CKM_SHA256), b"abc")),
        CKR_MECHANISM_INVALID
    );

    let key = pkcs11.generate_key(
        session,
        &NativeMechanism::new(CKM_AES_KEY_GEN),
        &[
            ObjectAttribute::from_ulong(CKA_VALUE_LEN, 32)?,
            ObjectAttribute::from_string(CKA_LABEL, Some("aes key"))?,
        ],
    )?;
    let attributes =
        pkcs11.get_attribute_value(session, key, &[CKA_VALUE, CKA_KEY_TYPE, CKA_SENSITIVE])?;
    assert!(!attributes[0].has_value());
    assert_eq!(attributes[1].get_ulong()?, Some(CKK_AES));
    assert_eq!(attributes[2].get_bool()?, Some(true));
    assert_eq!(
        rv_of(pkcs11.generate_key(
            session,
            &NativeMechanism::new(CKM_AES_KEY_GEN),
            &[ObjectAttribute::from_ulong(CKA_VALUE_LEN, 20)?],
        )),
        CKR_ATTRIBUTE_VALUE_INVALID
    );
    assert_eq!(
        rv_of(pkcs11.sign(session, &NativeMechanism::new(CKM_SHA256), key, b"data")),
        CKR_FUNCTION_NOT_SUPPORTED
    );

    pkcs11.seed_random(session, b"seed")?;
    let first = pkcs11.generate_random(session, 48)?;
    let second = pkcs11.generate_random(session, 48)?;
    assert_eq!(first.len(), 48);
    assert_ne!(first, second);

    assert_eq!(pkcs11.wait_for_slot_event(false)?, None);
    assert_eq!(pkcs11.get_function_status(session), CKR_FUNCTION_NOT_PARALLEL);
    assert_eq!(pkcs11.cancel_function(session), CKR_FUNCTION_NOT_PARALLEL);

    pkcs11.close_all_sessions(TOKEN_SLOT_ID)?;
    pkcs11.finalize()
}

#[test]
#[serial]
fn test_unloaded_library_is_unusable() -> InteropResult<()> {
    log_init(None);
    let mut library = NativeLibrary::load(mock_library_path())?;
    assert!(library.is_loaded());
    assert!(!library.resolve_symbol("C_GetFunctionList")?.is_null());

    library.unload()?;
    assert!(!library.is_loaded());
    assert!(matches!(library.unload(), Err(InteropError::LibraryNotLoaded)));
    assert!(matches!(
        library.resolve_symbol("C_Initialize"),
        Err(InteropError::LibraryNotLoaded)
    ));
    Ok(())
}
