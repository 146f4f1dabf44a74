use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use tokvault_core::{
    AttrList, Attribute, AttributeSlot, AttributeType, Error, LoadedHandle, LoginState,
    MechanismKind, ObjectClass, Pipeline, Registry, Result, Session, TrustModule,
};

fn secret_key_template(label: &str) -> Vec<Attribute> {
    vec![
        Attribute::class(ObjectClass::SECRET_KEY),
        Attribute::ulong(AttributeType::KEY_TYPE, 0x1f),
        Attribute::label(label),
        Attribute::new(AttributeType::PUBLIC_BLOB, b"B1".to_vec()),
        Attribute::new(AttributeType::PRIVATE_BLOB, b"P1".to_vec()),
        Attribute::new(AttributeType::WRAPPED_AUTH, b"W(pw)".to_vec()),
    ]
}

#[test]
fn test_object_lifecycle_flow() {
    let registry = Arc::new(Registry::new());
    let pipeline = Pipeline::new(registry.clone());
    let mut session = Session::with_login(LoginState::User);

    // Create a secret key backed by trust-module blobs and a wrapped auth value
    let handle = pipeline
        .create(&session, &secret_key_template("app-key"))
        .unwrap();

    // The object is discoverable by its label
    registry
        .find_init(&mut session, &[Attribute::label("app-key")])
        .unwrap();
    let found = registry.find(&mut session, 10).unwrap();
    registry.find_final(&mut session).unwrap();
    assert_eq!(found, vec![handle]);

    // An in-flight operation blocks destruction
    registry.usage_increment(handle, "sign").unwrap();
    let err = pipeline.destroy(&session, handle).unwrap_err();
    assert!(matches!(err, Error::ObjectInUse(_)));

    // The object survived the refused destroy fully intact
    let mut slots = [AttributeSlot::with_capacity(AttributeType::LABEL, 16)];
    registry.get_attributes(&session, handle, &mut slots).unwrap();
    assert_eq!(slots[0].value.as_deref(), Some(&b"app-key"[..]));

    // Release and destroy for real
    registry.usage_decrement(handle, "sign").unwrap();
    pipeline.destroy(&session, handle).unwrap();

    // The handle is permanently gone
    let mut slots = [AttributeSlot::query(AttributeType::LABEL)];
    let err = registry
        .get_attributes(&session, handle, &mut slots)
        .unwrap_err();
    assert!(matches!(err, Error::ObjectHandleInvalid(_)));
    assert!(registry.is_empty());
}

#[test]
fn test_context_specific_authentication() {
    let registry = Arc::new(Registry::new());
    let pipeline = Pipeline::new(registry.clone());
    let session = Session::with_login(LoginState::User);

    // A wrapped auth value in the template does not authenticate the object
    let handle = pipeline
        .create(&session, &secret_key_template("guarded"))
        .unwrap();
    let authed = registry.with_object(handle, |o| o.is_authenticated()).unwrap();
    assert!(!authed);

    // A context-specific login unseals the auth value
    registry
        .with_object_mut(handle, |o| o.set_auth(b"pw", b"W(pw)"))
        .unwrap()
        .unwrap();
    let authed = registry.with_object(handle, |o| o.is_authenticated()).unwrap();
    assert!(authed);

    // Ending the context drops the plaintext but keeps the wrapped form
    registry
        .with_object_mut(handle, |o| o.clear_unsealed_auth())
        .unwrap();
    registry
        .with_object(handle, |o| {
            assert!(!o.is_authenticated());
            assert_eq!(o.wrapped_auth(), Some(&b"W(pw)"[..]));
        })
        .unwrap();
}

#[test]
fn test_sessions_search_independently() {
    let registry = Arc::new(Registry::new());
    let pipeline = Pipeline::new(registry.clone());
    let mut s1 = Session::with_login(LoginState::User);
    let mut s2 = Session::with_login(LoginState::User);

    for label in ["a", "b", "c"] {
        let template = vec![Attribute::class(ObjectClass::DATA), Attribute::label(label)];
        pipeline.create(&s1, &template).unwrap();
    }

    registry.find_init(&mut s1, &[]).unwrap();
    registry.find_init(&mut s2, &[]).unwrap();

    // Interleaved reads do not disturb each other's cursor position
    let first = registry.find(&mut s1, 1).unwrap();
    let all = registry.find(&mut s2, 10).unwrap();
    let rest = registry.find(&mut s1, 10).unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(all.len(), 3);
    assert_eq!(rest.len(), 2);
    assert_eq!([&first[..], &rest[..]].concat(), all);

    registry.find_final(&mut s1).unwrap();
    registry.find_final(&mut s2).unwrap();
}

struct RecordingModule {
    loads: AtomicU32,
    unloads: AtomicU32,
}

impl RecordingModule {
    fn new() -> Self {
        Self {
            loads: AtomicU32::new(0),
            unloads: AtomicU32::new(0),
        }
    }
}

impl TrustModule for RecordingModule {
    fn load(
        &self,
        _public: &[u8],
        _private: Option<&[u8]>,
        _parent: Option<&[u8]>,
    ) -> Result<(LoadedHandle, Vec<u8>)> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((LoadedHandle::new(0x8100_0000 + n), b"ctx".to_vec()))
    }

    fn unload(&self, _handle: LoadedHandle) -> Result<()> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mechanism_supported(&self, _attrs: &AttrList, mechanism: MechanismKind) -> Result<()> {
        if mechanism == MechanismKind(0x1041) {
            Ok(())
        } else {
            Err(Error::TrustModule(format!("mechanism {mechanism} not supported")))
        }
    }

    fn minimum_buffer_size(&self, _attrs: &AttrList, _mechanism: MechanismKind) -> Result<usize> {
        Ok(256)
    }
}

#[test]
fn test_operation_load_flow() {
    let registry = Arc::new(Registry::new());
    let pipeline = Pipeline::new(registry.clone());
    let session = Session::with_login(LoginState::User);
    let module = RecordingModule::new();

    let handle = pipeline
        .create(&session, &secret_key_template("op-key"))
        .unwrap();

    // The caller checks mechanism capability before starting an operation
    registry
        .mechanism_supported(handle, &module, MechanismKind(0x1041))
        .unwrap();
    let err = registry
        .mechanism_supported(handle, &module, MechanismKind(0x9999))
        .unwrap_err();
    assert!(matches!(err, Error::TrustModule(_)));
    assert_eq!(
        registry
            .minimum_buffer_size(handle, &module, MechanismKind(0x1041))
            .unwrap(),
        256
    );

    // First use loads lazily; subsequent uses hit the cache
    let loaded = registry.ensure_loaded(handle, &module).unwrap();
    assert_eq!(registry.ensure_loaded(handle, &module).unwrap(), loaded);
    assert_eq!(module.loads.load(Ordering::SeqCst), 1);

    // Eviction unloads but keeps the serialized context for reload
    registry.evict(handle, &module).unwrap();
    assert_eq!(module.unloads.load(Ordering::SeqCst), 1);
    registry.ensure_loaded(handle, &module).unwrap();
    assert_eq!(module.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_create_and_search() {
    let registry = Arc::new(Registry::new());
    let pipeline = Arc::new(Pipeline::new(registry.clone()));

    let mut threads = Vec::new();
    for i in 0..4 {
        let pipeline = pipeline.clone();
        threads.push(thread::spawn(move || {
            let session = Session::with_login(LoginState::User);
            for j in 0..10 {
                let template = vec![
                    Attribute::class(ObjectClass::DATA),
                    Attribute::label(&format!("t{i}-{j}")),
                ];
                pipeline.create(&session, &template).unwrap();
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }

    let mut session = Session::with_login(LoginState::User);
    registry.find_init(&mut session, &[]).unwrap();
    assert_eq!(registry.find(&mut session, 100).unwrap().len(), 40);
    registry.find_final(&mut session).unwrap();
}
