//! The registry of live token objects.
//!
//! One [`Registry`] exists per open token domain and is shared across
//! sessions behind an `Arc`. A single mutex over the whole inner state is the
//! mutual-exclusion domain for registration, lookup, attribute access, usage
//! counting, and destruction: the destroy path's busy check runs under the
//! same lock that guards usage increments, so an in-flight operation can
//! never lose its object, and a lookup can never observe a partially
//! destroyed one.

pub(crate) mod search;

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::attrs::{AttrList, Attribute, AttributeSlot, AttributeType};
use crate::error::{Error, Result, Violation};
use crate::id::{LoadedHandle, ObjectHandle, ObjectId};
use crate::object::{ObjectKind, TokenObject};
use crate::session::Session;
use crate::trust::{MechanismKind, TrustModule};

/// Attribute types whose values never leave the object through the query
/// interface, even though they live in the attribute store.
const CONCEALED: &[AttributeType] = &[AttributeType::WRAPPED_AUTH];

/// Attribute types fixed at creation time; rejected on the update path.
const READ_ONLY: &[AttributeType] = &[
    AttributeType::CLASS,
    AttributeType::KEY_TYPE,
    AttributeType::TOKEN,
    AttributeType::PRIVATE,
    AttributeType::PUBLIC_BLOB,
    AttributeType::PRIVATE_BLOB,
    AttributeType::WRAPPED_AUTH,
];

pub(crate) struct RegistryInner {
    by_handle: HashMap<ObjectHandle, TokenObject>,
    by_id: HashMap<ObjectId, ObjectHandle>,
    /// Handles in registration order; search results follow this order.
    order: Vec<ObjectHandle>,
    next_id: u64,
}

impl RegistryInner {
    /// Resolve a handle for a session, treating private-class objects as
    /// absent when the session is not logged in.
    fn resolve(&self, session: &Session, handle: ObjectHandle) -> Result<&TokenObject> {
        self.by_handle
            .get(&handle)
            .filter(|obj| visible(obj, session))
            .ok_or(Error::ObjectHandleInvalid(handle))
    }

    /// Handle of the object whose attributes answer queries against
    /// `handle`: the object itself, or the target it links to.
    fn effective_handle(&self, handle: ObjectHandle) -> Result<ObjectHandle> {
        let Some(obj) = self.by_handle.get(&handle) else {
            return Err(Error::ObjectHandleInvalid(handle));
        };
        match obj.kind() {
            ObjectKind::Standalone => Ok(handle),
            ObjectKind::LinkedTo(target) => self.by_id.get(&target).copied().ok_or_else(|| {
                let violation = Violation::new("resolve_link", Some(target));
                error!(%violation, "link target is not registered");
                Error::General(violation)
            }),
        }
    }

    /// Attributes answering queries against `obj`, following a link when the
    /// object carries one. `None` when the link dangles.
    pub(crate) fn effective_attrs<'a>(&'a self, obj: &'a TokenObject) -> Option<&'a AttrList> {
        match obj.kind() {
            ObjectKind::Standalone => Some(obj.attrs()),
            ObjectKind::LinkedTo(target) => self
                .by_id
                .get(&target)
                .and_then(|handle| self.by_handle.get(handle))
                .map(|linked| linked.attrs()),
        }
    }

    pub(crate) fn order(&self) -> &[ObjectHandle] {
        &self.order
    }

    pub(crate) fn get(&self, handle: ObjectHandle) -> Option<&TokenObject> {
        self.by_handle.get(&handle)
    }
}

/// Whether `session` may observe `obj` at all.
pub(crate) fn visible(obj: &TokenObject, session: &Session) -> bool {
    session.is_user_logged_in() || !obj.attrs().is_private()
}

/// The shared, explicitly constructed store of live token objects.
pub struct Registry {
    pub(crate) inner: Mutex<RegistryInner>,
}

impl Registry {
    /// Create an empty registry for one open token domain.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                by_handle: HashMap::new(),
                by_id: HashMap::new(),
                order: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Register a fully built object, assigning its internal identity and
    /// external handle. The handle namespace is disjoint from the dense id
    /// sequence and handles are never reused.
    pub fn register(&self, mut object: TokenObject) -> Result<ObjectHandle> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ObjectId::new(inner.next_id);
        let handle = ObjectHandle::new();
        object.set_id(id);
        object.set_handle(handle);

        inner.by_id.insert(id, handle);
        inner.by_handle.insert(handle, object);
        inner.order.push(handle);
        debug!(%id, %handle, "registered token object");
        Ok(handle)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.inner.lock().by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of all live objects in registration order.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.inner.lock().order.clone()
    }

    /// Fetch attribute values into the caller's template slots.
    ///
    /// Resolution follows link objects. Per-slot failures do not stop the
    /// batch: every satisfiable slot is still sized and filled, and the
    /// first failure code is surfaced to the caller.
    pub fn get_attributes(
        &self,
        session: &Session,
        handle: ObjectHandle,
        slots: &mut [AttributeSlot],
    ) -> Result<()> {
        let inner = self.inner.lock();
        inner.resolve(session, handle)?;
        let effective = inner.effective_handle(handle)?;
        let attrs = inner
            .by_handle
            .get(&effective)
            .map(TokenObject::attrs)
            .ok_or(Error::ObjectHandleInvalid(effective))?;

        let mut first_failure = None;
        for slot in slots.iter_mut() {
            let outcome = if CONCEALED.contains(&slot.kind) {
                slot.length = None;
                Err(Error::AttributeTypeInvalid(slot.kind))
            } else {
                attrs.read_into(slot)
            };
            if let Err(err) = outcome {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Update attribute values from the caller's template.
    ///
    /// Resolution follows link objects. Read-only and unrecognized types are
    /// rejected per entry; remaining entries are still applied and the first
    /// failure code is surfaced.
    pub fn set_attributes(
        &self,
        session: &Session,
        handle: ObjectHandle,
        template: &[Attribute],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.resolve(session, handle)?;
        let effective = inner.effective_handle(handle)?;

        let mut first_failure = None;
        for attr in template {
            let outcome = if READ_ONLY.contains(&attr.kind) || !attr.kind.is_recognized() {
                Err(Error::AttributeTypeInvalid(attr.kind))
            } else {
                inner
                    .by_handle
                    .get_mut(&effective)
                    .ok_or(Error::ObjectHandleInvalid(effective))
                    .and_then(|obj| obj.attrs_mut().insert(attr.kind, &attr.value))
            };
            if let Err(err) = outcome {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Mark an object as in use by an operation.
    ///
    /// Bracketing an object that is not live in the registry is a caller
    /// contract violation, reported as [`Error::General`] with a diagnostic
    /// rather than as an ordinary lookup miss.
    pub fn usage_increment(&self, handle: ObjectHandle, operation: &'static str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.by_handle.get_mut(&handle) {
            Some(obj) => {
                obj.usage += 1;
                debug!(id = %obj.id(), usage = obj.usage, operation, "usage incremented");
                Ok(())
            }
            None => {
                let violation = Violation::new(operation, None);
                error!(%violation, "usage increment on unresolvable handle");
                Err(Error::General(violation))
            }
        }
    }

    /// Mark an object as no longer in use by an operation.
    ///
    /// Decrementing past zero indicates a double release of an in-flight
    /// operation; the count stays at zero and the defect is surfaced loudly.
    pub fn usage_decrement(&self, handle: ObjectHandle, operation: &'static str) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.by_handle.get_mut(&handle) {
            Some(obj) => {
                if obj.usage == 0 {
                    let violation = Violation::new(operation, Some(obj.id()));
                    error!(%violation, "usage decrement below zero");
                    return Err(Error::General(violation));
                }
                obj.usage -= 1;
                debug!(id = %obj.id(), usage = obj.usage, operation, "usage decremented");
                Ok(())
            }
            None => {
                let violation = Violation::new(operation, None);
                error!(%violation, "usage decrement on unresolvable handle");
                Err(Error::General(violation))
            }
        }
    }

    /// Current usage count of an object.
    pub fn usage_count(&self, handle: ObjectHandle) -> Result<u32> {
        let inner = self.inner.lock();
        inner
            .by_handle
            .get(&handle)
            .map(TokenObject::usage_count)
            .ok_or(Error::ObjectHandleInvalid(handle))
    }

    /// Unregister and drop an object.
    ///
    /// Refused while any operation still holds the object; the busy check
    /// and the removal happen under the registry lock, so no increment can
    /// slip in between. Secret-bearing buffers zeroize on drop.
    pub(crate) fn destroy(&self, session: &Session, handle: ObjectHandle) -> Result<()> {
        let removed = {
            let mut inner = self.inner.lock();
            let obj = inner.resolve(session, handle)?;
            if obj.usage > 0 {
                warn!(id = %obj.id(), usage = obj.usage, "destroy refused, object in use");
                return Err(Error::ObjectInUse(handle));
            }
            let Some(obj) = inner.by_handle.remove(&handle) else {
                return Err(Error::ObjectHandleInvalid(handle));
            };
            inner.by_id.remove(&obj.id());
            inner.order.retain(|h| *h != handle);
            obj
        };
        info!(id = %removed.id(), %handle, "destroyed token object");
        Ok(())
    }

    /// Run `f` with shared access to an object, under the registry lock.
    ///
    /// Collaborator-level access for the operation engine and session
    /// manager; not gated by session visibility.
    pub fn with_object<R>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&TokenObject) -> R,
    ) -> Result<R> {
        let inner = self.inner.lock();
        inner
            .by_handle
            .get(&handle)
            .map(f)
            .ok_or(Error::ObjectHandleInvalid(handle))
    }

    /// Run `f` with exclusive access to an object, under the registry lock.
    pub fn with_object_mut<R>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&mut TokenObject) -> R,
    ) -> Result<R> {
        let mut inner = self.inner.lock();
        inner
            .by_handle
            .get_mut(&handle)
            .map(f)
            .ok_or(Error::ObjectHandleInvalid(handle))
    }

    /// Ensure the object's key material is loaded in the trust module,
    /// loading it lazily on first use and reusing the serialized context
    /// from earlier loads.
    pub fn ensure_loaded(
        &self,
        handle: ObjectHandle,
        module: &dyn TrustModule,
    ) -> Result<LoadedHandle> {
        let mut inner = self.inner.lock();
        let Some(obj) = inner.by_handle.get_mut(&handle) else {
            return Err(Error::ObjectHandleInvalid(handle));
        };
        if let Some(loaded) = obj.loaded_handle() {
            return Ok(loaded);
        }
        let Some(public) = obj.public_blob() else {
            let violation = Violation::new("load", Some(obj.id()));
            error!(%violation, "object has no public blob to load");
            return Err(Error::General(violation));
        };
        let parent = obj.serialized_context();
        let parent = (!parent.is_empty()).then_some(parent);
        let (loaded, serialized) = module.load(public, obj.private_blob(), parent)?;
        obj.set_loaded(loaded, &serialized)?;
        debug!(id = %obj.id(), %loaded, "loaded object into trust module");
        Ok(loaded)
    }

    /// Unload the object from the trust module, keeping the serialized
    /// context so a later [`Registry::ensure_loaded`] is cheap.
    pub fn evict(&self, handle: ObjectHandle, module: &dyn TrustModule) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(obj) = inner.by_handle.get_mut(&handle) else {
            return Err(Error::ObjectHandleInvalid(handle));
        };
        if let Some(loaded) = obj.loaded_handle() {
            module.unload(loaded)?;
            obj.clear_loaded();
            debug!(id = %obj.id(), "evicted object from trust module");
        }
        Ok(())
    }

    /// Whether the trust module can execute `mechanism` against this
    /// object. The core stores the attributes the module needs; the
    /// capability decision is the module's.
    pub fn mechanism_supported(
        &self,
        handle: ObjectHandle,
        module: &dyn TrustModule,
        mechanism: MechanismKind,
    ) -> Result<()> {
        let inner = self.inner.lock();
        let Some(obj) = inner.by_handle.get(&handle) else {
            return Err(Error::ObjectHandleInvalid(handle));
        };
        module.mechanism_supported(obj.attrs(), mechanism)
    }

    /// Minimum output buffer callers must provide before invoking
    /// `mechanism` against this object.
    pub fn minimum_buffer_size(
        &self,
        handle: ObjectHandle,
        module: &dyn TrustModule,
        mechanism: MechanismKind,
    ) -> Result<usize> {
        let inner = self.inner.lock();
        let Some(obj) = inner.by_handle.get(&handle) else {
            return Err(Error::ObjectHandleInvalid(handle));
        };
        module.minimum_buffer_size(obj.attrs(), mechanism)
    }

    /// Tear down the registry, dropping every object. Secret-bearing
    /// buffers zeroize on drop.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_handle.clear();
        inner.by_id.clear();
        inner.order.clear();
        info!("registry cleared");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
