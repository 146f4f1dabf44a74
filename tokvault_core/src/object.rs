//! The in-memory token object.
//!
//! A [`TokenObject`] binds an attribute store to the trust-module blobs and
//! wrapped authorization secret that back it, plus the transient loaded-handle
//! cache. Identity fields are assigned by the registry at registration; the
//! usage counter is mutated only inside the registry's lock domain.

use zeroize::Zeroizing;

use crate::attrs::{try_copy, AttrList, AttributeType};
use crate::error::Result;
use crate::id::{LoadedHandle, ObjectHandle, ObjectId};

/// Whether an object stands alone or is the public-facing link to another
/// object's attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Standalone,
    /// This object is a link; attribute queries answer with the public
    /// attributes of the linked object.
    LinkedTo(ObjectId),
}

/// A token object managed by the provider.
#[derive(Default)]
pub struct TokenObject {
    id: ObjectId,
    handle: Option<ObjectHandle>,
    kind: Option<ObjectId>,
    public_blob: Option<Vec<u8>>,
    private_blob: Option<Vec<u8>>,
    wrapped_auth: Option<Zeroizing<Vec<u8>>>,
    unsealed_auth: Option<Zeroizing<Vec<u8>>>,
    attrs: AttrList,
    loaded_handle: Option<LoadedHandle>,
    serialized_context: Vec<u8>,
    pub(crate) usage: u32,
}

impl TokenObject {
    /// Create an empty object: no blobs, no auth, usage 0, not loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense internal identity. Zero until the registry assigns one.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    /// External handle, once registered.
    pub fn handle(&self) -> Option<ObjectHandle> {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: ObjectHandle) {
        self.handle = Some(handle);
    }

    pub fn kind(&self) -> ObjectKind {
        match self.kind {
            Some(target) => ObjectKind::LinkedTo(target),
            None => ObjectKind::Standalone,
        }
    }

    /// Turn this object into the public-facing link for `target`.
    pub fn link_to(&mut self, target: ObjectId) {
        self.kind = Some(target);
    }

    /// The object's own attribute store.
    ///
    /// Link objects are resolved at the registry level; this accessor never
    /// follows the link.
    pub fn attrs(&self) -> &AttrList {
        &self.attrs
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut AttrList {
        &mut self.attrs
    }

    pub(crate) fn set_attrs(&mut self, attrs: AttrList) {
        self.attrs = attrs;
    }

    /// Set the trust-module blob fields via deep copy, mirroring them into
    /// the vendor attribute entries. The public portion is required; the
    /// caller keeps ownership of its own buffers.
    pub fn set_blob_data(&mut self, public: &[u8], private: Option<&[u8]>) -> Result<()> {
        let public_copy = try_copy(public)?;
        let private_copy = private.map(try_copy).transpose()?;

        self.attrs.insert(AttributeType::PUBLIC_BLOB, public)?;
        if let Some(private) = private {
            self.attrs.insert(AttributeType::PRIVATE_BLOB, private)?;
        }

        self.public_blob = Some(public_copy);
        if private_copy.is_some() {
            self.private_blob = private_copy;
        }
        Ok(())
    }

    /// Set the authorization secret via deep copy: the plaintext value goes
    /// to transient unsealed storage, the wrapped value to at-rest storage
    /// and its vendor attribute entry.
    pub fn set_auth(&mut self, plain: &[u8], wrapped: &[u8]) -> Result<()> {
        let plain_copy = Zeroizing::new(try_copy(plain)?);
        let wrapped_copy = Zeroizing::new(try_copy(wrapped)?);

        self.attrs.insert(AttributeType::WRAPPED_AUTH, wrapped)?;

        self.unsealed_auth = Some(plain_copy);
        self.wrapped_auth = Some(wrapped_copy);
        Ok(())
    }

    /// Set only the wrapped authorization secret, leaving the object
    /// unauthenticated. Used when an already-wrapped value arrives in a
    /// creation template.
    pub fn set_wrapped_auth(&mut self, wrapped: &[u8]) -> Result<()> {
        let wrapped_copy = Zeroizing::new(try_copy(wrapped)?);
        self.attrs.insert(AttributeType::WRAPPED_AUTH, wrapped)?;
        self.wrapped_auth = Some(wrapped_copy);
        Ok(())
    }

    /// Drop the plaintext authorization secret (zeroizing its backing
    /// memory). Called when the authenticated context ends.
    pub fn clear_unsealed_auth(&mut self) {
        self.unsealed_auth = None;
    }

    /// True exactly when the plaintext authorization secret is populated.
    pub fn is_authenticated(&self) -> bool {
        self.unsealed_auth.is_some()
    }

    pub fn public_blob(&self) -> Option<&[u8]> {
        self.public_blob.as_deref()
    }

    pub fn private_blob(&self) -> Option<&[u8]> {
        self.private_blob.as_deref()
    }

    pub fn wrapped_auth(&self) -> Option<&[u8]> {
        self.wrapped_auth.as_deref().map(Vec::as_slice)
    }

    pub fn unsealed_auth(&self) -> Option<&[u8]> {
        self.unsealed_auth.as_deref().map(Vec::as_slice)
    }

    /// Cached trust-module handle, when the object is loaded.
    pub fn loaded_handle(&self) -> Option<LoadedHandle> {
        self.loaded_handle
    }

    /// Serialized loaded context; empty if the object was never loaded.
    pub fn serialized_context(&self) -> &[u8] {
        &self.serialized_context
    }

    /// Cache the trust module's handle and serialized context after a load.
    pub fn set_loaded(&mut self, handle: LoadedHandle, serialized: &[u8]) -> Result<()> {
        self.serialized_context = try_copy(serialized)?;
        self.loaded_handle = Some(handle);
        Ok(())
    }

    /// Forget the loaded handle. The serialized context is kept so the
    /// object can be reloaded without re-deriving key material.
    pub fn clear_loaded(&mut self) {
        self.loaded_handle = None;
    }

    /// Current usage count.
    pub fn usage_count(&self) -> u32 {
        self.usage
    }
}

// Auth values never reach log output.
impl std::fmt::Debug for TokenObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenObject")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("kind", &self.kind())
            .field("attrs", &self.attrs.len())
            .field("loaded_handle", &self.loaded_handle)
            .field("usage", &self.usage)
            .field("is_authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
