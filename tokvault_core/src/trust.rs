//! Interface to the trust-module transport collaborator.
//!
//! The core never talks to the hardware itself; it stores and serves the
//! blobs and handles these calls need. Implementations of [`TrustModule`]
//! live in the transport layer and are injected where the registry needs to
//! load or unload key material.

use crate::attrs::AttrList;
use crate::error::Result;
use crate::id::LoadedHandle;

/// A cryptographic mechanism identifier from the token-interface vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MechanismKind(pub u64);

impl std::fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// The trust-module transport seam.
///
/// From this core's perspective every call is synchronous and may fail;
/// failures surface as [`crate::Error::TrustModule`].
pub trait TrustModule: Send + Sync {
    /// Load the object's key material into the module.
    ///
    /// `parent` is the serialized context of a previous load, when one
    /// exists, letting the module skip re-deriving key material. Returns the
    /// transient module handle and the serialized context to cache for the
    /// next load.
    fn load(
        &self,
        public: &[u8],
        private: Option<&[u8]>,
        parent: Option<&[u8]>,
    ) -> Result<(LoadedHandle, Vec<u8>)>;

    /// Release a previously loaded handle.
    fn unload(&self, handle: LoadedHandle) -> Result<()>;

    /// Whether the module can execute `mechanism` against an object with the
    /// given attributes.
    fn mechanism_supported(&self, attrs: &AttrList, mechanism: MechanismKind) -> Result<()>;

    /// Minimum output buffer size callers must provide for `mechanism`
    /// against an object with the given attributes.
    fn minimum_buffer_size(&self, attrs: &AttrList, mechanism: MechanismKind) -> Result<usize>;
}
