//! # tokvault_core
//!
//! `tokvault_core` is the object-management core of a trust-module-backed
//! cryptographic token provider: the secret material and the cryptographic
//! primitives live in external hardware, while this crate owns object
//! identity, attribute storage, search, and the create/destroy lifecycle.
//!
//! Key concepts:
//!
//! 1. **Token object**: an addressable cryptographic object (key,
//!    certificate, data) combining an attribute store with the trust-module
//!    blobs and wrapped authorization secret that back it.
//!
//! 2. **Registry**: the shared store of live objects for one open token
//!    domain. One lock domain covers lookup, usage counting, and
//!    destruction, so a lookup can never observe a partially destroyed
//!    object.
//!
//! 3. **Search**: the per-session Idle → Searching → Idle protocol that
//!    snapshots template matches and serves them in registration order.
//!
//! 4. **Pipeline**: template validation, the pluggable creation hook, and
//!    all-or-nothing registration/teardown.

pub mod attrs;
pub mod error;
pub mod id;
pub mod object;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod trust;

// Re-export key types and traits for convenience
pub use attrs::{AttrList, Attribute, AttributeSlot, AttributeType, ObjectClass};
pub use error::{Error, Result, Violation};
pub use id::{LoadedHandle, ObjectHandle, ObjectId, SessionId};
pub use object::{ObjectKind, TokenObject};
pub use pipeline::{NoopInitializer, ObjectInitializer, Pipeline};
pub use session::{LoginState, Session};
pub use store::Registry;
pub use trust::{MechanismKind, TrustModule};
