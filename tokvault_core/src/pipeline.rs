//! Object creation and destruction.
//!
//! The pipeline validates a caller template, builds the token object, runs
//! the injected [`ObjectInitializer`] hook, and only then registers the
//! object. Both creation and destruction are all-or-nothing with respect to
//! registry membership: a failure anywhere leaves no trace.

use std::sync::Arc;
use tracing::{debug, info};

use crate::attrs::{try_copy, AttrList, Attribute, AttributeType, ObjectClass};
use crate::error::{Error, Result};
use crate::id::ObjectHandle;
use crate::object::TokenObject;
use crate::session::Session;
use crate::store::Registry;

/// Creation-time hook for deriving or importing trust-module key material
/// from a freshly built object's attributes.
///
/// Runs after the object is fully populated but before it is registered, so
/// a failing hook means the handle never existed. The default implementation
/// is [`NoopInitializer`]; production providers plug in trust-module key
/// derivation here.
pub trait ObjectInitializer: Send + Sync {
    fn initialize(&self, object: &mut TokenObject) -> Result<()>;
}

/// Initializer that accepts every object unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInitializer;

impl ObjectInitializer for NoopInitializer {
    fn initialize(&self, _object: &mut TokenObject) -> Result<()> {
        Ok(())
    }
}

/// The creation/destruction pipeline over one registry.
pub struct Pipeline {
    registry: Arc<Registry>,
    initializer: Box<dyn ObjectInitializer>,
}

impl Pipeline {
    /// Pipeline with the no-op initializer.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_initializer(registry, Box::new(NoopInitializer))
    }

    /// Pipeline with an injected initializer.
    pub fn with_initializer(
        registry: Arc<Registry>,
        initializer: Box<dyn ObjectInitializer>,
    ) -> Self {
        Self {
            registry,
            initializer,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validate a template, build the object, run the initializer, register,
    /// and return the new handle.
    pub fn create(&self, session: &Session, template: &[Attribute]) -> Result<ObjectHandle> {
        let attrs = validate_template(template)?;

        // Lift the vendor entries into the convenience fields before the
        // attribute store moves into the object.
        let public = attrs
            .get(AttributeType::PUBLIC_BLOB)
            .map(try_copy)
            .transpose()?;
        let private = attrs
            .get(AttributeType::PRIVATE_BLOB)
            .map(try_copy)
            .transpose()?;
        let wrapped = attrs
            .get(AttributeType::WRAPPED_AUTH)
            .map(try_copy)
            .transpose()?;

        if public.is_none() && private.is_some() {
            return Err(Error::TemplateInconsistent(
                "private blob without a public blob".into(),
            ));
        }

        let mut object = TokenObject::new();
        object.set_attrs(attrs);
        if let Some(public) = public {
            object.set_blob_data(&public, private.as_deref())?;
        }
        if let Some(wrapped) = wrapped {
            object.set_wrapped_auth(&wrapped)?;
        }

        self.initializer.initialize(&mut object)?;

        let handle = self.registry.register(object)?;
        info!(session = %session.id(), %handle, "created token object");
        Ok(handle)
    }

    /// Resolve the handle and tear the object down, refusing while any
    /// operation still holds it.
    pub fn destroy(&self, session: &Session, handle: ObjectHandle) -> Result<()> {
        self.registry.destroy(session, handle)?;
        debug!(session = %session.id(), %handle, "destroy pipeline complete");
        Ok(())
    }
}

/// Structural validation of a creation template.
fn validate_template(template: &[Attribute]) -> Result<AttrList> {
    for attr in template {
        if !attr.kind.is_recognized() {
            return Err(Error::AttributeTypeInvalid(attr.kind));
        }
    }

    let attrs = AttrList::from_template(template)?;

    let Some(class_bytes) = attrs.get(AttributeType::CLASS) else {
        return Err(Error::TemplateInconsistent("missing class attribute".into()));
    };
    let Some(class) = ObjectClass::from_bytes(class_bytes) else {
        return Err(Error::TemplateInconsistent("malformed class encoding".into()));
    };
    if class.is_key() && attrs.get(AttributeType::KEY_TYPE).is_none() {
        return Err(Error::TemplateInconsistent(format!(
            "{} object without a key type",
            class
        )));
    }

    Ok(attrs)
}
