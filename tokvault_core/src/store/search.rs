//! Session-scoped object search.
//!
//! Each session moves through Idle → Searching → Idle. `find_init` snapshots
//! the matching handles under the registry lock; the cursor it leaves behind
//! is owned by the session alone, so `find` and `find_final` never touch the
//! lock.

use tracing::{debug, warn};

use crate::attrs::{AttrList, Attribute};
use crate::error::{Error, Result};
use crate::id::ObjectHandle;
use crate::session::Session;
use crate::store::{visible, Registry, CONCEALED};

/// The per-session search state between `find_init` and `find_final`.
#[derive(Debug)]
pub(crate) struct SearchCursor {
    /// Matching handles in registry insertion order.
    matches: Vec<ObjectHandle>,
    /// Read position into `matches`.
    position: usize,
    /// The filter template the cursor was built from.
    #[allow(dead_code)]
    template: Vec<Attribute>,
}

/// An object matches when every template entry is present with a
/// byte-identical value. Concealed attribute types never match, so the
/// search interface cannot be used as an oracle against them.
fn matches_template(attrs: &AttrList, template: &[Attribute]) -> bool {
    template.iter().all(|t| {
        !CONCEALED.contains(&t.kind) && attrs.get(t.kind) == Some(t.value.as_slice())
    })
}

impl Registry {
    /// Begin a search over the live object set, transitioning the session
    /// Idle → Searching.
    pub fn find_init(&self, session: &mut Session, template: &[Attribute]) -> Result<()> {
        if session.search.is_some() {
            return Err(Error::OperationActive);
        }

        let inner = self.inner.lock();
        let mut matches = Vec::new();
        for handle in inner.order() {
            let Some(obj) = inner.get(*handle) else {
                continue;
            };
            if !visible(obj, session) {
                continue;
            }
            let Some(attrs) = inner.effective_attrs(obj) else {
                warn!(id = %obj.id(), "skipping object with dangling link during search");
                continue;
            };
            if matches_template(attrs, template) {
                matches.push(*handle);
            }
        }
        drop(inner);

        debug!(
            session = %session.id(),
            matched = matches.len(),
            "search initialized"
        );
        session.search = Some(SearchCursor {
            matches,
            position: 0,
            template: template.to_vec(),
        });
        Ok(())
    }

    /// Return up to `max_count` handles from the session's cursor, advancing
    /// it. An empty result means the cursor is exhausted; that is not an
    /// error.
    pub fn find(&self, session: &mut Session, max_count: usize) -> Result<Vec<ObjectHandle>> {
        let cursor = session
            .search
            .as_mut()
            .ok_or(Error::OperationNotInitialized)?;
        let remaining = cursor.matches.len() - cursor.position;
        let count = remaining.min(max_count);
        let out = cursor.matches[cursor.position..cursor.position + count].to_vec();
        cursor.position += count;
        Ok(out)
    }

    /// Abandon the search, transitioning the session back to Idle. Safe at
    /// any point while Searching.
    pub fn find_final(&self, session: &mut Session) -> Result<()> {
        match session.search.take() {
            Some(_) => {
                debug!(session = %session.id(), "search finalized");
                Ok(())
            }
            None => Err(Error::OperationNotInitialized),
        }
    }
}
