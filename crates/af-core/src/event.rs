//! State change event payload

use serde::{Deserialize, Serialize};

use crate::{EntityId, State};

/// Payload published whenever an entity state is written
///
/// `old_state` is None for a newly seen entity; `new_state` is None when an
/// entity is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChanged {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    pub new_state: Option<State>,
}

impl StateChanged {
    /// True when the state value itself differs, not just attributes or timestamps
    pub fn value_changed(&self) -> bool {
        match (&self.old_state, &self.new_state) {
            (Some(old), Some(new)) => old.state != new.state,
            (None, Some(_)) | (Some(_), None) => true,
            (None, None) => false,
        }
    }
}
