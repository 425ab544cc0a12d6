//! Follower activation on event completion.

use tracing::debug;

use crate::event::{EventKey, EventState};
use crate::simulation::ExecutionError;

use super::registry::{Activation, Registry};

/// Ends an event and activates those of its followers whose precursors have
/// now all ended.
///
/// Followers are visited once, in the order in which they were registered. A
/// follower becomes active no earlier than the current time; a continuous
/// follower whose end time has already passed is retired without running.
pub(crate) fn end(registry: &mut Registry, key: EventKey) -> Result<(), ExecutionError> {
    let followers = registry.mark_ended(key)?;
    debug!(event = %key, followers = followers.len(), "event ended");

    for follower in followers {
        let Ok(entry) = registry.get(follower) else {
            continue;
        };
        if entry.state != EventState::Inactive || !registry.precursors_ended(follower) {
            continue;
        }
        if registry.make_active(follower)? == Activation::PassedDue {
            debug!(event = %follower, precursor = %key, "follower skipped");
        }
    }

    Ok(())
}
