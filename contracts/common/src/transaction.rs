//! All-or-nothing execution of top-level operations.
//!
//! Nested component calls mutate state in place as they go. Running the
//! whole operation through [`transact`] guarantees that an error anywhere in
//! the chain leaves the state exactly as it was before the call.

use crate::errors::PoolResult;

/// Run `op` against `state`, restoring the pre-call snapshot on error.
pub fn transact<S, T, F>(state: &mut S, op: F) -> PoolResult<T>
where
    S: Clone,
    F: FnOnce(&mut S) -> PoolResult<T>,
{
    let snapshot = state.clone();
    match op(state) {
        Ok(value) => Ok(value),
        Err(err) => {
            log::debug!("rolling back: {} ({})", err, err.code());
            *state = snapshot;
            Err(err)
        }
    }
}
