//! Checks every handler runs before touching shared state or a collaborator.

use musick_shared::{Frame, SessionKey};
use serde::de::DeserializeOwned;

use crate::error::CommandError;
use crate::session::{Identity, SessionRegistry};

/// The session's bound identity, or `not authenticated`.
pub(super) async fn authenticated(
    sessions: &SessionRegistry,
    key: SessionKey,
) -> Result<Identity, CommandError> {
    sessions
        .identity(key)
        .await
        .ok_or(CommandError::NotAuthenticated)
}

/// Decode the request body. A JSON `null` body is the empty request.
pub(super) fn payload<T: DeserializeOwned + Default>(frame: &Frame) -> Result<T, CommandError> {
    let body: Option<T> = frame.parse().map_err(|_| CommandError::InvalidFormat)?;
    Ok(body.unwrap_or_default())
}

/// Fail with `reason` unless every field is non-empty.
pub(super) fn required(fields: &[&str], reason: &'static str) -> Result<(), CommandError> {
    if fields.iter().any(|f| f.is_empty()) {
        return Err(CommandError::Validation(reason));
    }
    Ok(())
}

/// A payload may only speak for the user the session is bound to.
pub(super) fn same_user(identity: &Identity, claimed: &str) -> Result<(), CommandError> {
    if identity.user_id.as_str() != claimed {
        return Err(CommandError::IdentityMismatch);
    }
    Ok(())
}
