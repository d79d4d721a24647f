use musick_shared::protocol::{AuthenticateRequest, Authenticated};
use musick_shared::Frame;
use tracing::info;

use super::{gate, success, Connection};
use crate::error::CommandError;
use crate::session::Identity;
use crate::state::AppState;

/// 10: exchange a token for a bound session.
pub(super) async fn authenticate(
    state: &AppState,
    conn: &Connection,
    frame: &Frame,
) -> Result<Frame, CommandError> {
    let req: AuthenticateRequest = gate::payload(frame)?;
    gate::required(&[req.token.as_str()], "token is required")?;

    let user = state
        .backend
        .identity
        .verify(&req.token)
        .await
        .map_err(CommandError::AuthenticationFailed)?;

    info!(session = %conn.key, user = %user.id, email = %user.email, "User authenticated");

    let reply = Authenticated {
        user_id: user.id.to_string(),
        user_name: user.display_name.clone(),
    };
    state
        .sessions
        .bind(
            conn.key,
            Identity {
                user_id: user.id,
                email: user.email,
                display_name: user.display_name,
            },
        )
        .await;

    Ok(success(frame.id, "authenticated", reply))
}
