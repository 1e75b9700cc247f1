//! LOGIN, LOGOUT and REGISTER.

use common::protocol::{self, Role};
use common::secret::ExposeSecret;
use tracing::info;

use crate::commands::{arg, meetings, Session};
use crate::errors::CommandError;
use crate::model::NewUser;
use crate::server::ServerContext;

/// Authenticates the connection and replies `AUTH_OK|role|id|name` followed
/// by the current meeting listing. Unknown login and wrong password produce
/// the same reason so the reply does not reveal which logins exist.
pub async fn login(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    if session.user.is_some() {
        return Err(CommandError::Domain("already logged in".to_string()));
    }
    let login = arg(args, 0, "login")?;
    let password = arg(args, 1, "password")?.to_string();

    let user = match ctx.store.user_by_login(login).await {
        Ok(user) => user,
        Err(_) => return Err(CommandError::Domain("invalid credentials".to_string())),
    };
    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(CommandError::Domain("invalid credentials".to_string()));
    }

    ctx.registry.bind_user(user.id, &session.conn);
    info!(
        target: "parley_server::commands",
        user_id = user.id,
        conn_id = session.conn.id,
        "user logged in"
    );
    session.conn.push(format!(
        "{}|{}|{}|{}",
        protocol::RESP_AUTH_OK,
        user.role,
        user.id,
        user.name
    ));
    session.user = Some(user);

    // A fresh client always needs the listing; sending it here saves the
    // round trip.
    meetings::send_meeting_list(ctx, session).await
}

/// Ends the session. An attending user leaves their meeting first.
pub async fn logout(ctx: &ServerContext, session: &mut Session) -> Result<(), CommandError> {
    if session.user.is_some() {
        meetings::leave_current(ctx, session).await?;
        ctx.registry.unbind_user(&session.conn);
        if let Some(user) = session.user.take() {
            info!(
                target: "parley_server::commands",
                user_id = user.id,
                conn_id = session.conn.id,
                "user logged out"
            );
        }
    }
    session.conn.push(format!("{}|bye", protocol::RESP_OK));
    Ok(())
}

/// Self-service account creation; the new account always gets the USER role.
pub async fn register(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let login = arg(args, 0, "login")?.trim();
    let password = arg(args, 1, "password")?.to_string();
    let name = arg(args, 2, "name")?.trim();
    if login.is_empty() || name.is_empty() {
        return Err(CommandError::Protocol(
            "login and name must not be empty".to_string(),
        ));
    }
    if password.is_empty() {
        return Err(CommandError::Protocol("password must not be empty".to_string()));
    }

    let password_hash = hash_password(ctx.config.bcrypt_cost, password).await?;
    let user = ctx
        .store
        .create_user(NewUser {
            login: login.to_string(),
            password_hash,
            name: name.to_string(),
            role: Role::User,
        })
        .await?;
    info!(
        target: "parley_server::commands",
        user_id = user.id,
        "account registered"
    );
    session
        .conn
        .push(format!("{}|{}", protocol::RESP_OK, user.id));
    Ok(())
}

/// Bcrypt hashing off the runtime threads.
pub(crate) async fn hash_password(cost: u32, password: String) -> Result<String, CommandError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| CommandError::Internal(format!("hash task failed: {e}")))?
        .map_err(|e| CommandError::Internal(format!("bcrypt hash failed: {e}")))
}

async fn verify_password(password: String, hash: String) -> Result<bool, CommandError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| CommandError::Internal(format!("verify task failed: {e}")))?
        .map_err(|e| CommandError::Internal(format!("bcrypt verify failed: {e}")))
}

/// Creates the bootstrap admin account when the store has none.
pub(crate) async fn ensure_bootstrap_admin(ctx: &ServerContext) -> Result<(), CommandError> {
    if ctx.store.admin_exists().await? {
        return Ok(());
    }
    let password = ctx.config.admin_password.expose_secret().to_string();
    let password_hash = hash_password(ctx.config.bcrypt_cost, password).await?;
    let admin = ctx
        .store
        .create_user(NewUser {
            login: ctx.config.admin_login.clone(),
            password_hash,
            name: "Administrator".to_string(),
            role: Role::Admin,
        })
        .await?;
    info!(
        target: "parley_server::commands",
        user_id = admin.id,
        login = %ctx.config.admin_login,
        "bootstrap admin created"
    );
    Ok(())
}
