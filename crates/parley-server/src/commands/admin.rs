//! Admin-only user management.

use common::protocol::{self, Role, ITEM_SEPARATOR, LIST_SEPARATOR};
use tracing::info;

use crate::commands::{arg, auth, parse_arg, Session};
use crate::errors::CommandError;
use crate::model::NewUser;
use crate::server::ServerContext;

pub async fn get_users(ctx: &ServerContext, session: &mut Session) -> Result<(), CommandError> {
    session.require_admin()?;
    let users = ctx.store.list_users().await?;
    let listed = users
        .iter()
        .map(|u| {
            format!(
                "{}{sep}{}{sep}{}{sep}{}",
                u.id,
                u.login,
                u.name,
                u.role,
                sep = ITEM_SEPARATOR
            )
        })
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR);
    session
        .conn
        .push(format!("{}|{}", protocol::RESP_USERS, listed));
    Ok(())
}

/// `ADD_USER|login|password|name[|role]`: role defaults to USER.
pub async fn add_user(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    session.require_admin()?;
    let login = arg(args, 0, "login")?.trim().to_string();
    let password = arg(args, 1, "password")?.to_string();
    let name = arg(args, 2, "name")?.trim().to_string();
    if login.is_empty() || name.is_empty() || password.is_empty() {
        return Err(CommandError::Protocol(
            "login, password and name must not be empty".to_string(),
        ));
    }
    let role = match args.get(3) {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| CommandError::Protocol(e.to_string()))?,
        None => Role::User,
    };

    let password_hash = auth::hash_password(ctx.config.bcrypt_cost, password).await?;
    let user = ctx
        .store
        .create_user(NewUser {
            login,
            password_hash,
            name,
            role,
        })
        .await?;
    info!(
        target: "parley_server::commands",
        user_id = user.id,
        role = %user.role,
        "user created by admin"
    );
    session
        .conn
        .push(format!("{}|{}", protocol::RESP_OK, user.id));
    Ok(())
}

/// `UPDATE_USER|userId|name|role`: login and password stay as they are.
pub async fn update_user(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    session.require_admin()?;
    let user_id = parse_arg(args, 0, "user id")?;
    let name = arg(args, 1, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(CommandError::Protocol("name must not be empty".to_string()));
    }
    let role = arg(args, 2, "role")?
        .parse::<Role>()
        .map_err(|e| CommandError::Protocol(e.to_string()))?;

    ctx.store.update_user(user_id, name, role).await?;
    info!(
        target: "parley_server::commands",
        user_id,
        "user updated by admin"
    );
    session
        .conn
        .push(format!("{}|updated", protocol::RESP_OK));
    Ok(())
}

/// `DELETE_USER|userId`: self-deletion and removing the last admin are
/// both refused; the latter check sits in the store, atomic with the
/// delete.
pub async fn delete_user(
    ctx: &ServerContext,
    session: &mut Session,
    args: &[&str],
) -> Result<(), CommandError> {
    let caller_id = session.require_admin()?.id;
    let user_id = parse_arg(args, 0, "user id")?;
    if user_id == caller_id {
        return Err(CommandError::Domain(
            "cannot delete your own account".to_string(),
        ));
    }

    ctx.store.delete_user(user_id).await?;
    info!(
        target: "parley_server::commands",
        user_id,
        "user deleted by admin"
    );
    session
        .conn
        .push(format!("{}|deleted", protocol::RESP_OK));
    Ok(())
}
