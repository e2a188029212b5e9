//! Credential storage and session handling.

use crate::CliResult;
use crate::config::CommandContext;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Current credentials file format.
const CREDENTIALS_VERSION: &str = "1";

/// CLI arguments for the login command.
#[derive(Args, Clone, Debug, Default)]
pub struct LoginArgs {
    /// Username; prompted for when omitted.
    #[arg(short, long)]
    pub username: Option<String>,
    /// Password; prompted for when omitted.
    #[arg(short, long, env = "HARBOR_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Username.
    pub username: String,
    /// Token issued by the auth service.
    pub token: String,
}

/// `~/.harbor/credentials` contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredCredentials {
    version: String,
    username: String,
    token: String,
}

impl From<&Session> for StoredCredentials {
    fn from(session: &Session) -> Self {
        Self {
            version: CREDENTIALS_VERSION.to_string(),
            username: session.username.clone(),
            token: session.token.clone(),
        }
    }
}

/// Authenticate and store the resulting token.
pub async fn run_login(ctx: &CommandContext, args: LoginArgs) -> CliResult<()> {
    let session = login(ctx, args.username, args.password).await?;
    println!("Logged in as {}.", session.username);
    Ok(())
}

/// Revoke the stored token and remove the credentials file.
pub async fn run_logout(ctx: &CommandContext) -> CliResult<()> {
    let path = &ctx.settings.credentials_path;
    let Some(session) = read_session(path).await? else {
        println!("Not logged in.");
        return Ok(());
    };
    ctx.api.destroy_token(&session).await?;
    tokio::fs::remove_file(path).await?;
    println!("Logged out {}.", session.username);
    Ok(())
}

/// Return a valid session, logging in again when the stored token has expired.
pub async fn ensure_session(ctx: &CommandContext) -> CliResult<Session> {
    let stored = read_session(&ctx.settings.credentials_path).await?;
    if let Some(session) = stored.as_ref() {
        if ctx.api.check_token(session).await? {
            return Ok(session.clone());
        }
        log::info!("stored token for {} has expired", session.username);
    }
    let username = stored.map(|session| session.username);
    login(ctx, username, None).await
}

async fn login(
    ctx: &CommandContext,
    username: Option<String>,
    password: Option<String>,
) -> CliResult<Session> {
    let username = match username.filter(|name| !name.trim().is_empty()) {
        Some(username) => username,
        None => ctx.prompter.ask("Username", None)?,
    };
    let password = match password.filter(|password| !password.is_empty()) {
        Some(password) => password,
        None => ctx.prompter.secret("Password")?,
    };
    let token = ctx.api.get_token(&username, &password).await?;
    let session = Session { username, token };
    write_session(&ctx.settings.credentials_path, &session).await?;
    log::debug!("credentials stored at {}", ctx.settings.credentials_path.display());
    Ok(session)
}

async fn read_session(path: &Path) -> CliResult<Option<Session>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let stored: StoredCredentials = serde_json::from_str(&contents)
        .map_err(|err| format!("invalid credentials file {}: {err}", path.display()))?;
    if stored.token.is_empty() {
        return Ok(None);
    }
    Ok(Some(Session {
        username: stored.username,
        token: stored.token,
    }))
}

async fn write_session(path: &Path, session: &Session) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(&StoredCredentials::from(session))?;
    let mut file = create_private(path).await?;
    file.write_all(&payload).await?;
    file.flush().await?;
    Ok(())
}

/// Open for writing with owner-only permissions, before any bytes land.
#[cfg(unix)]
async fn create_private(path: &Path) -> CliResult<tokio::fs::File> {
    use std::os::unix::fs::PermissionsExt;
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    // `mode` only applies to new files.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .await?;
    Ok(file)
}

#[cfg(not(unix))]
async fn create_private(path: &Path) -> CliResult<tokio::fs::File> {
    Ok(tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?)
}
