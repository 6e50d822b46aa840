//! Auth commands - Login, Logout, and Status of the platform session
//!
//! Provides the `bracelet auth` CLI subcommands which:
//! 1. `login`  - Runs the OAuth password grant and stores the token with the
//!    configured backend (keyring, file or memory).
//! 2. `logout` - Revokes the token on the server and clears local storage.
//! 3. `status` - Shows the stored session, its expiry and the current user.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use bracelet_api::session::TokenOptions;
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Log in with username and password
    Login {
        /// Account e-mail or username
        username: String,
        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Revoke and remove the stored session
    Logout,
    /// Show the stored session
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        match self {
            AuthCommand::Login { username, password } => {
                self.execute_login(ctx, username, password.as_deref(), &*fmt, format)
                    .await
            }
            AuthCommand::Logout => self.execute_logout(ctx, &*fmt, format).await,
            AuthCommand::Status => self.execute_status(ctx, &*fmt, format).await,
        }
    }

    async fn execute_login(
        &self,
        ctx: &CliContext,
        username: &str,
        password: Option<&str>,
        fmt: &dyn OutputFormatter,
        format: OutputFormat,
    ) -> Result<()> {
        let password = match password {
            Some(p) => p.to_string(),
            None => read_password()?,
        };

        let token = ctx.session.login(username, &password).await?;
        info!(user_id = ?token.user_id(), role = ?token.user_role(), "Logged in");

        let user = ctx.session.user().await?;
        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "user_id": token.user_id(),
                "role": token.user_role(),
                "expires_at": token.expires_at().map(|t| t.to_rfc3339()),
            }));
        } else {
            fmt.success(&format!("Logged in as {}", display_name(&user)));
        }
        Ok(())
    }

    async fn execute_logout(
        &self,
        ctx: &CliContext,
        fmt: &dyn OutputFormatter,
        format: OutputFormat,
    ) -> Result<()> {
        let active = ctx.session.is_valid().await;
        // Clears storage even when the token is already unusable.
        ctx.session.close_session().await;
        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({"success": true, "was_active": active}));
        } else if active {
            fmt.success("Logged out");
        } else {
            fmt.warn("No active session");
        }
        Ok(())
    }

    async fn execute_status(
        &self,
        ctx: &CliContext,
        fmt: &dyn OutputFormatter,
        format: OutputFormat,
    ) -> Result<()> {
        // Lenient: a stale session is a status, not a failure.
        let token = ctx.session.token(TokenOptions::lenient()).await?;
        let Some(token) = token else {
            if format == OutputFormat::Json {
                fmt.print_json(&serde_json::json!({"authenticated": false}));
            } else {
                fmt.warn("Not logged in. Run 'bracelet auth login <username>'.");
            }
            return Ok(());
        };

        let user = ctx.session.user().await?;
        let expires_at = token.expires_at();
        let remaining = expires_at.map(|t| (t - Utc::now()).num_seconds());

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "authenticated": true,
                "user": user,
                "role": token.user_role(),
                "expires_at": expires_at.map(|t| t.to_rfc3339()),
                "expires_in_secs": remaining,
                "refreshable": token.refresh_token().is_some(),
            }));
        } else {
            fmt.success(&format!("Logged in as {}", display_name(&user)));
            if let Some(role) = token.user_role() {
                fmt.info(&format!("Role:    {role}"));
            }
            match remaining {
                Some(secs) => fmt.info(&format!("Expires: in {secs}s")),
                None => fmt.info("Expires: never"),
            }
            fmt.info(&format!(
                "Refresh: {}",
                if token.refresh_token().is_some() { "available" } else { "none" }
            ));
        }
        Ok(())
    }
}

fn display_name(user: &bracelet_core::domain::User) -> String {
    let name = user.full_name();
    match (name.is_empty(), user.email.as_deref()) {
        (false, Some(email)) => format!("{name} <{email}>"),
        (false, None) => name,
        (true, Some(email)) => email.to_string(),
        (true, None) => user.id.map(|id| format!("user {id}")).unwrap_or_default(),
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush().context("Failed to write prompt")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
