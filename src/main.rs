//! CLI entry point for mercato.

mod cli;

use clap::Parser;
use mercato::auth::{
    decode_unverified, default_session_store_path, fresh_access_token, persist_login,
    session_health, sign_out, AuthClient, AuthError, AuthorizeOptions, SystemBrowser,
};
use mercato::config::{
    ensure_default_global_config, load_config, select_environment, Config, EnvironmentConfig,
};
use mercato::render::Renderer;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    init_tracing();

    let args = cli::Args::parse();

    if let Err(e) = ensure_default_global_config() {
        eprintln!("warning: failed to initialize ~/.config/mercato/mercato.toml: {e}");
    }

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if args.no_color {
        config.display.color = false;
    }
    let renderer = Renderer::new(config.display.color);

    if let Some(env) = args.env.as_deref() {
        if let Err(e) = select_environment(&mut config, env) {
            renderer.error(&e.to_string());
            std::process::exit(1);
        }
    }

    let result = match args.command {
        cli::Command::Login { no_browser } => run_login(&renderer, &config, no_browser).await,
        cli::Command::Logout { local_only } => run_logout(&renderer, &config, local_only).await,
        cli::Command::Status => run_status(&renderer, &config),
        cli::Command::Whoami => run_whoami(&renderer, &config).await,
        cli::Command::Token => run_token(&config).await,
    };

    if let Err(msg) = result {
        renderer.error(&msg);
        std::process::exit(1);
    }
}

/// Route `tracing` output to stderr, filtered by `MERCATO_LOG`.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("MERCATO_LOG")
        .unwrap_or_else(|_| EnvFilter::new("mercato=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(environment: &EnvironmentConfig) -> AuthClient {
    AuthClient::new(
        &environment.issuer,
        environment.client_id.clone(),
        environment.redirect_uri(),
        environment.scopes.clone(),
    )
}

fn authorize_options(environment: &EnvironmentConfig) -> AuthorizeOptions {
    AuthorizeOptions {
        prompt: environment.prompt.clone(),
        ui_locales: environment.ui_locales.clone(),
        ..AuthorizeOptions::default()
    }
}

fn session_store_path() -> Result<PathBuf, String> {
    default_session_store_path()
        .ok_or_else(|| "unable to resolve a config root for session storage".to_string())
}

async fn run_login(renderer: &Renderer, config: &Config, no_browser: bool) -> Result<(), String> {
    let environment = &config.environment;
    let client = build_client(environment);
    let options = authorize_options(environment);
    let store_path = session_store_path()?;

    let tokens = if no_browser {
        match login_with_pasted_callback(renderer, &client, &options).await? {
            Some(tokens) => tokens,
            None => {
                renderer.warn("sign-in was cancelled");
                return Ok(());
            }
        }
    } else {
        renderer.section("login");
        renderer.field("environment", &config.active);
        renderer.field("issuer", &environment.issuer);
        renderer.detail("waiting for the browser sign-in to finish...");
        match client.login(&SystemBrowser::default(), &options).await {
            Ok(tokens) => tokens,
            Err(AuthError::Cancelled) => {
                renderer.warn("sign-in was cancelled");
                return Ok(());
            }
            Err(err) => return Err(format!("sign-in failed: {err}")),
        }
    };

    persist_login(&store_path, &config.active, tokens.clone())
        .map_err(|err| format!("failed to save the session: {err}"))?;

    renderer.section("signed in");
    renderer.field("environment", &config.active);
    if let Ok(claims) = decode_unverified(&tokens.access_token) {
        if let Some(username) = claims.preferred_username.as_deref() {
            renderer.field("account", username);
        }
        if let Some(tenant) = claims.tenant_name.as_deref() {
            renderer.field("tenant", tenant);
        }
        if !claims.roles().is_empty() {
            renderer.field("roles", &claims.roles().join(", "));
        }
    }
    renderer.field("expires", &format_expiry(tokens.expires_at_unix));
    Ok(())
}

/// Browserless fallback: print the URL, then read the pasted redirect.
/// Returns `None` when the user aborts by submitting an empty line.
async fn login_with_pasted_callback(
    renderer: &Renderer,
    client: &AuthClient,
    options: &AuthorizeOptions,
) -> Result<Option<mercato::auth::TokenSet>, String> {
    let request = client
        .begin_authorization(options)
        .map_err(|err| err.to_string())?;

    renderer.section("login");
    renderer.detail("open this URL in a browser, sign in, then paste the");
    renderer.detail("redirect URL your browser lands on:");
    renderer.detail("");
    renderer.detail(&request.url);
    renderer.detail("");

    let mut pasted = String::new();
    std::io::stdin()
        .read_line(&mut pasted)
        .map_err(|err| format!("failed to read the pasted URL: {err}"))?;
    let pasted = pasted.trim();
    if pasted.is_empty() {
        client.cancel_pending();
        return Ok(None);
    }

    let code = client
        .handle_callback(pasted)
        .map_err(|err| format!("sign-in failed: {err}"))?;
    let tokens = client
        .exchange_code(&code)
        .await
        .map_err(|err| format!("sign-in failed: {err}"))?;
    Ok(Some(tokens))
}

async fn run_logout(renderer: &Renderer, config: &Config, local_only: bool) -> Result<(), String> {
    let client = build_client(&config.environment);
    let store_path = session_store_path()?;
    let removed = sign_out(&client, &store_path, &config.active, !local_only)
        .await
        .map_err(|err| format!("logout failed: {err}"))?;

    renderer.section("logout");
    renderer.field("environment", &config.active);
    if removed {
        renderer.field("session", "cleared");
    } else {
        renderer.field("session", "none saved");
    }
    Ok(())
}

fn run_status(renderer: &Renderer, config: &Config) -> Result<(), String> {
    let health = session_health(&config.active)
        .map_err(|err| format!("failed to read the session store: {err}"))?;

    renderer.section("status");
    renderer.field("environment", &config.active);
    renderer.field("issuer", &config.environment.issuer);
    if !health.has_tokens {
        renderer.field("session", "not signed in");
        return Ok(());
    }

    renderer.field(
        "session",
        if health.expired {
            if health.can_refresh {
                "expired (refreshable)"
            } else {
                "expired"
            }
        } else {
            "active"
        },
    );
    if let Some(expires_at) = health.expires_at_unix {
        renderer.field("expires", &format_expiry(expires_at));
    }

    // Claim summary is decoded locally and unverified; display only.
    if let Ok(Some(tokens)) = mercato::auth::load_environment_tokens(&config.active) {
        if let Ok(claims) = decode_unverified(&tokens.access_token) {
            if let Some(username) = claims.preferred_username.as_deref() {
                renderer.field("account", username);
            }
            if let Some(tenant) = claims.tenant_name.as_deref() {
                renderer.field("tenant", tenant);
            }
        }
    }
    Ok(())
}

async fn run_whoami(renderer: &Renderer, config: &Config) -> Result<(), String> {
    let client = build_client(&config.environment);
    let store_path = session_store_path()?;
    let tokens = fresh_access_token(&client, &store_path, &config.active)
        .await
        .map_err(|err| err.to_string())?;
    let identity = client
        .userinfo(&tokens.access_token)
        .await
        .map_err(|err| format!("userinfo request failed: {err}"))?;

    renderer.section("whoami");
    renderer.field("environment", &config.active);
    for key in ["preferred_username", "name", "email", "sub"] {
        if let Some(value) = identity.get(key).and_then(|v| v.as_str()) {
            renderer.field(key, value);
        }
    }
    Ok(())
}

async fn run_token(config: &Config) -> Result<(), String> {
    let client = build_client(&config.environment);
    let store_path = session_store_path()?;
    let tokens = fresh_access_token(&client, &store_path, &config.active)
        .await
        .map_err(|err| err.to_string())?;
    // Bare token on stdout so it can be piped into curl and friends.
    println!("{}", tokens.access_token);
    Ok(())
}

fn format_expiry(expires_at_unix: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let delta = expires_at_unix - now;
    if delta <= 0 {
        return "already expired".to_string();
    }
    if delta < 120 {
        format!("in {delta}s")
    } else if delta < 2 * 3600 {
        format!("in {}m", delta / 60)
    } else {
        format!("in {}h", delta / 3600)
    }
}
