use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tailortrack::{
    auth::{AuthConfig, AuthService},
    config, db,
    entities::UserRole,
};

/// Creates or resets a staff or admin account
#[derive(Debug, Parser)]
#[command(name = "seed-admin", version, about)]
struct Cli {
    #[arg(long)]
    email: String,

    /// Read from SEED_ADMIN_PASSWORD when omitted
    #[arg(long, env = "SEED_ADMIN_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, default_value = "Administrator")]
    name: String,

    /// admin or staff
    #[arg(long, default_value = "admin", value_parser = parse_role)]
    role: UserRole,
}

fn parse_role(raw: &str) -> Result<UserRole, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(UserRole::Admin),
        "staff" => Ok(UserRole::Staff),
        other => Err(format!("unsupported role '{}': expected admin or staff", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;

    let auth = AuthService::new(AuthConfig::from_app_config(&cfg), Arc::new(pool));
    let user = auth
        .upsert_staff(&cli.email, &cli.password, &cli.name, cli.role)
        .await?;

    info!(user_id = %user.id, email = %user.email, "Account ready");
    println!("{} <{}> ready as {}", user.name, user.email, cli.role);
    Ok(())
}
