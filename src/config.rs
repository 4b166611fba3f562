use std::path::PathBuf;

use clap::Parser;

/// Server configuration. Every flag can also be set through its env var.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Postgres connection URL (sqlite URLs work for local runs)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Password for the poker admin routes
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Password for the superpoker admin routes (also unlocks poker)
    #[arg(long, env = "SUPERADMIN_PASSWORD", hide_env_values = true)]
    pub superadmin_password: Option<String>,

    /// Shared key the Discord bot sends in `x-api-key`
    #[arg(long, env = "BOT_API_KEY", hide_env_values = true)]
    pub bot_api_key: Option<String>,

    /// Resend API key; verification links are only logged when unset
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Sender address for verification mails
    #[arg(long, env = "EMAIL_FROM", default_value = "Piggy ID <noreply@piggy.id>")]
    pub email_from: String,

    /// Public origin used when building redirect and verification links
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3000")]
    pub public_base_url: String,

    /// JSON-RPC endpoint used for NFT ownership reads
    #[arg(long, env = "BASE_RPC_URL", default_value = "https://mainnet.base.org")]
    pub base_rpc_url: String,

    /// ERC-721 contract gating the poker invite routes; unset disables the check
    #[arg(long, env = "NFT_CONTRACT_ADDRESS")]
    pub nft_contract_address: Option<String>,

    /// CSV pool for the file-backed poker allocator
    #[arg(long, env = "INVITE_POOL_FILE", default_value = "data/invite-codes.csv")]
    pub invite_pool_file: PathBuf,

    /// JSON state for the file-backed poker allocator
    #[arg(
        long,
        env = "INVITE_ASSIGNMENTS_FILE",
        default_value = "data/invite-assignments.json"
    )]
    pub invite_assignments_file: PathBuf,

    /// Requests allowed per client per window on the invite routes
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 10)]
    pub rate_limit_max: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
    pub rate_limit_window_secs: u64,

    /// Set when a reverse proxy appends the client address to `x-forwarded-for`
    #[arg(long, env = "TRUST_PROXY", default_value_t = false)]
    pub trust_proxy: bool,
}
