//! ERC-721 ownership reads over JSON-RPC.
//!
//! RPC failures and timeouts are treated as "no owner": the gate fails
//! closed with 403 instead of surfacing a 500.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::AppError;

/// `ownerOf(uint256)`
const OWNER_OF_SELECTOR: &str = "6352211e";
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub enum OwnershipCheck {
    /// No contract configured; every wallet passes.
    Disabled,
    Rpc {
        client: reqwest::Client,
        rpc_url: String,
        contract: String,
    },
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

impl OwnershipCheck {
    pub fn from_config(config: &Config) -> Self {
        match config.nft_contract_address.as_deref().map(str::trim) {
            Some(contract) if !contract.is_empty() => OwnershipCheck::Rpc {
                client: reqwest::Client::new(),
                rpc_url: config.base_rpc_url.clone(),
                contract: contract.to_ascii_lowercase(),
            },
            _ => {
                tracing::warn!("NFT_CONTRACT_ADDRESS not set, token ownership is not verified");
                OwnershipCheck::Disabled
            }
        }
    }

    /// Current owner of `token_id`, lowercased. `None` on any failure.
    pub async fn owner_of(&self, token_id: u128) -> Option<String> {
        let OwnershipCheck::Rpc { client, rpc_url, contract } = self else {
            return None;
        };
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": contract, "data": encode_owner_of(token_id) }, "latest"],
        });

        let call = async {
            client
                .post(rpc_url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json::<RpcResponse>()
                .await
        };
        let response = match tokio::time::timeout(RPC_TIMEOUT, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(token_id = %token_id, error = %e, "ownerOf call failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(token_id = %token_id, "ownerOf call timed out");
                return None;
            }
        };
        if let Some(error) = response.error {
            tracing::warn!(token_id = %token_id, %error, "ownerOf reverted");
            return None;
        }
        response.result.as_deref().and_then(decode_address)
    }

    /// Ok when `wallet` (already normalized) owns `token_id`.
    pub async fn verify(&self, token_id: u128, wallet: &str) -> Result<(), AppError> {
        if matches!(self, OwnershipCheck::Disabled) {
            return Ok(());
        }
        match self.owner_of(token_id).await {
            Some(owner) if owner == wallet => Ok(()),
            _ => Err(AppError::Forbidden),
        }
    }
}

/// Calldata for `ownerOf(token_id)`.
pub fn encode_owner_of(token_id: u128) -> String {
    format!("0x{OWNER_OF_SELECTOR}{token_id:064x}")
}

/// Last 20 bytes of an ABI-encoded address word. The zero address means
/// "unowned" and decodes to `None`.
pub fn decode_address(word: &str) -> Option<String> {
    let hex = word.strip_prefix("0x").unwrap_or(word);
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let address = hex[24..].to_ascii_lowercase();
    if address.chars().all(|c| c == '0') {
        return None;
    }
    Some(format!("0x{address}"))
}
