//! Ethereum JSON-RPC client.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U64, U128, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{ChainClient, CreationReceipt, DeployerAccount};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A JSON-RPC error object is turned into an error carrying its code and message.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    tracing::debug!(method, url = %url, "JSON-RPC request");

    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "{} failed with RPC error {}: {}",
            method,
            error.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {} response", method))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    block_number: Option<U64>,
    /// Absent on pre-Byzantium receipts.
    status: Option<U64>,
}

impl RawReceipt {
    /// `None` while the node reports the receipt without a block.
    fn into_receipt(self) -> Option<CreationReceipt> {
        Some(CreationReceipt {
            transaction_hash: self.transaction_hash,
            contract_address: self.contract_address,
            block_number: self.block_number?.to::<u64>(),
            success: self.status.is_none_or(|status| status == U64::from(1)),
        })
    }
}

/// [`ChainClient`] over HTTP JSON-RPC.
///
/// Local accounts sign an EIP-155 legacy transaction and broadcast it raw; unlocked
/// accounts let the node sign through `eth_sendTransaction`.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn send_signed_creation(
        &self,
        signer: &alloy_signer_local::PrivateKeySigner,
        chain_id: u64,
        creation_code: &Bytes,
    ) -> anyhow::Result<B256> {
        let from = signer.address();

        let nonce: U64 = self
            .call(
                "eth_getTransactionCount",
                vec![serde_json::json!(from), serde_json::json!("pending")],
            )
            .await
            .context("Failed to fetch deployer nonce")?;
        let gas_price: U128 = self
            .call("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;
        let gas_limit: U64 = self
            .call(
                "eth_estimateGas",
                vec![serde_json::json!({ "from": from, "data": creation_code })],
            )
            .await
            .context("Failed to estimate contract-creation gas")?;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: nonce.to::<u64>(),
            gas_price: gas_price.to::<u128>(),
            gas_limit: gas_limit.to::<u64>(),
            to: TxKind::Create,
            value: U256::ZERO,
            input: creation_code.clone(),
        };

        tracing::debug!(
            from = %from,
            nonce = tx.nonce,
            gas_price = tx.gas_price,
            gas_limit = tx.gas_limit,
            "Signing contract-creation transaction"
        );

        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .context("Failed to sign contract-creation transaction")?;
        let raw = Bytes::from(TxEnvelope::from(tx.into_signed(signature)).encoded_2718());

        self.call("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
    }
}

impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let chain_id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(chain_id.to::<u64>())
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        self.call(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn submit_creation(
        &self,
        deployer: &DeployerAccount,
        chain_id: u64,
        creation_code: &Bytes,
    ) -> anyhow::Result<B256> {
        match deployer {
            DeployerAccount::Local(signer) => {
                self.send_signed_creation(signer, chain_id, creation_code)
                    .await
            }
            DeployerAccount::Unlocked(from) => {
                self.call(
                    "eth_sendTransaction",
                    vec![serde_json::json!({ "from": from, "data": creation_code })],
                )
                .await
            }
        }
    }

    async fn receipt(&self, transaction_hash: B256) -> anyhow::Result<Option<CreationReceipt>> {
        let raw: Option<RawReceipt> = self
            .call(
                "eth_getTransactionReceipt",
                vec![serde_json::json!(transaction_hash)],
            )
            .await?;

        Ok(raw.and_then(RawReceipt::into_receipt))
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let number: U64 = self.call("eth_blockNumber", vec![]).await?;
        Ok(number.to::<u64>())
    }
}
