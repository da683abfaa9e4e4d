// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-session context: the node client, the key store, the chain view and
//! the one-submission-at-a-time guard. Passed explicitly to whatever needs it.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{info, warn};

use crate::blockchain::client::NodeClient;
use crate::blockchain::nonce::NonceSource;
use crate::blockchain::signing::sign_intent;
use crate::blockchain::types::{Address, FaucetReceipt, SubmissionReceipt, TransactionIntent};
use crate::chain_view::{ClientChainView, DataKind};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::poller::{ChainPoller, PollIntervals};
use crate::storage::{FileKeyStorage, KeyMaterial, KeyMaterialStore};
use crate::terminal::{CommandError, SendArgs};

/// Result of a successful `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub tx_id: String,
    pub nonce: u64,
    pub receipt: SubmissionReceipt,
}

pub struct Session {
    client: Arc<NodeClient>,
    keys: KeyMaterialStore,
    view: Arc<RwLock<ClientChainView>>,
    nonces: NonceSource,
    submit_lock: Mutex<()>,
    active_address: watch::Sender<Option<String>>,
}

impl Session {
    pub fn new(client: NodeClient, keys: KeyMaterialStore, balance_capacity: usize) -> Self {
        let (active_address, _) =
            watch::channel(keys.active_address().map(|address| address.to_string()));
        Self {
            client: Arc::new(client),
            keys,
            view: Arc::new(RwLock::new(ClientChainView::new(balance_capacity))),
            nonces: NonceSource::new(),
            submit_lock: Mutex::new(()),
            active_address,
        }
    }

    /// Build a session from configuration, loading the stored wallet if any.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = NodeClient::new(&config.rpc_base_url, config.request_timeout)?;
        let keys = KeyMaterialStore::new(FileKeyStorage::new(&config.wallet_file));
        match keys.load()? {
            Some(material) => info!(address = %material.address(), "Loaded wallet"),
            None => info!(
                path = %config.wallet_file.display(),
                "No stored wallet, use `wallet new` or `wallet import`"
            ),
        }
        Ok(Self::new(client, keys, config.balance_cache_capacity))
    }

    pub fn client(&self) -> &Arc<NodeClient> {
        &self.client
    }

    pub fn keys(&self) -> &KeyMaterialStore {
        &self.keys
    }

    pub fn view(&self) -> &Arc<RwLock<ClientChainView>> {
        &self.view
    }

    /// A poller over this session's view that also tracks the active
    /// wallet's balance.
    pub fn poller(&self, intervals: PollIntervals) -> ChainPoller<NodeClient> {
        ChainPoller::new(self.client.clone(), self.view.clone(), intervals)
            .with_balance_target(self.active_address.subscribe())
    }

    /// Generate, persist and activate a new key.
    pub fn create_wallet(&self) -> Result<KeyMaterial, ClientError> {
        let material = self.keys.generate()?;
        self.keys.persist(&material)?;
        self.publish_active(&material);
        Ok(material)
    }

    /// Import, persist and activate a hex key.
    pub fn import_wallet(&self, raw: &str) -> Result<KeyMaterial, ClientError> {
        let material = self.keys.import_from_hex(raw)?;
        self.keys.persist(&material)?;
        self.publish_active(&material);
        Ok(material)
    }

    fn publish_active(&self, material: &KeyMaterial) {
        self.active_address
            .send_replace(Some(material.address().to_string()));
    }

    /// Fetch a balance straight from the node. The cached view is left to
    /// the poller.
    pub async fn balance(&self, address: &Address) -> Result<u64, ClientError> {
        Ok(self.client.get_balance(address.as_str()).await?)
    }

    /// Sign and submit a transfer.
    ///
    /// Signs with `--key` when given, otherwise with the active wallet. A
    /// `--from` that does not belong to the signing key is rejected before
    /// anything is sent. Only one submission may be in flight per session.
    pub async fn send(&self, args: SendArgs) -> Result<SendOutcome, ClientError> {
        let _in_flight = self
            .submit_lock
            .try_lock()
            .map_err(|_| ClientError::SubmissionInFlight)?;

        let material = match &args.key {
            Some(raw) => KeyMaterial::from_hex(raw)?,
            None => self.keys.active().ok_or(ClientError::NoWalletAvailable)?,
        };

        let from = match args.from {
            Some(from) if &from != material.address() => {
                return Err(CommandError::InvalidArgument(format!(
                    "--from {from} does not match the signing key's address {}",
                    material.address()
                ))
                .into());
            }
            Some(from) => from,
            None => material.address().clone(),
        };

        let nonce = match args.nonce {
            Some(nonce) => {
                self.nonces.observe(nonce);
                nonce
            }
            None => self.nonces.next(),
        };

        let intent = TransactionIntent::new(from, args.to, args.amount, nonce)?;

        let available = self.balance(intent.from()).await?;
        if intent.amount().exceeds(available) {
            return Err(ClientError::InsufficientBalance {
                required: intent.amount(),
                available,
            });
        }

        let signed = sign_intent(intent, material.signing_key())?;
        let tx_id = signed.id();
        let receipt = self.client.submit_transaction(&signed).await?;

        info!(
            tx_id = %tx_id,
            from = %signed.intent().from(),
            to = %signed.intent().to(),
            amount = %signed.intent().amount(),
            nonce,
            status = %receipt.status,
            "Transaction submitted"
        );

        Ok(SendOutcome {
            tx_id,
            nonce,
            receipt,
        })
    }

    /// Request faucet funds for `address` (default: the active wallet) and
    /// refresh that address's cached balance.
    pub async fn faucet(&self, address: Option<Address>) -> Result<FaucetReceipt, ClientError> {
        let address = match address {
            Some(address) => address,
            None => self
                .keys
                .active_address()
                .ok_or(ClientError::NoWalletAvailable)?,
        };

        let receipt = self.client.request_faucet(address.as_str()).await?;
        info!(address = %address, amount = receipt.amount, "Faucet credited");

        match self.client.get_balance(address.as_str()).await {
            Ok(balance) => self.view.write().await.set_balance(address.as_str(), balance),
            Err(e) => {
                warn!(address = %address, error = %e, "Balance refresh after faucet failed");
                let mut view = self.view.write().await;
                view.set_balance(address.as_str(), receipt.balance);
                view.record_error(DataKind::Balance, e.to_string());
            }
        }
        Ok(receipt)
    }

    pub async fn health(&self) -> bool {
        self.client.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::Amount;
    use crate::error::ErrorKind;
    use crate::test_support::{MockNode, TEST_ADDRESS, TEST_KEY};

    const TO: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
    const OTHER_KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const OTHER_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    fn send_args(amount: u64) -> SendArgs {
        SendArgs {
            to: Address::parse(TO).unwrap(),
            amount: Amount::Whole(amount),
            from: None,
            key: None,
            nonce: None,
        }
    }

    async fn session_with_wallet(node: &MockNode) -> Session {
        let session = Session::new(node.client(), KeyMaterialStore::in_memory(), 8);
        session.import_wallet(TEST_KEY).unwrap();
        session
    }

    #[tokio::test]
    async fn send_with_active_wallet_reaches_mempool() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;

        let outcome = session.send(send_args(10)).await.unwrap();
        assert_eq!(outcome.receipt.status, "accepted");
        assert_eq!(outcome.tx_id.len(), 64);
        assert_eq!(node.mempool_len(), 1);
        // The balance guard reads the node without touching the cached view.
        assert_eq!(session.view().read().await.balance(TEST_ADDRESS), None);
    }

    #[tokio::test]
    async fn address_spellings_keep_separate_cached_balances() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;
        let checksummed = Address::parse(TEST_ADDRESS).unwrap();
        let lower = TEST_ADDRESS.to_ascii_lowercase();

        // The node keys accounts by exact text.
        assert_eq!(session.balance(&checksummed).await.unwrap(), 100);
        assert_eq!(session.balance(&Address::parse(&lower).unwrap()).await.unwrap(), 0);

        session.view().write().await.set_balance(TEST_ADDRESS, 100);
        session
            .faucet(Some(Address::parse(&lower).unwrap()))
            .await
            .unwrap();

        let view = session.view().read().await;
        assert_eq!(view.balance(&lower), Some(50));
        assert_eq!(view.balance(TEST_ADDRESS), Some(100));
    }

    #[tokio::test]
    async fn consecutive_sends_use_increasing_nonces() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;

        let first = session.send(send_args(1)).await.unwrap();
        let second = session.send(send_args(1)).await.unwrap();
        assert!(second.nonce > first.nonce);
        assert_eq!(node.mempool_len(), 2);
    }

    #[tokio::test]
    async fn explicit_key_without_from_derives_sender() {
        let node = MockNode::start().await;
        node.set_balance(OTHER_ADDRESS, 5);
        let session = Session::new(node.client(), KeyMaterialStore::in_memory(), 8);

        let mut args = send_args(5);
        args.key = Some(OTHER_KEY.to_string());
        session.send(args).await.unwrap();
        assert_eq!(node.mempool_len(), 1);
    }

    #[tokio::test]
    async fn mismatched_from_is_rejected_locally() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;

        let mut args = send_args(1);
        args.from = Some(Address::parse(OTHER_ADDRESS).unwrap());
        let err = session.send(args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(node.hits("/submitTx"), 0);
    }

    #[tokio::test]
    async fn malformed_key_is_invalid_key_format() {
        let node = MockNode::start().await;
        let session = Session::new(node.client(), KeyMaterialStore::in_memory(), 8);

        let mut args = send_args(1);
        args.key = Some("0x1234".to_string());
        let err = session.send(args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyFormat);
    }

    #[tokio::test]
    async fn amount_above_balance_is_not_submitted() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 3);
        let session = session_with_wallet(&node).await;

        let err = session.send(send_args(10)).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InsufficientBalance { available: 3, .. }
        ));
        assert_eq!(node.hits("/submitTx"), 0);
    }

    #[tokio::test]
    async fn reused_nonce_surfaces_node_rejection() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;

        let mut args = send_args(1);
        args.nonce = Some(42);
        session.send(args.clone()).await.unwrap();

        let err = session.send(args).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RpcError);
        assert!(err.to_string().contains("invalid nonce"));

        // Timestamp nonces resume above the explicit one.
        let outcome = session.send(send_args(1)).await.unwrap();
        assert!(outcome.nonce > 42);
    }

    #[tokio::test]
    async fn rate_limited_submission_is_distinct() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        node.force_submit_status(429, "too many requests");
        let session = session_with_wallet(&node).await;

        let err = session.send(send_args(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn concurrent_submission_fails_fast() {
        let node = MockNode::start().await;
        node.set_balance(TEST_ADDRESS, 100);
        let session = session_with_wallet(&node).await;

        let held = session.submit_lock.lock().await;
        let err = session.send(send_args(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::SubmissionInFlight));
        drop(held);

        session.send(send_args(1)).await.unwrap();
    }

    #[tokio::test]
    async fn faucet_credits_active_wallet_and_refreshes_balance() {
        let node = MockNode::start().await;
        let session = session_with_wallet(&node).await;

        let receipt = session.faucet(None).await.unwrap();
        assert_eq!(receipt.amount, 50);
        assert_eq!(session.view().read().await.balance(TEST_ADDRESS), Some(50));

        let err = session.faucet(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn faucet_without_wallet_or_address_fails() {
        let node = MockNode::start().await;
        let session = Session::new(node.client(), KeyMaterialStore::in_memory(), 8);
        let err = session.faucet(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoWalletAvailable);
        assert_eq!(node.hits("/faucet"), 0);
    }

    #[tokio::test]
    async fn wallet_changes_are_published_to_the_poller() {
        let node = MockNode::start().await;
        let session = Session::new(node.client(), KeyMaterialStore::in_memory(), 8);
        let watched = session.active_address.subscribe();
        assert!(watched.borrow().is_none());

        session.import_wallet(TEST_KEY).unwrap();
        assert_eq!(watched.borrow().as_deref(), Some(TEST_ADDRESS));

        let created = session.create_wallet().unwrap();
        assert_eq!(
            watched.borrow().as_deref(),
            Some(created.address().as_str())
        );
    }

    #[tokio::test]
    async fn from_config_loads_the_stored_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let node = MockNode::start().await;
        let config = ClientConfig {
            rpc_base_url: node.url.clone(),
            wallet_file: dir.path().join("wallet.json"),
            ..ClientConfig::default()
        };

        let first = Session::from_config(&config).unwrap();
        assert!(first.keys().active().is_none());
        first.import_wallet(TEST_KEY).unwrap();

        let second = Session::from_config(&config).unwrap();
        assert_eq!(
            second.keys().active_address().map(|a| a.to_string()).as_deref(),
            Some(TEST_ADDRESS)
        );
        assert_eq!(second.active_address.borrow().as_deref(), Some(TEST_ADDRESS));
    }
}
