//! Shared fixtures for collector tests: an in-memory `Store`, a sleeper that
//! records instead of waiting, and a graph client pointed at wiremock.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use instapulse_core::{
    Account, AccountCredential, Credential, NewAudienceMetric, NewCollectionLog, NewInsight, Store,
    StoreError,
};
use instapulse_graph::{GraphClient, GraphConfig, RetryPolicy, Sleeper};

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Graph client against `base_url` with a recording sleeper and a single
/// retry, so retriable failures resolve without wall-clock waits.
pub fn graph_client(base_url: &str, sleeper: Arc<RecordingSleeper>) -> Arc<GraphClient> {
    let config = GraphConfig::new("app-id", "app-secret", "https://app.example.com/cb")
        .with_base_url(base_url)
        .with_sleeper(sleeper)
        .with_retry(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1_000),
            max_jitter: Duration::ZERO,
        });
    Arc::new(GraphClient::new(config).expect("client construction should not fail"))
}

#[derive(Debug, Clone)]
pub struct StoredInsight {
    pub account_id: i64,
    pub insight: NewInsight,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredAudience {
    pub account_id: i64,
    pub metric: NewAudienceMetric,
}

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    credentials: Vec<Credential>,
    insights: Vec<StoredInsight>,
    audience: Vec<StoredAudience>,
    logs: Vec<NewCollectionLog>,
    invalidations: Vec<(i64, String)>,
}

/// `Store` over plain vectors with the same selection rules as Postgres:
/// only the newest valid credential per account is considered.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_account_loading: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_account_loading(&self) {
        self.fail_account_loading.store(true, Ordering::SeqCst);
    }

    /// Inserts an account with one valid credential expiring at `expires_at`.
    pub fn seed_account(
        &self,
        external_account_id: &str,
        page_access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> (Account, Credential) {
        let mut state = self.state.lock().unwrap();
        let account = new_account(&mut state, external_account_id, None, Some("page-1"));
        let credential = new_credential(
            &mut state,
            account.id,
            &format!("user-{external_account_id}"),
            page_access_token,
            expires_at,
        );
        (account, credential)
    }

    /// Inserts an extra credential for an existing account.
    pub fn seed_credential(
        &self,
        account_id: i64,
        user_access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Credential {
        let mut state = self.state.lock().unwrap();
        new_credential(&mut state, account_id, user_access_token, "page", expires_at)
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state.lock().unwrap().accounts.clone()
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.state.lock().unwrap().credentials.clone()
    }

    pub fn credentials_for(&self, account_id: i64) -> Vec<Credential> {
        self.credentials()
            .into_iter()
            .filter(|c| c.account_id == account_id)
            .collect()
    }

    pub fn insights(&self) -> Vec<StoredInsight> {
        self.state.lock().unwrap().insights.clone()
    }

    pub fn audience(&self) -> Vec<StoredAudience> {
        self.state.lock().unwrap().audience.clone()
    }

    pub fn logs(&self) -> Vec<NewCollectionLog> {
        self.state.lock().unwrap().logs.clone()
    }

    pub fn invalidations(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().invalidations.clone()
    }
}

fn new_account(
    state: &mut State,
    external_account_id: &str,
    username: Option<&str>,
    page_id: Option<&str>,
) -> Account {
    let now = Utc::now();
    let account = Account {
        id: i64::try_from(state.accounts.len()).unwrap() + 1,
        external_account_id: external_account_id.to_owned(),
        username: username.map(str::to_owned),
        page_id: page_id.map(str::to_owned),
        created_at: now,
        updated_at: now,
    };
    state.accounts.push(account.clone());
    account
}

fn new_credential(
    state: &mut State,
    account_id: i64,
    user_access_token: &str,
    page_access_token: &str,
    expires_at: DateTime<Utc>,
) -> Credential {
    let credential = Credential {
        id: i64::try_from(state.credentials.len()).unwrap() + 1,
        account_id,
        user_access_token: user_access_token.to_owned(),
        page_access_token: page_access_token.to_owned(),
        expires_at,
        is_valid: true,
        invalid_reason: None,
        created_at: Utc::now(),
    };
    state.credentials.push(credential.clone());
    credential
}

/// Newest valid credential per account; ids grow with insertion order.
fn latest_valid(state: &State) -> Vec<Credential> {
    let mut latest: Vec<Credential> = Vec::new();
    for credential in state.credentials.iter().filter(|c| c.is_valid) {
        match latest
            .iter_mut()
            .find(|c| c.account_id == credential.account_id)
        {
            Some(existing) if existing.id < credential.id => *existing = credential.clone(),
            Some(_) => {}
            None => latest.push(credential.clone()),
        }
    }
    latest
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_accounts_with_credentials(
        &self,
    ) -> Result<Vec<AccountCredential>, StoreError> {
        if self.fail_account_loading.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        let state = self.state.lock().unwrap();
        let mut pairs: Vec<AccountCredential> = latest_valid(&state)
            .into_iter()
            .filter_map(|credential| {
                state
                    .accounts
                    .iter()
                    .find(|a| a.id == credential.account_id)
                    .map(|account| AccountCredential {
                        account: account.clone(),
                        credential,
                    })
            })
            .collect();
        pairs.sort_by_key(|p| p.account.id);
        Ok(pairs)
    }

    async fn get_account(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.iter().find(|a| a.id == account_id).cloned())
    }

    async fn upsert_account(
        &self,
        external_account_id: &str,
        username: Option<&str>,
        page_id: Option<&str>,
    ) -> Result<Account, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state
            .accounts
            .iter_mut()
            .find(|a| a.external_account_id == external_account_id)
        {
            Some(account) => {
                account.username = username.map(str::to_owned);
                account.page_id = page_id.map(str::to_owned);
                account.updated_at = Utc::now();
                Ok(account.clone())
            }
            None => Ok(new_account(&mut state, external_account_id, username, page_id)),
        }
    }

    async fn save_credential(
        &self,
        account_id: i64,
        user_access_token: &str,
        page_access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Credential, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(new_credential(
            &mut state,
            account_id,
            user_access_token,
            page_access_token,
            expires_at,
        ))
    }

    async fn invalidate_credential(
        &self,
        credential_id: i64,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.invalidations.push((credential_id, reason.to_owned()));
        let credential = state
            .credentials
            .iter_mut()
            .find(|c| c.id == credential_id)
            .ok_or(StoreError::NotFound)?;
        if credential.is_valid {
            credential.is_valid = false;
            credential.invalid_reason = Some(reason.to_owned());
        }
        Ok(())
    }

    async fn list_expiring_credentials(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Credential>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut expiring: Vec<Credential> = latest_valid(&state)
            .into_iter()
            .filter(|c| c.expires_at < threshold)
            .collect();
        expiring.sort_by_key(|c| (c.expires_at, c.id));
        Ok(expiring)
    }

    async fn append_insights(
        &self,
        account_id: i64,
        insights: &[NewInsight],
        collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .insights
            .extend(insights.iter().cloned().map(|insight| StoredInsight {
                account_id,
                insight,
                collected_at,
            }));
        Ok(())
    }

    async fn append_audience(
        &self,
        account_id: i64,
        metrics: &[NewAudienceMetric],
        _collected_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .audience
            .extend(metrics.iter().cloned().map(|metric| StoredAudience {
                account_id,
                metric,
            }));
        Ok(())
    }

    async fn append_collection_log(&self, entry: &NewCollectionLog) -> Result<(), StoreError> {
        self.state.lock().unwrap().logs.push(entry.clone());
        Ok(())
    }
}
