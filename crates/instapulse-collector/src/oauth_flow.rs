//! Completes an OAuth callback once the HTTP layer has validated the state.

use chrono::Utc;
use instapulse_core::{Account, Store};
use instapulse_graph::GraphClient;

use crate::tokens::expiry_from;
use crate::CollectorError;

/// Runs the four-step exchange for `code`, then creates or updates the
/// account and appends a credential expiring `expires_in` seconds from now.
///
/// Nothing is written unless all four steps succeed.
///
/// # Errors
///
/// Returns [`CollectorError::Graph`] for any exchange failure and
/// [`CollectorError::Store`] if persisting the account or credential fails.
pub async fn complete_authorization(
    graph: &GraphClient,
    store: &dyn Store,
    code: &str,
) -> Result<Account, CollectorError> {
    let short_lived = graph.exchange_code_for_user_token(code).await?;
    let long_lived = graph.exchange_for_long_lived_token(&short_lived).await?;
    let page = graph.resolve_page_token(&long_lived.access_token).await?;
    let linked = graph
        .resolve_linked_account(&page.page_id, &page.page_access_token)
        .await?;

    let account = store
        .upsert_account(
            &linked.external_account_id,
            linked.username.as_deref(),
            Some(&page.page_id),
        )
        .await?;

    let expires_at = expiry_from(Utc::now(), long_lived.expires_in_secs);
    let credential = store
        .save_credential(
            account.id,
            &long_lived.access_token,
            &page.page_access_token,
            expires_at,
        )
        .await?;

    tracing::info!(
        account_id = account.id,
        external_account_id = %account.external_account_id,
        credential_id = credential.id,
        expires_at = %credential.expires_at,
        "account linked"
    );

    Ok(account)
}
