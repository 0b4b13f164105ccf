//! OAuth token exchange.
//!
//! Four stateless steps turn an authorization code into a page-scoped token:
//! code → short-lived user token → long-lived user token → page token, plus
//! the lookup of the analytics account linked to that page. Steps are never
//! retried; each wraps failures with a description of the step, keeping the
//! provider's own message in the chain. The page step may fall back to the
//! pages owned through Business Manager.

use std::collections::HashSet;

use reqwest::Url;

use crate::client::GraphClient;
use crate::error::GraphError;
use crate::types::{BusinessList, Page, PageLinkResponse, PageList, TokenResponse};

const PAGES_STEP: &str = "failed to get pages";
const PAGE_FIELDS: &str = "id,name,access_token";

/// Permissions requested in the authorization dialog.
pub const OAUTH_SCOPES: [&str; 4] = [
    "instagram_basic",
    "instagram_manage_insights",
    "pages_show_list",
    "pages_read_engagement",
];

/// Lifetime assumed for a long-lived token when the provider omits
/// `expires_in` (60 days).
pub const DEFAULT_LONG_LIVED_EXPIRES_IN_SECS: i64 = 60 * 24 * 60 * 60;

#[derive(Clone, PartialEq, Eq)]
pub struct LongLivedToken {
    pub access_token: String,
    pub expires_in_secs: i64,
}

impl std::fmt::Debug for LongLivedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongLivedToken")
            .field("access_token", &"[redacted]")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PageToken {
    pub page_id: String,
    pub page_access_token: String,
}

impl std::fmt::Debug for PageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageToken")
            .field("page_id", &self.page_id)
            .field("page_access_token", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub external_account_id: String,
    pub username: Option<String>,
}

impl GraphClient {
    /// Authorization dialog URL carrying the client id, redirect URI, CSRF
    /// `state` and the fixed scope list.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidUrl`] if the dialog URL cannot be built.
    pub fn authorization_url(&self, state: &str) -> Result<Url, GraphError> {
        let mut url = self.dialog_url()?;
        url.query_pairs_mut()
            .append_pair("client_id", self.app_id())
            .append_pair("redirect_uri", self.redirect_uri())
            .append_pair("state", state)
            .append_pair("scope", &OAUTH_SCOPES.join(","))
            .append_pair("response_type", "code");
        Ok(url)
    }

    /// Exchanges an authorization code for a short-lived user token.
    ///
    /// # Errors
    ///
    /// Any provider or transport failure, or [`GraphError::MissingToken`] when
    /// the response has no token, wrapped in [`GraphError::Step`].
    pub async fn exchange_code_for_user_token(&self, code: &str) -> Result<String, GraphError> {
        const STEP: &str = "failed to exchange code for token";

        let url = self
            .build_url(
                "oauth/access_token",
                &[
                    ("client_id", self.app_id()),
                    ("redirect_uri", self.redirect_uri()),
                    ("client_secret", self.app_secret()),
                    ("code", code),
                ],
            )
            .map_err(|e| e.in_step(STEP))?;

        let response: TokenResponse = self
            .get_json(&url, "oauth/access_token (code)")
            .await
            .map_err(|e| e.in_step(STEP))?;

        response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GraphError::MissingToken {
                    context: "code exchange",
                }
                .in_step(STEP)
            })
    }

    /// Exchanges a user token (short- or long-lived) for a fresh long-lived one.
    ///
    /// `expires_in_secs` falls back to [`DEFAULT_LONG_LIVED_EXPIRES_IN_SECS`]
    /// when the provider omits it.
    ///
    /// # Errors
    ///
    /// Any provider or transport failure, or [`GraphError::MissingToken`],
    /// wrapped in [`GraphError::Step`]. An expired or revoked input token
    /// surfaces as [`GraphError::ProviderAuthError`] inside the wrapper.
    pub async fn exchange_for_long_lived_token(
        &self,
        user_token: &str,
    ) -> Result<LongLivedToken, GraphError> {
        const STEP: &str = "failed to get long-lived token";

        let url = self
            .build_url(
                "oauth/access_token",
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", self.app_id()),
                    ("client_secret", self.app_secret()),
                    ("fb_exchange_token", user_token),
                ],
            )
            .map_err(|e| e.in_step(STEP))?;

        let response: TokenResponse = self
            .get_json(&url, "oauth/access_token (fb_exchange_token)")
            .await
            .map_err(|e| e.in_step(STEP))?;

        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GraphError::MissingToken {
                    context: "long-lived token",
                }
                .in_step(STEP)
            })?;

        Ok(LongLivedToken {
            access_token,
            expires_in_secs: response
                .expires_in
                .unwrap_or(DEFAULT_LONG_LIVED_EXPIRES_IN_SECS),
        })
    }

    /// Resolves the page token for the first page the user manages.
    ///
    /// Accounts managing several pages always get the first one returned.
    /// See [`Self::list_pages`] for where pages come from.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoPage`] when the user manages no pages, plus any provider
    /// or transport failure, wrapped in [`GraphError::Step`].
    pub async fn resolve_page_token(&self, user_token: &str) -> Result<PageToken, GraphError> {
        let page = self
            .list_pages(user_token)
            .await
            .map_err(|e| e.in_step(PAGES_STEP))?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::NoPage.in_step(PAGES_STEP))?;
        page_token(page)
    }

    /// Resolves the page token for the page with id `page_id`, ignoring any
    /// other pages the user manages.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoPage`] when `page_id` is not among the user's pages,
    /// plus any provider or transport failure, wrapped in [`GraphError::Step`].
    pub async fn resolve_page_token_for(
        &self,
        user_token: &str,
        page_id: &str,
    ) -> Result<PageToken, GraphError> {
        let page = self
            .list_pages(user_token)
            .await
            .map_err(|e| e.in_step(PAGES_STEP))?
            .into_iter()
            .find(|page| page.id == page_id)
            .ok_or_else(|| GraphError::NoPage.in_step(PAGES_STEP))?;
        page_token(page)
    }

    /// Pages the user can act on, deduplicated by id in provider order.
    ///
    /// `/me/accounts` is authoritative. Only when it lists nothing are the
    /// pages owned by the user's Business Manager businesses consulted; a
    /// failing business lookup is logged and contributes no pages.
    async fn list_pages(&self, user_token: &str) -> Result<Vec<Page>, GraphError> {
        let url = self.build_url(
            "me/accounts",
            &[("access_token", user_token), ("fields", PAGE_FIELDS)],
        )?;
        let pages: PageList = self.get_json(&url, "me/accounts").await?;
        if !pages.data.is_empty() {
            return Ok(dedupe_pages(pages.data));
        }

        let url = self.build_url("me/businesses", &[("access_token", user_token)])?;
        let businesses: BusinessList = match self.get_json(&url, "me/businesses").await {
            Ok(businesses) => businesses,
            Err(e) => {
                tracing::warn!(error = %e, "business lookup failed; no owned pages");
                return Ok(Vec::new());
            }
        };

        let mut owned = Vec::new();
        for business in businesses.data.iter().filter(|b| !b.id.is_empty()) {
            let url = self.build_url(
                &format!("{}/owned_pages", business.id),
                &[("access_token", user_token), ("fields", PAGE_FIELDS)],
            )?;
            match self.get_json::<PageList>(&url, "owned_pages").await {
                Ok(pages) => owned.extend(pages.data),
                Err(e) => {
                    tracing::warn!(
                        business_id = %business.id,
                        error = %e,
                        "owned pages lookup failed; skipping business"
                    );
                }
            }
        }

        Ok(dedupe_pages(owned))
    }

    /// Looks up the analytics account linked to `page_id`.
    ///
    /// # Errors
    ///
    /// [`GraphError::NoLinkedAccount`] when the page has no linked account,
    /// plus any provider or transport failure, wrapped in [`GraphError::Step`].
    pub async fn resolve_linked_account(
        &self,
        page_id: &str,
        page_token: &str,
    ) -> Result<LinkedAccount, GraphError> {
        const STEP: &str = "failed to get linked account";

        let url = self
            .build_url(
                page_id,
                &[
                    ("fields", "instagram_business_account{id,username}"),
                    ("access_token", page_token),
                ],
            )
            .map_err(|e| e.in_step(STEP))?;

        let response: PageLinkResponse = self
            .get_json(&url, "page linked account")
            .await
            .map_err(|e| e.in_step(STEP))?;

        let linked = response.instagram_business_account.ok_or_else(|| {
            GraphError::NoLinkedAccount {
                page_id: page_id.to_owned(),
            }
            .in_step(STEP)
        })?;

        Ok(LinkedAccount {
            external_account_id: linked.id,
            username: linked.username,
        })
    }
}

fn page_token(page: Page) -> Result<PageToken, GraphError> {
    let page_access_token = page
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GraphError::MissingToken { context: "page" }.in_step(PAGES_STEP))?;
    Ok(PageToken {
        page_id: page.id,
        page_access_token,
    })
}

/// Keeps the first occurrence of each page id.
fn dedupe_pages(pages: Vec<Page>) -> Vec<Page> {
    let mut seen = HashSet::new();
    pages
        .into_iter()
        .filter(|page| seen.insert(page.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::client::GraphConfig;

    use super::*;

    #[test]
    fn authorization_url_carries_client_state_and_scopes() {
        let client = GraphClient::new(GraphConfig::new(
            "123456",
            "secret",
            "https://app.example.com/api/auth/callback",
        ))
        .unwrap();
        let url = client.authorization_url("abc123").unwrap();

        assert_eq!(url.host_str(), Some("www.facebook.com"));
        assert_eq!(url.path(), "/v18.0/dialog/oauth");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "123456");
        assert_eq!(
            pairs["redirect_uri"],
            "https://app.example.com/api/auth/callback"
        );
        assert_eq!(pairs["state"], "abc123");
        assert_eq!(
            pairs["scope"],
            "instagram_basic,instagram_manage_insights,pages_show_list,pages_read_engagement"
        );
        assert_eq!(pairs["response_type"], "code");
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = LongLivedToken {
            access_token: "EAAB-long".to_owned(),
            expires_in_secs: 10,
        };
        assert!(!format!("{token:?}").contains("EAAB"));
        let page = PageToken {
            page_id: "1".to_owned(),
            page_access_token: "EAAB-page".to_owned(),
        };
        assert!(!format!("{page:?}").contains("EAAB"));
    }

    fn page(id: &str, token: &str) -> Page {
        Page {
            id: id.to_owned(),
            access_token: Some(token.to_owned()),
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let pages = dedupe_pages(vec![
            page("p1", "first"),
            page("p2", "second"),
            page("p1", "again"),
        ]);
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
        assert_eq!(pages[0].access_token.as_deref(), Some("first"));
    }

    #[test]
    fn page_without_token_is_missing_token() {
        let err = page_token(Page {
            id: "p1".to_owned(),
            access_token: Some(String::new()),
        })
        .unwrap_err();
        assert!(matches!(err.root(), GraphError::MissingToken { .. }));
    }

    #[test]
    fn default_expiry_is_sixty_days() {
        assert_eq!(DEFAULT_LONG_LIVED_EXPIRES_IN_SECS, 5_184_000);
    }
}
