//! Access tokens for a running upload, backed by an account's stored credential

use reqwest::blocking::Client;

use super::credentials::{AccountStore, Credential, CredentialError};
use crate::upload::{TokenSource, TransportError};

/// Token source for one account; refreshed tokens are written back to the store
pub struct AccountTokens {
    store: AccountStore,
    client: Client,
    account: String,
    credential: Credential,
}

impl AccountTokens {
    /// Load `account` and make sure it holds a usable access token
    pub fn open(
        store: AccountStore,
        client: Client,
        account: &str,
    ) -> Result<Self, CredentialError> {
        let mut credential = store.load(account)?;
        store.ensure_fresh(&client, account, &mut credential)?;
        Ok(Self {
            store,
            client,
            account: account.to_string(),
            credential,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

fn credential_error(e: CredentialError) -> TransportError {
    TransportError::Credential(e.to_string())
}

impl TokenSource for AccountTokens {
    fn access_token(&mut self) -> Result<String, TransportError> {
        self.store
            .ensure_fresh(&self.client, &self.account, &mut self.credential)
            .map_err(credential_error)
    }

    fn refresh(&mut self) -> Result<String, TransportError> {
        self.store
            .refresh(&self.client, &self.account, &mut self.credential)
            .map_err(credential_error)
    }
}
