//! Local account records backing the development identity provider.

use rusqlite::{params, OptionalExtension};

use crate::database::{db_now, from_db_time, to_db_time, Database};
use crate::error::Result;
use crate::models::Account;

impl Database {
    /// Insert or replace an account (matched on `id`).
    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.conn().execute(
            "INSERT INTO accounts (id, email, user_name, token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                user_name = excluded.user_name,
                token = excluded.token",
            params![
                account.id,
                account.email,
                account.user_name,
                account.token,
                to_db_time(&account.created_at),
            ],
        )?;
        Ok(())
    }

    /// Convenience for provisioning: creates the account with `created_at = now`.
    pub fn provision_account(
        &self,
        id: &str,
        email: &str,
        user_name: Option<&str>,
        token: &str,
    ) -> Result<Account> {
        let account = Account {
            id: id.to_string(),
            email: email.to_string(),
            user_name: user_name.map(str::to_string),
            token: token.to_string(),
            created_at: db_now(),
        };
        self.upsert_account(&account)?;
        Ok(account)
    }

    pub fn account_by_token(&self, token: &str) -> Result<Option<Account>> {
        let account = self
            .conn()
            .query_row(
                "SELECT id, email, user_name, token, created_at
                 FROM accounts WHERE token = ?1",
                params![token],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Display name of an account; `None` when the account is unknown or has
    /// no name set.
    pub fn display_name(&self, account_id: &str) -> Result<Option<String>> {
        let name: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT user_name FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten())
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let created_str: String = row.get(4)?;
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        user_name: row.get(2)?,
        token: row.get(3)?,
        created_at: from_db_time(4, &created_str)?,
    })
}
