//! Per-account credit ledger with an append-only transaction log.
//!
//! Each account lives in its own `Mutex` cell. The outer map is behind a
//! `RwLock` that is held only long enough to find or insert a cell, so
//! operations on different accounts never wait on each other's balance
//! critical section.
//!
//! Inside a cell the balance change and its [`Transaction`] are applied
//! together. When a [`TransactionJournal`] is attached the journal append
//! happens inside the same critical section, and a failed append leaves the
//! account untouched.
//!
//! The in-memory path never blocks one account on another. A journal is
//! allowed to serialize its own writes: `SqliteJournal` holds a single
//! connection, so with it attached two accounts committing at the same moment
//! wait on each other's `INSERT` (not on each other's balance check). Callers
//! that need independent write throughput per account should attach a journal
//! with a connection per writer.
//!
//! A refused debit against an account that was never credited is reported as
//! `InsufficientFunds` with a zero balance and recorded without opening the
//! account.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::locks;
use crate::error::{Result, RouterError};

// =============================================================================
// Transactions
// =============================================================================

/// Kind of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Purchase,
    Debit,
    Refund,
    Bonus,
    Adjustment,
}

impl TransactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Debit => "debit",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
            Self::Adjustment => "adjustment",
        }
    }

    /// Parse the stored name.
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(Self::Purchase),
            "debit" => Some(Self::Debit),
            "refund" => Some(Self::Refund),
            "bonus" => Some(Self::Bonus),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds accepted by [`CreditLedger::credit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditKind {
    Purchase,
    Refund,
    Bonus,
    /// Manual correction; may be negative.
    Adjustment,
}

impl CreditKind {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "purchase" => Some(Self::Purchase),
            "refund" => Some(Self::Refund),
            "bonus" => Some(Self::Bonus),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

impl From<CreditKind> for TransactionKind {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Purchase => Self::Purchase,
            CreditKind::Refund => Self::Refund,
            CreditKind::Bonus => Self::Bonus,
            CreditKind::Adjustment => Self::Adjustment,
        }
    }
}

/// Optional usage reference attached to a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionMeta {
    /// Metadata for a metered provider call.
    #[must_use]
    pub fn usage(
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Self {
        Self {
            provider_id: Some(provider_id.into()),
            model_id: Some(model_id.into()),
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            note: None,
        }
    }

    /// Metadata carrying only a free-form note.
    #[must_use]
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }
}

/// One immutable row of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: u64,
    pub account_id: String,
    /// Signed amount: positive credits, negative debits.
    pub amount: Decimal,
    /// Balance right after this transaction.
    pub balance_after: Decimal,
    pub kind: TransactionKind,
    #[serde(default)]
    pub meta: TransactionMeta,
    pub created_at: DateTime<Utc>,
}

/// Why a debit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientFunds,
    SpendingCap,
}

impl RejectionReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::SpendingCap => "spending_cap",
        }
    }

    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "insufficient_funds" => Some(Self::InsufficientFunds),
            "spending_cap" => Some(Self::SpendingCap),
            _ => None,
        }
    }
}

/// A debit attempt that was refused. The balance was not touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedDebit {
    pub account_id: String,
    pub amount: Decimal,
    /// Balance at the time of the attempt.
    pub balance: Decimal,
    pub reason: RejectionReason,
    #[serde(default)]
    pub meta: TransactionMeta,
    pub attempted_at: DateTime<Utc>,
}

/// Result of a successful balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub balance: Decimal,
    pub tx_id: u64,
}

// =============================================================================
// Accounts
// =============================================================================

/// Balance state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub id: String,
    pub balance: Decimal,
    pub lifetime_purchased: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cap: Option<Decimal>,
    /// Debits since `last_reset`.
    pub month_spent: Decimal,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CreditAccount {
    fn open(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            balance: Decimal::ZERO,
            lifetime_purchased: Decimal::ZERO,
            monthly_cap: None,
            month_spent: Decimal::ZERO,
            last_reset: now,
            created_at: now,
        }
    }

    /// Reset month-to-date spend when `now` is in a later calendar month.
    fn roll_month(&mut self, now: DateTime<Utc>) {
        if (now.year(), now.month()) != (self.last_reset.year(), self.last_reset.month()) {
            self.month_spent = Decimal::ZERO;
            self.last_reset = now;
        }
    }

    /// Cap headroom left this month, if a cap is set.
    #[must_use]
    pub fn cap_remaining(&self) -> Option<Decimal> {
        self.monthly_cap
            .map(|cap| (cap - self.month_spent).max(Decimal::ZERO))
    }
}

#[derive(Debug)]
struct AccountCell {
    account: CreditAccount,
    transactions: Vec<Transaction>,
    rejections: Vec<RejectedDebit>,
}

impl AccountCell {
    fn new(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            account: CreditAccount::open(id, now),
            transactions: Vec::new(),
            rejections: Vec::new(),
        }
    }
}

// =============================================================================
// Journal
// =============================================================================

/// Durable sink for ledger rows, called inside the account critical section.
pub trait TransactionJournal: Send + Sync {
    /// Persist a committed transaction.
    ///
    /// # Errors
    /// A failure aborts the balance mutation.
    fn append(&self, tx: &Transaction) -> Result<()>;

    /// Persist a refused debit.
    ///
    /// # Errors
    /// Returns an error if the write fails; the ledger logs it and moves on.
    fn append_rejection(&self, rejection: &RejectedDebit) -> Result<()>;

    /// Persist a monthly cap change.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn set_cap(&self, account_id: &str, cap: Option<Decimal>) -> Result<()>;

    /// Read back everything written so far, transactions in id order.
    ///
    /// # Errors
    /// Returns an error if the journal cannot be read.
    fn load(&self) -> Result<JournalContents>;
}

/// Everything a journal holds.
#[derive(Debug, Clone, Default)]
pub struct JournalContents {
    pub transactions: Vec<Transaction>,
    pub rejections: Vec<RejectedDebit>,
    pub caps: Vec<(String, Option<Decimal>)>,
}

// =============================================================================
// Ledger
// =============================================================================

/// Credit ledger. Share it behind an `Arc`.
#[derive(Default)]
pub struct CreditLedger {
    accounts: RwLock<HashMap<String, Arc<Mutex<AccountCell>>>>,
    /// Refusals for ids that have no account yet.
    unopened_rejections: Mutex<HashMap<String, Vec<RejectedDebit>>>,
    next_tx: AtomicU64,
    journal: Option<Arc<dyn TransactionJournal>>,
}

impl fmt::Debug for CreditLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditLedger")
            .field("accounts", &locks::read(&self.accounts).len())
            .field("next_tx", &self.next_tx.load(Ordering::SeqCst))
            .field("journal", &self.journal.is_some())
            .finish()
    }
}

impl CreditLedger {
    /// In-memory ledger with no journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ledger that writes through to `journal`.
    #[must_use]
    pub fn with_journal(journal: Arc<dyn TransactionJournal>) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// Rebuild a ledger by replaying `journal`, then keep writing to it.
    ///
    /// # Errors
    /// Returns `Storage` if the journal cannot be read or its running
    /// balances do not add up.
    pub fn restore(journal: Arc<dyn TransactionJournal>) -> Result<Self> {
        let contents = journal.load()?;
        let mut cells: HashMap<String, AccountCell> = HashMap::new();
        let mut max_id = 0;
        let month_start = Utc::now();

        for tx in contents.transactions {
            let cell = cells
                .entry(tx.account_id.clone())
                .or_insert_with(|| AccountCell::new(&tx.account_id, tx.created_at));
            let expected = cell.account.balance.checked_add(tx.amount);
            if expected != Some(tx.balance_after) || tx.balance_after.is_sign_negative() {
                return Err(RouterError::Storage(format!(
                    "journal inconsistent for {} at transaction {}: balance {} plus {} does not give {}",
                    tx.account_id, tx.id, cell.account.balance, tx.amount, tx.balance_after
                )));
            }
            cell.account.balance = tx.balance_after;
            if tx.kind == TransactionKind::Purchase {
                cell.account.lifetime_purchased += tx.amount;
            }
            if tx.kind == TransactionKind::Debit && same_month(tx.created_at, month_start) {
                cell.account.month_spent -= tx.amount;
            }
            max_id = max_id.max(tx.id);
            cell.transactions.push(tx);
        }

        for (account_id, cap) in contents.caps {
            if let Some(cell) = cells.get_mut(&account_id) {
                cell.account.monthly_cap = cap;
            }
        }
        let mut unopened: HashMap<String, Vec<RejectedDebit>> = HashMap::new();
        for rejection in contents.rejections {
            match cells.get_mut(&rejection.account_id) {
                Some(cell) => cell.rejections.push(rejection),
                None => unopened
                    .entry(rejection.account_id.clone())
                    .or_default()
                    .push(rejection),
            }
        }
        for cell in cells.values_mut() {
            cell.account.last_reset = month_start;
        }

        tracing::info!(
            accounts = cells.len(),
            last_tx = max_id,
            "Ledger restored from journal"
        );

        Ok(Self {
            accounts: RwLock::new(
                cells
                    .into_iter()
                    .map(|(id, cell)| (id, Arc::new(Mutex::new(cell))))
                    .collect(),
            ),
            unopened_rejections: Mutex::new(unopened),
            next_tx: AtomicU64::new(max_id),
            journal: Some(journal),
        })
    }

    fn cell(&self, account_id: &str) -> Option<Arc<Mutex<AccountCell>>> {
        locks::read(&self.accounts).get(account_id).cloned()
    }

    fn cell_or_open(&self, account_id: &str) -> Arc<Mutex<AccountCell>> {
        if let Some(cell) = self.cell(account_id) {
            return cell;
        }
        let mut accounts = locks::write(&self.accounts);
        Arc::clone(accounts.entry(account_id.to_string()).or_insert_with(|| {
            tracing::debug!(account = account_id, "Opening ledger account");
            Arc::new(Mutex::new(AccountCell::new(account_id, Utc::now())))
        }))
    }

    fn next_id(&self) -> u64 {
        self.next_tx.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Commit `amount` to the cell, journal first. Caller holds the cell lock.
    fn commit(
        &self,
        cell: &mut AccountCell,
        amount: Decimal,
        kind: TransactionKind,
        meta: TransactionMeta,
        now: DateTime<Utc>,
    ) -> Result<LedgerReceipt> {
        let overflow = || RouterError::InvalidAmount {
            amount,
            kind: kind.to_string(),
        };
        let balance_after = cell.account.balance.checked_add(amount).ok_or_else(overflow)?;
        let lifetime_purchased = match kind {
            TransactionKind::Purchase => cell
                .account
                .lifetime_purchased
                .checked_add(amount)
                .ok_or_else(overflow)?,
            _ => cell.account.lifetime_purchased,
        };
        let month_spent = match kind {
            TransactionKind::Debit => cell
                .account
                .month_spent
                .checked_sub(amount)
                .ok_or_else(overflow)?,
            _ => cell.account.month_spent,
        };
        let tx = Transaction {
            id: self.next_id(),
            account_id: cell.account.id.clone(),
            amount,
            balance_after,
            kind,
            meta,
            created_at: now,
        };
        if let Some(journal) = &self.journal {
            journal.append(&tx)?;
        }

        cell.account.balance = balance_after;
        cell.account.lifetime_purchased = lifetime_purchased;
        cell.account.month_spent = month_spent;
        let receipt = LedgerReceipt {
            balance: balance_after,
            tx_id: tx.id,
        };
        cell.transactions.push(tx);
        Ok(receipt)
    }

    fn reject(
        &self,
        cell: &mut AccountCell,
        amount: Decimal,
        reason: RejectionReason,
        meta: TransactionMeta,
        now: DateTime<Utc>,
    ) {
        let rejection = self.refusal(
            &cell.account.id,
            cell.account.balance,
            amount,
            reason,
            meta,
            now,
        );
        cell.rejections.push(rejection);
    }

    /// Log and journal a refused debit; the caller stores it.
    fn refusal(
        &self,
        account_id: &str,
        balance: Decimal,
        amount: Decimal,
        reason: RejectionReason,
        meta: TransactionMeta,
        now: DateTime<Utc>,
    ) -> RejectedDebit {
        let rejection = RejectedDebit {
            account_id: account_id.to_string(),
            amount,
            balance,
            reason,
            meta,
            attempted_at: now,
        };
        tracing::warn!(
            account = %rejection.account_id,
            amount = %amount,
            balance = %rejection.balance,
            reason = reason.as_str(),
            provider = rejection.meta.provider_id.as_deref().unwrap_or("-"),
            "Debit rejected"
        );
        if let Some(journal) = &self.journal
            && let Err(err) = journal.append_rejection(&rejection)
        {
            tracing::error!(
                account = %rejection.account_id,
                error = %err,
                "Failed to journal rejected debit"
            );
        }
        rejection
    }

    /// Refuse a debit against an id with no account, without opening one.
    fn reject_unopened(
        &self,
        account_id: &str,
        amount: Decimal,
        meta: TransactionMeta,
        now: DateTime<Utc>,
    ) -> RouterError {
        let rejection = self.refusal(
            account_id,
            Decimal::ZERO,
            amount,
            RejectionReason::InsufficientFunds,
            meta,
            now,
        );
        locks::lock(&self.unopened_rejections)
            .entry(account_id.to_string())
            .or_default()
            .push(rejection);
        RouterError::InsufficientFunds {
            account: account_id.to_string(),
            requested: amount,
            available: Decimal::ZERO,
        }
    }

    /// Subtract `amount` from the account's balance.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount` is not positive.
    /// - `InsufficientFunds` if `amount` exceeds the balance. An account that
    ///   was never credited has a balance of zero.
    /// - `SpendingCapExceeded` if the debit would pass the monthly cap.
    /// - `Storage` if the journal append fails.
    pub fn debit(
        &self,
        account_id: &str,
        amount: Decimal,
        meta: TransactionMeta,
    ) -> Result<LedgerReceipt> {
        self.debit_at(account_id, amount, meta, Utc::now())
    }

    pub(crate) fn debit_at(
        &self,
        account_id: &str,
        amount: Decimal,
        meta: TransactionMeta,
        now: DateTime<Utc>,
    ) -> Result<LedgerReceipt> {
        if amount <= Decimal::ZERO {
            return Err(RouterError::InvalidAmount {
                amount,
                kind: TransactionKind::Debit.to_string(),
            });
        }
        let Some(cell) = self.cell(account_id) else {
            return Err(self.reject_unopened(account_id, amount, meta, now));
        };
        let mut cell = locks::lock(&cell);
        cell.account.roll_month(now);

        let available = cell.account.balance;
        if amount > available {
            self.reject(&mut cell, amount, RejectionReason::InsufficientFunds, meta, now);
            return Err(RouterError::InsufficientFunds {
                account: account_id.to_string(),
                requested: amount,
                available,
            });
        }
        if let Some(cap) = cell.account.monthly_cap {
            let spent = cell.account.month_spent;
            if spent.checked_add(amount).is_none_or(|total| total > cap) {
                self.reject(&mut cell, amount, RejectionReason::SpendingCap, meta, now);
                return Err(RouterError::SpendingCapExceeded {
                    account: account_id.to_string(),
                    cap,
                    spent,
                    requested: amount,
                });
            }
        }

        let receipt = self.commit(&mut cell, -amount, TransactionKind::Debit, meta, now)?;
        drop(cell);
        tracing::debug!(
            account = account_id,
            amount = %amount,
            balance = %receipt.balance,
            tx_id = receipt.tx_id,
            "Debit applied"
        );
        Ok(receipt)
    }

    /// Add `amount` to the account, opening it on first touch.
    ///
    /// Adjustments may be negative but cannot take the balance below zero.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount` is not positive for a non-adjustment kind,
    ///   or if the new balance would not fit in a `Decimal`.
    /// - `AccountNotFound` for a negative adjustment on an unknown account.
    /// - `InsufficientFunds` if a negative adjustment exceeds the balance.
    /// - `Storage` if the journal append fails.
    pub fn credit(
        &self,
        account_id: &str,
        amount: Decimal,
        kind: CreditKind,
        meta: TransactionMeta,
    ) -> Result<LedgerReceipt> {
        if kind != CreditKind::Adjustment && amount <= Decimal::ZERO {
            return Err(RouterError::InvalidAmount {
                amount,
                kind: TransactionKind::from(kind).to_string(),
            });
        }

        let cell = if amount.is_sign_negative() {
            self.cell(account_id)
                .ok_or_else(|| RouterError::AccountNotFound(account_id.to_string()))?
        } else {
            self.cell_or_open(account_id)
        };
        let mut cell = locks::lock(&cell);

        let available = cell.account.balance;
        let Some(balance_after) = available.checked_add(amount) else {
            return Err(RouterError::InvalidAmount {
                amount,
                kind: TransactionKind::from(kind).to_string(),
            });
        };
        if balance_after.is_sign_negative() {
            tracing::warn!(
                account = account_id,
                amount = %amount,
                balance = %available,
                "Adjustment rejected: balance would go negative"
            );
            return Err(RouterError::InsufficientFunds {
                account: account_id.to_string(),
                requested: -amount,
                available,
            });
        }

        let receipt = self.commit(&mut cell, amount, kind.into(), meta, Utc::now())?;
        drop(cell);
        tracing::debug!(
            account = account_id,
            amount = %amount,
            kind = TransactionKind::from(kind).as_str(),
            balance = %receipt.balance,
            tx_id = receipt.tx_id,
            "Credit applied"
        );
        Ok(receipt)
    }

    /// Set or clear the monthly spending cap.
    ///
    /// # Errors
    /// `AccountNotFound` for unknown accounts, `InvalidAmount` for a negative
    /// cap, `Storage` if the journal write fails.
    pub fn set_monthly_cap(&self, account_id: &str, cap: Option<Decimal>) -> Result<()> {
        if let Some(amount) = cap.filter(Decimal::is_sign_negative) {
            return Err(RouterError::InvalidAmount {
                amount,
                kind: "monthly cap".to_string(),
            });
        }
        let cell = self
            .cell(account_id)
            .ok_or_else(|| RouterError::AccountNotFound(account_id.to_string()))?;
        let mut cell = locks::lock(&cell);
        if let Some(journal) = &self.journal {
            journal.set_cap(account_id, cap)?;
        }
        cell.account.monthly_cap = cap;
        drop(cell);
        tracing::info!(account = account_id, cap = ?cap, "Monthly cap updated");
        Ok(())
    }

    /// Current balance; zero for unknown accounts.
    #[must_use]
    pub fn balance(&self, account_id: &str) -> Decimal {
        self.cell(account_id)
            .map_or(Decimal::ZERO, |cell| locks::lock(&cell).account.balance)
    }

    #[must_use]
    pub fn account(&self, account_id: &str) -> Option<CreditAccount> {
        self.cell(account_id)
            .map(|cell| locks::lock(&cell).account.clone())
    }

    #[must_use]
    pub fn contains(&self, account_id: &str) -> bool {
        locks::read(&self.accounts).contains_key(account_id)
    }

    /// Known account ids, sorted.
    #[must_use]
    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = locks::read(&self.accounts).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Transaction history of one account, oldest first.
    #[must_use]
    pub fn transactions(&self, account_id: &str) -> Vec<Transaction> {
        self.cell(account_id)
            .map(|cell| locks::lock(&cell).transactions.clone())
            .unwrap_or_default()
    }

    /// Refused debits of one account, oldest first.
    #[must_use]
    pub fn rejections(&self, account_id: &str) -> Vec<RejectedDebit> {
        let mut out = locks::lock(&self.unopened_rejections)
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        if let Some(cell) = self.cell(account_id) {
            out.extend(locks::lock(&cell).rejections.iter().cloned());
        }
        out
    }

    /// Balance recomputed from the transaction log alone.
    #[must_use]
    pub fn reconstruct_balance(&self, account_id: &str) -> Decimal {
        self.transactions(account_id)
            .iter()
            .map(|tx| tx.amount)
            .sum()
    }
}

fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a.year(), a.month()) == (b.year(), b.month())
}
