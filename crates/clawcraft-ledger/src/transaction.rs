//! Builder and validation for journal entries.
//!
//! The [`TransferEngine`](crate::TransferEngine) stamps block height and
//! time when it commits; everything else about a transaction is decided by
//! the caller and validated here before any wallet is touched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use clawcraft_types::{AgentId, Transaction, TransactionId, TransactionReason};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Transaction builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`Transaction`] values.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use clawcraft_ledger::TransactionBuilder;
/// use clawcraft_types::{AgentId, TransactionReason};
/// use rust_decimal::Decimal;
///
/// let tx = TransactionBuilder::new(TransactionReason::Mining)
///     .from(AgentId::system())
///     .to(AgentId::from("alice"))
///     .amount(Decimal::new(5, 0))
///     .build(1, Utc::now());
///
/// assert!(tx.is_ok());
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    reason: TransactionReason,
    from: Option<AgentId>,
    to: Option<AgentId>,
    amount: Option<Decimal>,
}

impl TransactionBuilder {
    /// Start building a transaction with the given reason.
    pub const fn new(reason: TransactionReason) -> Self {
        Self {
            reason,
            from: None,
            to: None,
            amount: None,
        }
    }

    /// Set the debited account.
    #[must_use]
    pub fn from(mut self, agent: AgentId) -> Self {
        self.from = Some(agent);
        self
    }

    /// Set the credited account.
    #[must_use]
    pub fn to(mut self, agent: AgentId) -> Self {
        self.to = Some(agent);
        self
    }

    /// Set the amount moved.
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Validate inputs and produce a confirmed [`Transaction`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] if a field is unset,
    /// [`LedgerError::InvalidAmount`] if the amount is not strictly
    /// positive and [`LedgerError::SelfTransfer`] if both sides are the
    /// same account.
    pub fn build(
        self,
        block_height: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let from = self.from.ok_or(LedgerError::MissingField("from"))?;
        let to = self.to.ok_or(LedgerError::MissingField("to"))?;
        let amount = self.amount.ok_or(LedgerError::MissingField("amount"))?;

        validate(&from, &to, amount)?;

        Ok(Transaction {
            id: TransactionId::new(),
            from,
            to,
            amount,
            reason: self.reason,
            timestamp,
            block_height,
            confirmed: true,
        })
    }
}

/// Shared validation for a single leg.
pub(crate) fn validate(from: &AgentId, to: &AgentId, amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { amount });
    }
    if from == to {
        return Err(LedgerError::SelfTransfer(from.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TransactionBuilder {
        TransactionBuilder::new(TransactionReason::Trade)
            .from(AgentId::from("alice"))
            .to(AgentId::from("bob"))
    }

    #[test]
    fn valid_transaction_is_confirmed() {
        let tx = base().amount(Decimal::new(30, 0)).build(7, Utc::now()).ok();
        assert_eq!(tx.as_ref().map(|t| t.confirmed), Some(true));
        assert_eq!(tx.as_ref().map(|t| t.block_height), Some(7));
        assert_eq!(tx.map(|t| t.reason), Some(TransactionReason::Trade));
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        for amount in [Decimal::ZERO, Decimal::new(-5, 0)] {
            let err = base().amount(amount).build(1, Utc::now()).err();
            assert_eq!(err, Some(LedgerError::InvalidAmount { amount }));
        }
    }

    #[test]
    fn missing_amount_is_reported() {
        let err = base().build(1, Utc::now()).err();
        assert_eq!(err, Some(LedgerError::MissingField("amount")));
    }

    #[test]
    fn self_transfer_is_rejected() {
        let err = TransactionBuilder::new(TransactionReason::Manual)
            .from(AgentId::from("alice"))
            .to(AgentId::from("alice"))
            .amount(Decimal::ONE)
            .build(1, Utc::now())
            .err();
        assert!(matches!(err, Some(LedgerError::SelfTransfer(_))));
    }
}
