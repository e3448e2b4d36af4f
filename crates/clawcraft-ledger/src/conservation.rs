//! Conservation audit over a ledger snapshot.
//!
//! Coins are minted only by transfers out of `system` and burned only by
//! transfers into it, so for any consistent snapshot:
//!
//! ```text
//! sum(balance + locked) == sum(from system) - sum(to system)
//! ```
//!
//! The audit also replays the journal per wallet (holdings must equal
//! credits minus debits), and checks that no wallet is negative, that
//! transaction ids are unique and that block heights strictly increase.
//! The transfer engine guarantees all of this by construction; the audit
//! catches corrupted snapshots loaded from storage.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use clawcraft_types::AgentId;

use crate::store::EconomySnapshot;
use crate::{LedgerAnomaly, LedgerError, add, sub};

/// Outcome of [`verify_conservation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "anomaly", rename_all = "snake_case")]
pub enum ConservationResult {
    /// Every rule holds.
    Balanced,
    /// At least one rule is violated.
    Anomaly(LedgerAnomaly),
}

/// Audit a snapshot.
pub fn verify_conservation(snapshot: &EconomySnapshot) -> ConservationResult {
    match audit(snapshot) {
        Ok(result) => result,
        Err(_overflow) => anomaly(
            snapshot,
            Decimal::ZERO,
            Decimal::ZERO,
            vec!["arithmetic overflow while summing the ledger".to_owned()],
        ),
    }
}

fn audit(snapshot: &EconomySnapshot) -> Result<ConservationResult, LedgerError> {
    let mut violations = Vec::new();

    // Journal replay.
    let mut minted = Decimal::ZERO;
    let mut net: BTreeMap<&AgentId, Decimal> = BTreeMap::new();
    let mut seen_ids = HashSet::with_capacity(snapshot.transactions.len());
    let mut last_height = 0_u64;

    for tx in &snapshot.transactions {
        if !seen_ids.insert(tx.id) {
            violations.push(format!("duplicate transaction id {}", tx.id));
        }
        if tx.block_height <= last_height {
            violations.push(format!(
                "block height {} of {} does not follow {last_height}",
                tx.block_height, tx.id
            ));
        }
        last_height = tx.block_height;

        if tx.from.is_system() {
            minted = add(minted, tx.amount)?;
        } else {
            let entry = net.entry(&tx.from).or_insert(Decimal::ZERO);
            *entry = sub(*entry, tx.amount)?;
        }
        if tx.to.is_system() {
            minted = sub(minted, tx.amount)?;
        } else {
            let entry = net.entry(&tx.to).or_insert(Decimal::ZERO);
            *entry = add(*entry, tx.amount)?;
        }
    }
    if last_height > snapshot.block_height {
        violations.push(format!(
            "journal reaches block {last_height} beyond recorded height {}",
            snapshot.block_height
        ));
    }

    // Wallet side.
    let mut supply = Decimal::ZERO;
    for wallet in &snapshot.wallets {
        if wallet.balance.is_sign_negative() || wallet.locked_balance.is_sign_negative() {
            violations.push(format!("wallet {} is negative", wallet.agent_id));
        }
        let holdings = add(wallet.balance, wallet.locked_balance)?;
        supply = add(supply, holdings)?;

        let replayed = net.remove(&wallet.agent_id).unwrap_or(Decimal::ZERO);
        if replayed != holdings {
            violations.push(format!(
                "wallet {} holds {holdings} but the journal gives {replayed}",
                wallet.agent_id
            ));
        }
    }
    for (agent, replayed) in net {
        if !replayed.is_zero() {
            violations.push(format!("journal credits {replayed} to missing wallet {agent}"));
        }
    }

    if supply != minted {
        violations.push(format!("supply {supply} != minted {minted}"));
    }

    if violations.is_empty() {
        Ok(ConservationResult::Balanced)
    } else {
        Ok(anomaly(snapshot, supply, minted, violations))
    }
}

fn anomaly(
    snapshot: &EconomySnapshot,
    supply: Decimal,
    expected_supply: Decimal,
    violations: Vec<String>,
) -> ConservationResult {
    let anomaly = LedgerAnomaly {
        block_height: snapshot.block_height,
        supply,
        expected_supply,
        violations,
    };
    tracing::error!(anomaly = %anomaly, "LEDGER_ANOMALY");
    ConservationResult::Anomaly(anomaly)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use clawcraft_types::{Transaction, TransactionId, TransactionReason, Wallet};

    use super::*;

    fn tx(from: &str, to: &str, amount: i64, block_height: u64) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            from: AgentId::from(from),
            to: AgentId::from(to),
            amount: Decimal::new(amount, 0),
            reason: TransactionReason::Manual,
            timestamp: Utc::now(),
            block_height,
            confirmed: true,
        }
    }

    fn wallet(agent: &str, balance: i64, locked: i64) -> Wallet {
        let mut wallet = Wallet::empty(AgentId::from(agent), Utc::now());
        wallet.balance = Decimal::new(balance, 0);
        wallet.locked_balance = Decimal::new(locked, 0);
        wallet
    }

    fn balanced() -> EconomySnapshot {
        EconomySnapshot {
            wallets: vec![wallet("alice", 70, 10), wallet("bob", 15, 0)],
            transactions: vec![
                tx("system", "alice", 100, 1),
                tx("alice", "bob", 20, 2),
                tx("bob", "system", 5, 3),
            ],
            block_height: 3,
        }
    }

    #[test]
    fn empty_ledger_is_balanced() {
        assert_eq!(
            verify_conservation(&EconomySnapshot::default()),
            ConservationResult::Balanced
        );
    }

    #[test]
    fn escrowed_funds_count_toward_supply() {
        assert_eq!(verify_conservation(&balanced()), ConservationResult::Balanced);
    }

    #[test]
    fn inflated_wallet_is_detected() {
        let mut snapshot = balanced();
        if let Some(w) = snapshot.wallets.get_mut(1) {
            w.balance = Decimal::new(1_000, 0);
        }
        let result = verify_conservation(&snapshot);
        assert!(matches!(result, ConservationResult::Anomaly(ref a) if a.violations.len() == 2));
    }

    #[test]
    fn duplicate_id_is_detected() {
        let mut snapshot = balanced();
        let first = snapshot.transactions.first().cloned();
        if let (Some(first), Some(second)) = (first, snapshot.transactions.get_mut(1)) {
            second.id = first.id;
        }
        assert!(matches!(
            verify_conservation(&snapshot),
            ConservationResult::Anomaly(_)
        ));
    }
}
