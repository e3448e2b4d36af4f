//! Ledger persistence: wallets and the transaction journal.
//!
//! Wallets are upserted on every flush. The journal is append-only: a
//! transaction that is already stored is skipped, so flushing the same
//! snapshot twice is harmless.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use clawcraft_ledger::EconomySnapshot;
use clawcraft_types::{AgentId, Transaction, TransactionId, Wallet};

use crate::error::DbError;
use crate::to_i64;

/// Default batch size for journal inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `wallets` and `transactions` tables.
pub struct EconomyStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> EconomyStore<'a> {
    /// Create a new store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the batch size for journal inserts.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Flush a ledger snapshot in one database transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if any statement fails; nothing is
    /// written in that case.
    pub async fn save(&self, snapshot: &EconomySnapshot) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        save_economy(&mut *tx, snapshot, self.batch_size).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Read the stored ledger back into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails, or
    /// [`DbError::InvalidRow`] if a stored value is out of range.
    pub async fn load(&self) -> Result<EconomySnapshot, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_economy(&mut *conn).await
    }

    /// The latest `limit` journal rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn recent_transactions(&self, limit: u32) -> Result<Vec<TransactionRow>, DbError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"SELECT id, from_agent, to_agent, amount, reason, created_at, block_height, confirmed
              FROM transactions
              ORDER BY block_height DESC
              LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every journal row touching `agent`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn transactions_for(&self, agent: &AgentId) -> Result<Vec<TransactionRow>, DbError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"SELECT id, from_agent, to_agent, amount, reason, created_at, block_height, confirmed
              FROM transactions
              WHERE from_agent = $1 OR to_agent = $1
              ORDER BY block_height",
        )
        .bind(agent.as_str())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

/// Write wallets and new journal entries on an open connection.
pub(crate) async fn save_economy(
    conn: &mut PgConnection,
    snapshot: &EconomySnapshot,
    batch_size: usize,
) -> Result<(), DbError> {
    upsert_wallets(conn, &snapshot.wallets).await?;
    for chunk in snapshot.transactions.chunks(batch_size.max(1)) {
        insert_transactions(conn, chunk).await?;
    }
    tracing::debug!(
        wallets = snapshot.wallets.len(),
        transactions = snapshot.transactions.len(),
        block_height = snapshot.block_height,
        "Flushed ledger"
    );
    Ok(())
}

/// Read wallets and the journal on an open connection.
pub(crate) async fn load_economy(conn: &mut PgConnection) -> Result<EconomySnapshot, DbError> {
    let wallet_rows = sqlx::query_as::<_, WalletRow>(
        r"SELECT agent_id, balance, locked_balance, total_earned, total_spent,
                 transaction_count, last_activity, created_at
          FROM wallets
          ORDER BY agent_id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let transaction_rows = sqlx::query_as::<_, TransactionRow>(
        r"SELECT id, from_agent, to_agent, amount, reason, created_at, block_height, confirmed
          FROM transactions
          ORDER BY block_height",
    )
    .fetch_all(&mut *conn)
    .await?;

    let wallets = wallet_rows
        .into_iter()
        .map(Wallet::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let transactions = transaction_rows
        .into_iter()
        .map(Transaction::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let block_height = transactions.last().map_or(0, |t| t.block_height);

    Ok(EconomySnapshot {
        wallets,
        transactions,
        block_height,
    })
}

async fn upsert_wallets(conn: &mut PgConnection, wallets: &[Wallet]) -> Result<(), DbError> {
    if wallets.is_empty() {
        return Ok(());
    }

    let len = wallets.len();
    let mut agents = Vec::with_capacity(len);
    let mut balances = Vec::with_capacity(len);
    let mut locked = Vec::with_capacity(len);
    let mut earned = Vec::with_capacity(len);
    let mut spent = Vec::with_capacity(len);
    let mut counts = Vec::with_capacity(len);
    let mut last_activity = Vec::with_capacity(len);
    let mut created = Vec::with_capacity(len);

    for wallet in wallets {
        agents.push(wallet.agent_id.as_str().to_owned());
        balances.push(wallet.balance);
        locked.push(wallet.locked_balance);
        earned.push(wallet.total_earned);
        spent.push(wallet.total_spent);
        counts.push(to_i64(wallet.transaction_count));
        last_activity.push(wallet.last_activity);
        created.push(wallet.created_at);
    }

    sqlx::query(
        r"INSERT INTO wallets (agent_id, balance, locked_balance, total_earned, total_spent, transaction_count, last_activity, created_at)
          SELECT * FROM UNNEST($1::TEXT[], $2::NUMERIC[], $3::NUMERIC[], $4::NUMERIC[], $5::NUMERIC[], $6::BIGINT[], $7::TIMESTAMPTZ[], $8::TIMESTAMPTZ[])
          ON CONFLICT (agent_id) DO UPDATE SET
            balance = EXCLUDED.balance,
            locked_balance = EXCLUDED.locked_balance,
            total_earned = EXCLUDED.total_earned,
            total_spent = EXCLUDED.total_spent,
            transaction_count = EXCLUDED.transaction_count,
            last_activity = EXCLUDED.last_activity",
    )
    .bind(&agents)
    .bind(&balances)
    .bind(&locked)
    .bind(&earned)
    .bind(&spent)
    .bind(&counts)
    .bind(&last_activity)
    .bind(&created)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_transactions(
    conn: &mut PgConnection,
    transactions: &[Transaction],
) -> Result<(), DbError> {
    if transactions.is_empty() {
        return Ok(());
    }

    let len = transactions.len();
    let mut ids = Vec::with_capacity(len);
    let mut from = Vec::with_capacity(len);
    let mut to = Vec::with_capacity(len);
    let mut amounts = Vec::with_capacity(len);
    let mut reasons = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);
    let mut heights = Vec::with_capacity(len);
    let mut confirmed = Vec::with_capacity(len);

    for transaction in transactions {
        ids.push(transaction.id.into_inner());
        from.push(transaction.from.as_str().to_owned());
        to.push(transaction.to.as_str().to_owned());
        amounts.push(transaction.amount);
        reasons.push(transaction.reason.as_str().to_owned());
        timestamps.push(transaction.timestamp);
        heights.push(to_i64(transaction.block_height));
        confirmed.push(transaction.confirmed);
    }

    sqlx::query(
        r"INSERT INTO transactions (id, from_agent, to_agent, amount, reason, created_at, block_height, confirmed)
          SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::TEXT[], $4::NUMERIC[], $5::TEXT[], $6::TIMESTAMPTZ[], $7::BIGINT[], $8::BOOLEAN[])
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(&ids)
    .bind(&from)
    .bind(&to)
    .bind(&amounts)
    .bind(&reasons)
    .bind(&timestamps)
    .bind(&heights)
    .bind(&confirmed)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from the `wallets` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletRow {
    /// Owning agent.
    pub agent_id: String,
    /// Spendable funds.
    pub balance: Decimal,
    /// Escrowed funds.
    pub locked_balance: Decimal,
    /// Lifetime credits.
    pub total_earned: Decimal,
    /// Lifetime debits.
    pub total_spent: Decimal,
    /// Confirmed transactions touching the wallet.
    pub transaction_count: i64,
    /// Last balance change.
    pub last_activity: DateTime<Utc>,
    /// Opening time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = DbError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let transaction_count = u64::try_from(row.transaction_count).map_err(|e| {
            DbError::invalid_row("wallets", row.agent_id.clone(), e.to_string())
        })?;
        if row.balance.is_sign_negative() || row.locked_balance.is_sign_negative() {
            return Err(DbError::invalid_row("wallets", row.agent_id, "negative balance"));
        }
        Ok(Self {
            agent_id: AgentId::from(row.agent_id),
            balance: row.balance,
            locked_balance: row.locked_balance,
            total_earned: row.total_earned,
            total_spent: row.total_spent,
            transaction_count,
            last_activity: row.last_activity,
            created_at: row.created_at,
        })
    }
}

/// A row from the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    /// Transaction UUID.
    pub id: Uuid,
    /// Debited account.
    pub from_agent: String,
    /// Credited account.
    pub to_agent: String,
    /// Amount moved.
    pub amount: Decimal,
    /// Reason name, see `TransactionReason::as_str`.
    pub reason: String,
    /// Confirmation time.
    pub created_at: DateTime<Utc>,
    /// Journal position.
    pub block_height: i64,
    /// Always true for stored rows.
    pub confirmed: bool,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let reason = row
            .reason
            .parse()
            .map_err(|e: clawcraft_types::ParseEnumError| {
                DbError::invalid_row("transactions", row.id.to_string(), e.to_string())
            })?;
        let block_height = u64::try_from(row.block_height).map_err(|e| {
            DbError::invalid_row("transactions", row.id.to_string(), e.to_string())
        })?;
        Ok(Self {
            id: TransactionId::from(row.id),
            from: AgentId::from(row.from_agent),
            to: AgentId::from(row.to_agent),
            amount: row.amount,
            reason,
            timestamp: row.created_at,
            block_height,
            confirmed: row.confirmed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clawcraft_types::TransactionReason;

    use super::*;

    fn transaction_row(reason: &str, block_height: i64) -> TransactionRow {
        TransactionRow {
            id: Uuid::now_v7(),
            from_agent: "system".to_owned(),
            to_agent: "alice".to_owned(),
            amount: Decimal::new(25, 0),
            reason: reason.to_owned(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            block_height,
            confirmed: true,
        }
    }

    #[test]
    fn transaction_row_maps_to_domain() {
        let tx = Transaction::try_from(transaction_row("pvp_kill", 7)).unwrap();
        assert_eq!(tx.reason, TransactionReason::PvpKill);
        assert_eq!(tx.block_height, 7);
        assert!(tx.from.is_system());
    }

    #[test]
    fn unknown_reason_is_rejected() {
        assert!(matches!(
            Transaction::try_from(transaction_row("gift", 1)),
            Err(DbError::InvalidRow { table: "transactions", .. })
        ));
    }

    #[test]
    fn negative_height_is_rejected() {
        assert!(Transaction::try_from(transaction_row("mining", -1)).is_err());
    }

    #[test]
    fn negative_wallet_balance_is_rejected() {
        let row = WalletRow {
            agent_id: "alice".to_owned(),
            balance: Decimal::new(-1, 0),
            locked_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            transaction_count: 0,
            last_activity: DateTime::<Utc>::UNIX_EPOCH,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert!(Wallet::try_from(row).is_err());
    }
}
