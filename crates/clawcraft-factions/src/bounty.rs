//! Bounty board: issue, claim exactly once, expire.
//!
//! The board only tracks pledges. Paying a claimed bounty, and holding or
//! releasing the issuer's escrow, is the caller's job.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clawcraft_types::{AgentId, Bounty, BountyId};

use crate::error::FactionError;

/// A successful claim: the bounty as it now stands and the amount owed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyClaim {
    /// The bounty after the claim.
    pub bounty: Bounty,
    /// Amount owed to the claimant.
    pub amount: Decimal,
}

/// Thread-safe store of bounties.
#[derive(Debug, Default)]
pub struct BountyBoard {
    bounties: Mutex<BTreeMap<BountyId, Bounty>>,
}

impl BountyBoard {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// A board holding previously persisted bounties.
    pub fn restore(bounties: Vec<Bounty>) -> Self {
        Self {
            bounties: Mutex::new(bounties.into_iter().map(|b| (b.id, b)).collect()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<BountyId, Bounty>>, FactionError> {
        let Ok(guard) = self.bounties.lock() else {
            return Err(FactionError::LockPoisoned("bounty board"));
        };
        Ok(guard)
    }

    /// Post a new active bounty on `target`.
    ///
    /// # Errors
    ///
    /// - [`FactionError::InvalidAmount`] if `amount <= 0`.
    /// - [`FactionError::InvalidDuration`] if `ttl <= 0`.
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        &self,
        issuer: &AgentId,
        target: &AgentId,
        amount: Decimal,
        reason: &str,
        ttl: Duration,
        escrowed: bool,
        now: DateTime<Utc>,
    ) -> Result<Bounty, FactionError> {
        if amount <= Decimal::ZERO {
            return Err(FactionError::InvalidAmount(amount));
        }
        if ttl <= Duration::zero() {
            return Err(FactionError::InvalidDuration);
        }
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(FactionError::ArithmeticOverflow)?;
        let bounty = Bounty {
            id: BountyId::new(),
            target: target.clone(),
            issuer: issuer.clone(),
            amount,
            reason: reason.to_owned(),
            created_at: now,
            expires_at,
            claimed_by: None,
            claimed_at: None,
            active: true,
            escrowed,
        };
        self.lock()?.insert(bounty.id, bounty.clone());
        Ok(bounty)
    }

    /// Claim a bounty for `claimer`. Succeeds for exactly one caller.
    ///
    /// # Errors
    ///
    /// - [`FactionError::AlreadyClaimed`] if someone claimed it first.
    /// - [`FactionError::NotFound`] if it does not exist, has expired, or
    ///   was deactivated without a claimant.
    pub fn claim(
        &self,
        id: BountyId,
        claimer: &AgentId,
        now: DateTime<Utc>,
    ) -> Result<BountyClaim, FactionError> {
        let mut bounties = self.lock()?;
        let Some(bounty) = bounties.get_mut(&id) else {
            return Err(FactionError::NotFound(id));
        };
        if let Some(claimed_by) = &bounty.claimed_by {
            return Err(FactionError::AlreadyClaimed {
                bounty: id,
                claimed_by: claimed_by.clone(),
            });
        }
        if !bounty.active || bounty.expires_at <= now {
            return Err(FactionError::NotFound(id));
        }
        bounty.active = false;
        bounty.claimed_by = Some(claimer.clone());
        bounty.claimed_at = Some(now);
        Ok(BountyClaim {
            amount: bounty.amount,
            bounty: bounty.clone(),
        })
    }

    /// Undo a claim by `claimer` whose payout failed, making the bounty
    /// claimable again. Returns `false` if `claimer` does not hold the claim.
    ///
    /// # Errors
    ///
    /// - [`FactionError::NotFound`] if the bounty does not exist.
    /// - [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn reopen(&self, id: BountyId, claimer: &AgentId) -> Result<bool, FactionError> {
        let mut bounties = self.lock()?;
        let Some(bounty) = bounties.get_mut(&id) else {
            return Err(FactionError::NotFound(id));
        };
        if bounty.claimed_by.as_ref() != Some(claimer) {
            return Ok(false);
        }
        bounty.claimed_by = None;
        bounty.claimed_at = None;
        bounty.active = true;
        Ok(true)
    }

    /// Deactivate every active bounty whose expiry has passed.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Bounty>, FactionError> {
        let mut bounties = self.lock()?;
        let mut expired = Vec::new();
        for bounty in bounties.values_mut() {
            if bounty.active && bounty.expires_at <= now {
                bounty.active = false;
                expired.push(bounty.clone());
            }
        }
        Ok(expired)
    }

    /// A bounty by id.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn get(&self, id: BountyId) -> Result<Option<Bounty>, FactionError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    /// Claimable bounties, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn active(&self, now: DateTime<Utc>) -> Result<Vec<Bounty>, FactionError> {
        Ok(self
            .lock()?
            .values()
            .filter(|b| b.active && b.expires_at > now)
            .cloned()
            .collect())
    }

    /// Claimable bounties on one target, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn active_on(
        &self,
        target: &AgentId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bounty>, FactionError> {
        Ok(self
            .lock()?
            .values()
            .filter(|b| &b.target == target && b.active && b.expires_at > now)
            .cloned()
            .collect())
    }

    /// Every bounty ever issued.
    ///
    /// # Errors
    ///
    /// Returns [`FactionError::LockPoisoned`] if the board lock is poisoned.
    pub fn all(&self) -> Result<Vec<Bounty>, FactionError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}
