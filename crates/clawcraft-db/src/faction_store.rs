//! Faction persistence: factions, territories, wars, bounties and the
//! faction audit log.
//!
//! Factions, territories, wars and bounties are upserted row by row since
//! they carry array and JSON columns. Audit events are append-only.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use clawcraft_factions::FactionSnapshot;
use clawcraft_types::{
    AgentId, Bounty, BountyId, Faction, FactionEvent, FactionEventId, FactionName, ParseEnumError,
    Territory, TerritoryId, War, WarId,
};

use crate::error::DbError;

/// Operations on the faction tables.
pub struct FactionStore<'a> {
    pool: &'a PgPool,
}

impl<'a> FactionStore<'a> {
    /// Create a new store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Flush faction state in one database transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if any statement fails; nothing is
    /// written in that case.
    pub async fn save(&self, snapshot: &FactionSnapshot) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        save_factions(&mut *tx, snapshot).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Read stored faction state back into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails, or
    /// [`DbError::InvalidRow`] if a stored value no longer parses.
    pub async fn load(&self) -> Result<FactionSnapshot, DbError> {
        let mut conn = self.pool.acquire().await?;
        load_factions(&mut *conn).await
    }

    /// The audit log of one faction, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn events_for(&self, faction: &FactionName) -> Result<Vec<FactionEventRow>, DbError> {
        let rows = sqlx::query_as::<_, FactionEventRow>(
            r"SELECT id, faction, kind, description, created_at
              FROM faction_events
              WHERE faction = $1
              ORDER BY created_at, id",
        )
        .bind(faction.as_str())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

/// Write all faction tables on an open connection.
pub(crate) async fn save_factions(
    conn: &mut PgConnection,
    snapshot: &FactionSnapshot,
) -> Result<(), DbError> {
    for faction in &snapshot.factions {
        upsert_faction(conn, faction).await?;
    }
    for territory in &snapshot.territories {
        upsert_territory(conn, territory).await?;
    }
    for war in &snapshot.wars {
        upsert_war(conn, war).await?;
    }
    for bounty in &snapshot.bounties {
        upsert_bounty(conn, bounty).await?;
    }
    insert_events(conn, &snapshot.events).await?;

    tracing::debug!(
        factions = snapshot.factions.len(),
        territories = snapshot.territories.len(),
        wars = snapshot.wars.len(),
        bounties = snapshot.bounties.len(),
        events = snapshot.events.len(),
        "Flushed faction state"
    );
    Ok(())
}

/// Read all faction tables on an open connection.
pub(crate) async fn load_factions(conn: &mut PgConnection) -> Result<FactionSnapshot, DbError> {
    let factions = sqlx::query_as::<_, FactionRow>(
        r"SELECT name, faction_type, leader, members, treasury, reputation, power, territories,
                 allies, enemies, created_at, description, color, motto
          FROM factions
          ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    let territories = sqlx::query_as::<_, TerritoryRow>(
        r"SELECT id, faction, center_x, center_z, radius, resources, structures, defense_level,
                 last_contested
          FROM territories
          ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let wars = sqlx::query_as::<_, WarRow>(
        r"SELECT id, faction_a, faction_b, status, score_a, score_b, reason, stakes, started_at,
                 ended_at, winner
          FROM wars
          ORDER BY started_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let bounties = sqlx::query_as::<_, BountyRow>(
        r"SELECT id, target, issuer, amount, reason, created_at, expires_at, claimed_by,
                 claimed_at, active, escrowed
          FROM bounties
          ORDER BY created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let events = sqlx::query_as::<_, FactionEventRow>(
        r"SELECT id, faction, kind, description, created_at
          FROM faction_events
          ORDER BY created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(FactionSnapshot {
        factions: convert(factions)?,
        territories: convert(territories)?,
        wars: convert(wars)?,
        bounties: convert(bounties)?,
        events: convert(events)?,
    })
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn upsert_faction(conn: &mut PgConnection, faction: &Faction) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO factions (name, faction_type, leader, members, treasury, reputation, power,
                               territories, allies, enemies, created_at, description, color, motto)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
          ON CONFLICT (name) DO UPDATE SET
            leader = EXCLUDED.leader,
            members = EXCLUDED.members,
            treasury = EXCLUDED.treasury,
            reputation = EXCLUDED.reputation,
            power = EXCLUDED.power,
            territories = EXCLUDED.territories,
            allies = EXCLUDED.allies,
            enemies = EXCLUDED.enemies,
            description = EXCLUDED.description,
            color = EXCLUDED.color,
            motto = EXCLUDED.motto",
    )
    .bind(faction.name.as_str())
    .bind(faction.faction_type.as_str())
    .bind(faction.leader.as_ref().map(AgentId::as_str))
    .bind(strings(&faction.members))
    .bind(faction.treasury)
    .bind(faction.reputation)
    .bind(i64::from(faction.power))
    .bind(strings(&faction.territories))
    .bind(strings(&faction.allies))
    .bind(strings(&faction.enemies))
    .bind(faction.created_at)
    .bind(&faction.description)
    .bind(&faction.color)
    .bind(&faction.motto)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_territory(conn: &mut PgConnection, territory: &Territory) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO territories (id, faction, center_x, center_z, radius, resources, structures,
                                  defense_level, last_contested)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          ON CONFLICT (id) DO UPDATE SET
            faction = EXCLUDED.faction,
            resources = EXCLUDED.resources,
            structures = EXCLUDED.structures,
            defense_level = EXCLUDED.defense_level,
            last_contested = EXCLUDED.last_contested",
    )
    .bind(territory.id.as_str())
    .bind(territory.faction.as_str())
    .bind(territory.center_x)
    .bind(territory.center_z)
    .bind(i64::from(territory.radius))
    .bind(Json(&territory.resources))
    .bind(&territory.structures)
    .bind(i64::from(territory.defense_level))
    .bind(territory.last_contested)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_war(conn: &mut PgConnection, war: &War) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO wars (id, faction_a, faction_b, status, score_a, score_b, reason, stakes,
                           started_at, ended_at, winner)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
          ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            score_a = EXCLUDED.score_a,
            score_b = EXCLUDED.score_b,
            stakes = EXCLUDED.stakes,
            ended_at = EXCLUDED.ended_at,
            winner = EXCLUDED.winner",
    )
    .bind(war.id.into_inner())
    .bind(war.faction_a.as_str())
    .bind(war.faction_b.as_str())
    .bind(war.status.as_str())
    .bind(i64::from(war.score_a))
    .bind(i64::from(war.score_b))
    .bind(&war.reason)
    .bind(war.stakes)
    .bind(war.started_at)
    .bind(war.ended_at)
    .bind(war.winner.as_ref().map(FactionName::as_str))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_bounty(conn: &mut PgConnection, bounty: &Bounty) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO bounties (id, target, issuer, amount, reason, created_at, expires_at,
                               claimed_by, claimed_at, active, escrowed)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
          ON CONFLICT (id) DO UPDATE SET
            claimed_by = EXCLUDED.claimed_by,
            claimed_at = EXCLUDED.claimed_at,
            active = EXCLUDED.active",
    )
    .bind(bounty.id.into_inner())
    .bind(bounty.target.as_str())
    .bind(bounty.issuer.as_str())
    .bind(bounty.amount)
    .bind(&bounty.reason)
    .bind(bounty.created_at)
    .bind(bounty.expires_at)
    .bind(bounty.claimed_by.as_ref().map(AgentId::as_str))
    .bind(bounty.claimed_at)
    .bind(bounty.active)
    .bind(bounty.escrowed)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_events(conn: &mut PgConnection, events: &[FactionEvent]) -> Result<(), DbError> {
    if events.is_empty() {
        return Ok(());
    }

    let len = events.len();
    let mut ids = Vec::with_capacity(len);
    let mut factions = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut descriptions = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);

    for event in events {
        ids.push(event.id.into_inner());
        factions.push(event.faction.as_str().to_owned());
        kinds.push(event.kind.as_str().to_owned());
        descriptions.push(event.description.clone());
        timestamps.push(event.timestamp);
    }

    sqlx::query(
        r"INSERT INTO faction_events (id, faction, kind, description, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::TIMESTAMPTZ[])
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(&ids)
    .bind(&factions)
    .bind(&kinds)
    .bind(&descriptions)
    .bind(&timestamps)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn strings<'k, K>(keys: impl IntoIterator<Item = &'k K>) -> Vec<String>
where
    K: AsRef<str> + 'k,
{
    keys.into_iter().map(|k| k.as_ref().to_owned()).collect()
}

fn to_u32(table: &'static str, key: &str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|e| DbError::invalid_row(table, key, e.to_string()))
}

fn parse<T>(table: &'static str, key: &str, value: &str) -> Result<T, DbError>
where
    T: core::str::FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: ParseEnumError| DbError::invalid_row(table, key, e.to_string()))
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from the `factions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FactionRow {
    /// Faction name.
    pub name: String,
    /// Faction type name.
    pub faction_type: String,
    /// Current leader.
    pub leader: Option<String>,
    /// Member agent ids.
    pub members: Vec<String>,
    /// Treasury balance.
    pub treasury: Decimal,
    /// Reputation in `[-100, 100]`.
    pub reputation: i32,
    /// Power score.
    pub power: i64,
    /// Owned territory ids.
    pub territories: Vec<String>,
    /// Allied faction names.
    pub allies: Vec<String>,
    /// Enemy faction names.
    pub enemies: Vec<String>,
    /// Founding time.
    pub created_at: DateTime<Utc>,
    /// Description.
    pub description: String,
    /// Display colour.
    pub color: String,
    /// Motto.
    pub motto: String,
}

impl TryFrom<FactionRow> for Faction {
    type Error = DbError;

    fn try_from(row: FactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            faction_type: parse("factions", &row.name, &row.faction_type)?,
            power: to_u32("factions", &row.name, row.power)?,
            leader: row.leader.map(AgentId::from),
            members: row.members.into_iter().map(AgentId::from).collect::<BTreeSet<_>>(),
            treasury: row.treasury,
            reputation: row.reputation,
            territories: row.territories.into_iter().map(TerritoryId::from).collect(),
            allies: row.allies.into_iter().map(FactionName::from).collect(),
            enemies: row.enemies.into_iter().map(FactionName::from).collect(),
            created_at: row.created_at,
            description: row.description,
            color: row.color,
            motto: row.motto,
            name: FactionName::from(row.name),
        })
    }
}

/// A row from the `territories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TerritoryRow {
    /// Territory id.
    pub id: String,
    /// Owning faction.
    pub faction: String,
    /// Centre X coordinate.
    pub center_x: i64,
    /// Centre Z coordinate.
    pub center_z: i64,
    /// Claim radius.
    pub radius: i64,
    /// Resource stockpile.
    pub resources: Json<BTreeMap<String, u32>>,
    /// Structure names.
    pub structures: Vec<String>,
    /// Defense level.
    pub defense_level: i64,
    /// Last time the territory was fought over.
    pub last_contested: Option<DateTime<Utc>>,
}

impl TryFrom<TerritoryRow> for Territory {
    type Error = DbError;

    fn try_from(row: TerritoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            radius: to_u32("territories", &row.id, row.radius)?,
            defense_level: to_u32("territories", &row.id, row.defense_level)?,
            faction: FactionName::from(row.faction),
            center_x: row.center_x,
            center_z: row.center_z,
            resources: row.resources.0,
            structures: row.structures,
            last_contested: row.last_contested,
            id: TerritoryId::from(row.id),
        })
    }
}

/// A row from the `wars` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WarRow {
    /// War UUID.
    pub id: Uuid,
    /// Declaring faction.
    pub faction_a: String,
    /// Defending faction.
    pub faction_b: String,
    /// Status name.
    pub status: String,
    /// Kills scored by `faction_a`.
    pub score_a: i64,
    /// Kills scored by `faction_b`.
    pub score_b: i64,
    /// Declared reason.
    pub reason: String,
    /// Treasury transferred at settlement.
    pub stakes: Decimal,
    /// Declaration time.
    pub started_at: DateTime<Utc>,
    /// Settlement or peace time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Victorious faction.
    pub winner: Option<String>,
}

impl TryFrom<WarRow> for War {
    type Error = DbError;

    fn try_from(row: WarRow) -> Result<Self, Self::Error> {
        let key = row.id.to_string();
        Ok(Self {
            id: WarId::from(row.id),
            faction_a: FactionName::from(row.faction_a),
            faction_b: FactionName::from(row.faction_b),
            status: parse("wars", &key, &row.status)?,
            score_a: to_u32("wars", &key, row.score_a)?,
            score_b: to_u32("wars", &key, row.score_b)?,
            reason: row.reason,
            stakes: row.stakes,
            started_at: row.started_at,
            ended_at: row.ended_at,
            winner: row.winner.map(FactionName::from),
        })
    }
}

/// A row from the `bounties` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BountyRow {
    /// Bounty UUID.
    pub id: Uuid,
    /// Target agent.
    pub target: String,
    /// Issuing agent.
    pub issuer: String,
    /// Reward.
    pub amount: Decimal,
    /// Reason text.
    pub reason: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Claimant.
    pub claimed_by: Option<String>,
    /// Claim time.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Open for claims.
    pub active: bool,
    /// Funded from the issuer's escrow.
    pub escrowed: bool,
}

impl TryFrom<BountyRow> for Bounty {
    type Error = DbError;

    fn try_from(row: BountyRow) -> Result<Self, Self::Error> {
        if row.amount <= Decimal::ZERO {
            return Err(DbError::invalid_row(
                "bounties",
                row.id.to_string(),
                "non-positive amount",
            ));
        }
        Ok(Self {
            id: BountyId::from(row.id),
            target: AgentId::from(row.target),
            issuer: AgentId::from(row.issuer),
            amount: row.amount,
            reason: row.reason,
            created_at: row.created_at,
            expires_at: row.expires_at,
            claimed_by: row.claimed_by.map(AgentId::from),
            claimed_at: row.claimed_at,
            active: row.active,
            escrowed: row.escrowed,
        })
    }
}

/// A row from the `faction_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FactionEventRow {
    /// Event UUID.
    pub id: Uuid,
    /// Faction the entry belongs to.
    pub faction: String,
    /// Event kind name.
    pub kind: String,
    /// Human-readable description.
    pub description: String,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<FactionEventRow> for FactionEvent {
    type Error = DbError;

    fn try_from(row: FactionEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: parse("faction_events", &row.id.to_string(), &row.kind)?,
            id: FactionEventId::from(row.id),
            faction: FactionName::from(row.faction),
            description: row.description,
            timestamp: row.created_at,
        })
    }
}
