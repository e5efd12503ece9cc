//! The service facade: domain rules over the storage contract.
//!
//! The facade owns the backend (selected once at startup from the
//! configuration), parses vote tokens, enforces the self-rating
//! restriction before any mutation, and folds `NotFound` storage
//! results into neutral responses.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use karma_core::{Delta, MostKind, Vote};
use karma_store::{KarmaStore, RedbKarmaStore, SqliteKarmaStore, StoreError};

use crate::config::{BackendKind, KarmaConfig};
use crate::error::{KarmaError, Result};

/// Open the configured storage backend.
///
/// The single backend-selection point: the configuration names the
/// engine, callers only ever see the trait object.
pub fn open_store(config: &KarmaConfig) -> Result<Box<dyn KarmaStore>> {
    info!(backend = %config.backend, dir = %config.data_dir.display(), "opening karma store");
    let store: Box<dyn KarmaStore> = match config.backend {
        BackendKind::Sqlite => Box::new(SqliteKarmaStore::open(&config.data_dir)?),
        BackendKind::Redb => Box::new(RedbKarmaStore::open(&config.data_dir)?),
    };
    Ok(store)
}

/// Result of handing a token to [`KarmaService::vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was persisted.
    Applied {
        /// The entity the vote landed on.
        name: String,
        /// The direction applied.
        delta: Delta,
    },
    /// The token carried no usable vote (no suffix, or an empty name
    /// once the suffix and parentheses are stripped).
    Ignored,
}

/// Karma standing of a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KarmaStatus {
    /// No record: implicit net of zero, excluded from rankings.
    Neutral,
    /// An existing record's counters.
    Rated {
        added: u64,
        subtracted: u64,
        net: i64,
    },
}

/// The caller's own standing within a [`KarmaSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRank {
    /// 1-based dense rank by net.
    pub rank: u64,
    /// Total number of records in the channel.
    pub size: u64,
}

/// Top/bottom listing for the no-argument query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaSummary {
    /// Highest nets, descending.
    pub top: Vec<(String, i64)>,
    /// Lowest nets, ascending.
    pub bottom: Vec<(String, i64)>,
    /// Present only when the caller has a record under their exact name.
    pub caller: Option<CallerRank>,
}

/// The karma service facade.
///
/// All outputs are plain data; how the caller renders them is not this
/// crate's concern.
pub struct KarmaService {
    store: Box<dyn KarmaStore>,
    config: KarmaConfig,
}

impl KarmaService {
    /// Open the service with the backend named in the configuration.
    pub fn open(config: KarmaConfig) -> Result<Self> {
        let store = open_store(&config)?;
        Ok(Self { store, config })
    }

    /// Build the service around an already-open store.
    pub fn with_store(store: Box<dyn KarmaStore>, config: KarmaConfig) -> Self {
        Self { store, config }
    }

    /// Apply a `++`/`--` token from `actor`.
    ///
    /// `allow_self_rating` is the channel's policy flag, supplied by
    /// the caller. A self-targeted vote with the policy off fails with
    /// [`KarmaError::SelfRatingDenied`] before anything is persisted.
    pub async fn vote(
        &self,
        channel: &str,
        actor: &str,
        token: &str,
        allow_self_rating: bool,
    ) -> Result<VoteOutcome> {
        let Some(vote) = Vote::parse(token) else {
            return Ok(VoteOutcome::Ignored);
        };

        if vote.targets(actor) && !allow_self_rating {
            return Err(KarmaError::SelfRatingDenied {
                actor: actor.to_string(),
            });
        }

        match vote.delta {
            Delta::Plus => self.store.increment(channel, &vote.name).await?,
            Delta::Minus => self.store.decrement(channel, &vote.name).await?,
        }
        debug!(channel, name = %vote.name, delta = %vote.delta, "vote applied");

        Ok(VoteOutcome::Applied {
            name: vote.name,
            delta: vote.delta,
        })
    }

    /// Single-entity query. An absent record is `Neutral`, never an error.
    pub async fn karma_of(&self, channel: &str, name: &str) -> Result<KarmaStatus> {
        match self.store.get(channel, name).await {
            Ok((added, subtracted)) => Ok(KarmaStatus::Rated {
                added,
                subtracted,
                net: added as i64 - subtracted as i64,
            }),
            Err(StoreError::NotFound(_)) => Ok(KarmaStatus::Neutral),
            Err(e) => Err(e.into()),
        }
    }

    /// Multi-entity query: matches net-descending, neutrals sorted.
    pub async fn karma_of_many(
        &self,
        channel: &str,
        names: &[String],
    ) -> Result<(Vec<(String, i64)>, Vec<String>)> {
        Ok(self.store.get_many(channel, names).await?)
    }

    /// No-argument query: top-N, bottom-N, and the caller's own rank.
    ///
    /// Fails with [`KarmaError::NoData`] when the channel has no
    /// records; omits the caller entry when the actor is unranked.
    pub async fn summary(&self, channel: &str, actor: &str) -> Result<KarmaSummary> {
        let limit = self.config.ranking_display;
        let top = self.store.top(channel, limit).await?;
        let bottom = self.store.bottom(channel, limit).await?;
        if top.is_empty() || bottom.is_empty() {
            return Err(KarmaError::NoData(channel.to_string()));
        }

        let caller = match self.store.rank(channel, actor).await {
            Ok(rank) => Some(CallerRank {
                rank,
                size: self.store.size(channel).await?,
            }),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(KarmaSummary {
            top,
            bottom,
            caller,
        })
    }

    /// Most increased/decreased/active entities.
    pub async fn most(&self, channel: &str, kind: MostKind) -> Result<Vec<(String, u64)>> {
        Ok(self
            .store
            .most(channel, kind, self.config.most_display)
            .await?)
    }

    /// Delete one entity's record.
    pub async fn clear(&self, channel: &str, name: &str) -> Result<()> {
        Ok(self.store.clear(channel, name).await?)
    }

    /// Export a channel's records to a CSV file.
    pub async fn dump(&self, channel: &str, path: &Path) -> Result<()> {
        Ok(self.store.dump(channel, path).await?)
    }

    /// Replace a channel's records from a CSV file.
    pub async fn load(&self, channel: &str, path: &Path) -> Result<()> {
        Ok(self.store.load(channel, path).await?)
    }

    /// Release all per-channel resources. Called once at shutdown.
    pub async fn close(&self) -> Result<()> {
        Ok(self.store.close().await?)
    }
}
