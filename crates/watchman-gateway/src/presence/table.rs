use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use watchman_core::error::{Result, WatchmanError};
use watchman_core::presence::sort_newest_first;
use watchman_core::protocol::{ChangeKind, ChangeNotice};
use watchman_core::{LivenessPolicy, PresenceRecord};

use super::ProfileDirectory;

/// Latest write for one user. `last_ping == None` is a tombstone: the user
/// left at `seq`, and only a strictly newer write may bring the row back.
#[derive(Clone, Copy, Debug)]
struct Slot {
    last_ping: Option<Instant>,
    seq: u64,
}

/// Shared presence table: `user_id -> last_ping`, plus the write sequence the
/// owning client stamped on its latest write.
///
/// Each writer only touches its own key, so `DashMap` shard locks are the
/// only synchronisation needed.
pub struct PresenceTable {
    rows: DashMap<String, Slot>,
    profiles: Arc<ProfileDirectory>,
    policy: LivenessPolicy,
    feed: broadcast::Sender<ChangeNotice>,
}

impl PresenceTable {
    pub fn new(policy: LivenessPolicy, profiles: Arc<ProfileDirectory>, feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            rows: DashMap::new(),
            profiles,
            policy,
            feed,
        }
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    pub fn profiles(&self) -> &ProfileDirectory {
        &self.profiles
    }

    /// Insert-or-refresh `user_id`'s row with a client write sequence.
    ///
    /// A live row accepts `seq >= stored`; a tombstone only `seq > stored`,
    /// so a heartbeat that was in flight while the user left cannot
    /// resurrect the row. Anything older is `Stale`.
    ///
    /// `last_ping` never moves backwards: a delayed write carrying an older
    /// instant leaves the stored one in place (still reported as `Update`).
    pub fn upsert(&self, user_id: &str, seq: u64, at: Instant) -> Result<ChangeKind> {
        self.write(user_id, Some(seq), at)
    }

    /// Unsequenced heartbeat stamped with the table's clock. Always applies.
    pub fn heartbeat(&self, user_id: &str) -> Result<ChangeKind> {
        self.write(user_id, None, super::now())
    }

    fn write(&self, user_id: &str, seq: Option<u64>, at: Instant) -> Result<ChangeKind> {
        if user_id.is_empty() {
            return Err(WatchmanError::BadRequest("user_id must not be empty".into()));
        }

        let kind = match self.rows.entry(user_id.to_string()) {
            Entry::Occupied(mut e) => {
                let slot = e.get_mut();
                let stored = slot.seq;
                match (slot.last_ping, seq) {
                    (Some(_), Some(seq)) if seq < stored => return Err(stale(user_id, seq, stored)),
                    (None, Some(seq)) if seq <= stored => return Err(stale(user_id, seq, stored)),
                    _ => {}
                }
                slot.seq = seq.unwrap_or(stored);
                match slot.last_ping {
                    Some(prev) => {
                        if at > prev {
                            slot.last_ping = Some(at);
                        }
                        ChangeKind::Update
                    }
                    None => {
                        slot.last_ping = Some(at);
                        ChangeKind::Insert
                    }
                }
            }
            Entry::Vacant(e) => {
                e.insert(Slot {
                    last_ping: Some(at),
                    seq: seq.unwrap_or(0),
                });
                ChangeKind::Insert
            }
        };

        // No receivers is fine.
        let _ = self.feed.send(ChangeNotice::for_row(kind, user_id));
        tracing::trace!(user = %user_id, kind = kind.as_str(), "presence upsert");
        Ok(kind)
    }

    /// Remove `user_id`'s row on behalf of a client write sequence, leaving a
    /// tombstone at `seq`. Returns whether a live row was removed; deleting a
    /// missing row is not an error. A live row written with a newer
    /// sequence stays and the delete is `Stale`.
    pub fn delete_seq(&self, user_id: &str, seq: u64) -> Result<bool> {
        let removed = match self.rows.entry(user_id.to_string()) {
            Entry::Occupied(mut e) => {
                let slot = e.get_mut();
                if slot.last_ping.is_some() && seq < slot.seq {
                    return Err(stale(user_id, seq, slot.seq));
                }
                let removed = slot.last_ping.take().is_some();
                slot.seq = slot.seq.max(seq);
                removed
            }
            Entry::Vacant(e) => {
                e.insert(Slot { last_ping: None, seq });
                false
            }
        };
        if removed {
            self.notify_delete(user_id);
        }
        Ok(removed)
    }

    /// Unsequenced remove. Returns whether a live row existed.
    pub fn delete(&self, user_id: &str) -> bool {
        let removed = self
            .rows
            .get_mut(user_id)
            .map(|mut slot| slot.last_ping.take().is_some())
            .unwrap_or(false);
        if removed {
            self.notify_delete(user_id);
        }
        removed
    }

    fn notify_delete(&self, user_id: &str) {
        let _ = self.feed.send(ChangeNotice::for_row(ChangeKind::Delete, user_id));
        tracing::trace!(user = %user_id, "presence delete");
    }

    /// Every stored row (ghosts included), newest heartbeat first, joined with
    /// display names.
    pub fn query_all(&self) -> Vec<PresenceRecord> {
        let mut out: Vec<PresenceRecord> = self
            .rows
            .iter()
            .filter_map(|r| {
                r.value().last_ping.map(|last_ping| PresenceRecord {
                    user_id: r.key().clone(),
                    display_name: self.profiles.display_name(r.key()),
                    last_ping,
                })
            })
            .collect();
        sort_newest_first(&mut out);
        out
    }

    /// Live rows only (ghost filtered) as of `now`.
    pub fn active(&self, now: Instant) -> Vec<PresenceRecord> {
        self.policy.filter_live(self.query_all(), now)
    }

    pub fn get(&self, user_id: &str) -> Option<Instant> {
        self.rows.get(user_id).and_then(|r| r.value().last_ping)
    }

    /// Latest write sequence seen for `user_id`, tombstones included.
    pub fn seq(&self, user_id: &str) -> Option<u64> {
        self.rows.get(user_id).map(|r| r.value().seq)
    }

    /// Stored rows, ghosts included, tombstones not.
    pub fn len(&self) -> usize {
        self.rows.iter().filter(|r| r.value().last_ping.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.feed.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }
}

fn stale(user_id: &str, seq: u64, stored: u64) -> WatchmanError {
    WatchmanError::Stale(format!("{user_id}: write {seq} is not newer than {stored}"))
}
