//! The domain index service: hashing, routing, the four verbs.
//!
//! [`DomainIndex`] owns the bucket groups (one tree lock each), the write
//! cache (its own per-group locks), and the journal handle. All state is
//! instance state; independent indexes coexist freely.
//!
//! Lock discipline: an operation never holds a cache lock while acquiring
//! a tree lock or vice versa, and never touches more than one group's
//! locks at a time. The journal append happens outside every tree and
//! cache lock.

use parking_lot::{Mutex, RwLock};
use std::time::Instant;

use crate::bucket::BucketGroup;
use crate::cache::{CacheHit, PendingUpdate, WriteCache};
use crate::config::Config;
use crate::hash::{bucket_of, group_of, normalize, tree_key, LOCK_GROUPS, N_BUCKETS};
use crate::journal::{self, Journal};
use crate::record::Lookup;
use crate::wire::{BatchReader, RawRecord};
use crate::{Error, Opcode, Result, UpdateMode};

/// Concurrent domain-blocklist index.
pub struct DomainIndex {
    config: Config,
    /// Tree side: one lock per group, guarding every bucket in it.
    groups: Vec<RwLock<BucketGroup>>,
    /// Cache side: pending updates, locked per group internally.
    cache: WriteCache,
    journal: Option<Mutex<Journal>>,
    /// Serializes drains; the two-generation handoff allows one drain per
    /// group at a time.
    drain_lock: Mutex<()>,
}

impl DomainIndex {
    /// Build the index and replay the journal if one is configured.
    ///
    /// Fails atomically: on any replay error everything allocated so far
    /// is dropped and the error returned; a service that failed to open
    /// must not serve queries.
    pub fn open(config: Config) -> Result<Self> {
        let mut groups: Vec<BucketGroup> = (0..LOCK_GROUPS)
            .map(|g| BucketGroup::new(g, N_BUCKETS))
            .collect();

        let journal = match &config.journal_path {
            Some(path) => {
                let replayed = journal::replay(path, |rec| {
                    apply_record(&mut groups, &rec);
                    Ok(())
                })?;
                if replayed > 0 {
                    log::debug!("loaded {} journal records", replayed);
                }
                Some(Mutex::new(Journal::open(path)?))
            }
            None => None,
        };

        Ok(Self {
            config,
            groups: groups.into_iter().map(RwLock::new).collect(),
            cache: WriteCache::new(),
            journal,
            drain_lock: Mutex::new(()),
        })
    }

    /// Look a domain up. Pending cache writes are consulted before the
    /// tree so the newest admitted write wins; a pending delete masks an
    /// older tree entry. Case-insensitive.
    pub fn search(&self, domain: &str) -> Result<Lookup> {
        let domain = normalize(domain);
        let bucket = bucket_of(&domain);
        let key = tree_key(&domain);
        let group = group_of(bucket);

        // Cache first; its locks are released before the tree lock is
        // taken.
        match self.cache.lookup(group, key, &domain) {
            Some(CacheHit::Deleted) => return Ok(Lookup::NotFound),
            Some(CacheHit::Found { action, redirect }) => {
                return Ok(self.found(action, redirect));
            }
            None => {}
        }

        let guard = self.groups[group].read();
        match guard.bucket(bucket).lookup(key, &domain) {
            Some((action, redirect)) => {
                Ok(self.found(action, redirect.map(str::to_string)))
            }
            None => Ok(Lookup::NotFound),
        }
    }

    /// Apply a batch of wire records.
    ///
    /// Records are decoded and routed per lock group so each group's lock
    /// is taken once. A malformed record drops itself and the rest of the
    /// batch; records already decoded stay applied. The valid prefix is
    /// appended to the journal best-effort: a journal failure never fails
    /// the in-memory update (it is logged; retry with
    /// [`append_log`](Self::append_log)).
    ///
    /// Returns the number of records applied (quick mode: admitted).
    pub fn update(&self, batch: &[u8], mode: UpdateMode) -> usize {
        let started = Instant::now();
        let (routed, valid_len, count) = route_batch(batch);
        if count == 0 {
            return 0;
        }

        match mode {
            UpdateMode::Quick => {
                for (group, updates) in routed.into_iter().enumerate() {
                    self.cache.push_batch(group, updates);
                }
            }
            UpdateMode::Normal => {
                for (group, updates) in routed.into_iter().enumerate() {
                    if updates.is_empty() {
                        continue;
                    }
                    let mut guard = self.groups[group].write();
                    for u in updates {
                        apply_pending(&mut guard, &u);
                    }
                }
            }
        }

        if let Err(e) = self.append_valid(&batch[..valid_len]) {
            log::error!("journal append failed, update kept in memory: {}", e);
        }

        log::debug!(
            "update: {} records, mode {:?}, {:?}",
            count,
            mode,
            started.elapsed()
        );
        count
    }

    /// Drain every lock group's pending writes into the trees.
    ///
    /// Per group: a brief exclusive swap moves the active generation to
    /// draining, then the entries are applied under the group's tree lock
    /// with no cache lock held, then draining is cleared. Updates admitted
    /// after the swap simply wait for the next drain.
    pub fn flush_cache(&self) -> Result<()> {
        let _serial = self.drain_lock.lock();
        for group in 0..LOCK_GROUPS {
            let snapshot = self.cache.begin_drain(group);
            if !snapshot.is_empty() {
                let mut guard = self.groups[group].write();
                for u in &snapshot {
                    apply_pending(&mut guard, u);
                }
            }
            self.cache.finish_drain(group);
        }
        Ok(())
    }

    /// Append raw wire bytes to the journal. For retrying durability after
    /// a failed in-update append, or for callers that journal explicitly.
    pub fn append_log(&self, batch: &[u8]) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.lock().append(batch),
            None => Err(Error::Config("no journal configured".to_string())),
        }
    }

    /// Total domains in the index (tree side; pending cache writes are
    /// not counted until drained).
    pub fn len(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.read().members() as usize)
            .sum()
    }

    /// True if no domain is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending cache entries not yet drained.
    pub fn pending(&self) -> usize {
        self.cache.pending()
    }

    /// The configuration this index was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn found(&self, action: crate::ControlAction, redirect: Option<String>) -> Lookup {
        // A Redirect entry without a stored target gets the configured
        // default at query time.
        let redirect = match (action, redirect) {
            (crate::ControlAction::Redirect, None) => {
                Some(self.config.default_redirect.clone())
            }
            (_, r) => r,
        };
        Lookup::Found { action, redirect }
    }

    fn append_valid(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match &self.journal {
            Some(journal) => journal.lock().append(bytes),
            None => Ok(()),
        }
    }
}

/// Decode a batch and route each record to its lock group. Returns the
/// per-group updates, the byte length of the cleanly decoded prefix, and
/// the record count. Decoding stops at the first malformed record.
fn route_batch(batch: &[u8]) -> (Vec<Vec<PendingUpdate>>, usize, usize) {
    let mut routed: Vec<Vec<PendingUpdate>> = (0..LOCK_GROUPS).map(|_| Vec::new()).collect();
    let mut count = 0usize;
    let mut reader = BatchReader::new(batch);
    loop {
        let valid_len = reader.offset();
        match reader.next() {
            Some(Ok(rec)) => {
                let update = to_pending(&rec);
                routed[group_of(update.bucket)].push(update);
                count += 1;
            }
            Some(Err(e)) => {
                log::warn!("dropping malformed batch tail: {}", e);
                return (routed, valid_len, count);
            }
            None => return (routed, valid_len, count),
        }
    }
}

fn to_pending(rec: &RawRecord<'_>) -> PendingUpdate {
    let domain = normalize(&rec.domain_str());
    let bucket = bucket_of(&domain);
    let key = tree_key(&domain);
    PendingUpdate {
        bucket,
        tree_key: key,
        opcode: rec.opcode,
        action: rec.action,
        domain,
        redirect: rec.redirect_str().map(|s| s.into_owned()),
    }
}

fn apply_pending(group: &mut BucketGroup, update: &PendingUpdate) {
    let bucket = group.bucket_mut(update.bucket);
    match update.opcode {
        Opcode::Add => {
            bucket.apply_add(
                update.tree_key,
                &update.domain,
                update.action,
                update.redirect.clone(),
            );
        }
        Opcode::Delete => {
            bucket.apply_delete(update.tree_key, &update.domain);
        }
    }
}

/// Journal-replay application: normal-update semantics straight into the
/// not-yet-locked bucket groups.
fn apply_record(groups: &mut [BucketGroup], rec: &RawRecord<'_>) {
    let update = to_pending(rec);
    apply_pending(&mut groups[group_of(update.bucket)], &update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_record;
    use crate::{ControlAction, Lookup};

    fn batch(records: &[(Opcode, ControlAction, &str, Option<&str>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (op, act, dom, redi) in records {
            encode_record(&mut out, *op, *act, dom, *redi).unwrap();
        }
        out
    }

    fn add(domain: &str) -> (Opcode, ControlAction, &str, Option<&'static str>) {
        (Opcode::Add, ControlAction::Drop, domain, None)
    }

    #[test]
    fn test_normal_update_and_search() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        let n = index.update(&batch(&[add("a.com"), add("b.com")]), UpdateMode::Normal);
        assert_eq!(n, 2);
        assert_eq!(index.len(), 2);

        assert!(index.search("a.com").unwrap().is_found());
        assert!(index.search("b.com").unwrap().is_found());
        assert_eq!(index.search("c.com").unwrap(), Lookup::NotFound);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(&batch(&[add("example.com")]), UpdateMode::Normal);
        assert!(index.search("EXAMPLE.com").unwrap().is_found());
        assert!(index.search("Example.COM").unwrap().is_found());
    }

    #[test]
    fn test_quick_update_visible_before_drain() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(&batch(&[add("a.com")]), UpdateMode::Quick);

        // Not in any tree yet, but searches see it through the cache.
        assert_eq!(index.len(), 0);
        assert_eq!(index.pending(), 1);
        assert!(index.search("a.com").unwrap().is_found());

        index.flush_cache().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.pending(), 0);
        assert!(index.search("a.com").unwrap().is_found());
    }

    #[test]
    fn test_pending_delete_masks_tree_entry() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(&batch(&[add("a.com")]), UpdateMode::Normal);
        assert!(index.search("a.com").unwrap().is_found());

        index.update(
            &batch(&[(Opcode::Delete, ControlAction::Drop, "a.com", None)]),
            UpdateMode::Quick,
        );
        // The tree still holds the record; the tombstone must win.
        assert_eq!(index.len(), 1);
        assert_eq!(index.search("a.com").unwrap(), Lookup::NotFound);

        index.flush_cache().unwrap();
        assert_eq!(index.len(), 0);
        assert_eq!(index.search("a.com").unwrap(), Lookup::NotFound);
    }

    #[test]
    fn test_default_redirect_substitution() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(
            &batch(&[(Opcode::Add, ControlAction::Redirect, "example.com", None)]),
            UpdateMode::Normal,
        );
        assert_eq!(
            index.search("EXAMPLE.com").unwrap(),
            Lookup::Found {
                action: ControlAction::Redirect,
                redirect: Some(crate::config::DEFAULT_REDIRECT.to_string()),
            }
        );
    }

    #[test]
    fn test_explicit_redirect_kept() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(
            &batch(&[(
                Opcode::Add,
                ControlAction::Redirect,
                "example.com",
                Some("192.0.2.7"),
            )]),
            UpdateMode::Normal,
        );
        assert_eq!(
            index.search("example.com").unwrap(),
            Lookup::Found {
                action: ControlAction::Redirect,
                redirect: Some("192.0.2.7".to_string()),
            }
        );
    }

    #[test]
    fn test_replace_is_idempotent_on_members() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        index.update(
            &batch(&[(
                Opcode::Add,
                ControlAction::Redirect,
                "a.com",
                Some("192.0.2.1"),
            )]),
            UpdateMode::Normal,
        );
        index.update(
            &batch(&[(
                Opcode::Add,
                ControlAction::Redirect,
                "a.com",
                Some("192.0.2.2"),
            )]),
            UpdateMode::Normal,
        );
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.search("a.com").unwrap(),
            Lookup::Found {
                action: ControlAction::Redirect,
                redirect: Some("192.0.2.2".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_batch_short_count() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();

        // Record 2 declares a domain length past the buffer; record 3 must
        // not be reinterpreted.
        let mut buf = batch(&[add("one.com")]);
        buf.push(0x00);
        buf.extend_from_slice(&500u16.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(b"short");
        buf.extend_from_slice(&batch(&[add("three.com")]));

        let n = index.update(&buf, UpdateMode::Normal);
        assert_eq!(n, 1);
        assert!(index.search("one.com").unwrap().is_found());
        assert_eq!(index.search("three.com").unwrap(), Lookup::NotFound);
    }

    #[test]
    fn test_delete_absent_domain_is_noop() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        let n = index.update(
            &batch(&[(Opcode::Delete, ControlAction::Drop, "ghost.com", None)]),
            UpdateMode::Normal,
        );
        assert_eq!(n, 1);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_append_log_without_journal_errors() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        assert!(matches!(
            index.append_log(&batch(&[add("a.com")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_batch() {
        let index = DomainIndex::open(Config::in_memory()).unwrap();
        assert_eq!(index.update(&[], UpdateMode::Normal), 0);
        assert_eq!(index.update(&[], UpdateMode::Quick), 0);
    }
}
