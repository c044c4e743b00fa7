//! Permission projection: an append-only ACL log and the fold that turns it into
//! `(app, role) -> { allowed entities, manager }`.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::{Address, B256};
use dao_txpath_types::{ChainEvent, EventKind, LogPosition, ANY_ENTITY};
use serde::Serialize;

/// Entities allowed to perform a role on an app, and who manages the role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PermissionEntry {
    pub allowed_entities: BTreeSet<Address>,
    pub manager: Option<Address>,
}

impl PermissionEntry {
    /// Whether `entity` holds the role, directly or through `ANY_ENTITY`.
    pub fn allows(&self, entity: Address) -> bool {
        self.allowed_entities.contains(&entity) || self.allowed_entities.contains(&ANY_ENTITY)
    }
}

/// Effective change produced by folding one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum PermissionChange {
    Granted { app: Address, role: B256, entity: Address },
    Revoked { app: Address, role: B256, entity: Address },
    ManagerChanged { app: Address, role: B256, manager: Address },
}

/// Folded permission state. Entries are created lazily and never deleted; a missing
/// entry reads as an empty set with no manager.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionState {
    entries: HashMap<(Address, B256), PermissionEntry>,
}

impl PermissionState {
    pub fn entry(&self, app: Address, role: B256) -> PermissionEntry {
        self.entries.get(&(app, role)).cloned().unwrap_or_default()
    }

    pub fn allows(&self, app: Address, role: B256, entity: Address) -> bool {
        self.entries
            .get(&(app, role))
            .is_some_and(|entry| entry.allows(entity))
    }

    pub fn manager(&self, app: Address, role: B256) -> Option<Address> {
        self.entries.get(&(app, role)).and_then(|entry| entry.manager)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold one event. Returns the effective change, or `None` for no-ops
    /// (re-grants, revoking an absent entity, setting the same manager, non-ACL events).
    pub fn apply(&mut self, event: &EventKind) -> Option<PermissionChange> {
        match *event {
            EventKind::SetPermission { app, role, entity, allowed: true } => {
                let entry = self.entries.entry((app, role)).or_default();
                entry
                    .allowed_entities
                    .insert(entity)
                    .then_some(PermissionChange::Granted { app, role, entity })
            }
            EventKind::SetPermission { app, role, entity, allowed: false } => {
                let entry = self.entries.entry((app, role)).or_default();
                entry
                    .allowed_entities
                    .remove(&entity)
                    .then_some(PermissionChange::Revoked { app, role, entity })
            }
            EventKind::ChangePermissionManager { app, role, manager } => {
                let entry = self.entries.entry((app, role)).or_default();
                let previous = entry.manager.replace(manager);
                (previous != Some(manager)).then_some(PermissionChange::ManagerChanged { app, role, manager })
            }
            EventKind::SetApp { .. } => None,
        }
    }

    /// Fold a whole log from scratch.
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a ChainEvent>) -> Self {
        let mut state = Self::default();
        for event in events {
            state.apply(&event.kind);
        }
        state
    }
}

/// Outcome of inserting into a [`PermissionLog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// Newer than every logged event; fold it onto the current state.
    Appended,
    /// Older than the head; the state must be re-folded from the log.
    Reordered,
    /// Already logged at this position.
    Duplicate,
}

/// ACL events in strict `(block_number, log_index)` order.
#[derive(Clone, Debug, Default)]
pub struct PermissionLog {
    events: Vec<ChainEvent>,
}

impl PermissionLog {
    pub fn head(&self) -> Option<LogPosition> {
        self.events.last().map(|e| e.position)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ChainEvent] {
        &self.events
    }

    pub fn insert(&mut self, event: ChainEvent) -> Insertion {
        match self.head() {
            None => {
                self.events.push(event);
                Insertion::Appended
            }
            Some(head) if event.position > head => {
                self.events.push(event);
                Insertion::Appended
            }
            Some(_) => match self.events.binary_search_by_key(&event.position, |e| e.position) {
                Ok(_) => Insertion::Duplicate,
                Err(at) => {
                    self.events.insert(at, event);
                    Insertion::Reordered
                }
            },
        }
    }

    pub fn fold(&self) -> PermissionState {
        PermissionState::fold(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const APP: Address = Address::new([0xa1; 20]);
    const ALICE: Address = Address::new([0x01; 20]);
    const BOB: Address = Address::new([0x02; 20]);
    const ROLE: B256 = B256::new([0x0f; 32]);

    fn grant(block: u64, entity: Address, allowed: bool) -> ChainEvent {
        ChainEvent::new(
            LogPosition::new(block, 0),
            EventKind::SetPermission { app: APP, role: ROLE, entity, allowed },
        )
    }

    fn manager(block: u64, manager: Address) -> ChainEvent {
        ChainEvent::new(
            LogPosition::new(block, 0),
            EventKind::ChangePermissionManager { app: APP, role: ROLE, manager },
        )
    }

    #[test]
    fn grant_is_idempotent() {
        let mut state = PermissionState::default();
        assert!(state.apply(&grant(1, ALICE, true).kind).is_some());
        assert!(state.apply(&grant(2, ALICE, true).kind).is_none());
        assert_eq!(state.entry(APP, ROLE).allowed_entities.len(), 1);
        assert!(state.allows(APP, ROLE, ALICE));
    }

    #[test]
    fn revoking_absent_entity_is_a_no_op() {
        let mut state = PermissionState::default();
        assert_eq!(state.apply(&grant(1, BOB, false).kind), None);
        assert!(state.entry(APP, ROLE).allowed_entities.is_empty());

        state.apply(&grant(2, BOB, true).kind);
        assert_eq!(
            state.apply(&grant(3, BOB, false).kind),
            Some(PermissionChange::Revoked { app: APP, role: ROLE, entity: BOB })
        );
        assert!(!state.allows(APP, ROLE, BOB));
    }

    #[test]
    fn manager_changes_leave_entities_alone() {
        let log = [grant(1, ALICE, true), grant(2, BOB, true), manager(3, BOB), manager(4, ALICE)];
        let before = PermissionState::fold(&log[..2]).entry(APP, ROLE).allowed_entities;
        let state = PermissionState::fold(&log);
        assert_eq!(state.entry(APP, ROLE).allowed_entities, before);
        assert_eq!(state.manager(APP, ROLE), Some(ALICE));
    }

    #[test]
    fn replay_is_deterministic() {
        let log = vec![grant(1, ALICE, true), grant(2, BOB, true), grant(3, ALICE, false), manager(4, BOB), grant(5, BOB, true)];
        let once = PermissionState::fold(&log);
        let twice = PermissionState::fold(log.iter().chain(log.iter()));
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_entries_read_as_empty() {
        let state = PermissionState::default();
        assert_eq!(state.entry(APP, ROLE), PermissionEntry::default());
        assert!(state.is_empty());
        assert_eq!(state.manager(APP, ROLE), None);
    }

    #[test]
    fn any_entity_grants_everyone() {
        let mut state = PermissionState::default();
        state.apply(&grant(1, ANY_ENTITY, true).kind);
        assert!(state.allows(APP, ROLE, BOB));
        assert!(state.entry(APP, ROLE).allows(ALICE));
    }

    #[test]
    fn log_orders_and_dedupes() {
        let mut log = PermissionLog::default();
        assert_eq!(log.insert(grant(5, ALICE, true)), Insertion::Appended);
        assert_eq!(log.insert(grant(9, ALICE, false)), Insertion::Appended);
        assert_eq!(log.insert(grant(5, ALICE, true)), Insertion::Duplicate);
        // arrives late, lands between the grant and the revoke
        assert_eq!(log.insert(grant(7, BOB, true)), Insertion::Reordered);
        assert_eq!(log.len(), 3);
        assert_eq!(log.head(), Some(LogPosition::new(9, 0)));

        let positions: Vec<u64> = log.events().iter().map(|e| e.position.block_number).collect();
        assert_eq!(positions, vec![5, 7, 9]);

        let state = log.fold();
        assert!(!state.allows(APP, ROLE, ALICE));
        assert!(state.allows(APP, ROLE, BOB));
    }

    fn arb_acl_event() -> impl Strategy<Value = EventKind> {
        let app = prop::sample::select(vec![APP, Address::new([0xa2; 20])]);
        let role = prop::sample::select(vec![ROLE, B256::new([0x1f; 32])]);
        let entity = prop::sample::select(vec![ALICE, BOB, ANY_ENTITY, Address::new([0x03; 20])]);
        prop_oneof![
            3 => (app.clone(), role.clone(), entity.clone(), any::<bool>())
                .prop_map(|(app, role, entity, allowed)| EventKind::SetPermission { app, role, entity, allowed }),
            1 => (app, role, entity)
                .prop_map(|(app, role, manager)| EventKind::ChangePermissionManager { app, role, manager }),
        ]
    }

    fn arb_log(max_len: usize) -> impl Strategy<Value = Vec<ChainEvent>> {
        prop::collection::vec(arb_acl_event(), 0..max_len).prop_map(|kinds| {
            kinds
                .into_iter()
                .enumerate()
                .map(|(i, kind)| ChainEvent::new(LogPosition::new(i as u64 / 4, i as u64 % 4), kind))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_replaying_a_log_twice_changes_nothing(log in arb_log(60)) {
            let once = PermissionState::fold(&log);
            let twice = PermissionState::fold(log.iter().chain(log.iter()));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_manager_changes_never_touch_entities(
            log in arb_log(40),
            manager in prop::sample::select(vec![ALICE, BOB, ANY_ENTITY]),
        ) {
            let mut state = PermissionState::fold(&log);
            let before: Vec<_> = [APP, Address::new([0xa2; 20])]
                .into_iter()
                .map(|app| state.entry(app, ROLE).allowed_entities)
                .collect();
            state.apply(&EventKind::ChangePermissionManager { app: APP, role: ROLE, manager });
            state.apply(&EventKind::ChangePermissionManager { app: Address::new([0xa2; 20]), role: ROLE, manager });
            let after: Vec<_> = [APP, Address::new([0xa2; 20])]
                .into_iter()
                .map(|app| state.entry(app, ROLE).allowed_entities)
                .collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(state.manager(APP, ROLE), Some(manager));
        }
    }
}
