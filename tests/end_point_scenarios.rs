/// Collection end-point scenario tests
///
/// End-to-end coverage of the load-state machine and data keeper:
/// lazy loading, bidirectional registration, out-of-sync detection and
/// repair, commit/rollback, and unload/reload cycles.
/// Run with: cargo test --test end_point_scenarios

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use relmemdb::{
    CollectionEndPoint, DefaultDataKeeperFactory, LazyCollectionLoader, MappingConfig,
    MappingContext, MappingError, ObjectId, ObjectRegistry, RealObjectEndPoint,
    RelationDefinition, RelationEndPointId, RelationEndPointProvider, Result,
    SharedRealObjectEndPoint,
};

/// Loader backed by a map of prepared contents; counts its invocations
#[derive(Default)]
struct StoreLoader {
    contents: RefCell<HashMap<RelationEndPointId, Vec<ObjectId>>>,
    load_count: RefCell<usize>,
}

impl StoreLoader {
    fn prepare(&self, id: RelationEndPointId, items: Vec<ObjectId>) {
        self.contents.borrow_mut().insert(id, items);
    }

    fn load_count(&self) -> usize {
        *self.load_count.borrow()
    }
}

impl LazyCollectionLoader for StoreLoader {
    fn load_lazy_collection_end_point(
        &self,
        end_point: &mut CollectionEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        *self.load_count.borrow_mut() += 1;
        let items = self
            .contents
            .borrow()
            .get(end_point.id())
            .cloned()
            .unwrap_or_default();
        end_point.mark_data_complete(&items, ctx)
    }
}

/// Provider backed by a map of registered opposite end points
#[derive(Default)]
struct MapProvider {
    end_points: RefCell<HashMap<RelationEndPointId, SharedRealObjectEndPoint>>,
}

impl MapProvider {
    fn add(&self, end_point: SharedRealObjectEndPoint) {
        let id = end_point.borrow().id().clone();
        self.end_points.borrow_mut().insert(id, end_point);
    }
}

impl RelationEndPointProvider for MapProvider {
    fn get_relation_end_point_without_loading(
        &self,
        id: &RelationEndPointId,
    ) -> Option<SharedRealObjectEndPoint> {
        self.end_points.borrow().get(id).cloned()
    }
}

struct Fixture {
    ctx: MappingContext,
    loader: Rc<StoreLoader>,
    provider: Rc<MapProvider>,
    registry: Rc<RefCell<ObjectRegistry>>,
}

impl Fixture {
    fn new() -> Self {
        let config = MappingConfig::new();
        let loader = Rc::new(StoreLoader::default());
        let provider = Rc::new(MapProvider::default());
        let registry = Rc::new(RefCell::new(ObjectRegistry::new()));
        let ctx = MappingContext::new(
            Rc::clone(&loader) as Rc<dyn LazyCollectionLoader>,
            Rc::new(DefaultDataKeeperFactory::from_config(&config)),
            Rc::clone(&provider) as Rc<dyn RelationEndPointProvider>,
            Rc::clone(&registry) as Rc<dyn relmemdb::ObjectStateSource>,
        );
        Self {
            ctx,
            loader,
            provider,
            registry,
        }
    }

    fn end_point(&self) -> CollectionEndPoint {
        let relation = RelationDefinition::new("order_items", "order");
        CollectionEndPoint::new(ObjectId::new(), relation, &self.ctx)
    }

    /// Create an opposite end point known to the provider
    fn opposite(&self) -> SharedRealObjectEndPoint {
        let end_point = RealObjectEndPoint::new_shared(ObjectId::new(), "order");
        self.provider.add(Rc::clone(&end_point));
        end_point
    }
}

/// Pairing invariant: a member of the current data has a current opposite
/// end point or a without-end-point record, never neither
fn assert_pairing_invariant(end_point: &mut CollectionEndPoint, ctx: &MappingContext) {
    let members: Vec<_> = end_point.get_data(ctx).unwrap().iter().collect();
    let flattened = relmemdb::flatten::flatten(end_point);
    for member in members {
        let accounted = flattened
            .current_opposite_end_points
            .iter()
            .any(|ep| ep.id.owner() == member)
            || flattened.original_items_without_end_points.contains(&member);
        assert!(
            accounted,
            "member {} has neither a current opposite end point nor a without-end-point record",
            member
        );
    }
}

// ----------------------------------------------------------------------------
// Scenario A: registrations before load, then commit
// ----------------------------------------------------------------------------

#[test]
fn test_commit_accounts_for_registered_end_points() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let ep_a = fixture.opposite();
    let ep_b = fixture.opposite();

    end_point.register_original_opposite_end_point(Rc::clone(&ep_a)).unwrap();
    end_point.register_original_opposite_end_point(Rc::clone(&ep_b)).unwrap();
    end_point.commit().unwrap();

    let record = relmemdb::flatten::flatten(&end_point);
    let mut expected = vec![ep_a.borrow().owner_id(), ep_b.borrow().owner_id()];
    expected.sort();
    let mut actual: Vec<_> = record
        .original_opposite_end_points
        .iter()
        .map(|ep| ep.id.owner())
        .collect();
    actual.sort();
    assert_eq!(actual, expected);
    assert!(record.original_items_without_end_points.is_empty());
    assert_eq!(
        record.original_items.len(),
        record.original_opposite_end_points.len()
            + record.original_items_without_end_points.len()
    );
}

// ----------------------------------------------------------------------------
// Scenario B: loaded item without a known opposite end point
// ----------------------------------------------------------------------------

#[test]
fn test_loaded_item_without_end_point_is_reported() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let stray = ObjectId::new();
    fixture.loader.prepare(end_point.id().clone(), vec![stray]);

    let data: Vec<_> = end_point.get_data(&fixture.ctx).unwrap().iter().collect();
    assert_eq!(data, vec![stray]);

    let record = relmemdb::flatten::flatten(&end_point);
    assert_eq!(record.original_items_without_end_points, vec![stray]);
    assert!(!end_point.is_synchronized(&fixture.ctx).unwrap());
}

// ----------------------------------------------------------------------------
// Scenario C: remove blocked by an unsynchronized opposite end point
// ----------------------------------------------------------------------------

#[test]
fn test_remove_command_blocked_by_unsynchronized_end_point() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    // the one side announces a membership the loaded contents did not produce
    let ep = fixture.opposite();
    let object = ep.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&ep)).unwrap();
    assert!(end_point
        .has_unsynchronized_current_opposite_end_points(&fixture.ctx)
        .unwrap());

    let result = end_point.create_remove_command(object, &fixture.ctx);
    match result {
        Err(MappingError::OutOfSync { object_id, .. }) => assert_eq!(object_id, object),
        other => panic!("expected OutOfSync, got {:?}", other),
    }
    // the error message names the object and the repair operation
    let message = end_point
        .create_remove_command(object, &fixture.ctx)
        .unwrap_err()
        .to_string();
    assert!(message.contains(&object.to_string()));
    assert!(message.contains("synchronize"));
}

// ----------------------------------------------------------------------------
// Scenario D: synchronize clears without-end-point status and unblocks
// ----------------------------------------------------------------------------

#[test]
fn test_synchronize_unblocks_remove_command() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let stray = ObjectId::new();
    fixture.loader.prepare(end_point.id().clone(), vec![stray]);

    assert!(matches!(
        end_point.create_remove_command(stray, &fixture.ctx),
        Err(MappingError::OutOfSync { .. })
    ));

    end_point.synchronize(&fixture.ctx).unwrap();

    let record = relmemdb::flatten::flatten(&end_point);
    assert!(record.original_items_without_end_points.is_empty());
    assert!(end_point.create_remove_command(stray, &fixture.ctx).is_ok());
}

// ----------------------------------------------------------------------------
// Scenario E: loading into a dirty incomplete keeper is fatal
// ----------------------------------------------------------------------------

#[test]
fn test_mark_data_complete_rejects_dirty_incomplete_keeper() {
    let fixture = Fixture::new();

    // an incomplete end point rehydrated mid-unit-of-work with a pending
    // change: the current view already diverged from the snapshot
    let pending = ObjectId::new();
    let record = relmemdb::FlattenedCollectionEndPoint {
        id: RelationEndPointId::new(ObjectId::new(), "order_items"),
        opposite_property_name: "order".to_string(),
        change_detection: "sequence-sensitive".to_string(),
        is_data_complete: false,
        has_been_touched: true,
        current_items: vec![pending],
        original_items: vec![],
        original_opposite_end_points: vec![],
        original_items_without_end_points: vec![],
        current_opposite_end_points: vec![],
    };
    let mut end_point = relmemdb::flatten::unflatten(&record).unwrap();
    assert!(!end_point.is_data_complete());
    assert!(end_point.has_changed());

    let result = end_point.mark_data_complete(&[], &fixture.ctx);
    assert!(matches!(result, Err(MappingError::InvariantViolation(_))));
    // no state transition happened and the pending change survived
    assert!(!end_point.is_data_complete());
    assert!(end_point.has_changed());
}

// ----------------------------------------------------------------------------
// Lazy loading
// ----------------------------------------------------------------------------

#[test]
fn test_contents_load_lazily_and_at_most_once() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let ep = fixture.opposite();
    let member = ep.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&ep)).unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![member]);

    assert_eq!(fixture.loader.load_count(), 0);
    end_point.get_data(&fixture.ctx).unwrap();
    end_point.get_data(&fixture.ctx).unwrap();
    end_point.get_original_data(&fixture.ctx).unwrap();
    assert_eq!(fixture.loader.load_count(), 1);
    assert!(ep.borrow().is_synchronized());
}

#[test]
fn test_mark_data_complete_on_complete_end_point_fails() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    let result = end_point.mark_data_complete(&[], &fixture.ctx);
    assert!(matches!(result, Err(MappingError::IllegalState(_))));
}

// ----------------------------------------------------------------------------
// Unload / reload
// ----------------------------------------------------------------------------

#[test]
fn test_mark_data_incomplete_twice_fails() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    end_point.mark_data_incomplete(&fixture.ctx).unwrap();
    let result = end_point.mark_data_incomplete(&fixture.ctx);
    assert!(matches!(result, Err(MappingError::IllegalState(_))));
}

#[test]
fn test_unload_resets_sync_state_and_reload_revalidates() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let ep = fixture.opposite();
    let member = ep.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&ep)).unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![member]);

    end_point.get_data(&fixture.ctx).unwrap();
    assert!(ep.borrow().is_synchronized());

    end_point.mark_data_incomplete(&fixture.ctx).unwrap();
    assert!(!ep.borrow().is_synchronized());

    end_point.get_data(&fixture.ctx).unwrap();
    assert!(ep.borrow().is_synchronized());
    assert_eq!(fixture.loader.load_count(), 2);
}

// ----------------------------------------------------------------------------
// Commands and rollback round-trip
// ----------------------------------------------------------------------------

#[test]
fn test_rollback_restores_contents_and_registrations() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let ep = fixture.opposite();
    let member = ep.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&ep)).unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![member]);
    end_point.ensure_data_complete(&fixture.ctx).unwrap();
    let baseline = relmemdb::flatten::flatten(&end_point);

    // a mutation sequence without a commit
    let added = fixture.opposite();
    let added_id = added.borrow().owner_id();
    let command = end_point.create_add_command(added_id, &fixture.ctx).unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();
    let command = end_point.create_remove_command(member, &fixture.ctx).unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();
    assert!(end_point.has_changed());

    end_point.rollback();

    let restored = relmemdb::flatten::flatten(&end_point);
    assert_eq!(restored.current_items, baseline.current_items);
    assert_eq!(
        restored.current_opposite_end_points,
        baseline.current_opposite_end_points
    );
    assert!(!end_point.has_changed());
}

#[test]
fn test_add_and_remove_keep_pairing_invariant() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let existing = fixture.opposite();
    let member = existing.borrow().owner_id();
    end_point
        .register_original_opposite_end_point(Rc::clone(&existing))
        .unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![member]);

    let added = fixture.opposite();
    let added_id = added.borrow().owner_id();
    let command = end_point.create_add_command(added_id, &fixture.ctx).unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();
    assert_pairing_invariant(&mut end_point, &fixture.ctx);

    let command = end_point.create_remove_command(member, &fixture.ctx).unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();
    assert_pairing_invariant(&mut end_point, &fixture.ctx);

    end_point.commit().unwrap();
    let record = relmemdb::flatten::flatten(&end_point);
    assert_eq!(
        record.original_items.len(),
        record.original_opposite_end_points.len()
            + record.original_items_without_end_points.len()
    );
}

#[test]
fn test_insert_command_requires_known_opposite_end_point() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    // the object's back-pointer end point was never registered with the
    // provider, so executing the insert cannot adjust the opposite side
    let unknown = ObjectId::new();
    let command = end_point
        .create_insert_command(unknown, 0, &fixture.ctx)
        .unwrap();
    let result = end_point.execute_command(command, &fixture.ctx);
    assert!(matches!(result, Err(MappingError::EndPointNotFound(_))));
}

#[test]
fn test_replace_command_swaps_registrations() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let old = fixture.opposite();
    let old_id = old.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&old)).unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![old_id]);
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    let new = fixture.opposite();
    let new_id = new.borrow().owner_id();
    let command = end_point
        .create_replace_command(0, new_id, &fixture.ctx)
        .unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();

    let data: Vec<_> = end_point.get_data(&fixture.ctx).unwrap().iter().collect();
    assert_eq!(data, vec![new_id]);
    assert_pairing_invariant(&mut end_point, &fixture.ctx);
}

#[test]
fn test_delete_command_clears_collection() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let ep = fixture.opposite();
    let member = ep.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&ep)).unwrap();
    fixture.loader.prepare(end_point.id().clone(), vec![member]);

    let command = end_point.create_delete_command(&fixture.ctx).unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();

    assert!(end_point.get_data(&fixture.ctx).unwrap().is_empty());
    assert!(end_point.has_changed());

    end_point.rollback();
    assert!(end_point.get_data(&fixture.ctx).unwrap().contains(member));
}

#[test]
fn test_set_collection_command_replaces_contents() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    let keep = fixture.opposite();
    let keep_id = keep.borrow().owner_id();
    let dropped = fixture.opposite();
    let dropped_id = dropped.borrow().owner_id();
    end_point.register_original_opposite_end_point(Rc::clone(&keep)).unwrap();
    end_point.register_original_opposite_end_point(Rc::clone(&dropped)).unwrap();
    fixture
        .loader
        .prepare(end_point.id().clone(), vec![keep_id, dropped_id]);

    let added = fixture.opposite();
    let added_id = added.borrow().owner_id();
    let command = end_point
        .create_set_collection_command(&[added_id, keep_id], &fixture.ctx)
        .unwrap();
    end_point.execute_command(command, &fixture.ctx).unwrap();

    let data: Vec<_> = end_point.get_data(&fixture.ctx).unwrap().iter().collect();
    assert_eq!(data, vec![added_id, keep_id]);
    assert_pairing_invariant(&mut end_point, &fixture.ctx);
}

#[test]
fn test_add_command_rejects_deleted_object() {
    let fixture = Fixture::new();
    let mut end_point = fixture.end_point();
    end_point.ensure_data_complete(&fixture.ctx).unwrap();

    let doomed = fixture.opposite();
    let doomed_id = doomed.borrow().owner_id();
    fixture.registry.borrow_mut().mark_deleted(doomed_id);

    let result = end_point.create_add_command(doomed_id, &fixture.ctx);
    assert!(matches!(result, Err(MappingError::ObjectDeleted(_))));
}

// ----------------------------------------------------------------------------
// set_value_from
// ----------------------------------------------------------------------------

#[test]
fn test_set_value_from_copies_contents_and_touch() {
    let fixture = Fixture::new();
    let mut target = fixture.end_point();
    let mut source = fixture.end_point();
    let ep = fixture.opposite();
    let member = ep.borrow().owner_id();
    fixture.loader.prepare(source.id().clone(), vec![]);
    fixture.loader.prepare(target.id().clone(), vec![]);
    source.ensure_data_complete(&fixture.ctx).unwrap();
    target.ensure_data_complete(&fixture.ctx).unwrap();

    let command = source.create_add_command(member, &fixture.ctx).unwrap();
    source.execute_command(command, &fixture.ctx).unwrap();

    target.set_value_from(&source, &fixture.ctx).unwrap();

    assert!(target.get_data(&fixture.ctx).unwrap().contains(member));
    assert!(target.has_been_touched());
}

#[test]
fn test_set_value_from_rejects_different_properties() {
    let fixture = Fixture::new();
    let mut target = fixture.end_point();
    let other_relation = RelationDefinition::new("customers", "shop");
    let mut source = CollectionEndPoint::new(ObjectId::new(), other_relation, &fixture.ctx);
    fixture.loader.prepare(source.id().clone(), vec![]);
    source.ensure_data_complete(&fixture.ctx).unwrap();

    let result = target.set_value_from(&source, &fixture.ctx);
    assert!(matches!(result, Err(MappingError::InvariantViolation(_))));
}
