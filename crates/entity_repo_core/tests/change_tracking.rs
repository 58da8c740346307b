mod common;

use common::{context, Customer, Order};
use entity_repo_core::{
    Column, ContextError, DbContext, Entity, EntityId, EntityState, ModelBuilder, ObjectContext,
    SaveErrorKind,
};
use rusqlite::types::Value;
use rusqlite::Row;

/// Declares two columns but only produces a value for the first.
#[derive(Debug, Clone)]
struct Truncated {
    id: EntityId,
    label: String,
}

impl Entity for Truncated {
    const TABLE: &'static str = "truncated";
    const COLUMNS: &'static [Column] = &[Column::text("label"), Column::integer("weight")];

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.label.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            label: row.get("label")?,
        })
    }
}

#[test]
fn staged_changes_are_written_only_on_save() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();

    let first = set.add(&Order::new("S-1", 1)).unwrap();
    set.add(&Order::new("S-2", 2)).unwrap();
    assert!(ctx.change_tracker().has_changes());
    assert!(set.to_list_no_tracking().unwrap().is_empty());

    assert_eq!(ctx.save_changes().unwrap(), 2);
    assert!(!ctx.change_tracker().has_changes());
    assert_eq!(set.to_list_no_tracking().unwrap().len(), 2);

    let id = set.entity_id(first).unwrap();
    assert_eq!(set.find(id).unwrap().unwrap().id, id);
    assert_eq!(ctx.save_changes().unwrap(), 0);
}

#[test]
fn find_returns_tracked_instance_with_unsaved_edits() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();
    let key = set.add(&Order::new("T-1", 10)).unwrap();
    ctx.save_changes().unwrap();
    let id = set.entity_id(key).unwrap();

    let mut loaded = set.find(id).unwrap().unwrap();
    loaded.total_cents = 11;
    set.update(&loaded).unwrap();

    assert_eq!(set.find(id).unwrap().unwrap().total_cents, 11);
    let tracked = set.to_list().unwrap();
    assert_eq!(tracked[0].total_cents, 11);
    let stored = set.to_list_no_tracking().unwrap();
    assert_eq!(stored[0].total_cents, 10);
}

#[test]
fn removing_an_added_entity_only_detaches_it() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();

    let mut explicit = Order::new("U-1", 1);
    explicit.id = 77;
    set.add(&explicit).unwrap();
    assert_eq!(ctx.change_tracker().state_of(&explicit), EntityState::Added);

    set.remove(&explicit).unwrap();
    assert_eq!(ctx.change_tracker().state_of(&explicit), EntityState::Detached);
    assert_eq!(ctx.save_changes().unwrap(), 0);
}

#[test]
fn explicit_ids_are_kept_on_insert() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();

    let mut explicit = Order::new("U-2", 1);
    explicit.id = 500;
    set.add(&explicit).unwrap();
    ctx.save_changes().unwrap();

    assert_eq!(set.find(500).unwrap().unwrap().code, "U-2");
    assert_eq!(ctx.change_tracker().state_of(&explicit), EntityState::Unchanged);
}

#[test]
fn updating_a_transient_entity_stages_an_insert() {
    let ctx = context();
    let set = ctx.set::<Customer>().unwrap();

    let key = set.update(&Customer::new("t@example.com", "T")).unwrap();
    assert_eq!(ctx.change_tracker().entry(key).unwrap().state, EntityState::Added);
    ctx.save_changes().unwrap();
    assert!(set.entity_id(key).unwrap() > 0);
}

#[test]
fn adding_a_tracked_id_twice_is_rejected_and_range_is_atomic() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();

    let mut a = Order::new("V-1", 1);
    a.id = 1;
    let mut b = Order::new("V-2", 2);
    b.id = 2;
    set.add(&a).unwrap();

    let err = set.add_range(&[b.clone(), a.clone()]).unwrap_err();
    assert!(matches!(err, ContextError::DuplicateKey { table: "orders", id: 1 }));
    assert_eq!(ctx.change_tracker().state_of(&b), EntityState::Detached);
    assert_eq!(ctx.change_tracker().len(), 1);
}

#[test]
fn failed_save_leaves_tracker_untouched() {
    let ctx = context();
    let set = ctx.set::<Customer>().unwrap();
    set.add(&Customer::new("same@example.com", "One")).unwrap();
    set.add(&Customer::new("same@example.com", "Two")).unwrap();

    let err = ctx.save_changes().unwrap_err();
    match err {
        ContextError::Save(save) => {
            let target = save.target.unwrap();
            assert_eq!(target.table, "customers");
            assert_eq!(target.state, EntityState::Added);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(ctx.change_tracker().entries_in(&[EntityState::Added]).len(), 2);
    assert!(set.to_list_no_tracking().unwrap().is_empty());
}

#[test]
fn keyless_entries_refuse_unchanged_state() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();
    let key = set.add(&Order::new("K-1", 1)).unwrap();

    let err = ctx
        .change_tracker()
        .set_state(key, EntityState::Unchanged)
        .unwrap_err();
    assert!(matches!(
        err,
        ContextError::InvalidStateTransition {
            from: EntityState::Added,
            to: EntityState::Unchanged,
            ..
        }
    ));
}

#[test]
fn detach_stops_tracking_and_ignores_untracked() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();
    let key = set.add(&Order::new("L-1", 1)).unwrap();
    ctx.save_changes().unwrap();
    let order = set.find(set.entity_id(key).unwrap()).unwrap().unwrap();

    ctx.detach(&order).unwrap();
    assert!(ctx.change_tracker().is_empty());
    ctx.detach(&order).unwrap();

    let err = ctx.detach(&Order::new("L-2", 2)).unwrap_err();
    assert!(matches!(err, ContextError::MissingKey("orders")));
}

#[test]
fn database_facade_drops_recreates_and_executes_sql() {
    let ctx = context();
    let database = ctx.database();
    assert!(database.can_connect());
    assert_eq!(database.context_id(), ctx.context_id());

    let set = ctx.set::<Order>().unwrap();
    set.add(&Order::new("M-1", 1)).unwrap();
    ctx.save_changes().unwrap();

    let changed = database
        .execute_sql(
            "UPDATE orders SET total_cents = ?1;",
            &[Value::Integer(5)],
        )
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(set.to_list_no_tracking().unwrap()[0].total_cents, 5);

    database.ensure_deleted().unwrap();
    assert!(ctx.change_tracker().is_empty());
    assert!(set.to_list_no_tracking().is_err());

    database.ensure_created().unwrap();
    assert!(set.to_list_no_tracking().unwrap().is_empty());
}

#[test]
fn deleting_a_staged_insert_cancels_it() {
    let ctx = context();
    let set = ctx.set::<Order>().unwrap();

    let mut staged = Order::new("N-1", 1);
    staged.id = 12;
    let key = set.add(&staged).unwrap();

    ctx.change_tracker()
        .set_state(key, EntityState::Deleted)
        .unwrap();
    assert_eq!(ctx.change_tracker().state_of(&staged), EntityState::Detached);
    assert_eq!(ctx.save_changes().unwrap(), 0);
}

#[test]
fn value_count_mismatch_fails_the_whole_save() {
    let model = ModelBuilder::new()
        .entity::<Order>()
        .entity::<Truncated>()
        .build()
        .unwrap();
    let ctx = ObjectContext::in_memory(model).unwrap();
    let orders = ctx.set::<Order>().unwrap();
    let truncated = ctx.set::<Truncated>().unwrap();

    orders.add(&Order::new("O-1", 1)).unwrap();
    truncated
        .add(&Truncated {
            id: 0,
            label: "short".to_string(),
        })
        .unwrap();

    let err = ctx.save_changes().unwrap_err();
    match err {
        ContextError::Save(save) => {
            assert!(matches!(
                save.kind,
                SaveErrorKind::ColumnCount {
                    expected: 2,
                    actual: 1
                }
            ));
            assert_eq!(save.target.unwrap().table, "truncated");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(orders.to_list_no_tracking().unwrap().is_empty());
    assert!(truncated.to_list_no_tracking().unwrap().is_empty());
    assert_eq!(ctx.change_tracker().entries_in(&[EntityState::Added]).len(), 2);
}
