use checkkit_core::db::open_db_in_memory;
use checkkit_core::{
    CheckKit, CoreError, Entity, InstancePatch, InstanceValue, ItemType, MemoryKeyStore,
    NewRoutine, RepeatPattern, RoutineId, RoutinePatch, ValidationError,
};
use chrono::NaiveDate;

fn kit() -> CheckKit<MemoryKeyStore> {
    CheckKit::with_connection(open_db_in_memory().unwrap(), MemoryKeyStore::new())
        .with_duplicate_window_ms(0)
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn insert_raw_instance(kit: &CheckKit<MemoryKeyStore>, routine_id: RoutineId, date: &str) {
    kit.connection()
        .execute(
            "INSERT INTO routine_instances (routine_id, date, completed, created_at)
             VALUES (?1, ?2, 0, 0);",
            rusqlite::params![routine_id, date],
        )
        .unwrap();
}

fn instance_count(kit: &CheckKit<MemoryKeyStore>, routine_id: RoutineId, date: &str) -> i64 {
    kit.connection()
        .query_row(
            "SELECT COUNT(*) FROM routine_instances WHERE routine_id = ?1 AND date = ?2;",
            rusqlite::params![routine_id, date],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn weekly_routine_materializes_on_listed_weekdays_only() {
    let kit = kit();
    let id = kit
        .create_routine(
            &NewRoutine::new("Gym", RepeatPattern::Weekly, ItemType::Boolean).with_days([1, 3, 5]),
        )
        .unwrap()
        .id;

    let monday = kit.materialize_day(day(2024, 1, 1)).unwrap();
    let tuesday = kit.materialize_day(day(2024, 1, 2)).unwrap();

    assert_eq!(monday.created.len(), 1);
    assert_eq!(monday.evaluated, 1);
    assert!(tuesday.created.is_empty());
    assert_eq!(instance_count(&kit, id, "2024-01-01"), 1);
    assert_eq!(instance_count(&kit, id, "2024-01-02"), 0);
}

#[test]
fn materialization_is_idempotent() {
    let kit = kit();
    kit.create_routine(&NewRoutine::daily("Water")).unwrap();
    kit.create_routine(
        &NewRoutine::new("Rent", RepeatPattern::Monthly, ItemType::Boolean).with_days([15]),
    )
    .unwrap();

    let date = day(2024, 3, 15);
    let first = kit.materialize_day(date).unwrap();
    let after_first = kit.instances_for_date(date).unwrap();
    let second = kit.materialize_day(date).unwrap();
    let after_second = kit.instances_for_date(date).unwrap();

    assert_eq!(first.created.len(), 2);
    assert!(second.created.is_empty());
    assert_eq!(after_first, after_second);
}

#[test]
fn empty_day_sets_never_materialize() {
    let kit = kit();
    kit.create_routine(&NewRoutine::new("Never weekly", RepeatPattern::Weekly, ItemType::Boolean))
        .unwrap();
    kit.create_routine(&NewRoutine::new(
        "Never monthly",
        RepeatPattern::Monthly,
        ItemType::Boolean,
    ))
    .unwrap();

    for offset in 0..40 {
        let date = day(2024, 1, 1) + chrono::Duration::days(offset);
        assert!(kit.materialize_day(date).unwrap().created.is_empty(), "{date}");
    }
}

#[test]
fn deactivated_routine_stops_materializing_and_keeps_history() {
    let kit = kit();
    let id = kit.create_routine(&NewRoutine::daily("Read")).unwrap().id;
    kit.materialize_day(day(2024, 1, 1)).unwrap();

    kit.delete_routine(id).unwrap();
    let report = kit.materialize_day(day(2024, 1, 2)).unwrap();

    assert_eq!(report.evaluated, 0);
    assert!(report.created.is_empty());
    assert_eq!(kit.instances_for_date(day(2024, 1, 1)).unwrap().len(), 1);
}

#[test]
fn routine_edits_apply_to_next_materialization() {
    let kit = kit();
    let id = kit
        .create_routine(
            &NewRoutine::new("Swim", RepeatPattern::Weekly, ItemType::Boolean).with_days([2]),
        )
        .unwrap()
        .id;
    assert!(kit.materialize_day(day(2024, 1, 1)).unwrap().created.is_empty());

    kit.update_routine(
        id,
        &RoutinePatch {
            repeat_days: Some([1].into_iter().collect()),
            ..RoutinePatch::default()
        },
    )
    .unwrap();

    assert_eq!(kit.materialize_day(day(2024, 1, 1)).unwrap().created.len(), 1);
}

#[test]
fn reconcile_keeps_exactly_one_of_n_duplicates() {
    for duplicates in 1..=5 {
        let kit = kit();
        let id = kit.create_routine(&NewRoutine::daily("Vitamins")).unwrap().id;
        for _ in 0..duplicates {
            insert_raw_instance(&kit, id, "2024-02-10");
        }
        let first_id = kit.instances_for_date(day(2024, 2, 10)).unwrap()[0].id;

        let kept = kit.reconcile_day(day(2024, 2, 10)).unwrap();

        assert_eq!(kept.len(), 1, "n={duplicates}");
        assert_eq!(kept[0].id, first_id);
        assert_eq!(instance_count(&kit, id, "2024-02-10"), 1);
    }
}

#[test]
fn reconcile_only_collapses_same_routine_same_date() {
    let kit = kit();
    let a = kit.create_routine(&NewRoutine::daily("A")).unwrap().id;
    let b = kit.create_routine(&NewRoutine::daily("B")).unwrap().id;
    insert_raw_instance(&kit, a, "2024-02-10");
    insert_raw_instance(&kit, a, "2024-02-10");
    insert_raw_instance(&kit, b, "2024-02-10");
    insert_raw_instance(&kit, a, "2024-02-11");

    let kept = kit.reconcile_day(day(2024, 2, 10)).unwrap();

    assert_eq!(kept.len(), 2);
    assert_eq!(instance_count(&kit, a, "2024-02-10"), 1);
    assert_eq!(instance_count(&kit, b, "2024-02-10"), 1);
    assert_eq!(instance_count(&kit, a, "2024-02-11"), 1);
}

#[test]
fn materialize_does_not_add_to_existing_duplicates() {
    let kit = kit();
    let id = kit.create_routine(&NewRoutine::daily("Plank")).unwrap().id;
    insert_raw_instance(&kit, id, "2024-05-01");
    insert_raw_instance(&kit, id, "2024-05-01");

    assert!(kit.materialize_day(day(2024, 5, 1)).unwrap().created.is_empty());
    assert_eq!(instance_count(&kit, id, "2024-05-01"), 2);
}

#[test]
fn today_instances_materializes_and_reconciles() {
    let kit = kit();
    let dup = kit.create_routine(&NewRoutine::daily("Dup")).unwrap().id;
    let fresh = kit.create_routine(&NewRoutine::daily("Fresh")).unwrap().id;
    insert_raw_instance(&kit, dup, "2024-06-01");
    insert_raw_instance(&kit, dup, "2024-06-01");

    let today = kit.today_instances(day(2024, 6, 1)).unwrap();

    let mut routine_ids: Vec<_> = today.iter().map(|instance| instance.routine_id).collect();
    routine_ids.sort_unstable();
    assert_eq!(routine_ids, vec![dup, fresh]);
    assert!(today.iter().all(|instance| !instance.completed));
}

#[test]
fn completing_instance_stamps_and_clears_completed_at() {
    let kit = kit();
    kit.create_routine(&NewRoutine::new("Steps", RepeatPattern::Daily, ItemType::Number))
        .unwrap();
    let instance = kit.today_instances(day(2024, 6, 1)).unwrap().remove(0);
    assert!(instance.completed_at.is_none());

    let done = kit
        .update_instance(
            instance.id,
            &InstancePatch {
                completed: Some(true),
                value: Some(Some(InstanceValue::Number(8_500.0))),
                ..InstancePatch::default()
            },
        )
        .unwrap();
    assert!(done.completed);
    let stamped = done.completed_at.unwrap();

    let again = kit.update_instance(instance.id, &InstancePatch::complete()).unwrap();
    assert_eq!(again.completed_at, Some(stamped));

    let undone = kit
        .update_instance(
            instance.id,
            &InstancePatch {
                completed: Some(false),
                ..InstancePatch::default()
            },
        )
        .unwrap();
    assert!(!undone.completed);
    assert!(undone.completed_at.is_none());

    let stored = kit.get_instance(instance.id).unwrap().unwrap();
    assert_eq!(stored, undone);
    assert_eq!(stored.value, Some(InstanceValue::Number(8_500.0)));
}

#[test]
fn instance_value_must_match_item_type() {
    let kit = kit();
    kit.create_routine(&NewRoutine::new("Mood", RepeatPattern::Daily, ItemType::Text))
        .unwrap();
    let instance = kit.today_instances(day(2024, 6, 1)).unwrap().remove(0);

    let err = kit
        .update_instance(instance.id, &InstancePatch::with_value(InstanceValue::Boolean(true)))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::ValueTypeMismatch {
            item_type: ItemType::Text
        })
    ));

    let ok = kit
        .update_instance(
            instance.id,
            &InstancePatch::with_value(InstanceValue::Text("calm".to_string())),
        )
        .unwrap();
    assert_eq!(ok.value, Some(InstanceValue::Text("calm".to_string())));
}

#[test]
fn photo_routines_carry_photos_not_values() {
    let kit = kit();
    kit.create_routine(&NewRoutine::new("Meal", RepeatPattern::Daily, ItemType::Photo))
        .unwrap();
    let instance = kit.today_instances(day(2024, 6, 1)).unwrap().remove(0);

    let updated = kit
        .update_instance(
            instance.id,
            &InstancePatch {
                photos: Some(vec!["data:image/jpeg;base64,AAAA".to_string()]),
                notes: Some(Some("lunch".to_string())),
                ..InstancePatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.photos.len(), 1);
    assert_eq!(updated.notes.as_deref(), Some("lunch"));

    let err = kit
        .update_instance(instance.id, &InstancePatch::with_value(InstanceValue::Number(1.0)))
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn update_unknown_instance_is_not_found() {
    let kit = kit();
    let err = kit.update_instance(77, &InstancePatch::complete()).unwrap_err();
    assert!(matches!(
        err,
        CoreError::NotFound {
            entity: Entity::Instance,
            id: 77
        }
    ));
}

#[test]
fn range_query_is_inclusive_and_rejects_reversed_bounds() {
    let kit = kit();
    kit.create_routine(&NewRoutine::daily("Daily")).unwrap();
    for d in 1..=5 {
        kit.materialize_day(day(2024, 1, d)).unwrap();
    }

    let range = kit.instances_in_range(day(2024, 1, 2), day(2024, 1, 4)).unwrap();
    let dates: Vec<_> = range.iter().map(|instance| instance.date).collect();
    assert_eq!(dates, vec![day(2024, 1, 2), day(2024, 1, 3), day(2024, 1, 4)]);

    let err = kit
        .instances_in_range(day(2024, 1, 4), day(2024, 1, 2))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::InvalidDateRange { .. })
    ));
}

#[test]
fn concurrent_materialization_on_shared_file_creates_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkkit.db");
    {
        let conn = checkkit_core::db::open_db(&path).unwrap();
        let kit = CheckKit::with_connection(conn, MemoryKeyStore::new());
        kit.create_routine(&NewRoutine::daily("Shared")).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            std::thread::spawn(move || {
                let conn = checkkit_core::db::open_db(&path).unwrap();
                let kit = CheckKit::with_connection(conn, MemoryKeyStore::new());
                kit.materialize_day(day(2024, 7, 1)).unwrap().created.len()
            })
        })
        .collect();
    let created: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();

    let conn = checkkit_core::db::open_db(&path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM routine_instances WHERE date = '2024-07-01';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(created, 1);
    assert_eq!(count, 1);
}

#[test]
fn number_values_are_stored_bit_exact() {
    let kit = kit();
    kit.create_routine(&NewRoutine::new("Dose", RepeatPattern::Daily, ItemType::Number))
        .unwrap();
    let instance = kit.today_instances(day(2024, 6, 1)).unwrap().remove(0);

    for value in [1.079907802215119e-66, 0.1 + 0.2, f64::MIN_POSITIVE, 1e308] {
        kit.update_instance(instance.id, &InstancePatch::with_value(InstanceValue::Number(value)))
            .unwrap();
        let stored = kit.get_instance(instance.id).unwrap().unwrap();
        match stored.value {
            Some(InstanceValue::Number(read)) => assert_eq!(read.to_bits(), value.to_bits()),
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
