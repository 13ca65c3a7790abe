use checkkit_core::db::open_db_in_memory;
use checkkit_core::model::settings::SETTINGS_VERSION;
use checkkit_core::{
    CheckKit, DeviceKey, MemoryKeyStore, NewRoutine, SettingsPatch,
};
use chrono::NaiveDate;

fn kit(key: &DeviceKey) -> CheckKit<MemoryKeyStore> {
    CheckKit::with_connection(
        open_db_in_memory().unwrap(),
        MemoryKeyStore::with_key(key.clone()),
    )
}

fn settings_rows(kit: &CheckKit<MemoryKeyStore>) -> i64 {
    kit.connection()
        .query_row("SELECT COUNT(*) FROM settings;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn first_read_creates_defaults_once() {
    let key = DeviceKey::generate();
    let kit = kit(&key);
    assert_eq!(settings_rows(&kit), 0);

    let first = kit.get_settings().unwrap();
    let second = kit.get_settings().unwrap();

    assert_eq!(first, second);
    assert_eq!(settings_rows(&kit), 1);
    assert!(!first.pin_enabled);
    assert!(!first.biometric_enabled);
    assert!(first.notifications_enabled);
    assert!(first.pin_hash.is_none());
    assert!(first.last_backup.is_none());
    assert_eq!(first.encryption_key, key.to_base64());
    assert_eq!(first.version, SETTINGS_VERSION);
}

#[test]
fn update_merges_only_given_fields() {
    let kit = kit(&DeviceKey::generate());

    let updated = kit
        .update_settings(&SettingsPatch {
            biometric_enabled: Some(true),
            notifications_enabled: Some(false),
            ..SettingsPatch::default()
        })
        .unwrap();
    assert!(updated.biometric_enabled);
    assert!(!updated.notifications_enabled);
    assert!(!updated.pin_enabled);

    let cleared = kit
        .update_settings(&SettingsPatch {
            pin_hash: Some(None),
            ..SettingsPatch::default()
        })
        .unwrap();
    assert!(cleared.biometric_enabled);
    assert_eq!(kit.get_settings().unwrap(), cleared);
}

#[test]
fn clear_all_data_keeps_settings_and_resets_last_backup() {
    let key = DeviceKey::generate();
    let kit = kit(&key);
    kit.create_routine(&NewRoutine::daily("Stretch")).unwrap();
    kit.today_instances(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .unwrap();
    kit.update_settings(&SettingsPatch {
        notifications_enabled: Some(false),
        ..SettingsPatch::default()
    })
    .unwrap();
    kit.export_backup().unwrap();
    assert!(kit.get_settings().unwrap().last_backup.is_some());

    kit.clear_all_data().unwrap();

    assert!(kit.list_routines(true).unwrap().is_empty());
    let instances: i64 = kit
        .connection()
        .query_row("SELECT COUNT(*) FROM routine_instances;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(instances, 0);

    let settings = kit.get_settings().unwrap();
    assert!(settings.last_backup.is_none());
    assert!(!settings.notifications_enabled);
    assert_eq!(settings.encryption_key, key.to_base64());
}
