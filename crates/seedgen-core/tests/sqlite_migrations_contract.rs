use seedgen_core::sqlite::{current_schema_version, migration, migrations};

#[test]
fn migration_versions_are_strictly_increasing() {
    let entries = migrations();
    assert!(!entries.is_empty());

    let mut previous = 0;
    for entry in entries {
        assert!(entry.version > previous);
        previous = entry.version;
    }
}

#[test]
fn migration_lookup_and_schema_version_are_consistent() {
    let latest = current_schema_version();
    let latest_entry = migration(latest).expect("latest migration must exist");
    assert_eq!(latest_entry.version, latest);
}

#[test]
fn migration_sql_is_defined_for_up_and_down_paths() {
    for entry in migrations() {
        assert!(!entry.up_sql.trim().is_empty(), "up sql must not be empty");
        assert!(
            !entry.down_sql.trim().is_empty(),
            "down sql must not be empty"
        );
    }
}

#[test]
fn seed_tasks_migration_follows_policy_schema() {
    let names: Vec<&str> = migrations().iter().map(|entry| entry.name).collect();
    assert_eq!(
        names,
        vec!["initial_policy_schema", "add_seed_tasks", "add_task_sources"]
    );
    assert!(migration(2).unwrap().up_sql.contains("seed_tasks"));
}

#[test]
fn task_sources_are_unique_per_name_and_url() {
    let entry = migration(3).expect("task source migration must exist");
    assert!(entry.up_sql.contains("UNIQUE (source_name, url)"));
    assert!(entry.down_sql.contains("DROP TABLE IF EXISTS task_sources"));
}
