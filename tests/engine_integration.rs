// Engine integration tests covering full insert/select/join/aggregate flows.
use std::path::Path;

use tabulite::core::error::ErrorKind;
use tabulite::core::registry::{AggregateOp, TableRegistry};
use tabulite::core::store::FileStore;
use tabulite::core::table::{Query, Table, TableKind};

fn seed_files(dir: &Path) {
    std::fs::write(
        dir.join("employees.tbl"),
        "id,dept_id,name,age,salary\n1,11,Carl,23,25000\n2,12,Lily,20,18000\n",
    )
    .expect("seed employees");
    std::fs::write(
        dir.join("departments.tbl"),
        "dept_id,dept_name\n11,IT\n12,Marketing\n",
    )
    .expect("seed departments");
    std::fs::write(
        dir.join("clients.tbl"),
        "client_id,name,email,phone,address,points,emp_id\n\
         1,Alice,alice@email.com,1234567890,NY,100,12\n\
         2,Bob,bob@email.com,0987654321,CA,150,12\n",
    )
    .expect("seed clients");
}

fn database(dir: &Path) -> TableRegistry {
    let mut registry = TableRegistry::new();
    for (name, kind) in [
        ("employees", TableKind::Employee),
        ("departments", TableKind::Department),
        ("clients", TableKind::Client),
    ] {
        let store = FileStore::new(dir.join(format!("{name}.tbl")));
        let table = Table::open(kind, Box::new(store)).expect("open table");
        registry.register_table(name, table).expect("register");
    }
    registry
}

#[test]
fn insert_and_select() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let mut db = database(temp.path());

    db.insert_record("employees", "3 13 Michael 33 43000")
        .expect("insert employee");
    db.insert_record("departments", "13 HR").expect("insert department");
    db.insert_record("clients", "3 Mario mario@email.com 2345678901 CA 200 13")
        .expect("insert client");

    let records = db
        .select_records("employees", &Query::IdRange { min: 2, max: 3 })
        .expect("select employees");
    assert_eq!(records.len(), 2);
    let names: Vec<_> = records
        .iter()
        .map(|record| record.get("name").expect("name"))
        .collect();
    assert!(names.contains(&"Michael"));

    let records = db
        .select_records("departments", &Query::DeptName("HR".to_string()))
        .expect("select departments");
    assert_eq!(records.len(), 1);

    let records = db
        .select_records("clients", &Query::MinPoints(50))
        .expect("select clients");
    assert_eq!(records.len(), 3);
}

#[test]
fn inserts_survive_reopening_from_the_same_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let mut db = database(temp.path());
    db.insert_record("employees", "3 13 Michael 33 43000")
        .expect("insert");

    let reopened = database(temp.path());
    let before = db.table("employees").expect("table").entries();
    let after = reopened.table("employees").expect("table").entries();
    assert_eq!(before, after);
    assert_eq!(after.len(), 3);
    assert_eq!(after[2].get("name"), Some("Michael"));
}

#[test]
fn join() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let db = database(temp.path());

    let joined = db
        .join_tables("employees", "departments", "dept_id", "dept_id")
        .expect("join");
    assert_eq!(joined.len(), 2);
    let dept_names: Vec<_> = joined
        .iter()
        .map(|record| record.get("dept_name").expect("dept_name"))
        .collect();
    assert_eq!(dept_names, ["IT", "Marketing"]);

    let err = db
        .join_tables("employees", "unknown_table", "dept_id", "dept_id")
        .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn multi_join() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let db = database(temp.path());

    let joined = db
        .multi_join(
            &["employees", "departments", "clients"],
            &[("dept_id", "dept_id"), ("dept_id", "emp_id")],
        )
        .expect("multi-join");
    assert_eq!(joined.len(), 2);
    let client_names: Vec<_> = joined
        .iter()
        .map(|record| record.get("name").expect("name"))
        .collect();
    assert_eq!(client_names, ["Alice", "Bob"]);
}

#[test]
fn multi_join_invalid_conditions() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let db = database(temp.path());

    let err = db
        .multi_join(
            &["employees", "departments", "clients"],
            &[("dept_id", "dept_id")],
        )
        .expect_err("bad arity");
    assert_eq!(err.kind(), ErrorKind::InvalidArity);

    let err = db
        .multi_join(&["employees", "unknown_table"], &[("dept_id", "dept_id")])
        .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.table(), Some("unknown_table"));
}

#[test]
fn aggregate() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let db = database(temp.path());

    assert_eq!(
        db.aggregate("employees", AggregateOp::Avg, "salary")
            .expect("avg"),
        21500.0
    );
    assert_eq!(
        db.aggregate("employees", AggregateOp::Max, "salary")
            .expect("max"),
        25000.0
    );
    assert_eq!(
        db.aggregate("employees", AggregateOp::Min, "salary")
            .expect("min"),
        18000.0
    );
    assert_eq!(
        db.aggregate("employees", AggregateOp::Count, "salary")
            .expect("count"),
        2.0
    );

    let err = db
        .aggregate("unknown_table", AggregateOp::Avg, "salary")
        .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn duplicate_insert() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let mut db = database(temp.path());

    let err = db
        .insert_record("employees", "1 11 Carl 35 45000")
        .expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    assert_eq!(db.table("employees").expect("table").entries().len(), 2);

    // The rejected record must not have been persisted either.
    let reopened = database(temp.path());
    assert_eq!(reopened.table("employees").expect("table").entries().len(), 2);
}

#[test]
fn invalid_aggregation() {
    let err = "sum".parse::<AggregateOp>().expect_err("unknown op");
    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
}

#[test]
fn errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_files(temp.path());
    let mut db = database(temp.path());

    let extra = Table::open(
        TableKind::Employee,
        Box::new(FileStore::new(temp.path().join("extra.tbl"))),
    )
    .expect("open");
    let err = db.register_table("employees", extra).expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = db
        .insert_record("unknown_table", "1 2 3")
        .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = db
        .select_records("unknown_table", &Query::MinPoints(1))
        .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
