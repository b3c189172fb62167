//! Integration tests for the chain builder
//!
//! These tests run the builder end to end against SQLite:
//! - Insert, select, update and delete through the where mini-language
//! - State reset between terminal calls
//! - Reconnect after idle timeout and after a failed statement or batch
//! - Streaming rows

#[cfg(feature = "sqlite")]
mod sqlite_tests {
    use async_trait::async_trait;
    use chaindb::backends::SqliteConnector;
    use chaindb::core::Session;
    use chaindb::prelude::*;
    use chaindb::{Connector, ErrorKind};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn users_db(options: ChainOptions) -> ChainDb {
        let conn = Connection::open(SqliteConnector, ConnectConfig::new().echo_sql(true)).await;
        let mut db = ChainDb::with_options(conn, options);
        db.connection_mut()
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, score INTEGER DEFAULT 0)",
                (),
            )
            .await
            .expect("Failed to create table");
        db.table("users");
        db
    }

    async fn seeded() -> ChainDb {
        let mut db = users_db(ChainOptions::default()).await;
        db.insert_many(&json!([
            {"name": "Alice", "age": 30},
            {"name": "Bob", "age": 17},
            {"name": "Carol", "age": 45},
            {"name": "Dave", "age": 22},
        ]))
        .await
        .expect("Failed to seed");
        db
    }

    fn names(rows: &[DatabaseRow]) -> Vec<String> {
        rows.iter().map(|row| row["name"].as_string()).collect()
    }

    /// Counts sessions opened through an inner connector
    struct CountingConnector {
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::Sqlite
        }

        async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Session>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            SqliteConnector.connect(config).await
        }
    }

    fn temp_db(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "chaindb-{}-{}.sqlite",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let mut db = users_db(ChainOptions::default()).await;

        let result = db
            .insert(&json!({"name": "Alice", "age": 30}))
            .await
            .expect("Insert failed")
            .expect("Insert skipped");
        assert_eq!(result.last_insert_id, Some(1));
        assert_eq!(result.row_count, 1);
        assert_eq!(
            db.last_sql(),
            "INSERT INTO users (name,age) VALUES ('Alice',30);"
        );

        let row = db
            .where_(json!({"name": "Alice"}))
            .get("id,name,age")
            .await
            .expect("Get failed");
        assert_eq!(row["age"].as_long(), Some(30));
        assert_eq!(db.last_sql(), "SELECT id,name,age FROM users WHERE name='Alice' LIMIT 1;");
    }

    #[tokio::test]
    async fn test_get_on_no_match_is_graceful() {
        let mut db = seeded().await;
        let row = db
            .where_(json!({"name": "Nobody"}))
            .get("*")
            .await
            .expect("Get failed");
        assert!(row.is_empty());
        assert_eq!(row["name"].as_string(), "");
    }

    #[tokio::test]
    async fn test_select_where_forms() {
        let mut db = seeded().await;

        let adults = db
            .where_(json!({"age": [">=", 18]}))
            .order_by("age")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&adults), vec!["Dave", "Alice", "Carol"]);

        let picked = db
            .where_(json!({"id": ["in", [1, 3]]}))
            .order_by("id")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&picked), vec!["Alice", "Carol"]);

        let ranged = db
            .where_(json!({"age": ["between", 20, 35]}))
            .order_by("id")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&ranged), vec!["Alice", "Dave"]);

        let either = db
            .where_(json!({"name": ["or", "Bob"], "age": 45}))
            .order_by("id")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&either), vec!["Bob", "Carol"]);
    }

    #[tokio::test]
    async fn test_typed_clauses_and_raw_where() {
        let mut db = seeded().await;

        let rows = db
            .where_(vec![Clause::cmp("age", "<", 25), Clause::eq("name", "Bob")])
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&rows), vec!["Bob"]);

        let rows = db
            .where_("age > 40")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&rows), vec!["Carol"]);
    }

    #[tokio::test]
    async fn test_limit_range() {
        let mut db = seeded().await;
        let rows = db
            .order_by("id")
            .limit("1,2")
            .select("name")
            .await
            .expect("Select failed");
        assert_eq!(names(&rows), vec!["Bob", "Carol"]);
    }

    #[tokio::test]
    async fn test_state_resets_between_calls() {
        let mut db = seeded().await;

        db.where_(json!({"name": "Alice"}))
            .limit(1)
            .select("*")
            .await
            .expect("Select failed");
        assert_eq!(db.state(), &Default::default());
        assert_eq!(db.table_name(), "users");

        let all = db.select("*").await.expect("Select failed");
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_update_with_native_expression() {
        let mut db = seeded().await;

        let result = db
            .where_(json!({"name": "Bob"}))
            .update(&json!({"age": "`age + 1", "score": ["score + ?", 5]}))
            .await
            .expect("Update failed")
            .expect("Update skipped");
        assert_eq!(result.row_count, 1);

        let row = db
            .where_(json!({"name": "Bob"}))
            .get("age,score")
            .await
            .expect("Get failed");
        assert_eq!(row["age"].as_long(), Some(18));
        assert_eq!(row["score"].as_long(), Some(5));
    }

    #[tokio::test]
    async fn test_increase_and_decrease() {
        let mut db = seeded().await;

        db.where_(json!({"id": 1}))
            .increase("score", 10)
            .await
            .expect("Increase failed");
        db.where_(json!({"id": 1}))
            .decrease("score", 3)
            .await
            .expect("Decrease failed");

        let row = db
            .where_(json!({"id": 1}))
            .get("score")
            .await
            .expect("Get failed");
        assert_eq!(row["score"].as_long(), Some(7));

        let untouched = db
            .where_(json!({"id": 2}))
            .get("score")
            .await
            .expect("Get failed");
        assert_eq!(untouched["score"].as_long(), Some(0));
    }

    #[tokio::test]
    async fn test_strict_delete_guard() {
        let mut db = seeded().await;

        let refused = db.delete().await.expect("Delete errored");
        assert!(refused.is_none());
        assert_eq!(db.select("*").await.expect("Select failed").len(), 4);

        let deleted = db
            .where_(json!({"age": ["<", 18]}))
            .delete()
            .await
            .expect("Delete failed")
            .expect("Delete skipped");
        assert_eq!(deleted.row_count, 1);
        assert_eq!(db.select("*").await.expect("Select failed").len(), 3);
    }

    #[tokio::test]
    async fn test_lenient_delete_clears_table() {
        let mut db = users_db(ChainOptions::default().with_strict(false)).await;
        db.insert(&json!({"name": "Alice"})).await.expect("Insert failed");

        let deleted = db
            .delete()
            .await
            .expect("Delete failed")
            .expect("Delete skipped");
        assert_eq!(deleted.row_count, 1);
    }

    #[tokio::test]
    async fn test_get_fields_name() {
        let mut db = users_db(ChainOptions::default()).await;
        let fields = db.get_fields_name().await.expect("Introspection failed");
        assert_eq!(fields, vec!["id", "name", "age", "score"]);
    }

    #[tokio::test]
    async fn test_join_with_prefix() {
        let conn = Connection::open(SqliteConnector, ConnectConfig::new()).await;
        let mut db = ChainDb::with_options(conn, ChainOptions::default().with_table_name_prefix("app_"));
        for ddl in [
            "CREATE TABLE app_users (id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE TABLE app_orders (id INTEGER PRIMARY KEY, user_id INTEGER, total INTEGER)",
        ] {
            db.connection_mut().execute(ddl, ()).await.expect("DDL failed");
        }
        db.table("users")
            .insert(&json!({"name": "Alice"}))
            .await
            .expect("Insert failed");
        db.table("orders")
            .insert_many(&json!({"fields": ["user_id", "total"], "values": [[1, 10], [1, 32]]}))
            .await
            .expect("Insert failed");

        let rows = db
            .table("users")
            .left_join("###orders", "###orders.user_id = app_users.id")
            .group_by("app_users.id")
            .select("app_users.name, SUM(app_orders.total) AS spent")
            .await
            .expect("Select failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["spent"].as_long(), Some(42));
    }

    #[tokio::test]
    async fn test_select_native() {
        let mut db = users_db(ChainOptions::default()).await;
        let rows = db.select("`1 + 2 AS three").await.expect("Select failed");
        assert_eq!(rows[0]["three"].as_long(), Some(3));
    }

    #[tokio::test]
    async fn test_iter_streams_rows() {
        let mut db = seeded().await;
        let conn = db.connection_mut();

        let mut rows = conn
            .iter("SELECT name FROM users WHERE age > ? ORDER BY id", vec![DatabaseValue::Int(18)])
            .await
            .expect("Iter failed");
        assert_eq!(rows.column_names(), ["name".to_string()]);

        let mut seen = Vec::new();
        while let Some(row) = rows.next().await.expect("Row failed") {
            seen.push(row["name"].as_string());
        }
        assert_eq!(seen, vec!["Alice", "Carol", "Dave"]);
    }

    #[tokio::test]
    async fn test_reconnect_after_failure() {
        let path = temp_db("failure");
        let connects = Arc::new(AtomicUsize::new(0));
        let config = ConnectConfig::new().database(path.to_string_lossy());
        let mut conn = Connection::new(
            CountingConnector {
                connects: Arc::clone(&connects),
            },
            config,
        );

        conn.execute("CREATE TABLE t (v INTEGER)", ())
            .await
            .expect("DDL failed");
        conn.execute("INSERT INTO t VALUES (?)", vec![DatabaseValue::Int(1)])
            .await
            .expect("Insert failed");
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        let err = conn.query("SELECT * FROM missing", ()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(!conn.is_connected());

        let rows = conn.query("SELECT v FROM t", ()).await.expect("Query failed");
        assert_eq!(rows.len(), 1);
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        conn.close().await.expect("Close failed");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_insert_many_failure_reconnects() {
        let path = temp_db("batch");
        let connects = Arc::new(AtomicUsize::new(0));
        let config = ConnectConfig::new().database(path.to_string_lossy());
        let conn = Connection::new(
            CountingConnector {
                connects: Arc::clone(&connects),
            },
            config,
        );
        let mut db = ChainDb::new(conn);
        db.connection_mut()
            .execute("CREATE TABLE t (v INTEGER)", ())
            .await
            .expect("DDL failed");

        let err = db
            .table("missing")
            .insert_many(&json!([{"v": 1}, {"v": 2}]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(!db.connection().is_connected());

        let result = db
            .table("t")
            .insert_many(&json!([{"v": 1}, {"v": 2}]))
            .await
            .expect("Batch insert failed")
            .expect("Batch insert skipped");
        assert_eq!(result.row_count, 2);
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        db.into_connection().close().await.expect("Close failed");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_reconnect_after_idle() {
        let path = temp_db("idle");
        let connects = Arc::new(AtomicUsize::new(0));
        let config = ConnectConfig::new()
            .database(path.to_string_lossy())
            .max_idle_time(Duration::from_millis(10));
        let mut conn = Connection::new(
            CountingConnector {
                connects: Arc::clone(&connects),
            },
            config,
        );

        conn.execute("CREATE TABLE t (v INTEGER)", ())
            .await
            .expect("DDL failed");
        tokio::time::sleep(Duration::from_millis(30)).await;
        conn.query("SELECT v FROM t", ()).await.expect("Query failed");
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        conn.close().await.expect("Close failed");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_where_spec_emptiness() {
        let spec: WhereSpec = json!({"age": [">", 1]}).into();
        assert!(!spec.is_empty());
        let empty: WhereSpec = "".into();
        assert!(empty.is_empty());
    }
}
