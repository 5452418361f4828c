mod common;

use common::{Book, RecordingSqlExecutor, SqlCall};
use querydeck::prelude::*;
use querydeck::query_engine::entity::ScalarKind;
use querydeck::query_engine::sql::KeyRetrieval;
use querydeck::query_engine::{ConnectionRouter, MapperRegistry, SqlExecutor};
use std::sync::Arc;

fn repository(executor: &Arc<RecordingSqlExecutor>, dialect: Dialect) -> RelationalRepository<Book> {
    let router = ConnectionRouter::single(Arc::clone(executor) as Arc<dyn SqlExecutor>);
    let mapper = MapperRegistry::new().mapper::<Book>().unwrap();
    RelationalRepository::new(Arc::new(router), mapper, dialect).unwrap()
}

fn dune() -> Book {
    Book {
        id: 7,
        title: "Dune".to_string(),
        year: 1965,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_insert_with_assigned_key_skips_key_retrieval() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Postgres);

    let outcome = books.insert(&dune()).await.unwrap();

    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.generated_key, None);
    let calls = executor.calls();
    let SqlCall::Insert(statement) = &calls[0] else {
        panic!("expected an insert, got {:?}", calls[0]);
    };
    assert_eq!(
        statement.sql,
        "INSERT INTO books (id, book_title, year, total) VALUES ($1, $2, $3, $4)"
    );
    assert_eq!(statement.key_retrieval, KeyRetrieval::None);
    assert_eq!(statement.params, vec![json!(7), json!("Dune"), json!(1965), Value::Null]);
}

#[tokio::test]
async fn test_insert_with_unset_key_returns_generated_key() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    *executor.next_key.lock().unwrap() = Some(json!(42));
    let books = repository(&executor, Dialect::Postgres);

    let mut book = Book { id: 0, ..dune() };
    let outcome = books.insert(&book).await.unwrap();

    assert_eq!(outcome.generated_key, Some(json!(42)));
    assert_eq!(book.id, 0, "insert must not mutate the caller's entity");
    assert!(executor.calls()[0].sql().ends_with("RETURNING id"));

    outcome.apply_to(books.mapper(), &mut book).unwrap();
    assert_eq!(book.id, 42);
}

#[tokio::test]
async fn test_oracle_insert_without_key_fails_before_execution() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Oracle);

    let err = books.insert(&Book { id: 0, ..dune() }).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(executor.call_count(), 0);

    // A caller-assigned key works on the same dialect
    books.insert(&dune()).await.unwrap();
    assert_eq!(executor.calls()[0].sql(), "INSERT INTO books (id, book_title, year, total) VALUES (:1, :2, :3, :4)");
}

#[tokio::test]
async fn test_duplicate_key_surfaces_as_conflict() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    *executor.fail_insert_with_duplicate.lock().unwrap() = true;
    let books = repository(&executor, Dialect::Postgres);

    let err = books.insert(&dune()).await.unwrap_err();

    assert!(err.is_conflict());
    assert!(!err.is_backend());
}

#[tokio::test]
async fn test_mass_mutations_are_refused() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Postgres);
    let update = Update::new().set("year", 2000);

    assert!(books
        .update_by_criteria(&Criteria::new(), &update)
        .await
        .unwrap_err()
        .is_validation());
    assert!(books.delete_by_criteria(&Criteria::new()).await.unwrap_err().is_validation());
    assert!(books.delete_by_id(0).await.unwrap_err().is_validation());
    assert!(books.update_by_ids(vec![], &update).await.unwrap_err().is_validation());
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn test_update_by_id_binds_set_before_where() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    *executor.affected.lock().unwrap() = 1;
    let books = repository(&executor, Dialect::MySql);

    let affected = books
        .update_by_id(7, &Update::new().set("title", "Dune Messiah").set("year", 1969))
        .await
        .unwrap();

    assert_eq!(affected, 1);
    let calls = executor.calls();
    assert_eq!(calls[0].sql(), "UPDATE books SET book_title = ?, year = ? WHERE id = ?");
    assert_eq!(calls[0].params(), &[json!("Dune Messiah"), json!(1969), json!(7)]);
}

#[tokio::test]
async fn test_update_entity_skips_key_and_version() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Postgres);

    books.update(&Book { version: 3, ..dune() }).await.unwrap();
    books.update_fields(&dune(), &["year"]).await.unwrap();

    let calls = executor.calls();
    assert_eq!(
        calls[0].sql(),
        "UPDATE books SET book_title = $1, year = $2, total = $3 WHERE id = $4"
    );
    assert_eq!(calls[1].sql(), "UPDATE books SET year = $1 WHERE id = $2");
    assert_eq!(calls[1].params(), &[json!(1965), json!(7)]);
}

#[tokio::test]
async fn test_paged_query_maps_rows() {
    let executor = Arc::new(RecordingSqlExecutor::with_rows(vec![
        json!({ "id": 1, "book_title": "Dune", "year": 1965, "unknown": true }),
        json!({ "id": 2, "book_title": "Hyperion", "year": 1989.0 }),
    ]));
    let books = repository(&executor, Dialect::Postgres);

    let query = Query::with_criteria(Criteria::new().gte("year", 1960).like("title", "D%"))
        .order_by(OrderBy::desc("year"));
    let found = books
        .find_list_by_query_paged(&query, &Pageable::new(2, 10).unwrap())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].title, "Dune");
    assert_eq!(found[1].year, 1989);
    assert_eq!(found[1].total, None);

    let calls = executor.calls();
    assert_eq!(
        calls[0].sql(),
        "SELECT * FROM books WHERE year >= $1 AND book_title LIKE $2 ORDER BY year DESC LIMIT 10 OFFSET 10"
    );
    assert_eq!(calls[0].params(), &[json!(1960), json!("D%")]);
}

#[tokio::test]
async fn test_values_are_never_inlined() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::SqlServer);

    let criteria = Criteria::new()
        .eq("title", "x' OR '1'='1")
        .in_values("year", vec![1965, 1969])
        .ne("total", Value::Null);
    books.find_list(&criteria).await.unwrap();

    let calls = executor.calls();
    let sql = calls[0].sql();
    assert!(!sql.contains("OR '1'='1"));
    assert!(!sql.contains("1965"));
    assert_eq!(calls[0].params().len(), 3);
    assert!(sql.contains("total IS NOT NULL"));
}

#[tokio::test]
async fn test_grouped_rows_carry_count_alias() {
    let executor = Arc::new(RecordingSqlExecutor::with_rows(vec![json!({ "year": 1965, "total": 2 })]));
    let books = repository(&executor, Dialect::Postgres);

    let query = Query::new().group_by(GroupBy::new("year").with_count_alias("total"));
    let groups = books.find_list_by_query(&query).await.unwrap();

    assert_eq!(executor.calls()[0].sql(), "SELECT year, COUNT(*) AS total FROM books GROUP BY year");
    assert_eq!(groups[0].year, 1965);
    assert_eq!(groups[0].total, Some(2));

    let two = Query::new().group_by(GroupBy::new("year")).group_by(GroupBy::new("title"));
    assert!(books.find_list_by_query(&two).await.unwrap_err().is_validation());
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_exists_and_counts() {
    let executor = Arc::new(RecordingSqlExecutor::with_rows(vec![json!({ "id": 7 })]));
    *executor.count.lock().unwrap() = 12;
    let books = repository(&executor, Dialect::Postgres);

    assert!(books.exists_by_id(7).await.unwrap());
    assert_eq!(books.count_all().await.unwrap(), 12);
    assert_eq!(
        books
            .count_by_sql("SELECT COUNT(*) FROM books WHERE year > $1", &[json!(1900)])
            .await
            .unwrap(),
        12
    );

    let calls = executor.calls();
    assert_eq!(calls[0].sql(), "SELECT id FROM books WHERE id = $1 LIMIT 1");
    assert_eq!(calls[1].sql(), "SELECT COUNT(*) FROM books");
    assert_eq!(calls[2].params(), &[json!(1900)]);
}

#[tokio::test]
async fn test_raw_sql_passthrough() {
    let executor = Arc::new(RecordingSqlExecutor::with_rows(vec![json!({ "id": 3, "book_title": "Ubik" })]));
    *executor.affected.lock().unwrap() = 4;
    let books = repository(&executor, Dialect::Postgres);

    let book = books
        .find_one_by_sql("SELECT id, book_title FROM books WHERE id = $1", &[json!(3)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(book.title, "Ubik");

    let affected = books
        .update_by_sql("UPDATE books SET year = $1", &[json!(1969)])
        .await
        .unwrap();
    assert_eq!(affected, 4);
    assert!(books.find_list_by_sql(" ", &[]).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_reads_and_writes_follow_routes() {
    let reader = Arc::new(RecordingSqlExecutor::default());
    let writer = Arc::new(RecordingSqlExecutor::default());
    let router = ConnectionRouter::new(
        Arc::clone(&reader) as Arc<dyn SqlExecutor>,
        Arc::clone(&writer) as Arc<dyn SqlExecutor>,
    );
    let mapper = MapperRegistry::new().mapper::<Book>().unwrap();
    let books = RelationalRepository::new(Arc::new(router), mapper, Dialect::Postgres).unwrap();

    books.find_all().await.unwrap();
    books.count_by_criteria(&Criteria::where_eq("year", 1965)).await.unwrap();
    books.insert(&dune()).await.unwrap();
    books.delete_by_ids(vec![json!(1), json!(2)]).await.unwrap();

    assert_eq!(reader.call_count(), 2);
    assert_eq!(writer.call_count(), 2);
    assert_eq!(writer.calls()[1].sql(), "DELETE FROM books WHERE id IN ($1, $2)");
}

#[tokio::test]
async fn test_null_markers_keep_their_column_kind() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Postgres);

    books.insert(&dune()).await.unwrap();
    books
        .update_by_criteria(&Criteria::where_eq("title", "Dune"), &Update::new().set("total", Value::Null))
        .await
        .unwrap();

    let calls = executor.calls();
    let insert = calls[0].statement();
    assert_eq!(insert.params[3], Value::Null);
    assert_eq!(insert.param_kind(3), Some(ScalarKind::Integer));

    let update = calls[1].statement();
    assert_eq!(update.sql, "UPDATE books SET total = $1 WHERE book_title = $2");
    assert_eq!(
        update.param_kinds,
        vec![Some(ScalarKind::Integer), Some(ScalarKind::Text)]
    );
}

#[tokio::test]
async fn test_uuid_shaped_text_stays_text() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    let books = repository(&executor, Dialect::Postgres);
    let title = "550e8400-e29b-41d4-a716-446655440000";

    books.find_one(&Criteria::where_eq("title", title)).await.unwrap();
    books
        .find_list_by_sql("SELECT * FROM books WHERE book_title = $1", &[json!(title)])
        .await
        .unwrap();

    let calls = executor.calls();
    assert_eq!(calls[0].statement().param_kinds, vec![Some(ScalarKind::Text)]);
    assert_eq!(calls[1].statement().param_kinds, vec![None]);
}

#[tokio::test]
async fn test_negative_count_is_a_mapping_error() {
    let executor = Arc::new(RecordingSqlExecutor::default());
    *executor.count.lock().unwrap() = -1;
    let books = repository(&executor, Dialect::Postgres);

    let err = books.count_all().await.unwrap_err();
    assert!(matches!(err, QueryError::Mapping(_)));
    assert!(books
        .count_by_sql("SELECT -1", &[])
        .await
        .unwrap_err()
        .to_string()
        .contains("negative"));
}
