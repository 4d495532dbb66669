/// End-to-end tests for the full workflow
///
/// This test verifies:
/// 1. The library demo tables load into a DataFusion session
/// 2. A GraphQL schema is derived from the library model
/// 3. Queries compile to joins, filters, ordering and pages that return
///    the expected rows, including nested connections filtered to their parent

mod library_tests {
    use async_graphql::dynamic::Schema;
    use async_graphql::{Request, Variables};
    use relql::session::{DataFusionSession, SessionHandle};
    use relql::{Metamodel, SchemaBuilder};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn demo_path(relative: &str) -> String {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push(relative);
        path.to_string_lossy().to_string()
    }

    async fn library_schema() -> Schema {
        let _ = tracing_subscriber::fmt::try_init();

        let config = relql::config::load_config(&demo_path("demos/library.toml"))
            .expect("Failed to load library model");

        let session = DataFusionSession::new();
        for table in &config.tables {
            tokio_test::assert_ok!(
                session
                    .register_table_from_path(&table.name, &demo_path(&table.storage_location))
                    .await
            );
        }

        let model = Arc::new(Metamodel::from_config(&config).expect("Invalid model"));
        let session: SessionHandle = Arc::new(session);
        SchemaBuilder::new(model)
            .build_schema(Some(session))
            .expect("Failed to build schema")
    }

    async fn execute(schema: &Schema, request: impl Into<Request>) -> Value {
        let response = schema.execute(request).await;
        assert!(response.errors.is_empty(), "Query failed: {:?}", response.errors);
        response.data.into_json().expect("Should have data")
    }

    fn titles(books: &Value) -> Vec<&str> {
        books
            .as_array()
            .expect("list of books")
            .iter()
            .map(|book| book["title"].as_str().expect("title"))
            .collect()
    }

    #[tokio::test]
    async fn test_root_filter_literal_and_variable_agree() {
        let schema = library_schema().await;

        let literal = execute(&schema, "{ Book(genre: [FANTASY]) { title genre } }").await;
        assert_eq!(
            titles(&literal["Book"]),
            vec!["A Wizard of Earthsea", "Guards! Guards!", "Mort"]
        );
        assert_eq!(literal["Book"][0]["genre"], json!("FANTASY"));

        let request = Request::new("query($genre: [Genre]) { Book(genre: $genre) { title genre } }")
            .variables(Variables::from_json(json!({ "genre": ["FANTASY"] })));
        let variable = execute(&schema, request).await;
        assert_eq!(literal, variable);
    }

    #[tokio::test]
    async fn test_single_value_and_empty_filters() {
        let schema = library_schema().await;

        let data = execute(&schema, r#"{ Book(title: ["Emma"]) { id title published } }"#).await;
        assert_eq!(data["Book"], json!([{ "id": 6, "title": "Emma", "published": "1815-12-23" }]));

        let data = execute(&schema, "{ Book(title: []) { title } }").await;
        assert_eq!(data["Book"], json!([]));
    }

    #[tokio::test]
    async fn test_embedded_attributes_are_flattened() {
        let schema = library_schema().await;

        let data = execute(&schema, r#"{ Author(city: ["Steventon"]) { name city zip } }"#).await;
        assert_eq!(
            data["Author"],
            json!([{ "name": "Jane Austen", "city": "Steventon", "zip": "RG25-3BB" }])
        );
    }

    #[tokio::test]
    async fn test_ordering_composes_across_levels() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            "{ Author { name(orderBy: DESC) books(orderBy: DESC) { title } } }",
        )
        .await;
        let authors = data["Author"].as_array().unwrap();
        let names: Vec<_> = authors.iter().map(|a| a["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Ursula K. Le Guin", "Terry Pratchett", "Jane Austen"]);
        assert_eq!(
            titles(&authors[0]["books"]),
            vec!["The Dispossessed", "The Left Hand of Darkness", "A Wizard of Earthsea"]
        );
        assert_eq!(titles(&authors[2]["books"]), vec!["Persuasion", "Emma"]);
    }

    #[tokio::test]
    async fn test_child_filters_stay_in_the_join() {
        let schema = library_schema().await;

        let left = execute(&schema, "{ Author { name books(genre: [FANTASY]) { title } } }").await;
        let authors = left["Author"].as_array().unwrap();
        assert_eq!(authors.len(), 3);
        assert_eq!(authors[2]["name"], json!("Jane Austen"));
        assert_eq!(authors[2]["books"], json!([]));

        let inner = execute(
            &schema,
            "{ Author { name books(genre: [FANTASY], joinType: INNER) { title } } }",
        )
        .await;
        let authors = inner["Author"].as_array().unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(titles(&authors[1]["books"]), vec!["Guards! Guards!", "Mort"]);
    }

    #[tokio::test]
    async fn test_to_one_relationship() {
        let schema = library_schema().await;

        let data = execute(&schema, r#"{ Book(title: ["Mort"]) { title author { name } } }"#).await;
        assert_eq!(data["Book"][0]["author"], json!({ "name": "Terry Pratchett" }));
    }

    #[tokio::test]
    async fn test_element_collections() {
        let schema = library_schema().await;

        let data = execute(&schema, r#"{ Book(tags: ["wizards"]) { title tags } }"#).await;
        let books = data["Book"].as_array().unwrap();
        assert_eq!(titles(&data["Book"]), vec!["A Wizard of Earthsea", "Guards! Guards!"]);

        let mut tags: Vec<_> = books[0]["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap())
            .collect();
        tags.sort();
        assert_eq!(tags, vec!["islands", "wizards"]);
    }

    #[tokio::test]
    async fn test_root_connection_pages() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            "{ BookConnection(paginationRequest: { page: 2, size: 3 }) { totalPages totalElements content { title } } }",
        )
        .await;
        let connection = &data["BookConnection"];
        assert_eq!(connection["totalElements"], json!(7));
        assert_eq!(connection["totalPages"], json!(3));
        assert_eq!(titles(&connection["content"]), vec!["Guards! Guards!", "Mort", "Emma"]);
    }

    #[tokio::test]
    async fn test_paged_content_with_joins_pages_over_root_rows() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            "{ AuthorConnection(paginationRequest: { page: 1, size: 2 }) { totalElements content { name books { title } } } }",
        )
        .await;
        let connection = &data["AuthorConnection"];
        assert_eq!(connection["totalElements"], json!(3));
        let authors = connection["content"].as_array().unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0]["books"].as_array().unwrap().len(), 3);
        assert_eq!(authors[1]["books"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_page_members_do_not_depend_on_selected_collections() {
        let schema = library_schema().await;

        let plain = execute(
            &schema,
            "{ BookConnection(paginationRequest: { page: 1, size: 1 }) { content { title author { name(orderBy: ASC) } } } }",
        )
        .await;
        let with_tags = execute(
            &schema,
            "{ BookConnection(paginationRequest: { page: 1, size: 1 }) { content { title tags author { name(orderBy: ASC) } } } }",
        )
        .await;

        assert_eq!(titles(&plain["BookConnection"]["content"]), vec!["Emma"]);
        assert_eq!(titles(&with_tags["BookConnection"]["content"]), vec!["Emma"]);
        assert_eq!(with_tags["BookConnection"]["content"][0]["tags"], json!(["matchmaking"]));
    }

    #[tokio::test]
    async fn test_nested_connection_is_filtered_to_its_parent() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            r#"{
                AuthorConnection(paginationRequest: { page: 1, size: 5 }) {
                    content {
                        name
                        booksConnection(paginationRequest: { page: 1, size: 2 }) {
                            totalElements
                            totalPages
                            content { title }
                        }
                    }
                }
            }"#,
        )
        .await;

        let authors = data["AuthorConnection"]["content"].as_array().unwrap();
        assert_eq!(authors.len(), 3);

        let le_guin = &authors[0]["booksConnection"];
        assert_eq!(le_guin["totalElements"], json!(3));
        assert_eq!(le_guin["totalPages"], json!(2));
        assert_eq!(
            titles(&le_guin["content"]),
            vec!["A Wizard of Earthsea", "The Left Hand of Darkness"]
        );

        let austen = &authors[2]["booksConnection"];
        assert_eq!(austen["totalElements"], json!(2));
        assert_eq!(titles(&austen["content"]), vec!["Emma", "Persuasion"]);
    }

    #[tokio::test]
    async fn test_to_one_connection_uses_the_loaded_reference() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            r#"{ Book(title: ["Mort"]) { authorConnection { totalPages totalElements content { name } } } }"#,
        )
        .await;
        assert_eq!(
            data["Book"][0]["authorConnection"],
            json!({ "totalPages": 1, "totalElements": 1, "content": [{ "name": "Terry Pratchett" }] })
        );
    }

    #[tokio::test]
    async fn test_asymmetric_many_to_many() {
        let schema = library_schema().await;

        let data = execute(
            &schema,
            r#"{ Character(name: ["Rincewind", "Vetch"]) { name friends { name } fans { name } } }"#,
        )
        .await;
        assert_eq!(
            data["Character"],
            json!([
                { "name": "Vetch", "friends": [{ "name": "Ged" }], "fans": [{ "name": "Ged" }, { "name": "Emma Woodhouse" }] },
                { "name": "Rincewind", "friends": [{ "name": "Luggage" }], "fans": [] }
            ])
        );

        let data = execute(
            &schema,
            r#"{
                Character(name: ["Vetch", "Luggage"]) {
                    name
                    fansConnection(paginationRequest: { page: 1, size: 1 }) { totalElements totalPages content { name } }
                    friendsConnection { totalElements content { name } }
                }
            }"#,
        )
        .await;
        let vetch = &data["Character"][0];
        assert_eq!(vetch["fansConnection"]["totalElements"], json!(2));
        assert_eq!(vetch["fansConnection"]["totalPages"], json!(2));
        assert_eq!(vetch["fansConnection"]["content"], json!([{ "name": "Ged" }]));
        assert_eq!(vetch["friendsConnection"]["content"], json!([{ "name": "Ged" }]));

        let luggage = &data["Character"][1];
        assert_eq!(luggage["fansConnection"]["totalElements"], json!(1));
        assert_eq!(luggage["friendsConnection"], json!({ "totalElements": 0, "content": [] }));
    }

    #[tokio::test]
    async fn test_errors_are_field_scoped() {
        let schema = library_schema().await;

        let response = schema
            .execute(
                r#"{
                    Author(name: ["Jane Austen"]) { name }
                    BookConnection(paginationRequest: { page: 0, size: 2 }) { totalPages }
                }"#,
            )
            .await;

        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("page must be at least 1"));
        let data = response.data.into_json().unwrap();
        assert_eq!(data["Author"], json!([{ "name": "Jane Austen" }]));
        assert!(data.get("BookConnection").map_or(true, Value::is_null));
    }
}

mod in_memory_tests {
    use async_graphql::dynamic::Schema;
    use datafusion::arrow::array::{Int32Array, Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use datafusion::arrow::record_batch::RecordBatch;
    use relql::config::Config;
    use relql::session::{DataFusionSession, SessionHandle};
    use relql::{Metamodel, SchemaBuilder};
    use serde_json::json;
    use std::sync::Arc;

    const SHELF: &str = r#"
[[entity]]
name = "Book"
table = "book"
primary_key = "id"

  [[entity.attribute]]
  name = "id"
  kind = "scalar"
  type = "long"

  [[entity.attribute]]
  name = "title"
  kind = "scalar"
  type = "string"

  [[entity.attribute]]
  name = "genre"
  kind = "scalar"
  type = "Genre"

[[enum]]
name = "Genre"
values = ["NOVEL", "FANTASY"]
storage = "ordinal"
"#;

    fn books() -> RecordBatch {
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("genre", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec!["Emma", "Mort", "Sourcery", "Untitled"])),
                Arc::new(Int32Array::from(vec![Some(0), Some(1), Some(1), None])),
            ],
        )
        .unwrap()
    }

    fn shelf_schema() -> Schema {
        let _ = tracing_subscriber::fmt::try_init();

        let config: Config = toml::from_str(SHELF).unwrap();
        let session = DataFusionSession::new();
        session.register_batch("book", books()).unwrap();

        let session: SessionHandle = Arc::new(session);
        SchemaBuilder::new(Arc::new(Metamodel::from_config(&config).unwrap()))
            .build_schema(Some(session))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ordinal_enums_decode_once() {
        let schema = shelf_schema();

        let response = schema.execute("{ Book(genre: [FANTASY]) { title genre } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["Book"],
            json!([{ "title": "Mort", "genre": "FANTASY" }, { "title": "Sourcery", "genre": "FANTASY" }])
        );
    }

    #[tokio::test]
    async fn test_null_filter_element_matches_missing_values() {
        let schema = shelf_schema();

        let response = schema.execute("{ Book(genre: [NOVEL, null]) { title genre } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["Book"],
            json!([{ "title": "Emma", "genre": "NOVEL" }, { "title": "Untitled", "genre": null }])
        );
    }

    #[tokio::test]
    async fn test_per_request_session_overrides_schema_data() {
        let schema = shelf_schema();

        let empty = DataFusionSession::new();
        let batch = books().slice(0, 1);
        empty.register_batch("book", batch).unwrap();
        let scope: SessionHandle = Arc::new(empty.scope());

        let response = schema
            .execute(async_graphql::Request::new("{ Book { title } }").data(scope))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data.into_json().unwrap()["Book"], json!([{ "title": "Emma" }]));
    }
}
