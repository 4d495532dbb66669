use relql::config::{
    AttributeConfig, AttributeKindConfig, CollectionTableConfig, Config, EmbeddableConfig,
    EntityConfig, EnumConfig, EnumStorage, JoinTableConfig, ServerConfig, TableConfig,
};

/// Tables of the library demo, each backed by `<data_dir>/<name>.csv`
const TABLES: [&str; 5] = ["author", "book", "book_tags", "character", "character_friends"];

/// Library demo model: authors with embedded addresses, their books with
/// genres and tags, and characters with one-way friendships
pub fn create_example_config(data_dir: &str) -> Config {
    let tables = TABLES
        .iter()
        .map(|name| TableConfig {
            name: name.to_string(),
            storage_location: format!("{}/{}.csv", data_dir, name),
        })
        .collect();

    Config {
        server: ServerConfig::default(),
        tables,
        entities: vec![author(), book(), character()],
        embeddables: vec![EmbeddableConfig {
            name: "Address".to_string(),
            description: Some("Postal address".to_string()),
            attributes: vec![
                AttributeConfig::scalar("city", "string"),
                AttributeConfig::scalar("zip", "string"),
            ],
        }],
        enums: vec![EnumConfig {
            name: "Genre".to_string(),
            values: vec!["NOVEL".to_string(), "FANTASY".to_string()],
            storage: EnumStorage::Name,
            description: Some("Shelf a book is filed under".to_string()),
        }],
    }
}

fn entity(name: &str, table: &str, description: &str, attributes: Vec<AttributeConfig>) -> EntityConfig {
    EntityConfig {
        name: name.to_string(),
        table: table.to_string(),
        primary_key: "id".to_string(),
        description: Some(description.to_string()),
        ignore: false,
        attributes,
    }
}

fn described(mut attribute: AttributeConfig, description: &str) -> AttributeConfig {
    attribute.description = Some(description.to_string());
    attribute
}

fn author() -> EntityConfig {
    let mut address = AttributeConfig::new("address", AttributeKindConfig::Embedded);
    address.target = Some("Address".to_string());

    let mut books = AttributeConfig::relation("books", AttributeKindConfig::ToMany, "Book");
    books.mapped_by = Some("author".to_string());

    entity(
        "Author",
        "author",
        "People who write books",
        vec![
            AttributeConfig::scalar("id", "long"),
            described(AttributeConfig::scalar("name", "string"), "Name as printed on the cover"),
            address,
            books,
        ],
    )
}

fn book() -> EntityConfig {
    let mut author = AttributeConfig::relation("author", AttributeKindConfig::ToOne, "Author");
    author.join_column = Some("author_id".to_string());

    let mut tags = AttributeConfig::new("tags", AttributeKindConfig::ElementCollection);
    tags.value_type = Some("string".to_string());
    tags.collection_table = Some(CollectionTableConfig {
        table: "book_tags".to_string(),
        join_column: "book_id".to_string(),
        column: Some("tag".to_string()),
    });

    entity(
        "Book",
        "book",
        "Published works",
        vec![
            AttributeConfig::scalar("id", "long"),
            AttributeConfig::scalar("title", "string"),
            AttributeConfig::scalar("genre", "Genre"),
            described(AttributeConfig::scalar("published", "date"), "First publication date"),
            author,
            tags,
        ],
    )
}

fn character() -> EntityConfig {
    let mut friends = AttributeConfig::relation("friends", AttributeKindConfig::ToMany, "Character");
    friends.join_table = Some(JoinTableConfig {
        table: "character_friends".to_string(),
        join_column: "character_id".to_string(),
        inverse_join_column: "friend_id".to_string(),
    });

    let mut fans = AttributeConfig::relation("fans", AttributeKindConfig::ToMany, "Character");
    fans.mapped_by = Some("friends".to_string());

    entity(
        "Character",
        "character",
        "Characters; friendship is one-way",
        vec![
            AttributeConfig::scalar("id", "long"),
            AttributeConfig::scalar("name", "string"),
            described(friends, "Characters this one calls a friend"),
            described(fans, "Characters calling this one a friend"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relql::Metamodel;

    #[test]
    fn test_example_config_is_valid() {
        let config = create_example_config("demos/data");
        relql::config::validate(&config).unwrap();
        assert_eq!(config.tables.len(), 5);
        assert_eq!(config.tables[1].storage_location, "demos/data/book.csv");

        let model = Metamodel::from_config(&config).unwrap();
        assert_eq!(model.entities().count(), 3);
    }
}
