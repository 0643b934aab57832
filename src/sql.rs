// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

//! Provides generic wrapper types ([`Stored`], [`Compressed`]) for
//! keeping arbitrary serialisable Rust values in SQLite TEXT columns.
//! Declare the schema column as TEXT and use the wrapper around your
//! value type in the Rust struct.
//!
//! On **write**, the wrapper encodes the value into base64 text
//! (optionally zlib-compressed) through the column behaviour described
//! in [`crate::column`]. On **read**, it decodes the text back; text
//! that was never encoded (rows migrated from a plain-text column,
//! hand-inserted values) is handed to the value type verbatim, so a
//! `Stored<String>` column tolerates legacy rows.
//!
//! Values are canonicalised before encoding, so two equal values always
//! store byte-identical text and `eq`/`eq_any` filters against the
//! column match the rows they should. `is_null` works through
//! `Option<Stored<T>>` in `Nullable<Text>` columns. Ordering and range
//! comparisons over the encoded text are meaningless; keep to
//! equality, membership and null checks.
//!
//! ## Diesel Integration
//!
//! The wrappers implement [`ToSql<Text, Sqlite>`] and [`FromSql<Text,
//! Sqlite>`], and derive [`diesel::expression::AsExpression`] and
//! [`diesel::deserialize::FromSqlRow`], so they can be used directly in
//! structs that derive `Insertable` and `Queryable` without manual
//! trait implementations.
//!
//! # Example
//!
//! ```rust
//! # use diesel::prelude::*;
//! # use objfield::Stored;
//! # table! {
//! #     notes (id) {
//! #         id -> Integer,
//! #         body -> Text,
//! #     }
//! # }
//! #[derive(Debug, PartialEq, Queryable, Insertable)]
//! #[diesel(table_name = notes)]
//! struct Note {
//!     id: i32,
//!     body: Stored<Vec<String>>,
//! }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut conn = SqliteConnection::establish(":memory:")?;
//! # diesel::sql_query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
//! #     .execute(&mut conn)?;
//! let note = Note {
//!     id: 1,
//!     body: Stored(vec!["first".to_owned(), "second".to_owned()]),
//! };
//!
//! diesel::insert_into(notes::table)
//!     .values(&note)
//!     .execute(&mut conn)?;
//!
//! // Values round-trip, and equality filters match on the encoded
//! // text.
//! let fetched: Note = notes::table
//!     .filter(notes::body.eq(Stored(vec!["first".to_owned(), "second".to_owned()])))
//!     .first(&mut conn)?;
//!
//! assert_eq!(fetched, note);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::sync::OnceLock;

use diesel::{
    backend::Backend,
    deserialize::{FromSql, FromSqlRow},
    expression::AsExpression,
    serialize::{IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    codec::{self, StoredText},
    column::ObjectColumn,
};

macro_rules! define_object_wrapper {
    ($(#[$attr:meta])* $name:ident, compress: $compress:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        #[serde(transparent)]
        pub struct $name<T>(pub T);

        impl<T> $name<T> {
            pub fn new(value: T) -> Self {
                $name(value)
            }

            /// Borrow of the inner value.
            pub fn get(&self) -> &T {
                &self.0
            }

            /// Consumes the wrapper, returning the inner value.
            pub fn into_inner(self) -> T {
                self.0
            }

            /// The column behaviour every value of this wrapper encodes
            /// with. Resolved once per process, when the first value
            /// moves through the wrapper, never re-read afterwards.
            pub fn column() -> &'static ObjectColumn {
                static COLUMN: OnceLock<ObjectColumn> = OnceLock::new();
                COLUMN.get_or_init(|| ObjectColumn::new().with_compress($compress))
            }
        }

        impl<T> From<T> for $name<T> {
            fn from(value: T) -> Self {
                $name(value)
            }
        }

        impl<T> $name<T>
        where
            T: Serialize,
        {
            /// Encoded text exactly as stored, for interchange dumps.
            pub fn to_text(&self) -> Result<String, $crate::errors::EncodeError> {
                let column = Self::column();
                codec::encode(&self.0, column.compress, column.protocol, column.copy)
                    .map(StoredText::into_string)
            }
        }

        impl<T> ToSql<Text, Sqlite> for $name<T>
        where
            T: Serialize + std::fmt::Debug,
        {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> diesel::serialize::Result {
                let column = Self::column();
                let stored = codec::encode(&self.0, column.compress, column.protocol, column.copy)?;
                out.set_value(stored.into_string());
                Ok(IsNull::No)
            }
        }

        impl<T> FromSql<Text, Sqlite> for $name<T>
        where
            T: DeserializeOwned,
        {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> diesel::deserialize::Result<Self> {
                let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                let tree = Self::column().decode_stored(StoredText::Plain(text))?;
                Ok($name(serde_json::from_value(tree)?))
            }
        }
    };
}

define_object_wrapper! {
    /// Stores any serialisable value as base64 text in a TEXT column.
    Stored, compress: false
}

define_object_wrapper! {
    /// Like [`Stored`], but zlib-compresses the encoded bytes. Worth it
    /// for large or repetitive values; pure overhead for small ones.
    Compressed, compress: true
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use diesel::{prelude::*, sqlite::SqliteConnection};
    use serde_json::{Value, json};

    use super::*;

    type Payload = (HashMap<u32, u32>, String, (i32, i32, i32), Vec<i32>);

    fn sample_payload() -> Payload {
        let mut scores = HashMap::new();
        for (key, value) in [(1, 1), (2, 4), (3, 6), (4, 8), (5, 10)] {
            scores.insert(key, value);
        }
        (scores, "Hello World".to_owned(), (1, 2, 3), vec![1, 2, 3])
    }

    // The same payload with the map populated back to front. Equal to
    // sample_payload(), but a direct serialisation of the two may emit
    // map entries in different orders.
    fn reordered_payload() -> Payload {
        let mut scores = HashMap::new();
        for (key, value) in [(5, 10), (4, 8), (3, 6), (2, 4), (1, 1)] {
            scores.insert(key, value);
        }
        (scores, "Hello World".to_owned(), (1, 2, 3), vec![1, 2, 3])
    }

    table! {
        objects (id) {
            id -> Integer,
            value -> Text,
            packed_value -> Text,
            note -> Nullable<Text>,
        }
    }

    #[derive(Debug, PartialEq, Queryable, Insertable)]
    #[diesel(table_name = objects)]
    struct ObjectRow {
        id: i32,
        value: Stored<Payload>,
        packed_value: Compressed<Payload>,
        note: Option<Stored<String>>,
    }

    // Same table, raw text view of what actually got stored.
    #[derive(Debug, Queryable)]
    struct RawRow {
        #[allow(dead_code)]
        id: i32,
        value: String,
        packed_value: String,
        note: Option<String>,
    }

    fn setup() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        diesel::sql_query(
            "CREATE TABLE objects (
                id INTEGER PRIMARY KEY,
                value TEXT NOT NULL,
                packed_value TEXT NOT NULL,
                note TEXT
            )",
        )
        .execute(&mut conn)
        .unwrap();
        conn
    }

    fn insert_sample(conn: &mut SqliteConnection, id: i32, note: Option<&str>) -> ObjectRow {
        let row = ObjectRow {
            id,
            value: Stored(sample_payload()),
            packed_value: Compressed(sample_payload()),
            note: note.map(|n| Stored(n.to_owned())),
        };
        diesel::insert_into(objects::table)
            .values(&row)
            .execute(conn)
            .unwrap();
        row
    }

    mod crud {
        use super::*;

        #[test]
        fn roundtrips_composite_value_plain_and_compressed() {
            let mut conn = setup();
            let row = insert_sample(&mut conn, 1, None);

            let fetched: ObjectRow = objects::table.find(1).first(&mut conn).unwrap();
            assert_eq!(fetched, row);
            assert_eq!(fetched.value.get(), &sample_payload());
            assert_eq!(fetched.packed_value.get(), &sample_payload());
            assert_eq!(fetched.note, None);
        }

        #[test]
        fn update_replaces_the_stored_value() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            let replacement: Payload = (HashMap::new(), "changed".to_owned(), (0, 0, 0), vec![]);
            diesel::update(objects::table.find(1))
                .set(objects::value.eq(Stored(replacement.clone())))
                .execute(&mut conn)
                .unwrap();

            let fetched: ObjectRow = objects::table.find(1).first(&mut conn).unwrap();
            assert_eq!(fetched.value.into_inner(), replacement);
        }

        #[test]
        fn delete_by_equality_filter() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            let deleted = diesel::delete(
                objects::table.filter(objects::value.eq(Stored(sample_payload()))),
            )
            .execute(&mut conn)
            .unwrap();
            assert_eq!(deleted, 1);

            let remaining: Vec<ObjectRow> = objects::table.load(&mut conn).unwrap();
            assert!(remaining.is_empty());
        }

        #[test]
        fn stored_text_is_the_interchange_form() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, Some("pinned"));

            let raw: RawRow = objects::table.find(1).first(&mut conn).unwrap();
            assert_eq!(raw.value, Stored(sample_payload()).to_text().unwrap());
            assert_eq!(
                raw.packed_value,
                Compressed(sample_payload()).to_text().unwrap()
            );
            assert_eq!(
                raw.note,
                Some(Stored("pinned".to_owned()).to_text().unwrap())
            );
            // Compression changes the stored text, not the value.
            assert_ne!(raw.value, raw.packed_value);
        }
    }

    mod lookups {
        use super::*;

        #[test]
        fn exact_filter_matches_an_equal_value_built_differently() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            let fetched: ObjectRow = objects::table
                .filter(objects::value.eq(Stored(reordered_payload())))
                .filter(objects::packed_value.eq(Compressed(reordered_payload())))
                .first(&mut conn)
                .unwrap();
            assert_eq!(fetched.value.get(), &sample_payload());
        }

        #[test]
        fn exact_filter_rejects_a_different_value() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            let mut other = sample_payload();
            other.1 = "Goodbye World".to_owned();
            let found: Vec<ObjectRow> = objects::table
                .filter(objects::value.eq(Stored(other)))
                .load(&mut conn)
                .unwrap();
            assert!(found.is_empty());
        }

        #[test]
        fn membership_filter_matches() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            let candidates = vec![Stored(reordered_payload())];
            let found: Vec<ObjectRow> = objects::table
                .filter(objects::value.eq_any(candidates))
                .load(&mut conn)
                .unwrap();
            assert_eq!(found.len(), 1);
        }

        #[test]
        fn null_checks_work_through_optional_wrappers() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);
            insert_sample(&mut conn, 2, Some("present"));

            let nulls: Vec<ObjectRow> = objects::table
                .filter(objects::note.is_null())
                .load(&mut conn)
                .unwrap();
            assert_eq!(nulls.len(), 1);
            assert_eq!(nulls[0].id, 1);

            let present: Vec<ObjectRow> = objects::table
                .filter(objects::note.is_not_null())
                .load(&mut conn)
                .unwrap();
            assert_eq!(present.len(), 1);
            assert_eq!(present[0].note, Some(Stored("present".to_owned())));
        }
    }

    mod legacy_rows {
        use super::*;

        #[test]
        fn plain_text_rows_load_verbatim() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);
            diesel::update(objects::table.find(1))
                .set(objects::note.eq("not a real blob"))
                .execute(&mut conn)
                .unwrap();

            let note: Option<Stored<String>> = objects::table
                .select(objects::note)
                .first(&mut conn)
                .unwrap();
            assert_eq!(note, Some(Stored("not a real blob".to_owned())));
        }

        #[test]
        fn corrupted_blob_fails_a_typed_load() {
            let mut conn = setup();
            insert_sample(&mut conn, 1, None);

            // Valid base64, junk bytes: the fallback hands the raw text
            // to the value type, which cannot absorb it.
            diesel::update(objects::table.find(1))
                .set(objects::value.eq("AAAA"))
                .execute(&mut conn)
                .unwrap();

            let result = objects::table.find(1).first::<ObjectRow>(&mut conn);
            assert!(result.is_err());
        }
    }

    mod interchange {
        use super::*;

        #[test]
        fn wrappers_serialise_as_their_inner_value() {
            let stored = Stored(vec![1, 2, 3]);
            assert_eq!(serde_json::to_string(&stored).unwrap(), "[1,2,3]");

            let back: Stored<Vec<i32>> = serde_json::from_str("[1,2,3]").unwrap();
            assert_eq!(back, stored);
        }

        #[test]
        fn to_text_is_decodable_stored_text() {
            let stored = Stored(json!({"foo": "bar"}));
            let text = stored.to_text().unwrap();

            let tree = Stored::<Value>::column()
                .decode_stored(StoredText::Plain(text))
                .unwrap();
            assert_eq!(tree, json!({"foo": "bar"}));
        }

        #[test]
        fn to_text_is_deterministic() {
            let a = Stored(sample_payload()).to_text().unwrap();
            let b = Stored(reordered_payload()).to_text().unwrap();
            assert_eq!(a, b);
        }
    }
}
