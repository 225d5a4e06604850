//! Query compiler.
//!
//! Turns the JSON query carried in a request name into a [`SelectQuery`].
//! Three shapes are recognised:
//!
//! | Shape | Trigger | Statement |
//! |---|---|---|
//! | Filter | no reserved key | `SELECT name ... WHERE col='v' AND ...` |
//! | Autocomplete | `"?": "/a/b/"` | `SELECT DISTINCT <next field> ... WHERE ...` |
//! | Prefix search | `"??": "/a/b"` | `SELECT name ... WHERE ...` |
//!
//! Predicates are always sorted by column so that equal predicate sets
//! compile to byte-identical statements regardless of key order.

use crate::error::{CompileError, ConfigError};
use crate::config::CatalogConfig;
use crate::segment::ReplyKind;
use atmos_store::{CatalogSchema, Predicate, SelectQuery, HASH_COLUMN, NAME_COLUMN};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Reserved key that selects autocomplete.
pub const AUTOCOMPLETE_KEY: &str = "?";
/// Reserved key that selects prefix search.
pub const PREFIX_SEARCH_KEY: &str = "??";

/// Which shape a query compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Column equality filter.
    Filter,
    /// Next-component suggestions.
    Autocomplete {
        /// True when the suggested field is the last name field.
        last_component: bool,
    },
    /// Positional name-prefix search.
    PrefixSearch,
}

/// A compiled query plus the metadata needed to frame its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Statement to run.
    pub query: SelectQuery,
    /// Shape it was compiled from.
    pub shape: QueryShape,
}

impl CompiledQuery {
    /// Returns how reply segments list their rows.
    pub fn reply_kind(&self) -> ReplyKind {
        match self.shape {
            QueryShape::Autocomplete { last_component } => ReplyKind::Autocomplete { last_component },
            QueryShape::Filter | QueryShape::PrefixSearch => ReplyKind::Results,
        }
    }
}

/// An autocomplete request broken down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Autocompletion {
    /// Equalities for the already-typed components, sorted by column.
    pub predicates: Vec<Predicate>,
    /// Field whose distinct values are suggested.
    pub next_field: String,
    /// True when `next_field` is the last name field.
    pub last_component: bool,
}

/// Compiles JSON queries against one catalog table.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    table: String,
    name_fields: Vec<String>,
    columns: BTreeSet<String>,
}

impl QueryCompiler {
    /// Creates a compiler for `schema`. Filter keys may name any schema
    /// column or any of `extra_columns`.
    pub fn new(schema: &CatalogSchema, extra_columns: &[String]) -> Self {
        let columns = [HASH_COLUMN, NAME_COLUMN]
            .into_iter()
            .map(str::to_string)
            .chain(schema.name_fields().iter().cloned())
            .chain(extra_columns.iter().cloned())
            .collect();
        Self {
            table: schema.table().to_string(),
            name_fields: schema.name_fields().to_vec(),
            columns,
        }
    }

    /// Creates a compiler from configuration.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.schema()?, &config.filter_category_names))
    }

    /// Returns the ordered name fields.
    pub fn name_fields(&self) -> &[String] {
        &self.name_fields
    }

    /// Compiles query text.
    pub fn compile(&self, text: &str) -> Result<CompiledQuery, CompileError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CompileError::Json(e.to_string()))?;
        self.compile_value(&value)
    }

    /// Compiles an already parsed query.
    pub fn compile_value(&self, value: &Value) -> Result<CompiledQuery, CompileError> {
        let object = as_object(value)?;
        let autocomplete = object.contains_key(AUTOCOMPLETE_KEY);
        let prefix_search = object.contains_key(PREFIX_SEARCH_KEY);

        match (autocomplete, prefix_search) {
            (true, true) => Err(CompileError::ConflictingShapes),
            (true, false) => {
                let ac = self.autocomplete(value)?;
                Ok(CompiledQuery {
                    query: SelectQuery::new(&self.table, ac.next_field)
                        .distinct()
                        .with_predicates(ac.predicates),
                    shape: QueryShape::Autocomplete {
                        last_component: ac.last_component,
                    },
                })
            }
            (false, true) => {
                let predicates = self.prefix_predicates(value)?;
                if predicates.is_empty() {
                    return Err(CompileError::NoPredicates);
                }
                Ok(CompiledQuery {
                    query: SelectQuery::new(&self.table, NAME_COLUMN).with_predicates(predicates),
                    shape: QueryShape::PrefixSearch,
                })
            }
            (false, false) => {
                let predicates = self.filter_predicates(value)?;
                if predicates.is_empty() {
                    return Err(CompileError::NoPredicates);
                }
                Ok(CompiledQuery {
                    query: SelectQuery::new(&self.table, NAME_COLUMN).with_predicates(predicates),
                    shape: QueryShape::Filter,
                })
            }
        }
    }

    /// Extracts filter predicates. An empty object yields no predicates.
    pub fn filter_predicates(&self, value: &Value) -> Result<Vec<Predicate>, CompileError> {
        let object = as_object(value)?;
        let mut predicates = Vec::with_capacity(object.len());
        for (key, value) in object {
            let text = scalar(key, value)?;
            if !self.columns.contains(key) {
                return Err(CompileError::UnknownColumn(key.clone()));
            }
            predicates.push(Predicate::new(key.as_str(), text));
        }
        predicates.sort();
        Ok(predicates)
    }

    /// Extracts positional predicates from a `"??"` path.
    ///
    /// The path must start with `/`; a trailing partial component is kept.
    pub fn prefix_predicates(&self, value: &Value) -> Result<Vec<Predicate>, CompileError> {
        let path = self.path_of(value, PREFIX_SEARCH_KEY)?;
        let Some(rest) = path.strip_prefix('/') else {
            return Err(CompileError::MalformedPath(path.to_string()));
        };
        let typed: Vec<&str> = rest.split('/').filter(|c| !c.is_empty()).collect();
        if typed.len() > self.name_fields.len() {
            return Err(CompileError::TooManyComponents {
                typed: typed.len(),
                columns: self.name_fields.len(),
            });
        }
        Ok(self.positional(&typed))
    }

    /// Breaks down a `"?"` path, which must start and end with `/`.
    pub fn autocomplete(&self, value: &Value) -> Result<Autocompletion, CompileError> {
        let path = self.path_of(value, AUTOCOMPLETE_KEY)?;
        let inner = path
            .strip_prefix('/')
            .and_then(|p| if p.is_empty() { Some(p) } else { p.strip_suffix('/') })
            .ok_or_else(|| CompileError::MalformedPath(path.to_string()))?;

        let typed: Vec<&str> = if inner.is_empty() {
            Vec::new()
        } else {
            inner.split('/').collect()
        };
        if typed.iter().any(|c| c.is_empty()) {
            return Err(CompileError::MalformedPath(path.to_string()));
        }
        let columns = self.name_fields.len();
        if typed.len() >= columns {
            return Err(CompileError::TooManyComponents {
                typed: typed.len(),
                columns,
            });
        }
        Ok(Autocompletion {
            predicates: self.positional(&typed),
            next_field: self.name_fields[typed.len()].clone(),
            last_component: typed.len() + 1 == columns,
        })
    }

    fn path_of<'v>(&self, value: &'v Value, key: &str) -> Result<&'v str, CompileError> {
        let object = as_object(value)?;
        match object.get(key) {
            Some(Value::String(path)) => Ok(path),
            Some(_) => Err(CompileError::InvalidValue(key.to_string())),
            None => Err(CompileError::MalformedPath(String::new())),
        }
    }

    fn positional(&self, typed: &[&str]) -> Vec<Predicate> {
        let mut predicates: Vec<Predicate> = self
            .name_fields
            .iter()
            .zip(typed)
            .map(|(field, value)| Predicate::new(field.as_str(), *value))
            .collect();
        predicates.sort();
        predicates
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, CompileError> {
    value.as_object().ok_or(CompileError::NotAnObject)
}

fn scalar(key: &str, value: &Value) -> Result<String, CompileError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(CompileError::InvalidValue(key.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const FIELDS: [&str; 10] = [
        "activity",
        "product",
        "organization",
        "model",
        "experiment",
        "frequency",
        "modeling_realm",
        "variable_name",
        "ensemble",
        "time",
    ];

    fn compiler() -> QueryCompiler {
        let schema =
            CatalogSchema::new("cmip5", FIELDS.iter().map(|s| s.to_string()).collect()).unwrap();
        QueryCompiler::new(&schema, &[])
    }

    #[test]
    fn filter_single_predicate() {
        let q = compiler().compile(r#"{"activity":"X"}"#).unwrap();
        assert_eq!(q.shape, QueryShape::Filter);
        assert_eq!(q.query.to_string(), "SELECT name FROM cmip5 WHERE activity='X';");
        assert_eq!(q.reply_kind(), ReplyKind::Results);
    }

    #[test]
    fn filter_is_key_order_independent() {
        let c = compiler();
        let a = c.compile(r#"{"product":"P","activity":"A"}"#).unwrap();
        let b = c.compile(r#"{"activity":"A","product":"P"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.query.to_string(),
            "SELECT name FROM cmip5 WHERE activity='A' AND product='P';"
        );
    }

    #[test]
    fn filter_predicate_extraction() {
        let c = compiler();
        let preds = c
            .filter_predicates(&json!({"activity": "testActivity", "product": "testProduct"}))
            .unwrap();
        assert_eq!(preds.len(), 2);

        assert!(c.filter_predicates(&json!({})).unwrap().is_empty());
        assert!(c.filter_predicates(&json!({"name": null})).is_err());
        assert!(c.filter_predicates(&json!({"name": ["test"]})).is_err());
        assert!(c.filter_predicates(&json!(["test"])).is_err());
    }

    #[test]
    fn filter_failures() {
        let c = compiler();
        assert_eq!(c.compile("{}").unwrap_err(), CompileError::NoPredicates);
        assert_eq!(c.compile("[1]").unwrap_err(), CompileError::NotAnObject);
        assert!(matches!(c.compile("{oops"), Err(CompileError::Json(_))));
        assert_eq!(
            c.compile(r#"{"x; DROP":"1"}"#).unwrap_err(),
            CompileError::UnknownColumn("x; DROP".into())
        );
    }

    #[test]
    fn filter_stringifies_scalars() {
        let q = compiler().compile(r#"{"ensemble":1,"time":true}"#).unwrap();
        assert_eq!(
            q.query.to_string(),
            "SELECT name FROM cmip5 WHERE ensemble='1' AND time='true';"
        );
    }

    #[test]
    fn autocomplete_root() {
        let q = compiler().compile(r#"{"?":"/"}"#).unwrap();
        assert_eq!(q.query.to_string(), "SELECT DISTINCT activity FROM cmip5;");
        assert_eq!(q.shape, QueryShape::Autocomplete { last_component: false });
    }

    #[test]
    fn autocomplete_typed_prefix() {
        let c = compiler();
        let ac = c.autocomplete(&json!({"?": "/Activity/"})).unwrap();
        assert_eq!(ac.next_field, "product");
        assert!(!ac.last_component);
        assert_eq!(ac.predicates, vec![Predicate::new("activity", "Activity")]);

        let q = c
            .compile(r#"{"?":"/Activity/Product/Organization/Model/Experiment/"}"#)
            .unwrap();
        assert_eq!(
            q.query.to_string(),
            "SELECT DISTINCT frequency FROM cmip5 WHERE activity='Activity' AND \
             experiment='Experiment' AND model='Model' AND organization='Organization' AND \
             product='Product';"
        );
    }

    #[test]
    fn autocomplete_last_component() {
        let ac = compiler()
            .autocomplete(&json!({
                "?": "/Activity/Product/Organization/Model/Experiment/Frequency/Modeling/Variable/Ensemble/"
            }))
            .unwrap();
        assert_eq!(ac.next_field, "time");
        assert!(ac.last_component);
        assert_eq!(ac.predicates.len(), 9);
    }

    #[test]
    fn autocomplete_failures() {
        let c = compiler();
        assert!(c.autocomplete(&json!({"?": "serchTest"})).is_err());
        assert!(c.autocomplete(&json!({"?": "/cmip5"})).is_err());
        assert!(c.autocomplete(&json!({"?": "/a//"})).is_err());
        assert!(c.autocomplete(&json!({"?": 5})).is_err());
        assert!(c.autocomplete(&json!(["test"])).is_err());
        assert!(c.autocomplete(&json!({"name": ["test"]})).is_err());

        let full = format!("/{}/", FIELDS.join("/"));
        assert_eq!(
            c.autocomplete(&json!({ "?": full })).unwrap_err(),
            CompileError::TooManyComponents {
                typed: 10,
                columns: 10
            }
        );
    }

    #[test]
    fn prefix_search() {
        let c = compiler();
        assert!(c.prefix_predicates(&json!({"??": "/"})).unwrap().is_empty());

        let preds = c.prefix_predicates(&json!({"??": "/Activity/Product"})).unwrap();
        assert_eq!(
            preds,
            vec![
                Predicate::new("activity", "Activity"),
                Predicate::new("product", "Product")
            ]
        );

        assert!(c.prefix_predicates(&json!({"??": ""})).is_err());
        assert!(c.prefix_predicates(&json!([])).is_err());
        assert!(c.prefix_predicates(&json!(["test"])).is_err());
        assert!(c.prefix_predicates(&json!({"activity": ["test"]})).is_err());

        let q = c.compile(r#"{"??":"/CMIP5/out"}"#).unwrap();
        assert_eq!(q.shape, QueryShape::PrefixSearch);
        assert_eq!(
            q.query.to_string(),
            "SELECT name FROM cmip5 WHERE activity='CMIP5' AND product='out';"
        );
        assert_eq!(c.compile(r#"{"??":"/"}"#).unwrap_err(), CompileError::NoPredicates);
    }

    #[test]
    fn conflicting_shapes() {
        assert_eq!(
            compiler().compile(r#"{"?":"/","??":"/a"}"#).unwrap_err(),
            CompileError::ConflictingShapes
        );
    }

    proptest! {
        #[test]
        fn autocomplete_last_flag(typed in 0usize..12) {
            let path = if typed == 0 {
                "/".to_string()
            } else {
                format!("/{}/", vec!["v"; typed].join("/"))
            };
            let result = compiler().autocomplete(&json!({ "?": path }));
            if typed < FIELDS.len() {
                let ac = result.unwrap();
                prop_assert_eq!(ac.last_component, typed == FIELDS.len() - 1);
                prop_assert_eq!(ac.next_field.as_str(), FIELDS[typed]);
            } else {
                prop_assert!(result.is_err());
            }
        }

        #[test]
        fn filter_compilation_is_deterministic(
            entries in proptest::collection::btree_map(0usize..10, "[A-Za-z0-9]{1,8}", 1..6),
        ) {
            let pairs: Vec<(String, String)> = entries
                .into_iter()
                .map(|(i, v)| (FIELDS[i].to_string(), v))
                .collect();
            let forward: Map<String, Value> = pairs.iter().cloned()
                .map(|(k, v)| (k, Value::String(v))).collect();
            let mut text_fwd = String::from("{");
            let mut text_rev = String::from("{");
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 { text_fwd.push(','); }
                text_fwd.push_str(&format!("\"{k}\":\"{v}\""));
            }
            for (i, (k, v)) in pairs.iter().rev().enumerate() {
                if i > 0 { text_rev.push(','); }
                text_rev.push_str(&format!("\"{k}\":\"{v}\""));
            }
            text_fwd.push('}');
            text_rev.push('}');

            let c = compiler();
            let a = c.compile(&text_fwd).unwrap();
            let b = c.compile(&text_rev).unwrap();
            let d = c.compile_value(&Value::Object(forward)).unwrap();
            prop_assert_eq!(a.query.to_string(), b.query.to_string());
            prop_assert_eq!(a, d);
        }
    }
}
