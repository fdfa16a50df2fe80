//! Predicate model.
//!
//! A [`WhereClause`] is the declarative input shape: an ordered map of
//! field-to-condition entries, where the reserved `$` key carries an
//! operator node instead of a plain value. [`WhereClause::build`] validates
//! the entries and produces the [`Predicate`] tree the compiler consumes;
//! reserved-key misuse is a construction-time [`Error::MalformedPredicate`],
//! never a runtime query failure.

use crate::value::Value;
use crate::{Error, Result};

/// The reserved entry key whose value must be an operator node.
pub const OPERATOR_KEY: &str = "$";

/// One where-clause entry: a plain value or an operator node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Plain equality against the keyed field.
    Value(Value),
    /// An operator node (keyed under [`OPERATOR_KEY`]).
    Op(Operator),
}

/// The two input shapes of the OR combinator.
#[derive(Debug, Clone, PartialEq)]
pub enum OrShape {
    /// A keyed map of equalities: entries whose value is null are skipped,
    /// the rest are ORed. All-null input matches nothing.
    Fields(Vec<(String, Value)>),
    /// A list of keyed maps: entries within one map are ANDed, maps are
    /// ORed across.
    Groups(Vec<Vec<(String, Value)>>),
}

/// Operator nodes accepted under the reserved key.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Logical OR; see [`OrShape`] for the two accepted input forms.
    Or(OrShape),
}

impl Operator {
    /// Builds the map-form OR: a disjunction of per-field equalities.
    #[must_use]
    pub fn or_fields<F, V>(fields: impl IntoIterator<Item = (F, V)>) -> Self
    where
        F: Into<String>,
        V: Into<Value>,
    {
        Self::Or(OrShape::Fields(
            fields
                .into_iter()
                .map(|(f, v)| (f.into(), v.into()))
                .collect(),
        ))
    }

    /// Builds the list-form OR: each group's entries are ANDed, groups are
    /// ORed across.
    #[must_use]
    pub fn or_groups<F, V>(
        groups: impl IntoIterator<Item = Vec<(F, V)>>,
    ) -> Self
    where
        F: Into<String>,
        V: Into<Value>,
    {
        Self::Or(OrShape::Groups(
            groups
                .into_iter()
                .map(|group| {
                    group
                        .into_iter()
                        .map(|(f, v)| (f.into(), v.into()))
                        .collect()
                })
                .collect(),
        ))
    }
}

/// A composable filter expression over entity fields.
///
/// `Not` is reserved: no current operator produces it, but the compiler
/// handles it so the variant set matches the operator model.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals value (after coercion to the field's semantic type).
    Equals(String, Value),
    /// Conjunction. Empty means "always true".
    And(Vec<Predicate>),
    /// Disjunction. Empty means "matches nothing".
    Or(Vec<Predicate>),
    /// Negation (reserved, unused by the current operator set).
    Not(Box<Predicate>),
}

/// Declarative where description: an ordered map of entries.
///
/// The default (empty) clause is always-true.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    entries: Vec<(String, Condition)>,
}

impl WhereClause {
    /// Creates an empty (always-true) clause.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a plain field equality.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), Condition::Value(value.into())));
        self
    }

    /// Appends an operator node under the reserved `$` key.
    #[must_use]
    pub fn operator(mut self, operator: Operator) -> Self {
        self.entries
            .push((OPERATOR_KEY.to_string(), Condition::Op(operator)));
        self
    }

    /// Appends a raw entry.
    ///
    /// This is the untyped input surface; [`WhereClause::build`] rejects a
    /// plain value keyed under `$`.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, condition: Condition) -> Self {
        self.entries.push((key.into(), condition));
        self
    }

    /// True when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw entries, in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[(String, Condition)] {
        &self.entries
    }

    /// Builds a clause from an untyped JSON object.
    ///
    /// Plain keys map to equality entries. The reserved `$` key expects
    /// `{"or": {...}}` (map form) or `{"or": [{...}, ...]}` (list form);
    /// anything else under `$` is carried as a plain value so that
    /// [`WhereClause::build`] rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPredicate`] when the input is not a JSON
    /// object.
    pub fn from_json(input: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = input else {
            return Err(Error::MalformedPredicate(
                "where input must be a JSON object".to_string(),
            ));
        };

        let mut clause = Self::new();
        for (key, value) in map {
            if key == OPERATOR_KEY {
                if let Some(op) = parse_json_operator(value) {
                    clause = clause.operator(op);
                    continue;
                }
            }
            clause = clause.entry(key.clone(), Condition::Value(Value::from_json(value)));
        }
        Ok(clause)
    }

    /// Validates the entries and produces the predicate tree.
    ///
    /// - Plain entries become an AND of equalities.
    /// - Null-valued entries of a map-form OR are skipped here; an OR left
    ///   with zero clauses compiles to "matches nothing".
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPredicate`] when a plain value is keyed
    /// under the reserved `$` key.
    pub fn build(&self) -> Result<Predicate> {
        let mut nodes = Vec::with_capacity(self.entries.len());
        for (key, condition) in &self.entries {
            match condition {
                Condition::Value(_) if key == OPERATOR_KEY => {
                    return Err(Error::MalformedPredicate(format!(
                        "value under reserved key '{OPERATOR_KEY}' must be an operator"
                    )));
                },
                Condition::Value(value) => {
                    nodes.push(Predicate::Equals(key.clone(), value.clone()));
                },
                Condition::Op(Operator::Or(shape)) => nodes.push(build_or(shape)),
            }
        }

        if nodes.len() == 1 {
            Ok(nodes.pop().unwrap_or(Predicate::And(Vec::new())))
        } else {
            Ok(Predicate::And(nodes))
        }
    }
}

fn build_or(shape: &OrShape) -> Predicate {
    match shape {
        OrShape::Fields(fields) => Predicate::Or(
            fields
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(field, value)| Predicate::Equals(field.clone(), value.clone()))
                .collect(),
        ),
        OrShape::Groups(groups) => Predicate::Or(
            groups
                .iter()
                .map(|group| {
                    let mut equalities: Vec<Predicate> = group
                        .iter()
                        .map(|(field, value)| {
                            Predicate::Equals(field.clone(), value.clone())
                        })
                        .collect();
                    if equalities.len() == 1 {
                        equalities.pop().unwrap_or(Predicate::And(Vec::new()))
                    } else {
                        Predicate::And(equalities)
                    }
                })
                .collect(),
        ),
    }
}

fn parse_json_operator(value: &serde_json::Value) -> Option<Operator> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let or = obj.get("or")?;
    match or {
        serde_json::Value::Object(fields) => Some(Operator::Or(OrShape::Fields(
            fields
                .iter()
                .map(|(f, v)| (f.clone(), Value::from_json(v)))
                .collect(),
        ))),
        serde_json::Value::Array(groups) => {
            let mut out = Vec::with_capacity(groups.len());
            for group in groups {
                let fields = group.as_object()?;
                out.push(
                    fields
                        .iter()
                        .map(|(f, v)| (f.clone(), Value::from_json(v)))
                        .collect(),
                );
            }
            Some(Operator::Or(OrShape::Groups(out)))
        },
        _ => None,
    }
}
