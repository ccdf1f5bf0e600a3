//! Structured batch reads
//!
//! A [`Template`] is a tree of maps and lists whose leaves are store keys.
//! [`Engine::batch_read_structured`] answers it with a [`Hydrated`] tree of
//! the same shape in which every leaf holds that key's current value.
//!
//! ```text
//! {"name": b"user:1:name",          {"name": Some(b"ada"),
//!  "tags": [b"tag:1", b"tag:9"]} ──▶  "tags": [Some(b"math"), None]}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{LedgerError, Result};

/// Deepest template (and therefore hydrated tree) accepted; a lone key is depth 1
pub const MAX_TEMPLATE_DEPTH: usize = 64;

/// Request tree: leaves are keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Template {
    Key(Vec<u8>),
    Map(BTreeMap<String, Template>),
    List(Vec<Template>),
}

/// Response tree: leaves are values (`None` for absent keys)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hydrated {
    Value(Option<Vec<u8>>),
    Map(BTreeMap<String, Hydrated>),
    List(Vec<Hydrated>),
}

impl Template {
    /// Leaf template for `key`
    pub fn key(key: impl Into<Vec<u8>>) -> Self {
        Template::Key(key.into())
    }

    /// Map template from `(field, template)` pairs
    pub fn map<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Template)>,
    {
        Template::Map(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// List template
    pub fn list(items: impl IntoIterator<Item = Template>) -> Self {
        Template::List(items.into_iter().collect())
    }

    /// Every leaf key, depth-first, in the order hydration consumes them
    pub fn leaf_keys(&self) -> Vec<&[u8]> {
        let mut keys = Vec::new();
        let mut pending = vec![self];

        while let Some(node) = pending.pop() {
            match node {
                Template::Key(key) => keys.push(key.as_slice()),
                Template::Map(fields) => pending.extend(fields.values().rev()),
                Template::List(items) => pending.extend(items.iter().rev()),
            }
        }
        keys
    }

    /// Levels from this node down to its deepest leaf (a lone key is 1)
    ///
    /// An empty map or list counts as a leaf level.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];

        while let Some((node, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            match node {
                Template::Key(_) => {}
                Template::Map(fields) => pending.extend(fields.values().map(|t| (t, depth + 1))),
                Template::List(items) => pending.extend(items.iter().map(|t| (t, depth + 1))),
            }
        }
        deepest
    }

    /// Rebuild this shape, taking leaf values from `values` in order
    fn hydrate<I>(&self, values: &mut I) -> Result<Hydrated>
    where
        I: Iterator<Item = Option<Vec<u8>>>,
    {
        Ok(match self {
            Template::Key(_) => Hydrated::Value(values.next().ok_or_else(|| {
                LedgerError::InvalidInput("fewer values than template leaves".to_string())
            })?),
            Template::Map(fields) => Hydrated::Map(
                fields
                    .iter()
                    .map(|(name, t)| Ok((name.clone(), t.hydrate(values)?)))
                    .collect::<Result<_>>()?,
            ),
            Template::List(items) => Hydrated::List(
                items
                    .iter()
                    .map(|t| t.hydrate(values))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl Hydrated {
    /// Leaf value, if this node is a leaf
    pub fn as_value(&self) -> Option<Option<&[u8]>> {
        match self {
            Hydrated::Value(v) => Some(v.as_deref()),
            _ => None,
        }
    }

    /// Child by field name, if this node is a map
    pub fn get(&self, field: &str) -> Option<&Hydrated> {
        match self {
            Hydrated::Map(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Child by position, if this node is a list
    pub fn at(&self, index: usize) -> Option<&Hydrated> {
        match self {
            Hydrated::List(items) => items.get(index),
            _ => None,
        }
    }
}

impl Engine {
    /// Hydrate `template` with one snapshot-consistent batch read
    ///
    /// Templates nested deeper than [`MAX_TEMPLATE_DEPTH`] are `InvalidInput`.
    pub fn batch_read_structured(&self, template: &Template) -> Result<Hydrated> {
        let depth = template.depth();
        if depth > MAX_TEMPLATE_DEPTH {
            return Err(LedgerError::InvalidInput(format!(
                "template nested {} levels deep (max {})",
                depth, MAX_TEMPLATE_DEPTH
            )));
        }

        let values = self.batch_read(&template.leaf_keys())?;
        template.hydrate(&mut values.into_iter())
    }
}
