//! In-memory layer data.

use std::{
    borrow::Cow,
    collections::{hash_map::Entry, HashMap},
};

use anyhow::{bail, Result};

use super::{AbstractData, Path, SpecType, Value};

/// Fields authored on a single path.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Spec {
    pub ty: SpecType,
    pub fields: HashMap<String, Value>,
}

impl Spec {
    pub fn new(ty: SpecType) -> Self {
        Self {
            ty,
            fields: HashMap::new(),
        }
    }

    #[inline]
    pub fn add(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }
}

/// Sparse `(path, field) -> value` store with a spec existence table.
///
/// Fields can only be set on paths that have a spec. Specs are never removed.
#[derive(Debug, Default, Clone)]
pub struct Data {
    specs: HashMap<Path, Spec>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a spec at `path`. Creating an existing spec is a no-op and
    /// returns `false`.
    pub fn create_spec(&mut self, path: Path, ty: SpecType) -> bool {
        match self.specs.entry(path) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Spec::new(ty));
                true
            }
        }
    }

    pub fn set(&mut self, path: &Path, field: impl Into<String>, value: Value) -> Result<()> {
        let Some(spec) = self.specs.get_mut(path) else {
            bail!("Cannot set field '{}' on <{}>: no spec", field.into(), path)
        };

        spec.add(field, value);
        Ok(())
    }

    #[inline]
    pub fn spec(&self, path: &Path) -> Option<&Spec> {
        self.specs.get(path)
    }

    #[inline]
    pub fn field(&self, path: &Path, field: &str) -> Option<&Value> {
        self.specs.get(path).and_then(|spec| spec.fields.get(field))
    }

    pub fn field_mut(&mut self, path: &Path, field: &str) -> Option<&mut Value> {
        self.specs.get_mut(path).and_then(|spec| spec.fields.get_mut(field))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.specs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Spec)> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn into_inner(self) -> HashMap<Path, Spec> {
        self.specs
    }
}

impl From<HashMap<Path, Spec>> for Data {
    fn from(specs: HashMap<Path, Spec>) -> Self {
        Self { specs }
    }
}

impl AbstractData for Data {
    fn has_spec(&self, path: &Path) -> bool {
        self.specs.contains_key(path)
    }

    fn has_field(&self, path: &Path, field: &str) -> bool {
        self.field(path, field).is_some()
    }

    fn spec_type(&self, path: &Path) -> Option<SpecType> {
        self.specs.get(path).map(|spec| spec.ty)
    }

    fn get(&self, path: &Path, field: &str) -> Result<Cow<Value>> {
        let Some(spec) = self.specs.get(path) else {
            bail!("No spec found for path: {}", path)
        };

        let Some(value) = spec.fields.get(field) else {
            bail!("No field found for path '{}' and field '{}'", path, field)
        };

        Ok(Cow::Borrowed(value))
    }

    fn list(&self, path: &Path) -> Option<Vec<String>> {
        self.specs.get(path).map(|spec| {
            let mut fields = spec.fields.keys().cloned().collect::<Vec<_>>();
            fields.sort();
            fields
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_idempotent() {
        let mut data = Data::new();
        let path = Path::new("/A").unwrap();

        assert!(data.create_spec(path.clone(), SpecType::Prim));
        data.set(&path, "active", Value::Bool(false)).unwrap();

        assert!(!data.create_spec(path.clone(), SpecType::Prim));
        assert_eq!(data.spec_type(&path), Some(SpecType::Prim));
        assert_eq!(data.field(&path, "active"), Some(&Value::Bool(false)));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn set_requires_spec() {
        let mut data = Data::new();
        let path = Path::new("/Missing").unwrap();

        assert!(data.set(&path, "active", Value::Bool(true)).is_err());
        assert!(!data.has_spec(&path));
    }

    #[test]
    fn abstract_data_access() -> Result<()> {
        let mut data = Data::new();
        let root = Path::abs_root();

        data.create_spec(root.clone(), SpecType::PseudoRoot);
        data.set(&root, "defaultPrim", Value::Token("World".into()))?;
        data.set(&root, "comment", Value::String("hi".into()))?;

        assert!(data.has_field(&root, "defaultPrim"));
        assert!(!data.has_field(&root, "documentation"));
        assert_eq!(data.get(&root, "defaultPrim")?.as_str(), Some("World"));
        assert!(data.get(&root, "documentation").is_err());
        assert_eq!(
            data.list(&root),
            Some(vec!["comment".to_string(), "defaultPrim".to_string()])
        );

        Ok(())
    }
}
