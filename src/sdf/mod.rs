//! Scene description foundations.

use std::borrow::Cow;

use anyhow::Result;
use strum::{Display, EnumCount, EnumIs, EnumString, FromRepr};

mod data;
mod list_op;
mod path;
pub mod schema;
mod value;
pub mod value_type;

pub use data::{Data, Spec};
pub use list_op::*;
pub use path::{path, Element, Path, PathError};
pub use schema::Schema;
pub use value::*;

/// An enum that specifies the type of an object.
/// Objects are entities that have fields and are addressable by path.
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumCount, EnumIs, Display)]
pub enum SpecType {
    // The unknown type has a value of 0 so that SdfSpecType() is unknown.
    #[default]
    Unknown = 0,

    // Real concrete types
    Attribute = 1,
    Connection = 2,
    Expression = 3,
    Mapper = 4,
    MapperArg = 5,
    Prim = 6,
    PseudoRoot = 7,
    Relationship = 8,
    RelationshipTarget = 9,
    Variant = 10,
    VariantSet = 11,
}

/// How a prim spec contributes to the composed prim.
///
/// See <https://openusd.org/release/glossary.html#usdglossary-specifier>
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    #[default]
    Public,
    Private,
}

/// Time offset and scale applied to a referenced layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOffset {
    pub offset: f64,
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self { offset: 0.0, scale: 1.0 }
    }
}

impl LayerOffset {
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.offset == 0.0 && self.scale == 1.0
    }
}

/// Reference composition arc. An empty `asset_path` is an internal reference.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reference {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: LayerOffset,
    pub custom_data: Dictionary,
}

/// Payload composition arc.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Payload {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: LayerOffset,
}

/// Read access to layer data addressed by path and field name.
pub trait AbstractData {
    /// Returns true if this data has a spec for the given path.
    fn has_spec(&self, path: &Path) -> bool;

    /// Returns true if this data has a field for the given path.
    fn has_field(&self, path: &Path, field: &str) -> bool;

    /// Returns the type of the spec at the given path.
    fn spec_type(&self, path: &Path) -> Option<SpecType>;

    /// Returns the underlying value for the given path.
    fn get(&self, path: &Path, field: &str) -> Result<Cow<Value>>;

    /// Returns the names of the fields for the given path.
    fn list(&self, path: &Path) -> Option<Vec<String>>;
}
