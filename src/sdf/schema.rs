//! Registered fields and the spec types they apply to.

use std::collections::HashMap;

use strum::{EnumIter, IntoStaticStr};

use super::{value_type::ValueTypeRegistry, SpecType};

/// The following fields are pre-registered by Sdf.
///
/// See <https://github.com/PixarAnimationStudios/OpenUSD/blob/release/pxr/usd/sdf/schema.h#L597>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum FieldKey {
    Active,
    AllowedTokens,
    AssetInfo,
    ColorConfiguration,
    ColorManagementSystem,
    ColorSpace,
    Comment,
    ConnectionPaths,
    Custom,
    CustomData,
    CustomLayerData,
    Default,
    DefaultPrim,
    DisplayGroup,
    DisplayGroupOrder,
    DisplayName,
    DisplayUnit,
    Documentation,
    EndTimeCode,
    ExpressionVariables,
    FramePrecision,
    FramesPerSecond,
    Hidden,
    HasOwnedSubLayers,
    InheritPaths,
    Instanceable,
    Kind,
    LayerRelocates,
    PrimOrder,
    NoLoadHint,
    Owner,
    Payload,
    Permission,
    Prefix,
    PrefixSubstitutions,
    PropertyOrder,
    References,
    Relocates,
    SessionOwner,
    Specializes,
    Specifier,
    Spline,
    StartTimeCode,
    SubLayers,
    SubLayerOffsets,
    Suffix,
    SuffixSubstitutions,
    SymmetricPeer,
    SymmetryArguments,
    SymmetryFunction,
    TargetPaths,
    TimeSamples,
    TimeCodesPerSecond,
    TypeName,
    VariantSelection,
    Variability,
    VariantSetNames,
    EndFrame,
    StartFrame,
}

impl FieldKey {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// See <https://github.com/PixarAnimationStudios/OpenUSD/blob/2864f3d04f396432f22ec5d6928fc37d34bb4c90/pxr/usd/sdf/schema.h#L652>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum ChildrenKey {
    ConnectionChildren,
    ExpressionChildren,
    MapperArgChildren,
    MapperChildren,
    PrimChildren,
    #[strum(to_string = "properties")]
    PropertyChildren,
    #[strum(to_string = "targetChildren")]
    RelationshipTargetChildren,
    VariantChildren,
    VariantSetChildren,
}

impl ChildrenKey {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Item type of a generic list-op metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOpItem {
    Int,
    Int64,
    Uint,
    Uint64,
    String,
    Token,
}

impl ListOpItem {
    /// Array type the items are parsed as.
    pub fn array_type_name(self) -> &'static str {
        match self {
            ListOpItem::Int => "int[]",
            ListOpItem::Int64 => "int64[]",
            ListOpItem::Uint => "uint[]",
            ListOpItem::Uint64 => "uint64[]",
            ListOpItem::String => "string[]",
            ListOpItem::Token => "token[]",
        }
    }
}

/// How a field's value is authored in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Parsed by the value factory for the given type name.
    Value(&'static str),
    Dictionary,
    ListOp(ListOpItem),
    /// Dedicated grammar (specifier, references, children lists, ...).
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub ty: FieldType,
    /// Spec types this field may be authored on as metadata.
    pub metadata_for: Vec<SpecType>,
}

impl FieldDefinition {
    #[inline]
    pub fn is_metadata_for(&self, spec_type: SpecType) -> bool {
        self.metadata_for.contains(&spec_type)
    }
}

const LAYER: &[SpecType] = &[SpecType::PseudoRoot];
const PRIM: &[SpecType] = &[SpecType::Prim, SpecType::Variant];
const PROPERTY: &[SpecType] = &[SpecType::Attribute, SpecType::Relationship];
const ATTRIBUTE: &[SpecType] = &[SpecType::Attribute];
const RELATIONSHIP: &[SpecType] = &[SpecType::Relationship];
const PRIM_AND_PROPERTY: &[SpecType] = &[
    SpecType::Prim,
    SpecType::Variant,
    SpecType::Attribute,
    SpecType::Relationship,
];
const ALL: &[SpecType] = &[
    SpecType::PseudoRoot,
    SpecType::Prim,
    SpecType::Variant,
    SpecType::Attribute,
    SpecType::Relationship,
];

#[rustfmt::skip]
const METADATA: &[(&str, FieldType, &[SpecType])] = &[
    // Layer
    ("colorConfiguration", FieldType::Value("asset"), LAYER),
    ("colorManagementSystem", FieldType::Value("token"), LAYER),
    ("customLayerData", FieldType::Dictionary, LAYER),
    ("defaultPrim", FieldType::Value("token"), LAYER),
    ("endTimeCode", FieldType::Value("double"), LAYER),
    ("expressionVariables", FieldType::Dictionary, LAYER),
    ("framesPerSecond", FieldType::Value("double"), LAYER),
    ("framePrecision", FieldType::Value("int"), LAYER),
    ("hasOwnedSubLayers", FieldType::Value("bool"), LAYER),
    ("owner", FieldType::Value("string"), LAYER),
    ("sessionOwner", FieldType::Value("string"), LAYER),
    ("startTimeCode", FieldType::Value("double"), LAYER),
    ("timeCodesPerSecond", FieldType::Value("double"), LAYER),
    ("endFrame", FieldType::Value("double"), LAYER),
    ("startFrame", FieldType::Value("double"), LAYER),
    // Registered by the geometry and physics schemas.
    ("upAxis", FieldType::Value("token"), LAYER),
    ("metersPerUnit", FieldType::Value("double"), LAYER),
    ("kilogramsPerUnit", FieldType::Value("double"), LAYER),

    // Shared
    ("documentation", FieldType::Value("string"), ALL),

    // Prim
    ("active", FieldType::Value("bool"), PRIM),
    ("instanceable", FieldType::Value("bool"), PRIM),
    ("kind", FieldType::Value("token"), PRIM),
    ("payload", FieldType::Builtin, PRIM),
    ("prefixSubstitutions", FieldType::Dictionary, PRIM),
    ("suffixSubstitutions", FieldType::Dictionary, PRIM),
    ("apiSchemas", FieldType::ListOp(ListOpItem::Token), PRIM),
    ("clips", FieldType::Dictionary, PRIM),
    ("clipSets", FieldType::ListOp(ListOpItem::String), PRIM),

    // Prim and property
    ("assetInfo", FieldType::Dictionary, PRIM_AND_PROPERTY),
    ("customData", FieldType::Dictionary, PRIM_AND_PROPERTY),
    ("displayName", FieldType::Value("string"), PRIM_AND_PROPERTY),
    ("hidden", FieldType::Value("bool"), PRIM_AND_PROPERTY),
    ("permission", FieldType::Builtin, PRIM_AND_PROPERTY),
    ("prefix", FieldType::Value("string"), PRIM_AND_PROPERTY),
    ("suffix", FieldType::Value("string"), PRIM_AND_PROPERTY),
    ("symmetricPeer", FieldType::Value("string"), PRIM_AND_PROPERTY),
    ("symmetryArguments", FieldType::Dictionary, PRIM_AND_PROPERTY),
    ("symmetryFunction", FieldType::Value("token"), PRIM_AND_PROPERTY),

    // Property
    ("displayGroup", FieldType::Value("string"), PROPERTY),

    // Attribute
    ("allowedTokens", FieldType::Value("token[]"), ATTRIBUTE),
    ("colorSpace", FieldType::Value("token"), ATTRIBUTE),
    ("displayUnit", FieldType::Builtin, ATTRIBUTE),
    ("interpolation", FieldType::Value("token"), ATTRIBUTE),
    ("elementSize", FieldType::Value("int"), ATTRIBUTE),

    // Relationship
    ("noLoadHint", FieldType::Value("bool"), RELATIONSHIP),
];

/// Registered fields that are written by dedicated statements, never as
/// `key = value` metadata.
#[rustfmt::skip]
const NON_METADATA: &[&str] = &[
    "comment",
    "connectionPaths",
    "custom",
    "default",
    "displayGroupOrder",
    "inheritPaths",
    "layerRelocates",
    "primOrder",
    "propertyOrder",
    "references",
    "relocates",
    "specializes",
    "specifier",
    "spline",
    "subLayers",
    "subLayerOffsets",
    "targetPaths",
    "timeSamples",
    "typeName",
    "variability",
    "variantSelection",
    "variantSetNames",
    "connectionChildren",
    "expressionChildren",
    "mapperArgChildren",
    "mapperChildren",
    "primChildren",
    "properties",
    "targetChildren",
    "variantChildren",
    "variantSetChildren",
];

/// Field registry plus the value type table.
///
/// Built once and only read afterwards, so a single instance can be shared
/// by reference between parses running on different threads.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: HashMap<&'static str, FieldDefinition>,
    value_types: ValueTypeRegistry,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        let mut fields = HashMap::with_capacity(METADATA.len() + NON_METADATA.len());

        for &(name, ty, metadata_for) in METADATA {
            fields.insert(
                name,
                FieldDefinition {
                    name,
                    ty,
                    metadata_for: metadata_for.to_vec(),
                },
            );
        }

        for &name in NON_METADATA {
            fields.insert(
                name,
                FieldDefinition {
                    name,
                    ty: FieldType::Builtin,
                    metadata_for: Vec::new(),
                },
            );
        }

        Self {
            fields,
            value_types: ValueTypeRegistry::new(),
        }
    }

    #[inline]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    #[inline]
    pub fn is_registered(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Definition of `name` if it is metadata for `spec_type`.
    pub fn metadata_field(&self, name: &str, spec_type: SpecType) -> Option<&FieldDefinition> {
        self.field(name).filter(|field| field.is_metadata_for(spec_type))
    }

    #[inline]
    pub fn is_metadata_field(&self, name: &str, spec_type: SpecType) -> bool {
        self.metadata_field(name, spec_type).is_some()
    }

    /// Value type name of a metadata field parsed by the value factory.
    pub fn metadata_type(&self, name: &str, spec_type: SpecType) -> Option<&'static str> {
        match self.metadata_field(name, spec_type)?.ty {
            FieldType::Value(ty) => Some(ty),
            FieldType::Dictionary => Some("dictionary"),
            FieldType::ListOp(_) | FieldType::Builtin => None,
        }
    }

    #[inline]
    pub fn value_types(&self) -> &ValueTypeRegistry {
        &self.value_types
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn field_key_str() {
        assert_eq!(FieldKey::ConnectionPaths.as_str(), "connectionPaths");
        assert_eq!(FieldKey::Documentation.as_str(), "documentation");
        assert_eq!(FieldKey::TimeCodesPerSecond.as_str(), "timeCodesPerSecond");
        assert_eq!(FieldKey::VariantSetNames.as_str(), "variantSetNames");
    }

    #[test]
    fn child_key_str() {
        assert_eq!(ChildrenKey::ConnectionChildren.as_str(), "connectionChildren");
        assert_eq!(ChildrenKey::PrimChildren.as_str(), "primChildren");
        assert_eq!(ChildrenKey::PropertyChildren.as_str(), "properties");
        assert_eq!(ChildrenKey::RelationshipTargetChildren.as_str(), "targetChildren");
        assert_eq!(ChildrenKey::VariantSetChildren.as_str(), "variantSetChildren");
    }

    #[test]
    fn every_key_is_registered() {
        let schema = Schema::new();

        for key in FieldKey::iter() {
            assert!(schema.is_registered(key.as_str()), "{:?}", key);
        }

        for key in ChildrenKey::iter() {
            assert!(schema.is_registered(key.as_str()), "{:?}", key);
        }
    }

    #[test]
    fn metadata_lookup() {
        let schema = Schema::new();

        let field = schema.metadata_field("defaultPrim", SpecType::PseudoRoot).unwrap();
        assert_eq!(field.ty, FieldType::Value("token"));

        assert!(schema.metadata_field("defaultPrim", SpecType::Prim).is_none());
        assert!(schema.metadata_field("noLoadHint", SpecType::Relationship).is_some());
        assert!(schema.metadata_field("noLoadHint", SpecType::Attribute).is_none());
        assert!(schema.metadata_field("kind", SpecType::Variant).is_some());

        // Registered, but never metadata.
        assert!(schema.is_registered("typeName"));
        assert!(schema.metadata_field("typeName", SpecType::Prim).is_none());

        assert!(!schema.is_registered("myStudioField"));
        assert!(schema.is_metadata_field("upAxis", SpecType::PseudoRoot));
        assert!(!schema.is_metadata_field("upAxis", SpecType::Prim));

        assert_eq!(schema.metadata_type("documentation", SpecType::Attribute), Some("string"));
        assert_eq!(schema.metadata_type("customData", SpecType::Prim), Some("dictionary"));
        assert_eq!(schema.metadata_type("apiSchemas", SpecType::Prim), None);
        assert_eq!(
            schema.metadata_field("apiSchemas", SpecType::Prim).map(|f| f.ty),
            Some(FieldType::ListOp(ListOpItem::Token))
        );
    }
}
