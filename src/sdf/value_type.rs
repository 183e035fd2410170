//! Value type names understood by the text format (`SdfValueTypeNames`).

use std::collections::HashMap;

use strum::{Display, EnumIs};

/// Scalar element kind of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIs)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Uchar,
    Int,
    Uint,
    Int64,
    Uint64,
    Half,
    Float,
    Double,
    TimeCode,
    String,
    Token,
    Asset,
}

impl ScalarType {
    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::Half | Self::Float | Self::Double | Self::TimeCode)
    }
}

/// A registered value type, e.g. `double3[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTypeName {
    pub name: String,
    pub scalar: ScalarType,
    /// Tuple dimensions: empty for scalars, `[3]` for `double3`, `[4, 4]`
    /// for `matrix4d`.
    pub dims: &'static [usize],
    pub is_array: bool,
}

impl ValueTypeName {
    /// Number of scalars in one element.
    pub fn tuple_size(&self) -> usize {
        self.dims.iter().product()
    }

    #[inline]
    pub fn is_tuple(&self) -> bool {
        !self.dims.is_empty()
    }

    /// Type name without `[]`.
    pub fn scalar_type_name(&self) -> &str {
        self.name.strip_suffix("[]").unwrap_or(&self.name)
    }
}

const SCALAR: &[usize] = &[];
const VEC2: &[usize] = &[2];
const VEC3: &[usize] = &[3];
const VEC4: &[usize] = &[4];
const MAT2: &[usize] = &[2, 2];
const MAT3: &[usize] = &[3, 3];
const MAT4: &[usize] = &[4, 4];

#[rustfmt::skip]
const TYPES: &[(&str, ScalarType, &[usize])] = &[
    ("bool", ScalarType::Bool, SCALAR),
    ("uchar", ScalarType::Uchar, SCALAR),
    ("int", ScalarType::Int, SCALAR),
    ("uint", ScalarType::Uint, SCALAR),
    ("int64", ScalarType::Int64, SCALAR),
    ("uint64", ScalarType::Uint64, SCALAR),
    ("half", ScalarType::Half, SCALAR),
    ("float", ScalarType::Float, SCALAR),
    ("double", ScalarType::Double, SCALAR),
    ("timecode", ScalarType::TimeCode, SCALAR),
    ("string", ScalarType::String, SCALAR),
    ("token", ScalarType::Token, SCALAR),
    ("asset", ScalarType::Asset, SCALAR),

    ("int2", ScalarType::Int, VEC2),
    ("int3", ScalarType::Int, VEC3),
    ("int4", ScalarType::Int, VEC4),
    ("half2", ScalarType::Half, VEC2),
    ("half3", ScalarType::Half, VEC3),
    ("half4", ScalarType::Half, VEC4),
    ("float2", ScalarType::Float, VEC2),
    ("float3", ScalarType::Float, VEC3),
    ("float4", ScalarType::Float, VEC4),
    ("double2", ScalarType::Double, VEC2),
    ("double3", ScalarType::Double, VEC3),
    ("double4", ScalarType::Double, VEC4),

    ("point3h", ScalarType::Half, VEC3),
    ("point3f", ScalarType::Float, VEC3),
    ("point3d", ScalarType::Double, VEC3),
    ("vector3h", ScalarType::Half, VEC3),
    ("vector3f", ScalarType::Float, VEC3),
    ("vector3d", ScalarType::Double, VEC3),
    ("normal3h", ScalarType::Half, VEC3),
    ("normal3f", ScalarType::Float, VEC3),
    ("normal3d", ScalarType::Double, VEC3),
    ("color3h", ScalarType::Half, VEC3),
    ("color3f", ScalarType::Float, VEC3),
    ("color3d", ScalarType::Double, VEC3),
    ("color4h", ScalarType::Half, VEC4),
    ("color4f", ScalarType::Float, VEC4),
    ("color4d", ScalarType::Double, VEC4),
    ("texCoord2h", ScalarType::Half, VEC2),
    ("texCoord2f", ScalarType::Float, VEC2),
    ("texCoord2d", ScalarType::Double, VEC2),
    ("texCoord3h", ScalarType::Half, VEC3),
    ("texCoord3f", ScalarType::Float, VEC3),
    ("texCoord3d", ScalarType::Double, VEC3),

    ("quath", ScalarType::Half, VEC4),
    ("quatf", ScalarType::Float, VEC4),
    ("quatd", ScalarType::Double, VEC4),

    ("matrix2d", ScalarType::Double, MAT2),
    ("matrix3d", ScalarType::Double, MAT3),
    ("matrix4d", ScalarType::Double, MAT4),
    ("frame4d", ScalarType::Double, MAT4),
];

/// Type name lookup table. Built once, read only afterwards.
#[derive(Debug, Clone)]
pub struct ValueTypeRegistry {
    types: HashMap<String, ValueTypeName>,
}

impl Default for ValueTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTypeRegistry {
    pub fn new() -> Self {
        let mut types = HashMap::with_capacity(TYPES.len() * 2);

        for &(name, scalar, dims) in TYPES {
            for is_array in [false, true] {
                let name = if is_array { format!("{name}[]") } else { name.to_string() };
                let ty = ValueTypeName {
                    name: name.clone(),
                    scalar,
                    dims,
                    is_array,
                };
                types.insert(name, ty);
            }
        }

        Self { types }
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<&ValueTypeName> {
        self.types.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let registry = ValueTypeRegistry::new();

        let ty = registry.find("double3[]").unwrap();
        assert_eq!(ty.scalar, ScalarType::Double);
        assert_eq!(ty.dims, &[3]);
        assert!(ty.is_array);
        assert_eq!(ty.scalar_type_name(), "double3");

        let ty = registry.find("matrix4d").unwrap();
        assert_eq!(ty.tuple_size(), 16);
        assert!(!ty.is_array);

        let ty = registry.find("token").unwrap();
        assert!(!ty.is_tuple());
        assert_eq!(ty.tuple_size(), 1);

        assert!(registry.find("double5").is_none());
        assert!(registry.contains("texCoord2f[]"));
        assert_eq!(registry.len(), TYPES.len() * 2);
    }
}
