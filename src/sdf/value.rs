use std::{collections::BTreeMap, fmt};

use anyhow::bail;
use half::f16;
use strum::{EnumIs, EnumTryAs};

use super::*;

/// String keyed dictionary, ordered by key.
pub type Dictionary = BTreeMap<String, Value>;

/// Value is a type that can hold any of the SDF types.
///
/// Scalars map one to one to the usda type names. Vector, matrix and
/// quaternion types are stored as a flattened [Value::Tuple], `[]` types as a
/// shaped [Value::Array]. The remaining variants carry field data written by
/// the text parser (specifiers, list ops, time samples and so on).
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs)]
pub enum Value {
    Bool(bool),
    Uchar(u8),
    Int(i32),
    Uint(u32),
    Int64(i64),
    Uint64(u64),

    Half(f16),
    Float(f32),
    Double(f64),
    TimeCode(f64),

    String(String),
    Token(String),
    AssetPath(String),
    Path(Path),

    /// Fixed-size tuple (`double3`, `matrix4d`, `quatf`, ...), row major.
    Tuple(Elements),
    Array(Array),
    Dictionary(Dictionary),

    Specifier(Specifier),
    Variability(Variability),
    Permission(Permission),

    TokenVec(Vec<String>),
    StringVec(Vec<String>),
    PathVec(Vec<Path>),
    LayerOffsets(Vec<LayerOffset>),
    VariantSelection(BTreeMap<String, String>),
    Relocates(Vec<(Path, Path)>),
    TimeSamples(TimeSampleMap),
    Spline(Spline),

    TokenListOp(TokenListOp),
    StringListOp(StringListOp),
    PathListOp(PathListOp),
    ReferenceListOp(ReferenceListOp),
    PayloadListOp(PayloadListOp),
    IntListOp(IntListOp),
    UintListOp(UintListOp),
    Int64ListOp(Int64ListOp),
    Uint64ListOp(Uint64ListOp),

    /// Explicit "no value" opinion, distinct from an unset field.
    ValueBlock,
    /// Metadata that is not registered in the schema, kept verbatim.
    Unregistered(UnregisteredValue),
}

/// Flat storage for tuple and array elements.
#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs)]
pub enum Elements {
    Bool(Vec<bool>),
    Uchar(Vec<u8>),
    Int(Vec<i32>),
    Uint(Vec<u32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    Half(Vec<f16>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    TimeCode(Vec<f64>),
    String(Vec<String>),
    Token(Vec<String>),
    AssetPath(Vec<String>),
}

impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::Bool(v) => v.len(),
            Elements::Uchar(v) => v.len(),
            Elements::Int(v) => v.len(),
            Elements::Uint(v) => v.len(),
            Elements::Int64(v) => v.len(),
            Elements::Uint64(v) => v.len(),
            Elements::Half(v) => v.len(),
            Elements::Float(v) => v.len(),
            Elements::Double(v) | Elements::TimeCode(v) => v.len(),
            Elements::String(v) | Elements::Token(v) | Elements::AssetPath(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Homogeneous shaped array.
///
/// `shape` holds the run length of every list nesting level, the element
/// count is the product of `shape` and the tuple size of the element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub shape: Vec<usize>,
    pub elements: Elements,
}

/// Unknown metadata preserved as authored.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum UnregisteredValue {
    /// Literal text of the value.
    String(String),
    Dictionary(Dictionary),
    /// List edit whose items are the literal text of each item.
    ListOp(ListOp<String>),
}

/// Time samples ordered by time.
///
/// A [Value::ValueBlock] stored at a time is an explicit block, which is not
/// the same as having no sample at that time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimeSampleMap {
    samples: Vec<(f64, Value)>,
}

impl TimeSampleMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn search(&self, time: f64) -> Result<usize, usize> {
        self.samples.binary_search_by(|(t, _)| t.total_cmp(&time))
    }

    /// Inserts a sample, returning the previous value at `time`.
    pub fn insert(&mut self, time: f64, value: Value) -> Option<Value> {
        match self.search(time) {
            Ok(index) => Some(std::mem::replace(&mut self.samples[index].1, value)),
            Err(index) => {
                self.samples.insert(index, (time, value));
                None
            }
        }
    }

    pub fn get(&self, time: f64) -> Option<&Value> {
        self.search(time).ok().map(|index| &self.samples[index].1)
    }

    pub fn is_blocked(&self, time: f64) -> bool {
        matches!(self.get(time), Some(Value::ValueBlock))
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(time, _)| *time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Value)> {
        self.samples.iter().map(|(time, value)| (*time, value))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Spline knot.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Knot {
    pub time: f64,
    pub value: f64,
    /// `(width, slope)` of the incoming tangent.
    pub pre_tangent: Option<(f64, f64)>,
    pub post_tangent: Option<(f64, f64)>,
}

/// Authored spline data. Evaluation is up to the consumer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Spline {
    /// `bezier` or `hermite`.
    pub curve_type: Option<String>,
    pub pre_extrapolation: Option<String>,
    pub post_extrapolation: Option<String>,
    pub knots: Vec<Knot>,
}

impl Value {
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self {
            Value::Tuple(Elements::Double(vec)) => Some(vec.as_slice()),
            Value::Array(Array {
                elements: Elements::Double(vec),
                ..
            }) => Some(vec.as_slice()),
            _ => None,
        }
    }

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            Value::Tuple(Elements::Float(vec)) => Some(vec.as_slice()),
            Value::Array(Array {
                elements: Elements::Float(vec),
                ..
            }) => Some(vec.as_slice()),
            _ => None,
        }
    }

    pub fn as_int_slice(&self) -> Option<&[i32]> {
        match self {
            Value::Tuple(Elements::Int(vec)) => Some(vec.as_slice()),
            Value::Array(Array {
                elements: Elements::Int(vec),
                ..
            }) => Some(vec.as_slice()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            Value::Unregistered(UnregisteredValue::Dictionary(dict)) => Some(dict),
            _ => None,
        }
    }

    /// String content of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) | Value::Token(string) | Value::AssetPath(string) => Some(string.as_str()),
            _ => None,
        }
    }
}

impl From<Value> for Vec<String> {
    fn from(value: Value) -> Self {
        match value {
            Value::String(str) | Value::Token(str) | Value::AssetPath(str) => vec![str],
            Value::StringVec(vec) | Value::TokenVec(vec) => vec,
            Value::Array(Array {
                elements: Elements::String(vec) | Elements::Token(vec) | Elements::AssetPath(vec),
                ..
            }) => vec,
            _ => Vec::new(),
        }
    }
}

impl TryFrom<Value> for LayerOffset {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::LayerOffsets(vec) if vec.len() == 1 => Ok(vec[0]),
            _ => bail!("Unable to unpack layer offset"),
        }
    }
}

impl TryFrom<Value> for BTreeMap<String, String> {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::VariantSelection(map) => Ok(map),
            _ => bail!("Unable to unpack variant selection map"),
        }
    }
}

impl fmt::Display for UnregisteredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnregisteredValue::String(string) => f.write_str(string),
            UnregisteredValue::Dictionary(dict) => write!(f, "{dict:?}"),
            UnregisteredValue::ListOp(op) => write!(f, "{op:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_samples_ordered() {
        let mut samples = TimeSampleMap::new();

        assert_eq!(samples.insert(10.0, Value::Double(3.0)), None);
        assert_eq!(samples.insert(-1.0, Value::Double(1.0)), None);
        assert_eq!(samples.insert(2.5, Value::ValueBlock), None);

        assert_eq!(samples.times().collect::<Vec<_>>(), vec![-1.0, 2.5, 10.0]);

        // Replace keeps a single entry.
        assert_eq!(samples.insert(10.0, Value::Double(4.0)), Some(Value::Double(3.0)));
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn blocked_differs_from_absent() {
        let mut samples = TimeSampleMap::new();
        samples.insert(1.0, Value::ValueBlock);
        samples.insert(2.0, Value::Float(0.5));

        assert!(samples.is_blocked(1.0));
        assert_eq!(samples.get(1.0), Some(&Value::ValueBlock));

        assert!(!samples.is_blocked(2.0));
        assert!(!samples.is_blocked(3.0));
        assert_eq!(samples.get(3.0), None);
    }

    #[test]
    fn slices() {
        let value = Value::Tuple(Elements::Double(vec![1.0, 2.0, 3.0]));
        assert_eq!(value.as_f64_slice(), Some([1.0, 2.0, 3.0].as_slice()));
        assert_eq!(value.as_f32_slice(), None);

        let value = Value::Array(Array {
            shape: vec![2],
            elements: Elements::Int(vec![4, 5]),
        });
        assert_eq!(value.as_int_slice(), Some([4, 5].as_slice()));
        assert_eq!(Elements::Int(vec![4, 5]).len(), 2);
    }

    #[test]
    fn string_conversions() {
        assert_eq!(Value::Token("Y".into()).as_str(), Some("Y"));
        assert_eq!(Value::Double(1.0).as_str(), None);

        let names: Vec<String> = Value::TokenVec(vec!["a".into(), "b".into()]).into();
        assert_eq!(names, vec!["a", "b"]);
    }
}
