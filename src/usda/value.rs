//! Typed value assembly.
//!
//! The parser feeds scalar [Atom]s and list/tuple boundaries into a
//! [ValueContext] which was set up for a declared type name (`double3[]`,
//! `token`, ...). [ValueContext::produce_value] then converts the atoms into
//! a single [Value].

use std::fmt;

use half::f16;
use num_traits::NumCast;

use crate::sdf::{
    value_type::{ScalarType, ValueTypeName, ValueTypeRegistry},
    Array, Elements, Path, Value,
};

use super::error::{coding_error, fail, ErrorKind, ParseError, Result};

/// A scalar as it appears in text, before conversion to the declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    /// Bare word, e.g. `inf`, `true` or an identifier.
    Token(String),
    AssetPath(String),
    Path(Path),
}

impl Atom {
    /// Parses a number literal.
    ///
    /// Literals with a fraction or exponent are doubles, negative integers
    /// are `i64` and positive integers `u64`. Integers that overflow fall
    /// back to double.
    pub fn number(text: &str) -> Option<Atom> {
        if text == "-0" {
            return Some(Atom::Double(-0.0));
        }

        if text.contains(['.', 'e', 'E']) {
            return text.parse().ok().map(Atom::Double);
        }

        let atom = if text.starts_with('-') {
            text.parse().map(Atom::Int64).ok()
        } else {
            text.trim_start_matches('+').parse().map(Atom::Uint64).ok()
        };

        atom.or_else(|| text.parse().ok().map(Atom::Double))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Int64(v) => write!(f, "{v}"),
            Atom::Uint64(v) => write!(f, "{v}"),
            Atom::Double(v) => write!(f, "{v}"),
            Atom::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Atom::Token(s) => f.write_str(s),
            Atom::AssetPath(s) => write!(f, "@{s}@"),
            Atom::Path(p) => write!(f, "<{p}>"),
        }
    }
}

/// Builds one [Value] at a time.
///
/// Lists open with [begin_list](Self::begin_list), tuples with
/// [begin_tuple](Self::begin_tuple). Every list nesting level must be
/// rectangular: all runs at a depth have the length of the first run seen.
pub struct ValueContext<'s> {
    registry: &'s ValueTypeRegistry,
    ty: Option<&'s ValueTypeName>,
    atoms: Vec<Atom>,

    /// Run length per list depth, set by the first run that closes.
    shape: Vec<Option<usize>>,
    /// Items seen so far in each open list.
    working: Vec<usize>,
    /// Items seen so far in each open tuple.
    tuples: Vec<usize>,
    /// At least one list was opened for the current value.
    is_list: bool,

    recorded: Option<String>,
    needs_separator: bool,
}

impl<'s> ValueContext<'s> {
    pub fn new(registry: &'s ValueTypeRegistry) -> Self {
        Self {
            registry,
            ty: None,
            atoms: Vec::new(),
            shape: Vec::new(),
            working: Vec::new(),
            tuples: Vec::new(),
            is_list: false,
            recorded: None,
            needs_separator: false,
        }
    }

    /// Prepares for a value of `type_name`. Returns `false` if the type is not
    /// registered, which is only an error once a typed value is required.
    pub fn setup_factory(&mut self, type_name: &str) -> bool {
        self.clear();
        self.ty = self.registry.find(type_name);
        self.ty.is_some()
    }

    /// Prepares for a value of unknown type, only its text is kept.
    pub fn setup_untyped(&mut self) {
        self.clear();
        self.ty = None;
    }

    pub fn type_name(&self) -> Option<&'s ValueTypeName> {
        self.ty
    }

    /// Whether the declared type is a `[]` type.
    pub fn is_shaped(&self) -> bool {
        self.ty.map_or(false, |ty| ty.is_array)
    }

    /// Resets everything but the declared type.
    pub fn clear(&mut self) {
        self.atoms.clear();
        self.shape.clear();
        self.working.clear();
        self.tuples.clear();
        self.is_list = false;
        self.needs_separator = false;
        if let Some(recorded) = self.recorded.as_mut() {
            recorded.clear();
        }
    }

    pub fn begin_list(&mut self) -> Result<()> {
        if !self.tuples.is_empty() {
            fail!(ErrorKind::ArityMismatch, "Lists are not allowed inside tuples");
        }

        self.record_open('[');
        self.is_list = true;
        self.working.push(0);
        if self.shape.len() < self.working.len() {
            self.shape.push(None);
        }

        Ok(())
    }

    pub fn end_list(&mut self) -> Result<()> {
        let depth = self.working.len();
        let Some(count) = self.working.pop() else {
            coding_error!("end_list without begin_list");
        };

        match self.shape[depth - 1] {
            None => self.shape[depth - 1] = Some(count),
            Some(expected) if expected != count => {
                fail!(
                    ErrorKind::NonSquareShape,
                    "Non-square shaped value: expected {} items at depth {}, got {}",
                    expected,
                    depth,
                    count
                )
            }
            Some(_) => {}
        }

        self.record_close(']');
        self.bump();

        Ok(())
    }

    pub fn begin_tuple(&mut self) -> Result<()> {
        // Arity is not known for recorded values.
        if let Some(ty) = self.ty.filter(|_| !self.is_recording_string()) {
            if self.tuples.len() >= ty.dims.len() {
                fail!(
                    ErrorKind::ArityMismatch,
                    "Too many nested tuples for type '{}'",
                    ty.name
                );
            }
        }

        self.record_open('(');
        self.tuples.push(0);

        Ok(())
    }

    pub fn end_tuple(&mut self) -> Result<()> {
        let depth = self.tuples.len();
        let Some(count) = self.tuples.pop() else {
            coding_error!("end_tuple without begin_tuple");
        };

        if let Some(ty) = self.ty.filter(|_| !self.is_recording_string()) {
            let expected = ty.dims[depth - 1];
            if count != expected {
                fail!(
                    ErrorKind::ArityMismatch,
                    "Tuple for type '{}' has {} elements, expected {}",
                    ty.name,
                    count,
                    expected
                );
            }
        }

        self.record_close(')');
        self.bump();

        Ok(())
    }

    pub fn append_value(&mut self, atom: Atom) -> Result<()> {
        if let Some(ty) = self.ty.filter(|_| !self.is_recording_string()) {
            if !self.tuples.is_empty() && self.tuples.len() != ty.dims.len() {
                fail!(
                    ErrorKind::ArityMismatch,
                    "Scalar found where a tuple is expected for type '{}'",
                    ty.name
                );
            }
        }

        if let Some(recorded) = self.recorded.as_mut() {
            if self.needs_separator {
                recorded.push_str(", ");
            }
            recorded.push_str(&atom.to_string());
        }

        self.needs_separator = true;
        self.atoms.push(atom);
        self.bump();

        Ok(())
    }

    /// Counts a finished item against the innermost open tuple or list.
    fn bump(&mut self) {
        if let Some(count) = self.tuples.last_mut() {
            *count += 1;
        } else if let Some(count) = self.working.last_mut() {
            *count += 1;
        }
    }

    fn record_open(&mut self, c: char) {
        if let Some(recorded) = self.recorded.as_mut() {
            if self.needs_separator {
                recorded.push_str(", ");
            }
            recorded.push(c);
        }
        self.needs_separator = false;
    }

    fn record_close(&mut self, c: char) {
        if let Some(recorded) = self.recorded.as_mut() {
            recorded.push(c);
        }
        self.needs_separator = true;
    }

    /// Converts the accumulated atoms into a value of the declared type.
    pub fn produce_value(&mut self) -> Result<Value> {
        let Some(ty) = self.ty else {
            fail!(ErrorKind::InvalidValue, "Unrecognized value type");
        };

        if !self.working.is_empty() || !self.tuples.is_empty() {
            coding_error!("produce_value with open list or tuple");
        }

        if ty.is_array && !self.is_list {
            fail!(ErrorKind::TypeMismatch, "Type name has [] for non-shaped value");
        }

        if !ty.is_array && self.is_list {
            fail!(ErrorKind::TypeMismatch, "Type name missing [] for shaped value");
        }

        let shape = self.shape.iter().map(|len| len.unwrap_or(0)).collect::<Vec<_>>();
        let count = if ty.is_array { shape.iter().product() } else { 1 };
        let expected = count * ty.tuple_size();

        if self.atoms.len() != expected {
            fail!(
                ErrorKind::ArityMismatch,
                "Type '{}' expects {} values, got {}",
                ty.name,
                expected,
                self.atoms.len()
            );
        }

        let elements = convert(ty.scalar, &self.atoms)?;
        self.clear();

        let value = if ty.is_array {
            Value::Array(Array { shape, elements })
        } else if ty.is_tuple() {
            Value::Tuple(elements)
        } else {
            scalar(elements)?
        };

        Ok(value)
    }

    pub fn start_recording_string(&mut self) {
        self.recorded = Some(String::new());
        self.needs_separator = false;
    }

    pub fn stop_recording_string(&mut self) {
        self.recorded = None;
    }

    pub fn is_recording_string(&self) -> bool {
        self.recorded.is_some()
    }

    pub fn recorded_string(&self) -> &str {
        self.recorded.as_deref().unwrap_or_default()
    }

    pub fn set_recorded_string(&mut self, text: impl Into<String>) {
        if let Some(recorded) = self.recorded.as_mut() {
            *recorded = text.into();
            self.needs_separator = true;
        }
    }
}

fn scalar(elements: Elements) -> Result<Value> {
    fn one<T>(mut v: Vec<T>) -> Result<T> {
        match v.pop() {
            Some(item) if v.is_empty() => Ok(item),
            _ => fail!(ErrorKind::ArityMismatch, "Expected a single value"),
        }
    }

    let value = match elements {
        Elements::Bool(v) => Value::Bool(one(v)?),
        Elements::Uchar(v) => Value::Uchar(one(v)?),
        Elements::Int(v) => Value::Int(one(v)?),
        Elements::Uint(v) => Value::Uint(one(v)?),
        Elements::Int64(v) => Value::Int64(one(v)?),
        Elements::Uint64(v) => Value::Uint64(one(v)?),
        Elements::Half(v) => Value::Half(one(v)?),
        Elements::Float(v) => Value::Float(one(v)?),
        Elements::Double(v) => Value::Double(one(v)?),
        Elements::TimeCode(v) => Value::TimeCode(one(v)?),
        Elements::String(v) => Value::String(one(v)?),
        Elements::Token(v) => Value::Token(one(v)?),
        Elements::AssetPath(v) => Value::AssetPath(one(v)?),
    };

    Ok(value)
}

/// Converts every atom with `f`, reporting the index of the first failure.
fn convert_each<T>(scalar: ScalarType, atoms: &[Atom], f: impl Fn(&Atom) -> Option<T>) -> Result<Vec<T>> {
    atoms
        .iter()
        .enumerate()
        .map(|(index, atom)| {
            f(atom).ok_or_else(|| {
                ParseError::new(
                    ErrorKind::ValueConversionError { index },
                    format!("Unable to convert {atom} to {scalar} at index {index}"),
                )
            })
        })
        .collect()
}

fn convert(scalar: ScalarType, atoms: &[Atom]) -> Result<Elements> {
    let elements = match scalar {
        ScalarType::Bool => Elements::Bool(convert_each(scalar, atoms, to_bool)?),
        ScalarType::Uchar => Elements::Uchar(convert_each(scalar, atoms, to_int)?),
        ScalarType::Int => Elements::Int(convert_each(scalar, atoms, to_int)?),
        ScalarType::Uint => Elements::Uint(convert_each(scalar, atoms, to_int)?),
        ScalarType::Int64 => Elements::Int64(convert_each(scalar, atoms, to_int)?),
        ScalarType::Uint64 => Elements::Uint64(convert_each(scalar, atoms, to_int)?),
        ScalarType::Half => Elements::Half(convert_each(scalar, atoms, |a| to_f64(a).map(f16::from_f64))?),
        ScalarType::Float => Elements::Float(convert_each(scalar, atoms, |a| to_f64(a).map(|v| v as f32))?),
        ScalarType::Double => Elements::Double(convert_each(scalar, atoms, to_f64)?),
        ScalarType::TimeCode => Elements::TimeCode(convert_each(scalar, atoms, to_f64)?),
        ScalarType::String => Elements::String(convert_each(scalar, atoms, |atom| match atom {
            Atom::String(s) => Some(s.clone()),
            _ => None,
        })?),
        ScalarType::Token => Elements::Token(convert_each(scalar, atoms, |atom| match atom {
            Atom::String(s) | Atom::Token(s) => Some(s.clone()),
            _ => None,
        })?),
        ScalarType::Asset => Elements::AssetPath(convert_each(scalar, atoms, |atom| match atom {
            Atom::AssetPath(s) => Some(s.clone()),
            _ => None,
        })?),
    };

    Ok(elements)
}

fn to_bool(atom: &Atom) -> Option<bool> {
    match atom {
        Atom::Int64(v) => Some(*v != 0),
        Atom::Uint64(v) => Some(*v != 0),
        Atom::Double(v) => Some(*v != 0.0),
        Atom::Token(word) | Atom::String(word) => {
            const TRUE: &[&str] = &["true", "yes", "on"];
            const FALSE: &[&str] = &["false", "no", "off"];

            if TRUE.iter().any(|w| word.eq_ignore_ascii_case(w)) {
                Some(true)
            } else if FALSE.iter().any(|w| word.eq_ignore_ascii_case(w)) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Range checked integer conversion. Doubles convert only when integral.
fn to_int<T: NumCast>(atom: &Atom) -> Option<T> {
    match atom {
        Atom::Int64(v) => <T as NumCast>::from(*v),
        Atom::Uint64(v) => <T as NumCast>::from(*v),
        Atom::Double(v) if v.fract() == 0.0 => <T as NumCast>::from(*v),
        _ => None,
    }
}

fn to_f64(atom: &Atom) -> Option<f64> {
    match atom {
        Atom::Int64(v) => Some(*v as f64),
        Atom::Uint64(v) => Some(*v as f64),
        Atom::Double(v) => Some(*v),
        Atom::Token(word) => match word.as_str() {
            "inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            "nan" => Some(f64::NAN),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(text: &str) -> Atom {
        Atom::number(text).unwrap()
    }

    #[test]
    #[rustfmt::skip]
    fn parse_numbers() {
        let cases = [
            ("0", Atom::Uint64(0)),
            ("42", Atom::Uint64(42)),
            ("+7", Atom::Uint64(7)),
            ("-3", Atom::Int64(-3)),
            ("1.5", Atom::Double(1.5)),
            ("1e3", Atom::Double(1000.0)),
            ("-2.5E-1", Atom::Double(-0.25)),
            ("18446744073709551616", Atom::Double(18446744073709551616.0)),
        ];

        for (text, expected) in cases {
            assert_eq!(num(text), expected, "{text}");
        }

        let Atom::Double(zero) = num("-0") else { panic!("-0 must be a double") };
        assert!(zero == 0.0 && zero.is_sign_negative());
    }

    #[test]
    fn scalar_double_from_int() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        assert!(ctx.setup_factory("double"));
        ctx.append_value(num("1")).unwrap();
        assert_eq!(ctx.produce_value().unwrap(), Value::Double(1.0));
    }

    #[test]
    fn unknown_type() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        assert!(!ctx.setup_factory("double5"));
        ctx.append_value(num("1")).unwrap();
        assert_eq!(ctx.produce_value().unwrap_err().kind, ErrorKind::InvalidValue);
    }

    #[test]
    fn tuple_array() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("float2[]");
        ctx.begin_list().unwrap();
        for pair in [["1", "2"], ["3", "4.5"]] {
            ctx.begin_tuple().unwrap();
            for v in pair {
                ctx.append_value(num(v)).unwrap();
            }
            ctx.end_tuple().unwrap();
        }
        ctx.end_list().unwrap();

        assert_eq!(
            ctx.produce_value().unwrap(),
            Value::Array(Array {
                shape: vec![2],
                elements: Elements::Float(vec![1.0, 2.0, 3.0, 4.5]),
            })
        );
    }

    #[test]
    fn matrix() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("matrix2d");
        ctx.begin_tuple().unwrap();
        for row in [["1", "0"], ["0", "1"]] {
            ctx.begin_tuple().unwrap();
            for v in row {
                ctx.append_value(num(v)).unwrap();
            }
            ctx.end_tuple().unwrap();
        }
        ctx.end_tuple().unwrap();

        assert_eq!(
            ctx.produce_value().unwrap(),
            Value::Tuple(Elements::Double(vec![1.0, 0.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn arity_mismatch() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("double3");
        ctx.begin_tuple().unwrap();
        ctx.append_value(num("1")).unwrap();
        ctx.append_value(num("2")).unwrap();
        assert_eq!(ctx.end_tuple().unwrap_err().kind, ErrorKind::ArityMismatch);

        ctx.setup_factory("double3");
        ctx.append_value(num("1")).unwrap();
        assert_eq!(ctx.produce_value().unwrap_err().kind, ErrorKind::ArityMismatch);

        ctx.setup_factory("double");
        assert_eq!(ctx.begin_tuple().unwrap_err().kind, ErrorKind::ArityMismatch);
    }

    #[test]
    fn non_square_shape() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("int[]");
        ctx.begin_list().unwrap();

        ctx.begin_list().unwrap();
        ctx.append_value(num("1")).unwrap();
        ctx.append_value(num("2")).unwrap();
        ctx.end_list().unwrap();

        ctx.begin_list().unwrap();
        ctx.append_value(num("3")).unwrap();
        assert_eq!(ctx.end_list().unwrap_err().kind, ErrorKind::NonSquareShape);
    }

    #[test]
    fn square_shape() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("int[]");
        ctx.begin_list().unwrap();
        for run in [["1", "2"], ["3", "4"]] {
            ctx.begin_list().unwrap();
            for v in run {
                ctx.append_value(num(v)).unwrap();
            }
            ctx.end_list().unwrap();
        }
        ctx.end_list().unwrap();

        let value = ctx.produce_value().unwrap();
        let Value::Array(array) = value else { panic!("expected array") };
        assert_eq!(array.shape, vec![2, 2]);
        assert_eq!(array.elements, Elements::Int(vec![1, 2, 3, 4]));
    }

    #[test]
    fn empty_array() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("token[]");
        ctx.begin_list().unwrap();
        ctx.end_list().unwrap();

        assert_eq!(
            ctx.produce_value().unwrap(),
            Value::Array(Array {
                shape: vec![0],
                elements: Elements::Token(vec![]),
            })
        );
    }

    #[test]
    fn brackets_must_match_type() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("int[]");
        ctx.append_value(num("1")).unwrap();
        let err = ctx.produce_value().unwrap_err();
        assert_eq!(err.message, "Type name has [] for non-shaped value");

        ctx.setup_factory("int");
        ctx.begin_list().unwrap();
        ctx.append_value(num("1")).unwrap();
        ctx.end_list().unwrap();
        let err = ctx.produce_value().unwrap_err();
        assert_eq!(err.message, "Type name missing [] for shaped value");
    }

    #[test]
    fn conversion_error_index() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("int[]");
        ctx.begin_list().unwrap();
        ctx.append_value(num("1")).unwrap();
        ctx.append_value(Atom::String("x".into())).unwrap();
        ctx.end_list().unwrap();

        assert_eq!(
            ctx.produce_value().unwrap_err().kind,
            ErrorKind::ValueConversionError { index: 1 }
        );
    }

    #[test]
    #[rustfmt::skip]
    fn coercions() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        let cases = [
            ("bool", Atom::Uint64(0), Value::Bool(false)),
            ("bool", Atom::Int64(-2), Value::Bool(true)),
            ("bool", Atom::Token("Yes".into()), Value::Bool(true)),
            ("bool", Atom::Token("off".into()), Value::Bool(false)),
            ("float", Atom::Token("-inf".into()), Value::Float(f32::NEG_INFINITY)),
            ("half", Atom::Double(0.5), Value::Half(f16::from_f32(0.5))),
            ("uchar", Atom::Uint64(255), Value::Uchar(255)),
            ("int", Atom::Double(3.0), Value::Int(3)),
            ("token", Atom::String("st".into()), Value::Token("st".into())),
            ("asset", Atom::AssetPath("a.usda".into()), Value::AssetPath("a.usda".into())),
            ("timecode", Atom::Uint64(24), Value::TimeCode(24.0)),
        ];

        for (ty, atom, expected) in cases {
            ctx.setup_factory(ty);
            ctx.append_value(atom).unwrap();
            assert_eq!(ctx.produce_value().unwrap(), expected, "{ty}");
        }

        ctx.setup_factory("double");
        ctx.append_value(Atom::Token("nan".into())).unwrap();
        assert!(matches!(ctx.produce_value().unwrap(), Value::Double(v) if v.is_nan()));

        for (ty, atom) in [
            ("uchar", Atom::Uint64(256)),
            ("uint", Atom::Int64(-1)),
            ("int", Atom::Double(1.5)),
            ("bool", Atom::Token("maybe".into())),
            ("string", Atom::Token("bare".into())),
        ] {
            ctx.setup_factory(ty);
            ctx.append_value(atom).unwrap();
            assert!(ctx.produce_value().unwrap_err().kind.is_value_conversion_error(), "{ty}");
        }
    }

    #[test]
    fn record_string() {
        let registry = ValueTypeRegistry::new();
        let mut ctx = ValueContext::new(&registry);

        ctx.setup_factory("unknownType");
        ctx.start_recording_string();
        ctx.begin_list().unwrap();
        ctx.append_value(num("1")).unwrap();
        ctx.begin_tuple().unwrap();
        ctx.append_value(Atom::String("a\"b".into())).unwrap();
        ctx.append_value(Atom::AssetPath("x.usda".into())).unwrap();
        ctx.end_tuple().unwrap();
        ctx.append_value(Atom::Path(Path::new("/A").unwrap())).unwrap();
        ctx.end_list().unwrap();

        assert!(ctx.is_recording_string());
        assert_eq!(ctx.recorded_string(), r#"[1, ("a\"b", @x.usda@), </A>]"#);

        ctx.set_recorded_string("None");
        assert_eq!(ctx.recorded_string(), "None");

        ctx.stop_recording_string();
        assert!(!ctx.is_recording_string());
        assert_eq!(ctx.recorded_string(), "");
    }
}
