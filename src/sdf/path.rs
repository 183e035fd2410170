use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors produced while building or combining paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

impl PathError {
    fn invalid(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        PathError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

type Result<T> = std::result::Result<T, PathError>;

#[inline]
pub fn path(str: impl AsRef<str>) -> Result<Path> {
    Path::new(str.as_ref())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Anchor {
    #[default]
    Empty,
    Absolute,
    Relative,
}

/// A single hierarchical component of a [Path].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    /// `..`
    Parent,
    Prim(String),
    /// `{set=variant}`, an empty variant addresses the variant set itself.
    VariantSelection { set: String, variant: String },
    Property(String),
    /// `[/target]` following a relationship or attribute.
    Target(Path),
    RelationalAttribute(String),
    /// `.mapper[/target]` following an attribute.
    Mapper(Path),
    MapperArg(String),
}

/// `SdfPath` implementation.
///
/// # Syntax
/// - Two separators are used between parts of a path. A slash ("/")
/// following an identifier is used to introduce a namespace child.
/// - A period (".") following an identifier is used to introduce a property.
/// - A property may also have several non-sequential colons (':') in its name
/// to provide a rudimentary namespace within properties but may not end or
/// begin with a colon.
/// - Brackets ("[" and "]") are used to indicate relationship target paths for
/// relational attributes.
/// - Braces ("{" and "}") hold a variant selection, a prim child may follow the
/// closing brace without a slash.
///
/// Paths are immutable: every `append_*` call returns a new value. Equality,
/// ordering and hashing are structural over the components.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    anchor: Anchor,
    elements: Vec<Element>,
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Anchor::Empty => return Ok(()),
            Anchor::Absolute => f.write_str("/")?,
            Anchor::Relative if self.elements.is_empty() => return f.write_str("."),
            Anchor::Relative => {}
        }

        let mut prev: Option<&Element> = None;
        for element in &self.elements {
            let after_prim = matches!(prev, Some(Element::Prim(_)) | Some(Element::Parent));

            match element {
                Element::Parent => {
                    if after_prim {
                        f.write_str("/")?;
                    }
                    f.write_str("..")?;
                }
                Element::Prim(name) => {
                    if after_prim {
                        f.write_str("/")?;
                    }
                    f.write_str(name)?;
                }
                Element::VariantSelection { set, variant } => write!(f, "{{{set}={variant}}}")?,
                Element::Property(name) => {
                    // "../.prop" keeps the property apart from the parent marker.
                    if matches!(prev, Some(Element::Parent)) {
                        f.write_str("/")?;
                    }
                    write!(f, ".{name}")?;
                }
                Element::Target(target) => write!(f, "[{target}]")?,
                Element::RelationalAttribute(name) | Element::MapperArg(name) => write!(f, ".{name}")?,
                Element::Mapper(target) => write!(f, ".mapper[{target}]")?,
            }

            prev = Some(element);
        }

        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Path> {
        let mut scanner = Scanner { source: s, pos: 0 };
        let path = scanner.path()?;

        if scanner.pos != s.len() {
            return Err(PathError::invalid(s, format!("unexpected character at {}", scanner.pos)));
        }

        Ok(path)
    }
}

impl Path {
    pub fn new(path: &str) -> Result<Self> {
        Path::from_str(path)
    }

    /// The absolute root path `/`.
    #[inline]
    pub fn abs_root() -> Path {
        Path {
            anchor: Anchor::Absolute,
            elements: Vec::new(),
        }
    }

    #[inline]
    pub fn root() -> Path {
        Self::abs_root()
    }

    #[inline]
    pub fn empty() -> Path {
        Path::default()
    }

    /// The relative path `.`.
    #[inline]
    pub fn reflexive() -> Path {
        Path {
            anchor: Anchor::Relative,
            elements: Vec::new(),
        }
    }

    #[inline]
    pub fn is_abs(&self) -> bool {
        self.anchor == Anchor::Absolute
    }

    #[inline]
    pub fn is_abs_root(&self) -> bool {
        self.is_abs() && self.elements.is_empty()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchor == Anchor::Empty
    }

    #[inline]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    fn last(&self) -> Option<&Element> {
        self.elements.last()
    }

    fn with(&self, element: Element) -> Path {
        let mut elements = self.elements.clone();
        elements.push(element);
        Path {
            anchor: self.anchor,
            elements,
        }
    }

    /// Whether this path names a prim (or is a relative `.`/`..` path that may
    /// resolve to one).
    pub fn is_prim_path(&self) -> bool {
        match self.last() {
            Some(Element::Prim(_)) | Some(Element::Parent) => true,
            None => self.anchor == Anchor::Relative,
            _ => false,
        }
    }

    pub fn is_abs_root_or_prim_path(&self) -> bool {
        self.is_abs_root() || self.is_prim_path()
    }

    pub fn is_property_path(&self) -> bool {
        matches!(
            self.last(),
            Some(Element::Property(_)) | Some(Element::RelationalAttribute(_))
        )
    }

    pub fn is_prim_property_path(&self) -> bool {
        matches!(self.last(), Some(Element::Property(_)))
    }

    pub fn is_prim_variant_selection_path(&self) -> bool {
        matches!(self.last(), Some(Element::VariantSelection { .. }))
    }

    pub fn is_target_path(&self) -> bool {
        matches!(self.last(), Some(Element::Target(_)))
    }

    pub fn is_mapper_path(&self) -> bool {
        matches!(self.last(), Some(Element::Mapper(_)))
    }

    pub fn contains_variant_selection(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, Element::VariantSelection { .. }))
    }

    /// Returns `(set, variant)` if this path ends with a variant selection.
    pub fn variant_selection(&self) -> Option<(&str, &str)> {
        match self.last() {
            Some(Element::VariantSelection { set, variant }) => Some((set, variant)),
            _ => None,
        }
    }

    /// Name of the last component.
    pub fn name(&self) -> &str {
        match self.last() {
            Some(Element::Parent) => "..",
            Some(Element::Prim(name))
            | Some(Element::Property(name))
            | Some(Element::RelationalAttribute(name))
            | Some(Element::MapperArg(name)) => name,
            Some(Element::VariantSelection { variant, .. }) => variant,
            Some(Element::Target(_)) | Some(Element::Mapper(_)) | None => "",
        }
    }

    /// Target path of the last component, if it is a target or a mapper.
    pub fn target_path(&self) -> Option<&Path> {
        match self.last() {
            Some(Element::Target(path)) | Some(Element::Mapper(path)) => Some(path),
            _ => None,
        }
    }

    pub fn parent(&self) -> Path {
        match self.anchor {
            Anchor::Empty => return Path::empty(),
            Anchor::Absolute if self.elements.is_empty() => return Path::empty(),
            Anchor::Relative if self.elements.is_empty() || matches!(self.last(), Some(Element::Parent)) => {
                return self.with(Element::Parent)
            }
            _ => {}
        }

        let mut elements = self.elements.clone();
        elements.pop();

        Path {
            anchor: self.anchor,
            elements,
        }
    }

    /// Strips everything from the first property component on, then any
    /// trailing variant selections.
    pub fn prim_path(&self) -> Path {
        let end = self
            .elements
            .iter()
            .position(|e| !matches!(e, Element::Parent | Element::Prim(_) | Element::VariantSelection { .. }))
            .unwrap_or(self.elements.len());

        let mut elements = self.elements[..end].to_vec();
        while matches!(elements.last(), Some(Element::VariantSelection { .. })) {
            elements.pop();
        }

        Path {
            anchor: self.anchor,
            elements,
        }
    }

    pub fn append_child(&self, name: &str) -> Result<Path> {
        if !Self::is_valid_identifier(name) {
            return Err(PathError::InvalidIdentifier(name.to_string()));
        }

        let can_have_children =
            self.is_abs_root() || self.is_prim_path() || self.is_prim_variant_selection_path();
        if !can_have_children {
            return Err(PathError::invalid(self, format!("cannot append child '{name}'")));
        }

        Ok(self.with(Element::Prim(name.to_string())))
    }

    pub fn append_property(&self, property: &str) -> Result<Path> {
        if !Self::is_valid_namespaced_identifier(property) {
            return Err(PathError::InvalidIdentifier(property.to_string()));
        }

        if !(self.is_prim_path() || self.is_prim_variant_selection_path()) {
            return Err(PathError::invalid(self, format!("cannot append property '{property}'")));
        }

        Ok(self.with(Element::Property(property.to_string())))
    }

    pub fn append_target(&self, target: &Path) -> Result<Path> {
        if !self.is_prim_property_path() {
            return Err(PathError::invalid(self, "targets can only be appended to properties"));
        }

        if target.is_empty() {
            return Err(PathError::invalid(self, "target path is empty"));
        }

        Ok(self.with(Element::Target(target.clone())))
    }

    pub fn append_relational_attribute(&self, name: &str) -> Result<Path> {
        if !Self::is_valid_namespaced_identifier(name) {
            return Err(PathError::InvalidIdentifier(name.to_string()));
        }

        if !self.is_target_path() {
            return Err(PathError::invalid(self, "relational attributes require a target path"));
        }

        Ok(self.with(Element::RelationalAttribute(name.to_string())))
    }

    pub fn append_mapper(&self, target: &Path) -> Result<Path> {
        if !self.is_prim_property_path() {
            return Err(PathError::invalid(self, "mappers can only be appended to properties"));
        }

        Ok(self.with(Element::Mapper(target.clone())))
    }

    pub fn append_mapper_arg(&self, name: &str) -> Result<Path> {
        if !Self::is_valid_identifier(name) {
            return Err(PathError::InvalidIdentifier(name.to_string()));
        }

        if !self.is_mapper_path() {
            return Err(PathError::invalid(self, "mapper args require a mapper path"));
        }

        Ok(self.with(Element::MapperArg(name.to_string())))
    }

    /// Appends `{set=variant}`. An empty `variant` addresses the variant set.
    pub fn append_variant_selection(&self, set: &str, variant: &str) -> Result<Path> {
        if !Self::is_valid_variant_identifier(set) {
            return Err(PathError::InvalidIdentifier(set.to_string()));
        }

        if !variant.is_empty() && !Self::is_valid_variant_identifier(variant) {
            return Err(PathError::InvalidIdentifier(variant.to_string()));
        }

        if !self.is_abs() || !(self.is_prim_path() || self.is_prim_variant_selection_path()) {
            return Err(PathError::invalid(self, "variant selections require an absolute prim path"));
        }

        Ok(self.with(Element::VariantSelection {
            set: set.to_string(),
            variant: variant.to_string(),
        }))
    }

    /// Appends a relative path to this one.
    pub fn append_path(&self, path: impl TryInto<Path, Error = PathError>) -> Result<Path> {
        let append = path.try_into()?;

        if append.is_abs() {
            return Err(PathError::invalid(&append, "cannot append absolute path"));
        }

        if self.is_property_path() {
            return Err(PathError::invalid(self, "cannot append path to property path"));
        }

        Self::resolve(self.clone(), &append)
    }

    /// Resolves a relative path against `anchor`, which must be absolute.
    /// Nested target paths are anchored at the resulting prim path.
    pub fn make_absolute(&self, anchor: &Path) -> Result<Path> {
        if self.is_abs() || self.is_empty() {
            return Ok(self.clone());
        }

        if !anchor.is_abs() {
            return Err(PathError::invalid(anchor, "anchor path must be absolute"));
        }

        Self::resolve(anchor.clone(), self)
    }

    fn resolve(mut base: Path, relative: &Path) -> Result<Path> {
        for element in &relative.elements {
            base = match element {
                Element::Parent => {
                    let parent = base.parent();
                    if parent.is_empty() {
                        return Err(PathError::invalid(relative, "too many '..' for anchor"));
                    }
                    parent
                }
                Element::Target(target) | Element::Mapper(target) => {
                    let anchor = base.prim_path();
                    let target = if anchor.is_abs() {
                        target.make_absolute(&anchor)?
                    } else {
                        target.clone()
                    };
                    let element = match element {
                        Element::Mapper(_) => Element::Mapper(target),
                        _ => Element::Target(target),
                    };
                    base.with(element)
                }
                other => base.with(other.clone()),
            };
        }

        Ok(base)
    }

    pub fn strip_variant_selections(&self) -> Path {
        if !self.contains_variant_selection() {
            return self.clone();
        }

        Path {
            anchor: self.anchor,
            elements: self
                .elements
                .iter()
                .filter(|e| !matches!(e, Element::VariantSelection { .. }))
                .cloned()
                .collect(),
        }
    }

    /// Validate identifier
    ///
    /// Rules are:
    /// - Must be 1 char len
    /// - Must start with a letter or underscore
    /// - Must contain only letters, underscores, and numbers.
    pub fn is_valid_identifier(name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        name.chars()
            .enumerate()
            .all(|(i, c)| c == '_' || if i == 0 { c.is_alphabetic() } else { c.is_alphanumeric() })
    }

    /// Identifiers joined by `:`, e.g. `inputs:diffuseColor`.
    pub fn is_valid_namespaced_identifier(name: &str) -> bool {
        name.split(':').all(Self::is_valid_identifier)
    }

    /// Variant and variant set names: letters, digits, `_`, `|` and `-`, with an
    /// optional leading `.`.
    pub fn is_valid_variant_identifier(name: &str) -> bool {
        let name = name.strip_prefix('.').unwrap_or(name);
        !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '|' | '-'))
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Path> {
        Path::from_str(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self> {
        Path::from_str(&value)
    }
}

/// Hand-written scanner for the path grammar. Target paths recurse.
struct Scanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() != Some(c) {
            return Err(self.error(format!("expected '{c}'")));
        }
        self.bump();
        Ok(())
    }

    fn error(&self, reason: String) -> PathError {
        PathError::invalid(self.source, reason)
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.bump();
        }
        &self.source[start..self.pos]
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), None | Some(']'))
    }

    fn path(&mut self) -> Result<Path> {
        if self.at_end() {
            return Ok(Path::empty());
        }

        let mut path = if self.peek() == Some('/') {
            self.bump();
            Path::abs_root()
        } else {
            Path::reflexive()
        };

        if self.at_end() {
            return Ok(path);
        }

        // "." alone, or "./A"
        if self.starts_with(".") && !self.starts_with("..") {
            let rest = &self.source[self.pos + 1..];
            if rest.is_empty() || rest.starts_with(']') {
                self.bump();
                return Ok(path);
            }
            if rest.starts_with('/') {
                self.bump();
                self.bump();
            }
        }

        // Prim part.
        let mut expect_name = true;
        loop {
            match self.peek() {
                None | Some(']') => return Ok(path),
                Some('.') if self.starts_with("..") && expect_name => {
                    self.pos += 2;
                    path.elements.push(Element::Parent);
                    expect_name = false;
                }
                Some('.') => break,
                Some('/') if !expect_name => {
                    self.bump();
                    expect_name = true;
                    // "../.prop"
                    if self.starts_with(".") && !self.starts_with("..") {
                        break;
                    }
                }
                Some('{') => {
                    let after_prim = path.is_prim_path() || path.is_prim_variant_selection_path();
                    if !after_prim || path.elements.is_empty() {
                        return Err(self.error("variant selection must follow a prim".into()));
                    }
                    self.bump();
                    let set = self.take_while(|c| c != '=' && c != '}').to_string();
                    self.expect('=')?;
                    let variant = self.take_while(|c| c != '}').to_string();
                    self.expect('}')?;

                    if !Path::is_valid_variant_identifier(&set) {
                        return Err(PathError::InvalidIdentifier(set));
                    }
                    if !variant.is_empty() && !Path::is_valid_variant_identifier(&variant) {
                        return Err(PathError::InvalidIdentifier(variant));
                    }

                    path.elements.push(Element::VariantSelection { set, variant });
                    expect_name = true;
                }
                Some(_) if expect_name => {
                    let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
                    if !Path::is_valid_identifier(name) {
                        return Err(self.error(format!("invalid prim name at {}", self.pos)));
                    }
                    path.elements.push(Element::Prim(name.to_string()));
                    expect_name = false;
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }

        // Property part.
        self.expect('.')?;
        let name = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == ':');
        if !Path::is_valid_namespaced_identifier(name) {
            return Err(PathError::InvalidIdentifier(name.to_string()));
        }
        path.elements.push(Element::Property(name.to_string()));

        loop {
            match self.peek() {
                None | Some(']') => return Ok(path),
                Some('[') if matches!(path.last(), Some(Element::Property(_))) => {
                    self.bump();
                    let target = self.path()?;
                    self.expect(']')?;
                    path.elements.push(Element::Target(target));
                }
                Some('.') => {
                    self.bump();
                    let name = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == ':').to_string();

                    let element = match path.last() {
                        Some(Element::Property(_)) if name == "mapper" && self.peek() == Some('[') => {
                            self.bump();
                            let target = self.path()?;
                            self.expect(']')?;
                            Element::Mapper(target)
                        }
                        Some(Element::Target(_)) if Path::is_valid_namespaced_identifier(&name) => {
                            Element::RelationalAttribute(name)
                        }
                        Some(Element::Mapper(_)) if Path::is_valid_identifier(&name) => Element::MapperArg(name),
                        _ => return Err(PathError::InvalidIdentifier(name)),
                    };

                    path.elements.push(element);
                }
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_property() {
        let base = Path::new("/foo").unwrap();

        assert_eq!(base.append_property("prop").unwrap().to_string(), "/foo.prop");
        assert_eq!(
            base.append_property("prop:foo:bar").unwrap().to_string(),
            "/foo.prop:foo:bar"
        );

        let base = Path::new("/foo.prop").unwrap();
        assert!(base.append_property("prop2").is_err());
        assert!(base.append_property("prop2:foo:bar").is_err());

        assert!(Path::abs_root().append_property("x").is_err());
        assert_eq!(
            Path::new("/foo").unwrap().append_property("a::b"),
            Err(PathError::InvalidIdentifier("a::b".into()))
        );
    }

    #[test]
    fn test_append_child() -> Result<()> {
        assert_eq!(Path::abs_root().append_child("World")?.to_string(), "/World");
        assert_eq!(Path::new("/World")?.append_child("Geo")?.to_string(), "/World/Geo");
        assert_eq!(Path::new("/A{v=x}")?.append_child("B")?.to_string(), "/A{v=x}B");

        assert_eq!(
            Path::abs_root().append_child("1abc"),
            Err(PathError::InvalidIdentifier("1abc".into()))
        );
        assert!(Path::new("/A.x")?.append_child("B").is_err());

        Ok(())
    }

    #[test]
    fn test_append_path() -> Result<()> {
        assert_eq!(Path::new("/prim")?.append_path(".")?.to_string(), "/prim");

        assert_eq!(Path::new("/")?.append_path("foo/bar.attr")?.to_string(), "/foo/bar.attr");
        assert_eq!(
            Path::new("/")?.append_path("foo/bar.attr:argle:bargle")?.to_string(),
            "/foo/bar.attr:argle:bargle"
        );

        assert_eq!(Path::new("/foo")?.append_path("bar.attr")?.to_string(), "/foo/bar.attr");
        assert_eq!(
            Path::new("/foo")?.append_path("bar.rel[/target].attr")?.to_string(),
            "/foo/bar.rel[/target].attr"
        );
        assert_eq!(
            Path::new("/foo")?.append_path("bar.attr.mapper[/target].arg")?.to_string(),
            "/foo/bar.attr.mapper[/target].arg"
        );

        Ok(())
    }

    #[test]
    fn test_append_invalid_path() -> Result<()> {
        assert!(Path::new("/prim")?.append_path("/abs").is_err());
        assert!(Path::new("/prim.attr")?.append_path("abs").is_err());

        Ok(())
    }

    #[test]
    fn test_targets_and_variants() -> Result<()> {
        let rel = Path::new("/A.rel")?;
        let target = rel.append_target(&Path::new("/B")?)?;
        assert_eq!(target.to_string(), "/A.rel[/B]");
        assert!(target.is_target_path());
        assert_eq!(target.target_path(), Some(&Path::new("/B")?));

        let attr = target.append_relational_attribute("weight")?;
        assert_eq!(attr.to_string(), "/A.rel[/B].weight");
        assert!(attr.is_property_path());
        assert!(Path::new("/A")?.append_target(&Path::new("/B")?).is_err());

        let set = Path::new("/Prim")?.append_variant_selection("look", "")?;
        assert_eq!(set.to_string(), "/Prim{look=}");
        assert_eq!(set.variant_selection(), Some(("look", "")));

        let red = Path::new("/Prim")?.append_variant_selection("look", "red")?;
        assert_eq!(red.to_string(), "/Prim{look=red}");
        assert_eq!(red.parent(), Path::new("/Prim")?);
        assert!(Path::new("/Prim")?.append_variant_selection("bad set", "x").is_err());

        Ok(())
    }

    #[test]
    fn test_mappers() -> Result<()> {
        let attr = Path::new("/Rig.weights")?;
        let mapper = attr.append_mapper(&Path::new("/Src.values")?)?;
        assert_eq!(mapper.to_string(), "/Rig.weights.mapper[/Src.values]");
        assert!(mapper.is_mapper_path());
        assert_eq!(mapper.target_path(), Some(&Path::new("/Src.values")?));
        assert_eq!(Path::new(&mapper.to_string())?, mapper);

        let arg = mapper.append_mapper_arg("scale")?;
        assert_eq!(arg.to_string(), "/Rig.weights.mapper[/Src.values].scale");
        assert_eq!(arg.name(), "scale");
        assert_eq!(Path::new(&arg.to_string())?, arg);

        assert!(Path::new("/Rig")?.append_mapper(&attr).is_err());
        assert!(attr.append_mapper_arg("scale").is_err());
        assert!(mapper.append_mapper_arg("bad:arg").is_err());

        Ok(())
    }

    #[test]
    fn test_round_trip() {
        #[rustfmt::skip]
        let cases = [
            "",
            "/",
            ".",
            "..",
            "../..",
            "/A/B/C",
            "A/B",
            "../C.foo",
            "../.foo",
            ".bar",
            "/A/B{set=sel}C",
            "/A/B{set=sel}C{other=x}",
            "/A/B{set=}",
            "/A{v=.alt|1-b}",
            "/A/B/C.foo:bar:baz",
            "/A.rel[/B.attr].weight",
            "/A.rel1[/A/B.rel2[/A/B/C.rel3[/Blah].attr3].attr2].attr1",
            "/foo/bar.attr.mapper[/target].arg",
            "/A{v=x}.prop",
        ];

        for case in cases {
            let path = Path::new(case).unwrap();
            assert_eq!(path.to_string(), case);
            assert_eq!(Path::new(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn test_invalid_paths() {
        #[rustfmt::skip]
        let cases = [
            "/1A",
            "/A//B",
            "/A.",
            "/A.b c",
            "/A{=x}",
            "/A.rel[/B",
            "/A B",
            "/A.x.y",
        ];

        for case in cases {
            assert!(Path::new(case).is_err(), "Should fail: {}", case);
        }
    }

    #[test]
    fn test_prim_path() {
        #[rustfmt::skip]
        let cases = [
            ("/A/B/C", "/A/B/C"),

            ("/A/B{set=sel}C", "/A/B{set=sel}C"),
            ("/A/B/C{set=sel}", "/A/B/C"),

            ("/A/B/C.foo", "/A/B/C"),
            ("/A/B/C.foo:bar:baz", "/A/B/C"),

            ("/A/B/C.foo[/target].bar", "/A/B/C"),
            ("/A/B/C.foo[/target].bar:baz", "/A/B/C"),

            ("A/B/C.foo[target].bar", "A/B/C"),

            ("../C.foo", "../C"),
            ("../C.foo:bar:baz", "../C"),

            ("../.foo[target].bar", ".."),
        ];

        for (path, expected) in cases {
            assert_eq!(
                Path::new(path).unwrap().prim_path().to_string(),
                expected,
                "Unable to parse: {}",
                path,
            );
        }
    }

    #[test]
    fn test_is_property() {
        #[rustfmt::skip]
        let cases = [
            ("/Foo/Bar.baz", true),
            ("Foo", false),
            ("Foo/Bar", false),
            ("Foo.bar", true),
            ("Foo/Bar.bar", true),
            (".bar", true),
            ("/Some/Kinda/Long/Path/Just/To/Make/Sure", false),
            ("Some/Kinda/Long/Path/Just/To/Make/Sure.property", true),
            ("../Some/Kinda/Long/Path/Just/To/Make/Sure", false),
            ("../../Some/Kinda/Long/Path/Just/To/Make/Sure.property", true),
            ("/Foo/Bar.baz[targ].boom", true),
            ("Foo.bar[targ].boom", true),
            (".bar[targ].boom", true),
            ("Foo.bar[targ.attr].boom", true),
            ("/A/B/C.rel3[/Blah].attr3", true),
            ("A/B.rel2[/A/B/C.rel3[/Blah].attr3].attr2", true),
            ("/A.rel1[/A/B.rel2[/A/B/C.rel3[/Blah].attr3].attr2].attr1", true),
        ];

        for (path, expected) in cases {
            assert_eq!(Path::new(path).unwrap().is_property_path(), expected, "{}", path);
        }
    }

    #[test]
    fn test_is_prim() {
        #[rustfmt::skip]
        let cases = [
            ("/", false),
            ("/A", true),
            ("/A/B{v=x}C", true),
            ("/A{v=x}", false),
            ("/A.b", false),
            ("A/B", true),
            ("..", true),
            (".", true),
        ];

        for (path, expected) in cases {
            assert_eq!(Path::new(path).unwrap().is_prim_path(), expected, "{}", path);
        }
    }

    #[test]
    fn test_parent() -> Result<()> {
        #[rustfmt::skip]
        let cases = [
            ("/A/B", "/A"),
            ("/A", "/"),
            ("/", ""),
            ("/A.x", "/A"),
            ("/A{v=x}B", "/A{v=x}"),
            ("/A{v=x}", "/A"),
            ("A", "."),
            (".", ".."),
            ("..", "../.."),
        ];

        for (path, expected) in cases {
            assert_eq!(Path::new(path)?.parent().to_string(), expected, "{}", path);
        }

        Ok(())
    }

    #[test]
    fn test_make_absolute() -> Result<()> {
        let anchor = Path::new("/World/Geo")?;

        #[rustfmt::skip]
        let cases = [
            ("/Abs", "/Abs"),
            ("Child", "/World/Geo/Child"),
            ("../Sibling", "/World/Sibling"),
            ("../../Top.attr", "/Top.attr"),
            (".attr", "/World/Geo.attr"),
            (".rel[../Other]", "/World/Geo.rel[/World/Other]"),
        ];

        for (path, expected) in cases {
            assert_eq!(Path::new(path)?.make_absolute(&anchor)?.to_string(), expected, "{}", path);
        }

        assert!(Path::new("../../../X")?.make_absolute(&anchor).is_err());
        assert!(Path::new("X")?.make_absolute(&Path::new("Rel")?).is_err());

        Ok(())
    }

    #[test]
    fn test_strip_variant_selections() -> Result<()> {
        let path = Path::new("/A{v=x}B{w=y}C.attr")?;
        assert!(path.contains_variant_selection());

        let stripped = path.strip_variant_selections();
        assert_eq!(stripped.to_string(), "/A/B/C.attr");
        assert!(!stripped.contains_variant_selection());

        Ok(())
    }

    #[test]
    fn test_path_cmp() {
        // Less then
        assert!(Path::from_str("aaa").unwrap() < Path::from_str("aab").unwrap());
        assert!(Path::from_str("/").unwrap() < Path::from_str("/a").unwrap());

        // Greater then
        assert!(Path::from_str("aab").unwrap() > Path::from_str("aaa").unwrap());

        // Less equal
        assert!(Path::from_str("aaa").unwrap() <= Path::from_str("aab").unwrap());
        assert!(Path::from_str("aaa").unwrap() <= Path::from_str("aaa").unwrap());
    }

    #[test]
    fn validate_identifier() {
        // Valid identifiers
        assert!(Path::is_valid_identifier("_"));
        assert!(Path::is_valid_identifier("x"));
        assert!(Path::is_valid_identifier("_1"));
        assert!(Path::is_valid_identifier("test123"));
        assert!(Path::is_valid_identifier("teST"));

        // Invalid ones
        assert!(!Path::is_valid_identifier(""));
        assert!(!Path::is_valid_identifier(" "));
        assert!(!Path::is_valid_identifier("1"));
        assert!(!Path::is_valid_identifier("x!"));
        assert!(!Path::is_valid_identifier("te st"));
        assert!(!Path::is_valid_identifier("te.st"));
        assert!(!Path::is_valid_identifier("te:st"));

        assert!(Path::is_valid_namespaced_identifier("inputs:diffuseColor"));
        assert!(!Path::is_valid_namespaced_identifier("inputs:"));
        assert!(!Path::is_valid_namespaced_identifier(":x"));
        assert!(!Path::is_valid_namespaced_identifier("a.b"));

        assert!(Path::is_valid_variant_identifier("red"));
        assert!(Path::is_valid_variant_identifier(".alt"));
        assert!(Path::is_valid_variant_identifier("lod-1|hi"));
        assert!(!Path::is_valid_variant_identifier(""));
        assert!(!Path::is_valid_variant_identifier("a b"));
    }
}
