//! `usda` implements the text file parser.
//!
//! [Parser] turns a layer into a sparse [sdf::Data] store. [TextReader] wraps
//! the result for callers that want to load files and query fields through
//! [sdf::AbstractData].

use std::{borrow::Cow, fs, path::Path};

use anyhow::{bail, Context, Result};
use strum::IntoEnumIterator;

pub mod context;
mod error;
pub mod parser;
pub mod token;
mod value;

pub use context::LayerHints;
pub use error::{ErrorKind, Location, ParseError};
pub use parser::{ParsedLayer, Parser};

use crate::{ar::Resolver, sdf};

/// Header cookie a text layer starts with, `#usda 1.0` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub magic: String,
    pub version: String,
}

impl Default for Format {
    fn default() -> Self {
        Self::new("usda", "1.0")
    }
}

impl Format {
    pub fn new(magic: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            magic: magic.into(),
            version: version.into(),
        }
    }
}

/// Parses `source` with the default header.
pub fn parse(source: &str, schema: &sdf::Schema) -> std::result::Result<ParsedLayer, ParseError> {
    Parser::new(source, schema).parse()
}

pub struct TextReader {
    data: sdf::Data,
    hints: LayerHints,
}

impl TextReader {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).with_context(|| format!("Unable to read file: {}", path.display()))?;

        let schema = sdf::Schema::new();
        let layer = Parser::new(&source, &schema)
            .with_file_context(path.display().to_string())
            .parse()
            .context("Unable to parse text file")?;

        Ok(Self::from_layer(layer))
    }

    /// Parses an in-memory layer, `name` is used in diagnostics.
    pub fn from_str(source: &str, name: &str) -> Result<Self> {
        let schema = sdf::Schema::new();
        let layer = Parser::new(source, &schema)
            .with_file_context(name)
            .parse()
            .with_context(|| format!("Unable to parse {name}"))?;

        Ok(Self::from_layer(layer))
    }

    pub fn from_data(data: sdf::Data) -> Self {
        Self {
            data,
            hints: LayerHints::default(),
        }
    }

    fn from_layer(layer: ParsedLayer) -> Self {
        Self {
            data: layer.data,
            hints: layer.hints,
        }
    }

    #[inline]
    pub fn data(&self) -> &sdf::Data {
        &self.data
    }

    #[inline]
    pub fn hints(&self) -> LayerHints {
        self.hints
    }

    /// Asset paths this layer pulls in: sublayers, then reference and
    /// payload targets in path order. Internal arcs are skipped.
    pub fn asset_dependencies(&self) -> Vec<String> {
        let mut assets = Vec::new();

        let root = sdf::Path::abs_root();
        if let Some(sdf::Value::StringVec(layers)) = self.data.field(&root, "subLayers") {
            assets.extend(layers.iter().cloned());
        }

        let mut paths = self.data.paths().collect::<Vec<_>>();
        paths.sort();

        for path in paths {
            if let Some(sdf::Value::ReferenceListOp(references)) = self.data.field(path, "references") {
                for list in sdf::ListOpType::iter() {
                    assets.extend(references.items(list).iter().map(|r| r.asset_path.clone()));
                }
            }

            if let Some(sdf::Value::PayloadListOp(payloads)) = self.data.field(path, "payload") {
                for list in sdf::ListOpType::iter() {
                    assets.extend(payloads.items(list).iter().map(|p| p.asset_path.clone()));
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        assets.retain(|asset| !asset.is_empty() && seen.insert(asset.clone()));

        assets
    }

    /// Resolves every asset dependency. Fails on the first one the resolver
    /// cannot locate.
    pub fn resolve_dependencies(&self, resolver: &dyn Resolver) -> Result<Vec<(String, std::path::PathBuf)>> {
        self.asset_dependencies()
            .into_iter()
            .map(|asset| match resolver.resolve(&asset) {
                Some(resolved) => Ok((asset, resolved)),
                None => bail!("Unable to resolve asset '{asset}'"),
            })
            .collect()
    }
}

impl sdf::AbstractData for TextReader {
    fn has_spec(&self, path: &sdf::Path) -> bool {
        self.data.has_spec(path)
    }

    fn has_field(&self, path: &sdf::Path, field: &str) -> bool {
        self.data.has_field(path, field)
    }

    fn spec_type(&self, path: &sdf::Path) -> Option<sdf::SpecType> {
        self.data.spec_type(path)
    }

    fn get(&self, path: &sdf::Path, field: &str) -> Result<Cow<sdf::Value>> {
        self.data.get(path, field)
    }

    fn list(&self, path: &sdf::Path) -> Option<Vec<String>> {
        self.data.list(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        ar::DefaultResolver,
        sdf::{path, AbstractData, SpecType, Value},
    };

    use super::*;

    #[test]
    fn read_fixture() -> Result<()> {
        let reader = TextReader::read("fixtures/connection.usda")?;

        assert_eq!(reader.spec_type(&path("/boardMat")?), Some(SpecType::Prim));
        assert!(reader.has_field(&path("/boardMat/PBRShader.info:id")?, "default"));

        let value = reader.get(&path("/boardMat/PBRShader.inputs:roughness")?, "default")?;
        assert_eq!(value.as_ref(), &Value::Float(0.4));

        let mut fields = reader.list(&path("/boardMat")?).unwrap();
        fields.sort();
        assert_eq!(fields, vec!["primChildren", "properties", "specifier", "typeName"]);

        assert!(reader.get(&path("/Missing")?, "default").is_err());

        Ok(())
    }

    #[test]
    fn read_error_names_file() {
        let err = TextReader::from_str("#usda 1.0\ndef \"A\" {\n", "broken.usda")
            .err()
            .unwrap();

        let err = err.downcast_ref::<ParseError>().unwrap();
        assert_eq!(err.kind, ErrorKind::UnexpectedEof);
        assert_eq!(err.location.as_ref().unwrap().file, "broken.usda");
    }

    #[test]
    fn dependencies() -> Result<()> {
        let reader = TextReader::from_str(
            r#"#usda 1.0
(
    subLayers = [@./base.usda@]
)

def "A" (
    references = [@./ref.usda@</R>, </Internal>]
    prepend payload = @./heavy.usda@
)
{
}

def "B" (
    append references = @./ref.usda@
)
{
}
"#,
            "deps.usda",
        )?;

        assert_eq!(
            reader.asset_dependencies(),
            vec!["./base.usda".to_string(), "./ref.usda".into(), "./heavy.usda".into()]
        );

        let dir = tempfile::tempdir()?;
        for name in ["base.usda", "ref.usda"] {
            fs::write(dir.path().join(name), "#usda 1.0\n")?;
        }

        let resolver = DefaultResolver::new(dir.path());
        assert!(reader.resolve_dependencies(&resolver).is_err());

        fs::write(dir.path().join("heavy.usda"), "#usda 1.0\n")?;
        let resolved = reader.resolve_dependencies(&resolver)?;
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[1].1, dir.path().join("ref.usda"));

        Ok(())
    }

    #[test]
    fn custom_format() -> Result<()> {
        let schema = sdf::Schema::new();

        let err = parse("#sdf 1.0\n", &schema).unwrap_err();
        assert!(err.kind.is_malformed_header());

        let layer = Parser::new("#sdf 1.0\n", &schema)
            .with_format(Format::new("sdf", "1.0"))
            .parse()?;
        assert_eq!(layer.data.len(), 1);

        Ok(())
    }
}
