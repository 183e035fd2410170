//! Recursive descent driver.
//!
//! [Parser] walks the token stream of a layer and calls the productions of
//! [ParserContext], which validate input and commit it to the store. Any
//! error aborts the parse and is reported at the last consumed token.

use std::{borrow::Cow, ops::Range};

use tracing::{debug, warn};

use crate::sdf::{
    schema::FieldKey, Data, Dictionary, Knot, LayerOffset, ListOpType, Path, Payload, Reference, Schema, Specifier,
    UnregisteredValue, Value, Variability,
};

use super::{
    context::{LayerHints, MetadataKind, ParseState, ParserContext},
    error::{coding_error, fail, ErrorKind, Location, ParseError, Result},
    token::{split_header, unescape, LineIndex, Spanned, Token, Tokenizer},
    value::Atom,
    Format,
};

/// Result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedLayer {
    pub data: Data,
    pub hints: LayerHints,
}

/// Parser translates a list of tokens into structured data.
pub struct Parser<'a, 's> {
    source: &'a str,
    header: Option<&'a str>,
    tokens: Vec<Spanned<'a>>,
    /// First input the tokenizer could not recognize. Reported once the
    /// parser reaches it.
    lex_error: Option<Range<usize>>,
    pos: usize,
    /// Overrides the last consumed token as the error position.
    error_span: Option<Range<usize>>,
    format: Format,
    file: String,
    ctx: ParserContext<'s>,
}

impl<'a, 's> Parser<'a, 's> {
    pub fn new(source: &'a str, schema: &'s Schema) -> Self {
        let (header, offset) = split_header(source);

        let mut tokens = Vec::new();
        let mut lex_error = None;

        for token in Tokenizer::new(source, offset) {
            match token {
                Ok(token) => tokens.push(token),
                Err(span) => {
                    lex_error = Some(span);
                    break;
                }
            }
        }

        Self {
            source,
            header,
            tokens,
            lex_error,
            pos: 0,
            error_span: None,
            format: Format::default(),
            file: String::from("<string>"),
            ctx: ParserContext::new(schema),
        }
    }

    /// Header cookie to accept instead of `#usda 1.0`.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Name of the input used in diagnostics.
    pub fn with_file_context(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    /// Parse tokens to specs.
    pub fn parse(mut self) -> Result<ParsedLayer> {
        if let Err(err) = self.parse_layer() {
            let err = err.at(|| self.location());
            self.ctx.report(&err);
            return Err(err);
        }

        let (data, hints) = self.ctx.into_parts();
        debug!(file = %self.file, specs = data.len(), "parsed layer");

        Ok(ParsedLayer { data, hints })
    }

    fn location(&self) -> Location {
        let last = self.pos.checked_sub(1).and_then(|index| self.tokens.get(index));

        let (offset, snippet) = match (&self.error_span, last) {
            (Some(span), _) => (span.start, Cow::Borrowed(self.source.get(span.clone()).unwrap_or_default())),
            (None, Some(spanned)) => (spanned.span.start, spanned.token.snippet()),
            (None, None) => (0, Cow::Borrowed(self.source.lines().next().unwrap_or_default())),
        };

        let (line, column) = LineIndex::new(self.source).position(self.source, offset);

        Location {
            line,
            column,
            snippet: snippet.trim().trim_start_matches('\u{feff}').to_string(),
            path: self.ctx.path().to_string(),
            file: self.file.clone(),
        }
    }

    /*
     * Token helpers
     */

    #[inline]
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    #[inline]
    fn peek_nth(&self, n: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + n).map(|spanned| &spanned.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() && self.lex_error.is_none()
    }

    fn fetch_next(&mut self) -> Result<Token<'a>> {
        if let Some(spanned) = self.tokens.get(self.pos) {
            self.pos += 1;
            return Ok(spanned.token.clone());
        }

        match self.lex_error.clone() {
            Some(span) => {
                let text = self.source.get(span.clone()).unwrap_or_default().to_string();
                self.error_span = Some(span);
                fail!(ErrorKind::UnexpectedToken, "Unrecognized input '{text}'");
            }
            None => {
                let end = self.source.len();
                self.error_span = Some(end..end);
                fail!(ErrorKind::UnexpectedEof, "Unexpected end of input");
            }
        }
    }

    fn unexpected(token: &Token, want: &str) -> ParseError {
        ParseError::new(
            ErrorKind::UnexpectedToken,
            format!("Unexpected token '{}' (want {want})", token.snippet()),
        )
    }

    #[inline]
    fn is_pun(&self, c: char) -> bool {
        matches!(self.peek(), Some(Token::Punctuation(p)) if *p == c)
    }

    fn eat_pun(&mut self, c: char) -> bool {
        let found = self.is_pun(c);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat(&mut self, token: &Token) -> bool {
        let found = self.peek() == Some(token);
        if found {
            self.pos += 1;
        }
        found
    }

    fn ensure_next(&mut self, expected: Token, want: &str) -> Result<()> {
        let token = self.fetch_next()?;
        if token != expected {
            return Err(Self::unexpected(&token, want));
        }
        Ok(())
    }

    #[inline]
    fn ensure_pun(&mut self, c: char) -> Result<()> {
        self.ensure_next(Token::Punctuation(c), &format!("'{c}'"))
    }

    fn fetch_str(&mut self) -> Result<String> {
        match self.fetch_next()? {
            Token::String(s) => Ok(unescape(s).into_owned()),
            other => Err(Self::unexpected(&other, "string")),
        }
    }

    fn fetch_identifier(&mut self) -> Result<&'a str> {
        let token = self.fetch_next()?;
        token.as_identifier().ok_or_else(|| Self::unexpected(&token, "identifier"))
    }

    fn fetch_path(&mut self) -> Result<Path> {
        match self.fetch_next()? {
            Token::PathRef(path) => Ok(Path::new(path)?),
            other => Err(Self::unexpected(&other, "path")),
        }
    }

    fn fetch_asset(&mut self) -> Result<String> {
        match self.fetch_next()? {
            Token::AssetRef(asset) => Ok(asset.to_string()),
            other => Err(Self::unexpected(&other, "asset path")),
        }
    }

    fn fetch_number(&mut self) -> Result<f64> {
        match self.fetch_next()? {
            Token::Number(n) => n
                .parse()
                .map_err(|_| ParseError::new(ErrorKind::InvalidValue, format!("Invalid number '{n}'"))),
            other => Err(Self::unexpected(&other, "number")),
        }
    }

    /// Dictionary keys are strings or bare names.
    fn fetch_dictionary_key(&mut self) -> Result<String> {
        let token = self.fetch_next()?;
        match token {
            Token::String(s) => Ok(unescape(s).into_owned()),
            other => other
                .as_identifier()
                .map(str::to_string)
                .ok_or_else(|| Self::unexpected(&other, "dictionary key")),
        }
    }

    fn pop(&mut self) -> Result<()> {
        self.ctx.pop().map(drop)
    }

    fn list_op_type(token: &Token) -> Option<ListOpType> {
        let op = match token {
            Token::Add => ListOpType::Added,
            Token::Delete => ListOpType::Deleted,
            Token::Append => ListOpType::Appended,
            Token::Prepend => ListOpType::Prepended,
            Token::Reorder => ListOpType::Ordered,
            _ => return None,
        };
        Some(op)
    }

    fn specifier(token: &Token) -> Option<Specifier> {
        match token {
            Token::Def => Some(Specifier::Def),
            Token::Over => Some(Specifier::Over),
            Token::Class => Some(Specifier::Class),
            _ => None,
        }
    }

    /// `None`, a single item or a bracketed, comma separated list.
    fn parse_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        if self.eat(&Token::None) {
            return Ok(Vec::new());
        }

        if !self.eat_pun('[') {
            return Ok(vec![item(self)?]);
        }

        let mut items = Vec::new();
        loop {
            if self.eat_pun(']') {
                break;
            }

            items.push(item(self)?);

            if !self.eat_pun(',') {
                self.ensure_pun(']')?;
                break;
            }
        }

        Ok(items)
    }

    /*
     * Layer
     */

    fn parse_header(&self) -> Result<()> {
        let Format { magic, version } = &self.format;

        let Some(header) = self.header else {
            fail!(ErrorKind::MalformedHeader, "Text file must start with '#{magic} {version}'");
        };

        let (found_magic, found_version) = header.split_once(' ').unwrap_or((header, ""));
        if found_magic != magic {
            fail!(ErrorKind::MalformedHeader, "Expected '#{magic}' header, got '#{header}'");
        }

        let found_version = found_version.split_whitespace().next().unwrap_or_default();
        if found_version != version {
            warn!(file = %self.file, "Header version '{found_version}' does not match '{version}'");
        }

        Ok(())
    }

    fn parse_layer(&mut self) -> Result<()> {
        self.parse_header()?;
        self.ctx.begin_layer()?;

        if self.is_pun('(') {
            self.parse_metadata()?;
        }

        while !self.at_end() {
            let token = self.fetch_next()?;

            if let Some(specifier) = Self::specifier(&token) {
                self.parse_prim(specifier)?;
                continue;
            }

            match token {
                Token::Reorder => {
                    self.ensure_next(Token::RootPrims, "'rootPrims'")?;
                    self.ensure_pun('=')?;

                    self.ctx.push(ParseState::ReorderChildren);
                    let names = self.parse_list(Self::fetch_str)?;
                    self.ctx.set_prim_order(names)?;
                    self.pop()?;
                }
                other => return Err(Self::unexpected(&other, "prim definition")),
            }
        }

        self.ctx.end_layer()
    }

    /*
     * Metadata
     */

    /// `( item item ... )`
    fn parse_metadata(&mut self) -> Result<()> {
        self.ensure_pun('(')?;
        self.ctx.push(ParseState::Metadata);

        loop {
            if self.eat_pun(')') {
                break;
            }

            if self.eat_pun(';') {
                continue;
            }

            self.parse_metadata_item()?;
        }

        self.pop()
    }

    /// Metadata with a dedicated grammar that cannot be list edited.
    fn is_single_valued(token: &Token) -> bool {
        matches!(
            token,
            Token::String(_)
                | Token::Doc
                | Token::Kind
                | Token::Permission
                | Token::SymmetryFunction
                | Token::PrefixSubstitutions
                | Token::SuffixSubstitutions
                | Token::DisplayUnit
                | Token::Variants
                | Token::Relocates
                | Token::SubLayers
        )
    }

    fn parse_metadata_item(&mut self) -> Result<()> {
        let token = self.fetch_next()?;

        let (op, key) = match Self::list_op_type(&token) {
            Some(op) => (op, self.fetch_next()?),
            None => (ListOpType::Explicit, token),
        };

        self.ctx.set_list_op_type(op);

        match key {
            Token::Inherits | Token::Specializes | Token::References | Token::Payload | Token::VariantSets => {
                self.parse_list_metadata(&key)
            }
            ref key if op != ListOpType::Explicit && Self::is_single_valued(key) => {
                fail!(ErrorKind::InvalidListEdit, "'{}' cannot be list edited", key.snippet())
            }
            Token::String(comment) => self.ctx.set_comment(unescape(comment).into_owned()),
            Token::Doc => {
                self.ensure_pun('=')?;
                let doc = self.fetch_str()?;
                self.ctx.set_documentation(doc)
            }
            Token::Kind => {
                self.ensure_pun('=')?;
                let kind = self.fetch_str()?;
                self.ctx.set_kind(kind)
            }
            Token::Permission => {
                self.ensure_pun('=')?;
                let permission = self.fetch_identifier()?;
                self.ctx.set_permission(permission)
            }
            Token::SymmetryFunction => {
                self.ensure_pun('=')?;

                // The function name is optional, the next metadata key is
                // followed by '='.
                let has_name = self.peek().map_or(false, |token| token.as_identifier().is_some())
                    && self.peek_nth(1) != Some(&Token::Punctuation('='));

                let name = if has_name { Some(self.fetch_identifier()?) } else { None };

                self.ctx.set_symmetry_function(name)
            }
            Token::PrefixSubstitutions | Token::SuffixSubstitutions => {
                self.ensure_pun('=')?;
                let substitutions = self.parse_string_dictionary()?;

                let field = if key == Token::PrefixSubstitutions {
                    FieldKey::PrefixSubstitutions
                } else {
                    FieldKey::SuffixSubstitutions
                };

                self.ctx.set_substitutions(field, substitutions)
            }
            Token::DisplayUnit => {
                self.ensure_pun('=')?;
                let unit = self.fetch_identifier()?;
                self.ctx.set_display_unit(unit)
            }
            Token::Variants => {
                self.ensure_pun('=')?;
                self.ctx.push(ParseState::Variants);
                let selections = self.parse_dictionary()?;
                self.ctx.set_variant_selection(selections)?;
                self.pop()
            }
            Token::Relocates => {
                self.ensure_pun('=')?;
                self.ctx.push(ParseState::Relocates);
                let relocates = self.parse_relocates()?;
                self.ctx.set_relocates(relocates)?;
                self.pop()
            }
            Token::SubLayers => {
                self.ensure_pun('=')?;
                self.ctx.push(ParseState::SubLayer);
                let layers = self.parse_list(Self::parse_sub_layer)?;
                self.ctx.set_sub_layers(layers)?;
                self.pop()
            }
            other => match other.as_identifier() {
                Some(name) => self.parse_generic_metadata(name),
                None => Err(Self::unexpected(&other, "metadata")),
            },
        }
    }

    /// Composition arcs and variant set names, all list-op fields.
    fn parse_list_metadata(&mut self, key: &Token<'a>) -> Result<()> {
        self.ensure_pun('=')?;

        match key {
            Token::Inherits | Token::Specializes => {
                self.ctx.push(ParseState::InheritsOrSpecializes);
                let paths = self.parse_list(Self::fetch_path)?;

                if *key == Token::Inherits {
                    self.ctx.set_inherits(paths)?;
                } else {
                    self.ctx.set_specializes(paths)?;
                }
            }
            Token::References => {
                self.ctx.push(ParseState::References);
                let references = self.parse_list(Self::parse_reference)?;
                self.ctx.set_references(references)?;
            }
            Token::Payload => {
                self.ctx.push(ParseState::Payload);
                let payloads = self.parse_list(Self::parse_payload)?;
                self.ctx.set_payloads(payloads)?;
            }
            Token::VariantSets => {
                self.ctx.push(ParseState::VariantSets);
                let names = self.parse_list(Self::fetch_str)?;
                self.ctx.set_variant_set_names(names)?;
            }
            other => coding_error!("'{}' is not a list metadata key", other.snippet()),
        }

        self.pop()
    }

    /// `key = value` for any other registered or unknown field.
    fn parse_generic_metadata(&mut self, key: &str) -> Result<()> {
        self.ensure_pun('=')?;

        let state = if self.ctx.list_op_type() == ListOpType::Explicit {
            ParseState::KeyValueMetadata
        } else {
            ParseState::ListOpMetadata
        };
        self.ctx.push(state);

        match self.ctx.metadata_kind(key)? {
            MetadataKind::Typed(type_name) => {
                let value = self.parse_typed_value(type_name)?;
                self.ctx.set_metadata(key, value)?;
            }
            MetadataKind::Dictionary => {
                let dictionary = self.parse_dictionary()?;
                self.ctx.set_metadata(key, Value::Dictionary(dictionary))?;
            }
            MetadataKind::ListOp(item) => {
                let items = self.parse_typed_value_or_block(item.array_type_name())?;
                self.ctx.set_list_op_metadata(key, items)?;
            }
            MetadataKind::Unregistered => {
                let value = if self.is_pun('{') {
                    UnregisteredValue::Dictionary(self.parse_dictionary()?)
                } else {
                    let recorded = self.record_value();
                    self.ctx.values.stop_recording_string();
                    UnregisteredValue::String(recorded?)
                };

                self.ctx.set_unregistered_metadata(key, value)?;
            }
        }

        self.pop()
    }

    /// Parses a value of unknown type and returns its text.
    fn record_value(&mut self) -> Result<String> {
        self.ctx.values.setup_untyped();
        self.ctx.values.start_recording_string();

        if self.eat(&Token::None) {
            self.ctx.values.set_recorded_string("None");
        } else if let Err(err) = self.parse_value() {
            self.ctx.report(&err);
            self.ctx.values.stop_recording_string();
            return Err(err);
        }

        Ok(self.ctx.values.recorded_string().to_string())
    }

    /// `{ "from": "to", ... }`
    fn parse_string_dictionary(&mut self) -> Result<Dictionary> {
        self.ensure_pun('{')?;

        let mut dictionary = Dictionary::new();
        loop {
            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(',') {
                continue;
            }

            let key = self.fetch_str()?;
            self.ensure_pun(':')?;
            let value = self.fetch_str()?;

            dictionary.insert(key, Value::String(value));
        }

        Ok(dictionary)
    }

    /// `{ <source>: <target>, ... }`
    fn parse_relocates(&mut self) -> Result<Vec<(Path, Path)>> {
        self.ensure_pun('{')?;

        let mut relocates = Vec::new();
        loop {
            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(',') {
                continue;
            }

            let source = self.fetch_path()?;
            self.ensure_pun(':')?;
            let target = self.fetch_path()?;

            relocates.push((source, target));
        }

        Ok(relocates)
    }

    fn parse_sub_layer(&mut self) -> Result<(String, LayerOffset)> {
        let asset = self.fetch_asset()?;

        let mut offset = LayerOffset::default();
        if self.is_pun('(') {
            self.parse_arc_params(&mut offset, None)?;
        }

        Ok((asset, offset))
    }

    /// `@asset@</prim>`, `@asset@` or `</prim>` for internal arcs.
    fn parse_arc_target(&mut self) -> Result<(String, Path)> {
        match self.fetch_next()? {
            Token::AssetRef(asset) => {
                let prim_path = if matches!(self.peek(), Some(Token::PathRef(_))) {
                    self.fetch_path()?
                } else {
                    Path::empty()
                };

                Ok((asset.to_string(), prim_path))
            }
            Token::PathRef(path) => Ok((String::new(), Path::new(path)?)),
            other => Err(Self::unexpected(&other, "asset or prim path")),
        }
    }

    /// `(offset = 1; scale = 2; customData = {...})`
    fn parse_arc_params(&mut self, offset: &mut LayerOffset, mut custom_data: Option<&mut Dictionary>) -> Result<()> {
        self.ensure_pun('(')?;

        loop {
            if self.eat_pun(')') {
                break;
            }

            if self.eat_pun(';') {
                continue;
            }

            match self.fetch_next()? {
                Token::Offset => {
                    self.ensure_pun('=')?;
                    offset.offset = self.fetch_number()?;
                }
                Token::Scale => {
                    self.ensure_pun('=')?;
                    offset.scale = self.fetch_number()?;
                }
                Token::CustomData if custom_data.is_some() => {
                    self.ensure_pun('=')?;
                    let dictionary = self.parse_dictionary()?;
                    if let Some(data) = custom_data.as_deref_mut() {
                        *data = dictionary;
                    }
                }
                other => return Err(Self::unexpected(&other, "'offset' or 'scale'")),
            }
        }

        Ok(())
    }

    fn parse_reference(&mut self) -> Result<Reference> {
        let (asset_path, prim_path) = self.parse_arc_target()?;

        let mut reference = Reference {
            asset_path,
            prim_path,
            ..Default::default()
        };

        if self.is_pun('(') {
            self.parse_arc_params(&mut reference.layer_offset, Some(&mut reference.custom_data))?;
        }

        Ok(reference)
    }

    fn parse_payload(&mut self) -> Result<Payload> {
        let (asset_path, prim_path) = self.parse_arc_target()?;

        let mut payload = Payload {
            asset_path,
            prim_path,
            ..Default::default()
        };

        if self.is_pun('(') {
            self.parse_arc_params(&mut payload.layer_offset, None)?;
        }

        Ok(payload)
    }

    /*
     * Values
     */

    /// Feeds one value (scalar, list or tuple) into the value context.
    fn parse_value(&mut self) -> Result<()> {
        if self.eat_pun('[') {
            self.ctx.values.begin_list()?;
            self.parse_value_items(']')?;
            self.ctx.values.end_list()
        } else if self.eat_pun('(') {
            self.ctx.values.begin_tuple()?;
            self.parse_value_items(')')?;
            self.ctx.values.end_tuple()
        } else {
            let atom = self.parse_atom()?;
            self.ctx.values.append_value(atom)
        }
    }

    fn parse_value_items(&mut self, close: char) -> Result<()> {
        loop {
            if self.eat_pun(close) {
                return Ok(());
            }

            self.parse_value()?;

            if !self.eat_pun(',') {
                return self.ensure_pun(close);
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Atom> {
        let token = self.fetch_next()?;

        let atom = match token {
            Token::Number(n) => match Atom::number(n) {
                Some(atom) => atom,
                None => fail!(ErrorKind::InvalidValue, "Invalid number '{n}'"),
            },
            Token::Punctuation('-') => {
                self.ensure_next(Token::Inf, "'inf'")?;
                Atom::Token(String::from("-inf"))
            }
            Token::String(s) => Atom::String(unescape(s).into_owned()),
            Token::AssetRef(asset) => Atom::AssetPath(asset.to_string()),
            Token::PathRef(path) => Atom::Path(Path::new(path)?),
            Token::None => return Err(Self::unexpected(&token, "value")),
            other => match other.as_identifier() {
                Some(word) => Atom::Token(word.to_string()),
                None => return Err(Self::unexpected(&other, "value")),
            },
        };

        Ok(atom)
    }

    fn parse_typed_value(&mut self, type_name: &str) -> Result<Value> {
        if !self.ctx.values.setup_factory(type_name) {
            fail!(ErrorKind::InvalidValue, "Unrecognized value typename '{type_name}'");
        }

        self.parse_value()?;
        self.ctx.values.produce_value()
    }

    /// A typed value, or `None` for a value block.
    fn parse_typed_value_or_block(&mut self, type_name: &str) -> Result<Value> {
        if self.eat(&Token::None) {
            return Ok(Value::ValueBlock);
        }

        self.parse_typed_value(type_name)
    }

    /// `{ type key = value ... dictionary key = { ... } }`
    fn parse_dictionary(&mut self) -> Result<Dictionary> {
        self.ensure_pun('{')?;
        self.ctx.push(ParseState::Dictionary);

        let mut dictionary = Dictionary::new();
        loop {
            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(';') || self.eat_pun(',') {
                continue;
            }

            let token = self.fetch_next()?;

            if token == Token::Dictionary {
                let key = self.fetch_dictionary_key()?;
                self.ensure_pun('=')?;
                let nested = self.parse_dictionary()?;

                dictionary.insert(key, Value::Dictionary(nested));
                continue;
            }

            let Some(type_name) = token.as_identifier() else {
                return Err(Self::unexpected(&token, "value type name"));
            };

            let key = self.fetch_dictionary_key()?;
            self.ensure_pun('=')?;
            let value = self.parse_typed_value_or_block(type_name)?;

            dictionary.insert(key, value);
        }

        self.pop()?;
        Ok(dictionary)
    }

    /*
     * Prims
     */

    /// Parses a prim after its specifier.
    fn parse_prim(&mut self, specifier: Specifier) -> Result<()> {
        let type_name = match self.peek() {
            Some(Token::String(_)) => None,
            _ => Some(self.fetch_identifier()?),
        };

        let name = self.fetch_str()?;
        self.ctx.begin_prim(specifier, type_name, &name)?;

        if self.is_pun('(') {
            self.parse_metadata()?;
        }

        self.ensure_pun('{')?;
        self.parse_prim_contents()?;

        self.ctx.end_prim()
    }

    /// Statements of a prim or variant body, up to and including `}`.
    fn parse_prim_contents(&mut self) -> Result<()> {
        loop {
            self.ctx.begin_statement();

            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(';') {
                continue;
            }

            if let Some(specifier) = self.peek().and_then(Self::specifier) {
                self.pos += 1;
                self.parse_prim(specifier)?;
                continue;
            }

            match self.peek() {
                Some(Token::VariantSet) => self.parse_variant_set()?,
                Some(Token::Reorder) if matches!(self.peek_nth(1), Some(Token::NameChildren | Token::Properties)) => {
                    self.parse_reorder()?
                }
                _ => self.parse_property()?,
            }
        }

        Ok(())
    }

    /// `reorder nameChildren = [...]` or `reorder properties = [...]`
    fn parse_reorder(&mut self) -> Result<()> {
        self.ensure_next(Token::Reorder, "'reorder'")?;
        self.ctx.pop_speculative();

        let children = match self.fetch_next()? {
            Token::NameChildren => true,
            Token::Properties => false,
            other => return Err(Self::unexpected(&other, "'nameChildren' or 'properties'")),
        };

        self.ensure_pun('=')?;

        if children {
            self.ctx.push(ParseState::ReorderChildren);
            let names = self.parse_list(Self::fetch_str)?;
            self.ctx.set_prim_order(names)?;
        } else {
            self.ctx.push(ParseState::ReorderProperties);
            let names = self.parse_list(Self::fetch_str)?;
            self.ctx.set_property_order(names)?;
        }

        self.pop()
    }

    /// `variantSet "name" = { "variant" (metadata) { ... } ... }`
    fn parse_variant_set(&mut self) -> Result<()> {
        self.ensure_next(Token::VariantSet, "'variantSet'")?;

        let name = self.fetch_str()?;
        self.ctx.begin_variant_set(&name)?;

        self.ensure_pun('=')?;
        self.ensure_pun('{')?;

        loop {
            if self.eat_pun('}') {
                break;
            }

            let variant = self.fetch_str()?;
            self.ctx.begin_variant(&variant)?;

            if self.is_pun('(') {
                self.parse_metadata()?;
            }

            self.ensure_pun('{')?;
            self.parse_prim_contents()?;

            self.ctx.end_variant()?;
        }

        self.ctx.end_variant_set()
    }

    /*
     * Properties
     */

    /// `[listop] [custom] [uniform|config|varying] (rel name ... | type name ...)`
    fn parse_property(&mut self) -> Result<()> {
        let op = self.peek().and_then(Self::list_op_type);
        if op.is_some() {
            self.pos += 1;
        }

        let custom = self.eat(&Token::Custom);

        let variability = match self.peek() {
            Some(Token::Uniform | Token::Config) => Some(Variability::Uniform),
            Some(Token::Varying) => Some(Variability::Varying),
            _ => None,
        };
        if variability.is_some() {
            self.pos += 1;
        }

        if self.eat(&Token::Rel) {
            self.parse_relationship(op, custom, variability.unwrap_or(Variability::Uniform))
        } else {
            self.parse_attribute(op, custom, variability.unwrap_or(Variability::Varying))
        }
    }

    fn parse_attribute(&mut self, op: Option<ListOpType>, custom: bool, variability: Variability) -> Result<()> {
        let type_name = match self.fetch_next()? {
            Token::Identifier(type_name) => type_name,
            other => return Err(Self::unexpected(&other, "attribute type name")),
        };

        let name = self.fetch_identifier()?;
        self.ctx.begin_attribute(custom, variability, type_name, name)?;

        if self.eat_pun('.') {
            match self.fetch_next()? {
                Token::Connect => {
                    self.ensure_pun('=')?;
                    self.ctx.push(ParseState::ConnectAttribute);

                    let paths = self.parse_list(Self::fetch_path)?;
                    self.ctx.set_list_op_type(op.unwrap_or_default());
                    self.ctx.set_connections(paths)?;

                    self.pop()?;
                }
                Token::TimeSamples if op.is_none() => {
                    self.ensure_pun('=')?;
                    self.parse_time_samples(type_name)?;
                }
                Token::Spline if op.is_none() => {
                    self.ensure_pun('=')?;
                    self.parse_spline()?;
                }
                other => return Err(Self::unexpected(&other, "'connect'")),
            }
        } else {
            if let Some(op) = op {
                fail!(
                    ErrorKind::InvalidListEdit,
                    "Cannot {} attribute '{name}', only connections can be list edited",
                    op.to_string().to_lowercase()
                );
            }

            if self.eat_pun('=') {
                let value = self.parse_typed_value_or_block(type_name)?;
                self.ctx.set_default(value)?;
            }

            if self.is_pun('(') {
                self.parse_metadata()?;
            }
        }

        self.ctx.end_attribute()
    }

    /// `{ time: value, time: None, ... }`
    fn parse_time_samples(&mut self, type_name: &str) -> Result<()> {
        self.ensure_pun('{')?;
        self.ctx.begin_time_samples();

        loop {
            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(',') {
                continue;
            }

            let time = self.fetch_number()?;
            self.ensure_pun(':')?;
            let value = self.parse_typed_value_or_block(type_name)?;

            self.ctx.add_time_sample(time, value)?;
        }

        self.ctx.end_time_samples()
    }

    /// `{ bezier, pre: held, post: linear, 1: 5; post (0.5, 0), ... }`
    fn parse_spline(&mut self) -> Result<()> {
        self.ensure_pun('{')?;
        self.ctx.begin_spline();

        loop {
            if self.eat_pun('}') {
                break;
            }

            if self.eat_pun(',') {
                continue;
            }

            match self.fetch_next()? {
                Token::Number(time) => {
                    let time = time
                        .parse()
                        .map_err(|_| ParseError::new(ErrorKind::InvalidValue, format!("Invalid knot time '{time}'")))?;
                    self.ensure_pun(':')?;
                    let value = self.fetch_number()?;

                    let mut knot = Knot {
                        time,
                        value,
                        ..Default::default()
                    };

                    while self.eat_pun(';') {
                        let side = self.fetch_identifier()?;
                        let tangent = self.parse_tangent()?;

                        match side {
                            "pre" => knot.pre_tangent = Some(tangent),
                            "post" => knot.post_tangent = Some(tangent),
                            other => fail!(ErrorKind::InvalidValue, "Unknown tangent '{other}'"),
                        }
                    }

                    self.ctx.spline_mut()?.knots.push(knot);
                }
                Token::Identifier(word @ ("bezier" | "hermite")) => {
                    self.ctx.spline_mut()?.curve_type = Some(word.to_string());
                }
                Token::Identifier(side @ ("pre" | "post")) => {
                    self.ensure_pun(':')?;
                    let extrapolation = Some(self.fetch_identifier()?.to_string());

                    let spline = self.ctx.spline_mut()?;
                    if side == "pre" {
                        spline.pre_extrapolation = extrapolation;
                    } else {
                        spline.post_extrapolation = extrapolation;
                    }
                }
                other => return Err(Self::unexpected(&other, "spline item")),
            }
        }

        self.ctx.end_spline()
    }

    /// `(width, slope)`
    fn parse_tangent(&mut self) -> Result<(f64, f64)> {
        self.ensure_pun('(')?;
        let width = self.fetch_number()?;
        self.ensure_pun(',')?;
        let slope = self.fetch_number()?;
        self.ensure_pun(')')?;

        Ok((width, slope))
    }

    fn parse_relationship(&mut self, op: Option<ListOpType>, custom: bool, variability: Variability) -> Result<()> {
        let name = self.fetch_identifier()?;
        self.ctx.begin_relationship(custom, variability, name)?;

        if self.eat_pun('.') {
            self.ensure_next(Token::Default, "'default'")?;
            self.ensure_pun('=')?;

            self.ctx.push(ParseState::RelationshipDefault);
            let target = self.fetch_path()?;
            self.ctx.set_relationship_default(target)?;
            self.pop()?;
        } else {
            if self.eat_pun('=') {
                self.ctx.push(ParseState::RelationshipAssignment);

                self.ctx.push(ParseState::RelationshipTarget);
                let targets = self.parse_list(Self::fetch_path)?;
                self.pop()?;

                self.ctx.set_list_op_type(op.unwrap_or_default());
                self.ctx.set_relationship_targets(targets)?;

                self.pop()?;
            } else if op.is_some() {
                fail!(ErrorKind::InvalidListEdit, "List edit of relationship '{name}' has no targets");
            }

            if self.is_pun('(') {
                self.parse_metadata()?;
            }
        }

        self.ctx.end_relationship()
    }
}
