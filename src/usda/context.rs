//! Parser state machine.
//!
//! [ParserContext] owns everything a single parse mutates: the state stack,
//! the current scene path, the value context and the output [Data]. The
//! parser driver consumes tokens and calls the productions below, each of
//! which validates its input and commits fields into the store.

use std::fmt::Debug;

use strum::{Display, EnumIs};
use tracing::{debug, error, trace, warn};

use crate::sdf::{
    schema::{ChildrenKey, FieldKey, FieldType, ListOpItem},
    Data, Dictionary, Elements, LayerOffset, ListOp, ListOpType, Path, Payload, Permission, Reference, Schema,
    SpecType, Specifier, Spline, TimeSampleMap, UnregisteredValue, Value, Variability,
};

use super::{
    error::{coding_error, fail, ErrorKind, ParseError, Result},
    value::ValueContext,
};

/// Facts about a layer that let callers skip expensive scans.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayerHints {
    /// The layer authored `relocates` somewhere.
    pub may_have_relocates: bool,
}

/// One entry of the parser state stack.
#[derive(Debug, Clone, PartialEq, Display, EnumIs)]
pub enum ParseState {
    Layer,
    Prim,
    /// Pushed speculatively when a prim body statement starts, a property
    /// declaration makes it concrete.
    Attribute {
        speculative: bool,
    },
    /// Target specs created by this statement, added to `targetChildren`
    /// when the relationship ends.
    Relationship {
        new_targets: Vec<Path>,
    },
    Metadata,
    KeyValueMetadata,
    ListOpMetadata,
    Dictionary,
    ConnectAttribute,
    RelationshipAssignment,
    RelationshipTarget,
    RelationshipDefault,
    TimeSamples(TimeSampleMap),
    Spline(Spline),
    VariantSetStatement,
    VariantStatementList,
    ReorderChildren,
    ReorderProperties,
    InheritsOrSpecializes,
    References,
    Payload,
    Relocates,
    SubLayer,
    VariantSets,
    Variants,
}

/// How the value of a `key = value` metadata statement is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// Registered field holding a value of this type.
    Typed(&'static str),
    Dictionary,
    /// Registered list-op field, items are parsed as an array.
    ListOp(ListOpItem),
    /// Unknown field, kept as text (or as a dictionary).
    Unregistered,
}

pub struct ParserContext<'s> {
    schema: &'s Schema,
    data: Data,
    states: Vec<ParseState>,
    paths: Vec<Path>,
    root: Path,
    /// Typed value being parsed.
    pub values: ValueContext<'s>,
    /// Semantic of the list statement being parsed, reset after every commit.
    list_op: ListOpType,
    hints: LayerHints,
}

impl<'s> ParserContext<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            data: Data::new(),
            states: Vec::new(),
            paths: Vec::new(),
            root: Path::abs_root(),
            values: ValueContext::new(schema.value_types()),
            list_op: ListOpType::Explicit,
            hints: LayerHints::default(),
        }
    }

    #[inline]
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    #[inline]
    pub fn data(&self) -> &Data {
        &self.data
    }

    #[inline]
    pub fn hints(&self) -> LayerHints {
        self.hints
    }

    pub fn into_parts(self) -> (Data, LayerHints) {
        (self.data, self.hints)
    }

    /// Scene path statements currently apply to.
    pub fn path(&self) -> &Path {
        self.paths.last().unwrap_or(&self.root)
    }

    #[inline]
    pub fn state(&self) -> Option<&ParseState> {
        self.states.last()
    }

    #[inline]
    pub fn states(&self) -> &[ParseState] {
        &self.states
    }

    pub fn push(&mut self, state: ParseState) {
        trace!(depth = self.states.len(), "push {state}");
        self.states.push(state);
    }

    pub fn pop(&mut self) -> Result<ParseState> {
        let Some(state) = self.states.pop() else {
            coding_error!("Pop on empty parse state stack");
        };

        trace!(depth = self.states.len(), "pop {state}");
        Ok(state)
    }

    /// Pops the top state, which must satisfy `expected`.
    fn pop_expect(&mut self, expected: fn(&ParseState) -> bool, what: &str) -> Result<ParseState> {
        match self.states.last() {
            Some(state) if expected(state) => self.pop(),
            other => coding_error!("Expected {what} state on top of stack, got {other:?}"),
        }
    }

    fn pop_path(&mut self) -> Result<Path> {
        let Some(path) = self.paths.pop() else {
            coding_error!("Pop on empty path stack");
        };
        Ok(path)
    }

    pub fn set_list_op_type(&mut self, op: ListOpType) {
        self.list_op = op;
    }

    #[inline]
    pub fn list_op_type(&self) -> ListOpType {
        self.list_op
    }

    fn take_list_op_type(&mut self) -> ListOpType {
        std::mem::take(&mut self.list_op)
    }

    /// Logs `err`. Errors raised while a value is recorded as text are
    /// expected to be retried, so they only go to debug output.
    pub fn report(&self, err: &ParseError) {
        if self.values.is_recording_string() {
            debug!(kind = %err.kind, "{err}");
        } else {
            error!(kind = %err.kind, "{err}");
        }
    }

    /// Spec type metadata statements currently apply to.
    pub fn metadata_spec_type(&self) -> Result<SpecType> {
        for state in self.states.iter().rev() {
            let ty = match state {
                ParseState::Layer => SpecType::PseudoRoot,
                ParseState::Prim => SpecType::Prim,
                ParseState::VariantStatementList => SpecType::Variant,
                ParseState::Attribute { speculative: false } => SpecType::Attribute,
                ParseState::Relationship { .. } => SpecType::Relationship,
                _ => continue,
            };
            return Ok(ty);
        }

        coding_error!("Metadata outside of any spec")
    }

    /// Prim path used to anchor relative paths, without variant selections.
    fn anchor(&self) -> Path {
        self.path().prim_path().strip_variant_selections()
    }

    fn set_field(&mut self, path: &Path, field: &str, value: Value) -> Result<()> {
        debug!(%path, field, "set field");

        if let Err(err) = self.data.set(path, field, value) {
            coding_error!("{err}");
        }

        Ok(())
    }

    fn set_current(&mut self, field: FieldKey, value: Value) -> Result<()> {
        let path = self.path().clone();
        self.set_field(&path, field.as_str(), value)
    }

    fn create_spec(&mut self, path: &Path, ty: SpecType) -> bool {
        let created = self.data.create_spec(path.clone(), ty);
        if created {
            debug!(%path, %ty, "create spec");
        }
        created
    }

    /// Appends `name` to a token children list unless already present.
    fn append_child_name(&mut self, parent: &Path, key: ChildrenKey, name: &str) -> Result<()> {
        match self.data.field_mut(parent, key.as_str()) {
            Some(Value::TokenVec(names)) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                Ok(())
            }
            Some(other) => coding_error!("Children list '{}' holds {other:?}", key.as_str()),
            None => self.set_field(parent, key.as_str(), Value::TokenVec(vec![name.to_string()])),
        }
    }

    /// Appends `child` to a path children list unless already present.
    fn append_child_path(&mut self, parent: &Path, key: ChildrenKey, child: &Path) -> Result<()> {
        match self.data.field_mut(parent, key.as_str()) {
            Some(Value::PathVec(paths)) => {
                if !paths.contains(child) {
                    paths.push(child.clone());
                }
                Ok(())
            }
            Some(other) => coding_error!("Children list '{}' holds {other:?}", key.as_str()),
            None => self.set_field(parent, key.as_str(), Value::PathVec(vec![child.clone()])),
        }
    }

    /// Reads the list op stored in `field`, overwrites the `op` bucket with
    /// `items` and writes it back.
    fn merge_list_op<T: Clone + PartialEq + Debug>(
        &mut self,
        field: FieldKey,
        items: Vec<T>,
        op: ListOpType,
        get: impl Fn(&Value) -> Option<&ListOp<T>>,
        wrap: impl Fn(ListOp<T>) -> Value,
    ) -> Result<()> {
        let path = self.path().clone();
        self.merge_list_op_at(&path, field.as_str(), items, op, get, wrap)
    }

    fn merge_list_op_at<T: Clone + PartialEq + Debug>(
        &mut self,
        path: &Path,
        field: &str,
        items: Vec<T>,
        op: ListOpType,
        get: impl Fn(&Value) -> Option<&ListOp<T>>,
        wrap: impl Fn(ListOp<T>) -> Value,
    ) -> Result<()> {
        let mut list_op = self.data.field(path, field).and_then(get).cloned().unwrap_or_default();

        list_op.set_items(items, op).map_err(|err| {
            ParseError::new(
                ErrorKind::InvalidListEdit,
                format!("Duplicate items exist for field '{field}' at <{path}>: {err}"),
            )
        })?;

        self.set_field(path, field, wrap(list_op))
    }

    /// `None` or `[]` only make sense as an explicit value.
    fn check_list_edit(what: &str, is_empty: bool, op: ListOpType) -> Result<()> {
        if is_empty && op != ListOpType::Explicit {
            fail!(
                ErrorKind::InvalidListEdit,
                "Setting {what} to None (or an empty list) is only allowed when setting explicit {what}, not for list editing"
            );
        }
        Ok(())
    }

    fn require_metadata(&self, key: FieldKey) -> Result<()> {
        let spec_type = self.metadata_spec_type()?;
        if self.schema.metadata_field(key.as_str(), spec_type).is_none() {
            fail!(
                ErrorKind::InvalidValue,
                "'{}' is not valid metadata for {} specs",
                key.as_str(),
                spec_type
            );
        }
        Ok(())
    }

    fn require_prim(&self, what: &str) -> Result<()> {
        match self.metadata_spec_type()? {
            SpecType::Prim | SpecType::Variant => Ok(()),
            other => fail!(ErrorKind::InvalidValue, "'{what}' is only valid on prims, not {other} specs"),
        }
    }

    /*
     * Layer
     */

    pub fn begin_layer(&mut self) -> Result<()> {
        if !self.states.is_empty() {
            coding_error!("Layer must be the outermost state");
        }

        let root = Path::abs_root();
        self.create_spec(&root, SpecType::PseudoRoot);
        self.paths.push(root);
        self.push(ParseState::Layer);

        Ok(())
    }

    pub fn end_layer(&mut self) -> Result<()> {
        self.pop_expect(ParseState::is_layer, "layer")?;
        self.pop_path()?;

        if !self.states.is_empty() || !self.paths.is_empty() {
            coding_error!("Unbalanced parse state after layer: {:?}", self.states);
        }

        Ok(())
    }

    /// `subLayers = [@a.usda@ (offset = 1; scale = 2), ...]`
    pub fn set_sub_layers(&mut self, layers: Vec<(String, LayerOffset)>) -> Result<()> {
        if self.metadata_spec_type()? != SpecType::PseudoRoot {
            fail!(ErrorKind::InvalidValue, "'subLayers' is only valid in layer metadata");
        }

        let (paths, offsets): (Vec<_>, Vec<_>) = layers.into_iter().unzip();

        self.set_current(FieldKey::SubLayers, Value::StringVec(paths))?;
        self.set_current(FieldKey::SubLayerOffsets, Value::LayerOffsets(offsets))
    }

    /*
     * Prims
     */

    /// Makes the speculative attribute state concrete for statements that
    /// are not attribute declarations.
    pub fn begin_statement(&mut self) {
        if matches!(self.state(), Some(ParseState::Prim | ParseState::VariantStatementList)) {
            self.push(ParseState::Attribute { speculative: true });
        }
    }

    /// Drops the speculative attribute state, if any.
    pub fn pop_speculative(&mut self) {
        if matches!(self.state(), Some(ParseState::Attribute { speculative: true })) {
            self.states.pop();
            trace!(depth = self.states.len(), "pop speculative attribute");
        }
    }

    pub fn begin_prim(&mut self, specifier: Specifier, type_name: Option<&str>, name: &str) -> Result<()> {
        self.pop_speculative();

        if !Path::is_valid_identifier(name) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid prim name");
        }

        let parent = self.path().clone();
        let path = parent.append_child(name)?;

        if !self.create_spec(&path, SpecType::Prim) {
            fail!(ErrorKind::DuplicateSpec, "Duplicate prim '{name}' at <{path}>");
        }

        self.append_child_name(&parent, ChildrenKey::PrimChildren, name)?;
        self.set_field(&path, FieldKey::Specifier.as_str(), Value::Specifier(specifier))?;

        if let Some(type_name) = type_name {
            self.set_field(&path, FieldKey::TypeName.as_str(), Value::Token(type_name.to_string()))?;
        }

        self.paths.push(path);
        self.push(ParseState::Prim);

        Ok(())
    }

    pub fn end_prim(&mut self) -> Result<()> {
        self.pop_speculative();
        self.pop_expect(ParseState::is_prim, "prim")?;
        self.pop_path()?;

        Ok(())
    }

    /// `reorder nameChildren = [...]`, or `reorder rootPrims` in the layer.
    pub fn set_prim_order(&mut self, names: Vec<String>) -> Result<()> {
        if let Some(name) = names.iter().find(|name| !Path::is_valid_identifier(name)) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid prim name");
        }

        self.set_current(FieldKey::PrimOrder, Value::TokenVec(names))
    }

    /// `reorder properties = [...]`
    pub fn set_property_order(&mut self, names: Vec<String>) -> Result<()> {
        if let Some(name) = names.iter().find(|name| !Path::is_valid_namespaced_identifier(name)) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid property name");
        }

        self.set_current(FieldKey::PropertyOrder, Value::TokenVec(names))
    }

    /*
     * Variant sets
     */

    pub fn begin_variant_set(&mut self, name: &str) -> Result<()> {
        self.pop_speculative();

        if !Path::is_valid_variant_identifier(name) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid variant set name");
        }

        let prim = self.path().clone();
        let path = prim.append_variant_selection(name, "")?;

        self.create_spec(&path, SpecType::VariantSet);
        self.append_child_name(&prim, ChildrenKey::VariantSetChildren, name)?;

        self.paths.push(path);
        self.push(ParseState::VariantSetStatement);

        Ok(())
    }

    pub fn begin_variant(&mut self, name: &str) -> Result<()> {
        if !self.state().map_or(false, ParseState::is_variant_set_statement) {
            coding_error!("Variant outside of a variant set statement");
        }

        if !Path::is_valid_variant_identifier(name) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid variant name");
        }

        let set_path = self.path().clone();
        let Some((set, _)) = set_path.variant_selection() else {
            coding_error!("<{set_path}> is not a variant set path");
        };

        let path = set_path.parent().append_variant_selection(set, name)?;

        self.create_spec(&path, SpecType::Variant);
        self.append_child_name(&set_path, ChildrenKey::VariantChildren, name)?;

        self.paths.push(path);
        self.push(ParseState::VariantStatementList);

        Ok(())
    }

    pub fn end_variant(&mut self) -> Result<()> {
        self.pop_speculative();
        self.pop_expect(ParseState::is_variant_statement_list, "variant")?;
        self.pop_path()?;

        Ok(())
    }

    pub fn end_variant_set(&mut self) -> Result<()> {
        self.pop_expect(ParseState::is_variant_set_statement, "variant set")?;
        self.pop_path()?;

        Ok(())
    }

    /*
     * Properties
     */

    /// Property path for `name`, checking that an existing spec is a `ty`.
    fn property_path(&mut self, name: &str, ty: SpecType, what: &str) -> Result<(Path, bool)> {
        if !Path::is_valid_namespaced_identifier(name) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid {what} name");
        }

        let prim = self.path().clone();
        let path = prim.append_property(name)?;

        match self.data.spec(&path).map(|spec| spec.ty) {
            None => {
                self.create_spec(&path, ty);
                self.append_child_name(&prim, ChildrenKey::PropertyChildren, name)?;
                Ok((path, true))
            }
            Some(existing) if existing == ty => Ok((path, false)),
            Some(existing) => fail!(
                ErrorKind::DuplicateSpec,
                "Property '{name}' is already declared as {existing}, cannot redeclare as {ty}"
            ),
        }
    }

    /// Declares (or re-opens) an attribute. Redeclaring with a different type
    /// or variability is an error.
    pub fn begin_attribute(
        &mut self,
        custom: bool,
        variability: Variability,
        type_name: &str,
        name: &str,
    ) -> Result<()> {
        if !self.schema.value_types().contains(type_name) {
            fail!(ErrorKind::InvalidValue, "Unrecognized value typename '{type_name}'");
        }

        let (path, created) = self.property_path(name, SpecType::Attribute, "attribute")?;

        if created {
            self.set_field(&path, FieldKey::Custom.as_str(), Value::Bool(false))?;
        }

        if custom {
            self.set_field(&path, FieldKey::Custom.as_str(), Value::Bool(true))?;
        }

        match self.data.field(&path, FieldKey::TypeName.as_str()).cloned() {
            Some(Value::Token(old)) if old != type_name => fail!(
                ErrorKind::TypeMismatch,
                "attribute '{name}' already has type '{old}', cannot change to '{type_name}'"
            ),
            Some(_) => {}
            None => self.set_field(&path, FieldKey::TypeName.as_str(), Value::Token(type_name.to_string()))?,
        }

        match self.data.field(&path, FieldKey::Variability.as_str()).cloned() {
            Some(Value::Variability(old)) if old != variability => fail!(
                ErrorKind::TypeMismatch,
                "attribute '{name}' already has variability '{old}', cannot change to '{variability}'"
            ),
            Some(_) => {}
            None => self.set_field(&path, FieldKey::Variability.as_str(), Value::Variability(variability))?,
        }

        self.paths.push(path);

        match self.states.last_mut() {
            Some(ParseState::Attribute { speculative }) if *speculative => {
                *speculative = false;
                trace!(depth = self.states.len(), "attribute declared");
            }
            _ => self.push(ParseState::Attribute { speculative: false }),
        }

        Ok(())
    }

    pub fn end_attribute(&mut self) -> Result<()> {
        self.pop_expect(|state| matches!(state, ParseState::Attribute { speculative: false }), "attribute")?;
        self.pop_path()?;

        Ok(())
    }

    /// Default value, [Value::ValueBlock] for `None`.
    pub fn set_default(&mut self, value: Value) -> Result<()> {
        self.set_current(FieldKey::Default, value)
    }

    /// `.connect = ...` on the current attribute.
    pub fn set_connections(&mut self, paths: Vec<Path>) -> Result<()> {
        let op = self.take_list_op_type();
        Self::check_list_edit("connection paths", paths.is_empty(), op)?;

        let attr = self.path().clone();
        let anchor = self.anchor();

        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            let mut target = path.make_absolute(&anchor)?;

            if target.contains_variant_selection() {
                let stripped = target.strip_variant_selections();
                warn!(
                    "Connection path <{target}> has a variant selection, which is not meaningful in connection paths, using <{stripped}> instead"
                );
                target = stripped;
            }

            if !(target.is_prim_path() || target.is_property_path()) {
                fail!(
                    ErrorKind::InvalidPathReference,
                    "<{target}> is not a valid connection path"
                );
            }

            targets.push(target);
        }

        if matches!(op, ListOpType::Added | ListOpType::Explicit) {
            for target in &targets {
                let child = attr.append_target(target)?;
                self.create_spec(&child, SpecType::Connection);
                self.append_child_path(&attr, ChildrenKey::ConnectionChildren, target)?;
            }
        }

        self.merge_list_op(
            FieldKey::ConnectionPaths,
            targets,
            op,
            Value::try_as_path_list_op_ref,
            Value::PathListOp,
        )
    }

    pub fn begin_time_samples(&mut self) {
        self.push(ParseState::TimeSamples(TimeSampleMap::new()));
    }

    pub fn add_time_sample(&mut self, time: f64, value: Value) -> Result<()> {
        let Some(ParseState::TimeSamples(samples)) = self.states.last_mut() else {
            coding_error!("Time sample outside of a time samples block");
        };

        samples.insert(time, value);
        Ok(())
    }

    pub fn end_time_samples(&mut self) -> Result<()> {
        let ParseState::TimeSamples(samples) = self.pop_expect(ParseState::is_time_samples, "time samples")? else {
            coding_error!("Time samples state lost its payload");
        };

        self.set_current(FieldKey::TimeSamples, Value::TimeSamples(samples))
    }

    pub fn begin_spline(&mut self) {
        self.push(ParseState::Spline(Spline::default()));
    }

    /// Mutable access to the spline being parsed.
    pub fn spline_mut(&mut self) -> Result<&mut Spline> {
        match self.states.last_mut() {
            Some(ParseState::Spline(spline)) => Ok(spline),
            _ => coding_error!("Spline item outside of a spline block"),
        }
    }

    pub fn end_spline(&mut self) -> Result<()> {
        let ParseState::Spline(spline) = self.pop_expect(ParseState::is_spline, "spline")? else {
            coding_error!("Spline state lost its payload");
        };

        self.set_current(FieldKey::Spline, Value::Spline(spline))
    }

    pub fn begin_relationship(&mut self, custom: bool, variability: Variability, name: &str) -> Result<()> {
        self.pop_speculative();

        let (path, _) = self.property_path(name, SpecType::Relationship, "relationship")?;

        self.set_field(&path, FieldKey::Variability.as_str(), Value::Variability(variability))?;
        if custom {
            self.set_field(&path, FieldKey::Custom.as_str(), Value::Bool(true))?;
        }

        self.paths.push(path);
        self.push(ParseState::Relationship { new_targets: Vec::new() });

        Ok(())
    }

    /// `rel x = <a>`, `rel x = [<a>, <b>]` or `rel x = None`.
    pub fn set_relationship_targets(&mut self, paths: Vec<Path>) -> Result<()> {
        let op = self.take_list_op_type();
        Self::check_list_edit("relationship targets", paths.is_empty(), op)?;

        let rel = self.path().clone();
        let anchor = self.anchor();

        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            let target = path.make_absolute(&anchor)?;

            if !(target.is_prim_path() || target.is_property_path()) || target.contains_variant_selection() {
                fail!(
                    ErrorKind::InvalidPathReference,
                    "<{target}> is not a valid relationship target path"
                );
            }

            targets.push(target);
        }

        if matches!(op, ListOpType::Added | ListOpType::Explicit) {
            for target in &targets {
                let child = rel.append_target(target)?;
                if self.create_spec(&child, SpecType::RelationshipTarget) {
                    let Some(new_targets) = self.states.iter_mut().rev().find_map(|state| match state {
                        ParseState::Relationship { new_targets } => Some(new_targets),
                        _ => None,
                    }) else {
                        coding_error!("Relationship targets outside of a relationship");
                    };
                    new_targets.push(target.clone());
                }
            }
        }

        self.merge_list_op(
            FieldKey::TargetPaths,
            targets,
            op,
            Value::try_as_path_list_op_ref,
            Value::PathListOp,
        )
    }

    /// `rel x.default = <a>`
    pub fn set_relationship_default(&mut self, target: Path) -> Result<()> {
        let target = target.make_absolute(&self.anchor())?;
        self.set_current(FieldKey::Default, Value::Path(target))
    }

    pub fn end_relationship(&mut self) -> Result<()> {
        let ParseState::Relationship { new_targets } = self.pop_expect(ParseState::is_relationship, "relationship")?
        else {
            coding_error!("Relationship state lost its payload");
        };

        let rel = self.pop_path()?;
        for target in &new_targets {
            self.append_child_path(&rel, ChildrenKey::RelationshipTargetChildren, target)?;
        }

        Ok(())
    }

    /*
     * Metadata
     */

    pub fn set_comment(&mut self, comment: String) -> Result<()> {
        self.set_current(FieldKey::Comment, Value::String(comment))
    }

    pub fn set_documentation(&mut self, doc: String) -> Result<()> {
        self.set_current(FieldKey::Documentation, Value::String(doc))
    }

    pub fn set_kind(&mut self, kind: String) -> Result<()> {
        self.require_metadata(FieldKey::Kind)?;
        self.set_current(FieldKey::Kind, Value::Token(kind))
    }

    pub fn set_permission(&mut self, permission: &str) -> Result<()> {
        self.require_metadata(FieldKey::Permission)?;

        let Ok(permission) = permission.parse::<Permission>() else {
            fail!(ErrorKind::InvalidValue, "'{permission}' is not a valid permission constant");
        };

        self.set_current(FieldKey::Permission, Value::Permission(permission))
    }

    /// `symmetryFunction = name`, an empty name clears the function.
    pub fn set_symmetry_function(&mut self, name: Option<&str>) -> Result<()> {
        self.require_metadata(FieldKey::SymmetryFunction)?;
        self.set_current(
            FieldKey::SymmetryFunction,
            Value::Token(name.unwrap_or_default().to_string()),
        )
    }

    pub fn set_display_unit(&mut self, unit: &str) -> Result<()> {
        self.require_metadata(FieldKey::DisplayUnit)?;

        if !Path::is_valid_identifier(unit) {
            fail!(ErrorKind::InvalidValue, "'{unit}' is not a valid display unit");
        }

        self.set_current(FieldKey::DisplayUnit, Value::Token(unit.to_string()))
    }

    /// `prefixSubstitutions` / `suffixSubstitutions`.
    pub fn set_substitutions(&mut self, key: FieldKey, substitutions: Dictionary) -> Result<()> {
        self.require_metadata(key)?;
        self.set_current(key, Value::Dictionary(substitutions))
    }

    /// Decides how the value of `key = value` metadata is parsed.
    pub fn metadata_kind(&self, key: &str) -> Result<MetadataKind> {
        let spec_type = self.metadata_spec_type()?;

        if let Some(field) = self.schema.metadata_field(key, spec_type) {
            let kind = match field.ty {
                FieldType::Value(type_name) => MetadataKind::Typed(type_name),
                FieldType::Dictionary => MetadataKind::Dictionary,
                FieldType::ListOp(item) => MetadataKind::ListOp(item),
                FieldType::Builtin => fail!(ErrorKind::InvalidValue, "'{key}' cannot be authored as generic metadata"),
            };
            return Ok(kind);
        }

        match self.schema.field(key) {
            Some(field) if field.metadata_for.is_empty() => {
                fail!(ErrorKind::InvalidValue, "\"{key}\" is registered as a non-metadata field")
            }
            // Metadata of other spec types passes through like unknown fields.
            _ => Ok(MetadataKind::Unregistered),
        }
    }

    /// Commits a registered, non list-op metadata value.
    pub fn set_metadata(&mut self, key: &str, value: Value) -> Result<()> {
        let op = self.take_list_op_type();

        match self.metadata_kind(key)? {
            MetadataKind::Typed(_) | MetadataKind::Dictionary if op == ListOpType::Explicit => {
                let path = self.path().clone();
                self.set_field(&path, key, value)
            }
            MetadataKind::Typed(_) | MetadataKind::Dictionary => {
                fail!(ErrorKind::InvalidListEdit, "'{key}' is not a list-op field")
            }
            other => coding_error!("set_metadata called for {other:?} field '{key}'"),
        }
    }

    /// Commits items parsed as an array into a list-op metadata field.
    pub fn set_list_op_metadata(&mut self, key: &str, items: Value) -> Result<()> {
        let op = self.take_list_op_type();
        let path = self.path().clone();

        let MetadataKind::ListOp(item) = self.metadata_kind(key)? else {
            coding_error!("'{key}' is not a list-op field");
        };

        let elements = match items {
            Value::Array(array) => array.elements,
            Value::ValueBlock => {
                Self::check_list_edit(key, true, op)?;
                match item {
                    ListOpItem::Int => Elements::Int(Vec::new()),
                    ListOpItem::Int64 => Elements::Int64(Vec::new()),
                    ListOpItem::Uint => Elements::Uint(Vec::new()),
                    ListOpItem::Uint64 => Elements::Uint64(Vec::new()),
                    ListOpItem::String => Elements::String(Vec::new()),
                    ListOpItem::Token => Elements::Token(Vec::new()),
                }
            }
            other => fail!(ErrorKind::InvalidValue, "invalid value for field \"{key}\": {other:?}"),
        };

        match (item, elements) {
            (ListOpItem::Int, Elements::Int(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_int_list_op_ref, Value::IntListOp)
            }
            (ListOpItem::Int64, Elements::Int64(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_int_64_list_op_ref, Value::Int64ListOp)
            }
            (ListOpItem::Uint, Elements::Uint(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_uint_list_op_ref, Value::UintListOp)
            }
            (ListOpItem::Uint64, Elements::Uint64(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_uint_64_list_op_ref, Value::Uint64ListOp)
            }
            (ListOpItem::String, Elements::String(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_string_list_op_ref, Value::StringListOp)
            }
            (ListOpItem::Token, Elements::Token(v)) => {
                self.merge_list_op_at(&path, key, v, op, Value::try_as_token_list_op_ref, Value::TokenListOp)
            }
            (item, elements) => {
                coding_error!("List-op item type {item:?} does not match parsed {elements:?}")
            }
        }
    }

    /// Commits metadata that is not registered for the current spec type.
    ///
    /// Explicit values are kept as recorded text. List edits become a list op
    /// of recorded text, unless a plain value is already stored.
    pub fn set_unregistered_metadata(&mut self, key: &str, value: UnregisteredValue) -> Result<()> {
        let op = self.take_list_op_type();
        let path = self.path().clone();

        let value = match value {
            UnregisteredValue::String(text) if op != ListOpType::Explicit => {
                let mut list_op = match self.data.field(&path, key) {
                    None => ListOp::default(),
                    Some(Value::Unregistered(UnregisteredValue::ListOp(list_op))) => list_op.clone(),
                    // Keep the value that was authored first.
                    Some(_) => return Ok(()),
                };

                let items = if text == "None" {
                    Vec::new()
                } else {
                    let text = text.strip_prefix('[').unwrap_or(&text);
                    let text = text.strip_suffix(']').unwrap_or(text);
                    vec![text.to_string()]
                };

                list_op.set_items(items, op)?;
                UnregisteredValue::ListOp(list_op)
            }
            other => other,
        };

        self.set_field(&path, key, Value::Unregistered(value))
    }

    /*
     * Composition arcs
     */

    fn arc_paths(&self, what: &str, paths: Vec<Path>) -> Result<Vec<Path>> {
        let anchor = self.anchor();

        paths
            .into_iter()
            .map(|path| -> Result<Path> {
                let path = path.make_absolute(&anchor)?;
                if !path.is_prim_path() || path.contains_variant_selection() {
                    fail!(ErrorKind::InvalidPathReference, "<{path}> is not a valid {what} path");
                }
                Ok(path)
            })
            .collect()
    }

    pub fn set_inherits(&mut self, paths: Vec<Path>) -> Result<()> {
        self.require_prim("inherits")?;

        let op = self.take_list_op_type();
        Self::check_list_edit("inherit paths", paths.is_empty(), op)?;

        let paths = self.arc_paths("inherit", paths)?;
        self.merge_list_op(
            FieldKey::InheritPaths,
            paths,
            op,
            Value::try_as_path_list_op_ref,
            Value::PathListOp,
        )
    }

    pub fn set_specializes(&mut self, paths: Vec<Path>) -> Result<()> {
        self.require_prim("specializes")?;

        let op = self.take_list_op_type();
        Self::check_list_edit("specializes paths", paths.is_empty(), op)?;

        let paths = self.arc_paths("specializes", paths)?;
        self.merge_list_op(
            FieldKey::Specializes,
            paths,
            op,
            Value::try_as_path_list_op_ref,
            Value::PathListOp,
        )
    }

    fn check_arc_target(what: &str, path: &Path) -> Result<()> {
        if !(path.is_empty() || path.is_prim_path()) || path.contains_variant_selection() {
            fail!(ErrorKind::InvalidPathReference, "<{path}> is not a valid {what} target");
        }
        Ok(())
    }

    pub fn set_references(&mut self, references: Vec<Reference>) -> Result<()> {
        self.require_prim("references")?;

        let op = self.take_list_op_type();
        Self::check_list_edit("references", references.is_empty(), op)?;

        for reference in &references {
            Self::check_arc_target("reference", &reference.prim_path)?;
        }

        self.merge_list_op(
            FieldKey::References,
            references,
            op,
            Value::try_as_reference_list_op_ref,
            Value::ReferenceListOp,
        )
    }

    pub fn set_payloads(&mut self, payloads: Vec<Payload>) -> Result<()> {
        self.require_prim("payload")?;

        let op = self.take_list_op_type();
        Self::check_list_edit("payload", payloads.is_empty(), op)?;

        for payload in &payloads {
            Self::check_arc_target("payload", &payload.prim_path)?;
        }

        self.merge_list_op(
            FieldKey::Payload,
            payloads,
            op,
            Value::try_as_payload_list_op_ref,
            Value::PayloadListOp,
        )
    }

    /// `variantSets = [...]`. Added and explicit names also create the
    /// variant set specs.
    pub fn set_variant_set_names(&mut self, names: Vec<String>) -> Result<()> {
        self.require_prim("variantSets")?;

        let op = self.take_list_op_type();

        if let Some(name) = names.iter().find(|name| !Path::is_valid_variant_identifier(name)) {
            fail!(ErrorKind::InvalidIdentifier, "'{name}' is not a valid variant set name");
        }

        self.merge_list_op(
            FieldKey::VariantSetNames,
            names.clone(),
            op,
            Value::try_as_string_list_op_ref,
            Value::StringListOp,
        )?;

        if matches!(op, ListOpType::Added | ListOpType::Explicit) {
            let prim = self.path().clone();
            for name in &names {
                let path = prim.append_variant_selection(name, "")?;
                self.create_spec(&path, SpecType::VariantSet);
                self.append_child_name(&prim, ChildrenKey::VariantSetChildren, name)?;
            }
        }

        Ok(())
    }

    /// `variants = { string set = "variant" }`, merged with earlier
    /// selections on the same prim.
    pub fn set_variant_selection(&mut self, selections: Dictionary) -> Result<()> {
        self.require_prim("variants")?;

        let path = self.path().clone();
        let mut map = match self.data.field(&path, FieldKey::VariantSelection.as_str()) {
            Some(Value::VariantSelection(map)) => map.clone(),
            _ => Default::default(),
        };

        for (set, variant) in selections {
            let Value::String(variant) = variant else {
                fail!(ErrorKind::TypeMismatch, "variant name must be a string");
            };

            if !variant.is_empty() && !Path::is_valid_variant_identifier(&variant) {
                fail!(ErrorKind::InvalidIdentifier, "'{variant}' is not a valid variant name");
            }

            map.insert(set, variant);
        }

        self.set_field(&path, FieldKey::VariantSelection.as_str(), Value::VariantSelection(map))
    }

    /// `relocates = { <src>: <dst> }`. Stored as `layerRelocates` in layer
    /// metadata.
    pub fn set_relocates(&mut self, relocates: Vec<(Path, Path)>) -> Result<()> {
        let spec_type = self.metadata_spec_type()?;
        let anchor = self.anchor();

        let relocates = relocates
            .into_iter()
            .map(|(source, target)| -> Result<(Path, Path)> {
                for path in [&source, &target] {
                    if !path.is_prim_path() {
                        fail!(ErrorKind::InvalidPathReference, "<{path}> is not a valid prim path");
                    }
                }
                Ok((source.make_absolute(&anchor)?, target.make_absolute(&anchor)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let key = match spec_type {
            SpecType::PseudoRoot => FieldKey::LayerRelocates,
            SpecType::Prim | SpecType::Variant => FieldKey::Relocates,
            other => fail!(ErrorKind::InvalidValue, "'relocates' is not valid on {other} specs"),
        };

        self.hints.may_have_relocates = true;
        self.set_current(key, Value::Relocates(relocates))
    }
}
