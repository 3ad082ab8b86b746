//! The element model of a data document.
//!
//! A document is a [`RootConfig`] owning an ordered list of [`Element`]s:
//!
//! ```xml
//! <data-config namespace="Shop">
//!   <entity class="Customer" ref="c1">
//!     <property name="Name">Alice</property>
//!   </entity>
//!   <sequence name="orders" min="1" max="3">
//!     <entity class="Order">
//!       <property name="Number">ORD-[$orders]-[#random####]</property>
//!       <property name="Customer" type="Reference">c1</property>
//!     </entity>
//!   </sequence>
//!   <load ref="admin">SELECT Object_Identity FROM Object WHERE Class = 'Shop.User'</load>
//! </data-config>
//! ```
//!
//! Parents are recorded as non-owning [`ElementLink`]s. Every element shares
//! the document's [`RootContext`], which is what type names resolve against.

use rand::Rng;

use std::fmt;
use std::sync::Arc;

use crate::datatype::{ResolutionContext, TypedValue, ValueKind, coerce};
use crate::document::{DocumentSource, Node};
use crate::error::{Result, SeedlingError};
use crate::model::{ClassDef, TypeInfo, TypeResolver, qualify};
use crate::template;

const UNNAMED_FOLDER: &str = "<unnamed>";
const DEFAULT_SEQUENCE_NAME: &str = "sequence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Root,
    Folder,
    Sequence,
    Entity,
    Property,
    Load,
}

impl ElementKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Root => "data-config",
            ElementKind::Folder => "folder",
            ElementKind::Sequence => "sequence",
            ElementKind::Entity => "entity",
            ElementKind::Property => "property",
            ElementKind::Load => "load",
        }
    }
    pub fn from_tag(tag: &str) -> Option<ElementKind> {
        [
            ElementKind::Root,
            ElementKind::Folder,
            ElementKind::Sequence,
            ElementKind::Entity,
            ElementKind::Property,
            ElementKind::Load,
        ]
        .into_iter()
        .find(|kind| kind.tag() == tag)
    }
}

/// Non-owning pointer to the parent of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementLink {
    pub kind: ElementKind,
    pub label: String,
}

/// Namespace, assembly and type resolver shared by a whole document.
pub struct RootContext {
    namespace: String,
    assembly: String,
    resolver: Arc<dyn TypeResolver>,
}

impl RootContext {
    pub fn new(
        namespace: impl Into<String>,
        assembly: impl Into<String>,
        resolver: Arc<dyn TypeResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            assembly: assembly.into(),
            resolver,
        })
    }
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn assembly(&self) -> &str {
        &self.assembly
    }
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }
    fn resolve(&self, name: &str) -> Option<(String, TypeInfo)> {
        let qualified = qualify(&self.namespace, name);
        if let Some(info) = self.resolver.resolve(&self.assembly, &qualified) {
            return Some((qualified, info));
        }
        // already qualified by the document
        self.resolver
            .resolve(&self.assembly, name)
            .map(|info| (name.to_string(), info))
    }
    /// Resolves an entity class, returning its fully qualified name.
    pub fn resolve_class(&self, name: &str) -> Option<(String, Arc<ClassDef>)> {
        match self.resolve(name) {
            Some((qualified, TypeInfo::Class(def))) => Some((qualified, def)),
            _ => None,
        }
    }
}
impl ResolutionContext for RootContext {
    fn resolve_type(&self, name: &str) -> Option<TypeInfo> {
        self.resolve(name).map(|(_, info)| info)
    }
}
impl PartialEq for RootContext {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.assembly == other.assembly
    }
}
impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("namespace", &self.namespace)
            .field("assembly", &self.assembly)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    root: Arc<RootContext>,
    parent: ElementLink,
    backup: Option<Node>,
}
impl Header {
    fn new(root: &Arc<RootContext>, parent: ElementLink) -> Self {
        Self {
            root: Arc::clone(root),
            parent,
            backup: None,
        }
    }
    fn detached(root: &Arc<RootContext>) -> Self {
        Self::new(root, root_link())
    }
}

fn root_link() -> ElementLink {
    ElementLink {
        kind: ElementKind::Root,
        label: ElementKind::Root.tag().to_string(),
    }
}

fn structure_error(message: impl Into<String>, node: &Node) -> SeedlingError {
    SeedlingError::DocumentStructure {
        message: message.into(),
        element: node.render(),
    }
}

fn required<'n>(node: &'n Node, attribute: &str) -> Result<&'n str> {
    match node.attribute(attribute) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(structure_error(
            format!("Missing required attribute '{attribute}' on <{}>", node.name),
            node,
        )),
    }
}

fn integer_attribute(node: &Node, attribute: &str) -> Result<Option<i64>> {
    node.attribute(attribute)
        .map(|raw| {
            raw.trim().parse().map_err(|_| SeedlingError::PropertyCoercion {
                value: raw.to_string(),
                kind: ValueKind::Int.type_name(),
                element: node.render(),
            })
        })
        .transpose()
}

fn bool_attribute(node: &Node, attribute: &str, default: bool) -> Result<bool> {
    match node.attribute(attribute) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(SeedlingError::PropertyCoercion {
                value: raw.to_string(),
                kind: ValueKind::Bool.type_name(),
                element: node.render(),
            }),
        },
    }
}

// ------------- Root -------------
#[derive(Debug)]
pub struct RootConfig {
    context: Arc<RootContext>,
    children: Vec<Element>,
}

impl RootConfig {
    pub fn new(
        namespace: impl Into<String>,
        assembly: impl Into<String>,
        resolver: Arc<dyn TypeResolver>,
    ) -> Self {
        Self {
            context: RootContext::new(namespace, assembly, resolver),
            children: Vec::new(),
        }
    }
    pub fn build(node: &Node, resolver: Arc<dyn TypeResolver>) -> Result<Self> {
        if ElementKind::from_tag(&node.name) != Some(ElementKind::Root) {
            return Err(structure_error(
                format!("The document root must be <{}>", ElementKind::Root.tag()),
                node,
            ));
        }
        // the context exists before any child is built
        let mut root = RootConfig::new(
            node.attribute("namespace").unwrap_or_default(),
            node.attribute("assembly").unwrap_or_default(),
            resolver,
        );
        let link = root.link();
        for child in &node.children {
            let element = Element::build(child, &root.context, &link)?;
            root.children.push(element);
        }
        Ok(root)
    }
    pub fn from_source(source: &dyn DocumentSource, resolver: Arc<dyn TypeResolver>) -> Result<Self> {
        RootConfig::build(&source.load()?, resolver)
    }
    /// The root is its own root.
    pub fn root(&self) -> &Arc<RootContext> {
        &self.context
    }
    /// The root is its own parent.
    pub fn parent(&self) -> ElementLink {
        self.link()
    }
    pub fn link(&self) -> ElementLink {
        root_link()
    }
    pub fn children(&self) -> &[Element] {
        &self.children
    }
    pub fn children_mut(&mut self) -> &mut [Element] {
        &mut self.children
    }
    pub fn push(&mut self, child: impl Into<Element>) -> &mut Self {
        let mut child = child.into();
        child.attach(&self.context, self.link());
        self.children.push(child);
        self
    }
    pub fn to_node(&self) -> Node {
        let mut node = Node::new(ElementKind::Root.tag());
        if !self.context.namespace.is_empty() {
            node = node.with_attribute("namespace", &self.context.namespace);
        }
        if !self.context.assembly.is_empty() {
            node = node.with_attribute("assembly", &self.context.assembly);
        }
        node.children = self.children.iter().map(Element::to_node).collect();
        node
    }
    pub fn render(&self) -> String {
        self.to_node().render()
    }
}
impl PartialEq for RootConfig {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && self.children == other.children
    }
}

// ------------- Element -------------
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Folder(Folder),
    Sequence(Sequence),
    Entity(Entity),
    Load(Load),
}

impl Element {
    /// Builds the element described by `node` and, recursively, its children.
    pub fn build(node: &Node, root: &Arc<RootContext>, parent: &ElementLink) -> Result<Element> {
        let header = Header::new(root, parent.clone());
        match ElementKind::from_tag(&node.name) {
            Some(ElementKind::Folder) => Ok(Element::Folder(Folder::build(node, header)?)),
            Some(ElementKind::Sequence) => Ok(Element::Sequence(Sequence::build(node, header)?)),
            Some(ElementKind::Entity) => Ok(Element::Entity(Entity::build(node, header)?)),
            Some(ElementKind::Load) => Ok(Element::Load(Load::build(node, header)?)),
            Some(kind) => Err(structure_error(
                format!("<{}> is not allowed inside <{}>", kind.tag(), parent.kind.tag()),
                node,
            )),
            None => Err(structure_error(format!("Unknown element <{}>", node.name), node)),
        }
    }
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Folder(_) => ElementKind::Folder,
            Element::Sequence(_) => ElementKind::Sequence,
            Element::Entity(_) => ElementKind::Entity,
            Element::Load(_) => ElementKind::Load,
        }
    }
    fn header(&self) -> &Header {
        match self {
            Element::Folder(e) => &e.header,
            Element::Sequence(e) => &e.header,
            Element::Entity(e) => &e.header,
            Element::Load(e) => &e.header,
        }
    }
    fn header_mut(&mut self) -> &mut Header {
        match self {
            Element::Folder(e) => &mut e.header,
            Element::Sequence(e) => &mut e.header,
            Element::Entity(e) => &mut e.header,
            Element::Load(e) => &mut e.header,
        }
    }
    pub fn root(&self) -> &Arc<RootContext> {
        &self.header().root
    }
    pub fn parent(&self) -> &ElementLink {
        &self.header().parent
    }
    pub fn link(&self) -> ElementLink {
        let label = match self {
            Element::Folder(e) => e.name.clone(),
            Element::Sequence(e) => e.name.clone(),
            Element::Entity(e) => e.label(),
            Element::Load(e) => e.reference.clone(),
        };
        ElementLink {
            kind: self.kind(),
            label,
        }
    }
    /// Sets the parent and pushes `root` down to every descendant.
    fn attach(&mut self, root: &Arc<RootContext>, parent: ElementLink) {
        {
            let header = self.header_mut();
            header.root = Arc::clone(root);
            header.parent = parent;
        }
        let link = self.link();
        let children = match self {
            Element::Folder(folder) => folder.children.as_mut_slice(),
            Element::Sequence(sequence) => sequence.instance.as_mut_slice(),
            _ => return,
        };
        for child in children {
            child.attach(root, link.clone());
        }
    }
    pub fn to_node(&self) -> Node {
        match self {
            Element::Folder(e) => e.to_node(),
            Element::Sequence(e) => e.to_node(),
            Element::Entity(e) => e.to_node(),
            Element::Load(e) => e.to_node(),
        }
    }
    /// Snapshots the serialized form of this element.
    pub fn backup(&mut self) {
        let node = self.to_node();
        self.header_mut().backup = Some(node);
    }
    /// Rebuilds this element from its last backup. The rebuilt element
    /// shares nothing with the element it replaces.
    pub fn restore(&mut self) -> Result<()> {
        let header = self.header().clone();
        let node = header
            .backup
            .ok_or_else(|| SeedlingError::Invariant("restore called without a backup".into()))?;
        let mut rebuilt = Element::build(&node, &header.root, &header.parent)?;
        rebuilt.header_mut().backup = Some(node);
        *self = rebuilt;
        Ok(())
    }
}
impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_node().render())
    }
}

macro_rules! element_from {
    ($($variant:ident),*) => {
        $(impl From<$variant> for Element {
            fn from(e: $variant) -> Self {
                Element::$variant(e)
            }
        })*
    };
}
element_from!(Folder, Sequence, Entity, Load);

// ------------- Folder -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    header: Header,
    name: String,
    children: Vec<Element>,
}

impl Folder {
    pub fn new(root: &Arc<RootContext>, name: impl Into<String>) -> Self {
        Self {
            header: Header::detached(root),
            name: name.into(),
            children: Vec::new(),
        }
    }
    fn build(node: &Node, header: Header) -> Result<Self> {
        let mut folder = Folder {
            header,
            name: node.attribute("name").unwrap_or(UNNAMED_FOLDER).to_string(),
            children: Vec::new(),
        };
        let link = ElementLink {
            kind: ElementKind::Folder,
            label: folder.name.clone(),
        };
        for child in &node.children {
            let element = Element::build(child, &folder.header.root, &link)?;
            folder.children.push(element);
        }
        Ok(folder)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn children(&self) -> &[Element] {
        &self.children
    }
    pub fn children_mut(&mut self) -> &mut [Element] {
        &mut self.children
    }
    pub fn push(&mut self, child: impl Into<Element>) -> &mut Self {
        let mut child = child.into();
        child.attach(
            &self.header.root,
            ElementLink {
                kind: ElementKind::Folder,
                label: self.name.clone(),
            },
        );
        self.children.push(child);
        self
    }
    fn to_node(&self) -> Node {
        let mut node = Node::new(ElementKind::Folder.tag()).with_attribute("name", &self.name);
        node.children = self.children.iter().map(Element::to_node).collect();
        node
    }
}

// ------------- Sequence -------------
#[derive(Debug, Clone)]
pub struct Sequence {
    header: Header,
    name: String,
    min: i64,
    max: i64,
    step: i64,
    progress: bool,
    /// Children as written, tokens untouched.
    template: Vec<Node>,
    // rendered template, the input of every substitution
    template_text: String,
    /// Children of the current iteration.
    instance: Vec<Element>,
}

impl Sequence {
    pub fn new(
        root: &Arc<RootContext>,
        name: impl Into<String>,
        min: i64,
        max: i64,
        step: i64,
    ) -> Result<Self> {
        let name = name.into();
        check_range(&name, min, max, step)?;
        let mut sequence = Sequence {
            header: Header::detached(root),
            name,
            min,
            max,
            step,
            progress: true,
            template: Vec::new(),
            template_text: String::new(),
            instance: Vec::new(),
        };
        sequence.refresh_template();
        Ok(sequence)
    }
    fn build(node: &Node, header: Header) -> Result<Self> {
        let name = node
            .attribute("name")
            .unwrap_or(DEFAULT_SEQUENCE_NAME)
            .to_string();
        let min = integer_attribute(node, "min")?.unwrap_or(0);
        let max = integer_attribute(node, "max")?.unwrap_or(min);
        let step = integer_attribute(node, "step")?.unwrap_or(1);
        check_range(&name, min, max, step)?;
        validate_template(&node.children, ElementKind::Sequence)?;
        let mut sequence = Sequence {
            header,
            name,
            min,
            max,
            step,
            progress: bool_attribute(node, "progress", true)?,
            template: node.children.clone(),
            template_text: String::new(),
            instance: Vec::new(),
        };
        sequence.refresh_template();
        Ok(sequence)
    }
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
    /// Appends the serialized form of `child` to the template.
    pub fn push_template(&mut self, child: impl Into<Element>) -> &mut Self {
        self.template.push(child.into().to_node());
        self.refresh_template();
        self
    }
    fn refresh_template(&mut self) {
        let mut wrapper = Node::new(ElementKind::Sequence.tag());
        wrapper.children = self.template.clone();
        self.template_text = wrapper.render();
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn min(&self) -> i64 {
        self.min
    }
    pub fn max(&self) -> i64 {
        self.max
    }
    pub fn step(&self) -> i64 {
        self.step
    }
    pub fn progress(&self) -> bool {
        self.progress
    }
    pub fn template(&self) -> &[Node] {
        &self.template
    }
    /// Counter values in iteration order.
    pub fn counters(&self) -> impl Iterator<Item = i64> + use<> {
        // step is validated positive on construction
        let step = usize::try_from(self.step).unwrap_or(1);
        (self.min..=self.max).step_by(step)
    }
    /// Discards the previous instance and rebuilds it from the template
    /// with every token substituted for `counter`.
    pub fn instantiate<R: Rng + ?Sized>(&mut self, counter: i64, rng: &mut R) -> Result<&mut [Element]> {
        self.instance.clear();
        let text = template::substitute(&self.template_text, &self.name, counter, rng)?;
        let substituted = Node::parse(&text)?;
        let link = ElementLink {
            kind: ElementKind::Sequence,
            label: self.name.clone(),
        };
        for child in &substituted.children {
            let element = Element::build(child, &self.header.root, &link)?;
            self.instance.push(element);
        }
        Ok(self.instance.as_mut_slice())
    }
    pub fn instance(&self) -> &[Element] {
        &self.instance
    }
    pub fn clear_instance(&mut self) {
        self.instance.clear();
    }
    fn to_node(&self) -> Node {
        let mut node = Node::new(ElementKind::Sequence.tag())
            .with_attribute("name", &self.name)
            .with_attribute("min", self.min.to_string())
            .with_attribute("max", self.max.to_string())
            .with_attribute("step", self.step.to_string());
        if !self.progress {
            node = node.with_attribute("progress", "false");
        }
        node.children = self.template.clone();
        node
    }
}
// the instance is transient and never part of a sequence's identity
impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.name == other.name
            && self.min == other.min
            && self.max == other.max
            && self.step == other.step
            && self.progress == other.progress
            && self.template == other.template
    }
}

fn check_range(name: &str, min: i64, max: i64, step: i64) -> Result<()> {
    if step <= 0 {
        return Err(SeedlingError::InvalidSequenceRange {
            sequence: name.to_string(),
            min,
            max,
            step,
        });
    }
    Ok(())
}

fn has_token(text: &str) -> bool {
    text.contains("[$") || text.contains("[#")
}

/// Checks the structure of a template without building it. Property values
/// may hold tokens, so coercion waits for each iteration; only attributes
/// free of tokens are checked here.
fn validate_template(nodes: &[Node], parent: ElementKind) -> Result<()> {
    for node in nodes {
        match ElementKind::from_tag(&node.name) {
            Some(ElementKind::Folder) => validate_template(&node.children, ElementKind::Folder)?,
            Some(ElementKind::Sequence) => {
                let range = ["min", "max", "step"].map(|name| node.attribute(name).unwrap_or_default());
                if !range.iter().any(|value| has_token(value)) {
                    let name = node.attribute("name").unwrap_or(DEFAULT_SEQUENCE_NAME);
                    let min = integer_attribute(node, "min")?.unwrap_or(0);
                    let max = integer_attribute(node, "max")?.unwrap_or(min);
                    let step = integer_attribute(node, "step")?.unwrap_or(1);
                    check_range(name, min, max, step)?;
                }
                validate_template(&node.children, ElementKind::Sequence)?
            }
            Some(ElementKind::Entity) => {
                required(node, "class")?;
                for child in &node.children {
                    validate_template_property(child)?;
                }
            }
            Some(ElementKind::Load) => {
                required(node, "ref")?;
                if !node.children.is_empty() {
                    return Err(structure_error("<load> holds its query as text only", node));
                }
            }
            Some(kind) => {
                return Err(structure_error(
                    format!("<{}> is not allowed inside <{}>", kind.tag(), parent.tag()),
                    node,
                ));
            }
            None => return Err(structure_error(format!("Unknown element <{}>", node.name), node)),
        }
    }
    Ok(())
}

fn validate_template_property(node: &Node) -> Result<()> {
    let name = if node.name == ElementKind::Property.tag() {
        required(node, "name")?
    } else {
        node.name.as_str()
    };
    if !node.children.is_empty() {
        return Err(structure_error(format!("Property '{name}' can not have child elements"), node));
    }
    if let Some(type_name) = node.attribute("type").filter(|t| !has_token(t)) {
        if ValueKind::from_type_name(type_name).is_none() {
            return Err(structure_error(format!("Unknown type '{type_name}' of property '{name}'"), node));
        }
    }
    Ok(())
}

// ------------- Entity -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    header: Header,
    class: String,
    reference: String,
    save: bool,
    properties: Vec<Property>,
}

impl Entity {
    pub fn new(root: &Arc<RootContext>, class: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            header: Header::detached(root),
            class: class.into(),
            reference: reference.into(),
            save: true,
            properties: Vec::new(),
        }
    }
    fn build(node: &Node, header: Header) -> Result<Self> {
        let mut entity = Entity {
            class: required(node, "class")?.to_string(),
            reference: node.attribute("ref").unwrap_or_default().to_string(),
            save: bool_attribute(node, "save", true)?,
            properties: Vec::new(),
            header,
        };
        let rendered = node.render();
        for child in &node.children {
            let property = Property::build(child, entity.header.root.as_ref(), &rendered)?;
            entity.properties.push(property);
        }
        Ok(entity)
    }
    pub fn with_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }
    pub fn add_property(&mut self, name: impl Into<String>, value: TypedValue) -> &mut Self {
        self.properties.push(Property::new(name, value));
        self
    }
    /// Adds a reference property, `raw` being `name` or `name.subproperty`.
    pub fn add_reference(&mut self, name: impl Into<String>, raw: impl Into<String>) -> &mut Self {
        self.properties
            .push(Property::new(name, TypedValue::Reference(raw.into())));
        self
    }
    pub fn class(&self) -> &str {
        &self.class
    }
    pub fn reference(&self) -> &str {
        &self.reference
    }
    pub fn save(&self) -> bool {
        self.save
    }
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
    pub fn root(&self) -> &Arc<RootContext> {
        &self.header.root
    }
    fn label(&self) -> String {
        if self.reference.is_empty() {
            self.class.clone()
        } else {
            format!("{} -> {}", self.class, self.reference)
        }
    }
    pub fn to_node(&self) -> Node {
        let mut node = Node::new(ElementKind::Entity.tag()).with_attribute("class", &self.class);
        if !self.reference.is_empty() {
            node = node.with_attribute("ref", &self.reference);
        }
        if !self.save {
            node = node.with_attribute("save", "false");
        }
        node.children = self.properties.iter().map(Property::to_node).collect();
        node
    }
    pub fn render(&self) -> String {
        self.to_node().render()
    }
}

// ------------- Property -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    raw: String,
    value: TypedValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            raw: value.to_raw(),
            value,
        }
    }
    /// Builds a property from `<property name="N" type="T">raw</property>`
    /// or the short form `<N type="T">raw</N>`.
    fn build(node: &Node, context: &RootContext, entity: &str) -> Result<Self> {
        let name = if node.name == ElementKind::Property.tag() {
            required(node, "name")?.to_string()
        } else {
            node.name.clone()
        };
        if !node.children.is_empty() {
            return Err(structure_error(format!("Property '{name}' can not have child elements"), node));
        }
        // type wins over enumtype
        let kind = match (node.attribute("type"), node.attribute("enumtype")) {
            (Some(type_name), _) => ValueKind::from_type_name(type_name).ok_or_else(|| {
                structure_error(format!("Unknown type '{type_name}' of property '{name}'"), node)
            })?,
            (None, Some(enum_type)) => ValueKind::Enum(enum_type.to_string()),
            (None, None) => ValueKind::String,
        };
        let value = coerce(&node.text, &kind, context, entity)?;
        Ok(Self {
            name,
            raw: node.text.clone(),
            value,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }
    pub fn raw(&self) -> &str {
        &self.raw
    }
    pub fn value(&self) -> &TypedValue {
        &self.value
    }
    fn to_node(&self) -> Node {
        let mut node = Node::new(ElementKind::Property.tag()).with_attribute("name", &self.name);
        match self.kind() {
            ValueKind::String => {}
            ValueKind::Enum(enum_type) => node = node.with_attribute("enumtype", enum_type),
            kind => node = node.with_attribute("type", kind.type_name()),
        }
        node.with_text(&self.raw)
    }
}

// ------------- Load -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    header: Header,
    reference: String,
    query: String,
}

impl Load {
    pub fn new(root: &Arc<RootContext>, reference: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            header: Header::detached(root),
            reference: reference.into(),
            query: query.into(),
        }
    }
    fn build(node: &Node, header: Header) -> Result<Self> {
        if !node.children.is_empty() {
            return Err(structure_error("<load> holds its query as text only", node));
        }
        Ok(Self {
            reference: required(node, "ref")?.to_string(),
            query: node.text.clone(),
            header,
        })
    }
    pub fn reference(&self) -> &str {
        &self.reference
    }
    pub fn query(&self) -> &str {
        &self.query
    }
    fn to_node(&self) -> Node {
        Node::new(ElementKind::Load.tag())
            .with_attribute("ref", &self.reference)
            .with_text(&self.query)
    }
}
