//! Structured document model and the in-place edits the cleaner applies.
//!
//! Documents serialize to JSON; that serialized form is what the scanner
//! searches for asset ids. Every edit here is structural, so a textual match
//! that does not correspond to a real reference results in zero edits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AssetId, DocumentCategory};

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Named property slots of a component or record.
pub type Fields = BTreeMap<String, FieldValue>;

/// A property value. `Reference` is the only variant that can point at
/// another asset; `List` and `Struct` nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Empty,
    Reference(AssetId),
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    Struct(Fields),
}

impl FieldValue {
    /// Replace every reference to `target` with `Empty`. Returns the number
    /// of slots changed.
    pub fn clear_references_to(&mut self, target: &AssetId) -> usize {
        match self {
            Self::Reference(id) if id == target => {
                *self = Self::Empty;
                1
            }
            Self::List(items) => items
                .iter_mut()
                .map(|item| item.clear_references_to(target))
                .sum(),
            Self::Struct(fields) => clear_field_references(fields, target),
            _ => 0,
        }
    }

    /// Whether this value, or anything nested in it, references `target`.
    pub fn references(&self, target: &AssetId) -> bool {
        match self {
            Self::Reference(id) => id == target,
            Self::List(items) => items.iter().any(|item| item.references(target)),
            Self::Struct(fields) => fields.values().any(|value| value.references(target)),
            _ => false,
        }
    }
}

/// Clear references to `target` across a whole field map.
pub fn clear_field_references(fields: &mut Fields, target: &AssetId) -> usize {
    fields
        .values_mut()
        .map(|value| value.clear_references_to(target))
        .sum()
}

// ---------------------------------------------------------------------------
// Object tree
// ---------------------------------------------------------------------------

/// A typed attachment on an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Declared class of the component.
    pub type_name: String,
    /// Id of the type asset that defines `type_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<AssetId>,
    #[serde(default)]
    pub fields: Fields,
}

impl Component {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            script: None,
            fields: Fields::new(),
        }
    }

    pub fn with_script(mut self, script: AssetId) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A live object: components plus children, optionally instantiated from a
/// template asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    /// Template this object was instantiated from. `None` for plain objects
    /// and for objects that were unpacked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefab_source: Option<AssetId>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefab_source: None,
            components: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    pub fn instance_of(mut self, source: AssetId) -> Self {
        self.prefab_source = Some(source);
        self
    }

    /// Destroy every component declared as `class_name` in this subtree.
    ///
    /// Children are processed before their parent and each object's
    /// components are removed last-to-first, so no container is destroyed
    /// while it still holds something of the class.
    pub fn remove_components_of_type(&mut self, class_name: &str) -> usize {
        let mut removed: usize = self
            .children
            .iter_mut()
            .map(|child| child.remove_components_of_type(class_name))
            .sum();

        for index in (0..self.components.len()).rev() {
            if self.components[index].type_name == class_name {
                self.components.remove(index);
                removed += 1;
            }
        }
        removed
    }

    /// Null every reference field pointing at `target` in this subtree.
    pub fn clear_references_to(&mut self, target: &AssetId) -> usize {
        let own: usize = self
            .components
            .iter_mut()
            .map(|component| clear_field_references(&mut component.fields, target))
            .sum();
        own + self
            .children
            .iter_mut()
            .map(|child| child.clear_references_to(target))
            .sum::<usize>()
    }

    /// Detach every instance of `source` in this subtree from its template.
    ///
    /// A matching object is unpacked completely: it and all its descendants
    /// lose their instance links, including links to other templates nested
    /// inside it. Returns the number of matching instances.
    pub fn unpack_instances_of(&mut self, source: &AssetId) -> usize {
        if self.prefab_source.as_ref() == Some(source) {
            self.unpack_completely();
            return 1;
        }
        self.children
            .iter_mut()
            .map(|child| child.unpack_instances_of(source))
            .sum()
    }

    fn unpack_completely(&mut self) {
        self.prefab_source = None;
        for child in &mut self.children {
            child.unpack_completely();
        }
    }

    /// Visit every component in this subtree, own components before
    /// children.
    pub fn for_each_component<'a>(
        &'a self,
        visit: &mut impl FnMut(&'a SceneObject, &'a Component),
    ) {
        for component in &self.components {
            visit(self, component);
        }
        for child in &self.children {
            child.for_each_component(visit);
        }
    }

    pub fn count_components_of_type(&self, class_name: &str) -> usize {
        let mut count = 0;
        self.for_each_component(&mut |_, component| {
            if component.type_name == class_name {
                count += 1;
            }
        });
        count
    }

    /// Whether any object in this subtree is still an instance of `source`.
    pub fn has_instance_of(&self, source: &AssetId) -> bool {
        self.prefab_source.as_ref() == Some(source)
            || self.children.iter().any(|child| child.has_instance_of(source))
    }

    /// Whether any field in this subtree references `target`.
    pub fn references(&self, target: &AssetId) -> bool {
        self.components
            .iter()
            .any(|component| component.fields.values().any(|v| v.references(target)))
            || self.children.iter().any(|child| child.references(target))
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// A reusable object tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub root: SceneObject,
}

/// A single structured object with a declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<AssetId>,
    #[serde(default)]
    pub fields: Fields,
}

/// A container of live objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeDocument {
    #[serde(default)]
    pub roots: Vec<SceneObject>,
}

impl CompositeDocument {
    pub fn remove_components_of_type(&mut self, class_name: &str) -> usize {
        self.roots
            .iter_mut()
            .map(|root| root.remove_components_of_type(class_name))
            .sum()
    }

    pub fn clear_references_to(&mut self, target: &AssetId) -> usize {
        self.roots
            .iter_mut()
            .map(|root| root.clear_references_to(target))
            .sum()
    }

    pub fn unpack_instances_of(&mut self, source: &AssetId) -> usize {
        self.roots
            .iter_mut()
            .map(|root| root.unpack_instances_of(source))
            .sum()
    }

    pub fn count_components_of_type(&self, class_name: &str) -> usize {
        self.roots
            .iter()
            .map(|root| root.count_components_of_type(class_name))
            .sum()
    }
}

/// Any document in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Document {
    Template(TemplateDocument),
    Record(RecordDocument),
    Composite(CompositeDocument),
}

impl Document {
    pub fn category(&self) -> DocumentCategory {
        match self {
            Self::Template(_) => DocumentCategory::Template,
            Self::Record(_) => DocumentCategory::Record,
            Self::Composite(_) => DocumentCategory::Composite,
        }
    }

    /// Serialized form, as stored and as searched by the scanner.
    pub fn to_raw_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_raw_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AssetId {
        AssetId::new(s)
    }

    #[test]
    fn clear_references_walks_nested_values() {
        let mut value = FieldValue::Struct(Fields::from([
            ("direct".to_string(), FieldValue::Reference(id("a1"))),
            (
                "list".to_string(),
                FieldValue::List(vec![
                    FieldValue::Reference(id("a1")),
                    FieldValue::Reference(id("b2")),
                    FieldValue::List(vec![FieldValue::Reference(id("a1"))]),
                ]),
            ),
            ("text".to_string(), FieldValue::Text("a1".into())),
        ]));

        assert_eq!(value.clear_references_to(&id("a1")), 3);
        assert!(!value.references(&id("a1")));
        assert!(value.references(&id("b2")));
        // Plain text that happens to equal the id is not a reference.
        assert_eq!(value.clear_references_to(&id("a1")), 0);
    }

    #[test]
    fn remove_components_processes_children_first() {
        let mut root = SceneObject::new("root")
            .with_component(Component::new("Health"))
            .with_component(Component::new("Mover"))
            .with_child(
                SceneObject::new("child")
                    .with_component(Component::new("Health"))
                    .with_child(
                        SceneObject::new("grandchild").with_component(Component::new("Health")),
                    ),
            );

        assert_eq!(root.remove_components_of_type("Health"), 3);
        assert_eq!(root.count_components_of_type("Health"), 0);
        assert_eq!(root.components.len(), 1);
        assert_eq!(root.components[0].type_name, "Mover");
    }

    #[test]
    fn unpack_detaches_whole_subtree() {
        let mut root = SceneObject::new("orc")
            .instance_of(id("orc"))
            .with_child(SceneObject::new("sword").instance_of(id("sword")));
        let mut other = SceneObject::new("elf").instance_of(id("elf"));

        assert_eq!(root.unpack_instances_of(&id("orc")), 1);
        assert_eq!(root.prefab_source, None);
        assert_eq!(root.children[0].prefab_source, None);

        assert_eq!(other.unpack_instances_of(&id("orc")), 0);
        assert_eq!(other.prefab_source, Some(id("elf")));
    }

    #[test]
    fn unpack_finds_nested_instances() {
        let mut scene = CompositeDocument {
            roots: vec![SceneObject::new("level")
                .with_child(SceneObject::new("orc-1").instance_of(id("orc")))
                .with_child(SceneObject::new("orc-2").instance_of(id("orc")))],
        };
        assert_eq!(scene.unpack_instances_of(&id("orc")), 2);
        assert!(!scene.roots[0].has_instance_of(&id("orc")));
    }

    #[test]
    fn raw_text_contains_referenced_ids() {
        let doc = Document::Record(RecordDocument {
            type_name: "LootTable".into(),
            script: Some(id("script-7")),
            fields: Fields::from([("drop".to_string(), FieldValue::Reference(id("gem-42")))]),
        });
        let text = doc.to_raw_text().unwrap();
        assert!(text.contains("gem-42"));
        assert!(text.contains("script-7"));
        assert_eq!(Document::from_raw_text(&text).unwrap(), doc);
    }
}
