//! Host registrations: object types, global functions and properties, enums,
//! funcdefs, typedefs, the string factory and configuration groups.

use std::sync::Arc;

use crate::core::function::Function;
use crate::core::string_factory::StringFactory;
use crate::core::typeinfo::TypeInfo;
use crate::types::data_type::DataType;
use crate::types::global_slot::GlobalSlot;

/// A global property registered by the host.
#[derive(Clone)]
pub(crate) struct RegisteredProperty {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) data_type: DataType,
    pub(crate) is_const: bool,
    pub(crate) slot: Arc<GlobalSlot>,
    pub(crate) config_group: Option<String>,
    pub(crate) access_mask: u32,
}

impl RegisteredProperty {
    pub(crate) fn declaration(&self, include_namespace: bool) -> String {
        let mut decl = String::new();
        if self.is_const {
            decl.push_str("const ");
        }
        decl.push_str(&self.data_type.declaration(include_namespace));
        decl.push(' ');
        if include_namespace && !self.namespace.is_empty() {
            decl.push_str(&self.namespace);
            decl.push_str("::");
        }
        decl.push_str(&self.name);
        decl
    }
}

/// Entities removed together with a configuration group. Dropped by the
/// caller once the registry lock is released.
#[derive(Default)]
pub(crate) struct RemovedGroup {
    pub(crate) types: Vec<TypeInfo>,
    pub(crate) functions: Vec<Function>,
    pub(crate) properties: Vec<RegisteredProperty>,
}

pub(crate) struct Registry {
    /// Registered object types and interfaces, in registration order.
    pub(crate) types: Vec<TypeInfo>,
    pub(crate) enums: Vec<TypeInfo>,
    pub(crate) funcdefs: Vec<TypeInfo>,
    pub(crate) typedefs: Vec<TypeInfo>,
    pub(crate) functions: Vec<Function>,
    pub(crate) properties: Vec<RegisteredProperty>,
    pub(crate) string_factory: Option<Arc<dyn StringFactory>>,
    pub(crate) string_type: Option<TypeInfo>,
    pub(crate) config_groups: Vec<String>,
    pub(crate) current_group: Option<String>,
    pub(crate) default_namespace: String,
    pub(crate) default_access_mask: u32,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            types: Vec::new(),
            enums: Vec::new(),
            funcdefs: Vec::new(),
            typedefs: Vec::new(),
            functions: Vec::new(),
            properties: Vec::new(),
            string_factory: None,
            string_type: None,
            config_groups: Vec::new(),
            current_group: None,
            default_namespace: String::new(),
            default_access_mask: 0xFFFF_FFFF,
        }
    }

    /// Every named type of any kind.
    pub(crate) fn all_types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types
            .iter()
            .chain(&self.enums)
            .chain(&self.funcdefs)
            .chain(&self.typedefs)
    }

    /// Type named `name` in exactly `namespace`, visible to `access_mask`.
    pub(crate) fn find_type(&self, namespace: &str, name: &str, access_mask: u32) -> Option<TypeInfo> {
        self.all_types()
            .find(|t| {
                t.get_name() == name
                    && t.get_namespace() == namespace
                    && t.get_access_mask() & access_mask != 0
                    // child funcdefs are only reachable through their class
                    && t.get_parent_type().is_none()
            })
            .cloned()
    }

    pub(crate) fn has_name(&self, namespace: &str, name: &str) -> bool {
        self.all_types()
            .any(|t| t.get_name() == name && t.get_namespace() == namespace)
            || self
                .properties
                .iter()
                .any(|p| p.name == name && p.namespace == namespace)
    }

    pub(crate) fn find_functions(&self, namespace: &str, name: &str, access_mask: u32) -> Vec<Function> {
        self.functions
            .iter()
            .filter(|f| {
                f.get_name() == name
                    && f.get_namespace() == namespace
                    && f.get_access_mask() & access_mask != 0
            })
            .cloned()
            .collect()
    }


    pub(crate) fn current_group(&self) -> Option<String> {
        self.current_group.clone()
    }

    /// Take every entity registered in `group` out of the registry.
    pub(crate) fn remove_group(&mut self, group: &str) -> RemovedGroup {
        let in_group = |g: Option<&str>| g == Some(group);
        let mut removed = RemovedGroup::default();
        for list in [&mut self.types, &mut self.enums, &mut self.funcdefs, &mut self.typedefs] {
            let (taken, kept): (Vec<_>, Vec<_>) =
                std::mem::take(list).into_iter().partition(|t| in_group(t.get_config_group()));
            *list = kept;
            removed.types.extend(taken);
        }
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.functions)
            .into_iter()
            .partition(|f| in_group(f.get_config_group()));
        self.functions = kept;
        removed.functions = taken;
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.properties)
            .into_iter()
            .partition(|p| in_group(p.config_group.as_deref()));
        self.properties = kept;
        removed.properties = taken;
        self.config_groups.retain(|g| g != group);
        removed
    }

    /// Drop every reference cycle between registered types and functions.
    pub(crate) fn clear(&mut self) -> RemovedGroup {
        let mut removed = RemovedGroup::default();
        for ty in self.all_types() {
            ty.clear_details();
        }
        removed.types.extend(self.types.drain(..));
        removed.types.extend(self.enums.drain(..));
        removed.types.extend(self.funcdefs.drain(..));
        removed.types.extend(self.typedefs.drain(..));
        removed.functions.append(&mut self.functions);
        removed.properties.append(&mut self.properties);
        self.string_type = None;
        self.string_factory = None;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_core::PrimitiveKind;
    use crate::types::script_value::Value;

    fn property(name: &str, group: Option<&str>) -> RegisteredProperty {
        RegisteredProperty {
            name: name.into(),
            namespace: "game".into(),
            data_type: DataType::primitive(PrimitiveKind::Int32),
            is_const: true,
            slot: Arc::new(GlobalSlot::new(Value::Int32(0))),
            config_group: group.map(str::to_owned),
            access_mask: 2,
        }
    }

    #[test]
    fn removing_a_group_takes_only_its_members() {
        let mut registry = Registry::new();
        registry.config_groups.push("extra".into());
        registry.properties.push(property("a", Some("extra")));
        registry.properties.push(property("b", None));
        let removed = registry.remove_group("extra");
        assert_eq!(removed.properties.len(), 1);
        assert_eq!(registry.properties.len(), 1);
        assert!(registry.config_groups.is_empty());
    }

    #[test]
    fn declarations_include_const_and_namespace() {
        let prop = property("lives", None);
        assert_eq!(prop.declaration(false), "const int lives");
        assert_eq!(prop.declaration(true), "const int game::lives");
    }
}
