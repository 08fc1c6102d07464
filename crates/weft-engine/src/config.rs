//! Generator configuration

use weft_types::{well_known, TypeRef};

/// Configuration for a [`ModuleScope`](crate::ModuleScope)
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Assembly name generated types live in; modules list it in
    /// `internals_visible_to` to expose internal types (default: "weft.proxies")
    pub assembly_name: String,
    /// Prefix of generated type names (default: "weft.proxies")
    pub proxy_namespace: String,
    /// Attribute types never copied onto generated members
    /// (default: the type-identifier marker)
    pub default_attributes_to_avoid: Vec<TypeRef>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            assembly_name: "weft.proxies".to_string(),
            proxy_namespace: "weft.proxies".to_string(),
            default_attributes_to_avoid: vec![well_known::type_identifier()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denylist() {
        let config = GeneratorConfig::default();
        assert_eq!(config.default_attributes_to_avoid, vec![well_known::type_identifier()]);
    }

    #[test]
    fn test_field_update() {
        let config = GeneratorConfig {
            assembly_name: "custom".to_string(),
            ..Default::default()
        };
        assert_eq!(config.assembly_name, "custom");
        assert_eq!(config.proxy_namespace, "weft.proxies");
    }
}
