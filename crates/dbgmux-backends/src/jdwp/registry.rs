//! Class and method registry
//!
//! The VM reports code locations as (class ID, method ID, code index)
//! triples. Names, signatures, and source files arrive through separate
//! queries, so the registry accumulates them as they are learned and
//! resolves locations best-effort: an unknown ID simply renders as its
//! number.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct ClassInfo {
    signature: String,
    source_file: Option<String>,
    methods: HashMap<u64, String>,
}

#[derive(Debug, Default)]
pub struct ClassRegistry {
    by_id: HashMap<u64, ClassInfo>,
    id_by_name: HashMap<String, u64>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, id: u64, signature: impl Into<String>) {
        let signature = signature.into();
        self.id_by_name.insert(signature_to_name(&signature), id);
        let info = self.by_id.entry(id).or_default();
        info.signature = signature;
    }

    pub fn set_source_file(&mut self, class_id: u64, file: impl Into<String>) {
        self.by_id.entry(class_id).or_default().source_file = Some(file.into());
    }

    pub fn add_method(&mut self, class_id: u64, method_id: u64, name: impl Into<String>) {
        self.by_id
            .entry(class_id)
            .or_default()
            .methods
            .insert(method_id, name.into());
    }

    pub fn remove_class_by_signature(&mut self, signature: &str) -> bool {
        let name = signature_to_name(signature);
        match self.id_by_name.remove(&name) {
            Some(id) => self.by_id.remove(&id).is_some(),
            None => false,
        }
    }

    pub fn class_name(&self, id: u64) -> Option<String> {
        self.by_id
            .get(&id)
            .map(|info| signature_to_name(&info.signature))
    }

    pub fn class_id(&self, name: &str) -> Option<u64> {
        self.id_by_name.get(name).copied()
    }

    /// The source file for a class: the explicit one when known, otherwise
    /// derived from the class signature's resource path.
    pub fn class_source_file(&self, id: u64) -> Option<String> {
        let info = self.by_id.get(&id)?;
        if let Some(file) = &info.source_file {
            return Some(file.clone());
        }
        if info.signature.is_empty() {
            return None;
        }
        Some(format!(
            "{}.java",
            signature_to_resource_path(&info.signature)
        ))
    }

    pub fn method_name(&self, class_id: u64, method_id: u64) -> Option<String> {
        self.by_id.get(&class_id)?.methods.get(&method_id).cloned()
    }

    /// Best-effort display name for a (class, method) pair.
    pub fn qualified_method(&self, class_id: u64, method_id: u64) -> String {
        let class = self
            .class_name(class_id)
            .unwrap_or_else(|| format!("class#{}", class_id));
        let method = self
            .method_name(class_id, method_id)
            .unwrap_or_else(|| format!("method#{}", method_id));
        format!("{}.{}", class, method)
    }

    pub fn flush(&mut self) {
        self.by_id.clear();
        self.id_by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// `Lfoo/bar/Baz;` -> `foo.bar.Baz`
pub fn signature_to_name(signature: &str) -> String {
    signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature)
        .replace('/', ".")
}

/// `Lfoo/bar/Baz;` -> `foo/bar/Baz` (inner classes collapse to the outer
/// class, which owns the source file)
pub fn signature_to_resource_path(signature: &str) -> String {
    let path = signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature);
    match path.find('$') {
        Some(idx) => path[..idx].to_string(),
        None => path.to_string(),
    }
}

/// `foo.bar.Baz` -> `foo/bar/Baz`
pub fn name_to_resource_path(name: &str) -> String {
    signature_to_resource_path(&name.replace('.', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_conversions() {
        assert_eq!(signature_to_name("Lcom/acme/App;"), "com.acme.App");
        assert_eq!(signature_to_resource_path("Lcom/acme/App;"), "com/acme/App");
        assert_eq!(
            signature_to_resource_path("Lcom/acme/App$Inner;"),
            "com/acme/App"
        );
        assert_eq!(name_to_resource_path("com.acme.App$1"), "com/acme/App");
    }

    #[test]
    fn test_class_lookup_both_ways() {
        let mut reg = ClassRegistry::new();
        reg.add_class(100, "Lcom/acme/App;");
        assert_eq!(reg.class_name(100).as_deref(), Some("com.acme.App"));
        assert_eq!(reg.class_id("com.acme.App"), Some(100));
    }

    #[test]
    fn test_source_file_fallback() {
        let mut reg = ClassRegistry::new();
        reg.add_class(100, "Lcom/acme/App;");
        assert_eq!(
            reg.class_source_file(100).as_deref(),
            Some("com/acme/App.java")
        );

        reg.set_source_file(100, "App.java");
        assert_eq!(reg.class_source_file(100).as_deref(), Some("App.java"));
    }

    #[test]
    fn test_method_names() {
        let mut reg = ClassRegistry::new();
        reg.add_class(100, "Lcom/acme/App;");
        reg.add_method(100, 7, "main");
        assert_eq!(reg.qualified_method(100, 7), "com.acme.App.main");
        assert_eq!(reg.qualified_method(100, 8), "com.acme.App.method#8");
        assert_eq!(reg.qualified_method(200, 1), "class#200.method#1");
    }

    #[test]
    fn test_unload_by_signature() {
        let mut reg = ClassRegistry::new();
        reg.add_class(100, "Lcom/acme/App;");
        assert!(reg.remove_class_by_signature("Lcom/acme/App;"));
        assert!(!reg.remove_class_by_signature("Lcom/acme/App;"));
        assert!(reg.is_empty());
    }
}
