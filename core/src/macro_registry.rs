//! Macro definitions: CRUD with declared-field partial updates and
//! in-memory execution counters.

use std::collections::HashMap;

use prost_types::FieldMask;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::resource_name::macro_name;
use crate::util::now_timestamp;

use macos_use_proto::macosusesdk::v1::Macro;

/// The fields a client may write; everything else on the record is
/// server-owned.
const MUTABLE_PATHS: [&str; 5] = [
    "display_name",
    "description",
    "actions",
    "parameters",
    "tags",
];

#[derive(Default)]
pub struct MacroRegistry {
    macros: RwLock<HashMap<String, Macro>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the macro, minting an id when the request did not name one.
    pub async fn create(&self, mut definition: Macro) -> Result<Macro> {
        let id = if definition.name.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            crate::resource_name::parse_macro_name(&definition.name)?.id
        };
        definition.name = macro_name(&id);
        definition.create_time = Some(now_timestamp());
        definition.update_time = definition.create_time.clone();
        definition.execution_count = 0;

        self.macros.write().await.insert(id, definition.clone());
        Ok(definition)
    }

    pub async fn get(&self, id: &str) -> Result<Macro> {
        self.macros
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// All macros sorted by resource name ascending.
    pub async fn list(&self) -> Vec<Macro> {
        let mut macros: Vec<Macro> = self.macros.read().await.values().cloned().collect();
        macros.sort_by(|a, b| a.name.cmp(&b.name));
        macros
    }

    /// Applies an update (AIP-134): an empty mask replaces every mutable
    /// field with the request's values, clearing included; a non-empty mask
    /// patches only the listed paths and rejects unknown ones.
    pub async fn update(
        &self,
        id: &str,
        update: Macro,
        update_mask: Option<&FieldMask>,
    ) -> Result<Macro> {
        let mut macros = self.macros.write().await;
        let existing = macros.get_mut(id).ok_or_else(|| not_found(id))?;
        apply_update(existing, update, update_mask)?;
        existing.update_time = Some(now_timestamp());
        Ok(existing.clone())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.macros
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    pub async fn increment_execution_count(&self, id: &str) {
        if let Some(existing) = self.macros.write().await.get_mut(id) {
            existing.execution_count += 1;
        }
    }
}

fn apply_update(existing: &mut Macro, update: Macro, mask: Option<&FieldMask>) -> Result<()> {
    let paths: Vec<&str> = match mask {
        None => Vec::new(),
        Some(mask) => mask.paths.iter().map(String::as_str).collect(),
    };

    if paths.is_empty() {
        // Full replacement of the mutable surface.
        existing.display_name = update.display_name;
        existing.description = update.description;
        existing.actions = update.actions;
        existing.parameters = update.parameters;
        existing.tags = update.tags;
        return Ok(());
    }

    for path in &paths {
        if !MUTABLE_PATHS.contains(path) {
            return Err(AutomationError::invalid_argument_with(
                reason::INVALID_UPDATE_MASK_PATH,
                format!("unknown update_mask path {path:?}"),
                [("path", path.to_string())],
            ));
        }
    }
    for path in paths {
        match path {
            "display_name" => existing.display_name = update.display_name.clone(),
            "description" => existing.description = update.description.clone(),
            "actions" => existing.actions = update.actions.clone(),
            "parameters" => existing.parameters = update.parameters.clone(),
            "tags" => existing.tags = update.tags.clone(),
            _ => unreachable!("validated above"),
        }
    }
    Ok(())
}

fn not_found(id: &str) -> AutomationError {
    AutomationError::not_found(reason::MACRO_NOT_FOUND, "macro", macro_name(id))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use macos_use_proto::macosusesdk::v1::MacroParameter;

    fn definition(display_name: &str) -> Macro {
        Macro {
            display_name: display_name.to_string(),
            description: "original description".to_string(),
            tags: vec!["smoke".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_mints_an_id_when_absent() {
        let registry = MacroRegistry::new();
        let created = registry.create(definition("auto")).await.unwrap();
        assert!(created.name.starts_with("macros/"));
        assert!(created.create_time.is_some());

        let named = registry
            .create(Macro {
                name: "macros/fixed".to_string(),
                ..definition("fixed")
            })
            .await
            .unwrap();
        assert_eq!(named.name, "macros/fixed");
        assert_eq!(registry.get("fixed").await.unwrap().display_name, "fixed");
    }

    #[tokio::test]
    async fn empty_mask_replaces_and_clears() {
        let registry = MacroRegistry::new();
        registry
            .create(Macro {
                name: "macros/m".to_string(),
                ..definition("before")
            })
            .await
            .unwrap();

        let updated = registry
            .update(
                "m",
                Macro {
                    display_name: "after".to_string(),
                    // description and tags intentionally default: full
                    // replacement clears them.
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.display_name, "after");
        assert_eq!(updated.description, "");
        assert!(updated.tags.is_empty());
    }

    #[tokio::test]
    async fn masked_update_touches_only_listed_paths() {
        let registry = MacroRegistry::new();
        registry
            .create(Macro {
                name: "macros/m".to_string(),
                ..definition("before")
            })
            .await
            .unwrap();

        let mask = FieldMask {
            paths: vec!["display_name".to_string()],
        };
        let updated = registry
            .update(
                "m",
                Macro {
                    display_name: "after".to_string(),
                    description: "should not apply".to_string(),
                    ..Default::default()
                },
                Some(&mask),
            )
            .await
            .unwrap();

        assert_eq!(updated.display_name, "after");
        assert_eq!(updated.description, "original description");
        assert_eq!(updated.tags, vec!["smoke".to_string()]);
    }

    #[tokio::test]
    async fn unknown_mask_path_fails_without_mutating() {
        let registry = MacroRegistry::new();
        registry
            .create(Macro {
                name: "macros/m".to_string(),
                ..definition("before")
            })
            .await
            .unwrap();

        let mask = FieldMask {
            paths: vec!["display_name".to_string(), "execution_count".to_string()],
        };
        let err = registry
            .update(
                "m",
                Macro {
                    display_name: "after".to_string(),
                    ..Default::default()
                },
                Some(&mask),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::INVALID_UPDATE_MASK_PATH);
        assert_eq!(registry.get("m").await.unwrap().display_name, "before");
    }

    #[tokio::test]
    async fn execution_count_accumulates_and_survives_updates() {
        let registry = MacroRegistry::new();
        registry
            .create(Macro {
                name: "macros/m".to_string(),
                parameters: vec![MacroParameter {
                    name: "p".to_string(),
                    required: false,
                    default_value: "d".to_string(),
                    description: String::new(),
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        registry.increment_execution_count("m").await;
        registry.increment_execution_count("m").await;
        assert_eq!(registry.get("m").await.unwrap().execution_count, 2);

        registry
            .update("m", Macro::default(), None)
            .await
            .unwrap();
        assert_eq!(registry.get("m").await.unwrap().execution_count, 2);
    }
}
