//! # Catalog Tables
//!
//! Data sources, entity classes, entity types and stand-alone elements.

use crate::allocator::IdAllocator;
use crate::cascade::{Cascade, Deletion};
use crate::primitives::{DEFAULT_ENTITY_CLASS, PROTECTED_DATA_SOURCES, RESERVED_ID_THRESHOLD};
use crate::request::{
    DataSourceSpec, ElementSpec, EntityClassSpec, EntityTypeSpec, optional_code, require_code,
};
use crate::store::ConfigStore;
use crate::types::{CfgError, DataSource, DataType, EntityClass, EntityType, Flag, RefKind, RowId};
use serde::Serialize;
use tracing::info;

/// Default `RETENTION_LEVEL` of a new data source.
const DEFAULT_RETENTION: &str = "Remember";

/// An entity type joined with its class code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeView {
    pub id: RowId,
    pub code: String,
    pub class: Option<String>,
}

impl ConfigStore {
    // =========================================================================
    // DATA SOURCES
    // =========================================================================

    pub fn add_data_source(&mut self, spec: &DataSourceSpec) -> Result<RowId, CfgError> {
        let code = require_code("data source", &spec.code)?;
        let id = IdAllocator::claim(
            &self.data_sources,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;

        self.data_sources.push(DataSource {
            id,
            code: code.clone(),
            desc: code.clone(),
            reliability: 1,
            retention: DEFAULT_RETENTION.to_string(),
            conversational: Flag::No,
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "data source", code = %code, id = %id, "row added");
        Ok(id)
    }

    /// `SEARCH` is protected.
    pub fn delete_data_source(&mut self, code: &str) -> Result<Deletion, CfgError> {
        let code = require_code("data source", code)?;
        if PROTECTED_DATA_SOURCES.contains(&code.as_str()) {
            return Err(CfgError::ProtectedEntity {
                table: "data source",
                code,
            });
        }
        let id = self.data_sources.require(&code)?.id;

        let deletion = Cascade::new(self)
            .step("data source", |s| s.data_sources.remove_where(|d| d.id == id))
            .finish();
        info!(table = "data source", code = %code, "row deleted");
        Ok(deletion)
    }

    // =========================================================================
    // ENTITY CLASSES AND TYPES
    // =========================================================================

    pub fn add_entity_class(&mut self, spec: &EntityClassSpec) -> Result<RowId, CfgError> {
        let code = require_code("entity class", &spec.code)?;
        let id = IdAllocator::claim(
            &self.entity_classes,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;

        self.entity_classes.push(EntityClass {
            id,
            code: code.clone(),
            desc: code.clone(),
            resolve: spec.resolve.unwrap_or(Flag::Yes),
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "entity class", code = %code, id = %id, "row added");
        Ok(id)
    }

    /// Refused while an entity type belongs to the class.
    pub fn delete_entity_class(&mut self, code: &str) -> Result<Deletion, CfgError> {
        let code = require_code("entity class", code)?;
        let id = self.entity_classes.require(&code)?.id;
        let used_by: Vec<String> = self
            .entity_types
            .filter(|t| t.class_id == id)
            .map(|t| t.code.clone())
            .collect();
        if !used_by.is_empty() {
            return Err(CfgError::InUse { code, used_by });
        }

        let deletion = Cascade::new(self)
            .step("entity class", |s| s.entity_classes.remove_where(|c| c.id == id))
            .finish();
        info!(table = "entity class", code = %code, "row deleted");
        Ok(deletion)
    }

    pub fn add_entity_type(&mut self, spec: &EntityTypeSpec) -> Result<RowId, CfgError> {
        let code = require_code("entity type", &spec.code)?;
        let id = IdAllocator::claim(
            &self.entity_types,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;
        let class_code =
            optional_code(spec.class.as_ref()).unwrap_or_else(|| DEFAULT_ENTITY_CLASS.to_string());
        let class_id = self
            .entity_classes
            .resolve(RefKind::EntityClass, &class_code)?
            .id;

        self.entity_types.push(EntityType {
            id,
            code: code.clone(),
            desc: code.clone(),
            class_id,
            extra: Default::default(),
        });
        self.mark_updated();
        info!(table = "entity type", code = %code, id = %id, class = %class_code, "row added");
        Ok(id)
    }

    /// Delete an entity type and the feature links it carries.
    pub fn delete_entity_type(&mut self, code: &str) -> Result<Deletion, CfgError> {
        let code = require_code("entity type", code)?;
        let id = self.entity_types.require(&code)?.id;

        let deletion = Cascade::new(self)
            .step("entity feature", |s| {
                s.entity_features.remove_where(|link| link.entity_type_id == id)
            })
            .step("entity type", |s| s.entity_types.remove_where(|t| t.id == id))
            .finish();
        info!(table = "entity type", code = %code, rows = deletion.total(), "row deleted");
        Ok(deletion)
    }

    /// Entity types sorted by id, with their class codes.
    #[must_use]
    pub fn list_entity_types(&self) -> Vec<EntityTypeView> {
        self.entity_types
            .sorted_by_id()
            .into_iter()
            .map(|t| EntityTypeView {
                id: t.id,
                code: t.code.clone(),
                class: self
                    .entity_classes
                    .by_id(t.class_id)
                    .map(|c| c.code.clone()),
            })
            .collect()
    }

    // =========================================================================
    // ELEMENTS
    // =========================================================================

    /// Create an element that no feature uses yet.
    pub fn add_element(&mut self, spec: &ElementSpec) -> Result<RowId, CfgError> {
        let code = require_code("element", &spec.code)?;
        let id = IdAllocator::claim(
            &self.elements,
            Some(&code),
            spec.id.map(RowId),
            RESERVED_ID_THRESHOLD,
        )?;
        let data_type = optional_code(spec.datatype.as_ref())
            .map(|dt| dt.parse::<DataType>())
            .transpose()?
            .unwrap_or_default();

        self.insert_element(&code, id, data_type, spec.tokenize.unwrap_or_default());
        self.mark_updated();
        info!(table = "element", code = %code, id = %id, data_type = %data_type, "row added");
        Ok(id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
