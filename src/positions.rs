//! Per-family tiling coordinates. When more than one certificate instance
//! shares a physical page, positions 2 and 3 take their coordinates from the
//! family's own table: either an explicitly authored per-field table or the
//! position-1 value shifted by a hand-tuned per-family vertical offset.
//! Offsets differ between families and are authoritative data, never derived.

use crate::error::CertPressError;
use crate::template::Align;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_POSITIONS: usize = 3;

/// Explicit coordinates (and optional style overrides) for one field at one
/// tiling position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPlacement {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub align: Option<Align>,
    #[serde(default)]
    pub max_width: Option<f32>,
    /// Checkbox fields carry one entry per option label.
    #[serde(default)]
    pub options: Vec<OptionPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionPlacement {
    pub label: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionTable {
    fields: BTreeMap<String, FieldPlacement>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, placement: FieldPlacement) -> Self {
        self.fields.insert(key.into(), placement);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldPlacement> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// How coordinates for one (position, field) pair are obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionLookup<'a> {
    /// Position 1: the template's authored coordinates apply as-is.
    Authored,
    /// An explicitly authored table governs this position.
    Table(&'a PositionTable),
    /// Position-1 coordinates shifted down by this many authoring-space points.
    Offset(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyLayout {
    pub class_type: String,
    /// Number of tiling positions this family supports (1..=3).
    pub positions: usize,
    /// Authoring-space vertical offset per position, index 0 = position 1.
    /// Hand-tuned per family; index 0 must be 0.
    #[serde(default)]
    offsets: Vec<f32>,
    /// Explicit tables, index 0 = position 1. An entry overrides the offset
    /// derivation for its position.
    #[serde(default)]
    tables: Vec<Option<PositionTable>>,
}

impl FamilyLayout {
    pub fn from_offsets(class_type: impl Into<String>, offsets: &[f32]) -> Self {
        Self {
            class_type: class_type.into(),
            positions: offsets.len(),
            offsets: offsets.to_vec(),
            tables: Vec::new(),
        }
    }

    /// Positions outside 1..=MAX_POSITIONS are ignored; `validate` rejects
    /// tables beyond the positions the family claims.
    pub fn with_table(mut self, position: usize, table: PositionTable) -> Self {
        if !(1..=MAX_POSITIONS).contains(&position) {
            return self;
        }
        if self.tables.len() < position {
            self.tables.resize(position, None);
        }
        self.tables[position - 1] = Some(table);
        self
    }

    pub fn lookup(&self, position: usize) -> Result<PositionLookup<'_>, CertPressError> {
        if position == 0 || position > self.positions {
            return Err(CertPressError::MissingPositionTable {
                class_type: self.class_type.clone(),
                position,
            });
        }
        if let Some(Some(table)) = self.tables.get(position - 1) {
            return Ok(PositionLookup::Table(table));
        }
        if position == 1 {
            return Ok(PositionLookup::Authored);
        }
        match self.offsets.get(position - 1) {
            Some(dy) => Ok(PositionLookup::Offset(*dy)),
            None => Err(CertPressError::MissingPositionTable {
                class_type: self.class_type.clone(),
                position,
            }),
        }
    }

    fn validate(&self) -> Result<(), CertPressError> {
        if self.positions == 0 || self.positions > MAX_POSITIONS {
            return Err(CertPressError::InvalidTemplate(format!(
                "family '{}' claims {} positions (allowed 1..={})",
                self.class_type, self.positions, MAX_POSITIONS
            )));
        }
        if let Some(first) = self.offsets.first() {
            if *first != 0.0 {
                return Err(CertPressError::InvalidTemplate(format!(
                    "family '{}' position-1 offset must be 0 (got {})",
                    self.class_type, first
                )));
            }
        }
        if self.offsets.len() > self.positions || self.tables.len() > self.positions {
            return Err(CertPressError::InvalidTemplate(format!(
                "family '{}' declares more position data than the {} positions it claims",
                self.class_type, self.positions
            )));
        }
        for pair in self.offsets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(CertPressError::InvalidTemplate(format!(
                    "family '{}' offsets must increase strictly ({} then {})",
                    self.class_type, pair[0], pair[1]
                )));
            }
        }
        // Every claimed position must be reachable.
        for position in 1..=self.positions {
            let explicit = matches!(self.tables.get(position - 1), Some(Some(_)));
            let derivable = position == 1 || self.offsets.len() >= position;
            if !explicit && !derivable {
                return Err(CertPressError::InvalidTemplate(format!(
                    "family '{}' has no table or offset for position {}",
                    self.class_type, position
                )));
            }
        }
        Ok(())
    }

    /// Data-bug findings against a concrete page height: offsets that push a
    /// position past the bottom edge. Reported, never auto-corrected.
    pub fn findings_for_page(&self, page_height: f32) -> Vec<String> {
        let mut findings = Vec::new();
        for (index, offset) in self.offsets.iter().enumerate() {
            if *offset >= page_height {
                findings.push(format!(
                    "family '{}' position {} offset {} exceeds page height {}",
                    self.class_type,
                    index + 1,
                    offset,
                    page_height
                ));
            }
        }
        findings
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionRegistry {
    families: BTreeMap<String, FamilyLayout>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped families and their hand-tuned offsets. The constants are
    /// opaque: they were measured against the printed card stock for each
    /// family and carry no common derivation.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FamilyLayout::from_offsets("adult-6hr", &[0.0, 273.0, 546.0]));
        registry.register(FamilyLayout::from_offsets("teen-8hr", &[0.0, 281.0, 558.0]));
        registry.register(FamilyLayout::from_offsets("seniors-refresher", &[0.0, 408.0]));
        registry
    }

    pub fn register(&mut self, family: FamilyLayout) {
        self.families.insert(family.class_type.clone(), family);
    }

    pub fn family(&self, class_type: &str) -> Option<&FamilyLayout> {
        self.families.get(class_type)
    }

    /// Coordinate source for one (family, position) pair. Position 1 always
    /// resolves; higher positions require the family to be registered.
    pub fn lookup(
        &self,
        class_type: &str,
        position: usize,
    ) -> Result<PositionLookup<'_>, CertPressError> {
        match self.families.get(class_type) {
            Some(family) => family.lookup(position),
            None if position == 1 => Ok(PositionLookup::Authored),
            None => Err(CertPressError::MissingPositionTable {
                class_type: class_type.to_string(),
                position,
            }),
        }
    }

    /// Startup validation: every family declares exactly the positions it
    /// claims to support.
    pub fn validate(&self) -> Result<(), CertPressError> {
        for family in self.families.values() {
            family.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_validates() {
        PositionRegistry::builtin().validate().unwrap();
    }

    #[test]
    fn position_one_is_authored_without_registration() {
        let registry = PositionRegistry::new();
        assert_eq!(
            registry.lookup("unknown", 1).unwrap(),
            PositionLookup::Authored
        );
    }

    #[test]
    fn higher_positions_require_family_data() {
        let registry = PositionRegistry::new();
        let err = registry.lookup("unknown", 2).unwrap_err();
        assert!(matches!(
            err,
            CertPressError::MissingPositionTable { position: 2, .. }
        ));
    }

    #[test]
    fn offsets_are_per_family_not_extrapolated() {
        let registry = PositionRegistry::builtin();
        let adult = registry.lookup("adult-6hr", 2).unwrap();
        let teen = registry.lookup("teen-8hr", 2).unwrap();
        assert_eq!(adult, PositionLookup::Offset(273.0));
        assert_eq!(teen, PositionLookup::Offset(281.0));
        // teen position 3 is hand-tuned, not 2x its position 2.
        assert_eq!(
            registry.lookup("teen-8hr", 3).unwrap(),
            PositionLookup::Offset(558.0)
        );
    }

    #[test]
    fn family_claiming_two_positions_rejects_position_three() {
        let registry = PositionRegistry::builtin();
        let err = registry.lookup("seniors-refresher", 3).unwrap_err();
        assert!(matches!(
            err,
            CertPressError::MissingPositionTable { position: 3, .. }
        ));
    }

    #[test]
    fn explicit_table_wins_over_offset() {
        let table = PositionTable::new().with_field(
            "studentName",
            FieldPlacement {
                x: 40.0,
                y: 300.0,
                font_size: Some(10.0),
                font_family: None,
                align: None,
                max_width: None,
                options: Vec::new(),
            },
        );
        let family =
            FamilyLayout::from_offsets("custom", &[0.0, 250.0]).with_table(2, table.clone());
        match family.lookup(2).unwrap() {
            PositionLookup::Table(t) => assert_eq!(t, &table),
            other => panic!("expected explicit table, got {:?}", other),
        }
    }

    #[test]
    fn with_table_ignores_out_of_range_positions() {
        let table = PositionTable::new();
        let family = FamilyLayout::from_offsets("custom", &[0.0, 250.0])
            .with_table(0, table.clone())
            .with_table(MAX_POSITIONS + 1, table);
        assert_eq!(family.lookup(1).unwrap(), PositionLookup::Authored);
        assert_eq!(family.lookup(2).unwrap(), PositionLookup::Offset(250.0));
    }

    #[test]
    fn validation_rejects_nonzero_first_offset() {
        let mut registry = PositionRegistry::new();
        registry.register(FamilyLayout::from_offsets("bad", &[5.0, 273.0]));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_increasing_offsets() {
        let mut registry = PositionRegistry::new();
        registry.register(FamilyLayout::from_offsets("bad", &[0.0, 273.0, 273.0]));
        assert!(registry.validate().is_err());
    }

    #[test]
    fn page_findings_flag_out_of_range_offsets() {
        let family = FamilyLayout::from_offsets("adult-6hr", &[0.0, 273.0, 546.0]);
        assert!(family.findings_for_page(792.0).is_empty());
        let findings = family.findings_for_page(500.0);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("position 3"));
    }
}
