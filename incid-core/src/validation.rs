//! Field validation for the condition and the three evidence sources.
//!
//! Validation never fails: every problem comes back as a [`FieldError`]
//! attached to the field it concerns. The importance fields additionally run
//! two cross-slot checks, each over the three slots as a fixed array.

use std::sync::Arc;

use tracing::debug;

use classification::ClassificationLookup;

use crate::config::SourceConfig;
use crate::types::*;
use crate::vague_date::VagueDate;

/// Trimmed, non-empty value of an optional string field.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Values of one importance field across the three slots.
fn importance_values(
    sources: &[Option<SourceSlot>; SOURCE_SLOTS],
    kind: ImportanceKind,
) -> [Option<&str>; SOURCE_SLOTS] {
    std::array::from_fn(|slot| {
        sources[slot]
            .as_ref()
            .and_then(|s| present(s.importance(kind)))
    })
}

/// Flag `slot` if another slot holds the same importance value.
///
/// The skip value is exempt on either side.
pub fn duplicate_importance(
    slot: usize,
    sources: &[Option<SourceSlot>; SOURCE_SLOTS],
    kind: ImportanceKind,
    skip: &str,
) -> Option<FieldError> {
    let values = importance_values(sources, kind);
    let value = values[slot].filter(|v| *v != skip)?;

    let duplicated = values
        .iter()
        .enumerate()
        .any(|(other, v)| other != slot && *v == Some(value));
    duplicated.then(|| {
        FieldError::new(
            FieldId::Source { slot, field: kind.field() },
            format!("{} cannot be equal for the same incid", kind.field().label()),
        )
    })
}

/// Flag `slot` if it holds a precedence token whose predecessor is held by no slot.
pub fn importance_out_of_order(
    slot: usize,
    sources: &[Option<SourceSlot>; SOURCE_SLOTS],
    kind: ImportanceKind,
    precedence: &[String; 3],
) -> Option<FieldError> {
    let values = importance_values(sources, kind);
    let value = values[slot]?;
    let [first, second, third] = precedence;

    let required = if value == second {
        first
    } else if value == third {
        second
    } else {
        return None;
    };

    let applied = values.iter().any(|v| *v == Some(required.as_str()));
    (!applied).then(|| {
        FieldError::new(
            FieldId::Source { slot, field: kind.field() },
            format!(
                "{} must be applied in order {first}, {second}, then {third}.",
                kind.field().label()
            ),
        )
    })
}

/// Validates the condition and source fields of an incid.
pub struct FieldValidator {
    lookup: Arc<ClassificationLookup>,
    config: SourceConfig,
}

impl FieldValidator {
    pub fn new(lookup: Arc<ClassificationLookup>, config: SourceConfig) -> Self {
        Self { lookup, config }
    }

    /// Validate every condition and source field.
    pub fn validate(
        &self,
        condition: Option<&Condition>,
        sources: &[Option<SourceSlot>; SOURCE_SLOTS],
    ) -> Vec<FieldError> {
        let mut errors = self.validate_condition(condition);
        errors.extend(self.validate_sources(sources));
        if !errors.is_empty() {
            debug!(errors = errors.len(), "Field validation failed");
        }
        errors
    }

    /// Validate the condition. An absent condition is valid.
    pub fn validate_condition(&self, condition: Option<&Condition>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let Some(condition) = condition else {
            return errors;
        };

        let qualifier = present(condition.qualifier.as_deref());
        match present(condition.code.as_deref()) {
            None => {
                if qualifier.is_some() {
                    errors.push(FieldError::new(
                        FieldId::ConditionQualifier,
                        "Condition qualifier not valid without a condition",
                    ));
                }
                if !condition.date.is_empty() {
                    errors.push(FieldError::new(
                        FieldId::ConditionDate,
                        "Condition date not valid without a condition",
                    ));
                }
            }
            Some(code) => {
                if !self.lookup.is_condition(code) {
                    errors.push(FieldError::new(
                        FieldId::ConditionCode,
                        format!("Condition {code} is not a known condition"),
                    ));
                }
                match qualifier {
                    None => errors.push(FieldError::new(
                        FieldId::ConditionQualifier,
                        "Condition qualifier is required",
                    )),
                    Some(q) if !self.lookup.is_condition_qualifier(q) => errors.push(FieldError::new(
                        FieldId::ConditionQualifier,
                        format!("Condition qualifier {q} is not a known qualifier"),
                    )),
                    Some(_) => {}
                }
                if let Some(message) = Self::required_date(&condition.date, "Condition date") {
                    errors.push(FieldError::new(FieldId::ConditionDate, message));
                }
            }
        }
        errors
    }

    /// Validate the three source slots, including the cross-slot importance checks.
    pub fn validate_sources(&self, sources: &[Option<SourceSlot>; SOURCE_SLOTS]) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for (slot, source) in sources.iter().enumerate() {
            let Some(source) = source else { continue };
            if self.is_set(source) {
                errors.extend(self.validate_set_source(slot, source));
            } else {
                errors.extend(Self::validate_unset_source(slot, source));
            }
        }

        for kind in [ImportanceKind::Boundary, ImportanceKind::Habitat] {
            for slot in 0..SOURCE_SLOTS {
                errors.extend(duplicate_importance(slot, sources, kind, &self.config.importance_skip));
                errors.extend(importance_out_of_order(slot, sources, kind, &self.config.precedence));
            }
        }

        if self.config.require_source && !sources.iter().flatten().any(|s| self.is_set(s)) {
            errors.push(FieldError::new(
                FieldId::Source { slot: 0, field: SourceField::SourceId },
                "At least one source is required",
            ));
        }

        errors
    }

    fn is_set(&self, source: &SourceSlot) -> bool {
        source
            .source_id
            .is_some_and(|id| id != self.config.unset_source_id)
    }

    fn validate_set_source(&self, slot: usize, source: &SourceSlot) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let error = |field: SourceField, message: String| {
            FieldError::new(FieldId::Source { slot, field }, message)
        };

        if let Some(id) = source.source_id {
            if self.lookup.source_name(id).is_none() {
                errors.push(error(SourceField::SourceId, format!("Source {id} is not a known source")));
            }
        }

        if let Some(message) = Self::required_date(&source.date, SourceField::Date.label()) {
            errors.push(error(SourceField::Date, message));
        }

        let class = present(source.habitat_class.as_deref());
        let habitat_type = present(source.habitat_type.as_deref());
        match class {
            None => errors.push(error(
                SourceField::HabitatClass,
                format!("{} is required", SourceField::HabitatClass.label()),
            )),
            Some(c) if !self.lookup.is_habitat_class(c) => errors.push(error(
                SourceField::HabitatClass,
                format!("Habitat class {c} is not a known class"),
            )),
            Some(_) => {}
        }

        let type_required = class.is_some_and(|c| !c.eq_ignore_ascii_case(&self.config.no_habitat_class));
        match (habitat_type, class) {
            (None, _) if type_required => errors.push(error(
                SourceField::HabitatType,
                format!("{} is required", SourceField::HabitatType.label()),
            )),
            (Some(t), Some(c)) if !self.lookup.is_habitat_type_for_class(t, c) => errors.push(error(
                SourceField::HabitatType,
                format!("Habitat type {t} does not belong to habitat class {c}"),
            )),
            _ => {}
        }

        for kind in [ImportanceKind::Boundary, ImportanceKind::Habitat] {
            let field = kind.field();
            match present(source.importance(kind)) {
                None => errors.push(error(field, format!("{} is required", field.label()))),
                Some(v) if !self.lookup.is_importance(v) => errors.push(error(
                    field,
                    format!("{} {v} is not a known importance", field.label()),
                )),
                Some(_) => {}
            }
        }

        errors
    }

    /// Every non-empty field of a slot without a source is an error.
    fn validate_unset_source(slot: usize, source: &SourceSlot) -> Vec<FieldError> {
        let filled = [
            (SourceField::Date, !source.date.is_empty()),
            (SourceField::HabitatClass, present(source.habitat_class.as_deref()).is_some()),
            (SourceField::HabitatType, present(source.habitat_type.as_deref()).is_some()),
            (SourceField::BoundaryImportance, present(source.boundary_importance.as_deref()).is_some()),
            (SourceField::HabitatImportance, present(source.habitat_importance.as_deref()).is_some()),
        ];

        filled
            .into_iter()
            .filter(|(_, filled)| *filled)
            .map(|(field, _)| {
                FieldError::new(
                    FieldId::Source { slot, field },
                    format!("{} must be cleared when no source is selected", field.label()),
                )
            })
            .collect()
    }

    fn required_date(date: &VagueDate, label: &str) -> Option<String> {
        if date.is_empty() {
            return Some(format!("{label} is required"));
        }
        date.validate()
            .err()
            .map(|e| format!("{label} is not a valid vague date: {e}"))
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lookup() -> Arc<ClassificationLookup> {
        let yaml = r#"
conditions:
  - code: C1
condition_qualifiers:
  - code: Q1
sources:
  - id: 1
    name: Aerial survey
  - id: 2
    name: Field survey
habitat_classes:
  - code: NVC
  - code: None
source_habitat_types:
  - code: U1
    habitat_class: NVC
importances:
  - code: High
  - code: Primary
  - code: Secondary
  - code: Tertiary
  - code: None
"#;
        Arc::new(ClassificationLookup::from_yaml_str(yaml).unwrap())
    }

    fn validator() -> FieldValidator {
        FieldValidator::new(lookup(), SourceConfig::default())
    }

    fn source(id: i32, boundary: &str, habitat: &str) -> SourceSlot {
        let mut s = SourceSlot::new("HLU/1");
        s.source_id = Some(id);
        s.date = VagueDate::year(2004);
        s.habitat_class = Some("NVC".to_string());
        s.habitat_type = Some("U1".to_string());
        s.boundary_importance = Some(boundary.to_string());
        s.habitat_importance = Some(habitat.to_string());
        s
    }

    fn fields(errors: &[FieldError]) -> Vec<String> {
        errors.iter().map(|e| e.field.to_string()).collect()
    }

    #[test]
    fn test_complete_sources_pass() {
        let sources = [
            Some(source(1, "Primary", "Primary")),
            Some(source(2, "Secondary", "None")),
            None,
        ];
        assert!(validator().validate(None, &sources).is_empty());
    }

    #[test]
    fn test_duplicate_importance_flags_both_slots() {
        let sources = [
            Some(source(1, "High", "Primary")),
            Some(source(2, "High", "None")),
            None,
        ];
        let errors = validator().validate_sources(&sources);
        assert_eq!(
            fields(&errors),
            vec!["source1_boundary_importance", "source2_boundary_importance"]
        );
        assert!(errors[0].message.contains("cannot be equal for the same incid"));
    }

    #[test]
    fn test_skip_value_is_not_a_duplicate() {
        let sources = [
            Some(source(1, "Primary", "None")),
            Some(source(2, "Secondary", "None")),
            None,
        ];
        assert!(validator().validate_sources(&sources).is_empty());
    }

    #[test]
    fn test_secondary_without_primary_is_out_of_order() {
        let sources = [None, Some(source(1, "Secondary", "None")), None];
        let errors = validator().validate_sources(&sources);
        assert_eq!(fields(&errors), vec!["source2_boundary_importance"]);
        assert_eq!(
            errors[0].message,
            "Boundary importance must be applied in order Primary, Secondary, then Tertiary."
        );
    }

    #[test]
    fn test_tertiary_needs_secondary() {
        let sources = [
            Some(source(1, "Primary", "Primary")),
            Some(source(2, "Tertiary", "None")),
            None,
        ];
        let errors = validator().validate_sources(&sources);
        assert_eq!(fields(&errors), vec!["source2_boundary_importance"]);
    }

    #[test]
    fn test_set_source_requires_fields() {
        let mut s = SourceSlot::new("HLU/1");
        s.source_id = Some(9);
        let errors = validator().validate_sources(&[Some(s), None, None]);
        assert_eq!(
            fields(&errors),
            vec![
                "source1_source_id",
                "source1_date",
                "source1_habitat_class",
                "source1_boundary_importance",
                "source1_habitat_importance",
            ]
        );
    }

    #[test]
    fn test_none_class_does_not_need_type() {
        let mut s = source(1, "Primary", "Primary");
        s.habitat_class = Some("None".to_string());
        s.habitat_type = None;
        assert!(validator().validate_sources(&[Some(s), None, None]).is_empty());

        let mut s = source(1, "Primary", "Primary");
        s.habitat_type = None;
        let errors = validator().validate_sources(&[Some(s), None, None]);
        assert_eq!(fields(&errors), vec!["source1_habitat_type"]);
    }

    #[test]
    fn test_habitat_type_must_belong_to_class() {
        let mut s = source(1, "Primary", "Primary");
        s.habitat_type = Some("X9".to_string());
        let errors = validator().validate_sources(&[Some(s), None, None]);
        assert_eq!(fields(&errors), vec!["source1_habitat_type"]);
    }

    #[test]
    fn test_unset_source_must_be_cleared() {
        let mut s = SourceSlot::new("HLU/1");
        s.source_id = Some(-1);
        s.habitat_class = Some("NVC".to_string());
        s.boundary_importance = Some(String::new());
        let errors = validator().validate_sources(&[None, None, Some(s)]);
        assert_eq!(fields(&errors), vec!["source3_habitat_class"]);
    }

    #[test]
    fn test_require_source_mode() {
        let config = SourceConfig {
            require_source: true,
            ..Default::default()
        };
        let v = FieldValidator::new(lookup(), config);
        let errors = v.validate_sources(&[None, None, None]);
        assert_eq!(fields(&errors), vec!["source1_source_id"]);

        let sources = [None, Some(source(1, "Primary", "Primary")), None];
        assert!(v.validate_sources(&sources).is_empty());
    }

    #[test]
    fn test_condition_rules() {
        let v = validator();

        let mut c = Condition::new("HLU/1");
        c.qualifier = Some("Q1".to_string());
        c.date = VagueDate::year(2004);
        let errors = v.validate_condition(Some(&c));
        assert_eq!(fields(&errors), vec!["condition_qualifier", "condition_date"]);

        c.code = Some("C1".to_string());
        assert!(v.validate_condition(Some(&c)).is_empty());

        c.qualifier = None;
        c.date = VagueDate::default();
        let errors = v.validate_condition(Some(&c));
        assert_eq!(fields(&errors), vec!["condition_qualifier", "condition_date"]);
        assert!(errors[1].message.contains("required"));

        assert!(v.validate_condition(None).is_empty());
    }

    #[test]
    fn test_invalid_condition_date() {
        let mut c = Condition::new("HLU/1");
        c.code = Some("C1".to_string());
        c.qualifier = Some("Q1".to_string());
        // A day date whose end differs from its start
        c.date = VagueDate {
            start: NaiveDate::from_ymd_opt(2004, 3, 12),
            end: NaiveDate::from_ymd_opt(2004, 3, 13),
            date_type: Some("D".to_string()),
        };
        let errors = validator().validate_condition(Some(&c));
        assert_eq!(fields(&errors), vec!["condition_date"]);
        assert!(errors[0].message.contains("not a valid vague date"));
    }
}
