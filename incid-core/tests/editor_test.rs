//! Editing session integration tests: dirty tracking, validation and
//! notifications through `IncidEditor`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use classification::ClassificationLookup;
use incid_core::*;

const LOOKUP: &str = r#"
primary_categories:
  - code: W
    description: Woodland
primary_codes:
  - code: W1.1
    category: W
    description: Broadleaved woodland
    nvc_codes: W8
secondary_groups:
  - code: str
    description: Structure
secondary_codes:
  - code: s1
    group: str
    description: Veteran trees
  - code: s2
    group: str
    description: Coppice
primary_secondary:
  - primary: "W1*"
    secondary: s1
  - primary: "W1*"
    secondary: s2
primary_priority:
  - primary: W1.1
    priority_habitat: LMDW
secondary_priority:
  - secondary: s1
    priority_habitat: WPAS
priority_habitats:
  - code: LMDW
    description: Lowland mixed deciduous woodland
  - code: WPAS
    description: Wood-pasture and parkland
  - code: HEDG
    description: Hedgerows
determination_qualities:
  - code: Q1
interpretation_qualities:
  - code: I1
conditions:
  - code: C1
condition_qualifiers:
  - code: Q
sources:
  - id: 1
    name: Aerial survey
  - id: 2
    name: Field survey
habitat_classes:
  - code: NVC
source_habitat_types:
  - code: W8
    habitat_class: NVC
importances:
  - code: Primary
  - code: Secondary
  - code: Tertiary
  - code: None
  - code: High
"#;

fn lookup() -> Arc<ClassificationLookup> {
    Arc::new(ClassificationLookup::from_yaml_str(LOOKUP).unwrap())
}

/// A saved incid whose mandatory priority habitat is already persisted.
fn saved_incid() -> Incid {
    let mut incid = Incid::new("HLU/42").with_primary("W1.1");
    incid.secondaries = vec![SecondaryHabitat::new("HLU/42", "s2", "str").with_id(10)];
    incid.priority_auto = vec![PriorityHabitat::placeholder("HLU/42", "LMDW")
        .with_id(20)
        .with_quality("Q1", "I1")];
    incid.priority_user = vec![PriorityHabitat::placeholder("HLU/42", "HEDG")
        .with_id(21)
        .with_quality("Q1", "I1")];
    incid
}

fn source(id: i32, boundary: &str) -> SourceSlot {
    let mut s = SourceSlot::new("HLU/42");
    s.source_id = Some(id);
    s.date = VagueDate::parse("2004").unwrap();
    s.habitat_class = Some("NVC".to_string());
    s.habitat_type = Some("W8".to_string());
    s.boundary_importance = Some(boundary.to_string());
    s.habitat_importance = Some("None".to_string());
    s
}

fn editor() -> IncidEditor {
    let mut editor = IncidEditor::new(lookup(), IncidConfig::default()).unwrap();
    editor.load(saved_incid());
    editor
}

#[test]
fn test_saved_incid_loads_clean() {
    let editor = editor();

    assert!(!editor.dirty_state().is_dirty());
    assert!(!editor.can_save());
    assert!(editor.warnings().is_empty());
    assert_eq!(editor.incid().nvc_codes.as_deref(), Some("W8"));
    assert_eq!(editor.priority_auto()[0].persisted_id, 20);
    assert_eq!(editor.priority_user()[0].persisted_id, 21);
}

#[test]
fn test_unsaved_incid_with_mandatory_habitat_loads_clean() {
    let fresh = || Incid::new("HLU/7").with_primary("W1.1");
    let mut e = IncidEditor::new(lookup(), IncidConfig::default()).unwrap();
    e.load(fresh());

    assert_eq!(e.priority_auto()[0].habitat_code, "LMDW");
    assert!(e.priority_auto()[0].is_transient());
    assert!(!e.dirty_state().is_dirty());

    e.reload(fresh()).unwrap();
    assert!(!e.dirty_state().is_dirty());
}

#[test]
fn test_primary_toggle_leaves_no_invalid_user_rows() {
    let mut e = IncidEditor::new(lookup(), IncidConfig::default()).unwrap();
    e.load(Incid::new("HLU/7"));

    e.set_primary(Some("W1.1"));
    assert_eq!(e.priority_auto().len(), 1);
    e.set_primary(Some("W2"));
    assert!(e.priority_auto().is_empty());
    assert!(e.priority_user().is_empty());
    assert!(!e.flags().user_has_invalid);

    e.set_primary(None);
    assert!(e.priority_user().is_empty());
    assert!(!e.dirty_state().is_dirty());
}

#[test]
fn test_every_edit_marks_its_aggregate() {
    let mut e = editor();
    e.add_secondary("s1", None);
    let state = e.dirty_state();
    assert!(state.secondaries);
    // s1 mandates WPAS, but an empty placeholder is not a change
    assert!(e.priority_auto().iter().any(|r| r.habitat_code == "WPAS"));
    assert!(!state.priority_habitats);
    assert!(!state.condition);

    let mut e = editor();
    let entry = e.secondaries().items()[0].clone();
    assert!(e.remove_secondary(&entry));
    assert_eq!(e.dirty_state().changed_aggregates(), vec!["secondaries"]);

    let mut e = editor();
    let row = e.priority_user()[0].clone();
    e.update_priority_habitat(&row, |r| r.interpretation_comments = Some("hedge".to_string()))
        .unwrap();
    assert_eq!(e.dirty_state().changed_aggregates(), vec!["priority_habitats"]);
    assert!(e.can_save());

    let mut e = editor();
    let mut condition = Condition::new("HLU/42");
    condition.code = Some("C1".to_string());
    condition.qualifier = Some("Q".to_string());
    condition.date = VagueDate::parse("03/2004").unwrap();
    e.set_condition(Some(condition));
    assert_eq!(e.dirty_state().changed_aggregates(), vec!["condition"]);
    assert!(e.field_errors().is_empty());

    let mut e = editor();
    e.set_multiplex(
        MultiplexGroup::Management,
        vec![MultiplexRow {
            persisted_id: -1,
            incid: "HLU/42".to_string(),
            code: "M1".to_string(),
        }],
    );
    assert_eq!(e.dirty_state().changed_aggregates(), vec!["management"]);
}

#[test]
fn test_reload_after_save_is_clean() {
    let mut e = editor();
    e.set_primary(None);
    assert!(e.dirty_state().incid);
    assert!(e.priority_auto().is_empty());

    let saved = e.to_incid();
    e.reload(saved.clone()).unwrap();
    assert!(!e.dirty_state().is_dirty());
    assert_eq!(e.to_incid().priority_user.len(), saved.priority_user.len());
}

#[test]
fn test_duplicate_boundary_importance_blocks_save() {
    let mut e = editor();
    e.set_source(0, Some(source(1, "High"))).unwrap();
    e.set_source(1, Some(source(2, "High"))).unwrap();

    let errors = e.field_errors();
    let fields: Vec<String> = errors.iter().map(|err| err.field.to_string()).collect();
    assert_eq!(
        fields,
        vec!["source1_boundary_importance", "source2_boundary_importance"]
    );
    assert!(e.dirty_state().sources);
    assert!(!e.can_save());
}

#[test]
fn test_importance_applied_out_of_order() {
    let mut e = editor();
    e.set_source(0, Some(source(1, "Secondary"))).unwrap();

    let errors = e.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].field,
        FieldId::Source {
            slot: 0,
            field: SourceField::BoundaryImportance
        }
    );
    assert!(errors[0].message.contains("must be applied in order"));

    e.set_source(1, Some(source(2, "Primary"))).unwrap();
    assert!(e.field_errors().is_empty());
    assert!(e.can_save());
}

#[test]
fn test_invalid_secondary_is_a_warning_not_a_removal() {
    let mut e = editor();
    e.add_secondary("s1", None);
    e.set_primary(Some("X9"));

    assert_eq!(e.secondaries().len(), 2);
    assert!(e.secondaries().has_invalid());
    let warnings = e.warnings();
    // Unknown category plus two secondaries not valid for X9
    assert!(warnings.iter().any(|w| w.field == WarningField::Primary));
    assert_eq!(
        warnings
            .iter()
            .filter(|w| matches!(w.field, WarningField::Secondary { .. }))
            .count(),
        2
    );
}

#[test]
fn test_bulk_paste_notifies_once() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let mut e = editor();
    e.set_listener(move |change: Change| sink.borrow_mut().push(change));

    let pasted = vec![
        SecondaryHabitat::new("HLU/42", "s1", "str"),
        SecondaryHabitat::new("HLU/42", "s2", "str"),
        SecondaryHabitat::new("HLU/42", "s1", "str"),
    ];
    assert!(e.replace_secondaries(pasted));
    assert_eq!(
        *log.borrow(),
        vec![Change::Secondaries, Change::PriorityHabitats]
    );
    assert_eq!(e.secondaries().codes(), vec!["s1", "s2"]);

    // A recompute with nothing changed is silent
    e.recompute();
    assert_eq!(log.borrow().len(), 2);
}
