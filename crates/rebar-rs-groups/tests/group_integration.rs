//! Integration tests for form groups.
//!
//! Covers the group life cycle end to end:
//! 1. Binding, validation and memoisation
//! 2. Prefixing and lookup
//! 3. Saving onto a backing record
//! 4. State-validated groups

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rebar_rs_core::{RebarError, ValidationError};
use rebar_rs_forms::data::FormData;
use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
use rebar_rs_forms::form::{BaseForm, Form};
use rebar_rs_forms::formset::FormSetFactory;
use rebar_rs_forms::model::{Model, Record};
use rebar_rs_forms::model_form::ModelForm;
use rebar_rs_forms::state::{statevalidator_factory, StateRules};
use rebar_rs_forms::state_form::StateValidatedForm;
use rebar_rs_forms::validators::required;
use rebar_rs_forms::value::Value;
use rebar_rs_forms::ErrorList;
use rebar_rs_groups::{FormGroupDecl, GroupArgs, MemberDecl, MemberErrors};

// ============================================================================
// Shared helpers
// ============================================================================

/// Counts calls to a clean hook.
#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn name_fields() -> Vec<FormFieldDef> {
    vec![
        FormFieldDef::new("first_name", FormFieldType::char()),
        FormFieldDef::new("last_name", FormFieldType::char()),
    ]
}

fn email_fields() -> Vec<FormFieldDef> {
    vec![FormFieldDef::new("email", FormFieldType::Email)]
}

/// A `name` + `email` group whose members count their clean calls.
fn counted_contact_group(name_calls: &Counter, email_calls: &Counter) -> FormGroupDecl {
    let name_calls = name_calls.clone();
    let email_calls = email_calls.clone();
    let name = MemberDecl::form("name", move |args| {
        let calls = name_calls.clone();
        BaseForm::new(name_fields())
            .with_clean(move |_| {
                calls.bump();
                Ok(())
            })
            .with_options(&args.form_options())
    })
    .unwrap();
    let email = MemberDecl::form("email", move |args| {
        let calls = email_calls.clone();
        BaseForm::new(email_fields())
            .with_clean(move |_| {
                calls.bump();
                Ok(())
            })
            .with_options(&args.form_options())
    })
    .unwrap();
    FormGroupDecl::new(vec![name, email]).unwrap()
}

fn contact_group() -> FormGroupDecl {
    counted_contact_group(&Counter::default(), &Counter::default())
}

fn valid_contact_data() -> FormData {
    FormData::from_pairs([
        ("group-name-first_name", "Jane"),
        ("group-name-last_name", "Doe"),
        ("group-email-email", "a@example.com"),
    ])
}

// ============================================================================
// 1. Binding, validation and memoisation
// ============================================================================

#[test]
fn test_unbound_group_never_validates_members() {
    let name_calls = Counter::default();
    let email_calls = Counter::default();
    let group_calls = Counter::default();
    let hook_calls = group_calls.clone();
    let decl = counted_contact_group(&name_calls, &email_calls).with_clean(move |_| {
        hook_calls.bump();
        Ok(())
    });

    let mut group = decl.construct(GroupArgs::default());
    assert!(!group.is_bound());
    assert!(!group.is_valid());
    assert!(group.errors().is_empty());
    assert_eq!(name_calls.get(), 0);
    assert_eq!(email_calls.get(), 0);
    assert_eq!(group_calls.get(), 0);
}

#[test]
fn test_validation_runs_once_per_group() {
    let name_calls = Counter::default();
    let email_calls = Counter::default();
    let group_calls = Counter::default();
    let hook_calls = group_calls.clone();
    let decl = counted_contact_group(&name_calls, &email_calls).with_clean(move |_| {
        hook_calls.bump();
        Ok(())
    });

    let data = valid_contact_data();
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.is_valid());
    assert!(group.is_valid());
    assert_eq!(group.errors().len(), 2);
    assert!(group.is_valid());

    assert_eq!(name_calls.get(), 1);
    assert_eq!(email_calls.get(), 1);
    assert_eq!(group_calls.get(), 1);

    // A new group validates again.
    let mut again = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(again.is_valid());
    assert_eq!(name_calls.get(), 2);
    assert_eq!(group_calls.get(), 2);
}

#[test]
fn test_errors_before_is_valid_share_the_pass() {
    let name_calls = Counter::default();
    let email_calls = Counter::default();
    let decl = counted_contact_group(&name_calls, &email_calls);
    let data = valid_contact_data();
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.errors().iter().all(MemberErrors::is_empty));
    assert!(group.is_valid());
    assert_eq!(name_calls.get(), 1);
    assert_eq!(email_calls.get(), 1);
}

#[test]
fn test_member_errors_in_declaration_order() {
    let data = FormData::from_pairs([
        ("group-name-first_name", ""),
        ("group-name-last_name", "Doe"),
        ("group-email-email", "a@example.com"),
    ]);
    let mut group = contact_group().construct(GroupArgs {
        prefix: Some("group".into()),
        data: Some(&data),
        ..GroupArgs::default()
    });

    assert!(!group.is_valid());
    let errors = group.errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(
        *errors[0].field("first_name").unwrap(),
        vec!["This field is required."]
    );
    assert!(errors[0].field("last_name").is_none());
    assert!(errors[1].is_empty());
    assert!(group.group_errors().is_empty());
}

#[test]
fn test_invalid_member_does_not_hide_siblings() {
    let data = FormData::from_pairs([
        ("group-name-first_name", ""),
        ("group-name-last_name", ""),
        ("group-email-email", "not an email"),
    ]);
    let mut group = contact_group().construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(!group.is_valid());
    let errors = group.errors();
    assert!(errors[0].field("first_name").is_some());
    assert!(errors[0].field("last_name").is_some());
    assert!(errors[1].field("email").is_some());
}

#[test]
fn test_bound_group_without_members_is_valid() {
    let decl: FormGroupDecl = FormGroupDecl::new(vec![]).unwrap();
    let data = FormData::new();
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.is_bound());
    assert!(group.is_valid());
    assert!(group.errors().is_empty());
}

#[test]
fn test_group_clean_errors_are_captured() {
    let decl = contact_group().with_clean(|group| {
        let email = group
            .form::<BaseForm>("email")
            .map_err(|e| ValidationError::invalid(e.to_string()))?;
        match email.cleaned_data().get("email") {
            Some(Value::String(s)) if s.ends_with("@example.com") => Err(
                ValidationError::from_messages(vec![
                    "Example addresses are not allowed.".to_string(),
                    "Use a real address.".to_string(),
                ]),
            ),
            _ => Ok(()),
        }
    });
    let data = valid_contact_data();
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });

    assert!(!group.is_valid());
    assert!(group.errors().iter().all(MemberErrors::is_empty));
    assert_eq!(
        group.group_errors(),
        vec!["Example addresses are not allowed.", "Use a real address."]
    );
}

#[test]
fn test_invalid_members_still_reach_group_clean() {
    let group_calls = Counter::default();
    let hook_calls = group_calls.clone();
    let decl = contact_group().with_clean(move |_| {
        hook_calls.bump();
        Ok(())
    });
    let data = FormData::parse("group-name-first_name=");
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(!group.is_valid());
    assert_eq!(group_calls.get(), 1);
}

#[test]
fn test_untouched_extra_row_marked_deleted() {
    let name = MemberDecl::form("name", |args| {
        BaseForm::new(name_fields()).with_options(&args.form_options())
    })
    .unwrap();
    let pets = MemberDecl::formset(
        "pets",
        FormSetFactory::new(|options| {
            Box::new(
                BaseForm::new(vec![FormFieldDef::new("name", FormFieldType::char())])
                    .with_options(options),
            ) as Box<dyn Form>
        })
        .with_extra(1)
        .with_max_num(1, true)
        .with_can_delete(true),
    )
    .unwrap();
    let decl: FormGroupDecl = FormGroupDecl::new(vec![name, pets]).unwrap();
    let data = FormData::from_pairs([
        ("group-name-first_name", "Jane"),
        ("group-name-last_name", "Doe"),
        ("group-pets-TOTAL_FORMS", "1"),
        ("group-pets-INITIAL_FORMS", "0"),
        ("group-pets-0-DELETE", "on"),
    ]);
    let mut group = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.is_valid());
    assert!(group.errors().iter().all(MemberErrors::is_empty));
    assert!(group.formset("pets").unwrap().active_form_indices().is_empty());
}

// ============================================================================
// 2. Prefixing and lookup
// ============================================================================

#[test]
fn test_add_prefix_is_not_idempotent() {
    let group = contact_group().construct(GroupArgs::default());
    let once = group.add_prefix("x");
    assert_eq!(once, "group-x");
    assert_eq!(group.add_prefix(&once), "group-group-x");
}

#[test]
fn test_members_are_prefixed_once() {
    let group = contact_group().construct(GroupArgs {
        prefix: Some("contact".into()),
        ..GroupArgs::default()
    });
    let name = group.form::<BaseForm>("name").unwrap();
    assert_eq!(name.add_prefix("first_name"), "contact-name-first_name");
    assert_eq!(
        group.html_id("first_name", Some("name")).unwrap(),
        "id_contact-name-first_name"
    );
}

#[test]
fn test_lookup_by_index_and_name() {
    let group = contact_group().construct(GroupArgs::default());
    assert_eq!(group.len(), 2);
    assert_eq!(group.get(0).unwrap().prefix(), Some("group-name"));
    assert_eq!(group.member("email").unwrap().prefix(), Some("group-email"));
    assert!(matches!(
        group.member("phone"),
        Err(RebarError::MemberNotFound(_))
    ));
    assert!(matches!(
        group.get(2),
        Err(RebarError::MemberIndexOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn test_initial_is_shared_by_members() {
    let mut initial = std::collections::HashMap::new();
    initial.insert("first_name".to_string(), Value::from("Ada"));
    initial.insert("email".to_string(), Value::from("ada@example.com"));
    let group = contact_group().construct(GroupArgs {
        initial: Some(initial),
        ..GroupArgs::default()
    });
    assert_eq!(
        group.form::<BaseForm>("name").unwrap().value("first_name"),
        Value::from("Ada")
    );
    assert_eq!(
        group.form::<BaseForm>("email").unwrap().value("email"),
        Value::from("ada@example.com")
    );
}

#[test]
fn test_member_options_by_name() {
    let name = MemberDecl::form("name", |args| {
        let required = !matches!(args.option("optional"), Some(Value::Bool(true)));
        BaseForm::new(vec![
            FormFieldDef::new("first_name", FormFieldType::char()).required(required)
        ])
        .with_options(&args.form_options())
    })
    .unwrap();
    let decl: FormGroupDecl = FormGroupDecl::new(vec![name]).unwrap();
    let data = FormData::new();

    let mut strict = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(!strict.is_valid());

    let mut options = std::collections::HashMap::new();
    options.insert(
        "name".to_string(),
        [("optional".to_string(), Value::Bool(true))].into_iter().collect(),
    );
    let mut relaxed = decl.construct(GroupArgs {
        data: Some(&data),
        member_options: options,
        ..GroupArgs::default()
    });
    assert!(relaxed.is_valid());
}

#[test]
fn test_label_suffix_is_shared_by_members() {
    let group = contact_group().construct(GroupArgs {
        label_suffix: Some(" -".into()),
        ..GroupArgs::default()
    });
    assert_eq!(group.label_suffix(), " -");
    let name = group.form::<BaseForm>("name").unwrap();
    assert_eq!(name.label_suffix(), " -");
    assert_eq!(name.label_text("first_name").as_deref(), Some("first name -"));
}

#[test]
fn test_duplicate_and_invalid_member_names() {
    let make = |name: &str| {
        MemberDecl::form(name, |args| {
            BaseForm::new(vec![]).with_options(&args.form_options())
        })
    };
    assert!(matches!(
        make("not a name"),
        Err(RebarError::ImproperlyConfigured(_))
    ));
    let twice = vec![make("name").unwrap(), make("name").unwrap()];
    assert!(matches!(
        FormGroupDecl::<ErrorList>::new(twice),
        Err(RebarError::ImproperlyConfigured(_))
    ));
}

// ============================================================================
// 3. Saving onto a backing record
// ============================================================================

/// Records the backing instance's primary key whenever a hook observes it.
type Observed = Arc<Mutex<Vec<Option<Value>>>>;

fn saving_group(observed: &Observed) -> FormGroupDecl {
    let seen = Arc::clone(observed);
    let name = MemberDecl::form("name", move |args| {
        let seen = Arc::clone(&seen);
        let mut form = ModelForm::new(name_fields()).with_related_hook(move |instance, _| {
            seen.lock().unwrap().push(instance.pk().cloned());
            Ok(())
        });
        if let Some(instance) = args.instance {
            form = form.with_instance(instance);
        }
        form.with_options(&args.form_options())
    })
    .unwrap();
    let email = MemberDecl::form("email", |args| {
        ModelForm::new(vec![
            FormFieldDef::new("email", FormFieldType::Email),
            FormFieldDef::new(
                "tags",
                FormFieldType::MultipleChoice {
                    choices: vec![
                        ("work".into(), "Work".into()),
                        ("home".into(), "Home".into()),
                    ],
                },
            )
            .required(false),
        ])
        .with_m2m(["tags"])
        .with_options(&args.form_options())
    })
    .unwrap();
    let pets = MemberDecl::formset(
        "pets",
        FormSetFactory::new(|options| {
            Box::new(
                BaseForm::new(vec![FormFieldDef::new("name", FormFieldType::char())])
                    .with_options(options),
            ) as Box<dyn Form>
        })
        .with_extra(0)
        .with_fk("pets", "owner"),
    )
    .unwrap();
    FormGroupDecl::new(vec![name, email, pets]).unwrap()
}

fn saving_data() -> FormData {
    let mut data = FormData::from_pairs([
        ("group-name-first_name", "Jane"),
        ("group-name-last_name", "Doe"),
        ("group-email-email", "jane@example.org"),
        ("group-pets-TOTAL_FORMS", "2"),
        ("group-pets-INITIAL_FORMS", "0"),
        ("group-pets-0-name", "Rex"),
        ("group-pets-1-name", "Tom"),
    ]);
    data.append("group-email-tags", "work");
    data.append("group-email-tags", "home");
    data
}

#[test]
fn test_save_round_trip() {
    let observed: Observed = Arc::default();
    let data = saving_data();
    let mut group = saving_group(&observed).construct(GroupArgs {
        data: Some(&data),
        instance: Some(Box::new(Record::new("person"))),
        ..GroupArgs::default()
    });
    assert!(group.is_valid());

    let pk = group.save().unwrap().pk().cloned();
    assert!(pk.is_some());

    let instance = group.into_instance().unwrap();
    let record = instance.as_any().downcast_ref::<Record>().unwrap();
    assert_eq!(record.save_count(), 1);
    assert_eq!(record.field_value("first_name"), Some(Value::from("Jane")));
    assert_eq!(record.field_value("last_name"), Some(Value::from("Doe")));
    assert_eq!(
        record.field_value("email"),
        Some(Value::from("jane@example.org"))
    );
    assert_eq!(
        record.related("tags").unwrap(),
        [Value::from("work"), Value::from("home")]
    );

    let pets = record.children("pets");
    assert_eq!(pets.len(), 2);
    assert_eq!(pets[0].field_value("name"), Some(Value::from("Rex")));
    assert_eq!(pets[1].field_value("owner"), pk);
}

#[test]
fn test_post_commit_hooks_see_primary_key() {
    let observed: Observed = Arc::default();
    let data = saving_data();
    let mut group = saving_group(&observed).construct(GroupArgs {
        data: Some(&data),
        instance: Some(Box::new(Record::new("person"))),
        ..GroupArgs::default()
    });
    let pk = group.save().unwrap().pk().cloned();

    let seen = observed.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_some());
    assert_eq!(seen[0], pk);
}

#[test]
fn test_save_invalid_group_fails_before_persisting() {
    let observed: Observed = Arc::default();
    let data = FormData::parse("group-name-first_name=Jane");
    let mut group = saving_group(&observed).construct(GroupArgs {
        data: Some(&data),
        instance: Some(Box::new(Record::new("person"))),
        ..GroupArgs::default()
    });
    assert!(matches!(group.save(), Err(RebarError::Validation(_))));
    assert!(group.instance().unwrap().pk().is_none());
    assert!(observed.lock().unwrap().is_empty());
}

#[test]
fn test_existing_instance_values_become_initial() {
    let observed: Observed = Arc::default();
    let person = Record::new("person").with_field("first_name", "Ada");
    let group = saving_group(&observed).construct(GroupArgs {
        instance: Some(Box::new(person)),
        ..GroupArgs::default()
    });
    assert_eq!(
        group.form::<ModelForm>("name").unwrap().value("first_name"),
        Value::from("Ada")
    );
}

// ============================================================================
// 4. State-validated groups
// ============================================================================

fn publish_rules() -> StateRules {
    let mut rules = StateRules::new();
    rules.insert(
        "publish".into(),
        statevalidator_factory([("email", vec![required()])]).into(),
    );
    rules
}

fn article_group() -> FormGroupDecl {
    let body = MemberDecl::form("body", |args| {
        let mut rules = StateRules::new();
        rules.insert(
            "publish".into(),
            statevalidator_factory([("title", vec![required()])]).into(),
        );
        StateValidatedForm::new(
            BaseForm::new(vec![
                FormFieldDef::new("title", FormFieldType::char()).required(false)
            ])
            .with_options(&args.form_options()),
            &rules,
        )
    })
    .unwrap();
    let contact = MemberDecl::form("contact", |args| {
        BaseForm::new(vec![
            FormFieldDef::new("email", FormFieldType::Email).required(false)
        ])
        .with_options(&args.form_options())
    })
    .unwrap();
    FormGroupDecl::new(vec![body, contact])
        .unwrap()
        .with_state_validators(publish_rules())
}

#[test]
fn test_group_state_validation() {
    let data = FormData::parse("group-body-title=&group-contact-email=");
    let mut group = article_group().construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.is_valid_for(&[]).unwrap());
    assert!(!group.is_valid_for(&["publish"]).unwrap());

    let errors = group.state_errors(&["publish"]).unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["title"], vec!["This field is required."]);
    assert_eq!(errors[1]["email"], vec!["This field is required."]);
}

#[test]
fn test_group_state_validation_passes_with_values() {
    let data = FormData::parse("group-body-title=Hello&group-contact-email=a%40example.com");
    let mut group = article_group().construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    assert!(group.is_valid_for(&["publish"]).unwrap());
    assert!(group
        .state_errors(&["publish"])
        .unwrap()
        .iter()
        .all(|e| e.is_empty()));
}

#[test]
fn test_group_state_toggles_are_per_group() {
    let decl = article_group();
    let data = FormData::parse("group-body-title=Hello&group-contact-email=");
    let mut first = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });
    let mut second = decl.construct(GroupArgs {
        data: Some(&data),
        ..GroupArgs::default()
    });

    first
        .state_validators_mut()
        .unwrap()
        .get_mut("publish")
        .unwrap()
        .disable();
    assert!(first.is_valid_for(&["publish"]).unwrap());
    assert!(!second.is_valid_for(&["publish"]).unwrap());

    first
        .state_validators_mut()
        .unwrap()
        .get_mut("publish")
        .unwrap()
        .enable();
    assert!(!first.is_valid_for(&["publish"]).unwrap());
}

#[test]
fn test_unknown_group_state() {
    let mut group = article_group().construct(GroupArgs::default());
    assert!(matches!(
        group.is_valid_for(&["archive"]),
        Err(RebarError::UnknownState(_))
    ));
}

#[test]
fn test_unbound_group_state_uses_initial() {
    let mut initial = std::collections::HashMap::new();
    initial.insert("title".to_string(), Value::from("Draft"));
    initial.insert("email".to_string(), Value::from("a@example.com"));
    let mut group = article_group().construct(GroupArgs {
        initial: Some(initial),
        ..GroupArgs::default()
    });
    assert!(!group.is_valid());
    assert!(group.is_valid_for(&["publish"]).unwrap());
}
