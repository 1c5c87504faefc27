//! # rebar-rs-groups
//!
//! Form groups: several forms and formsets handled as one unit under a
//! shared prefix, validated together, and saved onto one backing record.
//!
//! ## Modules
//!
//! - [`member`] - Member declarations and constructed members
//! - [`group`] - Group declarations and the `FormGroup` itself
//!
//! ## Quick Start
//!
//! ```
//! use rebar_rs_forms::data::FormData;
//! use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
//! use rebar_rs_forms::form::BaseForm;
//! use rebar_rs_groups::{FormGroupDecl, GroupArgs, MemberDecl};
//!
//! let name = MemberDecl::form("name", |args| {
//!     BaseForm::new(vec![FormFieldDef::new("first_name", FormFieldType::char())])
//!         .with_options(&args.form_options())
//! })
//! .unwrap();
//! let decl: FormGroupDecl = FormGroupDecl::new(vec![name]).unwrap();
//!
//! let data = FormData::parse("group-name-first_name=Jane");
//! let mut group = decl.construct(GroupArgs { data: Some(&data), ..GroupArgs::default() });
//! assert!(group.is_valid());
//! ```

pub mod group;
pub mod member;

pub use group::{formgroup_factory, FormGroup, FormGroupDecl, GroupArgs, GroupCleanHook};
pub use member::{Member, MemberArgs, MemberDecl, MemberErrors, MemberOptions};
