mod common;

use common::{build, int, recording, shop, text};
use seedling::construct::SessionMode;
use seedling::datatype::TypedValue;
use seedling::error::SeedlingError;
use seedling::execute::Runner;
use seedling::model::{ObjectHandle, Schema, TypeInfo, TypeResolver, ObjectModel, Value};

fn customer_object(schema: &Schema) -> ObjectHandle {
    let Some(TypeInfo::Class(class)) = schema.resolve("", "Shop.Customer") else {
        panic!("Customer is missing")
    };
    schema.instantiate("Shop.Customer", &class)
}

#[test]
fn same_reference_reuses_and_updates() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Customer" ref="c1"><Name>Ann</Name></entity>
            <entity class="Customer" ref="c1"><Name>Anna</Name></entity>
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let mut runner = Runner::new();
    let summary = runner.attach(&mut constructor).run(&mut root).unwrap();
    assert_eq!(summary.entities, 2);
    assert_eq!(runner.references().len(), 1);
    let c1 = runner.references().get("c1").unwrap().clone();
    assert_eq!(text(&c1, "Name"), "Anna");
    assert_eq!(int(&c1, "Id"), 1);
    drop(runner);
    let store = constructor.store();
    assert_eq!(store.events, ["open", "save Shop.Customer", "update Shop.Customer", "close"]);
}

#[test]
fn same_reference_with_another_class_conflicts() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Customer" ref="x" />
            <entity class="Order" ref="x" />
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let err = Runner::new().attach(&mut constructor).run(&mut root).unwrap_err();
    match err {
        SeedlingError::ReferenceTypeConflict { reference, existing, declared } => {
            assert_eq!(reference, "x");
            assert_eq!(existing, "Shop.Customer");
            assert_eq!(declared, "Shop.Order");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn references_bind_objects_and_sub_properties() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Article" ref="a1"><Code>X1</Code></entity>
            <entity class="Customer" ref="c1"><Name>Ann</Name></entity>
            <entity class="Order" ref="o1">
                <property name="Customer" type="Reference">c1</property>
                <property name="CustomerCode" type="Reference">a1.Code</property>
                <property name="Status" enumtype="Status">Open</property>
                <property name="Total" type="Decimal">10.50</property>
            </entity>
            <entity class="Customer" ref="c1">
                <property name="Orders" type="Reference">o1</property>
            </entity>
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let mut runner = Runner::new();
    runner.attach(&mut constructor).run(&mut root).unwrap();
    let c1 = runner.references().get("c1").unwrap().clone();
    let o1 = runner.references().get("o1").unwrap().clone();
    assert_eq!(text(&o1, "CustomerCode"), "X1");
    assert_eq!(o1.get("Customer").unwrap(), Some(Value::Object(c1.clone())));
    assert_eq!(
        o1.get("Status").unwrap(),
        Some(Value::Scalar(TypedValue::Enum { type_name: "Status".into(), member: "Open".into() }))
    );
    assert_eq!(c1.get("Orders").unwrap(), Some(Value::List(vec![Value::Object(o1)])));
}

#[test]
fn unresolved_reference_aborts_the_run() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Customer"><Name>before</Name></entity>
            <entity class="Order"><property name="Customer" type="Reference">ghost</property></entity>
            <entity class="Customer"><Name>after</Name></entity>
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let err = Runner::new().attach(&mut constructor).run(&mut root).unwrap_err();
    match err {
        SeedlingError::UnresolvedReference { class, property, reference } => {
            assert_eq!((class.as_str(), property.as_str(), reference.as_str()), ("Order", "Customer", "ghost"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    let store = constructor.store();
    assert_eq!(store.saved.len(), 1);
    assert_eq!(text(&store.saved[0], "Name"), "before");
    // the session still ends
    assert_eq!(store.events.last().map(String::as_str), Some("close"));
}

#[test]
fn unsaved_entities_get_an_empty_identity() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Customer" ref="draft" save="false">
                <property name="Id" type="Int32">42</property>
                <Name>Draft</Name>
            </entity>
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerEntity);
    let mut runner = Runner::new();
    let summary = runner.attach(&mut constructor).run(&mut root).unwrap();
    assert_eq!(summary.entities, 1);
    let draft = runner.references().get("draft").unwrap().clone();
    assert_eq!(int(&draft, "Id"), 0);
    assert_eq!(text(&draft, "Name"), "Draft");
    assert_eq!(draft.stored().unwrap(), None);
    drop(runner);
    assert!(constructor.store().events.is_empty());
}

#[test]
fn binding_errors_name_the_property() {
    let schema = shop();
    for (document, expected) in [
        (r#"<entity class="Customer"><Unknown>1</Unknown></entity>"#, "Unknown"),
        (r#"<entity class="Customer"><Tags>vip</Tags></entity>"#, "can not be null"),
        (r#"<entity class="Customer"><property name="Name" type="Int32">1</property></entity>"#, "Name"),
    ] {
        let mut root = build(&schema, &format!(r#"<data-config namespace="Shop">{document}</data-config>"#));
        let mut constructor = recording(&schema, SessionMode::PerRun);
        let err = Runner::new().attach(&mut constructor).run(&mut root).unwrap_err();
        assert!(matches!(err, SeedlingError::Binding { .. }), "{err}");
        assert!(err.to_string().contains(expected), "{err}");
    }
}

#[test]
fn unknown_classes_fail_at_construction() {
    let schema = shop();
    let mut root = build(&schema, r#"<data-config namespace="Shop"><entity class="Invoice" /></data-config>"#);
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let err = Runner::new().attach(&mut constructor).run(&mut root).unwrap_err();
    assert!(matches!(err, SeedlingError::TypeResolution { ref type_name, .. } if type_name == "Invoice"));
}

#[test]
fn persistence_failures_name_class_and_reference() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop"><entity class="Customer" ref="c1" /></data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerEntity);
    constructor.store_mut().fail_class = Some("Shop.Customer".into());
    let err = Runner::new().attach(&mut constructor).run(&mut root).unwrap_err();
    assert!(matches!(err, SeedlingError::Persistence { .. }));
    assert!(err.to_string().starts_with("[Customer -> c1]"), "{err}");
    assert!(err.to_string().contains("disk full"));
    assert_eq!(constructor.store().events, ["open", "abandon"]);
}

#[test]
fn sessions_follow_the_session_mode() {
    let schema = shop();
    let document = r#"<data-config namespace="Shop">
        <sequence min="1" max="2"><entity class="Customer" /></sequence>
    </data-config>"#;

    let mut root = build(&schema, document);
    let mut per_run = recording(&schema, SessionMode::PerRun);
    Runner::new().attach(&mut per_run).run(&mut root).unwrap();
    assert_eq!(per_run.store().count("open"), 1);
    assert_eq!(per_run.store().count("close"), 1);

    let mut root = build(&schema, document);
    let mut per_entity = recording(&schema, SessionMode::PerEntity);
    Runner::new().attach(&mut per_entity).run(&mut root).unwrap();
    assert_eq!(
        per_entity.store().events,
        ["open", "save Shop.Customer", "close", "open", "save Shop.Customer", "close"]
    );
}

#[test]
fn loads_bind_only_unknown_names() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <entity class="Customer" ref="taken" />
            <load ref="taken">select taken</load>
            <load ref="admin">select admin</load>
            <load ref="admin">select again</load>
            <entity class="Order"><property name="Customer" type="Reference">admin</property></entity>
        </data-config>"#,
    );
    let admin = customer_object(&schema);
    let mut constructor = recording(&schema, SessionMode::PerRun);
    constructor.store_mut().canned = Some(admin.clone());
    let mut runner = Runner::new();
    let summary = runner.attach(&mut constructor).run(&mut root).unwrap();
    assert_eq!((summary.loads, summary.loads_bound), (3, 1));
    assert!(runner.references().get("admin").unwrap().ptr_eq(&admin));
    drop(runner);
    let store = constructor.store();
    assert_eq!(store.count("query select admin"), 1);
    assert_eq!(store.count("query select taken"), 0);
    assert_eq!(store.count("query select again"), 0);
    let order = store.saved.last().unwrap();
    assert_eq!(order.get("Customer").unwrap(), Some(Value::Object(admin)));
}

#[test]
fn loads_without_match_are_silent() {
    let schema = shop();
    let mut root = build(
        &schema,
        r#"<data-config namespace="Shop">
            <load ref="nobody">select nothing</load>
            <entity class="Customer"><Name>still runs</Name></entity>
        </data-config>"#,
    );
    let mut constructor = recording(&schema, SessionMode::PerRun);
    let mut runner = Runner::new();
    let summary = runner.attach(&mut constructor).run(&mut root).unwrap();
    assert_eq!((summary.loads, summary.loads_bound, summary.entities), (1, 0, 1));
    assert!(!runner.references().contains("nobody"));
}

#[test]
fn running_without_constructor_fails() {
    let schema = shop();
    let mut root = build(&schema, r#"<data-config namespace="Shop"><entity class="Customer" /></data-config>"#);
    let err = Runner::new().run(&mut root).unwrap_err();
    assert!(matches!(err, SeedlingError::MissingConstructor));
}
