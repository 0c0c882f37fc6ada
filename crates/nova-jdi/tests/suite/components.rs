use std::cmp::Ordering;
use std::sync::Arc;

use nova_jdi::mock::MockTarget;
use nova_jdi::request::{Reply, Request};
use nova_jdi::{JdiError, Modifiers, PrimitiveKind, Type};

use super::support::{class, class_data, component, session_with};

#[test]
fn reference_types_order_by_signature_then_identity() {
    let target = Arc::new(MockTarget::new());
    let session = session_with(&target);
    let other = session_with(&target);

    let a = class(&session, 2, "Lcom/example/A;");
    let b = class(&session, 1, "Lcom/example/B;");
    let a_elsewhere = class(&other, 2, "Lcom/example/A;");

    let mut types = vec![b.clone(), a_elsewhere.clone(), a.clone()];
    types.sort();
    assert_eq!(types, [a.clone(), a_elsewhere.clone(), b]);
    assert_ne!(a, a_elsewhere);
    assert_eq!(a, class(&session, 2, "Lcom/example/A;"));
}

#[test]
fn fields_are_fetched_once_and_compare_by_declaration_order() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Fields { type_id: 0x10 },
        Reply::Components(vec![
            component(1, "count", "I", Modifiers::PRIVATE),
            component(2, "name", "Ljava/lang/String;", Modifiers::PUBLIC | Modifiers::FINAL),
            component(3, "cache", "[J", Modifiers::STATIC | Modifiers::TRANSIENT),
        ]),
    );
    let session = session_with(&target);
    let ty = class(&session, 0x10, "Lcom/example/Holder;");

    let fields = ty.fields().unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0].compare_to(&fields[2]).unwrap(), Ordering::Less);
    assert_eq!(fields[2].compare_to(&fields[1]).unwrap(), Ordering::Greater);
    assert_eq!(fields[1].compare_to(&fields[1]).unwrap(), Ordering::Equal);

    let name = ty.field_by_name("name").unwrap().unwrap();
    assert_eq!(name, fields[1]);
    assert!(name.is_public() && name.is_final());
    assert!(fields[0].is_private());
    assert!(fields[2].is_static() && fields[2].is_transient());
    assert!(fields[2].is_package_private());
    assert_eq!(fields[2].type_name(), "long[]");
    assert!(ty.field_by_name("missing").unwrap().is_none());

    assert_eq!(target.call_count(&Request::Fields { type_id: 0x10 }), 1);
}

#[test]
fn fields_of_different_types_order_by_declaring_type() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Fields { type_id: 1 },
        Reply::Components(vec![component(9, "z", "I", 0)]),
    );
    target.reply(
        Request::Fields { type_id: 2 },
        Reply::Components(vec![component(1, "a", "I", 0)]),
    );
    let session = session_with(&target);
    let first = class(&session, 1, "La/First;");
    let second = class(&session, 2, "Lb/Second;");

    let z = first.fields().unwrap().remove(0);
    let a = second.fields().unwrap().remove(0);
    assert_eq!(z.compare_to(&a).unwrap(), Ordering::Less);
}

#[test]
fn field_types_resolve_locally_or_through_loaded_classes() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Fields { type_id: 0x10 },
        Reply::Components(vec![
            component(1, "count", "I", 0),
            component(2, "name", "Ljava/lang/String;", 0),
            component(3, "peer", "Lcom/example/Missing;", 0),
            component(4, "self_ref", "Lcom/example/Holder;", 0),
        ]),
    );
    target.reply(
        Request::ClassesBySignature {
            signature: "Ljava/lang/String;".into(),
        },
        Reply::Types(vec![class_data(0x99, "Ljava/lang/String;")]),
    );
    target.reply(
        Request::ClassesBySignature {
            signature: "Lcom/example/Missing;".into(),
        },
        Reply::Types(Vec::new()),
    );
    let session = session_with(&target);
    let ty = class(&session, 0x10, "Lcom/example/Holder;");
    let fields = ty.fields().unwrap();

    assert_eq!(fields[0].type_().unwrap(), Type::Primitive(PrimitiveKind::Int));

    let string = fields[1].type_().unwrap();
    assert_eq!(string.name(), "java.lang.String");
    assert_eq!(string.as_reference().unwrap().id(), 0x99);

    match fields[2].type_() {
        Err(JdiError::TypeNotLoaded { signature }) => {
            assert_eq!(signature, "Lcom/example/Missing;")
        }
        other => panic!("expected TypeNotLoaded, got {other:?}"),
    }

    assert_eq!(fields[3].type_().unwrap(), Type::Reference(ty.clone()));
    assert_eq!(ty.find_type("V").unwrap(), Type::Void);
    assert!(matches!(
        ty.find_type("Q"),
        Err(JdiError::InvalidSignature(_))
    ));
}

#[test]
fn synthetic_flag_uses_the_high_bits() {
    let target = Arc::new(MockTarget::new());
    target.reply(
        Request::Fields { type_id: 1 },
        Reply::Components(vec![
            component(1, "this$0", "Lcom/example/Outer;", 0xf000_0010),
            component(2, "plain", "I", Modifiers::FINAL),
        ]),
    );
    let session = session_with(&target);
    let fields = class(&session, 1, "Lcom/example/Outer$Inner;").fields().unwrap();

    assert!(fields[0].is_synthetic());
    assert!(fields[0].is_final());
    assert!(!fields[1].is_synthetic());
}

#[test]
fn failed_reflection_fetch_leaves_no_cache_entry() {
    let target = Arc::new(MockTarget::new());
    let request = Request::Fields { type_id: 0x20 };
    target.reply(
        request.clone(),
        Reply::Components(vec![component(1, "value", "I", 0)]),
    );
    target.fail_once(request.clone(), 21);
    let session = session_with(&target);
    let ty = class(&session, 0x20, "Lcom/example/Box;");

    assert!(matches!(
        ty.fields(),
        Err(JdiError::CommandFailed { error_code: 21 })
    ));
    assert_eq!(ty.fields().unwrap().len(), 1);
    assert!(ty.field_by_name("value").unwrap().is_some());
    assert_eq!(target.call_count(&request), 2);
}
